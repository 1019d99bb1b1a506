use crate::session::*;

use serde::{Deserialize, Serialize};

pub const DEFAULT_CATALOG_PATH: &str = "data/outlets.csv";

pub const DEFAULT_FORM_URL: &str = "https://docs.google.com/forms/d/e/1FAIpQLScjVf0SQ_BpNd0t0LnKktkcJSQBeqLRQRCaqDg5CzJxeE_Qug/formResponse";

pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSource {
    pub provider: String,
    #[serde(rename = "filePath")]
    pub file_path: String,
    #[serde(rename = "excelWorksheetName")]
    pub excel_worksheet_name: Option<String>,
}

impl Default for CatalogSource {
    fn default() -> Self {
        CatalogSource {
            provider: "csv".to_string(),
            file_path: DEFAULT_CATALOG_PATH.to_string(),
            excel_worksheet_name: None,
        }
    }
}

/// The survey section of the configuration file. Missing keys take the default values.
#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct SurveySettings {
    pub sections: Option<Vec<Section>>,
    #[serde(rename = "comparisonsPerSection")]
    pub comparisons_per_section: Option<usize>,
    #[serde(rename = "mainstreamOutlets")]
    pub mainstream_outlets: Option<Vec<String>>,
    /// If true (the default), the respondent must answer before moving forward.
    #[serde(rename = "requireAnswerToAdvance")]
    pub require_answer_to_advance: Option<bool>,
}

impl SurveySettings {
    pub fn survey_config(&self) -> SessionResult<SurveyConfig> {
        let default = SurveyConfig::default();
        let config = SurveyConfig {
            sections: self.sections.clone().unwrap_or(default.sections),
            comparisons_per_section: self
                .comparisons_per_section
                .unwrap_or(default.comparisons_per_section),
            mainstream_outlets: self
                .mainstream_outlets
                .clone()
                .unwrap_or(default.mainstream_outlets),
        };
        config.validate().context(SurveySnafu {})?;
        Ok(config)
    }

    pub fn require_answer_to_advance(&self) -> bool {
        self.require_answer_to_advance.unwrap_or(true)
    }
}

/// The entry ids of the remote form, one per submitted field.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct FormFields {
    #[serde(rename = "respondentId")]
    pub respondent_id: String,
    pub timestamp: String,
    #[serde(rename = "interviewId")]
    pub interview_id: String,
    #[serde(rename = "comparisonId")]
    pub comparison_id: String,
    #[serde(rename = "outletLeftCodename")]
    pub outlet_left_codename: String,
    #[serde(rename = "outletRightCodename")]
    pub outlet_right_codename: String,
    #[serde(rename = "chosenOutletCodename")]
    pub chosen_outlet_codename: String,
    #[serde(rename = "sectionType")]
    pub section_type: String,
    pub email: String,
}

impl Default for FormFields {
    fn default() -> Self {
        FormFields {
            respondent_id: "entry.1734835485".to_string(),
            timestamp: "entry.1274077527".to_string(),
            interview_id: "entry.1066898704".to_string(),
            comparison_id: "entry.109375964".to_string(),
            outlet_left_codename: "entry.645477966".to_string(),
            outlet_right_codename: "entry.604728793".to_string(),
            chosen_outlet_codename: "entry.1931735630".to_string(),
            section_type: "entry.103511959".to_string(),
            email: "entry.1012204936".to_string(),
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct FormSettings {
    #[serde(rename = "formUrl")]
    pub form_url: String,
    #[serde(rename = "formFields", default)]
    pub form_fields: FormFields,
    /// Bound on each request to the form, connection included.
    #[serde(rename = "timeoutSecs", default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Default for FormSettings {
    fn default() -> Self {
        FormSettings {
            form_url: DEFAULT_FORM_URL.to_string(),
            form_fields: FormFields::default(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(rename = "catalogSource", default)]
    pub catalog_source: CatalogSource,
    #[serde(default)]
    pub survey: SurveySettings,
    #[serde(default)]
    pub form: FormSettings,
    #[serde(rename = "storePath")]
    pub store_path: Option<String>,
}

pub fn read_config(path: &str) -> SessionResult<SessionConfig> {
    let config_str = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let config: SessionConfig =
        serde_json::from_str(&config_str).context(ParsingJsonSnafu { path })?;
    info!("read_config: {:?}", config);
    Ok(config)
}

/// Relative paths in the configuration are relative to the configuration file.
pub fn resolve_path(config_path: Option<&str>, file_path: &str) -> PathBuf {
    let p = Path::new(file_path);
    if p.is_absolute() {
        return p.to_path_buf();
    }
    match config_path.and_then(|cp| Path::new(cp).parent()) {
        Some(root) => root.join(p),
        None => p.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_takes_defaults() {
        let js = r#"{
            "catalogSource": {"provider": "xlsx", "filePath": "outlets.xlsx", "excelWorksheetName": "Outlets"},
            "survey": {"comparisonsPerSection": 3, "requireAnswerToAdvance": false},
            "storePath": "session.json"
        }"#;
        let config: SessionConfig = serde_json::from_str(js).unwrap();
        assert_eq!(config.catalog_source.provider, "xlsx");
        assert_eq!(
            config.catalog_source.excel_worksheet_name,
            Some("Outlets".to_string())
        );
        assert!(!config.survey.require_answer_to_advance());
        assert_eq!(config.form, FormSettings::default());

        let survey = config.survey.survey_config().unwrap();
        assert_eq!(survey.comparisons_per_section, 3);
        assert_eq!(survey.sections.len(), 5);
        assert_eq!(survey.mainstream_outlets.len(), 8);
    }

    #[test]
    fn sections_use_the_type_key() {
        let js = r#"{"survey": {"sections": [
            {"id": 2, "type": "radio", "name": "Radio"},
            {"id": 1, "type": "tg", "name": "TG"}
        ]}}"#;
        let config: SessionConfig = serde_json::from_str(js).unwrap();
        assert_eq!(config.catalog_source, CatalogSource::default());
        assert!(config.survey.require_answer_to_advance());
        // Out of order sections are rejected.
        assert!(config.survey.survey_config().is_err());
    }

    #[test]
    fn form_fields_default_to_the_survey_form() {
        let js = r#"{"form": {"formUrl": "http://localhost:8080/form"}}"#;
        let config: SessionConfig = serde_json::from_str(js).unwrap();
        assert_eq!(config.form.form_url, "http://localhost:8080/form");
        assert_eq!(config.form.form_fields.email, "entry.1012204936");
        assert_eq!(config.form.form_fields.chosen_outlet_codename, "entry.1931735630");
        assert_eq!(config.form.timeout_secs, DEFAULT_TIMEOUT_SECS);

        let js = r#"{"form": {"formUrl": "http://localhost:8080/form", "timeoutSecs": 3}}"#;
        let config: SessionConfig = serde_json::from_str(js).unwrap();
        assert_eq!(config.form.timeout_secs, 3);
    }

    #[test]
    fn relative_paths_follow_the_config_file() {
        assert_eq!(
            resolve_path(Some("/etc/mbi/survey.json"), "outlets.csv"),
            PathBuf::from("/etc/mbi/outlets.csv")
        );
        assert_eq!(
            resolve_path(Some("/etc/mbi/survey.json"), "/data/outlets.csv"),
            PathBuf::from("/data/outlets.csv")
        );
        assert_eq!(
            resolve_path(None, "outlets.csv"),
            PathBuf::from("outlets.csv")
        );
    }
}
