// ********* Input data structures ***********

use std::collections::HashSet;
use std::error::Error;
use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The kind of media an outlet belongs to.
///
/// The same tags are used to describe a section of the survey. `Mixed` is
/// the section that confronts mainstream outlets with the rest of the catalog.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Tg,
    Talk,
    Press,
    Radio,
    Mixed,
}

impl MediaType {
    /// Parses the label used in catalog files and configurations.
    pub fn parse(label: &str) -> Option<MediaType> {
        match label.trim().to_lowercase().as_str() {
            "tg" => Some(MediaType::Tg),
            "talk" => Some(MediaType::Talk),
            "press" => Some(MediaType::Press),
            "radio" => Some(MediaType::Radio),
            "mixed" => Some(MediaType::Mixed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Tg => "tg",
            MediaType::Talk => "talk",
            MediaType::Press => "press",
            MediaType::Radio => "radio",
            MediaType::Mixed => "mixed",
        }
    }
}

impl Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A media outlet, as loaded from the catalog. Immutable once loaded.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outlet {
    /// Unique identity of the outlet.
    pub codename: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: MediaType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pic: Option<String>,
    #[serde(default)]
    pub is_mainstream: bool,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub id: u32,
    #[serde(rename = "type")]
    pub kind: MediaType,
    pub name: String,
}

// ********* Configuration **********

/// The static description of a survey.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyConfig {
    /// The sections, in increasing id order.
    pub sections: Vec<Section>,
    pub comparisons_per_section: usize,
    /// Codenames of the outlets used as anchors in the mixed section.
    pub mainstream_outlets: Vec<String>,
}

impl SurveyConfig {
    pub fn total_comparisons(&self) -> usize {
        self.sections.len() * self.comparisons_per_section
    }

    pub fn mainstream_set(&self) -> HashSet<&str> {
        self.mainstream_outlets.iter().map(|s| s.as_str()).collect()
    }

    pub fn is_mainstream(&self, codename: &str) -> bool {
        self.mainstream_outlets.iter().any(|c| c == codename)
    }

    pub fn validate(&self) -> SurveyResult<()> {
        if self.sections.is_empty() {
            return Err(SurveyError::InvalidCommand(
                "the survey needs at least one section".to_string(),
            ));
        }
        if self.comparisons_per_section == 0 {
            return Err(SurveyError::InvalidCommand(
                "comparisons per section must be at least 1".to_string(),
            ));
        }
        // Configuration order must be the section-id order.
        for w in self.sections.windows(2) {
            if w[0].id >= w[1].id {
                return Err(SurveyError::InvalidCommand(format!(
                    "section ids must be strictly increasing, found {} before {}",
                    w[0].id, w[1].id
                )));
            }
        }
        Ok(())
    }
}

impl Default for SurveyConfig {
    fn default() -> Self {
        let section = |id: u32, kind: MediaType, name: &str| Section {
            id,
            kind,
            name: name.to_string(),
        };
        SurveyConfig {
            sections: vec![
                section(1, MediaType::Tg, "Telegiornali"),
                section(2, MediaType::Talk, "Talk show televisivi"),
                section(3, MediaType::Press, "Quotidiani e testate online"),
                section(4, MediaType::Radio, "Programmi radiofonici"),
                section(5, MediaType::Mixed, "Confronti misti"),
            ],
            comparisons_per_section: 6,
            mainstream_outlets: [
                "tg1",
                "tg5",
                "tgla7",
                "corriere",
                "repubblica",
                "portaaporta",
                "ottoemezzo",
                "radio24",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

// ********* Survey data structures **********

/// One comparison shown to the respondent.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pair {
    pub left: Outlet,
    pub right: Outlet,
    pub section_id: u32,
    pub section_type: MediaType,
    pub section_name: String,
    /// Zero-based position of the pair within its section.
    pub comparison_index: usize,
    /// `{section_id}-{comparison_index + 1}`, unique over the whole survey.
    pub comparison_id: String,
}

impl Pair {
    pub fn contains(&self, codename: &str) -> bool {
        self.left.codename == codename || self.right.codename == codename
    }

    /// True if the pair confronts the same two outlets, regardless of the sides.
    pub fn same_outlets(&self, a: &str, b: &str) -> bool {
        (self.left.codename == a && self.right.codename == b)
            || (self.left.codename == b && self.right.codename == a)
    }
}

pub const DONT_KNOW: &str = "dk";

/// What the respondent picked for a comparison.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Choice {
    Outlet(String),
    DontKnow,
}

impl From<String> for Choice {
    fn from(s: String) -> Self {
        if s == DONT_KNOW {
            Choice::DontKnow
        } else {
            Choice::Outlet(s)
        }
    }
}

impl From<Choice> for String {
    fn from(c: Choice) -> Self {
        match c {
            Choice::Outlet(s) => s,
            Choice::DontKnow => DONT_KNOW.to_string(),
        }
    }
}

impl Display for Choice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Choice::Outlet(s) => write!(f, "{}", s),
            Choice::DontKnow => write!(f, "{}", DONT_KNOW),
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub comparison_id: String,
    pub outlet_left_codename: String,
    pub outlet_right_codename: String,
    pub chosen: Choice,
    pub section_type: MediaType,
    pub timestamp: DateTime<Utc>,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyPosition {
    pub current_section: usize,
    pub current_comparison: usize,
}

impl SurveyPosition {
    pub const ORIGIN: SurveyPosition = SurveyPosition {
        current_section: 0,
        current_comparison: 0,
    };
}

/// A response, flattened with the identity of the respondent, ready to be
/// delivered to the remote form.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub respondent_id: String,
    pub interview_id: String,
    pub response: Response,
    pub contact: Option<String>,
}

// ******** Errors *********

/// Errors reported by the survey core.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum SurveyError {
    /// The respondent did not give consent.
    ConsentRequired,
    /// No section could produce a single comparison out of the catalog.
    NoComparisons,
    /// A command that breaks the contract of the state machine, such as a
    /// selection for an unknown comparison.
    InvalidCommand(String),
    /// A saved session that cannot be trusted.
    MalformedState(String),
    InvalidCatalog(String),
}

impl Error for SurveyError {}

impl Display for SurveyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SurveyError::ConsentRequired => write!(f, "consent is required to start the survey"),
            SurveyError::NoComparisons => {
                write!(f, "the catalog does not allow any comparison")
            }
            SurveyError::InvalidCommand(msg) => write!(f, "invalid command: {}", msg),
            SurveyError::MalformedState(msg) => write!(f, "malformed saved state: {}", msg),
            SurveyError::InvalidCatalog(msg) => write!(f, "invalid catalog: {}", msg),
        }
    }
}

pub type SurveyResult<T> = Result<T, SurveyError>;
