use std::collections::HashSet;

use log::{debug, warn};

pub use crate::config::*;

/// The read-only collection of outlets a survey draws its pairs from.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct OutletCatalog {
    outlets: Vec<Outlet>,
}

impl OutletCatalog {
    /// The outlets, in the order they were added.
    pub fn outlets(&self) -> &[Outlet] {
        &self.outlets
    }

    pub fn of_type(&self, kind: MediaType) -> Vec<&Outlet> {
        self.outlets.iter().filter(|o| o.kind == kind).collect()
    }

    pub fn get(&self, codename: &str) -> Option<&Outlet> {
        self.outlets.iter().find(|o| o.codename == codename)
    }

    pub fn len(&self) -> usize {
        self.outlets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outlets.is_empty()
    }
}

/// A builder for assembling a catalog of outlets.
///
/// Rows that cannot be used are skipped rather than rejected: the catalog
/// format is lossy and the survey can run on whatever survives.
///
/// ```
/// use pairwise_survey::builder::CatalogBuilder;
/// use pairwise_survey::{MediaType, SurveyConfig};
/// # use pairwise_survey::SurveyError;
///
/// let mut builder = CatalogBuilder::new(&SurveyConfig::default());
/// builder.add_outlet_simple("tg1", "TG1", MediaType::Tg);
/// builder.add_outlet("skytg24", "Sky TG24", "tg", Some("https://example.org/sky.png"));
/// // Unknown types are skipped.
/// assert!(!builder.add_outlet("blog", "Some blog", "blog", None));
///
/// let catalog = builder.build()?;
/// assert_eq!(catalog.len(), 2);
/// assert!(catalog.get("tg1").unwrap().is_mainstream);
/// # Ok::<(), SurveyError>(())
/// ```
pub struct CatalogBuilder {
    pub(crate) _mainstream: HashSet<String>,
    pub(crate) _outlets: Vec<Outlet>,
}

impl CatalogBuilder {
    pub fn new(config: &SurveyConfig) -> CatalogBuilder {
        CatalogBuilder {
            _mainstream: config.mainstream_outlets.iter().cloned().collect(),
            _outlets: Vec::new(),
        }
    }

    pub fn add_outlet_simple(&mut self, codename: &str, name: &str, kind: MediaType) -> bool {
        self.add_outlet(codename, name, kind.as_str(), None)
    }

    /// Adds an outlet described by raw catalog fields.
    ///
    /// Returns false if the row was skipped: unknown type, missing codename
    /// or a codename that is already registered (the first one wins).
    pub fn add_outlet(
        &mut self,
        codename: &str,
        name: &str,
        type_label: &str,
        pic: Option<&str>,
    ) -> bool {
        let codename = codename.trim();
        if codename.is_empty() {
            warn!("add_outlet: skipping outlet without codename (name: {:?})", name);
            return false;
        }
        let kind = match MediaType::parse(type_label) {
            Some(k) => k,
            None => {
                warn!(
                    "add_outlet: skipping outlet {}: unknown type {:?}",
                    codename, type_label
                );
                return false;
            }
        };
        if self._outlets.iter().any(|o| o.codename == codename) {
            warn!("add_outlet: skipping duplicate outlet {}", codename);
            return false;
        }
        let outlet = Outlet {
            codename: codename.to_string(),
            name: name.trim().to_string(),
            kind,
            pic: pic
                .map(|p| p.trim())
                .filter(|p| !p.is_empty())
                .map(|p| p.to_string()),
            is_mainstream: self._mainstream.contains(codename),
        };
        debug!("add_outlet: {:?}", outlet);
        self._outlets.push(outlet);
        true
    }

    pub fn build(self) -> SurveyResult<OutletCatalog> {
        if self._outlets.is_empty() {
            return Err(SurveyError::InvalidCatalog(
                "no outlets found in the catalog".to_string(),
            ));
        }
        Ok(OutletCatalog {
            outlets: self._outlets,
        })
    }
}
