use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::*;

/// The responses recorded so far, at most one per comparison.
///
/// Recording a response for a comparison that already has one replaces it
/// in place: the insertion order of the first answer is kept.
#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<Response>", into = "Vec<Response>")]
pub struct ResponseStore {
    responses: Vec<Response>,
}

impl ResponseStore {
    pub fn new() -> ResponseStore {
        ResponseStore::default()
    }

    /// Inserts or overwrites the response for its comparison.
    /// Returns the response that was replaced, if any.
    pub fn upsert(&mut self, response: Response) -> Option<Response> {
        match self
            .responses
            .iter_mut()
            .find(|r| r.comparison_id == response.comparison_id)
        {
            Some(existing) => {
                debug!("upsert: overwriting response for {}", response.comparison_id);
                Some(std::mem::replace(existing, response))
            }
            None => {
                self.responses.push(response);
                None
            }
        }
    }

    pub fn get(&self, comparison_id: &str) -> Option<&Response> {
        self.responses
            .iter()
            .find(|r| r.comparison_id == comparison_id)
    }

    /// All the responses, in insertion order.
    pub fn all(&self) -> &[Response] {
        &self.responses
    }

    pub fn len(&self) -> usize {
        self.responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }
}

impl TryFrom<Vec<Response>> for ResponseStore {
    type Error = SurveyError;

    fn try_from(responses: Vec<Response>) -> Result<Self, Self::Error> {
        for (idx, r) in responses.iter().enumerate() {
            if responses[..idx]
                .iter()
                .any(|prev| prev.comparison_id == r.comparison_id)
            {
                return Err(SurveyError::MalformedState(format!(
                    "duplicate response for comparison {}",
                    r.comparison_id
                )));
            }
        }
        Ok(ResponseStore { responses })
    }
}

impl From<ResponseStore> for Vec<Response> {
    fn from(store: ResponseStore) -> Self {
        store.responses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn response(comparison_id: &str, chosen: Choice) -> Response {
        Response {
            comparison_id: comparison_id.to_string(),
            outlet_left_codename: "a".to_string(),
            outlet_right_codename: "b".to_string(),
            chosen,
            section_type: MediaType::Press,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn overwrite_keeps_a_single_entry_in_place() {
        let mut store = ResponseStore::new();
        store.upsert(response("1-1", Choice::Outlet("a".to_string())));
        store.upsert(response("1-2", Choice::DontKnow));
        let replaced = store.upsert(response("1-1", Choice::Outlet("b".to_string())));

        assert_eq!(replaced.map(|r| r.chosen), Some(Choice::Outlet("a".to_string())));
        assert_eq!(store.len(), 2);
        let ids: Vec<&str> = store.all().iter().map(|r| r.comparison_id.as_str()).collect();
        assert_eq!(ids, vec!["1-1", "1-2"]);
        assert_eq!(
            store.get("1-1").map(|r| r.chosen.clone()),
            Some(Choice::Outlet("b".to_string()))
        );
    }

    #[test]
    fn serialized_as_array_with_dk_token() {
        let mut store = ResponseStore::new();
        store.upsert(response("2-1", Choice::DontKnow));
        let js = serde_json::to_value(&store).unwrap();
        assert!(js.is_array());
        assert_eq!(js[0]["chosen"], "dk");
        assert_eq!(js[0]["sectionType"], "press");
        assert_eq!(js[0]["outletLeftCodename"], "a");
    }

    #[test]
    fn duplicate_comparisons_are_rejected_on_load() {
        let r = response("3-1", Choice::DontKnow);
        let js = serde_json::to_string(&vec![r.clone(), r]).unwrap();
        assert!(serde_json::from_str::<ResponseStore>(&js).is_err());
    }
}
