use chrono::{DateTime, Utc};
use log::{debug, info};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::builder::OutletCatalog;
use crate::config::*;
use crate::generate_pairs;
use crate::store::ResponseStore;

// A run of consecutive pairs belonging to the same section.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
struct Segment {
    section_id: u32,
    start: usize,
    len: usize,
}

// Sections that produced no pair do not have a segment.
fn segments(pairs: &[Pair]) -> Vec<Segment> {
    let mut res: Vec<Segment> = Vec::new();
    for (idx, p) in pairs.iter().enumerate() {
        match res.last_mut() {
            Some(seg) if seg.section_id == p.section_id => seg.len += 1,
            _ => res.push(Segment {
                section_id: p.section_id,
                start: idx,
                len: 1,
            }),
        }
    }
    res
}

/// Where a section stands relative to the current position.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum SectionStatus {
    Completed,
    Active,
    Pending,
}

/// The state of a respondent session while the comparisons are being answered.
///
/// This is the aggregate that gets persisted after every change. The position
/// is the only pointer into the pairs and it always designates an existing pair.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyState {
    respondent_id: String,
    interview_id: String,
    pairs: Vec<Pair>,
    responses: ResponseStore,
    #[serde(flatten)]
    position: SurveyPosition,
    consent_given: bool,
}

impl SurveyState {
    pub fn respondent_id(&self) -> &str {
        &self.respondent_id
    }

    pub fn interview_id(&self) -> &str {
        &self.interview_id
    }

    pub fn pairs(&self) -> &[Pair] {
        &self.pairs
    }

    pub fn responses(&self) -> &ResponseStore {
        &self.responses
    }

    pub fn position(&self) -> SurveyPosition {
        self.position
    }

    pub fn consent_given(&self) -> bool {
        self.consent_given
    }

    pub fn total_comparisons(&self) -> usize {
        self.pairs.len()
    }

    /// The number of sections that have at least one comparison.
    pub fn section_count(&self) -> usize {
        segments(&self.pairs).len()
    }

    pub fn comparisons_in_current_section(&self) -> usize {
        segments(&self.pairs)
            .get(self.position.current_section)
            .map(|s| s.len)
            .unwrap_or(0)
    }

    fn index_of(&self, pos: SurveyPosition) -> Option<usize> {
        segments(&self.pairs)
            .get(pos.current_section)
            .filter(|seg| pos.current_comparison < seg.len)
            .map(|seg| seg.start + pos.current_comparison)
    }

    /// The index of the current pair in the whole sequence.
    pub fn linear_index(&self) -> usize {
        self.index_of(self.position).unwrap_or(0)
    }

    pub fn current_pair(&self) -> Option<&Pair> {
        self.index_of(self.position).and_then(|idx| self.pairs.get(idx))
    }

    /// The answer already given for the current pair, if any.
    pub fn current_response(&self) -> Option<&Response> {
        self.current_pair()
            .and_then(|p| self.responses.get(&p.comparison_id))
    }

    /// Share of the comparisons before the current one, in percent.
    pub fn progress_percent(&self) -> f64 {
        if self.pairs.is_empty() {
            return 0.0;
        }
        (self.linear_index() as f64) * 100.0 / (self.pairs.len() as f64)
    }

    pub fn is_last_comparison(&self) -> bool {
        self.linear_index() + 1 == self.pairs.len()
    }

    pub fn section_statuses(&self) -> Vec<SectionStatus> {
        let current = self.position.current_section;
        (0..self.section_count())
            .map(|idx| match idx {
                i if i < current => SectionStatus::Completed,
                i if i == current => SectionStatus::Active,
                _ => SectionStatus::Pending,
            })
            .collect()
    }

    fn pair(&self, comparison_id: &str) -> Option<&Pair> {
        self.pairs.iter().find(|p| p.comparison_id == comparison_id)
    }

    pub fn to_snapshot(&self) -> SurveyResult<String> {
        serde_json::to_string(self).map_err(|e| SurveyError::MalformedState(e.to_string()))
    }

    /// Reads a snapshot written by `to_snapshot` and checks its consistency.
    pub fn from_snapshot(snapshot: &str) -> SurveyResult<SurveyState> {
        let state: SurveyState = serde_json::from_str(snapshot)
            .map_err(|e| SurveyError::MalformedState(e.to_string()))?;
        state.check()?;
        Ok(state)
    }

    fn check(&self) -> SurveyResult<()> {
        let malformed = |msg: String| Err(SurveyError::MalformedState(msg));
        if self.pairs.is_empty() {
            return malformed("no pairs".to_string());
        }
        let segs = segments(&self.pairs);
        for w in segs.windows(2) {
            if w[0].section_id >= w[1].section_id {
                return malformed(format!(
                    "section {} appears after section {}",
                    w[1].section_id, w[0].section_id
                ));
            }
        }
        for seg in segs.iter() {
            for (offset, p) in self.pairs[seg.start..seg.start + seg.len].iter().enumerate() {
                let expected_id = format!("{}-{}", p.section_id, offset + 1);
                if p.comparison_index != offset || p.comparison_id != expected_id {
                    return malformed(format!(
                        "pair {} is out of sequence (index {})",
                        p.comparison_id, p.comparison_index
                    ));
                }
                if p.left.codename == p.right.codename {
                    return malformed(format!(
                        "pair {} compares {} with itself",
                        p.comparison_id, p.left.codename
                    ));
                }
            }
        }
        for r in self.responses.all() {
            if self.pair(&r.comparison_id).is_none() {
                return malformed(format!(
                    "response for unknown comparison {}",
                    r.comparison_id
                ));
            }
        }
        if self.index_of(self.position).is_none() {
            return malformed(format!("position {:?} out of bounds", self.position));
        }
        Ok(())
    }
}

/// What is left of a session once every comparison has been walked through.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedSurvey {
    respondent_id: String,
    interview_id: String,
    responses: ResponseStore,
}

impl CompletedSurvey {
    pub fn respondent_id(&self) -> &str {
        &self.respondent_id
    }

    pub fn interview_id(&self) -> &str {
        &self.interview_id
    }

    pub fn responses(&self) -> &ResponseStore {
        &self.responses
    }

    /// Every recorded response, in insertion order, with the contact attached.
    ///
    /// The responses were first delivered before the contact was known; the
    /// caller is expected to send these one after the other.
    pub fn resubmissions(&self, contact: &str) -> SurveyResult<Vec<Submission>> {
        if !is_valid_contact(contact) {
            return Err(SurveyError::InvalidCommand(format!(
                "not a valid contact: {:?}",
                contact
            )));
        }
        let contact = contact.trim().to_string();
        Ok(self
            .responses
            .all()
            .iter()
            .map(|r| Submission {
                respondent_id: self.respondent_id.clone(),
                interview_id: self.interview_id.clone(),
                response: r.clone(),
                contact: Some(contact.clone()),
            })
            .collect())
    }

    pub fn to_snapshot(&self) -> SurveyResult<String> {
        serde_json::to_string(self).map_err(|e| SurveyError::MalformedState(e.to_string()))
    }

    pub fn from_snapshot(snapshot: &str) -> SurveyResult<CompletedSurvey> {
        serde_json::from_str(snapshot).map_err(|e| SurveyError::MalformedState(e.to_string()))
    }
}

pub fn is_valid_contact(contact: &str) -> bool {
    let c = contact.trim();
    !c.is_empty() && c.contains('@')
}

/// The outcome of moving forward.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum Step {
    Moved(SurveyPosition),
    Completed,
}

/// The survey state machine: `AwaitingConsent -> InProgress -> Completed`.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum Survey {
    AwaitingConsent,
    InProgress(SurveyState),
    Completed(CompletedSurvey),
}

impl Default for Survey {
    fn default() -> Self {
        Survey::AwaitingConsent
    }
}

impl Survey {
    pub fn new() -> Survey {
        Survey::AwaitingConsent
    }

    fn phase_name(&self) -> &'static str {
        match self {
            Survey::AwaitingConsent => "awaiting consent",
            Survey::InProgress(_) => "in progress",
            Survey::Completed(_) => "completed",
        }
    }

    pub fn state(&self) -> Option<&SurveyState> {
        match self {
            Survey::InProgress(s) => Some(s),
            _ => None,
        }
    }

    pub fn completed(&self) -> Option<&CompletedSurvey> {
        match self {
            Survey::Completed(c) => Some(c),
            _ => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Survey::Completed(_))
    }

    fn in_progress(&self, action: &str) -> SurveyResult<&SurveyState> {
        match self {
            Survey::InProgress(s) => Ok(s),
            other => Err(SurveyError::InvalidCommand(format!(
                "cannot {} while the survey is {}",
                action,
                other.phase_name()
            ))),
        }
    }

    fn in_progress_mut(&mut self, action: &str) -> SurveyResult<&mut SurveyState> {
        let phase = self.phase_name();
        match self {
            Survey::InProgress(s) => Ok(s),
            _ => Err(SurveyError::InvalidCommand(format!(
                "cannot {} while the survey is {}",
                action, phase
            ))),
        }
    }

    /// Starts a new session: fresh identities, freshly generated pairs, first comparison.
    pub fn start<R: Rng + ?Sized>(
        &mut self,
        consent_given: bool,
        catalog: &OutletCatalog,
        config: &SurveyConfig,
        rng: &mut R,
    ) -> SurveyResult<()> {
        if !matches!(self, Survey::AwaitingConsent) {
            return Err(SurveyError::InvalidCommand(format!(
                "cannot start while the survey is {}",
                self.phase_name()
            )));
        }
        if !consent_given {
            return Err(SurveyError::ConsentRequired);
        }
        config.validate()?;
        let pairs = generate_pairs(catalog, config, rng);
        if pairs.is_empty() {
            return Err(SurveyError::NoComparisons);
        }
        let state = SurveyState {
            respondent_id: new_respondent_id(rng),
            interview_id: new_interview_id(rng, Utc::now()),
            pairs,
            responses: ResponseStore::new(),
            position: SurveyPosition::ORIGIN,
            consent_given,
        };
        info!(
            "start: respondent {} interview {}: {} comparisons",
            state.respondent_id,
            state.interview_id,
            state.pairs.len()
        );
        *self = Survey::InProgress(state);
        Ok(())
    }

    /// Restores a saved session as is. The pairs are never regenerated.
    pub fn resume(saved: SurveyState) -> SurveyResult<Survey> {
        if !saved.consent_given {
            return Err(SurveyError::ConsentRequired);
        }
        saved.check()?;
        info!(
            "resume: respondent {} at {:?} with {} responses",
            saved.respondent_id,
            saved.position,
            saved.responses.len()
        );
        Ok(Survey::InProgress(saved))
    }

    /// Records (or overwrites) the answer for a comparison.
    ///
    /// The returned submission is meant to be delivered on a best-effort basis.
    pub fn record_selection(
        &mut self,
        comparison_id: &str,
        chosen: Choice,
    ) -> SurveyResult<Submission> {
        let state = self.in_progress_mut("record a selection")?;
        let pair = state.pair(comparison_id).ok_or_else(|| {
            SurveyError::InvalidCommand(format!("unknown comparison {}", comparison_id))
        })?;
        if let Choice::Outlet(codename) = &chosen {
            if !pair.contains(codename) {
                return Err(SurveyError::InvalidCommand(format!(
                    "outlet {} is not part of comparison {}",
                    codename, comparison_id
                )));
            }
        }
        let response = Response {
            comparison_id: pair.comparison_id.clone(),
            outlet_left_codename: pair.left.codename.clone(),
            outlet_right_codename: pair.right.codename.clone(),
            chosen,
            section_type: pair.section_type,
            timestamp: Utc::now(),
        };
        debug!("record_selection: {:?}", response);
        state.responses.upsert(response.clone());
        Ok(Submission {
            respondent_id: state.respondent_id.clone(),
            interview_id: state.interview_id.clone(),
            response,
            contact: None,
        })
    }

    /// Records the answer for the comparison at the current position.
    pub fn select_current(&mut self, chosen: Choice) -> SurveyResult<Submission> {
        let comparison_id = self
            .in_progress("select")?
            .current_pair()
            .map(|p| p.comparison_id.clone())
            .ok_or_else(|| SurveyError::InvalidCommand("no current comparison".to_string()))?;
        self.record_selection(&comparison_id, chosen)
    }

    /// Moves to the next comparison. Past the last one, the survey is completed.
    ///
    /// No answer is required for the current comparison.
    pub fn advance(&mut self) -> SurveyResult<Step> {
        let state = self.in_progress_mut("advance")?;
        let segs = segments(&state.pairs);
        let pos = state.position;
        let seg_len = segs.get(pos.current_section).map(|s| s.len).unwrap_or(0);
        if pos.current_comparison + 1 < seg_len {
            state.position.current_comparison += 1;
            return Ok(Step::Moved(state.position));
        }
        if pos.current_section + 1 < segs.len() {
            state.position = SurveyPosition {
                current_section: pos.current_section + 1,
                current_comparison: 0,
            };
            return Ok(Step::Moved(state.position));
        }
        let completed = CompletedSurvey {
            respondent_id: state.respondent_id.clone(),
            interview_id: state.interview_id.clone(),
            responses: state.responses.clone(),
        };
        info!(
            "advance: respondent {} completed the survey with {} responses",
            completed.respondent_id,
            completed.responses.len()
        );
        *self = Survey::Completed(completed);
        Ok(Step::Completed)
    }

    /// Moves back one comparison. Does nothing at the very first one.
    pub fn retreat(&mut self) -> SurveyResult<SurveyPosition> {
        let state = self.in_progress_mut("go back")?;
        let segs = segments(&state.pairs);
        let pos = state.position;
        if pos.current_comparison > 0 {
            state.position.current_comparison -= 1;
        } else if pos.current_section > 0 {
            let previous = pos.current_section - 1;
            state.position = SurveyPosition {
                current_section: previous,
                current_comparison: segs
                    .get(previous)
                    .map(|s| s.len.saturating_sub(1))
                    .unwrap_or(0),
            };
        }
        Ok(state.position)
    }
}

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

fn to_base36(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut digits: Vec<u8> = Vec::new();
    while n > 0 {
        digits.push(BASE36[(n % 36) as usize]);
        n /= 36;
    }
    digits.iter().rev().map(|&d| d as char).collect()
}

/// A random (version 4) UUID drawn from the given source.
pub fn new_respondent_id<R: Rng + ?Sized>(rng: &mut R) -> String {
    let bytes: [u8; 16] = rng.gen();
    uuid::Builder::from_random_bytes(bytes)
        .into_uuid()
        .to_string()
}

/// The base-36 timestamp in milliseconds, followed by 5 random base-36 characters.
pub fn new_interview_id<R: Rng + ?Sized>(rng: &mut R, now: DateTime<Utc>) -> String {
    let mut id = to_base36(now.timestamp_millis().max(0) as u64);
    for _ in 0..5 {
        id.push(BASE36[rng.gen_range(0..BASE36.len())] as char);
    }
    id
}
