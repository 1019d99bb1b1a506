// Delivery of the answers to the remote form.

use crate::session::*;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

/// The value sent when the respondent left no contact.
pub const NO_CONTACT: &str = "NA";

/// Where the submissions go.
#[async_trait]
pub trait SubmissionSink: Send + Sync {
    /// Delivers one submission. The answer of the remote end is not read.
    async fn deliver(&self, submission: &Submission) -> SessionResult<()>;
}

/// The form-encoded fields for one submission, sent at the given time.
pub fn form_params(
    fields: &FormFields,
    submission: &Submission,
    sent_at: DateTime<Utc>,
) -> Vec<(String, String)> {
    let r = &submission.response;
    vec![
        (fields.respondent_id.clone(), submission.respondent_id.clone()),
        (
            fields.timestamp.clone(),
            sent_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        ),
        (fields.interview_id.clone(), submission.interview_id.clone()),
        (fields.comparison_id.clone(), r.comparison_id.clone()),
        (
            fields.outlet_left_codename.clone(),
            r.outlet_left_codename.clone(),
        ),
        (
            fields.outlet_right_codename.clone(),
            r.outlet_right_codename.clone(),
        ),
        (fields.chosen_outlet_codename.clone(), r.chosen.to_string()),
        (fields.section_type.clone(), r.section_type.to_string()),
        (
            fields.email.clone(),
            submission
                .contact
                .clone()
                .unwrap_or_else(|| NO_CONTACT.to_string()),
        ),
    ]
}

/// Posts the submissions to a web form.
pub struct FormSink {
    client: reqwest::Client,
    settings: FormSettings,
}

impl FormSink {
    /// Every request is abandoned after `timeout_secs`, so a silent form cannot hold the
    /// session.
    pub fn new(settings: FormSettings) -> SessionResult<FormSink> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context(HttpClientSnafu {})?;
        Ok(FormSink { client, settings })
    }
}

#[async_trait]
impl SubmissionSink for FormSink {
    async fn deliver(&self, submission: &Submission) -> SessionResult<()> {
        let params = form_params(&self.settings.form_fields, submission, Utc::now());
        debug!("FormSink::deliver: {:?}", params);
        self.client
            .post(&self.settings.form_url)
            .form(&params)
            .send()
            .await
            .context(SubmitSnafu {
                url: self.settings.form_url.clone(),
            })?;
        Ok(())
    }
}

/// Only logs the submissions.
pub struct OfflineSink;

#[async_trait]
impl SubmissionSink for OfflineSink {
    async fn deliver(&self, submission: &Submission) -> SessionResult<()> {
        info!(
            "OfflineSink::deliver: {} {} -> {} (contact: {:?})",
            submission.interview_id,
            submission.response.comparison_id,
            submission.response.chosen,
            submission.contact
        );
        Ok(())
    }
}

/// Hands the submissions over to a sink.
///
/// During the survey, deliveries are started in the background and never waited for. A failed
/// delivery is logged and forgotten: the local response stays the reference.
pub struct Dispatcher {
    sink: Arc<dyn SubmissionSink>,
    in_flight: JoinSet<()>,
}

impl Dispatcher {
    pub fn new(sink: Arc<dyn SubmissionSink>) -> Dispatcher {
        Dispatcher {
            sink,
            in_flight: JoinSet::new(),
        }
    }

    pub fn dispatch(&mut self, submission: Submission) {
        self.reap();
        let sink = self.sink.clone();
        self.in_flight.spawn(async move {
            if let Err(e) = sink.deliver(&submission).await {
                warn!(
                    "dispatch: could not deliver {}: {}",
                    submission.response.comparison_id, e
                );
            }
        });
    }

    /// Delivers the submissions one after the other, each one finished before the next starts.
    /// Returns how many were delivered.
    pub async fn resubmit_all(&mut self, submissions: Vec<Submission>) -> usize {
        // Earlier deliveries of the same responses go first.
        self.settle().await;
        let mut delivered = 0;
        for submission in submissions.iter() {
            match self.sink.deliver(submission).await {
                Ok(()) => delivered += 1,
                Err(e) => warn!(
                    "resubmit_all: could not deliver {}: {}",
                    submission.response.comparison_id, e
                ),
            }
        }
        info!(
            "resubmit_all: delivered {} of {} submissions",
            delivered,
            submissions.len()
        );
        delivered
    }

    /// Waits for the deliveries that are still running.
    pub async fn settle(&mut self) {
        while let Some(res) = self.in_flight.join_next().await {
            if let Err(e) = res {
                warn!("settle: delivery task failed: {}", e);
            }
        }
    }

    // Drops the deliveries that are already over.
    fn reap(&mut self) {
        while let Some(res) = self.in_flight.try_join_next() {
            if let Err(e) = res {
                warn!("reap: delivery task failed: {}", e);
            }
        }
    }
}
