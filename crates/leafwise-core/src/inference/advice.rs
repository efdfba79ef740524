//! In-session crop-care conversation.

use serde::Serialize;

use super::Advisor;
use crate::error::FailureReason;
use crate::util::unix_millis_now;
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdviceAnswer {
    Answered(String),
    Failed(FailureReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdviceEntry {
    pub query: String,
    pub answer: AdviceAnswer,
    /// Unix ms
    pub asked_at: i64,
}

#[derive(Serialize)]
struct EntryRecord<'a> {
    query: &'a str,
    response: Option<&'a str>,
    error: Option<String>,
    asked_at: i64,
}

/// Question/answer transcript. Never persisted.
#[derive(Debug, Clone, Default)]
pub struct AdviceLog {
    entries: Vec<AdviceEntry>,
}

impl AdviceLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[AdviceEntry] {
        &self.entries
    }

    /// Ask `advisor` and record the exchange.
    ///
    /// Blank questions are rejected without a request. Any other failure is
    /// kept in the transcript as a failed entry.
    pub async fn ask(&mut self, advisor: &dyn Advisor, query: &str) -> Result<&AdviceEntry> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::Validation("question must not be empty".to_string()));
        }

        let asked_at = unix_millis_now();
        let answer = match advisor.ask(query).await {
            Ok(response) => AdviceAnswer::Answered(response),
            Err(error) => {
                tracing::warn!("advice request failed: {}", error);
                AdviceAnswer::Failed(FailureReason::from(&error))
            }
        };
        self.entries.push(AdviceEntry {
            query: query.to_string(),
            answer,
            asked_at,
        });
        self.entries
            .last()
            .ok_or_else(|| Error::Runtime("advice transcript is empty".to_string()))
    }

    /// Transcript as JSON lines of `{query, response, error, asked_at}`.
    pub fn to_json(&self) -> Result<String> {
        let records = self
            .entries
            .iter()
            .map(|entry| {
                let (response, error) = match &entry.answer {
                    AdviceAnswer::Answered(text) => (Some(text.as_str()), None),
                    AdviceAnswer::Failed(reason) => (None, Some(reason.to_string())),
                };
                EntryRecord {
                    query: &entry.query,
                    response,
                    error,
                    asked_at: entry.asked_at,
                }
            })
            .collect::<Vec<_>>();
        Ok(serde_json::to_string_pretty(&records)?)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::error::FailureKind;

    struct EchoAdvisor;

    #[async_trait]
    impl Advisor for EchoAdvisor {
        async fn ask(&self, query: &str) -> Result<String> {
            if query.contains("offline") {
                Err(Error::Inference("Network error".to_string()))
            } else {
                Ok(format!("Try crop rotation for: {query}"))
            }
        }
    }

    #[tokio::test]
    async fn answers_are_recorded_in_order() {
        let mut log = AdviceLog::new();
        log.ask(&EchoAdvisor, "  yellow leaves  ").await.unwrap();
        log.ask(&EchoAdvisor, "offline question").await.unwrap();

        let entries = log.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].query, "yellow leaves");
        assert!(matches!(&entries[0].answer, AdviceAnswer::Answered(text) if text.contains("rotation")));
        assert!(matches!(
            &entries[1].answer,
            AdviceAnswer::Failed(reason) if reason.kind == FailureKind::Inference
        ));
    }

    #[tokio::test]
    async fn blank_questions_are_rejected_unrecorded() {
        let mut log = AdviceLog::new();
        assert!(matches!(log.ask(&EchoAdvisor, "   ").await, Err(Error::Validation(_))));
        assert!(log.entries().is_empty());
    }

    #[tokio::test]
    async fn transcript_serializes_failures() {
        let mut log = AdviceLog::new();
        log.ask(&EchoAdvisor, "offline").await.unwrap();
        let json = log.to_json().unwrap();
        assert!(json.contains("\"response\": null"));
        assert!(json.contains("Network error"));
    }
}
