use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ConciergeError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingData {
    #[serde(default)]
    pub examples: Vec<TrainingExample>,
    #[serde(default)]
    pub corrections: Vec<Correction>,
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub faq: Vec<FaqItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingExample {
    #[serde(default)]
    pub scenario: String,
    #[serde(default)]
    pub good_response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bad_response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Correction {
    #[serde(default)]
    pub situation: String,
    #[serde(default)]
    pub wrong: String,
    #[serde(default)]
    pub correction: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default)]
    pub rule: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaqItem {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingKind {
    Example,
    Correction,
    Rule,
    Faq,
}

impl TrainingKind {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            "example" => Ok(Self::Example),
            "correction" => Ok(Self::Correction),
            "rule" => Ok(Self::Rule),
            "faq" => Ok(Self::Faq),
            other => Err(ConciergeError::BadRequest(format!(
                "unknown training type: {other}"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Example => "example",
            Self::Correction => "correction",
            Self::Rule => "rule",
            Self::Faq => "faq",
        }
    }
}

impl TrainingData {
    pub fn add(&mut self, kind: TrainingKind, data: serde_json::Value, now: DateTime<Utc>) -> Result<()> {
        match kind {
            TrainingKind::Example => {
                let mut item: TrainingExample = serde_json::from_value(data)
                    .map_err(|e| ConciergeError::BadRequest(e.to_string()))?;
                item.added_at = Some(now);
                self.examples.push(item);
            }
            TrainingKind::Correction => {
                let mut item: Correction = serde_json::from_value(data)
                    .map_err(|e| ConciergeError::BadRequest(e.to_string()))?;
                item.added_at = Some(now);
                self.corrections.push(item);
            }
            TrainingKind::Rule => {
                let mut item: Rule = serde_json::from_value(data)
                    .map_err(|e| ConciergeError::BadRequest(e.to_string()))?;
                item.added_at = Some(now);
                self.rules.push(item);
            }
            TrainingKind::Faq => {
                let mut item: FaqItem = serde_json::from_value(data)
                    .map_err(|e| ConciergeError::BadRequest(e.to_string()))?;
                item.added_at = Some(now);
                self.faq.push(item);
            }
        }
        Ok(())
    }

    pub fn delete(&mut self, kind: TrainingKind, index: usize) -> Result<()> {
        let len = match kind {
            TrainingKind::Example => self.examples.len(),
            TrainingKind::Correction => self.corrections.len(),
            TrainingKind::Rule => self.rules.len(),
            TrainingKind::Faq => self.faq.len(),
        };
        if index >= len {
            return Err(ConciergeError::NotFound(format!(
                "no {} at index {index}",
                kind.as_str()
            )));
        }
        match kind {
            TrainingKind::Example => {
                self.examples.remove(index);
            }
            TrainingKind::Correction => {
                self.corrections.remove(index);
            }
            TrainingKind::Rule => {
                self.rules.remove(index);
            }
            TrainingKind::Faq => {
                self.faq.remove(index);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn add_stamps_timestamp_and_appends_in_order() {
        let mut training = TrainingData::default();
        let now = Utc::now();
        training
            .add(
                TrainingKind::Rule,
                json!({"rule": "Always ask for the event date"}),
                now,
            )
            .unwrap();
        training
            .add(TrainingKind::Rule, json!({"rule": "Never quote hourly"}), now)
            .unwrap();
        assert_eq!(training.rules.len(), 2);
        assert_eq!(training.rules[0].rule, "Always ask for the event date");
        assert_eq!(training.rules[0].added_at, Some(now));
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let err = TrainingKind::parse("hallucination").unwrap_err();
        assert!(matches!(err, ConciergeError::BadRequest(_)));
    }

    #[test]
    fn delete_past_end_is_not_found() {
        let mut training = TrainingData::default();
        let err = training.delete(TrainingKind::Faq, 0).unwrap_err();
        assert!(matches!(err, ConciergeError::NotFound(_)));
    }
}
