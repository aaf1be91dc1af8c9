use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::lead_fsm::{self, LeadStatus};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadSource {
    #[default]
    Website,
    Whatsapp,
    Instagram,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
    pub ts: DateTime<Utc>,
}

/// Inclusive quote range in whole currency units. Backends send the bounds
/// as floats about as often as integers, so deserialization rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuoteRange(pub u64, pub u64);

impl<'de> Deserialize<'de> for QuoteRange {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let [min, max] = <[f64; 2]>::deserialize(deserializer)?;
        Ok(QuoteRange(whole_amount(min), whole_amount(max)))
    }
}

fn whole_amount(value: f64) -> u64 {
    if value.is_finite() && value > 0.0 {
        value.round() as u64
    } else {
        0
    }
}

impl QuoteRange {
    pub fn normalized(self) -> Self {
        if self.0 <= self.1 {
            self
        } else {
            QuoteRange(self.1, self.0)
        }
    }

    pub fn min(&self) -> u64 {
        self.0
    }

    pub fn max(&self) -> u64 {
        self.1
    }
}

/// One lead per (agent, session). The session id doubles as the lead id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: String,
    #[serde(default)]
    pub source: LeadSource,
    #[serde(default)]
    pub messages: Vec<ChatTurn>,
    #[serde(default)]
    pub collected_data: IndexMap<String, Value>,
    #[serde(default)]
    pub lead_status: LeadStatus,
    #[serde(default)]
    pub qualification_score: u8,
    #[serde(default)]
    pub qualification_notes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_quote_range: Option<QuoteRange>,
    #[serde(default)]
    pub ready_to_book: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_times: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation_note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation_email: Option<EmailReceipt>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailReceipt {
    pub to: String,
    pub subject: String,
    pub sent: bool,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnResult {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub collected_data: IndexMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lead_status: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_score",
        skip_serializing_if = "Option::is_none"
    )]
    pub qualification_score: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qualification_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_quote_range: Option<QuoteRange>,
    #[serde(default)]
    pub ready_to_book: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_times: Option<Vec<String>>,
}

/// Scores arrive as `85`, `85.0`, or occasionally out of range; anything
/// numeric lands in 0..=100 instead of failing the whole reply.
fn lenient_score<'de, D>(deserializer: D) -> std::result::Result<Option<u8>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let score = Option::<f64>::deserialize(deserializer)?;
    Ok(score.map(|s| s.clamp(0.0, 100.0) as u8))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub previous: LeadStatus,
    pub current: LeadStatus,
}

impl Lead {
    pub fn new(id: String, source: LeadSource, now: DateTime<Utc>) -> Self {
        Self {
            id,
            source,
            messages: Vec::new(),
            collected_data: IndexMap::new(),
            lead_status: LeadStatus::New,
            qualification_score: 0,
            qualification_notes: String::new(),
            suggested_quote_range: None,
            ready_to_book: false,
            preferred_times: None,
            confirmed_time: None,
            confirmation_note: None,
            confirmation_email: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn email(&self) -> Option<&str> {
        self.collected_data.get("email").and_then(Value::as_str)
    }

    pub fn display_name(&self) -> &str {
        self.collected_data
            .get("contact_name")
            .or_else(|| self.collected_data.get("name"))
            .and_then(Value::as_str)
            .unwrap_or("Unknown")
    }

    pub fn event_type(&self) -> Option<&str> {
        self.collected_data.get("event_type").and_then(Value::as_str)
    }

    /// Merges one turn into the lead. Collected data overwrites key by key
    /// and never unsets; the quote range and preferred times ratchet;
    /// `ready_to_book` is turn-local. An unknown or illegal status proposal
    /// is kept out and logged.
    pub fn apply_turn(
        &mut self,
        user_message: &str,
        turn: &TurnResult,
        now: DateTime<Utc>,
    ) -> Option<StatusChange> {
        let previous = self.lead_status;

        self.messages.push(ChatTurn {
            role: "user".to_string(),
            content: user_message.to_string(),
            ts: now,
        });
        self.messages.push(ChatTurn {
            role: "assistant".to_string(),
            content: turn.message.clone(),
            ts: now,
        });

        for (key, value) in &turn.collected_data {
            self.collected_data.insert(key.clone(), value.clone());
        }

        if let Some(raw) = turn.lead_status.as_deref() {
            match LeadStatus::parse(raw) {
                Some(proposed) => match lead_fsm::transition(self.lead_status, proposed) {
                    Some(next) => self.lead_status = next,
                    None => warn!(
                        lead = %self.id,
                        current = %self.lead_status,
                        proposed = %proposed,
                        "illegal status transition proposed, keeping current"
                    ),
                },
                None => warn!(
                    lead = %self.id,
                    current = %self.lead_status,
                    proposed = raw,
                    "unknown status proposed, keeping current"
                ),
            }
        }

        if let Some(score) = turn.qualification_score {
            self.qualification_score = score.min(100);
        }
        if let Some(notes) = &turn.qualification_notes {
            self.qualification_notes = notes.clone();
        }
        if let Some(range) = turn.suggested_quote_range {
            self.suggested_quote_range = Some(range.normalized());
        }
        if let Some(times) = &turn.preferred_times {
            self.preferred_times = Some(times.clone());
        }
        self.ready_to_book = turn.ready_to_book;
        self.updated_at = now;

        if self.lead_status != previous {
            Some(StatusChange {
                previous,
                current: self.lead_status,
            })
        } else {
            None
        }
    }

    /// Forced regardless of where the conversation left the lead.
    pub fn confirm(&mut self, confirmed_time: String, note: Option<String>, now: DateTime<Utc>) {
        self.confirmed_time = Some(confirmed_time);
        self.confirmation_note = note;
        self.lead_status = LeadStatus::MeetingConfirmed;
        self.updated_at = now;
    }

    pub fn reject(&mut self, now: DateTime<Utc>) {
        self.lead_status = LeadStatus::MeetingRequested;
        self.confirmed_time = None;
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lead() -> Lead {
        Lead::new("web-abc".to_string(), LeadSource::Website, Utc::now())
    }

    #[test]
    fn merge_overwrites_collected_keys_without_unsetting() {
        let mut lead = lead();
        lead.collected_data
            .insert("budget".to_string(), json!(3000));
        lead.collected_data
            .insert("city".to_string(), json!("Toronto"));
        let turn = TurnResult {
            collected_data: IndexMap::from([("budget".to_string(), json!(8000))]),
            ..TurnResult::default()
        };
        lead.apply_turn("we raised the budget", &turn, Utc::now());
        assert_eq!(lead.collected_data["budget"], json!(8000));
        assert_eq!(lead.collected_data["city"], json!("Toronto"));
    }

    #[test]
    fn quote_range_ratchets_across_turns() {
        let mut lead = lead();
        let turn = TurnResult {
            suggested_quote_range: Some(QuoteRange(4000, 6000)),
            ..TurnResult::default()
        };
        lead.apply_turn("hi", &turn, Utc::now());
        assert_eq!(lead.suggested_quote_range, Some(QuoteRange(4000, 6000)));

        lead.apply_turn("hello again", &TurnResult::default(), Utc::now());
        assert_eq!(lead.suggested_quote_range, Some(QuoteRange(4000, 6000)));
    }

    #[test]
    fn ready_to_book_is_turn_local() {
        let mut lead = lead();
        let turn = TurnResult {
            ready_to_book: true,
            ..TurnResult::default()
        };
        lead.apply_turn("book me", &turn, Utc::now());
        assert!(lead.ready_to_book);
        lead.apply_turn("actually wait", &TurnResult::default(), Utc::now());
        assert!(!lead.ready_to_book);
    }

    #[test]
    fn status_change_event_fires_only_on_change() {
        let mut lead = lead();
        let turn = TurnResult {
            lead_status: Some("gathering_info".to_string()),
            ..TurnResult::default()
        };
        let change = lead.apply_turn("hi", &turn, Utc::now()).unwrap();
        assert_eq!(change.previous, LeadStatus::New);
        assert_eq!(change.current, LeadStatus::GatheringInfo);

        let same = lead.apply_turn("more info", &turn, Utc::now());
        assert!(same.is_none());
    }

    #[test]
    fn unknown_status_is_clamped() {
        let mut lead = lead();
        let turn = TurnResult {
            lead_status: Some("super_vip".to_string()),
            ..TurnResult::default()
        };
        let change = lead.apply_turn("hi", &turn, Utc::now());
        assert!(change.is_none());
        assert_eq!(lead.lead_status, LeadStatus::New);
    }

    #[test]
    fn illegal_jump_is_clamped() {
        let mut lead = lead();
        let turn = TurnResult {
            lead_status: Some("meeting_confirmed".to_string()),
            ..TurnResult::default()
        };
        lead.apply_turn("hi", &turn, Utc::now());
        assert_eq!(lead.lead_status, LeadStatus::New);
    }

    #[test]
    fn score_is_clamped_to_100() {
        let mut lead = lead();
        let turn: TurnResult = serde_json::from_value(json!({
            "message": "ok",
            "qualification_score": 100
        }))
        .unwrap();
        lead.apply_turn("hi", &turn, Utc::now());
        assert_eq!(lead.qualification_score, 100);
    }

    #[test]
    fn confirm_forces_terminal_status() {
        let mut lead = lead();
        lead.confirm("Friday 3pm".to_string(), Some("bring photos".to_string()), Utc::now());
        assert_eq!(lead.lead_status, LeadStatus::MeetingConfirmed);
        assert_eq!(lead.confirmed_time.as_deref(), Some("Friday 3pm"));
    }

    #[test]
    fn quote_range_normalizes_inverted_bounds() {
        assert_eq!(QuoteRange(9000, 4000).normalized(), QuoteRange(4000, 9000));
    }

    #[test]
    fn turn_accepts_float_scores_and_bounds() {
        let turn: TurnResult = serde_json::from_str(
            r#"{"message": "You qualify!", "qualification_score": 85.0,
                "suggested_quote_range": [4500.5, 9000], "ready_to_book": false}"#,
        )
        .unwrap();
        assert_eq!(turn.qualification_score, Some(85));
        assert_eq!(turn.suggested_quote_range, Some(QuoteRange(4501, 9000)));
    }

    #[test]
    fn turn_clamps_out_of_range_scores() {
        let turn: TurnResult =
            serde_json::from_str(r#"{"message": "ok", "qualification_score": 250}"#).unwrap();
        assert_eq!(turn.qualification_score, Some(100));
        let turn: TurnResult =
            serde_json::from_str(r#"{"message": "ok", "qualification_score": -5}"#).unwrap();
        assert_eq!(turn.qualification_score, Some(0));
    }
}
