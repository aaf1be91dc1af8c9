use serde_json::json;
use tracing::{info, warn};

use crate::config::AgentConfig;
use crate::domains::lead::Lead;
use crate::lead_fsm::LeadStatus;
use crate::prompt::format_money;

/// Best-effort owner pings over Slack and Telegram; failures are logged and
/// swallowed.
pub struct Notifier {
    http: reqwest::Client,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    pub async fn notify_status_change(&self, config: &AgentConfig, lead: &Lead, event: &str) {
        let text = render_summary(config, lead, event);
        let integrations = &config.integrations;

        if let Some(slack) = &integrations.slack {
            match self
                .http
                .post(&slack.webhook_url)
                .json(&json!({ "text": text }))
                .send()
                .await
            {
                Ok(response) if response.status().is_success() => {
                    info!(lead = %lead.id, "slack notification sent");
                }
                Ok(response) => {
                    warn!(lead = %lead.id, status = %response.status(), "slack notification rejected");
                }
                Err(e) => warn!(lead = %lead.id, error = %e, "slack notification failed"),
            }
        }

        if let Some(telegram) = &integrations.telegram {
            let url = format!(
                "https://api.telegram.org/bot{}/sendMessage",
                telegram.bot_token
            );
            let payload = json!({
                "chat_id": telegram.chat_id,
                "text": text,
                "parse_mode": "Markdown",
            });
            match self.http.post(&url).json(&payload).send().await {
                Ok(response) if response.status().is_success() => {
                    info!(lead = %lead.id, "telegram notification sent");
                }
                Ok(response) => {
                    warn!(lead = %lead.id, status = %response.status(), "telegram notification rejected");
                }
                Err(e) => warn!(lead = %lead.id, error = %e, "telegram notification failed"),
            }
        }
    }
}

fn status_emoji(status: LeadStatus) -> &'static str {
    match status {
        LeadStatus::GatheringInfo => "📝",
        LeadStatus::Qualified => "✅",
        LeadStatus::Disqualified => "❌",
        LeadStatus::MeetingRequested => "📅",
        LeadStatus::PendingConfirmation => "⏳",
        LeadStatus::MeetingConfirmed => "🎉",
        LeadStatus::New => "📋",
    }
}

fn status_title(status: LeadStatus) -> String {
    status
        .as_str()
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn render_summary(config: &AgentConfig, lead: &Lead, event: &str) -> String {
    let mut lines = vec![
        format!(
            "{} *{} — {}*",
            status_emoji(lead.lead_status),
            config.business.name,
            event
        ),
        format!("Name: {}", lead.display_name()),
        format!("Event: {}", lead.event_type().unwrap_or("N/A")),
        format!(
            "Score: {}/100 | Status: {}",
            lead.qualification_score,
            status_title(lead.lead_status)
        ),
    ];
    if let Some(quote) = lead.suggested_quote_range {
        lines.push(format!(
            "Quote: {}–{}",
            format_money(quote.min()),
            format_money(quote.max())
        ));
    }
    if let Some(times) = lead.preferred_times.as_deref().filter(|t| !t.is_empty()) {
        lines.push(format!("Preferred: {}", times.join(", ")));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::lead::{LeadSource, QuoteRange};
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn summary_includes_quote_and_times() {
        let mut config = AgentConfig::default();
        config.business.name = "Vamos Events".to_string();

        let mut lead = Lead::new("web-1".to_string(), LeadSource::Website, Utc::now());
        lead.lead_status = LeadStatus::Qualified;
        lead.qualification_score = 85;
        lead.collected_data
            .insert("name".to_string(), json!("Dana"));
        lead.collected_data
            .insert("event_type".to_string(), json!("wedding"));
        lead.suggested_quote_range = Some(QuoteRange(5000, 9000));
        lead.preferred_times = Some(vec!["Fri 2pm".to_string(), "Sat 10am".to_string()]);

        let text = render_summary(&config, &lead, "Lead qualified");
        assert!(text.contains("✅ *Vamos Events — Lead qualified*"));
        assert!(text.contains("Name: Dana"));
        assert!(text.contains("Event: wedding"));
        assert!(text.contains("Score: 85/100 | Status: Qualified"));
        assert!(text.contains("Quote: $5,000–$9,000"));
        assert!(text.contains("Preferred: Fri 2pm, Sat 10am"));
    }

    #[test]
    fn summary_omits_missing_sections() {
        let mut config = AgentConfig::default();
        config.business.name = "Vamos Events".to_string();
        let lead = Lead::new("web-2".to_string(), LeadSource::Website, Utc::now());
        let text = render_summary(&config, &lead, "Lead new");
        assert!(!text.contains("Quote:"));
        assert!(!text.contains("Preferred:"));
        assert!(text.contains("Name: Unknown"));
    }
}
