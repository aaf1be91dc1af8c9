use chrono::{Datelike, Utc};
use serde_json::json;
use tracing::{info, warn};

use crate::config::AgentConfig;
use crate::domains::lead::{EmailReceipt, Lead};
use crate::prompt::format_money;

/// Confirmation emails over an HTTP mail provider. Unconfigured deployments
/// log the preview and record an unsent receipt on the lead.
pub struct Mailer {
    http: reqwest::Client,
    api_url: Option<String>,
    api_key: Option<String>,
    from_name: Option<String>,
}

impl Mailer {
    pub fn new(api_url: Option<String>, api_key: Option<String>, from_name: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url,
            api_key,
            from_name,
        }
    }

    pub fn unconfigured() -> Self {
        Self::new(None, None, None)
    }

    /// `None` when the lead never shared an email address.
    pub async fn send_confirmation(
        &self,
        config: &AgentConfig,
        lead: &Lead,
        confirmed_time: &str,
        note: Option<&str>,
    ) -> Option<EmailReceipt> {
        let to = lead.email()?.to_string();
        let biz_name = &config.business.name;
        let subject = format!("Your Consultation with {biz_name} is Confirmed! ✨");
        let plain = render_plain(config, lead, confirmed_time, note);
        let html = render_html(config, lead, confirmed_time, note);

        let Some(api_url) = &self.api_url else {
            info!(to = %to, subject = %subject, confirmed_time, "mail provider not configured, keeping preview");
            return Some(EmailReceipt {
                to,
                subject,
                sent: false,
                at: Utc::now(),
            });
        };

        let from_name = self.from_name.clone().unwrap_or_else(|| biz_name.clone());
        let payload = json!({
            "from_name": from_name,
            "reply_to": config.business.email,
            "to": to,
            "subject": subject,
            "text": plain,
            "html": html,
        });

        let mut request = self.http.post(api_url).json(&payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let sent = match request.send().await {
            Ok(response) if response.status().is_success() => {
                info!(to = %to, "confirmation email sent");
                true
            }
            Ok(response) => {
                warn!(to = %to, status = %response.status(), "mail provider rejected email");
                false
            }
            Err(e) => {
                warn!(to = %to, error = %e, "confirmation email failed");
                false
            }
        };

        Some(EmailReceipt {
            to,
            subject,
            sent,
            at: Utc::now(),
        })
    }
}

fn render_plain(
    config: &AgentConfig,
    lead: &Lead,
    confirmed_time: &str,
    note: Option<&str>,
) -> String {
    let biz = &config.business;
    let owner_name = biz.owner_name.as_deref().unwrap_or(&biz.name);
    let event_type = lead.event_type().unwrap_or("your event");

    let mut out = format!(
        "Hi {},\n\nYour consultation with {} has been confirmed!\n\n\
         Date & Time: {confirmed_time}\n\
         Type: Personal consultation for {event_type}\n\
         Duration: ~30 minutes\n",
        lead.display_name(),
        biz.name
    );
    if let Some(note) = note {
        out.push_str(&format!("Note: {note}\n"));
    }
    if let Some(quote) = lead.suggested_quote_range {
        out.push_str(&format!(
            "Estimated range: {} - {} CAD\n",
            format_money(quote.min()),
            format_money(quote.max())
        ));
    }
    out.push_str("\nIf you need to reschedule, please reach out:\n");
    if let Some(email) = &biz.email {
        out.push_str(&format!("Email: {email}\n"));
    }
    if let Some(phone) = &biz.phone {
        out.push_str(&format!("Phone: {phone}\n"));
    }
    out.push_str(&format!(
        "\nLooking forward to creating something unforgettable!\n— {owner_name}\n"
    ));
    out
}

/// Shared by delivery and the dashboard preview endpoint.
pub fn render_html(
    config: &AgentConfig,
    lead: &Lead,
    confirmed_time: &str,
    note: Option<&str>,
) -> String {
    let biz = &config.business;
    let owner_name = biz.owner_name.as_deref().unwrap_or(&biz.name);
    let event_type = lead.event_type().unwrap_or("your event");
    let primary_color = config
        .appearance
        .primary_color
        .as_deref()
        .unwrap_or("#C8A96E");

    let note_row = note
        .map(|n| format!(r#"<p style="font-size:14px;color:#B0A898;margin:8px 0 0;">Note: {n}</p>"#))
        .unwrap_or_default();

    let quote_card = lead
        .suggested_quote_range
        .map(|quote| {
            format!(
                r#"<table width="100%" cellpadding="0" cellspacing="0" style="background:#1E1E1E;border-radius:12px;border:1px solid #2A2A2A;margin:0 0 32px;">
  <tr><td style="padding:28px;">
    <p style="font-size:11px;font-weight:700;color:#706A60;text-transform:uppercase;letter-spacing:2px;margin:0 0 16px;">💰 Estimated Range</p>
    <p style="font-size:20px;font-weight:700;color:{primary_color};margin:0;">{} – {} CAD</p>
    <p style="font-size:13px;color:#706A60;margin:8px 0 0;">Final pricing confirmed after consultation</p>
  </td></tr>
</table>"#,
                format_money(quote.min()),
                format_money(quote.max())
            )
        })
        .unwrap_or_default();

    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="UTF-8"><meta name="viewport" content="width=device-width, initial-scale=1.0"></head>
<body style="margin:0;padding:0;background:#0A0A0A;font-family:Arial,Helvetica,sans-serif;">
<table width="100%" cellpadding="0" cellspacing="0" style="background:#0A0A0A;padding:40px 20px;">
  <tr><td align="center">
    <table width="600" cellpadding="0" cellspacing="0" style="background:#141414;border-radius:16px;overflow:hidden;border:1px solid #2A2A2A;">
      <tr><td style="background:linear-gradient(135deg,{primary_color},#A68B4B);padding:40px 40px 32px;text-align:center;">
        <h1 style="margin:0;font-size:28px;color:#0A0A0A;font-weight:700;letter-spacing:1px;">{biz_name}</h1>
        <p style="margin:8px 0 0;font-size:14px;color:rgba(10,10,10,0.7);">Consultation Confirmed</p>
      </td></tr>
      <tr><td style="padding:40px;">
        <p style="font-size:16px;color:#F5F0E8;line-height:1.7;margin:0 0 24px;">Hi {prospect_name},</p>
        <p style="font-size:15px;color:#B0A898;line-height:1.7;margin:0 0 32px;">
          Great news! {owner_name} has confirmed your consultation. We're looking forward to discussing {event_type} with you and creating something truly unforgettable.
        </p>
        <table width="100%" cellpadding="0" cellspacing="0" style="background:#1E1E1E;border-radius:12px;border:1px solid #2A2A2A;margin:0 0 32px;">
          <tr><td style="padding:28px;">
            <p style="font-size:11px;font-weight:700;color:#706A60;text-transform:uppercase;letter-spacing:2px;margin:0 0 16px;">📅 Your Consultation</p>
            <p style="font-size:20px;font-weight:700;color:{primary_color};margin:0 0 8px;">{confirmed_time}</p>
            <p style="font-size:14px;color:#B0A898;margin:0 0 4px;">Type: Personal consultation for {event_type}</p>
            <p style="font-size:14px;color:#B0A898;margin:0;">Duration: ~30 minutes</p>
            {note_row}
          </td></tr>
        </table>
        {quote_card}
        <p style="font-size:15px;color:#B0A898;line-height:1.7;margin:0 0 32px;">
          If you need to reschedule, please don't hesitate to reach out. We're flexible and want to make this as easy as possible for you.
        </p>
      </td></tr>
      <tr><td style="background:#0A0A0A;padding:24px 40px;text-align:center;border-top:1px solid #2A2A2A;">
        <p style="font-size:12px;color:#706A60;margin:0;">© {year} {biz_name} · Powered by AI Concierge</p>
      </td></tr>
    </table>
  </td></tr>
</table>
</body></html>"#,
        biz_name = biz.name,
        prospect_name = lead.display_name(),
        year = Utc::now().year(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::lead::{LeadSource, QuoteRange};
    use serde_json::json;

    fn fixture() -> (AgentConfig, Lead) {
        let mut config = AgentConfig::default();
        config.business.name = "Vamos Events".to_string();
        config.business.owner_name = Some("Maria".to_string());

        let mut lead = Lead::new("web-1".to_string(), LeadSource::Website, Utc::now());
        lead.collected_data
            .insert("name".to_string(), json!("Dana"));
        lead.collected_data
            .insert("email".to_string(), json!("dana@example.com"));
        lead.collected_data
            .insert("event_type".to_string(), json!("wedding"));
        lead.suggested_quote_range = Some(QuoteRange(5000, 9000));
        (config, lead)
    }

    #[tokio::test]
    async fn unconfigured_mailer_yields_unsent_receipt() {
        let (config, lead) = fixture();
        let mailer = Mailer::unconfigured();
        let receipt = mailer
            .send_confirmation(&config, &lead, "Friday 3pm", Some("bring photos"))
            .await
            .unwrap();
        assert_eq!(receipt.to, "dana@example.com");
        assert!(receipt.subject.contains("Vamos Events"));
        assert!(!receipt.sent);
    }

    #[tokio::test]
    async fn lead_without_email_is_skipped() {
        let (config, mut lead) = fixture();
        lead.collected_data.shift_remove("email");
        let mailer = Mailer::unconfigured();
        assert!(mailer
            .send_confirmation(&config, &lead, "Friday 3pm", None)
            .await
            .is_none());
    }

    #[test]
    fn plain_body_carries_quote_and_owner() {
        let (config, lead) = fixture();
        let plain = render_plain(&config, &lead, "Friday 3pm", None);
        assert!(plain.contains("Hi Dana,"));
        assert!(plain.contains("$5,000 - $9,000 CAD"));
        assert!(plain.contains("— Maria"));
    }

    #[test]
    fn html_uses_configured_primary_color() {
        let (mut config, lead) = fixture();
        config.appearance.primary_color = Some("#123456".to_string());
        let html = render_html(&config, &lead, "Friday 3pm", Some("bring photos"));
        assert!(html.contains("#123456"));
        assert!(html.contains("Note: bring photos"));
    }
}
