use serde_json::{json, Value};
use tracing::{info, warn};

const GRAPH_API_BASE: &str = "https://graph.facebook.com/v21.0";

#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub sender: String,
    /// `None` for stickers, audio, and other non-text payloads.
    pub text: Option<String>,
}

pub struct WhatsAppChannel {
    http: reqwest::Client,
    pub verify_token: String,
    pub agent_id: String,
    access_token: Option<String>,
    phone_number_id: Option<String>,
}

impl WhatsAppChannel {
    pub fn new(
        verify_token: String,
        agent_id: String,
        access_token: Option<String>,
        phone_number_id: Option<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            verify_token,
            agent_id,
            access_token,
            phone_number_id,
        }
    }

    /// `None` when the delivery carries no messages (e.g. status updates).
    pub fn parse_incoming(body: &Value) -> Option<IncomingMessage> {
        let message = body
            .get("entry")?
            .get(0)?
            .get("changes")?
            .get(0)?
            .get("value")?
            .get("messages")?
            .get(0)?;
        let sender = message.get("from")?.as_str()?.to_string();
        let text = if message.get("type").and_then(Value::as_str) == Some("text") {
            message
                .get("text")
                .and_then(|t| t.get("body"))
                .and_then(Value::as_str)
                .map(str::to_string)
        } else {
            None
        };
        Some(IncomingMessage { sender, text })
    }

    pub fn session_id(sender: &str) -> String {
        format!("wa-{sender}")
    }

    pub async fn send_text(&self, to: &str, text: &str) {
        let payload = json!({
            "messaging_product": "whatsapp",
            "to": to,
            "type": "text",
            "text": { "body": text },
        });
        self.post_message(to, payload).await;
    }

    pub async fn send_video(&self, to: &str, video_url: &str, caption: &str) {
        let payload = json!({
            "messaging_product": "whatsapp",
            "to": to,
            "type": "video",
            "video": { "link": video_url, "caption": caption },
        });
        self.post_message(to, payload).await;
    }

    async fn post_message(&self, to: &str, payload: Value) {
        let (Some(token), Some(phone_number_id)) = (&self.access_token, &self.phone_number_id)
        else {
            info!(to, "whatsapp credentials not configured, dropping outbound message");
            return;
        };
        let url = format!("{GRAPH_API_BASE}/{phone_number_id}/messages");
        match self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await
        {
            Ok(response) if !response.status().is_success() => {
                warn!(to, status = %response.status(), "whatsapp send rejected");
            }
            Ok(_) => {}
            Err(e) => warn!(to, error = %e, "whatsapp send failed"),
        }
    }
}
