use serde_json::{json, Value};
use tracing::{info, warn};

const GRAPH_SEND_URL: &str = "https://graph.facebook.com/v21.0/me/messages";

#[derive(Debug, Clone)]
pub struct IncomingDm {
    pub sender: String,
    pub text: Option<String>,
}

pub struct InstagramChannel {
    http: reqwest::Client,
    pub verify_token: String,
    pub agent_id: String,
    access_token: Option<String>,
}

impl InstagramChannel {
    pub fn new(verify_token: String, agent_id: String, access_token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            verify_token,
            agent_id,
            access_token,
        }
    }

    /// Echoes of our own outbound messages come back through the webhook
    /// too and are dropped here.
    pub fn parse_incoming(body: &Value) -> Option<IncomingDm> {
        let event = body.get("entry")?.get(0)?.get("messaging")?.get(0)?;
        if event
            .get("message")
            .and_then(|m| m.get("is_echo"))
            .and_then(Value::as_bool)
            == Some(true)
        {
            return None;
        }
        let sender = event.get("sender")?.get("id")?.as_str()?.to_string();
        let text = event
            .get("message")
            .and_then(|m| m.get("text"))
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        Some(IncomingDm { sender, text })
    }

    pub fn session_id(sender: &str) -> String {
        format!("ig-{sender}")
    }

    pub async fn send_text(&self, recipient_id: &str, text: &str) {
        let Some(token) = &self.access_token else {
            info!(recipient_id, "instagram credentials not configured, dropping outbound message");
            return;
        };
        let payload = json!({
            "recipient": { "id": recipient_id },
            "message": { "text": text },
        });
        match self
            .http
            .post(GRAPH_SEND_URL)
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await
        {
            Ok(response) if !response.status().is_success() => {
                warn!(recipient_id, status = %response.status(), "instagram send rejected");
            }
            Ok(_) => {}
            Err(e) => warn!(recipient_id, error = %e, "instagram send failed"),
        }
    }
}
