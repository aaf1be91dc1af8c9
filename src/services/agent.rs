use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::domains::lead::{Lead, TurnResult};
use crate::providers::{ChatMessage, ChatRole, LlmProvider};
use crate::prompt;
use crate::store::AgentStore;
use crate::Result;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A reply wrapped in a Markdown code fence, optionally language-tagged.
static FENCED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```[a-zA-Z0-9_-]*[ \t]*\r?\n?(.*?)\r?\n?```\s*$").expect("fence pattern")
});

/// Runs conversation turns for a tenant. Apart from an unknown agent id this
/// never fails; backend trouble degrades to a canned reply.
pub struct AgentService {
    store: Arc<AgentStore>,
    provider: Option<Arc<dyn LlmProvider>>,
    timeout: Duration,
}

impl AgentService {
    pub fn new(store: Arc<AgentStore>, provider: Option<Arc<dyn LlmProvider>>) -> Self {
        Self {
            store,
            provider,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn backend_configured(&self) -> bool {
        self.provider.is_some()
    }

    pub async fn system_prompt(&self, agent_id: &str) -> Result<String> {
        let config = self.store.config(agent_id).await?;
        let training = self.store.training(agent_id).await?;
        prompt::compile(agent_id, &config, &training)
    }

    pub async fn invoke(
        &self,
        agent_id: &str,
        lead: &Lead,
        user_message: &str,
    ) -> Result<TurnResult> {
        let system_prompt = self.system_prompt(agent_id).await?;

        let Some(provider) = &self.provider else {
            return Ok(demo_turn());
        };

        let mut messages: Vec<ChatMessage> = lead
            .messages
            .iter()
            .map(|turn| ChatMessage {
                role: if turn.role == "assistant" {
                    ChatRole::Assistant
                } else {
                    ChatRole::User
                },
                content: turn.content.clone(),
            })
            .collect();

        let mut content = String::new();
        if !lead.collected_data.is_empty() {
            let collected =
                serde_json::to_string(&lead.collected_data).unwrap_or_else(|_| "{}".to_string());
            content.push_str(&format!("[SYSTEM: Data collected so far: {collected}]\n\n"));
        }
        content.push_str(user_message);
        messages.push(ChatMessage {
            role: ChatRole::User,
            content,
        });

        let call = provider.chat(&system_prompt, &messages);
        let raw = match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                warn!(agent = agent_id, lead = %lead.id, error = %e, "backend call failed");
                return Ok(call_failure_turn(lead, &e.to_string()));
            }
            Err(_) => {
                warn!(agent = agent_id, lead = %lead.id, "backend call timed out");
                return Ok(call_failure_turn(lead, "request timed out"));
            }
        };

        let raw = raw.trim();
        let unwrapped = strip_fence(raw);
        match serde_json::from_str::<TurnResult>(unwrapped) {
            Ok(turn) => Ok(turn),
            Err(e) => {
                debug!(agent = agent_id, lead = %lead.id, error = %e, "reply was not valid JSON");
                Ok(parse_failure_turn(lead, unwrapped))
            }
        }
    }
}

fn strip_fence(raw: &str) -> &str {
    match FENCED.captures(raw) {
        Some(captures) => captures.get(1).map(|m| m.as_str().trim()).unwrap_or(raw),
        None => raw,
    }
}

fn demo_turn() -> TurnResult {
    TurnResult {
        message: "Thanks for reaching out! I'd love to learn about your event. What are you planning?"
            .to_string(),
        lead_status: Some("gathering_info".to_string()),
        qualification_score: Some(10),
        qualification_notes: Some("Demo mode".to_string()),
        ..TurnResult::default()
    }
}

/// Non-JSON replies are relayed as-is; the lead keeps its current standing.
fn parse_failure_turn(lead: &Lead, raw: &str) -> TurnResult {
    TurnResult {
        message: raw.to_string(),
        lead_status: Some(lead.lead_status.to_string()),
        qualification_score: Some(lead.qualification_score),
        qualification_notes: Some("JSON parse failed".to_string()),
        ..TurnResult::default()
    }
}

fn call_failure_turn(lead: &Lead, error: &str) -> TurnResult {
    TurnResult {
        message: "I appreciate your patience! Could you try that again?".to_string(),
        lead_status: Some(lead.lead_status.to_string()),
        qualification_score: Some(lead.qualification_score),
        qualification_notes: Some(format!("Error: {error}")),
        ..TurnResult::default()
    }
}
