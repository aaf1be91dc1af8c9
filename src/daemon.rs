use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::Utc;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info};
use uuid::Uuid;

use crate::channels::instagram::InstagramChannel;
use crate::channels::whatsapp::WhatsAppChannel;
use crate::channels::verify_subscription;
use crate::config::deep_merge;
use crate::domains::lead::{Lead, LeadSource, QuoteRange, TurnResult};
use crate::mailer::Mailer;
use crate::notify::Notifier;
use crate::services::agent::AgentService;
use crate::sessions::SessionLocks;
use crate::store::AgentStore;
use crate::training::TrainingKind;
use crate::{prompt, ConciergeError, Result};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<AgentStore>,
    pub agent: Arc<AgentService>,
    pub notifier: Arc<Notifier>,
    pub mailer: Arc<Mailer>,
    pub sessions: Arc<SessionLocks>,
    pub whatsapp: Option<Arc<WhatsAppChannel>>,
    pub instagram: Option<Arc<InstagramChannel>>,
    pub data_dir: String,
}

#[derive(Deserialize)]
struct ChatRequest {
    agent_id: String,
    session_id: Option<String>,
    message: String,
    #[serde(default)]
    source: LeadSource,
}

#[derive(Serialize)]
struct ChatResponse {
    session_id: String,
    message: String,
    lead_status: String,
    qualification_score: u8,
    suggested_quote_range: Option<QuoteRange>,
    ready_to_book: bool,
}

#[derive(Deserialize)]
struct ConfirmRequest {
    confirmed_time: String,
    note: Option<String>,
}

#[derive(Deserialize)]
struct RejectRequest {
    alternative_times: Option<Vec<String>>,
    #[allow(dead_code)]
    reason: Option<String>,
}

#[derive(Deserialize)]
struct ConfigUpdate {
    config: Value,
}

#[derive(Deserialize)]
struct TrainingSubmission {
    #[serde(rename = "type")]
    kind: String,
    data: Value,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(err: ConciergeError) -> Response {
    let status = match &err {
        ConciergeError::AgentNotFound(_)
        | ConciergeError::LeadNotFound(_)
        | ConciergeError::NotFound(_) => StatusCode::NOT_FOUND,
        ConciergeError::BadRequest(_) => StatusCode::BAD_REQUEST,
        ConciergeError::Conflict(_) => StatusCode::CONFLICT,
        _ => {
            error!(error = %err, "request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
        .into_response()
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(chat))
        .route("/api/agents/{agent_id}/leads", get(list_leads))
        .route("/api/agents/{agent_id}/leads/{lead_id}", get(get_lead))
        .route(
            "/api/agents/{agent_id}/leads/{lead_id}/confirm",
            post(confirm_meeting),
        )
        .route(
            "/api/agents/{agent_id}/leads/{lead_id}/reject",
            post(reject_meeting),
        )
        .route(
            "/api/agents/{agent_id}/leads/{lead_id}/email-preview",
            get(email_preview),
        )
        .route(
            "/api/agents/{agent_id}/config",
            get(get_config).put(update_config).post(create_agent),
        )
        .route(
            "/api/agents/{agent_id}/training",
            get(get_training).post(add_training),
        )
        .route(
            "/api/agents/{agent_id}/training/{kind}/{index}",
            delete(delete_training),
        )
        .route("/api/agents/{agent_id}/prompt-preview", get(prompt_preview))
        .route(
            "/api/webhook/whatsapp",
            get(whatsapp_verify).post(whatsapp_incoming),
        )
        .route(
            "/api/webhook/instagram",
            get(instagram_verify).post(instagram_incoming),
        )
        .route("/api/health", get(health))
        .with_state(state)
}

/// Lock the session, load or create the lead, ask the backend, merge,
/// persist, notify.
async fn run_turn(
    state: &AppState,
    agent_id: &str,
    session_id: &str,
    source: LeadSource,
    text: &str,
    seed_data: IndexMap<String, Value>,
    event_prefix: &str,
) -> Result<(Lead, TurnResult)> {
    let _guard = state.sessions.acquire(agent_id, session_id).await;

    let now = Utc::now();
    let mut lead = match state.store.lead(agent_id, session_id).await? {
        Some(lead) => lead,
        None => {
            let mut lead = Lead::new(session_id.to_string(), source, now);
            lead.collected_data.extend(seed_data);
            lead
        }
    };

    let turn = state.agent.invoke(agent_id, &lead, text).await?;
    let change = lead.apply_turn(text, &turn, Utc::now());
    state.store.save_lead(agent_id, &lead).await?;

    if let Some(change) = change {
        let event = format!(
            "{event_prefix} {}",
            change.current.as_str().replace('_', " ")
        );
        let store = state.store.clone();
        let notifier = state.notifier.clone();
        let agent_id = agent_id.to_string();
        let snapshot = lead.clone();
        tokio::spawn(async move {
            if let Ok(config) = store.config(&agent_id).await {
                notifier
                    .notify_status_change(&config, &snapshot, &event)
                    .await;
            }
        });
    }

    Ok((lead, turn))
}

async fn chat(State(state): State<AppState>, Json(req): Json<ChatRequest>) -> Response {
    let session_id = req
        .session_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    match run_turn(
        &state,
        &req.agent_id,
        &session_id,
        req.source,
        &req.message,
        IndexMap::new(),
        "Lead",
    )
    .await
    {
        Ok((lead, turn)) => (
            StatusCode::OK,
            Json(ChatResponse {
                session_id,
                message: turn.message,
                lead_status: lead.lead_status.to_string(),
                qualification_score: lead.qualification_score,
                suggested_quote_range: lead.suggested_quote_range,
                ready_to_book: lead.ready_to_book,
            }),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

async fn list_leads(State(state): State<AppState>, Path(agent_id): Path<String>) -> Response {
    let mut leads = match state.store.leads(&agent_id).await {
        Ok(leads) => leads,
        Err(e) => return error_response(e),
    };
    leads.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

    let summaries: Vec<Value> = leads
        .iter()
        .filter_map(|lead| {
            let mut value = serde_json::to_value(lead).ok()?;
            if let Some(map) = value.as_object_mut() {
                map.remove("messages");
                map.insert("message_count".to_string(), json!(lead.messages.len()));
            }
            Some(value)
        })
        .collect();

    (
        StatusCode::OK,
        Json(json!({ "leads": summaries, "total": summaries.len() })),
    )
        .into_response()
}

async fn get_lead(
    State(state): State<AppState>,
    Path((agent_id, lead_id)): Path<(String, String)>,
) -> Response {
    match state.store.lead(&agent_id, &lead_id).await {
        Ok(Some(lead)) => (StatusCode::OK, Json(lead)).into_response(),
        Ok(None) => error_response(ConciergeError::LeadNotFound(lead_id)),
        Err(e) => error_response(e),
    }
}

async fn confirm_meeting(
    State(state): State<AppState>,
    Path((agent_id, lead_id)): Path<(String, String)>,
    Json(req): Json<ConfirmRequest>,
) -> Response {
    let _guard = state.sessions.acquire(&agent_id, &lead_id).await;

    let mut lead = match state.store.lead(&agent_id, &lead_id).await {
        Ok(Some(lead)) => lead,
        Ok(None) => return error_response(ConciergeError::LeadNotFound(lead_id)),
        Err(e) => return error_response(e),
    };

    lead.confirm(req.confirmed_time.clone(), req.note.clone(), Utc::now());
    if let Err(e) = state.store.save_lead(&agent_id, &lead).await {
        return error_response(e);
    }
    drop(_guard);

    let has_email = lead.email().is_some();
    if has_email {
        let state = state.clone();
        let agent_id = agent_id.clone();
        let confirmed_time = req.confirmed_time.clone();
        let note = req.note.clone();
        let lead_id = lead.id.clone();
        tokio::spawn(async move {
            let Ok(config) = state.store.config(&agent_id).await else {
                return;
            };
            let _guard = state.sessions.acquire(&agent_id, &lead_id).await;
            let Ok(Some(mut lead)) = state.store.lead(&agent_id, &lead_id).await else {
                return;
            };
            let receipt = state
                .mailer
                .send_confirmation(&config, &lead, &confirmed_time, note.as_deref())
                .await;
            if let Some(receipt) = receipt {
                lead.confirmation_email = Some(receipt);
                lead.updated_at = Utc::now();
                if let Err(e) = state.store.save_lead(&agent_id, &lead).await {
                    error!(lead = %lead.id, error = %e, "failed to record email receipt");
                }
            }
        });
    }

    (
        StatusCode::OK,
        Json(json!({
            "status": "confirmed",
            "confirmed_time": req.confirmed_time,
            "email_sent": has_email,
        })),
    )
        .into_response()
}

async fn reject_meeting(
    State(state): State<AppState>,
    Path((agent_id, lead_id)): Path<(String, String)>,
    Json(req): Json<RejectRequest>,
) -> Response {
    let _guard = state.sessions.acquire(&agent_id, &lead_id).await;

    let mut lead = match state.store.lead(&agent_id, &lead_id).await {
        Ok(Some(lead)) => lead,
        Ok(None) => return error_response(ConciergeError::LeadNotFound(lead_id)),
        Err(e) => return error_response(e),
    };

    lead.reject(Utc::now());
    if let Err(e) = state.store.save_lead(&agent_id, &lead).await {
        return error_response(e);
    }

    (
        StatusCode::OK,
        Json(json!({ "status": "alternatives_sent", "times": req.alternative_times })),
    )
        .into_response()
}

/// Renders the confirmation email for the dashboard, with a placeholder slot
/// when the meeting is not confirmed yet.
async fn email_preview(
    State(state): State<AppState>,
    Path((agent_id, lead_id)): Path<(String, String)>,
) -> Response {
    let lead = match state.store.lead(&agent_id, &lead_id).await {
        Ok(Some(lead)) => lead,
        Ok(None) => return error_response(ConciergeError::LeadNotFound(lead_id)),
        Err(e) => return error_response(e),
    };
    let config = match state.store.config(&agent_id).await {
        Ok(config) => config,
        Err(e) => return error_response(e),
    };
    let confirmed_time = lead
        .confirmed_time
        .clone()
        .unwrap_or_else(|| "Tuesday, March 4th at 2:00 PM ET".to_string());
    let html = crate::mailer::render_html(
        &config,
        &lead,
        &confirmed_time,
        lead.confirmation_note.as_deref(),
    );
    (StatusCode::OK, axum::response::Html(html)).into_response()
}

async fn get_config(State(state): State<AppState>, Path(agent_id): Path<String>) -> Response {
    match state.store.config_value(&agent_id).await {
        Ok(Some(config)) => (StatusCode::OK, Json(config)).into_response(),
        Ok(None) => error_response(ConciergeError::AgentNotFound(agent_id)),
        Err(e) => error_response(e),
    }
}

async fn update_config(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    Json(req): Json<ConfigUpdate>,
) -> Response {
    let mut config = match state.store.config_value(&agent_id).await {
        Ok(Some(existing)) => existing,
        Ok(None) => json!({}),
        Err(e) => return error_response(e),
    };
    deep_merge(&mut config, &req.config);
    if let Some(map) = config.as_object_mut() {
        map.insert("updated_at".to_string(), json!(Utc::now()));
    }
    match state.store.save_config_value(&agent_id, &config).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "status": "updated", "agent_id": agent_id })),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

async fn create_agent(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    Json(req): Json<ConfigUpdate>,
) -> Response {
    match state.store.config_value(&agent_id).await {
        Ok(Some(_)) => {
            return error_response(ConciergeError::Conflict(format!(
                "agent '{agent_id}' already exists"
            )))
        }
        Ok(None) => {}
        Err(e) => return error_response(e),
    }
    let mut config = req.config;
    if let Some(map) = config.as_object_mut() {
        map.insert("created_at".to_string(), json!(Utc::now()));
        map.insert("updated_at".to_string(), json!(Utc::now()));
    }
    match state.store.save_config_value(&agent_id, &config).await {
        Ok(()) => (
            StatusCode::CREATED,
            Json(json!({ "status": "created", "agent_id": agent_id })),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

async fn get_training(State(state): State<AppState>, Path(agent_id): Path<String>) -> Response {
    match state.store.training(&agent_id).await {
        Ok(training) => (StatusCode::OK, Json(training)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn add_training(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    Json(req): Json<TrainingSubmission>,
) -> Response {
    let kind = match TrainingKind::parse(&req.kind) {
        Ok(kind) => kind,
        Err(e) => return error_response(e),
    };
    let mut training = match state.store.training(&agent_id).await {
        Ok(training) => training,
        Err(e) => return error_response(e),
    };
    if let Err(e) = training.add(kind, req.data, Utc::now()) {
        return error_response(e);
    }
    let total = match kind {
        TrainingKind::Example => training.examples.len(),
        TrainingKind::Correction => training.corrections.len(),
        TrainingKind::Rule => training.rules.len(),
        TrainingKind::Faq => training.faq.len(),
    };
    match state.store.save_training(&agent_id, &training).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "status": "added", "type": kind.as_str(), "total": total })),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

async fn delete_training(
    State(state): State<AppState>,
    Path((agent_id, kind, index)): Path<(String, String, usize)>,
) -> Response {
    let kind = match TrainingKind::parse(&kind) {
        Ok(kind) => kind,
        Err(e) => return error_response(e),
    };
    let mut training = match state.store.training(&agent_id).await {
        Ok(training) => training,
        Err(e) => return error_response(e),
    };
    if let Err(e) = training.delete(kind, index) {
        return error_response(e);
    }
    match state.store.save_training(&agent_id, &training).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "deleted" }))).into_response(),
        Err(e) => error_response(e),
    }
}

async fn prompt_preview(State(state): State<AppState>, Path(agent_id): Path<String>) -> Response {
    match state.agent.system_prompt(&agent_id).await {
        Ok(document) => {
            let estimate = prompt::token_estimate(&document);
            (
                StatusCode::OK,
                Json(json!({ "prompt": document, "token_estimate": estimate })),
            )
                .into_response()
        }
        Err(e) => error_response(e),
    }
}

async fn whatsapp_verify(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Some(channel) = &state.whatsapp else {
        return error_response(ConciergeError::NotFound("whatsapp channel".to_string()));
    };
    match verify_subscription(
        &channel.verify_token,
        params.get("hub.mode").map(String::as_str),
        params.get("hub.verify_token").map(String::as_str),
        params.get("hub.challenge").map(String::as_str),
    ) {
        Some(challenge) => {
            info!("whatsapp webhook verified");
            (StatusCode::OK, challenge.to_string()).into_response()
        }
        None => (
            StatusCode::FORBIDDEN,
            Json(ErrorResponse {
                error: "verification failed".to_string(),
            }),
        )
            .into_response(),
    }
}

async fn whatsapp_incoming(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    let Some(channel) = state.whatsapp.clone() else {
        return error_response(ConciergeError::NotFound("whatsapp channel".to_string()));
    };

    let Some(incoming) = WhatsAppChannel::parse_incoming(&body) else {
        return (StatusCode::OK, Json(json!({ "status": "no_messages" }))).into_response();
    };

    let Some(text) = incoming.text else {
        channel
            .send_text(
                &incoming.sender,
                "Thanks for reaching out! I work best with text messages. \
                 Could you type out what you're looking for? 😊",
            )
            .await;
        return (StatusCode::OK, Json(json!({ "status": "non_text_skipped" }))).into_response();
    };

    let session_id = WhatsAppChannel::session_id(&incoming.sender);
    let agent_id = channel.agent_id.clone();

    // First contact gets the personal intro video when one is configured.
    let is_new = matches!(state.store.lead(&agent_id, &session_id).await, Ok(None));
    if is_new {
        if let Ok(config) = state.store.config(&agent_id).await {
            if let Some(video_url) = &config.business.video_url {
                channel
                    .send_video(
                        &incoming.sender,
                        video_url,
                        &format!(
                            "👋 Welcome to {}! Watch this quick personal intro from our team.",
                            config.business.name
                        ),
                    )
                    .await;
            }
        }
    }

    let seed = IndexMap::from([("phone".to_string(), json!(incoming.sender))]);
    match run_turn(
        &state,
        &agent_id,
        &session_id,
        LeadSource::Whatsapp,
        &text,
        seed,
        "WhatsApp lead",
    )
    .await
    {
        Ok((_, turn)) => {
            channel.send_text(&incoming.sender, &turn.message).await;
            (StatusCode::OK, Json(json!({ "status": "replied" }))).into_response()
        }
        // Meta retries on non-2xx, so processing failures are reported in
        // the body instead.
        Err(e) => (
            StatusCode::OK,
            Json(json!({ "status": "error", "detail": e.to_string() })),
        )
            .into_response(),
    }
}

async fn instagram_verify(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Some(channel) = &state.instagram else {
        return error_response(ConciergeError::NotFound("instagram channel".to_string()));
    };
    match verify_subscription(
        &channel.verify_token,
        params.get("hub.mode").map(String::as_str),
        params.get("hub.verify_token").map(String::as_str),
        params.get("hub.challenge").map(String::as_str),
    ) {
        Some(challenge) => {
            info!("instagram webhook verified");
            (StatusCode::OK, challenge.to_string()).into_response()
        }
        None => (
            StatusCode::FORBIDDEN,
            Json(ErrorResponse {
                error: "verification failed".to_string(),
            }),
        )
            .into_response(),
    }
}

async fn instagram_incoming(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    let Some(channel) = state.instagram.clone() else {
        return error_response(ConciergeError::NotFound("instagram channel".to_string()));
    };

    let Some(dm) = InstagramChannel::parse_incoming(&body) else {
        return (StatusCode::OK, Json(json!({ "status": "no_messages" }))).into_response();
    };

    let Some(text) = dm.text else {
        channel
            .send_text(
                &dm.sender,
                "Thanks for reaching out! Could you tell me a bit about what you're looking for? 😊",
            )
            .await;
        return (StatusCode::OK, Json(json!({ "status": "non_text_handled" }))).into_response();
    };

    let session_id = InstagramChannel::session_id(&dm.sender);
    match run_turn(
        &state,
        &channel.agent_id,
        &session_id,
        LeadSource::Instagram,
        &text,
        IndexMap::new(),
        "Instagram lead",
    )
    .await
    {
        Ok((_, turn)) => {
            channel.send_text(&dm.sender, &turn.message).await;
            (StatusCode::OK, Json(json!({ "status": "replied" }))).into_response()
        }
        Err(e) => (
            StatusCode::OK,
            Json(json!({ "status": "error", "detail": e.to_string() })),
        )
            .into_response(),
    }
}

async fn health(State(state): State<AppState>) -> Response {
    let agents = state.store.list_agents().await.unwrap_or_default();
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "api_configured": state.agent.backend_configured(),
            "data_dir": state.data_dir,
            "agents": agents,
        })),
    )
        .into_response()
}

pub async fn run(state: AppState, host: &str, port: u16) -> Result<()> {
    run_with_shutdown(state, host, port, futures::future::pending::<()>()).await
}

pub async fn run_with_shutdown<F>(state: AppState, host: &str, port: u16, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(state);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ConciergeError::Runtime(e.to_string()))?;
    info!(addr, "concierge listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ConciergeError::Runtime(e.to_string()))?;

    Ok(())
}
