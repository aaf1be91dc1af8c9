use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use concierge::daemon::{self, AppState};
use concierge::channels::instagram::InstagramChannel;
use concierge::channels::whatsapp::WhatsAppChannel;
use concierge::logging::init_tracing;
use concierge::mailer::Mailer;
use concierge::notify::Notifier;
use concierge::providers::openai::OpenAiProvider;
use concierge::providers::LlmProvider;
use concierge::services::agent::AgentService;
use concierge::sessions::SessionLocks;
use concierge::store::{AgentStore, FsStore, KeyValueStore};
use concierge::Result;

#[derive(Parser, Debug)]
#[command(
    name = "concierged",
    about = "Multi-tenant AI concierge daemon for lead qualification"
)]
struct Cli {
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    #[arg(long, default_value_t = 8000, env = "PORT")]
    port: u16,
    #[arg(long, default_value = "./data", env = "CONCIERGE_DATA_DIR")]
    data_dir: PathBuf,
    /// Directory of per-agent seed folders (config.json, training.json)
    /// loaded on boot for agents that do not exist yet.
    #[arg(long, env = "CONCIERGE_SEED_DIR")]
    seed_dir: Option<PathBuf>,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,
    #[arg(long, env = "CONCIERGE_MODEL")]
    model: Option<String>,
    #[arg(long, env = "CONCIERGE_OPENAI_BASE_URL")]
    openai_base_url: Option<String>,

    #[arg(long, env = "MAIL_API_URL")]
    mail_api_url: Option<String>,
    #[arg(long, env = "MAIL_API_KEY", hide_env_values = true)]
    mail_api_key: Option<String>,
    #[arg(long, env = "MAIL_FROM_NAME")]
    mail_from_name: Option<String>,

    #[arg(long, env = "WHATSAPP_VERIFY_TOKEN", default_value = "concierge-verify-token")]
    whatsapp_verify_token: String,
    #[arg(long, env = "WHATSAPP_ACCESS_TOKEN", hide_env_values = true)]
    whatsapp_access_token: Option<String>,
    #[arg(long, env = "WHATSAPP_PHONE_NUMBER_ID")]
    whatsapp_phone_number_id: Option<String>,
    #[arg(long, env = "WHATSAPP_AGENT_ID", default_value = "vamos-events")]
    whatsapp_agent_id: String,

    #[arg(long, env = "INSTAGRAM_VERIFY_TOKEN", default_value = "concierge-verify-token")]
    instagram_verify_token: String,
    #[arg(long, env = "INSTAGRAM_ACCESS_TOKEN", hide_env_values = true)]
    instagram_access_token: Option<String>,
    #[arg(long, env = "INSTAGRAM_AGENT_ID", default_value = "vamos-events")]
    instagram_agent_id: String,
}

async fn seed_agents(store: &AgentStore, seed_dir: &Path) -> Result<()> {
    let entries = match std::fs::read_dir(seed_dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %seed_dir.display(), error = %e, "seed directory unreadable, skipping");
            return Ok(());
        }
    };
    for entry in entries.flatten() {
        if !entry.path().is_dir() {
            continue;
        }
        let agent_id = entry.file_name().to_string_lossy().to_string();
        if store.config_value(&agent_id).await?.is_some() {
            continue;
        }
        let config_path = entry.path().join("config.json");
        let Ok(raw) = std::fs::read_to_string(&config_path) else {
            continue;
        };
        match serde_json::from_str(&raw) {
            Ok(config) => {
                store.save_config_value(&agent_id, &config).await?;
                info!(agent = %agent_id, "seeded config");
            }
            Err(e) => {
                warn!(agent = %agent_id, error = %e, "seed config unparsable, skipping");
                continue;
            }
        }
        let training_path = entry.path().join("training.json");
        if let Ok(raw) = std::fs::read_to_string(&training_path) {
            match serde_json::from_str(&raw) {
                Ok(training) => {
                    store.save_training(&agent_id, &training).await?;
                    info!(agent = %agent_id, "seeded training data");
                }
                Err(e) => warn!(agent = %agent_id, error = %e, "seed training unparsable"),
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing("concierged");

    let kv: Arc<dyn KeyValueStore> = Arc::new(FsStore::new(&cli.data_dir));
    let store = Arc::new(AgentStore::new(kv));

    if let Some(seed_dir) = &cli.seed_dir {
        seed_agents(&store, seed_dir).await?;
    }

    let provider: Option<Arc<dyn LlmProvider>> = match cli.openai_api_key {
        Some(api_key) => Some(Arc::new(OpenAiProvider::new(
            api_key,
            cli.model,
            cli.openai_base_url,
        ))),
        None => {
            warn!("no backend credential configured, running in demo mode");
            None
        }
    };

    let agent = Arc::new(AgentService::new(store.clone(), provider));

    let whatsapp = Some(Arc::new(WhatsAppChannel::new(
        cli.whatsapp_verify_token,
        cli.whatsapp_agent_id,
        cli.whatsapp_access_token,
        cli.whatsapp_phone_number_id,
    )));
    let instagram = Some(Arc::new(InstagramChannel::new(
        cli.instagram_verify_token,
        cli.instagram_agent_id,
        cli.instagram_access_token,
    )));

    let state = AppState {
        store: store.clone(),
        agent,
        notifier: Arc::new(Notifier::new()),
        mailer: Arc::new(Mailer::new(
            cli.mail_api_url,
            cli.mail_api_key,
            cli.mail_from_name,
        )),
        sessions: Arc::new(SessionLocks::new()),
        whatsapp,
        instagram,
        data_dir: cli.data_dir.display().to_string(),
    };

    let agents = store.list_agents().await.unwrap_or_default();
    info!(count = agents.len(), ?agents, "concierge ready");

    daemon::run(state, &cli.host, cli.port).await
}
