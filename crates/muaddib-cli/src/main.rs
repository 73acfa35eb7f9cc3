mod classifier;
mod cli;
mod llm;
mod providers;
mod reducer;
mod summary;
mod tools;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use muaddib_agent::runner::ModelResolver;
use muaddib_agent::tools::artifacts::ArtifactStore;
use muaddib_agent::{AgentError, MessageHandler, ReplySender, RoomMessage, SessionRunner, SteeringQueue};
use muaddib_core::config::MuaddibConfig;
use muaddib_discord::{DiscordAdapter, DiscordAppContext};
use muaddib_irc::{IrcAdapter, IrcAppContext};
use muaddib_memory::manager::MemoryManager;
use muaddib_slack::{SlackAdapter, SlackAppContext};

use classifier::LlmClassifier;
use cli::Args;
use providers::DefaultModelResolver;
use reducer::LlmContextReducer;
use summary::ChronicleSummaryGenerator;
use tools::DefaultToolSetBuilder;

/// Bot display name used where a transport has no configured nick of its
/// own (Discord, Slack). Both transports filter their own bot's messages
/// before this ever matters for echo detection; it only shows up in
/// persisted history and logs.
const DEFAULT_MYNICK: &str = "muaddib";

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match MuaddibConfig::load(args.config.as_deref().and_then(Path::to_str)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("muaddib: configuration error: {e}");
            std::process::exit(1);
        }
    };

    init_logging();

    if let Err(e) = run(config, args.message).await {
        eprintln!("muaddib: {e}");
        std::process::exit(1);
    }
}

fn init_logging() {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    muaddib_core::logging::init(PathBuf::from(home).join(".muaddib").join("logs"));
}

async fn run(config: MuaddibConfig, one_shot_message: Option<String>) -> Result<(), anyhow::Error> {
    let config = Arc::new(config);

    if let Some(parent) = Path::new(&config.database.path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = rusqlite::Connection::open(&config.database.path)?;
    muaddib_memory::db::init_db(&conn)?;
    let memory = Arc::new(MemoryManager::new(conn));
    // `database.chronicle_path` is reserved for splitting chronicle storage
    // into its own file; today both live in `database.path`'s connection,
    // matching the only schema `muaddib_memory::db::init_db` defines.

    let resolver = Arc::new(DefaultModelResolver::new(config.providers.clone()));

    let artifacts = config
        .tools
        .artifacts
        .as_ref()
        .map(|a| Arc::new(ArtifactStore::new(a.path.clone(), a.url.clone())));

    let workdir = std::env::current_dir()?;
    let tool_set = Arc::new(DefaultToolSetBuilder::new(config.tools.clone(), Arc::clone(&resolver), artifacts.clone(), workdir));

    let steering = Arc::new(SteeringQueue::new());
    let runner = Arc::new(SessionRunner::new(muaddib_core::config::DEFAULT_MAX_ITERATIONS));

    let mut handler = MessageHandler::new(
        Arc::clone(&config),
        Arc::clone(&memory),
        steering,
        runner,
        resolver.clone() as Arc<dyn ModelResolver>,
        tool_set,
    );

    if let Some(reducer_cfg) = &config.context_reducer {
        handler = handler.with_context_reducer(Arc::new(LlmContextReducer::new(
            Arc::clone(&resolver),
            reducer_cfg.model.clone(),
            reducer_cfg.prompt.clone(),
        )));
    }

    if let Some(summary_cfg) = &config.tools.summary {
        handler = handler
            .with_summary_generator(Arc::new(ChronicleSummaryGenerator::new(Arc::clone(&resolver), summary_cfg.model.clone())));
    }

    if let Some(classifier_cfg) = first_mode_classifier(&config) {
        handler = handler.with_classifier(Arc::new(LlmClassifier::new(Arc::clone(&resolver), classifier_cfg.model.clone())));
    }

    if let Some(store) = &artifacts {
        handler = handler.with_artifacts(Arc::clone(store));
    }

    let handler = Arc::new(handler);

    if let Some(message) = one_shot_message {
        return run_one_shot(&handler, &message).await;
    }

    run_daemon(&config, handler).await
}

fn first_mode_classifier(config: &MuaddibConfig) -> Option<muaddib_core::config::ClassifierConfig> {
    config.rooms.values().find_map(|r| r.command.mode_classifier.clone())
}

async fn run_one_shot(handler: &Arc<MessageHandler>, message: &str) -> Result<(), anyhow::Error> {
    let reply = StdoutReplySender::default();

    let room_message = RoomMessage {
        server_tag: "cli".to_string(),
        channel_name: "cli".to_string(),
        nick: "operator".to_string(),
        mynick: DEFAULT_MYNICK.to_string(),
        content: message.to_string(),
        platform_id: None,
        thread_id: None,
        thread_starter_id: None,
        secrets: HashMap::new(),
    };

    handler.handle(room_message, &reply).await;

    if !reply.sent.load(std::sync::atomic::Ordering::SeqCst) {
        anyhow::bail!("no reply was produced");
    }
    Ok(())
}

#[derive(Default)]
struct StdoutReplySender {
    sent: std::sync::atomic::AtomicBool,
}

#[async_trait::async_trait]
impl ReplySender for StdoutReplySender {
    async fn send(&self, text: &str) -> Result<(), AgentError> {
        println!("{text}");
        self.sent.store(true, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }
}

async fn run_daemon(config: &Arc<MuaddibConfig>, handler: Arc<MessageHandler>) -> Result<(), anyhow::Error> {
    let mut running = false;

    if let Some(discord_cfg) = &config.channels.discord {
        let ctx = Arc::new(DiscordAppContext { handler: Arc::clone(&handler), mynick: DEFAULT_MYNICK.to_string() });
        let adapter = DiscordAdapter::new(discord_cfg, ctx);
        tokio::spawn(adapter.run());
        info!("Discord adapter started");
        running = true;
    }

    if let Some(slack_cfg) = &config.channels.slack {
        let ctx = Arc::new(SlackAppContext { handler: Arc::clone(&handler), mynick: DEFAULT_MYNICK.to_string() });
        let adapter = SlackAdapter::new(slack_cfg, ctx);
        tokio::spawn(adapter.run());
        info!("Slack adapter started");
        running = true;
    }

    if let Some(irc_cfg) = &config.channels.irc {
        let ctx = Arc::new(IrcAppContext::new(Arc::clone(&handler), irc_cfg.nick.clone()));
        let adapter = IrcAdapter::new(irc_cfg, ctx);
        tokio::spawn(adapter.run());
        info!("IRC adapter started for {}", irc_cfg.server_tag);
        running = true;
    }

    if !running {
        anyhow::bail!("no transport configured under [channels] — nothing to run");
    }

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    Ok(())
}
