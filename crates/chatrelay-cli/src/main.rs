mod config;

use chatrelay_agent::GenerationGateway;
use chatrelay_channels::{Channel, Dispatcher, TelegramChannel};
use chatrelay_core::UserId;
use chatrelay_session::{
    FileHistoryStore, HistoryStore, SessionManager, SqliteHistoryStore,
};
use clap::{Parser, Subcommand, ValueEnum};
use config::{RelayConfig, StoreBackend};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "chatrelay", about = "Chat relay between Telegram and a language model")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "chatrelay.toml")]
    config: PathBuf,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Json)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Json,
    Pretty,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the Telegram bot
    Serve,
    /// Send one message as a user and print the reply
    Ask {
        #[arg(long)]
        user: i64,
        /// Message text
        text: String,
    },
    /// Show or replace a user's role
    Role {
        #[arg(long)]
        user: i64,
        /// New role; clears the user's history
        #[arg(long)]
        set: Option<String>,
    },
    /// Forget a user's role and history
    Clear {
        #[arg(long)]
        user: i64,
    },
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

async fn open_store(config: &RelayConfig) -> anyhow::Result<Arc<dyn HistoryStore>> {
    let store: Arc<dyn HistoryStore> = match config.store.backend {
        StoreBackend::Sqlite => Arc::new(SqliteHistoryStore::open(&config.store.path)?),
        StoreBackend::File => Arc::new(FileHistoryStore::new(config.store.path.clone()).await?),
    };
    info!(
        backend = ?config.store.backend,
        path = %config.store.path.display(),
        "History store opened"
    );
    Ok(store)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let mut config = RelayConfig::load(&cli.config).await?;
    config.apply_env(|var| std::env::var(var).ok());
    config.validate()?;

    let store = open_store(&config).await?;
    let gateway = Arc::new(GenerationGateway::new(config.model.clone()));
    info!(
        backend = gateway.backend_name(),
        model = %config.model.model_id,
        "Generation backend ready"
    );
    let sessions = Arc::new(SessionManager::new(
        store,
        gateway,
        config.session.clone(),
    )?);

    match cli.command {
        Commands::Serve => serve(&config, sessions).await?,
        Commands::Ask { user, text } => {
            let reply = sessions.handle_turn(UserId(user), &text).await?;
            println!("{}", reply.text);
            if let Some(tokens) = reply.token_usage {
                eprintln!("Tokens used: {tokens}");
            }
        }
        Commands::Role { user, set: Some(role) } => {
            sessions.set_role(UserId(user), &role).await?;
            println!("New role set: {role}");
        }
        Commands::Role { user, set: None } => match sessions.get_role(UserId(user)).await? {
            Some(role) => println!("{role}"),
            None => println!("No role set."),
        },
        Commands::Clear { user } => {
            sessions.clear_history(UserId(user)).await?;
            println!("History cleared.");
        }
    }

    Ok(())
}

async fn serve(config: &RelayConfig, sessions: Arc<SessionManager>) -> anyhow::Result<()> {
    config.validate_for_serve()?;

    let mut telegram = TelegramChannel::new(config.telegram.bot_token.clone(), 256)
        .with_poll_timeout(config.telegram.poll_timeout_secs);
    let events = telegram
        .take_event_receiver()
        .ok_or_else(|| anyhow::anyhow!("Telegram event receiver already taken"))?;
    let telegram = Arc::new(telegram);

    let channel: Arc<dyn Channel> = telegram.clone();
    let dispatcher = Arc::new(Dispatcher::new(
        sessions,
        channel,
        config.telegram.dispatcher(),
    ));
    let dispatch = tokio::spawn(dispatcher.run(events));

    info!("chatrelay started, polling Telegram");
    tokio::select! {
        result = telegram.poll_updates() => {
            if let Err(e) = &result {
                error!(error = %e, "Telegram polling stopped");
            }
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested");
        }
    }

    dispatch.abort();
    Ok(())
}
