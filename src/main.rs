mod commands;
mod gateway;

use clap::{Parser, Subcommand};
use habitual_channels::telegram::TelegramChannel;
use habitual_core::{
    clock::SystemClock,
    config::{self, shellexpand, Config},
    traits::{Channel, Clock},
};
use habitual_engine::{MembershipCache, Scheduler, Stats};
use habitual_memory::Store;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use gateway::{
    access::AccessGate,
    conversation::{Conversations, CONFIRM_TIMEOUT},
    Gateway,
};

#[derive(Parser)]
#[command(
    name = "habitual",
    version,
    about = "Habitual: habit tracking bot with daily reminders"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file.
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bot.
    Start,
    /// Show configuration and store health.
    Status,
}

/// Console plus a daily log file under `{data_dir}/logs`. `RUST_LOG` wins
/// over the configured level.
fn init_logging(cfg: &Config) -> anyhow::Result<WorkerGuard> {
    let log_dir = PathBuf::from(shellexpand(&cfg.habitual.data_dir)).join("logs");
    std::fs::create_dir_all(&log_dir)?;
    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(&log_dir, "habitual.log"));

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cfg.habitual.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .try_init()?;
    Ok(guard)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load(&cli.config)?;

    match cli.command {
        Commands::Start => {
            let _guard = init_logging(&cfg)?;
            start(cfg).await?;
        }
        Commands::Status => status(&cli.config, &cfg).await?,
    }

    Ok(())
}

async fn start(cfg: Config) -> anyhow::Result<()> {
    let tz = cfg.habits.tz()?;

    let tg = match cfg.channel.telegram {
        Some(ref tg) if tg.enabled => tg.clone(),
        _ => anyhow::bail!("Telegram is not enabled. Enable [channel.telegram] in config.toml."),
    };
    if tg.bot_token.is_empty() {
        anyhow::bail!(
            "Telegram is enabled but bot_token is empty. \
             Set it in config.toml or the {} env var.",
            config::BOT_TOKEN_ENV
        );
    }
    // One bot serves as command channel, reminder sink, and membership authority.
    let telegram = Arc::new(TelegramChannel::new(tg));
    let mut channels: HashMap<String, Arc<dyn Channel>> = HashMap::new();
    channels.insert("telegram".to_string(), telegram.clone());

    let store = Store::new(&cfg.memory).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let scheduler = Scheduler::new(
        store.clone(),
        telegram.clone(),
        clock.clone(),
        tz,
        cfg.scheduler.clone(),
    );
    if cfg.scheduler.enabled {
        scheduler.start().await?;
    } else {
        info!("reminder scheduler disabled");
    }

    let access = if cfg.membership.is_enabled() {
        let cache =
            MembershipCache::from_config(store.clone(), telegram, clock.clone(), &cfg.membership);
        AccessGate::new(cache, &cfg.membership)
    } else {
        AccessGate::disabled()
    };

    let stats = Stats::new(store.clone(), clock.clone(), tz);
    let conversations = Conversations::new(clock, CONFIRM_TIMEOUT);

    println!("{} starting...", cfg.habitual.name);
    let gw = Arc::new(Gateway::new(
        channels,
        store,
        scheduler,
        stats,
        access,
        conversations,
        tz,
        cfg.habits.stats_window_days,
    ));
    gw.run().await
}

async fn status(config_path: &str, cfg: &Config) -> anyhow::Result<()> {
    println!("{} status\n", cfg.habitual.name);
    println!("Config:   {config_path}");
    println!("Timezone: {}", cfg.habits.timezone);
    println!(
        "Reminders: {}",
        if cfg.scheduler.enabled {
            "enabled"
        } else {
            "disabled"
        }
    );
    println!(
        "Membership gate: {}",
        if cfg.membership.is_enabled() {
            cfg.membership.required_channels.join(", ")
        } else {
            "disabled".to_string()
        }
    );

    match cfg.channel.telegram {
        Some(ref tg) => println!(
            "Telegram: {}",
            if tg.enabled && !tg.bot_token.is_empty() {
                "configured"
            } else if tg.enabled {
                "enabled but missing bot_token"
            } else {
                "disabled"
            }
        ),
        None => println!("Telegram: not configured"),
    }
    println!();

    let store = Store::new(&cfg.memory).await?;
    println!("Database: {}", shellexpand(&cfg.memory.db_path));
    println!("  size: {} bytes", store.db_size().await?);
    println!(
        "  enabled reminders: {}",
        store.enabled_reminders().await?.len()
    );
    store.close().await;
    Ok(())
}
