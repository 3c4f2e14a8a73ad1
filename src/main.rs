use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use database::Database;
use graph_client::{GraphApiClient, MockGraphGateway};
use monitor_service::{MonitoringCycle, Scheduler, StatsRecorder};
use sociwave_core::{
    ConfigStore, GraphGateway, Rule, RuleStore, Settings, StatsSink, MIN_INTERVAL_SECS,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sociwave", version, about = "Keyword auto-replies for Facebook page reels")]
struct Cli {
    /// Settings file (TOML)
    #[arg(short, long, env = "SOCIWAVE_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Monitor until interrupted
    Run {
        /// Overrides monitoring.interval_secs
        #[arg(long)]
        interval_secs: Option<u64>,
    },
    /// Run a single cycle and print its result
    Once,
    /// Print the stored monitoring counters
    Stats,
    /// Manage reply rules
    Rules {
        #[command(subcommand)]
        action: RuleAction,
    },
    /// Verify the page id and access token against the Graph API
    Check,
}

#[derive(Subcommand)]
enum RuleAction {
    List,
    Set {
        object_id: String,
        #[arg(long)]
        reply: String,
        /// Comma-separated keywords; omit or pass "." to match every comment
        #[arg(long = "match", value_delimiter = ',')]
        match_words: Vec<String>,
        #[arg(long)]
        inbox: Option<String>,
        #[arg(long)]
        disabled: bool,
    },
    Delete {
        object_id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("failed to load settings")?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let database = Arc::new(
        Database::open(settings.database_url.clone())
            .await
            .context("failed to open database")?,
    );
    if let Some(facebook) = &settings.facebook {
        database.save_config(facebook).await?;
        info!("Stored page configuration for {}", facebook.page_id);
    }

    let outcome = match cli.command {
        Command::Run { interval_secs } => run_daemon(&settings, &database, interval_secs).await,
        Command::Once => run_once(&settings, &database).await,
        Command::Stats => print_stats(&database).await,
        Command::Rules { action } => manage_rules(&database, action).await,
        Command::Check => check_connection(&settings, &database).await,
    };

    database.close().await;
    outcome
}

async fn build_gateway(
    settings: &Settings,
    database: &Database,
) -> anyhow::Result<Arc<dyn GraphGateway>> {
    match database.load_config().await? {
        Some(config) if config.use_mock_data => {
            info!("Using mock Graph data for page {}", config.page_id);
            Ok(Arc::new(MockGraphGateway::with_sample_data(&config.page_id)))
        }
        _ => Ok(Arc::new(GraphApiClient::new(&settings.graph)?)),
    }
}

async fn build_cycle(
    settings: &Settings,
    database: &Arc<Database>,
) -> anyhow::Result<Arc<MonitoringCycle>> {
    let gateway = build_gateway(settings, database).await?;
    let stats = Arc::new(StatsRecorder::new(Some(database.clone() as Arc<dyn StatsSink>)));
    stats.restore().await;

    let cycle = MonitoringCycle::new(database.clone(), database.clone(), gateway, stats)
        .with_dedup_capacity(settings.monitoring.dedup_capacity);
    Ok(Arc::new(cycle))
}

async fn run_daemon(
    settings: &Settings,
    database: &Arc<Database>,
    interval_secs: Option<u64>,
) -> anyhow::Result<()> {
    let interval = interval_secs
        .map(Duration::from_secs)
        .unwrap_or_else(|| settings.monitoring.interval());
    if interval < Duration::from_secs(MIN_INTERVAL_SECS) {
        bail!("interval must be at least {}s", MIN_INTERVAL_SECS);
    }

    let scheduler = Scheduler::new(build_cycle(settings, database).await?);
    scheduler
        .start(interval)
        .await
        .context("failed to start monitoring")?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutdown requested");
    scheduler.stop().await;

    let stats = scheduler.stats();
    info!(
        "Monitoring finished: {} checks, {} replies, {} private replies",
        stats.total_checks, stats.total_replies, stats.total_private_replies
    );
    Ok(())
}

async fn run_once(settings: &Settings, database: &Arc<Database>) -> anyhow::Result<()> {
    let cycle = build_cycle(settings, database).await?;
    let result = cycle.run().await;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn print_stats(database: &Database) -> anyhow::Result<()> {
    let stats = database.load_stats().await?.unwrap_or_default();
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

async fn manage_rules(database: &Database, action: RuleAction) -> anyhow::Result<()> {
    match action {
        RuleAction::List => {
            let mut rules: Vec<Rule> = database.load_rules().await?.into_values().collect();
            rules.sort_by(|a, b| a.object_id.cmp(&b.object_id));
            println!("{}", serde_json::to_string_pretty(&rules)?);
        }
        RuleAction::Set {
            object_id,
            reply,
            match_words,
            inbox,
            disabled,
        } => {
            let mut rule = Rule::new(object_id, reply).with_match_words(match_words);
            if let Some(inbox) = inbox {
                rule = rule.with_inbox_message(inbox);
            }
            if disabled {
                rule = rule.disabled();
            }
            if !rule.is_postable() {
                bail!("reply message must not be empty");
            }
            database.save_rule(&rule).await?;
            info!("Saved rule for {}", rule.object_id);
        }
        RuleAction::Delete { object_id } => {
            database.delete_rule(&object_id).await?;
            info!("Deleted rule for {}", object_id);
        }
    }
    Ok(())
}

async fn check_connection(settings: &Settings, database: &Database) -> anyhow::Result<()> {
    let config = database
        .load_config()
        .await?
        .context("no page configuration stored; add a [facebook] section to the settings file")?;
    let scope = config.scope()?;

    let gateway = build_gateway(settings, database).await?;
    let page = gateway.get_page_info(&scope).await?;
    println!(
        "Connected to page {} ({})",
        page.name.as_deref().unwrap_or("unnamed"),
        page.id
    );
    Ok(())
}
