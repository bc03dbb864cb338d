//! thoughtchain-node: mirrors an on-chain thought log and extends it
//!
//! Startup: config → local store → bonding gate → synchronizer, then the
//! generation loop once the mirror has caught up with the ledger.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use thoughtchain_engine::{LlamaServerEngine, SamplingParams};
use thoughtchain_node::bonding::{Confirm, FixedAnswer, StdinConfirm};
use thoughtchain_node::cli::{self, Commands};
use thoughtchain_node::generation::GenerationSettings;
use thoughtchain_node::ledger::JsonRpcLedger;
use thoughtchain_node::store::SqliteStore;
use thoughtchain_node::{shutdown, Agent, AgentError, Config};

#[derive(Parser)]
#[command(name = "thoughtchain-node")]
#[command(about = "Always-on agent that mirrors and extends an on-chain thought log")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "thoughtchain.toml", env = "THOUGHTCHAIN_CONFIG")]
    config: PathBuf,

    /// Data directory (overrides config file)
    #[arg(short, long, env = "THOUGHTCHAIN_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Ledger JSON-RPC endpoint (overrides config file)
    #[arg(long, env = "THOUGHTCHAIN_RPC_URL")]
    rpc_url: Option<String>,

    /// Generation server URL (overrides config file)
    #[arg(long, env = "THOUGHTCHAIN_ENGINE_URL")]
    engine_url: Option<String>,

    /// Answer yes to the bonding prompt
    #[arg(long)]
    yes: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("thoughtchain_node=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    info!("Config file: {}", cli.config.display());
    let mut config = Config::load(&cli.config).context("loading configuration")?;

    // Apply CLI overrides
    if let Some(data_dir) = cli.data_dir {
        config.node.data_dir = data_dir;
    }
    if let Some(rpc_url) = cli.rpc_url {
        config.ledger.rpc_url = rpc_url;
    }
    if let Some(engine_url) = cli.engine_url {
        config.engine.base_url = engine_url;
    }

    info!("Data dir: {}", config.node.data_dir.display());
    let store = Arc::new(SqliteStore::open(&config.node.data_dir).context("opening local store")?);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {}
        command => {
            println!("{}", cli::execute_command(&store, &command)?);
            return Ok(());
        }
    }

    let ledger = Arc::new(JsonRpcLedger::new(&config.ledger).context("configuring ledger client")?);

    let mut sampling = SamplingParams::default().with_max_tokens(config.engine.max_tokens);
    if let Some(temperature) = config.engine.temperature {
        sampling = sampling.with_temperature(temperature);
    }
    let engine = LlamaServerEngine::new(
        config.engine.base_url.clone(),
        config.engine.model.clone(),
        config.engine.api_key.clone(),
    )
    .context("configuring generation engine")?
    .with_sampling(sampling);

    let settings = GenerationSettings {
        system_prompt: config
            .agent
            .resolve_system_prompt()
            .context("loading persona")?,
        window_size: config.agent.window_size,
        seed_offset: config.agent.seed_offset,
        retry_delay: Duration::from_millis(config.engine.retry_delay_ms),
    };

    let (stop, shutdown) = shutdown::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
            let _ = stop.send(true);
        }
    });

    let confirm: Box<dyn Confirm> = if cli.yes {
        Box::new(FixedAnswer::new(true))
    } else {
        Box::new(StdinConfirm)
    };

    let agent = Agent::new(
        ledger,
        store,
        Arc::new(engine),
        settings,
        config.sync.backoff(),
    );

    match agent.run(confirm.as_ref(), shutdown).await {
        Ok(()) => Ok(()),
        Err(AgentError::BondingDeclined) => {
            error!("Cannot continue without bonded balance");
            Ok(())
        }
        Err(e) => Err(e).context("agent failed"),
    }
}
