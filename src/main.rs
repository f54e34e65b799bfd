//! `makerbot` CLI: starts the market-making core against either the paper
//! gateway or a live venue connection, and holds a single quoted position
//! open until interrupted.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use makerbot_core::config::{CoreConfig, SigningIdentity};
use makerbot_core::gateway::{HttpOrderGateway, PaperGatewayConfig, PaperOrderGateway};
use makerbot_core::ids::MakerId;
use makerbot_core::position::{PositionSpec, Side};
use makerbot_core::transport::{FallbackTransport, PollTransport, PushTransport};
use makerbot_core::MakerCore;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "makerbot", about = "Automated market-making agent core")]
struct Cli {
    /// Run against the in-memory paper gateway instead of the live venue.
    #[arg(long, env = "MAKER_PAPER")]
    paper: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a single position and hold it open until Ctrl-C.
    Quote {
        #[arg(long)]
        market_id: String,
        #[arg(long, value_enum)]
        side: CliSide,
        #[arg(long)]
        max_stake: u64,
        #[arg(long, default_value_t = 0)]
        premium_bps: u32,
        #[arg(long, default_value_t = 0)]
        max_vig: i128,
        #[arg(long, default_value_t = 0)]
        min_liquidity: u64,
        #[arg(long, default_value_t = 0)]
        min_for_odds: u64,
        #[arg(long, default_value_t = 0)]
        min_for_vig: u64,
    },
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum CliSide {
    A,
    B,
}

impl From<CliSide> for Side {
    fn from(s: CliSide) -> Self {
        match s {
            CliSide::A => Side::A,
            CliSide::B => Side::B,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    init_tracing();

    let cli = Cli::parse();
    let config = Arc::new(CoreConfig::from_env());

    let self_maker_id =
        MakerId::new(std::env::var("MAKER_ID").unwrap_or_else(|_| "local-maker".to_string()));

    let transport = build_transport(&config);

    let gateway: Arc<dyn makerbot_core::gateway::OrderGateway> = if cli.paper {
        info!("starting in paper mode");
        Arc::new(PaperOrderGateway::new(PaperGatewayConfig {
            ladder_step: config.ladder_step,
            odds_unit: config.odds_unit,
            ..PaperGatewayConfig::default()
        }))
    } else {
        info!("starting against live venue at {}", config.rest_base_url);
        let identity = SigningIdentity {
            maker_id: self_maker_id.clone(),
            api_key: std::env::var("MAKER_API_KEY").context("MAKER_API_KEY not set")?,
            secret: std::env::var("MAKER_API_SECRET").context("MAKER_API_SECRET not set")?,
            passphrase: std::env::var("MAKER_API_PASSPHRASE").unwrap_or_default(),
        };
        Arc::new(HttpOrderGateway::new(
            identity,
            config.rest_base_url.clone(),
            config.ladder_step,
            config.odds_unit,
            config.max_retries,
            config.retry_base_delay,
            config.retry_backoff,
        ))
    };

    let core = MakerCore::new(self_maker_id, transport, gateway, config.clone());

    match cli.command {
        Command::Quote {
            market_id,
            side,
            max_stake,
            premium_bps,
            max_vig,
            min_liquidity,
            min_for_odds,
            min_for_vig,
        } => {
            let spec = PositionSpec {
                market_id: market_id.into(),
                chosen_side: side.into(),
                max_stake,
                premium_bps,
                max_vig,
                min_liquidity,
                min_for_odds,
                min_for_vig,
            };
            let id = core.create_position(spec).await?;
            info!(position = %id, "position live; press Ctrl-C to close and exit");

            tokio::signal::ctrl_c().await.ok();
            info!("shutdown requested");
            core.close_position(id).await?;
        }
    }

    Ok(())
}

fn build_transport(config: &Arc<CoreConfig>) -> Arc<dyn makerbot_core::transport::Transport> {
    let poll = PollTransport::new(
        config.rest_base_url.clone(),
        config.odds_unit,
        config.poll_fallback_interval,
    );
    let push = PushTransport::new(
        config.ws_url.clone(),
        config.rest_base_url.clone(),
        config.odds_unit,
    );
    Arc::new(FallbackTransport::new(push, poll, config.push_connect_window))
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "makerbot_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_env() {
    let _ = dotenv::dotenv();
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    let candidates = [manifest_dir.join(".env"), manifest_dir.join("../.env")];
    for p in candidates {
        if p.exists() {
            let _ = dotenv::from_path(&p);
        }
    }
}
