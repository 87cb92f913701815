// Champion guessing bot entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file)
// 2. Load config
// 3. Open database (fatal on failure), run `--import <file>` if given
// 4. Load the champion catalog from Data Dragon
// 5. Build ledger, round engine and trade broker
// 6. Spawn the gateway and the app loop
// 7. Wait for Ctrl+C or the app loop to end

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use champguess_bot::app::{self, App};
use champguess_bot::config;
use champguess_bot::ddragon::DataDragon;
use champguess_bot::gateway;
use champguess_bot::legacy;
use champguess_core::{ContentProvider, Database, Ledger, RoundEngine, TradeBroker};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing
    init_tracing()?;
    info!("champguess starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "config loaded: gateway port {}, content {} ({})",
        config.gateway_port, config.content.base_url, config.content.version
    );

    // 3. Open database
    let db = Arc::new(Database::open(&config.db_path).context("failed to open database")?);
    info!("database opened at {} ({} players)", config.db_path, db.player_count()?);

    if let Some(path) = import_path() {
        let imported = legacy::import_file(&db, &path)?;
        info!("imported {imported} players from {}", path.display());
    }

    // 4. Load the champion catalog. Failure leaves it empty; rounds and loot
    //    then report Unavailable.
    let dragon = Arc::new(DataDragon::new(&config.content));
    if let Err(e) = dragon.load().await {
        warn!("champion catalog unavailable: {e:#}");
    }
    let content: Arc<dyn ContentProvider> = dragon;

    // 5. Game services
    let ledger = Arc::new(Ledger::new(
        db.clone(),
        content.clone(),
        config.game.economy.daily_reset_hour,
    ));
    let (notice_tx, notice_rx) = mpsc::unbounded_channel();
    let rounds = RoundEngine::new(
        ledger.clone(),
        content,
        config.game.round_settings(),
        notice_tx,
    );
    let trades = TradeBroker::new(db, config.game.trade_expiry());
    let app_state = Arc::new(App::new(
        rounds,
        ledger,
        trades,
        config.game.economy.leaderboard_size,
    ));

    // 6. Channels, gateway and app loop
    let (event_tx, event_rx) = mpsc::channel(256);
    let (outbound_tx, outbound_rx) = mpsc::channel(256);

    let port = config.gateway_port;
    let gateway_handle = tokio::spawn(async move {
        match gateway::bind(port).await {
            Ok(listener) => {
                if let Err(e) = gateway::run(listener, event_tx, outbound_rx).await {
                    error!("gateway error: {e}");
                }
            }
            Err(e) => error!("failed to bind gateway on port {port}: {e}"),
        }
    });

    let mut app_handle = tokio::spawn(async move {
        if let Err(e) = app::run(event_rx, notice_rx, outbound_tx, app_state).await {
            error!("application loop error: {e}");
        }
    });

    info!("ready, bridge gateway on 127.0.0.1:{port}");

    // 7. Run until interrupted
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("interrupt received"),
        _ = &mut app_handle => info!("application loop ended"),
    }

    gateway_handle.abort();
    app_handle.abort();
    info!("champguess shut down cleanly");
    Ok(())
}

/// `--import <file>` loads a legacy player export before serving.
fn import_path() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--import" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}

/// Initialize tracing to log to a file.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("champguess.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("champguess=info,champguess_core=info,champguess_bot=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
