use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::{Parser, Subcommand};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use boxoffice::checkin::{RedeemResult, ScanSession};
use boxoffice::config::Config;
use boxoffice::crypto::TicketCodeSigner;
use boxoffice::db::{AppState, DbPool, create_pool, init_db, queries};
use boxoffice::models::{CreateConcert, CreateTicketTier};
use boxoffice::orders;
use boxoffice::payments::XenditClient;

#[derive(Parser, Debug)]
#[command(name = "boxoffice")]
#[command(about = "Ticket marketplace back office: payments, fulfillment and check-in")]
struct Cli {
    /// Seed the database with a dev catalog (dev mode only)
    #[arg(long)]
    seed: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Read scanned codes from stdin, one per line, and redeem them
    Scan {
        /// Name recorded as the redeemer of every admitted ticket
        #[arg(long)]
        operator: String,
    },
}

/// Seeds a concert with two tiers. Only runs when no concerts exist.
fn seed_dev_data(pool: &DbPool) -> Result<(), boxoffice::error::AppError> {
    let conn = pool.get()?;
    if !queries::list_concerts(&conn)?.is_empty() {
        tracing::info!("Database already has data, skipping seed");
        return Ok(());
    }

    let concert = queries::create_concert(
        &conn,
        &CreateConcert {
            title: "Dev Night Live".to_string(),
            venue: "Istora Senayan".to_string(),
            starts_at: Utc::now().timestamp() + 30 * 86400,
        },
    )?;
    let regular = queries::create_ticket_tier(
        &conn,
        &concert.id,
        &CreateTicketTier {
            name: "Regular".to_string(),
            price: 350_000,
            total_quantity: 500,
        },
    )?;
    let vip = queries::create_ticket_tier(
        &conn,
        &concert.id,
        &CreateTicketTier {
            name: "VIP".to_string(),
            price: 1_250_000,
            total_quantity: 50,
        },
    )?;

    tracing::info!("============================================");
    tracing::info!("DEV DATA SEEDED");
    tracing::info!("Concert: {} (id: {})", concert.title, concert.id);
    tracing::info!("Tier: {} (id: {})", regular.name, regular.id);
    tracing::info!("Tier: {} (id: {})", vip.name, vip.id);
    tracing::info!("============================================");
    Ok(())
}

/// Spawns the background sweep: expires overdue orders (releasing their
/// holds) and purges old payment events.
fn spawn_sweep_task(pool: DbPool, interval: Duration, retention_days: i64) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;

            let mut conn = match pool.get() {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!("Failed to get db connection for sweep: {}", e);
                    continue;
                }
            };

            match orders::expire_overdue(&mut conn, Utc::now().timestamp()) {
                Ok(count) if count > 0 => tracing::info!("Expired {} overdue orders", count),
                Ok(_) => {}
                Err(e) => tracing::warn!("Failed to expire overdue orders: {}", e),
            }

            if retention_days > 0 {
                match queries::purge_old_payment_events(&conn, retention_days) {
                    Ok(count) if count > 0 => {
                        tracing::debug!("Purged {} payment events", count)
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!("Failed to purge payment events: {}", e),
                }
            }
        }
    });

    tracing::info!("Background sweep started (every {:?})", interval);
}

/// Scanner loop. Errors on one line are logged and the loop keeps reading.
fn run_scan(pool: &DbPool, signer: &TicketCodeSigner, operator: &str) {
    let mut session = ScanSession::new(signer, operator);
    let stdin = std::io::stdin();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!("Unreadable scanner input: {}", e);
                continue;
            }
        };
        let conn = match pool.get() {
            Ok(conn) => conn,
            Err(e) => {
                tracing::error!("DB connection error: {}", e);
                continue;
            }
        };

        match session.handle_line(&conn, &line, Utc::now().timestamp()) {
            Ok(Some(RedeemResult::Admitted(ctx))) => {
                println!("ADMIT  {}  {}  {}", ctx.code, ctx.tier_name, ctx.holder_name)
            }
            Ok(Some(RedeemResult::AlreadyRedeemed {
                redeemed_at,
                redeemed_by,
            })) => println!(
                "REJECT already redeemed at {} by {}",
                redeemed_at,
                redeemed_by.as_deref().unwrap_or("unknown")
            ),
            Ok(Some(RedeemResult::UnknownCode)) => println!("REJECT unknown code"),
            Ok(None) => {}
            Err(e) => tracing::error!("Scan failed: {}", e),
        }
    }

    let stats = session.stats();
    tracing::info!(
        admitted = stats.admitted,
        already_redeemed = stats.already_redeemed,
        unknown = stats.unknown,
        skipped = stats.skipped,
        "Scan session ended"
    );
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "boxoffice=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().unwrap_or_else(|e| {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    });

    if config.dev_mode {
        tracing::info!("Running in DEVELOPMENT mode");
    }

    let db_pool = create_pool(&config.database_path).expect("Failed to create database pool");
    {
        let conn = db_pool.get().expect("Failed to get connection");
        init_db(&conn).expect("Failed to initialize database");
    }

    let signer = TicketCodeSigner::new(config.ticket_code_secret.as_bytes())
        .expect("Failed to initialize ticket code signer");

    if cli.seed {
        if !config.dev_mode {
            tracing::warn!("--seed flag ignored: not in dev mode (set BOXOFFICE_ENV=dev)");
        } else if let Err(e) = seed_dev_data(&db_pool) {
            tracing::error!("Failed to seed dev data: {}", e);
        }
    }

    if let Some(Command::Scan { operator }) = &cli.command {
        run_scan(&db_pool, &signer, operator);
        return;
    }

    let gateway = XenditClient::new(
        &config.xendit_api_base,
        &config.xendit_secret_key,
        config.gateway_timeout,
    )
    .expect("Failed to build payment gateway client");

    let state = AppState {
        db: db_pool.clone(),
        gateway: Arc::new(gateway),
        code_signer: Arc::new(signer),
        settings: Arc::new(config.settings()),
    };

    if config.sweep_interval.is_zero() {
        tracing::info!("Background sweep disabled; orders expire lazily on access");
    } else {
        spawn_sweep_task(
            db_pool,
            config.sweep_interval,
            config.payment_event_retention_days,
        );
    }

    let app = boxoffice::app(state).layer(TraceLayer::new_for_http());

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Boxoffice server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Failed to start server");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}
