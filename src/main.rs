//! webhook-ledger server binary.
//!
//! ```text
//! webhook-ledger                 # serve POST /webhooks/payments
//! webhook-ledger replay <uuid>   # re-run settlement for a stuck or failed event
//! ```

use std::error::Error;
use std::sync::Arc;

use sqlx::PgPool;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use webhook_ledger::adapters::http::{webhook_router, WebhookAppState};
use webhook_ledger::adapters::{
    HmacSha256Verifier, PostgresBillingStore, PostgresPaymentReader,
    PostgresWebhookEventRepository,
};
use webhook_ledger::application::{
    ReceivePaymentWebhookHandler, ReplayWebhookEventCommand, ReplayWebhookEventHandler,
};
use webhook_ledger::application::handlers::webhooks::{
    IdempotencyLedger, PaymentDeduplicationIndex, ReconciliationEngine, SettlementPipeline,
};
use webhook_ledger::config::AppConfig;
use webhook_ledger::domain::foundation::WebhookEventId;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

type BoxError = Box<dyn Error + Send + Sync>;

enum Command {
    Serve,
    Replay(WebhookEventId),
}

impl Command {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self, BoxError> {
        match args.next().as_deref() {
            None | Some("serve") => Ok(Command::Serve),
            Some("replay") => {
                let id = args
                    .next()
                    .ok_or("usage: webhook-ledger replay <webhook-event-id>")?;
                Ok(Command::Replay(id.parse()?))
            }
            Some(other) => Err(format!("unknown command '{}'", other).into()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let config = AppConfig::load()?;
    config.validate()?;
    init_tracing(&config);

    let command = Command::parse(std::env::args().skip(1))?;

    let pool = config
        .database
        .pool_options()
        .connect(&config.database.url)
        .await?;
    if config.database.run_migrations {
        MIGRATOR.run(&pool).await?;
        tracing::info!("Database migrations applied");
    }

    let settlement = settlement_pipeline(&pool, &config)?;

    match command {
        Command::Serve => serve(settlement, &config).await,
        Command::Replay(id) => {
            let handler =
                ReplayWebhookEventHandler::new(settlement, config.webhook.replay_grace());
            let ack = handler
                .handle(ReplayWebhookEventCommand {
                    webhook_event_id: id,
                })
                .await?;
            tracing::info!(webhook_event_id = %id, result = ?ack, "Replay finished");
            Ok(())
        }
    }
}

fn init_tracing(config: &AppConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.server.log_level));
    let json = config.is_production();

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .init();
}

fn settlement_pipeline(pool: &PgPool, config: &AppConfig) -> Result<SettlementPipeline, BoxError> {
    let ledger = IdempotencyLedger::new(Arc::new(PostgresWebhookEventRepository::new(
        pool.clone(),
    )));
    let dedup = PaymentDeduplicationIndex::new(Arc::new(PostgresPaymentReader::new(pool.clone())));
    let engine = ReconciliationEngine::new(
        Arc::new(PostgresBillingStore::new(pool.clone())),
        Arc::new(config.webhook.plan_catalog()?),
    );
    Ok(SettlementPipeline::new(ledger, dedup, engine))
}

async fn serve(settlement: SettlementPipeline, config: &AppConfig) -> Result<(), BoxError> {
    let intake = ReceivePaymentWebhookHandler::new(
        settlement,
        Arc::new(HmacSha256Verifier::new()),
        config.webhook.signing_secret.clone(),
        config.webhook.replay_grace(),
    );
    let state = WebhookAppState::new(
        Arc::new(intake),
        config.webhook.signature_header.clone(),
        config.server.request_timeout(),
    );
    let app = webhook_router(state);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, environment = ?config.server.environment, "Listening for payment webhooks");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutting down");
}
