use clap::{Args, Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use rust_decimal::Decimal;
use std::fs::File;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use unlock_engine::application::gateways::GatewayRegistry;
use unlock_engine::application::gateways::card::CardGateway;
use unlock_engine::application::gateways::mobile_money::MobileMoneyGateway;
use unlock_engine::application::{Collaborators, UnlockOrchestrator};
use unlock_engine::config::OrchestratorConfig;
use unlock_engine::domain::money::{ExchangeRate, LocalAmount};
use unlock_engine::domain::ports::{
    CardClient, MobileMoneyClient, RateSourceRef, RepositoryRef,
};
use unlock_engine::infrastructure::http_clients::{
    HttpCardClient, HttpMobileMoneyClient, HttpRateSource, build_client,
};
use unlock_engine::infrastructure::in_memory::{
    InMemoryBookingService, InMemoryCatalog, InMemoryRepository,
};
use unlock_engine::infrastructure::notifier::TracingNotifier;
use unlock_engine::infrastructure::sandbox::{SandboxCard, SandboxMobileMoney, StaticRateSource};
use unlock_engine::interfaces::csv::callback_reader::CallbackReader;
use unlock_engine::interfaces::csv::outcome_writer::OutcomeWriter;
use unlock_engine::interfaces::http::{AppState, build_router};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    runtime: RuntimeArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API.
    Serve(ServeArgs),
    /// Apply a provider callback export (`reference,status`) and print the outcomes.
    Reconcile {
        /// Input callbacks CSV file
        input: PathBuf,
    },
}

#[derive(Args)]
struct ServeArgs {
    #[arg(long, env = "UNLOCK_BIND", default_value = "0.0.0.0:8080")]
    bind: SocketAddr,

    /// Poll providers for open payments every N seconds (0 disables).
    #[arg(long, env = "UNLOCK_RECONCILE_EVERY", default_value_t = 0)]
    reconcile_every: u64,

    /// Shared secret providers send in `x-callback-token`. Unset accepts
    /// every callback, which is only safe behind a trusted ingress.
    #[arg(long, env = "UNLOCK_CALLBACK_SECRET", hide_env_values = true)]
    callback_secret: Option<String>,
}

#[derive(Args)]
struct RuntimeArgs {
    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, env = "UNLOCK_DB_PATH", global = true)]
    db_path: Option<PathBuf>,

    /// JSON file with `properties` and `guests` to serve from memory.
    #[arg(long, env = "UNLOCK_CATALOG", global = true)]
    catalog: Option<PathBuf>,

    /// Mobile-money API base URL. Without it a sandbox accepts every deposit.
    #[arg(long, env = "UNLOCK_MOBILE_MONEY_URL", global = true)]
    mobile_money_url: Option<String>,

    #[arg(long, env = "UNLOCK_MOBILE_MONEY_API_KEY", default_value = "", global = true, hide_env_values = true)]
    mobile_money_api_key: String,

    /// Card collection API base URL. Without it a sandbox hands out local pages.
    #[arg(long, env = "UNLOCK_CARD_URL", global = true)]
    card_url: Option<String>,

    #[arg(long, env = "UNLOCK_CARD_API_KEY", default_value = "", global = true, hide_env_values = true)]
    card_api_key: String,

    /// Where the card page sends the guest once payment is done.
    #[arg(
        long,
        env = "UNLOCK_CARD_REDIRECT_URL",
        default_value = "http://localhost:8080/payments/complete",
        global = true
    )]
    card_redirect_url: String,

    /// Exchange-rate feed base URL. Without it `--default-rate` is used.
    #[arg(long, env = "UNLOCK_RATE_FEED_URL", global = true)]
    rate_feed_url: Option<String>,

    /// Local units per USD when the feed has never answered.
    #[arg(long, env = "UNLOCK_DEFAULT_RATE", default_value = "1300", global = true)]
    default_rate: Decimal,

    /// Kept from a refundable deposit, in local units.
    #[arg(long, env = "UNLOCK_SERVICE_FEE", default_value_t = 15_000, global = true)]
    service_fee: i64,

    #[arg(long, env = "UNLOCK_DEAL_CODE_DAYS", default_value_t = 90, global = true)]
    deal_code_days: i64,

    #[arg(long, env = "UNLOCK_HTTP_TIMEOUT_SECS", default_value_t = 30, global = true)]
    http_timeout_secs: u64,

    /// Emit logs as JSON lines.
    #[arg(long, env = "UNLOCK_JSON_LOGS", global = true)]
    json_logs: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("unlock_engine=info,tower_http=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn open_repository(db_path: Option<PathBuf>) -> Result<RepositoryRef> {
    match db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(path) => {
            use unlock_engine::infrastructure::rocksdb::RocksDbRepository;
            let repository = RocksDbRepository::open(path).into_diagnostic()?;
            Ok(Arc::new(repository))
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(_) => {
            eprintln!(
                "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
            );
            Ok(Arc::new(InMemoryRepository::new()))
        }
        None => Ok(Arc::new(InMemoryRepository::new())),
    }
}

fn build_orchestrator(args: RuntimeArgs) -> Result<UnlockOrchestrator> {
    let repository = open_repository(args.db_path)?;
    let catalog = match args.catalog {
        Some(path) => InMemoryCatalog::from_json(path).into_diagnostic()?,
        None => InMemoryCatalog::new(),
    };
    let catalog = Arc::new(catalog);

    let http = build_client(Duration::from_secs(args.http_timeout_secs)).into_diagnostic()?;

    let wallets: Arc<dyn MobileMoneyClient> = match args.mobile_money_url {
        Some(url) => Arc::new(HttpMobileMoneyClient::new(
            http.clone(),
            &url,
            args.mobile_money_api_key,
        )),
        None => {
            tracing::warn!("No mobile-money endpoint configured, using the sandbox");
            Arc::new(SandboxMobileMoney::new())
        }
    };
    let cards: Arc<dyn CardClient> = match args.card_url {
        Some(url) => Arc::new(HttpCardClient::new(http.clone(), &url, args.card_api_key)),
        None => {
            tracing::warn!("No card endpoint configured, using the sandbox");
            Arc::new(SandboxCard::new(format!(
                "{}/sandbox/card",
                args.card_redirect_url.trim_end_matches('/')
            )))
        }
    };

    let default_rate = ExchangeRate::new(args.default_rate).into_diagnostic()?;
    let rate_source: RateSourceRef = match args.rate_feed_url {
        Some(url) => Arc::new(HttpRateSource::new(http, &url)),
        None => Arc::new(StaticRateSource::new(default_rate)),
    };

    let config = OrchestratorConfig {
        service_fee: LocalAmount::units(args.service_fee),
        deal_code_validity: chrono::Duration::days(args.deal_code_days),
        default_rate,
        ..OrchestratorConfig::default()
    };

    let collaborators = Collaborators {
        repository,
        gateways: GatewayRegistry::new()
            .with(Arc::new(MobileMoneyGateway::new(wallets)))
            .with(Arc::new(CardGateway::new(cards, args.card_redirect_url, "250"))),
        rate_source,
        catalog: catalog.clone(),
        guests: catalog,
        bookings: Arc::new(InMemoryBookingService::new()),
        notifier: Arc::new(TracingNotifier),
    };
    Ok(UnlockOrchestrator::new(collaborators, config))
}

async fn serve(orchestrator: Arc<UnlockOrchestrator>, args: ServeArgs) -> Result<()> {
    if args.reconcile_every > 0 {
        let sweeper = orchestrator.clone();
        let period = Duration::from_secs(args.reconcile_every);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                match sweeper.reconcile_open_payments().await {
                    Ok(outcomes) if !outcomes.is_empty() => {
                        tracing::info!(checked = outcomes.len(), "Reconciled open payments");
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!(error = %e, "Reconciliation sweep failed"),
                }
            }
        });
    }

    let mut state = AppState::new(orchestrator);
    match args.callback_secret {
        Some(secret) if !secret.is_empty() => state = state.with_callback_secret(secret),
        _ => tracing::warn!("No callback secret configured, payment webhooks are unauthenticated"),
    }
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .into_diagnostic()?;
    tracing::info!(addr = %args.bind, "Listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .into_diagnostic()
}

async fn reconcile(orchestrator: &UnlockOrchestrator, input: PathBuf) -> Result<()> {
    let file = File::open(input).into_diagnostic()?;
    let reader = CallbackReader::new(file);

    let stdout = io::stdout();
    let mut writer = OutcomeWriter::new(stdout.lock());
    for row in reader.callbacks() {
        match row {
            Ok(callback) => {
                match orchestrator
                    .process_payment_callback(&callback.reference, callback.status)
                    .await
                {
                    Ok(outcome) => writer.write(&callback.reference, &outcome).into_diagnostic()?,
                    Err(e) => eprintln!("Error applying callback {}: {}", callback.reference, e),
                }
            }
            Err(e) => {
                eprintln!("Error reading callback: {}", e);
            }
        }
    }
    writer.flush().into_diagnostic()?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.runtime.json_logs);

    let orchestrator = build_orchestrator(cli.runtime)?;
    match cli.command {
        Command::Serve(args) => serve(Arc::new(orchestrator), args).await,
        Command::Reconcile { input } => reconcile(&orchestrator, input).await,
    }
}
