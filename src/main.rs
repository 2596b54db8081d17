use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use scooter_rent::application::clock::EngineConfig;
use scooter_rent::application::engine::RentalEngine;
use scooter_rent::application::lookup::ScooterLookup;
use scooter_rent::domain::ports::{BearerToken, RentalBackendBox};
use scooter_rent::domain::role::Role;
use scooter_rent::domain::scooter::FrameCode;
use scooter_rent::domain::tariff::{TariffCatalog, TariffId};
use scooter_rent::error::RentalError;
use scooter_rent::infrastructure::credentials::StaticCredentials;
use scooter_rent::infrastructure::http::HttpBackend;
use scooter_rent::infrastructure::in_memory::InMemoryFleet;
use scooter_rent::interfaces::console::{
    build_scooter_table, build_tariffs_table, end_until_settled, session_line,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Rental API base URL. Without it, a built-in sample fleet is used.
    #[arg(long, env = "SCOOTER_API_URL", global = true)]
    api_url: Option<String>,

    /// Bearer token for the rental API.
    #[arg(long, env = "SCOOTER_TOKEN", global = true, hide_env_values = true)]
    token: Option<String>,

    /// TOML file with extra `[[tariff]]` entries.
    #[arg(long, env = "SCOOTER_TARIFFS", global = true)]
    tariffs: Option<PathBuf>,

    /// Seconds per billed minute.
    #[arg(long, env = "SCOOTER_TICK_SECONDS", default_value_t = 60.0, global = true)]
    tick_seconds: f64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the tariffs a rental can be started with.
    Tariffs,

    /// Show the scooter behind a frame code.
    Lookup { frame: String },

    /// Rent a scooter until Ctrl-C, or for a number of billed minutes.
    Ride {
        frame: String,

        #[arg(long)]
        tariff: u32,

        #[arg(long)]
        minutes: Option<u32>,
    },

    /// Show the role encoded in the bearer token.
    Whoami,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let catalog = load_catalog(cli.tariffs.as_ref())?;
    let tick_period = Duration::try_from_secs_f64(cli.tick_seconds)
        .map_err(|e| RentalError::ConfigError(format!("tick seconds: {e}")))?;
    let config = EngineConfig::with_tick_period(tick_period)?;
    let token = cli.token.map(BearerToken::new);

    match cli.command {
        Command::Tariffs => {
            println!("{}", build_tariffs_table(&catalog));
        }
        Command::Lookup { frame } => {
            let backend = connect(cli.api_url.as_deref(), token, &catalog, tick_period)?;
            let scooter = ScooterLookup::new(backend).lookup(&frame).await?;
            println!("{}", build_scooter_table(&scooter));
        }
        Command::Ride {
            frame,
            tariff,
            minutes,
        } => {
            let backend = connect(cli.api_url.as_deref(), token, &catalog, tick_period)?;
            let engine = RentalEngine::new(backend, catalog, config);
            ride(&engine, &frame, TariffId(tariff), minutes).await?;
        }
        Command::Whoami => {
            let token = token
                .ok_or_else(|| RentalError::AuthError("no bearer token configured".to_string()))?;
            let role = Role::from_token(&token)?;
            println!("{role}");
            if !role.can_rent() {
                println!("this role cannot rent scooters");
            }
            if role.can_edit_fleet() {
                println!("this role can edit the fleet");
            }
        }
    }
    Ok(())
}

fn load_catalog(path: Option<&PathBuf>) -> Result<TariffCatalog> {
    let mut catalog = TariffCatalog::with_defaults();
    if let Some(path) = path {
        let source = std::fs::read_to_string(path).into_diagnostic()?;
        let loaded = catalog.extend_from_toml(&source)?;
        info!(path = %path.display(), loaded, "Loaded tariffs");
    }
    Ok(catalog)
}

fn connect(
    api_url: Option<&str>,
    token: Option<BearerToken>,
    catalog: &TariffCatalog,
    minute: Duration,
) -> Result<RentalBackendBox> {
    let backend: RentalBackendBox = match api_url {
        Some(url) => {
            let credentials = Arc::new(StaticCredentials::new(token));
            Arc::new(HttpBackend::try_new(url, credentials)?)
        }
        None => {
            info!("No API URL, using the sample fleet");
            Arc::new(InMemoryFleet::with_sample_fleet(catalog.clone()).with_minute(minute))
        }
    };
    Ok(backend)
}

async fn ride(
    engine: &RentalEngine,
    frame: &str,
    tariff: TariffId,
    minutes: Option<u32>,
) -> Result<()> {
    let scooter = engine.lookup_frame(frame).await?;
    println!("{}", build_scooter_table(&scooter));

    let frame = FrameCode::parse(frame)?;
    let tariff_name = engine.catalog().resolve(tariff)?.name.clone();
    let mut current = engine.start(&frame, tariff).await?;
    println!("riding {frame} on \"{tariff_name}\"");
    let mut updates = engine.subscribe();
    println!("{}", session_line(&current));

    loop {
        if minutes.is_some_and(|limit| current.elapsed_minutes() >= limit) {
            break;
        }
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                if let Some(session) = snapshot {
                    println!("{}", session_line(&session));
                    current = session;
                }
            }
        }
    }

    let ended = end_until_settled(engine, |error| {
        eprintln!("{error}; press Ctrl-C to try ending the rental again");
        async { tokio::signal::ctrl_c().await.is_ok() }
    })
    .await?;
    println!("{}", session_line(&ended));
    Ok(())
}
