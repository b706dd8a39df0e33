use anyhow::Result;
use rand::Rng;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use vitalwatch_notify::plugin::ChannelRegistry;
use vitalwatch_server::app;
use vitalwatch_server::auth::create_token;
use vitalwatch_server::config::{ConfigsSeedFile, ServerConfig};
use vitalwatch_server::seed;
use vitalwatch_server::state::AppState;
use vitalwatch_storage::engine::SqliteTriageStore;

#[allow(clippy::print_stderr)]
fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  vitalwatch-server [config.toml]                                  Start the server");
    eprintln!("  vitalwatch-server init-configs <config.toml> <seed.json>         Set destination address and channel credentials");
    eprintln!("  vitalwatch-server import-batch <config.toml> <records.json> [name]  Import telemetry rows as a new batch");
    eprintln!("  vitalwatch-server issue-token <config.toml> <subject>            Print an API access token");
}

#[tokio::main]
async fn main() -> Result<()> {
    vitalwatch_common::id::init(1, 1);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("vitalwatch=info".parse()?))
        .init();

    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        Some("init-configs") => {
            let config_path = args.get(2).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("init-configs requires <config.toml> and <seed.json> arguments")
            })?;
            let seed_path = args.get(3).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("init-configs requires <seed.json> argument")
            })?;
            run_init_configs(config_path, seed_path).await
        }
        Some("import-batch") => {
            let config_path = args.get(2).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("import-batch requires <config.toml> and <records.json> arguments")
            })?;
            let records_path = args.get(3).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("import-batch requires <records.json> argument")
            })?;
            run_import_batch(config_path, records_path, args.get(4).map(String::as_str)).await
        }
        Some("issue-token") => {
            let config_path = args.get(2).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("issue-token requires <config.toml> and <subject> arguments")
            })?;
            let subject = args.get(3).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("issue-token requires <subject> argument")
            })?;
            run_issue_token(config_path, subject)
        }
        Some("--help" | "-h") => {
            print_usage();
            Ok(())
        }
        _ => {
            let config_path = args
                .get(1)
                .map(|s| s.as_str())
                .unwrap_or("config/server.toml");
            run_server(config_path).await
        }
    }
}

fn open_store(config: &ServerConfig) -> Result<SqliteTriageStore> {
    SqliteTriageStore::new(&config.database_path())
}

async fn run_init_configs(config_path: &str, seed_path: &str) -> Result<()> {
    let config = ServerConfig::load(config_path)?;
    let store = open_store(&config)?;

    let seed_content = std::fs::read_to_string(seed_path)
        .map_err(|e| anyhow::anyhow!("Failed to read seed file '{}': {}", seed_path, e))?;
    let seed_file: ConfigsSeedFile = serde_json::from_str(&seed_content)
        .map_err(|e| anyhow::anyhow!("Failed to parse seed file '{}': {}", seed_path, e))?;

    let written = seed::apply_configs_seed(&store, &ChannelRegistry::default(), &seed_file).await?;
    tracing::info!(written, "Runtime settings initialized");
    Ok(())
}

async fn run_import_batch(config_path: &str, records_path: &str, name: Option<&str>) -> Result<()> {
    let config = ServerConfig::load(config_path)?;
    let store = open_store(&config)?;

    let content = std::fs::read_to_string(records_path)
        .map_err(|e| anyhow::anyhow!("Failed to read records file '{}': {}", records_path, e))?;
    let rows = seed::parse_records(&content)?;

    let default_name = format!("import {}", chrono::Utc::now().format("%Y-%m-%d %H:%M"));
    let summary = seed::import_batch(&store, name.unwrap_or(&default_name), rows).await?;
    tracing::info!(
        batch_id = %summary.batch.id,
        stored = summary.stored,
        skipped = summary.skipped,
        "Batch import finished"
    );
    Ok(())
}

#[allow(clippy::print_stdout)]
fn run_issue_token(config_path: &str, subject: &str) -> Result<()> {
    let config = ServerConfig::load(config_path)?;
    let secret = config.auth.jwt_secret.as_deref().ok_or_else(|| {
        anyhow::anyhow!("[auth].jwt_secret must be set to issue tokens that outlive a restart")
    })?;
    let token = create_token(secret, subject, config.auth.token_expire_secs)?;
    println!("{token}");
    Ok(())
}

fn generate_secret() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

async fn run_server(config_path: &str) -> Result<()> {
    let config = ServerConfig::load(config_path)?;

    tracing::info!(
        http_port = config.http_port,
        db = %config.database_path().display(),
        silence_secs = config.dispatch.silence_secs,
        "vitalwatch-server starting"
    );

    let store = Arc::new(open_store(&config)?);

    let jwt_secret = match &config.auth.jwt_secret {
        Some(secret) => secret.clone(),
        None => {
            tracing::warn!("No jwt_secret configured. A random secret was generated and will change on restart. Set [auth].jwt_secret in config for production use.");
            generate_secret()
        }
    };

    let http_addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    let state = AppState::build(config, store, ChannelRegistry::default(), jwt_secret)?;
    let app = app::build_http_app(state);

    let listener = tokio::net::TcpListener::bind(http_addr).await?;
    tracing::info!(addr = %http_addr, "HTTP server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown signal received");
        })
        .await?;
    Ok(())
}
