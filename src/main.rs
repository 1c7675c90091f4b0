use clap::Parser;
use merlin_proxy::config::config_search_paths;
use merlin_proxy::token::FirebaseTokenProvider;
use merlin_proxy::{build_router, AppState, ProxyConfig, SharedLogger};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "merlin-proxy",
    about = "OpenAI-compatible chat completions proxy for the Merlin AI service",
    version
)]
struct Cli {
    /// Path to config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Log file path
    #[arg(long, default_value = "merlin-proxy.log")]
    log_file: PathBuf,

    /// Print config search paths and exit
    #[arg(long)]
    show_config_paths: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "merlin_proxy=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if cli.show_config_paths {
        println!("Config search paths:");
        for (i, path) in config_search_paths().iter().enumerate() {
            println!("  {}. {}", i + 1, path.display());
        }
        return Ok(());
    }

    let mut config = ProxyConfig::find_and_load(cli.config.as_deref())?;

    if let Some(port) = cli.port {
        config.port = port;
    }

    let logger = SharedLogger::new(&cli.log_file)?;

    info!("merlin-proxy v{}", env!("CARGO_PKG_VERSION"));
    info!("  Upstream:  {}", config.upstream.api_url);
    info!("  Port:      {}", config.port);
    info!(
        "  Models:    {}",
        if config.models.is_empty() {
            "any".to_string()
        } else {
            config.models.join(", ")
        }
    );
    info!(
        "  Auth:      {}",
        if config.resolve_auth_token().is_some() {
            "bearer token required"
        } else {
            "open"
        }
    );
    info!("  Log file:  {}", cli.log_file.display());

    logger.info(
        "startup",
        format!(
            "Starting merlin-proxy upstream={} port={}",
            config.upstream.api_url, config.port
        ),
    );

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(300))
        .build()?;

    let tokens = Arc::new(FirebaseTokenProvider::new(
        &config.upstream.google_api_key_env,
        config.upstream.effective_user_agent().to_string(),
    ));

    let state = Arc::new(AppState {
        config: config.clone(),
        client,
        tokens,
        logger: logger.clone(),
    });

    let app = build_router(state);
    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!("Listening on http://{bind_addr}");
    info!("Point any OpenAI client at http://localhost:{}/v1", config.port);

    axum::serve(listener, app).await?;

    Ok(())
}
