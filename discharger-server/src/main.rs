//! discharger server entry point

use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use discharger_server::{build_router, config::ServerConfig, llm::OpenAiClient, sms, AppState};

const CONFIG_FILE: &str = "config.yaml";

fn init_tracing(config: &ServerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log.level));
    let registry = tracing_subscriber::registry().with(filter);

    if config.log.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() {
    // Config first so the log level can come from it
    let (config, config_error) = match ServerConfig::load(
        std::path::Path::new(CONFIG_FILE).exists().then_some(CONFIG_FILE),
    ) {
        Ok(config) => (config, None),
        Err(e) => {
            let mut config = ServerConfig::default();
            config.apply_env(|name| std::env::var(name).ok());
            (config, Some(e.to_string()))
        }
    };

    init_tracing(&config);
    if let Some(e) = config_error {
        tracing::warn!("Failed to load config, using defaults: {}", e);
    }

    tracing::info!("Starting discharger server...");

    let llm = match OpenAiClient::new(&config.llm) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            tracing::error!("Failed to build LLM client: {}", e);
            std::process::exit(1);
        }
    };
    if config.llm.api_key.is_none() {
        tracing::warn!("No LLM API key configured; generation and translation will fail");
    }

    let sms_sender = sms::from_settings(&config.sms);
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    let state = match AppState::open(config.clone(), llm, sms_sender) {
        Ok(state) => Arc::new(state),
        Err(e) => {
            tracing::error!("Failed to open storage: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!(
        auth = if config.auth.enabled { "enabled" } else { "disabled" },
        sms = if config.sms.enabled { "enabled" } else { "disabled" },
        model = %config.llm.model,
        "Configuration loaded"
    );

    let app = build_router(state);

    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("Failed to bind to {}: {}", bind_addr, e);
            std::process::exit(1);
        }
    };

    if let Some(ref tls_config) = config.server.tls {
        let acceptor = discharger_server::tls::load_tls_acceptor(
            &tls_config.cert_file,
            &tls_config.key_file,
        )
        .unwrap_or_else(|e| {
            tracing::error!("Failed to load TLS config: {}", e);
            std::process::exit(1);
        });

        tracing::info!("Listening on https://{}", bind_addr);

        let tls_listener = discharger_server::tls::TlsListener::new(listener, acceptor);
        discharger_server::tls::serve(tls_listener, app, shutdown_signal())
            .await
            .unwrap_or_else(|e| {
                tracing::error!("Server error: {}", e);
            });
    } else {
        tracing::info!("Listening on http://{}", bind_addr);

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Server error: {}", e);
        });
    }

    tracing::info!("Server shut down gracefully");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
