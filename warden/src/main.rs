use clap::Parser;
use tokio::signal;
use warden::{Application, Config, config::Args, telemetry};

/// Resolves on Ctrl+C or SIGTERM, logging which one stopped the server.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let reason = tokio::select! {
        _ = ctrl_c => "Ctrl+C",
        _ = terminate => "SIGTERM",
    };
    tracing::info!(reason, "Shutting down warden, finishing in-flight requests");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // sqlx and the SMTP transport both build rustls clients
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("a rustls crypto provider is already installed"))?;

    let args = Args::parse();
    let config = Config::load(&args)?;

    if args.validate {
        println!("{}: ok ({})", args.config, config.summary());
        return Ok(());
    }

    telemetry::init_telemetry(config.log_format)?;
    tracing::info!(config_file = %args.config, "Starting warden: {}", config.summary());

    Application::new(config).await?.serve(shutdown_signal()).await
}
