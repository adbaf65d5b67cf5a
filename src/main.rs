use std::process::ExitCode;

use tracing::{error, info};

use webmail::{Config, Database, SmtpServer};

#[tokio::main]
async fn main() -> ExitCode {
    // Load configuration
    let config = match Config::load_with_env("config.toml") {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config.toml: {e}");
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    // Initialize logging
    if let Err(e) = webmail::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        webmail::logging::init_console_only(&config.logging.level);
    }

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Webmail transfer listener starting");

    // The store is the one thing the listener cannot run without.
    let db = match Database::open_with_config(&config.database).await {
        Ok(db) => db,
        Err(e) => {
            error!("Failed to open database {}: {}", config.database.path, e);
            return ExitCode::FAILURE;
        }
    };

    let server = match SmtpServer::bind(&config.server).await {
        Ok(server) => server,
        Err(e) => {
            error!(
                "Failed to bind {}:{}: {}",
                config.server.host, config.server.port, e
            );
            return ExitCode::FAILURE;
        }
    };

    tokio::select! {
        result = server.serve(db.clone()) => {
            if let Err(e) = result {
                error!("Server stopped: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested");
        }
    }

    db.close().await;
    info!("Webmail transfer listener stopped");
    ExitCode::SUCCESS
}
