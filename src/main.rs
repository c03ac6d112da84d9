//! Google Workspace MCP Server
//!
//! A Model Context Protocol (MCP) server for Gmail, Calendar and Chat.

use std::sync::Arc;

use clap::{Parser, Subcommand};

use google_workspace_mcp::auth::AuthManager;
use google_workspace_mcp::config::Config;
use google_workspace_mcp::mcp::server::McpServer;

/// Google Workspace MCP Server
#[derive(Parser)]
#[command(name = "google-workspace-mcp")]
#[command(author, version, about = "Google Workspace MCP Server - Gmail, Calendar and Chat tools over MCP")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve MCP over stdio (default)
    Serve,

    /// Check that the configured refresh token is usable, then exit
    Validate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging; stdout carries the protocol
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // A missing .env file is fine
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!(error = %e, "No .env file loaded");
    }

    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    };

    let auth = Arc::new(AuthManager::from_config(&config)?);

    if !auth.validate_auth().await {
        tracing::error!("Failed to validate authentication");
        auth.destroy();
        std::process::exit(1);
    }

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Validate => {
            eprintln!("Authentication is valid.");
        }
        Commands::Serve => {
            let mut server = McpServer::new(Arc::clone(&auth));
            tracing::info!("Google Workspace MCP server running on stdio");
            let result = server.run_stdio(shutdown_signal()).await;
            if let Err(ref e) = result {
                tracing::error!(error = %e, "MCP server stopped with error");
            }
        }
    }

    auth.destroy();
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
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
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
