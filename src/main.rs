use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;

use openapi_mcp::cli::Cli;
use openapi_mcp::compiler;
use openapi_mcp::dispatch::Dispatcher;
use openapi_mcp::normalize::Normalizer;
use openapi_mcp::openapi;
use openapi_mcp::service::ToolService;
use openapi_mcp::stdio::{self, SessionRegistry};

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the MCP protocol
    env_logger::init();

    let cli = Cli::parse();

    // Create cancellation token for graceful shutdown
    let shutdown_token = tokio_util::sync::CancellationToken::new();
    let sessions = SessionRegistry::new();

    let signal_token = shutdown_token.clone();
    let signal_sessions = sessions.clone();
    tokio::spawn(async move {
        wait_for_interrupt().await;
        log::debug!("Received interrupt signal, shutting down");
        signal_sessions.cancel_all();
        signal_token.cancel();
    });

    let load_options = cli.load_options();
    let api = tokio::select! {
        api = openapi::load(&cli.spec, &load_options) => {
            api.context("Failed to load the OpenAPI document")?
        }
        () = shutdown_token.cancelled() => {
            log::info!("Shutdown requested while loading the API description");
            return Ok(());
        }
    };

    let compilation = compiler::compile(&api, &cli.compile_options());
    let mut registry = compilation.registry;

    // Get enabled tools from CLI (--tool/--tools/--toolset)
    if let Some(enabled) = cli.enabled_tools()? {
        let (filtered, unknown) = registry.retain_enabled(&enabled);
        if !unknown.is_empty() {
            eprintln!("Error: Invalid tool names specified:");
            for tool in &unknown {
                eprintln!("  - {tool}");
            }
            eprintln!();
            eprintln!("Tip: Use --list-tools to see all available tools");
            return Err(anyhow::anyhow!("Invalid tool names specified"));
        }
        registry = filtered;
    }

    if cli.list_tools {
        println!("Available tools:");
        for tool in registry.iter() {
            println!("  - {} ({} {})", tool.name, tool.method, tool.path_template);
        }
        return Ok(());
    }

    match &compilation.base_url {
        Some(url) => log::info!("Dispatching requests to {url}"),
        None => log::warn!("No base URL configured; request paths will be sent as-is"),
    }

    let dispatcher = Dispatcher::new(compilation.base_url, cli.dispatch_config())
        .context("Failed to set up the HTTP dispatcher")?;
    let service = ToolService::new(
        Arc::new(registry),
        dispatcher,
        Normalizer::new(cli.error_body_limit),
    );

    let instructions = api.title().map(|title| {
        format!("Tools for the {title} HTTP API. Each tool calls one API operation.")
    });

    stdio::serve_stdio(Arc::new(service), sessions, shutdown_token, instructions).await?;

    Ok(())
}

/// Wait for interrupt signal (cross-platform)
#[cfg(unix)]
async fn wait_for_interrupt() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm_result = signal(SignalKind::terminate());
    let mut sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result.as_mut(), sigint_result.as_mut()) {
        (Ok(sigterm), Ok(sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {}
                _ = sigint.recv() => {}
            }
        }
        (Ok(sigterm), Err(_)) => {
            let _ = sigterm.recv().await;
        }
        (Err(_), Ok(sigint)) => {
            let _ = sigint.recv().await;
        }
        (Err(_), Err(_)) => {
            let () = std::future::pending().await;
        }
    }
}

/// Wait for interrupt signal (cross-platform)
#[cfg(windows)]
async fn wait_for_interrupt() {
    use tokio::signal::windows;

    match windows::ctrl_c() {
        Ok(mut ctrl_c) => {
            let _ = ctrl_c.recv().await;
        }
        Err(_) => {
            let () = std::future::pending().await;
        }
    }
}
