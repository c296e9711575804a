//! `relay serve`: the Telegram bot plus the health endpoint.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::info;

use relay::chat::{ChatSink, Dispatcher, TelegramClient};
use relay::config::Config;
use relay::server::{AppState, ServerConfig, start_server};
use relay::session::SessionRegistry;

use super::build_orchestrator;

/// How long to wait for cancelled runs to commit their partial work.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

pub async fn cmd_serve(config: Config, port: Option<u16>, dev: bool) -> Result<()> {
    config.require_projects()?;
    let (token, chat_id) = config.require_chat()?;

    let registry = Arc::new(SessionRegistry::new());
    let orchestrator = build_orchestrator(&config, Arc::clone(&registry));
    let telegram = Arc::new(TelegramClient::new(token, chat_id));
    let sink: Arc<dyn ChatSink> = telegram.clone();
    let dispatcher = Dispatcher::new(orchestrator, sink);

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            signal_token.cancel();
        }
    });

    let state = Arc::new(AppState {
        registry: Arc::clone(&registry),
        projects: config.project_names(),
    });
    let server_config = ServerConfig {
        port: port.unwrap_or(config.port),
        dev_mode: dev,
    };

    let server_token = shutdown.clone();
    let server = async move {
        let result = start_server(server_config, state, server_token.clone()).await;
        // A server that cannot bind takes the bot down with it.
        server_token.cancel();
        result
    };
    let (server_result, ()) = tokio::join!(server, dispatcher.run_polling(&telegram, shutdown));

    dispatcher.shutdown(DRAIN_TIMEOUT).await;
    server_result
}
