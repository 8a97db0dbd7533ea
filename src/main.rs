//! netassist - chat with a tool-calling agent that manages your routers
//!
//! Reads prompts from stdin. `/restart` opens a fresh conversation,
//! `/metrics` prints Prometheus metrics, `/exit` quits. Ctrl-C aborts the
//! exchange in flight.

use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

use netassist::agent::{AssistantsClient, SessionManager};
use netassist::config::AppConfig;
use netassist::device::{SessionExecutor, SshConnector};
use netassist::dispatch::DeviceDispatcher;
use netassist::inventory::{CredentialResolver, InventorySource};
use netassist::tools::librenms::LibreNmsTool;
use netassist::tools::{
    ConfigCommandsTool, LibreNmsClient, LocalTimeTool, ShowCommandsTool, ToolDispatcher, ToolRegistry,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenvy::dotenv().ok();
    let config = AppConfig::parse();
    netassist::tracing::init_tracing("netassist", config.otlp_endpoint.as_deref())?;

    let mut manager = build_manager(&config);
    let result = repl(&mut manager).await;

    netassist::tracing::shutdown_tracing();
    result
}

fn build_manager(config: &AppConfig) -> SessionManager {
    let executor = Arc::new(SessionExecutor::new(
        Arc::new(SshConnector::new(config.host_key_policy())),
        config.executor_settings(),
    ));
    let dispatcher = Arc::new(
        DeviceDispatcher::new(
            InventorySource::File(config.inventory.clone()),
            CredentialResolver::new(config.secret_store(), config.secret_name.clone()),
            executor,
        )
        .with_unmatched_policy(config.unmatched_policy()),
    );

    let mut registry = ToolRegistry::new();
    registry
        .register(Arc::new(ShowCommandsTool::new(dispatcher.clone())))
        .register(Arc::new(ConfigCommandsTool::new(dispatcher)))
        .register(Arc::new(LocalTimeTool));
    match config.librenms() {
        Some((url, token)) => {
            for tool in LibreNmsTool::all(Arc::new(LibreNmsClient::new(url, token))) {
                registry.register(tool);
            }
        }
        None => warn!("LIBRENMS_BASE_URL or LIBRENMS_API_TOKEN not set; monitoring tools disabled"),
    }
    info!(tools = registry.len(), inventory = %config.inventory.display(), "tools registered");

    let service = Arc::new(AssistantsClient::new(&config.api_base_url, &config.api_key));
    SessionManager::new(service, ToolDispatcher::new(registry), config.agent_config())
}

async fn repl(manager: &mut SessionManager) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let session = manager.start().await?;
    for message in &session.messages {
        println!("assistant> {}\n", message.content);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"you> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let prompt = line.trim();

        match prompt {
            "" => continue,
            "/exit" | "/quit" => break,
            "/restart" => {
                let session = manager.reset().await?;
                println!("[session restarted: {}]", session.id);
                for message in &session.messages {
                    println!("assistant> {}\n", message.content);
                }
                continue;
            }
            "/metrics" => {
                println!("{}", netassist::metrics::gather_text());
                continue;
            }
            _ => {}
        }

        let cancel = manager.cancel_token();
        let ctrl_c = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
        let result = manager.send(prompt).await;
        ctrl_c.abort();

        match result {
            Ok(exchange) => {
                for reply in &exchange.replies {
                    println!("assistant> {}\n", reply);
                }
                if exchange.tool_calls_made > 0 {
                    println!(
                        "[{} tool calls in {} rounds, trace {}]",
                        exchange.tool_calls_made, exchange.tool_rounds, exchange.trace_id
                    );
                }
            }
            Err(e) => println!("[error] {}", e),
        }
    }

    if let Some(session) = manager.session() {
        info!(thread_id = %session.id, messages = session.messages.len(), "exiting");
    }
    Ok(())
}
