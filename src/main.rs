use relaybus::{init_logging, Config, EventBus, RemoteExt, BUILD_DATE, VERSION};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Event carrying one line of text typed into any node
const CHAT_EVENT: &str = "chat";

/// Environment variable naming the config file
const CONFIG_ENV: &str = "RELAYBUS_CONFIG";

fn load_config() -> anyhow::Result<Config> {
    let explicit = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

    if let Some(path) = explicit {
        tracing::info!("Loading config from {}", path.display());
        return Ok(Config::load_from_file(&path)?);
    }

    match Config::default_path() {
        Ok(path) => Ok(Config::load_or_default(&path)?),
        Err(e) => {
            tracing::warn!("{}, using defaults", e);
            Ok(Config::default())
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging()?;
    tracing::info!("relaybus {} (built {})", VERSION, BUILD_DATE);

    let config = load_config()?;
    let bus = Arc::new(EventBus::with_config(config.to_bus_config()));

    bus.default_scope().on(CHAT_EVENT, |args: &[Value]| {
        for arg in args {
            match arg {
                Value::String(text) => println!("{}", text),
                other => println!("{}", other),
            }
        }
    });

    let remote = bus
        .enable_remote_with_config(config.to_bridge_config())
        .await?;
    tracing::info!("Joined {} as {}", remote.endpoint(), remote.role());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line(), if stdin_open => match line? {
                Some(line) => {
                    let line = line.trim();
                    if !line.is_empty() {
                        bus.publish_all(CHAT_EVENT, vec![Value::String(line.to_string())])?;
                    }
                }
                None => {
                    tracing::info!("Input closed, relaying until Ctrl-C");
                    stdin_open = false;
                }
            },
        }
    }

    bus.shutdown().await;
    Ok(())
}
