use std::sync::Arc;

use clap::{Parser, Subcommand};
use remote_client::session::RetryPolicy;
use remote_client::sink::ConsoleSink;
use remote_client::{Poller, RemoteClient, RenderSink, Session, StateStore};
use remote_proto::config::Config;
use serde_json::Value;

#[derive(Parser, Debug)]
#[command(name = "mpv-remote", about = "Mirror and drive mpv through the HTTP bridge")]
struct Args {
    /// Bridge base URL (overrides `client.base_url` from config.toml)
    #[arg(long)]
    url: Option<String>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Follow the event feed and playback position until Ctrl-C
    Watch,
    /// Read one property
    Get { name: String },
    /// Write one property; VALUE is JSON, or a plain string
    Set { name: String, value: String },
    /// Run a command; each ARG is JSON, or a plain string
    Cmd { name: String, args: Vec<String> },
}

/// `50` → number, `true` → bool, `absolute+exact` → string.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn init_logging() -> anyhow::Result<()> {
    let data_dir = remote_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("client.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    // RUST_LOG wins; keep HTTP client internals quiet by default.
    let log_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "info,hyper_util=warn,reqwest=warn,hyper=warn".to_string());
    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_env_filter(log_filter.as_str())
        .with_ansi(false)
        .init();

    eprintln!("mpv-remote log: {}", log_path.display());
    Ok(())
}

async fn watch(config: &Config, remote: &RemoteClient) {
    let store = StateStore::with_placeholders();
    let sink: Arc<dyn RenderSink> = Arc::new(ConsoleSink::new());

    let session = Session::new(remote, &config.client.event_path, store.clone(), sink.clone())
        .with_retry(RetryPolicy::from_config(&config.stream))
        .with_frame_limit(config.stream.max_frame_bytes);
    let poller = Poller::from_config(remote, &config.poll, store, sink);

    tokio::select! {
        err = session.run() => {
            tracing::error!("event feed abandoned: {}", err);
            eprintln!("event feed abandoned: {}", err);
        }
        _ = poller.run() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted");
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging()?;

    let config = Config::load().unwrap_or_else(|e| {
        tracing::warn!("config: {}; using defaults", e);
        Config::default()
    });
    let base_url = args.url.unwrap_or_else(|| config.client.base_url.clone());
    tracing::info!("mpv-remote starting against {}", base_url);
    let remote = RemoteClient::new(base_url);

    match args.command {
        Cmd::Watch => watch(&config, &remote).await,
        Cmd::Get { name } => {
            let value = remote.get_property(&name).await?;
            println!("{}", value);
        }
        Cmd::Set { name, value } => {
            remote.set_property(&name, parse_value(&value)).await?;
        }
        Cmd::Cmd { name, args } => {
            let args = args.iter().map(|a| parse_value(a)).collect();
            remote.command(&name, args).await?;
        }
    }
    Ok(())
}
