use anyhow::{anyhow, Result};
use ddns::dns::{Bridge, Handler};
use ddns::{Config, DynRecordStore, Reaper, RedbRecordStore, SharedConfig};
use is_terminal::IsTerminal;
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_init();

    let mut first_args = std::env::args().take(2);
    let (program_name, config_file) = (
        first_args.next().unwrap_or("ddns".to_string()),
        first_args.next(),
    );

    let config = config_init(&program_name, config_file)?;

    tracing::info!("opening record store {}", config.store_path.display());
    let redb_store = RedbRecordStore::connect(&config.store_path, config.store_open_timeout).await?;
    let store: DynRecordStore = Arc::new(redb_store.clone());
    let handler = Handler::new(config.clone(), store.clone())?;

    let dns_server = ddns::new_dns(config.clone(), handler.clone()).await?;
    tracing::info!("DNS listening on UDP {}", dns_server.local_addr()?);
    let dns_handle = tokio::spawn(dns_server.block_until_done());

    tracing::info!("API listening on {}", &config.api_bind_addr);
    let api_server = ddns::new_http(config.clone(), store.clone(), Bridge::new(handler));
    let api_handle = tokio::spawn(api_server);

    let reaper = Reaper::spawn(store, config.reaper_interval);

    let result = tokio::select! {
        _ = signal::ctrl_c() => {
            tracing::info!("quitting from signal");
            Ok(())
        },
        Ok(dns_res) = dns_handle => {
            dns_res.map_err(|err| anyhow!("DNS server failed: {err}"))
        }
        Ok(api_res) = api_handle => {
            api_res.map_err(|err| anyhow!("API server failed: {err}"))
        }
    };

    reaper.stop().await;
    redb_store.disconnect();
    tracing::info!("goodbye");
    result
}

fn tracing_init() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_ansi(std::io::stdout().is_terminal()))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ddns=info".into()),
        )
        .init();
}

fn config_init(program_name: &str, config_file: Option<String>) -> Result<SharedConfig> {
    match config_file {
        None => Err(anyhow!("usage: {program_name} /path/to/config.json")),
        Some(config_file) => {
            let config = Config::try_from_file(&config_file)?;
            tracing::debug!("loaded config from {config_file}");
            Ok(Arc::new(config))
        }
    }
}
