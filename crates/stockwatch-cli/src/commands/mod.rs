mod favorites;
mod history;
mod search;

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use stockwatch_core::{ClientConfig, JsonFileStore, ReqwestHttpClient, StockClient};

use crate::cli::{Cli, Command};
use crate::error::CliError;
use crate::metadata::{Envelope, Metadata};

pub struct CommandResult {
    pub data: Value,
    pub warnings: Vec<String>,
}

impl CommandResult {
    pub fn ok(data: Value) -> Self {
        Self {
            data,
            warnings: Vec::new(),
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

pub async fn run(cli: &Cli) -> Result<Envelope, CliError> {
    let client = build_client(cli)?;
    let started = Instant::now();

    let (name, result) = match &cli.command {
        Command::Favorites => ("favorites", favorites::list(&client).await?),
        Command::Add(args) => ("add", favorites::add(args, &client).await?),
        Command::Remove(args) => ("remove", favorites::remove(args, &client).await?),
        Command::Sync => ("sync", favorites::sync(&client).await?),
        Command::History(args) => ("history", history::run(args, &client).await?),
        Command::Search(args) => ("search", search::run(args, &client).await?),
        Command::Hot => ("hot", search::hot(&client).await?),
    };

    let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    let mut meta = Metadata::new(name, latency_ms, client.cache_stats().await);
    for warning in result.warnings {
        meta.push_warning(warning);
    }

    Ok(Envelope {
        meta,
        data: result.data,
    })
}

fn build_client(cli: &Cli) -> Result<StockClient, CliError> {
    let mut transport = ReqwestHttpClient::new(cli.base_url.as_str());
    if let Some(service) = &cli.service {
        transport = transport.with_service(service.as_str());
    }
    tracing::debug!(base_url = %cli.base_url, state_file = %cli.state_file.display(), "building client");

    let config = ClientConfig::default().with_timeout(Duration::from_millis(cli.timeout_ms));
    let client = StockClient::builder(Arc::new(transport))
        .store(Arc::new(JsonFileStore::new(cli.state_file.clone())))
        .config(config)
        .build()?;
    Ok(client)
}
