use serde::Serialize;
use stockwatch_core::{Instrument, StockClient};

use crate::cli::SearchArgs;
use crate::error::CliError;

use super::CommandResult;

#[derive(Debug, Serialize)]
struct SearchResponseData {
    keyword: String,
    results: Vec<Instrument>,
}

pub async fn run(args: &SearchArgs, client: &StockClient) -> Result<CommandResult, CliError> {
    if args.limit == 0 {
        return Err(CliError::Command(String::from(
            "--limit must be greater than zero",
        )));
    }

    let mut results = client.search(&args.keyword).await?;
    let truncated = results.len() > args.limit;
    results.truncate(args.limit);

    let data = serde_json::to_value(SearchResponseData {
        keyword: args.keyword.trim().to_owned(),
        results,
    })?;
    let mut result = CommandResult::ok(data);
    if truncated {
        result = result.with_warning(format!("results truncated to {}", args.limit));
    }
    Ok(result)
}

pub async fn hot(client: &StockClient) -> Result<CommandResult, CliError> {
    let instruments = client.hot_list().await?;
    Ok(CommandResult::ok(serde_json::to_value(instruments)?))
}
