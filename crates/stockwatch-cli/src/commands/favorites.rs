use serde::Serialize;
use stockwatch_core::{Favorites, Provenance, StockClient, SyncOutcome};

use crate::cli::{AddArgs, RemoveArgs};
use crate::error::CliError;

use super::CommandResult;

#[derive(Debug, Serialize)]
struct AddResponseData {
    symbol: String,
    is_new: bool,
    favorites: Favorites,
}

#[derive(Debug, Serialize)]
struct RemoveResponseData {
    symbol: String,
    favorites: Favorites,
}

pub async fn list(client: &StockClient) -> Result<CommandResult, CliError> {
    let favorites = client.get_favorites().await?;
    let pending = favorites
        .items
        .iter()
        .filter(|item| item.provenance == Provenance::LocalOnly)
        .count();

    let mut result = CommandResult::ok(serde_json::to_value(&favorites)?);
    if pending > 0 {
        result = result.with_warning(format!(
            "{pending} entries are not yet confirmed by the server"
        ));
    }
    Ok(result)
}

pub async fn add(args: &AddArgs, client: &StockClient) -> Result<CommandResult, CliError> {
    let outcome = client.add_favorite_named(&args.symbol, &args.name).await?;
    let data = serde_json::to_value(AddResponseData {
        symbol: args.symbol.trim().to_owned(),
        is_new: outcome.is_new,
        favorites: Favorites::from(client.current_favorites().as_ref()),
    })?;

    let mut result = CommandResult::ok(data);
    if !outcome.is_new {
        result = result.with_warning(format!("{} is already on the watch-list", args.symbol.trim()));
    }
    Ok(result)
}

pub async fn remove(args: &RemoveArgs, client: &StockClient) -> Result<CommandResult, CliError> {
    client.remove_favorite(&args.symbol).await?;
    let data = serde_json::to_value(RemoveResponseData {
        symbol: args.symbol.trim().to_owned(),
        favorites: Favorites::from(client.current_favorites().as_ref()),
    })?;
    Ok(CommandResult::ok(data))
}

pub async fn sync(client: &StockClient) -> Result<CommandResult, CliError> {
    let outcome: SyncOutcome = client.sync_favorites().await;
    let mut warnings = Vec::new();
    if outcome.result.fallback_to_local {
        let reason = outcome.result.error.as_deref().unwrap_or("unknown error");
        warnings.push(format!("service unreachable, showing local list: {reason}"));
    }
    if outcome.result.failed > 0 {
        warnings.push(format!(
            "{} of {} local entries could not be uploaded",
            outcome.result.failed, outcome.result.total
        ));
    }

    Ok(CommandResult {
        data: serde_json::to_value(&outcome)?,
        warnings,
    })
}
