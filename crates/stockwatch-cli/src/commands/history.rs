use serde::Serialize;
use stockwatch_core::{HistoryPoint, Period, StockClient};

use crate::cli::HistoryArgs;
use crate::error::CliError;

use super::CommandResult;

#[derive(Debug, Serialize)]
struct HistoryResponseData {
    symbol: String,
    series: &'static str,
    period: Period,
    points: Vec<HistoryPoint>,
}

pub async fn run(args: &HistoryArgs, client: &StockClient) -> Result<CommandResult, CliError> {
    let (series, points) = if args.turnover {
        ("turnover", client.get_turnover(&args.symbol, args.period).await?)
    } else {
        ("market_cap", client.get_history(&args.symbol, args.period).await?)
    };

    let empty = points.is_empty();
    let data = serde_json::to_value(HistoryResponseData {
        symbol: args.symbol.trim().to_owned(),
        series,
        period: args.period,
        points,
    })?;

    let mut result = CommandResult::ok(data);
    if empty {
        result = result.with_warning("the service returned no data points");
    }
    Ok(result)
}
