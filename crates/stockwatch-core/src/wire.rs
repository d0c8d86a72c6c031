//! Response body decoding for the stock service.

use serde::Deserialize;
use serde_json::Value;
use time::{Date, Duration};

use crate::api_error::ApiError;
use crate::{HistoryPoint, Instrument, Provenance, Symbol, UtcDateTime, WatchList, WatchListItem};

#[derive(Debug, Deserialize)]
struct RawFavorite {
    #[serde(alias = "symbol", alias = "stock_code")]
    code: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FavoritesBody {
    Envelope {
        #[serde(default)]
        favorites: Vec<RawFavorite>,
    },
    Bare(Vec<RawFavorite>),
}

/// Decodes `GET /favorites` into a server-confirmed watch-list.
///
/// Entries with an invalid code are dropped; an unreadable `created_at`
/// sorts the entry last.
pub(crate) fn parse_favorites(body: &str) -> Result<WatchList, ApiError> {
    let parsed: FavoritesBody = serde_json::from_str(body)
        .map_err(|e| ApiError::parse(format!("invalid favorites response: {e}")))?;
    let raw = match parsed {
        FavoritesBody::Envelope { favorites } => favorites,
        FavoritesBody::Bare(favorites) => favorites,
    };

    let items = raw.into_iter().filter_map(|favorite| {
        let (symbol, market) = match Symbol::parse_with_market(&favorite.code) {
            Ok(parsed) => parsed,
            Err(error) => {
                tracing::warn!(code = %favorite.code, %error, "skipping favorite with invalid code");
                return None;
            }
        };
        let added_at = favorite
            .created_at
            .as_deref()
            .and_then(|value| UtcDateTime::parse(value).ok())
            .unwrap_or_else(UtcDateTime::epoch);
        Some(WatchListItem::new(
            symbol,
            favorite.name,
            market,
            added_at,
            Provenance::ServerConfirmed,
        ))
    });

    Ok(WatchList::new(items))
}

/// Decodes a market-cap or turnover series into weekly points ending at `today`.
///
/// Accepted shapes: `[n, [v..]]`, `{"data": [v..]}`, `[n, "v"..]` and `[v..]`.
/// Any other valid JSON yields an empty series. Values that are not numeric
/// are skipped before dates are assigned.
pub(crate) fn parse_series(body: &str, today: Date) -> Result<Vec<HistoryPoint>, ApiError> {
    let parsed: Value = serde_json::from_str(body)
        .map_err(|e| ApiError::parse(format!("invalid series response: {e}")))?;

    let values: Vec<f64> = series_values(&parsed)
        .iter()
        .filter_map(numeric_value)
        .collect();

    // Dated newest first so the oldest points drop once the calendar runs out.
    let mut points: Vec<HistoryPoint> = values
        .into_iter()
        .rev()
        .enumerate()
        .map_while(|(weeks_back, value)| {
            let date = today.checked_sub(Duration::weeks(weeks_back as i64))?;
            Some(HistoryPoint { date, value })
        })
        .collect();
    points.reverse();
    Ok(points)
}

fn series_values(value: &Value) -> &[Value] {
    match value {
        Value::Array(items) if items.len() >= 2 && items[1].is_array() => {
            items[1].as_array().map_or(&[][..], Vec::as_slice)
        }
        Value::Object(map) => map
            .get("data")
            .and_then(Value::as_array)
            .map_or(&[][..], Vec::as_slice),
        Value::Array(items)
            if items.len() > 1 && items[0].is_number() && items[1..].iter().all(Value::is_string) =>
        {
            &items[1..]
        }
        Value::Array(items) => items,
        _ => &[],
    }
}

fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|value| value.is_finite())
}

#[derive(Debug, Deserialize)]
struct RawInstrument {
    #[serde(alias = "code")]
    symbol: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InstrumentsBody {
    Envelope { results: Vec<RawInstrument> },
    Bare(Vec<RawInstrument>),
}

/// Decodes `GET /search` and `GET /hot`.
pub(crate) fn parse_instruments(body: &str) -> Result<Vec<Instrument>, ApiError> {
    let parsed: InstrumentsBody = serde_json::from_str(body)
        .map_err(|e| ApiError::parse(format!("invalid instrument list: {e}")))?;
    let raw = match parsed {
        InstrumentsBody::Envelope { results } => results,
        InstrumentsBody::Bare(results) => results,
    };

    Ok(raw
        .into_iter()
        .filter_map(|instrument| {
            let (symbol, market) = Symbol::parse_with_market(&instrument.symbol).ok()?;
            Some(Instrument {
                symbol,
                name: instrument.name,
                market,
            })
        })
        .collect())
}
