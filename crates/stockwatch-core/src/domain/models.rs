use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::Date;

use crate::{Market, Symbol, UtcDateTime, ValidationError};

/// Origin of a watch-list entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Added on this device and not yet known to the server.
    LocalOnly,
    /// Present in the server's authoritative list.
    ServerConfirmed,
}

/// One watch-list entry.
///
/// Deserialization also accepts the older stored shape
/// `{symbol, name, market: "A股", timestamp: <unix millis>}`: the market
/// label is mapped or re-derived from the code, and a missing provenance
/// means the entry was never confirmed by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "StoredItem")]
pub struct WatchListItem {
    pub symbol: Symbol,
    #[serde(default)]
    pub name: String,
    pub market: Market,
    pub added_at: UtcDateTime,
    pub provenance: Provenance,
}

impl WatchListItem {
    pub fn new(
        symbol: Symbol,
        name: impl Into<String>,
        market: Market,
        added_at: UtcDateTime,
        provenance: Provenance,
    ) -> Self {
        Self {
            symbol,
            name: name.into(),
            market,
            added_at,
            provenance,
        }
    }

    /// A freshly added local entry stamped with the current time.
    pub fn local(symbol: Symbol, name: impl Into<String>, market: Market) -> Self {
        Self::new(symbol, name, market, UtcDateTime::now(), Provenance::LocalOnly)
    }

    pub fn confirmed(mut self) -> Self {
        self.provenance = Provenance::ServerConfirmed;
        self
    }
}

#[derive(Debug, Deserialize)]
struct StoredItem {
    #[serde(alias = "code", alias = "stock_code")]
    symbol: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    market: Option<Value>,
    #[serde(default)]
    added_at: Option<String>,
    #[serde(default)]
    timestamp: Option<i64>,
    #[serde(default)]
    provenance: Option<Provenance>,
}

impl TryFrom<StoredItem> for WatchListItem {
    type Error = ValidationError;

    fn try_from(stored: StoredItem) -> Result<Self, Self::Error> {
        let (symbol, derived) = Symbol::parse_with_market(&stored.symbol)?;
        let market = stored
            .market
            .as_ref()
            .and_then(Value::as_str)
            .and_then(Market::from_label)
            .unwrap_or(derived);
        let added_at = match (stored.added_at.as_deref(), stored.timestamp) {
            (Some(raw), _) => UtcDateTime::parse(raw)?,
            (None, Some(millis)) => UtcDateTime::from_unix_millis(millis),
            (None, None) => UtcDateTime::epoch(),
        };
        Ok(Self {
            symbol,
            name: stored.name.unwrap_or_default(),
            market,
            added_at,
            provenance: stored.provenance.unwrap_or(Provenance::LocalOnly),
        })
    }
}

/// Immutable, newest-first watch-list holding at most one item per symbol.
///
/// Every mutation returns a new value; callers swap it in wholesale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<WatchListItem>", into = "Vec<WatchListItem>")]
pub struct WatchList {
    items: Vec<WatchListItem>,
}

impl WatchList {
    /// Builds a list from arbitrary items: duplicates collapse to the newest
    /// entry and the result is ordered newest-first (ties keep input order).
    pub fn new(items: impl IntoIterator<Item = WatchListItem>) -> Self {
        let mut deduped: Vec<WatchListItem> = Vec::new();
        for item in items {
            match deduped.iter_mut().find(|existing| existing.symbol == item.symbol) {
                Some(existing) if item.added_at > existing.added_at => *existing = item,
                Some(_) => {}
                None => deduped.push(item),
            }
        }
        deduped.sort_by(|left, right| right.added_at.cmp(&left.added_at));
        Self { items: deduped }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[WatchListItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.position(symbol).is_some()
    }

    pub fn position(&self, symbol: &Symbol) -> Option<usize> {
        self.items.iter().position(|item| &item.symbol == symbol)
    }

    pub fn get(&self, symbol: &Symbol) -> Option<&WatchListItem> {
        self.items.iter().find(|item| &item.symbol == symbol)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.items.iter().map(|item| &item.symbol)
    }

    /// New list with `item` at the front, replacing any entry for the same symbol.
    pub fn with_front(&self, item: WatchListItem) -> Self {
        self.with_inserted(0, item)
    }

    /// New list with `item` at `index` (clamped), replacing any entry for the same symbol.
    pub fn with_inserted(&self, index: usize, item: WatchListItem) -> Self {
        let mut items: Vec<WatchListItem> = self
            .items
            .iter()
            .filter(|existing| existing.symbol != item.symbol)
            .cloned()
            .collect();
        let index = index.min(items.len());
        items.insert(index, item);
        Self { items }
    }

    /// New list without `symbol`. Unchanged copy when absent.
    pub fn without(&self, symbol: &Symbol) -> Self {
        Self {
            items: self
                .items
                .iter()
                .filter(|item| &item.symbol != symbol)
                .cloned()
                .collect(),
        }
    }

    /// Items of this list whose symbol is absent from `other`.
    pub fn missing_from<'a>(
        &'a self,
        other: &'a WatchList,
    ) -> impl Iterator<Item = &'a WatchListItem> {
        self.items.iter().filter(move |item| !other.contains(&item.symbol))
    }

    /// Union of `self` with extra items, re-ordered newest-first.
    pub fn merged_with(&self, extra: impl IntoIterator<Item = WatchListItem>) -> Self {
        Self::new(self.items.iter().cloned().chain(extra))
    }
}

impl From<Vec<WatchListItem>> for WatchList {
    fn from(value: Vec<WatchListItem>) -> Self {
        Self::new(value)
    }
}

impl From<WatchList> for Vec<WatchListItem> {
    fn from(value: WatchList) -> Self {
        value.items
    }
}

/// Read model returned by the watch-list read API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Favorites {
    pub count: usize,
    pub items: Vec<WatchListItem>,
}

impl From<&WatchList> for Favorites {
    fn from(value: &WatchList) -> Self {
        Self {
            count: value.len(),
            items: value.items().to_vec(),
        }
    }
}

/// Result of adding a symbol to the watch-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddOutcome {
    pub is_new: bool,
}

/// One observation of a historical series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    #[serde(with = "iso_date")]
    pub date: Date,
    /// Market cap or turnover, in units of 100 million.
    pub value: f64,
}

/// Search / hot-list entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    pub symbol: Symbol,
    pub name: String,
    pub market: Market,
}

mod iso_date {
    use serde::de::Error as DeError;
    use serde::{Deserialize, Deserializer, Serializer};
    use time::macros::format_description;
    use time::Date;

    pub fn serialize<S>(date: &Date, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(date)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Date, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Date::parse(&value, format_description!("[year]-[month]-[day]")).map_err(D::Error::custom)
    }
}
