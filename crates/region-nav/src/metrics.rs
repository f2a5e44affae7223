use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Id path of an entity: `11`, `11/1101`, `11/1101/1101010`, and for villages
/// `11/1101/1101010/<village name>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct EntityKey(String);

impl EntityKey {
    pub fn province(province_id: &str) -> Self {
        Self(province_id.to_string())
    }

    pub fn regency(province_id: &str, regency_id: &str) -> Self {
        Self(format!("{province_id}/{regency_id}"))
    }

    pub fn district(province_id: &str, regency_id: &str, district_id: &str) -> Self {
        Self(format!("{province_id}/{regency_id}/{district_id}"))
    }

    pub fn village(district: &EntityKey, village_name: &str) -> Self {
        Self(format!("{}/{}", district.0, village_name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopItem {
    pub name: String,
    pub count: u64,
}

pub trait MetricsProvider: Send + Sync {
    fn count(&self, key: &EntityKey) -> Option<u64>;

    /// Best-selling items, highest count first.
    fn top_items(&self, _key: &EntityKey) -> Vec<TopItem> {
        Vec::new()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoMetrics;

impl MetricsProvider for NoMetrics {
    fn count(&self, _key: &EntityKey) -> Option<u64> {
        None
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsEntry {
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub top: Vec<TopItem>,
}

/// Metrics read from a JSON object keyed by [`EntityKey`] strings. Entities
/// without their own count report the sum of their children's counts.
#[derive(Debug, Clone, Default)]
pub struct StaticMetrics {
    entries: HashMap<String, MetricsEntry>,
}

impl StaticMetrics {
    pub fn new(entries: HashMap<String, MetricsEntry>) -> Self {
        Self { entries }
    }

    pub fn from_json(data: &[u8]) -> Result<Self> {
        let entries: HashMap<String, MetricsEntry> = serde_json::from_slice(data)?;
        log::info!("loaded metrics for {} entities", entries.len());
        Ok(Self::new(entries))
    }

    fn children_sum(&self, key: &str) -> Option<u64> {
        let prefix = format!("{key}/");
        // children may only appear as ancestors of deeper keys
        let mut children: Vec<&str> = self
            .entries
            .keys()
            .filter_map(|k| k.strip_prefix(&prefix))
            .filter_map(|rest| rest.split('/').next())
            .collect();
        children.sort_unstable();
        children.dedup();

        let mut total = None;
        for child in children {
            if let Some(n) = self.count_str(&format!("{prefix}{child}")) {
                total = Some(total.unwrap_or(0) + n);
            }
        }
        total
    }

    fn count_str(&self, key: &str) -> Option<u64> {
        self.entries
            .get(key)
            .and_then(|e| e.count)
            .or_else(|| self.children_sum(key))
    }
}

impl MetricsProvider for StaticMetrics {
    fn count(&self, key: &EntityKey) -> Option<u64> {
        self.count_str(key.as_str())
    }

    fn top_items(&self, key: &EntityKey) -> Vec<TopItem> {
        let mut items = self
            .entries
            .get(key.as_str())
            .map(|e| e.top.clone())
            .unwrap_or_default();
        items.sort_by(|a, b| b.count.cmp(&a.count));
        items
    }
}
