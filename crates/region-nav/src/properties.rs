use serde_json::Value;

use crate::geometry::Feature;
use crate::navigation::Level;

pub const PROV_ID: &str = "prov_id";
pub const NAME: &str = "name";
pub const REGENCY: &str = "regency";
pub const DISTRICT: &str = "district";
pub const VILLAGE: &str = "village";
/// Explicit per-feature statistic, preferred over the metrics provider.
pub const COUNT: &str = "customerCount";

/// Which properties carry the display name and the join key at a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NameKeys {
    /// Tried in order; the first non-empty one wins.
    pub display: &'static [&'static str],
    pub join: Option<&'static str>,
}

impl Level {
    pub fn name_keys(self) -> NameKeys {
        match self {
            Level::Province => NameKeys {
                display: &[NAME],
                join: Some(PROV_ID),
            },
            Level::Regency => NameKeys {
                display: &[NAME, REGENCY],
                join: Some(PROV_ID),
            },
            Level::District => NameKeys {
                display: &[DISTRICT, NAME],
                join: Some(REGENCY),
            },
            Level::Village => NameKeys {
                display: &[VILLAGE, NAME],
                join: Some(DISTRICT),
            },
        }
    }
}

/// `(display name, join key)` read from a feature at a given level.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureKey {
    pub display_name: Option<String>,
    pub join_key: Option<String>,
}

impl FeatureKey {
    pub fn read(feature: &Feature, level: Level) -> Self {
        let keys = level.name_keys();
        let display_name = keys.display.iter().find_map(|k| prop_str(feature, k));
        let join_key = keys.join.and_then(|k| prop_str(feature, k));
        Self {
            display_name,
            join_key,
        }
    }

    pub fn name(&self) -> &str {
        self.display_name.as_deref().unwrap_or("")
    }
}

/// String value of a property. Numbers are rendered as strings because some
/// files carry `prov_id` as a bare integer; blank strings count as absent.
pub fn prop_str(feature: &Feature, key: &str) -> Option<String> {
    match feature.property(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn explicit_count(feature: &Feature) -> Option<u64> {
    feature.property(COUNT)?.as_u64().filter(|&n| n > 0)
}

/// A file is village-granular when its first feature names a village.
pub fn is_village_granularity(features: &[Feature]) -> bool {
    features
        .first()
        .is_some_and(|f| prop_str(f, VILLAGE).is_some())
}

/// Lowercase with surrounding whitespace trimmed and inner runs collapsed.
pub fn normalize_name(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

pub fn district_of(feature: &Feature) -> Option<String> {
    prop_str(feature, DISTRICT)
}
