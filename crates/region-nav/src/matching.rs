use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::error::{NavError, Result};
use crate::index::{District, Entity, Province, Regency, RegionIndex};
use crate::navigation::Level;
use crate::properties::normalize_name;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Take the first candidate in child-list order.
    #[default]
    FirstInOrder,
    /// Fail with [`NavError::AmbiguousMatch`].
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Exact,
    Contains,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AmbiguityReport {
    pub level: Level,
    pub feature_name: String,
    pub candidates: Vec<String>,
    pub chosen: String,
}

pub trait MatchObserver: Send + Sync {
    fn ambiguous(&self, report: &AmbiguityReport);

    fn unmatched(&self, level: Level, feature_name: &str) {
        log::debug!("no {level} matches feature {feature_name:?}");
    }
}

/// Logs ambiguous matches at `warn`.
#[derive(Debug, Default)]
pub struct LogObserver;

impl MatchObserver for LogObserver {
    fn ambiguous(&self, report: &AmbiguityReport) {
        log::warn!(
            "ambiguous {} match for {:?}: {:?}, using {:?}",
            report.level,
            report.feature_name,
            report.candidates,
            report.chosen
        );
    }
}

/// Keeps one report per distinct ambiguity for later inspection. A feature
/// that is matched again on every re-render is reported once.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    reports: Mutex<Vec<AmbiguityReport>>,
}

impl RecordingObserver {
    pub fn reports(&self) -> Vec<AmbiguityReport> {
        self.reports
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

impl MatchObserver for RecordingObserver {
    fn ambiguous(&self, report: &AmbiguityReport) {
        let Ok(mut reports) = self.reports.lock() else {
            return;
        };
        let seen = reports.iter().any(|r| {
            r.level == report.level
                && r.feature_name == report.feature_name
                && r.candidates == report.candidates
        });
        if !seen {
            LogObserver.ambiguous(report);
            reports.push(report.clone());
        }
    }
}

/// The parent whose children are searched.
#[derive(Debug, Clone, Copy)]
pub enum Scope<'a> {
    Country(&'a RegionIndex),
    Province(&'a Province),
    Regency(&'a Regency),
}

impl Scope<'_> {
    /// Level of the entities this scope contains.
    pub fn child_level(&self) -> Level {
        match self {
            Scope::Country(_) => Level::Province,
            Scope::Province(_) => Level::Regency,
            Scope::Regency(_) => Level::District,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EntityRef<'a> {
    Province(&'a Province),
    Regency(&'a Regency),
    District(&'a District),
}

impl EntityRef<'_> {
    pub fn id(&self) -> &str {
        match self {
            EntityRef::Province(p) => p.id(),
            EntityRef::Regency(r) => r.id(),
            EntityRef::District(d) => d.id(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            EntityRef::Province(p) => p.name(),
            EntityRef::Regency(r) => r.name(),
            EntityRef::District(d) => d.name(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matched<'a, T> {
    pub entity: &'a T,
    pub kind: MatchKind,
}

#[derive(Clone)]
pub struct NameMatcher {
    tie_break: TieBreak,
    observer: Arc<dyn MatchObserver>,
}

impl Default for NameMatcher {
    fn default() -> Self {
        Self::new(TieBreak::default(), Arc::new(LogObserver))
    }
}

impl std::fmt::Debug for NameMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NameMatcher")
            .field("tie_break", &self.tie_break)
            .finish_non_exhaustive()
    }
}

impl NameMatcher {
    pub fn new(tie_break: TieBreak, observer: Arc<dyn MatchObserver>) -> Self {
        Self {
            tie_break,
            observer,
        }
    }

    /// Match `feature_name` against the children of `scope` at `level`.
    ///
    /// Returns `Ok(None)` when nothing matches or when `level` is not the
    /// scope's child level.
    pub fn match_entity<'a>(
        &self,
        feature_name: &str,
        level: Level,
        scope: Scope<'a>,
    ) -> Result<Option<EntityRef<'a>>> {
        if scope.child_level() != level {
            log::debug!("{level} is not the child level of {:?}", scope.child_level());
            return Ok(None);
        }
        Ok(match scope {
            Scope::Country(index) => self
                .match_among(feature_name, level, index.provinces())?
                .map(|m| EntityRef::Province(m.entity)),
            Scope::Province(p) => self
                .match_among(feature_name, level, &p.regencies)?
                .map(|m| EntityRef::Regency(m.entity)),
            Scope::Regency(r) => self
                .match_among(feature_name, level, &r.districts)?
                .map(|m| EntityRef::District(m.entity)),
        })
    }

    /// Case-insensitive equality wins over containment in either direction
    /// ("Kab. Sleman" against "Sleman"). Within a tier the first candidate in
    /// child-list order is taken.
    pub fn match_among<'a, T: Entity>(
        &self,
        feature_name: &str,
        level: Level,
        candidates: &'a [T],
    ) -> Result<Option<Matched<'a, T>>> {
        let needle = normalize_name(feature_name);
        if needle.is_empty() {
            return Ok(None);
        }
        let normalized: Vec<String> = candidates.iter().map(|c| normalize_name(c.name())).collect();

        let exact: Vec<usize> = (0..candidates.len())
            .filter(|&i| normalized[i] == needle)
            .collect();
        let (hits, kind) = if !exact.is_empty() {
            (exact, MatchKind::Exact)
        } else {
            let contains: Vec<usize> = (0..candidates.len())
                .filter(|&i| {
                    let name = &normalized[i];
                    !name.is_empty() && (name.contains(&needle) || needle.contains(name.as_str()))
                })
                .collect();
            (contains, MatchKind::Contains)
        };

        let Some(&first) = hits.first() else {
            self.observer.unmatched(level, feature_name);
            return Ok(None);
        };

        if hits.len() > 1 {
            let report = AmbiguityReport {
                level,
                feature_name: feature_name.to_string(),
                candidates: hits.iter().map(|&i| candidates[i].name().to_string()).collect(),
                chosen: candidates[first].name().to_string(),
            };
            self.observer.ambiguous(&report);
            if self.tie_break == TieBreak::Reject {
                return Err(NavError::AmbiguousMatch {
                    name: report.feature_name,
                    candidates: report.candidates,
                });
            }
        }

        Ok(Some(Matched {
            entity: &candidates[first],
            kind,
        }))
    }
}
