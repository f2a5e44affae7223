//! The map explorer: navigation state, boundary loading and the rendered map
//! kept in step.
//!
//! Transitions are two-phase. A transition that can be served from the
//! whole-country layers renders immediately ([`Step::Ready`]); one that needs
//! a regency or district file returns a [`FetchTicket`]. The caller fetches
//! the location however it likes and hands the result to
//! [`Explorer::complete`]. Every transition bumps the explorer's generation,
//! so a ticket issued before a newer transition is discarded on completion
//! instead of overwriting what the user navigated to since.
//!
//! Until a pending transition completes, the previous selection and layer
//! stay current. A failed fetch leaves them untouched.

use std::sync::Arc;

use serde::Serialize;

use crate::error::{NavError, Result};
use crate::geometry::FeatureCollection;
use crate::index::RegionIndex;
use crate::matching::{NameMatcher, Scope};
use crate::metrics::{EntityKey, MetricsProvider, NoMetrics, TopItem};
use crate::navigation::{Level, Selection};
use crate::properties::{explicit_count, FeatureKey};
use crate::resolver::{
    district_file_layer, regency_file_layer, resolve_boundary_source, BaseLayers,
    BoundarySource, ResolvedLayer,
};
use crate::source::{parse_dataset, DatasetSource};
use crate::style::{format_compact, StylePalette};
use crate::sync::{
    ActiveLayer, Annotation, ClusterModel, LayerId, LayerModel, LayerSynchronizer, MapRenderer,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchTicket {
    pub generation: u64,
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Rendered { layer: LayerId },
    /// The selection was applied but has nothing to draw.
    NoData { reason: String },
    /// A newer transition superseded the ticket; nothing changed.
    Stale,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    Ready(Outcome),
    Fetch(FetchTicket),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "click", rename_all = "snake_case")]
pub enum ClickOutcome {
    /// Stale layer, inert feature, or nothing to resolve.
    Ignored,
    Focused { id: String },
    Highlighted { index: usize },
    Navigate(Step),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    NoData,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListItem {
    /// Index entity id; `None` for villages.
    pub id: Option<String>,
    pub name: String,
    pub count: Option<u64>,
    /// Feature index on the active layer, for villages.
    pub feature: Option<usize>,
    pub selected: bool,
    /// Another entity at this level is focused.
    pub inert: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Details {
    pub level: Level,
    pub name: String,
    pub count: Option<u64>,
    pub count_label: Option<String>,
    pub top_items: Vec<TopItem>,
    /// Label of the drill-down action, none at the village level.
    pub action: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExplorerView {
    pub generation: u64,
    pub selection: Selection,
    pub breadcrumbs: Vec<String>,
    pub loading: bool,
    pub clustered: bool,
    pub notice: Option<Notice>,
    pub list: Vec<ListItem>,
    pub details: Option<Details>,
}

#[derive(Debug, Clone)]
struct Pending {
    generation: u64,
    selection: Selection,
    source: BoundarySource,
}

pub struct Explorer<R> {
    index: Arc<RegionIndex>,
    base: Arc<BaseLayers>,
    matcher: NameMatcher,
    metrics: Arc<dyn MetricsProvider>,
    sync: LayerSynchronizer,
    renderer: R,
    selection: Selection,
    generation: u64,
    pending: Option<Pending>,
    notice: Option<Notice>,
}

impl<R: MapRenderer> Explorer<R> {
    pub fn new(index: Arc<RegionIndex>, base: Arc<BaseLayers>, renderer: R) -> Self {
        Self {
            index,
            base,
            matcher: NameMatcher::default(),
            metrics: Arc::new(NoMetrics),
            sync: LayerSynchronizer::default(),
            renderer,
            selection: Selection::root(),
            generation: 0,
            pending: None,
            notice: None,
        }
    }

    pub fn with_matcher(mut self, matcher: NameMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsProvider>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_palette(mut self, palette: StylePalette) -> Self {
        self.sync = LayerSynchronizer::new(palette);
        self
    }

    pub fn index(&self) -> &RegionIndex {
        &self.index
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn active_layer(&self) -> Option<&ActiveLayer> {
        self.sync.active()
    }

    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    /// Draw the province layer. Call once after construction.
    pub fn start(&mut self) -> Result<Step> {
        self.begin(Selection::root())
    }

    pub fn descend_to_regency(&mut self, province_id: &str) -> Result<Step> {
        let next = self.selection.descend_to_regency(&self.index, province_id)?;
        self.begin(next)
    }

    pub fn descend_to_district(&mut self, regency_id: &str) -> Result<Step> {
        let next = self.selection.descend_to_district(&self.index, regency_id)?;
        self.begin(next)
    }

    pub fn descend_to_village(&mut self, district_id: &str) -> Result<Step> {
        let next = self.selection.descend_to_village(&self.index, district_id)?;
        self.begin(next)
    }

    /// Descend into the child `id` of whatever level is displayed.
    pub fn descend(&mut self, id: &str) -> Result<Step> {
        match self.selection.level {
            Level::Province => self.descend_to_regency(id),
            Level::Regency => self.descend_to_district(id),
            Level::District => self.descend_to_village(id),
            Level::Village => Err(NavError::InvalidTransition(
                "villages are the last level".into(),
            )),
        }
    }

    pub fn ascend(&mut self) -> Result<Step> {
        let next = self.selection.ascend()?;
        self.begin(next)
    }

    pub fn reset(&mut self) -> Result<Step> {
        let next = self.selection.reset();
        self.begin(next)
    }

    /// Select and lock `id` at the displayed level without descending.
    pub fn focus(&mut self, id: &str) -> Result<()> {
        let next = self.selection.focus(&self.index, id)?;
        self.supersede();
        self.selection = next;
        self.sync
            .set_focus(&mut self.renderer, self.selection.focused());
        Ok(())
    }

    pub fn release(&mut self) {
        self.supersede();
        self.selection = self.selection.release();
        self.sync.set_focus(&mut self.renderer, None);
    }

    /// Id of the first child of the displayed scope whose name contains
    /// `query`, ignoring case.
    pub fn child_id_by_name(&self, query: &str) -> Option<String> {
        let s = &self.selection;
        let id = match s.level {
            Level::Province => &self.index.find_province_by_name(query)?.id,
            Level::Regency => &s.province_in(&self.index).ok()?.find_regency_by_name(query)?.id,
            Level::District => &s.regency_in(&self.index).ok()?.find_district_by_name(query)?.id,
            Level::Village => return None,
        };
        Some(id.clone())
    }

    /// Apply the result of fetching `ticket.location`.
    ///
    /// Returns [`Outcome::Stale`] when a newer transition has started since
    /// the ticket was issued. A failed fetch or an unparsable file rolls the
    /// pending transition back and is returned as an error; the previous
    /// layer stays on the map.
    pub fn complete(&mut self, ticket: &FetchTicket, data: Result<Vec<u8>>) -> Result<Outcome> {
        let pending = match self.pending.take() {
            Some(p) if p.generation == ticket.generation => p,
            other => {
                self.pending = other;
                log::debug!(
                    "discarding stale result for {} (generation {}, now {})",
                    ticket.location,
                    ticket.generation,
                    self.generation
                );
                return Ok(Outcome::Stale);
            }
        };
        let parsed = data.and_then(|bytes| parse_dataset(&ticket.location, &bytes));
        let layer = parsed.and_then(|fc| Self::interpret(&pending.source, fc));
        self.commit(pending.selection, layer)
    }

    /// Run `step` to completion, fetching from `source` if needed.
    pub fn drive(&mut self, source: &impl DatasetSource, step: Step) -> Result<Outcome> {
        match step {
            Step::Ready(outcome) => Ok(outcome),
            Step::Fetch(ticket) => {
                let data = source.fetch(&ticket.location);
                self.complete(&ticket, data)
            }
        }
    }

    /// Click on feature `index` of layer `layer`.
    pub fn click(&mut self, layer: LayerId, index: usize) -> Result<ClickOutcome> {
        let Some(active) = self.sync.active() else {
            return Ok(ClickOutcome::Ignored);
        };
        if active.id != layer || index >= active.model.features.len() {
            log::debug!("click on stale layer {} ignored", layer.0);
            return Ok(ClickOutcome::Ignored);
        }
        if active.is_locked_out(index) {
            return Ok(ClickOutcome::Ignored);
        }
        let level = active.model.level;
        let annotation = active.model.annotations[index].clone();

        if level == Level::Village {
            self.sync.set_highlight(&mut self.renderer, Some(index));
            return Ok(ClickOutcome::Highlighted { index });
        }
        let Some(id) = annotation.entity_id else {
            // surfaces AmbiguousMatch under the rejecting tie-break
            self.matcher
                .match_entity(&annotation.name, level, self.scope(level)?)?;
            log::debug!("{level} {:?} is not in the index", annotation.name);
            return Ok(ClickOutcome::Ignored);
        };
        if level == Level::District || self.selection.focused() == Some(id.as_str()) {
            return Ok(ClickOutcome::Navigate(self.descend(&id)?));
        }
        self.focus(&id)?;
        Ok(ClickOutcome::Focused { id })
    }

    /// Click on cluster marker `marker` of layer `layer`: descend into the
    /// district it stands for.
    pub fn click_marker(&mut self, layer: LayerId, marker: usize) -> Result<ClickOutcome> {
        let target = self
            .sync
            .active()
            .filter(|a| a.id == layer)
            .and_then(|a| a.markers.get(marker))
            .and_then(|m| m.target.clone());
        match target {
            Some(id) if !self.selection.is_locked_out(&id) => {
                Ok(ClickOutcome::Navigate(self.descend(&id)?))
            }
            _ => Ok(ClickOutcome::Ignored),
        }
    }

    /// Returns whether the hover took effect.
    pub fn hover(&mut self, layer: LayerId, index: usize) -> bool {
        if self.sync.active().map(|a| a.id) != Some(layer) {
            return false;
        }
        self.sync.hover(&mut self.renderer, index)
    }

    pub fn unhover(&mut self, layer: LayerId) {
        if self.sync.active().map(|a| a.id) == Some(layer) {
            self.sync.unhover(&mut self.renderer);
        }
    }

    /// Sidebar entries for the displayed level, sorted by name.
    pub fn list(&self) -> Vec<ListItem> {
        let s = &self.selection;
        let entities: Vec<(&str, &str)> = match s.level {
            Level::Province => self
                .index
                .provinces()
                .iter()
                .map(|p| (p.id.as_str(), p.name.as_str()))
                .collect(),
            Level::Regency => s
                .province_in(&self.index)
                .map(|p| {
                    p.regencies
                        .iter()
                        .map(|r| (r.id.as_str(), r.name.as_str()))
                        .collect()
                })
                .unwrap_or_default(),
            Level::District => s
                .regency_in(&self.index)
                .map(|r| {
                    r.districts
                        .iter()
                        .map(|d| (d.id.as_str(), d.name.as_str()))
                        .collect()
                })
                .unwrap_or_default(),
            Level::Village => return self.village_list(),
        };
        let mut items: Vec<ListItem> = entities
            .into_iter()
            .map(|(id, name)| ListItem {
                id: Some(id.to_string()),
                name: name.to_string(),
                count: self.entity_count(s.level, id),
                feature: None,
                selected: s.focused() == Some(id),
                inert: s.is_locked_out(id),
            })
            .collect();
        items.sort_by_key(|item| item.name.to_lowercase());
        items
    }

    fn village_list(&self) -> Vec<ListItem> {
        let Some(active) = self.sync.active() else {
            return Vec::new();
        };
        let mut items: Vec<ListItem> = active
            .model
            .annotations
            .iter()
            .enumerate()
            .filter(|(_, a)| !a.name.is_empty())
            .map(|(i, a)| ListItem {
                id: None,
                name: a.name.clone(),
                count: a.count,
                feature: Some(i),
                selected: active.highlighted() == Some(i),
                inert: false,
            })
            .collect();
        items.sort_by_key(|item| item.name.to_lowercase());
        items
    }

    /// Details of the focused entity, or of the highlighted village.
    pub fn details(&self) -> Option<Details> {
        let s = &self.selection;
        let (name, count, key, action) = match s.level {
            Level::Village => {
                let active = self.sync.active()?;
                let i = active.highlighted()?;
                let annotation = &active.model.annotations[i];
                let key = self.entity_key(Level::Village, &annotation.name)?;
                (annotation.name.clone(), annotation.count, key, None)
            }
            level => {
                let id = s.focused()?;
                let name = match level {
                    Level::Province => s.province_in(&self.index).ok()?.name.clone(),
                    Level::Regency => s.regency_in(&self.index).ok()?.name.clone(),
                    _ => s.district_in(&self.index).ok()?.name.clone(),
                };
                let action = match level {
                    Level::Province => "View regencies",
                    Level::Regency => "View districts",
                    _ => "View villages",
                };
                let key = self.entity_key(level, id)?;
                (name, self.entity_count(level, id), key, Some(action.to_string()))
            }
        };
        Some(Details {
            level: s.level,
            name,
            count,
            count_label: count.map(format_compact),
            top_items: self.metrics.top_items(&key),
            action,
        })
    }

    pub fn view(&self) -> ExplorerView {
        ExplorerView {
            generation: self.generation,
            selection: self.selection.clone(),
            breadcrumbs: self.selection.breadcrumbs(&self.index),
            loading: self.is_loading(),
            clustered: self
                .sync
                .active()
                .is_some_and(|a| a.model.is_clustered()),
            notice: self.notice.clone(),
            list: self.list(),
            details: self.details(),
        }
    }

    fn supersede(&mut self) {
        self.generation += 1;
        if let Some(p) = self.pending.take() {
            log::debug!("superseded pending fetch of {:?}", p.source.location());
        }
    }

    fn begin(&mut self, next: Selection) -> Result<Step> {
        let source = resolve_boundary_source(&next, &self.index)?;
        self.supersede();
        let layer = match source {
            BoundarySource::CountryProvinces => self.base.provinces_layer(),
            BoundarySource::ProvinceRegencies { province_id } => {
                self.base.regencies_layer(&province_id)
            }
            BoundarySource::Unavailable { reason } => Err(NavError::EmptyResultSet(reason)),
            source @ (BoundarySource::RegencyFile { .. } | BoundarySource::DistrictFile { .. }) => {
                let ticket = FetchTicket {
                    generation: self.generation,
                    location: source.location().unwrap_or_default().to_string(),
                };
                log::debug!("{} needs {}", next.level, ticket.location);
                self.pending = Some(Pending {
                    generation: self.generation,
                    selection: next,
                    source,
                });
                return Ok(Step::Fetch(ticket));
            }
        };
        self.commit(next, layer).map(Step::Ready)
    }

    fn interpret(source: &BoundarySource, data: FeatureCollection) -> Result<ResolvedLayer> {
        match source {
            BoundarySource::DistrictFile { district_name, .. } => {
                district_file_layer(data, district_name)
            }
            _ => regency_file_layer(data),
        }
    }

    fn commit(&mut self, selection: Selection, layer: Result<ResolvedLayer>) -> Result<Outcome> {
        match layer {
            Ok(layer) => {
                self.selection = selection;
                let model = self.annotate(layer);
                let id = self
                    .sync
                    .sync(&mut self.renderer, model, self.selection.focused());
                self.notice = None;
                Ok(Outcome::Rendered { layer: id })
            }
            Err(NavError::EmptyResultSet(reason)) => {
                log::info!("{}: {reason}", selection.level);
                self.selection = selection;
                self.sync.clear(&mut self.renderer);
                self.notice = Some(Notice {
                    kind: NoticeKind::NoData,
                    message: reason.clone(),
                });
                Ok(Outcome::NoData { reason })
            }
            Err(e) => {
                log::warn!("keeping the {} layer: {e}", self.selection.level);
                self.notice = Some(Notice {
                    kind: NoticeKind::Unavailable,
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    fn scope(&self, level: Level) -> Result<Scope<'_>> {
        Ok(match level {
            Level::Province => Scope::Country(self.index.as_ref()),
            Level::Regency => Scope::Province(self.selection.province_in(&self.index)?),
            _ => Scope::Regency(self.selection.regency_in(&self.index)?),
        })
    }

    /// Index entity for a feature name at `level`. A join key naming a known
    /// province wins over name matching.
    fn resolve_entity(&self, level: Level, name: &str, join: Option<&str>) -> Option<String> {
        if level == Level::Village {
            return None;
        }
        if level == Level::Province {
            if let Some(p) = join.and_then(|id| self.index.find_province_by_id(id)) {
                return Some(p.id.clone());
            }
        }
        let found = self
            .scope(level)
            .and_then(|scope| self.matcher.match_entity(name, level, scope));
        match found {
            Ok(entity) => entity.map(|e| e.id().to_string()),
            Err(e) => {
                log::warn!("{level} {name:?}: {e}");
                None
            }
        }
    }

    fn entity_key(&self, level: Level, id: &str) -> Option<EntityKey> {
        let s = &self.selection;
        Some(match level {
            Level::Province => EntityKey::province(id),
            Level::Regency => EntityKey::regency(s.province.as_deref()?, id),
            Level::District => {
                EntityKey::district(s.province.as_deref()?, s.regency.as_deref()?, id)
            }
            Level::Village => EntityKey::village(
                &EntityKey::district(
                    s.province.as_deref()?,
                    s.regency.as_deref()?,
                    s.district.as_deref()?,
                ),
                id,
            ),
        })
    }

    fn metrics_count(&self, level: Level, id: &str) -> Option<u64> {
        self.metrics.count(&self.entity_key(level, id)?)
    }

    /// Count for an index entity: a matched feature's count first, the
    /// metrics provider otherwise.
    fn entity_count(&self, level: Level, id: &str) -> Option<u64> {
        self.sync
            .active()
            .filter(|a| a.model.level == level)
            .and_then(|a| {
                a.model
                    .annotations
                    .iter()
                    .find(|ann| ann.entity_id.as_deref() == Some(id))
                    .and_then(|ann| ann.count)
            })
            .or_else(|| self.metrics_count(level, id))
    }

    fn annotate(&self, layer: ResolvedLayer) -> LayerModel {
        let level = layer.level;
        let names: Vec<String> = (0..layer.features.len())
            .map(|i| layer.feature_name(i))
            .collect();

        let clusters: Option<Vec<ClusterModel>> = layer.clusters.as_ref().map(|clusters| {
            clusters
                .iter()
                .map(|c| {
                    let entity_id = self.resolve_entity(level, &c.name, None);
                    let explicit: Vec<u64> = c
                        .members
                        .iter()
                        .filter_map(|&i| explicit_count(&layer.features[i]))
                        .collect();
                    let count = entity_id
                        .as_deref()
                        .and_then(|id| self.metrics_count(level, id))
                        .or_else(|| (!explicit.is_empty()).then(|| explicit.iter().sum()));
                    ClusterModel {
                        name: c.name.clone(),
                        members: c.members.clone(),
                        centroid: c.centroid,
                        entity_id,
                        count,
                    }
                })
                .collect()
        });

        let annotations = layer
            .features
            .iter()
            .enumerate()
            .map(|(i, feature)| {
                let cluster = clusters
                    .as_ref()
                    .and_then(|cs| cs.iter().find(|c| c.members.contains(&i)));
                if let Some(c) = cluster {
                    return Annotation {
                        name: c.name.clone(),
                        entity_id: c.entity_id.clone(),
                        count: c.count,
                    };
                }
                let key = FeatureKey::read(feature, level);
                let entity_id = self.resolve_entity(level, &names[i], key.join_key.as_deref());
                let count = explicit_count(feature).or_else(|| match level {
                    Level::Village => self.metrics_count(level, &names[i]),
                    _ => entity_id
                        .as_deref()
                        .and_then(|id| self.metrics_count(level, id)),
                });
                Annotation {
                    name: names[i].clone(),
                    entity_id,
                    count,
                }
            })
            .collect();

        LayerModel {
            level,
            features: layer.features,
            annotations,
            clusters,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::LayerDocument;
    use crate::geometry::feature_collection;
    use crate::geometry::tests::square;
    use crate::index::tests::sample_index;
    use crate::matching::{RecordingObserver, TieBreak};
    use crate::metrics::StaticMetrics;
    use crate::properties::{prop_str, PROV_ID};
    use crate::source::MemorySource;
    use crate::style::VisualState;
    use serde_json::json;

    const SIMEULUE: &str = "indonesia-district/id11_aceh/id1101_simeulue/id1101_simeulue.geojson";
    const TEUPAH_SELATAN: &str =
        "indonesia-district/id11_aceh/id1101_simeulue/id1101010_teupah_selatan.geojson";
    const SLEMAN: &str =
        "indonesia-district/id34_daerah_istimewa_yogyakarta/id3404_sleman/id3404_sleman.geojson";

    fn base() -> BaseLayers {
        BaseLayers {
            provinces: feature_collection(vec![
                square(json!({"name": "Aceh", "prov_id": "11"}), 95.0, 2.0, 3.0),
                square(json!({"name": "DI Yogyakarta", "prov_id": "34"}), 110.0, -8.0, 1.0),
            ]),
            regencies: feature_collection(vec![
                square(json!({"name": "Kab. Simeulue", "prov_id": "11"}), 95.8, 2.4, 0.5),
                square(json!({"name": "Kab. Aceh Singkil", "prov_id": "11"}), 97.6, 2.2, 0.4),
                square(json!({"name": "Kab. Sleman", "prov_id": "34"}), 110.2, -7.8, 0.3),
            ]),
        }
    }

    fn collection(features: Vec<crate::geometry::Feature>) -> Vec<u8> {
        serde_json::to_vec(&feature_collection(features)).unwrap()
    }

    fn source() -> MemorySource {
        MemorySource::new()
            .with(
                SIMEULUE,
                collection(vec![
                    square(json!({"district": "Teupah Selatan", "customerCount": 900}), 96.0, 2.4, 0.2),
                    square(json!({"district": "Teupah Utara"}), 96.2, 2.6, 0.2),
                    square(json!({"district": "Simeulue Timur"}), 96.4, 2.5, 0.2),
                ]),
            )
            .with(
                TEUPAH_SELATAN,
                collection(vec![
                    square(json!({"village": "Latiung", "district": "TEUPAH SELATAN", "customerCount": 650}), 96.0, 2.4, 0.05),
                    square(json!({"village": "Lataling", "district": "Teupah Utara"}), 96.1, 2.5, 0.05),
                    square(json!({"village": "Labuhan Bajau", "district": "teupah selatan"}), 96.05, 2.42, 0.05),
                ]),
            )
            .with(
                SLEMAN,
                collection(vec![
                    square(json!({"village": "Ambarketawang", "district": "Gamping"}), 110.30, -7.80, 0.02),
                    square(json!({"village": "Balecatur", "district": "Gamping"}), 110.28, -7.79, 0.02),
                    square(json!({"village": "Sendangadi", "district": "Mlati"}), 110.36, -7.74, 0.02),
                ]),
            )
    }

    fn explorer() -> Explorer<LayerDocument> {
        let mut ex = Explorer::new(
            Arc::new(sample_index()),
            Arc::new(base()),
            LayerDocument::default(),
        );
        let step = ex.start().unwrap();
        assert!(matches!(step, Step::Ready(Outcome::Rendered { .. })));
        ex
    }

    fn layer_id(ex: &Explorer<LayerDocument>) -> LayerId {
        ex.active_layer().unwrap().id
    }

    fn drive(ex: &mut Explorer<LayerDocument>, step: Result<Step>) -> Outcome {
        ex.drive(&source(), step.unwrap()).unwrap()
    }

    #[test]
    fn test_full_descent_and_ascent() {
        let mut ex = explorer();
        let initial = ex.selection().clone();
        assert_eq!(ex.renderer().features.len(), 2);

        let step = ex.descend_to_regency("11");
        assert!(matches!(drive(&mut ex, step), Outcome::Rendered { .. }));
        assert_eq!(ex.renderer().features.len(), 2);

        let step = ex.descend_to_district("1101");
        assert!(matches!(step, Ok(Step::Fetch(_))));
        drive(&mut ex, step);
        assert_eq!(ex.selection().level, Level::District);
        assert!(!ex.active_layer().unwrap().model.is_clustered());

        let step = ex.descend_to_village("1101010");
        drive(&mut ex, step);
        assert_eq!(ex.selection().level, Level::Village);
        // the Teupah Utara village is filtered out
        assert_eq!(ex.renderer().features.len(), 2);

        for _ in 0..3 {
            let step = ex.ascend();
            drive(&mut ex, step);
        }
        assert_eq!(ex.selection(), &initial);
        assert_eq!(ex.renderer().features.len(), 2);
        assert!(ex.ascend().is_err());
    }

    #[test]
    fn test_reset_matches_initial_selection() {
        let mut ex = explorer();
        let initial = ex.selection().clone();
        let step = ex.descend_to_regency("34");
        drive(&mut ex, step);
        ex.focus("3404").unwrap();
        let step = ex.reset();
        drive(&mut ex, step);
        assert_eq!(ex.selection(), &initial);
        assert!(ex.details().is_none());
    }

    #[test]
    fn test_click_focuses_then_descends() {
        let mut ex = explorer();
        let layer = layer_id(&ex);
        assert_eq!(
            ex.click(layer, 0).unwrap(),
            ClickOutcome::Focused { id: "11".into() }
        );
        assert_eq!(ex.details().unwrap().action.as_deref(), Some("View regencies"));
        match ex.click(layer, 0).unwrap() {
            ClickOutcome::Navigate(Step::Ready(Outcome::Rendered { .. })) => {}
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(ex.selection().province.as_deref(), Some("11"));
    }

    #[test]
    fn test_click_on_other_province_is_inert_while_locked() {
        let mut ex = explorer();
        let layer = layer_id(&ex);
        ex.focus("11").unwrap();
        let before = ex.selection().clone();
        let generation = ex.generation();

        assert_eq!(ex.click(layer, 1).unwrap(), ClickOutcome::Ignored);
        assert!(!ex.hover(layer, 1));
        assert_eq!(ex.selection(), &before);
        assert_eq!(ex.generation(), generation);
        assert!(!ex.is_loading());
        let states = ex.active_layer().unwrap().states();
        assert_eq!(states, &[VisualState::Selected, VisualState::Dimmed]);
    }

    #[test]
    fn test_click_on_previous_layer_is_ignored() {
        let mut ex = explorer();
        let provinces = layer_id(&ex);
        let step = ex.descend_to_regency("11");
        drive(&mut ex, step);
        let before = ex.selection().clone();
        assert_eq!(ex.click(provinces, 1).unwrap(), ClickOutcome::Ignored);
        assert_eq!(ex.selection(), &before);
    }

    #[test]
    fn test_regency_features_matched_by_name() {
        let mut ex = explorer();
        let step = ex.descend_to_regency("11");
        drive(&mut ex, step);
        let ids: Vec<Option<String>> = ex
            .active_layer()
            .unwrap()
            .model
            .annotations
            .iter()
            .map(|a| a.entity_id.clone())
            .collect();
        assert_eq!(ids, vec![Some("1101".into()), Some("1102".into())]);
    }

    #[test]
    fn test_district_click_descends_directly() {
        let mut ex = explorer();
        let step = ex.descend_to_regency("11");
        drive(&mut ex, step);
        let step = ex.descend_to_district("1101");
        drive(&mut ex, step);
        let layer = layer_id(&ex);
        let ClickOutcome::Navigate(step) = ex.click(layer, 0).unwrap() else {
            panic!("district click should navigate");
        };
        ex.drive(&source(), step).unwrap();
        assert_eq!(ex.selection().district.as_deref(), Some("1101010"));
    }

    #[test]
    fn test_stale_fetch_is_discarded() {
        let mut ex = explorer();
        let step = ex.descend_to_regency("11");
        drive(&mut ex, step);
        let Step::Fetch(ticket) = ex.descend_to_district("1101").unwrap() else {
            panic!("regency file must be fetched");
        };
        // the user goes back before the file arrives
        let step = ex.ascend();
        drive(&mut ex, step);
        let shown = ex.renderer().clone();

        let late = source().fetch(&ticket.location);
        assert_eq!(ex.complete(&ticket, late).unwrap(), Outcome::Stale);
        assert_eq!(ex.selection(), &Selection::root());
        assert_eq!(ex.renderer(), &shown);
    }

    #[test]
    fn test_failed_fetch_keeps_previous_layer() {
        let mut ex = explorer();
        let step = ex.descend_to_regency("11");
        drive(&mut ex, step);
        let before = ex.selection().clone();
        let shown = ex.renderer().clone();

        let Step::Fetch(ticket) = ex.descend_to_district("1101").unwrap() else {
            panic!("regency file must be fetched");
        };
        let err = ex
            .complete(&ticket, Err(NavError::SourceUnavailable("timeout".into())))
            .unwrap_err();
        assert!(matches!(err, NavError::SourceUnavailable(_)));
        assert_eq!(ex.selection(), &before);
        assert_eq!(ex.renderer(), &shown);
        assert_eq!(ex.notice().unwrap().kind, NoticeKind::Unavailable);
        assert!(!ex.is_loading());

        // garbage is treated like an outage
        let Step::Fetch(ticket) = ex.descend_to_district("1101").unwrap() else {
            panic!("regency file must be fetched");
        };
        assert!(ex.complete(&ticket, Ok(b"<html>".to_vec())).is_err());
        assert_eq!(ex.selection(), &before);
    }

    #[test]
    fn test_missing_files_are_soft_dead_ends() {
        let mut ex = explorer();
        let step = ex.descend_to_regency("11");
        drive(&mut ex, step);
        let outcome = ex.descend_to_district("1102").unwrap();
        let Step::Ready(Outcome::NoData { .. }) = outcome else {
            panic!("expected no data, got {outcome:?}");
        };
        assert_eq!(ex.selection().regency.as_deref(), Some("1102"));
        assert!(ex.renderer().is_empty());
        assert_eq!(ex.notice().unwrap().kind, NoticeKind::NoData);
        assert!(ex.descend("anything").is_err());

        let step = ex.ascend();
        drive(&mut ex, step);
        assert!(ex.notice().is_none());
        assert!(!ex.renderer().is_empty());
    }

    #[test]
    fn test_province_without_regencies_clears_map() {
        let mut base = base();
        base.regencies
            .features
            .retain(|f| prop_str(f, PROV_ID).as_deref() != Some("34"));
        let mut ex = Explorer::new(Arc::new(sample_index()), Arc::new(base), LayerDocument::default());
        ex.start().unwrap();
        assert!(!ex.renderer().is_empty());

        let outcome = ex.descend_to_regency("34").unwrap();
        assert!(matches!(outcome, Step::Ready(Outcome::NoData { .. })));
        assert_eq!(ex.selection().level, Level::Regency);
        assert_eq!(ex.selection().province.as_deref(), Some("34"));
        assert!(ex.renderer().is_empty());
        assert!(ex.active_layer().is_none());
        assert_eq!(ex.notice().unwrap().kind, NoticeKind::NoData);
    }

    #[test]
    fn test_village_granular_regency_is_clustered() {
        let mut ex = explorer();
        let step = ex.descend_to_regency("34");
        drive(&mut ex, step);
        let step = ex.descend_to_district("3404");
        drive(&mut ex, step);

        let view = ex.view();
        assert!(view.clustered);
        let active = ex.active_layer().unwrap();
        assert_eq!(active.markers.len(), 2);
        assert_eq!(active.markers[0].label, "Gamping");
        assert_eq!(active.markers[0].target.as_deref(), Some("3404010"));
        // Mlati is not in the index
        assert_eq!(active.markers[1].target, None);
        let layer = active.id;

        assert_eq!(ex.click_marker(layer, 1).unwrap(), ClickOutcome::Ignored);
        let ClickOutcome::Navigate(step) = ex.click_marker(layer, 0).unwrap() else {
            panic!("cluster marker should navigate");
        };
        // Gamping has no village file
        let outcome = ex.drive(&source(), step).unwrap();
        assert!(matches!(outcome, Outcome::NoData { .. }));
        assert_eq!(ex.selection().district.as_deref(), Some("3404010"));
    }

    #[test]
    fn test_village_click_highlights_and_lists() {
        let mut ex = explorer();
        let step = ex.descend_to_regency("11");
        drive(&mut ex, step);
        let step = ex.descend_to_district("1101");
        drive(&mut ex, step);
        let step = ex.descend_to_village("1101010");
        drive(&mut ex, step);

        let list = ex.list();
        let names: Vec<&str> = list.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["Labuhan Bajau", "Latiung"]);
        assert_eq!(list[1].count, Some(650));

        let layer = layer_id(&ex);
        let latiung = list[1].feature.unwrap();
        assert_eq!(
            ex.click(layer, latiung).unwrap(),
            ClickOutcome::Highlighted { index: latiung }
        );
        let details = ex.details().unwrap();
        assert_eq!(details.name, "Latiung");
        assert_eq!(details.count_label.as_deref(), Some("650"));
        assert_eq!(details.action, None);
        // no lock at the village level
        assert!(ex.hover(layer, 1 - latiung));
    }

    #[test]
    fn test_counts_from_metrics_and_properties() {
        let metrics = StaticMetrics::from_json(
            br#"{"11/1101/1101020": {"count": 250}, "34": {"count": 7}}"#,
        )
        .unwrap();
        let mut ex = Explorer::new(
            Arc::new(sample_index()),
            Arc::new(base()),
            LayerDocument::default(),
        )
        .with_metrics(Arc::new(metrics));
        ex.start().unwrap();

        let list = ex.list();
        assert_eq!(list[0].name, "Aceh");
        assert_eq!(list[0].count, Some(250));
        assert_eq!(list[1].count, Some(7));

        let step = ex.descend_to_regency("11");
        drive(&mut ex, step);
        let step = ex.descend_to_district("1101");
        drive(&mut ex, step);
        let counts: Vec<Option<u64>> = ex
            .active_layer()
            .unwrap()
            .model
            .annotations
            .iter()
            .map(|a| a.count)
            .collect();
        // explicit property, then provider, then nothing
        assert_eq!(counts, vec![Some(900), Some(250), None]);
        let bubble = ex.renderer().markers[0].bubble.as_ref().unwrap();
        assert_eq!(bubble.text, "900");
    }

    #[test]
    fn test_hover_shows_info_and_unhover_clears() {
        let mut ex = explorer();
        let layer = layer_id(&ex);
        assert!(ex.hover(layer, 1));
        assert_eq!(ex.renderer().info.as_ref().unwrap().title, "DI Yogyakarta");
        ex.unhover(layer);
        assert!(ex.renderer().info.is_none());
    }

    #[test]
    fn test_release_unlocks_the_level() {
        let mut ex = explorer();
        let layer = layer_id(&ex);
        ex.focus("11").unwrap();
        assert!(ex.focus("34").is_err());
        ex.release();
        assert_eq!(
            ex.click(layer, 1).unwrap(),
            ClickOutcome::Focused { id: "34".into() }
        );
        let list = ex.list();
        assert!(list.iter().any(|i| i.inert));
        assert!(list.iter().any(|i| i.selected));
    }

    #[test]
    fn test_child_id_by_name() {
        let mut ex = explorer();
        assert_eq!(ex.child_id_by_name("yogya").as_deref(), Some("34"));
        let step = ex.descend_to_regency("11");
        drive(&mut ex, step);
        assert_eq!(ex.child_id_by_name("singkil").as_deref(), Some("1102"));
        assert_eq!(ex.child_id_by_name("sleman"), None);
    }

    /// Aceh with two regencies that "Kab. Aceh Barat Daya" contains.
    fn ambiguous_aceh() -> (RegionIndex, BaseLayers) {
        let index = RegionIndex::from_value(json!([
            {"id": "11", "name": "Aceh", "regencies": [
                {"id": "1105", "name": "Aceh Barat"},
                {"id": "1112", "name": "Aceh Barat Daya"}
            ]}
        ]))
        .unwrap();
        let base = BaseLayers {
            provinces: feature_collection(vec![square(
                json!({"name": "Aceh", "prov_id": "11"}),
                95.0,
                2.0,
                3.0,
            )]),
            regencies: feature_collection(vec![square(
                json!({"name": "Kab. Aceh Barat Daya", "prov_id": "11"}),
                96.0,
                3.5,
                0.5,
            )]),
        };
        (index, base)
    }

    #[test]
    fn test_rejecting_matcher_surfaces_ambiguity_on_click() {
        let (index, base) = ambiguous_aceh();
        let observer = Arc::new(RecordingObserver::default());
        let mut ex = Explorer::new(Arc::new(index), Arc::new(base), LayerDocument::default())
            .with_matcher(NameMatcher::new(TieBreak::Reject, observer.clone()));
        ex.start().unwrap();
        let step = ex.descend_to_regency("11");
        drive(&mut ex, step);
        assert_eq!(ex.active_layer().unwrap().model.annotations[0].entity_id, None);

        let layer = layer_id(&ex);
        assert!(matches!(
            ex.click(layer, 0),
            Err(NavError::AmbiguousMatch { .. })
        ));
        assert!(!observer.reports().is_empty());
    }

    #[test]
    fn test_repeated_ambiguity_is_recorded_once() {
        let (index, base) = ambiguous_aceh();
        let observer = Arc::new(RecordingObserver::default());
        let mut ex = Explorer::new(Arc::new(index), Arc::new(base), LayerDocument::default())
            .with_matcher(NameMatcher::new(TieBreak::FirstInOrder, observer.clone()));
        ex.start().unwrap();
        for _ in 0..20 {
            let step = ex.descend_to_regency("11");
            drive(&mut ex, step);
            assert_eq!(
                ex.active_layer().unwrap().model.annotations[0].entity_id.as_deref(),
                Some("1105")
            );
            let step = ex.ascend();
            drive(&mut ex, step);
        }
        let reports = observer.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].feature_name, "Kab. Aceh Barat Daya");
        assert_eq!(reports[0].chosen, "Aceh Barat");
    }

    #[test]
    fn test_cluster_marker_descends_into_village_file() {
        const GAMPING: &str =
            "indonesia-district/id34_daerah_istimewa_yogyakarta/id3404_sleman/id3404010_gamping.geojson";
        let index = RegionIndex::from_value(json!([
            {"id": "34", "name": "Daerah Istimewa Yogyakarta", "regencies": [
                {"id": "3404", "name": "Sleman", "file": SLEMAN, "districts": [
                    {"id": "3404010", "name": "Gamping", "file": GAMPING},
                    {"id": "3404020", "name": "Mlati", "file": null}
                ]}
            ]}
        ]))
        .unwrap();
        let source = source().with(
            GAMPING,
            collection(vec![
                square(json!({"village": "Ambarketawang", "district": "GAMPING"}), 110.30, -7.80, 0.02),
                square(json!({"village": "Balecatur", "district": "Gamping"}), 110.28, -7.79, 0.02),
                square(json!({"village": "Sinduadi", "district": "Mlati"}), 110.37, -7.75, 0.02),
            ]),
        );
        let mut ex = Explorer::new(Arc::new(index), Arc::new(base()), LayerDocument::default());
        ex.start().unwrap();
        let step = ex.descend_to_regency("34").unwrap();
        ex.drive(&source, step).unwrap();
        let step = ex.descend_to_district("3404").unwrap();
        ex.drive(&source, step).unwrap();
        assert!(ex.view().clustered);

        let layer = layer_id(&ex);
        let ClickOutcome::Navigate(step) = ex.click_marker(layer, 0).unwrap() else {
            panic!("cluster marker should navigate");
        };
        assert!(matches!(&step, Step::Fetch(t) if t.location == GAMPING));
        let outcome = ex.drive(&source, step).unwrap();
        assert!(matches!(outcome, Outcome::Rendered { .. }));
        assert_eq!(ex.selection().level, Level::Village);
        assert_eq!(ex.selection().district.as_deref(), Some("3404010"));
        assert_eq!(ex.renderer().features.len(), 2);
        let names: Vec<String> = ex.list().into_iter().map(|i| i.name).collect();
        assert_eq!(names, vec!["Ambarketawang", "Balecatur"]);
    }

    #[test]
    fn test_view_serializes() {
        let mut ex = explorer();
        ex.focus("34").unwrap();
        let value = serde_json::to_value(ex.view()).unwrap();
        assert_eq!(value["selection"]["level"], "province");
        assert_eq!(value["selection"]["province"], "34");
        assert_eq!(value["details"]["name"], "Daerah Istimewa Yogyakarta");
        assert_eq!(value["loading"], false);
    }
}
