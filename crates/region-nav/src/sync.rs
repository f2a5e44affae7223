use serde::{Deserialize, Serialize};

use crate::geometry::{bounds_of, BBox, Feature, FeatureExt, LatLng};
use crate::navigation::Level;
use crate::style::{format_compact, FeatureStyle, StylePalette, VisualState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerId(pub u64);

/// What the navigator knows about one rendered feature.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Annotation {
    /// Display name; the district name in clustering sub-mode.
    pub name: String,
    /// Index entity the feature was matched to, if any.
    pub entity_id: Option<String>,
    pub count: Option<u64>,
}

/// A synthetic district built from clustered village polygons.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterModel {
    pub name: String,
    pub members: Vec<usize>,
    pub centroid: Option<LatLng>,
    pub entity_id: Option<String>,
    pub count: Option<u64>,
}

/// Everything needed to draw one level.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerModel {
    pub level: Level,
    pub features: Vec<Feature>,
    pub annotations: Vec<Annotation>,
    /// Present in clustering sub-mode.
    pub clusters: Option<Vec<ClusterModel>>,
}

impl LayerModel {
    pub fn is_clustered(&self) -> bool {
        self.clusters.is_some()
    }

    /// Feature indices that react together to pointer events: the whole
    /// cluster in clustering sub-mode, otherwise the feature alone.
    pub fn group_of(&self, i: usize) -> Vec<usize> {
        self.clusters
            .as_ref()
            .and_then(|cs| cs.iter().find(|c| c.members.contains(&i)))
            .map(|c| c.members.clone())
            .unwrap_or_else(|| vec![i])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bubble {
    pub size_px: f64,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    pub position: LatLng,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bubble: Option<Bubble>,
    /// District to descend into when the marker is clicked. Only cluster
    /// markers are interactive.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InfoPanel {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
}

/// Map drawing primitives supplied by the host.
pub trait MapRenderer {
    fn set_layer(&mut self, id: LayerId, features: &[Feature], styles: &[FeatureStyle]);
    fn restyle(&mut self, index: usize, style: &FeatureStyle);
    fn bring_to_front(&mut self, index: usize);
    fn clear_layer(&mut self);
    fn add_marker(&mut self, marker: &Marker);
    fn clear_markers(&mut self);
    fn fit_bounds(&mut self, bounds: &BBox);
    fn show_info(&mut self, info: Option<&InfoPanel>);
}

#[derive(Debug, Clone)]
pub struct ActiveLayer {
    pub id: LayerId,
    pub model: LayerModel,
    pub markers: Vec<Marker>,
    states: Vec<VisualState>,
    focus: Option<String>,
    hovered: Option<usize>,
    highlighted: Option<usize>,
}

impl ActiveLayer {
    pub fn states(&self) -> &[VisualState] {
        &self.states
    }

    /// Whether feature `i` is inert because another entity is focused.
    pub fn is_locked_out(&self, i: usize) -> bool {
        match &self.focus {
            Some(f) => self.model.annotations[i].entity_id.as_deref() != Some(f.as_str()),
            None => false,
        }
    }

    pub fn highlighted(&self) -> Option<usize> {
        self.highlighted
    }
}

#[derive(Debug, Default)]
pub struct LayerSynchronizer {
    palette: StylePalette,
    active: Option<ActiveLayer>,
    next_id: u64,
}

impl LayerSynchronizer {
    pub fn new(palette: StylePalette) -> Self {
        Self {
            palette,
            active: None,
            next_id: 0,
        }
    }

    pub fn active(&self) -> Option<&ActiveLayer> {
        self.active.as_ref()
    }

    /// Replace whatever is on the map with `model`.
    pub fn sync(
        &mut self,
        renderer: &mut dyn MapRenderer,
        model: LayerModel,
        focus: Option<&str>,
    ) -> LayerId {
        self.clear(renderer);

        self.next_id += 1;
        let id = LayerId(self.next_id);
        let mut active = ActiveLayer {
            id,
            markers: self.markers_for(&model),
            states: Vec::new(),
            focus: focus.map(str::to_string),
            hovered: None,
            highlighted: None,
            model,
        };
        active.states = (0..active.model.features.len())
            .map(|i| self.base_state(&active, i))
            .collect();

        let styles: Vec<FeatureStyle> = active
            .states
            .iter()
            .enumerate()
            .map(|(i, s)| self.style(&active.model, i, *s))
            .collect();
        renderer.set_layer(id, &active.model.features, &styles);
        for (i, state) in active.states.iter().enumerate() {
            if *state == VisualState::Selected {
                renderer.bring_to_front(i);
            }
        }
        for marker in &active.markers {
            renderer.add_marker(marker);
        }
        if let Some(bounds) = bounds_of(&active.model.features) {
            renderer.fit_bounds(&bounds);
        }
        renderer.show_info(None);

        log::debug!(
            "layer {} synced: {} {} features, {} markers",
            id.0,
            active.model.features.len(),
            active.model.level,
            active.markers.len()
        );
        self.active = Some(active);
        id
    }

    /// Remove the boundary layer and markers.
    pub fn clear(&mut self, renderer: &mut dyn MapRenderer) {
        if self.active.take().is_some() {
            renderer.clear_layer();
            renderer.clear_markers();
            renderer.show_info(None);
        }
    }

    /// Change the focused entity of the active layer.
    pub fn set_focus(&mut self, renderer: &mut dyn MapRenderer, focus: Option<&str>) {
        let Some(mut active) = self.active.take() else {
            return;
        };
        active.focus = focus.map(str::to_string);
        active.hovered = None;
        self.restyle_changed(renderer, &mut active);
        self.active = Some(active);
    }

    /// Mark a village (village level only).
    pub fn set_highlight(&mut self, renderer: &mut dyn MapRenderer, index: Option<usize>) {
        let Some(mut active) = self.active.take() else {
            return;
        };
        active.highlighted = index.filter(|&i| i < active.model.features.len());
        self.restyle_changed(renderer, &mut active);
        self.active = Some(active);
    }

    /// Pointer entered feature `index`. Returns false when the feature is
    /// inert because of selection locking.
    pub fn hover(&mut self, renderer: &mut dyn MapRenderer, index: usize) -> bool {
        let Some(mut active) = self.active.take() else {
            return false;
        };
        if index >= active.model.features.len() || active.is_locked_out(index) {
            self.active = Some(active);
            return false;
        }
        active.hovered = Some(index);
        self.restyle_changed(renderer, &mut active);
        let ann = &active.model.annotations[index];
        renderer.show_info(Some(&InfoPanel {
            title: ann.name.clone(),
            count: ann.count,
        }));
        self.active = Some(active);
        true
    }

    /// Pointer left the layer: restore the locked or base styling.
    pub fn unhover(&mut self, renderer: &mut dyn MapRenderer) {
        let Some(mut active) = self.active.take() else {
            return;
        };
        if active.hovered.take().is_some() {
            self.restyle_changed(renderer, &mut active);
            renderer.show_info(None);
        }
        self.active = Some(active);
    }

    fn restyle_changed(&self, renderer: &mut dyn MapRenderer, active: &mut ActiveLayer) {
        let hovered_group = active
            .hovered
            .map(|i| active.model.group_of(i))
            .unwrap_or_default();
        for i in 0..active.model.features.len() {
            let state = if hovered_group.contains(&i) && !active.is_locked_out(i) {
                VisualState::Hovered
            } else {
                self.base_state(active, i)
            };
            if active.states[i] != state {
                active.states[i] = state;
                renderer.restyle(i, &self.style(&active.model, i, state));
                if matches!(state, VisualState::Selected | VisualState::Hovered) {
                    renderer.bring_to_front(i);
                }
            }
        }
    }

    fn base_state(&self, active: &ActiveLayer, i: usize) -> VisualState {
        if active.focus.is_some() {
            return if active.is_locked_out(i) {
                VisualState::Dimmed
            } else {
                VisualState::Selected
            };
        }
        if active.model.level == Level::Village {
            if active.highlighted == Some(i) {
                return VisualState::Hovered;
            }
            let count = active.model.annotations[i].count.unwrap_or(0);
            return VisualState::ValueScaled(self.palette.value_bucket(count));
        }
        VisualState::Neutral
    }

    fn style(&self, model: &LayerModel, i: usize, state: VisualState) -> FeatureStyle {
        self.palette.style_for(
            model.level,
            model.is_clustered(),
            &model.annotations[i].name,
            state,
        )
    }

    fn markers_for(&self, model: &LayerModel) -> Vec<Marker> {
        let bubble = |count: Option<u64>| {
            count.filter(|&n| n > 0 && model.level != Level::Village).map(|n| Bubble {
                size_px: self.palette.marker_size(n),
                text: format_compact(n),
            })
        };
        if let Some(clusters) = &model.clusters {
            return clusters
                .iter()
                .filter_map(|c| {
                    Some(Marker {
                        position: c.centroid?,
                        label: c.name.clone(),
                        bubble: bubble(c.count),
                        target: c.entity_id.clone(),
                    })
                })
                .collect();
        }
        model
            .features
            .iter()
            .zip(&model.annotations)
            .filter(|(_, ann)| !ann.name.is_empty())
            .filter_map(|(feature, ann)| {
                Some(Marker {
                    position: feature.centroid()?,
                    label: ann.name.clone(),
                    bubble: bubble(ann.count),
                    target: None,
                })
            })
            .collect()
    }
}
