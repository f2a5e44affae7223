use serde::Serialize;

use crate::geometry::{BBox, Feature};
use crate::sync::{InfoPanel, LayerId, MapRenderer, Marker};
use crate::style::FeatureStyle;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StyledFeature {
    pub feature: Feature,
    pub style: FeatureStyle,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LayerDocument {
    pub layer: Option<LayerId>,
    pub features: Vec<StyledFeature>,
    /// Feature indices, bottom to top.
    pub draw_order: Vec<usize>,
    pub markers: Vec<Marker>,
    pub bounds: Option<BBox>,
    pub info: Option<InfoPanel>,
}

impl LayerDocument {
    pub fn is_empty(&self) -> bool {
        self.layer.is_none() && self.markers.is_empty()
    }

    /// Index of the topmost feature.
    pub fn top(&self) -> Option<usize> {
        self.draw_order.last().copied()
    }
}

impl MapRenderer for LayerDocument {
    fn set_layer(&mut self, id: LayerId, features: &[Feature], styles: &[FeatureStyle]) {
        self.layer = Some(id);
        self.features = features
            .iter()
            .zip(styles)
            .map(|(feature, style)| StyledFeature {
                feature: feature.clone(),
                style: style.clone(),
            })
            .collect();
        self.draw_order = (0..self.features.len()).collect();
    }

    fn restyle(&mut self, index: usize, style: &FeatureStyle) {
        if let Some(f) = self.features.get_mut(index) {
            f.style = style.clone();
        }
    }

    fn bring_to_front(&mut self, index: usize) {
        if let Some(pos) = self.draw_order.iter().position(|&i| i == index) {
            self.draw_order.remove(pos);
            self.draw_order.push(index);
        }
    }

    fn clear_layer(&mut self) {
        self.layer = None;
        self.features.clear();
        self.draw_order.clear();
        self.bounds = None;
    }

    fn add_marker(&mut self, marker: &Marker) {
        self.markers.push(marker.clone());
    }

    fn clear_markers(&mut self) {
        self.markers.clear();
    }

    fn fit_bounds(&mut self, bounds: &BBox) {
        self.bounds = Some(*bounds);
    }

    fn show_info(&mut self, info: Option<&InfoPanel>) {
        self.info = info.cloned();
    }
}
