use serde::{Deserialize, Serialize};

use crate::error::{NavError, Result};
use crate::geometry::{mean_point, Feature, FeatureCollection, FeatureExt, LatLng};
use crate::index::RegionIndex;
use crate::navigation::{Level, Selection};
use crate::properties::{
    district_of, is_village_granularity, normalize_name, prop_str, FeatureKey, PROV_ID,
};

/// Where the whole-country datasets and the master index live, relative to
/// the data root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetLayout {
    pub index: String,
    pub provinces: String,
    pub regencies: String,
}

impl Default for DatasetLayout {
    fn default() -> Self {
        Self {
            index: "map_index.json".to_string(),
            provinces: "indonesia-district/prov 37 simplified.geojson".to_string(),
            regencies: "indonesia-district/kab 37.geojson".to_string(),
        }
    }
}

/// Whole-country datasets, immutable for the rest of the session.
#[derive(Debug, Clone, PartialEq)]
pub struct BaseLayers {
    pub provinces: FeatureCollection,
    pub regencies: FeatureCollection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BoundarySource {
    /// The cached whole-country province layer.
    CountryProvinces,
    /// The cached whole-country regency layer, filtered by `prov_id`.
    ProvinceRegencies { province_id: String },
    /// A regency's own file: district polygons, or village polygons that
    /// have to be clustered by district.
    RegencyFile { location: String },
    /// A district's village file, filtered to the district's own villages.
    DistrictFile {
        location: String,
        district_name: String,
    },
    /// The index has no file for this node.
    Unavailable { reason: String },
}

impl BoundarySource {
    /// Location to fetch, for sources that are not served from cache.
    pub fn location(&self) -> Option<&str> {
        match self {
            BoundarySource::RegencyFile { location }
            | BoundarySource::DistrictFile { location, .. } => Some(location),
            _ => None,
        }
    }
}

/// Resolve the dataset for `selection`.
pub fn resolve_boundary_source(
    selection: &Selection,
    index: &RegionIndex,
) -> Result<BoundarySource> {
    Ok(match selection.level {
        Level::Province => BoundarySource::CountryProvinces,
        Level::Regency => BoundarySource::ProvinceRegencies {
            province_id: selection.province_in(index)?.id.clone(),
        },
        Level::District => {
            let regency = selection.regency_in(index)?;
            match &regency.file {
                Some(location) => BoundarySource::RegencyFile {
                    location: location.clone(),
                },
                None => BoundarySource::Unavailable {
                    reason: format!("no boundary map for {}", regency.name),
                },
            }
        }
        Level::Village => {
            let district = selection.district_in(index)?;
            match &district.file {
                Some(location) => BoundarySource::DistrictFile {
                    location: location.clone(),
                    district_name: district.name.clone(),
                },
                None => BoundarySource::Unavailable {
                    reason: format!("no village map for {}", district.name),
                },
            }
        }
    })
}

/// Village polygons from a regency file, grouped under one district.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistrictCluster {
    /// The `district` value shared by every member.
    pub name: String,
    /// Indices into the layer's feature list.
    pub members: Vec<usize>,
    /// Mean of the member bounding-box centres.
    pub centroid: Option<LatLng>,
}

/// Feature set for one level, ready for the synchronizer.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLayer {
    pub level: Level,
    pub features: Vec<Feature>,
    /// Present when a regency file turned out to be village-granular.
    pub clusters: Option<Vec<DistrictCluster>>,
}

impl ResolvedLayer {
    pub fn is_clustered(&self) -> bool {
        self.clusters.is_some()
    }

    /// Display name of feature `i`; in clustering sub-mode, its district.
    pub fn feature_name(&self, i: usize) -> String {
        let feature = &self.features[i];
        if self.is_clustered() {
            return district_of(feature).unwrap_or_default();
        }
        FeatureKey::read(feature, self.level).name().to_string()
    }
}

impl BaseLayers {
    pub fn provinces_layer(&self) -> Result<ResolvedLayer> {
        if self.provinces.features.is_empty() {
            return Err(NavError::EmptyResultSet(
                "the province boundary layer is empty".into(),
            ));
        }
        Ok(ResolvedLayer {
            level: Level::Province,
            features: self.provinces.features.clone(),
            clusters: None,
        })
    }

    /// Regencies whose `prov_id` equals `province_id`.
    pub fn regencies_layer(&self, province_id: &str) -> Result<ResolvedLayer> {
        let features: Vec<Feature> = self
            .regencies
            .features
            .iter()
            .filter(|f| prop_str(f, PROV_ID).as_deref() == Some(province_id))
            .cloned()
            .collect();
        if features.is_empty() {
            return Err(NavError::EmptyResultSet(format!(
                "no regency boundaries for province {province_id}"
            )));
        }
        Ok(ResolvedLayer {
            level: Level::Regency,
            features,
            clusters: None,
        })
    }
}

/// Interpret a regency's own file. Village-granular files are clustered by
/// their district property instead of being drawn as districts.
pub fn regency_file_layer(data: FeatureCollection) -> Result<ResolvedLayer> {
    if data.features.is_empty() {
        return Err(NavError::EmptyResultSet(
            "the regency boundary file has no features".into(),
        ));
    }
    let clusters = is_village_granularity(&data.features).then(|| cluster_by_district(&data.features));
    if let Some(clusters) = &clusters {
        log::debug!(
            "regency file is village-granular: {} villages in {} districts",
            data.features.len(),
            clusters.len()
        );
    }
    Ok(ResolvedLayer {
        level: Level::District,
        features: data.features,
        clusters,
    })
}

/// Villages of one district: features whose normalised `district` property
/// equals the normalised district name.
pub fn district_file_layer(data: FeatureCollection, district_name: &str) -> Result<ResolvedLayer> {
    let target = normalize_name(district_name);
    let features: Vec<Feature> = data
        .features
        .into_iter()
        .filter(|f| district_of(f).is_some_and(|d| normalize_name(&d) == target))
        .collect();
    if features.is_empty() {
        return Err(NavError::EmptyResultSet(format!(
            "no village data for {district_name}"
        )));
    }
    Ok(ResolvedLayer {
        level: Level::Village,
        features,
        clusters: None,
    })
}

/// Group features by their `district` value, in order of first appearance.
/// Values are compared as written, so spellings differing in case or spacing
/// form separate clusters. Features without a district belong to none.
pub fn cluster_by_district(features: &[Feature]) -> Vec<DistrictCluster> {
    let mut clusters: Vec<DistrictCluster> = Vec::new();
    for (i, feature) in features.iter().enumerate() {
        let Some(name) = district_of(feature) else {
            continue;
        };
        match clusters.iter_mut().find(|c| c.name == name) {
            Some(cluster) => cluster.members.push(i),
            None => clusters.push(DistrictCluster {
                name,
                members: vec![i],
                centroid: None,
            }),
        }
    }
    for cluster in &mut clusters {
        let centres: Vec<LatLng> = cluster
            .members
            .iter()
            .filter_map(|&i| features[i].centroid())
            .collect();
        cluster.centroid = mean_point(&centres);
    }
    clusters
}
