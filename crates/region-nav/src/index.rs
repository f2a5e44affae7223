use std::collections::HashSet;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{NavError, Result};

/// Common accessors for the three index entity kinds.
pub trait Entity {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Province {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub folder: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub regencies: Vec<Regency>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Regency {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub folder: String,
    /// Some regencies only ship district-level files.
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub districts: Vec<District>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct District {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub file: Option<String>,
}

macro_rules! impl_entity {
    ($($ty:ty),*) => {
        $(impl Entity for $ty {
            fn id(&self) -> &str {
                &self.id
            }
            fn name(&self) -> &str {
                &self.name
            }
        })*
    };
}

impl_entity!(Province, Regency, District);

/// Ids are strings in the published index, but hand-written documents
/// sometimes carry bare numbers.
fn id_string<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Int(u64),
    }
    Ok(match Raw::deserialize(d)? {
        Raw::Str(s) => s,
        Raw::Int(n) => n.to_string(),
    })
}

fn null_as_empty<'de, D, T>(d: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(d)?.unwrap_or_default())
}

/// `id<id>_<lowercase name with spaces as underscores>`
pub fn to_folder_name(name: &str, id: &str) -> String {
    format!("id{}_{}", id, name.to_lowercase().replace(' ', "_"))
}

fn contains_ci(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}

impl Province {
    pub fn find_regency_by_id(&self, id: &str) -> Option<&Regency> {
        self.regencies.iter().find(|r| r.id == id)
    }

    pub fn find_regency_by_name(&self, query: &str) -> Option<&Regency> {
        let q = query.to_lowercase();
        self.regencies.iter().find(|r| contains_ci(&r.name, &q))
    }
}

impl Regency {
    pub fn find_district_by_id(&self, id: &str) -> Option<&District> {
        self.districts.iter().find(|d| d.id == id)
    }

    pub fn find_district_by_name(&self, query: &str) -> Option<&District> {
        let q = query.to_lowercase();
        self.districts.iter().find(|d| contains_ci(&d.name, &q))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RegencyHit {
    #[serde(flatten)]
    pub regency: Regency,
    pub province_id: String,
    pub province_name: String,
    pub province_folder: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DistrictHit {
    #[serde(flatten)]
    pub district: District,
    pub province_id: String,
    pub province_name: String,
    pub province_folder: String,
    pub regency_id: String,
    pub regency_name: String,
    pub regency_folder: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Statistics {
    pub total_provinces: usize,
    pub total_regencies: usize,
    pub total_districts: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RegionIndex {
    provinces: Vec<Province>,
}

impl RegionIndex {
    /// Parse a master index document.
    ///
    /// The document must be a JSON array of province objects. Ids must be
    /// unique among siblings (province ids across the whole index).
    pub fn load(data: &[u8]) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_slice(data)
            .map_err(|e| NavError::MalformedIndex(format!("not JSON: {e}")))?;
        Self::from_value(value)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let items = value
            .as_array()
            .ok_or_else(|| NavError::MalformedIndex("expected an array of provinces".into()))?;
        if let Some(pos) = items.iter().position(|v| !v.is_object()) {
            return Err(NavError::MalformedIndex(format!(
                "entry {pos} is not an object"
            )));
        }
        let provinces: Vec<Province> = serde_json::from_value(value)
            .map_err(|e| NavError::MalformedIndex(e.to_string()))?;
        Self::from_provinces(provinces)
    }

    pub fn from_provinces(mut provinces: Vec<Province>) -> Result<Self> {
        let mut seen = HashSet::new();
        for prov in &mut provinces {
            if !seen.insert(prov.id.clone()) {
                return Err(NavError::MalformedIndex(format!(
                    "duplicate province id {}",
                    prov.id
                )));
            }
            if prov.folder.is_empty() {
                prov.folder = to_folder_name(&prov.name, &prov.id);
            }
            let mut reg_ids = HashSet::new();
            for reg in &mut prov.regencies {
                if !reg_ids.insert(reg.id.as_str()) {
                    return Err(NavError::MalformedIndex(format!(
                        "duplicate regency id {} in province {}",
                        reg.id, prov.id
                    )));
                }
                if reg.folder.is_empty() {
                    reg.folder = to_folder_name(&reg.name, &reg.id);
                }
                let mut dist_ids = HashSet::new();
                for dist in &reg.districts {
                    if !dist_ids.insert(dist.id.as_str()) {
                        return Err(NavError::MalformedIndex(format!(
                            "duplicate district id {} in regency {}",
                            dist.id, reg.id
                        )));
                    }
                }
            }
        }
        log::debug!("loaded region index with {} provinces", provinces.len());
        Ok(Self { provinces })
    }

    pub fn provinces(&self) -> &[Province] {
        &self.provinces
    }

    pub fn find_province_by_id(&self, id: &str) -> Option<&Province> {
        self.provinces.iter().find(|p| p.id == id)
    }

    /// First province (document order) whose name contains `query`,
    /// ignoring case.
    pub fn find_province_by_name(&self, query: &str) -> Option<&Province> {
        let q = query.to_lowercase();
        self.provinces.iter().find(|p| contains_ci(&p.name, &q))
    }

    pub fn find_regency(&self, province_id: &str, regency_id: &str) -> Option<&Regency> {
        self.find_province_by_id(province_id)?
            .find_regency_by_id(regency_id)
    }

    pub fn find_district(
        &self,
        province_id: &str,
        regency_id: &str,
        district_id: &str,
    ) -> Option<&District> {
        self.find_regency(province_id, regency_id)?
            .find_district_by_id(district_id)
    }

    pub fn regencies_of(&self, province_id: &str) -> &[Regency] {
        self.find_province_by_id(province_id)
            .map(|p| p.regencies.as_slice())
            .unwrap_or(&[])
    }

    pub fn districts_of(&self, province_id: &str, regency_id: &str) -> &[District] {
        self.find_regency(province_id, regency_id)
            .map(|r| r.districts.as_slice())
            .unwrap_or(&[])
    }

    pub fn province_ids(&self) -> Vec<&str> {
        self.provinces.iter().map(|p| p.id.as_str()).collect()
    }

    pub fn province_exists(&self, id: &str) -> bool {
        self.find_province_by_id(id).is_some()
    }

    pub fn search_provinces(&self, query: &str) -> Vec<&Province> {
        let q = query.to_lowercase();
        self.provinces
            .iter()
            .filter(|p| contains_ci(&p.name, &q))
            .collect()
    }

    pub fn search_regencies(&self, query: &str) -> Vec<RegencyHit> {
        let q = query.to_lowercase();
        let mut hits = Vec::new();
        for prov in &self.provinces {
            for reg in prov.regencies.iter().filter(|r| contains_ci(&r.name, &q)) {
                hits.push(RegencyHit {
                    regency: reg.clone(),
                    province_id: prov.id.clone(),
                    province_name: prov.name.clone(),
                    province_folder: prov.folder.clone(),
                });
            }
        }
        hits
    }

    pub fn search_districts(&self, query: &str) -> Vec<DistrictHit> {
        let q = query.to_lowercase();
        let mut hits = Vec::new();
        for prov in &self.provinces {
            for reg in &prov.regencies {
                for dist in reg.districts.iter().filter(|d| contains_ci(&d.name, &q)) {
                    hits.push(DistrictHit {
                        district: dist.clone(),
                        province_id: prov.id.clone(),
                        province_name: prov.name.clone(),
                        province_folder: prov.folder.clone(),
                        regency_id: reg.id.clone(),
                        regency_name: reg.name.clone(),
                        regency_folder: reg.folder.clone(),
                    });
                }
            }
        }
        hits
    }

    pub fn statistics(&self) -> Statistics {
        let total_regencies = self.provinces.iter().map(|p| p.regencies.len()).sum();
        let total_districts = self
            .provinces
            .iter()
            .flat_map(|p| &p.regencies)
            .map(|r| r.districts.len())
            .sum();
        Statistics {
            total_provinces: self.provinces.len(),
            total_regencies,
            total_districts,
        }
    }
}
