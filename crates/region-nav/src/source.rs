use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use crate::error::{NavError, Result};
use crate::geometry::{parse_collection, FeatureCollection};
use crate::index::RegionIndex;
use crate::resolver::{BaseLayers, DatasetLayout};

pub trait DatasetSource {
    fn fetch(&self, location: &str) -> Result<Vec<u8>>;
}

impl<S: DatasetSource + ?Sized> DatasetSource for &S {
    fn fetch(&self, location: &str) -> Result<Vec<u8>> {
        (**self).fetch(location)
    }
}

/// Reads datasets from a local directory. Locations are relative paths with
/// `/` separators; anything escaping the root is rejected.
#[derive(Debug, Clone)]
pub struct DirSource {
    root: PathBuf,
}

impl DirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_of(&self, location: &str) -> Result<PathBuf> {
        let rel = Path::new(location.trim_start_matches('/'));
        if rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(NavError::SourceUnavailable(format!(
                "{location}: outside the data root"
            )));
        }
        Ok(self.root.join(rel))
    }
}

impl DatasetSource for DirSource {
    fn fetch(&self, location: &str) -> Result<Vec<u8>> {
        let path = self.path_of(location)?;
        log::debug!("reading {}", path.display());
        std::fs::read(&path)
            .map_err(|e| NavError::SourceUnavailable(format!("{}: {e}", path.display())))
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    files: HashMap<String, Vec<u8>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, location: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.files.insert(location.into(), data.into());
    }

    pub fn with(mut self, location: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        self.insert(location, data);
        self
    }
}

impl DatasetSource for MemorySource {
    fn fetch(&self, location: &str) -> Result<Vec<u8>> {
        self.files
            .get(location)
            .cloned()
            .ok_or_else(|| NavError::SourceUnavailable(format!("{location}: not found")))
    }
}

/// Memoizes successful fetches: at most one fetch per location.
#[derive(Debug)]
pub struct CachedSource<S> {
    inner: S,
    cache: Mutex<HashMap<String, Vec<u8>>>,
}

impl<S: DatasetSource> CachedSource<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: DatasetSource> DatasetSource for CachedSource<S> {
    fn fetch(&self, location: &str) -> Result<Vec<u8>> {
        if let Some(hit) = self.cache.lock().ok().and_then(|c| c.get(location).cloned()) {
            return Ok(hit);
        }
        let data = self.inner.fetch(location)?;
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(location.to_string(), data.clone());
        }
        Ok(data)
    }
}

/// Parse fetched bytes as a boundary dataset. Parse failures are reported as
/// an unavailable source, the same as a failed fetch.
pub fn parse_dataset(location: &str, data: &[u8]) -> Result<FeatureCollection> {
    parse_collection(data)
        .map_err(|e| NavError::SourceUnavailable(format!("{location}: {e}")))
}

pub fn get_dataset(source: &impl DatasetSource, location: &str) -> Result<FeatureCollection> {
    parse_dataset(location, &source.fetch(location)?)
}

/// Load the master index. Unlike boundary files, a document that fails to
/// parse here is malformed rather than unavailable.
pub fn load_index(source: &impl DatasetSource, layout: &DatasetLayout) -> Result<RegionIndex> {
    let data = source.fetch(&layout.index)?;
    RegionIndex::load(&data)
}

/// Load the index and both whole-country layers.
pub fn bootstrap(
    source: &impl DatasetSource,
    layout: &DatasetLayout,
) -> Result<(RegionIndex, BaseLayers)> {
    let index = load_index(source, layout)?;
    let base = BaseLayers {
        provinces: get_dataset(source, &layout.provinces)?,
        regencies: get_dataset(source, &layout.regencies)?,
    };
    log::info!(
        "loaded {} provinces, {} province and {} regency boundaries",
        index.provinces().len(),
        base.provinces.features.len(),
        base.regencies.features.len()
    );
    Ok((index, base))
}
