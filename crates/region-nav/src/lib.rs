pub mod document;
pub mod error;
pub mod explorer;
pub mod geometry;
pub mod index;
pub mod matching;
pub mod metrics;
pub mod navigation;
pub mod properties;
pub mod resolver;
pub mod scan;
pub mod source;
pub mod style;
pub mod sync;

use std::path::Path;
use std::sync::Arc;

pub use document::LayerDocument;
pub use error::{NavError, Result};
pub use explorer::{ClickOutcome, Explorer, ExplorerView, FetchTicket, Outcome, Step};
pub use index::RegionIndex;
pub use navigation::{Level, Selection};
pub use resolver::{BaseLayers, DatasetLayout};
pub use sync::{LayerId, MapRenderer};

use source::{bootstrap, CachedSource, DirSource};

/// Load the index and whole-country layers from a local data directory.
pub fn load_dir(root: &Path, layout: &DatasetLayout) -> Result<(RegionIndex, BaseLayers)> {
    bootstrap(&DirSource::new(root), layout)
}

/// An explorer over a local data directory, already showing the province
/// layer. Boundary files are re-read from disk on every descent.
pub fn open_dir<R: MapRenderer>(
    root: &Path,
    layout: &DatasetLayout,
    renderer: R,
) -> Result<Explorer<R>> {
    let cached = CachedSource::new(DirSource::new(root));
    let (index, base) = bootstrap(&cached, layout)?;
    let mut explorer = Explorer::new(Arc::new(index), Arc::new(base), renderer);
    let step = explorer.start()?;
    explorer.drive(cached.inner(), step)?;
    Ok(explorer)
}
