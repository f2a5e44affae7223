//! Build the master index from a boundary data directory.
//!
//! Expected layout, with every name following `id<digits>_<slug>`:
//!
//! ```text
//! indonesia-district/
//!   id11_aceh/
//!     id1101_simeulue/
//!       id1101_simeulue.geojson          regency file (optional)
//!       id1101010_teupah_selatan.geojson district files
//! ```
//!
//! File paths in the index are relative to the parent of the scanned
//! directory, so they start with the data directory's own name.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{NavError, Result};
use crate::index::{District, Province, Regency, RegionIndex};

const EXT: &str = ".geojson";

/// `id1101_simeulue` → `("1101", "simeulue")`.
pub fn parse_coded_name(name: &str) -> Option<(&str, &str)> {
    let rest = name.strip_prefix("id")?;
    let (id, slug) = rest.split_once('_')?;
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((id, slug))
}

/// Underscores to spaces, first letter of every word upper-cased.
pub fn display_name(slug: &str) -> String {
    let mut out = String::with_capacity(slug.len());
    let mut at_word_start = true;
    for c in slug.chars() {
        let c = if c == '_' { ' ' } else { c };
        if at_word_start {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        at_word_start = !c.is_alphanumeric();
    }
    out
}

fn sorted_entries(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let Ok(name) = entry.file_name().into_string() else {
            log::warn!("skipping non-UTF-8 entry in {}", dir.display());
            continue;
        };
        entries.push((name, entry.path()));
    }
    entries.sort();
    Ok(entries)
}

/// Scan `root` and build the index.
pub fn scan_directory(root: &Path) -> Result<RegionIndex> {
    if !root.is_dir() {
        return Err(NavError::SourceUnavailable(format!(
            "{} is not a directory",
            root.display()
        )));
    }
    let root_name = root
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();

    let mut provinces = Vec::new();
    for (prov_dir, prov_path) in sorted_entries(root)? {
        let Some((id, slug)) = parse_coded_name(&prov_dir) else {
            continue;
        };
        if !prov_path.is_dir() {
            continue;
        }
        let mut regencies = Vec::new();
        for (reg_dir, reg_path) in sorted_entries(&prov_path)? {
            if !reg_path.is_dir() {
                continue;
            }
            if let Some((reg_id, reg_slug)) = parse_coded_name(&reg_dir) {
                regencies.push(scan_regency(
                    &[root_name.as_str(), prov_dir.as_str(), reg_dir.as_str()],
                    &reg_path,
                    reg_id,
                    reg_slug,
                )?);
            }
        }
        log::debug!("{prov_dir}: {} regencies", regencies.len());
        provinces.push(Province {
            id: id.to_string(),
            name: display_name(slug),
            folder: prov_dir.clone(),
            regencies,
        });
    }
    log::info!("scanned {} provinces under {}", provinces.len(), root.display());
    RegionIndex::from_provinces(provinces)
}

fn scan_regency(prefix: &[&str], dir: &Path, id: &str, slug: &str) -> Result<Regency> {
    let folder = prefix.last().copied().unwrap_or_default();
    let own_file = format!("{folder}{EXT}");
    let mut file = None;
    let mut districts = Vec::new();

    for (name, path) in sorted_entries(dir)? {
        if !name.ends_with(EXT) || !path.is_file() {
            continue;
        }
        let mut parts = prefix.to_vec();
        parts.push(&name);
        let location = parts.join("/");
        if name == own_file {
            file = Some(location);
            continue;
        }
        let stem = &name[..name.len() - EXT.len()];
        match parse_coded_name(stem) {
            Some((dist_id, dist_slug)) => districts.push(District {
                id: dist_id.to_string(),
                name: display_name(dist_slug),
                file: Some(location),
            }),
            None => log::debug!("skipping {location}: not a district file"),
        }
    }

    Ok(Regency {
        id: id.to_string(),
        name: display_name(slug),
        folder: folder.to_string(),
        file,
        districts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScratchDir(PathBuf);

    impl ScratchDir {
        fn new(name: &str) -> Self {
            static NEXT: AtomicUsize = AtomicUsize::new(0);
            let base = std::env::temp_dir().join(format!(
                "region-nav-scan-{}-{}",
                std::process::id(),
                NEXT.fetch_add(1, Ordering::Relaxed)
            ));
            let dir = base.join(name);
            fs::create_dir_all(&dir).unwrap();
            Self(dir)
        }

        fn touch(&self, rel: &str) {
            let path = self.0.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, r#"{"type":"FeatureCollection","features":[]}"#).unwrap();
        }
    }

    impl Drop for ScratchDir {
        fn drop(&mut self) {
            if let Some(parent) = self.0.parent() {
                let _ = fs::remove_dir_all(parent);
            }
        }
    }

    #[test]
    fn test_parse_coded_name() {
        assert_eq!(parse_coded_name("id11_aceh"), Some(("11", "aceh")));
        assert_eq!(
            parse_coded_name("id1101010_teupah_selatan"),
            Some(("1101010", "teupah_selatan"))
        );
        assert_eq!(parse_coded_name("kab 37"), None);
        assert_eq!(parse_coded_name("idx_aceh"), None);
        assert_eq!(parse_coded_name("id_aceh"), None);
    }

    #[test]
    fn test_display_name_title_cases_words() {
        assert_eq!(display_name("daerah_istimewa_yogyakarta"), "Daerah Istimewa Yogyakarta");
        assert_eq!(display_name("kepulauan_bangka-belitung"), "Kepulauan Bangka-Belitung");
        assert_eq!(display_name("teupah_selatan"), "Teupah Selatan");
    }

    #[test]
    fn test_scan_builds_tree() {
        let scratch = ScratchDir::new("indonesia-district");
        scratch.touch("id11_aceh/id1101_simeulue/id1101_simeulue.geojson");
        scratch.touch("id11_aceh/id1101_simeulue/id1101020_teupah_utara.geojson");
        scratch.touch("id11_aceh/id1101_simeulue/id1101010_teupah_selatan.geojson");
        scratch.touch("id11_aceh/id1102_aceh_singkil/id1102010_pulau_banyak.geojson");
        scratch.touch("id11_aceh/id1102_aceh_singkil/notes.txt");
        scratch.touch("id34_daerah_istimewa_yogyakarta/id3404_sleman/id3404_sleman.geojson");
        scratch.touch("prov 37 simplified.geojson");

        let index = scan_directory(&scratch.0).unwrap();
        let ids = index.province_ids();
        assert_eq!(ids, vec!["11", "34"]);

        let aceh = index.find_province_by_id("11").unwrap();
        assert_eq!(aceh.folder, "id11_aceh");
        let simeulue = &aceh.regencies[0];
        assert_eq!(simeulue.name, "Simeulue");
        assert_eq!(
            simeulue.file.as_deref(),
            Some("indonesia-district/id11_aceh/id1101_simeulue/id1101_simeulue.geojson")
        );
        let names: Vec<&str> = simeulue.districts.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["Teupah Selatan", "Teupah Utara"]);

        let singkil = &aceh.regencies[1];
        assert_eq!(singkil.name, "Aceh Singkil");
        assert_eq!(singkil.file, None);
        assert_eq!(singkil.districts.len(), 1);

        let diy = index.find_province_by_id("34").unwrap();
        assert_eq!(diy.name, "Daerah Istimewa Yogyakarta");
        assert!(diy.regencies[0].districts.is_empty());
    }

    #[test]
    fn test_scan_missing_root_is_unavailable() {
        let err = scan_directory(Path::new("/nonexistent/indonesia-district")).unwrap_err();
        assert!(matches!(err, NavError::SourceUnavailable(_)));
    }
}
