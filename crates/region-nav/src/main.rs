use clap::{Parser, Subcommand, ValueEnum};
use region_nav::source::{load_index, DirSource};
use region_nav::{open_dir, DatasetLayout, Explorer, LayerDocument, NavError, Result};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "region-nav", about = "Browse Indonesian administrative boundaries")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build map_index.json from a boundary data directory
    Index {
        /// Data directory (e.g. indonesia-district)
        root: PathBuf,

        /// Output JSON file (stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },
    /// Count provinces, regencies and districts
    Stats {
        /// Directory holding map_index.json
        data_root: PathBuf,
    },
    /// Search the index by name
    Search {
        data_root: PathBuf,
        kind: SearchKind,
        query: String,
    },
    /// Drill down by name and print what the map would show
    Browse {
        data_root: PathBuf,

        /// Province, regency and district names, outermost first
        path: Vec<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SearchKind {
    Provinces,
    Regencies,
    Districts,
}

fn to_json<T: serde::Serialize>(value: &T, pretty: bool) -> Result<String> {
    Ok(if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    })
}

fn run(cli: Cli) -> Result<()> {
    let layout = DatasetLayout::default();
    match cli.command {
        Command::Index {
            root,
            output,
            pretty,
        } => {
            let index = region_nav::scan::scan_directory(&root)?;
            let json = to_json(&index, pretty)?;
            if let Some(output_path) = output {
                std::fs::write(&output_path, &json)?;
                eprintln!(
                    "Written {} provinces to {}",
                    index.provinces().len(),
                    output_path.display()
                );
            } else {
                println!("{json}");
            }
        }
        Command::Stats { data_root } => {
            let index = load_index(&DirSource::new(&data_root), &layout)?;
            println!("{}", to_json(&index.statistics(), true)?);
        }
        Command::Search {
            data_root,
            kind,
            query,
        } => {
            let index = load_index(&DirSource::new(&data_root), &layout)?;
            let json = match kind {
                SearchKind::Provinces => to_json(&index.search_provinces(&query), true)?,
                SearchKind::Regencies => to_json(&index.search_regencies(&query), true)?,
                SearchKind::Districts => to_json(&index.search_districts(&query), true)?,
            };
            println!("{json}");
        }
        Command::Browse { data_root, path } => browse(&data_root, &layout, &path)?,
    }
    Ok(())
}

fn browse(data_root: &Path, layout: &DatasetLayout, path: &[String]) -> Result<()> {
    let mut explorer = open_dir(data_root, layout, LayerDocument::default())?;
    let source = DirSource::new(data_root);
    for name in path {
        let id = explorer.child_id_by_name(name).ok_or_else(|| {
            NavError::UnknownEntity(format!(
                "no {} matching {name:?}",
                explorer.selection().level
            ))
        })?;
        let step = explorer.descend(&id)?;
        explorer.drive(&source, step)?;
    }
    print_view(&explorer);
    Ok(())
}

fn print_view(explorer: &Explorer<LayerDocument>) {
    let view = explorer.view();
    let doc = explorer.renderer();
    let trail = if view.breadcrumbs.is_empty() {
        "Indonesia".to_string()
    } else {
        view.breadcrumbs.join(" > ")
    };
    println!("{trail} [{}]", view.selection.level);
    if let Some(notice) = &view.notice {
        println!("  ! {}", notice.message);
    }
    if view.clustered {
        println!("  (village boundaries grouped by district)");
    }
    for item in &view.list {
        match item.count {
            Some(n) => println!("  {:<40} {n:>8}", item.name),
            None => println!("  {}", item.name),
        }
    }
    if !doc.markers.is_empty() {
        println!("{} features, {} markers", doc.features.len(), doc.markers.len());
    }
    if let Some(b) = &doc.bounds {
        println!(
            "bounds: {:.4},{:.4} .. {:.4},{:.4}",
            b.minx, b.miny, b.maxx, b.maxy
        );
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
