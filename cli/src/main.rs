use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use sheetpack_compiler::error::SheetError;
use sheetpack_compiler::export::export;
use sheetpack_compiler::registry::{TableMode, TypeGraph};
use sheetpack_compiler::table::{compile_tables, PropertyRow, TableData, TableJob};
use sheetpack_compiler::types::{TableDecl, TypeModule};

#[derive(Parser)]
#[command(name = "sheetpack")]
#[command(about = "Compile table schemas and data into binary blobs and a schema descriptor", long_about = None)]
struct Cli {
    /// Path to the workspace config
    #[arg(short, long, default_value = "sheetpack.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile every table: write `.dat` blobs, layout traces and the
    /// schema descriptor
    Generate,

    /// Build and validate the type graph without writing anything
    Check,

    /// Write the schema descriptor JSON to stdout or a file
    Export {
        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Decode a generated `.dat` blob back to JSON (standard tables)
    Inspect {
        /// Table source name, e.g. `Reward`
        #[arg(short, long)]
        table: String,
    },
}

#[derive(Debug, Deserialize)]
struct Config {
    paths: Paths,
    #[serde(default)]
    suffixes: Suffixes,
}

#[derive(Debug, Deserialize)]
struct Paths {
    metadata_dir: PathBuf,
    data_dir: PathBuf,
    output_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
struct Suffixes {
    #[serde(default = "default_type_def")]
    type_def: String,
    #[serde(default = "default_inner_type_def")]
    inner_type_def: String,
    #[serde(default = "default_binary_extension")]
    binary_extension: String,
}

fn default_type_def() -> String {
    ".typedef.json".to_owned()
}

fn default_inner_type_def() -> String {
    ".innertypesdef.json".to_owned()
}

fn default_binary_extension() -> String {
    ".dat".to_owned()
}

impl Default for Suffixes {
    fn default() -> Self {
        Suffixes {
            type_def: default_type_def(),
            inner_type_def: default_inner_type_def(),
            binary_extension: default_binary_extension(),
        }
    }
}

fn load_config(path: &Path) -> Result<Config, SheetError> {
    let text = fs::read_to_string(path).map_err(SheetError::Io)?;
    toml::from_str(&text)
        .map_err(|e| SheetError::Decode(format!("{}: {}", path.display(), e)))
}

/// Loads every type module and table declaration under the metadata
/// directory. Import lists are informational once everything is loaded;
/// names are global across the whole set.
fn load_declarations(
    config: &Config,
) -> Result<(Vec<TypeModule>, Vec<TableDecl>), SheetError> {
    let mut modules = Vec::new();
    let mut tables = Vec::new();

    let mut entries: Vec<PathBuf> = fs::read_dir(&config.paths.metadata_dir)
        .map_err(SheetError::Io)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    entries.sort();

    for path in entries {
        let file_name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name.to_owned(),
            None => continue,
        };
        if let Some(stem) = file_name.strip_suffix(&config.suffixes.inner_type_def) {
            let text = fs::read_to_string(&path).map_err(SheetError::Io)?;
            let module: TypeModule = serde_json::from_str(&text)
                .map_err(|e| SheetError::Decode(format!("{}: {}", path.display(), e)))?;
            info!(module = stem, "loaded type module");
            modules.push(module);
        } else if let Some(stem) = file_name.strip_suffix(&config.suffixes.type_def) {
            let text = fs::read_to_string(&path).map_err(SheetError::Io)?;
            let decl: TableDecl = serde_json::from_str(&text)
                .map_err(|e| SheetError::Decode(format!("{}: {}", path.display(), e)))?;
            info!(table = stem, "loaded table declaration");
            tables.push(decl.with_source(stem));
        }
    }

    Ok((modules, tables))
}

/// Pairs every declared table with its extracted row data. Tables with no
/// data file are skipped with a warning, mirroring how sheets without a
/// declaration are skipped on the extraction side.
fn load_jobs(config: &Config, graph: &TypeGraph) -> Result<Vec<TableJob>, SheetError> {
    let mut jobs = Vec::new();
    for table in graph.tables() {
        let data_path = config.paths.data_dir.join(format!("{}.json", table.source));
        if !data_path.exists() {
            warn!(table = %table.source, "no data file, skipped");
            continue;
        }
        let text = fs::read_to_string(&data_path).map_err(SheetError::Io)?;
        let data = match table.mode {
            TableMode::Standard => {
                let rows: Vec<serde_json::Value> = serde_json::from_str(&text)
                    .map_err(|e| SheetError::Decode(format!("{}: {}", data_path.display(), e)))?;
                TableData::Rows(rows)
            }
            TableMode::Flat => {
                let props: Vec<PropertyRow> = serde_json::from_str(&text)
                    .map_err(|e| SheetError::Decode(format!("{}: {}", data_path.display(), e)))?;
                TableData::Properties(props)
            }
        };
        jobs.push(TableJob {
            table: table.clone(),
            data,
        });
    }
    Ok(jobs)
}

fn build_graph(config: &Config) -> Result<TypeGraph, SheetError> {
    let (modules, tables) = load_declarations(config)?;
    TypeGraph::build(&modules, &tables)
}

fn generate(config: &Config) -> Result<(), SheetError> {
    let graph = build_graph(config)?;
    let jobs = load_jobs(config, &graph)?;

    let data_dir = config.paths.output_dir.join("data");
    let layout_dir = config.paths.output_dir.join("layout");
    fs::create_dir_all(&data_dir).map_err(SheetError::Io)?;
    fs::create_dir_all(&layout_dir).map_err(SheetError::Io)?;

    let results = compile_tables(&graph, &jobs);
    let mut failures = 0usize;
    for (source, result) in &results {
        match result {
            Ok(artifact) => {
                let dat_path =
                    data_dir.join(format!("{}{}", source, config.suffixes.binary_extension));
                fs::write(&dat_path, &artifact.bytes).map_err(SheetError::Io)?;
                let layout_path = layout_dir.join(format!("{}_layout.txt", source));
                fs::write(&layout_path, &artifact.layout).map_err(SheetError::Io)?;
                info!(
                    table = %source,
                    rows = artifact.rows,
                    bytes = artifact.bytes.len(),
                    "wrote {}",
                    dat_path.display()
                );
            }
            Err(e) => {
                failures += 1;
                error!(table = %source, "failed: {}", e);
            }
        }
    }

    let descriptor = export(&graph);
    let descriptor_path = config.paths.output_dir.join("schema_descriptor.json");
    let json = serde_json::to_string_pretty(&descriptor)
        .map_err(|e| SheetError::Decode(e.to_string()))?;
    fs::write(&descriptor_path, json).map_err(SheetError::Io)?;
    info!("wrote {}", descriptor_path.display());

    if failures > 0 {
        error!("{} of {} table(s) failed", failures, results.len());
        std::process::exit(1);
    }
    Ok(())
}

fn main() -> Result<(), SheetError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match &cli.command {
        Commands::Generate => generate(&config),

        Commands::Check => {
            let graph = build_graph(&config)?;
            info!(
                types = graph.type_names().len(),
                tables = graph.tables().len(),
                "schema is valid"
            );
            Ok(())
        }

        Commands::Export { output } => {
            let graph = build_graph(&config)?;
            let descriptor = export(&graph);
            let json = serde_json::to_string_pretty(&descriptor)
                .map_err(|e| SheetError::Decode(e.to_string()))?;
            match output {
                Some(path) => {
                    fs::write(path, json).map_err(SheetError::Io)?;
                    info!("wrote {}", path.display());
                }
                None => println!("{}", json),
            }
            Ok(())
        }

        Commands::Inspect { table } => {
            let graph = build_graph(&config)?;
            let info = graph
                .table(table)
                .ok_or_else(|| SheetError::Decode(format!("unknown table {:?}", table)))?
                .clone();
            let dat_path = config.paths.output_dir.join("data").join(format!(
                "{}{}",
                info.source, config.suffixes.binary_extension
            ));
            let bytes = fs::read(&dat_path).map_err(SheetError::Io)?;
            let json = sheetpack::decode_to_json(&graph, &info, &bytes)?;
            println!("{}", json);
            Ok(())
        }
    }
}
