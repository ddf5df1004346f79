//! Quire CLI
//!
//! Usage:
//!   quire [OPTIONS] --template <NAME> <FILES>...
//!   quire --list <FILES>...
//!
//! Logging is controlled by `QUIRE_LOG` (default `warn`), or `-v`/`-vv`.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use quire::tree::Visibility;
use quire::{
    Backend, CompileOptions, CompiledFileSet, ContentKind, CssRenamingMap, IdRenamingMap,
    MessageCatalog, Record, RenamingMap,
};

#[derive(Parser)]
#[command(name = "quire")]
#[command(about = "Compile and render template files")]
struct Cli {
    /// Template files to compile together
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Fully-qualified name of the template to render
    #[arg(short, long)]
    template: Option<String>,

    /// JSON file with the template's data record
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// JSON file with injected data ($ij)
    #[arg(long)]
    ij: Option<PathBuf>,

    /// Message catalog (TOML format)
    #[arg(short, long)]
    messages: Option<PathBuf>,

    /// Selector renaming map (TOML format)
    #[arg(long)]
    css_map: Option<PathBuf>,

    /// Id renaming map (TOML format)
    #[arg(long)]
    id_map: Option<PathBuf>,

    /// Active delegate package (repeatable)
    #[arg(long = "delegate")]
    delegates: Vec<String>,

    /// Expected content kind (html, attributes, js, uri, css, text)
    #[arg(short, long)]
    kind: Option<String>,

    /// Require a strict template
    #[arg(long)]
    strict: bool,

    /// Execution backend (interpreter or compiled)
    #[arg(long)]
    backend: Option<Backend>,

    /// Disable the substituted-template cache
    #[arg(long)]
    no_cache: bool,

    /// Compile options file (TOML format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// List template names and their visibility
    #[arg(long)]
    list: bool,

    /// Print the injected params used by the template
    #[arg(long)]
    ij_params: bool,

    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(message) = run(&cli) {
        eprintln!("Error: {}", message);
        process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_env("QUIRE_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: &Cli) -> Result<(), String> {
    let mut options = match &cli.config {
        Some(path) => CompileOptions::from_file(path)
            .map_err(|e| format!("loading config '{}': {}", path.display(), e))?,
        None => CompileOptions::default(),
    };
    if let Some(backend) = cli.backend {
        options = options.with_backend(backend);
    }
    if cli.no_cache {
        options = options.with_caching(false);
    }

    let sources = cli
        .files
        .iter()
        .map(|path| {
            fs::read_to_string(path)
                .map(|source| (path.display().to_string(), source))
                .map_err(|e| format!("reading file '{}': {}", path.display(), e))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let files = CompiledFileSet::from_sources(&sources, options).map_err(|e| e.format(&sources))?;

    if cli.list {
        for name in files.registry().names() {
            let visibility = files
                .registry()
                .get(name)
                .map(|t| t.visibility)
                .unwrap_or(Visibility::Public);
            println!("{} ({})", name, visibility.attribute_value());
        }
        return Ok(());
    }

    let template = cli
        .template
        .as_deref()
        .ok_or_else(|| "--template is required unless --list is given".to_string())?;

    if cli.ij_params {
        for key in files.used_ij_params(template).map_err(|e| e.to_string())? {
            println!("{}", key);
        }
        return Ok(());
    }

    let mut renderer = files
        .new_renderer(template)
        .with_active_delegate_packages(cli.delegates.iter().cloned());
    if let Some(path) = &cli.data {
        renderer = renderer.with_data(load_record(path)?);
    }
    if let Some(path) = &cli.ij {
        renderer = renderer.with_ij_data(load_record(path)?);
    }
    if let Some(path) = &cli.messages {
        let catalog = MessageCatalog::from_file(path)
            .map_err(|e| format!("loading messages '{}': {}", path.display(), e))?;
        renderer = renderer.with_message_catalog(Arc::new(catalog));
    }
    if let Some(path) = &cli.css_map {
        let map: Arc<dyn CssRenamingMap> = Arc::new(load_map(path)?);
        renderer = renderer.with_css_renaming_map(map);
    }
    if let Some(path) = &cli.id_map {
        let map: Arc<dyn IdRenamingMap> = Arc::new(load_map(path)?);
        renderer = renderer.with_id_renaming_map(map);
    }
    if let Some(kind) = &cli.kind {
        let kind = ContentKind::from_attribute_value(kind)
            .ok_or_else(|| format!("unknown content kind '{}'", kind))?;
        renderer = renderer.with_expected_content_kind(kind);
    }

    let output = if cli.strict {
        renderer.render_strict().map(|content| content.into_content())
    } else {
        renderer.render()
    };
    println!("{}", output.map_err(|e| e.to_string())?);
    Ok(())
}

fn load_record(path: &Path) -> Result<Record, String> {
    let text = fs::read_to_string(path)
        .map_err(|e| format!("reading file '{}': {}", path.display(), e))?;
    Record::from_json_str(&text).map_err(|e| format!("parsing '{}': {}", path.display(), e))
}

fn load_map(path: &Path) -> Result<RenamingMap, String> {
    RenamingMap::from_file(path).map_err(|e| format!("loading map '{}': {}", path.display(), e))
}
