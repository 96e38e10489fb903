//! blobfile CLI
//!
//! Command-line interface for creating, inspecting and editing store files.
//!
//! Exit codes: 0 on success, 1 on invalid syntax, 2 on any other error.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use blobfile::{BlobError, NamedStore, Result, StoreConfig, TruncateMethod};
use clap::{CommandFactory, Parser};
use tracing_subscriber::{fmt, EnvFilter};

/// blobfile CLI
#[derive(Parser, Debug)]
#[command(name = "blobfile")]
#[command(about = "Single-file named blob storage")]
#[command(version)]
struct Args {
    /// Storage file
    storage: PathBuf,

    /// Shows all keys
    #[arg(short, long)]
    list: bool,

    /// Creates new storage with options: [block=<KiB>,][cache=<MiB>,][truncate=leading|trailing]
    #[arg(short, long, value_name = "OPTIONS", num_args = 0..=1, default_missing_value = "")]
    new: Option<String>,

    /// Key to operate with; alone, prints the stored data to stdout
    #[arg(short, long)]
    key: Option<String>,

    /// Imports a file, or a folder recursively using relative paths as keys
    #[arg(short, long, value_name = "PATH")]
    import_from: Option<PathBuf>,

    /// Exports the data for --key into a file
    #[arg(short, long, value_name = "PATH")]
    export_to: Option<PathBuf>,

    /// Deletes the data for --key
    #[arg(short, long)]
    delete: bool,

    /// Checks whether data for --key exists
    #[arg(short, long)]
    check: bool,

    /// Rewrites the file without stale blocks
    #[arg(short, long)]
    optimize: bool,

    /// Copies all items from another storage
    #[arg(short = 'p', long, value_name = "PATH")]
    copy_from: Option<PathBuf>,

    /// Shows storage info
    #[arg(short = 'f', long)]
    info: bool,

    /// Verifies the index structure
    #[arg(long)]
    check_tree: bool,
}

impl Args {
    fn has_action(&self) -> bool {
        self.list
            || self.new.is_some()
            || self.key.is_some()
            || self.import_from.is_some()
            || self.export_to.is_some()
            || self.delete
            || self.check
            || self.optimize
            || self.copy_from.is_some()
            || self.info
            || self.check_tree
    }
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(true)
        .init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) if !e.use_stderr() => {
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(1);
        }
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match run(&args, &mut out) {
        Ok(()) => ExitCode::SUCCESS,
        Err(BlobError::InvalidSyntax(msg)) => {
            eprintln!("{}", msg);
            ExitCode::from(1)
        }
        Err(e) => {
            tracing::debug!("Command failed: {:?}", e);
            eprintln!("{}", e);
            ExitCode::from(2)
        }
    }
}

fn run(args: &Args, out: &mut dyn Write) -> Result<()> {
    if let Some(options) = &args.new {
        let config = parse_new_options(options)?;
        NamedStore::create(&args.storage, &config)?.close()?;
        writeln!(out, "Done")?;
        return Ok(());
    }
    if args.info {
        return NamedStore::print_info(&args.storage, out);
    }

    {
        let store = NamedStore::open(&args.storage)?;
        let key = args.key.as_deref();

        if args.list || !args.has_action() {
            let mut empty = true;
            for key in store.keys() {
                writeln!(out, "{}", key?)?;
                empty = false;
            }
            if empty {
                writeln!(out, "<Empty>")?;
            }
        } else if let Some(source) = &args.import_from {
            import(&store, source, key, out)?;
        } else if let Some(target) = &args.export_to {
            let key = require_key(key)?;
            write!(out, "Exporting `{}`...", key)?;
            let mut file = BufWriter::new(File::create(target)?);
            if store.get(key, &mut file)? {
                writeln!(out, "Ok!")?;
            } else {
                writeln!(out, "<Not found>")?;
            }
        } else if args.delete {
            let key = require_key(key)?;
            write!(out, "Deleting `{}`...", key)?;
            store.delete(key)?;
            writeln!(out, "Ok!")?;
        } else if args.check {
            let key = require_key(key)?;
            writeln!(out, "{}", if store.contains(key)? { "Yes" } else { "No" })?;
        } else if let Some(other) = &args.copy_from {
            let other = NamedStore::open(other)?;
            write!(out, "Copying...")?;
            other.clone_into(&store)?;
            other.close()?;
            writeln!(out, "Ok!")?;
        } else if args.check_tree {
            let stats = store.verify()?;
            writeln!(
                out,
                "Ok: {} keys in {} pages, depth {}",
                stats.entries, stats.pages, stats.depth
            )?;
        } else if let Some(key) = key {
            if !store.get(key, out)? {
                writeln!(out, "<Not found>")?;
            }
        } else if !args.optimize {
            writeln!(out, "{}", Args::command().render_help())?;
        }
        store.close()?;
    }

    if args.optimize {
        write!(out, "Data optimization...")?;
        NamedStore::compact(&args.storage)?;
        writeln!(out, "Ok!")?;
    }
    Ok(())
}

fn require_key(key: Option<&str>) -> Result<&str> {
    key.ok_or_else(|| {
        BlobError::InvalidSyntax(
            "Options `--export-to`, `--check`, `--delete` require `--key` option as well".to_string(),
        )
    })
}

/// Parse `block=<KiB>,cache=<MiB>,truncate=<method>` into a config.
fn parse_new_options(options: &str) -> Result<StoreConfig> {
    let mut builder = StoreConfig::builder();
    for pair in options.split(',').filter(|p| !p.is_empty()) {
        let (name, value) = pair
            .split_once('=')
            .ok_or_else(|| BlobError::InvalidSyntax(format!("Expected `name=value`, got `{}`", pair)))?;
        let number = || {
            value
                .parse::<usize>()
                .map_err(|_| BlobError::InvalidSyntax(format!("`{}` is not a number", value)))
        };
        builder = match name {
            "block" => builder.data_block_kb(number()?),
            "cache" => builder.cache_mb(number()?),
            "truncate" => builder.truncate_method(value.parse::<TruncateMethod>()?),
            other => {
                return Err(BlobError::InvalidSyntax(format!(
                    "Unknown option `{}` - the supported ones are `block`, `cache` and `truncate`",
                    other
                )))
            }
        };
    }
    builder.build().map_err(|e| BlobError::InvalidSyntax(e.to_string()))
}

fn import(store: &NamedStore, source: &Path, key: Option<&str>, out: &mut dyn Write) -> Result<()> {
    if source.is_dir() {
        if key.is_some() {
            return Err(BlobError::InvalidSyntax(
                "When importing from folder the file paths are used as keys so --key value is ignored".to_string(),
            ));
        }
        let mut files = Vec::new();
        collect_files(source, &mut files)?;
        for file in files {
            let relative = file.strip_prefix(source).unwrap_or(&file);
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            import_file(store, &key, &file, out)?;
        }
        return Ok(());
    }
    let key = match key {
        Some(key) => key.to_string(),
        None => source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| BlobError::InvalidSyntax(format!("`{}` has no file name", source.display())))?,
    };
    import_file(store, &key, source, out)
}

fn import_file(store: &NamedStore, key: &str, path: &Path, out: &mut dyn Write) -> Result<()> {
    write!(out, "Importing `{}`...", key)?;
    let mut reader = BufReader::new(File::open(path)?);
    store.put(key, &mut reader)?;
    writeln!(out, "Ok!")?;
    Ok(())
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    let mut entries = fs::read_dir(dir)?.collect::<io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.path());
    for entry in entries {
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, files)?;
        } else {
            files.push(path);
        }
    }
    Ok(())
}
