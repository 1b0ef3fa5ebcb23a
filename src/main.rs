use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{debug, info, warn};

use rusty_treeview::data::loader::ProgressEvent;
use rusty_treeview::data::{
    spawn_load, DataModel, FileSet, LoadJob, LoadSettings, ModelWriter, SettingsStore,
};

#[derive(Parser, Debug)]
#[command(name = "rusty-treeview")]
#[command(about = "Load a clustered data table (CDT) with its tree files, summarise it and optionally save it.", long_about = None)]
struct Args {
    /// Data file to load; .gtr / .atr files with the same stem are picked up.
    #[arg(value_name = "FILE")]
    path: PathBuf,

    /// Field delimiter (default: tab, or ',' for .csv files).
    #[arg(short = 'd', long = "delimiter", value_name = "CHAR")]
    delimiter: Option<char>,

    /// Row of the first numeric cell, skipping detection (needs --data-col).
    #[arg(long = "data-row", value_name = "N", requires = "data_col")]
    data_row: Option<usize>,

    /// Column of the first numeric cell, skipping detection (needs --data-row).
    #[arg(long = "data-col", value_name = "N", requires = "data_row")]
    data_col: Option<usize>,

    /// Honour double quotes around fields.
    #[arg(long = "quoted")]
    quoted: bool,

    /// JSON file remembering load settings per data file.
    #[arg(short = 's', long = "settings", value_name = "FILE")]
    settings: Option<PathBuf>,

    /// Replace zero values with missing values after loading.
    #[arg(long = "zeroes-to-missing")]
    zeroes_to_missing: bool,

    /// Save the model to this data file (tree files are written next to it).
    #[arg(short = 'o', long = "save", value_name = "FILE")]
    save: Option<PathBuf>,

    /// Log level: error, warn, info, debug or trace.
    #[arg(long = "log-level", default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = args
        .log_level
        .parse::<log::LevelFilter>()
        .unwrap_or_else(|_| {
            eprintln!(
                "Warning: Invalid log level '{}' provided. Defaulting to Info.",
                args.log_level
            );
            log::LevelFilter::Info
        });
    env_logger::Builder::new().filter_level(log_level).init();
    debug!("Arguments: {args:?}");

    let file_set = FileSet::from_path(&args.path);
    let mut store = match &args.settings {
        Some(path) => SettingsStore::load(path)?,
        None => SettingsStore::default(),
    };
    let settings = resolve_settings(&args, &file_set, &store);

    let handle = spawn_load(LoadJob::new(file_set.clone(), settings));
    report_progress(handle.progress());
    let outcome = handle
        .join()
        .with_context(|| format!("loading {}", args.path.display()))?;

    let mut model = DataModel::new();
    let settings = model.install_outcome(outcome);

    if let Some(path) = &args.settings {
        store.insert(&file_set, settings);
        store.save(path)?;
        info!("Stored load settings in {}", path.display());
    }

    if args.zeroes_to_missing {
        model.matrix_mut().set_zeroes_to_missing();
        model.matrix_mut().calculate_base_values();
    }

    print!("{}", model.summary());

    if let Some(dest) = &args.save {
        let writer = ModelWriter::new(FileSet::from_path(dest));
        let report = writer.write_all(&mut model);
        for (kind, path) in &report.written {
            println!("Wrote {kind}: {}", path.display());
        }
        if let Err(e) = report.into_result() {
            bail!("saving {}: {e}", dest.display());
        }
    }
    Ok(())
}

/// Stored settings for the file, then the extension default, then flags.
fn resolve_settings(args: &Args, file_set: &FileSet, store: &SettingsStore) -> LoadSettings {
    let mut settings = match store.get(file_set) {
        Some(stored) => {
            info!("Using stored load settings for {file_set}");
            stored.clone()
        }
        None if file_set.ext().eq_ignore_ascii_case("csv") => LoadSettings::with_delimiter(','),
        None => LoadSettings::default(),
    };
    if let Some(delimiter) = args.delimiter {
        if delimiter != settings.delimiter {
            // A different delimiter moves every cell; stored positions are void.
            settings = LoadSettings::with_delimiter(delimiter);
        }
    }
    if let (Some(row), Some(col)) = (args.data_row, args.data_col) {
        settings = settings.with_data_start(row, col);
    }
    settings.parse_quoted |= args.quoted;
    settings
}

/// Log progress until the loader hangs up.
fn report_progress(events: &std::sync::mpsc::Receiver<ProgressEvent>) {
    let mut length = 0usize;
    let mut value = 0usize;
    let mut last_decile = 0usize;
    for event in events {
        match event {
            ProgressEvent::Length(n) => length = n,
            ProgressEvent::Value(v) => value = v,
            ProgressEvent::Increment(by) => value += by,
            ProgressEvent::Message(message) => info!("{message}"),
            ProgressEvent::State(state) => info!("{}", state.label()),
        }
        if length > 0 {
            let decile = value * 10 / length;
            if decile > last_decile {
                last_decile = decile;
                debug!("{}% of rows read", decile * 10);
            }
        }
    }
    if length > 0 && value < length {
        warn!("Loader stopped after {value} of {length} rows");
    }
}
