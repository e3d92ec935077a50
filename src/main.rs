mod cli;
mod error;
mod progress;

use crate::cli::{Cli, Commands, Directories};
use crate::error::{ErrorKind, Result};
use clap::Parser;
use decant_config::{Config, DecoderConfig, LastUsed};
use decant_decoder::{ArgsTemplate, CommandDecoder};
use decant_pipeline::{BatchRunner, Scratch};
use decant_storage::BackendHandle;
use decant_storage::backend::{LocalBackend, ReadOnlyBackend, StorageBackend};
use exn::{OptionExt, ResultExt};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Exit status when the batch ran but at least one item failed.
const EXIT_ITEMS_FAILED: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            tracing::debug!(error = ?err, "Command failed");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        },
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Convert { directories, scratch, decoder, extension } => {
            let mut config = Config::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config)?;
            config.scratch = scratch.or(config.scratch);
            config.decoder.program = decoder.or(config.decoder.program);
            convert(with_extension(config, extension)?, directories).await
        },
        Commands::Plan { directories, extension } => {
            let config = Config::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config)?;
            let config = with_extension(config, extension)?;
            let (source_dir, destination_dir) = resolve_directories(&directories, &load_last_used())?;
            let (source, destination) = open(&source_dir, &destination_dir).await?;
            let plan =
                decant_pipeline::plan::plan(&source, &destination, &config.extension).await.or_raise(|| ErrorKind::Batch)?;
            progress::print_plan(&plan);
            Ok(ExitCode::SUCCESS)
        },
        Commands::LastUsed => {
            let last = load_last_used();
            let show = |dir: Option<&Path>| dir.map_or_else(|| "(none)".to_string(), |d| d.display().to_string());
            println!("source:      {}", show(last.source()));
            println!("destination: {}", show(last.destination()));
            Ok(ExitCode::SUCCESS)
        },
    }
}

/// Apply command-line overrides, then validate the result as a whole.
fn with_extension(mut config: Config, extension: Option<String>) -> Result<Config> {
    if let Some(extension) = extension {
        config.extension = extension;
    }
    config.validate().or_raise(|| ErrorKind::Config)?;
    Ok(config)
}

async fn convert(config: Config, directories: Directories) -> Result<ExitCode> {
    let mut last = load_last_used();
    let (source_dir, destination_dir) = resolve_directories(&directories, &last)?;
    let (source, destination) = open(&source_dir, &destination_dir).await?;
    remember(&mut last, source_dir, destination_dir);

    let decoder = build_decoder(&config.decoder)?;
    tracing::info!(program = %decoder.program().display(), "Using decoder");
    let scratch = match config.scratch {
        Some(dir) => Scratch::at(dir).or_raise(|| ErrorKind::Batch)?,
        None => Scratch::temporary().or_raise(|| ErrorKind::Batch)?,
    };
    let extension = config.extension.clone();
    let runner = BatchRunner::new(decoder, scratch).with_extension(config.extension);

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted; finishing the current file before stopping...");
            interrupt.cancel();
        }
    });

    let (tx, mut rx) = mpsc::unbounded_channel();
    let worker = tokio::spawn(async move { runner.run(&source, &destination, &cancel, &tx).await });
    while let Some(event) = rx.recv().await {
        progress::print(&event, &extension);
    }
    let report = worker.await.or_raise(|| ErrorKind::Worker)?.or_raise(|| ErrorKind::Batch)?;
    match report.failed {
        0 => Ok(ExitCode::SUCCESS),
        _ => Ok(ExitCode::from(EXIT_ITEMS_FAILED)),
    }
}

fn build_decoder(config: &DecoderConfig) -> Result<CommandDecoder> {
    let args = ArgsTemplate::new(&config.args).or_raise(|| ErrorKind::Decoder)?;
    let decoder = match &config.program {
        Some(program) => CommandDecoder::locate(program, args),
        None => CommandDecoder::discover(&config.candidates, args),
    };
    decoder.or_raise(|| ErrorKind::Decoder)
}

/// Command-line directories win over remembered ones.
fn resolve_directories(directories: &Directories, last: &LastUsed) -> Result<(PathBuf, PathBuf)> {
    let source = resolve("source", directories.source.as_deref(), last.source())?;
    let destination = resolve("destination", directories.destination.as_deref(), last.destination())?;
    Ok((source, destination))
}

/// Open and validate both trees. The source is only ever read.
async fn open(source: &Path, destination: &Path) -> Result<(BackendHandle, BackendHandle)> {
    let source_backend: BackendHandle = Arc::new(ReadOnlyBackend::new(local("source", source).await?));
    let destination_backend = local("destination", destination).await?;
    Ok((source_backend, destination_backend))
}

fn resolve(role: &'static str, given: Option<&Path>, remembered: Option<&Path>) -> Result<PathBuf> {
    let dir = given.or(remembered).ok_or_raise(|| ErrorKind::MissingDirectory(role))?;
    if given.is_none() {
        tracing::info!(role, path = %dir.display(), "Using last used directory");
    }
    std::path::absolute(dir).or_raise(|| ErrorKind::InvalidDirectory(dir.to_path_buf()))
}

async fn local(name: &str, dir: &Path) -> Result<BackendHandle> {
    let invalid = || ErrorKind::InvalidDirectory(dir.to_path_buf());
    let backend = LocalBackend::new(name, dir).or_raise(invalid)?;
    backend.check().await.or_raise(invalid)?;
    Ok(Arc::new(backend))
}

fn load_last_used() -> LastUsed {
    let loaded = LastUsed::default_path().and_then(|path| LastUsed::load(&path));
    loaded.unwrap_or_else(|err| {
        tracing::warn!(error = ?err, "Could not read last used directories");
        LastUsed::default()
    })
}

/// Remember the directories of this run. Failing to save is not fatal.
fn remember(last: &mut LastUsed, source: PathBuf, destination: PathBuf) {
    last.remember(source, destination);
    if let Err(err) = LastUsed::default_path().and_then(|path| last.save(&path)) {
        tracing::warn!(error = ?err, "Could not remember directories");
    }
}
