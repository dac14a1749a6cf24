//! File logger for embedding applications

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use simplelog::{ConfigBuilder, LevelFilter, ThreadLogMode, WriteLogger};

/// Route `log` records at `level` and above into a fresh file at `path`.
///
/// Lane threads are named, so every line carries the thread it came from.
/// Fails if the file cannot be created or a global logger is already set.
pub fn init_file_logger(path: &Path, level: LevelFilter) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create log file {}", path.display()))?;
    let config = ConfigBuilder::new()
        .set_thread_level(LevelFilter::Error)
        .set_thread_mode(ThreadLogMode::Names)
        .build();

    WriteLogger::init(level, config, file).context("Logger already initialized")?;
    Ok(())
}
