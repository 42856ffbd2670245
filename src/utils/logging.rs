use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::core::constants::LOG_FILTER_ENV;

/// Where diagnostic tracing output goes.
pub enum TracingTarget {
    /// Append to a file; used while the TUI owns the terminal.
    File(PathBuf),
    Stderr,
}

/// Install the global tracing subscriber.
///
/// The filter comes from `GRAMFIX_LOG`, falling back to `default_directive`.
/// Failing to open the log file leaves tracing disabled instead of aborting.
pub fn init_tracing(target: TracingTarget, default_directive: &str) {
    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    match target {
        TracingTarget::File(path) => {
            if let Some(dir) = path.parent() {
                let _ = std::fs::create_dir_all(dir);
            }
            let Ok(file) = OpenOptions::new().create(true).append(true).open(&path) else {
                return;
            };
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init();
        }
        TracingTarget::Stderr => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init();
        }
    }
}

/// Plain-text transcript of the conversation, enabled with `--log <file>`.
pub struct LoggingState {
    file_path: Option<String>,
}

impl LoggingState {
    pub fn new(log_file: Option<String>) -> Result<Self, Box<dyn std::error::Error>> {
        if let Some(path) = &log_file {
            Self::test_file_access(path)?;
        }
        Ok(LoggingState {
            file_path: log_file,
        })
    }

    pub fn disabled() -> Self {
        LoggingState { file_path: None }
    }

    pub fn log_message(&self, content: &str) -> Result<(), Box<dyn std::error::Error>> {
        let Some(file_path) = self.file_path.as_ref() else {
            return Ok(());
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(file_path)?;
        let mut writer = BufWriter::new(file);

        for line in content.lines() {
            writeln!(writer, "{line}")?;
        }
        // Blank line between messages, matching the on-screen layout
        writeln!(writer)?;

        writer.flush()?;
        Ok(())
    }

    pub fn get_status_string(&self) -> String {
        match &self.file_path {
            None => "off".to_string(),
            Some(path) => Path::new(path)
                .file_name()
                .unwrap_or_default()
                .to_string_lossy()
                .into_owned(),
        }
    }

    fn test_file_access(path: &str) -> Result<(), Box<dyn std::error::Error>> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.flush()?;
        Ok(())
    }
}
