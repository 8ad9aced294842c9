//! Log sinks for mock servers and verifiers.
//!
//! Every mock server and verifier builds its own [`Dispatch`] from a
//! [`LogConfig`], so concurrent instances never share a sink. The only
//! process-wide subscriber is the one installed by [`init_global`].

use crate::error::{Error, Result};
use once_cell::sync::OnceCell;
use std::{
    fs::{File, OpenOptions},
    io,
    path::PathBuf,
    sync::{Arc, Mutex},
};
use tracing::Dispatch;
use tracing_subscriber::{
    fmt::{
        writer::{BoxMakeWriter, MakeWriterExt},
        MakeWriter,
    },
    layer::SubscriberExt,
    EnvFilter, Registry,
};

/// Environment variable consulted when no level is configured.
pub const LOG_LEVEL_ENV: &str = "PACT_LOG_LEVEL";
const DEFAULT_LEVEL: &str = "info";

static GLOBAL_LOGGING: OnceCell<()> = OnceCell::new();

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogSink {
    Stdout,
    Stderr,
    File(PathBuf),
    /// Kept in memory and read back through `logs()`.
    Buffer,
}

/// In-memory log sink.
#[derive(Debug, Clone, Default)]
pub struct LogBuffer {
    contents: Arc<Mutex<Vec<u8>>>,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        self.contents
            .lock()
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(String::from).collect()
    }

    pub fn clear(&self) {
        if let Ok(mut bytes) = self.contents.lock() {
            bytes.clear();
        }
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut bytes = self
            .contents
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log buffer lock poisoned"))?;
        bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    level: Option<String>,
    sinks: Vec<LogSink>,
    json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: None,
            sinks: vec![LogSink::Buffer],
            json: false,
        }
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// An `EnvFilter` directive such as `debug` or `pact_engine::matching=trace`.
    pub fn set_level<S: Into<String>>(&mut self, level: S) {
        self.level = Some(level.into());
    }

    /// Replaces the default in-memory sink.
    pub fn set_sinks(&mut self, sinks: Vec<LogSink>) {
        self.sinks = sinks;
    }

    pub fn add_sink(&mut self, sink: LogSink) {
        if !self.sinks.contains(&sink) {
            self.sinks.push(sink);
        }
    }

    pub fn set_json(&mut self, json: bool) {
        self.json = json;
    }

    pub fn sinks(&self) -> &[LogSink] {
        &self.sinks
    }

    /// The configured level, then `PACT_LOG_LEVEL`, then `info`.
    pub fn level(&self) -> String {
        self.level
            .clone()
            .or_else(|| std::env::var(LOG_LEVEL_ENV).ok().filter(|l| !l.trim().is_empty()))
            .unwrap_or_else(|| DEFAULT_LEVEL.to_string())
    }

    fn filter(&self) -> Result<EnvFilter> {
        let level = self.level();
        EnvFilter::try_new(&level)
            .map_err(|err| Error::configuration(format!("Invalid log level '{}': {}", level, err)))
    }

    /// Builds a dispatcher writing to every configured sink. The buffer is
    /// returned when one of the sinks is [`LogSink::Buffer`].
    pub fn dispatch(&self) -> Result<(Dispatch, Option<LogBuffer>)> {
        let filter = self.filter()?;
        let mut buffer = None;
        let mut writer: Option<BoxMakeWriter> = None;

        for sink in &self.sinks {
            let next = match sink {
                LogSink::Stdout => BoxMakeWriter::new(io::stdout),
                LogSink::Stderr => BoxMakeWriter::new(io::stderr),
                LogSink::File(path) => BoxMakeWriter::new(Arc::new(open_log_file(path)?)),
                LogSink::Buffer => {
                    let log_buffer = buffer.get_or_insert_with(LogBuffer::new).clone();
                    BoxMakeWriter::new(log_buffer)
                }
            };
            writer = Some(match writer {
                Some(current) => BoxMakeWriter::new(current.and(next)),
                None => next,
            });
        }
        let writer = writer.unwrap_or_else(|| BoxMakeWriter::new(io::sink));
        let ansi = self.sinks.iter().all(|sink| matches!(sink, LogSink::Stdout | LogSink::Stderr));

        let dispatch = if self.json {
            let layer = tracing_subscriber::fmt::layer().json().with_writer(writer);
            Dispatch::new(Registry::default().with(filter).with(layer))
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(ansi)
                .with_target(true)
                .with_writer(writer);
            Dispatch::new(Registry::default().with(filter).with(layer))
        };
        Ok((dispatch, buffer))
    }
}

fn open_log_file(path: &PathBuf) -> Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

/// Installs a process-wide subscriber once. Later calls are no-ops and
/// return `Ok(false)`.
pub fn init_global(config: &LogConfig) -> Result<bool> {
    let mut installed = false;
    GLOBAL_LOGGING.get_or_try_init(|| {
        let (dispatch, _) = config.dispatch()?;
        tracing::dispatcher::set_global_default(dispatch)
            .map_err(|err| Error::configuration(format!("A global logger is already set: {}", err)))?;
        installed = true;
        Ok::<(), Error>(())
    })?;
    Ok(installed)
}
