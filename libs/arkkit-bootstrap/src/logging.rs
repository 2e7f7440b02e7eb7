use crate::config::{LoggingConfig, Section};
use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::level_filters::LevelFilter;
use tracing::Level;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::{fmt, util::SubscriberInitExt, Layer};

use file_rotate::{
    compression::Compression,
    suffix::{AppendTimestamp, FileLimit},
    ContentLimit, FileRotate,
};

// Keep a guard for non-blocking console to avoid being dropped.
static CONSOLE_GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
    std::sync::OnceLock::new();

fn parse_tracing_level(s: &str) -> Option<Level> {
    match s.to_ascii_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        "off" | "none" => None,
        _ => Some(Level::INFO),
    }
}

fn level_filter(s: &str) -> LevelFilter {
    parse_tracing_level(s)
        .map(LevelFilter::from_level)
        .unwrap_or(LevelFilter::OFF)
}

// ================= rotating file writer =================

#[derive(Clone)]
struct RotWriter(Arc<Mutex<FileRotate<AppendTimestamp>>>);

impl<'a> fmt::MakeWriter<'a> for RotWriter {
    type Writer = RotWriterHandle;
    fn make_writer(&'a self) -> Self::Writer {
        RotWriterHandle(self.0.clone())
    }
}

struct RotWriterHandle(Arc<Mutex<FileRotate<AppendTimestamp>>>);

impl Write for RotWriterHandle {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self.0.lock() {
            Ok(mut w) => w.write(buf),
            // A panicked writer must not take logging down with it.
            Err(poisoned) => poisoned.into_inner().write(buf),
        }
    }
    fn flush(&mut self) -> std::io::Result<()> {
        match self.0.lock() {
            Ok(mut w) => w.flush(),
            Err(poisoned) => poisoned.into_inner().flush(),
        }
    }
}

fn resolve_log_path(file: &str, base_dir: &Path) -> PathBuf {
    let p = Path::new(file);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base_dir.join(p)
    }
}

fn create_rotating_writer(section: &Section, base_dir: &Path) -> Option<RotWriter> {
    if section.file.trim().is_empty() {
        return None;
    }
    let log_path = resolve_log_path(&section.file, base_dir);
    if let Some(parent) = log_path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            eprintln!(
                "Failed to create log directory '{}': {e}",
                parent.to_string_lossy()
            );
            return None;
        }
    }

    let max_bytes = section.max_size_mb.unwrap_or(100) as usize * 1024 * 1024;
    let rot = FileRotate::new(
        &log_path,
        AppendTimestamp::default(FileLimit::MaxFiles(section.max_backups.unwrap_or(3))),
        ContentLimit::BytesSurpassed(max_bytes),
        Compression::None,
        None,
    );
    Some(RotWriter(Arc::new(Mutex::new(rot))))
}

// ================= targets =================

/// Build per-sink targets: "default" sets the fallback level, every other key
/// is a target prefix (e.g. "arkkit::theme") with its own level.
fn build_targets(cfg: &LoggingConfig, level_of: impl Fn(&Section) -> &str) -> Targets {
    let default_level = cfg
        .get("default")
        .map(|s| level_filter(level_of(s)))
        .unwrap_or(LevelFilter::INFO);

    cfg.iter()
        .filter(|(k, _)| k.as_str() != "default")
        .fold(Targets::new().with_default(default_level), |t, (k, s)| {
            t.with_target(k.clone(), level_filter(level_of(s)))
        })
}

// ================= public init =================

/// Install the global subscriber: human-readable console output plus an
/// optional JSON file sink for the "default" section. `RUST_LOG` caps both.
pub fn init_logging(cfg: &LoggingConfig, base_dir: &Path) {
    use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};

    // Bridge `log` → `tracing` *before* installing the subscriber
    if let Err(e) = tracing_log::LogTracer::init() {
        eprintln!("LogTracer init skipped: {e}");
    }

    let env: Option<EnvFilter> = EnvFilter::try_from_default_env().ok();

    let (nb_stderr, guard) = tracing_appender::non_blocking(std::io::stderr());
    let _ = CONSOLE_GUARD.set(guard);

    let console_layer = fmt::layer()
        .with_writer(nb_stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(true)
        .with_level(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_filter(build_targets(cfg, |s| s.console_level.as_str()));

    let file_layer = cfg
        .get("default")
        .and_then(|s| create_rotating_writer(s, base_dir))
        .map(|writer| {
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_target(true)
                .with_level(true)
                .with_timer(fmt::time::UtcTime::rfc_3339())
                .with_writer(writer)
                .with_filter(build_targets(cfg, |s| s.file_level.as_str()))
        });

    let subscriber = Registry::default()
        .with(env)
        .with(console_layer)
        .with(file_layer);

    let _ = subscriber.try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn section(console: &str, file: &str, file_level: &str) -> Section {
        Section {
            console_level: console.into(),
            file: file.into(),
            file_level: file_level.into(),
            max_backups: Some(2),
            max_size_mb: Some(1),
        }
    }

    #[test]
    fn level_parsing() {
        assert_eq!(parse_tracing_level("DEBUG"), Some(Level::DEBUG));
        assert_eq!(parse_tracing_level("off"), None);
        assert_eq!(parse_tracing_level("garbage"), Some(Level::INFO));
        assert_eq!(level_filter("none"), LevelFilter::OFF);
    }

    #[test]
    fn targets_honour_per_target_levels() {
        let mut cfg: LoggingConfig = HashMap::new();
        cfg.insert("default".into(), section("warn", "", ""));
        cfg.insert("arkkit::theme".into(), section("trace", "", ""));

        let targets = build_targets(&cfg, |s| s.console_level.as_str());

        assert!(targets.would_enable("arkkit::theme::switcher", &Level::TRACE));
        assert!(!targets.would_enable("arkkit::store", &Level::INFO));
        assert!(targets.would_enable("arkkit::store", &Level::WARN));
    }

    #[test]
    fn empty_file_disables_file_sink() {
        let tmp = tempdir().unwrap();
        assert!(create_rotating_writer(&section("info", "", "debug"), tmp.path()).is_none());
        assert!(
            create_rotating_writer(&section("info", "logs/ark.log", "debug"), tmp.path())
                .is_some()
        );
        assert!(tmp.path().join("logs").is_dir());
    }
}
