use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "vimai=info";

/// Keeps the background log writer alive; drop it last.
pub struct LoggingGuard {
    _guard: WorkerGuard,
}

fn default_log_dir() -> Option<PathBuf> {
    Some(dirs::data_dir()?.join("vimai").join("logs"))
}

fn ensure_log_dir() -> std::io::Result<PathBuf> {
    let preferred = default_log_dir()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "no data dir"))
        .and_then(|dir| std::fs::create_dir_all(&dir).map(|_| dir));
    preferred.or_else(|_| {
        let dir = std::env::temp_dir().join("vimai").join("logs");
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    })
}

/// Installs the file subscriber and the panic hook. The terminal belongs to
/// the UI, so nothing goes to stdout or stderr.
pub fn init() -> Option<LoggingGuard> {
    let log_dir = ensure_log_dir().ok()?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "vimai.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let subscriber = tracing_subscriber::registry().with(env_filter).with(
        tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .with_file(true)
            .with_line_number(true),
    );

    if subscriber.try_init().is_err() {
        return None;
    }

    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        tracing::error!(panic = %panic_info, "panic");
        previous(panic_info);
    }));

    tracing::info!(log_dir = %log_dir.display(), "tracing initialized");

    Some(LoggingGuard { _guard: guard })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_dir_is_created() {
        let dir = ensure_log_dir().unwrap();
        assert!(dir.is_dir());
        assert!(dir.ends_with(std::path::Path::new("vimai").join("logs")));
    }
}
