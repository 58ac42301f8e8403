use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,hyper=warn,reqwest=warn,tungstenite=warn";

pub struct LoggingHandle {
    pub guard: WorkerGuard,
}

/// Initialize tracing with a non-blocking file appender under
/// `~/.echo/logs/client.log`. Format defaults to json; set
/// `ECHO_LOG_FORMAT=pretty` for human-readable output.
pub fn init_logging() -> anyhow::Result<LoggingHandle> {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
    let log_dir = std::path::PathBuf::from(home).join(".echo").join("logs");
    std::fs::create_dir_all(&log_dir)?;
    let log_path = log_dir.join("client.log");

    let filter = std::env::var("ECHO_LOG_FILTER")
        .ok()
        .and_then(|value| EnvFilter::try_new(value).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER));

    let file_appender = tracing_appender::rolling::never(&log_dir, "client.log");
    let (writer, guard) = tracing_appender::non_blocking(file_appender);
    let format = std::env::var("ECHO_LOG_FORMAT").unwrap_or_else(|_| "json".into());

    let registry = tracing_subscriber::registry().with(filter);
    if format.eq_ignore_ascii_case("pretty") {
        registry
            .with(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .pretty()
                    .with_target(true),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_writer(writer)
                    .json()
                    .flatten_event(true)
                    .with_target(true)
                    .with_current_span(true),
            )
            .init();
    }

    tracing::info!(
        component = "logging",
        event = "logging.initialized",
        log_path = %log_path.display(),
        format = %format,
    );

    Ok(LoggingHandle { guard })
}
