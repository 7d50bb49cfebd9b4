use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, Layer, Registry};

/// Full filter override, in `Targets` syntax (e.g. `labnode_client=trace,warn`).
pub const LOG_ENV: &str = "LABNODE_LOG";

/// Target prefix shared by every crate in the workspace.
const LABNODE_TARGET: &str = "labnode";

/// Ceiling for tokio and other dependencies, whatever `--log-level` says.
const DEPENDENCY_CEILING: LevelFilter = LevelFilter::WARN;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    /// Connection lifecycle and request outcomes.
    Debug,
    /// Every frame sent and received.
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// `level` for labnode crates, at most `warn` for everything else.
pub fn labnode_targets(level: LogLevel) -> Targets {
    let level = level.as_filter();
    Targets::new()
        .with_default(level.min(DEPENDENCY_CEILING))
        .with_target(LABNODE_TARGET, level)
}

/// `LABNODE_LOG` when set and parseable, otherwise the `--log-level` filter.
fn resolve_targets(level: LogLevel, env: Option<&str>) -> Targets {
    env.and_then(|raw| raw.parse::<Targets>().ok())
        .unwrap_or_else(|| labnode_targets(level))
}

/// Install the stderr subscriber. Targets are shown from `debug` up so frame
/// traces can be told apart from connection events.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let env = std::env::var(LOG_ENV).ok();
    let targets = resolve_targets(level, env.as_deref());
    let show_target = level.as_filter() >= LevelFilter::DEBUG || env.is_some();

    let layer: Box<dyn Layer<Registry> + Send + Sync> = match format {
        LogFormat::Text => fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .with_target(show_target)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(show_target)
            .json()
            .with_current_span(false)
            .boxed(),
    };

    let _ = tracing_subscriber::registry()
        .with(layer.with_filter(targets))
        .try_init();
}
