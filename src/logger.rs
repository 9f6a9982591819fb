//! Process logging built on log4rs.
//!
//! Three rolling files are produced under the chosen directory:
//! `app.log` (root), `audit.log` (target `tierlite::audit`: config changes and
//! operator resets) and `metrics.log` (target `tierlite::metrics`: rejections and
//! degrade decisions). `dev6.log` is added when developer logging is enabled.

use log::LevelFilter;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::append::rolling_file::policy::compound::{
    CompoundPolicy, roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger,
};
use log4rs::config::{Appender, Config, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};

type LogResult<T> = Result<T, Box<dyn std::error::Error>>;

const PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] {t} - {m}{n}";
const ROLL_BYTES: u64 = 10 * 1024 * 1024;

static HANDLE: Mutex<Option<log4rs::Handle>> = Mutex::new(None);

/// Initializes the logging system from the default file `log4rs.yaml` in the working directory.
/// Prefer `configure_logging` for programmatic control.
pub fn init() -> LogResult<()> {
    init_path(Path::new("log4rs.yaml"))
}

/// Initializes the logging system from a specific config file path.
pub fn init_path(path: &Path) -> LogResult<()> {
    log4rs::init_file(path, log4rs::config::Deserializers::default())?;
    Ok(())
}

/// Parses a level name; unknown names fall back to `info`.
#[must_use]
pub fn parse_level(level: Option<&str>) -> LevelFilter {
    match level.unwrap_or("info").to_ascii_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

fn rolling(base: &Path, name: &str, keep: u32) -> LogResult<RollingFileAppender> {
    let roller = FixedWindowRoller::builder()
        .build(&format!("{}", base.join(format!("{name}.{{}}.log")).display()), keep)?;
    let policy = CompoundPolicy::new(Box::new(SizeTrigger::new(ROLL_BYTES)), Box::new(roller));
    let appender = RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .build(base.join(format!("{name}.log")), Box::new(policy))?;
    Ok(appender)
}

/// Configure logging globally for the process. A second call replaces the active config.
/// - dir: base directory for logs; if None, current directory.
/// - level: off|error|warn|info|debug|trace
/// - retention: number of rolled files to keep (default 7)
pub fn configure_logging(
    dir: Option<&Path>,
    level: Option<&str>,
    retention: Option<usize>,
) -> LogResult<()> {
    configure_logging_with_dev(dir, level, retention, false)
}

/// Configure logging globally with optional dev6 routing to `dev6.log`.
pub fn configure_logging_with_dev(
    dir: Option<&Path>,
    level: Option<&str>,
    retention: Option<usize>,
    enable_dev6: bool,
) -> LogResult<()> {
    let base = match dir {
        Some(d) => PathBuf::from(d),
        None => std::env::current_dir()?,
    };
    std::fs::create_dir_all(&base)?;
    let keep = u32::try_from(retention.unwrap_or(7)).unwrap_or(u32::MAX);
    let lvl = parse_level(level);

    let mut builder = Config::builder()
        .appender(Appender::builder().build("app", Box::new(rolling(&base, "app", keep)?)))
        .appender(Appender::builder().build("audit", Box::new(rolling(&base, "audit", keep)?)))
        .appender(
            Appender::builder().build("metrics", Box::new(rolling(&base, "metrics", keep)?)),
        )
        .logger(Logger::builder().appender("audit").additive(false).build("tierlite::audit", lvl))
        .logger(
            Logger::builder().appender("metrics").additive(false).build("tierlite::metrics", lvl),
        );

    builder = if enable_dev6 {
        builder
            .appender(Appender::builder().build("dev6", Box::new(rolling(&base, "dev6", keep)?)))
            .logger(
                Logger::builder()
                    .appender("dev6")
                    .additive(false)
                    .build("tierlite::dev6", LevelFilter::Trace),
            )
    } else {
        builder.logger(Logger::builder().additive(false).build("tierlite::dev6", LevelFilter::Off))
    };

    let config = builder.build(Root::builder().appender("app").build(lvl))?;
    let mut handle = HANDLE.lock();
    match handle.as_ref() {
        Some(h) => h.set_config(config),
        None => *handle = Some(log4rs::init_config(config)?),
    }
    Ok(())
}

/// Configure logging from environment variables if present:
/// - TIERLITE_LOG_DIR
/// - TIERLITE_LOG_LEVEL
/// - TIERLITE_LOG_RETENTION
/// - TIERLITE_DEV6 (1|true|yes)
pub fn configure_from_env() -> LogResult<()> {
    let dir = std::env::var("TIERLITE_LOG_DIR").ok().map(PathBuf::from);
    let level = std::env::var("TIERLITE_LOG_LEVEL").ok();
    let retention =
        std::env::var("TIERLITE_LOG_RETENTION").ok().and_then(|s| s.parse::<usize>().ok());
    let dev6_enabled = std::env::var("TIERLITE_DEV6")
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false);
    configure_logging_with_dev(dir.as_deref(), level.as_deref(), retention, dev6_enabled)
}
