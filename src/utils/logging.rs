use std::fs;
use std::path::Path;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

use crate::config::CONFIG;

/// Target for run and model-call timings; routed only to the timing log.
pub const TIMING_TARGET: &str = "aicalart.timing";

const NOISY_TARGETS: [&str; 3] = ["hyper", "hyper_util", "reqwest"];

/// Flushes the file writers when dropped; hold it for the life of `main`.
pub struct LoggingGuards {
    _guards: Vec<WorkerGuard>,
}

fn parse_log_level(value: &str) -> LevelFilter {
    match value.trim().to_lowercase().as_str() {
        "trace" => LevelFilter::TRACE,
        "debug" => LevelFilter::DEBUG,
        "info" => LevelFilter::INFO,
        "warn" | "warning" => LevelFilter::WARN,
        "error" => LevelFilter::ERROR,
        "off" => LevelFilter::OFF,
        _ => LevelFilter::INFO,
    }
}

fn general_targets(level: LevelFilter) -> Targets {
    NOISY_TARGETS.iter().fold(
        Targets::new()
            .with_default(level)
            .with_target(TIMING_TARGET, LevelFilter::OFF),
        |targets, target| targets.with_target(*target, LevelFilter::WARN.min(level)),
    )
}

fn timing_targets() -> Targets {
    Targets::new()
        .with_default(LevelFilter::OFF)
        .with_target(TIMING_TARGET, LevelFilter::INFO)
}

fn daily_writer(dir: &Path, file_name: &str, guards: &mut Vec<WorkerGuard>) -> NonBlocking {
    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, file_name));
    guards.push(guard);
    writer
}

pub fn init_logging() -> LoggingGuards {
    let logs_dir = CONFIG.logs_dir.as_path();
    if let Err(err) = fs::create_dir_all(logs_dir) {
        eprintln!("Failed to create logs directory {}: {err}", logs_dir.display());
    }

    let mut guards = Vec::with_capacity(3);
    let general = general_targets(parse_log_level(&CONFIG.log_level));

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stdout)
        .with_filter(general.clone());
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(daily_writer(logs_dir, "aicalart.log", &mut guards))
        .with_filter(general.clone());
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(daily_writer(logs_dir, "aicalart.jsonl", &mut guards))
        .with_filter(general);
    let timing_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(daily_writer(logs_dir, "timing.log", &mut guards))
        .with_filter(timing_targets());

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .with(json_layer)
        .with(timing_layer)
        .init();

    LoggingGuards { _guards: guards }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::Level;

    #[test]
    fn parses_levels_case_insensitively() {
        assert_eq!(parse_log_level(" DEBUG "), LevelFilter::DEBUG);
        assert_eq!(parse_log_level("Warning"), LevelFilter::WARN);
        assert_eq!(parse_log_level("nonsense"), LevelFilter::INFO);
    }

    #[test]
    fn keeps_timing_out_of_general_logs() {
        let general = general_targets(LevelFilter::DEBUG);
        assert!(general.would_enable("aicalart::generate", &Level::DEBUG));
        assert!(!general.would_enable(TIMING_TARGET, &Level::INFO));
        assert!(!general.would_enable("reqwest::connect", &Level::INFO));
        assert!(general.would_enable("reqwest::connect", &Level::WARN));

        let timing = timing_targets();
        assert!(timing.would_enable(TIMING_TARGET, &Level::INFO));
        assert!(!timing.would_enable("aicalart::generate", &Level::ERROR));
    }

    #[test]
    fn quiet_levels_also_quiet_http_crates() {
        let general = general_targets(LevelFilter::ERROR);
        assert!(!general.would_enable("hyper", &Level::WARN));
        assert!(general.would_enable("hyper", &Level::ERROR));
    }
}
