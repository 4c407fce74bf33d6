//! Utility modules for the scanner

pub mod target_parser;

use std::time::Duration;

use crate::orchestrator::ScanStatus;

/// Logging utilities
pub struct Logger;

impl Logger {
    /// Initialize logger with specified level
    pub fn init(level: log::LevelFilter) {
        env_logger::Builder::from_default_env()
            .filter_level(level)
            .format_timestamp_secs()
            .init();
    }

    /// Map `-v` repetitions to a level filter
    pub fn level_from_verbosity(verbosity: u8) -> log::LevelFilter {
        match verbosity {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }

    /// Log scan start
    pub fn log_scan_start(scan_id: &str, target: &str, hosts: usize, ports: usize) {
        log::info!(
            "Scan {} started: {} ({} hosts, {} ports each)",
            scan_id,
            target,
            hosts,
            ports
        );
    }

    /// Log scan completion
    pub fn log_scan_complete(
        scan_id: &str,
        status: ScanStatus,
        duration: Duration,
        scanned: usize,
        detected: usize,
    ) {
        log::info!(
            "Scan {} {} in {:.2}s - {} hosts scanned, {} flagged",
            scan_id,
            status,
            duration.as_secs_f64(),
            scanned,
            detected
        );
    }
}

/// Format a duration for humans (`850ms`, `12.4s`, `3m 07s`)
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1000 {
        format!("{}ms", millis)
    } else if millis < 60_000 {
        format!("{:.1}s", duration.as_secs_f64())
    } else {
        let secs = duration.as_secs();
        format!("{}m {:02}s", secs / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(850)), "850ms");
        assert_eq!(format_duration(Duration::from_millis(12_400)), "12.4s");
        assert_eq!(format_duration(Duration::from_secs(187)), "3m 07s");
    }

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(Logger::level_from_verbosity(0), log::LevelFilter::Warn);
        assert_eq!(Logger::level_from_verbosity(2), log::LevelFilter::Debug);
        assert_eq!(Logger::level_from_verbosity(9), log::LevelFilter::Trace);
    }
}
