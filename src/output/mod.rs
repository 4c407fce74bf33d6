//! Output formatting and management

use colored::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, Write};

use crate::orchestrator::{ScanResult, ScanStatus};
use crate::scoring::{DetectedHost, ThreatLevel};
use crate::utils::format_duration;

/// Output format options
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub file: Option<String>,
    pub colored: bool,
    /// Also list every evidence item with its weight
    pub verbose: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Text,
            file: None,
            colored: true,
            verbose: false,
        }
    }
}

/// Main output manager
pub struct OutputManager {
    config: OutputConfig,
}

impl OutputManager {
    pub fn new(config: OutputConfig) -> Self {
        Self { config }
    }

    /// Write scan results to the configured file, or stdout
    pub fn write_results(&self, results: &ScanResult) -> io::Result<()> {
        let output = self.render(results)?;

        match &self.config.file {
            Some(filename) => {
                let mut file = File::create(filename)?;
                file.write_all(output.as_bytes())?;
            }
            None => {
                print!("{}", output);
            }
        }

        Ok(())
    }

    pub fn render(&self, results: &ScanResult) -> io::Result<String> {
        match self.config.format {
            OutputFormat::Text => Ok(self.format_text(results)),
            OutputFormat::Json => self.format_json(results),
        }
    }

    /// Format results as text
    fn format_text(&self, results: &ScanResult) -> String {
        let mut output = String::new();

        output.push('\n');
        output.push_str(&self.paint(&format!("Scan {}\n", results.scan_id), Paint::Bold));
        output.push_str(&format!("  target:   {}\n", results.target));
        if let Some(scan_type) = &results.scan_type {
            output.push_str(&format!("  type:     {}\n", scan_type));
        }
        output.push_str(&format!("  status:   {}\n", self.status_label(results.status)));
        output.push_str(&format!(
            "  hosts:    {}/{} scanned\n",
            results.scanned_hosts, results.total_hosts
        ));
        let elapsed = results.duration().to_std().unwrap_or_default();
        output.push_str(&format!("  duration: {}\n\n", format_duration(elapsed)));

        if results.hosts.is_empty() {
            output.push_str(&self.paint("No mining activity detected.\n", Paint::Dim));
            return output;
        }

        let summary = &results.summary;
        output.push_str(&format!(
            "{} confirmed, {} potential, {} suspicious\n\n",
            self.paint(&summary.confirmed_miners.to_string(), Paint::Level(ThreatLevel::Critical)),
            self.paint(&summary.potential_miners.to_string(), Paint::Level(ThreatLevel::Medium)),
            self.paint(&summary.suspicious_hosts.to_string(), Paint::Level(ThreatLevel::Low)),
        ));

        for host in results.hosts_by_confidence() {
            self.format_host(&mut output, host);
        }

        output
    }

    fn format_host(&self, output: &mut String, host: &DetectedHost) {
        let level = format!("[{}]", host.threat_level.as_str().to_uppercase());
        output.push_str(&format!(
            "{} {} confidence {}%",
            self.paint(&level, Paint::Level(host.threat_level)),
            self.paint(&host.address.to_string(), Paint::Bold),
            host.confidence
        ));
        if let Some(hostname) = &host.hostname {
            output.push_str(&format!(" ({})", hostname));
        }
        output.push('\n');

        if let Some(mac) = &host.mac {
            output.push_str(&format!("    mac      {}\n", mac));
        }
        for (port, service) in &host.services {
            output.push_str(&format!("    {:<8} {}\n", format!("{}/tcp", port), service));
        }
        for fingerprint in host.fingerprints.iter().filter(|f| f.is_stratum) {
            let software = fingerprint.mining_software.as_deref().unwrap_or("unknown software");
            output.push_str(&format!(
                "    {:<8} stratum, {}\n",
                format!("{}/tcp", fingerprint.port),
                software
            ));
        }

        if self.config.verbose {
            for evidence in &host.evidence {
                output.push_str(&format!("    +{:<3} {}\n", evidence.weight(), evidence.detail()));
            }
        } else {
            for indicator in &host.indicators {
                output.push_str(&format!("    - {}\n", indicator));
            }
        }
        output.push('\n');
    }

    /// Format results as JSON
    fn format_json(&self, results: &ScanResult) -> io::Result<String> {
        serde_json::to_string_pretty(results).map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }

    fn status_label(&self, status: ScanStatus) -> String {
        let paint = match status {
            ScanStatus::Completed => Paint::Ok,
            ScanStatus::Failed => Paint::Level(ThreatLevel::Critical),
            _ => Paint::Level(ThreatLevel::Medium),
        };
        self.paint(status.as_str(), paint)
    }

    /// Apply color formatting if enabled
    fn paint(&self, text: &str, paint: Paint) -> String {
        if !self.config.colored {
            return text.to_string();
        }

        match paint {
            Paint::Bold => text.bold().to_string(),
            Paint::Dim => text.bright_black().to_string(),
            Paint::Ok => text.green().to_string(),
            Paint::Level(ThreatLevel::Critical) => text.red().bold().to_string(),
            Paint::Level(ThreatLevel::High) => text.red().to_string(),
            Paint::Level(ThreatLevel::Medium) => text.yellow().to_string(),
            Paint::Level(ThreatLevel::Low) => text.cyan().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Paint {
    Bold,
    Dim,
    Ok,
    Level(ThreatLevel),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::FingerprintResult;
    use crate::orchestrator::ScanSession;
    use crate::scoring::{HostObservation, ScoringEngine};

    fn result_with_miner() -> ScanResult {
        let mut obs = HostObservation::new("192.0.2.7".parse().unwrap());
        obs.open_ports = [(3333, true)].into_iter().collect();
        obs.fingerprints = vec![FingerprintResult::stratum(3333, Some("XMRig".to_string()), None)];
        let host = ScoringEngine::new().assess(obs).unwrap();

        let mut session = ScanSession::new("scan-1".to_string(), "192.0.2.0/29".to_string(), None);
        session.total_hosts = 6;
        for _ in 0..5 {
            session.record_host(None);
        }
        session.record_host(Some(host));
        session.transition(ScanStatus::Completed).unwrap();
        ScanResult::from_session(&session)
    }

    fn plain(format: OutputFormat) -> OutputManager {
        OutputManager::new(OutputConfig {
            format,
            colored: false,
            ..OutputConfig::default()
        })
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("JSON".parse::<OutputFormat>(), Ok(OutputFormat::Json));
        assert_eq!("txt".parse::<OutputFormat>(), Ok(OutputFormat::Text));
        assert!("xml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_text_lists_detected_host() {
        let text = plain(OutputFormat::Text).render(&result_with_miner()).unwrap();
        assert!(text.contains("status:   completed"));
        assert!(text.contains("6/6 scanned"));
        assert!(text.contains("[CRITICAL] 192.0.2.7 confidence 90%"));
        assert!(text.contains("3333/tcp stratum, XMRig"));
        assert!(text.contains("- Stratum protocol detected on port 3333"));
        assert!(!text.contains('\x1b'));
    }

    #[test]
    fn test_verbose_shows_weights() {
        let manager = OutputManager::new(OutputConfig {
            colored: false,
            verbose: true,
            ..OutputConfig::default()
        });
        let text = manager.render(&result_with_miner()).unwrap();
        assert!(text.contains("+40  Stratum protocol detected on port 3333"));
    }

    #[test]
    fn test_empty_result() {
        let session = ScanSession::new("scan-2".to_string(), "192.0.2.1".to_string(), None);
        let text = plain(OutputFormat::Text)
            .render(&ScanResult::from_session(&session))
            .unwrap();
        assert!(text.contains("No mining activity detected."));
    }

    #[test]
    fn test_json_shape() {
        let json = plain(OutputFormat::Json).render(&result_with_miner()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["status"], "completed");
        assert_eq!(value["summary"]["confirmed_miners"], 1);
        assert_eq!(value["hosts"]["192.0.2.7"]["threat_level"], "critical");
        assert_eq!(value["hosts"]["192.0.2.7"]["confidence"], 90);
    }

    #[test]
    fn test_write_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let manager = OutputManager::new(OutputConfig {
            format: OutputFormat::Json,
            file: Some(path.to_string_lossy().into_owned()),
            colored: false,
            verbose: false,
        });
        manager.write_results(&result_with_miner()).unwrap();
        let written = std::fs::read_to_string(path).unwrap();
        assert!(written.contains("\"scan_id\": \"scan-1\""));
    }
}
