use clap::{Arg, ArgAction, Command};
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, warn};
use minehound::{
    config::ScanConfig,
    output::{OutputConfig, OutputFormat, OutputManager},
    utils::Logger,
    ScanOrchestrator, ScanRequest, ScanStatus,
};

// Ulimit adjustment for Unix systems
#[cfg(unix)]
fn adjust_ulimit_size(ulimit: Option<u64>) -> u64 {
    use rlimit::Resource;

    if let Some(limit) = ulimit {
        if Resource::NOFILE.set(limit, limit).is_ok() {
            eprintln!(
                "{} {}",
                "[~] Automatically increasing ulimit value to".bright_blue(),
                limit.to_string().bright_cyan().bold()
            );
        } else {
            eprintln!("{}", "[!] ERROR: Failed to set ulimit value.".bright_red());
        }
    }

    match Resource::NOFILE.get() {
        Ok((soft, _)) => soft,
        Err(_) => {
            eprintln!("{}", "[!] WARNING: Could not get file descriptor limit".bright_yellow());
            65535
        }
    }
}

#[cfg(not(unix))]
fn adjust_ulimit_size(_ulimit: Option<u64>) -> u64 {
    65535
}

fn build_cli() -> Command {
    Command::new("minehound")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Finds hosts running cryptocurrency-mining hardware or software")
        .arg(
            Arg::new("target")
                .value_name("TARGET")
                .help("Target to scan (IP address or CIDR range)")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("ports")
                .short('p')
                .long("ports")
                .value_name("PORTS")
                .help("Ports to check instead of the mining port table (e.g. 3333,4028-4030)"),
        )
        .arg(
            Arg::new("scan-type")
                .long("scan-type")
                .value_name("TYPE")
                .help("Free-form tag stored with the scan"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("TOML configuration file (default: ~/.minehound.toml)"),
        )
        .arg(
            Arg::new("hosts")
                .long("hosts")
                .value_name("N")
                .help("Hosts processed concurrently")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("port-workers")
                .long("port-workers")
                .value_name("N")
                .help("Ports probed concurrently per host")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("max-sockets")
                .long("max-sockets")
                .value_name("N")
                .help("Upper bound on sockets open at once")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("ping-timeout")
                .long("ping-timeout")
                .value_name("MS")
                .help("Reachability probe timeout in milliseconds")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("connect-timeout")
                .short('t')
                .long("connect-timeout")
                .value_name("MS")
                .help("Port connect timeout in milliseconds")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("fingerprint-timeout")
                .long("fingerprint-timeout")
                .value_name("MS")
                .help("Stratum handshake timeout in milliseconds")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("max-hosts")
                .long("max-hosts")
                .value_name("N")
                .help("Refuse ranges with more candidate hosts than this")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("no-tcp-fallback")
                .long("no-tcp-fallback")
                .help("Only treat hosts answering ICMP echo as reachable")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no-traffic")
                .long("no-traffic")
                .help("Skip local connection table analysis")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("format")
                .short('f')
                .long("format")
                .value_name("FORMAT")
                .help("Output format: text or json")
                .default_value("text"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("Write the report to a file"),
        )
        .arg(
            Arg::new("ulimit")
                .short('u')
                .long("ulimit")
                .value_name("LIMIT")
                .help("Automatically increase ulimit to this value")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("no-color")
                .long("no-color")
                .help("Disable colored output")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Increase log verbosity; -vv for debug")
                .action(ArgAction::Count),
        )
}

/// Comma separated ports and inclusive ranges
fn parse_ports(port_spec: &str) -> anyhow::Result<Vec<u16>> {
    let mut ports = Vec::new();

    for part in port_spec.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        if let Some((start, end)) = part.split_once('-') {
            let start: u16 = start
                .trim()
                .parse()
                .with_context(|| format!("Invalid start port '{}'", start))?;
            let end: u16 = end
                .trim()
                .parse()
                .with_context(|| format!("Invalid end port '{}'", end))?;

            if start == 0 || end == 0 {
                anyhow::bail!("Port 0 is not valid");
            }
            if start > end {
                anyhow::bail!("Start port {} cannot be greater than end port {}", start, end);
            }
            ports.extend(start..=end);
        } else {
            let port: u16 = part
                .parse()
                .with_context(|| format!("Invalid port '{}'", part))?;
            if port == 0 {
                anyhow::bail!("Port 0 is not valid");
            }
            ports.push(port);
        }
    }

    if ports.is_empty() {
        anyhow::bail!("No ports in '{}'", port_spec);
    }

    ports.sort_unstable();
    ports.dedup();
    Ok(ports)
}

fn load_config(matches: &clap::ArgMatches) -> anyhow::Result<ScanConfig> {
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => ScanConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path))?,
        None => ScanConfig::load_default_config(),
    };

    if let Some(n) = matches.get_one::<usize>("hosts") {
        config = config.with_host_concurrency(*n);
    }
    if let Some(n) = matches.get_one::<usize>("port-workers") {
        config = config.with_port_concurrency(*n);
    }
    if let Some(n) = matches.get_one::<usize>("max-sockets") {
        config = config.with_max_sockets(*n);
    }
    if let Some(ms) = matches.get_one::<u64>("ping-timeout") {
        config = config.with_ping_timeout(*ms);
    }
    if let Some(ms) = matches.get_one::<u64>("connect-timeout") {
        config = config.with_connect_timeout(*ms);
    }
    if let Some(ms) = matches.get_one::<u64>("fingerprint-timeout") {
        config = config.with_fingerprint_timeout(*ms);
    }
    if let Some(n) = matches.get_one::<usize>("max-hosts") {
        config = config.with_max_hosts(*n);
    }
    if matches.get_flag("no-tcp-fallback") {
        config = config.with_tcp_fallback(false);
    }
    if matches.get_flag("no-traffic") {
        config = config.with_traffic_analysis(false);
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn progress_bar(enabled: bool) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} hosts ({eta})")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

async fn run(matches: clap::ArgMatches) -> anyhow::Result<ScanStatus> {
    let verbosity = matches.get_count("verbose");
    Logger::init(Logger::level_from_verbosity(verbosity));

    let colored = !matches.get_flag("no-color");
    if !colored {
        colored::control::set_override(false);
    }

    let fd_limit = adjust_ulimit_size(matches.get_one::<u64>("ulimit").copied());
    debug!("File descriptor limit: {}", fd_limit);

    let mut config = load_config(&matches)?;
    let socket_budget = (fd_limit as usize).saturating_sub(64).max(1);
    if config.max_in_flight_sockets > socket_budget {
        warn!(
            "Lowering socket limit from {} to {} to stay under the file descriptor limit",
            config.max_in_flight_sockets, socket_budget
        );
        config = config.with_max_sockets(socket_budget);
    }

    let format: OutputFormat = matches
        .get_one::<String>("format")
        .map(|s| s.parse())
        .transpose()
        .map_err(|e: String| anyhow::anyhow!(e))?
        .unwrap_or(OutputFormat::Text);

    let target = matches
        .get_one::<String>("target")
        .context("No target given")?
        .clone();
    let mut request = ScanRequest::new(target);
    if let Some(spec) = matches.get_one::<String>("ports") {
        request = request.with_ports(parse_ports(spec)?);
    }
    if let Some(scan_type) = matches.get_one::<String>("scan-type") {
        request = request.with_scan_type(scan_type.clone());
    }

    // keep stdout clean for JSON
    let pb = Arc::new(progress_bar(format == OutputFormat::Text && colored));
    let observer_pb = pb.clone();
    request = request.with_observer(move |_progress: u8, scanned: usize, total: usize| {
        observer_pb.set_length(total as u64);
        observer_pb.set_position(scanned as u64);
    });

    let orchestrator = ScanOrchestrator::new(config).context("Failed to set up scanner")?;
    let handle = orchestrator.start(request).await?;
    let scan_id = handle.scan_id().to_string();

    let interrupt = {
        let orchestrator = orchestrator.clone();
        let scan_id = scan_id.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("{}", "\n[!] Interrupted, stopping scan...".bright_yellow());
                if let Err(e) = orchestrator.cancel(&scan_id).await {
                    warn!("Could not cancel scan {}: {}", scan_id, e);
                }
            }
        })
    };

    let result = handle.wait().await;
    interrupt.abort();
    pb.finish_and_clear();
    let result = result?;

    let output = OutputManager::new(OutputConfig {
        format,
        file: matches.get_one::<String>("output").cloned(),
        colored,
        verbose: verbosity > 0,
    });
    output
        .write_results(&result)
        .context("Failed to write results")?;

    Ok(result.status)
}

#[tokio::main]
async fn main() {
    let matches = build_cli().get_matches();

    match run(matches).await {
        Ok(ScanStatus::Completed) => {}
        Ok(ScanStatus::Failed) => {
            eprintln!("{}", "[!] Scan failed".bright_red());
            process::exit(1);
        }
        Ok(status) => {
            // interrupted; the report covers the hosts finished so far
            eprintln!("{} {}", "[!] Scan ended".bright_yellow(), status);
            process::exit(130);
        }
        Err(e) => {
            eprintln!("{} {:#}", "[!] ERROR:".bright_red(), e);
            process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ports() {
        assert_eq!(parse_ports("4028-4030, 3333,3333").unwrap(), vec![3333, 4028, 4029, 4030]);
        assert!(parse_ports("0").is_err());
        assert!(parse_ports("10-5").is_err());
        assert!(parse_ports("abc").is_err());
        assert!(parse_ports(" , ").is_err());
    }

    #[test]
    fn test_cli_overrides() {
        let matches = build_cli().get_matches_from([
            "minehound",
            "10.0.0.0/24",
            "--hosts",
            "8",
            "--no-tcp-fallback",
            "--connect-timeout",
            "750",
            "--config",
            "/nonexistent/minehound.toml",
        ]);
        assert!(load_config(&matches).is_err());

        let matches = build_cli().get_matches_from([
            "minehound",
            "10.0.0.0/24",
            "--hosts",
            "8",
            "--no-tcp-fallback",
            "--connect-timeout",
            "750",
        ]);
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("HOME", dir.path());
        let config = load_config(&matches).unwrap();
        assert_eq!(config.max_concurrent_hosts, 8);
        assert!(!config.tcp_fallback);
        assert_eq!(config.connect_timeout_ms, 750);
    }

    #[test]
    fn test_cli_verbosity() {
        let matches = build_cli().get_matches_from(["minehound", "10.0.0.1", "-vv"]);
        assert_eq!(matches.get_count("verbose"), 2);
    }
}
