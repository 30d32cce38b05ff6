use std::path::PathBuf;
use std::process::exit;
use std::str::FromStr;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use certscan::config::Config;
use certscan::{probe, read_certificate_file, read_host_list, scan, ExpirationStatus, ScanResult};

mod metrics;
mod report;

use report::OutputFormat;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Host to scan, as host or host:port (repeatable)
    #[arg(short = 'H', long = "hostname")]
    hostnames: Vec<String>,

    /// File with one host per line to scan
    #[arg(short, long = "listfile")]
    list_file: Option<PathBuf>,

    /// PEM certificate file to read instead of scanning
    #[arg(short, long = "certfile")]
    cert_file: Option<PathBuf>,

    /// Threshold in days for the certificate 'Not After' date to alert on
    #[arg(short, long)]
    days: Option<i64>,

    /// Seconds to wait for the TCP connection to each host
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Output format: text, json, summary
    #[arg(short, long)]
    output: Option<String>,

    /// Exit code to use when an expired certificate is found
    #[arg(long)]
    exit_code: Option<i32>,

    /// Push metrics to a Prometheus Push Gateway
    #[arg(long)]
    prometheus: bool,

    /// Prometheus Push Gateway address
    #[arg(long)]
    prometheus_address: Option<String>,

    /// Configuration file (defaults to ./certscan.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print an example configuration file and exit
    #[arg(long)]
    generate_config: bool,

    /// Log probe progress to stderr
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn fail(message: impl std::fmt::Display) -> ! {
    error!("{}", message);
    exit(2);
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if cli.generate_config {
        println!("{}", Config::example_toml());
        exit(0);
    }

    let file_config = Config::discover(cli.config.as_deref()).unwrap_or_else(|e| fail(e));
    let mut config = Config::default();
    if let Some(file_config) = file_config {
        config = config.merge_with(file_config);
    }
    let config = config.merge_with(Config::from_cli_args(
        if cli.hostnames.is_empty() {
            None
        } else {
            Some(cli.hostnames.clone())
        },
        cli.list_file.clone(),
        cli.days,
        cli.timeout,
        cli.output.clone(),
        cli.exit_code,
        cli.prometheus.then_some(true),
        cli.prometheus_address.clone(),
    ));
    if let Err(e) = config.validate() {
        fail(e);
    }

    let output_name = config.output.as_deref().unwrap_or("text");
    let format = OutputFormat::from_str(output_name)
        .unwrap_or_else(|_| fail(format!("Unknown output format: {}", output_name)));
    let threshold = config.threshold_days();
    let timeout = Duration::from_secs(config.timeout_secs());

    if let Some(ref cert_file) = cli.cert_file {
        let records = read_certificate_file(cert_file).unwrap_or_else(|e| fail(e));
        report::print_certificate_file(cert_file, &records, format);
        exit(0);
    }

    let mut hosts = config.hosts.clone().unwrap_or_default();
    if let Some(ref list_file) = config.list_file {
        hosts.extend(read_host_list(list_file).unwrap_or_else(|e| fail(e)));
    }
    if hosts.iter().all(|h| h.trim().is_empty()) {
        fail("No hosts to scan: use --hostname, --listfile, --certfile or a config file");
    }

    if format == OutputFormat::Text {
        report::print_options(threshold, config.timeout_secs());
    }

    let started = Instant::now();
    let mut result = if hosts.len() == 1 {
        match probe(&hosts[0], timeout) {
            Ok(record) => ScanResult {
                certificates: vec![record],
                failures: Vec::new(),
            },
            Err(failure) => ScanResult {
                certificates: Vec::new(),
                failures: vec![failure],
            },
        }
    } else {
        scan(&hosts, timeout)
    };

    for record in result.certificates.iter_mut() {
        record.classify(threshold);
    }
    info!(
        certificates = result.certificates.len(),
        failures = result.failures.len(),
        elapsed = ?started.elapsed(),
        "scan complete"
    );

    report::print_scan(&result, format, started.elapsed());

    if let Some(address) = config.prometheus_address() {
        metrics::prom::prometheus_metrics(&result, address);
    }

    let any_expired = result
        .certificates
        .iter()
        .any(|c| c.status == Some(ExpirationStatus::Expired));
    if any_expired {
        exit(config.exit_code.unwrap_or(0));
    }
}
