//! Rendering scan results for the terminal.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::path::Path;
use std::time::Duration;

use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, ContentArrangement, Table};
use strum_macros::{Display, EnumString};
use tracing::error;

use certscan::{CertificateRecord, ExpirationStatus, ProbeFailure, ScanResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum OutputFormat {
    Text,
    Json,
    Summary,
}

pub fn print_options(threshold_days: i64, timeout_secs: u64) {
    println!("Configured Options...");
    println!(
        "SSL expiration notification threshold set at: {} days",
        threshold_days
    );
    println!("Connection timeout set to: {} seconds\n", timeout_secs);
}

pub fn print_scan(result: &ScanResult, format: OutputFormat, elapsed: Duration) {
    match format {
        OutputFormat::Text => print!("{}", render_text(result, elapsed)),
        OutputFormat::Summary => print!("{}", render_summary(result)),
        OutputFormat::Json => match serde_json::to_string_pretty(result) {
            Ok(json) => println!("{}", json),
            Err(e) => error!(error = %e, "failed to serialize scan result"),
        },
    }
}

pub fn print_certificate_file(path: &Path, records: &[CertificateRecord], format: OutputFormat) {
    match format {
        OutputFormat::Json => match serde_json::to_string_pretty(records) {
            Ok(json) => println!("{}", json),
            Err(e) => error!(error = %e, "failed to serialize certificates"),
        },
        OutputFormat::Summary => println!("{}", certificate_table(records)),
        OutputFormat::Text => {
            println!(
                "Found {} certificate(s) inside file: {}:\n",
                records.len(),
                path.display()
            );
            for record in records {
                println!("{}", describe(record));
            }
        }
    }
}

fn expiration_date(record: &CertificateRecord) -> String {
    record
        .not_after
        .format("%a %b %e %H:%M:%S UTC %Y")
        .to_string()
}

fn describe(record: &CertificateRecord) -> String {
    format!(
        "Subject Name: {}\nIssuer: {}\nExpiration date: {}\nRequest Time: {:?}\n",
        record.subject_name,
        record.issuer_name,
        expiration_date(record),
        record.probe_duration,
    )
}

/// Distinct subject names with their instance counts, and the hosts serving them.
#[derive(Default)]
struct StatusGroup {
    subjects: BTreeMap<String, usize>,
    hosts: BTreeSet<String>,
}

impl StatusGroup {
    fn add(&mut self, record: &CertificateRecord) {
        *self.subjects.entry(record.subject_name.clone()).or_insert(0) += 1;
        self.hosts.insert(record.hostname.clone());
    }

    fn render(&self, out: &mut String) {
        for (subject, count) in &self.subjects {
            let _ = writeln!(out, "Subject name: {} -- Instances found: {}", subject, count);
        }
        for host in &self.hosts {
            let _ = writeln!(out, "> {}", host);
        }
        out.push('\n');
    }
}

pub fn render_text(result: &ScanResult, elapsed: Duration) -> String {
    let mut out = String::new();
    let mut groups: BTreeMap<ExpirationStatus, StatusGroup> = BTreeMap::new();

    for record in &result.certificates {
        let status = record.status.unwrap_or(ExpirationStatus::Ok);
        let _ = match status {
            ExpirationStatus::Expired => writeln!(
                out,
                "* Certificate status: expired\n{}",
                describe(record)
            ),
            ExpirationStatus::ExpiringSoon => writeln!(
                out,
                "* {}: certificate expiring in {} days\n{}",
                record.hostname,
                record.days_until_expiration,
                describe(record)
            ),
            ExpirationStatus::Ok => writeln!(
                out,
                "* {}: Certificate status: OK!\n{}",
                record.hostname,
                describe(record)
            ),
        };
        groups.entry(status).or_default().add(record);
    }

    out.push_str("------------------\n");
    out.push_str("Certificate summary\n\n");

    if !result.failures.is_empty() {
        let _ = writeln!(out, "There were {} error(s):", result.failures.len());
        out.push_str(&render_failures(&result.failures));
        out.push('\n');
    }

    if let Some(group) = groups.get(&ExpirationStatus::Expired) {
        let _ = writeln!(
            out,
            "There are {} certificates already expired:",
            group.subjects.len()
        );
        group.render(&mut out);
    }
    if let Some(group) = groups.get(&ExpirationStatus::ExpiringSoon) {
        let _ = writeln!(
            out,
            "There are {} certificates expiring soon:",
            group.subjects.len()
        );
        group.render(&mut out);
    }
    if let Some(group) = groups.get(&ExpirationStatus::Ok) {
        let _ = writeln!(out, "There are {} OK certificates", group.subjects.len());
        group.render(&mut out);
    }

    let _ = writeln!(
        out,
        "Time taken to complete all certificate scans: {:?}",
        elapsed
    );
    out
}

fn render_failures(failures: &[ProbeFailure]) -> String {
    let mut out = String::new();
    for failure in failures {
        let _ = writeln!(out, "{}", failure);
    }
    out
}

fn status_cell(status: Option<ExpirationStatus>) -> Cell {
    match status {
        Some(ExpirationStatus::Ok) => Cell::new("ok").fg(Color::Green),
        Some(ExpirationStatus::ExpiringSoon) => Cell::new("expiring soon").fg(Color::Yellow),
        Some(ExpirationStatus::Expired) => Cell::new("expired").fg(Color::Red),
        None => Cell::new("-"),
    }
}

fn certificate_table<'a>(records: impl IntoIterator<Item = &'a CertificateRecord>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            "Host", "Subject", "Issuer", "Expires", "Days Left", "Status",
        ]);

    for record in records {
        table.add_row(vec![
            Cell::new(&record.hostname),
            Cell::new(&record.subject_name),
            Cell::new(&record.issuer_name),
            Cell::new(expiration_date(record)),
            Cell::new(record.days_until_expiration),
            status_cell(record.status),
        ]);
    }
    table
}

pub fn render_summary(result: &ScanResult) -> String {
    let mut certificates: Vec<&CertificateRecord> = result.certificates.iter().collect();
    certificates.sort_by_key(|c| c.days_until_expiration);

    let mut out = format!("{}\n", certificate_table(certificates));
    if !result.failures.is_empty() {
        let _ = writeln!(out, "\nThere were {} error(s):", result.failures.len());
        out.push_str(&render_failures(&result.failures));
    }
    out
}
