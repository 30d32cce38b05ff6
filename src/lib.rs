//! Certificate expiration scanning.
//!
//! `certscan` connects to TLS endpoints without verifying trust, pulls the
//! end-entity certificate each one presents, and classifies it as ok,
//! expiring soon or expired against a day threshold.
//!
//! ```no_run
//! use std::time::Duration;
//! use certscan::{scan, ExpirationStatus};
//!
//! let hosts = ["example.com", "example.org:8443"];
//! let mut result = scan(&hosts, Duration::from_secs(10));
//! for record in &mut result.certificates {
//!     if record.classify(60) != ExpirationStatus::Ok {
//!         println!("{} expires {}", record.hostname, record.not_after);
//!     }
//! }
//! for failure in &result.failures {
//!     eprintln!("{}", failure);
//! }
//! ```

pub mod config;
mod certificate;
mod error;
mod probe;
mod scan;
mod status;

#[cfg(test)]
mod test_support;

pub use certificate::{read_certificate_file, CertificateRecord};
pub use config::read_host_list;
pub use error::{CertificateFileError, ProbeError, ProbeFailure};
pub use probe::{normalize_target, probe, DEFAULT_PORT};
pub use scan::{scan, ScanResult};
pub use status::ExpirationStatus;
