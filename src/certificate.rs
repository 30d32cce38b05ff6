//! Certificate records and the fields read from X.509 certificates.

use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use openssl::asn1::{Asn1Time, Asn1TimeRef};
use openssl::x509::{X509NameRef, X509Ref, X509};
use serde::{Serialize, Serializer};
use tracing::debug;

use crate::error::{CertificateFileError, ProbeError};
use crate::status::ExpirationStatus;

/// Identity and expiration fields of one certificate.
#[derive(Debug, Clone, Serialize)]
pub struct CertificateRecord {
    /// Normalized `host:port` target, or the source path for certificates read from disk
    pub hostname: String,
    pub subject_name: String,
    pub issuer_name: String,
    /// Decimal form of the serial number
    pub serial_number: String,
    pub not_after: DateTime<Utc>,
    /// Whole days left at probe time, truncated toward zero; negative once expired
    pub days_until_expiration: i64,
    #[serde(serialize_with = "serialize_duration_secs")]
    pub probe_duration: Duration,
    /// Set by [`CertificateRecord::classify`]
    pub status: Option<ExpirationStatus>,
}

impl CertificateRecord {
    /// Classifies the record against `threshold_days` and stores the result.
    pub fn classify(&mut self, threshold_days: i64) -> ExpirationStatus {
        let status = ExpirationStatus::classify(self.days_until_expiration, threshold_days);
        self.status = Some(status);
        status
    }
}

fn serialize_duration_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

/// The instant a probe began, in both clocks.
///
/// Wall-clock time anchors the days-until-expiration computation, the
/// monotonic instant measures how long the probe took.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ProbeStart {
    pub at: DateTime<Utc>,
    pub instant: Instant,
}

impl ProbeStart {
    pub(crate) fn now() -> Self {
        ProbeStart {
            at: Utc::now(),
            instant: Instant::now(),
        }
    }
}

/// Builds a record from `cert`, timing it against `start`.
pub(crate) fn extract_record(
    hostname: &str,
    cert: &X509Ref,
    start: &ProbeStart,
) -> Result<CertificateRecord, ProbeError> {
    let malformed = |reason: String| ProbeError::Certificate {
        hostname: hostname.to_string(),
        reason,
    };

    let subject_name = last_entry_value(cert.subject_name())
        .map_err(|e| malformed(format!("subject name: {}", e)))?;
    let issuer_name = last_entry_value(cert.issuer_name())
        .map_err(|e| malformed(format!("issuer name: {}", e)))?;
    let serial_number = cert
        .serial_number()
        .to_bn()
        .and_then(|bn| bn.to_dec_str())
        .map_err(|e| malformed(format!("serial number: {}", e)))?
        .to_string();
    let not_after = asn1_to_utc(cert.not_after())
        .ok_or_else(|| malformed(format!("not after: {}", cert.not_after())))?;

    Ok(CertificateRecord {
        hostname: hostname.to_string(),
        subject_name,
        issuer_name,
        serial_number,
        not_after,
        days_until_expiration: days_between(start.at, not_after),
        probe_duration: start.instant.elapsed(),
        status: None,
    })
}

/// Value of the last entry of a distinguished name.
///
/// Typical issuers encode the Common Name last, which makes this the CN in
/// practice. Certificates with a different attribute order will report
/// whatever attribute comes last.
fn last_entry_value(name: &X509NameRef) -> Result<String, openssl::error::ErrorStack> {
    match name.entries().last() {
        Some(entry) => entry.data().to_string(),
        None => Ok(String::new()),
    }
}

fn asn1_to_utc(time: &Asn1TimeRef) -> Option<DateTime<Utc>> {
    let epoch = Asn1Time::from_unix(0).ok()?;
    let diff = epoch.diff(time).ok()?;
    let secs = i64::from(diff.days) * 86_400 + i64::from(diff.secs);
    DateTime::from_timestamp(secs, 0)
}

/// Whole hours between `from` and `to`, divided by 24, truncated toward zero.
pub(crate) fn days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_hours() / 24
}

/// Reads every PEM certificate in `path`.
///
/// All certificates are reported, authority certificates included, with the
/// file path standing in for the hostname.
pub fn read_certificate_file<P: AsRef<Path>>(
    path: P,
) -> Result<Vec<CertificateRecord>, CertificateFileError> {
    let path = path.as_ref();
    let start = ProbeStart::now();

    let pem = fs::read(path).map_err(|source| CertificateFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let certs = X509::stack_from_pem(&pem).map_err(|source| CertificateFileError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    if certs.is_empty() {
        return Err(CertificateFileError::Empty {
            path: path.to_path_buf(),
        });
    }
    debug!(path = %path.display(), count = certs.len(), "loaded certificates");

    let source_name = path.display().to_string();
    certs
        .iter()
        .map(|cert| {
            extract_record(&source_name, cert, &start).map_err(|source| {
                CertificateFileError::Certificate {
                    path: path.to_path_buf(),
                    source,
                }
            })
        })
        .collect()
}
