//! Error types for certificate probing.
//!
//! Every failure that can happen while probing a single host is captured in
//! [`ProbeError`] and handed back to the caller as data wrapped in a
//! [`ProbeFailure`]. Nothing in here is fatal to a scan.

use std::io;
use std::path::PathBuf;

use serde::{Serialize, Serializer};
use thiserror::Error;

/// Why probing one host failed.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The hostname was empty or could not be turned into a `host:port` target.
    /// No network I/O was attempted.
    #[error("invalid hostname: {reason}")]
    Configuration {
        /// Why the hostname was rejected
        reason: String,
    },

    /// DNS resolution or the TCP connect failed (refused, unreachable, timed out).
    #[error("connection to {address} failed: {source}")]
    Connection {
        /// The `host:port` target that could not be reached
        address: String,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// TCP connected but the TLS handshake did not complete.
    #[error("TLS handshake failed to hostname {hostname}: {details}")]
    Handshake {
        /// The `host:port` target
        hostname: String,
        /// What OpenSSL reported
        details: String,
    },

    /// The handshake succeeded but the peer presented no end-entity certificate.
    #[error("no leaf certificate presented by {hostname}")]
    EmptyCertificateChain {
        /// The `host:port` target
        hostname: String,
    },

    /// The leaf certificate was presented but its fields could not be decoded.
    #[error("malformed certificate from {hostname}: {reason}")]
    Certificate {
        /// The `host:port` target
        hostname: String,
        /// Which field could not be read
        reason: String,
    },

    /// The probe worker died before reporting an outcome.
    #[error("probe aborted: {reason}")]
    Internal {
        /// Panic payload, when it was a string
        reason: String,
    },
}

impl ProbeError {
    /// Short machine-friendly name of the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration",
            Self::Connection { .. } => "connection",
            Self::Handshake { .. } => "handshake",
            Self::EmptyCertificateChain { .. } => "empty_certificate_chain",
            Self::Certificate { .. } => "certificate",
            Self::Internal { .. } => "internal",
        }
    }
}

impl Serialize for ProbeError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("ProbeError", 2)?;
        state.serialize_field("kind", self.kind())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// A failed probe: the target it was aimed at and why it failed.
#[derive(Debug, Error, Serialize)]
#[error("> {hostname}: {error}")]
pub struct ProbeFailure {
    pub hostname: String,
    pub error: ProbeError,
}

impl ProbeFailure {
    pub fn new(hostname: impl Into<String>, error: ProbeError) -> Self {
        ProbeFailure {
            hostname: hostname.into(),
            error,
        }
    }
}

/// Errors raised while loading certificates from a local PEM file.
#[derive(Debug, Error)]
pub enum CertificateFileError {
    #[error("failed to read certificate file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse certificates in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: openssl::error::ErrorStack,
    },

    #[error("no certificates found in {}", path.display())]
    Empty { path: PathBuf },

    #[error("malformed certificate in {}: {source}", path.display())]
    Certificate {
        path: PathBuf,
        #[source]
        source: ProbeError,
    },
}
