//! Concurrent fan-out of probes over a list of hosts.

use std::any::Any;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::certificate::CertificateRecord;
use crate::error::{ProbeError, ProbeFailure};
use crate::probe::probe;

/// Outcome of one scan: every probe lands in exactly one of the two lists.
///
/// Neither list is ordered; entries appear in completion order.
#[derive(Debug, Default, Serialize)]
pub struct ScanResult {
    pub certificates: Vec<CertificateRecord>,
    pub failures: Vec<ProbeFailure>,
}

impl ScanResult {
    /// Number of probes that reported back.
    pub fn len(&self) -> usize {
        self.certificates.len() + self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Probes every non-blank entry of `hostnames` on its own thread and waits
/// for all of them.
///
/// Duplicates are probed once per occurrence. Blank entries are skipped.
/// `timeout` is the per-host connect timeout; there is no overall deadline.
pub fn scan<S>(hostnames: &[S], timeout: Duration) -> ScanResult
where
    S: AsRef<str>,
{
    fan_out(hostnames, |hostname| probe(hostname, timeout))
}

pub(crate) fn fan_out<S, F>(hostnames: &[S], probe_fn: F) -> ScanResult
where
    S: AsRef<str>,
    F: Fn(&str) -> Result<CertificateRecord, ProbeFailure> + Sync,
{
    let targets: Vec<&str> = hostnames
        .iter()
        .map(AsRef::as_ref)
        .filter(|hostname| !hostname.trim().is_empty())
        .collect();

    // One slot per probe in each channel, so no send can ever block.
    let (certificate_tx, certificate_rx) = mpsc::sync_channel(targets.len());
    let (failure_tx, failure_rx) = mpsc::sync_channel(targets.len());

    info!(hosts = targets.len(), "starting scan");
    let probe_fn = &probe_fn;
    thread::scope(|scope| {
        let mut workers = Vec::with_capacity(targets.len());
        for (index, &hostname) in targets.iter().enumerate() {
            let certificate_tx = certificate_tx.clone();
            let failure_tx_worker = failure_tx.clone();
            let spawned = thread::Builder::new()
                .name(format!("probe-{}", index))
                .spawn_scoped(scope, move || {
                    deliver(
                        probe_fn(hostname),
                        &certificate_tx,
                        &failure_tx_worker,
                    )
                });

            match spawned {
                Ok(handle) => workers.push((hostname, handle)),
                Err(e) => {
                    error!(%hostname, error = %e, "could not start probe thread");
                    send_failure(
                        &failure_tx,
                        ProbeFailure::new(
                            hostname.trim(),
                            ProbeError::Internal {
                                reason: format!("could not start probe thread: {}", e),
                            },
                        ),
                    );
                }
            }
        }

        for (hostname, handle) in workers {
            if let Err(payload) = handle.join() {
                let reason = panic_reason(payload.as_ref());
                error!(%hostname, %reason, "probe thread panicked");
                send_failure(
                    &failure_tx,
                    ProbeFailure::new(hostname.trim(), ProbeError::Internal { reason }),
                );
            }
        }
    });

    drop(certificate_tx);
    drop(failure_tx);
    let result = collect(certificate_rx, failure_rx);
    info!(
        certificates = result.certificates.len(),
        failures = result.failures.len(),
        "scan finished"
    );
    result
}

fn deliver(
    outcome: Result<CertificateRecord, ProbeFailure>,
    certificate_tx: &SyncSender<CertificateRecord>,
    failure_tx: &SyncSender<ProbeFailure>,
) {
    match outcome {
        Ok(record) => {
            debug!(
                hostname = %record.hostname,
                days = record.days_until_expiration,
                elapsed = ?record.probe_duration,
                "probe succeeded"
            );
            if certificate_tx.send(record).is_err() {
                error!("certificate channel closed before the scan finished");
            }
        }
        Err(failure) => {
            warn!(hostname = %failure.hostname, error = %failure.error, "probe failed");
            send_failure(failure_tx, failure);
        }
    }
}

fn send_failure(failure_tx: &SyncSender<ProbeFailure>, failure: ProbeFailure) {
    if failure_tx.send(failure).is_err() {
        error!("failure channel closed before the scan finished");
    }
}

fn collect(
    certificate_rx: Receiver<CertificateRecord>,
    failure_rx: Receiver<ProbeFailure>,
) -> ScanResult {
    ScanResult {
        certificates: certificate_rx.try_iter().collect(),
        failures: failure_rx.try_iter().collect(),
    }
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "probe thread panicked".to_string()
    }
}
