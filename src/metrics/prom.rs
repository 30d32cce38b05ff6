use prometheus::{labels, Gauge, Registry};
use tracing::{debug, warn};

use certscan::{CertificateRecord, ScanResult};

const JOB: &str = "certscan";

/// Pushes one metric group per certificate, plus the failure count, to a
/// Prometheus Push Gateway at `prometheus_address`.
///
/// Each group is gathered from its own registry so a push carries only the
/// gauges of that group. Push errors are logged and otherwise ignored.
pub fn prometheus_metrics(result: &ScanResult, prometheus_address: &str) {
    let url = prometheus_address.trim_end_matches('/');

    for record in result.certificates.iter() {
        let registry = match certificate_registry(record) {
            Ok(registry) => registry,
            Err(e) => {
                warn!(host = %record.hostname, error = %e, "failed to build certificate metrics");
                continue;
            }
        };
        let status = record.status.map(|s| s.to_string()).unwrap_or_default();

        let pushed = prometheus::push_metrics(
            JOB,
            labels! {
                "instance".to_owned() => JOB.to_owned(),
                "host".to_owned() => record.hostname.to_owned(),
                "subject".to_owned() => record.subject_name.to_owned(),
                "issuer".to_owned() => record.issuer_name.to_owned(),
                "status".to_owned() => status,
            },
            url,
            registry.gather(),
            None,
        );

        match pushed {
            Ok(_) => debug!(host = %record.hostname, "pushed certificate metrics"),
            Err(e) => warn!(host = %record.hostname, error = %e, "failed to push metrics to prometheus"),
        }
    }

    let registry = match failure_registry(result.failures.len()) {
        Ok(registry) => registry,
        Err(e) => {
            warn!(error = %e, "failed to build failure metrics");
            return;
        }
    };
    let pushed = prometheus::push_metrics(
        JOB,
        labels! {
            "instance".to_owned() => JOB.to_owned(),
        },
        url,
        registry.gather(),
        None,
    );
    match pushed {
        Ok(_) => debug!(failures = result.failures.len(), "pushed failure count"),
        Err(e) => warn!(error = %e, "failed to push failure count to prometheus"),
    }
}

fn certificate_registry(record: &CertificateRecord) -> prometheus::Result<Registry> {
    let registry = Registry::new();

    let days = Gauge::new(
        "certscan_days_until_expiration",
        "days before the certificate expires",
    )?;
    days.set(record.days_until_expiration as f64);
    registry.register(Box::new(days))?;

    let status = Gauge::new(
        "certscan_expiration_status",
        "0 ok, 1 expiring soon, 2 expired",
    )?;
    status.set(record.status.map(|s| f64::from(s.code())).unwrap_or(0.0));
    registry.register(Box::new(status))?;

    Ok(registry)
}

fn failure_registry(failures: usize) -> prometheus::Result<Registry> {
    let registry = Registry::new();
    let gauge = Gauge::new("certscan_probe_failures", "hosts that could not be probed")?;
    gauge.set(failures as f64);
    registry.register(Box::new(gauge))?;
    Ok(registry)
}
