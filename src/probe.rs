//! Fetching the leaf certificate of a single TLS endpoint.

use std::io;
use std::net::{IpAddr, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use openssl::ssl::{Ssl, SslContext, SslMethod, SslStream, SslVerifyMode};
use openssl::x509::{X509Ref, X509};
use tracing::debug;
use url::Url;

use crate::certificate::{extract_record, CertificateRecord, ProbeStart};
use crate::error::{ProbeError, ProbeFailure};

/// Port assumed when a hostname carries none.
pub const DEFAULT_PORT: u16 = 443;

/// Turns user input into a `host:port` target.
///
/// Plain hostnames without a `:` get the default port appended. URL-form
/// input (`https://host:8443/path`) is reduced to its host and port.
pub fn normalize_target(hostname: &str) -> Result<String, ProbeError> {
    let hostname = hostname.trim();
    if hostname.is_empty() {
        return Err(ProbeError::Configuration {
            reason: "hostname empty".to_string(),
        });
    }

    if hostname.contains("://") {
        let url = Url::parse(hostname).map_err(|e| ProbeError::Configuration {
            reason: format!("{}: {}", hostname, e),
        })?;
        let host = url.host_str().ok_or_else(|| ProbeError::Configuration {
            reason: format!("{}: URL has no host", hostname),
        })?;
        let port = url.port_or_known_default().unwrap_or(DEFAULT_PORT);
        return Ok(format!("{}:{}", host, port));
    }

    if hostname.contains(':') {
        Ok(hostname.to_string())
    } else {
        Ok(format!("{}:{}", hostname, DEFAULT_PORT))
    }
}

/// Connects to `hostname`, completes a TLS handshake without verifying the
/// peer, and returns the fields of the first non-authority certificate.
///
/// `timeout` bounds name resolution and the TCP connect together; the
/// handshake itself is not timed. The connection is closed before
/// this returns, whatever the outcome.
pub fn probe(hostname: &str, timeout: Duration) -> Result<CertificateRecord, ProbeFailure> {
    let start = ProbeStart::now();
    let target = normalize_target(hostname).map_err(|e| ProbeFailure::new(hostname.trim(), e))?;
    probe_target(&target, timeout, &start).map_err(|e| ProbeFailure::new(target, e))
}

fn probe_target(
    target: &str,
    timeout: Duration,
    start: &ProbeStart,
) -> Result<CertificateRecord, ProbeError> {
    let tcp_stream = connect(target, timeout)?;
    let stream = handshake(target, tcp_stream)?;

    let chain = peer_chain(&stream);
    let leaf = select_leaf(target, &chain)?.ok_or_else(|| ProbeError::EmptyCertificateChain {
        hostname: target.to_string(),
    })?;
    extract_record(target, leaf, start)
}

/// Resolves and dials `target`, all within `timeout`.
///
/// Each address gets only the time left before the deadline, so a host with
/// many unreachable addresses still fails after `timeout`.
fn connect(target: &str, timeout: Duration) -> Result<TcpStream, ProbeError> {
    let connection_error = |source: io::Error| ProbeError::Connection {
        address: target.to_string(),
        source,
    };

    let deadline = Instant::now() + timeout;
    let addresses = resolve(target, timeout).map_err(connection_error)?;
    dial_until(target, addresses, deadline, |address, remaining| {
        TcpStream::connect_timeout(address, remaining)
    })
    .map_err(connection_error)
}

/// Resolves `target`, giving up after `timeout`.
///
/// The lookup runs on a helper thread since the system resolver has no
/// timeout of its own. A lookup that outlives `timeout` finishes in the
/// background and its answer is dropped.
fn resolve(target: &str, timeout: Duration) -> io::Result<Vec<SocketAddr>> {
    if let Ok(address) = target.parse::<SocketAddr>() {
        return Ok(vec![address]);
    }

    let (tx, rx) = mpsc::channel();
    let lookup = target.to_string();
    thread::Builder::new()
        .name("resolve".to_string())
        .spawn(move || {
            let _ = tx.send(lookup.to_socket_addrs().map(Iterator::collect));
        })?;

    match rx.recv_timeout(timeout) {
        Ok(resolved) => resolved,
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            "hostname resolution timed out",
        )),
    }
}

/// Tries each address in turn with `dial`, until one connects or `deadline` passes.
fn dial_until<T, D>(
    target: &str,
    addresses: impl IntoIterator<Item = SocketAddr>,
    deadline: Instant,
    mut dial: D,
) -> io::Result<T>
where
    D: FnMut(&SocketAddr, Duration) -> io::Result<T>,
{
    let mut last_error = None;
    for address in addresses {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            last_error = Some(io::Error::new(
                io::ErrorKind::TimedOut,
                "connect timed out",
            ));
            break;
        }

        debug!(%target, %address, ?remaining, "connecting");
        match dial(&address, remaining) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!(%target, %address, error = %e, "connect failed");
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, "hostname resolved to no addresses")
    }))
}

fn handshake(target: &str, tcp_stream: TcpStream) -> Result<SslStream<TcpStream>, ProbeError> {
    let handshake_error = |details: String| ProbeError::Handshake {
        hostname: target.to_string(),
        details,
    };

    let mut context =
        SslContext::builder(SslMethod::tls()).map_err(|e| handshake_error(e.to_string()))?;
    // Trust is not checked so self-signed and private-CA endpoints can be scanned.
    context.set_verify(SslVerifyMode::NONE);
    let context = context.build();

    let mut ssl = Ssl::new(&context).map_err(|e| handshake_error(e.to_string()))?;
    if let Some(server_name) = sni_name(target) {
        ssl.set_hostname(server_name)
            .map_err(|e| handshake_error(e.to_string()))?;
    }

    ssl.connect(tcp_stream)
        .map_err(|e| handshake_error(e.to_string()))
}

/// Host part of `target` when it is a DNS name; IP literals get no SNI.
fn sni_name(target: &str) -> Option<&str> {
    let host = match target.rsplit_once(':') {
        Some((host, _)) => host,
        None => target,
    };
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() || host.parse::<IpAddr>().is_ok() {
        None
    } else {
        Some(host)
    }
}

/// Certificates presented by the peer, leaf first.
fn peer_chain(stream: &SslStream<TcpStream>) -> Vec<X509> {
    match stream.ssl().peer_cert_chain() {
        Some(chain) => chain.iter().map(X509Ref::to_owned).collect(),
        None => stream.ssl().peer_certificate().into_iter().collect(),
    }
}

/// First certificate in `chain` whose basic constraints do not mark it as a CA.
pub(crate) fn select_leaf<'a>(
    target: &str,
    chain: &'a [X509],
) -> Result<Option<&'a X509>, ProbeError> {
    for cert in chain {
        if !is_authority(target, cert)? {
            return Ok(Some(cert));
        }
    }
    Ok(None)
}

fn is_authority(target: &str, cert: &X509Ref) -> Result<bool, ProbeError> {
    let malformed = |reason: String| ProbeError::Certificate {
        hostname: target.to_string(),
        reason,
    };

    let der = cert.to_der().map_err(|e| malformed(e.to_string()))?;
    let (_, parsed) =
        x509_parser::parse_x509_certificate(&der).map_err(|e| malformed(e.to_string()))?;
    Ok(parsed.is_ca())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{build_cert, CertSpec};
    use std::net::TcpListener;

    #[test]
    fn test_normalize_appends_default_port() {
        assert_eq!(normalize_target("example.com").unwrap(), "example.com:443");
        assert_eq!(normalize_target(" example.com \n").unwrap(), "example.com:443");
        assert_eq!(normalize_target("10.0.0.1").unwrap(), "10.0.0.1:443");
    }

    #[test]
    fn test_normalize_keeps_explicit_port() {
        assert_eq!(
            normalize_target("example.com:8443").unwrap(),
            "example.com:8443"
        );
    }

    #[test]
    fn test_normalize_url_forms() {
        assert_eq!(
            normalize_target("https://secure.example.com:9443/health").unwrap(),
            "secure.example.com:9443"
        );
        assert_eq!(
            normalize_target("https://example.com").unwrap(),
            "example.com:443"
        );
        assert_eq!(
            normalize_target("ldaps://directory.example.com").unwrap(),
            "directory.example.com:443"
        );
    }

    #[test]
    fn test_normalize_rejects_empty() {
        for input in ["", "   ", "\n"] {
            match normalize_target(input) {
                Err(ProbeError::Configuration { .. }) => {}
                other => panic!("expected configuration error, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_probe_empty_hostname_makes_no_connection() {
        let failure = probe("", Duration::from_secs(1)).unwrap_err();
        assert_eq!(failure.hostname, "");
        assert!(matches!(failure.error, ProbeError::Configuration { .. }));
    }

    #[test]
    fn test_probe_refused_is_connection_error() {
        // Bind then drop to get a port nothing listens on.
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let failure = probe(&format!("127.0.0.1:{}", port), Duration::from_secs(2)).unwrap_err();
        assert_eq!(failure.hostname, format!("127.0.0.1:{}", port));
        assert!(matches!(failure.error, ProbeError::Connection { .. }));
    }

    fn unused_address() -> SocketAddr {
        TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap()
    }

    #[test]
    fn test_dial_splits_timeout_across_addresses() {
        let timeout = Duration::from_millis(300);
        let addresses = vec![unused_address(), unused_address(), unused_address()];
        let mut budgets = Vec::new();

        let started = Instant::now();
        let result: io::Result<()> = dial_until(
            "blackhole.test:443",
            addresses,
            started + timeout,
            |_, remaining| {
                budgets.push(remaining);
                // Behave like an unreachable address: use up the budget.
                thread::sleep(remaining);
                Err(io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))
            },
        );

        let err = result.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert_eq!(budgets.len(), 1);
        assert!(budgets[0] <= timeout);
        assert!(started.elapsed() < timeout * 2);
    }

    #[test]
    fn test_dial_gives_later_addresses_the_remaining_time() {
        let timeout = Duration::from_secs(2);
        let live = TcpListener::bind("127.0.0.1:0").unwrap();
        let addresses = vec![unused_address(), live.local_addr().unwrap()];
        let mut budgets = Vec::new();

        let started = Instant::now();
        let stream = dial_until("mixed.test:443", addresses, started + timeout, |address, remaining| {
            budgets.push(remaining);
            TcpStream::connect_timeout(address, remaining)
        })
        .unwrap();

        assert_eq!(stream.peer_addr().unwrap(), live.local_addr().unwrap());
        assert_eq!(budgets.len(), 2);
        assert!(budgets[1] <= budgets[0]);
        assert!(budgets[0] <= timeout);
    }

    #[test]
    fn test_dial_past_deadline_makes_no_attempt() {
        let mut attempts = 0;
        let result: io::Result<()> = dial_until(
            "late.test:443",
            vec![unused_address()],
            Instant::now(),
            |_, _| {
                attempts += 1;
                Ok(())
            },
        );

        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::TimedOut);
        assert_eq!(attempts, 0);
    }

    #[test]
    fn test_resolve_ip_literal_without_lookup() {
        let addresses = resolve("127.0.0.1:8443", Duration::from_millis(1)).unwrap();
        assert_eq!(addresses, vec!["127.0.0.1:8443".parse::<SocketAddr>().unwrap()]);
    }

    #[test]
    fn test_sni_name() {
        assert_eq!(sni_name("example.com:443"), Some("example.com"));
        assert_eq!(sni_name("127.0.0.1:443"), None);
        assert_eq!(sni_name("[::1]:443"), None);
    }

    #[test]
    fn test_select_leaf_skips_authorities() {
        let (root, root_key) = build_cert(&CertSpec::authority("Root"), None);
        let (intermediate, intermediate_key) =
            build_cert(&CertSpec::authority("Intermediate"), Some((&root, &root_key)));
        let (leaf, _) = build_cert(
            &CertSpec::leaf("leaf.test"),
            Some((&intermediate, &intermediate_key)),
        );

        // Misordered chains still resolve to the end-entity certificate.
        let chain = vec![intermediate.clone(), leaf.clone(), root.clone()];
        let selected = select_leaf("leaf.test:443", &chain).unwrap().unwrap();
        assert_eq!(selected.to_der().unwrap(), leaf.to_der().unwrap());
    }

    #[test]
    fn test_select_leaf_authority_only_chain() {
        let (root, root_key) = build_cert(&CertSpec::authority("Root"), None);
        let (intermediate, _) =
            build_cert(&CertSpec::authority("Intermediate"), Some((&root, &root_key)));

        let chain = vec![intermediate, root];
        assert!(select_leaf("ca-only.test:443", &chain).unwrap().is_none());
        assert!(select_leaf("empty.test:443", &[]).unwrap().is_none());
    }
}
