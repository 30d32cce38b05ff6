//! Local TLS endpoints for integration tests.

#![allow(dead_code)]

use std::net::{SocketAddr, TcpListener};
use std::thread;

use openssl::pkey::{PKeyRef, Private};
use openssl::ssl::{SslAcceptor, SslMethod};
use openssl::x509::X509;

#[path = "../../src/test_support.rs"]
mod certs;

pub use certs::{build_cert, CertSpec};

/// Serves `cert` (plus `extra_chain`) over TLS on an ephemeral loopback port.
///
/// Every accepted connection is handshaken on its own thread and then dropped.
pub fn spawn_tls_server(cert: &X509, key: &PKeyRef<Private>, extra_chain: &[X509]) -> SocketAddr {
    let mut acceptor = SslAcceptor::mozilla_intermediate_v5(SslMethod::tls()).unwrap();
    acceptor.set_private_key(key).unwrap();
    acceptor.set_certificate(cert).unwrap();
    for cert in extra_chain {
        acceptor.add_extra_chain_cert(cert.clone()).unwrap();
    }
    acceptor.check_private_key().unwrap();
    let acceptor = acceptor.build();

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap();
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let acceptor = acceptor.clone();
            thread::spawn(move || {
                if let Ok(mut tls) = acceptor.accept(stream) {
                    let _ = tls.shutdown();
                }
            });
        }
    });
    address
}

/// Accepts TCP connections and closes them without speaking TLS.
pub fn spawn_plain_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap();
    thread::spawn(move || {
        for stream in listener.incoming() {
            drop(stream);
        }
    });
    address
}

/// A loopback port with nothing listening on it.
pub fn closed_port() -> SocketAddr {
    TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap()
}
