//! Self-signed certificate fixtures for unit tests.

use chrono::Utc;
use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::x509::extension::BasicConstraints;
use openssl::x509::{X509Builder, X509NameBuilder, X509};

pub struct CertSpec {
    common_name: String,
    is_ca: bool,
    days_valid: i64,
    serial: u32,
}

impl CertSpec {
    pub fn leaf(common_name: &str) -> Self {
        CertSpec {
            common_name: common_name.to_string(),
            is_ca: false,
            days_valid: 90,
            serial: 1000,
        }
    }

    pub fn authority(common_name: &str) -> Self {
        CertSpec {
            is_ca: true,
            serial: 1,
            days_valid: 3650,
            ..CertSpec::leaf(common_name)
        }
    }

    pub fn expires_in_days(mut self, days: i64) -> Self {
        self.days_valid = days;
        self
    }

    pub fn serial(mut self, serial: u32) -> Self {
        self.serial = serial;
        self
    }
}

/// Builds a certificate for `template`, signed by `issuer` or self-signed.
pub fn build_cert(
    template: &CertSpec,
    issuer: Option<(&X509, &PKey<Private>)>,
) -> (X509, PKey<Private>) {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    let key = PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap();

    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_nid(Nid::COUNTRYNAME, "US").unwrap();
    name.append_entry_by_nid(Nid::ORGANIZATIONNAME, "Certscan Tests")
        .unwrap();
    name.append_entry_by_nid(Nid::COMMONNAME, &template.common_name)
        .unwrap();
    let name = name.build();

    let now = Utc::now().timestamp();
    let mut builder = X509Builder::new().unwrap();
    builder.set_version(2).unwrap();
    let serial = BigNum::from_u32(template.serial)
        .unwrap()
        .to_asn1_integer()
        .unwrap();
    builder.set_serial_number(&serial).unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_pubkey(&key).unwrap();
    builder
        .set_not_before(&Asn1Time::from_unix(now - 30 * 86_400).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::from_unix(now + template.days_valid * 86_400).unwrap())
        .unwrap();

    let constraints = if template.is_ca {
        BasicConstraints::new().critical().ca().build().unwrap()
    } else {
        BasicConstraints::new().build().unwrap()
    };
    builder.append_extension(constraints).unwrap();

    match issuer {
        Some((issuer_cert, issuer_key)) => {
            builder.set_issuer_name(issuer_cert.subject_name()).unwrap();
            builder.sign(issuer_key, MessageDigest::sha256()).unwrap();
        }
        None => {
            builder.set_issuer_name(&name).unwrap();
            builder.sign(&key, MessageDigest::sha256()).unwrap();
        }
    }

    (builder.build(), key)
}
