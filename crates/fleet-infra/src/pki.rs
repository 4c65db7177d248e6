//! Fleet certificate authority
//!
//! Every fleet has exactly one [`Authority`]: a long-lived root key pair and a
//! self-signed root certificate. Machines never exchange certificate requests;
//! an Authority issues leaf certificates to itself, on demand, for the server
//! and client sides of each TLS endpoint it runs.
//!
//! # Trust Model
//!
//! - Membership in a fleet is certificate provenance: "signed by this root"
//! - Two machines holding the same Authority can authenticate each other
//! - Machines holding different Authorities cannot, in either direction
//! - Leaf certificates are short-lived and never persisted
//!
//! Persistence lives in [`crate::store`]; TLS configuration in [`crate::mtls`].

use std::net::IpAddr;
use std::sync::Arc;

use rcgen::{
    string::Ia5String, BasicConstraints, CertificateParams, DistinguishedName, DnType, DnValue,
    ExtendedKeyUsagePurpose, IsCa, Issuer, KeyPair, KeyUsagePurpose, SanType,
};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::{ClientConfig, ServerConfig};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;
use x509_parser::prelude::*;
use zeroize::Zeroizing;

use crate::mtls::{ClientMtlsConfig, ServerMtlsConfig};

/// Validity period of a root certificate
pub const ROOT_VALIDITY_YEARS: i64 = 10;

/// Validity period of an issued leaf certificate
pub const LEAF_VALIDITY: ::time::Duration = ::time::Duration::days(7);

/// Fraction of a leaf's lifetime after which it is replaced
pub const ROTATION_THRESHOLD: f64 = 0.80;

/// How far a leaf's `not_before` is moved into the past, so that peers with
/// slightly lagging clocks accept a certificate minted a moment ago.
pub const CLOCK_SKEW_ALLOWANCE: ::time::Duration = ::time::Duration::hours(1);

/// Common name of the root certificate created by [`Authority::create`]
pub const DEFAULT_AUTHORITY_NAME: &str = "fleet authority";

/// Common name placed in client leaf certificates
pub const CLIENT_COMMON_NAME: &str = "fleet-client";

const ORGANIZATION: &str = "Fleet";

/// Authority errors
#[derive(Debug, Error)]
pub enum AuthorityError {
    /// The authority file could not be written or read
    #[error("authority storage error at {path}: {source}")]
    Storage {
        /// Path of the authority file
        path: std::path::PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// No authority exists at the given path
    #[error("no authority found at {0}")]
    NotFound(std::path::PathBuf),

    /// The authority file exists but does not hold valid key material
    #[error("corrupt authority at {path}: {reason}")]
    Corrupt {
        /// Path of the authority file
        path: std::path::PathBuf,
        /// What failed validation
        reason: String,
    },

    /// Key generation failed
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    /// Certificate generation or signing failed
    #[error("certificate generation failed: {0}")]
    CertificateGeneration(String),

    /// A server identity that cannot be placed in a certificate
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    /// Certificate parsing error
    #[error("certificate parsing error: {0}")]
    Parse(String),

    /// rustls rejected the generated material
    #[error("TLS configuration error: {0}")]
    Tls(String),
}

/// Result type for authority operations
pub type Result<T> = std::result::Result<T, AuthorityError>;

/// Parse PEM-encoded data and return the DER bytes
pub fn parse_pem(pem_data: &str) -> Result<Vec<u8>> {
    let pem_obj = ::pem::parse(pem_data.as_bytes())
        .map_err(|e| AuthorityError::Parse(format!("failed to parse PEM: {}", e)))?;
    Ok(pem_obj.contents().to_vec())
}

/// Validity and subject of a certificate
#[derive(Debug, Clone)]
pub struct CertificateInfo {
    /// When the certificate becomes valid (Unix timestamp)
    pub not_before: i64,
    /// When the certificate expires (Unix timestamp)
    pub not_after: i64,
    /// Subject common name
    pub common_name: String,
    /// Whether the certificate carries the CA basic constraint
    pub is_ca: bool,
}

impl CertificateInfo {
    /// Parse certificate info from a PEM-encoded certificate
    pub fn from_pem(pem_data: &str) -> Result<Self> {
        let der = parse_pem(pem_data)?;
        Self::from_der(&der)
    }

    /// Parse certificate info from a DER-encoded certificate
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| AuthorityError::Parse(format!("failed to parse certificate: {}", e)))?;

        let common_name = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .unwrap_or("")
            .to_string();

        Ok(Self {
            not_before: cert.validity().not_before.timestamp(),
            not_after: cert.validity().not_after.timestamp(),
            common_name,
            is_ca: cert.is_ca(),
        })
    }

    /// Seconds remaining until the certificate expires
    pub fn remaining_secs(&self) -> i64 {
        self.not_after - ::time::OffsetDateTime::now_utc().unix_timestamp()
    }

    /// Check if the certificate has expired
    pub fn is_expired(&self) -> bool {
        self.remaining_secs() <= 0
    }
}

/// Identity placed in server leaf certificates
///
/// Ephemeral machines frequently reuse the same network name. With an
/// instance suffix the certificate name becomes `{hostname}-{suffix}`, which
/// keeps certificates unambiguous across machine churn. Without one the name
/// is the bare hostname, which deterministic test setups rely on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerIdentity {
    hostname: String,
    instance_suffix: Option<String>,
}

impl ServerIdentity {
    /// Identity without an instance suffix
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            instance_suffix: None,
        }
    }

    /// Append an instance-disambiguating suffix
    pub fn with_instance_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.instance_suffix = Some(suffix.into());
        self
    }

    /// The bare hostname
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// The instance suffix, if any
    pub fn instance_suffix(&self) -> Option<&str> {
        self.instance_suffix.as_deref()
    }

    /// The name embedded in issued server certificates
    pub fn name(&self) -> String {
        match &self.instance_suffix {
            Some(suffix) => format!("{}-{}", self.hostname, suffix),
            None => self.hostname.clone(),
        }
    }

    fn validate(&self) -> Result<()> {
        let valid = |s: &str| {
            !s.is_empty() && s.chars().all(|c| c.is_ascii_graphic() && c != '/' && c != '@')
        };
        if !valid(&self.hostname) {
            return Err(AuthorityError::InvalidIdentity(format!(
                "hostname '{}' must be non-empty printable ASCII",
                self.hostname
            )));
        }
        if let Some(suffix) = &self.instance_suffix {
            if !valid(suffix) {
                return Err(AuthorityError::InvalidIdentity(format!(
                    "instance suffix '{}' must be non-empty printable ASCII",
                    suffix
                )));
            }
        }
        Ok(())
    }

    fn subject_alt_names(&self) -> Result<Vec<SanType>> {
        let dns = |name: String| {
            Ia5String::try_from(name.clone())
                .map(SanType::DnsName)
                .map_err(|e| {
                    AuthorityError::InvalidIdentity(format!("invalid DNS name '{}': {}", name, e))
                })
        };

        // An IP literal has no meaningful suffixed DNS form; the CN carries it.
        if let Ok(ip) = self.hostname.parse::<IpAddr>() {
            return Ok(vec![SanType::IpAddress(ip)]);
        }

        let mut sans = vec![dns(self.hostname.clone())?];
        if self.instance_suffix.is_some() {
            sans.push(dns(self.name())?);
        }
        Ok(sans)
    }
}

/// Freshly issued leaf certificate and its private key
///
/// Leaf credentials live only as long as the TLS configuration built from
/// them. The private key is zeroized on drop.
pub struct LeafCredentials {
    name: String,
    cert_pem: String,
    cert_der: CertificateDer<'static>,
    key_der: Zeroizing<Vec<u8>>,
}

impl LeafCredentials {
    /// Name placed in the certificate's common name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Certificate in PEM format
    pub fn cert_pem(&self) -> &str {
        &self.cert_pem
    }

    /// Certificate in DER format
    pub fn cert_der(&self) -> &CertificateDer<'static> {
        &self.cert_der
    }

    /// Private key, PKCS#8 DER
    pub fn private_key_der(&self) -> PrivateKeyDer<'static> {
        PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(self.key_der.to_vec()))
    }
}

impl std::fmt::Debug for LeafCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeafCredentials")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Fleet certificate authority
///
/// Immutable once built; share it across connection tasks behind an [`Arc`].
/// Cloning copies the root key material.
#[derive(Clone)]
pub struct Authority {
    /// Root key pair serialized as PEM (KeyPair isn't Clone, so it is parsed per issuance)
    key_pem: Zeroizing<String>,
    /// PEM-encoded root certificate
    cert_pem: String,
    /// DER-encoded root certificate
    cert_der: CertificateDer<'static>,
    common_name: String,
}

impl Authority {
    /// Generate a new root key pair and self-signed root certificate in memory
    pub fn generate(common_name: &str) -> Result<Self> {
        let mut params = CertificateParams::default();
        params.distinguished_name = distinguished_name(common_name);

        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];

        let now = ::time::OffsetDateTime::now_utc();
        params.not_before = now - CLOCK_SKEW_ALLOWANCE;
        params.not_after = now + ::time::Duration::days(ROOT_VALIDITY_YEARS * 365);

        let key_pair = KeyPair::generate().map_err(|e| {
            AuthorityError::KeyGeneration(format!("failed to generate root key: {}", e))
        })?;

        let cert = params.self_signed(&key_pair).map_err(|e| {
            AuthorityError::CertificateGeneration(format!("failed to create root cert: {}", e))
        })?;

        Ok(Self {
            key_pem: Zeroizing::new(key_pair.serialize_pem()),
            cert_pem: cert.pem(),
            cert_der: cert.der().clone(),
            common_name: common_name.to_string(),
        })
    }

    /// Rebuild an authority from its PEM-encoded root key and certificate
    ///
    /// Rejects material where the key does not parse, the certificate does not
    /// parse or is not a CA, the certificate was not made for this key, or its
    /// self-signature does not verify. The returned message is the rejection reason.
    pub(crate) fn from_pem(
        cert_pem: &str,
        key_pem: Zeroizing<String>,
    ) -> std::result::Result<Self, String> {
        let key_pair =
            KeyPair::from_pem(&key_pem).map_err(|e| format!("failed to parse root key: {}", e))?;

        let cert_der = parse_pem(cert_pem).map_err(|e| e.to_string())?;
        let (_, cert) = X509Certificate::from_der(&cert_der)
            .map_err(|e| format!("failed to parse root cert: {}", e))?;

        if !cert.is_ca() {
            return Err("root certificate is not a CA".to_string());
        }
        if cert.public_key().subject_public_key.data.as_ref() != key_pair.public_key_raw() {
            return Err("root certificate does not match root key".to_string());
        }
        if cert.verify_signature(None).is_err() {
            return Err("root certificate signature is invalid".to_string());
        }

        let common_name = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .unwrap_or("")
            .to_string();

        Ok(Self {
            key_pem,
            cert_pem: cert_pem.to_string(),
            cert_der: CertificateDer::from(cert_der),
            common_name,
        })
    }

    /// Root certificate in PEM format (safe to distribute)
    pub fn root_cert_pem(&self) -> &str {
        &self.cert_pem
    }

    /// Root certificate in DER format
    pub fn root_cert_der(&self) -> &CertificateDer<'static> {
        &self.cert_der
    }

    /// Root key PEM, for the store only
    pub(crate) fn root_key_pem(&self) -> &str {
        &self.key_pem
    }

    /// Common name of the root certificate
    pub fn common_name(&self) -> &str {
        &self.common_name
    }

    /// SHA-256 of the root certificate DER, hex encoded
    ///
    /// Two authorities with the same fingerprint are the same trust domain.
    pub fn fingerprint(&self) -> String {
        hex::encode(Sha256::digest(self.cert_der.as_ref()))
    }

    /// Validity window of the root certificate
    pub fn root_info(&self) -> Result<CertificateInfo> {
        CertificateInfo::from_der(self.cert_der.as_ref())
    }

    fn load_key_pair(&self) -> Result<KeyPair> {
        KeyPair::from_pem(&self.key_pem)
            .map_err(|e| AuthorityError::Parse(format!("failed to load root key: {}", e)))
    }

    fn issue(
        &self,
        name: String,
        sans: Vec<SanType>,
        usage: ExtendedKeyUsagePurpose,
    ) -> Result<LeafCredentials> {
        let mut params = CertificateParams::default();
        params.distinguished_name = distinguished_name(&name);
        params.is_ca = IsCa::ExplicitNoCa;
        params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
        params.extended_key_usages = vec![usage];
        params.subject_alt_names = sans;

        let now = ::time::OffsetDateTime::now_utc();
        params.not_before = now - CLOCK_SKEW_ALLOWANCE;
        params.not_after = now + LEAF_VALIDITY;

        let leaf_key = KeyPair::generate().map_err(|e| {
            AuthorityError::KeyGeneration(format!("failed to generate leaf key: {}", e))
        })?;

        let root_key = self.load_key_pair()?;
        let issuer = Issuer::from_ca_cert_pem(&self.cert_pem, &root_key)
            .map_err(|e| AuthorityError::Parse(format!("failed to create issuer: {}", e)))?;

        let cert = params.signed_by(&leaf_key, &issuer).map_err(|e| {
            AuthorityError::CertificateGeneration(format!("failed to sign leaf cert: {}", e))
        })?;

        debug!(name = %name, "Issued leaf certificate");

        Ok(LeafCredentials {
            name,
            cert_pem: cert.pem(),
            cert_der: cert.der().clone(),
            key_der: Zeroizing::new(leaf_key.serialize_der()),
        })
    }

    /// Issue a server leaf certificate for the given identity
    pub fn issue_server(&self, identity: &ServerIdentity) -> Result<LeafCredentials> {
        identity.validate()?;
        self.issue(
            identity.name(),
            identity.subject_alt_names()?,
            ExtendedKeyUsagePurpose::ServerAuth,
        )
    }

    /// Issue a client leaf certificate
    pub fn issue_client(&self) -> Result<LeafCredentials> {
        self.issue(
            CLIENT_COMMON_NAME.to_string(),
            Vec::new(),
            ExtendedKeyUsagePurpose::ClientAuth,
        )
    }

    /// TLS configuration for accepting connections
    ///
    /// Presents a server leaf for `identity`, renewed before it expires, and
    /// requires every client to present a certificate signed by this root.
    pub fn server_tls_config(&self, identity: &ServerIdentity) -> Result<Arc<ServerConfig>> {
        ServerMtlsConfig::issued(self, identity.clone()).to_rustls_config()
    }

    /// TLS configuration for outbound connections
    ///
    /// Presents a client leaf, renewed before it expires, and only accepts
    /// servers whose certificate is signed by this root.
    pub fn client_tls_config(&self) -> Result<Arc<ClientConfig>> {
        ClientMtlsConfig::issued(self).to_rustls_config()
    }
}

impl std::fmt::Debug for Authority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authority")
            .field("common_name", &self.common_name)
            .field("fingerprint", &self.fingerprint())
            .finish_non_exhaustive()
    }
}

fn distinguished_name(common_name: &str) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    dn.push(
        DnType::CommonName,
        DnValue::Utf8String(common_name.to_string()),
    );
    dn.push(
        DnType::OrganizationName,
        DnValue::Utf8String(ORGANIZATION.to_string()),
    );
    dn
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_signed_by(cert_der: &[u8], authority: &Authority) -> Result<bool> {
        let (_, cert) = X509Certificate::from_der(cert_der)
            .map_err(|e| AuthorityError::Parse(format!("failed to parse certificate: {}", e)))?;
        let (_, root) = X509Certificate::from_der(authority.root_cert_der().as_ref())
            .map_err(|e| AuthorityError::Parse(format!("failed to parse root cert: {}", e)))?;
        Ok(cert.verify_signature(Some(root.public_key())).is_ok())
    }

    #[test]
    fn authority_can_be_generated() {
        let authority = Authority::generate("Test Authority").expect("generation should succeed");
        assert!(authority.root_cert_pem().contains("BEGIN CERTIFICATE"));
        assert!(authority.root_key_pem().contains("BEGIN PRIVATE KEY"));
        assert_eq!(authority.common_name(), "Test Authority");

        let info = authority.root_info().expect("root info should parse");
        assert!(info.is_ca);
        assert!(!info.is_expired());
        assert_eq!(info.common_name, "Test Authority");
    }

    #[test]
    fn fingerprint_is_stable_and_distinct() {
        let a = Authority::generate("A").expect("generation should succeed");
        let b = Authority::generate("B").expect("generation should succeed");

        assert_eq!(a.fingerprint(), a.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn server_leaf_is_signed_by_root() {
        let authority = Authority::generate("Test Authority").expect("generation should succeed");
        let leaf = authority
            .issue_server(&ServerIdentity::new("localhost"))
            .expect("issuance should succeed");

        assert!(is_signed_by(leaf.cert_der().as_ref(), &authority).expect("should parse"));

        let info = CertificateInfo::from_der(leaf.cert_der().as_ref()).expect("should parse");
        assert_eq!(info.common_name, "localhost");
        assert!(!info.is_ca);
        let max_lifetime = (LEAF_VALIDITY + CLOCK_SKEW_ALLOWANCE).whole_seconds();
        assert!(info.not_after - info.not_before <= max_lifetime);
    }

    #[test]
    fn client_leaf_is_signed_by_root() {
        let authority = Authority::generate("Test Authority").expect("generation should succeed");
        let leaf = authority.issue_client().expect("issuance should succeed");

        assert!(is_signed_by(leaf.cert_der().as_ref(), &authority).expect("should parse"));
        assert_eq!(leaf.name(), CLIENT_COMMON_NAME);
        assert!(leaf.cert_pem().contains("BEGIN CERTIFICATE"));
    }

    #[test]
    fn each_issuance_uses_a_fresh_key() {
        let authority = Authority::generate("Test Authority").expect("generation should succeed");
        let first = authority.issue_client().expect("issuance should succeed");
        let second = authority.issue_client().expect("issuance should succeed");

        assert_ne!(first.cert_der(), second.cert_der());
        assert_ne!(
            first.private_key_der().secret_der(),
            second.private_key_der().secret_der()
        );
    }

    #[test]
    fn instance_suffix_changes_certificate_name() {
        let authority = Authority::generate("Test Authority").expect("generation should succeed");

        let plain = authority
            .issue_server(&ServerIdentity::new("worker"))
            .expect("issuance should succeed");
        let suffixed = authority
            .issue_server(&ServerIdentity::new("worker").with_instance_suffix("i-0abc123"))
            .expect("issuance should succeed");

        let plain_cn = CertificateInfo::from_der(plain.cert_der().as_ref())
            .expect("should parse")
            .common_name;
        let suffixed_cn = CertificateInfo::from_der(suffixed.cert_der().as_ref())
            .expect("should parse")
            .common_name;

        assert_eq!(plain_cn, "worker");
        assert_eq!(suffixed_cn, "worker-i-0abc123");
    }

    #[test]
    fn identity_name_formats() {
        let identity = ServerIdentity::new("host");
        assert_eq!(identity.name(), "host");
        assert_eq!(identity.instance_suffix(), None);

        let identity = identity.with_instance_suffix("abc");
        assert_eq!(identity.name(), "host-abc");
        assert_eq!(identity.hostname(), "host");
        assert_eq!(identity.instance_suffix(), Some("abc"));
    }

    #[test]
    fn ip_hostname_gets_ip_san() {
        let authority = Authority::generate("Test Authority").expect("generation should succeed");
        let leaf = authority
            .issue_server(&ServerIdentity::new("10.0.0.7").with_instance_suffix("i-1"))
            .expect("issuance should succeed");

        let (_, cert) = X509Certificate::from_der(leaf.cert_der().as_ref()).expect("should parse");
        let san = cert
            .subject_alternative_name()
            .expect("extension should parse")
            .expect("SAN should be present");
        assert!(san
            .value
            .general_names
            .iter()
            .any(|name| matches!(name, GeneralName::IPAddress(ip) if *ip == [10, 0, 0, 7])));
    }

    #[test]
    fn invalid_identity_rejected() {
        let authority = Authority::generate("Test Authority").expect("generation should succeed");

        let result = authority.issue_server(&ServerIdentity::new(""));
        assert!(matches!(result, Err(AuthorityError::InvalidIdentity(_))));

        let result = authority.issue_server(&ServerIdentity::new("host name"));
        assert!(matches!(result, Err(AuthorityError::InvalidIdentity(_))));

        let result =
            authority.issue_server(&ServerIdentity::new("host").with_instance_suffix(""));
        assert!(matches!(result, Err(AuthorityError::InvalidIdentity(_))));
    }

    #[test]
    fn from_pem_rejects_mismatched_key() {
        let a = Authority::generate("A").expect("generation should succeed");
        let b = Authority::generate("B").expect("generation should succeed");

        let result = Authority::from_pem(
            a.root_cert_pem(),
            Zeroizing::new(b.root_key_pem().to_string()),
        );
        let reason = result.expect_err("mismatched key should be rejected");
        assert!(reason.contains("does not match"));
    }

    #[test]
    fn from_pem_rejects_leaf_as_root() {
        let authority = Authority::generate("A").expect("generation should succeed");
        let leaf = authority.issue_client().expect("issuance should succeed");

        let result = Authority::from_pem(
            leaf.cert_pem(),
            Zeroizing::new(authority.root_key_pem().to_string()),
        );
        assert!(result.is_err());
    }

    #[test]
    fn debug_output_redacts_key() {
        let authority = Authority::generate("Redacted").expect("generation should succeed");
        let debug = format!("{:?}", authority);
        assert!(debug.contains("Redacted"));
        assert!(!debug.contains("PRIVATE KEY"));

        let leaf = authority.issue_client().expect("issuance should succeed");
        assert!(!format!("{:?}", leaf).contains("key_der"));
    }

    // ==========================================================================
    // Story Tests: Trust Domain Separation
    // ==========================================================================

    /// Story: A leaf from a foreign authority is never "signed by" ours
    ///
    /// An attacker who creates their own authority cannot mint certificates
    /// that verify against the fleet's root.
    #[test]
    fn story_foreign_authority_leaf_is_rejected() {
        let fleet = Authority::generate("Fleet").expect("generation should succeed");
        let attacker = Authority::generate("Fleet").expect("generation should succeed");

        let forged = attacker
            .issue_server(&ServerIdentity::new("localhost"))
            .expect("issuance should succeed");

        assert!(!is_signed_by(forged.cert_der().as_ref(), &fleet).expect("should parse"));
        assert!(is_signed_by(forged.cert_der().as_ref(), &attacker).expect("should parse"));
    }

    /// Story: Garbage input is reported as a parse error
    #[test]
    fn story_pem_parsing_errors() {
        let result = parse_pem("this is not valid PEM data at all");
        match result {
            Err(AuthorityError::Parse(msg)) => assert!(msg.contains("parse PEM")),
            _ => panic!("Expected Parse error"),
        }

        let authority = Authority::generate("Fleet").expect("generation should succeed");
        assert!(is_signed_by(b"not DER", &authority).is_err());
    }
}
