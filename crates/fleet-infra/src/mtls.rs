//! mTLS configuration for fleet connections
//!
//! Builds rustls configurations for both sides of a connection from a leaf
//! certificate and the authority root. Both sides pin the root: a server only
//! accepts clients whose certificate chains to it, and a client only accepts
//! servers whose certificate chains to it.
//!
//! Leaves issued by the authority are renewed in place by a [`LeafResolver`],
//! so a configuration stays usable for as long as the root does.
//!
//! Server names are not part of the trust decision. Machines dial each other
//! by whatever address the scheduler hands out, so the predicate is
//! provenance alone.

use std::sync::{Arc, PoisonError, RwLock};

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::{verify_server_cert_signed_by_trust_anchor, ResolvesClientCert};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::server::{ClientHello, ParsedCertificate, ResolvesServerCert, WebPkiClientVerifier};
use rustls::sign::CertifiedKey;
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, ServerConfig, SignatureScheme};
use tracing::{debug, warn};

use crate::pki::{
    Authority, AuthorityError, LeafCredentials, Result, ServerIdentity, LEAF_VALIDITY,
    ROTATION_THRESHOLD,
};

/// ALPN protocols offered by fleet servers
pub const SERVER_ALPN: &[&[u8]] = &[b"h2", b"http/1.1"];

/// ALPN protocols offered by fleet clients
pub const CLIENT_ALPN: &[&[u8]] = &[b"h2"];

/// The crypto provider used for every fleet TLS configuration
///
/// Configurations carry their provider explicitly, so nothing depends on a
/// process-wide default being installed.
pub fn crypto_provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::aws_lc_rs::default_provider())
}

fn root_store(root: &CertificateDer<'static>) -> Result<RootCertStore> {
    let mut roots = RootCertStore::empty();
    roots
        .add(root.clone())
        .map_err(|e| AuthorityError::Tls(format!("failed to add root certificate: {}", e)))?;
    Ok(roots)
}

/// Which side of a connection a leaf certificate is issued for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeafRole {
    /// Server leaf carrying the given identity
    Server(ServerIdentity),
    /// Client leaf
    Client,
}

/// Where a TLS endpoint gets its leaf certificate
#[derive(Debug)]
pub enum LeafSource {
    /// One leaf, presented for as long as the configuration lives
    Fixed(LeafCredentials),
    /// Issued by the authority and reissued past [`ROTATION_THRESHOLD`] of
    /// its lifetime
    Issued {
        /// Authority that signs every reissued leaf
        authority: Authority,
        /// Side the leaf is issued for; a server keeps its identity across
        /// renewals
        role: LeafRole,
    },
}

#[derive(Debug, Clone)]
struct CurrentLeaf {
    key: Arc<CertifiedKey>,
    /// Unix time from which the leaf is replaced
    renew_after: i64,
}

fn unix_now() -> i64 {
    ::time::OffsetDateTime::now_utc().unix_timestamp()
}

/// Seconds a leaf is presented before it is replaced
fn renewal_delay() -> i64 {
    (LEAF_VALIDITY.whole_seconds() as f64 * ROTATION_THRESHOLD) as i64
}

fn certified_key(leaf: &LeafCredentials, provider: &CryptoProvider) -> Result<Arc<CertifiedKey>> {
    let key = provider
        .key_provider
        .load_private_key(leaf.private_key_der())
        .map_err(|e| AuthorityError::Tls(format!("unusable leaf key: {}", e)))?;
    Ok(Arc::new(CertifiedKey::new(vec![leaf.cert_der().clone()], key)))
}

fn issue_leaf(
    authority: &Authority,
    role: &LeafRole,
    provider: &CryptoProvider,
    now: i64,
) -> Result<CurrentLeaf> {
    let leaf = match role {
        LeafRole::Server(identity) => authority.issue_server(identity)?,
        LeafRole::Client => authority.issue_client()?,
    };
    debug!(name = %leaf.name(), "Presenting new leaf certificate");
    Ok(CurrentLeaf {
        key: certified_key(&leaf, provider)?,
        renew_after: now.saturating_add(renewal_delay()),
    })
}

/// Certificate resolver for both sides of a fleet connection
///
/// Listeners run for the life of the process while leaves last
/// [`LEAF_VALIDITY`], so an issued leaf is replaced on the first handshake
/// after [`ROTATION_THRESHOLD`] of its lifetime has passed. Connections that
/// are already established keep the leaf they negotiated with.
#[derive(Debug)]
pub struct LeafResolver {
    source: LeafSource,
    provider: Arc<CryptoProvider>,
    current: RwLock<CurrentLeaf>,
}

impl LeafResolver {
    /// Build a resolver, issuing the first leaf if the source calls for it
    pub fn new(source: LeafSource, provider: Arc<CryptoProvider>) -> Result<Self> {
        let current = match &source {
            LeafSource::Fixed(leaf) => CurrentLeaf {
                key: certified_key(leaf, &provider)?,
                renew_after: i64::MAX,
            },
            LeafSource::Issued { authority, role } => {
                issue_leaf(authority, role, &provider, unix_now())?
            }
        };

        Ok(Self {
            source,
            provider,
            current: RwLock::new(current),
        })
    }

    /// The leaf to present at `now` (Unix seconds), reissued first when due
    pub fn leaf_at(&self, now: i64) -> Result<Arc<CertifiedKey>> {
        let current = self
            .current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if now < current.renew_after {
            return Ok(current.key);
        }
        let LeafSource::Issued { authority, role } = &self.source else {
            return Ok(current.key);
        };

        let mut slot = self.current.write().unwrap_or_else(PoisonError::into_inner);
        // A concurrent handshake may already have renewed it
        if now < slot.renew_after {
            return Ok(slot.key.clone());
        }
        *slot = issue_leaf(authority, role, &self.provider, now)?;
        Ok(slot.key.clone())
    }

    fn resolve_now(&self) -> Option<Arc<CertifiedKey>> {
        match self.leaf_at(unix_now()) {
            Ok(key) => Some(key),
            Err(e) => {
                warn!(error = %e, "Leaf renewal failed, presenting the previous leaf");
                let current = self.current.read().unwrap_or_else(PoisonError::into_inner);
                Some(current.key.clone())
            }
        }
    }
}

impl ResolvesServerCert for LeafResolver {
    fn resolve(&self, _client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        self.resolve_now()
    }
}

impl ResolvesClientCert for LeafResolver {
    fn resolve(
        &self,
        _root_hint_subjects: &[&[u8]],
        _sigschemes: &[SignatureScheme],
    ) -> Option<Arc<CertifiedKey>> {
        self.resolve_now()
    }

    fn has_certs(&self) -> bool {
        true
    }
}

/// Server-side mTLS configuration
#[derive(Debug)]
pub struct ServerMtlsConfig {
    /// Where the server leaf comes from
    pub leaf: LeafSource,
    /// Root certificate for verifying clients
    pub root: CertificateDer<'static>,
}

impl ServerMtlsConfig {
    /// Server configuration presenting a single fixed leaf
    pub fn new(leaf: LeafCredentials, root: CertificateDer<'static>) -> Self {
        Self {
            leaf: LeafSource::Fixed(leaf),
            root,
        }
    }

    /// Server configuration whose leaf the authority issues and renews
    pub fn issued(authority: &Authority, identity: ServerIdentity) -> Self {
        Self {
            leaf: LeafSource::Issued {
                authority: authority.clone(),
                role: LeafRole::Server(identity),
            },
            root: authority.root_cert_der().clone(),
        }
    }

    /// Build a rustls ServerConfig
    ///
    /// Client certificates are mandatory.
    pub fn to_rustls_config(self) -> Result<Arc<ServerConfig>> {
        let provider = crypto_provider();

        let roots = Arc::new(root_store(&self.root)?);
        let verifier = WebPkiClientVerifier::builder_with_provider(roots, provider.clone())
            .build()
            .map_err(|e| AuthorityError::Tls(format!("failed to build client verifier: {}", e)))?;
        let resolver = LeafResolver::new(self.leaf, provider.clone())?;

        let mut config = ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| AuthorityError::Tls(e.to_string()))?
            .with_client_cert_verifier(verifier)
            .with_cert_resolver(Arc::new(resolver));
        config.alpn_protocols = SERVER_ALPN.iter().map(|p| p.to_vec()).collect();

        Ok(Arc::new(config))
    }
}

/// Client-side mTLS configuration
#[derive(Debug)]
pub struct ClientMtlsConfig {
    /// Where the client leaf comes from
    pub leaf: LeafSource,
    /// Root certificate for verifying servers
    pub root: CertificateDer<'static>,
}

impl ClientMtlsConfig {
    /// Client configuration presenting a single fixed leaf
    pub fn new(leaf: LeafCredentials, root: CertificateDer<'static>) -> Self {
        Self {
            leaf: LeafSource::Fixed(leaf),
            root,
        }
    }

    /// Client configuration whose leaf the authority issues and renews
    pub fn issued(authority: &Authority) -> Self {
        Self {
            leaf: LeafSource::Issued {
                authority: authority.clone(),
                role: LeafRole::Client,
            },
            root: authority.root_cert_der().clone(),
        }
    }

    /// Build a rustls ClientConfig
    pub fn to_rustls_config(self) -> Result<Arc<ClientConfig>> {
        let provider = crypto_provider();
        let verifier = RootPinnedServerVerifier::new(root_store(&self.root)?, provider.clone());
        let resolver = LeafResolver::new(self.leaf, provider.clone())?;

        let mut config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| AuthorityError::Tls(e.to_string()))?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(verifier))
            .with_client_cert_resolver(Arc::new(resolver));
        config.alpn_protocols = CLIENT_ALPN.iter().map(|p| p.to_vec()).collect();

        Ok(Arc::new(config))
    }
}

/// Server certificate verifier that checks the chain against the authority
/// root and nothing else
///
/// Validity period, key usage and signatures are verified by webpki exactly as
/// the default verifier does; only the server-name comparison is skipped.
#[derive(Debug)]
pub struct RootPinnedServerVerifier {
    roots: RootCertStore,
    provider: Arc<CryptoProvider>,
}

impl RootPinnedServerVerifier {
    /// Create a verifier trusting only `roots`
    pub fn new(roots: RootCertStore, provider: Arc<CryptoProvider>) -> Self {
        Self { roots, provider }
    }
}

impl ServerCertVerifier for RootPinnedServerVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        let cert = ParsedCertificate::try_from(end_entity)?;
        verify_server_cert_signed_by_trust_anchor(
            &cert,
            &self.roots,
            intermediates,
            now,
            self.provider.signature_verification_algorithms.all,
        )?;
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio_rustls::{TlsAcceptor, TlsConnector};
    use x509_parser::prelude::*;

    fn server_name() -> ServerName<'static> {
        ServerName::try_from("localhost").expect("valid server name")
    }

    /// Run a TLS handshake over an in-memory pipe and report both outcomes
    async fn handshake(
        server: Arc<ServerConfig>,
        client: Arc<ClientConfig>,
    ) -> (std::io::Result<Vec<u8>>, std::io::Result<Vec<u8>>) {
        let (client_io, server_io) = tokio::io::duplex(64 * 1024);

        let server_side = async move {
            let mut stream = TlsAcceptor::from(server).accept(server_io).await?;
            let mut buf = vec![0u8; 4];
            stream.read_exact(&mut buf).await?;
            stream.write_all(b"pong").await?;
            stream.shutdown().await?;
            Ok::<_, std::io::Error>(buf)
        };

        let client_side = async move {
            let mut stream = TlsConnector::from(client)
                .connect(server_name(), client_io)
                .await?;
            stream.write_all(b"ping").await?;
            let mut buf = Vec::new();
            stream.read_to_end(&mut buf).await?;
            Ok::<_, std::io::Error>(buf)
        };

        tokio::join!(server_side, client_side)
    }

    fn rustls_error(err: &std::io::Error) -> Option<&rustls::Error> {
        err.get_ref().and_then(|inner| inner.downcast_ref::<rustls::Error>())
    }

    #[test]
    fn test_server_tls_config() {
        let authority = Authority::generate("Test").expect("generation should succeed");
        let config = authority
            .server_tls_config(&ServerIdentity::new("localhost"))
            .expect("server config should build");

        assert_eq!(config.alpn_protocols[0], b"h2".to_vec());
    }

    #[test]
    fn test_client_tls_config() {
        let authority = Authority::generate("Test").expect("generation should succeed");
        let config = authority
            .client_tls_config()
            .expect("client config should build");

        assert_eq!(config.alpn_protocols, vec![b"h2".to_vec()]);
        assert!(config.client_auth_cert_resolver.has_certs());
    }

    #[tokio::test]
    async fn same_authority_handshake_succeeds() {
        let authority = Authority::generate("Fleet").expect("generation should succeed");
        let server = authority
            .server_tls_config(&ServerIdentity::new("localhost"))
            .expect("server config should build");
        let client = authority
            .client_tls_config()
            .expect("client config should build");

        let (server_result, client_result) = handshake(server, client).await;

        assert_eq!(server_result.expect("server should complete"), b"ping");
        assert_eq!(client_result.expect("client should complete"), b"pong");
    }

    #[tokio::test]
    async fn server_name_does_not_matter() {
        let authority = Authority::generate("Fleet").expect("generation should succeed");
        let server = authority
            .server_tls_config(&ServerIdentity::new("some-other-host").with_instance_suffix("i-9"))
            .expect("server config should build");
        let client = authority
            .client_tls_config()
            .expect("client config should build");

        let (server_result, client_result) = handshake(server, client).await;

        assert!(server_result.is_ok());
        assert!(client_result.is_ok());
    }

    fn leaf_name(key: &CertifiedKey) -> String {
        crate::pki::CertificateInfo::from_der(key.cert[0].as_ref())
            .expect("leaf should parse")
            .common_name
    }

    #[test]
    fn leaf_is_reused_until_renewal_is_due() {
        let authority = Authority::generate("Fleet").expect("generation should succeed");
        let resolver = LeafResolver::new(
            LeafSource::Issued {
                authority,
                role: LeafRole::Client,
            },
            crypto_provider(),
        )
        .expect("resolver should build");

        let now = unix_now();
        let first = resolver.leaf_at(now).expect("leaf should resolve");
        let later = resolver
            .leaf_at(now + renewal_delay() - 60)
            .expect("leaf should resolve");
        assert!(Arc::ptr_eq(&first, &later));
    }

    #[test]
    fn fixed_leaf_is_never_reissued() {
        let authority = Authority::generate("Fleet").expect("generation should succeed");
        let leaf = authority.issue_client().expect("issuance should succeed");
        let resolver = LeafResolver::new(LeafSource::Fixed(leaf), crypto_provider())
            .expect("resolver should build");

        let now = unix_now();
        let first = resolver.leaf_at(now).expect("leaf should resolve");
        let far_future = resolver
            .leaf_at(now + 10 * LEAF_VALIDITY.whole_seconds())
            .expect("leaf should resolve");
        assert!(Arc::ptr_eq(&first, &far_future));
    }

    // ==========================================================================
    // Story Tests: Long-Running Listeners
    // ==========================================================================

    /// Story: A listener outlives its first leaf
    ///
    /// Once the leaf is past the rotation threshold, and certainly once it
    /// would have expired, the next handshake is served with a newly issued
    /// leaf that keeps the same server identity and chains to the same root.
    #[test]
    fn story_leaf_is_renewed_before_expiry() {
        let authority = Authority::generate("Fleet").expect("generation should succeed");
        let identity = ServerIdentity::new("worker").with_instance_suffix("i-42");
        let resolver = LeafResolver::new(
            LeafSource::Issued {
                authority: authority.clone(),
                role: LeafRole::Server(identity.clone()),
            },
            crypto_provider(),
        )
        .expect("resolver should build");

        let now = unix_now();
        let original = resolver.leaf_at(now).expect("leaf should resolve");

        let renewed = resolver
            .leaf_at(now + renewal_delay())
            .expect("leaf should renew");
        assert_ne!(original.cert[0], renewed.cert[0]);
        assert_eq!(leaf_name(&renewed), identity.name());

        let past_expiry = now + LEAF_VALIDITY.whole_seconds() + 1;
        let after_expiry = resolver.leaf_at(past_expiry).expect("leaf should renew");
        assert_ne!(renewed.cert[0], after_expiry.cert[0]);
        assert_eq!(leaf_name(&after_expiry), "worker-i-42");

        // Renewed leaves still belong to the fleet
        let (_, leaf) = X509Certificate::from_der(after_expiry.cert[0].as_ref())
            .expect("leaf should parse");
        let (_, root) = X509Certificate::from_der(authority.root_cert_der().as_ref())
            .expect("root should parse");
        assert!(leaf.verify_signature(Some(root.public_key())).is_ok());

        // And the renewal is remembered until the next one is due
        let again = resolver.leaf_at(past_expiry + 60).expect("leaf should resolve");
        assert!(Arc::ptr_eq(&after_expiry, &again));
    }

    // ==========================================================================
    // Story Tests: Cross-Fleet Isolation
    // ==========================================================================

    /// Story: A client from another fleet rejects our server outright
    ///
    /// The client pins its own root, so our server certificate fails
    /// verification on the client before any data is written.
    #[tokio::test]
    async fn story_foreign_client_rejects_server() {
        let ours = Authority::generate("Ours").expect("generation should succeed");
        let theirs = Authority::generate("Theirs").expect("generation should succeed");

        let server = ours
            .server_tls_config(&ServerIdentity::new("localhost"))
            .expect("server config should build");
        let client = theirs
            .client_tls_config()
            .expect("client config should build");

        let (server_result, client_result) = handshake(server, client).await;

        let client_err = client_result.expect_err("client should reject the server");
        assert!(matches!(
            rustls_error(&client_err),
            Some(rustls::Error::InvalidCertificate(_))
        ));
        assert!(server_result.is_err(), "server must not see application data");
    }

    /// Story: A client presenting a foreign certificate is refused by the server
    ///
    /// Even a client that trusts our root cannot get in with a leaf signed by
    /// another authority. The server refuses during the handshake and no
    /// application data ever reaches it.
    #[tokio::test]
    async fn story_server_rejects_foreign_client_certificate() {
        let ours = Authority::generate("Ours").expect("generation should succeed");
        let theirs = Authority::generate("Theirs").expect("generation should succeed");

        let server = ours
            .server_tls_config(&ServerIdentity::new("localhost"))
            .expect("server config should build");

        // Trusts our root, but presents a leaf minted by the other authority
        let foreign_leaf = theirs.issue_client().expect("issuance should succeed");
        let client = ClientMtlsConfig::new(foreign_leaf, ours.root_cert_der().clone())
            .to_rustls_config()
            .expect("client config should build");

        let (server_result, client_result) = handshake(server, client).await;

        let server_err = server_result.expect_err("server should reject the client");
        assert!(matches!(
            rustls_error(&server_err),
            Some(rustls::Error::InvalidCertificate(_))
        ));
        if let Ok(data) = client_result {
            assert!(data.is_empty(), "client must not receive a reply");
        }
    }
}
