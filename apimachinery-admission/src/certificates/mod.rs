//! Certificate content that can change while the process runs.
//!
//! Providers hand out their current PEM content and tell registered
//! [`Listener`]s when it changes. Static providers never change; file backed
//! providers reload when their files are rewritten.
use std::{fmt, path::Path, sync::Arc};

use bytes::Bytes;

use crate::error::CertificateError;

mod dynamic;
mod union;

pub use dynamic::{DynamicCertKeyPairContent, DynamicFileCAContent, WatchConfig};
pub use union::UnionCAContent;

/// Told when a provider's content changed
pub trait Listener: Send + Sync {
    /// Schedule a re-read of the provider's content
    fn enqueue(&self);
}

impl<F: Fn() + Send + Sync> Listener for F {
    fn enqueue(&self) {
        self()
    }
}

/// Source of a CA bundle used to verify peers
pub trait CAContentProvider: Send + Sync {
    /// Identifies the provider in logs
    fn name(&self) -> String;

    /// The PEM bundle as of now
    fn current_ca_bundle_content(&self) -> Bytes;

    /// Register for change notifications; static providers ignore this
    fn add_listener(&self, _listener: Arc<dyn Listener>) {}
}

/// Source of a serving or client certificate and its key
pub trait CertKeyContentProvider: Send + Sync {
    /// Identifies the provider in logs
    fn name(&self) -> String;

    /// The PEM certificate chain and private key as of now
    fn current_cert_key_content(&self) -> (Bytes, Bytes);

    /// Register for change notifications; static providers ignore this
    fn add_listener(&self, _listener: Arc<dyn Listener>) {}
}

const CERTIFICATE: &str = "CERTIFICATE";
const PRIVATE_KEY: &str = "PRIVATE KEY";

fn pem_blocks(name: &str, data: &[u8]) -> Result<Vec<pem::Pem>, CertificateError> {
    if data.iter().all(u8::is_ascii_whitespace) {
        return Err(CertificateError::Empty { name: name.to_string() });
    }
    pem::parse_many(data).map_err(|source| CertificateError::Pem {
        name: name.to_string(),
        source,
    })
}

/// Check that `data` is PEM holding at least one certificate
pub fn validate_ca_bundle(name: &str, data: &[u8]) -> Result<(), CertificateError> {
    let blocks = pem_blocks(name, data)?;
    if !blocks.iter().any(|b| b.tag() == CERTIFICATE) {
        return Err(CertificateError::MissingBlock {
            name: name.to_string(),
            tag: CERTIFICATE,
        });
    }
    Ok(())
}

/// Check that `cert` holds a certificate and `key` a private key
pub fn validate_cert_key(name: &str, cert: &[u8], key: &[u8]) -> Result<(), CertificateError> {
    validate_ca_bundle(name, cert)?;
    let blocks = pem_blocks(name, key)?;
    if !blocks.iter().any(|b| b.tag().ends_with(PRIVATE_KEY)) {
        return Err(CertificateError::MissingBlock {
            name: name.to_string(),
            tag: PRIVATE_KEY,
        });
    }
    Ok(())
}

pub(crate) fn read_file(path: &Path) -> Result<Bytes, CertificateError> {
    std::fs::read(path).map(Bytes::from).map_err(|source| CertificateError::ReadFile {
        path: path.to_path_buf(),
        source,
    })
}

/// A CA bundle fixed at construction
#[derive(Clone)]
pub struct StaticCAContent {
    name: String,
    bundle: Bytes,
}

impl fmt::Debug for StaticCAContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticCAContent").field("name", &self.name).finish()
    }
}

impl StaticCAContent {
    /// A provider for `bundle`, which must be valid PEM
    pub fn new(name: impl Into<String>, bundle: impl Into<Bytes>) -> Result<Self, CertificateError> {
        let name = name.into();
        let bundle = bundle.into();
        validate_ca_bundle(&name, &bundle)?;
        Ok(Self { name, bundle })
    }

    /// A provider for the bundle currently stored at `path`
    pub fn from_file(path: &Path) -> Result<Self, CertificateError> {
        Self::new(path.display().to_string(), read_file(path)?)
    }
}

impl CAContentProvider for StaticCAContent {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn current_ca_bundle_content(&self) -> Bytes {
        self.bundle.clone()
    }
}

/// A certificate and key fixed at construction
#[derive(Clone)]
pub struct StaticCertKeyContent {
    name: String,
    cert: Bytes,
    key: Bytes,
}

impl fmt::Debug for StaticCertKeyContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticCertKeyContent").field("name", &self.name).finish()
    }
}

impl StaticCertKeyContent {
    /// A provider for `cert` and `key`, which must be valid PEM
    pub fn new(name: impl Into<String>, cert: impl Into<Bytes>, key: impl Into<Bytes>) -> Result<Self, CertificateError> {
        let name = name.into();
        let (cert, key) = (cert.into(), key.into());
        validate_cert_key(&name, &cert, &key)?;
        Ok(Self { name, cert, key })
    }
}

impl CertKeyContentProvider for StaticCertKeyContent {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn current_cert_key_content(&self) -> (Bytes, Bytes) {
        (self.cert.clone(), self.key.clone())
    }
}
