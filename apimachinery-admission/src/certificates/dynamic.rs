use std::{
    collections::hash_map::DefaultHasher,
    fmt,
    hash::{Hash, Hasher},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use backon::{ExponentialBuilder, Retryable};
use bytes::Bytes;
use parking_lot::RwLock;
use tokio::{
    sync::mpsc,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use super::{read_file, validate_ca_bundle, validate_cert_key, CAContentProvider, CertKeyContentProvider, Listener};
use crate::error::CertificateError;

/// How file backed providers notice changes
#[derive(Clone, Debug)]
pub struct WatchConfig {
    /// How often the files are checked for changes
    pub poll_interval: Duration,
    /// How often the files are re-read even when nothing seems to change
    pub resync_interval: Duration,
    /// Retry policy for failed reloads
    pub backoff: ExponentialBuilder,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            resync_interval: Duration::from_secs(60),
            backoff: ExponentialBuilder::default()
                .with_min_delay(Duration::from_millis(100))
                .with_max_delay(Duration::from_secs(30))
                .with_max_times(8),
        }
    }
}

/// What the watch loop needs from a file backed provider
trait Reload: Send + Sync {
    fn name(&self) -> &str;
    fn paths(&self) -> Vec<&Path>;
    /// Re-read the files, returning whether the content changed
    fn reload(&self) -> Result<bool, CertificateError>;
    fn listeners(&self) -> &RwLock<Vec<Arc<dyn Listener>>>;
}

/// A digest of the watched files; `None` entries are missing files
fn fingerprint(paths: &[&Path]) -> Vec<Option<u64>> {
    paths
        .iter()
        .map(|path| {
            std::fs::read(path).ok().map(|data| {
                let mut hasher = DefaultHasher::new();
                data.hash(&mut hasher);
                hasher.finish()
            })
        })
        .collect()
}

/// Poll the provider's files until cancelled, queueing a reload whenever they
/// change and on every resync. The queue holds one pending reload at most.
async fn watch(content: &dyn Reload, config: WatchConfig, cancel: CancellationToken) {
    let (queue, pending) = mpsc::channel::<()>(1);
    tokio::join!(
        poll(content, &config, queue, &cancel),
        process(content, &config, pending, &cancel)
    );
    tracing::debug!(name = content.name(), "stopped watching certificate content");
}

async fn poll(content: &dyn Reload, config: &WatchConfig, queue: mpsc::Sender<()>, cancel: &CancellationToken) {
    let mut last = fingerprint(&content.paths());
    let mut poll = time::interval(config.poll_interval);
    poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut resync = time::interval_at(time::Instant::now() + config.resync_interval, config.resync_interval);
    resync.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = poll.tick() => {
                let current = fingerprint(&content.paths());
                if current == last {
                    continue;
                }
                if current.iter().any(Option::is_none) {
                    tracing::info!(name = content.name(), "certificate file removed or renamed");
                }
                last = current;
            }
            _ = resync.tick() => {}
        }
        // a full queue already holds a pending reload
        let _ = queue.try_send(());
    }
}

async fn process(content: &dyn Reload, config: &WatchConfig, mut pending: mpsc::Receiver<()>, cancel: &CancellationToken) {
    while pending.recv().await.is_some() {
        let reloaded = (|| async { content.reload() })
            .retry(config.backoff.clone())
            .sleep(time::sleep)
            .when(|_| !cancel.is_cancelled())
            .notify(|err, delay| {
                tracing::warn!(name = content.name(), %err, ?delay, "failed to reload certificate content");
            })
            .await;
        match reloaded {
            Ok(true) => {
                let listeners = content.listeners().read().clone();
                for listener in listeners {
                    listener.enqueue();
                }
            }
            Ok(false) => {}
            Err(err) => {
                tracing::error!(name = content.name(), %err, "giving up reloading certificate content until the next change");
            }
        }
    }
}

/// A CA bundle read from a file and reloaded when the file changes
pub struct DynamicFileCAContent {
    name: String,
    path: PathBuf,
    bundle: RwLock<Bytes>,
    pub(super) listeners: RwLock<Vec<Arc<dyn Listener>>>,
}

impl fmt::Debug for DynamicFileCAContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicFileCAContent")
            .field("name", &self.name)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl DynamicFileCAContent {
    /// Load the bundle at `path`; `purpose` names the provider in logs
    pub fn new(purpose: &str, path: impl Into<PathBuf>) -> Result<Arc<Self>, CertificateError> {
        let path = path.into();
        let content = Self {
            name: format!("{purpose}::{}", path.display()),
            path,
            bundle: RwLock::new(Bytes::new()),
            listeners: RwLock::default(),
        };
        content.reload()?;
        Ok(Arc::new(content))
    }

    /// Watch the file until `cancel` fires
    #[tracing::instrument(skip_all, fields(name = %self.name))]
    pub async fn run(self: Arc<Self>, config: WatchConfig, cancel: CancellationToken) {
        tracing::info!("watching CA bundle");
        watch(self.as_ref(), config, cancel).await;
    }
}

impl Reload for DynamicFileCAContent {
    fn name(&self) -> &str {
        &self.name
    }

    fn paths(&self) -> Vec<&Path> {
        vec![&self.path]
    }

    fn reload(&self) -> Result<bool, CertificateError> {
        let bundle = read_file(&self.path)?;
        if *self.bundle.read() == bundle {
            return Ok(false);
        }
        validate_ca_bundle(&self.name, &bundle)?;
        *self.bundle.write() = bundle;
        tracing::info!(name = %self.name, "loaded CA bundle");
        Ok(true)
    }

    fn listeners(&self) -> &RwLock<Vec<Arc<dyn Listener>>> {
        &self.listeners
    }
}

impl CAContentProvider for DynamicFileCAContent {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn current_ca_bundle_content(&self) -> Bytes {
        self.bundle.read().clone()
    }

    fn add_listener(&self, listener: Arc<dyn Listener>) {
        self.listeners.write().push(listener);
    }
}

/// A certificate and key read from two files and reloaded when either changes
pub struct DynamicCertKeyPairContent {
    name: String,
    cert_path: PathBuf,
    key_path: PathBuf,
    pair: RwLock<(Bytes, Bytes)>,
    listeners: RwLock<Vec<Arc<dyn Listener>>>,
}

impl fmt::Debug for DynamicCertKeyPairContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicCertKeyPairContent")
            .field("name", &self.name)
            .field("cert_path", &self.cert_path)
            .field("key_path", &self.key_path)
            .finish_non_exhaustive()
    }
}

impl DynamicCertKeyPairContent {
    /// Load the pair at `cert_path` and `key_path`; `purpose` names the provider in logs
    pub fn new(
        purpose: &str,
        cert_path: impl Into<PathBuf>,
        key_path: impl Into<PathBuf>,
    ) -> Result<Arc<Self>, CertificateError> {
        let (cert_path, key_path) = (cert_path.into(), key_path.into());
        let content = Self {
            name: format!("{purpose}::{}::{}", cert_path.display(), key_path.display()),
            cert_path,
            key_path,
            pair: RwLock::default(),
            listeners: RwLock::default(),
        };
        content.reload()?;
        Ok(Arc::new(content))
    }

    /// Watch both files until `cancel` fires
    #[tracing::instrument(skip_all, fields(name = %self.name))]
    pub async fn run(self: Arc<Self>, config: WatchConfig, cancel: CancellationToken) {
        tracing::info!("watching certificate and key");
        watch(self.as_ref(), config, cancel).await;
    }
}

impl Reload for DynamicCertKeyPairContent {
    fn name(&self) -> &str {
        &self.name
    }

    fn paths(&self) -> Vec<&Path> {
        vec![&self.cert_path, &self.key_path]
    }

    fn reload(&self) -> Result<bool, CertificateError> {
        let pair = (read_file(&self.cert_path)?, read_file(&self.key_path)?);
        if *self.pair.read() == pair {
            return Ok(false);
        }
        validate_cert_key(&self.name, &pair.0, &pair.1)?;
        *self.pair.write() = pair;
        tracing::info!(name = %self.name, "loaded certificate and key");
        Ok(true)
    }

    fn listeners(&self) -> &RwLock<Vec<Arc<dyn Listener>>> {
        &self.listeners
    }
}

impl CertKeyContentProvider for DynamicCertKeyPairContent {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn current_cert_key_content(&self) -> (Bytes, Bytes) {
        self.pair.read().clone()
    }

    fn add_listener(&self, listener: Arc<dyn Listener>) {
        self.listeners.write().push(listener);
    }
}
