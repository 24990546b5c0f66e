use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::consts::API_KEY_ENV_VARS;

/// The API key used by remote calls.
///
/// Read on every request, so a key selected mid-session is picked up by the
/// next call without rebuilding any client.
#[derive(Clone, Default)]
pub struct Credential {
    key: Arc<RwLock<Option<String>>>,
}

impl Credential {
    pub fn new(key: Option<String>) -> Self {
        let key = key.filter(|k| !k.trim().is_empty());
        Self {
            key: Arc::new(RwLock::new(key)),
        }
    }

    /// Uses the configured key, falling back to the conventional env vars
    pub fn from_config_or_env(configured: Option<String>) -> Self {
        let key = configured.filter(|k| !k.trim().is_empty()).or_else(|| {
            API_KEY_ENV_VARS
                .iter()
                .filter_map(|name| std::env::var(name).ok())
                .find(|value| !value.trim().is_empty())
        });
        Self::new(key)
    }

    pub async fn get(&self) -> Option<String> {
        self.key.read().await.clone()
    }

    pub async fn set(&self, key: String) {
        *self.key.write().await = Some(key);
    }

    pub async fn is_present(&self) -> bool {
        self.key.read().await.is_some()
    }
}

/// Host-side credential selection.
///
/// Hosts that cannot answer keep the defaults: a key is assumed to be
/// supplied by the environment and selection does nothing.
#[async_trait]
pub trait KeyHost: Send + Sync {
    async fn has_selected_key(&self) -> bool {
        true
    }

    async fn open_select_key(&self) {}
}

/// Host with no selection capability
pub struct AmbientKeyHost;

#[async_trait]
impl KeyHost for AmbientKeyHost {}

/// Asks for a key on the terminal and stores it in the shared credential
pub struct PromptKeyHost {
    credential: Credential,
}

impl PromptKeyHost {
    pub fn new(credential: Credential) -> Self {
        Self { credential }
    }
}

#[async_trait]
impl KeyHost for PromptKeyHost {
    async fn has_selected_key(&self) -> bool {
        self.credential.is_present().await
    }

    async fn open_select_key(&self) {
        eprint!("Enter API key: ");
        let _ = std::io::stderr().flush();

        let mut line = String::new();
        let mut reader = BufReader::new(tokio::io::stdin());
        match reader.read_line(&mut line).await {
            Ok(_) => {
                let key = line.trim();
                if key.is_empty() {
                    warn!("No API key entered");
                } else {
                    self.credential.set(key.to_string()).await;
                    info!("API key selected from terminal");
                }
            }
            Err(e) => warn!("Failed to read API key from terminal: {}", e),
        }
    }
}

/// Tracks whether a usable credential is selected.
///
/// The video workflow refuses to start while this is false.
pub struct KeyGate {
    host: Arc<dyn KeyHost>,
    selected: AtomicBool,
}

impl Default for KeyGate {
    fn default() -> Self {
        Self::new(Arc::new(AmbientKeyHost))
    }
}

impl KeyGate {
    pub fn new(host: Arc<dyn KeyHost>) -> Self {
        Self {
            host,
            selected: AtomicBool::new(false),
        }
    }

    /// Re-reads the selection state from the host
    pub async fn probe(&self) -> bool {
        let selected = self.host.has_selected_key().await;
        self.selected.store(selected, Ordering::SeqCst);
        selected
    }

    /// Lets the host present its selection prompt, then optimistically
    /// assumes a key was chosen. A later auth failure flips it back.
    pub async fn request_selection(&self) {
        self.host.open_select_key().await;
        self.selected.store(true, Ordering::SeqCst);
    }

    pub fn invalidate(&self) {
        if self.selected.swap(false, Ordering::SeqCst) {
            info!("Credential marked as not selected");
        }
    }

    pub fn is_selected(&self) -> bool {
        self.selected.load(Ordering::SeqCst)
    }
}
