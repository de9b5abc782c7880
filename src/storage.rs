//! Key-value persistence for CoolPlay voice control
//!
//! This module handles:
//! - The `KeyValueStore` seam (file-backed and in-memory implementations)
//! - Debounced, coalescing writes on a background thread
//! - Flush on demand and on drop, so a graceful shutdown never loses the last mutation

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt persisted data: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("persisted data has unsupported schema version {0}")]
    UnsupportedVersion(u32),
    #[error("custom command not found: {0}")]
    NotFound(String),
    #[error("trigger phrase is empty")]
    EmptyTrigger,
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Generic get/set storage the custom command store persists through
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// One JSON file per key under a directory
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", safe))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        // Write-then-rename so a crash mid-write leaves the old file intact
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// In-process store; cloning shares the same map
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
    writes: Arc<Mutex<usize>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(key: &str, value: &str) -> Self {
        let store = Self::new();
        if let Ok(mut entries) = store.entries.lock() {
            entries.insert(key.to_string(), value.to_string());
        }
        store
    }

    /// Number of `set` calls that reached the backend
    pub fn write_count(&self) -> usize {
        self.writes.lock().map(|w| *w).unwrap_or(0)
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries.lock().ok().and_then(|e| e.get(key).cloned())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| StoreError::Backend("memory store poisoned".to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| StoreError::Backend("memory store poisoned".to_string()))?;
        entries.insert(key.to_string(), value.to_string());
        if let Ok(mut w) = self.writes.lock() {
            *w += 1;
        }
        Ok(())
    }
}

enum WriteMsg {
    Write { key: String, value: String },
    Flush(mpsc::Sender<()>),
}

/// Coalesces rapid writes into one backend `set` per key after a quiet period
pub struct DebouncedWriter {
    tx: Option<mpsc::Sender<WriteMsg>>,
    handle: Option<JoinHandle<()>>,
}

impl DebouncedWriter {
    pub fn spawn(backend: Arc<dyn KeyValueStore>, quiet: Duration) -> Self {
        let (tx, rx) = mpsc::channel::<WriteMsg>();

        let handle = std::thread::Builder::new()
            .name("coolplay-persist".to_string())
            .spawn(move || {
                let mut pending: HashMap<String, String> = HashMap::new();

                loop {
                    let msg = if pending.is_empty() {
                        match rx.recv() {
                            Ok(msg) => msg,
                            Err(_) => break,
                        }
                    } else {
                        match rx.recv_timeout(quiet) {
                            Ok(msg) => msg,
                            Err(RecvTimeoutError::Timeout) => {
                                write_pending(backend.as_ref(), &mut pending);
                                continue;
                            }
                            Err(RecvTimeoutError::Disconnected) => break,
                        }
                    };

                    match msg {
                        WriteMsg::Write { key, value } => {
                            pending.insert(key, value);
                        }
                        WriteMsg::Flush(ack) => {
                            write_pending(backend.as_ref(), &mut pending);
                            let _ = ack.send(());
                        }
                    }
                }

                // Sender dropped: graceful shutdown, write whatever is left
                write_pending(backend.as_ref(), &mut pending);
                debug!("Persist thread exiting");
            });

        let handle = match handle {
            Ok(h) => Some(h),
            Err(e) => {
                warn!("Failed to spawn persist thread, writes will be dropped: {}", e);
                None
            }
        };

        Self { tx: handle.as_ref().map(|_| tx), handle }
    }

    pub fn schedule(&self, key: &str, value: String) {
        if let Some(tx) = &self.tx {
            if tx.send(WriteMsg::Write { key: key.to_string(), value }).is_err() {
                warn!("Persist thread gone, dropping write for '{}'", key);
            }
        }
    }

    /// Block until every scheduled write has reached the backend
    pub fn flush(&self) {
        let Some(tx) = &self.tx else { return };
        let (ack_tx, ack_rx) = mpsc::channel();
        if tx.send(WriteMsg::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }
}

impl Drop for DebouncedWriter {
    fn drop(&mut self) {
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Persist thread panicked during shutdown");
            }
        }
    }
}

fn write_pending(backend: &dyn KeyValueStore, pending: &mut HashMap<String, String>) {
    for (key, value) in pending.drain() {
        match backend.set(&key, &value) {
            Ok(()) => debug!("Persisted '{}' ({} bytes)", key, value.len()),
            Err(e) => warn!("Failed to persist '{}': {}", key, e),
        }
    }
}
