//! User-authored voice commands
//!
//! The store exclusively owns the collection; the matcher only reads it.
//! Every mutation schedules a debounced write of the whole collection under a
//! single key. Loading never fails the caller: missing storage, I/O errors and
//! corrupt JSON all degrade to an empty collection so catalog matching keeps working.

use chrono::Utc;
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::command::{Command, Intent, Slot};
use crate::storage::{DebouncedWriter, KeyValueStore, StoreError};
use crate::text::{char_len, normalize};

pub const STORAGE_KEY: &str = "custom_voice_commands";

/// Bumped whenever the persisted record shape changes
pub const SCHEMA_VERSION: u32 = 1;

/// Where data written by a newer schema is copied before it is first overwritten
pub fn backup_key(version: u32) -> String {
    format!("{}.v{}.bak", STORAGE_KEY, version)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomCommand {
    pub id: String,
    /// Normalized (trimmed, lowercased) trigger phrase
    pub text: String,
    pub intent: Intent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<Slot>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Epoch milliseconds
    pub created_at: i64,
    pub updated_at: i64,
}

fn default_enabled() -> bool {
    true
}

impl CustomCommand {
    pub fn command(&self) -> Command {
        Command {
            intent: self.intent,
            action: self.action.clone(),
            slot: self.slot,
        }
    }

    fn triggers_on(&self, normalized_input: &str) -> bool {
        self.enabled
            && !self.text.is_empty()
            && (normalized_input == self.text || normalized_input.contains(&self.text))
    }
}

/// Fields to merge into an existing command; `None` leaves a field untouched
#[derive(Debug, Clone, Default)]
pub struct CustomCommandPatch {
    pub text: Option<String>,
    pub intent: Option<Intent>,
    pub action: Option<Option<String>>,
    pub slot: Option<Option<Slot>>,
    pub enabled: Option<bool>,
}

#[derive(Serialize)]
struct EnvelopeOut<'a> {
    version: u32,
    commands: &'a [CustomCommand],
}

#[derive(Deserialize)]
struct EnvelopeIn {
    version: u32,
    #[serde(default)]
    commands: Vec<Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Persisted {
    Versioned(EnvelopeIn),
    Legacy(Vec<Value>),
}

/// Serialize the collection in the versioned envelope
pub fn encode(commands: &[CustomCommand]) -> Result<String, StoreError> {
    Ok(serde_json::to_string(&EnvelopeOut { version: SCHEMA_VERSION, commands })?)
}

/// Parse persisted data; bare arrays are migrated, unreadable records skipped
pub fn decode(data: &str) -> Result<Vec<CustomCommand>, StoreError> {
    if data.trim().is_empty() {
        return Ok(Vec::new());
    }

    let records = match serde_json::from_str::<Persisted>(data)? {
        Persisted::Versioned(env) if env.version > SCHEMA_VERSION => {
            return Err(StoreError::UnsupportedVersion(env.version));
        }
        Persisted::Versioned(env) => env.commands,
        Persisted::Legacy(records) => {
            info!("Migrating {} unversioned custom commands", records.len());
            records
        }
    };

    let mut commands = Vec::with_capacity(records.len());
    for (i, record) in records.into_iter().enumerate() {
        match serde_json::from_value::<CustomCommand>(record) {
            Ok(mut cmd) => {
                cmd.text = normalize(&cmd.text);
                commands.push(cmd);
            }
            Err(e) => warn!("Skipping unreadable custom command #{}: {}", i, e),
        }
    }
    Ok(commands)
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Timestamp plus random suffix; unique without central coordination
fn generate_id(now_ms: i64) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("cmd_{}_{}", now_ms, suffix)
}

pub struct CustomCommandStore {
    commands: Vec<CustomCommand>,
    loading: bool,
    storage: Option<Arc<dyn KeyValueStore>>,
    writer: Option<DebouncedWriter>,
    /// Newer-schema payload seen at load, not yet backed up
    unsupported: Option<(u32, String)>,
}

impl CustomCommandStore {
    /// Create an empty store in the loading state; call `load` to populate it.
    /// `storage = None` models an unavailable backend: the store stays in memory only.
    pub fn new(storage: Option<Arc<dyn KeyValueStore>>, debounce: Duration) -> Self {
        let writer = storage
            .as_ref()
            .map(|backend| DebouncedWriter::spawn(backend.clone(), debounce));
        Self { commands: Vec::new(), loading: true, storage, writer, unsupported: None }
    }

    pub fn open(storage: Option<Arc<dyn KeyValueStore>>, debounce: Duration) -> Self {
        let mut store = Self::new(storage, debounce);
        store.load();
        store
    }

    /// Memory-only store (no persistence)
    pub fn in_memory() -> Self {
        let mut store = Self::new(None, Duration::ZERO);
        store.loading = false;
        store
    }

    /// Read the persisted collection, degrading to empty on any failure
    pub fn load(&mut self) {
        self.unsupported = None;
        self.commands = match self.read_persisted() {
            Ok(commands) => {
                info!("Loaded {} custom commands", commands.len());
                commands
            }
            Err(e) => {
                warn!("Custom commands unavailable, starting empty: {}", e);
                Vec::new()
            }
        };
        self.loading = false;
    }

    pub fn reload(&mut self) {
        self.flush();
        self.load();
    }

    fn read_persisted(&mut self) -> Result<Vec<CustomCommand>, StoreError> {
        let Some(storage) = &self.storage else {
            return Err(StoreError::Backend("no storage configured".to_string()));
        };
        let Some(data) = storage.get(STORAGE_KEY)? else {
            return Ok(Vec::new());
        };
        match decode(&data) {
            Err(StoreError::UnsupportedVersion(version)) => {
                self.unsupported = Some((version, data));
                Err(StoreError::UnsupportedVersion(version))
            }
            other => other,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn commands(&self) -> &[CustomCommand] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&CustomCommand> {
        self.commands.iter().find(|c| c.id == id)
    }

    pub fn add(&mut self, text: &str, command: Command) -> Result<CustomCommand, StoreError> {
        let text = normalize(text);
        if text.is_empty() {
            return Err(StoreError::EmptyTrigger);
        }

        if !command.is_supported() {
            warn!("'{}' -> {} has no player action and will be ignored when spoken", text, command);
        }

        let now = now_ms();
        let cmd = CustomCommand {
            id: generate_id(now),
            text,
            intent: command.intent,
            action: command.action,
            slot: command.slot,
            enabled: true,
            created_at: now,
            updated_at: now,
        };

        self.commands.push(cmd.clone());
        self.persist();
        info!("Added custom command '{}' -> {}", cmd.text, cmd.command());
        Ok(cmd)
    }

    pub fn update(&mut self, id: &str, patch: CustomCommandPatch) -> Result<(), StoreError> {
        let new_text = match patch.text {
            Some(ref t) => {
                let t = normalize(t);
                if t.is_empty() {
                    return Err(StoreError::EmptyTrigger);
                }
                Some(t)
            }
            None => None,
        };

        let cmd = self
            .commands
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        if let Some(text) = new_text {
            cmd.text = text;
        }
        if let Some(intent) = patch.intent {
            cmd.intent = intent;
        }
        if let Some(action) = patch.action {
            cmd.action = action.map(|a| a.trim().to_lowercase()).filter(|a| !a.is_empty());
        }
        if let Some(slot) = patch.slot {
            cmd.slot = slot;
        }
        if let Some(enabled) = patch.enabled {
            cmd.enabled = enabled;
        }
        cmd.updated_at = now_ms().max(cmd.updated_at);

        self.persist();
        debug!("Updated custom command {}", id);
        Ok(())
    }

    /// Remove by id; returns whether anything was removed
    pub fn delete(&mut self, id: &str) -> bool {
        let before = self.commands.len();
        self.commands.retain(|c| c.id != id);
        let removed = self.commands.len() != before;
        if removed {
            self.persist();
            info!("Deleted custom command {}", id);
        }
        removed
    }

    /// Flip `enabled`; returns the new state
    pub fn toggle(&mut self, id: &str) -> Result<bool, StoreError> {
        let enabled = !self
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?
            .enabled;
        self.update(id, CustomCommandPatch { enabled: Some(enabled), ..Default::default() })?;
        Ok(enabled)
    }

    pub fn clear_all(&mut self) {
        self.commands.clear();
        self.persist();
        info!("Cleared all custom commands");
    }

    /// First enabled command (storage order) whose trigger equals or is contained in `text`
    pub fn find_match(&self, text: &str) -> Option<&CustomCommand> {
        let input = normalize(text);
        self.commands.iter().find(|c| c.triggers_on(&input))
    }

    /// Like `find_match`, but the longest contained trigger wins; ties keep storage order
    pub fn find_longest_match(&self, text: &str) -> Option<&CustomCommand> {
        let input = normalize(text);
        let mut best: Option<&CustomCommand> = None;
        for cmd in self.commands.iter().filter(|c| c.triggers_on(&input)) {
            if best.is_none_or(|b| char_len(&cmd.text) > char_len(&b.text)) {
                best = Some(cmd);
            }
        }
        best
    }

    /// Block until pending writes reach storage
    pub fn flush(&self) {
        if let Some(writer) = &self.writer {
            writer.flush();
        }
    }

    fn persist(&mut self) {
        if self.writer.is_none() {
            return;
        }
        if !self.back_up_unsupported() {
            warn!("Not saving custom commands; stored data from a newer version would be lost");
            return;
        }
        let Some(writer) = &self.writer else { return };
        match encode(&self.commands) {
            Ok(json) => writer.schedule(STORAGE_KEY, json),
            Err(e) => warn!("Failed to encode custom commands: {}", e),
        }
    }

    /// Copy newer-schema data to its backup key; false while that has not succeeded
    fn back_up_unsupported(&mut self) -> bool {
        let Some((version, raw)) = &self.unsupported else { return true };
        let Some(storage) = &self.storage else { return false };
        let key = backup_key(*version);
        match storage.set(&key, raw) {
            Ok(()) => {
                warn!("Version {} custom commands copied to '{}'", version, key);
                self.unsupported = None;
                true
            }
            Err(e) => {
                warn!("Failed to back up version {} custom commands: {}", version, e);
                false
            }
        }
    }
}
