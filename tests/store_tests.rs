use std::fs;
use std::sync::Arc;
use std::time::Duration;

use coolplay_voice::custom::{STORAGE_KEY, backup_key, decode};
use coolplay_voice::{
    Command, CustomCommandPatch, CustomCommandStore, FileStore, Intent, KeyValueStore, MemoryStore, Slot, StoreError,
};

fn file_backed(dir: &std::path::Path) -> CustomCommandStore {
    CustomCommandStore::open(Some(Arc::new(FileStore::new(dir))), Duration::from_millis(20))
}

fn seek_forward(seconds: f64) -> Command {
    Command::new(Intent::SeekControl, Some("forward"), Some(Slot::seconds(seconds))).unwrap()
}

#[test]
fn commands_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();

    let id = {
        let mut store = file_backed(dir.path());
        assert!(store.is_empty());
        let cmd = store.add("Jump Ahead", seek_forward(30.0)).unwrap();
        store.add("hush", Command::new(Intent::VolumeControl, Some("mute"), None).unwrap()).unwrap();
        store.toggle(&cmd.id).unwrap();
        cmd.id
        // Dropped here: pending writes are flushed
    };

    let store = file_backed(dir.path());
    assert_eq!(store.len(), 2);
    let restored = store.get(&id).unwrap();
    assert_eq!(restored.text, "jump ahead");
    assert_eq!(restored.slot, Some(Slot::seconds(30.0)));
    assert!(!restored.enabled);
    assert!(store.find_match("jump ahead").is_none());
    assert!(store.find_match("hush now").is_some());
}

#[test]
fn persisted_file_is_a_versioned_envelope() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = file_backed(dir.path());
    store.add("hush", Command::new(Intent::VolumeControl, Some("mute"), None).unwrap()).unwrap();
    store.flush();

    let raw = fs::read_to_string(dir.path().join(format!("{}.json", STORAGE_KEY))).unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(json["version"], 1);
    assert_eq!(json["commands"][0]["intent"], "volume_control");
    assert_eq!(json["commands"][0]["enabled"], true);
}

#[test]
fn legacy_array_is_migrated_on_load() {
    let legacy = r#"[
        {"id":"cmd_1700000000000_abc123xyz","text":"Lights Out","intent":"fullscreen_control","action":"exit","enabled":true,"createdAt":1700000000000,"updatedAt":1700000000000},
        {"id":"cmd_1700000000001_zzz","text":"broken","intent":"teleport_control","createdAt":1,"updatedAt":1}
    ]"#;
    let backend = MemoryStore::with_value(STORAGE_KEY, legacy);
    let store = CustomCommandStore::open(Some(Arc::new(backend.clone())), Duration::from_millis(5));

    assert_eq!(store.len(), 1);
    assert_eq!(store.commands()[0].text, "lights out");
    assert_eq!(store.find_match("lights out").unwrap().command().action(), Some("exit"));
    // Nothing is rewritten until the first mutation
    assert_eq!(backend.write_count(), 0);
}

#[test]
fn corrupt_or_future_data_degrades_to_empty() {
    for data in ["not json at all", r#"{"version":2,"commands":[]}"#, r#"{"commands": 5}"#] {
        let backend = MemoryStore::with_value(STORAGE_KEY, data);
        let mut store = CustomCommandStore::open(Some(Arc::new(backend)), Duration::from_millis(5));
        assert!(!store.is_loading(), "{data}");
        assert!(store.is_empty(), "{data}");
        // Still usable afterwards
        store.add("hush", Command::new(Intent::VolumeControl, Some("mute"), None).unwrap()).unwrap();
        assert_eq!(store.len(), 1);
    }
    assert!(matches!(decode(r#"{"version":2,"commands":[]}"#), Err(StoreError::UnsupportedVersion(2))));
}

const NEWER_SCHEMA: &str = r#"{"version":2,"commands":[{"id":"cmd_1_keep","text":"keep me","intent":"playback_control","shape":"v2"}]}"#;

#[test]
fn newer_schema_data_is_backed_up_before_first_write() {
    let backend = MemoryStore::with_value(STORAGE_KEY, NEWER_SCHEMA);
    let mut store = CustomCommandStore::open(Some(Arc::new(backend.clone())), Duration::from_millis(5));
    assert!(store.is_empty());
    assert_eq!(backend.raw(&backup_key(2)), None);

    store.add("hush", Command::new(Intent::VolumeControl, Some("mute"), None).unwrap()).unwrap();
    store.flush();

    assert_eq!(backend.raw(&backup_key(2)).as_deref(), Some(NEWER_SCHEMA));
    let current = decode(&backend.raw(STORAGE_KEY).unwrap()).unwrap();
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].text, "hush");
}

/// Holds the main key but refuses every other write
struct NoBackups(MemoryStore);

impl KeyValueStore for NoBackups {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.0.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        if key == STORAGE_KEY {
            self.0.set(key, value)
        } else {
            Err(StoreError::Backend("read-only".to_string()))
        }
    }
}

#[test]
fn newer_schema_data_is_never_overwritten_without_a_backup() {
    let backend = MemoryStore::with_value(STORAGE_KEY, NEWER_SCHEMA);
    let mut store = CustomCommandStore::open(Some(Arc::new(NoBackups(backend.clone()))), Duration::from_millis(5));

    store.add("hush", Command::new(Intent::VolumeControl, Some("mute"), None).unwrap()).unwrap();
    store.flush();

    assert_eq!(backend.raw(STORAGE_KEY).as_deref(), Some(NEWER_SCHEMA));
    // The in-memory collection keeps working
    assert!(store.find_match("hush").is_some());
}

#[test]
fn rapid_mutations_coalesce_into_one_write() {
    let backend = MemoryStore::new();
    let mut store = CustomCommandStore::open(Some(Arc::new(backend.clone())), Duration::from_millis(200));
    for i in 0..25 {
        store.add(&format!("phrase {i}"), seek_forward(10.0)).unwrap();
    }
    store.flush();

    assert_eq!(backend.write_count(), 1);
    assert_eq!(decode(&backend.raw(STORAGE_KEY).unwrap()).unwrap().len(), 25);
}

#[test]
fn reload_picks_up_external_changes() {
    let backend = MemoryStore::new();
    let mut store = CustomCommandStore::open(Some(Arc::new(backend.clone())), Duration::from_millis(5));
    store.add("hush", Command::new(Intent::VolumeControl, Some("mute"), None).unwrap()).unwrap();
    store.flush();

    backend.set(STORAGE_KEY, r#"{"version":1,"commands":[]}"#).unwrap();
    store.reload();
    assert!(store.is_empty());
}

#[test]
fn update_and_toggle_report_unknown_ids() {
    let mut store = CustomCommandStore::in_memory();
    assert!(matches!(store.toggle("cmd_0_nope"), Err(StoreError::NotFound(id)) if id == "cmd_0_nope"));
    assert!(matches!(
        store.update("cmd_0_nope", CustomCommandPatch { enabled: Some(false), ..Default::default() }),
        Err(StoreError::NotFound(_))
    ));
    assert!(!store.delete("cmd_0_nope"));
}

#[test]
fn clear_all_persists_an_empty_collection() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut store = file_backed(dir.path());
        store.add("hush", Command::new(Intent::VolumeControl, Some("mute"), None).unwrap()).unwrap();
        store.clear_all();
    }
    assert!(file_backed(dir.path()).is_empty());
}

#[test]
fn ids_follow_timestamp_and_suffix_format() {
    let mut store = CustomCommandStore::in_memory();
    let cmd = store.add("hush", Command::new(Intent::VolumeControl, Some("mute"), None).unwrap()).unwrap();
    let parts: Vec<&str> = cmd.id.split('_').collect();
    assert_eq!(parts.len(), 3);
    assert_eq!(parts[0], "cmd");
    assert_eq!(parts[1].parse::<i64>().unwrap(), cmd.created_at);
    assert_eq!(parts[2].len(), 9);
    assert!(parts[2].chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
}
