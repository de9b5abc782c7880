use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use coolplay_voice::{
    Catalog, Command, CommandMatch, CustomCommandStore, Dispatcher, ExecutorConfig, Intent, KeyValueStore, MatchSource,
    Outcome, PlayerCommandExecutor, SimulatedPlayer, StoreError, Utterance, VoicePipeline,
};

type SharedExecutor = Arc<Mutex<PlayerCommandExecutor<SimulatedPlayer>>>;

fn wired(catalog: Catalog, store: CustomCommandStore) -> (VoicePipeline, SharedExecutor) {
    let dispatcher = Dispatcher::new();
    let executor: SharedExecutor = Arc::new(Mutex::new(PlayerCommandExecutor::new(
        SimulatedPlayer::new(120.0),
        ExecutorConfig::default(),
    )));
    let _sub = dispatcher.subscribe_shared(executor.clone());
    (VoicePipeline::new(catalog, store, dispatcher), executor)
}

fn forward_only_catalog() -> Catalog {
    Catalog::from_toml(
        r#"
        [[commands]]
        intent = "seek_control"
        action = "forward"
        slot = { seconds = 10 }
        utterances = { en = ["forward"] }
        "#,
    )
    .unwrap()
}

#[test]
fn play_is_matched_accepted_and_executed() {
    let (mut pipeline, executor) = wired(Catalog::builtin(), CustomCommandStore::in_memory());

    let outcome = pipeline.process(&Utterance::new("play", 0.9, "en"));

    let Outcome::Dispatched(m) = outcome else { panic!("expected dispatch, got {outcome:?}") };
    assert_eq!(m.command.intent, Intent::PlaybackControl);
    assert_eq!(m.command.action(), Some("play"));
    assert_eq!(m.source, MatchSource::Builtin);
    assert!((m.confidence - 0.9).abs() < 1e-9);
    assert!(executor.lock().unwrap().player().playing);
}

#[test]
fn partial_coverage_times_speech_confidence_is_rejected() {
    let (mut pipeline, executor) = wired(forward_only_catalog(), CustomCommandStore::in_memory());

    // "forward" covers 7 of 12 characters; 0.583 x 0.8 = 0.467
    let outcome = pipeline.process(&Utterance::new("forward then", 0.8, "en"));

    match outcome {
        Outcome::LowConfidence { combined, threshold } => {
            assert!((combined - 7.0 / 12.0 * 0.8).abs() < 1e-9);
            assert_eq!(threshold, 0.5);
        }
        other => panic!("expected low confidence, got {other:?}"),
    }
    assert_eq!(pipeline.status(), Some("Command confidence too low, please try again"));
    assert_eq!(executor.lock().unwrap().player().current_time, 0.0);
}

#[test]
fn custom_phrase_inside_longer_utterance_is_dispatched() {
    let mut store = CustomCommandStore::in_memory();
    store
        .add("dim lights", Command::new(Intent::FullscreenControl, Some("exit"), None).unwrap())
        .unwrap();
    let (mut pipeline, executor) = wired(Catalog::builtin(), store);
    executor.lock().unwrap().player_mut().fullscreen = true;

    let outcome = pipeline.process(&Utterance::new("please dim lights now", 0.95, "en"));

    let Outcome::Dispatched(m) = outcome else { panic!("expected dispatch, got {outcome:?}") };
    assert_eq!(m.source, MatchSource::Custom);
    assert_eq!(m.matched_utterance, "dim lights");
    assert!(!executor.lock().unwrap().player().fullscreen);
}

#[test]
fn custom_match_still_needs_speech_confidence() {
    let mut store = CustomCommandStore::in_memory();
    store
        .add("dim lights", Command::new(Intent::FullscreenControl, Some("exit"), None).unwrap())
        .unwrap();
    let dispatcher = Dispatcher::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let h = hits.clone();
    let _sub = dispatcher.subscribe(move |_: &CommandMatch| -> anyhow::Result<()> {
        h.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    let mut pipeline = VoicePipeline::new(Catalog::builtin(), store, dispatcher);

    match pipeline.process_text("dim lights", 0.4) {
        Outcome::LowConfidence { combined, threshold } => {
            assert!((combined - 0.4).abs() < 1e-9);
            assert_eq!(threshold, 0.5);
        }
        other => panic!("expected low confidence, got {other:?}"),
    }
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    let Outcome::Dispatched(m) = pipeline.process_text("dim lights", 0.95) else { panic!("expected dispatch") };
    assert_eq!(m.source, MatchSource::Custom);
    assert!((m.confidence - 0.95).abs() < 1e-9);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn disabled_custom_command_falls_through_to_not_recognized() {
    let mut store = CustomCommandStore::in_memory();
    let cmd = store
        .add("dim lights", Command::new(Intent::FullscreenControl, Some("exit"), None).unwrap())
        .unwrap();
    store.toggle(&cmd.id).unwrap();
    let (mut pipeline, _) = wired(Catalog::builtin(), store);

    assert_eq!(pipeline.process_text("dim lights", 1.0), Outcome::NotRecognized);
    assert_eq!(pipeline.status(), Some("Command not recognized"));
}

#[test]
fn deleted_custom_command_falls_through_to_catalog() {
    let mut store = CustomCommandStore::in_memory();
    let cmd = store
        .add("mute", Command::new(Intent::FullscreenControl, Some("enter"), None).unwrap())
        .unwrap();
    let (mut pipeline, _) = wired(Catalog::builtin(), store);

    let Outcome::Dispatched(m) = pipeline.process_text("mute", 1.0) else { panic!("expected dispatch") };
    assert_eq!(m.source, MatchSource::Custom);

    assert!(pipeline.store_mut().delete(&cmd.id));
    let Outcome::Dispatched(m) = pipeline.process_text("mute", 1.0) else { panic!("expected dispatch") };
    assert_eq!(m.source, MatchSource::Builtin);
    assert_eq!(m.command.intent, Intent::VolumeControl);
}

struct BrokenStorage;

impl KeyValueStore for BrokenStorage {
    fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Err(StoreError::Backend("disk on fire".to_string()))
    }

    fn set(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
        Err(StoreError::Backend("disk on fire".to_string()))
    }
}

#[test]
fn failing_storage_leaves_catalog_matching_intact() {
    let mut store = CustomCommandStore::new(Some(Arc::new(BrokenStorage)), Duration::from_millis(5));
    assert!(store.is_loading());
    store.load();
    assert!(!store.is_loading());
    assert!(store.is_empty());

    let (mut pipeline, executor) = wired(Catalog::builtin(), store);
    assert!(pipeline.process_text("pause", 0.9).is_dispatched());
    assert!(!executor.lock().unwrap().player().playing);

    // Writes fail quietly too
    pipeline
        .store_mut()
        .add("hush", Command::new(Intent::VolumeControl, Some("mute"), None).unwrap())
        .unwrap();
    pipeline.shutdown();
    assert!(pipeline.process_text("hush", 0.9).is_dispatched());
}

#[test]
fn exact_phrases_always_score_full_confidence() {
    let catalog = Catalog::builtin();
    let mut store = CustomCommandStore::in_memory();
    store.add("lights out", Command::new(Intent::PlaybackControl, Some("stop"), None).unwrap()).unwrap();
    let (mut pipeline, _) = wired(catalog.clone(), store);
    pipeline.set_threshold(0.0);

    let mut phrases: Vec<String> = catalog
        .list_utterances("en")
        .iter()
        .flat_map(|v| v.utterances.iter().cloned())
        .collect();
    phrases.push("lights out".to_string());

    for phrase in phrases {
        let Outcome::Dispatched(m) = pipeline.process_text(&phrase, 1.0) else {
            panic!("'{phrase}' did not dispatch");
        };
        assert_eq!(m.confidence, 1.0, "{phrase}");
        assert_eq!(m.matched_utterance, phrase);
    }
}

#[test]
fn every_listener_runs_even_when_one_fails() {
    let dispatcher = Dispatcher::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let _bad = dispatcher.subscribe(|_: &CommandMatch| -> anyhow::Result<()> { anyhow::bail!("ui crashed") });
    let h = hits.clone();
    let _good = dispatcher.subscribe(move |_: &CommandMatch| -> anyhow::Result<()> {
        h.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let mut pipeline = VoicePipeline::new(Catalog::builtin(), CustomCommandStore::in_memory(), dispatcher);
    assert!(pipeline.process_text("louder", 0.9).is_dispatched());
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn seek_never_leaves_the_timeline() {
    let (mut pipeline, executor) = wired(Catalog::builtin(), CustomCommandStore::in_memory());
    for _ in 0..20 {
        pipeline.process_text("skip 30 seconds", 1.0);
        let t = executor.lock().unwrap().player().current_time;
        assert!((0.0..=120.0).contains(&t));
    }
    assert_eq!(executor.lock().unwrap().player().current_time, 120.0);

    for _ in 0..20 {
        pipeline.process_text("rewind", 1.0);
    }
    assert_eq!(executor.lock().unwrap().player().current_time, 0.0);
}

#[test]
fn feedback_banner_clears_after_window() {
    let (mut pipeline, executor) = wired(Catalog::builtin(), CustomCommandStore::in_memory());
    let before = Instant::now();
    pipeline.process_text("mute", 1.0);
    let ex = executor.lock().unwrap();
    assert!(ex.player().muted);
    assert_eq!(ex.banner().current(Instant::now()), Some("Muted"));
    assert_eq!(ex.banner().current(before + Duration::from_secs(5)), None);
}

#[test]
fn legacy_intent_names_still_execute() {
    let catalog = Catalog::from_toml(
        r#"
        [[commands]]
        intent = "Speed150Intent"
        utterances = { en = ["faster please"] }
        "#,
    )
    .unwrap();
    let (mut pipeline, executor) = wired(catalog, CustomCommandStore::in_memory());
    assert!(pipeline.process_text("faster please", 1.0).is_dispatched());
    assert_eq!(executor.lock().unwrap().player().playback_rate, 1.5);
}
