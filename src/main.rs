use anyhow::Result;
use arc_swap::ArcSwap;
use std::io::BufRead;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use coolplay_voice::config::{self, Config};
use coolplay_voice::session::recognizer_locale;
use coolplay_voice::{
    Command, CustomCommandStore, Dispatcher, FileStore, KeyValueStore, ListeningSession, Outcome,
    PlayerCommandExecutor, RecognitionFailure, SimulatedPlayer, Utterance, VoicePipeline,
};

/// Speech confidence when a line has no `@confidence` suffix
const DEFAULT_SPEECH_CONFIDENCE: f64 = 0.9;

type SharedExecutor = Arc<Mutex<PlayerCommandExecutor<SimulatedPlayer>>>;

fn main() -> Result<()> {
    let (config, config_path) = Config::load();

    // RUST_LOG wins; otherwise quiet mode only shows warnings
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_filter())))
        .with_writer(std::io::stderr)
        .init();

    info!(
        "CoolPlay voice control (language: {}, locale: {}, threshold: {})",
        config.language,
        recognizer_locale(&config.language),
        config.confidence_threshold
    );
    if !config.aliases.is_empty() {
        info!("Aliases: {} loaded", config.aliases.len());
    }

    let storage: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(config.storage_dir()));
    let store = CustomCommandStore::open(Some(storage), config.persist_debounce());

    let dispatcher = Dispatcher::new();
    let executor: SharedExecutor = Arc::new(Mutex::new(PlayerCommandExecutor::new(
        SimulatedPlayer::default(),
        config.executor_config(),
    )));
    let _player_sub = dispatcher.subscribe_shared(executor.clone());

    let mut pipeline = VoicePipeline::new(config.load_catalog(), store, dispatcher).with_config(&config);
    let mut session = ListeningSession::new(config.listen_timeout());

    let config = Arc::new(ArcSwap::from_pointee(config));
    if let Some(path) = config_path {
        if let Err(e) = config::watch(config.clone(), path) {
            warn!("Config hot-reload disabled: {:#}", e);
        }
    }

    // Stdin stands in for the recognizer's final results
    let (line_tx, line_rx) = mpsc::channel::<String>();
    std::thread::Builder::new().name("coolplay-stdin".to_string()).spawn(move || {
        for line in std::io::stdin().lock().lines().map_while(|l| l.ok()) {
            if line_tx.send(line).is_err() {
                break;
            }
        }
    })?;

    print_help();
    let mut applied = config.load_full();

    loop {
        let line = match line_rx.recv_timeout(Duration::from_millis(250)) {
            Ok(line) => Some(line),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        // Pick up hot-reloaded settings between utterances
        let current = config.load_full();
        if !Arc::ptr_eq(&current, &applied) {
            pipeline.apply_config(&current);
            session.set_timeout(current.listen_timeout());
            if let Ok(mut ex) = executor.lock() {
                ex.set_config(current.executor_config());
            }
            applied = current;
        }

        if session.expire(Instant::now()) {
            println!("⏰ Stopped listening");
        }

        let Some(line) = line else { continue };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix(':') {
            if !run_meta(rest, &mut pipeline, &mut session, &executor) {
                break;
            }
            continue;
        }

        let language = pipeline.language().to_string();
        let Some(utterance) = take_utterance(&mut session, line, &language) else {
            println!("Not listening (type :listen first)");
            continue;
        };

        match pipeline.process(&utterance) {
            Outcome::Dispatched(m) => {
                let banner = executor
                    .lock()
                    .ok()
                    .and_then(|ex| ex.banner().current(Instant::now()).map(str::to_string));
                println!("✅ {} ({}, {:.2}) {}", m.command, m.source, m.confidence, banner.unwrap_or_default());
            }
            Outcome::NotRecognized | Outcome::LowConfidence { .. } => {
                println!("❌ {}", pipeline.status().unwrap_or_default());
            }
        }
    }

    pipeline.shutdown();
    Ok(())
}

/// Handle a `:command`; returns false to quit
fn run_meta(input: &str, pipeline: &mut VoicePipeline, session: &mut ListeningSession, executor: &SharedExecutor) -> bool {
    let (cmd, arg) = match input.split_once(' ') {
        Some((c, a)) => (c, a.trim()),
        None => (input, ""),
    };

    match cmd {
        "quit" | "q" => return false,
        "help" => print_help(),
        "list" => {
            if pipeline.store().is_empty() {
                println!("(no custom commands)");
            }
            for c in pipeline.store().commands() {
                let mark = if c.enabled { "on " } else { "off" };
                println!("[{}] {}  \"{}\" => {}", mark, c.id, c.text, c.command());
            }
        }
        "add" => match parse_add(arg) {
            Ok((phrase, command)) => match pipeline.store_mut().add(&phrase, command) {
                Ok(c) => println!("Added {} \"{}\"", c.id, c.text),
                Err(e) => println!("Error: {}", e),
            },
            Err(e) => println!("Error: {}", e),
        },
        "toggle" => match pipeline.store_mut().toggle(arg) {
            Ok(enabled) => println!("{} is now {}", arg, if enabled { "enabled" } else { "disabled" }),
            Err(e) => println!("Error: {}", e),
        },
        "delete" => {
            if pipeline.store_mut().delete(arg) {
                println!("Deleted {}", arg);
            } else {
                println!("No custom command {}", arg);
            }
        }
        "commands" => {
            for (command, phrases) in pipeline.catalog().commands_for(pipeline.language()) {
                println!("{:<28} {}", command.to_string(), phrases.join(", "));
            }
        }
        "listen" => {
            if session.start(Instant::now()) {
                println!("Listening (next line is the transcript)");
            }
        }
        "cancel" => session.cancel(),
        "fail" => println!("❌ {}", session.fail(RecognitionFailure::from_code(arg))),
        "state" => {
            if let Ok(ex) = executor.lock() {
                let p = ex.player();
                println!(
                    "playing={} time={:.0}/{:.0}s volume={:.2} muted={} rate={}x fullscreen={}",
                    p.playing, p.current_time, p.duration, p.volume, p.muted, p.playback_rate, p.fullscreen
                );
            }
            println!("listening={} status={}", session.is_listening(), pipeline.status().unwrap_or("-"));
        }
        other => println!("Unknown command ':{}' (try :help)", other),
    }
    true
}

/// `<phrase> => <intent>[/<action>]`
fn parse_add(arg: &str) -> Result<(String, Command)> {
    let Some((phrase, target)) = arg.split_once("=>") else {
        anyhow::bail!("usage: :add <phrase> => <intent>[/<action>]");
    };
    let (intent, action) = match target.trim().split_once('/') {
        Some((i, a)) => (i, Some(a)),
        None => (target.trim(), None),
    };
    let command = Command::parse(intent, action, None)?;
    if !command.is_supported() {
        println!("Note: {} does nothing; {} actions are {}", command, command.intent, command.intent.actions().join(", "));
    }
    Ok((phrase.trim().to_string(), command))
}

/// A typed line is a final transcript only while the session is listening
fn take_utterance(session: &mut ListeningSession, line: &str, language: &str) -> Option<Utterance> {
    let (text, confidence) = split_confidence(line);
    session.finish(text, confidence, language)
}

/// Split a trailing `@0.8` confidence off the transcript
fn split_confidence(line: &str) -> (&str, f64) {
    if let Some((text, conf)) = line.rsplit_once('@') {
        if let Ok(c) = conf.trim().parse::<f64>() {
            return (text.trim(), c);
        }
    }
    (line, DEFAULT_SPEECH_CONFIDENCE)
}

fn print_help() {
    println!(
        r#"
:listen, then say something by typing it, optionally with a speech confidence:  play video @0.8

  :add <phrase> => <intent>[/<action>]   e.g. :add dim lights => fullscreen_control/exit
  :list                                  custom commands
  :toggle <id> / :delete <id>
  :commands                              built-in phrases for the current language
  :listen / :cancel / :fail <code>       drive the listening session
  :state                                 player and session state
  :quit
"#
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_only_count_while_listening() {
        let mut session = ListeningSession::new(Duration::from_secs(10));
        assert!(take_utterance(&mut session, "play", "en").is_none());

        let t0 = Instant::now();
        session.start(t0);
        assert_eq!(take_utterance(&mut session, "pause @0.7", "en"), Some(Utterance::new("pause", 0.7, "en")));
        // One transcript per session
        assert!(take_utterance(&mut session, "play", "en").is_none());

        session.start(t0);
        session.cancel();
        assert!(take_utterance(&mut session, "play", "en").is_none());

        session.start(t0);
        assert!(session.expire(t0 + Duration::from_secs(10)));
        assert!(take_utterance(&mut session, "play", "en").is_none());
    }

    #[test]
    fn confidence_suffix_is_optional() {
        assert_eq!(split_confidence("play video @0.8"), ("play video", 0.8));
        assert_eq!(split_confidence("mail me@home"), ("mail me@home", DEFAULT_SPEECH_CONFIDENCE));
    }

    #[test]
    fn add_parses_intent_and_action() {
        let (phrase, command) = parse_add("dim lights => fullscreen_control/exit").unwrap();
        assert_eq!(phrase, "dim lights");
        assert_eq!(command, Command::new(coolplay_voice::Intent::FullscreenControl, Some("exit"), None).unwrap());
        assert!(parse_add("no arrow").is_err());
    }
}
