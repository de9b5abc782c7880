//! Built-in command catalog for CoolPlay voice control
//!
//! This module contains the "data" side of voice control:
//! - The default multilingual utterance table
//! - Loading an override table from TOML
//! - Per-language lookup with fallback to English

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::command::{Command, CommandError, Intent, Slot};

/// Language used when an entry has no utterances for the requested one
pub const DEFAULT_LANGUAGE: &str = "en";

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read catalog file: {0}")]
    Io(#[from] std::io::Error),
    #[error("catalog parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("catalog entry {index}: {source}")]
    Entry {
        index: usize,
        #[source]
        source: CommandError,
    },
    #[error("catalog entry {index} has no utterances")]
    Empty { index: usize },
}

/// One built-in intent with its trigger phrases
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub command: Command,
    /// Language code -> trigger phrases
    pub utterances: BTreeMap<String, Vec<String>>,
}

impl CatalogEntry {
    /// Phrases for `language`, trying the base language ("es" for "es-ES")
    /// and then English before giving up
    pub fn utterances_for(&self, language: &str) -> &[String] {
        let base = language.split(['-', '_']).next().unwrap_or(language);
        [language, base, DEFAULT_LANGUAGE]
            .into_iter()
            .find_map(|lang| self.utterances.get(lang).filter(|u| !u.is_empty()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Borrowed view of an entry resolved for one language
#[derive(Debug, Clone, Copy)]
pub struct CatalogView<'a> {
    pub command: &'a Command,
    pub utterances: &'a [String],
}

#[derive(Debug, Deserialize)]
struct RawCatalog {
    #[serde(default)]
    commands: Vec<RawEntry>,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    intent: String,
    action: Option<String>,
    slot: Option<Slot>,
    #[serde(default)]
    utterances: BTreeMap<String, Vec<String>>,
}

/// Immutable table of built-in commands, in definition order
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every entry resolved for `language`; entries with nothing to say are skipped
    pub fn list_utterances(&self, language: &str) -> Vec<CatalogView<'_>> {
        self.entries
            .iter()
            .filter_map(|entry| {
                let utterances = entry.utterances_for(language);
                if utterances.is_empty() {
                    None
                } else {
                    Some(CatalogView { command: &entry.command, utterances })
                }
            })
            .collect()
    }

    /// First phrase that triggers `intent`/`action`, or the intent name
    pub fn describe(&self, intent: Intent, action: Option<&str>, language: &str) -> String {
        self.entries
            .iter()
            .filter(|e| e.command.intent == intent)
            .filter(|e| action.is_none() || e.command.action() == action)
            .find_map(|e| e.utterances_for(language).first().cloned())
            .unwrap_or_else(|| intent.to_string())
    }

    /// All commands with their example phrases (for help screens)
    pub fn commands_for(&self, language: &str) -> Vec<(Command, Vec<String>)> {
        self.entries
            .iter()
            .map(|e| (e.command.clone(), e.utterances_for(language).to_vec()))
            .collect()
    }

    /// Parse a catalog from TOML
    ///
    /// ```toml
    /// [[commands]]
    /// intent = "seek_control"
    /// action = "forward"
    /// slot = { seconds = 10 }
    /// utterances = { en = ["forward", "skip ahead"] }
    /// ```
    pub fn from_toml(contents: &str) -> Result<Self, CatalogError> {
        let raw: RawCatalog = toml::from_str(contents)?;
        let mut entries = Vec::with_capacity(raw.commands.len());

        for (index, item) in raw.commands.into_iter().enumerate() {
            let command = Command::parse(&item.intent, item.action.as_deref(), item.slot)
                .map_err(|source| CatalogError::Entry { index, source })?;
            if !command.is_supported() {
                warn!("Catalog entry #{} ({}) has no player action", index, command);
            }

            let utterances: BTreeMap<String, Vec<String>> = item
                .utterances
                .into_iter()
                .map(|(lang, phrases)| {
                    let phrases = phrases
                        .iter()
                        .map(|p| p.trim().to_lowercase())
                        .filter(|p| !p.is_empty())
                        .collect::<Vec<_>>();
                    (lang, phrases)
                })
                .filter(|(_, phrases)| !phrases.is_empty())
                .collect();

            if utterances.is_empty() {
                return Err(CatalogError::Empty { index });
            }
            entries.push(CatalogEntry { command, utterances });
        }

        debug!("Parsed catalog with {} entries", entries.len());
        Ok(Self { entries })
    }

    pub fn load_from(path: &Path) -> Result<Self, CatalogError> {
        let contents = fs::read_to_string(path)?;
        let catalog = Self::from_toml(&contents)?;
        info!("Loaded catalog override from {:?} ({} entries)", path, catalog.len());
        Ok(catalog)
    }

    /// The default table shipped with the player
    pub fn builtin() -> Self {
        use Intent::*;

        let entries = vec![
            // Playback
            entry(PlaybackControl, "play", None, &[
                ("en", &["play", "play video", "start playing", "resume"]),
                ("zh-TW", &["播放", "繼續播放"]),
                ("zh-CN", &["播放", "继续播放"]),
                ("es", &["reproducir", "play", "continuar"]),
                ("fr", &["lecture", "jouer", "reprendre"]),
                ("de", &["abspielen", "wiedergabe", "weiter"]),
                ("ja", &["再生", "再開"]),
            ]),
            entry(PlaybackControl, "pause", None, &[
                ("en", &["pause", "pause video", "hold on"]),
                ("zh-TW", &["暫停"]),
                ("zh-CN", &["暂停"]),
                ("es", &["pausa", "pausar"]),
                ("fr", &["pause"]),
                ("de", &["pause", "anhalten"]),
                ("ja", &["一時停止"]),
            ]),
            entry(PlaybackControl, "stop", None, &[
                ("en", &["stop", "stop video"]),
                ("zh-TW", &["停止"]),
                ("zh-CN", &["停止"]),
                ("es", &["detener", "parar"]),
                ("fr", &["arrêter", "stop"]),
                ("de", &["stopp", "stoppen"]),
                ("ja", &["停止"]),
            ]),
            entry(PlaybackControl, "restart", None, &[
                ("en", &["restart", "replay", "start over"]),
                ("zh-TW", &["重新播放"]),
                ("zh-CN", &["重新播放"]),
                ("es", &["reiniciar"]),
                ("fr", &["recommencer"]),
                ("de", &["neu starten"]),
                ("ja", &["最初から"]),
            ]),
            entry(PlaybackControl, "next", None, &[
                ("en", &["next video", "play next"]),
            ]),
            entry(PlaybackControl, "previous", None, &[
                ("en", &["previous video", "play previous"]),
            ]),
            // Seek
            entry(SeekControl, "forward", Some(Slot::seconds(10.0)), &[
                ("en", &["forward", "skip forward", "fast forward", "forward 10 seconds"]),
                ("zh-TW", &["快轉", "快進十秒"]),
                ("zh-CN", &["快进", "快进十秒"]),
                ("es", &["adelantar", "avanzar"]),
                ("fr", &["avancer"]),
                ("de", &["vorspulen"]),
                ("ja", &["早送り"]),
            ]),
            entry(SeekControl, "forward", Some(Slot::seconds(20.0)), &[
                ("en", &["forward 20 seconds", "skip 20 seconds"]),
            ]),
            entry(SeekControl, "forward", Some(Slot::seconds(30.0)), &[
                ("en", &["forward 30 seconds", "skip 30 seconds"]),
            ]),
            entry(SeekControl, "rewind", Some(Slot::seconds(10.0)), &[
                ("en", &["rewind", "go back", "back 10 seconds", "rewind 10 seconds"]),
                ("zh-TW", &["倒轉", "倒退十秒"]),
                ("zh-CN", &["后退", "倒退十秒"]),
                ("es", &["retroceder", "rebobinar"]),
                ("fr", &["reculer", "rembobiner"]),
                ("de", &["zurückspulen"]),
                ("ja", &["巻き戻し"]),
            ]),
            entry(SeekControl, "rewind", Some(Slot::seconds(20.0)), &[
                ("en", &["rewind 20 seconds", "back 20 seconds"]),
            ]),
            entry(SeekControl, "rewind", Some(Slot::seconds(30.0)), &[
                ("en", &["rewind 30 seconds", "back 30 seconds"]),
            ]),
            // Volume
            entry(VolumeControl, "up", None, &[
                ("en", &["volume up", "louder", "turn it up"]),
                ("zh-TW", &["大聲一點", "音量調高"]),
                ("zh-CN", &["大声一点", "音量调高"]),
                ("es", &["subir volumen", "más alto"]),
                ("fr", &["plus fort", "monter le son"]),
                ("de", &["lauter"]),
                ("ja", &["音量を上げて"]),
            ]),
            entry(VolumeControl, "down", None, &[
                ("en", &["volume down", "quieter", "turn it down"]),
                ("zh-TW", &["小聲一點", "音量調低"]),
                ("zh-CN", &["小声一点", "音量调低"]),
                ("es", &["bajar volumen", "más bajo"]),
                ("fr", &["moins fort", "baisser le son"]),
                ("de", &["leiser"]),
                ("ja", &["音量を下げて"]),
            ]),
            entry(VolumeControl, "max", None, &[
                ("en", &["max volume", "volume max", "full volume"]),
            ]),
            entry(VolumeControl, "half", None, &[
                ("en", &["half volume", "volume half"]),
            ]),
            entry(VolumeControl, "mute", None, &[
                ("en", &["mute", "silence"]),
                ("zh-TW", &["靜音"]),
                ("zh-CN", &["静音"]),
                ("es", &["silenciar"]),
                ("fr", &["couper le son", "muet"]),
                ("de", &["stumm"]),
                ("ja", &["ミュート"]),
            ]),
            entry(VolumeControl, "unmute", None, &[
                ("en", &["unmute", "sound on"]),
                ("zh-TW", &["取消靜音"]),
                ("zh-CN", &["取消静音"]),
                ("es", &["activar sonido"]),
                ("fr", &["remettre le son"]),
                ("de", &["ton an"]),
                ("ja", &["ミュート解除"]),
            ]),
            // Speed
            entry(SpeedControl, "set", Some(Slot::speed(0.5)), &[
                ("en", &["half speed", "slow down", "speed 0.5"]),
                ("zh-TW", &["慢速播放"]),
                ("zh-CN", &["慢速播放"]),
            ]),
            entry(SpeedControl, "normal", None, &[
                ("en", &["normal speed", "speed 1"]),
                ("zh-TW", &["正常速度"]),
                ("zh-CN", &["正常速度"]),
            ]),
            entry(SpeedControl, "set", Some(Slot::speed(1.25)), &[
                ("en", &["speed 1.25"]),
            ]),
            entry(SpeedControl, "set", Some(Slot::speed(1.5)), &[
                ("en", &["speed 1.5", "one and a half speed", "speed up"]),
            ]),
            entry(SpeedControl, "set", Some(Slot::speed(2.0)), &[
                ("en", &["double speed", "speed 2"]),
                ("zh-TW", &["兩倍速"]),
                ("zh-CN", &["两倍速"]),
            ]),
            // Fullscreen
            entry(FullscreenControl, "enter", None, &[
                ("en", &["fullscreen", "full screen", "enter fullscreen"]),
                ("zh-TW", &["全螢幕"]),
                ("zh-CN", &["全屏"]),
                ("es", &["pantalla completa"]),
                ("fr", &["plein écran"]),
                ("de", &["vollbild"]),
                ("ja", &["全画面"]),
            ]),
            entry(FullscreenControl, "exit", None, &[
                ("en", &["exit fullscreen", "exit full screen", "leave fullscreen"]),
                ("zh-TW", &["退出全螢幕"]),
                ("zh-CN", &["退出全屏"]),
                ("es", &["salir de pantalla completa"]),
                ("fr", &["quitter le plein écran"]),
                ("de", &["vollbild beenden"]),
                ("ja", &["全画面終了"]),
            ]),
        ];

        Self { entries }
    }
}

fn entry(intent: Intent, action: &str, slot: Option<Slot>, phrases: &[(&str, &[&str])]) -> CatalogEntry {
    let utterances = phrases
        .iter()
        .map(|(lang, list)| (lang.to_string(), list.iter().map(|p| p.to_string()).collect()))
        .collect();
    CatalogEntry {
        command: Command { intent, action: Some(action.to_string()), slot },
        utterances,
    }
}
