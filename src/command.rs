//! Command model for CoolPlay voice control
//!
//! This module holds the typed payload that flows from the matcher to
//! every dispatch listener:
//! - `Intent`: the closed set of voice intents
//! - `Slot`: structured parameters (seek seconds, target speed, volume level)
//! - `Command`: intent + optional action + optional slot
//! - `CommandMatch`: a command plus provenance and confidence

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CommandError {
    #[error("unknown intent: {0}")]
    UnknownIntent(String),
    #[error("invalid slot value for {field}: {value}")]
    InvalidSlot { field: &'static str, value: f64 },
}

/// Abstract category of voice command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    PlaybackControl,
    SeekControl,
    VolumeControl,
    SpeedControl,
    FullscreenControl,
}

impl Intent {
    pub const ALL: [Intent; 5] = [
        Intent::PlaybackControl,
        Intent::SeekControl,
        Intent::VolumeControl,
        Intent::SpeedControl,
        Intent::FullscreenControl,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::PlaybackControl => "playback_control",
            Intent::SeekControl => "seek_control",
            Intent::VolumeControl => "volume_control",
            Intent::SpeedControl => "speed_control",
            Intent::FullscreenControl => "fullscreen_control",
        }
    }

    /// Actions the executor knows for this intent
    pub fn actions(&self) -> &'static [&'static str] {
        match self {
            Intent::PlaybackControl => &["play", "pause", "stop", "next", "previous", "restart"],
            Intent::SeekControl => &["forward", "rewind"],
            Intent::VolumeControl => &["up", "down", "set", "max", "half", "mute", "unmute"],
            Intent::SpeedControl => &["set", "normal"],
            Intent::FullscreenControl => &["enter", "exit"],
        }
    }

    pub fn supports(&self, action: &str) -> bool {
        self.actions().contains(&action)
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Intent {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "playback_control" => Ok(Intent::PlaybackControl),
            "seek_control" => Ok(Intent::SeekControl),
            "volume_control" => Ok(Intent::VolumeControl),
            "speed_control" => Ok(Intent::SpeedControl),
            "fullscreen_control" => Ok(Intent::FullscreenControl),
            _ => Err(CommandError::UnknownIntent(s.to_string())),
        }
    }
}

/// Structured parameters attached to a command
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Slot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<f64>,
}

impl Slot {
    pub fn seconds(seconds: f64) -> Self {
        Self { seconds: Some(seconds), ..Self::default() }
    }

    pub fn speed(speed: f64) -> Self {
        Self { speed: Some(speed), ..Self::default() }
    }

    pub fn level(level: f64) -> Self {
        Self { level: Some(level), ..Self::default() }
    }

    pub fn is_empty(&self) -> bool {
        self.seconds.is_none() && self.speed.is_none() && self.level.is_none()
    }

    /// Reject values the player could never honour (NaN, negative, zero speed)
    pub fn validate(&self) -> Result<(), CommandError> {
        if let Some(s) = self.seconds {
            if !s.is_finite() || s < 0.0 {
                return Err(CommandError::InvalidSlot { field: "seconds", value: s });
            }
        }
        if let Some(s) = self.speed {
            if !s.is_finite() || s <= 0.0 {
                return Err(CommandError::InvalidSlot { field: "speed", value: s });
            }
        }
        if let Some(l) = self.level {
            if !l.is_finite() {
                return Err(CommandError::InvalidSlot { field: "level", value: l });
            }
        }
        Ok(())
    }
}

/// The dispatched payload: what the user asked the player to do
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub intent: Intent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<Slot>,
}

impl Command {
    /// Build a command, normalizing the action and validating the slot
    pub fn new(intent: Intent, action: Option<&str>, slot: Option<Slot>) -> Result<Self, CommandError> {
        if let Some(ref slot) = slot {
            slot.validate()?;
        }
        let action = action
            .map(|a| a.trim().to_lowercase())
            .filter(|a| !a.is_empty());
        Ok(Self { intent, action, slot: slot.filter(|s| !s.is_empty()) })
    }

    /// Parse an intent name as it appears in storage or config files.
    /// Legacy `*Intent` names carry their own action and slot.
    pub fn parse(intent: &str, action: Option<&str>, slot: Option<Slot>) -> Result<Self, CommandError> {
        let name = intent;
        let intent = match name.parse::<Intent>() {
            Ok(i) => i,
            Err(e) => {
                let legacy = Self::from_legacy(name).ok_or(e)?;
                if action.is_some() || slot.is_some() {
                    warn!("{} maps to {}; ignoring the given action/slot", name.trim(), legacy);
                }
                return Ok(legacy);
            }
        };
        Self::new(intent, action, slot)
    }

    /// Map the flat `*Intent` names used by older player builds
    pub fn from_legacy(name: &str) -> Option<Self> {
        let (intent, action, slot) = match name.trim() {
            "PlayVideoIntent" => (Intent::PlaybackControl, "play", None),
            "PauseVideoIntent" => (Intent::PlaybackControl, "pause", None),
            "StopVideoIntent" => (Intent::PlaybackControl, "stop", None),
            "ReplayVideoIntent" => (Intent::PlaybackControl, "restart", None),
            "Forward10Intent" => (Intent::SeekControl, "forward", Some(Slot::seconds(10.0))),
            "Forward20Intent" => (Intent::SeekControl, "forward", Some(Slot::seconds(20.0))),
            "Forward30Intent" => (Intent::SeekControl, "forward", Some(Slot::seconds(30.0))),
            "Rewind10Intent" => (Intent::SeekControl, "rewind", Some(Slot::seconds(10.0))),
            "Rewind20Intent" => (Intent::SeekControl, "rewind", Some(Slot::seconds(20.0))),
            "Rewind30Intent" => (Intent::SeekControl, "rewind", Some(Slot::seconds(30.0))),
            "MuteIntent" => (Intent::VolumeControl, "mute", None),
            "UnmuteIntent" => (Intent::VolumeControl, "unmute", None),
            "VolumeMaxIntent" => (Intent::VolumeControl, "max", None),
            "VolumeHalfIntent" => (Intent::VolumeControl, "half", None),
            "VolumeUpIntent" => (Intent::VolumeControl, "up", None),
            "VolumeDownIntent" => (Intent::VolumeControl, "down", None),
            "EnterFullscreenIntent" => (Intent::FullscreenControl, "enter", None),
            "ExitFullscreenIntent" => (Intent::FullscreenControl, "exit", None),
            "SpeedHalfIntent" => (Intent::SpeedControl, "set", Some(Slot::speed(0.5))),
            "SpeedNormalIntent" => (Intent::SpeedControl, "normal", None),
            "Speed125Intent" => (Intent::SpeedControl, "set", Some(Slot::speed(1.25))),
            "Speed150Intent" => (Intent::SpeedControl, "set", Some(Slot::speed(1.5))),
            "Speed200Intent" => (Intent::SpeedControl, "set", Some(Slot::speed(2.0))),
            _ => return None,
        };
        Some(Self { intent, action: Some(action.to_string()), slot })
    }

    pub fn action(&self) -> Option<&str> {
        self.action.as_deref()
    }

    /// Whether the executor has a handler for this intent/action pair
    pub fn is_supported(&self) -> bool {
        self.action().is_some_and(|a| self.intent.supports(a))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.action {
            Some(action) => write!(f, "{}/{}", self.intent, action),
            None => write!(f, "{}", self.intent),
        }
    }
}

/// Where a match came from (diagnostics only)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    Builtin,
    Custom,
}

impl fmt::Display for MatchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchSource::Builtin => f.write_str("builtin"),
            MatchSource::Custom => f.write_str("custom"),
        }
    }
}

/// One recognition event resolved to a command
#[derive(Debug, Clone, PartialEq)]
pub struct CommandMatch {
    pub command: Command,
    pub source: MatchSource,
    /// Always within [0, 1]
    pub confidence: f64,
    pub matched_utterance: String,
}
