//! Player command executor
//!
//! Maps a dispatched `(intent, action, slot)` onto the player primitives:
//! - playback: play, pause, stop (pause + seek 0), restart (seek 0 + play);
//!   next/previous only report that there is no playlist
//! - seek: forward/rewind by `slot.seconds` (default from config), clamped to [0, duration]
//! - volume: up/down by a step, set/max/half, mute/unmute; always clamped to [0, 1]
//! - speed: set from `slot.speed`, normal
//! - fullscreen: enter/exit
//!
//! Unknown pairs are logged and ignored. A failing primitive shows a
//! failure banner and never propagates to the dispatcher.

use anyhow::Result;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use crate::command::{Command, CommandMatch, Intent};
use crate::dispatch::CommandListener;
use crate::player::VideoPlayer;

pub const EXECUTION_FAILED: &str = "Command execution failed";

/// Feedback for actions the player has no primitive for
pub const NOT_AVAILABLE: &str = "Not available";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExecutorConfig {
    /// Seek distance when the command carries no seconds
    pub seek_seconds: f64,
    pub volume_step: f64,
    /// How long confirmation messages stay visible
    pub feedback: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            seek_seconds: 10.0,
            volume_step: 0.1,
            feedback: Duration::from_millis(2000),
        }
    }
}

/// Short-lived user-facing confirmation
#[derive(Debug, Clone, Default)]
pub struct FeedbackBanner {
    shown: Option<(String, Instant)>,
    ttl: Duration,
}

impl FeedbackBanner {
    pub fn new(ttl: Duration) -> Self {
        Self { shown: None, ttl }
    }

    pub fn show(&mut self, message: impl Into<String>, now: Instant) {
        self.shown = Some((message.into(), now));
    }

    /// The message, until `ttl` has elapsed since it was shown
    pub fn current(&self, now: Instant) -> Option<&str> {
        match &self.shown {
            Some((message, at)) if now.saturating_duration_since(*at) < self.ttl => Some(message),
            _ => None,
        }
    }
}

pub struct PlayerCommandExecutor<P: VideoPlayer> {
    player: P,
    config: ExecutorConfig,
    banner: FeedbackBanner,
}

impl<P: VideoPlayer> PlayerCommandExecutor<P> {
    pub fn new(player: P, config: ExecutorConfig) -> Self {
        Self { player, config, banner: FeedbackBanner::new(config.feedback) }
    }

    pub fn player(&self) -> &P {
        &self.player
    }

    pub fn player_mut(&mut self) -> &mut P {
        &mut self.player
    }

    pub fn banner(&self) -> &FeedbackBanner {
        &self.banner
    }

    /// Picks up new step sizes (e.g. after a config reload)
    pub fn set_config(&mut self, config: ExecutorConfig) {
        self.config = config;
        self.banner.ttl = config.feedback;
    }

    /// Execute and report; returns whether feedback was shown.
    /// Player errors are caught here and turned into a failure banner.
    pub fn handle(&mut self, command: &Command, now: Instant) -> bool {
        match self.execute(command) {
            Ok(Some(feedback)) => {
                info!("✅ {}", feedback);
                self.banner.show(feedback, now);
                true
            }
            Ok(None) => false,
            Err(e) => {
                error!("Failed to execute {}: {:#}", command, e);
                self.banner.show(EXECUTION_FAILED, now);
                false
            }
        }
    }

    /// Drive the player; `Ok(None)` means the command was not understood
    pub fn execute(&mut self, command: &Command) -> Result<Option<String>> {
        let slot = command.slot.unwrap_or_default();
        let Some(action) = command.action() else {
            debug!("Ignoring {} without an action", command.intent);
            return Ok(None);
        };

        let feedback = match (command.intent, action) {
            (Intent::PlaybackControl, "play") => {
                self.player.play()?;
                "Playing".to_string()
            }
            (Intent::PlaybackControl, "pause") => {
                self.player.pause()?;
                "Paused".to_string()
            }
            (Intent::PlaybackControl, "stop") => {
                self.player.pause()?;
                self.player.set_current_time(0.0)?;
                "Stopped".to_string()
            }
            (Intent::PlaybackControl, "restart") => {
                self.player.set_current_time(0.0)?;
                self.player.play()?;
                "Restarted".to_string()
            }
            (Intent::PlaybackControl, "next" | "previous") => {
                info!("No playlist, '{}' is not available", action);
                NOT_AVAILABLE.to_string()
            }

            (Intent::SeekControl, "forward") => {
                let secs = slot.seconds.unwrap_or(self.config.seek_seconds);
                self.seek_by(secs)?;
                format!("Forward {}s", secs)
            }
            (Intent::SeekControl, "rewind") => {
                let secs = slot.seconds.unwrap_or(self.config.seek_seconds);
                self.seek_by(-secs)?;
                format!("Rewind {}s", secs)
            }

            (Intent::VolumeControl, "up") => {
                let v = self.set_volume(self.player.volume() + self.config.volume_step)?;
                format!("Volume {}%", percent(v))
            }
            (Intent::VolumeControl, "down") => {
                let v = self.set_volume(self.player.volume() - self.config.volume_step)?;
                format!("Volume {}%", percent(v))
            }
            (Intent::VolumeControl, "set") => {
                let Some(level) = slot.level else {
                    debug!("volume_control/set without a level");
                    return Ok(None);
                };
                let v = self.set_volume(level)?;
                format!("Volume {}%", percent(v))
            }
            (Intent::VolumeControl, "max") => {
                self.set_volume(1.0)?;
                "Volume max".to_string()
            }
            (Intent::VolumeControl, "half") => {
                self.set_volume(0.5)?;
                "Volume 50%".to_string()
            }
            (Intent::VolumeControl, "mute") => {
                self.player.set_muted(true)?;
                "Muted".to_string()
            }
            (Intent::VolumeControl, "unmute") => {
                self.player.set_muted(false)?;
                "Unmuted".to_string()
            }

            (Intent::SpeedControl, "set") => {
                let Some(speed) = slot.speed.filter(|s| s.is_finite() && *s > 0.0) else {
                    debug!("speed_control/set without a usable speed");
                    return Ok(None);
                };
                self.player.set_playback_rate(speed)?;
                format!("Speed: {}x", speed)
            }
            (Intent::SpeedControl, "normal") => {
                self.player.set_playback_rate(1.0)?;
                "Speed: 1x".to_string()
            }

            (Intent::FullscreenControl, "enter") => {
                self.player.enter_fullscreen()?;
                "Fullscreen".to_string()
            }
            (Intent::FullscreenControl, "exit") => {
                self.player.exit_fullscreen()?;
                "Exited fullscreen".to_string()
            }

            (intent, action) => {
                info!("Unknown action '{}' for {}, ignoring", action, intent);
                return Ok(None);
            }
        };

        Ok(Some(feedback))
    }

    fn seek_by(&mut self, delta: f64) -> Result<()> {
        let duration = self.player.duration().max(0.0);
        let target = (self.player.current_time() + delta).clamp(0.0, duration);
        self.player.set_current_time(target)
    }

    fn set_volume(&mut self, volume: f64) -> Result<f64> {
        let v = if volume.is_finite() { volume.clamp(0.0, 1.0) } else { self.player.volume() };
        self.player.set_volume(v)?;
        Ok(v)
    }
}

fn percent(volume: f64) -> i64 {
    (volume * 100.0).round() as i64
}

impl<P: VideoPlayer> CommandListener for PlayerCommandExecutor<P> {
    fn on_command(&mut self, command: &CommandMatch) -> Result<()> {
        self.handle(&command.command, Instant::now());
        Ok(())
    }
}
