//! Playback engine seam
//!
//! The executor only drives these primitives; it owns no playback state.

use anyhow::Result;

pub trait VideoPlayer: Send {
    fn play(&mut self) -> Result<()>;
    fn pause(&mut self) -> Result<()>;
    /// Seconds
    fn current_time(&self) -> f64;
    fn set_current_time(&mut self, seconds: f64) -> Result<()>;
    fn duration(&self) -> f64;
    /// 0.0 to 1.0
    fn volume(&self) -> f64;
    fn set_volume(&mut self, volume: f64) -> Result<()>;
    fn muted(&self) -> bool;
    fn set_muted(&mut self, muted: bool) -> Result<()>;
    fn playback_rate(&self) -> f64;
    fn set_playback_rate(&mut self, rate: f64) -> Result<()>;
    fn enter_fullscreen(&mut self) -> Result<()>;
    fn exit_fullscreen(&mut self) -> Result<()>;
}

/// In-memory player used by the demo binary and tests
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedPlayer {
    pub playing: bool,
    pub current_time: f64,
    pub duration: f64,
    pub volume: f64,
    pub muted: bool,
    pub playback_rate: f64,
    pub fullscreen: bool,
    /// When set, every mutating primitive fails (simulates a broken engine)
    pub fail_with: Option<String>,
}

impl SimulatedPlayer {
    pub fn new(duration: f64) -> Self {
        Self {
            playing: false,
            current_time: 0.0,
            duration: duration.max(0.0),
            volume: 1.0,
            muted: false,
            playback_rate: 1.0,
            fullscreen: false,
            fail_with: None,
        }
    }

    fn check(&self) -> Result<()> {
        match &self.fail_with {
            Some(reason) => anyhow::bail!("{}", reason),
            None => Ok(()),
        }
    }
}

impl Default for SimulatedPlayer {
    fn default() -> Self {
        Self::new(600.0)
    }
}

impl VideoPlayer for SimulatedPlayer {
    fn play(&mut self) -> Result<()> {
        self.check()?;
        self.playing = true;
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.check()?;
        self.playing = false;
        Ok(())
    }

    fn current_time(&self) -> f64 {
        self.current_time
    }

    fn set_current_time(&mut self, seconds: f64) -> Result<()> {
        self.check()?;
        self.current_time = seconds;
        Ok(())
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn volume(&self) -> f64 {
        self.volume
    }

    fn set_volume(&mut self, volume: f64) -> Result<()> {
        self.check()?;
        self.volume = volume;
        Ok(())
    }

    fn muted(&self) -> bool {
        self.muted
    }

    fn set_muted(&mut self, muted: bool) -> Result<()> {
        self.check()?;
        self.muted = muted;
        Ok(())
    }

    fn playback_rate(&self) -> f64 {
        self.playback_rate
    }

    fn set_playback_rate(&mut self, rate: f64) -> Result<()> {
        self.check()?;
        self.playback_rate = rate;
        Ok(())
    }

    fn enter_fullscreen(&mut self) -> Result<()> {
        self.check()?;
        self.fullscreen = true;
        Ok(())
    }

    fn exit_fullscreen(&mut self) -> Result<()> {
        self.check()?;
        self.fullscreen = false;
        Ok(())
    }
}
