//! Listening session state machine
//!
//! States:
//! - Idle: not capturing
//! - Listening: capturing, partial transcript accumulating
//!
//! Only one session is active at a time; `start` while listening is a no-op.
//! Cancel and timeout discard the partial transcript without matching.

use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Listening,
}

/// A completed utterance handed to the pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    /// Acoustic confidence in [0, 1]
    pub confidence: f64,
    pub language: String,
}

impl Utterance {
    pub fn new(text: impl Into<String>, confidence: f64, language: impl Into<String>) -> Self {
        Self { text: text.into(), confidence, language: language.into() }
    }
}

/// Failures reported by the speech recognizer; never retried automatically
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionFailure {
    NoSpeech,
    AudioCapture,
    NotAllowed,
    Network,
    Unsupported,
    Other(String),
}

impl RecognitionFailure {
    /// Map a recognizer error code ("no-speech", "not-allowed", ...)
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "no-speech" => Self::NoSpeech,
            "audio-capture" => Self::AudioCapture,
            "not-allowed" | "service-not-allowed" => Self::NotAllowed,
            "network" => Self::Network,
            "unsupported" | "language-not-supported" => Self::Unsupported,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::NoSpeech => "No speech detected".to_string(),
            Self::AudioCapture => "Microphone error".to_string(),
            Self::NotAllowed => "Microphone permission denied".to_string(),
            Self::Network => "Network error".to_string(),
            Self::Unsupported => "Speech recognition is not supported".to_string(),
            Self::Other(code) => format!("Speech recognition error: {}", code),
        }
    }
}

impl fmt::Display for RecognitionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.user_message())
    }
}

/// BCP-47 locale for the recognizer, from an app language code
pub fn recognizer_locale(language: &str) -> &'static str {
    match language.trim() {
        "en" | "en-US" => "en-US",
        "zh-TW" => "zh-TW",
        "zh-CN" | "zh" => "zh-CN",
        "es" | "es-ES" => "es-ES",
        "pt-BR" => "pt-BR",
        "pt" | "pt-PT" => "pt-PT",
        "de" | "de-DE" => "de-DE",
        "fr" | "fr-FR" => "fr-FR",
        "ru" | "ru-RU" => "ru-RU",
        "ar" | "ar-SA" => "ar-SA",
        "ja" | "ja-JP" => "ja-JP",
        "ko" | "ko-KR" => "ko-KR",
        _ => "en-US",
    }
}

pub struct ListeningSession {
    state: SessionState,
    timeout: Duration,
    last_activity: Option<Instant>,
    partial: String,
    error: Option<RecognitionFailure>,
}

impl ListeningSession {
    pub fn new(timeout: Duration) -> Self {
        Self {
            state: SessionState::Idle,
            timeout,
            last_activity: None,
            partial: String::new(),
            error: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_listening(&self) -> bool {
        self.state == SessionState::Listening
    }

    pub fn partial(&self) -> &str {
        &self.partial
    }

    pub fn error(&self) -> Option<&RecognitionFailure> {
        self.error.as_ref()
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Begin capturing; returns false if a session is already active
    pub fn start(&mut self, now: Instant) -> bool {
        if self.is_listening() {
            debug!("Already listening, ignoring start");
            return false;
        }
        self.state = SessionState::Listening;
        self.last_activity = Some(now);
        self.partial.clear();
        self.error = None;
        info!("🎤 Listening...");
        true
    }

    /// Record an interim transcript; refreshes the inactivity timer
    pub fn interim(&mut self, text: &str, now: Instant) {
        if !self.is_listening() {
            return;
        }
        self.partial = text.to_string();
        self.last_activity = Some(now);
    }

    /// Close the session with the final transcript
    pub fn finish(&mut self, text: &str, confidence: f64, language: &str) -> Option<Utterance> {
        if !self.is_listening() {
            debug!("Final result arrived while idle, dropping");
            return None;
        }
        self.stop();
        Some(Utterance::new(text, confidence, language))
    }

    /// Stop and discard the partial transcript; nothing is matched
    pub fn cancel(&mut self) {
        if self.is_listening() {
            debug!("Listening cancelled, discarding '{}'", self.partial);
        }
        self.stop();
    }

    /// Auto-stop after the inactivity timeout; returns true if it fired
    pub fn expire(&mut self, now: Instant) -> bool {
        let Some(last) = self.last_activity else { return false };
        if !self.is_listening() || self.timeout.is_zero() {
            return false;
        }
        if now.saturating_duration_since(last) >= self.timeout {
            info!("⏰ Listening timed out after {}s", self.timeout.as_secs());
            self.stop();
            return true;
        }
        false
    }

    /// Recognizer error: stop and keep the failure for the caller to surface
    pub fn fail(&mut self, failure: RecognitionFailure) -> String {
        warn!("Recognition failed: {:?}", failure);
        let message = failure.user_message();
        self.stop();
        self.error = Some(failure);
        message
    }

    fn stop(&mut self) {
        self.state = SessionState::Idle;
        self.last_activity = None;
        self.partial.clear();
    }
}
