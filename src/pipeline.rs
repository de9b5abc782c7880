//! Recognition → match → accept → dispatch
//!
//! `VoicePipeline` is the single owned service the app constructs at
//! startup. It owns the catalog and the custom command store, and hands
//! accepted commands to the dispatcher without knowing who listens.

use std::collections::HashMap;
use tracing::{debug, info};

use crate::catalog::Catalog;
use crate::command::CommandMatch;
use crate::confidence::{ConfidenceCombiner, Rejection};
use crate::config::Config;
use crate::custom::CustomCommandStore;
use crate::dispatch::Dispatcher;
use crate::matcher::{MatchPolicy, Matcher};
use crate::session::Utterance;
use crate::text::apply_aliases;

pub const STATUS_NOT_RECOGNIZED: &str = "Command not recognized";
pub const STATUS_LOW_CONFIDENCE: &str = "Command confidence too low, please try again";

/// Result of one recognition event
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Dispatched(CommandMatch),
    /// No candidate cleared the matcher floor
    NotRecognized,
    /// A candidate matched but `combined <= threshold`
    LowConfidence { combined: f64, threshold: f64 },
}

impl Outcome {
    pub fn is_dispatched(&self) -> bool {
        matches!(self, Outcome::Dispatched(_))
    }
}

pub struct VoicePipeline {
    catalog: Catalog,
    store: CustomCommandStore,
    dispatcher: Dispatcher,
    combiner: ConfidenceCombiner,
    policy: MatchPolicy,
    language: String,
    aliases: HashMap<String, String>,
    last_command: Option<CommandMatch>,
    status: Option<String>,
}

impl VoicePipeline {
    pub fn new(catalog: Catalog, store: CustomCommandStore, dispatcher: Dispatcher) -> Self {
        Self {
            catalog,
            store,
            dispatcher,
            combiner: ConfidenceCombiner::default(),
            policy: MatchPolicy::default(),
            language: crate::catalog::DEFAULT_LANGUAGE.to_string(),
            aliases: HashMap::new(),
            last_command: None,
            status: None,
        }
    }

    pub fn with_config(mut self, config: &Config) -> Self {
        self.apply_config(config);
        self
    }

    /// Take the per-utterance settings from a (possibly reloaded) config
    pub fn apply_config(&mut self, config: &Config) {
        self.combiner = config.combiner();
        self.policy = config.custom_match_policy;
        self.language = config.language.clone();
        self.aliases = config.aliases.clone();
    }

    pub fn set_threshold(&mut self, threshold: f64) {
        self.combiner = ConfidenceCombiner::new(threshold);
    }

    pub fn threshold(&self) -> f64 {
        self.combiner.threshold()
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn store(&self) -> &CustomCommandStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut CustomCommandStore {
        &mut self.store
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn last_command(&self) -> Option<&CommandMatch> {
        self.last_command.as_ref()
    }

    /// User-facing status from the most recent utterance
    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    /// Match in the configured language
    pub fn process_text(&mut self, text: &str, speech_confidence: f64) -> Outcome {
        let utterance = Utterance::new(text, speech_confidence, self.language.clone());
        self.process(&utterance)
    }

    pub fn process(&mut self, utterance: &Utterance) -> Outcome {
        let text = apply_aliases(&utterance.text, &self.aliases);
        let language = if utterance.language.trim().is_empty() { &self.language } else { &utterance.language };

        let matcher = Matcher::new(&self.catalog, Some(&self.store), self.policy);
        let Some(candidate) = matcher.match_text(&text, language) else {
            info!("❓ Not recognized: '{}'", utterance.text);
            self.status = Some(STATUS_NOT_RECOGNIZED.to_string());
            return Outcome::NotRecognized;
        };

        debug!(
            "Matched '{}' via {} phrase '{}' ({:.2})",
            text, candidate.source, candidate.matched_utterance, candidate.confidence
        );

        match self.combiner.accept(candidate, utterance.confidence) {
            Ok(accepted) => {
                info!(
                    "🎯 {} [{} '{}', confidence {:.2}]",
                    accepted.command, accepted.source, accepted.matched_utterance, accepted.confidence
                );
                self.dispatcher.publish(&accepted);
                self.status = Some(format!("Command: {}", accepted.matched_utterance));
                self.last_command = Some(accepted.clone());
                Outcome::Dispatched(accepted)
            }
            Err(Rejection { candidate, combined, threshold }) => {
                info!(
                    "📉 Low confidence for {} [{} '{}']: {:.3} <= {:.2}",
                    candidate.command, candidate.source, candidate.matched_utterance, combined, threshold
                );
                self.status = Some(STATUS_LOW_CONFIDENCE.to_string());
                Outcome::LowConfidence { combined, threshold }
            }
        }
    }

    /// Flush pending custom command writes
    pub fn shutdown(&self) {
        self.store.flush();
        info!("Voice pipeline shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn pipeline() -> (VoicePipeline, Arc<Mutex<Vec<CommandMatch>>>) {
        let dispatcher = Dispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = dispatcher.subscribe(move |m: &CommandMatch| -> anyhow::Result<()> {
            sink.lock().unwrap().push(m.clone());
            Ok(())
        });
        let pipeline = VoicePipeline::new(Catalog::builtin(), CustomCommandStore::in_memory(), dispatcher);
        (pipeline, seen)
    }

    #[test]
    fn accepted_commands_are_published_and_remembered() {
        let (mut pipeline, seen) = pipeline();
        let outcome = pipeline.process_text("play", 0.9);
        assert!(outcome.is_dispatched());
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(pipeline.last_command().unwrap().command.action(), Some("play"));
    }

    #[test]
    fn no_match_sets_not_recognized_status() {
        let (mut pipeline, seen) = pipeline();
        assert_eq!(pipeline.process_text("order a pizza", 1.0), Outcome::NotRecognized);
        assert_eq!(pipeline.status(), Some(STATUS_NOT_RECOGNIZED));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn low_confidence_is_distinguished() {
        let (mut pipeline, seen) = pipeline();
        let outcome = pipeline.process_text("pause", 0.4);
        assert!(matches!(outcome, Outcome::LowConfidence { threshold, .. } if threshold == 0.5));
        assert_eq!(pipeline.status(), Some(STATUS_LOW_CONFIDENCE));
        assert!(seen.lock().unwrap().is_empty());
        assert!(pipeline.last_command().is_none());
    }

    #[test]
    fn aliases_rewrite_before_matching() {
        let (mut pipeline, _) = pipeline();
        let config = Config {
            aliases: HashMap::from([("paws".to_string(), "pause".to_string())]),
            ..Config::default()
        };
        pipeline.apply_config(&config);
        let Outcome::Dispatched(m) = pipeline.process_text("Paws", 0.9) else {
            panic!("expected dispatch");
        };
        assert_eq!(m.command.action(), Some("pause"));
    }

    #[test]
    fn utterance_language_overrides_default() {
        let (mut pipeline, _) = pipeline();
        let outcome = pipeline.process(&Utterance::new("暫停", 0.9, "zh-TW"));
        assert!(outcome.is_dispatched());
    }
}
