//! Utterance-to-command matching
//!
//! Custom commands are consulted first and win outright with full
//! confidence. The built-in catalog is then scanned in definition order:
//! an exact phrase returns immediately, otherwise the best substring
//! candidate (scored by how much of the input the phrase covers) must
//! clear `MIN_CATALOG_SCORE`.

use serde::Deserialize;
use tracing::{debug, trace};

use crate::catalog::Catalog;
use crate::command::{CommandMatch, MatchSource};
use crate::custom::{CustomCommand, CustomCommandStore};
use crate::text::{char_len, normalize};

/// Substring candidates at or below this score are discarded
pub const MIN_CATALOG_SCORE: f64 = 0.5;

/// How competing custom triggers are resolved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchPolicy {
    /// First enabled trigger in storage order
    #[default]
    First,
    /// Longest contained trigger
    Longest,
}

pub struct Matcher<'a> {
    catalog: &'a Catalog,
    custom: Option<&'a CustomCommandStore>,
    policy: MatchPolicy,
}

impl<'a> Matcher<'a> {
    pub fn new(catalog: &'a Catalog, custom: Option<&'a CustomCommandStore>, policy: MatchPolicy) -> Self {
        Self { catalog, custom, policy }
    }

    pub fn match_text(&self, text: &str, language: &str) -> Option<CommandMatch> {
        let input = normalize(text);
        if input.is_empty() {
            return None;
        }

        if let Some(custom) = self.custom.and_then(|store| self.find_custom(store, &input)) {
            debug!("Custom trigger '{}' matched '{}'", custom.text, input);
            return Some(CommandMatch {
                command: custom.command(),
                source: MatchSource::Custom,
                confidence: 1.0,
                matched_utterance: custom.text.clone(),
            });
        }

        match_catalog(self.catalog, &input, language)
    }

    fn find_custom<'s>(&self, store: &'s CustomCommandStore, input: &str) -> Option<&'s CustomCommand> {
        match self.policy {
            MatchPolicy::First => store.find_match(input),
            MatchPolicy::Longest => store.find_longest_match(input),
        }
    }
}

/// Score `text` against the catalog for `language` (falling back to English)
pub fn match_catalog(catalog: &Catalog, text: &str, language: &str) -> Option<CommandMatch> {
    let input = normalize(text);
    if input.is_empty() {
        return None;
    }
    let input_len = char_len(&input) as f64;

    let mut best: Option<(f64, CommandMatch)> = None;

    for view in catalog.list_utterances(language) {
        for utterance in view.utterances {
            let phrase = normalize(utterance);
            if phrase.is_empty() {
                continue;
            }

            if input == phrase {
                trace!("Exact catalog hit '{}'", phrase);
                return Some(CommandMatch {
                    command: view.command.clone(),
                    source: MatchSource::Builtin,
                    confidence: 1.0,
                    matched_utterance: phrase,
                });
            }

            if input.contains(&phrase) {
                let score = char_len(&phrase) as f64 / input_len;
                // Strictly greater: the first candidate seen keeps a tie
                if best.as_ref().is_none_or(|(top, _)| score > *top) {
                    best = Some((score, CommandMatch {
                        command: view.command.clone(),
                        source: MatchSource::Builtin,
                        confidence: score,
                        matched_utterance: phrase,
                    }));
                }
            }
        }
    }

    match best {
        Some((score, m)) if score > MIN_CATALOG_SCORE => Some(m),
        Some((score, m)) => {
            debug!("Best candidate '{}' scored {:.2}, below floor", m.matched_utterance, score);
            None
        }
        None => None,
    }
}
