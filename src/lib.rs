//! Voice command matching and dispatch for the CoolPlay video player
//!
//! Recognized speech text plus its acoustic confidence goes through the
//! `matcher` (custom commands first, then the built-in `catalog`), the
//! `confidence` combiner decides accept/reject, and accepted commands are
//! broadcast by the `dispatch` module to listeners such as the player
//! `executor`.

pub mod catalog;
pub mod command;
pub mod confidence;
pub mod config;
pub mod custom;
pub mod dispatch;
pub mod executor;
pub mod matcher;
pub mod pipeline;
pub mod player;
pub mod session;
pub mod storage;
pub mod text;

pub use catalog::{Catalog, CatalogEntry, CatalogError};
pub use command::{Command, CommandError, CommandMatch, Intent, MatchSource, Slot};
pub use confidence::{ConfidenceCombiner, Rejection};
pub use config::Config;
pub use custom::{CustomCommand, CustomCommandPatch, CustomCommandStore};
pub use dispatch::{CommandListener, Dispatcher, Subscription};
pub use executor::{ExecutorConfig, FeedbackBanner, PlayerCommandExecutor};
pub use matcher::{MatchPolicy, Matcher};
pub use pipeline::{Outcome, VoicePipeline};
pub use player::{SimulatedPlayer, VideoPlayer};
pub use session::{ListeningSession, RecognitionFailure, Utterance};
pub use storage::{FileStore, KeyValueStore, MemoryStore, StoreError};
