pub mod cli;
pub mod config;
pub mod db;
pub mod hamming;
pub mod index;
pub mod matcher;
mod metrics;
pub mod orb;
pub mod recognizer;
pub mod server;
pub mod utils;

pub use config::Opts;
pub use db::{Catalog, MemoryCatalog, SqliteCatalog};
pub use index::{RebuildStats, ReferenceEntry, ReferenceIndex};
pub use matcher::{MatchError, MatchOutcome, Matcher, NoMatchReason};
pub use orb::OrbExtractor;
pub use recognizer::{Identification, RecognizeError, Recognizer};
