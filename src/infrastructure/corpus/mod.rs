pub mod loader;
pub mod matcher;
pub mod provider;

pub use loader::load_document;
pub use matcher::{LevenshteinScorer, Matcher, MatcherOptions};
pub use provider::LocalCorpusProvider;
