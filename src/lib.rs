//! Translation memory suggestions from pluggable providers.
//!
//! [`Dispatcher`] fans a query out to every [`Provider`], caches each
//! provider's answer per query, and drops all cached and pending answers
//! whenever the source/target language pair changes.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::dispatcher::{
    DispatchEvent, Dispatcher, DispatcherHandle, DispatcherStats, ProviderStats, Subscription,
};
pub use domain::error::TmError;
pub use domain::model::{Document, MatchRecord, ProviderId, QueryContext, TranslationUnit};
pub use domain::traits::{Provider, Scorer};
pub use infrastructure::corpus::{LocalCorpusProvider, MatcherOptions};
pub use infrastructure::network::client::{Endpoint, RemoteServiceProvider};
