use crate::domain::error::TmError;
use crate::domain::model::{Document, MatchRecord, ProviderId, QueryContext};
use async_trait::async_trait;

/// A pluggable backend able to answer a match query.
///
/// Results are delivered through the returned future. Implementations treat
/// `query` as an opaque string and keep no result cache of their own; caching
/// lives in the dispatcher. A lookup that cannot complete resolves to an
/// `Err`, it never panics into the caller.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Identifier used for cache partitioning and error attribution.
    fn id(&self) -> &ProviderId;

    /// Answer one query under the given language context, best match first.
    async fn lookup(&self, query: &str, context: &QueryContext)
        -> Result<Vec<MatchRecord>, TmError>;

    /// Rebuild internal state from a new host document.
    async fn reload(&self, _document: &Document) -> Result<(), TmError> {
        Ok(())
    }

    /// Release held resources. Called once, when the dispatcher closes.
    async fn shutdown(&self) {}
}

/// String similarity used by the local corpus matcher.
pub trait Scorer: Send + Sync {
    /// Similarity of `a` and `b` as a percentage in `0..=100`.
    fn similarity(&self, a: &str, b: &str) -> u8;
}
