use crate::domain::error::TmError;
use crate::domain::model::{Document, MatchRecord, ProviderId, QueryContext};
use crate::domain::traits::{Provider, Scorer};
use crate::infrastructure::corpus::matcher::{LevenshteinScorer, Matcher, MatcherOptions};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Translation memory over the units of the currently open document.
///
/// The matcher is swapped as a whole on `reload`, so a lookup always runs
/// against one complete snapshot.
pub struct LocalCorpusProvider {
    id: ProviderId,
    options: MatcherOptions,
    scorer: Arc<dyn Scorer>,
    matcher: RwLock<Option<Arc<Matcher>>>,
}

impl LocalCorpusProvider {
    pub fn new(id: impl Into<ProviderId>, options: MatcherOptions) -> Self {
        Self::with_scorer(id, options, Arc::new(LevenshteinScorer))
    }

    pub fn with_scorer(
        id: impl Into<ProviderId>,
        options: MatcherOptions,
        scorer: Arc<dyn Scorer>,
    ) -> Self {
        Self {
            id: id.into(),
            options,
            scorer,
            matcher: RwLock::new(None),
        }
    }

    /// Number of units the current matcher can suggest from, `None` before the first reload.
    pub async fn indexed_units(&self) -> Option<usize> {
        self.matcher.read().await.as_ref().map(|m| m.len())
    }
}

#[async_trait]
impl Provider for LocalCorpusProvider {
    fn id(&self) -> &ProviderId {
        &self.id
    }

    async fn lookup(
        &self,
        query: &str,
        _context: &QueryContext,
    ) -> Result<Vec<MatchRecord>, TmError> {
        // Clone the Arc so the lock is not held while scoring
        let matcher = self.matcher.read().await.clone().ok_or_else(|| {
            TmError::ProviderUnavailable(format!("{}: no document loaded", self.id))
        })?;

        let results = matcher.matches(query);
        debug!(provider = %self.id, query, found = results.len(), "local lookup");
        Ok(results)
    }

    /// Swap in a matcher for `document`. Lookups already running finish on
    /// the old one. A dispatcher holding this provider keeps serving its cached
    /// answers until told otherwise with [`DispatcherHandle::invalidate`].
    ///
    /// [`DispatcherHandle::invalidate`]: crate::DispatcherHandle::invalidate
    async fn reload(&self, document: &Document) -> Result<(), TmError> {
        let matcher = Arc::new(Matcher::new(document, self.options, self.scorer.clone()));
        let indexed = matcher.len();
        *self.matcher.write().await = Some(matcher);

        info!(
            provider = %self.id,
            units = document.len(),
            indexed,
            "corpus matcher rebuilt"
        );
        Ok(())
    }

    async fn shutdown(&self) {
        self.matcher.write().await.take();
    }
}
