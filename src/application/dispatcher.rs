//! Query dispatcher.
//!
//! A single task owns every provider's cache and in-flight set. Callers talk
//! to it through a [`DispatcherHandle`]; provider lookups run on their own
//! tasks and hand their outcome back over a channel, so cache and in-flight
//! state are only ever touched from the dispatcher task.

use crate::domain::error::TmError;
use crate::domain::model::{MatchRecord, ProviderId, QueryContext};
use crate::domain::traits::Provider;
use crate::infrastructure::storage::cache::ResultCache;
use futures_util::future::join_all;
use futures_util::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{AbortHandle, JoinSet};
use tracing::{debug, info, warn};

/// Notifications published by the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchEvent {
    /// One provider's answer for one query. Providers report independently
    /// and in no particular order.
    MatchFound {
        provider: ProviderId,
        query: String,
        results: Vec<MatchRecord>,
    },
    /// The language pair changed; every cached and pending answer was dropped.
    ContextChanged(QueryContext),
    /// The dispatcher shut down. No events follow.
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderStats {
    pub provider: ProviderId,
    pub cached_queries: usize,
    pub in_flight: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherStats {
    pub context: QueryContext,
    pub providers: Vec<ProviderStats>,
}

impl DispatcherStats {
    pub fn in_flight(&self) -> usize {
        self.providers.iter().map(|p| p.in_flight).sum()
    }
}

enum Command {
    Submit(String),
    SetSourceLang(Option<String>),
    SetTargetLang(Option<String>),
    Invalidate(ProviderId),
    Subscribe(mpsc::UnboundedSender<DispatchEvent>),
    Stats(oneshot::Sender<DispatcherStats>),
    Close(oneshot::Sender<()>),
}

/// Outcome of one physical lookup, tagged with the context generation and
/// slot epoch it was issued under.
struct Completion {
    slot: usize,
    query: String,
    generation: u64,
    epoch: u64,
    outcome: Result<Vec<MatchRecord>, TmError>,
}

/// Marker for a lookup that was issued but has not resolved yet.
#[derive(Debug)]
struct InFlightQuery {
    issued_at: Instant,
    waiters: usize,
    task: AbortHandle,
}

struct ProviderSlot {
    provider: Arc<dyn Provider>,
    cache: ResultCache,
    in_flight: HashMap<String, InFlightQuery>,
    // bumped when this provider alone is invalidated
    epoch: u64,
}

impl ProviderSlot {
    /// Forget cached answers and abandon pending lookups. Returns how many entries went.
    fn reset(&mut self) -> usize {
        let dropped = self.cache.len() + self.in_flight.len();
        for (_, marker) in self.in_flight.drain() {
            marker.task.abort();
        }
        self.cache.clear();
        self.epoch += 1;
        dropped
    }
}

/// Owner of providers, caches and the query context.
pub struct Dispatcher {
    slots: Vec<ProviderSlot>,
    context: QueryContext,
    generation: u64,
    subscribers: Vec<mpsc::UnboundedSender<DispatchEvent>>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
    tasks: JoinSet<()>,
}

impl Dispatcher {
    /// Start the dispatcher task. Must be called from within a tokio runtime.
    pub fn spawn(providers: Vec<Arc<dyn Provider>>, context: QueryContext) -> DispatcherHandle {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();

        let slots = providers
            .into_iter()
            .map(|provider| ProviderSlot {
                provider,
                cache: ResultCache::new(),
                in_flight: HashMap::new(),
                epoch: 0,
            })
            .collect();

        let dispatcher = Dispatcher {
            slots,
            context,
            generation: 0,
            subscribers: Vec::new(),
            completions_tx,
            completions_rx,
            tasks: JoinSet::new(),
        };
        tokio::spawn(dispatcher.run(command_rx));

        DispatcherHandle { commands }
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        loop {
            tokio::select! {
                Some(done) = self.completions_rx.recv() => self.complete(done),
                Some(_) = self.tasks.join_next(), if !self.tasks.is_empty() => {}
                command = commands.recv() => match command {
                    Some(Command::Submit(query)) => self.submit(query),
                    Some(Command::SetSourceLang(code)) => {
                        if self.context.set_source_lang(code) {
                            self.invalidate();
                        }
                    }
                    Some(Command::SetTargetLang(code)) => {
                        if self.context.set_target_lang(code) {
                            self.invalidate();
                        }
                    }
                    Some(Command::Invalidate(provider)) => self.invalidate_provider(&provider),
                    Some(Command::Subscribe(subscriber)) => self.subscribers.push(subscriber),
                    Some(Command::Stats(reply)) => {
                        let _ = reply.send(self.stats());
                    }
                    Some(Command::Close(ack)) => {
                        self.close().await;
                        // handles observe the close before the ack
                        commands.close();
                        let _ = ack.send(());
                        return;
                    }
                    // every handle is gone
                    None => {
                        self.close().await;
                        return;
                    }
                },
            }
        }
    }

    fn submit(&mut self, query: String) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            let id = slot.provider.id();

            if let Some(hit) = slot.cache.get(&query) {
                debug!(provider = %id, query = %query, "cache hit");
                publish(
                    &mut self.subscribers,
                    DispatchEvent::MatchFound {
                        provider: id.clone(),
                        query: query.clone(),
                        results: hit.to_vec(),
                    },
                );
                continue;
            }

            if let Some(marker) = slot.in_flight.get_mut(&query) {
                marker.waiters += 1;
                debug!(provider = %id, query = %query, waiters = marker.waiters, "lookup already in flight");
                continue;
            }

            debug!(provider = %id, query = %query, "cache miss, issuing lookup");
            let provider = slot.provider.clone();
            let context = self.context.clone();
            let completions = self.completions_tx.clone();
            let generation = self.generation;
            let epoch = slot.epoch;
            let key = query.clone();
            let task = self.tasks.spawn(async move {
                let outcome = AssertUnwindSafe(provider.lookup(&key, &context))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| {
                        Err(TmError::ProviderUnavailable(format!(
                            "{} panicked during lookup",
                            provider.id()
                        )))
                    });
                // 接收端只在关闭时丢弃
                let _ = completions.send(Completion {
                    slot: index,
                    query: key,
                    generation,
                    epoch,
                    outcome,
                });
            });
            slot.in_flight.insert(
                query.clone(),
                InFlightQuery {
                    issued_at: Instant::now(),
                    waiters: 1,
                    task,
                },
            );
        }
    }

    fn complete(&mut self, done: Completion) {
        if done.generation != self.generation {
            debug!(query = %done.query, "discarding result issued under a previous context");
            return;
        }

        let Some(slot) = self.slots.get_mut(done.slot) else {
            return;
        };
        if done.epoch != slot.epoch {
            debug!(provider = %slot.provider.id(), query = %done.query, "discarding result issued before provider reset");
            return;
        }
        let id = slot.provider.id();
        let marker = slot.in_flight.remove(&done.query);

        match done.outcome {
            Ok(results) => {
                if let Some(marker) = marker {
                    debug!(
                        provider = %id,
                        query = %done.query,
                        found = results.len(),
                        waiters = marker.waiters,
                        elapsed_ms = marker.issued_at.elapsed().as_millis() as u64,
                        "lookup resolved"
                    );
                }
                slot.cache.put(done.query.clone(), results.clone());
                publish(
                    &mut self.subscribers,
                    DispatchEvent::MatchFound {
                        provider: id.clone(),
                        query: done.query,
                        results,
                    },
                );
            }
            Err(e) => {
                warn!(
                    provider = %id,
                    query = %done.query,
                    kind = e.kind(),
                    error = %e,
                    "lookup failed"
                );
            }
        }
    }

    /// Drop every cached answer and disown every pending lookup.
    fn invalidate(&mut self) {
        self.generation += 1;
        self.tasks.abort_all();

        let dropped: usize = self.slots.iter_mut().map(ProviderSlot::reset).sum();

        info!(context = %self.context, dropped, "query context changed, caches cleared");
        let event = DispatchEvent::ContextChanged(self.context.clone());
        publish(&mut self.subscribers, event);
    }

    /// Same as a context change, limited to one provider. Used after the
    /// provider's own data changed underneath its cached answers.
    fn invalidate_provider(&mut self, provider: &ProviderId) {
        match self.slots.iter_mut().find(|slot| slot.provider.id() == provider) {
            Some(slot) => {
                let dropped = slot.reset();
                info!(provider = %provider, dropped, "provider cache cleared");
            }
            None => warn!(provider = %provider, "invalidate for unknown provider"),
        }
    }

    fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            context: self.context.clone(),
            providers: self
                .slots
                .iter()
                .map(|slot| ProviderStats {
                    provider: slot.provider.id().clone(),
                    cached_queries: slot.cache.len(),
                    in_flight: slot.in_flight.len(),
                })
                .collect(),
        }
    }

    async fn close(&mut self) {
        self.tasks.abort_all();
        for slot in &mut self.slots {
            slot.in_flight.clear();
        }

        join_all(self.slots.iter().map(|slot| slot.provider.shutdown())).await;

        for slot in &mut self.slots {
            slot.cache.clear();
        }
        self.slots.clear();

        info!("dispatcher closed");
        publish(&mut self.subscribers, DispatchEvent::Closed);
        self.subscribers.clear();
    }
}

/// Deliver `event` to every live subscriber, forgetting the ones that went away.
fn publish(subscribers: &mut Vec<mpsc::UnboundedSender<DispatchEvent>>, event: DispatchEvent) {
    subscribers.retain(|subscriber| subscriber.send(event.clone()).is_ok());
}

/// Cheap, cloneable front end of a running [`Dispatcher`].
#[derive(Clone)]
pub struct DispatcherHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl DispatcherHandle {
    /// Ask every provider for suggestions on `text`. Never blocks; answers
    /// arrive as [`DispatchEvent::MatchFound`].
    pub fn submit_query(&self, text: impl Into<String>) {
        if self.commands.send(Command::Submit(text.into())).is_err() {
            warn!("query submitted to a closed dispatcher");
        }
    }

    pub fn set_source_lang(&self, code: Option<&str>) -> Result<(), TmError> {
        self.send(Command::SetSourceLang(code.map(str::to_string)))
    }

    pub fn set_target_lang(&self, code: Option<&str>) -> Result<(), TmError> {
        self.send(Command::SetTargetLang(code.map(str::to_string)))
    }

    /// Drop one provider's cached answers and pending lookups, leaving the
    /// others untouched. Call it after the provider's data was replaced, e.g.
    /// after [`LocalCorpusProvider::reload`](crate::LocalCorpusProvider::reload).
    pub fn invalidate(&self, provider: &ProviderId) -> Result<(), TmError> {
        self.send(Command::Invalidate(provider.clone()))
    }

    /// Subscribe to events published after every command sent so far.
    ///
    /// Each subscriber gets its own unbounded queue, so a slow reader never
    /// loses events; it only holds them in memory until read.
    pub fn subscribe(&self) -> Subscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let finished = self.commands.send(Command::Subscribe(sender)).is_err();
        Subscription { receiver, finished }
    }

    pub async fn stats(&self) -> Result<DispatcherStats, TmError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Stats(reply))?;
        rx.await.map_err(|_| TmError::DispatcherClosed)
    }

    /// Stop the dispatcher: pending lookups are abandoned, providers are shut
    /// down and caches released. Closing twice is fine.
    pub async fn close(&self) -> Result<(), TmError> {
        let (ack, rx) = oneshot::channel();
        if self.commands.send(Command::Close(ack)).is_err() {
            return Ok(());
        }
        // a concurrent close may have won the race
        let _ = rx.await;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    fn send(&self, command: Command) -> Result<(), TmError> {
        self.commands
            .send(command)
            .map_err(|_| TmError::DispatcherClosed)
    }
}

/// Owned subscription to dispatcher events. Dropping it unsubscribes.
pub struct Subscription {
    receiver: mpsc::UnboundedReceiver<DispatchEvent>,
    finished: bool,
}

impl Subscription {
    /// Next event, or `None` once the dispatcher has closed.
    pub async fn recv(&mut self) -> Option<DispatchEvent> {
        if self.finished {
            return None;
        }

        match self.receiver.recv().await {
            Some(DispatchEvent::Closed) => {
                self.finished = true;
                Some(DispatchEvent::Closed)
            }
            Some(event) => Some(event),
            None => {
                self.finished = true;
                None
            }
        }
    }
}
