//! Dispatcher behaviour against scripted providers

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tmq::{
    DispatchEvent, Dispatcher, MatchRecord, Provider, ProviderId, QueryContext, Subscription,
    TmError,
};
use tokio::sync::Semaphore;

enum Behavior {
    Echo,
    Fail,
    Panic,
}

struct MockProvider {
    id: ProviderId,
    behavior: Behavior,
    // lookups wait for a permit when gated
    gate: Option<Semaphore>,
    calls: AtomicUsize,
    shut_down: AtomicBool,
}

impl MockProvider {
    fn new(id: &str, behavior: Behavior, gated: bool) -> Arc<Self> {
        Arc::new(Self {
            id: ProviderId::new(id),
            behavior,
            gate: gated.then(|| Semaphore::new(0)),
            calls: AtomicUsize::new(0),
            shut_down: AtomicBool::new(false),
        })
    }

    fn echo(id: &str) -> Arc<Self> {
        Self::new(id, Behavior::Echo, false)
    }

    fn gated(id: &str) -> Arc<Self> {
        Self::new(id, Behavior::Echo, true)
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn release(&self, permits: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(permits);
        }
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn id(&self) -> &ProviderId {
        &self.id
    }

    async fn lookup(
        &self,
        query: &str,
        context: &QueryContext,
    ) -> Result<Vec<MatchRecord>, TmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }

        match self.behavior {
            Behavior::Echo => {
                let target = context.target_lang.as_deref().unwrap_or("?");
                Ok(vec![MatchRecord::new(
                    query,
                    format!("{}:{}", target, query),
                    Some(100),
                    None,
                )])
            }
            Behavior::Fail => Err(TmError::LookupTransportFailure(
                "connection refused".to_string(),
            )),
            Behavior::Panic => panic!("scripted provider panic"),
        }
    }

    async fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
    }
}

fn context(source: &str, target: &str) -> QueryContext {
    QueryContext::new(Some(source.to_string()), Some(target.to_string()))
}

fn providers(list: &[&Arc<MockProvider>]) -> Vec<Arc<dyn Provider>> {
    list.iter()
        .map(|p| Arc::clone(*p) as Arc<dyn Provider>)
        .collect()
}

async fn next_event(sub: &mut Subscription) -> DispatchEvent {
    tokio::time::timeout(Duration::from_secs(2), sub.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("dispatcher closed")
}

async fn next_match(sub: &mut Subscription) -> (ProviderId, String, Vec<MatchRecord>) {
    loop {
        if let DispatchEvent::MatchFound {
            provider,
            query,
            results,
        } = next_event(sub).await
        {
            return (provider, query, results);
        }
    }
}

/// No match notification arrives within `window`.
async fn assert_no_match(sub: &mut Subscription, window: Duration) {
    let deadline = tokio::time::Instant::now() + window;
    loop {
        match tokio::time::timeout_at(deadline, sub.recv()).await {
            Err(_) => return,
            Ok(Some(DispatchEvent::MatchFound { provider, query, .. })) => {
                panic!("unexpected match from {} for {:?}", provider, query)
            }
            Ok(Some(_)) => continue,
            Ok(None) => return,
        }
    }
}

async fn wait_for_calls(provider: &MockProvider, calls: usize) {
    for _ in 0..200 {
        if provider.calls() >= calls {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("provider was called {} times, expected {}", provider.calls(), calls);
}

#[tokio::test]
async fn test_second_query_is_served_from_cache() {
    let provider = MockProvider::echo("mock");
    let dispatcher = Dispatcher::spawn(providers(&[&provider]), context("en", "fr"));
    let mut sub = dispatcher.subscribe();

    dispatcher.submit_query("Hello");
    let first = next_match(&mut sub).await;
    dispatcher.submit_query("Hello");
    let second = next_match(&mut sub).await;

    assert_eq!(first, second);
    assert_eq!(first.0, ProviderId::new("mock"));
    assert_eq!(first.2[0].target_text(), "fr:Hello");
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn test_cache_keys_are_not_normalized() {
    let provider = MockProvider::echo("mock");
    let dispatcher = Dispatcher::spawn(providers(&[&provider]), context("en", "fr"));
    let mut sub = dispatcher.subscribe();

    dispatcher.submit_query("Hello");
    next_match(&mut sub).await;
    dispatcher.submit_query("Hello ");
    let (_, query, _) = next_match(&mut sub).await;

    assert_eq!(query, "Hello ");
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn test_target_change_invalidates_cache() {
    let provider = MockProvider::echo("mock");
    let dispatcher = Dispatcher::spawn(providers(&[&provider]), context("en", "fr"));
    let mut sub = dispatcher.subscribe();

    dispatcher.submit_query("Hello");
    next_match(&mut sub).await;

    dispatcher.set_target_lang(Some("de")).unwrap();
    assert_eq!(
        next_event(&mut sub).await,
        DispatchEvent::ContextChanged(context("en", "de"))
    );

    dispatcher.submit_query("Hello");
    let (_, _, results) = next_match(&mut sub).await;
    assert_eq!(results[0].target_text(), "de:Hello");
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn test_setting_unset_language_is_a_change() {
    let provider = MockProvider::echo("mock");
    let dispatcher = Dispatcher::spawn(providers(&[&provider]), QueryContext::default());
    let mut sub = dispatcher.subscribe();

    dispatcher.set_source_lang(Some("en")).unwrap();
    assert_eq!(
        next_event(&mut sub).await,
        DispatchEvent::ContextChanged(QueryContext::new(Some("en".to_string()), None))
    );
}

#[tokio::test]
async fn test_same_language_is_a_no_op() {
    let provider = MockProvider::echo("mock");
    let dispatcher = Dispatcher::spawn(providers(&[&provider]), context("en", "fr"));
    let mut sub = dispatcher.subscribe();

    dispatcher.submit_query("Hello");
    next_match(&mut sub).await;

    dispatcher.set_source_lang(Some("en")).unwrap();
    dispatcher.set_target_lang(Some("fr")).unwrap();
    dispatcher.submit_query("Hello");

    // a context change would have been published before the cached answer
    assert!(matches!(
        next_event(&mut sub).await,
        DispatchEvent::MatchFound { .. }
    ));
    assert_eq!(provider.calls(), 1);

    let stats = dispatcher.stats().await.unwrap();
    assert_eq!(stats.providers[0].cached_queries, 1);
}

#[tokio::test]
async fn test_unset_to_unset_is_a_no_op() {
    let provider = MockProvider::echo("mock");
    let dispatcher = Dispatcher::spawn(providers(&[&provider]), QueryContext::default());
    let mut sub = dispatcher.subscribe();

    dispatcher.set_target_lang(None).unwrap();
    dispatcher.submit_query("Hello");

    assert!(matches!(
        next_event(&mut sub).await,
        DispatchEvent::MatchFound { .. }
    ));
}

#[tokio::test]
async fn test_failing_provider_does_not_block_others() {
    let broken = MockProvider::new("broken", Behavior::Fail, false);
    let healthy = MockProvider::echo("healthy");
    let dispatcher = Dispatcher::spawn(providers(&[&broken, &healthy]), context("en", "fr"));
    let mut sub = dispatcher.subscribe();

    dispatcher.submit_query("Hello");
    let (provider, query, results) = next_match(&mut sub).await;
    assert_eq!(provider, ProviderId::new("healthy"));
    assert_eq!(query, "Hello");
    assert_eq!(results.len(), 1);
    assert_no_match(&mut sub, Duration::from_millis(100)).await;

    // failures are not cached, a repeat is a fresh attempt
    dispatcher.submit_query("Hello");
    next_match(&mut sub).await;
    wait_for_calls(&broken, 2).await;
    assert_eq!(healthy.calls(), 1);
}

#[tokio::test]
async fn test_panicking_provider_is_contained() {
    let broken = MockProvider::new("broken", Behavior::Panic, false);
    let healthy = MockProvider::echo("healthy");
    let dispatcher = Dispatcher::spawn(providers(&[&broken, &healthy]), context("en", "fr"));
    let mut sub = dispatcher.subscribe();

    dispatcher.submit_query("Hello");
    let (provider, _, _) = next_match(&mut sub).await;
    assert_eq!(provider, ProviderId::new("healthy"));
    assert_no_match(&mut sub, Duration::from_millis(100)).await;

    let stats = dispatcher.stats().await.unwrap();
    assert_eq!(stats.in_flight(), 0);
}

#[tokio::test]
async fn test_result_issued_before_context_change_is_discarded() {
    let provider = MockProvider::gated("slow");
    let dispatcher = Dispatcher::spawn(providers(&[&provider]), context("en", "fr"));
    let mut sub = dispatcher.subscribe();

    dispatcher.submit_query("Hello");
    wait_for_calls(&provider, 1).await;

    dispatcher.set_target_lang(Some("de")).unwrap();
    assert!(matches!(
        next_event(&mut sub).await,
        DispatchEvent::ContextChanged(_)
    ));
    provider.release(1);

    assert_no_match(&mut sub, Duration::from_millis(200)).await;
    let stats = dispatcher.stats().await.unwrap();
    assert_eq!(stats.providers[0].cached_queries, 0);
    assert_eq!(stats.in_flight(), 0);
}

#[tokio::test]
async fn test_query_after_context_change_gets_new_lookup() {
    let provider = MockProvider::gated("slow");
    let dispatcher = Dispatcher::spawn(providers(&[&provider]), context("en", "fr"));
    let mut sub = dispatcher.subscribe();

    dispatcher.submit_query("Hello");
    wait_for_calls(&provider, 1).await;
    dispatcher.set_target_lang(Some("de")).unwrap();

    // the old marker is gone, so this is not deduplicated against it
    dispatcher.submit_query("Hello");
    wait_for_calls(&provider, 2).await;
    provider.release(2);

    let (_, _, results) = next_match(&mut sub).await;
    assert_eq!(results[0].target_text(), "de:Hello");
    assert_no_match(&mut sub, Duration::from_millis(100)).await;
}

#[tokio::test]
async fn test_concurrent_identical_queries_share_one_lookup() {
    let provider = MockProvider::gated("slow");
    let dispatcher = Dispatcher::spawn(providers(&[&provider]), context("en", "fr"));
    let mut sub = dispatcher.subscribe();

    dispatcher.submit_query("Hello");
    dispatcher.submit_query("Hello");
    let stats = dispatcher.stats().await.unwrap();
    assert_eq!(stats.providers[0].in_flight, 1);

    provider.release(2);
    let (_, query, _) = next_match(&mut sub).await;
    assert_eq!(query, "Hello");
    assert_no_match(&mut sub, Duration::from_millis(100)).await;
    assert_eq!(provider.calls(), 1);

    dispatcher.submit_query("Hello");
    next_match(&mut sub).await;
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn test_every_subscriber_is_notified() {
    let provider = MockProvider::echo("mock");
    let dispatcher = Dispatcher::spawn(providers(&[&provider]), context("en", "fr"));
    let mut first = dispatcher.subscribe();
    let mut second = dispatcher.clone().subscribe();

    dispatcher.submit_query("Hello");
    assert_eq!(next_match(&mut first).await, next_match(&mut second).await);
}

#[tokio::test]
async fn test_unread_subscription_keeps_every_match() {
    let provider = MockProvider::echo("mock");
    let dispatcher = Dispatcher::spawn(providers(&[&provider]), context("en", "fr"));
    let mut sub = dispatcher.subscribe();

    let queries: HashSet<String> = (0..400).map(|i| format!("query {}", i)).collect();
    for query in &queries {
        dispatcher.submit_query(query.clone());
    }
    while dispatcher.stats().await.unwrap().in_flight() > 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let mut received = HashSet::new();
    for _ in 0..queries.len() {
        let (_, query, _) = next_match(&mut sub).await;
        received.insert(query);
    }
    assert_eq!(received, queries);
    assert_no_match(&mut sub, Duration::from_millis(50)).await;
}

#[tokio::test]
async fn test_dropped_subscription_does_not_affect_others() {
    let provider = MockProvider::echo("mock");
    let dispatcher = Dispatcher::spawn(providers(&[&provider]), context("en", "fr"));
    let gone = dispatcher.subscribe();
    let mut sub = dispatcher.subscribe();
    drop(gone);

    dispatcher.submit_query("Hello");
    next_match(&mut sub).await;
    dispatcher.submit_query("Hello");
    next_match(&mut sub).await;
}

#[tokio::test]
async fn test_invalidate_clears_only_that_provider() {
    let first = MockProvider::echo("first");
    let second = MockProvider::echo("second");
    let dispatcher = Dispatcher::spawn(providers(&[&first, &second]), context("en", "fr"));
    let mut sub = dispatcher.subscribe();

    dispatcher.submit_query("Hello");
    next_match(&mut sub).await;
    next_match(&mut sub).await;

    dispatcher.invalidate(&ProviderId::new("first")).unwrap();
    let stats = dispatcher.stats().await.unwrap();
    assert_eq!(stats.providers[0].cached_queries, 0);
    assert_eq!(stats.providers[1].cached_queries, 1);

    dispatcher.submit_query("Hello");
    next_match(&mut sub).await;
    next_match(&mut sub).await;
    assert_eq!(first.calls(), 2);
    assert_eq!(second.calls(), 1);
}

#[tokio::test]
async fn test_invalidate_discards_pending_lookup() {
    let provider = MockProvider::gated("slow");
    let dispatcher = Dispatcher::spawn(providers(&[&provider]), context("en", "fr"));
    let mut sub = dispatcher.subscribe();

    dispatcher.submit_query("Hello");
    wait_for_calls(&provider, 1).await;
    dispatcher.invalidate(&ProviderId::new("slow")).unwrap();
    provider.release(1);

    assert_no_match(&mut sub, Duration::from_millis(200)).await;
    assert_eq!(dispatcher.stats().await.unwrap().in_flight(), 0);

    // not deduplicated against the abandoned lookup
    dispatcher.submit_query("Hello");
    wait_for_calls(&provider, 2).await;
    provider.release(1);
    let (_, query, _) = next_match(&mut sub).await;
    assert_eq!(query, "Hello");
}

#[tokio::test]
async fn test_invalidate_unknown_provider_is_harmless() {
    let provider = MockProvider::echo("mock");
    let dispatcher = Dispatcher::spawn(providers(&[&provider]), context("en", "fr"));
    let mut sub = dispatcher.subscribe();

    dispatcher.submit_query("Hello");
    next_match(&mut sub).await;
    dispatcher.invalidate(&ProviderId::new("missing")).unwrap();
    dispatcher.submit_query("Hello");
    next_match(&mut sub).await;
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn test_close_shuts_providers_down() {
    let slow = MockProvider::gated("slow");
    let fast = MockProvider::echo("fast");
    let dispatcher = Dispatcher::spawn(providers(&[&slow, &fast]), context("en", "fr"));
    let mut sub = dispatcher.subscribe();

    dispatcher.submit_query("Hello");
    next_match(&mut sub).await;
    wait_for_calls(&slow, 1).await;

    dispatcher.close().await.unwrap();
    assert!(slow.shut_down.load(Ordering::SeqCst));
    assert!(fast.shut_down.load(Ordering::SeqCst));
    slow.release(1);

    assert_eq!(next_event(&mut sub).await, DispatchEvent::Closed);
    assert!(sub.recv().await.is_none());
    assert!(dispatcher.is_closed());

    // everything after close is inert
    dispatcher.submit_query("Hello");
    assert!(matches!(
        dispatcher.set_source_lang(Some("de")),
        Err(TmError::DispatcherClosed)
    ));
    assert!(matches!(
        dispatcher.stats().await,
        Err(TmError::DispatcherClosed)
    ));
    assert!(dispatcher.close().await.is_ok());
    assert!(dispatcher.subscribe().recv().await.is_none());
    assert!(matches!(
        dispatcher.invalidate(&ProviderId::new("fast")),
        Err(TmError::DispatcherClosed)
    ));
}
