//! Synthetic navigation data.
//!
//! [`NavigationSynthesizer`] asks a generative [`Provider`] for routes that
//! fit a domain description and for user sessions that end on a given
//! route. Every call goes through one shared [`AdmissionGate`], which bounds
//! the number of in-flight requests and pauses all of them after a
//! rate-limit response.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::sync::{Mutex, Semaphore, SemaphorePermit, watch};
use tracing::{debug, info, warn};

use wayfinder_llm::{ChatMessage, ChatRequest, Provider, ResponseFormat, complete_structured};
use wayfinder_types::config::GenerationConfig;
use wayfinder_types::{IntentType, Result, Route, Session, WayfinderError};

/// Source of routes and sessions.
///
/// The data cache depends only on this trait.
#[async_trait]
pub trait NavigationSource: Send + Sync {
    /// Produce up to `count` routes for an application described by `description`.
    async fn generate_routes(&self, description: &str, count: usize) -> Result<Vec<Route>>;

    /// Produce up to `count` sessions that end on `route`.
    async fn generate_sessions(&self, route: &Route, count: usize) -> Result<Vec<Session>>;

    /// The same sessions as a stream of batches, yielded as each completes.
    ///
    /// Consumers can keep finished batches when a later one fails. The
    /// default yields a single batch.
    fn session_batches<'a>(
        &'a self,
        route: &'a Route,
        count: usize,
    ) -> BoxStream<'a, Result<Vec<Session>>> {
        stream::once(self.generate_sessions(route, count)).boxed()
    }
}

// ── Admission gate ───────────────────────────────────────────────────────

/// Bounded admission for generation calls, with a gate-wide cooldown.
///
/// A rate-limited caller [`trip`](Self::trip)s the gate while it still holds
/// its pass. From then on no caller is admitted until the cooldown started
/// by [`pause`](Self::pause) has finished.
#[derive(Debug)]
pub struct AdmissionGate {
    permits: Semaphore,
    capacity: u32,
    cooldown: Duration,
    epoch: AtomicU64,
    cooling: watch::Sender<bool>,
    pausing: Mutex<()>,
}

/// A held gate slot and the cooldown epoch it was admitted under.
pub struct GatePass<'a> {
    _permit: SemaphorePermit<'a>,
    epoch: u64,
}

impl GatePass<'_> {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

fn gate_closed() -> WayfinderError {
    WayfinderError::Generation {
        reason: "admission gate closed".into(),
    }
}

impl AdmissionGate {
    pub fn new(capacity: usize, cooldown: Duration) -> Self {
        let capacity = u32::try_from(capacity.max(1)).unwrap_or(u32::MAX);
        Self {
            permits: Semaphore::new(capacity as usize),
            capacity,
            cooldown,
            epoch: AtomicU64::new(0),
            cooling: watch::Sender::new(false),
            pausing: Mutex::new(()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Number of cooldowns completed so far.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Whether a cooldown is pending or running.
    pub fn is_cooling(&self) -> bool {
        *self.cooling.borrow()
    }

    /// Wait for a free slot outside any cooldown.
    pub async fn admit(&self) -> Result<GatePass<'_>> {
        let mut resumed = self.cooling.subscribe();
        loop {
            resumed
                .wait_for(|cooling| !*cooling)
                .await
                .map_err(|_| gate_closed())?;
            let permit = self.permits.acquire().await.map_err(|_| gate_closed())?;
            // The gate may have tripped while this caller queued for a slot.
            if self.is_cooling() {
                drop(permit);
                continue;
            }
            return Ok(GatePass {
                _permit: permit,
                epoch: self.epoch(),
            });
        }
    }

    /// Stop admitting callers until the next cooldown completes.
    ///
    /// Call this on a rate limit, before releasing the pass. A no-op when a
    /// cooldown has finished since `admitted_epoch`.
    pub fn trip(&self, admitted_epoch: u64) {
        // Checked under the channel lock so a cooldown cannot finish in between.
        self.cooling.send_if_modified(|cooling| {
            if *cooling || self.epoch() != admitted_epoch {
                return false;
            }
            *cooling = true;
            true
        });
    }

    /// Hold every slot for the cooldown period, then reopen the gate.
    ///
    /// `admitted_epoch` is the epoch of the rate-limited call. If a cooldown
    /// has finished since then, this returns at once. The caller must have
    /// released its own pass first.
    pub async fn pause(&self, admitted_epoch: u64) -> Result<()> {
        let _pausing = self.pausing.lock().await;
        if self.epoch() != admitted_epoch {
            return Ok(());
        }
        self.cooling.send_replace(true);
        let _all = self
            .permits
            .acquire_many(self.capacity)
            .await
            .map_err(|_| gate_closed())?;
        tokio::time::sleep(self.cooldown).await;
        self.cooling.send_modify(|cooling| {
            self.epoch.fetch_add(1, Ordering::AcqRel);
            *cooling = false;
        });
        Ok(())
    }
}

// ── Wire shapes ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RouteList {
    routes: Vec<RouteItem>,
}

#[derive(Debug, Deserialize)]
struct RouteItem {
    id: String,
    path: String,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SessionList {
    sessions: Vec<SessionItem>,
}

#[derive(Debug, Deserialize)]
struct SessionItem {
    id: String,
    context: String,
    #[serde(default, alias = "intention_type")]
    intent: Option<IntentType>,
}

fn route_list_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "routes": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "id": {"type": "string"},
                        "path": {"type": "string"},
                        "tags": {"type": "array", "items": {"type": "string"}}
                    },
                    "required": ["id", "path", "tags"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["routes"],
        "additionalProperties": false
    })
}

fn session_list_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "sessions": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "id": {"type": "string"},
                        "context": {"type": "string"},
                        "intent": {"type": "string", "enum": ["search", "navigation"]}
                    },
                    "required": ["id", "context", "intent"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["sessions"],
        "additionalProperties": false
    })
}

const ROUTE_SYSTEM_PROMPT: &str = "\
You design the navigation map of a web application for UX research.
Rules:
- Every route has a unique id and a unique path.
- Paths are realistic and hierarchical, nesting where the application would (e.g. /bookings/:id/edit).
- Give each route 5 to 10 short tags mixing what the page does with words from its path.
Answer only with the requested JSON.";

const SESSION_SYSTEM_PROMPT: &str = "\
You synthesize user sessions for a web application route, for UX research.
Rules:
- Every session has a unique id.
- The context is what the user typed into a search box (intent \"search\") or a short description of the click or menu action that took them there (intent \"navigation\").
- Mix both intents. Write contexts the way real users do.
- In roughly a quarter of the contexts use typos, synonyms or related keywords instead of the route's own words.
Answer only with the requested JSON.";

// ── Synthesizer ──────────────────────────────────────────────────────────

/// [`NavigationSource`] backed by a generative provider.
pub struct NavigationSynthesizer {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f64,
    batch_size: usize,
    gate: Arc<AdmissionGate>,
}

impl NavigationSynthesizer {
    pub fn new(provider: Arc<dyn Provider>, config: &GenerationConfig) -> Self {
        let gate = AdmissionGate::new(
            config.max_in_flight,
            Duration::from_secs(config.rate_limit_cooldown_secs),
        );
        Self {
            provider,
            model: config.model.clone(),
            temperature: config.temperature,
            batch_size: config.session_batch_size.max(1),
            gate: Arc::new(gate),
        }
    }

    /// Share an existing gate, e.g. between synthesizers for different models.
    pub fn with_gate(mut self, gate: Arc<AdmissionGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn gate(&self) -> &Arc<AdmissionGate> {
        &self.gate
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    async fn session_batch(&self, route: &Route, size: usize) -> Result<Vec<Session>> {
        let request = self.request(
            SESSION_SYSTEM_PROMPT,
            format!(
                "Generate {size} user sessions that end on this route.\n\
                 id: {}\npath: {}\ntags: {}",
                route.id,
                route.path,
                route.tags.join(", ")
            ),
            ResponseFormat::json_schema("session_list", session_list_schema()),
        );

        let Some(list) = self.call::<SessionList>(&request).await? else {
            warn!(route = %route.id, requested = size, "session batch unusable, continuing with an empty batch");
            return Ok(Vec::new());
        };
        if list.sessions.is_empty() {
            warn!(route = %route.id, requested = size, "session batch came back empty");
        }

        Ok(list
            .sessions
            .into_iter()
            .filter(|s| !s.context.trim().is_empty())
            .take(size)
            .map(|item| Session {
                id: item.id,
                route_id: route.id.clone(),
                context: item.context,
                intent: item.intent,
            })
            .collect())
    }

    fn request(&self, system: &str, user: String, format: ResponseFormat) -> ChatRequest {
        ChatRequest::new(
            self.model.clone(),
            vec![ChatMessage::system(system), ChatMessage::user(user)],
        )
        .with_temperature(self.temperature)
        .with_response_format(format)
    }

    /// One structured call through the gate, pausing and retrying on rate limits.
    async fn call<T: DeserializeOwned>(&self, request: &ChatRequest) -> Result<Option<T>> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let pass = self.gate.admit().await?;
            let epoch = pass.epoch();
            debug!(model = %self.model, attempt, "generation request");
            let outcome = complete_structured::<T>(self.provider.as_ref(), request).await;
            if matches!(&outcome, Err(e) if e.is_rate_limited()) {
                self.gate.trip(epoch);
            }
            drop(pass);

            match outcome {
                Ok(parsed) => return Ok(parsed),
                Err(e) if e.is_rate_limited() => {
                    // No retry ceiling: a persistently limited endpoint stalls here.
                    warn!(
                        attempt,
                        cooldown_secs = self.gate.cooldown().as_secs(),
                        error = %e,
                        "rate limited, pausing all generation"
                    );
                    self.gate.pause(epoch).await?;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Split `count` into chunks of at most `batch_size`.
fn batch_sizes(count: usize, batch_size: usize) -> Vec<usize> {
    let batch_size = batch_size.max(1);
    let mut sizes = Vec::with_capacity(count.div_ceil(batch_size));
    let mut remaining = count;
    while remaining > 0 {
        let size = remaining.min(batch_size);
        sizes.push(size);
        remaining -= size;
    }
    sizes
}

#[async_trait]
impl NavigationSource for NavigationSynthesizer {
    async fn generate_routes(&self, description: &str, count: usize) -> Result<Vec<Route>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let request = self.request(
            ROUTE_SYSTEM_PROMPT,
            format!("Generate {count} routes for this application: {description}"),
            ResponseFormat::json_schema("route_list", route_list_schema()),
        );

        let list = self.call::<RouteList>(&request).await?;
        let items = list.map(|l| l.routes).unwrap_or_default();

        let mut seen = std::collections::HashSet::new();
        let routes: Vec<Route> = items
            .into_iter()
            .filter(|item| !item.id.trim().is_empty() && !item.path.trim().is_empty())
            .filter(|item| {
                let fresh = seen.insert(item.id.clone());
                if !fresh {
                    warn!(id = %item.id, "dropping route with duplicate id");
                }
                fresh
            })
            .take(count)
            .map(|item| Route::new(item.id, item.path, item.tags))
            .collect();

        if routes.is_empty() {
            return Err(WayfinderError::Generation {
                reason: format!("no routes generated for '{description}'"),
            });
        }
        info!(requested = count, generated = routes.len(), "routes generated");
        Ok(routes)
    }

    async fn generate_sessions(&self, route: &Route, count: usize) -> Result<Vec<Session>> {
        let mut batches = self.session_batches(route, count);
        let mut sessions = Vec::with_capacity(count);
        while let Some(batch) = batches.next().await {
            sessions.extend(batch?);
        }
        info!(
            route = %route.id,
            requested = count,
            generated = sessions.len(),
            "sessions generated"
        );
        Ok(sessions)
    }

    /// Batches of at most `batch_size` run concurrently through the gate.
    fn session_batches<'a>(
        &'a self,
        route: &'a Route,
        count: usize,
    ) -> BoxStream<'a, Result<Vec<Session>>> {
        let sizes = batch_sizes(count, self.batch_size);
        if sizes.is_empty() {
            return stream::empty().boxed();
        }
        let width = sizes.len();
        stream::iter(sizes)
            .map(move |size| self.session_batch(route, size))
            .buffer_unordered(width)
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, AtomicUsize};
    use std::sync::Mutex as StdMutex;

    use wayfinder_llm::types::{ChatResponse, Choice};
    use wayfinder_llm::{ProviderError, Result as ProviderResult};

    #[derive(Clone)]
    enum Reply {
        Content(String),
        RateLimited,
        AuthFailed,
    }

    struct MockProvider {
        script: StdMutex<VecDeque<Reply>>,
        fallback: Reply,
        delay: Duration,
        error_delay: Duration,
        calls: AtomicU32,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        prompts: StdMutex<Vec<String>>,
        starts: StdMutex<Vec<tokio::time::Instant>>,
    }

    impl MockProvider {
        fn new(script: Vec<Reply>, fallback: Reply) -> Self {
            Self {
                script: StdMutex::new(script.into()),
                fallback,
                delay: Duration::ZERO,
                error_delay: Duration::ZERO,
                calls: AtomicU32::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                prompts: StdMutex::new(Vec::new()),
                starts: StdMutex::new(Vec::new()),
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self.error_delay = delay;
            self
        }

        fn with_error_delay(mut self, delay: Duration) -> Self {
            self.error_delay = delay;
            self
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Provider for MockProvider {
        fn name(&self) -> &str {
            "mock"
        }

        async fn complete(&self, request: &ChatRequest) -> ProviderResult<ChatResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.starts.lock().unwrap().push(tokio::time::Instant::now());
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if let Some(user) = request.messages.last().and_then(|m| m.content.clone()) {
                self.prompts.lock().unwrap().push(user);
            }

            let reply = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| self.fallback.clone());
            let delay = match reply {
                Reply::Content(_) => self.delay,
                _ => self.error_delay,
            };
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            match reply {
                Reply::Content(content) => Ok(ChatResponse {
                    id: "mock".into(),
                    choices: vec![Choice {
                        index: 0,
                        message: ChatMessage::assistant(content),
                        finish_reason: Some("stop".into()),
                    }],
                    usage: None,
                    model: "mock".into(),
                }),
                Reply::RateLimited => Err(ProviderError::RateLimited {
                    retry_after_ms: 1000,
                }),
                Reply::AuthFailed => Err(ProviderError::AuthFailed("bad key".into())),
            }
        }
    }

    fn two_sessions() -> Reply {
        Reply::Content(
            json!({"sessions": [
                {"id": "a", "context": "find flights to Rome", "intent": "search"},
                {"id": "b", "context": "clicked Flights in the top menu", "intent": "navigation"}
            ]})
            .to_string(),
        )
    }

    fn routes_reply() -> Reply {
        Reply::Content(
            json!({"routes": [
                {"id": "flights", "path": "/flights", "tags": ["flights", "search"]},
                {"id": "flights", "path": "/flights/dupe", "tags": []},
                {"id": "bookings", "path": "/bookings", "tags": ["bookings"]}
            ]})
            .to_string(),
        )
    }

    fn config(max_in_flight: usize, batch: usize) -> GenerationConfig {
        GenerationConfig {
            max_in_flight,
            session_batch_size: batch,
            ..GenerationConfig::default()
        }
    }

    fn synth(provider: &Arc<MockProvider>, cfg: &GenerationConfig) -> NavigationSynthesizer {
        NavigationSynthesizer::new(provider.clone() as Arc<dyn Provider>, cfg)
    }

    fn route() -> Route {
        Route::new("flights", "/flights", vec!["flights".into()])
    }

    #[test]
    fn batch_sizes_split() {
        assert_eq!(batch_sizes(120, 50), vec![50, 50, 20]);
        assert_eq!(batch_sizes(50, 50), vec![50]);
        assert!(batch_sizes(0, 50).is_empty());
    }

    #[tokio::test]
    async fn zero_counts_make_no_calls() {
        let provider = Arc::new(MockProvider::new(vec![], two_sessions()));
        let s = synth(&provider, &config(5, 50));
        assert!(s.generate_routes("anything", 0).await.unwrap().is_empty());
        assert!(s.generate_sessions(&route(), 0).await.unwrap().is_empty());
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn routes_are_parsed_and_deduplicated() {
        let provider = Arc::new(MockProvider::new(vec![routes_reply()], two_sessions()));
        let s = synth(&provider, &config(5, 50));
        let routes = s.generate_routes("flight booking admin panel", 5).await.unwrap();
        let ids: Vec<&str> = routes.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["flights", "bookings"]);
        assert_eq!(routes[0].tags, vec!["flights", "search"]);
        assert!(provider.prompts.lock().unwrap()[0].contains("flight booking admin panel"));
    }

    #[tokio::test]
    async fn no_routes_is_a_generation_error() {
        let provider = Arc::new(MockProvider::new(
            vec![Reply::Content(r#"{"routes": []}"#.into())],
            Reply::Content("garbage".into()),
        ));
        let s = synth(&provider, &config(5, 50));
        let err = s.generate_routes("x", 3).await.unwrap_err();
        assert!(matches!(err, WayfinderError::Generation { .. }));
        let err = s.generate_routes("x", 3).await.unwrap_err();
        assert!(matches!(err, WayfinderError::Generation { .. }));
    }

    #[tokio::test]
    async fn sessions_are_batched_and_bound_to_route() {
        let provider = Arc::new(MockProvider::new(vec![], two_sessions()));
        let s = synth(&provider, &config(5, 50));
        let sessions = s.generate_sessions(&route(), 120).await.unwrap();
        assert_eq!(provider.calls(), 3);
        assert_eq!(sessions.len(), 6);
        assert!(sessions.iter().all(|s| s.route_id == "flights"));

        let prompts = provider.prompts.lock().unwrap();
        let full = prompts.iter().filter(|p| p.starts_with("Generate 50 ")).count();
        let tail = prompts.iter().filter(|p| p.starts_with("Generate 20 ")).count();
        assert_eq!((full, tail), (2, 1));
    }

    #[tokio::test]
    async fn batch_never_exceeds_requested_size() {
        let provider = Arc::new(MockProvider::new(vec![], two_sessions()));
        let s = synth(&provider, &config(5, 50));
        let sessions = s.generate_sessions(&route(), 1).await.unwrap();
        assert_eq!(sessions.len(), 1);
    }

    #[tokio::test]
    async fn malformed_batch_is_tolerated() {
        let provider = Arc::new(MockProvider::new(
            vec![Reply::Content("{oops".into())],
            two_sessions(),
        ));
        let s = synth(&provider, &config(5, 2));
        let sessions = s.generate_sessions(&route(), 4).await.unwrap();
        assert_eq!(provider.calls(), 2);
        assert_eq!(sessions.len(), 2);
    }

    #[tokio::test]
    async fn auth_failure_propagates() {
        let provider = Arc::new(MockProvider::new(vec![], Reply::AuthFailed));
        let s = synth(&provider, &config(5, 50));
        let err = s.generate_sessions(&route(), 10).await.unwrap_err();
        assert!(matches!(err, WayfinderError::Provider { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_pauses_then_resumes() {
        let provider = Arc::new(MockProvider::new(
            vec![Reply::RateLimited],
            two_sessions(),
        ));
        let s = synth(&provider, &config(5, 50));
        let started = tokio::time::Instant::now();
        let sessions = s.generate_sessions(&route(), 2).await.unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(provider.calls(), 2);
        assert!(started.elapsed() >= Duration::from_secs(60));
        assert_eq!(s.gate().epoch(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_rate_limits_share_one_cooldown() {
        let provider = Arc::new(
            MockProvider::new(vec![Reply::RateLimited, Reply::RateLimited], two_sessions())
                .with_delay(Duration::from_secs(1)),
        );
        let s = synth(&provider, &config(2, 2));
        let started = tokio::time::Instant::now();
        let sessions = s.generate_sessions(&route(), 4).await.unwrap();
        assert_eq!(sessions.len(), 4);
        assert_eq!(provider.calls(), 4);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(60));
        assert!(elapsed < Duration::from_secs(120), "stacked cooldowns: {elapsed:?}");
        assert_eq!(s.gate().epoch(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn no_call_starts_during_cooldown() {
        let provider = Arc::new(
            MockProvider::new(vec![Reply::RateLimited], two_sessions())
                .with_delay(Duration::from_millis(100))
                .with_error_delay(Duration::from_millis(50)),
        );
        let s = synth(&provider, &config(2, 1));
        let started = tokio::time::Instant::now();
        let sessions = s.generate_sessions(&route(), 4).await.unwrap();
        assert_eq!(sessions.len(), 4);
        assert_eq!(provider.calls(), 5);

        let offsets: Vec<Duration> = provider
            .starts
            .lock()
            .unwrap()
            .iter()
            .map(|t| t.duration_since(started))
            .collect();
        // The 429 lands at 50ms; nothing may start until the cooldown ends.
        let rate_limited_at = Duration::from_millis(50);
        let during = offsets
            .iter()
            .filter(|d| **d >= rate_limited_at && **d < Duration::from_secs(60))
            .count();
        assert_eq!(during, 0, "calls started during cooldown: {offsets:?}");
        assert_eq!(offsets.iter().filter(|d| **d < rate_limited_at).count(), 2);
        assert_eq!(s.gate().epoch(), 1);
        assert!(!s.gate().is_cooling());
    }

    #[tokio::test(start_paused = true)]
    async fn tripped_gate_holds_back_waiters() {
        let gate = Arc::new(AdmissionGate::new(1, Duration::from_secs(60)));
        let pass = gate.admit().await.unwrap();
        let epoch = pass.epoch();

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move {
                let _pass = gate.admit().await.unwrap();
                tokio::time::Instant::now()
            })
        };
        tokio::task::yield_now().await;

        let tripped_at = tokio::time::Instant::now();
        gate.trip(epoch);
        drop(pass);
        gate.pause(epoch).await.unwrap();

        let admitted_at = waiter.await.unwrap();
        assert!(admitted_at.duration_since(tripped_at) >= Duration::from_secs(60));
    }

    #[tokio::test]
    async fn stale_trip_is_ignored() {
        let gate = AdmissionGate::new(2, Duration::ZERO);
        let epoch = gate.admit().await.unwrap().epoch();
        gate.pause(epoch).await.unwrap();
        assert_eq!(gate.epoch(), 1);

        gate.trip(epoch);
        assert!(!gate.is_cooling());
        gate.pause(epoch).await.unwrap();
        assert_eq!(gate.epoch(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn gate_bounds_in_flight_calls() {
        let provider = Arc::new(
            MockProvider::new(vec![], two_sessions()).with_delay(Duration::from_millis(100)),
        );
        let s = synth(&provider, &config(2, 2));
        let sessions = s.generate_sessions(&route(), 20).await.unwrap();
        assert_eq!(sessions.len(), 20);
        assert_eq!(provider.calls(), 10);
        assert!(provider.max_in_flight.load(Ordering::SeqCst) <= 2);
        assert_eq!(provider.max_in_flight.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn batches_stream_lazily() {
        let provider = Arc::new(MockProvider::new(vec![], two_sessions()));
        let s = synth(&provider, &config(5, 2));
        let route = route();
        let stream = s.session_batches(&route, 6);
        assert_eq!(provider.calls(), 0);
        let batches: Vec<_> = stream.collect().await;
        assert_eq!(batches.len(), 3);
        assert_eq!(provider.calls(), 3);
    }
}
