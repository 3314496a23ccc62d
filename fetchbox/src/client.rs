//! The fetch client.
//!
//! [`Client`] ties the pieces together: it validates the key, asks the
//! [`CacheStore`] for a fresh value or a flight to attach to, and when it
//! has to start a flight, builds the request target and runs the retry loop
//! against its [`Transport`].

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use fetchbox_core::{
    CacheKey, CorrelationId, RequestAttempt, RequestTarget, Transport, TransportFailure,
};
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::{Instant, timeout_at};
use tracing::{Instrument, debug, error, info_span, warn};

use crate::config::ClientConfig;
use crate::error::{ErrorKind, FetchError, RequestContext};
use crate::flight::{Flight, FlightId};
use crate::metrics::{self, Served};
use crate::options::FetchOptions;
use crate::retry::{RetryDecision, RetryPolicy};
use crate::store::{Acquired, CacheStore};
use crate::target::TargetBuilder;

struct ClientInner {
    transport: Arc<dyn Transport>,
    store: CacheStore,
    targets: TargetBuilder,
    defaults: FetchOptions,
}

/// Cached, coalescing, retrying JSON client.
///
/// Cloning is cheap; clones share the transport and the store.
///
/// ```no_run
/// # use std::sync::Arc;
/// # use fetchbox::{Client, FetchOptions, Transport};
/// # async fn run(transport: Arc<dyn Transport>) -> Result<(), fetchbox::FetchError> {
/// let client = Client::builder(transport)
///     .base_url("http://localhost:5050/")
///     .build();
///
/// let users = client.fetch_json("/data/users.json", &FetchOptions::default()).await?;
/// println!("{users}");
///
/// client.clear_cache(Some("/data/users.json"));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Client with its own store, no base URL and default options.
    pub fn new<T>(transport: T) -> Self
    where
        T: Transport + 'static,
    {
        Self::builder(transport).build()
    }

    /// Starts building a client over `transport`.
    pub fn builder<T>(transport: T) -> ClientBuilder
    where
        T: Transport + 'static,
    {
        ClientBuilder::new(Arc::new(transport))
    }

    /// Client configured from a [`ClientConfig`].
    pub fn from_config<T>(transport: T, config: &ClientConfig) -> Self
    where
        T: Transport + 'static,
    {
        let builder = Self::builder(transport).defaults(config.defaults.clone());
        match &config.base_url {
            Some(base_url) => builder.base_url(base_url.clone()).build(),
            None => builder.build(),
        }
    }

    /// The store backing this client.
    pub fn store(&self) -> &CacheStore {
        &self.inner.store
    }

    /// Options used by [`fetch`](Self::fetch).
    pub fn defaults(&self) -> &FetchOptions {
        &self.inner.defaults
    }

    /// [`fetch_json`](Self::fetch_json) with the client's default options.
    pub async fn fetch(&self, key: &str) -> Result<Arc<Value>, FetchError> {
        self.fetch_json(key, &self.inner.defaults).await
    }

    /// Fetches the JSON document named by `key`.
    ///
    /// A fresh cached value is returned without touching the transport. If a
    /// request for the key is already running the caller shares its outcome;
    /// otherwise a new request is started, retried per `options`, and its
    /// success cached for `options.ttl`.
    ///
    /// Cancelling `options.cancel` detaches this caller only and yields
    /// [`FetchError::Cancelled`].
    pub async fn fetch_json(
        &self,
        key: &str,
        options: &FetchOptions,
    ) -> Result<Arc<Value>, FetchError> {
        let key = CacheKey::new(key)?;
        self.fetch_key(&key, options).await
    }

    /// Fetches `key` and deserializes the payload into `T`.
    ///
    /// The cached value stays untyped, so callers may read the same key as
    /// different types.
    pub async fn fetch_json_as<T>(&self, key: &str, options: &FetchOptions) -> Result<T, FetchError>
    where
        T: DeserializeOwned,
    {
        let key = CacheKey::new(key)?;
        let value = self.fetch_key(&key, options).await?;
        T::deserialize(&*value).map_err(|err| FetchError::Decode {
            key,
            type_name: std::any::type_name::<T>(),
            message: err.to_string(),
        })
    }

    /// Evicts `key`, or every key when `None`.
    ///
    /// Requests already running are unaffected: they still deliver to their
    /// callers and cache a successful result.
    pub fn clear_cache(&self, key: Option<&str>) {
        match key {
            None => {
                self.inner.store.evict_all();
                debug!("cache cleared");
            }
            Some(raw) => match CacheKey::new(raw) {
                Ok(key) => {
                    let evicted = self.inner.store.evict(&key);
                    debug!(%key, evicted, "cache entry cleared");
                }
                Err(err) => debug!(key = raw, %err, "nothing to clear for invalid key"),
            },
        }
    }

    async fn fetch_key(
        &self,
        key: &CacheKey,
        options: &FetchOptions,
    ) -> Result<Arc<Value>, FetchError> {
        if options.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
            return Err(FetchError::Cancelled { key: key.clone() });
        }

        let acquired = self
            .inner
            .store
            .acquire(key, |id| self.start_flight(id, key, options));
        let attachment = match acquired {
            Acquired::Fresh(value) => {
                debug!(%key, "served from cache");
                metrics::record_served(Served::Hit);
                return Ok(value);
            }
            Acquired::Joined(attachment) => {
                debug!(%key, flight = attachment.flight().id(), "joined request in flight");
                metrics::record_served(Served::Coalesced);
                attachment
            }
            Acquired::Started(attachment) => {
                debug!(%key, flight = attachment.flight().id(), "started request");
                metrics::record_served(Served::Miss);
                attachment
            }
        };

        match &options.cancel {
            None => attachment.await,
            Some(cancel) => tokio::select! {
                outcome = attachment => outcome,
                () = cancel.cancelled() => {
                    debug!(%key, "caller cancelled");
                    Err(FetchError::Cancelled { key: key.clone() })
                }
            },
        }
    }

    /// Builds the flight for a new request. Runs under the store's shard
    /// lock, so it only prepares the future; nothing executes until a caller
    /// polls it.
    fn start_flight(&self, id: FlightId, key: &CacheKey, options: &FetchOptions) -> Flight {
        let correlation_id = CorrelationId::new();
        let target = self.inner.targets.build(key, options.cache_bust);
        let span = info_span!(
            "fetchbox.flight",
            key = %key,
            flight = id,
            correlation_id = %correlation_id,
            target = %target,
        );

        let inner = self.inner.clone();
        let key = key.clone();
        let ttl = options.ttl;
        let timeout = options.timeout;
        let policy = RetryPolicy::new(options.retries);

        let future = async move {
            // The shared outcome must never be poisoned by a panic.
            let attempts = inner.run_attempts(&key, &target, correlation_id, policy, timeout);
            let outcome = match AssertUnwindSafe(attempts).catch_unwind().await {
                Ok(result) => result.map(Arc::new),
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!(%key, %correlation_id, %message, "request panicked");
                    metrics::record_failure(ErrorKind::Panicked);
                    Err(FetchError::Panicked { key: key.clone(), message })
                }
            };
            if !inner.store.publish(&key, id, &outcome, ttl) {
                debug!("outcome not cached");
            }
            outcome
        }
        .instrument(span)
        .boxed();

        Flight::new(id, correlation_id, future)
    }
}

impl ClientInner {
    async fn run_attempts(
        &self,
        key: &CacheKey,
        target: &RequestTarget,
        correlation_id: CorrelationId,
        policy: RetryPolicy,
        timeout: Duration,
    ) -> Result<Value, FetchError> {
        let transport = self.transport.name();
        let mut number = 1;
        loop {
            let attempt = RequestAttempt::new(correlation_id, number, timeout);
            let started = Instant::now();
            let result = timeout_at(attempt.deadline, self.transport.send(target, &attempt))
                .await
                .unwrap_or(Err(TransportFailure::Timeout { after: timeout }));
            let elapsed = started.elapsed();

            let failure = match result {
                Ok(value) => {
                    metrics::record_transport(transport, "ok", elapsed);
                    debug!(attempt = number, elapsed_ms = elapsed.as_millis(), "request succeeded");
                    return Ok(value);
                }
                Err(failure) => failure,
            };
            let kind = ErrorKind::from(&failure);
            metrics::record_transport(transport, kind.as_str(), elapsed);

            match policy.decide(&failure, number) {
                RetryDecision::RetryAfter(delay) => {
                    warn!(
                        attempt = number,
                        delay_ms = delay.as_millis(),
                        error = %failure,
                        "attempt failed, retrying"
                    );
                    metrics::record_retry(kind);
                    tokio::time::sleep(delay).await;
                    number += 1;
                }
                RetryDecision::GiveUp => {
                    let err = FetchError::from_failure(
                        RequestContext {
                            key: key.clone(),
                            correlation_id,
                            attempts: number,
                        },
                        failure,
                    );
                    error!(
                        key = %key,
                        correlation_id = %correlation_id,
                        attempts = number,
                        error = %err,
                        "request failed"
                    );
                    metrics::record_failure(kind);
                    return Err(err);
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("transport", &self.inner.transport.name())
            .field("base_url", &self.inner.targets.base())
            .field("entries", &self.inner.store.len())
            .finish()
    }
}

/// Builder for [`Client`].
pub struct ClientBuilder {
    transport: Arc<dyn Transport>,
    store: Option<CacheStore>,
    targets: TargetBuilder,
    defaults: FetchOptions,
}

impl ClientBuilder {
    fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            store: None,
            targets: TargetBuilder::new(),
            defaults: FetchOptions::default(),
        }
    }

    /// Shares an existing store instead of creating one.
    pub fn store(mut self, store: CacheStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Base URL that relative keys are resolved against.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.targets = TargetBuilder::with_base(base_url);
        self
    }

    /// Options used by [`Client::fetch`].
    pub fn defaults(mut self, defaults: FetchOptions) -> Self {
        self.defaults = defaults;
        self
    }

    /// Builds the client.
    pub fn build(self) -> Client {
        Client {
            inner: Arc::new(ClientInner {
                transport: self.transport,
                store: self.store.unwrap_or_default(),
                targets: self.targets,
                defaults: self.defaults,
            }),
        }
    }
}
