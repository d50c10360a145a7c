//! Provider failover.
//!
//! A [`ProviderRouter`] holds interchangeable backends for one logical call
//! and tries them in priority order, each under the same retry and timeout
//! policy, until one succeeds. It knows nothing about workflows.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{sleep, timeout};
use tracing::{debug, instrument, warn};

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::error::{Error, Result};
use crate::metrics;
use crate::tools::{ToolCallable, ToolOutput, ToolRequest};

/// Retry and timeout policy applied to every backend.
#[derive(Debug, Clone)]
pub struct CallPolicy {
    pub attempts: u32,
    /// Attempt `n` failing waits `backoff * n` before the next one
    pub backoff: Duration,
    pub timeout: Duration,
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self {
            attempts: 1,
            backoff: Duration::ZERO,
            timeout: Duration::from_secs(300),
        }
    }
}

struct Provider<B> {
    name: String,
    priority: u32,
    backend: B,
    breaker: Option<Arc<CircuitBreaker>>,
}

/// Successful routed call.
#[derive(Debug, Clone)]
pub struct Routed<T> {
    pub value: T,
    /// Backend that produced `value`
    pub provider: String,
    /// Backends that failed (or were skipped) before it, in order
    pub failed: Vec<String>,
}

/// Ordered failover over backends of type `B`.
pub struct ProviderRouter<B> {
    providers: Vec<Provider<B>>,
    policy: CallPolicy,
    breaker_config: Option<CircuitBreakerConfig>,
}

impl<B> ProviderRouter<B> {
    pub fn new(policy: CallPolicy) -> Self {
        Self {
            providers: Vec::new(),
            policy,
            breaker_config: None,
        }
    }

    /// Guard backends added after this call with circuit breakers.
    pub fn with_circuit_breakers(mut self, config: CircuitBreakerConfig) -> Self {
        self.breaker_config = Some(config);
        self
    }

    /// Add a backend. Lower priority values are tried first; equal
    /// priorities keep insertion order.
    pub fn with_provider(mut self, name: &str, priority: u32, backend: B) -> Self {
        let breaker = self
            .breaker_config
            .clone()
            .map(|config| Arc::new(CircuitBreaker::new(name, config)));
        self.providers.push(Provider {
            name: name.to_string(),
            priority,
            backend,
            breaker,
        });
        self.providers.sort_by_key(|p| p.priority);
        self
    }

    /// Provider names in the order they will be tried.
    pub fn order(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name.as_str()).collect()
    }

    /// Run `call` against each backend until one succeeds.
    pub async fn route<T, F, Fut>(&self, mut call: F) -> Result<Routed<T>>
    where
        F: FnMut(&B) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut failed = Vec::new();
        let mut last_error = String::from("no providers configured");

        for provider in &self.providers {
            if let Some(breaker) = &provider.breaker {
                if !breaker.allow_request() {
                    debug!(provider = %provider.name, "Skipping provider with open circuit");
                    last_error = format!("circuit open for provider '{}'", provider.name);
                    failed.push(provider.name.clone());
                    continue;
                }
            }

            match self.attempt(provider, &mut call).await {
                Ok(value) => {
                    if let Some(breaker) = &provider.breaker {
                        breaker.record_success();
                    }
                    return Ok(Routed {
                        value,
                        provider: provider.name.clone(),
                        failed,
                    });
                }
                Err(e) => {
                    if let Some(breaker) = &provider.breaker {
                        breaker.record_failure();
                    }
                    warn!(provider = %provider.name, error = %e, "Provider failed, failing over");
                    metrics::record_provider_failover(&provider.name);
                    last_error = e.to_string();
                    failed.push(provider.name.clone());
                }
            }
        }

        Err(Error::AllProvidersFailed {
            attempted: failed,
            last_error,
        })
    }

    async fn attempt<T, F, Fut>(&self, provider: &Provider<B>, call: &mut F) -> Result<T>
    where
        F: FnMut(&B) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.policy.attempts.max(1);
        let mut attempt = 1u32;
        loop {
            let outcome = match timeout(self.policy.timeout, call(&provider.backend)).await {
                Ok(result) => result,
                Err(_) => Err(Error::Timeout(format!(
                    "provider '{}' did not answer within {:?}",
                    provider.name, self.policy.timeout
                ))),
            };
            match outcome {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= attempts => return Err(e),
                Err(e) => {
                    let delay = self.policy.backoff.saturating_mul(attempt);
                    debug!(
                        provider = %provider.name,
                        attempt,
                        attempts,
                        error = %e,
                        "Provider attempt failed, retrying in {:?}",
                        delay
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[async_trait]
impl ToolCallable for ProviderRouter<Arc<dyn ToolCallable>> {
    #[instrument(name = "router.call", skip(self, request), fields(tool = %request.tool))]
    async fn call(&self, request: &ToolRequest) -> Result<ToolOutput> {
        let routed = self
            .route(|backend| {
                let backend = Arc::clone(backend);
                async move { backend.call(request).await }
            })
            .await?;
        let mut output = routed.value;
        if output.model.is_none() {
            output.model = Some(routed.provider);
        }
        Ok(output)
    }

    fn name(&self) -> &str {
        "router"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Flaky {
        name: &'static str,
        fail_times: usize,
        calls: AtomicUsize,
    }

    impl Flaky {
        fn new(name: &'static str, fail_times: usize) -> Arc<Self> {
            Arc::new(Self {
                name,
                fail_times,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ToolCallable for Flaky {
        async fn call(&self, _request: &ToolRequest) -> Result<ToolOutput> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_times {
                Err(Error::Tool(format!("{} down", self.name)))
            } else {
                Ok(ToolOutput::text(format!("from {}", self.name)))
            }
        }
    }

    fn request() -> ToolRequest {
        ToolRequest::new("llm", "step", json!("hi"))
    }

    #[tokio::test]
    async fn test_priority_order_with_stable_ties() {
        let router: ProviderRouter<u32> = ProviderRouter::new(CallPolicy::default())
            .with_provider("c", 2, 3)
            .with_provider("a", 1, 1)
            .with_provider("b", 1, 2);
        assert_eq!(router.order(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_fails_over_and_reports_failed_backends() {
        let primary = Flaky::new("primary", usize::MAX);
        let backup = Flaky::new("backup", 0);
        let router = ProviderRouter::<Arc<dyn ToolCallable>>::new(CallPolicy {
            attempts: 2,
            ..CallPolicy::default()
        })
        .with_provider("primary", 0, primary.clone())
        .with_provider("backup", 1, backup.clone());

        let routed = router
            .route(|b| {
                let b = Arc::clone(b);
                async move { b.call(&request()).await }
            })
            .await
            .unwrap();
        assert_eq!(routed.provider, "backup");
        assert_eq!(routed.failed, vec!["primary"]);
        assert_eq!(primary.calls.load(Ordering::SeqCst), 2);
        assert_eq!(routed.value.as_text(), "from backup");
    }

    #[tokio::test]
    async fn test_all_failed_names_every_backend() {
        let router = ProviderRouter::<Arc<dyn ToolCallable>>::new(CallPolicy::default())
            .with_provider("one", 0, Flaky::new("one", usize::MAX))
            .with_provider("two", 0, Flaky::new("two", usize::MAX));

        let err = router.call(&request()).await.unwrap_err();
        match err {
            Error::AllProvidersFailed {
                attempted,
                last_error,
            } => {
                assert_eq!(attempted, vec!["one", "two"]);
                assert!(last_error.contains("two down"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_attempt_timeout_fails_over() {
        struct Hung;
        #[async_trait]
        impl ToolCallable for Hung {
            async fn call(&self, _request: &ToolRequest) -> Result<ToolOutput> {
                sleep(Duration::from_secs(10)).await;
                Ok(ToolOutput::text("late"))
            }
        }

        let router = ProviderRouter::<Arc<dyn ToolCallable>>::new(CallPolicy {
            timeout: Duration::from_millis(20),
            ..CallPolicy::default()
        })
        .with_provider("hung", 0, Arc::new(Hung))
        .with_provider("ok", 1, Flaky::new("ok", 0));

        let out = router.call(&request()).await.unwrap();
        assert_eq!(out.as_text(), "from ok");
        assert_eq!(out.model.as_deref(), Some("ok"));
    }

    #[tokio::test]
    async fn test_open_circuit_skips_backend() {
        let primary = Flaky::new("primary", usize::MAX);
        let router = ProviderRouter::<Arc<dyn ToolCallable>>::new(CallPolicy::default())
            .with_circuit_breakers(CircuitBreakerConfig {
                failure_threshold: 1,
                success_threshold: 1,
                open_for: Duration::from_secs(60),
            })
            .with_provider("primary", 0, primary.clone())
            .with_provider("backup", 1, Flaky::new("backup", 0));

        router.call(&request()).await.unwrap();
        router.call(&request()).await.unwrap();
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_router_fails() {
        let router = ProviderRouter::<Arc<dyn ToolCallable>>::new(CallPolicy::default());
        assert_eq!(
            router.call(&request()).await.unwrap_err().code(),
            "ALL_PROVIDERS_FAILED"
        );
    }
}
