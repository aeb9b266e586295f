//! Ordered provider fallback with per-call timeouts.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::providers::{Provider, ProviderError};

use super::error::{ChainExhausted, ProviderFailure};

/// A value together with the name of the provider that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Sourced<T> {
    pub value: T,
    pub provider: String,
}

/// Providers for one capability, tried in order until one succeeds.
pub struct ProviderChain<P: ?Sized> {
    label: &'static str,
    providers: Vec<Arc<P>>,
    timeout: Duration,
}

impl<P: ?Sized> Clone for ProviderChain<P> {
    fn clone(&self) -> Self {
        Self {
            label: self.label,
            providers: self.providers.clone(),
            timeout: self.timeout,
        }
    }
}

impl<P: Provider + ?Sized> ProviderChain<P> {
    /// `label` names the capability in log lines.
    pub fn new(label: &'static str, providers: Vec<Arc<P>>, timeout: Duration) -> Self {
        Self {
            label,
            providers,
            timeout,
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers.iter().any(|p| p.name() == name)
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The chain from `name` onward, in the fixed order.
    ///
    /// A name outside the chain (unknown or disabled) keeps the whole chain.
    pub fn starting_at(&self, name: &str) -> ProviderChain<P> {
        match self.providers.iter().position(|p| p.name() == name) {
            Some(start) => Self {
                label: self.label,
                providers: self.providers[start..].to_vec(),
                timeout: self.timeout,
            },
            None => {
                log::warn!(
                    "{} provider '{}' is not available, using full chain [{}]",
                    self.label,
                    name,
                    self.names().join(", ")
                );
                self.clone()
            }
        }
    }

    /// Calls each provider at most once, in order, until one succeeds.
    ///
    /// A call that outlives the chain timeout counts as that provider's
    /// failure.
    pub async fn run<T, F, Fut>(&self, mut call: F) -> Result<Sourced<T>, ChainExhausted>
    where
        F: FnMut(Arc<P>) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut failures = Vec::new();

        for provider in &self.providers {
            let name = provider.name().to_string();
            let outcome = match tokio::time::timeout(self.timeout, call(Arc::clone(provider))).await
            {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout {
                    provider: name.clone(),
                    after: self.timeout,
                }),
            };

            match outcome {
                Ok(value) => {
                    if !failures.is_empty() {
                        log::info!(
                            "{} succeeded with fallback provider '{}' after {} failure(s)",
                            self.label,
                            name,
                            failures.len()
                        );
                    }
                    return Ok(Sourced {
                        value,
                        provider: name,
                    });
                }
                Err(error) => {
                    log::warn!("{} provider '{}' failed: {}", self.label, name, error);
                    failures.push(ProviderFailure {
                        provider: name,
                        error,
                    });
                }
            }
        }

        Err(ChainExhausted { failures })
    }
}
