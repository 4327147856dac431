//! Fallback advisor: wraps any [`CoachingAdvisor`] and answers with the
//! offline heuristics when it fails.
//!
//! Whatever goes wrong with the wrapped advisor (`Request`, `Timeout`,
//! `Parse`, `EmptyResponse`), [`FallbackAdvisor`] returns the
//! [`RuleBasedAdvisor`] tips for the same request, so the coaching panel keeps
//! updating while the API is unreachable.

use async_trait::async_trait;

use crate::coaching::advisor::{Advice, AdvisorError, CoachingAdvisor, CoachingRequest};
use crate::coaching::rules::RuleBasedAdvisor;

/// A wrapper around any [`CoachingAdvisor`] that never returns an error.
///
/// # Example
/// ```rust
/// use vocal_coach::coaching::{ApiAdvisor, FallbackAdvisor};
/// use vocal_coach::config::AdvisorConfig;
///
/// let advisor = FallbackAdvisor::new(ApiAdvisor::from_config(&AdvisorConfig::default()));
/// ```
pub struct FallbackAdvisor<A: CoachingAdvisor> {
    inner: A,
    rules: RuleBasedAdvisor,
}

impl<A: CoachingAdvisor> FallbackAdvisor<A> {
    pub fn new(inner: A) -> Self {
        Self {
            inner,
            rules: RuleBasedAdvisor::new(),
        }
    }

    /// The wrapped advisor.
    pub fn inner(&self) -> &A {
        &self.inner
    }
}

#[async_trait]
impl<A: CoachingAdvisor> CoachingAdvisor for FallbackAdvisor<A> {
    /// This implementation never returns `Err(_)`.
    async fn produce_tips(&self, request: &CoachingRequest) -> Result<Advice, AdvisorError> {
        match self.inner.produce_tips(request).await {
            Ok(advice) => Ok(advice),
            Err(err) => {
                log::warn!("Coaching advisor failed ({err}), using built-in tips");
                Ok(self.rules.evaluate(request))
            }
        }
    }
}
