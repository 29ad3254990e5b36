//! Tiered, multi-credential OCR cascade.
//!
//! One generic loop walks the configured tiers in order. For each model it
//! tries the model's credentials (its dedicated one, or the tier's list),
//! and reacts to the classified failure:
//!
//! | Kind | Effect |
//! |---|---|
//! | `AuthInvalid` | burn the credential; next credential |
//! | `QuotaExceeded` | tier quota counter += 1; abort tier once over budget, else next credential |
//! | `UnsupportedModel` | tier bad-request counter += 1; abort tier once over budget, else next model |
//! | `Transient` | retry the same call with exponential backoff while the tier's retry budget lasts, then next model |
//! | `EmptyOrRefusal` | next model |
//!
//! Credentials are identified by their slot in the tier (position in the
//! shared list, or the owning model for a dedicated one), never by label.
//! The first usable completion ends the cascade. Counters and burned
//! credentials live in a per-call [`CascadeState`], so concurrent pages and
//! documents never share mutable state.

use crate::config::{CascadeConfig, Credential, FailureBudget, ProviderTier};
use crate::error::{ErrorKind, ExtractError};
use crate::pipeline::provider::{build_http_client, HttpVisionProvider, OcrRequest, VisionProvider};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

/// Record of one provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadeAttempt {
    pub provider: String,
    pub model: String,
    pub credential: String,
    /// `None` on success.
    pub failure: Option<ErrorKind>,
}

/// Result of running the cascade for one page.
#[derive(Debug, Clone, Default)]
pub struct CascadeOutcome {
    /// The first usable completion, if any tier produced one.
    pub text: Option<String>,
    pub attempts: Vec<CascadeAttempt>,
}

impl CascadeOutcome {
    pub fn attempt_count(&self) -> usize {
        self.attempts.len()
    }
}

/// Where a credential lives inside its tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum CredentialSlot {
    /// Index into the tier's shared credential list.
    Shared(usize),
    /// The dedicated credential of the model at this index.
    Dedicated(usize),
}

/// Per-run mutable bookkeeping.
#[derive(Debug, Default)]
struct CascadeState {
    /// `(tier index, slot)` pairs rejected as invalid.
    burned: HashSet<(usize, CredentialSlot)>,
    attempts: Vec<CascadeAttempt>,
}

#[derive(Debug, Default)]
struct TierCounters {
    quota: u32,
    bad_requests: u32,
    transient_retries: u32,
}

impl TierCounters {
    fn quota_exhausted(&self, budget: &FailureBudget) -> bool {
        self.quota > budget.max_quota_failures
    }

    fn bad_requests_exhausted(&self, budget: &FailureBudget) -> bool {
        self.bad_requests > budget.max_bad_requests
    }

    fn can_retry(&self, budget: &FailureBudget) -> bool {
        self.transient_retries < budget.max_transient_retries
    }
}

/// `base_ms * 2^retry`, saturating.
fn backoff_delay(base_ms: u64, retry: u32) -> Duration {
    Duration::from_millis(base_ms.saturating_mul(1u64 << retry.min(16)))
}

/// What to do after one failed attempt.
enum Next {
    Credential,
    Model,
    AbortTier,
}

/// The immutable cascade: tiers, budgets and one provider per tier.
///
/// Shared behind `Arc` by every page of every document.
pub struct CascadeEngine {
    config: CascadeConfig,
    providers: HashMap<String, Arc<dyn VisionProvider>>,
}

impl std::fmt::Debug for CascadeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CascadeEngine")
            .field("config", &self.config)
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl CascadeEngine {
    /// Build HTTP providers for every tier, sharing one client.
    pub fn new(config: CascadeConfig, api_timeout_secs: u64) -> Result<Self, ExtractError> {
        let client = build_http_client(api_timeout_secs)?;
        let providers = config
            .tiers
            .iter()
            .map(|t| {
                let p: Arc<dyn VisionProvider> =
                    Arc::new(HttpVisionProvider::new(t.provider.clone(), client.clone()));
                (t.provider.id.clone(), p)
            })
            .collect();
        Ok(Self { config, providers })
    }

    /// Use caller-supplied providers, keyed by provider id.
    pub fn with_providers(
        config: CascadeConfig,
        providers: HashMap<String, Arc<dyn VisionProvider>>,
    ) -> Self {
        Self { config, providers }
    }

    pub fn is_empty(&self) -> bool {
        self.config.tiers.is_empty()
    }

    pub fn config(&self) -> &CascadeConfig {
        &self.config
    }

    /// Run the cascade for one page image.
    pub async fn run(&self, request: &OcrRequest) -> CascadeOutcome {
        let mut state = CascadeState::default();

        for (tier_no, tier) in self.config.tiers.iter().enumerate() {
            let Some(provider) = self.providers.get(&tier.provider.id) else {
                warn!(provider = %tier.provider.id, "No adapter registered; skipping tier");
                continue;
            };
            if let Some(text) = self
                .run_tier(tier_no, tier, provider.as_ref(), request, &mut state)
                .await
            {
                return CascadeOutcome {
                    text: Some(text),
                    attempts: state.attempts,
                };
            }
            debug!(tier = tier_no + 1, provider = %tier.provider.id, "Tier exhausted");
        }

        info!(attempts = state.attempts.len(), "OCR cascade exhausted");
        CascadeOutcome {
            text: None,
            attempts: state.attempts,
        }
    }

    async fn run_tier(
        &self,
        tier_no: usize,
        tier: &ProviderTier,
        provider: &dyn VisionProvider,
        request: &OcrRequest,
        state: &mut CascadeState,
    ) -> Option<String> {
        let budget = &self.config.budget;
        let provider_id = tier.provider.id.as_str();
        let mut counters = TierCounters::default();

        for (model_no, model) in tier.models.iter().enumerate() {
            let credentials: Vec<(CredentialSlot, &Credential)> = match &model.dedicated_credential {
                Some(c) => vec![(CredentialSlot::Dedicated(model_no), c)],
                None => tier
                    .credentials
                    .iter()
                    .enumerate()
                    .map(|(i, c)| (CredentialSlot::Shared(i), c))
                    .collect(),
            };

            for (slot, credential) in credentials {
                let key = (tier_no, slot);
                if state.burned.contains(&key) {
                    continue;
                }

                let mut retry = 0u32;
                let result = loop {
                    let result = provider.recognize(&model.id, credential, request).await;
                    state.attempts.push(CascadeAttempt {
                        provider: provider_id.to_string(),
                        model: model.id.clone(),
                        credential: credential.label.clone(),
                        failure: result.as_ref().err().map(|e| e.kind),
                    });
                    let transient = matches!(&result, Err(e) if e.kind == ErrorKind::Transient);
                    if !transient || !counters.can_retry(budget) {
                        break result;
                    }
                    counters.transient_retries += 1;
                    let delay = backoff_delay(budget.retry_backoff_ms, retry);
                    retry += 1;
                    warn!(
                        provider = provider_id,
                        model = %model.id,
                        credential = %credential.label,
                        "Transient failure; retry {retry} after {}ms",
                        delay.as_millis()
                    );
                    sleep(delay).await;
                };

                let err = match result {
                    Ok(text) => {
                        debug!(provider = provider_id, model = %model.id, "OCR succeeded");
                        return Some(text);
                    }
                    Err(e) => e,
                };
                warn!(credential = %credential.label, "{err}");

                let next = match err.kind {
                    ErrorKind::AuthInvalid => {
                        state.burned.insert(key);
                        Next::Credential
                    }
                    ErrorKind::QuotaExceeded => {
                        counters.quota += 1;
                        if counters.quota_exhausted(budget) {
                            Next::AbortTier
                        } else {
                            Next::Credential
                        }
                    }
                    ErrorKind::UnsupportedModel => {
                        counters.bad_requests += 1;
                        if counters.bad_requests_exhausted(budget) {
                            Next::AbortTier
                        } else {
                            Next::Model
                        }
                    }
                    ErrorKind::Transient | ErrorKind::EmptyOrRefusal => Next::Model,
                };

                match next {
                    Next::Credential => continue,
                    Next::Model => break,
                    Next::AbortTier => {
                        debug!(provider = provider_id, "Failure budget exceeded; aborting tier");
                        return None;
                    }
                }
            }
        }
        None
    }
}
