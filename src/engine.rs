use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::cache::{CachedFlag, FlagCache};
use crate::error::StoreError;
use crate::evaluation::{evaluate_flag, EvaluationContext, FlagEvaluation};
use crate::store::FlagStore;

/// Answers "is this flag on for this request?" from the store, through the
/// cache.
///
/// Only infrastructure failures come back as `Err`; a missing flag or a
/// targeting mismatch is an ordinary `Ok(false)`.
pub struct FlagEngine {
    store: Arc<dyn FlagStore>,
    cache: Arc<FlagCache>,
}

impl FlagEngine {
    pub fn new(store: Arc<dyn FlagStore>, cache: Arc<FlagCache>) -> Self {
        Self { store, cache }
    }

    pub fn cache(&self) -> &Arc<FlagCache> {
        &self.cache
    }

    pub async fn evaluate(
        &self,
        flag_key: &str,
        context: &EvaluationContext,
    ) -> Result<bool, StoreError> {
        Ok(self.explain(flag_key, context).await?.enabled)
    }

    /// Like [`FlagEngine::evaluate`] but also says which rule decided.
    pub async fn explain(
        &self,
        flag_key: &str,
        context: &EvaluationContext,
    ) -> Result<FlagEvaluation, StoreError> {
        let cached = self.lookup(flag_key).await?;
        let evaluation = evaluate_flag(cached.definition(), context);
        debug!(
            flag_key,
            enabled = evaluation.enabled,
            reason = ?evaluation.reason,
            "flag evaluated"
        );
        Ok(evaluation)
    }

    /// Fail-closed convenience for callers that have no better fallback.
    pub async fn is_enabled_or_default(&self, flag_key: &str, context: &EvaluationContext) -> bool {
        match self.evaluate(flag_key, context).await {
            Ok(enabled) => enabled,
            Err(e) => {
                error!(flag_key, error = %e, "flag evaluation failed, treating as disabled");
                false
            }
        }
    }

    /// Every flag key that [`FlagEngine::evaluate`] would report as on.
    ///
    /// Reads the full flag set once and refreshes the cache with it, so
    /// individual evaluations right after agree with this answer.
    pub async fn enabled_features(
        &self,
        context: &EvaluationContext,
    ) -> Result<BTreeSet<String>, StoreError> {
        let generation = self.cache.generation();
        let flags = self.store.fetch_all().await?;

        let mut enabled = BTreeSet::new();
        for flag in flags {
            let key = flag.key.clone();
            let cached = CachedFlag::from(Some(flag));
            if evaluate_flag(cached.definition(), context).enabled {
                enabled.insert(key.clone());
            }
            self.cache.insert_unless_invalidated(&key, cached, generation);
        }
        Ok(enabled)
    }

    async fn lookup(&self, flag_key: &str) -> Result<CachedFlag, StoreError> {
        if let Some(cached) = self.cache.get(flag_key) {
            return Ok(cached);
        }

        let generation = self.cache.generation();
        let cached = match self.store.fetch(flag_key).await {
            Ok(flag) => CachedFlag::from(flag),
            Err(StoreError::CorruptRecord { key, reason }) => {
                warn!(flag_key = %key, %reason, "corrupt flag record, treating as missing");
                CachedFlag::Absent
            }
            Err(e) => return Err(e),
        };

        self.cache
            .insert_unless_invalidated(flag_key, cached.clone(), generation);
        Ok(cached)
    }
}
