//! Plan caching.
//!
//! Resolving cross-package tags reads the foreign package's plan, often many
//! times per run. [`PlanCache`] keeps parsed plans keyed by file path so each
//! plan is parsed once per cache lifetime; callers own the cache and decide when
//! to [`clear`](PlanCache::clear) it.
//!
//! ```rust,ignore
//! use strata_plan::PlanCache;
//!
//! let cache = PlanCache::new();
//! let plan = cache.get_or_load("packages/auth/strata.plan")?;
//! let again = cache.get_or_load("packages/auth/strata.plan")?;
//! assert!(std::sync::Arc::ptr_eq(&plan, &again));
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use crate::error::PlanResult;
use crate::model::Plan;
use crate::parser::{parse_plan, parse_plan_file};

/// A cache of parsed plans keyed by path.
#[derive(Debug, Default)]
pub struct PlanCache {
    plans: RwLock<HashMap<PathBuf, Arc<Plan>>>,
    stats: RwLock<CacheStats>,
}

/// Statistics for the plan cache.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of plans currently cached.
    pub cached_count: usize,
}

impl CacheStats {
    /// Get the cache hit rate.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

impl PlanCache {
    /// Create a new empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a cached plan or parse the file at `path`.
    pub fn get_or_load(&self, path: impl AsRef<Path>) -> PlanResult<Arc<Plan>> {
        let path = path.as_ref();
        if let Some(plan) = self.lookup(path) {
            return Ok(plan);
        }

        let plan = Arc::new(parse_plan_file(path)?);
        self.store(path, &plan);
        Ok(plan)
    }

    /// Get a cached plan or parse `source`, storing the result under `path`.
    ///
    /// Used when plan text comes from somewhere other than the local
    /// filesystem.
    pub fn get_or_parse(&self, path: impl AsRef<Path>, source: &str) -> PlanResult<Arc<Plan>> {
        let path = path.as_ref();
        if let Some(plan) = self.lookup(path) {
            return Ok(plan);
        }

        let plan = Arc::new(parse_plan(source)?);
        self.store(path, &plan);
        Ok(plan)
    }

    /// Get a cached plan without loading.
    pub fn get(&self, path: impl AsRef<Path>) -> Option<Arc<Plan>> {
        self.lookup(path.as_ref())
    }

    /// Insert a plan, replacing any cached entry for `path`.
    pub fn insert(&self, path: impl Into<PathBuf>, plan: Plan) -> Arc<Plan> {
        let plan = Arc::new(plan);
        self.plans.write().insert(path.into(), Arc::clone(&plan));
        plan
    }

    /// Check if a plan is cached for `path`.
    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.plans.read().contains_key(path.as_ref())
    }

    /// Drop the cached plan for `path`; returns whether one was cached.
    pub fn invalidate(&self, path: impl AsRef<Path>) -> bool {
        self.plans.write().remove(path.as_ref()).is_some()
    }

    /// Clear the cache.
    pub fn clear(&self) {
        self.plans.write().clear();
        self.stats.write().cached_count = 0;
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.read().clone();
        stats.cached_count = self.plans.read().len();
        stats
    }

    /// Get the number of cached plans.
    pub fn len(&self) -> usize {
        self.plans.read().len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.plans.read().is_empty()
    }

    fn lookup(&self, path: &Path) -> Option<Arc<Plan>> {
        let plans = self.plans.read();
        let plan = plans.get(path)?;
        self.stats.write().hits += 1;
        trace!(path = %path.display(), "Plan cache hit");
        Some(Arc::clone(plan))
    }

    fn store(&self, path: &Path, plan: &Arc<Plan>) {
        self.plans
            .write()
            .insert(path.to_path_buf(), Arc::clone(plan));
        self.stats.write().misses += 1;
    }
}
