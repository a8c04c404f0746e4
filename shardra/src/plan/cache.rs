use std::{fmt, num::NonZeroUsize, sync::Arc};

use lru::LruCache;
use parking_lot::Mutex;

use crate::{
    error::RouterError,
    plan::{Plan, Planner},
};

pub const DEFAULT_PLAN_CACHE_CAPACITY: usize = 5000;

/// Memoising front of the upstream planner: a bounded LRU keyed by the SQL
/// text, safe for concurrent reads with occasional inserts.
pub struct CachingPlanner {
    builder: Arc<dyn Planner>,
    plans: Mutex<LruCache<String, Arc<Plan>>>,
}

impl CachingPlanner {
    pub fn new(builder: Arc<dyn Planner>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            builder,
            plans: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get_plan(&self, sql: &str) -> Result<Arc<Plan>, RouterError> {
        if let Some(plan) = self.plans.lock().get(sql) {
            return Ok(Arc::clone(plan));
        }
        let plan = Arc::new(self.builder.build_plan(sql)?);
        self.plans.lock().put(sql.to_owned(), Arc::clone(&plan));
        Ok(plan)
    }

    pub fn cached(&self) -> usize {
        self.plans.lock().len()
    }
}

impl fmt::Debug for CachingPlanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachingPlanner")
            .field("builder", &self.builder)
            .field("cached", &self.cached())
            .finish()
    }
}
