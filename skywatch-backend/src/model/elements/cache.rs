use chrono::{DateTime, Duration, Utc};
use skywatch_common::{ElementSet, NoradId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::chain::SourceChain;
use super::disk::DiskStore;
use crate::error::{AllSourcesFailed, FetchError, NoCachedData, SourceFailure};

/// Outcome of the latest network attempt for one object
#[derive(Default)]
struct RefreshState {
    attempted_at: Option<DateTime<Utc>>,

    /// `(fetcher, reason)` of each source, empty when the attempt succeeded
    failures: Vec<(String, String)>,
}

impl RefreshState {
    fn record(&mut self, outcome: Result<&ElementSet, &AllSourcesFailed>) {
        self.attempted_at = Some(Utc::now());
        self.failures = match outcome {
            Ok(_) => Vec::new(),
            Err(cause) => cause
                .failures
                .iter()
                .map(|f| (f.fetcher.clone(), f.reason.to_string()))
                .collect(),
        };
    }

    fn replayed_failure(&self, norad_id: NoradId) -> AllSourcesFailed {
        let failures = self
            .failures
            .iter()
            .map(|(fetcher, reason)| SourceFailure {
                fetcher: fetcher.clone(),
                reason: FetchError::Concurrent(reason.clone()),
            })
            .collect();
        AllSourcesFailed { norad_id, failures }
    }
}

/// Tiered element cache: hot memory, durable disk, network refresh on expiry.
///
/// `get` only fails when no tier holds any record for the object. Stale
/// records are served when every source fails.
pub struct ElementCache {
    chain: SourceChain,
    disk: DiskStore,
    ttl: Duration,

    /// Memory tier, one entry per object
    memory: RwLock<HashMap<NoradId, ElementSet>>,

    /// Per-object refresh locks; at most one network fetch in flight per id
    refresh_locks: Mutex<HashMap<NoradId, Arc<Mutex<RefreshState>>>>,
}

impl ElementCache {
    pub fn new(chain: SourceChain, disk: DiskStore, ttl: Duration) -> Self {
        Self {
            chain,
            disk,
            ttl,
            memory: RwLock::new(HashMap::new()),
            refresh_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Resolve the freshest available element set for `norad_id`.
    ///
    /// 1. fresh memory entry
    /// 2. source chain (result written to memory and disk)
    /// 3. stale memory entry
    /// 4. disk record
    ///
    /// Callers that queued behind another caller's network attempt take that
    /// attempt's outcome instead of contacting the sources again.
    pub async fn get(&self, norad_id: NoradId) -> Result<ElementSet, NoCachedData> {
        if let Some(set) = self.fresh_entry(norad_id).await {
            return Ok(set);
        }

        let waiting_since = Utc::now();
        let lock = self.refresh_lock(norad_id).await;
        let mut state = lock.lock().await;

        // Another request may have refreshed while we waited for the lock
        if let Some(set) = self.fresh_entry(norad_id).await {
            debug!("Catalog #{} refreshed by a concurrent request", norad_id);
            return Ok(set);
        }

        if state.attempted_at.is_some_and(|at| at > waiting_since) {
            if state.failures.is_empty() {
                if let Some(set) = self.peek(norad_id).await {
                    debug!("Catalog #{} refreshed by a concurrent request", norad_id);
                    return Ok(set);
                }
            }
            debug!("Catalog #{} just failed to refresh, serving cached tiers", norad_id);
            return self.serve_cached(norad_id, state.replayed_failure(norad_id)).await;
        }

        self.refresh_locked(norad_id, &mut state).await
    }

    /// Refresh ahead of expiry: goes to the network unless the memory entry
    /// will still be fresh `lead` from now. Falls back like `get`.
    pub async fn prefetch(&self, norad_id: NoradId, lead: Duration) -> Result<ElementSet, NoCachedData> {
        let lock = self.refresh_lock(norad_id).await;
        let mut state = lock.lock().await;

        if let Some(set) = self.peek(norad_id).await {
            if set.is_fresh(Utc::now() + lead, self.ttl) {
                debug!("Catalog #{} still fresh, prefetch skipped", norad_id);
                return Ok(set);
            }
        }

        self.refresh_locked(norad_id, &mut state).await
    }

    /// Snapshot of the memory tier entry, fresh or not.
    pub async fn peek(&self, norad_id: NoradId) -> Option<ElementSet> {
        self.memory.read().await.get(&norad_id).cloned()
    }

    /// Load disk records into the memory tier, keeping their original fetch
    /// times. Returns how many objects were loaded.
    pub async fn warm_from_disk(&self, ids: &[NoradId]) -> usize {
        let mut loaded = 0;

        for &norad_id in ids {
            match self.disk.load(norad_id).await {
                Ok(Some(set)) => {
                    self.insert_memory(set).await;
                    loaded += 1;
                }
                Ok(None) => {}
                Err(e) => warn!("Skipping disk record for catalog #{}: {:#}", norad_id, e),
            }
        }

        info!("Loaded {} element sets from {:?}", loaded, self.disk.dir());
        loaded
    }

    async fn fresh_entry(&self, norad_id: NoradId) -> Option<ElementSet> {
        let memory = self.memory.read().await;
        memory
            .get(&norad_id)
            .filter(|set| set.is_fresh(Utc::now(), self.ttl))
            .cloned()
    }

    async fn refresh_lock(&self, norad_id: NoradId) -> Arc<Mutex<RefreshState>> {
        let mut locks = self.refresh_locks.lock().await;
        locks.entry(norad_id).or_default().clone()
    }

    async fn refresh_locked(&self, norad_id: NoradId, state: &mut RefreshState) -> Result<ElementSet, NoCachedData> {
        let outcome = self.chain.resolve(norad_id).await;
        state.record(outcome.as_ref());

        let cause = match outcome {
            Ok(set) => {
                self.insert_memory(set.clone()).await;
                if let Err(e) = self.disk.save(&set).await {
                    warn!("Failed to persist catalog #{}: {:#}", norad_id, e);
                }
                info!("Refreshed catalog #{} from {}", norad_id, set.source);
                return Ok(set);
            }
            Err(cause) => cause,
        };

        self.serve_cached(norad_id, cause).await
    }

    /// Steps 3 and 4: stale memory, then disk.
    async fn serve_cached(&self, norad_id: NoradId, cause: AllSourcesFailed) -> Result<ElementSet, NoCachedData> {
        if let Some(stale) = self.peek(norad_id).await {
            warn!(
                "Serving stale elements for catalog #{} (age {} min): {}",
                norad_id,
                stale.age(Utc::now()).num_minutes(),
                cause
            );
            return Ok(stale);
        }

        match self.disk.load(norad_id).await {
            Ok(Some(set)) => {
                warn!(
                    "Serving disk elements for catalog #{} (age {} min): {}",
                    norad_id,
                    set.age(Utc::now()).num_minutes(),
                    cause
                );
                self.insert_memory(set.clone()).await;
                Ok(set)
            }
            Ok(None) => Err(NoCachedData { norad_id, cause }),
            Err(e) => {
                warn!("Unreadable disk record for catalog #{}: {:#}", norad_id, e);
                Err(NoCachedData { norad_id, cause })
            }
        }
    }

    /// Keep whichever record was fetched later.
    async fn insert_memory(&self, set: ElementSet) {
        let mut memory = self.memory.write().await;
        match memory.get(&set.norad_id) {
            Some(existing) if existing.fetched_at > set.fetched_at => {}
            _ => {
                memory.insert(set.norad_id, set);
            }
        }
    }
}
