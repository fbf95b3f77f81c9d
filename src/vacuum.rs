//! Background vacuuming of tombstoned documents.
//!
//! `discard` removes a document's identity immediately but leaves its
//! postings in the inverted index; a vacuum pass sweeps those tombstoned
//! short-ids out, in batches, yielding to the runtime between batches so
//! interleaved reads and writes stay responsive.
//!
//! The scheduler keeps at most one pass in flight and at most one queued
//! follow-up. A request arriving while a pass runs occupies the queued
//! slot; further requests fold into it by taking the most permissive
//! threshold on each axis. When a pass completes, the queued request starts
//! only if its conditions still hold against the post-pass counters.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;

use crate::options::{VacuumConditions, VacuumOptions};
use crate::store::IndexStore;

/// Coalescing scheduler for vacuum passes.
#[derive(Debug, Default)]
pub(crate) struct VacuumScheduler {
    state: Mutex<VacuumState>,
    drained: Notify,
}

#[derive(Debug, Default)]
struct VacuumState {
    running: bool,
    enqueued: Option<(VacuumOptions, VacuumConditions)>,
}

impl VacuumScheduler {
    /// Whether a vacuum is currently in flight (or queued behind one).
    pub(crate) fn is_running(&self) -> bool {
        self.state.lock().running
    }

    /// Request a vacuum. Starts immediately when idle; otherwise occupies or
    /// folds into the queued slot.
    ///
    /// Inside a tokio runtime the passes run as a spawned task; without one
    /// the request is served synchronously before returning.
    pub(crate) fn request(
        self: &Arc<Self>,
        store: &Arc<RwLock<IndexStore>>,
        options: VacuumOptions,
        conditions: VacuumConditions,
    ) {
        {
            let mut state = self.state.lock();
            if state.running {
                match &mut state.enqueued {
                    Some((queued_options, queued_conditions)) => {
                        *queued_options = options;
                        queued_conditions.fold_min(&conditions);
                    }
                    None => state.enqueued = Some((options, conditions)),
                }
                return;
            }
            state.running = true;
        }

        let scheduler = Arc::clone(self);
        let store = Arc::clone(store);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    scheduler.run(store, options, conditions).await;
                });
            }
            Err(_) => scheduler.run_sync(&store, options, conditions),
        }
    }

    /// Resolve once no vacuum is running or queued.
    pub(crate) async fn wait_until_drained(&self) {
        loop {
            let notified = self.drained.notified();
            if !self.state.lock().running {
                return;
            }
            notified.await;
        }
    }

    async fn run(
        self: Arc<Self>,
        store: Arc<RwLock<IndexStore>>,
        mut options: VacuumOptions,
        mut conditions: VacuumConditions,
    ) {
        loop {
            if conditions_hold(&store, &conditions) {
                run_pass(&store, &options).await;
            }
            let mut state = self.state.lock();
            match state.enqueued.take() {
                Some((next_options, next_conditions)) => {
                    options = next_options;
                    conditions = next_conditions;
                }
                None => {
                    state.running = false;
                    drop(state);
                    self.drained.notify_waiters();
                    return;
                }
            }
        }
    }

    /// Synchronous fallback used when no async runtime is available: same
    /// passes, no waits between batches.
    fn run_sync(
        &self,
        store: &RwLock<IndexStore>,
        mut options: VacuumOptions,
        mut conditions: VacuumConditions,
    ) {
        loop {
            if conditions_hold(store, &conditions) {
                run_pass_sync(store, &options);
            }
            let mut state = self.state.lock();
            match state.enqueued.take() {
                Some((next_options, next_conditions)) => {
                    options = next_options;
                    conditions = next_conditions;
                }
                None => {
                    state.running = false;
                    drop(state);
                    self.drained.notify_waiters();
                    return;
                }
            }
        }
    }
}

/// A pass is skipped when either threshold is unmet.
fn conditions_hold(store: &RwLock<IndexStore>, conditions: &VacuumConditions) -> bool {
    let store = store.read();
    store.dirt_count >= conditions.min_dirt_count
        && store.dirt_factor() >= conditions.min_dirt_factor
}

async fn run_pass(store: &RwLock<IndexStore>, options: &VacuumOptions) {
    let terms = store.read().term_list();
    let batch_size = options.batch_size.max(1);
    for batch in terms.chunks(batch_size) {
        {
            let mut store = store.write();
            for term in batch {
                store.sweep_term(term);
            }
        }
        tokio::time::sleep(options.batch_wait).await;
    }
    store.write().finish_vacuum();
    tracing::debug!(terms = terms.len(), "vacuum pass completed");
}

fn run_pass_sync(store: &RwLock<IndexStore>, options: &VacuumOptions) {
    let terms = store.read().term_list();
    let batch_size = options.batch_size.max(1);
    for batch in terms.chunks(batch_size) {
        let mut store = store.write();
        for term in batch {
            store.sweep_term(term);
        }
    }
    store.write().finish_vacuum();
    tracing::debug!(terms = terms.len(), "vacuum pass completed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DocumentId;

    fn dirty_store() -> Arc<RwLock<IndexStore>> {
        let mut store = IndexStore::new(vec!["title".to_string()]);
        let live = store.allocate_short_id(DocumentId::from(1)).unwrap();
        let dead = store.allocate_short_id(DocumentId::from(2)).unwrap();
        store.add_posting(live, 0, "shared");
        store.add_posting(dead, 0, "shared");
        store.add_posting(dead, 0, "doomed");
        store.set_field_length(live, 0, 1);
        store.set_field_length(dead, 0, 2);
        store.tombstone(dead);
        Arc::new(RwLock::new(store))
    }

    #[test]
    fn test_conditions_hold() {
        let store = dirty_store();
        assert!(conditions_hold(&store, &VacuumConditions::always()));
        assert!(conditions_hold(
            &store,
            &VacuumConditions {
                min_dirt_count: 1,
                min_dirt_factor: 0.3,
            }
        ));
        assert!(!conditions_hold(
            &store,
            &VacuumConditions {
                min_dirt_count: 2,
                min_dirt_factor: 0.0,
            }
        ));
        assert!(!conditions_hold(
            &store,
            &VacuumConditions {
                min_dirt_count: 0,
                min_dirt_factor: 0.9,
            }
        ));
    }

    #[test]
    fn test_sync_vacuum_outside_runtime() {
        let store = dirty_store();
        let scheduler = Arc::new(VacuumScheduler::default());
        scheduler.request(
            &store,
            VacuumOptions::default(),
            VacuumConditions::always(),
        );
        // Served synchronously: done by the time request returns.
        assert!(!scheduler.is_running());
        let store = store.read();
        assert_eq!(store.dirt_count, 0);
        assert_eq!(store.index.get("shared").unwrap()[&0].len(), 1);
        assert!(store.index.get("doomed").is_none());
        assert_eq!(store.avg_field_length[0], 1.0);
    }

    #[tokio::test]
    async fn test_async_vacuum_drains() {
        let store = dirty_store();
        let scheduler = Arc::new(VacuumScheduler::default());
        scheduler.request(
            &store,
            VacuumOptions {
                batch_size: 1,
                batch_wait: std::time::Duration::from_millis(1),
            },
            VacuumConditions::always(),
        );
        assert!(scheduler.is_running());
        scheduler.wait_until_drained().await;
        assert!(!scheduler.is_running());
        assert_eq!(store.read().dirt_count, 0);
    }

    #[tokio::test]
    async fn test_enqueued_request_folds_thresholds() {
        let store = dirty_store();
        let scheduler = Arc::new(VacuumScheduler::default());
        let options = VacuumOptions {
            batch_size: 1,
            batch_wait: std::time::Duration::from_millis(5),
        };
        scheduler.request(&store, options, VacuumConditions::always());
        // First occupies the queued slot, second folds into it.
        scheduler.request(
            &store,
            options,
            VacuumConditions {
                min_dirt_count: 10,
                min_dirt_factor: 0.0,
            },
        );
        scheduler.request(
            &store,
            options,
            VacuumConditions {
                min_dirt_count: 3,
                min_dirt_factor: 0.2,
            },
        );
        {
            let state = scheduler.state.lock();
            let (_, conditions) = state.enqueued.as_ref().expect("queued slot occupied");
            assert_eq!(conditions.min_dirt_count, 3);
            assert_eq!(conditions.min_dirt_factor, 0.0);
        }
        scheduler.wait_until_drained().await;
        assert_eq!(store.read().dirt_count, 0);
    }
}
