//! Rebalance orchestration
//!
//! One run: count libraries, select candidates, plan every candidate, and
//! apply the plan unless this is a dry run. Dry runs and applies plan the
//! same way.

use biblioshift_core::{BookId, LibraryId, Move};
use biblioshift_inventory::{InventoryError, InventoryStore};
use futures::TryStreamExt;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::applier::{ApplyReport, Applier};
use crate::config::{ConfigError, RebalanceOptions};
use crate::planner::{CapacityLedger, Plan, PlanBuilder};
use crate::priority::order_candidates;
use crate::selector::Selector;

/// Rebalance errors
#[derive(Error, Debug)]
pub enum RebalanceError {
    #[error("No libraries present")]
    NoLibraries,

    #[error("Invalid options: {0}")]
    InvalidOptions(#[from] ConfigError),

    #[error("Inventory read failed: {0}")]
    Inventory(#[from] InventoryError),

    /// The plan was computed but could not be written; it is kept for
    /// inspection or a later retry
    #[error("Apply failed: {source}")]
    Apply {
        plan: Box<Plan>,
        source: InventoryError,
    },
}

impl RebalanceError {
    /// The plan computed before a failed apply
    pub fn plan(&self) -> Option<&Plan> {
        match self {
            RebalanceError::Apply { plan, .. } => Some(plan.as_ref()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, RebalanceError>;

/// Outcome of a rebalance run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RebalanceReport {
    pub books_considered: usize,
    pub total_moves: usize,
    pub moves: Vec<Move>,
    /// Whether the moves were written
    pub applied: bool,
}

impl RebalanceReport {
    fn new(plan: Plan, applied: bool) -> Self {
        Self {
            books_considered: plan.books_considered,
            total_moves: plan.total_moves(),
            moves: plan.moves,
            applied,
        }
    }
}

/// State owned by one planning run
///
/// The capacity ledger is loaded on the first candidate that needs it and
/// then only updated in memory.
#[derive(Debug)]
struct PlanRun {
    library_count: usize,
    library_ids: Vec<LibraryId>,
    ledger: Option<CapacityLedger>,
    builder: PlanBuilder,
    plan: Plan,
}

impl PlanRun {
    async fn plan_book<S>(&mut self, store: &S, book_id: BookId) -> Result<()>
    where
        S: InventoryStore + ?Sized,
    {
        if self.builder.capacity_aware() && self.ledger.is_none() {
            let usage = store.library_usage().await?;
            debug!(libraries = usage.len(), "Capacity ledger loaded");
            self.ledger = Some(CapacityLedger::from_usage(usage));
        }

        let holdings = store.book_holdings(book_id).await?;
        let moves = self.builder.plan_book(
            book_id,
            &holdings,
            &self.library_ids,
            self.library_count,
            self.ledger.as_mut(),
        );
        self.plan.record_book(moves);
        Ok(())
    }
}

/// Rebalancer bound to an inventory store
pub struct Rebalancer<S: ?Sized> {
    store: Arc<S>,
    options: RebalanceOptions,
    applier: Applier,
}

impl<S> Rebalancer<S>
where
    S: InventoryStore + ?Sized,
{
    /// Create a rebalancer; options are validated and normalized first
    pub fn new(store: Arc<S>, options: RebalanceOptions) -> Result<Self> {
        Ok(Self {
            store,
            options: options.validate()?,
            applier: Applier::new(),
        })
    }

    pub fn options(&self) -> &RebalanceOptions {
        &self.options
    }

    /// Plan a run without writing anything
    #[instrument(skip(self), fields(
        capacity_aware = self.options.capacity_aware,
        priority = %self.options.priority,
    ))]
    pub async fn plan(&self) -> Result<Plan> {
        let start = Instant::now();
        let store = self.store.as_ref();

        let library_count = store.library_count().await?;
        if library_count == 0 {
            return Err(RebalanceError::NoLibraries);
        }
        let library_ids = store.library_ids().await?;

        let mut run = PlanRun {
            library_count,
            library_ids,
            ledger: None,
            builder: PlanBuilder::new(self.options.capacity_aware),
            plan: Plan::default(),
        };
        let selector = Selector::new(library_count);

        if self.options.priority.is_enabled() {
            let ids = selector.collect(store).await?;
            let metas = store.book_meta(&ids).await?;
            if metas.len() < ids.len() {
                warn!(
                    missing = ids.len() - metas.len(),
                    "Candidates without metadata are planned last"
                );
            }
            let ordered =
                order_candidates(ids, &metas, self.options.priority, &self.options.authors);
            for book_id in ordered {
                run.plan_book(store, book_id).await?;
            }
        } else {
            let mut candidates = selector.candidates(store);
            while let Some(book_id) = candidates.try_next().await? {
                run.plan_book(store, book_id).await?;
            }
        }

        let plan = run.plan;
        info!(
            summary = %plan.summary(),
            elapsed = ?start.elapsed(),
            "Plan built"
        );
        Ok(plan)
    }

    /// Apply a previously computed plan
    pub async fn apply(&self, plan: Plan) -> Result<(Plan, ApplyReport)> {
        match self.applier.apply(self.store.as_ref(), &plan.moves).await {
            Ok(report) => Ok((plan, report)),
            Err(source) => Err(RebalanceError::Apply {
                plan: Box::new(plan),
                source,
            }),
        }
    }

    /// Plan, and apply unless the options ask for a dry run
    pub async fn rebalance(&self) -> Result<RebalanceReport> {
        let plan = self.plan().await?;

        if self.options.dry_run {
            info!(moves = plan.total_moves(), "Dry run, nothing applied");
            return Ok(RebalanceReport::new(plan, false));
        }

        let (plan, _) = self.apply(plan).await?;
        Ok(RebalanceReport::new(plan, true))
    }
}

/// Run one rebalance against `store`
pub async fn rebalance<S>(store: Arc<S>, options: RebalanceOptions) -> Result<RebalanceReport>
where
    S: InventoryStore + ?Sized,
{
    Rebalancer::new(store, options)?.rebalance().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use biblioshift_inventory::MemoryInventory;

    fn store(libraries: i64) -> Arc<MemoryInventory> {
        let store = MemoryInventory::new();
        store.add_author(1, "Ann Example");
        for lib in 1..=libraries {
            store.add_library(lib, format!("Library {lib}"), 100);
        }
        Arc::new(store)
    }

    #[tokio::test]
    async fn test_no_libraries_is_fatal() {
        let store = store(0);
        let err = rebalance(store, RebalanceOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RebalanceError::NoLibraries));
    }

    #[tokio::test]
    async fn test_dry_run_leaves_store_untouched() {
        let store = store(3);
        store.add_book(1, "First", 2000, 1);
        store.set_holding(1, 1, 5);

        let report = rebalance(store.clone(), RebalanceOptions::default())
            .await
            .unwrap();

        assert!(!report.applied);
        assert_eq!(report.total_moves, 2);
        assert_eq!(store.holding(1, 1), Some(5));
        assert_eq!(store.apply_count(), 0);
    }

    #[tokio::test]
    async fn test_apply_writes_plan() {
        let store = store(3);
        store.add_book(1, "First", 2000, 1);
        store.set_holding(1, 1, 5);

        let options = RebalanceOptions {
            dry_run: false,
            ..Default::default()
        };
        let report = rebalance(store.clone(), options).await.unwrap();

        assert!(report.applied);
        assert_eq!(report.books_considered, 1);
        assert_eq!(store.holding(1, 1), Some(3));
        assert_eq!(store.apply_count(), 1);
    }

    #[tokio::test]
    async fn test_priority_normalizes_options() {
        let store = store(2);
        let options = RebalanceOptions {
            priority: crate::config::PriorityMode::YearDesc,
            ..Default::default()
        };
        let rebalancer = Rebalancer::new(store, options).unwrap();
        assert!(rebalancer.options().capacity_aware);
    }

    #[tokio::test]
    async fn test_apply_error_keeps_plan() {
        let store = store(2);
        store.add_book(1, "First", 2000, 1);
        store.set_holding(1, 1, 3);

        let rebalancer = Rebalancer::new(store.clone(), RebalanceOptions::default()).unwrap();
        let plan = rebalancer.plan().await.unwrap();
        assert_eq!(plan.total_moves(), 1);

        // holdings drained between planning and applying
        store.set_holding(1, 1, 0);
        let err = rebalancer.apply(plan.clone()).await.unwrap_err();

        assert_eq!(err.plan(), Some(&plan));
        assert_eq!(store.holding(2, 1), None);
    }
}
