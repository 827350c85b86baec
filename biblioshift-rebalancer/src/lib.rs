//! Biblioshift Rebalancer Library
//!
//! Spreads copies of books across libraries so every book is available in as
//! many libraries as its copies allow.
//!
//! A run:
//! - selects under-covered books (held somewhere, missing somewhere)
//! - plans single-copy moves from libraries with spare copies
//! - optionally respects library capacity and a priority order
//! - applies all moves in one locked batch, or reports them as a dry run

pub mod applier;
pub mod config;
pub mod planner;
pub mod priority;
pub mod rebalance;
pub mod report;
pub mod selector;

// Re-export main types
pub use applier::{ApplyReport, Applier};
pub use config::{parse_author_ids, ConfigError, PriorityMode, RebalanceOptions, RebalancerConfig};
pub use planner::{CapacityLedger, Plan, PlanBuilder};
pub use priority::{order_candidates, sort_key};
pub use rebalance::{rebalance, RebalanceError, RebalanceReport, Rebalancer};
pub use selector::Selector;
