//! # botfleet-autoscale
//!
//! Desired fleet size computation for leased machine pools, and the
//! control loop that forwards targets to the machine provider.
//!
//! ## Design Principles
//!
//! - Evaluation is a pure function of (pool config, instant, utilization);
//!   all decisions are deterministic and unit-testable
//! - Daily windows are same-day UTC wall-clock ranges; the first active
//!   entry in document order wins when windows overlap
//! - Load-based rules intersect; the utilization signal is clamped into the
//!   intersected bounds and replaces the schedule baseline
//! - The worker reads whatever snapshot is current at the start of each
//!   pass; one pool failing never aborts the rest of the pass

mod schedule;
mod worker;

pub use schedule::compute_target_size;
pub use worker::{AutoscaleWorker, MachineProvider, PassStats, UtilizationSource};
