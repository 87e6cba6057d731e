//! Regional quota accounting for qorch.
//!
//! - [`QuotaStore`] / [`AllocationLog`]: the JSON files backing the engine.
//! - [`AllocationLedger`]: validates, records and releases allocations, and
//!   keeps `available` consistent with `total`, `used` and active allocations.
//! - [`RecommendationScorer`]: ranks region/SKU pairs for a workload role.
//! - [`QuotaSource`]: where refreshed tables come from.
//!
//! `used` is consumption observed outside the ledger. Ledger allocations are
//! reservations carved out of what remains, so
//! `available = total - used - Σ(active allocations)` and may go negative if
//! a refresh reports more external usage than the table can absorb.

pub mod error;
pub mod ledger;
pub mod model;
pub mod scorer;
pub mod source;
pub mod store;

pub use error::{AllocationRejected, QuotaError};
pub use ledger::AllocationLedger;
pub use model::{
    AllocationStatus, QuotaAllocation, QuotaTable, RegionAvailability, ResourceQuota,
    ALLOCATION_ID_PREFIX,
};
pub use scorer::{RecommendationRequest, RecommendationResult, RecommendationScorer, ScoreWeights};
pub use source::{parse_quota_source, FileQuotaSource, HttpQuotaSource, QuotaSource};
pub use store::{AllocationLog, QuotaStore};
