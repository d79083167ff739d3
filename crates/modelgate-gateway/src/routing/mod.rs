//! Routing layer: endpoint selection composed over policy and quota.

pub mod router;
pub mod traits;

pub use router::ModelRouter;
pub use traits::{PolicyEvaluator, QuotaReserver};
