//! modelgate: request admission and model routing.
//!
//! Single dependency entry point. `core` holds the data model and errors,
//! `gateway` the engines, config loading and HTTP surface. `prelude` pulls in
//! what an embedding application usually needs to build and drive a router.

pub mod core {
    pub use modelgate_core::*;
}

pub mod gateway {
    pub use modelgate_gateway::*;
}

pub mod prelude {
    pub use modelgate_core::model::{
        BucketConfig, Effect, ModelEndpoint, Policy, PolicyContext, PolicyResult, QuotaRequest,
        QuotaReservation, RoutingRequest, RoutingResult,
    };
    pub use modelgate_core::{Clock, GateError, ManualClock, Result, SystemClock};
    pub use modelgate_gateway::config::{GatewayConfig, QuotaSection, RouterSection};
    pub use modelgate_gateway::policy::PolicyEngine;
    pub use modelgate_gateway::quota::QuotaEngine;
    pub use modelgate_gateway::routing::{ModelRouter, PolicyEvaluator, QuotaReserver};
}
