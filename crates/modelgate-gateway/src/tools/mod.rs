//! Tool bus: capability registry and negotiation for auxiliary tools.

pub mod bus;

pub use bus::{
    NegotiationRequest, NegotiationResult, ToolBus, ToolCapability, ToolExecutionRequest,
    ToolExecutionResult, ToolHandler, ToolPlugin,
};
