//! modelgate core: the admission data model, the error type and the clock.
//!
//! Shared by the gateway and by anything that implements an engine seam
//! (mocks in tests, remote evaluators). No runtime or transport deps live here.
//!
//! Panics, `unwrap` and `expect` are denied at compile time; failures surface
//! as `GateError`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod clock;
pub mod error;
pub mod model;

pub use clock::{Clock, ManualClock, SystemClock};
/// Shared result type.
pub use error::{GateError, Result};
