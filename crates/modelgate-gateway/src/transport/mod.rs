//! Transport layer (HTTP).
//!
//! Decodes JSON requests, calls the admission engines through `AppState`,
//! and encodes results. No admission logic lives here.

pub mod http;
