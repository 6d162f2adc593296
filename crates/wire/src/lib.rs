//! autotest-wire: JSON records exchanged with the external testing service.
//!
//! The engine (`autotest-harness`) and the stub service
//! (`autotest-stub-service`) both depend on this crate so the two sides of
//! the contract cannot drift. Records produced by the engine use PascalCase
//! field names; query parameters use lower camel case.

pub mod records;

pub use records::*;

/// Language identifier sent when opening a session.
pub const HARNESS_LANG: &str = "Rust";

/// Endpoint paths, relative to the service URL.
pub mod endpoints {
    pub const START_SESSION: &str = "startSession";
    pub const END_SESSION: &str = "endSession";
    pub const IS_API_ENABLED: &str = "isApiEnabled";
    pub const GET_REQUESTS: &str = "request";
    pub const VALIDATE_RESULT: &str = "response";
}
