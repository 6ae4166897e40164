//! Black-box HTTP tests for the coordination service: drives the real
//! axum router over in-memory/fake adapters with `tower::ServiceExt::oneshot`.

pub mod harness;

pub use harness::TestHarness;
