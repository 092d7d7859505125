//! Integration test infrastructure for Dockhand.
//!
//! Provides testcontainers-based fixtures for running the probes and the
//! Docker adapter against real services.
//!
//! # Usage
//!
//! ```ignore
//! use dockhand_tests::TestContext;
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let mut ctx = TestContext::postgres().await.unwrap();
//!     // Use ctx.connection, ctx.params, ...
//! }
//! ```

pub mod containers;
pub mod context;
pub mod fixtures;
pub mod helpers;

pub use context::TestContext;
pub use fixtures::*;
pub use helpers::*;

/// Initialize test logging (call once per test binary).
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,dockhand_core=debug,dockhand_docker=debug")),
        )
        .with_test_writer()
        .try_init();
}
