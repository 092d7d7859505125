//! Readiness probes for Dockhand.
//!
//! Each probe implements [`dockhand_core::Probe`]: open a connection from a
//! descriptor, verify it with a trivial round trip, release it on failure.

#[cfg(feature = "postgres")]
pub mod postgres;
pub mod tcp;

#[cfg(feature = "postgres")]
pub use postgres::PgProbe;
pub use tcp::TcpProbe;
