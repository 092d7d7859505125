//! PostgreSQL readiness probe.

use async_trait::async_trait;
use dockhand_core::{ConnectionDescriptor, Error, Probe, Result};
use sqlx::{Connection, PgConnection};
use tracing::{debug, warn};

/// Opens a `PgConnection` and pings it.
///
/// Expects a `postgres://` descriptor, e.g. built from parameters with
/// `ConnectionParameters::with_scheme("postgres")`.
#[derive(Debug, Clone, Default)]
pub struct PgProbe;

#[async_trait]
impl Probe for PgProbe {
    type Connection = PgConnection;

    async fn open(&self, descriptor: &ConnectionDescriptor) -> Result<PgConnection> {
        debug!(descriptor = %descriptor.redacted(), "Opening PostgreSQL connection");
        PgConnection::connect(descriptor.as_str())
            .await
            .map_err(|e| Error::Connection(e.to_string()))
    }

    async fn verify(&self, connection: &mut PgConnection) -> Result<()> {
        connection
            .ping()
            .await
            .map_err(|e| Error::Connection(e.to_string()))
    }

    async fn release(&self, connection: PgConnection) {
        if let Err(e) = connection.close().await {
            warn!(error = %e, "Failed to close PostgreSQL connection");
        }
    }
}
