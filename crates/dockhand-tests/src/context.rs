//! Test context providing a verified connection.

use crate::containers::PostgresContainer;
use dockhand_core::{
    ConnectionDescriptor, ConnectionParameters, ConnectionStringBuilder, RetryConnector,
};
use dockhand_probe::PgProbe;
use sqlx::PgConnection;

/// A running PostgreSQL container and a connection verified through
/// Dockhand's retry connector.
///
/// Drop this to stop the container.
pub struct TestContext {
    pub postgres: PostgresContainer,
    pub params: ConnectionParameters,
    pub descriptor: ConnectionDescriptor,
    pub connection: PgConnection,
    /// Readiness attempts the connector needed.
    pub attempts: u32,
}

impl TestContext {
    /// Start PostgreSQL and wait until it answers.
    pub async fn postgres() -> anyhow::Result<Self> {
        crate::init_test_logging();

        let postgres = PostgresContainer::start().await?;
        let params = postgres.params();
        let descriptor = ConnectionStringBuilder::build(&params)?;

        let ready = RetryConnector::default()
            .connect(&descriptor, &PgProbe)
            .await?;

        Ok(Self {
            postgres,
            params,
            descriptor,
            connection: ready.connection,
            attempts: ready.attempts,
        })
    }

    /// Get database connection string.
    pub fn db_url(&self) -> &str {
        self.descriptor.as_str()
    }
}
