//! Testcontainer configurations for integration tests.

use dockhand_core::ConnectionParameters;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;

/// PostgreSQL container started independently of Dockhand's own provisioner.
pub struct PostgresContainer {
    #[allow(dead_code)] // Kept to maintain container lifetime
    container: ContainerAsync<Postgres>,
    host: String,
    port: u16,
}

impl PostgresContainer {
    pub async fn start() -> anyhow::Result<Self> {
        let container = Postgres::default().with_tag("16-alpine").start().await?;

        let host = container.get_host().await?.to_string();
        let port = container.get_host_port_ipv4(5432).await?;

        Ok(Self {
            container,
            host,
            port,
        })
    }

    /// Parameters for the module's default `postgres` user and database.
    pub fn params(&self) -> ConnectionParameters {
        ConnectionParameters::new(&self.host, self.port, "postgres", "postgres", "postgres")
            .with_scheme("postgres")
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires docker"]
    async fn test_postgres_container_starts() {
        let pg = PostgresContainer::start().await.unwrap();
        assert!(pg.port() > 0);
        assert_eq!(pg.params().scheme, "postgres");
    }
}
