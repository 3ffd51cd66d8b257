// ABOUTME: Opens PostgreSQL connections for connection profiles
// ABOUTME: TLS is negotiated through native-tls, falling back per sslmode

use anyhow::{Context, Result};
use async_trait::async_trait;
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use tokio_postgres::Client;
use tracing::{error, info};

use crate::config::ConnectionProfile;
use crate::replication::PgCatalog;
use crate::secrets;

#[derive(Debug, Clone, Copy, Default)]
pub struct TlsOptions {
    /// Skip certificate and hostname verification.
    pub accept_invalid_certs: bool,
}

pub async fn connect(config: &tokio_postgres::Config, tls: TlsOptions) -> Result<Client> {
    let mut builder = TlsConnector::builder();
    if tls.accept_invalid_certs {
        builder
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true);
    }
    let connector = builder.build().context("Failed to build TLS connector")?;
    let connector = MakeTlsConnector::new(connector);

    let (client, connection) = config
        .connect(connector)
        .await
        .context("Failed to connect to PostgreSQL")?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            error!("PostgreSQL connection error: {}", e);
        }
    });

    Ok(client)
}

/// Opens one catalog per connection profile.
#[async_trait]
pub trait Connector: Send + Sync {
    type Catalog: crate::replication::ReplicationCatalog;

    async fn connect(&self, connection: &ConnectionProfile) -> Result<Self::Catalog>;
}

/// Resolves credentials through the profile's secret source and connects.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgConnector {
    pub tls: TlsOptions,
}

impl PgConnector {
    pub fn new(tls: TlsOptions) -> Self {
        Self { tls }
    }
}

#[async_trait]
impl Connector for PgConnector {
    type Catalog = PgCatalog;

    async fn connect(&self, connection: &ConnectionProfile) -> Result<PgCatalog> {
        let config = secrets::resolve(connection).await.with_context(|| {
            format!(
                "Failed to resolve credentials for connection profile '{}'",
                connection.name
            )
        })?;

        let client = connect(&config, self.tls).await.with_context(|| {
            format!(
                "Failed to connect using connection profile '{}'",
                connection.name
            )
        })?;
        info!(
            "Connected to {} via connection profile '{}'",
            config.get_dbname().unwrap_or("<default database>"),
            connection.name
        );

        Ok(PgCatalog::new(client))
    }
}
