//! Postgres connection pool for the metric store.

use crate::config::AppConfig;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use bb8::{ManageConnection, Pool};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ClientConfig, RootCertStore};
use std::{fs::File, io::BufReader};
use tokio_postgres::{
    tls::{MakeTlsConnect, TlsConnect},
    Client, Config as PgConfig, NoTls, Socket,
};
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::{error, info, warn};

pub type PgPool = Pool<PgConnectionManager>;

pub async fn connect_pool(config: &AppConfig) -> Result<PgPool> {
    let tls = TlsFiles::from_config(config).connector()?;
    let pg_config = config
        .database_url
        .parse::<PgConfig>()
        .context("invalid metric database URL")?;
    let manager = PgConnectionManager {
        config: pg_config,
        tls,
    };

    let pool = Pool::builder()
        .max_size(config.max_pool_size)
        .build(manager)
        .await
        .context("failed to build metric store connection pool")?;

    if let Err(err) = pool.get().await {
        warn!(error = ?err, "metric store is not reachable yet");
    } else {
        info!(max_size = config.max_pool_size, "metric store pool ready");
    }

    Ok(pool)
}

#[derive(Clone)]
pub struct PgConnectionManager {
    config: PgConfig,
    tls: Option<MakeRustlsConnect>,
}

#[async_trait]
impl ManageConnection for PgConnectionManager {
    type Connection = Client;
    type Error = anyhow::Error;

    async fn connect(&self) -> Result<Client> {
        match &self.tls {
            Some(connector) => open(&self.config, connector.clone()).await,
            None => open(&self.config, NoTls).await,
        }
    }

    async fn is_valid(&self, conn: &mut Client) -> Result<()> {
        conn.simple_query("SELECT 1").await?;
        Ok(())
    }

    fn has_broken(&self, conn: &mut Client) -> bool {
        conn.is_closed()
    }
}

/// Connects and drives the connection future on its own task.
async fn open<T>(config: &PgConfig, tls: T) -> Result<Client>
where
    T: MakeTlsConnect<Socket> + Send + Sync + 'static,
    T::Stream: Send + Sync + 'static,
    T::TlsConnect: Send,
    <T::TlsConnect as TlsConnect<Socket>>::Future: Send,
{
    let (client, connection) = config.connect(tls).await?;
    tokio::spawn(async move {
        if let Err(err) = connection.await {
            error!(error = %err, "metric store connection closed");
        }
    });
    Ok(client)
}

/// PEM files for TLS to Postgres. TLS is off unless a root certificate is configured.
struct TlsFiles<'a> {
    root_cert: Option<&'a str>,
    client_cert: Option<&'a str>,
    client_key: Option<&'a str>,
}

impl<'a> TlsFiles<'a> {
    fn from_config(config: &'a AppConfig) -> Self {
        Self {
            root_cert: config.pg_ssl_root_cert.as_deref(),
            client_cert: config.pg_ssl_cert.as_deref(),
            client_key: config.pg_ssl_key.as_deref(),
        }
    }

    fn connector(&self) -> Result<Option<MakeRustlsConnect>> {
        let Some(root_cert) = self.root_cert else {
            return Ok(None);
        };

        let mut roots = RootCertStore::empty();
        for cert in read_certs(root_cert, "PGSSLROOTCERT")? {
            roots
                .add(cert)
                .with_context(|| format!("invalid certificate in PGSSLROOTCERT '{root_cert}'"))?;
        }

        let builder = ClientConfig::builder().with_root_certificates(roots);
        let tls = match (self.client_cert, self.client_key) {
            (None, None) => builder.with_no_client_auth(),
            (Some(cert), Some(key)) => builder
                .with_client_auth_cert(read_certs(cert, "PGSSLCERT")?, read_key(key)?)
                .context("invalid client certificate or key")?,
            _ => bail!("PGSSLCERT and PGSSLKEY must be set together"),
        };

        Ok(Some(MakeRustlsConnect::new(tls)))
    }
}

fn read_certs(path: &str, label: &str) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path).with_context(|| format!("failed to open {label} '{path}'"))?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("failed to parse {label} '{path}'"))?;
    if certs.is_empty() {
        bail!("{label} '{path}' contains no certificates");
    }
    Ok(certs)
}

fn read_key(path: &str) -> Result<PrivateKeyDer<'static>> {
    let file = File::open(path).with_context(|| format!("failed to open PGSSLKEY '{path}'"))?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .with_context(|| format!("failed to parse PGSSLKEY '{path}'"))?
        .with_context(|| format!("PGSSLKEY '{path}' contains no private key"))
}
