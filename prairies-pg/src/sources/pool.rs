//! Connexion PostgreSQL du moteur d'agrégation
//!
//! Chaque paramètre vient, par ordre de priorité, de la ligne de commande,
//! des variables `PG*` de libpq, puis d'une valeur par défaut.

use std::time::Duration;

use anyhow::{Context, Result};
use deadpool_postgres::{Config, Pool, PoolConfig, Runtime, Timeouts};
use tokio_postgres::NoTls;
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::debug;

const DEFAULT_DATABASE: &str = "prairies";
const DEFAULT_POOL_SIZE: usize = 8;

/// Délais du pool (attente d'une connexion, création, recyclage)
const POOL_TIMEOUTS: Timeouts = Timeouts {
    wait: Some(Duration::from_secs(15)),
    create: Some(Duration::from_secs(10)),
    recycle: Some(Duration::from_secs(5)),
};

/// Mode SSL de la connexion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SslMode {
    #[default]
    Disable,
    /// TLS, sans échec si le serveur le refuse
    Prefer,
    Require,
}

impl SslMode {
    fn uses_tls(self) -> bool {
        self != SslMode::Disable
    }
}

impl std::str::FromStr for SslMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "disable" | "off" | "false" => Ok(SslMode::Disable),
            "prefer" | "allow" => Ok(SslMode::Prefer),
            "require" | "on" | "true" => Ok(SslMode::Require),
            other => Err(format!(
                "Invalid SSL mode: {}. Use: disable, prefer, require",
                other
            )),
        }
    }
}

/// Paramètres passés en ligne de commande (prioritaires sur l'environnement)
#[derive(Debug, Clone, Default)]
pub struct DatabaseOverrides {
    pub host: Option<String>,
    pub database: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub port: Option<u16>,
    pub ssl: Option<String>,
}

/// Paramètres de connexion résolus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: Option<String>,
    pub pool_size: usize,
    pub ssl_mode: SslMode,
}

impl DatabaseConfig {
    /// Résout la configuration: ligne de commande, puis `PG*`, puis défauts
    pub fn resolve(overrides: DatabaseOverrides) -> Result<Self> {
        Self::resolve_with(overrides, |key| std::env::var(key).ok())
    }

    /// Comme `resolve`, avec une source de variables explicite
    ///
    /// Une valeur illisible (port, mode SSL, taille du pool) est une erreur,
    /// qu'elle vienne de la ligne de commande ou de l'environnement.
    pub fn resolve_with<F>(overrides: DatabaseOverrides, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = match overrides.port {
            Some(port) => port,
            None => env("PGPORT")
                .map(|p| p.parse::<u16>().context(format!("Invalid PGPORT: {}", p)))
                .transpose()?
                .unwrap_or(5432),
        };
        let ssl_mode = match overrides.ssl.or_else(|| env("PGSSLMODE")) {
            Some(mode) => mode.parse::<SslMode>().map_err(anyhow::Error::msg)?,
            None => SslMode::default(),
        };
        let pool_size = env("POOL_SIZE")
            .map(|s| {
                s.parse::<usize>()
                    .context(format!("Invalid POOL_SIZE: {}", s))
            })
            .transpose()?
            .unwrap_or(DEFAULT_POOL_SIZE);

        let config = Self {
            host: overrides
                .host
                .or_else(|| env("PGHOST"))
                .unwrap_or_else(|| "localhost".into()),
            port,
            dbname: overrides
                .database
                .or_else(|| env("PGDATABASE"))
                .unwrap_or_else(|| DEFAULT_DATABASE.into()),
            user: overrides
                .user
                .or_else(|| env("PGUSER"))
                .unwrap_or_else(|| "postgres".into()),
            password: overrides.password.or_else(|| env("PGPASSWORD")),
            pool_size: pool_size.max(1),
            ssl_mode,
        };
        debug!(
            host = %config.host,
            port = config.port,
            database = %config.dbname,
            ssl = ?config.ssl_mode,
            "Database config resolved"
        );
        Ok(config)
    }

    fn pool_config(&self) -> Config {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = self.password.clone();
        cfg.application_name = Some(env!("CARGO_PKG_NAME").into());
        cfg.pool = Some(PoolConfig {
            max_size: self.pool_size,
            timeouts: POOL_TIMEOUTS,
            ..Default::default()
        });
        cfg
    }
}

/// Connecteur TLS (racines webpki, sans certificat client)
fn tls_connector() -> MakeRustlsConnect {
    let roots = rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    MakeRustlsConnect::new(
        rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth(),
    )
}

/// Crée le pool de connexions
pub async fn create_pool(config: &DatabaseConfig) -> Result<Pool> {
    let cfg = config.pool_config();
    let pool = if config.ssl_mode.uses_tls() {
        cfg.create_pool(Some(Runtime::Tokio1), tls_connector())
    } else {
        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
    };
    pool.context(format!(
        "Failed to create database pool for {}:{}/{}",
        config.host, config.port, config.dbname
    ))
}

/// Vérifie la connexion et renvoie la version du serveur
pub async fn test_connection(pool: &Pool) -> Result<String> {
    let client = pool
        .get()
        .await
        .context("Failed to get connection from pool")?;
    let row = client
        .query_one("SHOW server_version", &[])
        .await
        .context("Connection test failed")?;
    Ok(row.get(0))
}
