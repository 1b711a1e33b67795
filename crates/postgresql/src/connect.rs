//! Connection setup.

use crate::error::PostgresSinkError;
use tokio_postgres::{Client, Config, NoTls};
use tracing::{debug, error};

/// Connection string used when none is given.
pub const DEFAULT_CONNECTION: &str = "host=localhost user=postgres sslmode=disable";

/// Parse `connection` (key/value or URL form) and point it at `db_name`.
///
/// An empty `db_name` keeps whatever database the connection string names.
pub fn build_config(connection: &str, db_name: &str) -> Result<Config, PostgresSinkError> {
    let mut config: Config = connection
        .parse()
        .map_err(|e| PostgresSinkError::Config(format!("invalid connection string: {e}")))?;
    if !db_name.is_empty() {
        config.dbname(db_name);
    }
    Ok(config)
}

/// Open a connection and drive it on a background task.
pub async fn connect(config: &Config) -> Result<Client, PostgresSinkError> {
    let (client, connection) = config.connect(NoTls).await?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            error!("PostgreSQL connection error: {}", e);
        }
    });

    debug!("Connected to PostgreSQL database {:?}", config.get_dbname());
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_postgres::config::Host;

    #[test]
    fn test_build_config_default() {
        let config = build_config(DEFAULT_CONNECTION, "test").unwrap();
        assert_eq!(config.get_dbname(), Some("test"));
        assert_eq!(config.get_user(), Some("postgres"));
        assert_eq!(
            config.get_hosts(),
            &[Host::Tcp("localhost".to_string())][..]
        );
    }

    #[test]
    fn test_build_config_url_form() {
        let config = build_config("postgresql://loader@db.internal:6543/ignored", "metrics").unwrap();
        assert_eq!(config.get_dbname(), Some("metrics"));
        assert_eq!(config.get_ports(), &[6543]);
    }

    #[test]
    fn test_build_config_keeps_dbname_when_empty() {
        let config = build_config("host=localhost dbname=staging", "").unwrap();
        assert_eq!(config.get_dbname(), Some("staging"));
    }

    #[test]
    fn test_build_config_rejects_garbage() {
        let err = build_config("host=localhost sslmode=sometimes", "test").unwrap_err();
        assert!(matches!(err, PostgresSinkError::Config(_)));
    }
}
