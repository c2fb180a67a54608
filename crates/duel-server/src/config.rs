use clap::Parser;
use duel_core::{DbConfig, RefreshConfig};

/// Server configuration parsed from command line arguments and environment variables
#[derive(Parser, Debug)]
#[command(name = "duel")]
#[command(
    author,
    version,
    about = "Card catalog mirror with weekly refresh and incremental client sync"
)]
#[command(after_help = "Examples:
  duel                           # Serve on $PORT and refresh weekly from $API
  duel --port 9000 --no-refresh  # Serve reads only")]
pub struct Config {
    /// PostgreSQL host
    #[arg(long, env = "PG_HOST")]
    pub pg_host: String,

    /// PostgreSQL port
    #[arg(long, env = "PG_PORT")]
    pub pg_port: u16,

    /// PostgreSQL database name
    #[arg(long, env = "PG_DATABASE")]
    pub pg_database: String,

    /// PostgreSQL user
    #[arg(long, env = "PG_USER")]
    pub pg_user: String,

    /// PostgreSQL password
    #[arg(long, env = "PG_PASSWORD", hide_env_values = true)]
    pub pg_password: String,

    /// Upstream card dataset URL; required for refresh cycles
    #[arg(long, env = "API")]
    pub api_url: Option<String>,

    /// HTTP listen port
    #[arg(long, env = "PORT", default_value = "8080")]
    pub port: u16,

    /// Disable the background refresh scheduler
    #[arg(long)]
    pub no_refresh: bool,
}

impl Config {
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(
            &self.pg_host,
            self.pg_port,
            &self.pg_database,
            &self.pg_user,
            &self.pg_password,
        )
    }

    pub fn refresh_config(&self) -> RefreshConfig {
        RefreshConfig {
            api_url: self.api_url.clone(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DB_ARGS: [&str; 11] = [
        "duel",
        "--pg-host",
        "db.internal",
        "--pg-port",
        "5433",
        "--pg-database",
        "cards",
        "--pg-user",
        "duel",
        "--pg-password",
        "secret",
    ];

    #[test]
    fn test_parse_db_flags() {
        let config = Config::try_parse_from(DB_ARGS).unwrap();
        let db = config.db_config();
        assert_eq!(db.host, "db.internal");
        assert_eq!(db.port, 5433);
        assert_eq!(db.database, "cards");
        assert_eq!(db.user, "duel");
        assert_eq!(db.password, "secret");
    }

    #[test]
    fn test_refresh_flags() {
        let args = DB_ARGS
            .iter()
            .copied()
            .chain(["--api-url", "https://api.example.com/cardinfo.php", "--no-refresh"]);
        let config = Config::try_parse_from(args).unwrap();
        assert!(config.no_refresh);
        assert_eq!(
            config.refresh_config().api_url.as_deref(),
            Some("https://api.example.com/cardinfo.php")
        );
        assert_eq!(config.refresh_config().batch_size, 10);
    }

    #[test]
    fn test_invalid_port_rejected() {
        let args = DB_ARGS.iter().copied().chain(["--port", "not-a-port"]);
        assert!(Config::try_parse_from(args).is_err());
    }
}
