use color_eyre::eyre::{eyre, Report, WrapErr};
use std::{env, fmt::Display, str::FromStr};
use tracing::info;

const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8080";
const DEFAULT_MAX_CONNECTIONS: &str = "5";

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// Without a database url ideas live in memory and vanish on restart
    pub database_url: Option<String>,
    pub bind_address: String,
    pub database_max_connections: u32,
}

impl Config {
    /// Reads `.env` if present, then the process environment.
    pub fn from_env() -> Result<Self, Report> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, Report>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());
        if database_url.is_none() {
            info!("DATABASE_URL not set, using in-memory store");
        }
        Ok(Self {
            database_url,
            bind_address: try_load(&lookup, "BIND_ADDRESS", DEFAULT_BIND_ADDRESS)?,
            database_max_connections: try_load(
                &lookup,
                "DATABASE_MAX_CONNECTIONS",
                DEFAULT_MAX_CONNECTIONS,
            )?,
        })
    }
}

fn try_load<F, T>(lookup: &F, key: &str, default: &str) -> Result<T, Report>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    let value = lookup(key).unwrap_or_else(|| {
        info!("{} not set, using default: {}", key, default);
        default.to_owned()
    });
    value
        .parse()
        .map_err(|e| eyre!("{}", e))
        .wrap_err_with(|| format!("Invalid {} value: {:?}", key, value))
}
