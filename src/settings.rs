use crate::store::StoreConfig;
use crate::subscriptions::DEFAULT_BUFFER_SIZE;
use std::env;
use std::error::Error;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::Level;

pub trait FromEnv: Sized {
    fn from_env(env_var: &str) -> anyhow::Result<Self>;

    /// Like `from_env`, but an unset variable yields `default`. A set but
    /// unparsable variable is still an error.
    fn from_env_or(env_var: &str, default: Self) -> anyhow::Result<Self> {
        match env::var(env_var) {
            Err(env::VarError::NotPresent) => Ok(default),
            _ => Self::from_env(env_var),
        }
    }
}

impl<T: FromStr> FromEnv for T
where
    <T as FromStr>::Err: 'static + Error + Send + Sync,
{
    fn from_env(env_var: &str) -> anyhow::Result<Self> {
        let value = env::var(env_var)?;
        Ok(T::from_str(&value)?)
    }
}

pub struct AppSettings {
    pub level: Level,
    pub app_host: IpAddr,
    pub app_port: u16,

    /// Unset keeps all matches and commentary in memory.
    pub data_dir: Option<PathBuf>,
    pub sync_interval: u64,
    pub subscriber_buffer: usize,
}

impl AppSettings {
    pub fn load_from_env() -> anyhow::Result<Self> {
        let _ = dotenv::dotenv();

        let level = Level::from_env_or("LOG_LEVEL", Level::INFO)?;
        let app_host = IpAddr::from_env_or("APP_HOST", IpAddr::V4(Ipv4Addr::UNSPECIFIED))?;
        let app_port = u16::from_env_or("APP_PORT", 2999)?;

        let data_dir = env::var("DATA_DIR")
            .ok()
            .filter(|dir| !dir.trim().is_empty())
            .map(PathBuf::from);
        let sync_interval = u64::from_env_or("SYNC_INTERVAL", 1)?;
        let subscriber_buffer = usize::from_env_or("SUBSCRIBER_BUFFER", DEFAULT_BUFFER_SIZE)?;

        Ok(AppSettings {
            level,
            app_host,
            app_port,

            data_dir,
            sync_interval,
            subscriber_buffer,
        })
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.app_host, self.app_port)
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            path: self.data_dir.clone(),
            create_if_missing: true,
            sync_interval: self.sync_interval.max(1),
            subscriber_buffer: self.subscriber_buffer.max(1),
        }
    }
}
