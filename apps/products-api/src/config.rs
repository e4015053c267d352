//! Configuration for Products API

use core_config::{AppInfo, FromEnv, app_info, env_or_default, server::ServerConfig};
use database::common::RetryConfig;
use database::mongodb::MongoConfig;

pub use core_config::Environment;

/// Application configuration
#[derive(Clone, Debug)]
pub struct Config {
    pub app: AppInfo,
    pub mongodb: MongoConfig,
    pub retry: RetryConfig,
    pub server: ServerConfig,
    pub environment: Environment,
    /// Collection holding product documents (`PRODUCTS_COLLECTION`)
    pub collection: String,
}

impl Config {
    pub fn from_env() -> eyre::Result<Self> {
        let environment = Environment::from_env();
        let mongodb = MongoConfig::from_env()?;
        let retry = RetryConfig::from_env()?;
        let server = ServerConfig::from_env()?;
        let collection = env_or_default(
            "PRODUCTS_COLLECTION",
            domain_products::mongodb::DEFAULT_COLLECTION,
        );

        Ok(Self {
            app: app_info!(),
            mongodb,
            retry,
            server,
            environment,
            collection,
        })
    }
}
