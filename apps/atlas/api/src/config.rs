use core_config::{AppInfo, FromEnv, app_info, env_optional, server::ServerConfig};
use domain_photo_embeddings::{BatchConfig, HttpEmbedderConfig};
use std::path::PathBuf;

// Re-export Environment for use in other modules
pub use core_config::Environment;

/// Application-specific configuration
/// Composes shared config components from the `config` library
#[derive(Clone, Debug)]
pub struct Config {
    pub app: AppInfo,
    pub server: ServerConfig,
    pub environment: Environment,
    pub batch: BatchConfig,
    /// `None` leaves generation disabled; requests get a 503
    pub generator: Option<HttpEmbedderConfig>,
    /// JSON catalog seeding the photo directory
    pub photo_catalog: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> eyre::Result<Self> {
        let environment = Environment::from_env();
        let server = ServerConfig::from_env()?; // Uses defaults: HOST=0.0.0.0, PORT=8080
        let batch = BatchConfig::from_env()?;
        let generator = HttpEmbedderConfig::from_env()?;
        let photo_catalog = env_optional("PHOTO_CATALOG_PATH").map(PathBuf::from);

        Ok(Self {
            app: app_info!(),
            server,
            environment,
            batch,
            generator,
            photo_catalog,
        })
    }
}
