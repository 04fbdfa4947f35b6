//! Service configuration loaded from the environment.

use std::path::PathBuf;
use std::time::Duration;

/// Default retention window for finished artifacts.
const DEFAULT_RETENTION_SECS: u64 = 600;

/// Server and supervisor configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind_address: String,
    /// Server port
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
    /// Path to the yt-dlp binary
    pub ytdlp_path: String,
    /// Optional cookies file passed to the worker when it exists
    pub cookies_file: Option<PathBuf>,
    /// Directory for in-flight and finished artifacts
    pub temp_dir: PathBuf,
    /// How long finished artifacts are kept before deletion
    pub retention: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8081,
            enable_cors: true,
            ytdlp_path: "yt-dlp".to_string(),
            cookies_file: None,
            temp_dir: PathBuf::from("temp_downloads"),
            retention: Duration::from_secs(DEFAULT_RETENTION_SECS),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    ///
    /// Supported env vars:
    /// - `API_BIND_ADDRESS` (e.g. "0.0.0.0")
    /// - `API_PORT` (e.g. "8081")
    /// - `YTDLP_PATH` (path to the yt-dlp binary)
    /// - `COOKIES_FILE` (path to a Netscape cookies file)
    /// - `MEDIAGRAB_TEMP_DIR` (artifact directory)
    /// - `MEDIAGRAB_RETENTION_SECS` (finished-artifact retention)
    pub fn from_env_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(bind_address) = std::env::var("API_BIND_ADDRESS")
            && !bind_address.trim().is_empty()
        {
            config.bind_address = bind_address;
        }

        if let Ok(port) = std::env::var("API_PORT")
            && let Ok(parsed) = port.parse::<u16>()
        {
            config.port = parsed;
        }

        if let Ok(path) = std::env::var("YTDLP_PATH")
            && !path.trim().is_empty()
        {
            config.ytdlp_path = path;
        }

        if let Ok(path) = std::env::var("COOKIES_FILE")
            && !path.trim().is_empty()
        {
            config.cookies_file = Some(PathBuf::from(path));
        }

        if let Ok(dir) = std::env::var("MEDIAGRAB_TEMP_DIR")
            && !dir.trim().is_empty()
        {
            config.temp_dir = PathBuf::from(dir);
        }

        if let Ok(secs) = std::env::var("MEDIAGRAB_RETENTION_SECS")
            && let Ok(parsed) = secs.parse::<u64>()
        {
            config.retention = Duration::from_secs(parsed);
        }

        config
    }

    /// Cookies file path, if configured and present on disk.
    pub fn existing_cookies_file(&self) -> Option<&PathBuf> {
        self.cookies_file.as_ref().filter(|p| p.exists())
    }

    /// Create the temp downloads directory if it does not exist yet.
    pub fn ensure_temp_dir(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.temp_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_address, "0.0.0.0");
        assert_eq!(config.port, 8081);
        assert_eq!(config.ytdlp_path, "yt-dlp");
        assert_eq!(config.retention, Duration::from_secs(600));
        assert!(config.enable_cors);
        assert!(config.cookies_file.is_none());
    }

    #[test]
    fn test_missing_cookies_file_is_ignored() {
        let config = ServerConfig {
            cookies_file: Some(PathBuf::from("/definitely/not/here/cookies.txt")),
            ..Default::default()
        };
        assert!(config.existing_cookies_file().is_none());
    }
}
