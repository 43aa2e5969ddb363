//! Configuration for the engine.
//!
//! Config files may carry API keys, so loading validates file
//! permissions on Unix systems: symlinks, world-writable files, and
//! world-readable files containing keys are rejected.

use mnemo_common::{MnemoError, Result};
use mnemo_llm::LlmConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

/// Main engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Language-model provider configuration
    #[serde(default)]
    pub provider: LlmConfig,

    /// Memory store configuration
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store backend: "memory" (transient) or "sqlite" (durable)
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Path to the SQLite database (durable backend only)
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Maximum stored records fetched per user when building the
    /// existing-memory view
    #[serde(default = "default_retrieve_limit")]
    pub retrieve_limit: usize,
}

fn default_backend() -> String {
    "memory".into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/memory.db")
}

fn default_retrieve_limit() -> usize {
    15
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            db_path: default_db_path(),
            retrieve_limit: default_retrieve_limit(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file, validating file permissions
    /// on Unix.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();

        #[cfg(unix)]
        validate_config_file_permissions(path)?;

        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| MnemoError::Config(format!("Invalid config file: {e}")))?;

        if config.provider.api_key.is_some() {
            warn!(
                "API key found in config file '{}'. For better security, \
                 use environment variables instead (GEMINI_API_KEY, OPENAI_API_KEY).",
                path.display()
            );
        }

        Ok(config)
    }
}

/// Validate config file permissions on Unix systems.
///
/// Requirements:
/// - File must be a regular file (not symlink, directory, etc.)
/// - File must not be world-writable
/// - If file contains API key patterns, must not be world-readable
#[cfg(unix)]
fn validate_config_file_permissions(path: &std::path::Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = std::fs::metadata(path).map_err(|e| {
        MnemoError::Config(format!(
            "Failed to read config file '{}': {e}",
            path.display()
        ))
    })?;

    if !metadata.is_file() {
        return Err(MnemoError::Config(format!(
            "Config path '{}' is not a regular file. Symlinks and directories are not allowed.",
            path.display()
        )));
    }

    let mode = metadata.permissions().mode();
    let permission_bits = mode & 0o777;

    if permission_bits & 0o002 != 0 {
        return Err(MnemoError::Config(format!(
            "Config file '{}' is world-writable (mode {:04o}). \
             This is a security risk. Fix with: chmod o-w {}",
            path.display(),
            permission_bits,
            path.display()
        )));
    }

    let content = std::fs::read_to_string(path).unwrap_or_default();
    let has_api_key =
        content.contains("api_key") && (content.contains("key =") || content.contains("sk-"));

    if has_api_key && permission_bits & 0o004 != 0 {
        return Err(MnemoError::Config(format!(
            "Config file '{}' contains an API key but is world-readable (mode {:04o}). \
             This is a security risk. Fix with: chmod 600 {}",
            path.display(),
            permission_bits,
            path.display()
        )));
    }

    if has_api_key && permission_bits & 0o040 != 0 {
        warn!(
            "Config file '{}' contains an API key and is group-readable (mode {:04o}). \
             Consider restricting access with: chmod 600 {}",
            path.display(),
            permission_bits,
            path.display()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOML_CONFIG: &str = r#"
[provider]
provider = "openai"
model = "gpt-4o-mini"
api_url = "http://localhost:11434"

[store]
backend = "sqlite"
db_path = "/tmp/mnemo-test/memory.db"
retrieve_limit = 25
"#;

    #[test]
    fn deserialize_full_config() {
        let config: EngineConfig = toml::from_str(TOML_CONFIG).unwrap();
        assert_eq!(config.provider.provider, "openai");
        assert_eq!(config.provider.model, "gpt-4o-mini");
        assert_eq!(config.store.backend, "sqlite");
        assert_eq!(config.store.retrieve_limit, 25);
    }

    #[test]
    fn defaults_cover_missing_sections() {
        let config: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(config.provider.provider, "gemini");
        assert_eq!(config.provider.model, "gemini-2.5-flash");
        assert_eq!(config.store.backend, "memory");
        assert_eq!(config.store.retrieve_limit, 15);
    }

    #[cfg(unix)]
    #[test]
    fn world_writable_config_is_rejected() {
        use std::io::Write;
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[provider]\nprovider = \"gemini\"\nmodel = \"m\"").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o666)).unwrap();

        assert!(EngineConfig::from_file(&path).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn private_config_loads() {
        use std::io::Write;
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[provider]\nprovider = \"gemini\"\nmodel = \"m\"").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).unwrap();

        let config = EngineConfig::from_file(&path).unwrap();
        assert_eq!(config.provider.model, "m");
    }
}
