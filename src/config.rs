use crate::error::{DeployError, Result};
use crate::ingest::IngestLimits;
use crate::transfer::PollPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const ACCESS_KEY_ENV: &str = "MAMMO_ACCESS_KEY";
const SERVER_URL_ENV: &str = "MAMMO_SERVER_URL";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub access_key: Option<String>,
    pub server_url: Option<String>,
    pub max_archive_bytes: u64,
    pub max_studies: usize,
    pub max_images: usize,
    pub poll_interval_seconds: u64,
    pub poll_max_attempts: u32,
    pub session_timeout_seconds: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            access_key: None,
            server_url: None,
            max_archive_bytes: 4 << 30,  // 4 GB
            max_studies: 100,
            max_images: 1000,
            poll_interval_seconds: 30,
            poll_max_attempts: 100,
            session_timeout_seconds: 60,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| DeployError::Config("ホームディレクトリが見つかりません".into()))?;
        Ok(home.join(".config").join("mammo-deploy").join("config.json"))
    }

    /// アクセスキー（引数 > 環境変数 > 設定ファイル）
    pub fn access_key(&self, cli_value: Option<&str>) -> Result<String> {
        pick(cli_value, ACCESS_KEY_ENV, self.access_key.as_deref()).ok_or(DeployError::MissingAccessKey)
    }

    /// サーバーURL（引数 > 環境変数 > 設定ファイル）
    pub fn server_url(&self, cli_value: Option<&str>) -> Result<String> {
        pick(cli_value, SERVER_URL_ENV, self.server_url.as_deref())
            .map(|url| url.trim_end_matches('/').to_string())
            .ok_or(DeployError::MissingServerUrl)
    }

    pub fn set_access_key(&mut self, key: String) -> Result<()> {
        self.access_key = Some(key);
        self.save()
    }

    pub fn set_server_url(&mut self, url: String) -> Result<()> {
        self.server_url = Some(url);
        self.save()
    }

    pub fn ingest_limits(&self) -> IngestLimits {
        IngestLimits {
            max_studies: self.max_studies,
            max_images: self.max_images,
        }
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_secs(self.poll_interval_seconds),
            max_attempts: self.poll_max_attempts,
        }
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_seconds)
    }
}

fn pick(cli_value: Option<&str>, env_key: &str, file_value: Option<&str>) -> Option<String> {
    // 空白のみの値は未設定として次の取得元へ
    let non_blank = |v: &String| !v.trim().is_empty();
    cli_value
        .map(str::to_string)
        .filter(non_blank)
        .or_else(|| std::env::var(env_key).ok().filter(non_blank))
        .or_else(|| file_value.map(str::to_string).filter(non_blank))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let config = Config::default();
        let limits = config.ingest_limits();
        assert_eq!(limits.max_studies, 100);
        assert_eq!(limits.max_images, 1000);
        assert_eq!(config.poll_policy().max_attempts, 100);
        assert_eq!(config.poll_policy().interval, Duration::from_secs(30));
    }

    #[test]
    fn test_partial_config_file_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{"server_url": "https://example.org/"}"#).unwrap();
        assert_eq!(config.max_images, 1000);
        assert_eq!(config.server_url(Some("https://cli.example.org/")).unwrap(), "https://cli.example.org");
    }

    #[test]
    fn test_cli_value_wins() {
        let config = Config {
            access_key: Some("from-file".into()),
            ..Default::default()
        };
        assert_eq!(config.access_key(Some("from-cli")).unwrap(), "from-cli");
    }

    #[test]
    fn test_blank_value_is_missing() {
        let config = Config::default();
        assert!(matches!(
            config.access_key(Some("  ")),
            Err(DeployError::MissingAccessKey)
        ));
    }

    #[test]
    fn test_blank_cli_value_falls_back_to_file() {
        let config = Config {
            access_key: Some("from-file".to_string()),
            ..Config::default()
        };
        assert_eq!(config.access_key(Some("")).unwrap(), "from-file");
        assert_eq!(config.access_key(Some("   ")).unwrap(), "from-file");
        assert_eq!(config.access_key(Some("from-cli")).unwrap(), "from-cli");
    }
}
