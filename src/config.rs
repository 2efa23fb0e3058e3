use crate::error::{LexiconError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub max_concurrent: usize,
    pub batch_size: usize,
    pub timeout_seconds: u64,
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
            .ok_or_else(|| LexiconError::Config("ホームディレクトリが見つかりません".into()))?;
        Ok(home.join(".config").join("lexicon").join("config.json"))
    }

    /// APIキーを取得（Ollamaローカル実行では不要なのでNoneを許容）
    pub fn api_key(&self) -> Option<String> {
        // 環境変数を優先
        if let Ok(key) = std::env::var("LEXICON_API_KEY") {
            return Some(key);
        }
        self.api_key.clone()
    }

    pub fn set_api_key(&mut self, key: String) -> Result<()> {
        self.api_key = Some(key);
        self.save()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "http://localhost:11434/v1".into(),
            model: "qwen3-vl:8b-thinking".into(),
            max_concurrent: 10,
            batch_size: 20,
            timeout_seconds: 120,
        }
    }
}
