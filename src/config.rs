use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

use crate::error::{DocError, Result};

/// Defaults for `convert`: rasterization and OCR settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertConfig {
    pub dpi: u32,
    pub language: Option<String>,
    pub preprocess: bool,
    pub text_layer: bool,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            dpi: 300,
            language: None,
            preprocess: true,
            text_layer: false,
        }
    }
}

impl ConvertConfig {
    pub fn validate(&self) -> Result<()> {
        if !(36..=1200).contains(&self.dpi) {
            return Err(DocError::Config(format!(
                "dpi must be within 36..=1200, got {}",
                self.dpi
            )));
        }
        if let Some(language) = &self.language {
            if language.trim().is_empty() {
                return Err(DocError::Config("language must not be empty".into()));
            }
        }
        Ok(())
    }
}

impl fmt::Display for ConvertConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    /// Headings at this level or higher start a new chapter file.
    pub level: u8,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self { level: 2 }
    }
}

impl SplitConfig {
    pub fn validate(&self) -> Result<()> {
        if !(1..=6).contains(&self.level) {
            return Err(DocError::Config(format!(
                "split level must be within 1..=6, got {}",
                self.level
            )));
        }
        Ok(())
    }
}

impl fmt::Display for SplitConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Settings for the summarization API. The credential is not part of this
/// struct: it is read from the environment variable named by `api_key_env`
/// and handed to the client separately.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarizeConfig {
    pub model: String,
    pub base_url: String,
    pub prompt: String,
    pub max_chunk_chars: usize,
    pub combine_chunks: bool,
    pub output_prefix: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub api_key_env: String,
}

impl Default for SummarizeConfig {
    fn default() -> Self {
        Self {
            model: "o3-mini".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            prompt: "Summarize the following text completely. Use a hierarchical bullet \
                     structure: list the topics it covers, the viewpoints and insights \
                     under each topic, and the key examples or arguments behind each \
                     point."
                .to_string(),
            max_chunk_chars: 12_000,
            combine_chunks: false,
            output_prefix: "sum_".to_string(),
            timeout_secs: 600,
            max_retries: 3,
            api_key_env: "OPENAI_API_KEY".to_string(),
        }
    }
}

impl SummarizeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(DocError::Config("model must not be empty".into()));
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(DocError::Config(format!(
                "base_url must be an http(s) URL, got '{}'",
                self.base_url
            )));
        }
        if self.max_chunk_chars < 100 {
            return Err(DocError::Config(format!(
                "max_chunk_chars must be >= 100, got {}",
                self.max_chunk_chars
            )));
        }
        if self.output_prefix.is_empty() {
            return Err(DocError::Config("output_prefix must not be empty".into()));
        }
        if self.max_retries == 0 {
            return Err(DocError::Config("max_retries must be > 0".into()));
        }
        Ok(())
    }
}

impl fmt::Display for SummarizeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "model={} base_url={} max_chunk_chars={} combine_chunks={}",
            self.model, self.base_url, self.max_chunk_chars, self.combine_chunks
        )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub convert: ConvertConfig,
    pub split: SplitConfig,
    pub summarize: SummarizeConfig,
}

impl AppConfig {
    /// Load a JSON configuration file. Missing sections and fields keep
    /// their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(DocError::io(path))?;
        let config: AppConfig = serde_json::from_str(&raw).map_err(|e| {
            DocError::Config(format!("failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.convert.validate()?;
        self.split.validate()?;
        self.summarize.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_are_valid() {
        AppConfig::default().validate().unwrap();
        assert_eq!(AppConfig::default().split.level, 2);
        assert_eq!(AppConfig::default().convert.dpi, 300);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"summarize": {{"model": "gpt-4o-mini"}}, "split": {{"level": 1}}}}"#)
            .unwrap();

        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.summarize.model, "gpt-4o-mini");
        assert_eq!(config.summarize.output_prefix, "sum_");
        assert_eq!(config.split.level, 1);
        assert!(config.convert.preprocess);
    }

    #[test]
    fn test_invalid_split_level_rejected() {
        let config = SplitConfig { level: 7 };
        assert!(matches!(config.validate(), Err(DocError::Config(_))));
    }

    #[test]
    fn test_malformed_json_is_config_error() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(
            AppConfig::load(file.path()),
            Err(DocError::Config(_))
        ));
    }
}
