use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::utils::{NoticeError, NoticeResult};

/// 默认配置文件路径
pub const DEFAULT_CONFIG_PATH: &str = "config/settings.toml";

/// 环境变量前缀，例如 `LITIGATION__INFERENCE__MODEL`
const ENV_PREFIX: &str = "LITIGATION";

/// 推理服务凭据的兜底环境变量
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InferenceProvider {
    /// Google Gemini generateContent
    #[default]
    Gemini,
    /// OpenAI 兼容的 chat/completions 接口
    OpenAi,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InferenceConfig {
    #[serde(default)]
    pub provider: InferenceProvider,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// 单个文档的最大请求次数（仅对瞬时错误重试）
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default)]
    pub proxy: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExtractionConfig {
    /// 发送给模型前的文本长度上限（字符数）
    #[serde(default = "default_max_text_chars")]
    pub max_text_chars: usize,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub request_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExportConfig {
    #[serde(default = "default_output_path")]
    pub output_path: String,
    #[serde(default = "default_sheet_name")]
    pub sheet_name: String,
}

fn default_api_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    500
}

fn default_max_text_chars() -> usize {
    6000
}

fn default_concurrency() -> usize {
    1
}

fn default_output_path() -> String {
    crate::export::DEFAULT_FILE_NAME.to_string()
}

fn default_sheet_name() -> String {
    "Litigation Tracker".to_string()
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            provider: InferenceProvider::default(),
            api_key: String::new(),
            api_url: default_api_url(),
            model: default_model(),
            temperature: 0.0,
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            proxy: String::new(),
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_text_chars: default_max_text_chars(),
            concurrency: default_concurrency(),
            request_delay_ms: 0,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_path: default_output_path(),
            sheet_name: default_sheet_name(),
        }
    }
}

impl AppConfig {
    /// 加载配置：默认值 → 配置文件（可缺省）→ 环境变量
    pub fn load(path: &Path) -> NoticeResult<Self> {
        let settings = config::Config::builder()
            .add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut app_config: AppConfig = settings.try_deserialize()?;
        app_config
            .inference
            .apply_credential_fallback(std::env::var(API_KEY_ENV).ok());
        app_config.validate()?;
        Ok(app_config)
    }

    pub fn save(&self, path: &Path) -> NoticeResult<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| NoticeError::Config(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> NoticeResult<()> {
        if self.extraction.max_text_chars == 0 {
            return Err(NoticeError::Config("extraction.max_text_chars 必须大于 0".into()));
        }
        if self.extraction.concurrency == 0 {
            return Err(NoticeError::Config("extraction.concurrency 必须大于 0".into()));
        }
        if self.inference.max_attempts == 0 {
            return Err(NoticeError::Config("inference.max_attempts 必须大于 0".into()));
        }
        if self.inference.timeout_secs == 0 {
            return Err(NoticeError::Config("inference.timeout_secs 必须大于 0".into()));
        }
        Ok(())
    }
}

impl InferenceConfig {
    /// 配置中未填写 api_key 时使用环境变量中的凭据
    pub fn apply_credential_fallback(&mut self, env_key: Option<String>) {
        if self.api_key.trim().is_empty() {
            if let Some(key) = env_key.filter(|k| !k.trim().is_empty()) {
                self.api_key = key;
            }
        }
    }

    /// 检查 API key 是否已配置
    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}
