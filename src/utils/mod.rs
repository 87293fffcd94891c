pub mod logger;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NoticeError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("网络请求错误: {0}")]
    Network(#[from] reqwest::Error),

    #[error("推理API返回错误 {status}: {body}")]
    Api { status: u16, body: String },

    #[error("推理服务错误: {0}")]
    Inference(String),

    #[error("PDF处理错误: {0}")]
    Pdf(String),

    #[error("响应中没有可解析的JSON对象: {0}")]
    MalformedResponse(String),

    #[error("未提取到任何数据 (共处理 {attempted} 个文档)")]
    NothingExtracted { attempted: usize },

    #[error("导出错误: {0}")]
    Export(String),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serde(#[from] serde_json::Error),
}

impl NoticeError {
    /// 是否值得重试：超时、连接失败、429 和 5xx
    pub fn is_transient(&self) -> bool {
        match self {
            NoticeError::Network(e) => e.is_timeout() || e.is_connect(),
            NoticeError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<config::ConfigError> for NoticeError {
    fn from(e: config::ConfigError) -> Self {
        NoticeError::Config(e.to_string())
    }
}

pub type NoticeResult<T> = Result<T, NoticeError>;
