pub mod pdf_parser;

pub use pdf_parser::PdfParser;

use crate::utils::NoticeResult;

/// 文档 → 线性文本。没有文本层时返回空串而不是错误。
pub trait TextExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8]) -> NoticeResult<String>;
}

/// 已去除首尾空白并截断到上限的文本，只有它能进入提示词
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    text: String,
    truncated: bool,
}

impl ExtractedText {
    /// 截断按字符计数，不会切断多字节字符
    pub fn bounded(raw: &str, max_chars: usize) -> Self {
        let trimmed = raw.trim();
        match trimmed.char_indices().nth(max_chars) {
            Some((cut, _)) => Self {
                text: trimmed[..cut].to_string(),
                truncated: true,
            },
            None => Self {
                text: trimmed.to_string(),
                truncated: false,
            },
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}
