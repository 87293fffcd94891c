use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::{NoticeField, NoticeRecord};
use crate::utils::{NoticeError, NoticeResult};

pub struct ResponseParser {
    fence: Regex,
}

impl ResponseParser {
    pub fn new() -> Self {
        Self {
            fence: Regex::new(r"(?s)```[A-Za-z]*[ \t]*\r?\n?(.*?)```").unwrap(),
        }
    }

    /// 原始回复 → 记录。找不到对象或解码失败都视为该文档无记录。
    pub fn parse(&self, raw: &str, source: &str) -> NoticeResult<NoticeRecord> {
        let object = self.find_object(raw).ok_or_else(|| {
            warn!("[{}] 回复中没有可解析的JSON对象", source);
            NoticeError::MalformedResponse(preview(raw))
        })?;

        let mut record = normalize(&object).ok_or_else(|| {
            NoticeError::MalformedResponse(format!("对象中没有任何已知字段: {}", preview(raw)))
        })?;

        // Source 以调用方给出的文件名为准
        record.set(NoticeField::Source, source);
        debug!("[{}] 解析出 {} 个问题", source, record.issues().len());
        Ok(record)
    }

    /// 先找代码块中的对象，再扫描整段回复
    fn find_object(&self, raw: &str) -> Option<Map<String, Value>> {
        self.fence
            .captures_iter(raw)
            .filter_map(|cap| cap.get(1))
            .find_map(|body| first_object(body.as_str()))
            .or_else(|| first_object(raw))
    }
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self::new()
    }
}

/// 第一个括号配平且能解码为对象的顶层片段
fn first_object(text: &str) -> Option<Map<String, Value>> {
    let mut offset = 0;
    while let Some(pos) = text[offset..].find('{') {
        let start = offset + pos;
        match balanced_object(&text[start..]) {
            Some((len, candidate)) => {
                if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&candidate) {
                    return Some(map);
                }
                // 解码失败的片段整体跳过，不回退到其内部的嵌套对象
                offset = start + len;
            }
            // 未闭合的 `{`，从下一个字符继续找
            None => offset = start + 1,
        }
    }
    None
}

/// 从 `{` 开始到与之配对的 `}`：返回字节长度和可解码的片段。
/// 字符串中的括号不计数，字符串中的原始控制字符（如换行）转义为 JSON 转义序列。
fn balanced_object(text: &str) -> Option<(usize, String)> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut candidate = String::with_capacity(text.len());

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                '\n' => {
                    candidate.push_str("\\n");
                    continue;
                }
                '\r' => {
                    candidate.push_str("\\r");
                    continue;
                }
                '\t' => {
                    candidate.push_str("\\t");
                    continue;
                }
                c if (c as u32) < 0x20 => {
                    candidate.push_str(&format!("\\u{:04x}", c as u32));
                    continue;
                }
                _ => {}
            }
            candidate.push(c);
            continue;
        }
        candidate.push(c);
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some((i + 1, candidate));
                }
            }
            _ => {}
        }
    }
    None
}

/// 把任意对象映射到完整字段集合；没有任何已知字段时返回 None
fn normalize(object: &Map<String, Value>) -> Option<NoticeRecord> {
    let mut record = NoticeRecord::new();
    let mut matched = 0;

    for field in NoticeField::ALL {
        let value = object.get(field.key()).or_else(|| {
            object
                .iter()
                .find(|(k, _)| NoticeField::from_key(k) == Some(field))
                .map(|(_, v)| v)
        });
        if let Some(value) = value {
            matched += 1;
            let text = value_text(value);
            let text = if field == NoticeField::IssuesAndTaxAmounts {
                issue_lines(&text)
            } else {
                text
            };
            record.set(field, text);
        }
    }

    (matched > 0).then_some(record)
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(items) => items
            .iter()
            .map(value_text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Object(_) => value.to_string(),
    }
}

/// 每个问题一行，去掉空行
fn issue_lines(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn preview(raw: &str) -> String {
    let cut = raw.char_indices().nth(120).map(|(i, _)| i).unwrap_or(raw.len());
    raw[..cut].to_string()
}
