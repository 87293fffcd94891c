use std::sync::Arc;
use tracing::debug;

use super::NoticeField;
use crate::inference::InferenceBackend;
use crate::parser::ExtractedText;
use crate::utils::NoticeResult;

/// 问题金额无法按问题拆分时使用的固定标记
pub const NOT_BIFURCATED: &str = "Issue-wise amounts not bifurcated";

/// 构造提示词并发起一次推理调用
pub struct FieldRequester {
    backend: Arc<dyn InferenceBackend>,
}

impl FieldRequester {
    pub fn new(backend: Arc<dyn InferenceBackend>) -> Self {
        Self { backend }
    }

    /// 文本必须已由调用方截断，这里不再处理长度
    pub async fn request(&self, text: &ExtractedText, source: &str) -> NoticeResult<String> {
        let prompt = build_prompt(text, source);
        debug!("[{}] 提示词长度 {} 字符", source, prompt.chars().count());
        self.backend.generate(&prompt).await
    }
}

/// 相同输入总是得到相同的提示词
pub fn build_prompt(text: &ExtractedText, source: &str) -> String {
    let template = json_template(source);

    format!(
        r#"You are a GST litigation expert.

Extract details ONLY from the notice text below.
Do NOT assume, infer, or fabricate any value.
If information is not available, leave it blank ("").

Return ONLY one JSON object inside a ```json fenced block, using exactly these keys in this order:

```json
{template}
```

RULES for "{issues}":
- Extract ALL issues / discrepancies / allegations mentioned
- Each issue must be on a NEW LINE; inside the JSON string write each line break as \n
- Mention only the TAX amount for each issue (ignore interest & penalty)
- Do NOT merge issues
- Do NOT summarise
- If an amount is not available for an issue, mention the issue without an amount
- If issue-wise amounts cannot be distinguished, write exactly "{not_bifurcated}"
- Format strictly as:

Issue 1 – <issue description> – ₹amount
Issue 2 – <issue description> – ₹amount

Notice Text:
{text}
"#,
        template = template,
        issues = NoticeField::IssuesAndTaxAmounts.key(),
        not_bifurcated = NOT_BIFURCATED,
        text = text.as_str(),
    )
}

/// 所有字段为空、Source 预填的 JSON 模板
fn json_template(source: &str) -> String {
    let lines: Vec<String> = NoticeField::ALL
        .iter()
        .map(|field| {
            let value = if *field == NoticeField::Source { source } else { "" };
            format!(
                "  {}: {}",
                serde_json::Value::from(field.key()),
                serde_json::Value::from(value)
            )
        })
        .collect();
    format!("{{\n{}\n}}", lines.join(",\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct RecordingBackend {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl InferenceBackend for RecordingBackend {
        async fn generate(&self, prompt: &str) -> NoticeResult<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok("{}".to_string())
        }
    }

    fn sample_text() -> ExtractedText {
        ExtractedText::bounded("FORM GST DRC-01\nGSTIN: 27AAAPL1234C1ZV", 6000)
    }

    #[test]
    fn prompt_lists_every_field_key_in_order() {
        let prompt = build_prompt(&sample_text(), "notice.pdf");
        let mut last = 0;
        for field in NoticeField::ALL {
            let quoted = format!("\"{}\"", field.key());
            let pos = prompt[last..]
                .find(&quoted)
                .unwrap_or_else(|| panic!("missing key {}", field.key()));
            last += pos + quoted.len();
        }
    }

    #[test]
    fn prompt_states_non_fabrication_and_issue_rules() {
        let prompt = build_prompt(&sample_text(), "notice.pdf");
        assert!(prompt.contains("Do NOT assume, infer, or fabricate any value."));
        assert!(prompt.contains("leave it blank"));
        assert!(prompt.contains("Each issue must be on a NEW LINE"));
        assert!(prompt.contains(r"write each line break as \n"));
        assert!(prompt.contains("ignore interest & penalty"));
        assert!(prompt.contains("Do NOT merge issues"));
        assert!(prompt.contains(NOT_BIFURCATED));
    }

    #[test]
    fn prompt_is_deterministic_and_embeds_text_and_source() {
        let a = build_prompt(&sample_text(), "notice.pdf");
        let b = build_prompt(&sample_text(), "notice.pdf");
        assert_eq!(a, b);
        assert!(a.contains("GSTIN: 27AAAPL1234C1ZV"));
        assert!(a.contains("\"Source\": \"notice.pdf\""));
    }

    #[test]
    fn source_label_is_json_escaped() {
        let prompt = build_prompt(&sample_text(), "scn \"final\".pdf");
        assert!(prompt.contains(r#""Source": "scn \"final\".pdf""#));
    }

    #[tokio::test]
    async fn request_makes_exactly_one_call() {
        let backend = Arc::new(RecordingBackend {
            prompts: Mutex::new(Vec::new()),
        });
        let requester = FieldRequester::new(backend.clone());

        let raw = requester.request(&sample_text(), "a.pdf").await.unwrap();
        assert_eq!(raw, "{}");

        let prompts = backend.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Notice Text:\nFORM GST DRC-01"));
    }
}
