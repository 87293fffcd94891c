//! 单个文档的处理流程：
//! Uploaded → TextExtracted → InferenceRequested → InferenceReturned →
//! ParseAttempted → RecordProduced | Dropped。没有重试回边。

use futures::stream::{self, StreamExt};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::ExtractionConfig;
use crate::inference::InferenceBackend;
use crate::notice::{FieldRequester, NoticeRecord, ResponseParser, ResultTable};
use crate::parser::{ExtractedText, TextExtractor};
use crate::utils::{NoticeError, NoticeResult};

/// 上传的文档，只在一次处理过程中存在
#[derive(Debug, Clone)]
pub struct Document {
    pub source: String,
    pub bytes: Vec<u8>,
}

impl Document {
    pub fn new(source: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            source: source.into(),
            bytes,
        }
    }

    /// 以文件名作为来源标签
    pub async fn from_path(path: &Path) -> NoticeResult<Self> {
        let bytes = tokio::fs::read(path).await?;
        let source = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self { source, bytes })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    EmptyDocument,
    Unreadable(String),
    InferenceFailure(String),
    MalformedResponse(String),
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::EmptyDocument => write!(f, "没有可提取的文本"),
            DropReason::Unreadable(e) => write!(f, "无法读取: {}", e),
            DropReason::InferenceFailure(e) => write!(f, "推理失败: {}", e),
            DropReason::MalformedResponse(e) => write!(f, "回复无法解析: {}", e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentOutcome {
    Produced(NoticeRecord),
    Dropped { source: String, reason: DropReason },
}

impl DocumentOutcome {
    pub fn into_record(self) -> Option<NoticeRecord> {
        match self {
            DocumentOutcome::Produced(record) => Some(record),
            DocumentOutcome::Dropped { .. } => None,
        }
    }
}

/// 一次运行的结果
#[derive(Debug)]
pub struct RunReport {
    pub table: ResultTable,
    pub dropped: Vec<(String, DropReason)>,
    pub attempted: usize,
}

impl RunReport {
    /// 有输入却没有任何记录时报告 NothingExtracted
    pub fn into_table(self) -> NoticeResult<ResultTable> {
        if self.attempted > 0 && self.table.is_empty() {
            return Err(NoticeError::NothingExtracted {
                attempted: self.attempted,
            });
        }
        Ok(self.table)
    }
}

pub struct Pipeline {
    extractor: Arc<dyn TextExtractor>,
    requester: FieldRequester,
    parser: ResponseParser,
    max_text_chars: usize,
    concurrency: usize,
    request_delay: Duration,
}

impl Pipeline {
    pub fn new(
        extractor: Arc<dyn TextExtractor>,
        backend: Arc<dyn InferenceBackend>,
        config: &ExtractionConfig,
    ) -> Self {
        Self {
            extractor,
            requester: FieldRequester::new(backend),
            parser: ResponseParser::new(),
            max_text_chars: config.max_text_chars,
            concurrency: config.concurrency.max(1),
            request_delay: Duration::from_millis(config.request_delay_ms),
        }
    }

    /// 处理单个文档；所有失败都在这里吸收为 Dropped
    pub async fn process(&self, document: Document) -> DocumentOutcome {
        let Document { source, bytes } = document;
        info!("处理: {}", source);

        let extractor = Arc::clone(&self.extractor);
        let raw_text = match tokio::task::spawn_blocking(move || extractor.extract(&bytes)).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => return dropped(source, DropReason::Unreadable(e.to_string())),
            Err(e) => return dropped(source, DropReason::Unreadable(e.to_string())),
        };

        let text = ExtractedText::bounded(&raw_text, self.max_text_chars);
        debug!("[{}] TextExtracted: {} 字符", source, text.char_count());
        if text.is_empty() {
            return dropped(source, DropReason::EmptyDocument);
        }
        if text.is_truncated() {
            debug!(
                "[{}] 文本超过 {} 字符，已截断，截断处之后的字段不会被提取",
                source, self.max_text_chars
            );
        }

        debug!("[{}] InferenceRequested", source);
        let response = self.requester.request(&text, &source).await;
        if !self.request_delay.is_zero() {
            tokio::time::sleep(self.request_delay).await;
        }
        let raw = match response {
            Ok(raw) => raw,
            Err(e) => return dropped(source, DropReason::InferenceFailure(e.to_string())),
        };

        debug!("[{}] InferenceReturned: {} 字符", source, raw.chars().count());
        match self.parser.parse(&raw, &source) {
            Ok(record) => {
                info!("[{}] ✅ 提取成功，{} 个问题", source, record.issues().len());
                DocumentOutcome::Produced(record)
            }
            Err(e) => dropped(source, DropReason::MalformedResponse(e.to_string())),
        }
    }

    /// 按上传顺序处理全部文档；并发时结果仍按输入顺序汇总
    pub async fn run(&self, documents: Vec<Document>) -> RunReport {
        let attempted = documents.len();
        info!("开始提取 {} 个文档 (并发 {})", attempted, self.concurrency);

        let outcomes: Vec<DocumentOutcome> = stream::iter(documents)
            .map(|doc| self.process(doc))
            .buffered(self.concurrency)
            .collect()
            .await;

        let dropped: Vec<(String, DropReason)> = outcomes
            .iter()
            .filter_map(|outcome| match outcome {
                DocumentOutcome::Dropped { source, reason } => Some((source.clone(), reason.clone())),
                DocumentOutcome::Produced(_) => None,
            })
            .collect();
        let table = ResultTable::from_outcomes(outcomes.into_iter().map(DocumentOutcome::into_record));

        info!(
            "✅ 提取完成: {} 成功, {} 跳过",
            table.len(),
            dropped.len()
        );
        RunReport {
            table,
            dropped,
            attempted,
        }
    }
}

fn dropped(source: String, reason: DropReason) -> DocumentOutcome {
    warn!("[{}] 已跳过: {}", source, reason);
    DocumentOutcome::Dropped { source, reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notice::NoticeField;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// 把字节直接当作文本层
    struct PlainText;

    impl TextExtractor for PlainText {
        fn extract(&self, bytes: &[u8]) -> NoticeResult<String> {
            Ok(String::from_utf8_lossy(bytes).to_string())
        }
    }

    type Responder = Box<dyn Fn(&str) -> NoticeResult<String> + Send + Sync>;

    struct FakeBackend {
        calls: Mutex<Vec<String>>,
        respond: Responder,
    }

    impl FakeBackend {
        fn new(respond: impl Fn(&str) -> NoticeResult<String> + Send + Sync + 'static) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                respond: Box::new(respond),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl InferenceBackend for FakeBackend {
        async fn generate(&self, prompt: &str) -> NoticeResult<String> {
            self.calls.lock().unwrap().push(prompt.to_string());
            if prompt.contains("SLOW") {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            (self.respond)(prompt)
        }
    }

    fn pipeline(backend: Arc<FakeBackend>, config: ExtractionConfig) -> Pipeline {
        Pipeline::new(Arc::new(PlainText), backend, &config)
    }

    fn echo_gstin(prompt: &str) -> NoticeResult<String> {
        let gstin = prompt
            .lines()
            .find_map(|l| l.strip_prefix("GSTIN: "))
            .unwrap_or("");
        Ok(format!("```json\n{{\"GSTIN\": \"{}\"}}\n```", gstin))
    }

    #[tokio::test]
    async fn empty_document_never_reaches_inference() {
        let backend = FakeBackend::new(echo_gstin);
        let pipeline = pipeline(backend.clone(), ExtractionConfig::default());

        let outcome = pipeline.process(Document::new("scan.pdf", b"   \n ".to_vec())).await;
        assert_eq!(
            outcome,
            DocumentOutcome::Dropped {
                source: "scan.pdf".into(),
                reason: DropReason::EmptyDocument
            }
        );
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn two_issues_become_two_ordered_lines() {
        let backend = FakeBackend::new(|_| {
            Ok(r#"Here you go:
{
  "Entity Name": "Acme Traders",
  "Issues & Tax Amounts": "Issue 1 – Excess ITC claimed in GSTR-3B – ₹1,20,000\nIssue 2 – Short payment on outward supplies – ₹45,500",
  "Tax Amount": "₹1,65,500",
  "Interest": "₹12,000",
  "Source": "ignored.pdf"
}"#
            .to_string())
        });
        let pipeline = pipeline(backend, ExtractionConfig::default());

        let text = b"SHOW CAUSE NOTICE\nIssue 1: excess ITC\nIssue 2: short payment".to_vec();
        let record = pipeline
            .process(Document::new("SCN-2024.pdf", text))
            .await
            .into_record()
            .expect("record");

        let issues = record.issues();
        assert_eq!(issues.len(), 2);
        assert!(issues[0].starts_with("Issue 1"));
        assert!(issues[1].starts_with("Issue 2"));
        assert!(issues.iter().all(|l| l.matches('₹').count() <= 1));
        assert_eq!(record.source(), "SCN-2024.pdf");
        assert_eq!(record.get(NoticeField::Penalty), "");
    }

    #[tokio::test]
    async fn blank_upload_is_skipped_and_order_kept() {
        let backend = FakeBackend::new(echo_gstin);
        let pipeline = pipeline(backend.clone(), ExtractionConfig::default());

        let report = pipeline
            .run(vec![
                Document::new("first.pdf", b"GSTIN: 11AAAAA1111A1Z1".to_vec()),
                Document::new("blank.pdf", Vec::new()),
                Document::new("third.pdf", b"GSTIN: 33CCCCC3333C3Z3".to_vec()),
            ])
            .await;

        assert_eq!(report.attempted, 3);
        assert_eq!(report.dropped, vec![("blank.pdf".to_string(), DropReason::EmptyDocument)]);
        assert_eq!(backend.call_count(), 2);

        let table = report.into_table().unwrap();
        let rows: Vec<(&str, &str)> = table
            .rows()
            .iter()
            .map(|r| (r.source(), r.get(NoticeField::Gstin)))
            .collect();
        assert_eq!(
            rows,
            vec![("first.pdf", "11AAAAA1111A1Z1"), ("third.pdf", "33CCCCC3333C3Z3")]
        );
    }

    #[tokio::test]
    async fn all_parse_failures_report_nothing_extracted() {
        let backend = FakeBackend::new(|_| Ok("Sorry, I cannot help with that.".to_string()));
        let pipeline = pipeline(backend, ExtractionConfig::default());

        let report = pipeline
            .run(vec![
                Document::new("a.pdf", b"text a".to_vec()),
                Document::new("b.pdf", b"text b".to_vec()),
            ])
            .await;

        assert!(report.table.is_empty());
        assert!(report
            .dropped
            .iter()
            .all(|(_, r)| matches!(r, DropReason::MalformedResponse(_))));
        assert!(matches!(
            report.into_table(),
            Err(NoticeError::NothingExtracted { attempted: 2 })
        ));
    }

    #[tokio::test]
    async fn empty_run_is_not_an_error() {
        let backend = FakeBackend::new(echo_gstin);
        let report = pipeline(backend, ExtractionConfig::default()).run(Vec::new()).await;
        assert!(report.into_table().unwrap().is_empty());
    }

    #[tokio::test]
    async fn inference_failure_drops_only_that_document() {
        let backend = FakeBackend::new(|prompt| {
            if prompt.contains("GSTIN: BAD") {
                Err(NoticeError::Api {
                    status: 500,
                    body: "internal".into(),
                })
            } else {
                echo_gstin(prompt)
            }
        });
        let pipeline = pipeline(backend, ExtractionConfig::default());

        let report = pipeline
            .run(vec![
                Document::new("bad.pdf", b"GSTIN: BAD".to_vec()),
                Document::new("good.pdf", b"GSTIN: 27AAAPL1234C1ZV".to_vec()),
            ])
            .await;

        assert_eq!(report.table.len(), 1);
        assert_eq!(report.table.rows()[0].source(), "good.pdf");
        assert!(matches!(report.dropped[0].1, DropReason::InferenceFailure(_)));
    }

    #[tokio::test]
    async fn concurrent_run_keeps_upload_order() {
        let backend = FakeBackend::new(echo_gstin);
        let config = ExtractionConfig {
            concurrency: 3,
            ..ExtractionConfig::default()
        };
        let pipeline = pipeline(backend, config);

        let report = pipeline
            .run(vec![
                Document::new("1.pdf", b"SLOW\nGSTIN: ONE".to_vec()),
                Document::new("2.pdf", b"GSTIN: TWO".to_vec()),
                Document::new("3.pdf", b"GSTIN: THREE".to_vec()),
            ])
            .await;

        let sources: Vec<&str> = report.table.rows().iter().map(|r| r.source()).collect();
        assert_eq!(sources, vec!["1.pdf", "2.pdf", "3.pdf"]);
    }

    #[tokio::test]
    async fn text_is_truncated_before_prompting() {
        let backend = FakeBackend::new(echo_gstin);
        let config = ExtractionConfig {
            max_text_chars: 100,
            ..ExtractionConfig::default()
        };
        let pipeline = pipeline(backend.clone(), config);

        let mut text = "x".repeat(150);
        text.push_str("TAIL-MARKER");
        pipeline.process(Document::new("long.pdf", text.into_bytes())).await;

        let calls = backend.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert!(!calls[0].contains("TAIL-MARKER"));
        assert!(calls[0].contains(&"x".repeat(100)));
        assert!(!calls[0].contains(&"x".repeat(101)));
    }

    #[tokio::test]
    async fn unreadable_document_is_dropped() {
        struct Broken;
        impl TextExtractor for Broken {
            fn extract(&self, _bytes: &[u8]) -> NoticeResult<String> {
                Err(NoticeError::Pdf("bad xref".into()))
            }
        }

        let backend = FakeBackend::new(echo_gstin);
        let pipeline = Pipeline::new(Arc::new(Broken), backend.clone(), &ExtractionConfig::default());
        let outcome = pipeline.process(Document::new("x.pdf", vec![1, 2, 3])).await;

        assert!(matches!(
            outcome,
            DocumentOutcome::Dropped { reason: DropReason::Unreadable(_), .. }
        ));
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn from_path_uses_file_name_as_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("DRC-01 April.pdf");
        std::fs::write(&path, b"%PDF").unwrap();

        let document = Document::from_path(&path).await.unwrap();
        assert_eq!(document.source, "DRC-01 April.pdf");
        assert_eq!(document.bytes, b"%PDF");
    }
}
