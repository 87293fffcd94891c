use lopdf::Document;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::TextExtractor;
use crate::utils::{NoticeError, NoticeResult};

/// 基于 lopdf 的文本层提取，逐页失败时退回 pdf-extract
pub struct PdfParser {
    temp_dir: Option<PathBuf>,
}

impl PdfParser {
    pub fn new() -> Self {
        Self { temp_dir: None }
    }

    /// 指定临时文件目录（默认使用系统临时目录）
    #[cfg(test)]
    pub fn with_temp_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            temp_dir: Some(dir.into()),
        }
    }

    /// 按页顺序提取完整文本
    pub fn extract_full_text(&self, pdf_path: &Path) -> NoticeResult<String> {
        debug!("提取PDF完整文本: {}", pdf_path.display());

        let doc = Document::load(pdf_path)
            .map_err(|e| NoticeError::Pdf(format!("无法解析PDF: {}", e)))?;

        match Self::extract_pages(&doc) {
            Ok(text) => Ok(text),
            Err(e) => {
                warn!("lopdf 逐页提取失败 ({}), 改用 pdf-extract", e);
                pdf_extract::extract_text(pdf_path)
                    .map_err(|e| NoticeError::Pdf(format!("pdf-extract 提取失败: {}", e)))
            }
        }
    }

    fn extract_pages(doc: &Document) -> Result<String, lopdf::Error> {
        // get_pages 按页码有序
        let pages = doc.get_pages();
        let mut page_texts = Vec::with_capacity(pages.len());
        for page_num in pages.keys() {
            let text = doc.extract_text(&[*page_num])?;
            page_texts.push(text.trim().to_string());
        }
        Ok(page_texts.join("\n"))
    }

    fn spool(&self, bytes: &[u8]) -> NoticeResult<tempfile::NamedTempFile> {
        let builder = {
            let mut b = tempfile::Builder::new();
            b.prefix("notice-").suffix(".pdf");
            b
        };
        let mut file = match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        file.write_all(bytes)?;
        file.flush()?;
        Ok(file)
    }
}

impl Default for PdfParser {
    fn default() -> Self {
        Self::new()
    }
}

impl TextExtractor for PdfParser {
    fn extract(&self, bytes: &[u8]) -> NoticeResult<String> {
        // 临时文件在离开作用域时删除，无论成功与否
        let spooled = self.spool(bytes)?;
        let text = self.extract_full_text(spooled.path())?;
        let text = text.trim().to_string();

        if text.is_empty() {
            warn!("PDF中未提取到文本内容");
        } else {
            info!("提取文本长度: {} 字符", text.chars().count());
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Object, Stream};
    use tempfile::tempdir;

    /// 生成每页一段文字的 PDF；空字符串表示空白页
    fn build_pdf(pages: &[&str]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids = Vec::new();
        for text in pages {
            let operations = if text.is_empty() {
                Vec::new()
            } else {
                vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![72.into(), 720.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ]
            };
            let content = Content { operations };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn extracts_pages_in_order() {
        let bytes = build_pdf(&["GSTIN 27AAAPL1234C1ZV", "Due Date 15-01-2025"]);
        let text = PdfParser::new().extract(&bytes).unwrap();

        let first = text.find("27AAAPL1234C1ZV").expect("first page text");
        let second = text.find("15-01-2025").expect("second page text");
        assert!(first < second);
    }

    #[test]
    fn image_only_document_yields_empty_text() {
        let bytes = build_pdf(&[""]);
        let text = PdfParser::new().extract(&bytes).unwrap();
        assert!(text.is_empty());
    }

    #[test]
    fn garbage_bytes_are_a_pdf_error() {
        let result = PdfParser::new().extract(b"definitely not a pdf");
        assert!(matches!(result, Err(NoticeError::Pdf(_))));
    }

    #[test]
    fn temp_file_is_removed_on_success_and_failure() {
        let dir = tempdir().unwrap();
        let parser = PdfParser::with_temp_dir(dir.path());

        parser.extract(&build_pdf(&["Show Cause Notice"])).unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

        assert!(parser.extract(b"not a pdf at all").is_err());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
