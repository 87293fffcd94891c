//! 导出边界：把结果表写成可下载的 xlsx，或 JSON。

pub mod xlsx;

use crate::notice::ResultTable;
use crate::utils::NoticeResult;

pub const DEFAULT_FILE_NAME: &str = "Litigation_Tracker_Output.xlsx";
pub const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const JSON_MIME: &str = "application/json";

/// 可交给用户下载的文件
#[derive(Debug, Clone)]
pub struct Artifact {
    pub file_name: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

pub fn to_xlsx(table: &ResultTable, file_name: &str, sheet_name: &str) -> NoticeResult<Artifact> {
    Ok(Artifact {
        file_name: file_name.to_string(),
        content_type: XLSX_MIME,
        bytes: xlsx::write_workbook(table, sheet_name)?,
    })
}

pub fn to_json(table: &ResultTable, file_name: &str) -> NoticeResult<Artifact> {
    Ok(Artifact {
        file_name: file_name.to_string(),
        content_type: JSON_MIME,
        bytes: serde_json::to_vec_pretty(table)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notice::{NoticeField, NoticeRecord};

    #[test]
    fn xlsx_artifact_carries_spreadsheet_mime() {
        let artifact = to_xlsx(&ResultTable::default(), DEFAULT_FILE_NAME, "Sheet1").unwrap();
        assert_eq!(artifact.file_name, "Litigation_Tracker_Output.xlsx");
        assert_eq!(
            artifact.content_type,
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
        );
        // zip 本地文件头
        assert_eq!(&artifact.bytes[..2], b"PK");
    }

    #[test]
    fn json_artifact_lists_rows() {
        let mut record = NoticeRecord::new();
        record.set(NoticeField::Source, "a.pdf");
        let table: ResultTable = vec![record].into_iter().collect();

        let artifact = to_json(&table, "out.json").unwrap();
        let value: serde_json::Value = serde_json::from_slice(&artifact.bytes).unwrap();
        assert_eq!(value[0]["Source"], "a.pdf");
    }
}
