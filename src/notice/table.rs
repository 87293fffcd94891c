use serde::Serialize;

use super::{NoticeField, NoticeRecord, FIELD_COUNT};

/// 一次运行的全部记录，列顺序固定为字段声明顺序
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ResultTable {
    rows: Vec<NoticeRecord>,
}

impl ResultTable {
    /// 只保留成功的记录，保持处理顺序
    pub fn from_outcomes<I>(outcomes: I) -> Self
    where
        I: IntoIterator<Item = Option<NoticeRecord>>,
    {
        Self {
            rows: outcomes.into_iter().flatten().collect(),
        }
    }

    pub fn columns() -> [&'static str; FIELD_COUNT] {
        NoticeField::ALL.map(NoticeField::key)
    }

    pub fn rows(&self) -> &[NoticeRecord] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 按列顺序展开的单元格
    pub fn cells(&self) -> impl Iterator<Item = Vec<&str>> + '_ {
        self.rows
            .iter()
            .map(|row| row.iter().map(|(_, value)| value).collect())
    }
}

impl FromIterator<NoticeRecord> for ResultTable {
    fn from_iter<I: IntoIterator<Item = NoticeRecord>>(iter: I) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}
