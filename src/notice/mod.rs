//! 通知书记录的固定字段集合，以及请求、解析、汇总三个环节。

pub mod requester;
pub mod response;
pub mod table;

pub use requester::FieldRequester;
pub use response::ResponseParser;
pub use table::ResultTable;

use serde::ser::{Serialize, SerializeMap, Serializer};

/// 记录中的固定字段，声明顺序即导出列顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoticeField {
    EntityName,
    Gstin,
    NoticeOrderType,
    Description,
    IssuesAndTaxAmounts,
    RefId,
    DateOfIssuance,
    DueDate,
    CaseId,
    NoticeType,
    FinancialYear,
    TotalDemandAmount,
    DinNo,
    OfficerName,
    Designation,
    AreaDivision,
    TaxAmount,
    Interest,
    Penalty,
    Source,
}

pub const FIELD_COUNT: usize = 20;

impl NoticeField {
    pub const ALL: [NoticeField; FIELD_COUNT] = [
        NoticeField::EntityName,
        NoticeField::Gstin,
        NoticeField::NoticeOrderType,
        NoticeField::Description,
        NoticeField::IssuesAndTaxAmounts,
        NoticeField::RefId,
        NoticeField::DateOfIssuance,
        NoticeField::DueDate,
        NoticeField::CaseId,
        NoticeField::NoticeType,
        NoticeField::FinancialYear,
        NoticeField::TotalDemandAmount,
        NoticeField::DinNo,
        NoticeField::OfficerName,
        NoticeField::Designation,
        NoticeField::AreaDivision,
        NoticeField::TaxAmount,
        NoticeField::Interest,
        NoticeField::Penalty,
        NoticeField::Source,
    ];

    /// JSON 键名，同时也是表头
    pub fn key(self) -> &'static str {
        match self {
            NoticeField::EntityName => "Entity Name",
            NoticeField::Gstin => "GSTIN",
            NoticeField::NoticeOrderType => "Type of Notice / Order (System Update)",
            NoticeField::Description => "Description",
            NoticeField::IssuesAndTaxAmounts => "Issues & Tax Amounts",
            NoticeField::RefId => "Ref ID",
            NoticeField::DateOfIssuance => "Date Of Issuance",
            NoticeField::DueDate => "Due Date",
            NoticeField::CaseId => "Case ID",
            NoticeField::NoticeType => "Notice Type (ASMT-10 or ADT-01 / SCN / Appeal)",
            NoticeField::FinancialYear => "Financial Year",
            NoticeField::TotalDemandAmount => "Total Demand Amount as per Notice",
            NoticeField::DinNo => "DIN No",
            NoticeField::OfficerName => "Officer Name",
            NoticeField::Designation => "Designation",
            NoticeField::AreaDivision => "Area Division",
            NoticeField::TaxAmount => "Tax Amount",
            NoticeField::Interest => "Interest",
            NoticeField::Penalty => "Penalty",
            NoticeField::Source => "Source",
        }
    }

    /// 模型可能返回的其他写法
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            NoticeField::NoticeOrderType => &["Notice/Order Type", "Type of Notice / Order"],
            NoticeField::IssuesAndTaxAmounts => &["Issues and Tax Amounts", "Issues"],
            NoticeField::NoticeType => &["Notice Type"],
            NoticeField::TotalDemandAmount => &["Total Demand Amount"],
            NoticeField::DinNo => &["DIN", "DIN Number"],
            NoticeField::DateOfIssuance => &["Date of Issue", "Issue Date"],
            _ => &[],
        }
    }

    fn index(self) -> usize {
        self as usize
    }

    /// 按键名或别名查找字段，忽略大小写与首尾空白
    pub fn from_key(key: &str) -> Option<NoticeField> {
        let key = key.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|f| f.key() == key || f.aliases().iter().any(|a| *a == key))
            .or_else(|| {
                Self::ALL.iter().copied().find(|f| {
                    f.key().eq_ignore_ascii_case(key)
                        || f.aliases().iter().any(|a| a.eq_ignore_ascii_case(key))
                })
            })
    }
}

/// 一份通知书的提取结果；每个字段都存在，未知时为空串
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoticeRecord {
    values: [String; FIELD_COUNT],
}

impl NoticeRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: NoticeField) -> &str {
        &self.values[field.index()]
    }

    pub fn set(&mut self, field: NoticeField, value: impl Into<String>) {
        self.values[field.index()] = value.into();
    }

    pub fn source(&self) -> &str {
        self.get(NoticeField::Source)
    }

    /// 按列顺序遍历 (字段, 值)
    pub fn iter(&self) -> impl Iterator<Item = (NoticeField, &str)> + '_ {
        NoticeField::ALL
            .iter()
            .map(move |f| (*f, self.values[f.index()].as_str()))
    }

    /// 每行一个问题
    pub fn issues(&self) -> Vec<&str> {
        self.get(NoticeField::IssuesAndTaxAmounts)
            .lines()
            .filter(|l| !l.trim().is_empty())
            .collect()
    }
}

impl Serialize for NoticeRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(FIELD_COUNT))?;
        for (field, value) in self.iter() {
            map.serialize_entry(field.key(), value)?;
        }
        map.end()
    }
}
