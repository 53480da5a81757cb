//! 表格数据
//!
//! 数据集以 JSON 对象数组的形式保存：每个对象是一行，键是列名

use serde_json::{Map, Value as JsonValue};

use crate::error::{AppResult, SetupError};
use crate::models::audit_type::AuditType;

pub type Row = Map<String, JsonValue>;

/// 一张待巡检的表
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditTable {
    /// 列名（按首次出现的顺序）
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl AuditTable {
    pub fn from_rows(rows: Vec<Row>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for row in &rows {
            for key in row.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }
        Self { columns, rows }
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// 检查必需列，缺失即为准备错误
    pub fn require_columns(&self, audit_type: AuditType) -> AppResult<()> {
        for column in audit_type.required_columns() {
            if !self.has_column(column) {
                return Err(SetupError::MissingColumn {
                    column: column.to_string(),
                }
                .into());
            }
        }
        Ok(())
    }

    /// 数据清洗：去掉必需字段为空的行
    ///
    /// push 只在标题和摘要同时为空时才丢弃
    pub fn clean(&mut self, audit_type: AuditType) {
        let required = audit_type.required_columns();
        self.rows.retain(|row| {
            let present = required
                .iter()
                .filter(|c| cell_text(row, c).is_some())
                .count();
            match audit_type {
                AuditType::Push => present > 0,
                _ => present == required.len(),
            }
        });
    }

    /// 初始化结果列
    pub fn init_result_columns(&mut self, audit_type: AuditType) {
        let columns = result_columns(audit_type);
        for column in columns {
            if !self.has_column(column) {
                self.columns.push(column.to_string());
            }
        }
        for row in &mut self.rows {
            for column in columns {
                row.insert(column.to_string(), JsonValue::String(String::new()));
            }
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// 审核结果列：结论、标签、时间
pub fn result_columns(audit_type: AuditType) -> [&'static str; 3] {
    ["审核结果", audit_type.tag_column(), "审核时间"]
}

/// 读取单元格文本；空串、null 视为缺失
pub fn cell_text(row: &Row, column: &str) -> Option<String> {
    let text = match row.get(column)? {
        JsonValue::Null => return None,
        JsonValue::String(s) => s.trim().to_string(),
        other => other.to_string(),
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows(value: JsonValue) -> Vec<Row> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_missing_column_is_setup_error() {
        let table = AuditTable::from_rows(rows(json!([{ "内容": "你好" }])));
        let err = table.require_columns(AuditType::Comment).unwrap_err();
        assert!(err.to_string().contains("评论内容"));
    }

    #[test]
    fn test_clean_drops_blank_rows() {
        let mut table = AuditTable::from_rows(rows(json!([
            { "评论内容": "好" },
            { "评论内容": "   " },
            { "评论内容": null },
            { "评论内容": 42 }
        ])));
        table.clean(AuditType::Comment);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_push_keeps_rows_with_either_field() {
        let mut table = AuditTable::from_rows(rows(json!([
            { "标题": "标题A", "摘要": "" },
            { "标题": "", "摘要": "" },
            { "标题": null, "摘要": "摘要C" }
        ])));
        table.clean(AuditType::Push);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_init_result_columns() {
        let mut table = AuditTable::from_rows(rows(json!([{ "标题": "a", "摘要": "b" }])));
        table.init_result_columns(AuditType::Push);
        assert!(table.has_column("低质标签"));
        assert_eq!(table.rows[0]["审核结果"], json!(""));
    }
}
