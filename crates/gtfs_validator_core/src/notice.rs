use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeSeverity {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationNotice {
    pub code: String,
    pub severity: NoticeSeverity,
    pub message: String,
    pub file: Option<String>,
    pub row: Option<u64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub field_order: Vec<String>,
}

impl ValidationNotice {
    pub fn new(
        code: impl Into<String>,
        severity: NoticeSeverity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            severity,
            message: message.into(),
            file: None,
            row: None,
            context: BTreeMap::new(),
            field_order: Vec::new(),
        }
    }

    pub fn insert_context_field<V: Serialize>(&mut self, name: impl Into<String>, value: V) {
        let key = name.into();
        let serialized = serde_json::to_value(value).unwrap_or_else(|_| Value::Null);
        if !self.field_order.iter().any(|item| item == &key) {
            self.field_order.push(key.clone());
        }
        self.context.insert(key, serialized);
    }

    pub fn with_context_field<V: Serialize>(mut self, name: impl Into<String>, value: V) -> Self {
        self.insert_context_field(name, value);
        self
    }

    pub fn with_location(mut self, file: impl Into<String>, row: u64) -> Self {
        self.file = Some(file.into());
        self.row = Some(row);
        self
    }

    pub fn context_field(&self, name: &str) -> Option<&Value> {
        self.context.get(name)
    }
}

#[derive(Debug, Default)]
pub struct NoticeContainer {
    notices: Vec<ValidationNotice>,
}

impl NoticeContainer {
    pub fn new() -> Self {
        Self {
            notices: Vec::new(),
        }
    }

    pub fn push(&mut self, notice: ValidationNotice) {
        self.notices.push(notice);
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidationNotice> {
        self.notices.iter()
    }

    pub fn len(&self) -> usize {
        self.notices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notices.is_empty()
    }

    pub fn merge(&mut self, other: NoticeContainer) {
        self.notices.extend(other.notices);
    }

    /// Number of notices per code, in code order.
    pub fn count_by_code(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for notice in &self.notices {
            *counts.entry(notice.code.as_str()).or_insert(0) += 1;
        }
        counts
    }

    pub fn into_vec(self) -> Vec<ValidationNotice> {
        self.notices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_context_insertion_order() {
        let notice = ValidationNotice::new("code", NoticeSeverity::Warning, "message")
            .with_context_field("tripId", "t1")
            .with_context_field("shapeId", "s1")
            .with_context_field("tripId", "t2");

        assert_eq!(notice.field_order, vec!["tripId", "shapeId"]);
        assert_eq!(notice.context_field("tripId"), Some(&Value::from("t2")));
    }

    #[test]
    fn counts_notices_by_code() {
        let mut notices = NoticeContainer::new();
        notices.push(ValidationNotice::new("b", NoticeSeverity::Warning, ""));
        notices.push(ValidationNotice::new("a", NoticeSeverity::Warning, ""));
        let mut other = NoticeContainer::new();
        other.push(ValidationNotice::new("b", NoticeSeverity::Warning, ""));
        notices.merge(other);

        let counts = notices.count_by_code();
        assert_eq!(counts.get("a"), Some(&1));
        assert_eq!(counts.get("b"), Some(&2));
        assert_eq!(notices.len(), 3);
    }

    #[test]
    fn serializes_severity_lowercase() {
        let notice = ValidationNotice::new("code", NoticeSeverity::Warning, "message");
        let json = serde_json::to_value(&notice).unwrap();
        assert_eq!(json["severity"], "warning");
        assert!(json.get("context").is_none());
    }
}
