use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

pub type Attributes = BTreeMap<String, AttrValue>;

/// One request turned into a trace span. `end_ts` is the log timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Span {
    pub trace_id: String,
    pub span_id: u64,
    pub name: String,
    pub start_ts: DateTime<Utc>,
    pub end_ts: DateTime<Utc>,
    pub attributes: Attributes,
}

impl Span {
    pub fn attr(&self, key: &str) -> Option<&AttrValue> {
        self.attributes.get(key)
    }

    pub fn service_name(&self) -> &str {
        self.attr("service.name")
            .and_then(AttrValue::as_str)
            .unwrap_or_default()
    }

    pub fn status_code(&self) -> Option<i64> {
        match self.attr("http.status_code") {
            Some(AttrValue::Int(code)) => Some(*code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn exposes_well_known_attributes() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut attributes = Attributes::new();
        attributes.insert("service.name".into(), "api".into());
        attributes.insert("http.status_code".into(), 503i64.into());
        let span = Span {
            trace_id: "abc".into(),
            span_id: 1,
            name: "GET /".into(),
            start_ts: start,
            end_ts: start,
            attributes,
        };

        assert_eq!(span.service_name(), "api");
        assert_eq!(span.status_code(), Some(503));
    }

    #[test]
    fn attr_values_serialize_untagged() {
        let json = serde_json::to_string(&vec![
            AttrValue::from("x"),
            AttrValue::from(3i64),
            AttrValue::from(1.5f64),
            AttrValue::from(true),
        ])
        .unwrap();
        assert_eq!(json, r#"["x",3,1.5,true]"#);
    }
}
