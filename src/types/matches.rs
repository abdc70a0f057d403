//! Route match expressions and their wire ("internal DSL") form.

use serde::{Deserialize, Serialize};

/// What part of the request an expression inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MatchField {
    Url,
    Host,
    Method,
    Param,
    Header,
    Cookie,
    SrcIp,
}

impl MatchField {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchField::Url => "URL",
            MatchField::Host => "HOST",
            MatchField::Method => "METHOD",
            MatchField::Param => "PARAM",
            MatchField::Header => "HEADER",
            MatchField::Cookie => "COOKIE",
            MatchField::SrcIp => "SRC_IP",
        }
    }

    /// Param/header/cookie expressions carry a key naming which entry.
    pub fn is_keyed(&self) -> bool {
        matches!(self, MatchField::Param | MatchField::Header | MatchField::Cookie)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MatchOp {
    Eq,
    StartsWith,
    Regex,
    In,
    Exist,
}

impl MatchOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchOp::Eq => "EQ",
            MatchOp::StartsWith => "STARTS_WITH",
            MatchOp::Regex => "REGEX",
            MatchOp::In => "IN",
            MatchOp::Exist => "EXIST",
        }
    }

    /// More specific operators rank a route above less specific ones when
    /// user priorities tie.
    fn weight(&self) -> i64 {
        match self {
            MatchOp::Eq => 100,
            MatchOp::In => 80,
            MatchOp::StartsWith => 60,
            MatchOp::Regex => 40,
            MatchOp::Exist => 20,
        }
    }
}

/// One conjunct of a route's match condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchExpr {
    pub field: MatchField,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub op: MatchOp,
    #[serde(default)]
    pub values: Vec<String>,
}

impl MatchExpr {
    pub fn new(field: MatchField, op: MatchOp, values: Vec<String>) -> Self {
        Self { field, key: None, op, values }
    }

    fn to_internal(&self) -> serde_json::Value {
        let mut parts = vec![
            serde_json::Value::String(self.op.as_str().to_string()),
            serde_json::Value::String(self.field.as_str().to_string()),
        ];
        if let Some(key) = &self.key {
            parts.push(serde_json::Value::String(key.clone()));
        }
        parts.extend(self.values.iter().map(|v| serde_json::Value::String(v.clone())));
        serde_json::Value::Array(parts)
    }
}

/// A route's full match condition: the conjunction of its expressions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dslx(pub Vec<MatchExpr>);

impl Dslx {
    /// Match condition for synthetic default rules: everything.
    pub fn match_all() -> Self {
        Dslx(vec![MatchExpr::new(
            MatchField::Url,
            MatchOp::StartsWith,
            vec!["/".to_string()],
        )])
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Structural specificity used to order routes with equal user priority.
    pub fn complexity(&self) -> i64 {
        self.0.iter().map(|e| e.op.weight()).sum()
    }

    /// The nested-array form the data plane evaluates.
    ///
    /// A single expression serializes as one flat array; multiple
    /// expressions are wrapped under an `AND` head.
    pub fn to_internal(&self) -> serde_json::Value {
        match self.0.as_slice() {
            [] => Dslx::match_all().to_internal(),
            [single] => single.to_internal(),
            many => {
                let mut parts = vec![serde_json::Value::String("AND".to_string())];
                parts.extend(many.iter().map(MatchExpr::to_internal));
                serde_json::Value::Array(parts)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_expr_internal_form() {
        let dsl = Dslx(vec![MatchExpr::new(
            MatchField::Url,
            MatchOp::StartsWith,
            vec!["/app".to_string()],
        )]);
        assert_eq!(
            dsl.to_internal(),
            serde_json::json!(["STARTS_WITH", "URL", "/app"])
        );
    }

    #[test]
    fn test_conjunction_internal_form() {
        let mut header = MatchExpr::new(MatchField::Header, MatchOp::Eq, vec!["v1".to_string()]);
        header.key = Some("x-version".to_string());
        let dsl = Dslx(vec![
            MatchExpr::new(MatchField::Host, MatchOp::Eq, vec!["a.example.com".to_string()]),
            header,
        ]);
        assert_eq!(
            dsl.to_internal(),
            serde_json::json!([
                "AND",
                ["EQ", "HOST", "a.example.com"],
                ["EQ", "HEADER", "x-version", "v1"]
            ])
        );
    }

    #[test]
    fn test_empty_dsl_matches_all() {
        assert_eq!(Dslx::default().to_internal(), serde_json::json!(["STARTS_WITH", "URL", "/"]));
    }

    #[test]
    fn test_complexity_ranks_exact_above_prefix() {
        let exact = Dslx(vec![MatchExpr::new(MatchField::Url, MatchOp::Eq, vec!["/a".into()])]);
        let prefix =
            Dslx(vec![MatchExpr::new(MatchField::Url, MatchOp::StartsWith, vec!["/a".into()])]);
        assert!(exact.complexity() > prefix.complexity());
    }
}
