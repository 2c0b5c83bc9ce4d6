//! Named bulk transitions and their payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DomainError, DomainResult};
use crate::item::normalize_category;

/// A state transition a bulk job applies to every target item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "operation")]
pub enum BulkOperation {
    Activate,
    Deactivate,
    /// Soft delete.
    Delete,
    /// `category` is stored already normalized.
    UpdateCategory { category: String },
}

impl BulkOperation {
    /// Build an operation from its wire name and JSON payload.
    ///
    /// `payload` may be `null` for operations that take no parameters; any
    /// other payload for those operations is ignored.
    pub fn parse(name: &str, payload: &Value) -> DomainResult<Self> {
        match name.trim() {
            "activate" => Ok(Self::Activate),
            "deactivate" => Ok(Self::Deactivate),
            "delete" => Ok(Self::Delete),
            "update_category" => {
                let category = payload
                    .get("category")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        DomainError::validation("update_category requires payload.category")
                    })?;
                Ok(Self::UpdateCategory {
                    category: normalize_category(category)?,
                })
            }
            other => Err(DomainError::validation(format!(
                "unknown operation '{other}' \
                 (expected activate, deactivate, delete or update_category)"
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Activate => "activate",
            Self::Deactivate => "deactivate",
            Self::Delete => "delete",
            Self::UpdateCategory { .. } => "update_category",
        }
    }
}

impl core::fmt::Display for BulkOperation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_known_operations() {
        assert_eq!(
            BulkOperation::parse("activate", &Value::Null).unwrap(),
            BulkOperation::Activate
        );
        assert_eq!(
            BulkOperation::parse("delete", &json!({})).unwrap(),
            BulkOperation::Delete
        );
        assert_eq!(
            BulkOperation::parse("update_category", &json!({"category": "garden tools"})).unwrap(),
            BulkOperation::UpdateCategory {
                category: "Garden Tools".to_string()
            }
        );
    }

    #[test]
    fn rejects_unknown_operation_and_bad_payload() {
        assert!(matches!(
            BulkOperation::parse("archive", &Value::Null),
            Err(DomainError::Validation(_))
        ));
        assert!(BulkOperation::parse("update_category", &Value::Null).is_err());
        assert!(BulkOperation::parse("update_category", &json!({"category": 7})).is_err());
        assert!(BulkOperation::parse("update_category", &json!({"category": "  "})).is_err());
    }
}
