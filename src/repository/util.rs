//! Repository utilities.

use diesel::result::DatabaseErrorInformation;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Simple error info wrapper for database errors.
#[derive(Debug)]
pub struct DbErrorInfo(pub String);

impl DatabaseErrorInformation for DbErrorInfo {
    fn message(&self) -> &str {
        &self.0
    }
    fn details(&self) -> Option<&str> {
        None
    }
    fn hint(&self) -> Option<&str> {
        None
    }
    fn table_name(&self) -> Option<&str> {
        None
    }
    fn column_name(&self) -> Option<&str> {
        None
    }
    fn constraint_name(&self) -> Option<&str> {
        None
    }
    fn statement_position(&self) -> Option<i32> {
        None
    }
}

/// Convert any displayable error to a diesel error with proper message.
pub fn to_diesel_error(e: impl std::fmt::Display) -> diesel::result::Error {
    diesel::result::Error::DatabaseError(
        diesel::result::DatabaseErrorKind::Unknown,
        Box::new(DbErrorInfo(e.to_string())),
    )
}

/// Decode a JSON text column.
pub fn from_json<T: DeserializeOwned>(raw: &str) -> Result<T, diesel::result::Error> {
    serde_json::from_str(raw).map_err(|e| diesel::result::Error::DeserializationError(Box::new(e)))
}

/// Encode a value for a JSON text column.
pub fn to_json<T: Serialize>(value: &T) -> Result<String, diesel::result::Error> {
    serde_json::to_string(value).map_err(|e| diesel::result::Error::SerializationError(Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_columns() {
        let encoded = to_json(&vec!["a", "b"]).unwrap();
        assert_eq!(encoded, r#"["a","b"]"#);
        let decoded: Vec<String> = from_json(&encoded).unwrap();
        assert_eq!(decoded, vec!["a", "b"]);
        assert!(from_json::<Vec<String>>("not json").is_err());
    }
}
