//! Error types for Strata core.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in Strata core operations.
///
/// Lookup misses (absent log entries, absent tree keys, out-of-range store
/// positions) are not errors; those operations return `Option` instead.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoreError {
    /// A numeric range was declared with `max < min`.
    #[error("invalid range: max {max} is less than min {min}")]
    InvalidRange {
        /// Lower bound.
        min: f64,
        /// Upper bound.
        max: f64,
    },

    /// A definition could not be turned into a working object.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },

    /// A value was rejected by a field's rules.
    #[error("validation failed for field '{field}': {reason}")]
    ValidationFailed {
        /// Field that rejected the value.
        field: String,
        /// Which check failed.
        reason: String,
    },

    /// A field with this name already exists.
    #[error("field already defined: {name}")]
    DuplicateField {
        /// Name of the field.
        name: String,
    },

    /// No field with this name exists.
    #[error("field not found: {name}")]
    FieldNotFound {
        /// Name of the field.
        name: String,
    },

    /// An index already exists for this field.
    #[error("index already defined for field: {field}")]
    DuplicateIndex {
        /// Indexed field name.
        field: String,
    },

    /// No index exists for this field.
    #[error("no index defined for field: {field}")]
    IndexNotFound {
        /// Field name that was queried.
        field: String,
    },

    /// An entity of one model was handed to a store of another.
    #[error("model mismatch: store expects '{expected}', got '{actual}'")]
    ModelMismatch {
        /// Model name the store was built with.
        expected: String,
        /// Model name of the rejected entity.
        actual: String,
    },

    /// The record is already a member of the store.
    #[error("record already present in store: {id}")]
    DuplicateRecord {
        /// Record identifier.
        id: String,
    },

    /// The addressed record is not an active member of the store.
    #[error("record not found: {reference}")]
    RecordNotFound {
        /// Position or identifier that missed.
        reference: String,
    },

    /// A store was configured without a model.
    #[error("store configuration is missing a model")]
    MissingModel,

    /// An entity view could not be serialized.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the failure.
        message: String,
    },

    /// A value of the wrong shape was given to a field.
    #[error("type mismatch for field '{field}': expected {expected}, got {actual}")]
    TypeMismatch {
        /// Field name.
        field: String,
        /// Expected shape.
        expected: String,
        /// Shape that was supplied.
        actual: String,
    },
}

impl CoreError {
    /// Creates an invalid range error.
    pub fn invalid_range(min: f64, max: f64) -> Self {
        Self::InvalidRange { min, max }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Creates a validation failure.
    pub fn validation_failed(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ValidationFailed {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates a duplicate field error.
    pub fn duplicate_field(name: impl Into<String>) -> Self {
        Self::DuplicateField { name: name.into() }
    }

    /// Creates a field not found error.
    pub fn field_not_found(name: impl Into<String>) -> Self {
        Self::FieldNotFound { name: name.into() }
    }

    /// Creates a duplicate index error.
    pub fn duplicate_index(field: impl Into<String>) -> Self {
        Self::DuplicateIndex {
            field: field.into(),
        }
    }

    /// Creates an index not found error.
    pub fn index_not_found(field: impl Into<String>) -> Self {
        Self::IndexNotFound {
            field: field.into(),
        }
    }

    /// Creates a record not found error.
    pub fn record_not_found(reference: impl ToString) -> Self {
        Self::RecordNotFound {
            reference: reference.to_string(),
        }
    }

    /// Creates a type mismatch error.
    pub fn type_mismatch(
        field: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch {
            field: field.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_subject() {
        let err = CoreError::validation_failed("age", "value above maximum");
        assert_eq!(
            err.to_string(),
            "validation failed for field 'age': value above maximum"
        );

        let err = CoreError::invalid_range(50.0, 10.0);
        assert!(err.to_string().contains("max 10"));
    }
}
