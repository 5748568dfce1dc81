// Error Types
// Operator-facing errors for seeding, schema inspection and row editing

use thiserror::Error;

use crate::db::{ConnectionError, DatabaseError};

/// Which heuristic column role could not be resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    Identifier,
    Classifier,
}

impl std::fmt::Display for ColumnRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnRole::Identifier => write!(f, "identifier"),
            ColumnRole::Classifier => write!(f, "type/role"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SeedError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("Schema mismatch: table {table} {}", .column.as_ref().map(|c| format!("has no column {}", c)).unwrap_or_else(|| "does not exist".to_string()))]
    SchemaMismatch {
        table: String,
        column: Option<String>,
    },

    #[error("Insert into {table} failed: {source}\n  statement: {statement}")]
    Insert {
        table: String,
        statement: String,
        #[source]
        source: DatabaseError,
    },

    #[error("Could not pick the {role} column of {table}: {}", describe_candidates(.candidates))]
    AmbiguousColumn {
        table: String,
        role: ColumnRole,
        candidates: Vec<String>,
    },

    #[error("Seed plan order: {table} runs before {missing}, which it references")]
    Plan { table: String, missing: String },

    #[error("Seed plan step {table} derives fee values but the plan has no fee scope")]
    NoFeeScope { table: String },

    #[error("No row in {table} where {key}")]
    MissingReference { table: String, key: String },

    #[error("Database error on {context}: {source}")]
    Database {
        context: String,
        #[source]
        source: DatabaseError,
    },

    #[error("Could not read operator input: {0}")]
    Prompt(String),
}

fn describe_candidates(candidates: &[String]) -> String {
    if candidates.is_empty() {
        "no candidates".to_string()
    } else {
        format!("candidates {}", candidates.join(", "))
    }
}

impl SeedError {
    pub fn database(context: impl Into<String>, source: DatabaseError) -> Self {
        SeedError::Database {
            context: context.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_mismatch_messages() {
        let err = SeedError::SchemaMismatch {
            table: "Courses".to_string(),
            column: None,
        };
        assert_eq!(err.to_string(), "Schema mismatch: table Courses does not exist");

        let err = SeedError::SchemaMismatch {
            table: "Courses".to_string(),
            column: Some("Credits".to_string()),
        };
        assert_eq!(err.to_string(), "Schema mismatch: table Courses has no column Credits");
    }

    #[test]
    fn test_ambiguous_column_message() {
        let err = SeedError::AmbiguousColumn {
            table: "Users".to_string(),
            role: ColumnRole::Identifier,
            candidates: vec!["UserID".to_string(), "StudentID".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Could not pick the identifier column of Users: candidates UserID, StudentID"
        );
    }

    #[test]
    fn test_insert_error_keeps_database_error() {
        let err = SeedError::Insert {
            table: "Payments".to_string(),
            statement: "INSERT INTO [Payments] ...".to_string(),
            source: DatabaseError::QueryError("FK violation".to_string()),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("Payments"));
        assert!(rendered.contains("FK violation"));
        assert!(rendered.contains("INSERT INTO [Payments]"));
    }
}
