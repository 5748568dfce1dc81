// Schema Inspection
// Table and column metadata from the catalog views, the id/classifier
// column heuristics, and checking a seed plan against the live schema

use std::collections::HashMap;

use tracing::debug;

use crate::db::traits::{ColumnInfo, Connection, TableInfo};
use crate::error::{ColumnRole, SeedError};
use crate::seed::SeedPlan;

pub struct SchemaInspector<'c, C: Connection + ?Sized> {
    conn: &'c mut C,
    /// Column metadata by lower-cased table name
    cache: HashMap<String, Vec<ColumnInfo>>,
}

impl<'c, C: Connection + ?Sized> SchemaInspector<'c, C> {
    pub fn new(conn: &'c mut C) -> Self {
        Self {
            conn,
            cache: HashMap::new(),
        }
    }

    pub async fn list_tables(&mut self) -> Result<Vec<TableInfo>, SeedError> {
        self.conn
            .list_tables()
            .await
            .map_err(|e| SeedError::database("listing tables", e))
    }

    /// Columns of `table` in ordinal order; an unknown table is a schema mismatch
    pub async fn describe_table(&mut self, table: &str) -> Result<Vec<ColumnInfo>, SeedError> {
        let key = table.to_ascii_lowercase();
        if let Some(columns) = self.cache.get(&key) {
            return Ok(columns.clone());
        }

        let mut columns = self
            .conn
            .list_columns(table)
            .await
            .map_err(|e| SeedError::database(format!("describing {}", table), e))?;
        if columns.is_empty() {
            return Err(SeedError::SchemaMismatch {
                table: table.to_string(),
                column: None,
            });
        }
        columns.sort_by_key(|c| c.ordinal_position);

        debug!(table, columns = columns.len(), "described table");
        self.cache.insert(key, columns.clone());
        Ok(columns)
    }

    /// Every table and column the plan writes or looks up must exist
    pub async fn verify_plan(&mut self, plan: &SeedPlan) -> Result<(), SeedError> {
        for step in &plan.steps {
            let columns = self.describe_table(step.table).await?;
            for column in step.written_columns() {
                require_column(step.table, &columns, column)?;
            }

            let lookups: Vec<_> = step
                .materialize(&crate::seed::FeeTotals::placeholder())
                .iter()
                .flat_map(|row| row.lookups().cloned().collect::<Vec<_>>())
                .collect();
            for lookup in lookups {
                let target = self.describe_table(lookup.table).await?;
                require_column(lookup.table, &target, lookup.column)?;
                require_column(lookup.table, &target, lookup.key_column)?;
            }
        }
        debug!(plan = %plan.name, tables = plan.tables().len(), "plan matches schema");
        Ok(())
    }
}

fn require_column(table: &str, columns: &[ColumnInfo], column: &str) -> Result<(), SeedError> {
    match find_column(columns, column) {
        Some(_) => Ok(()),
        None => Err(SeedError::SchemaMismatch {
            table: table.to_string(),
            column: Some(column.to_string()),
        }),
    }
}

/// Case-insensitive column match, returning the catalog spelling
pub fn find_column<'a>(columns: &'a [ColumnInfo], name: &str) -> Option<&'a ColumnInfo> {
    columns.iter().find(|c| c.name.eq_ignore_ascii_case(name.trim()))
}

fn single<'a>(matches: Vec<&'a ColumnInfo>) -> Option<&'a ColumnInfo> {
    match matches.as_slice() {
        [only] => Some(*only),
        _ => None,
    }
}

fn names(columns: &[&ColumnInfo]) -> Vec<String> {
    columns.iter().map(|c| c.name.clone()).collect()
}

/// Best guess at the row identifier column of `table`
pub fn guess_id_column(table: &str, columns: &[ColumnInfo]) -> Result<String, SeedError> {
    if let Some(col) = single(columns.iter().filter(|c| c.is_identity).collect()) {
        return Ok(col.name.clone());
    }

    let id_like: Vec<&ColumnInfo> = columns
        .iter()
        .filter(|c| c.name.to_ascii_lowercase().ends_with("id"))
        .collect();
    if let Some(col) = single(id_like.clone()) {
        return Ok(col.name.clone());
    }

    let (_, bare) = crate::db::query::split_table_name(table);
    let bare = bare.to_ascii_lowercase();
    let singular = bare.strip_suffix('s').unwrap_or(&bare);
    let preferred = [
        "id".to_string(),
        format!("{}id", singular),
        format!("{}_id", singular),
    ];
    if let Some(col) = single(
        columns
            .iter()
            .filter(|c| preferred.contains(&c.name.to_ascii_lowercase()))
            .collect(),
    ) {
        return Ok(col.name.clone());
    }

    Err(SeedError::AmbiguousColumn {
        table: table.to_string(),
        role: ColumnRole::Identifier,
        candidates: names(&id_like),
    })
}

/// Best guess at the type/role column of `table`
pub fn guess_classifier_column(table: &str, columns: &[ColumnInfo]) -> Result<String, SeedError> {
    let candidates: Vec<&ColumnInfo> = columns
        .iter()
        .filter(|c| {
            let upper = c.name.to_ascii_uppercase();
            upper.contains("TYPE") || upper.contains("ROLE")
        })
        .collect();

    match single(candidates.clone()) {
        Some(col) => Ok(col.name.clone()),
        None => Err(SeedError::AmbiguousColumn {
            table: table.to_string(),
            role: ColumnRole::Classifier,
            candidates: names(&candidates),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryDatabase;
    use crate::seed::{SeedRow, SeedStep};

    fn plain(names: &[&str]) -> Vec<ColumnInfo> {
        names.iter().map(|n| ColumnInfo::new(n, "nvarchar")).collect()
    }

    #[test]
    fn test_users_heuristic() {
        let columns = plain(&["UserID", "Email", "UserType"]);
        assert_eq!(guess_id_column("Users", &columns).unwrap(), "UserID");
        assert_eq!(guess_classifier_column("Users", &columns).unwrap(), "UserType");
    }

    #[test]
    fn test_identity_column_wins() {
        let mut columns = plain(&["StudentID", "UserID", "Email"]);
        columns[0] = ColumnInfo::new("StudentID", "int").identity();
        assert_eq!(guess_id_column("Students", &columns).unwrap(), "StudentID");
    }

    #[test]
    fn test_table_singular_breaks_tie() {
        let columns = plain(&["UserID", "DepartmentID", "FullName"]);
        assert_eq!(guess_id_column("dbo.Users", &columns).unwrap(), "UserID");
    }

    #[test]
    fn test_ambiguous_id_lists_candidates() {
        let columns = plain(&["StudentID", "CourseID"]);
        match guess_id_column("Enrollments", &columns) {
            Err(SeedError::AmbiguousColumn { role, candidates, .. }) => {
                assert_eq!(role, ColumnRole::Identifier);
                assert_eq!(candidates, vec!["StudentID", "CourseID"]);
            }
            other => panic!("expected ambiguity, got {:?}", other),
        }
    }

    #[test]
    fn test_classifier_matches_role_case_insensitively() {
        let columns = plain(&["AccountId", "role_name"]);
        assert_eq!(guess_classifier_column("Accounts", &columns).unwrap(), "role_name");

        let columns = plain(&["UserType", "RoleName"]);
        assert!(matches!(
            guess_classifier_column("Users", &columns),
            Err(SeedError::AmbiguousColumn { .. })
        ));
    }

    #[tokio::test]
    async fn test_describe_unknown_table_is_mismatch() {
        let mut db = MemoryDatabase::tuition_schema();
        let mut inspector = SchemaInspector::new(&mut db);
        let err = inspector.describe_table("Scholarships").await.unwrap_err();
        assert!(matches!(err, SeedError::SchemaMismatch { column: None, .. }));
    }

    #[tokio::test]
    async fn test_describe_reports_identity() {
        let mut db = MemoryDatabase::tuition_schema();
        let mut inspector = SchemaInspector::new(&mut db);
        let columns = inspector.describe_table("Users").await.unwrap();
        assert_eq!(columns[0].name, "UserID");
        assert!(columns[0].is_identity);
        assert!(!columns[1].is_identity);
    }

    #[tokio::test]
    async fn test_verify_plan_reports_missing_column() {
        let mut db = MemoryDatabase::tuition_schema();
        let plan = SeedPlan::new("test").step(SeedStep::new("courses", "Courses").rows(vec![
            SeedRow::new().key("CourseID", 1).value("Syllabus", "tbd"),
        ]));

        let err = SchemaInspector::new(&mut db).verify_plan(&plan).await.unwrap_err();
        match err {
            SeedError::SchemaMismatch { table, column } => {
                assert_eq!(table, "Courses");
                assert_eq!(column.as_deref(), Some("Syllabus"));
            }
            other => panic!("expected mismatch, got {:?}", other),
        }
    }
}
