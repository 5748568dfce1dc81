// Row Editor
// Changes the type/role column of a single row, either with known column
// names or by picking the table and guessing columns interactively

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::info;

use crate::db::query;
use crate::db::schema::{find_column, guess_classifier_column, guess_id_column};
use crate::db::{CellValue, ColumnInfo, Connection, SchemaInspector, TableInfo};
use crate::error::{ColumnRole, SeedError};

/// Operator input and output for the interactive flow
pub trait Prompt {
    /// Ask a question and return the trimmed answer
    fn ask(&mut self, question: &str) -> Result<String, SeedError>;
    fn show(&mut self, line: &str);
}

pub struct RustylinePrompt {
    editor: DefaultEditor,
}

impl RustylinePrompt {
    pub fn new() -> Result<Self, SeedError> {
        let editor = DefaultEditor::new().map_err(|e| SeedError::Prompt(e.to_string()))?;
        Ok(Self { editor })
    }
}

impl Prompt for RustylinePrompt {
    fn ask(&mut self, question: &str) -> Result<String, SeedError> {
        match self.editor.readline(question) {
            Ok(line) => Ok(line.trim().to_string()),
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                Err(SeedError::Prompt("input closed".to_string()))
            }
            Err(e) => Err(SeedError::Prompt(e.to_string())),
        }
    }

    fn show(&mut self, line: &str) {
        println!("{}", line);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EditRequest {
    pub table: String,
    pub id_column: Option<String>,
    pub type_column: Option<String>,
    pub id: String,
    pub value: String,
    /// Skip the confirmation question
    pub assume_yes: bool,
}

impl Default for EditRequest {
    fn default() -> Self {
        Self {
            table: "Users".to_string(),
            id_column: Some("UserID".to_string()),
            type_column: Some("UserType".to_string()),
            id: "1".to_string(),
            value: "Accountant".to_string(),
            assume_yes: false,
        }
    }
}

/// Table and the two columns an edit touches, spelled as in the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditTarget {
    pub table: String,
    pub id_column: String,
    pub type_column: String,
}

pub type NamedRow = Vec<(String, CellValue)>;

#[derive(Debug, Clone, PartialEq)]
pub enum EditOutcome {
    Updated {
        target: EditTarget,
        before: Vec<NamedRow>,
        after: Vec<NamedRow>,
        affected: u64,
    },
    NotFound {
        target: EditTarget,
        id: CellValue,
    },
    Cancelled,
}

pub fn render_row(row: &NamedRow) -> String {
    row.iter()
        .map(|(c, v)| format!("{}={}", c, v))
        .collect::<Vec<_>>()
        .join(", ")
}

pub struct RowEditor<'c, C: Connection + ?Sized> {
    conn: &'c mut C,
}

impl<'c, C: Connection + ?Sized> RowEditor<'c, C> {
    pub fn new(conn: &'c mut C) -> Self {
        Self { conn }
    }

    async fn describe(&mut self, table: &str) -> Result<Vec<ColumnInfo>, SeedError> {
        SchemaInspector::new(&mut *self.conn).describe_table(table).await
    }

    /// Use the given column names, guessing any that are missing
    pub async fn resolve(
        &mut self,
        table: &str,
        id_column: Option<&str>,
        type_column: Option<&str>,
    ) -> Result<EditTarget, SeedError> {
        let columns = self.describe(table).await?;
        Ok(EditTarget {
            table: table.to_string(),
            id_column: pick_column(table, &columns, id_column, ColumnRole::Identifier)?,
            type_column: pick_column(table, &columns, type_column, ColumnRole::Classifier)?,
        })
    }

    /// Non-interactive edit
    pub async fn edit(&mut self, request: &EditRequest) -> Result<EditOutcome, SeedError> {
        let target = self
            .resolve(
                &request.table,
                request.id_column.as_deref(),
                request.type_column.as_deref(),
            )
            .await?;
        self.apply(
            &target,
            CellValue::parse_input(&request.id),
            CellValue::from(request.value.as_str()),
            None,
        )
        .await
    }

    /// Pick the table, guess columns, ask for anything the guess cannot settle
    pub async fn edit_interactive(
        &mut self,
        request: &EditRequest,
        prompt: &mut dyn Prompt,
    ) -> Result<EditOutcome, SeedError> {
        let tables = SchemaInspector::new(&mut *self.conn).list_tables().await?;
        prompt.show(&format!("{} tables:", tables.len()));
        for (i, table) in tables.iter().enumerate() {
            prompt.show(&format!("  {}. {}", i + 1, table.qualified_name()));
        }

        let answer = prompt.ask(&format!("Table number or name [{}]: ", request.table))?;
        let table = choose_table(&tables, &answer, &request.table)?;

        let columns = self.describe(&table).await?;
        prompt.show(&format!("Columns of {}:", table));
        for (i, column) in columns.iter().enumerate() {
            prompt.show(&format!(
                "  {}. {} {}{}",
                i + 1,
                column.name,
                column.data_type,
                if column.is_identity { " (identity)" } else { "" }
            ));
        }

        let id_column = guess_or_ask(&table, &columns, ColumnRole::Identifier, prompt)?;
        let type_column = guess_or_ask(&table, &columns, ColumnRole::Classifier, prompt)?;
        prompt.show(&format!("Using {} as identifier and {} as type column", id_column, type_column));

        let id = with_default(prompt.ask(&format!("ID to update [{}]: ", request.id))?, &request.id);
        let value = with_default(prompt.ask(&format!("New value [{}]: ", request.value))?, &request.value);

        let target = EditTarget {
            table,
            id_column,
            type_column,
        };
        let confirm = if request.assume_yes { None } else { Some(prompt) };
        self.apply(
            &target,
            CellValue::parse_input(&id),
            CellValue::from(value),
            confirm,
        )
        .await
    }

    /// Update the type column of the row with `id`. With a prompt, show the
    /// row and statement first and require `y`.
    pub async fn apply(
        &mut self,
        target: &EditTarget,
        id: CellValue,
        value: CellValue,
        confirm: Option<&mut dyn Prompt>,
    ) -> Result<EditOutcome, SeedError> {
        let columns = self.describe(&target.table).await?;
        let key = [(target.id_column.as_str(), id.clone())];

        let before = self.read_rows(target, &columns, &key).await?;
        if before.is_empty() {
            return Ok(EditOutcome::NotFound {
                target: target.clone(),
                id,
            });
        }

        let set = [(target.type_column.as_str(), value)];
        if let Some(prompt) = confirm {
            let statement = query::update_statement(&target.table, &set, &key);
            for row in &before {
                prompt.show(&format!("Before: {}", render_row(row)));
            }
            prompt.show(&format!(
                "Statement: {} -- {}",
                statement.sql,
                statement
                    .params
                    .iter()
                    .map(|p| p.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
            let answer = prompt.ask("Apply update? (y/n): ")?;
            if !answer.eq_ignore_ascii_case("y") {
                info!(table = %target.table, "Edit cancelled");
                return Ok(EditOutcome::Cancelled);
            }
        }

        let affected = self
            .conn
            .update_rows(&target.table, &set, &key)
            .await
            .map_err(|e| SeedError::database(format!("updating {}", target.table), e))?;
        info!(
            table = %target.table,
            column = %target.type_column,
            affected,
            "Row updated"
        );

        let after = self.read_rows(target, &columns, &key).await?;
        Ok(EditOutcome::Updated {
            target: target.clone(),
            before,
            after,
            affected,
        })
    }

    async fn read_rows(
        &mut self,
        target: &EditTarget,
        columns: &[ColumnInfo],
        key: &[(&str, CellValue)],
    ) -> Result<Vec<NamedRow>, SeedError> {
        let rows = self
            .conn
            .select_rows(&target.table, &[], key)
            .await
            .map_err(|e| SeedError::database(format!("reading {}", target.table), e))?;
        Ok(rows
            .into_iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|c| c.name.clone())
                    .zip(row)
                    .collect()
            })
            .collect())
    }
}

fn with_default(answer: String, default: &str) -> String {
    if answer.is_empty() {
        default.to_string()
    } else {
        answer
    }
}

fn guess(table: &str, columns: &[ColumnInfo], role: ColumnRole) -> Result<String, SeedError> {
    match role {
        ColumnRole::Identifier => guess_id_column(table, columns),
        ColumnRole::Classifier => guess_classifier_column(table, columns),
    }
}

fn pick_column(
    table: &str,
    columns: &[ColumnInfo],
    explicit: Option<&str>,
    role: ColumnRole,
) -> Result<String, SeedError> {
    match explicit {
        Some(name) => find_column(columns, name)
            .map(|c| c.name.clone())
            .ok_or_else(|| SeedError::SchemaMismatch {
                table: table.to_string(),
                column: Some(name.to_string()),
            }),
        None => guess(table, columns, role),
    }
}

fn guess_or_ask(
    table: &str,
    columns: &[ColumnInfo],
    role: ColumnRole,
    prompt: &mut dyn Prompt,
) -> Result<String, SeedError> {
    match guess(table, columns, role) {
        Ok(name) => Ok(name),
        Err(SeedError::AmbiguousColumn { candidates, .. }) => {
            prompt.show(&format!(
                "Could not pick the {} column of {} (candidates: {})",
                role,
                table,
                if candidates.is_empty() { "none".to_string() } else { candidates.join(", ") }
            ));
            let answer = prompt.ask(&format!("Name of the {} column: ", role))?;
            pick_column(table, columns, Some(&answer), role)
        }
        Err(e) => Err(e),
    }
}

fn choose_table(tables: &[TableInfo], answer: &str, default: &str) -> Result<String, SeedError> {
    let wanted = if answer.is_empty() { default } else { answer };

    if let Ok(n) = wanted.parse::<usize>() {
        return match n.checked_sub(1).and_then(|i| tables.get(i)) {
            Some(t) => Ok(table_name(t)),
            None => Err(SeedError::SchemaMismatch {
                table: format!("#{}", n),
                column: None,
            }),
        };
    }

    tables
        .iter()
        .find(|t| t.table_name.eq_ignore_ascii_case(wanted) || t.qualified_name().eq_ignore_ascii_case(wanted))
        .map(table_name)
        .ok_or_else(|| SeedError::SchemaMismatch {
            table: wanted.to_string(),
            column: None,
        })
}

fn table_name(table: &TableInfo) -> String {
    if table.schema_name.eq_ignore_ascii_case("dbo") {
        table.table_name.clone()
    } else {
        table.qualified_name()
    }
}
