// Seed Plan
// Ordered steps of rows keyed for existence checks, with declared table
// references so a plan can be checked for foreign-key order before it runs

use std::collections::BTreeSet;
use std::fmt;

use crate::db::CellValue;
use crate::error::SeedError;
use crate::seed::fees::{FeeScope, FeeTotals};

/// Read one column of an already-seeded row: `SELECT column FROM table WHERE key_column = key`
#[derive(Debug, Clone, PartialEq)]
pub struct Lookup {
    pub table: &'static str,
    pub column: &'static str,
    pub key_column: &'static str,
    pub key: CellValue,
}

impl Lookup {
    pub fn new(
        table: &'static str,
        column: &'static str,
        key_column: &'static str,
        key: impl Into<CellValue>,
    ) -> Self {
        Self {
            table,
            column,
            key_column,
            key: key.into(),
        }
    }

    pub fn describe(&self) -> String {
        format!("{} = {}", self.key_column, self.key)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SeedValue {
    Value(CellValue),
    Lookup(Lookup),
}

/// One row: the key decides existence, key and values together are inserted
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeedRow {
    pub key: Vec<(&'static str, CellValue)>,
    pub values: Vec<(&'static str, SeedValue)>,
}

impl SeedRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(mut self, column: &'static str, value: impl Into<CellValue>) -> Self {
        self.key.push((column, value.into()));
        self
    }

    pub fn value(mut self, column: &'static str, value: impl Into<CellValue>) -> Self {
        self.values.push((column, SeedValue::Value(value.into())));
        self
    }

    pub fn lookup(mut self, column: &'static str, lookup: Lookup) -> Self {
        self.values.push((column, SeedValue::Lookup(lookup)));
        self
    }

    /// Every column the insert writes, key columns first
    pub fn columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.key
            .iter()
            .map(|(c, _)| *c)
            .chain(self.values.iter().map(|(c, _)| *c))
    }

    pub fn lookups(&self) -> impl Iterator<Item = &Lookup> + '_ {
        self.values.iter().filter_map(|(_, v)| match v {
            SeedValue::Lookup(l) => Some(l),
            SeedValue::Value(_) => None,
        })
    }

    /// Human-readable key, e.g. `DepartmentCode = CNTT AND ...`
    pub fn describe_key(&self) -> String {
        self.key
            .iter()
            .map(|(c, v)| format!("{} = {}", c, v))
            .collect::<Vec<_>>()
            .join(" AND ")
    }
}

pub type DerivedRows = Box<dyn Fn(&FeeTotals) -> Vec<SeedRow> + Send + Sync>;

/// Rows known up front, or rows built from fee totals read back mid-run
pub enum RowSource {
    Fixed(Vec<SeedRow>),
    Derived(DerivedRows),
}

impl fmt::Debug for RowSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowSource::Fixed(rows) => f.debug_tuple("Fixed").field(&rows.len()).finish(),
            RowSource::Derived(_) => f.write_str("Derived"),
        }
    }
}

#[derive(Debug)]
pub struct SeedStep {
    pub label: &'static str,
    pub table: &'static str,
    /// Set when rows carry literal values for the identity column
    pub identity_column: Option<&'static str>,
    pub references: Vec<&'static str>,
    pub rows: RowSource,
}

impl SeedStep {
    pub fn new(label: &'static str, table: &'static str) -> Self {
        Self {
            label,
            table,
            identity_column: None,
            references: Vec::new(),
            rows: RowSource::Fixed(Vec::new()),
        }
    }

    pub fn explicit_identity(mut self, column: &'static str) -> Self {
        self.identity_column = Some(column);
        self
    }

    pub fn references(mut self, tables: &[&'static str]) -> Self {
        self.references.extend_from_slice(tables);
        self
    }

    pub fn rows(mut self, rows: Vec<SeedRow>) -> Self {
        self.rows = RowSource::Fixed(rows);
        self
    }

    pub fn derived<F>(mut self, build: F) -> Self
    where
        F: Fn(&FeeTotals) -> Vec<SeedRow> + Send + Sync + 'static,
    {
        self.rows = RowSource::Derived(Box::new(build));
        self
    }

    pub fn is_derived(&self) -> bool {
        matches!(self.rows, RowSource::Derived(_))
    }

    /// Rows for this run. Derived steps need the fee totals.
    pub fn materialize(&self, totals: &FeeTotals) -> Vec<SeedRow> {
        match &self.rows {
            RowSource::Fixed(rows) => rows.clone(),
            RowSource::Derived(build) => build(totals),
        }
    }

    /// Declared references plus every table a lookup reads
    pub fn referenced_tables(&self) -> BTreeSet<&'static str> {
        let mut tables: BTreeSet<&'static str> = self.references.iter().copied().collect();
        if let RowSource::Fixed(rows) = &self.rows {
            for row in rows {
                tables.extend(row.lookups().map(|l| l.table));
            }
        }
        tables.remove(self.table);
        tables
    }

    /// Every column the step writes, in first-seen order
    pub fn written_columns(&self) -> Vec<&'static str> {
        let mut seen = BTreeSet::new();
        let mut columns = Vec::new();
        for row in self.materialize(&FeeTotals::placeholder()) {
            for column in row.columns() {
                if seen.insert(column.to_ascii_lowercase()) {
                    columns.push(column);
                }
            }
        }
        if let Some(identity) = self.identity_column {
            if seen.insert(identity.to_ascii_lowercase()) {
                columns.push(identity);
            }
        }
        columns
    }
}

#[derive(Debug)]
pub struct SeedPlan {
    pub name: String,
    pub steps: Vec<SeedStep>,
    /// Tables the plan relies on without seeding them
    pub external: Vec<&'static str>,
    pub fee_scope: Option<FeeScope>,
}

impl SeedPlan {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            external: Vec::new(),
            fee_scope: None,
        }
    }

    pub fn step(mut self, step: SeedStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn external(mut self, tables: &[&'static str]) -> Self {
        self.external.extend_from_slice(tables);
        self
    }

    pub fn fee_scope(mut self, scope: FeeScope) -> Self {
        self.fee_scope = Some(scope);
        self
    }

    /// Run `self`, then `next`
    pub fn then(mut self, next: SeedPlan) -> Self {
        self.name = format!("{}+{}", self.name, next.name);
        self.steps.extend(next.steps);
        self.external.extend(next.external);
        self.fee_scope = next.fee_scope.or(self.fee_scope);
        self
    }

    /// Distinct tables in step order
    pub fn tables(&self) -> Vec<&'static str> {
        let mut seen = BTreeSet::new();
        self.steps
            .iter()
            .map(|s| s.table)
            .filter(|t| seen.insert(*t))
            .collect()
    }

    /// Reject a plan where a step runs before a table it references
    pub fn validate(&self) -> Result<(), SeedError> {
        let mut available: BTreeSet<&str> = self.external.iter().copied().collect();

        for step in &self.steps {
            if let Some(missing) = step
                .referenced_tables()
                .into_iter()
                .find(|t| !available.contains(t))
            {
                return Err(SeedError::Plan {
                    table: step.table.to_string(),
                    missing: missing.to_string(),
                });
            }
            if step.is_derived() && self.fee_scope.is_none() {
                return Err(SeedError::NoFeeScope {
                    table: step.table.to_string(),
                });
            }
            available.insert(step.table);
        }
        Ok(())
    }
}
