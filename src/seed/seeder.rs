// Idempotent Seeder
// Runs a seed plan step by step: a row is inserted only when no row matches
// its key. Steps with literal identity values run inside an IdentityScope.

use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::db::query;
use crate::db::{CellValue, ColumnValue, Connection, SchemaInspector};
use crate::error::SeedError;
use crate::seed::fees::FeeTotals;
use crate::seed::plan::{Lookup, SeedPlan, SeedRow, SeedStep, SeedValue};
use crate::seed::report::{SeedAbort, SeedReport, StepReport};

#[derive(Debug, Clone, Copy)]
pub struct SeederOptions {
    /// Wrap the whole run in one transaction
    pub transaction: bool,
    /// Check plan tables and columns against the schema before writing
    pub verify_schema: bool,
}

impl Default for SeederOptions {
    fn default() -> Self {
        Self {
            transaction: false,
            verify_schema: true,
        }
    }
}

/// IDENTITY_INSERT held ON for one table. `exit` turns it OFF again and must
/// be called on every path out of the step. It is the only restore path:
/// dropping an unexited scope only logs a warning.
pub struct IdentityScope<'a, C: Connection + ?Sized> {
    conn: &'a mut C,
    table: &'a str,
    armed: bool,
}

impl<'a, C: Connection + ?Sized> IdentityScope<'a, C> {
    pub async fn enter(conn: &'a mut C, table: &'a str) -> Result<Self, SeedError> {
        conn.set_identity_insert(table, true)
            .await
            .map_err(|e| SeedError::database(format!("enabling IDENTITY_INSERT on {}", table), e))?;
        debug!(table, "IDENTITY_INSERT ON");
        Ok(Self {
            conn,
            table,
            armed: true,
        })
    }

    pub fn conn(&mut self) -> &mut C {
        self.conn
    }

    /// Restore IDENTITY_INSERT OFF. A step error takes precedence over a
    /// restore error, which is then only logged.
    pub async fn exit<T>(mut self, outcome: Result<T, SeedError>) -> Result<T, SeedError> {
        self.armed = false;
        let restored = self.conn.set_identity_insert(self.table, false).await;
        debug!(table = self.table, ok = restored.is_ok(), "IDENTITY_INSERT OFF");

        match (outcome, restored) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(SeedError::database(
                format!("restoring IDENTITY_INSERT on {}", self.table),
                e,
            )),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(restore)) => {
                warn!(
                    table = self.table,
                    error = %restore,
                    "Failed to restore IDENTITY_INSERT after a failed step"
                );
                Err(err)
            }
        }
    }
}

impl<C: Connection + ?Sized> Drop for IdentityScope<'_, C> {
    fn drop(&mut self) {
        if self.armed {
            warn!(table = self.table, "IDENTITY_INSERT scope dropped without being restored");
        }
    }
}

pub struct Seeder<'c, C: Connection + ?Sized> {
    conn: &'c mut C,
    options: SeederOptions,
    run_id: Uuid,
}

impl<'c, C: Connection + ?Sized> Seeder<'c, C> {
    pub fn new(conn: &'c mut C, options: SeederOptions) -> Self {
        Self {
            conn,
            options,
            run_id: Uuid::new_v4(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Run `plan`. The first failure stops the run; the returned abort
    /// carries the report of every step attempted so far.
    pub async fn run(&mut self, plan: &SeedPlan) -> Result<SeedReport, SeedAbort> {
        let mut report = SeedReport::new(
            self.run_id,
            &plan.name,
            self.conn.driver_label(),
            self.options.transaction,
        );
        let span = info_span!("seed", run_id = %self.run_id, plan = %plan.name);

        match self.run_inner(plan, &mut report).instrument(span).await {
            Ok(()) => {
                info!(
                    run_id = %self.run_id,
                    inserted = report.total_inserted(),
                    skipped = report.total_skipped(),
                    "Seed run complete"
                );
                Ok(report)
            }
            Err(error) => Err(SeedAbort { report, error }),
        }
    }

    async fn run_inner(&mut self, plan: &SeedPlan, report: &mut SeedReport) -> Result<(), SeedError> {
        plan.validate()?;
        if self.options.verify_schema {
            SchemaInspector::new(&mut *self.conn).verify_plan(plan).await?;
        }

        if !self.options.transaction {
            return self.run_steps(plan, report).await;
        }

        self.conn
            .begin()
            .await
            .map_err(|e| SeedError::database("beginning transaction", e))?;

        let outcome = match self.run_steps(plan, report).await {
            Ok(()) => self
                .conn
                .commit()
                .await
                .map_err(|e| SeedError::database("committing transaction", e)),
            Err(e) => Err(e),
        };

        if outcome.is_err() {
            match self.conn.rollback().await {
                Ok(()) => {
                    report.rolled_back = true;
                    info!("Seed transaction rolled back");
                }
                Err(e) => warn!(error = %e, "Failed to roll back seed transaction"),
            }
        }
        outcome
    }

    async fn run_steps(&mut self, plan: &SeedPlan, report: &mut SeedReport) -> Result<(), SeedError> {
        let mut totals: Option<FeeTotals> = None;

        for step in &plan.steps {
            if step.is_derived() && totals.is_none() {
                let scope = plan.fee_scope.as_ref().ok_or_else(|| SeedError::NoFeeScope {
                    table: step.table.to_string(),
                })?;
                let computed = FeeTotals::compute(&mut *self.conn, scope).await?;
                info!(
                    credits = computed.total_credits,
                    total = computed.total,
                    "Fee totals computed from seeded rows"
                );
                report.fee_totals = Some(computed.clone());
                totals = Some(computed);
            }

            let rows = step.materialize(totals.as_ref().unwrap_or(&FeeTotals::default()));
            let mut step_report = StepReport::new(step.label, step.table);
            let outcome = seed_step(&mut *self.conn, step, &rows, &mut step_report).await;

            info!(
                step = step.label,
                table = step.table,
                inserted = step_report.inserted,
                skipped = step_report.skipped,
                "Seed step finished"
            );
            report.steps.push(step_report);
            outcome?;
        }
        Ok(())
    }
}

async fn seed_step<C: Connection + ?Sized>(
    conn: &mut C,
    step: &SeedStep,
    rows: &[SeedRow],
    report: &mut StepReport,
) -> Result<(), SeedError> {
    if step.identity_column.is_none() {
        return insert_missing(conn, step, rows, report).await;
    }

    let mut scope = IdentityScope::enter(conn, step.table).await?;
    let outcome = insert_missing(scope.conn(), step, rows, report).await;
    scope.exit(outcome).await
}

async fn insert_missing<C: Connection + ?Sized>(
    conn: &mut C,
    step: &SeedStep,
    rows: &[SeedRow],
    report: &mut StepReport,
) -> Result<(), SeedError> {
    for row in rows {
        let key: Vec<ColumnValue<'_>> = row.key.iter().map(|(c, v)| (*c, v.clone())).collect();
        let exists = conn.row_exists(step.table, &key).await.map_err(|e| {
            SeedError::database(format!("checking {} where {}", step.table, row.describe_key()), e)
        })?;
        if exists {
            debug!(table = step.table, key = %row.describe_key(), "exists, skipped");
            report.skipped += 1;
            continue;
        }

        let mut values = key;
        for (column, value) in &row.values {
            let resolved = match value {
                SeedValue::Value(v) => v.clone(),
                SeedValue::Lookup(lookup) => resolve_lookup(conn, lookup).await?,
            };
            values.push((*column, resolved));
        }

        let new_id = conn
            .insert_row(step.table, &values)
            .await
            .map_err(|source| SeedError::Insert {
                table: step.table.to_string(),
                statement: query::insert_statement(step.table, &values).sql,
                source,
            })?;

        report.inserted += 1;
        if step.identity_column.is_none() {
            report.generated_ids.extend(new_id);
        }
        debug!(table = step.table, key = %row.describe_key(), id = ?new_id, "inserted");
    }
    Ok(())
}

async fn resolve_lookup<C: Connection + ?Sized>(
    conn: &mut C,
    lookup: &Lookup,
) -> Result<CellValue, SeedError> {
    let rows = conn
        .select_rows(
            lookup.table,
            &[lookup.column],
            &[(lookup.key_column, lookup.key.clone())],
        )
        .await
        .map_err(|e| SeedError::database(format!("looking up {}.{}", lookup.table, lookup.column), e))?;

    rows.into_iter()
        .next()
        .and_then(|row| row.into_iter().next())
        .filter(|v| !v.is_null())
        .ok_or_else(|| SeedError::MissingReference {
            table: lookup.table.to_string(),
            key: lookup.describe(),
        })
}
