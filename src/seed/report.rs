// Seed Report
// What a seed run inserted and skipped per step, kept even when the run aborts

use serde::Serialize;
use uuid::Uuid;

use crate::error::SeedError;
use crate::seed::fees::FeeTotals;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub label: String,
    pub table: String,
    pub inserted: usize,
    pub skipped: usize,
    /// Keys generated by the server for rows inserted without an explicit id
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub generated_ids: Vec<i64>,
}

impl StepReport {
    pub fn new(label: &str, table: &str) -> Self {
        Self {
            label: label.to_string(),
            table: table.to_string(),
            inserted: 0,
            skipped: 0,
            generated_ids: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SeedReport {
    pub run_id: Uuid,
    pub plan: String,
    pub driver: String,
    pub steps: Vec<StepReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee_totals: Option<FeeTotals>,
    pub transactional: bool,
    pub rolled_back: bool,
}

impl SeedReport {
    pub fn new(run_id: Uuid, plan: &str, driver: &str, transactional: bool) -> Self {
        Self {
            run_id,
            plan: plan.to_string(),
            driver: driver.to_string(),
            steps: Vec::new(),
            fee_totals: None,
            transactional,
            rolled_back: false,
        }
    }

    pub fn total_inserted(&self) -> usize {
        self.steps.iter().map(|s| s.inserted).sum()
    }

    pub fn total_skipped(&self) -> usize {
        self.steps.iter().map(|s| s.skipped).sum()
    }

    pub fn step(&self, table: &str) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.table == table)
    }

    /// Plain console lines
    pub fn render_text(&self) -> String {
        let mut out = format!(
            "Seed run {} (plan {}, driver {})\n",
            self.run_id, self.plan, self.driver
        );
        for step in &self.steps {
            out.push_str(&format!(
                "  {:<16} {:<18} inserted {:>3}  skipped {:>3}\n",
                step.label, step.table, step.inserted, step.skipped
            ));
        }
        if let Some(totals) = &self.fee_totals {
            out.push_str(&format!(
                "  fee totals: {} credits, tuition {} VND, fixed {} VND, total {} VND\n",
                totals.total_credits, totals.tuition, totals.fixed_fees, totals.total
            ));
        }
        out.push_str(&format!(
            "  {} inserted, {} skipped",
            self.total_inserted(),
            self.total_skipped()
        ));
        if self.rolled_back {
            out.push_str(" (rolled back)");
        }
        out
    }
}

/// A failed run: the error, plus the steps that completed before it
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct SeedAbort {
    pub report: SeedReport,
    #[source]
    pub error: SeedError,
}
