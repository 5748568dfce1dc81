// Fee Totals
// Credits, fee structure amounts and the semester name read back from the
// database after the enrollments are seeded; fee record, details, payment and
// notification are built from these values

use serde::Serialize;
use tracing::debug;

use crate::db::{CellValue, Connection};
use crate::error::SeedError;

/// Whose fees are computed: one student in one semester of one department
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeScope {
    pub student_id: i64,
    pub semester_id: i64,
    pub department_id: i64,
}

/// A FeeStructures row as read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeRate {
    pub fee_category_id: i64,
    pub amount: i64,
    pub per_credit: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FeeLine {
    pub fee_category_id: i64,
    pub per_credit: bool,
    pub rate: i64,
    /// `rate * credits` for per-credit fees, `rate` otherwise
    pub amount: i64,
}

/// Amounts are whole VND
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FeeTotals {
    pub total_credits: i64,
    pub per_credit_rate: i64,
    pub tuition: i64,
    pub fixed_fees: i64,
    pub total: i64,
    pub lines: Vec<FeeLine>,
    /// Name of the semester the fee record points at, as stored
    pub semester_name: String,
}

impl FeeTotals {
    pub fn from_parts(credits: &[i64], rates: &[FeeRate]) -> Self {
        let total_credits: i64 = credits.iter().sum();

        let mut rates = rates.to_vec();
        rates.sort_by_key(|r| r.fee_category_id);

        let lines: Vec<FeeLine> = rates
            .iter()
            .map(|r| FeeLine {
                fee_category_id: r.fee_category_id,
                per_credit: r.per_credit,
                rate: r.amount,
                amount: if r.per_credit {
                    r.amount * total_credits
                } else {
                    r.amount
                },
            })
            .collect();

        let per_credit_rate = lines.iter().filter(|l| l.per_credit).map(|l| l.rate).sum();
        let tuition: i64 = lines.iter().filter(|l| l.per_credit).map(|l| l.amount).sum();
        let fixed_fees: i64 = lines.iter().filter(|l| !l.per_credit).map(|l| l.amount).sum();

        FeeTotals {
            total_credits,
            per_credit_rate,
            tuition,
            fixed_fees,
            total: tuition + fixed_fees,
            lines,
            semester_name: String::new(),
        }
    }

    /// Stand-in used to learn which columns derived rows write
    pub(crate) fn placeholder() -> Self {
        FeeTotals {
            lines: vec![FeeLine::default()],
            ..Default::default()
        }
    }

    pub fn line(&self, fee_category_id: i64) -> Option<&FeeLine> {
        self.lines.iter().find(|l| l.fee_category_id == fee_category_id)
    }

    /// Read enrollments, course credits, fee structures and the semester
    /// name for `scope`
    pub async fn compute<C: Connection + ?Sized>(
        conn: &mut C,
        scope: &FeeScope,
    ) -> Result<Self, SeedError> {
        let enrollments = conn
            .select_rows(
                "StudentCourses",
                &["CourseID"],
                &[
                    ("StudentID", CellValue::Int(scope.student_id)),
                    ("SemesterID", CellValue::Int(scope.semester_id)),
                ],
            )
            .await
            .map_err(|e| SeedError::database("reading enrollments", e))?;

        let mut credits = Vec::with_capacity(enrollments.len());
        for row in &enrollments {
            let Some(course_id) = row.first().and_then(CellValue::as_i64) else {
                continue;
            };
            let course = conn
                .select_rows(
                    "Courses",
                    &["Credits"],
                    &[("CourseID", CellValue::Int(course_id))],
                )
                .await
                .map_err(|e| SeedError::database("reading course credits", e))?;
            let value = course
                .first()
                .and_then(|r| r.first())
                .and_then(CellValue::as_i64)
                .ok_or_else(|| SeedError::MissingReference {
                    table: "Courses".to_string(),
                    key: format!("CourseID = {}", course_id),
                })?;
            credits.push(value);
        }

        let structures = conn
            .select_rows(
                "FeeStructures",
                &["FeeCategoryID", "Amount", "PerCredit"],
                &[
                    ("DepartmentID", CellValue::Int(scope.department_id)),
                    ("SemesterID", CellValue::Int(scope.semester_id)),
                ],
            )
            .await
            .map_err(|e| SeedError::database("reading fee structures", e))?;

        let rates: Vec<FeeRate> = structures
            .iter()
            .filter_map(|row| {
                Some(FeeRate {
                    fee_category_id: row.first()?.as_i64()?,
                    amount: row.get(1)?.as_i64()?,
                    per_credit: row.get(2).and_then(CellValue::as_bool).unwrap_or(false),
                })
            })
            .collect();

        let semester = conn
            .select_rows(
                "Semesters",
                &["SemesterName"],
                &[("SemesterID", CellValue::Int(scope.semester_id))],
            )
            .await
            .map_err(|e| SeedError::database("reading semester", e))?;
        let semester_name = semester
            .first()
            .and_then(|r| r.first())
            .and_then(|v| v.as_str().map(str::to_string))
            .ok_or_else(|| SeedError::MissingReference {
                table: "Semesters".to_string(),
                key: format!("SemesterID = {}", scope.semester_id),
            })?;

        let totals = Self {
            semester_name,
            ..Self::from_parts(&credits, &rates)
        };
        debug!(
            credits = totals.total_credits,
            tuition = totals.tuition,
            fixed = totals.fixed_fees,
            total = totals.total,
            semester = %totals.semester_name,
            "fee totals read back"
        );
        Ok(totals)
    }
}
