// Seed Data
// The reference plan (departments, classes, semesters) and the demo fee
// scenario for student 1

use chrono::{Duration, Local, NaiveDate, NaiveDateTime};

use crate::db::CellValue;
use crate::seed::fees::FeeScope;
use crate::seed::plan::{Lookup, SeedPlan, SeedRow, SeedStep};

/// Which plan a seed run executes
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum PlanKind {
    /// Departments, classes and semesters with generated keys
    Reference,
    /// The fee scenario for demo student 1 with literal keys
    Demo,
    /// Reference, then demo
    All,
}

impl PlanKind {
    pub fn build(self, clock: &SeedClock) -> SeedPlan {
        match self {
            PlanKind::Reference => reference_plan(),
            PlanKind::Demo => demo_plan(clock),
            PlanKind::All => reference_plan().then(demo_plan(clock)),
        }
    }
}

/// Timestamps written by the demo plan, fixed for the length of a run
#[derive(Debug, Clone, Copy)]
pub struct SeedClock {
    pub now: NaiveDateTime,
}

impl SeedClock {
    pub fn system() -> Self {
        Self {
            now: Local::now().naive_local(),
        }
    }

    pub fn fixed(now: NaiveDateTime) -> Self {
        Self { now }
    }

    pub fn days_from_now(&self, days: i64) -> NaiveDate {
        (self.now + Duration::days(days)).date()
    }
}

fn date(year: i32, month: u32, day: u32) -> CellValue {
    NaiveDate::from_ymd_opt(year, month, day)
        .map(CellValue::Date)
        .unwrap_or(CellValue::Null)
}

pub const REFERENCE_DEPARTMENTS: [(&str, &str); 4] = [
    ("CNTT", "Khoa CNTT & TT"),
    ("QTKD", "Khoa Quản Trị Và Kinh Doanh"),
    ("NNH", "Khoa Ngôn Ngữ Hàn"),
    ("NNN", "Khoa Ngôn Ngữ Nhật"),
];

pub const INTAKE_YEARS: std::ops::RangeInclusive<i32> = 2023..=2026;
pub const CLASS_LETTERS: [char; 3] = ['A', 'B', 'C'];
pub const ACADEMIC_YEARS: [(i32, i32); 3] = [(2023, 2024), (2024, 2025), (2025, 2026)];
pub const ACTIVE_ACADEMIC_YEAR: (i32, i32) = (2023, 2024);

pub fn reference_plan() -> SeedPlan {
    let departments = REFERENCE_DEPARTMENTS
        .iter()
        .map(|(code, name)| {
            SeedRow::new()
                .key("DepartmentCode", *code)
                .value("DepartmentName", *name)
        })
        .collect();

    let mut classes = Vec::new();
    for (code, name) in REFERENCE_DEPARTMENTS {
        for year in INTAKE_YEARS {
            for letter in CLASS_LETTERS {
                classes.push(
                    SeedRow::new()
                        .key("ClassCode", format!("{}{:02}{}", code, year % 100, letter))
                        .value("ClassName", format!("{} - Khóa {} - Lớp {}", name, year, letter))
                        .lookup(
                            "DepartmentID",
                            Lookup::new("Departments", "DepartmentID", "DepartmentCode", code),
                        ),
                );
            }
        }
    }

    let mut semesters = Vec::new();
    for (start, end) in ACADEMIC_YEARS {
        let academic_year = format!("{}-{}", start, end);
        let active = (start, end) == ACTIVE_ACADEMIC_YEAR;
        semesters.push(
            SeedRow::new()
                .key("SemesterName", format!("Học kỳ 1 {}", academic_year))
                .value("StartDate", date(start, 8, 15))
                .value("EndDate", date(start, 12, 31))
                .value("AcademicYear", academic_year.clone())
                .value("IsActive", active),
        );
        semesters.push(
            SeedRow::new()
                .key("SemesterName", format!("Học kỳ 2 {}", academic_year))
                .value("StartDate", date(end, 1, 15))
                .value("EndDate", date(end, 5, 31))
                .value("AcademicYear", academic_year)
                .value("IsActive", active),
        );
    }

    SeedPlan::new("reference")
        .step(SeedStep::new("departments", "Departments").rows(departments))
        .step(
            SeedStep::new("classes", "Classes")
                .references(&["Departments"])
                .rows(classes),
        )
        .step(SeedStep::new("semesters", "Semesters").rows(semesters))
}

pub const DEMO_STUDENT_ID: i64 = 1;
pub const DEMO_SEMESTER_ID: i64 = 1;
pub const DEMO_DEPARTMENT_ID: i64 = 1;
pub const DEMO_SEMESTER_NAME: &str = "Spring 2023";

/// (id, name, description)
const FEE_CATEGORIES: [(i64, &str, &str); 4] = [
    (1, "Tuition Fee", "Regular course tuition fees"),
    (2, "Library Fee", "Access to library resources"),
    (3, "Laboratory Fee", "Use of laboratory facilities"),
    (4, "Student Activities", "Student clubs and events"),
];

/// (id, fee category, amount, per credit)
const FEE_STRUCTURES: [(i64, i64, i64, bool); 4] = [
    (1, 1, 5_000_000, true),
    (2, 2, 500_000, false),
    (3, 3, 1_000_000, false),
    (4, 4, 300_000, false),
];

/// (id, code, name, credits)
const COURSES: [(i64, &str, &str, i64); 4] = [
    (1, "CS101", "Introduction to Programming", 3),
    (2, "CS102", "Data Structures and Algorithms", 4),
    (3, "CS201", "Database Systems", 3),
    (4, "CS202", "Web Development", 3),
];

const PAYMENT_METHODS: [(i64, &str, &str); 3] = [
    (1, "Credit Card", "Payment via credit card"),
    (2, "Bank Transfer", "Payment via bank transfer"),
    (3, "Cash", "Payment in cash at the cashier"),
];

pub fn demo_plan(clock: &SeedClock) -> SeedPlan {
    let now = clock.now;
    let due_date = clock.days_from_now(30);
    let payment_date = clock.days_from_now(-7);

    let users = SeedRow::new()
        .key("UserID", DEMO_STUDENT_ID)
        .value("Email", "student1@example.com")
        .value("Password", "hashed_password")
        .value("FullName", "John Smith")
        .value("PhoneNumber", "0987654321")
        .value("UserType", "Student")
        .value("IsActive", true)
        .value("RegistrationDate", now)
        .value("LastLogin", now);

    let students = SeedRow::new()
        .key("UserID", DEMO_STUDENT_ID)
        .value("StudentID", DEMO_STUDENT_ID)
        .value("StudentCode", "ST001")
        .value("DepartmentID", DEMO_DEPARTMENT_ID)
        .value("ClassID", 1)
        .value("EnrollmentYear", 2023)
        .value("CurrentSemester", 2);

    let fee_categories = FEE_CATEGORIES
        .iter()
        .map(|(id, name, description)| {
            SeedRow::new()
                .key("FeeCategoryID", *id)
                .value("CategoryName", *name)
                .value("Description", *description)
                .value("IsActive", true)
        })
        .collect();

    let fee_structures = FEE_STRUCTURES
        .iter()
        .map(|(id, category, amount, per_credit)| {
            SeedRow::new()
                .key("DepartmentID", DEMO_DEPARTMENT_ID)
                .key("SemesterID", DEMO_SEMESTER_ID)
                .key("FeeCategoryID", *category)
                .value("FeeStructureID", *id)
                .value("Amount", *amount)
                .value("PerCredit", *per_credit)
                .value("CreatedDate", now)
                .value("LastUpdated", now)
        })
        .collect();

    let courses = COURSES
        .iter()
        .map(|(id, code, name, credits)| {
            SeedRow::new()
                .key("CourseID", *id)
                .value("CourseCode", *code)
                .value("CourseName", *name)
                .value("Credits", *credits)
                .value("DepartmentID", DEMO_DEPARTMENT_ID)
                .value("IsActive", true)
        })
        .collect();

    let enrollments = COURSES
        .iter()
        .map(|(id, ..)| {
            SeedRow::new()
                .key("StudentID", DEMO_STUDENT_ID)
                .key("CourseID", *id)
                .key("SemesterID", DEMO_SEMESTER_ID)
                .value("StudentCourseID", *id)
                .value("RegistrationDate", now)
        })
        .collect();

    let payment_methods = PAYMENT_METHODS
        .iter()
        .map(|(id, name, description)| {
            SeedRow::new()
                .key("PaymentMethodID", *id)
                .value("MethodName", *name)
                .value("Description", *description)
                .value("IsActive", true)
        })
        .collect();

    SeedPlan::new("demo")
        .fee_scope(FeeScope {
            student_id: DEMO_STUDENT_ID,
            semester_id: DEMO_SEMESTER_ID,
            department_id: DEMO_DEPARTMENT_ID,
        })
        .step(
            SeedStep::new("departments", "Departments")
                .explicit_identity("DepartmentID")
                .rows(vec![SeedRow::new()
                    .key("DepartmentID", DEMO_DEPARTMENT_ID)
                    .value("DepartmentName", "Computer Science")
                    .value("DepartmentCode", "CS")]),
        )
        .step(
            SeedStep::new("classes", "Classes")
                .explicit_identity("ClassID")
                .references(&["Departments"])
                .rows(vec![SeedRow::new()
                    .key("ClassID", 1)
                    .value("ClassName", "CS2023A")
                    .value("ClassCode", "CS23A")
                    .value("DepartmentID", DEMO_DEPARTMENT_ID)]),
        )
        .step(
            SeedStep::new("users", "Users")
                .explicit_identity("UserID")
                .rows(vec![users]),
        )
        .step(
            SeedStep::new("students", "Students")
                .explicit_identity("StudentID")
                .references(&["Users", "Departments", "Classes"])
                .rows(vec![students]),
        )
        .step(
            SeedStep::new("semesters", "Semesters")
                .explicit_identity("SemesterID")
                .rows(vec![SeedRow::new()
                    .key("SemesterID", DEMO_SEMESTER_ID)
                    .value("SemesterName", DEMO_SEMESTER_NAME)
                    .value("StartDate", date(2023, 1, 15))
                    .value("EndDate", date(2023, 5, 30))
                    .value("AcademicYear", "2022-2023")
                    .value("IsActive", true)]),
        )
        .step(
            SeedStep::new("fee categories", "FeeCategories")
                .explicit_identity("FeeCategoryID")
                .rows(fee_categories),
        )
        .step(
            SeedStep::new("fee structures", "FeeStructures")
                .explicit_identity("FeeStructureID")
                .references(&["Departments", "Semesters", "FeeCategories"])
                .rows(fee_structures),
        )
        .step(
            SeedStep::new("courses", "Courses")
                .explicit_identity("CourseID")
                .references(&["Departments"])
                .rows(courses),
        )
        .step(
            SeedStep::new("enrollments", "StudentCourses")
                .explicit_identity("StudentCourseID")
                .references(&["Students", "Courses", "Semesters"])
                .rows(enrollments),
        )
        .step(
            SeedStep::new("fee records", "StudentFees")
                .explicit_identity("StudentFeeID")
                .references(&["Students", "Semesters", "StudentCourses", "FeeStructures"])
                .derived(move |totals| {
                    vec![SeedRow::new()
                        .key("StudentID", DEMO_STUDENT_ID)
                        .key("SemesterID", DEMO_SEMESTER_ID)
                        .value("StudentFeeID", 1)
                        .value("TotalAmount", totals.total)
                        .value("DueDate", due_date)
                        .value("Status", "Partially Paid")
                        .value("CreatedDate", now)
                        .value("LastUpdated", now)]
                }),
        )
        .step(
            SeedStep::new("fee details", "StudentFeeDetails")
                .explicit_identity("StudentFeeDetailID")
                .references(&["StudentFees", "FeeCategories"])
                .derived(|totals| {
                    totals
                        .lines
                        .iter()
                        .enumerate()
                        .map(|(i, line)| {
                            SeedRow::new()
                                .key("StudentFeeDetailID", i as i64 + 1)
                                .value("StudentFeeID", 1)
                                .value("FeeCategoryID", line.fee_category_id)
                                .value("Amount", line.amount)
                        })
                        .collect()
                }),
        )
        .step(
            SeedStep::new("payment methods", "PaymentMethods")
                .explicit_identity("PaymentMethodID")
                .rows(payment_methods),
        )
        .step(
            SeedStep::new("payments", "Payments")
                .explicit_identity("PaymentID")
                .references(&["StudentFees", "PaymentMethods"])
                .derived(move |totals| {
                    vec![SeedRow::new()
                        .key("PaymentID", 1)
                        .value("StudentFeeID", 1)
                        .value("PaymentMethodID", 2)
                        .value("Amount", payment_amount(totals.total))
                        .value("TransactionID", "TRX000001")
                        .value("PaymentDate", payment_date)
                        .value("Status", "Success")
                        .value("PaymentReference", "First payment")]
                }),
        )
        .step(
            SeedStep::new("invoices", "Invoices")
                .explicit_identity("InvoiceID")
                .references(&["Payments"])
                .rows(vec![SeedRow::new()
                    .key("InvoiceID", 1)
                    .value("PaymentID", 1)
                    .value("InvoiceNumber", "INV0001")
                    .value("InvoiceDate", payment_date)
                    .value("InvoicePath", "/invoices/INV0001.pdf")
                    .value("SentToEmail", true)]),
        )
        .step(
            SeedStep::new("notifications", "Notifications")
                .explicit_identity("NotificationID")
                .references(&["Users", "Payments"])
                .derived(move |totals| {
                    vec![SeedRow::new()
                        .key("NotificationID", 1)
                        .value("UserID", DEMO_STUDENT_ID)
                        .value("Title", "Payment Received")
                        .value(
                            "Message",
                            format!(
                                "We have received your payment of {} VND for the {} semester.",
                                payment_amount(totals.total),
                                totals.semester_name
                            ),
                        )
                        .value("NotificationType", "Email")
                        .value("SentDate", payment_date)
                        .value("IsRead", false)]
                }),
        )
}

/// The demo payment covers half of the fee record
pub fn payment_amount(total: i64) -> i64 {
    total / 2
}
