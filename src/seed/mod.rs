// Seed Module
// Seed plans, fee derivation and the idempotent seeder

pub mod data;
pub mod fees;
pub mod plan;
pub mod report;
pub mod seeder;

pub use data::{PlanKind, SeedClock};
pub use fees::{FeeLine, FeeScope, FeeTotals};
pub use plan::{Lookup, RowSource, SeedPlan, SeedRow, SeedStep, SeedValue};
pub use report::{SeedAbort, SeedReport, StepReport};
pub use seeder::{IdentityScope, Seeder, SeederOptions};
