// CLI Command Handlers
// Argument definitions and the seed / inspect / edit handlers, each running
// inside one scoped database session

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use futures::FutureExt;
use tracing::{debug, info};

use crate::config::{PartialSeederConfig, SeederConfig};
use crate::db::{with_session, ColumnInfo, ConnectionConfig, SchemaInspector};
use crate::edit::{render_row, EditOutcome, EditRequest, RowEditor, RustylinePrompt};
use crate::seed::{PlanKind, SeedClock, SeedReport, Seeder, SeederOptions};

#[derive(Parser, Debug)]
#[command(name = "fee-seeder", author, version, about, long_about = None)]
pub struct Cli {
    /// TOML config file; missing files are ignored
    #[arg(long, global = true, env = "SEEDER_CONFIG", default_value = "seeder.toml")]
    pub config: PathBuf,

    #[arg(long, global = true)]
    pub host: Option<String>,

    #[arg(long, global = true)]
    pub port: Option<u16>,

    #[arg(long, global = true)]
    pub database: Option<String>,

    #[arg(long = "user", global = true)]
    pub username: Option<String>,

    /// Driver candidate, in the order to try (repeatable)
    #[arg(long = "driver", global = true)]
    pub drivers: Vec<String>,

    #[arg(long, global = true)]
    pub connect_retries: Option<u32>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    /// Command-line layer of the config; the password is never taken here
    pub fn overrides(&self) -> PartialSeederConfig {
        PartialSeederConfig {
            host: self.host.clone(),
            port: self.port,
            database: self.database.clone(),
            username: self.username.clone(),
            drivers: Some(self.drivers.clone()),
            connect_retries: self.connect_retries,
            ..Default::default()
        }
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Insert reference and demo rows that are not present yet (default)
    Seed(SeedArgs),
    /// List tables and describe their columns
    Inspect(InspectArgs),
    /// Change the type/role column of one row
    Edit(EditArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct SeedArgs {
    #[arg(long, value_enum, default_value_t = PlanKind::All)]
    pub plan: PlanKind,

    /// Run the whole plan in one transaction
    #[arg(long)]
    pub transaction: bool,

    #[arg(long)]
    pub skip_schema_check: bool,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

impl Default for SeedArgs {
    fn default() -> Self {
        Self {
            plan: PlanKind::All,
            transaction: false,
            skip_schema_check: false,
            format: OutputFormat::Text,
        }
    }
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct InspectArgs {
    /// Describe only this table
    #[arg(long)]
    pub table: Option<String>,

    /// Number of tables to describe when no table is given
    #[arg(long, default_value_t = 5)]
    pub limit: usize,
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct EditArgs {
    /// Pick the table and columns interactively
    #[arg(long)]
    pub interactive: bool,

    #[arg(long, default_value = "Users")]
    pub table: String,

    /// Identifier column; guessed when empty
    #[arg(long, default_value = "UserID")]
    pub id_column: String,

    /// Type/role column; guessed when empty
    #[arg(long, default_value = "UserType")]
    pub type_column: String,

    #[arg(long, default_value = "1")]
    pub id: String,

    #[arg(long, default_value = "Accountant")]
    pub value: String,

    /// Do not ask for confirmation
    #[arg(long)]
    pub yes: bool,
}

impl EditArgs {
    pub fn request(&self) -> EditRequest {
        let named = |s: &str| Some(s.trim().to_string()).filter(|s| !s.is_empty());
        EditRequest {
            table: self.table.clone(),
            id_column: named(&self.id_column),
            type_column: named(&self.type_column),
            id: self.id.clone(),
            value: self.value.clone(),
            assume_yes: self.yes,
        }
    }
}

/// Load config, then dispatch to the chosen command
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = SeederConfig::load(Some(cli.config.as_path()), cli.overrides())?;
    debug!(?config, "configuration loaded");
    let connection = config.connection_config()?;

    match cli.command.unwrap_or_else(|| Command::Seed(SeedArgs::default())) {
        Command::Seed(args) => seed(&connection, args).await,
        Command::Inspect(args) => inspect(&connection, args).await,
        Command::Edit(args) => edit(&connection, args).await,
    }
}

fn print_report(report: &SeedReport, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Text => println!("{}", report.render_text()),
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(report).context("Failed to serialize seed report")?
        ),
    }
    Ok(())
}

pub async fn seed(config: &ConnectionConfig, args: SeedArgs) -> anyhow::Result<()> {
    let plan = args.plan.build(&SeedClock::system());
    let options = SeederOptions {
        transaction: args.transaction,
        verify_schema: !args.skip_schema_check,
    };
    info!(plan = %plan.name, steps = plan.steps.len(), transaction = options.transaction, "Seeding");

    let result = with_session(config, move |session| {
        async move { Ok::<_, anyhow::Error>(Seeder::new(session, options).run(&plan).await) }
            .boxed_local()
    })
    .await?;

    match result {
        Ok(report) => print_report(&report, args.format),
        Err(abort) => {
            eprintln!("Seed run aborted; completed steps:");
            print_report(&abort.report, args.format)?;
            Err(abort.into())
        }
    }
}

/// `name type(len) NULL|NOT NULL [IDENTITY]`
pub fn describe_column(column: &ColumnInfo) -> String {
    let data_type = match column.max_length {
        Some(-1) => format!("{}(max)", column.data_type),
        Some(len) => format!("{}({})", column.data_type, len),
        None => column.data_type.clone(),
    };
    format!(
        "{} {} {}{}",
        column.name,
        data_type,
        if column.is_nullable { "NULL" } else { "NOT NULL" },
        if column.is_identity { " IDENTITY" } else { "" }
    )
}

pub async fn inspect(config: &ConnectionConfig, args: InspectArgs) -> anyhow::Result<()> {
    with_session(config, move |session| {
        async move {
            let mut inspector = SchemaInspector::new(session);
            let tables = inspector.list_tables().await?;

            println!("Tables:");
            for table in &tables {
                println!("  {}", table.qualified_name());
            }
            println!("Total: {} tables", tables.len());

            let selected: Vec<String> = match args.table {
                Some(table) => vec![table],
                None => tables
                    .iter()
                    .take(args.limit)
                    .map(|t| t.qualified_name())
                    .collect(),
            };
            for table in selected {
                let columns = inspector.describe_table(&table).await?;
                println!("\nColumns of {}:", table);
                for column in &columns {
                    println!("  {}", describe_column(column));
                }
            }
            Ok::<_, anyhow::Error>(())
        }
        .boxed_local()
    })
    .await
}

pub async fn edit(config: &ConnectionConfig, args: EditArgs) -> anyhow::Result<()> {
    let request = args.request();
    let interactive = args.interactive;

    let outcome = with_session(config, move |session| {
        async move {
            let mut editor = RowEditor::new(session);
            let outcome = if interactive {
                let mut prompt = RustylinePrompt::new()?;
                editor.edit_interactive(&request, &mut prompt).await?
            } else {
                editor.edit(&request).await?
            };
            Ok::<_, anyhow::Error>(outcome)
        }
        .boxed_local()
    })
    .await?;

    match outcome {
        EditOutcome::Updated {
            target,
            before,
            after,
            affected,
        } => {
            for row in &before {
                println!("Before: {}", render_row(row));
            }
            println!("Updated {} row(s) of {}", affected, target.table);
            for row in &after {
                println!("After:  {}", render_row(row));
            }
            Ok(())
        }
        EditOutcome::NotFound { target, id } => {
            bail!("No row in {} where {} = {}", target.table, target.id_column, id)
        }
        EditOutcome::Cancelled => {
            println!("Update cancelled");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_subcommand_means_seed() {
        let cli = Cli::try_parse_from(["fee-seeder"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.config, PathBuf::from("seeder.toml"));
    }

    #[test]
    fn test_seed_flags() {
        let cli = Cli::try_parse_from([
            "fee-seeder",
            "seed",
            "--plan",
            "demo",
            "--transaction",
            "--format",
            "json",
        ])
        .unwrap();
        match cli.command {
            Some(Command::Seed(args)) => {
                assert_eq!(args.plan, PlanKind::Demo);
                assert!(args.transaction);
                assert!(!args.skip_schema_check);
                assert_eq!(args.format, OutputFormat::Json);
            }
            other => panic!("expected seed, got {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_become_overrides() {
        let cli = Cli::try_parse_from([
            "fee-seeder",
            "inspect",
            "--host",
            "db.internal",
            "--driver",
            "plaintext",
            "--driver",
            "tls-required",
        ])
        .unwrap();
        let overrides = cli.overrides();
        assert_eq!(overrides.host.as_deref(), Some("db.internal"));
        assert_eq!(
            overrides.drivers,
            Some(vec!["plaintext".to_string(), "tls-required".to_string()])
        );
        assert!(overrides.password.is_none());
    }

    #[test]
    fn test_edit_defaults() {
        let cli = Cli::try_parse_from(["fee-seeder", "edit"]).unwrap();
        let Some(Command::Edit(args)) = cli.command else {
            panic!("expected edit");
        };
        assert_eq!(args.request(), EditRequest::default());
    }

    #[test]
    fn test_empty_column_flags_mean_guess() {
        let cli = Cli::try_parse_from(["fee-seeder", "edit", "--table", "Staff", "--id-column", ""]).unwrap();
        let Some(Command::Edit(args)) = cli.command else {
            panic!("expected edit");
        };
        let request = args.request();
        assert_eq!(request.table, "Staff");
        assert_eq!(request.id_column, None);
        assert_eq!(request.type_column.as_deref(), Some("UserType"));
    }

    #[test]
    fn test_describe_column() {
        let mut column = ColumnInfo::new("Email", "nvarchar");
        column.max_length = Some(255);
        assert_eq!(describe_column(&column), "Email nvarchar(255) NULL");

        let id = ColumnInfo::new("UserID", "int").identity();
        assert_eq!(describe_column(&id), "UserID int NOT NULL IDENTITY");
    }
}
