//! Command line front end for the approval engine

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use municipal_approval::budget::{ActivityConstraint, BudgetRow, BudgetType};
use municipal_approval::code::CodeInputs;
use municipal_approval::config::Config;
use municipal_approval::service::TransactionService;
use municipal_approval::transaction::{Transaction, TransactionDraft};
use municipal_approval::types::Actor;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "municipal-approval")]
#[command(version)]
#[command(about = "Multi-level approval, unique codes and budget eligibility for municipal transactions", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Filter a JSON array of budget rows by activity constraint and search term
    Filter {
        #[arg(long)]
        rows: PathBuf,
        /// LIKE pattern on the budget code, e.g. 11%
        #[arg(long)]
        pattern: Option<String>,
        #[arg(long, value_delimiter = ',')]
        types: Vec<BudgetType>,
        #[arg(long)]
        search: Option<String>,
    },
    /// Show the code preview for whatever segments are known
    Preview(CodeArgs),
    /// Persist a transaction, assign its unique code and enter the initial status
    Submit {
        #[command(flatten)]
        code: CodeArgs,
        #[arg(long)]
        amount: u64,
        #[command(flatten)]
        actor: ActorArgs,
    },
    /// Move a draft into PENDING_L1
    SubmitDraft {
        #[arg(long)]
        id: String,
        #[arg(long)]
        version: u64,
        #[command(flatten)]
        actor: ActorArgs,
    },
    Approve {
        #[arg(long)]
        id: String,
        #[arg(long)]
        version: u64,
        #[command(flatten)]
        actor: ActorArgs,
    },
    Reject {
        #[arg(long)]
        id: String,
        #[arg(long)]
        version: u64,
        #[arg(long)]
        reason: String,
        #[command(flatten)]
        actor: ActorArgs,
    },
    Book {
        #[arg(long)]
        id: String,
        #[arg(long)]
        version: u64,
        #[command(flatten)]
        actor: ActorArgs,
    },
    /// Print a transaction and its history
    Show {
        #[arg(long)]
        id: String,
    },
    List,
}

#[derive(Args, Debug)]
struct ActorArgs {
    #[arg(long = "actor")]
    actor_id: String,
    #[arg(long, default_value_t = 0)]
    level: u8,
}

impl ActorArgs {
    fn actor(&self) -> anyhow::Result<Actor> {
        Ok(Actor::new(self.actor_id.clone(), self.level)?)
    }
}

#[derive(Args, Debug, Default)]
struct CodeArgs {
    #[arg(long)]
    zone: Option<String>,
    #[arg(long)]
    department: Option<String>,
    #[arg(long)]
    section: Option<String>,
    #[arg(long)]
    budget_code: Option<String>,
    #[arg(long)]
    cost_center: Option<String>,
    #[arg(long)]
    continuous_action: Option<String>,
    #[arg(long)]
    special_activity: Option<String>,
    #[arg(long)]
    beneficiary: Option<String>,
    #[arg(long)]
    financial_event: Option<String>,
    #[arg(long)]
    fiscal_year: Option<u16>,
}

impl From<CodeArgs> for CodeInputs {
    fn from(args: CodeArgs) -> Self {
        CodeInputs {
            zone: args.zone,
            department: args.department,
            section: args.section,
            budget_code: args.budget_code,
            cost_center: args.cost_center,
            continuous_action: args.continuous_action,
            special_activity: args.special_activity,
            beneficiary_name: args.beneficiary,
            financial_event: args.financial_event,
            fiscal_year: args.fiscal_year,
        }
    }
}

fn open_service(config: Config) -> anyhow::Result<TransactionService> {
    let db = sled::open(&config.storage.path)
        .with_context(|| format!("failed to open database {}", config.storage.path.display()))?;
    Ok(TransactionService::new(Arc::new(db), config)?)
}

fn print_transaction(txn: &Transaction) {
    println!("id:      {}", txn.id);
    println!(
        "code:    {}",
        txn.unique_code
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "(not assigned)".into())
    );
    println!("status:  {}", txn.outcome());
    println!("amount:  {}", txn.details.amount);
    if let Some(reason) = &txn.rejection_reason {
        println!("reason:  {reason}");
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config = Config::load_or_default(&cli.config)?;

    match cli.command {
        Command::Filter {
            rows,
            pattern,
            types,
            search,
        } => {
            let raw = std::fs::read_to_string(&rows)
                .with_context(|| format!("failed to read {}", rows.display()))?;
            let rows: Vec<BudgetRow> = serde_json::from_str(&raw)
                .with_context(|| format!("{} is not a JSON array of budget rows", rows.display()))?;
            for row in &rows {
                row.validate()?;
            }
            let constraint = ActivityConstraint {
                budget_code_pattern: pattern,
                allowed_budget_types: types,
            };
            let eligible =
                municipal_approval::matcher::filter_budgets(&rows, Some(&constraint), search.as_deref())?;
            let threshold = config.budget.low_threshold_percent;
            for row in eligible {
                println!(
                    "{:<10} {:<8} {:>14} {:>14} {:>6.1}% {:?} {}",
                    row.code,
                    row.budget_type.map(|t| t.to_string()).unwrap_or_else(|| "-".into()),
                    row.allocated,
                    row.remaining,
                    row.utilization_percent(),
                    row.status(threshold),
                    row.description
                );
            }
        }
        Command::Preview(args) => {
            println!("{}", municipal_approval::code::preview_code(&args.into()));
        }
        Command::Submit {
            code,
            amount,
            actor,
        } => {
            let service = open_service(config)?;
            let draft = TransactionDraft::new()
                .set_amount(amount)
                .set_inputs(code.into());
            let txn = service.submit(&draft, &actor.actor()?)?;
            service.flush()?;
            print_transaction(&txn);
        }
        Command::SubmitDraft { id, version, actor } => {
            let service = open_service(config)?;
            let txn = service.submit_for_approval(&id, &actor.actor()?, version)?;
            service.flush()?;
            print_transaction(&txn);
        }
        Command::Approve { id, version, actor } => {
            let service = open_service(config)?;
            let txn = service.approve(&id, &actor.actor()?, version)?;
            service.flush()?;
            print_transaction(&txn);
        }
        Command::Reject {
            id,
            version,
            reason,
            actor,
        } => {
            let service = open_service(config)?;
            let txn = service.reject(&id, &actor.actor()?, &reason, version)?;
            service.flush()?;
            print_transaction(&txn);
        }
        Command::Book { id, version, actor } => {
            let service = open_service(config)?;
            let txn = service.book(&id, &actor.actor()?, version)?;
            service.flush()?;
            print_transaction(&txn);
        }
        Command::Show { id } => {
            let service = open_service(config)?;
            let txn = service.get(&id)?;
            print_transaction(&txn);
            println!("history:");
            for line in txn.describe_history() {
                println!("  {line}");
            }
        }
        Command::List => {
            let service = open_service(config)?;
            for txn in service.list()? {
                println!(
                    "{} {} {}",
                    txn.id,
                    txn.unique_code
                        .as_ref()
                        .map(ToString::to_string)
                        .unwrap_or_else(|| "-".into()),
                    txn.outcome()
                );
            }
        }
    }

    Ok(())
}
