// Org Ledger - command line
// Database setup, CSV import, and read-only reports over the shared Store

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use org_ledger::config::{DB_PATH_ENV, DEFAULT_CONFIG_FILE};
use org_ledger::org::OrgNode;
use org_ledger::{logging, Config, Period, Store, TransactionFilter};
use std::path::{Path, PathBuf};
use tracing::error;

#[derive(Parser, Debug)]
#[command(name = "org-ledger", version, about = "Expense ledger and org-chart health")]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database file, overrides the config file
    #[arg(long, global = true, env = DB_PATH_ENV)]
    db: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the database and its tables
    Init,

    /// Import transactions from a CSV file (date,type,amount,category,description,provider)
    Import {
        /// Owner of the imported rows
        #[arg(short, long)]
        user: String,
        file: PathBuf,
    },

    /// Totals, period buckets and category breakdown
    Summary {
        #[arg(short, long)]
        user: String,
        #[arg(short, long, default_value = "month")]
        period: Period,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
    },

    /// Active, overdue and near-due tasks per department
    Health {
        #[arg(short, long)]
        org: String,
    },

    /// Department tree with positions and holders
    Chart {
        #[arg(short, long)]
        org: String,
    },

    /// Write a default config file
    ConfigInit {
        #[arg(default_value = DEFAULT_CONFIG_FILE)]
        path: PathBuf,
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        error!(error = %e, "command failed");
        eprintln!("❌ {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let Cli {
        config,
        db,
        verbose,
        command,
    } = cli;
    let open = || open_store(config.as_deref(), db.clone(), verbose);

    match command {
        // Works before any config exists
        Command::ConfigInit { path, force } => {
            logging::init("info", verbose);
            config_init(&path, force)?;
        }
        Command::Init => {
            let (config, _store) = open()?;
            println!("🗄️  Database ready: {:?}", config.database.path);
            println!("✓ WAL mode enabled, tables created");
        }
        Command::Import { user, file } => run_import(&open()?.1, &user, &file)?,
        Command::Summary {
            user,
            period,
            from,
            to,
        } => run_summary(&open()?.1, &user, period, from, to)?,
        Command::Health { org } => run_health(&open()?.1, &org)?,
        Command::Chart { org } => run_chart(&open()?.1, &org)?,
    }

    Ok(())
}

/// Load config, start logging and open the database
fn open_store(
    config_path: Option<&Path>,
    db: Option<PathBuf>,
    verbose: bool,
) -> Result<(Config, Store)> {
    let mut config = Config::load(config_path)?;
    if let Some(db) = db {
        config.database.path = db;
    }
    logging::init(&config.logging.level, verbose);

    let store = Store::open(&config.database.path)
        .with_context(|| format!("Failed to open database at {:?}", config.database.path))?
        .with_org_config(&config.org);
    Ok((config, store))
}

fn config_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    std::fs::write(path, Config::default_toml())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("✓ Wrote {}", path.display());
    Ok(())
}

fn run_import(store: &Store, user: &str, file: &Path) -> Result<()> {
    println!("📂 Importing {} for {user}...", file.display());
    let report = store.import_csv(user, file)?;
    println!("✓ Inserted {} transactions", report.inserted);
    if report.duplicates > 0 {
        println!("↺ Skipped {} rows already imported", report.duplicates);
    }
    Ok(())
}

fn run_summary(
    store: &Store,
    user: &str,
    period: Period,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<()> {
    let filter = TransactionFilter {
        from,
        to,
        ..TransactionFilter::default()
    };
    let summary = store.summary(user, &filter, period)?;

    println!("📊 Summary for {user}");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("  Income:   {:>12.2}", summary.totals.income);
    println!("  Expenses: {:>12.2}", summary.totals.expense);
    println!("  Balance:  {:>12.2}", summary.totals.balance);
    println!("  Count:    {:>12}", summary.totals.count);

    if !summary.periods.is_empty() {
        println!("\n📅 By {:?}", period);
        for bucket in &summary.periods {
            println!(
                "  {:<10} +{:>10.2}  -{:>10.2}",
                bucket.key, bucket.income, bucket.expense
            );
        }
    }

    if !summary.expense_categories.is_empty() {
        println!("\n💸 Expenses by category");
        for bucket in &summary.expense_categories {
            println!(
                "  {:<16} {:>10.2}  {:>5.1}%  ({})",
                bucket.category, bucket.total, bucket.percentage, bucket.count
            );
        }
    }

    if !summary.income_categories.is_empty() {
        println!("\n💰 Income by category");
        for bucket in &summary.income_categories {
            println!(
                "  {:<16} {:>10.2}  {:>5.1}%  ({})",
                bucket.category, bucket.total, bucket.percentage, bucket.count
            );
        }
    }
    Ok(())
}

fn run_health(store: &Store, org: &str) -> Result<()> {
    let departments = store.list_departments(org)?;
    let health = store.department_health(org, Utc::now())?;

    println!("🏢 Department health for {org}");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    if health.is_empty() {
        println!("  (no departments)");
        return Ok(());
    }

    for (id, h) in &health {
        let name = departments
            .iter()
            .find(|d| &d.id == id)
            .map(|d| d.name.as_str())
            .unwrap_or(id.as_str());
        let marker = if h.overdue_tasks > 0 {
            "🔴"
        } else if h.near_due_tasks > 0 {
            "🟡"
        } else {
            "🟢"
        };
        println!(
            "  {marker} {:<24} active {:>3}  overdue {:>3}  near due {:>3}",
            name, h.active_tasks, h.overdue_tasks, h.near_due_tasks
        );
    }
    Ok(())
}

fn run_chart(store: &Store, org: &str) -> Result<()> {
    let chart = store.org_chart(org, Utc::now())?;

    println!("🌳 Org chart for {org}");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for root in &chart.roots {
        print_node(root, 0);
    }
    if !chart.unassigned_positions.is_empty() {
        println!("\n  Unassigned positions:");
        for node in &chart.unassigned_positions {
            println!("    • {} [{}]", node.position.title, node.holders.join(", "));
        }
    }
    Ok(())
}

fn print_node(node: &OrgNode, depth: usize) {
    let indent = "  ".repeat(depth + 1);
    println!(
        "{indent}{} (active {}, overdue {})",
        node.department.name, node.health.active_tasks, node.health.overdue_tasks
    );
    for position in &node.positions {
        println!("{indent}  • {} [{}]", position.position.title, position.holders.join(", "));
    }
    for child in &node.children {
        print_node(child, depth + 1);
    }
}
