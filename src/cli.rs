//! Command-line interface.
//!
//! - `climtab ingest` - aggregate every configured variable into the table
//! - `climtab date` - convert a day offset to a calendar date
//! - `climtab date-range` - first and last dates of each configured source
//! - `climtab dates` - calendar date of every table row
//! - `climtab sort`, `reorder`, `drop-incomplete`, `drop-blank`, `drop-columns`,
//!   `normalize` - table maintenance
//! - `climtab denormalize` - map a normalized value back to its original scale

use crate::config::IngestConfig;
use crate::pipeline::{ingest, source_ranges, VariableStatus};
use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use climtab_core::dates::{offset_to_date, DATE_FORMAT, DEFAULT_BASELINE};
use climtab_core::maintenance::{self, MinMax};
use climtab_core::persist::{load, save};
use climtab_core::DayTable;
use climtab_sources::JsonArrayDirectory;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

/// Build and maintain a day-indexed table of climate variables.
#[derive(Debug, Parser)]
#[command(name = "climtab")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file.
    #[arg(long, short, global = true, default_value = "climtab.toml")]
    pub config: PathBuf,

    /// Table to operate on instead of the configured one.
    #[arg(long, global = true)]
    pub table: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Aggregate every configured variable and merge it into the table.
    Ingest(IngestArgs),
    /// Print the date `offset` days after a baseline.
    Date(DateArgs),
    /// Print the first and last date of each configured source.
    DateRange(FormatArgs),
    /// List the calendar date of every table row, in day order.
    Dates(FormatArgs),
    /// Sort rows by day.
    Sort(ConfirmArgs),
    /// Put the target field in the last column.
    Reorder(ConfirmArgs),
    /// Remove rows with any empty cell.
    DropIncomplete(ConfirmArgs),
    /// Remove rows whose cells are all empty.
    DropBlank(ConfirmArgs),
    /// Remove the named columns.
    DropColumns(DropColumnsArgs),
    /// Drop incomplete rows and rescale every column to [0, 1].
    Normalize(NormalizeArgs),
    /// Map a normalized value back using the column's original range.
    Denormalize(DenormalizeArgs),
}

#[derive(Debug, Args)]
pub struct IngestArgs {
    /// Print the run report as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct DateArgs {
    /// Days after the baseline; fractions are allowed.
    #[arg(allow_negative_numbers = true)]
    pub offset: f64,
    #[arg(long, default_value = DEFAULT_BASELINE)]
    pub baseline: String,
    #[command(flatten)]
    pub format: FormatArgs,
}

#[derive(Debug, Args)]
pub struct FormatArgs {
    /// strftime pattern used to print dates.
    #[arg(long, default_value = DATE_FORMAT)]
    pub format: String,
}

#[derive(Debug, Args)]
pub struct ConfirmArgs {
    /// Do not ask before rewriting the table.
    #[arg(long, short)]
    pub yes: bool,
}

#[derive(Debug, Args)]
pub struct DropColumnsArgs {
    #[arg(required = true)]
    pub fields: Vec<String>,
    #[command(flatten)]
    pub confirm: ConfirmArgs,
}

#[derive(Debug, Args)]
pub struct NormalizeArgs {
    /// Write the normalized table here and leave the original untouched.
    #[arg(long, short)]
    pub output: Option<PathBuf>,
    #[command(flatten)]
    pub confirm: ConfirmArgs,
}

#[derive(Debug, Args)]
pub struct DenormalizeArgs {
    #[arg(allow_negative_numbers = true)]
    pub value: f64,
    #[arg(long, allow_negative_numbers = true)]
    pub min: f64,
    #[arg(long, allow_negative_numbers = true)]
    pub max: f64,
}

/// Run the parsed command.
pub fn execute(cli: Cli) -> Result<()> {
    match &cli.command {
        Commands::Date(args) => {
            println!("{}", offset_to_date(args.offset, &args.baseline, &args.format.format)?);
            Ok(())
        }
        Commands::Denormalize(args) => {
            println!("{}", maintenance::denormalize(args.value, MinMax::new(args.min, args.max)));
            Ok(())
        }
        Commands::Ingest(args) => run_ingest(&cli.load_config()?, args.json),
        Commands::DateRange(args) => print_ranges(&cli.load_config()?, &args.format),
        Commands::Dates(args) => {
            let config = cli.load_config()?;
            let table = load(&config.table)?;
            for (day, date) in maintenance::row_dates(&table, &config.baseline, &args.format)? {
                println!("{day}\t{date}");
            }
            Ok(())
        }
        Commands::Sort(confirm) => rewrite(&cli, confirm, "Sort rows by day", |table, _| {
            maintenance::sort_by_day(table);
            Ok(())
        }),
        Commands::Reorder(confirm) => rewrite(&cli, confirm, "Move the target field last", |table, config| {
            maintenance::reorder_columns(table, Some(&config.target_field));
            Ok(())
        }),
        Commands::DropIncomplete(confirm) => rewrite(&cli, confirm, "Drop incomplete rows", |table, _| {
            let removed = maintenance::drop_incomplete_rows(table);
            println!("Removed {removed} row(s)");
            Ok(())
        }),
        Commands::DropBlank(confirm) => rewrite(&cli, confirm, "Drop blank rows", |table, _| {
            let removed = maintenance::drop_blank_rows(table);
            println!("Removed {removed} row(s)");
            Ok(())
        }),
        Commands::DropColumns(args) => {
            let prompt = format!("Drop column(s) {}", args.fields.join(", "));
            rewrite(&cli, &args.confirm, &prompt, |table, _| {
                maintenance::drop_columns(table, &args.fields)?;
                Ok(())
            })
        }
        Commands::Normalize(args) => run_normalize(&cli, args),
    }
}

impl Cli {
    fn load_config(&self) -> Result<IngestConfig> {
        let mut config = IngestConfig::from_path(&self.config)
            .with_context(|| format!("loading {}", self.config.display()))?;
        if let Some(table) = &self.table {
            config.table = table.clone();
        }
        Ok(config)
    }
}

fn run_ingest(config: &IngestConfig, json: bool) -> Result<()> {
    let report = ingest(config)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for variable in &report.variables {
            match &variable.status {
                VariableStatus::Merged { days, new_days } => {
                    println!("{:<16} merged {days} day(s), {new_days} new", variable.column)
                }
                VariableStatus::Skipped { reason } => {
                    println!("{:<16} skipped: {reason}", variable.column)
                }
            }
        }
        println!("{} row(s) in {}", report.rows, config.table.display());
    }
    if !report.is_complete() {
        bail!("{} variable(s) were skipped", report.skipped().count());
    }
    Ok(())
}

fn print_ranges(config: &IngestConfig, format: &str) -> Result<()> {
    let reader = JsonArrayDirectory::new(&config.data_dir);
    for (source_id, range) in source_ranges(config, &reader, format) {
        match range {
            Ok(range) => {
                println!("{source_id}: {} - {}", range.first, range.last);
                if let Some(crop) = range.crop {
                    println!("{source_id}: cropped after {crop}");
                }
            }
            Err(e) => println!("{source_id}: {e}"),
        }
    }
    Ok(())
}

fn run_normalize(cli: &Cli, args: &NormalizeArgs) -> Result<()> {
    let config = cli.load_config()?;
    let destination = args.output.clone().unwrap_or_else(|| config.table.clone());
    if args.output.is_none()
        && !confirm(&args.confirm, "Normalize the table in place", &config.table)?
    {
        return Ok(());
    }

    let mut table = load(&config.table)?;
    let removed = maintenance::drop_incomplete_rows(&mut table);
    let ranges = maintenance::normalize(&mut table)?;
    maintenance::reorder_columns(&mut table, Some(&config.target_field));
    save(&table, &destination)?;

    println!("Removed {removed} incomplete row(s)");
    match ranges.get(&config.target_field) {
        Some(range) => println!("{}: min={} max={}", config.target_field, range.min, range.max),
        None => println!("{} is not in the table", config.target_field),
    }
    Ok(())
}

/// Load the table, apply `change` and save it back after confirmation.
fn rewrite(
    cli: &Cli,
    args: &ConfirmArgs,
    action: &str,
    change: impl FnOnce(&mut DayTable, &IngestConfig) -> Result<()>,
) -> Result<()> {
    let config = cli.load_config()?;
    if !confirm(args, action, &config.table)? {
        return Ok(());
    }
    let mut table = load(&config.table)?;
    change(&mut table, &config)?;
    save(&table, &config.table)?;
    Ok(())
}

fn confirm(args: &ConfirmArgs, action: &str, table: &std::path::Path) -> Result<bool> {
    if args.yes {
        return Ok(true);
    }
    let prompt = format!("{action} in {}?", table.display());
    ask(&prompt, io::stdin().lock(), io::stderr())
}

/// Ask a yes/no question; anything other than `y`/`yes` is a no.
fn ask(prompt: &str, mut input: impl BufRead, mut output: impl Write) -> Result<bool> {
    write!(output, "{prompt} [y/N] ")?;
    output.flush()?;
    let mut answer = String::new();
    input.read_line(&mut answer)?;
    let answer = answer.trim().to_ascii_lowercase();
    let accepted = answer == "y" || answer == "yes";
    if !accepted {
        writeln!(output, "Aborted")?;
    }
    Ok(accepted)
}
