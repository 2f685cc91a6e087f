//! Xpanel - proxy engine settings manager
//!
//! Usage:
//!   xpanel apply settings.json   # Reconcile an edited document
//!   xpanel show                  # Print the combined document
//!   xpanel outbound list         # Form-channel operations

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use console::style;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use xpanel_core::document::{self, ConfigEntry};
use xpanel_core::prelude::*;
use xpanel_core::reconcile::build_outbound;

const DEFAULT_LOG_FILTER: &str = "xpanel=info,warn";

#[derive(Parser)]
#[command(name = "xpanel")]
#[command(about = "Proxy engine settings manager", long_about = None)]
struct Cli {
    /// Path to xpanel.toml (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply an advanced-settings document
    ///
    /// Entries whose tag the stored template already owns stay in the
    /// template. Complete, tagged entries become managed records; managed
    /// records missing from the document are deleted.
    Apply {
        /// Document file, or '-' for stdin
        file: String,

        /// Output format
        #[arg(short = 'o', long, default_value = "table")]
        format: OutputFormat,
    },

    /// Print the combined document (template plus managed records)
    Show,

    /// Print the stored template
    Template,

    /// Check a document without applying it
    Check {
        /// Document file, or '-' for stdin
        file: String,
    },

    /// Inspect managed inbounds
    Inbound(InboundArgs),

    /// Manage outbounds
    Outbound(OutboundArgs),
}

#[derive(Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// Machine-readable JSON
    Json,
}

#[derive(Args)]
struct InboundArgs {
    #[command(subcommand)]
    command: InboundSubcommand,
}

#[derive(Subcommand)]
enum InboundSubcommand {
    /// List managed inbounds
    List {
        /// Output format
        #[arg(short = 'o', long, default_value = "table")]
        format: OutputFormat,
    },

    /// List managed inbound tags
    Tags,
}

#[derive(Args)]
struct OutboundArgs {
    #[command(subcommand)]
    command: OutboundSubcommand,
}

#[derive(Subcommand)]
enum OutboundSubcommand {
    /// List managed outbounds
    List {
        /// Only enabled outbounds
        #[arg(long)]
        enabled: bool,

        /// Output format
        #[arg(short = 'o', long, default_value = "table")]
        format: OutputFormat,
    },

    /// List managed outbound tags
    Tags,

    /// Print one outbound as a document entry
    Show {
        /// Outbound tag
        tag: String,
    },

    /// Add an outbound from a JSON entry
    Add {
        /// File holding one outbound object, or '-' for stdin
        file: String,
    },

    /// Remove an outbound
    #[command(alias = "rm")]
    Remove {
        /// Outbound tag
        tag: String,
    },

    /// Enable an outbound
    Enable {
        /// Outbound tag
        tag: String,
    },

    /// Disable an outbound (it stays stored but leaves the engine document)
    Disable {
        /// Outbound tag
        tag: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => PanelConfig::load(path)?,
        None => PanelConfig::load_default()?,
    };

    // Initialize tracing
    let default_filter = config
        .log_filter
        .clone()
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let ctx = AppContext::from_config(&config)?;
    tracing::debug!("Using database {}", ctx.database_path().display());

    run_cli(&ctx, cli.command)
}

fn run_cli(ctx: &AppContext, command: Commands) -> Result<()> {
    match command {
        Commands::Apply { file, format } => run_apply(ctx, &file, format),
        Commands::Show => {
            let document = ctx.reconciler().assemble()?;
            println!("{}", document::encode(&document)?);
            Ok(())
        }
        Commands::Template => {
            let template = ctx.reconciler().stored_template()?;
            println!("{}", document::encode(&template)?);
            Ok(())
        }
        Commands::Check { file } => {
            let raw = read_input(&file)?;
            ctx.reconciler().check(&raw)?;
            println!("{} Document is valid", style("✓").green());
            Ok(())
        }
        Commands::Inbound(args) => run_inbound(ctx, args.command),
        Commands::Outbound(args) => run_outbound(ctx, args.command),
    }
}

/// Read a file, or stdin when `file` is `-`.
fn read_input(file: &str) -> Result<String> {
    if file == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read stdin")?;
        return Ok(text);
    }
    let path = Path::new(file);
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn run_apply(ctx: &AppContext, file: &str, format: OutputFormat) -> Result<()> {
    let raw = read_input(file)?;
    let report = ctx.reconciler().apply(&raw)?;

    match format {
        OutputFormat::Table => {
            println!("{} Applied advanced settings", style("✓").green());
            let template = if report.template_changed {
                style("changed").yellow()
            } else {
                style("unchanged").dim()
            };
            println!("  Template:  {}", template);
            println!("  Inbounds:  {}", describe_sync(&report.inbounds));
            println!("  Outbounds: {}", describe_sync(&report.outbounds));

            for entry in &report.demoted {
                println!(
                    "  {} Kept {} '{}' in template: {}",
                    style("⚠").yellow(),
                    entry.kind,
                    entry.tag,
                    entry.reason
                );
            }

            if report.needs_restart() {
                println!("  {}", style("Proxy engine restart required").bold());
            }
        }
        OutputFormat::Json => {
            let mut output = serde_json::to_value(&report)?;
            if let Some(object) = output.as_object_mut() {
                object.insert(
                    "needs_restart".to_string(),
                    serde_json::Value::Bool(report.needs_restart()),
                );
            }
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

fn describe_sync(report: &SyncReport) -> String {
    format!(
        "{} created, {} updated, {} deleted, {} unchanged",
        report.created, report.updated, report.deleted, report.unchanged
    )
}

fn run_inbound(ctx: &AppContext, command: InboundSubcommand) -> Result<()> {
    let service = ctx.inbound_service();
    match command {
        InboundSubcommand::List { format } => {
            let inbounds = service.list()?;
            match format {
                OutputFormat::Table => print_inbound_table(&inbounds),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&inbounds)?),
            }
        }
        InboundSubcommand::Tags => {
            for tag in service.tags()? {
                println!("{tag}");
            }
        }
    }
    Ok(())
}

fn print_inbound_table(inbounds: &[Inbound]) {
    if inbounds.is_empty() {
        println!("No managed inbounds");
        return;
    }
    println!(
        "{}",
        style(format!(
            "{:<5} {:<20} {:<14} {:<6} {:<16} {}",
            "ID", "TAG", "PROTOCOL", "PORT", "LISTEN", "REMARK"
        ))
        .bold()
    );
    for inbound in inbounds {
        let id = inbound.id.map(|id| id.to_string()).unwrap_or_default();
        let listen = if inbound.listen.is_empty() {
            "-"
        } else {
            inbound.listen.as_str()
        };
        println!(
            "{:<5} {:<20} {:<14} {:<6} {:<16} {}",
            id, inbound.tag, inbound.protocol, inbound.port, listen, inbound.remark
        );
    }
}

fn run_outbound(ctx: &AppContext, command: OutboundSubcommand) -> Result<()> {
    let service = ctx.outbound_service();
    match command {
        OutboundSubcommand::List { enabled, format } => {
            let outbounds = if enabled {
                service.list_enabled()?
            } else {
                service.list()?
            };
            match format {
                OutputFormat::Table => print_outbound_table(&outbounds),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outbounds)?),
            }
        }
        OutboundSubcommand::Tags => {
            for tag in service.tags()? {
                println!("{tag}");
            }
        }
        OutboundSubcommand::Show { tag } => {
            let outbound = find_outbound(&service, &tag)?;
            let entry = outbound
                .to_entry()
                .with_context(|| format!("Outbound '{}' has a corrupt section", tag))?;
            println!("{}", serde_json::to_string_pretty(&entry)?);
        }
        OutboundSubcommand::Add { file } => {
            let raw = read_input(&file)?;
            let value: serde_json::Value =
                serde_json::from_str(&raw).context("Outbound is not valid JSON")?;
            let entry = ConfigEntry::from_value(&value)
                .ok_or_else(|| anyhow::anyhow!("Outbound must be a JSON object"))?;
            if entry.tag().is_empty() {
                anyhow::bail!("Outbound must have a non-empty 'tag'");
            }
            let outbound = build_outbound(&entry, None, 0)?;
            let saved = service.add(outbound)?;
            println!("{} Added outbound '{}'", style("✓").green(), saved.tag);
        }
        OutboundSubcommand::Remove { tag } => match service.delete_by_tag(&tag)? {
            Some(_) => println!("{} Removed outbound '{}'", style("✓").green(), tag),
            None => anyhow::bail!("Outbound not found: {}", tag),
        },
        OutboundSubcommand::Enable { tag } => set_enabled(&service, &tag, true)?,
        OutboundSubcommand::Disable { tag } => set_enabled(&service, &tag, false)?,
    }
    Ok(())
}

fn find_outbound(service: &OutboundService, tag: &str) -> Result<Outbound> {
    service
        .get_by_tag(tag)?
        .ok_or_else(|| anyhow::anyhow!("Outbound not found: {}", tag))
}

fn set_enabled(service: &OutboundService, tag: &str, enable: bool) -> Result<()> {
    let outbound = find_outbound(service, tag)?;
    let id = outbound
        .id
        .ok_or_else(|| anyhow::anyhow!("Outbound '{}' has no id", tag))?;
    service.set_enabled(id, enable)?;

    let state = if enable { "Enabled" } else { "Disabled" };
    println!("{} {} outbound '{}'", style("✓").green(), state, tag);
    Ok(())
}

fn print_outbound_table(outbounds: &[Outbound]) {
    if outbounds.is_empty() {
        println!("No managed outbounds");
        return;
    }
    println!(
        "{}",
        style(format!(
            "{:<5} {:<20} {:<14} {:<8} {}",
            "ID", "TAG", "PROTOCOL", "ENABLED", "REMARK"
        ))
        .bold()
    );
    for outbound in outbounds {
        let id = outbound.id.map(|id| id.to_string()).unwrap_or_default();
        let enabled = if outbound.enable { "yes" } else { "no" };
        println!(
            "{:<5} {:<20} {:<14} {:<8} {}",
            id, outbound.tag, outbound.protocol, enabled, outbound.remark
        );
    }
}
