use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use wprebuild_core::config::{load_config, resolve_config_path};
use wprebuild_core::error::RebuildError;
use wprebuild_core::extensions::{AssumeYes, CategoryReport, ConsolePrompt};
use wprebuild_core::layout::{CONFIG_FILENAME, normalize_for_display};
use wprebuild_core::rebuild::{RebuildReport, UploadsOutcome, execute_rebuild, plan_rebuild};
use wprebuild_core::repository::PackageRepository;

#[derive(Debug, Parser)]
#[command(
    name = "wprebuild",
    version,
    about = "Rebuild a WordPress installation from clean upstream packages"
)]
struct Cli {
    #[arg(value_name = "DIRECTORY", help = "Path to the WordPress directory")]
    directory: PathBuf,
    #[arg(long, value_name = "PATH", help = "TOML config file (default: $WPREBUILD_CONFIG)")]
    config: Option<PathBuf>,
    #[arg(long, help = "Install every listed plugin and theme without prompting")]
    yes: bool,
    #[arg(
        long,
        help = "Print the final report as JSON on stdout; human-readable output moves to stderr"
    )]
    json: bool,
    #[arg(long, help = "Print resolved installation paths")]
    diagnostics: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    init_tracing();

    // With --json, stdout carries the report document and nothing else.
    let mut human: Box<dyn Write> = if cli.json {
        Box::new(io::stderr())
    } else {
        Box::new(io::stdout())
    };

    writeln!(human, "Welcome to wprebuild")?;
    writeln!(human)?;

    let plan = match plan_rebuild(&cli.directory) {
        Ok(plan) => plan,
        Err(error) => match error.downcast_ref::<RebuildError>() {
            Some(RebuildError::InvalidInstallation { missing, .. }) => {
                writeln!(human, "Invalid WordPress directory")?;
                for item in missing {
                    writeln!(human, "  missing: {item}")?;
                }
                return Ok(());
            }
            _ => return Err(error),
        },
    };
    writeln!(human, "Found valid WordPress installation.")?;
    if cli.diagnostics {
        writeln!(human, "\n[diagnostics]\n{}\n", plan.diagnostics())?;
    }

    let config = load_config(resolve_config_path(cli.config.as_deref()).as_deref())?;
    let settings = config.resolve();
    tracing::debug!(
        core_url = %settings.core_url,
        repository_url = %settings.repository_url,
        "resolved package sources"
    );
    let repository = PackageRepository::http(&settings)?;

    writeln!(
        human,
        "Rebuilding into {}\n",
        normalize_for_display(&plan.output.root)
    )?;
    human.flush()?;
    let report = if cli.yes {
        execute_rebuild(&plan, &repository, &mut AssumeYes)?
    } else if cli.json {
        let mut prompt = ConsolePrompt::new(io::stdin().lock(), io::stderr());
        execute_rebuild(&plan, &repository, &mut prompt)?
    } else {
        execute_rebuild(&plan, &repository, &mut ConsolePrompt::stdio())?
    };

    if cli.json {
        emit_json(&report, &mut human, &mut io::stdout())
    } else {
        write_report(&mut human, &report)?;
        Ok(())
    }
}

/// Summary to `human`, the report document alone to `document`.
fn emit_json(report: &RebuildReport, human: &mut dyn Write, document: &mut dyn Write) -> Result<()> {
    write_report(human, report)?;
    writeln!(document, "{}", serde_json::to_string_pretty(report)?)?;
    document.flush()?;
    Ok(())
}

fn write_report(out: &mut dyn Write, report: &RebuildReport) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "rebuilt_root: {}", normalize_for_display(&report.output_root))?;
    writeln!(out, "core: {}", report.core_url)?;
    for category in &report.categories {
        write_category(out, category)?;
    }

    match &report.uploads {
        UploadsOutcome::Copied { copy, sanitize } => {
            writeln!(
                out,
                "uploads: copied {} file(s), scanned {}, deleted {}",
                copy.copied_files,
                sanitize.scanned_files,
                sanitize.deleted.len()
            )?;
            for path in &sanitize.deleted {
                writeln!(out, "  deleted: {}", normalize_for_display(path))?;
            }
            for path in &sanitize.delete_failed {
                writeln!(out, "  could not delete, remove by hand: {}", normalize_for_display(path))?;
            }
            for path in &sanitize.unreadable {
                writeln!(out, "  unreadable, left in place: {}", normalize_for_display(path))?;
            }
            for path in &copy.skipped_links {
                writeln!(out, "  not copied (symlink): {}", normalize_for_display(path))?;
            }
        }
        UploadsOutcome::Absent => {
            writeln!(
                out,
                "uploads: 'uploads' directory does not exist in {}, skipped",
                normalize_for_display(&report.source_root)
            )?;
        }
    }

    if report.config_copied {
        writeln!(
            out,
            "config: copied '{CONFIG_FILENAME}'. Manually review this file for anomalies."
        )?;
    } else {
        writeln!(
            out,
            "config: error: '{CONFIG_FILENAME}' does not exist in the original directory."
        )?;
    }

    writeln!(out)?;
    writeln!(
        out,
        "All done, take note of any missing items and manually verify the files before replacing server copy."
    )?;
    out.flush()
}

fn write_category(out: &mut dyn Write, category: &CategoryReport) -> io::Result<()> {
    let label = category.kind.dir_name();
    if category.declined {
        return writeln!(
            out,
            "{label}: skipped ({} found, installation declined)",
            category.found.len()
        );
    }
    writeln!(
        out,
        "{label}: {} found, {} installed, {} missing",
        category.found.len(),
        category.installed.len(),
        category.missing.len()
    )?;
    for item in &category.missing {
        writeln!(
            out,
            "  error downloading {} '{}': {}",
            category.kind.as_str(),
            item.slug,
            item.reason
        )?;
    }
    if let Some(path) = &category.missing_list_path {
        writeln!(out, "  missing {label} listed in {}", normalize_for_display(path))?;
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("wprebuild=info,wprebuild_core=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
