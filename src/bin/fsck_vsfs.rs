use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use colored::*;
use tracing_subscriber::EnvFilter;
use vsfs::{fsck, FileBackend, FsckOptions, FsckReport, Geometry, Phase, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Human,
    Json,
}

#[derive(Parser)]
#[command(name = "fsck.vsfs", about = "Consistency checker for VSFS images")]
struct Cli {
    /// Repair the inconsistencies found and write them back to the image.
    #[arg(long)]
    fix: bool,
    /// Debug-level diagnostics on stderr.
    #[arg(short, long)]
    verbose: bool,
    /// Plain, uncolored report.
    #[arg(long)]
    no_color: bool,
    /// Diagnostics format (`human` or `json`).
    #[arg(long, value_enum, default_value = "human")]
    log_format: LogFormat,
    /// Path to the VSFS image.
    image: PathBuf,
}

fn init_logging(format: LogFormat, verbose: bool) -> Result<()> {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("VSFS_LOG").unwrap_or_else(|_| EnvFilter::new(default));

    let installed = match format {
        LogFormat::Human => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .compact()
            .try_init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init(),
    };
    installed.map_err(|err| anyhow::anyhow!("failed to initialize logger: {err}"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.no_color {
        colored::control::set_override(false);
    }
    init_logging(cli.log_format, cli.verbose)?;

    // ——————————————————————————————————————————
    //       ABRIR IMAGEN Y EJECUTAR FSCK
    // ——————————————————————————————————————————
    let geometry = Geometry::vsfs();
    let options = FsckOptions { repair: cli.fix };

    let mut backend = FileBackend::open(&cli.image, geometry.block_size(), cli.fix)
        .with_context(|| format!("Error opening file {:?}", cli.image))?;

    let rep = fsck::run_fsck(&mut backend, &geometry, options)
        .with_context(|| format!("fsck of {:?} aborted", cli.image))?;

    print_report(&rep);
    Ok(())
}

fn print_report(rep: &FsckReport) {
    println!("\n{}", " VSFS FILESYSTEM CHECK ".on_blue().bold());
    println!("{}", "──────────────────────────────────────────".blue());

    // ——————————————————————————————————————————
    //       UNA SECCIÓN POR FASE
    // ——————————————————————————————————————————
    for phase in Phase::ALL {
        println!("\n{}", phase.banner().bold());

        let mut any = false;
        for finding in rep.in_phase(phase) {
            any = true;
            match finding.issue.severity() {
                Severity::Error => println!(
                    "  {} {}",
                    "✗".red(),
                    format!("ERROR: {}", finding.issue).red()
                ),
                Severity::Warning => println!(
                    "  {} {}",
                    "!".yellow(),
                    format!("Warning: {}", finding.issue).yellow()
                ),
            }
            if finding.fixed {
                println!("    {} {}", "-->".green(), finding.issue.fix_description().green());
            }
        }

        if !any {
            println!("  {} OK", "✓".green());
        }
    }

    // ——————————————————————————————————————————
    //       RESUMEN FINAL
    // ——————————————————————————————————————————
    println!("\n{}", "Summary".bold().underline());
    println!(
        "  {} inodes scanned, {} data blocks swept",
        rep.inodes_scanned, rep.data_blocks_swept
    );

    if rep.is_clean() {
        println!("{} Filesystem is clean.", "✓ OK".green().bold());
    } else {
        println!(
            "{} {} errors, {} warnings, {} fixed.",
            "✗ Inconsistencies found:".red().bold(),
            rep.count(Severity::Error).to_string().yellow(),
            rep.count(Severity::Warning).to_string().yellow(),
            rep.fixed_count().to_string().green()
        );
    }

    if rep.repair {
        println!("All detected issues fixed and written to disk.");
    }
    println!("VSFS Check Completed.");
}
