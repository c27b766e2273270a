use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use vsfs::{mkfs, FileBackend, Geometry};

#[derive(Parser)]
#[command(name = "mkfs.vsfs", about = "Create an empty VSFS image")]
struct Cli {
    /// Overwrite the image if it already exists.
    #[arg(long)]
    force: bool,
    /// Path of the image to create.
    image: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("VSFS_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .compact()
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed to initialize logger: {err}"))?;

    // 1. Crear el archivo con el tamaño exacto de la imagen
    let geometry = Geometry::vsfs();
    let mut backend = FileBackend::create(
        &cli.image,
        geometry.block_size(),
        geometry.image_bytes(),
        cli.force,
    )
    .with_context(|| format!("cannot create image {:?}", cli.image))?;

    // 2. Superblock, bitmaps, tabla de inodos y datos
    mkfs::format_image(&mut backend, &geometry)
        .with_context(|| format!("cannot format {:?}", cli.image))?;

    println!(
        "mkfs.vsfs: VSFS image created with {} blocks, {} inodes, {} data blocks.",
        geometry.total_blocks(),
        geometry.max_inodes(),
        geometry.data_block_count()
    );

    Ok(())
}
