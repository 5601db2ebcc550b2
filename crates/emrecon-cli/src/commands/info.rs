use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use emrecon_core::io;

#[derive(Args)]
pub struct InfoArgs {
    /// MRC volume or particle image file to inspect.
    pub file: PathBuf,
}

pub fn run(args: &InfoArgs) -> Result<()> {
    let header = io::peek_header(&args.file)
        .with_context(|| format!("failed to read MRC header from {}", args.file.display()))?;

    println!("File:       {}", args.file.display());
    println!("Dimensions: {}x{}x{}", header.nx, header.ny, header.nz);
    println!("Mode:       {} (float32)", header.mode);
    if header.nz <= 1 {
        println!("Kind:       2D image");
    } else if header.nx == header.ny && header.ny == header.nz {
        println!("Kind:       cubic volume");
    } else {
        println!("Kind:       image stack ({} slices)", header.nz);
    }

    Ok(())
}
