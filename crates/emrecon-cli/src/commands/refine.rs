use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use emrecon_core::config::RefineConfig;
use emrecon_core::db::{scatter_to_hemispheres, ParticleDb};
use emrecon_core::optimiser::{run_paired, Optimiser};
use emrecon_core::symmetry::symmetry_operators;
use emrecon_core::transport::LocalTransport;

#[derive(Args)]
pub struct RefineArgs {
    /// Path to a `RefineConfig` TOML file (see `emrecon config` for a
    /// starting point).
    pub config: PathBuf,

    /// Directory the two half-map volumes are written into.
    #[arg(short, long, default_value = "emrecon-out")]
    pub out_dir: PathBuf,

    /// RNG seed for hemisphere A; hemisphere B uses `seed + 1`.
    #[arg(long, default_value_t = 0)]
    pub seed: u64,
}

/// Run the EM refinement loop in-process, pairing both half-map
/// hemispheres on a single rank via [`LocalTransport`]. A real multi-rank
/// deployment instead launches one process per hemisphere leader under
/// `mpirun` with the `mpi` feature enabled (see DESIGN.md); that topology
/// is outside what a single CLI invocation can drive.
pub fn run(args: &RefineArgs) -> Result<()> {
    let contents = fs::read_to_string(&args.config)
        .with_context(|| format!("failed to read config {}", args.config.display()))?;
    let config: RefineConfig = toml::from_str(&contents).context("invalid refinement config")?;

    println!("{}", style(&config).bold());
    println!();

    let symmetry = symmetry_operators(&config.sym)
        .with_context(|| format!("unknown symmetry group {:?}", config.sym))?;

    let db_path = config.db.to_str().context("non-UTF8 database path")?;
    let db = ParticleDb::open(db_path).with_context(|| format!("failed to open {db_path}"))?;
    let ids = db.all_particle_ids().context("failed to list particle IDs")?;
    if ids.is_empty() {
        anyhow::bail!("particle database {db_path} contains no particles");
    }
    let (ids_a, ids_b) = scatter_to_hemispheres(&ids);

    let mut hemisphere_a = Optimiser::new(
        config.clone(),
        &symmetry,
        LocalTransport,
        &db,
        &ids_a,
        args.seed,
    )
    .context("failed to initialise hemisphere A")?;
    let mut hemisphere_b = Optimiser::new(
        config.clone(),
        &symmetry,
        LocalTransport,
        &db,
        &ids_b,
        args.seed.wrapping_add(1),
    )
    .context("failed to initialise hemisphere B")?;

    println!(
        "Hemisphere A: {} particles   Hemisphere B: {} particles",
        hemisphere_a.image_count(),
        hemisphere_b.image_count()
    );

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner} {msg}")?);
    spinner.set_message("running EM refinement...");
    spinner.enable_steady_tick(std::time::Duration::from_millis(120));

    let history = run_paired(&mut hemisphere_a, &mut hemisphere_b)?;

    spinner.finish_with_message("refinement complete");
    println!();
    println!("{:>4}  {:>5}  {:>12}  {:<8}", "iter", "r", "resolution", "search");
    for summary in &history {
        println!(
            "{:>4}  {:>5}  {:>10.2}A  {:<8?}",
            summary.iteration, summary.r, summary.resolution_angstrom, summary.search_type
        );
    }

    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("failed to create output directory {}", args.out_dir.display()))?;
    let path_a = args.out_dir.join("halfmap_A.mrc");
    let path_b = args.out_dir.join("halfmap_B.mrc");
    hemisphere_a.write_reference(&path_a)?;
    hemisphere_b.write_reference(&path_b)?;
    println!();
    println!("Half-maps written to {} and {}", path_a.display(), path_b.display());

    Ok(())
}
