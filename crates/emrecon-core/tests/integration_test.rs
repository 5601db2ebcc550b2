mod common;

use tempfile::TempDir;

use emrecon_core::config::RefineConfig;
use emrecon_core::db::{scatter_to_hemispheres, ParticleDb};
use emrecon_core::io;
use emrecon_core::optimiser::{run_paired, Optimiser};
use emrecon_core::symmetry::symmetry_operators;
use emrecon_core::transport::LocalTransport;

fn build_paired_config(dir: &std::path::Path, n: usize) -> RefineConfig {
    let init_path = dir.join("init.mrc");
    common::write_test_volume(&init_path, n);

    let mut config = RefineConfig::default();
    config.size = n;
    config.pf = 1;
    config.iter_max = 2;
    config.mg = 16;
    config.ml = 8;
    config.mf = 1;
    config.init_model = init_path;
    config.initial_cutoff = Some(2);
    config
}

/// A two-hemisphere refinement over a tiny synthetic particle set runs to
/// completion, producing a finite reconstructed reference and a
/// resolution estimate at every iteration, and writes out a half-map
/// volume that reads back at the configured box size.
#[test]
fn paired_refinement_runs_to_completion_and_writes_half_maps() {
    let dir = TempDir::new().unwrap();
    let n = 8;
    let mut config = build_paired_config(dir.path(), n);

    let db_path = common::build_test_db(dir.path(), n, 8);
    config.db = db_path.clone();

    let symmetry = symmetry_operators("C1").unwrap();
    let db = ParticleDb::open(db_path.to_str().unwrap()).unwrap();
    let ids = db.all_particle_ids().unwrap();
    assert_eq!(ids.len(), 8);
    let (ids_a, ids_b) = scatter_to_hemispheres(&ids);

    let mut hemisphere_a = Optimiser::new(config.clone(), &symmetry, LocalTransport, &db, &ids_a, 1).unwrap();
    let mut hemisphere_b = Optimiser::new(config.clone(), &symmetry, LocalTransport, &db, &ids_b, 2).unwrap();
    assert_eq!(hemisphere_a.image_count(), 4);
    assert_eq!(hemisphere_b.image_count(), 4);

    let history = run_paired(&mut hemisphere_a, &mut hemisphere_b).unwrap();
    assert_eq!(history.len(), config.iter_max);
    for summary in &history {
        assert!(summary.resolution_angstrom.is_finite());
        assert!(summary.resolution_angstrom > 0.0);
        assert!(summary.r >= 1);
    }

    assert!(hemisphere_a
        .model()
        .reference
        .data
        .iter()
        .all(|c| c.re.is_finite() && c.im.is_finite()));

    let out_path = dir.path().join("halfmap_A.mrc");
    hemisphere_a.write_reference(&out_path).unwrap();
    let header = io::peek_header(&out_path).unwrap();
    assert_eq!(header.nx, n as i32);
    assert_eq!(header.ny, n as i32);
    assert_eq!(header.nz, n as i32);

    let volume = io::read_volume(&out_path, Some(n)).unwrap();
    assert!(volume.data.iter().all(|v| v.is_finite()));
}

/// A hemisphere refined under a non-trivial symmetry group (C2, half as
/// many distinct orientations as C1) still produces finite weights and a
/// finite reconstructed reference after one Expectation/Maximization round.
#[test]
fn expectation_and_maximization_stay_finite_under_non_trivial_symmetry() {
    let dir = TempDir::new().unwrap();
    let n = 8;
    let mut config = build_paired_config(dir.path(), n);

    // C2 symmetry halves the space of distinct orientations; refinement
    // should still run to completion without producing non-finite poses.
    let db_path = common::build_test_db(dir.path(), n, 4);
    config.db = db_path.clone();

    let symmetry = symmetry_operators("C2").unwrap();
    assert_eq!(symmetry.len(), 2);

    let db = ParticleDb::open(db_path.to_str().unwrap()).unwrap();
    let ids = db.all_particle_ids().unwrap();
    let mut optimiser = Optimiser::new(config.clone(), &symmetry, LocalTransport, &db, &ids, 3).unwrap();

    let (mean, std) = optimiser.expectation();
    assert!(mean.is_finite());
    assert!(std.is_finite());
    optimiser.maximize().unwrap();
    assert!(optimiser
        .model()
        .reference
        .data
        .iter()
        .all(|c| c.re.is_finite() && c.im.is_finite()));
}
