use std::path::Path;

use emrecon_core::image::RealImage;
use emrecon_core::image::RealVolume;
use emrecon_core::io;
use rusqlite::Connection;

/// Write a small synthetic reference volume: an isotropic Gaussian blob
/// centered in an `n`-cubed box, standing in for a converged initial model.
pub fn write_test_volume(path: &Path, n: usize) {
    let mut vol = RealVolume::zeros(n);
    let c = n as f64 / 2.0;
    for k in 0..n {
        for j in 0..n {
            for i in 0..n {
                let d = ((i as f64 - c).powi(2) + (j as f64 - c).powi(2) + (k as f64 - c).powi(2)).sqrt();
                vol.data[[k, j, i]] = (-d * d / 20.0).exp();
            }
        }
    }
    io::write_volume(path, &vol).unwrap();
}

/// Write a small synthetic particle image: a deterministic pseudo-random
/// field seeded by `seed`, standing in for a noisy projection.
pub fn write_test_image(path: &Path, n: usize, seed: u64) {
    let mut img = RealImage::zeros(n);
    let mut state = seed.wrapping_mul(2685821657736338717).wrapping_add(1);
    for v in img.data.iter_mut() {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let u = (state >> 11) as f64 / (1u64 << 53) as f64;
        *v = u - 0.5;
    }
    io::write_image(path, &img).unwrap();
}

/// Build a particle database with `count` particles, all in one
/// micrograph/group, each backed by its own synthetic image file under
/// `dir`.
pub fn build_test_db(dir: &Path, n: usize, count: u32) -> std::path::PathBuf {
    let db_path = dir.join("particles.db");
    let conn = Connection::open(&db_path).unwrap();
    conn.execute_batch(
        "CREATE TABLE micrographs (ID INTEGER, Voltage REAL, Cs REAL);
         CREATE TABLE particles (ID INTEGER, Name TEXT, GroupID INTEGER,
                                  micrographID INTEGER, DefocusU REAL,
                                  DefocusV REAL, DefocusAngle REAL);
         INSERT INTO micrographs VALUES (1, 300000.0, 2700000.0);",
    )
    .unwrap();

    for id in 1..=count {
        let img_path = dir.join(format!("particle_{id}.mrc"));
        write_test_image(&img_path, n, id as u64);
        conn.execute(
            "INSERT INTO particles VALUES (?1, ?2, 1, 1, 10000.0, 9800.0, 0.1)",
            rusqlite::params![id, img_path.to_string_lossy().to_string()],
        )
        .unwrap();
    }
    db_path
}
