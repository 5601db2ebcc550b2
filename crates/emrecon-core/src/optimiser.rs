//! The Expectation-Maximization driver: loads one hemisphere's images,
//! runs per-image pose search (Expectation), folds the result back into
//! a reconstructed reference and noise model (Maximization), and drives
//! the resolution-progression loop across a pair of hemispheres.
//!
//! Grounded in `original_source/src/MLOptimiser.cpp`'s
//! `expectation`/`maximization`/`run` trio; `Particle`, `Model`, and
//! `Reconstructor` already carry the per-image and per-hemisphere state
//! this module only orchestrates.

use std::f64::consts::PI;
use std::path::Path;

use ndarray::Array2;
use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::config::RefineConfig;
use crate::consts::{
    MAX_N_PHASE_PER_ITER, MIN_N_PHASE_PER_ITER, MIN_TRANS_SEARCH, N_PHASE_NO_DECREASE,
    PARALLEL_IMAGE_THRESHOLD, TRANS_SEARCH_FACTOR, VARI_DECREASE_FRACTION,
};
use crate::ctf::{CtfImage, CtfParams};
use crate::db::{parse_particle_name, ParticleDb};
use crate::directional::sample_acg;
use crate::error::Result;
use crate::fft;
use crate::image::{FourierImage, RealVolume};
use crate::io;
use crate::linalg::{Mat3, Quaternion};
use crate::model::{fourier_shell_correlation, resolution_from_fsc, Model, SearchType};
use crate::particle::Particle;
use crate::projector::{project_with_quaternion, InterpKind, Projector};
use crate::reconstructor::Reconstruct;
use crate::transport::Transport;

/// One loaded particle image: its Fourier transform, evaluated CTF, and
/// the noise group it belongs to.
struct ImageEntry {
    observed: FourierImage,
    ctf: CtfImage,
    group_id: u32,
}

/// Everything one hemisphere owns: its share of the particle set, its
/// own reference/FSC/resolution state, and the noise-variance table
/// indexed `[group, shell]`.
pub struct Optimiser<'a, T: Transport> {
    config: RefineConfig,
    symmetry: &'a [Mat3],
    transport: T,
    model: Model,
    images: Vec<ImageEntry>,
    particles: Vec<Particle<'a>>,
    prev_best: Vec<Quaternion>,
    sigma: Array2<f64>,
    rng: StdRng,
}

impl<'a, T: Transport> Optimiser<'a, T> {
    /// Load this hemisphere's particles, build per-image CTFs and
    /// particle filters, bootstrap the noise table, and wrap the
    /// initial reference in a `Model`.
    pub fn new(
        config: RefineConfig,
        symmetry: &'a [Mat3],
        transport: T,
        db: &ParticleDb,
        particle_ids: &[u32],
        seed: u64,
    ) -> Result<Self> {
        let initial_volume = io::read_volume(&config.init_model, Some(config.size))?;
        let initial_r = config.resolved_initial_cutoff();
        let model = Model::new(&initial_volume, config.pf, config.pixel_size, initial_r, config.a, config.alpha);

        let group_count = db.group_count()? as usize;
        let mut rng = StdRng::seed_from_u64(seed);

        let mut images = Vec::with_capacity(particle_ids.len());
        let mut particles = Vec::with_capacity(particle_ids.len());
        let mut prev_best = Vec::with_capacity(particle_ids.len());

        let n0 = (config.mg * config.mf).max(1);
        for &id in particle_ids {
            let row = db.particle(id)?;
            let mg_row = db.micrograph(row.micrograph_id)?;
            let location = parse_particle_name(&row.name);
            let observed_real = io::read_image(Path::new(&location.path), location.slice, Some(config.size))?;
            let observed = fft::forward_2d(&observed_real);

            let ctf_params = CtfParams {
                voltage: mg_row.voltage,
                defocus_u: row.defocus_u,
                defocus_v: row.defocus_v,
                defocus_angle: row.defocus_angle,
                cs: mg_row.cs,
                pixel_size: config.pixel_size,
                amplitude_contrast: CtfParams::default().amplitude_contrast,
            };
            let ctf = CtfImage::compute(config.size, &ctf_params);

            images.push(ImageEntry {
                observed,
                ctf,
                group_id: row.group_id,
            });
            particles.push(Particle::reset(&mut rng, n0, config.max_x, config.max_y, symmetry));
            prev_best.push(Quaternion::IDENTITY);
        }

        let max_shell = model.resolution.max_r;
        let sigma = estimate_initial_sigma(&images, group_count + 1, max_shell);

        Ok(Self {
            config,
            symmetry,
            transport,
            model,
            images,
            particles,
            prev_best,
            sigma,
            rng,
        })
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn config(&self) -> &RefineConfig {
        &self.config
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Inverse-transform and crop the current reference, writing it out
    /// as a real-space MRC volume.
    pub fn write_reference(&self, path: &Path) -> Result<()> {
        let full = fft::inverse_3d(&self.model.reference);
        let crop_start = (full.n - self.model.n) / 2;
        let mut out = RealVolume::zeros(self.model.n);
        for k in 0..self.model.n {
            for j in 0..self.model.n {
                for i in 0..self.model.n {
                    out.data[[k, j, i]] = full.data[[k + crop_start, j + crop_start, i + crop_start]];
                }
            }
        }
        io::write_volume(path, &out)
    }

    /// Run one Expectation round over every image: per-image phased
    /// pose search, updating each image's particle filter and best pose
    /// in place. Returns the mean and standard deviation of the
    /// per-image rotation change (`rChange`), which feeds the
    /// resolution state machine.
    pub fn expectation(&mut self) -> (f64, f64) {
        let search_type = self.model.resolution.search_type;
        let interp = search_type.interp_kind();
        let projector = self.model.projector();
        let r_max = self.model.resolution.r as f64;

        let n_images = self.particles.len();
        let seeds: Vec<u64> = (0..n_images).map(|_| self.rng.gen()).collect();

        let symmetry = self.symmetry;
        let config = &self.config;
        let sigma = &self.sigma;
        let group_cap = sigma.nrows() - 1;

        let sigma_row_for = |group_id: u32| -> Vec<f64> {
            sigma.row((group_id as usize).min(group_cap)).to_vec()
        };

        let run_one = |particle: &mut Particle<'a>, image: &ImageEntry, prev: Quaternion, seed: u64| {
            let mut local_rng = StdRng::seed_from_u64(seed);
            expectation_one(
                particle,
                image,
                &projector,
                search_type,
                interp,
                r_max,
                symmetry,
                config,
                &sigma_row_for(image.group_id),
                prev,
                &mut local_rng,
            )
        };

        let results: Vec<(Quaternion, f64)> = if n_images >= PARALLEL_IMAGE_THRESHOLD {
            self.particles
                .par_iter_mut()
                .zip(self.images.par_iter())
                .zip(self.prev_best.par_iter())
                .zip(seeds.par_iter())
                .map(|(((particle, image), &prev), &seed)| run_one(particle, image, prev, seed))
                .collect()
        } else {
            self.particles
                .iter_mut()
                .zip(self.images.iter())
                .zip(self.prev_best.iter())
                .zip(seeds.iter())
                .map(|(((particle, image), &prev), &seed)| run_one(particle, image, prev, seed))
                .collect()
        };

        for (idx, (best_q, _)) in results.iter().enumerate() {
            self.prev_best[idx] = *best_q;
        }

        let r_changes: Vec<f64> = results.into_iter().map(|(_, rc)| rc).collect();
        let n = r_changes.len().max(1) as f64;
        let mean = r_changes.iter().sum::<f64>() / n;
        let var = r_changes.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        (mean, var.sqrt())
    }

    /// Maximization: refresh the per-group noise variance from the
    /// current best poses, then reconstruct a new reference from
    /// CTF-weighted insertions at those poses.
    pub fn maximize(&mut self) -> Result<()> {
        self.update_sigma()?;
        self.reconstruct_reference()?;
        Ok(())
    }

    fn update_sigma(&mut self) -> Result<()> {
        let r = self.model.resolution.r;
        let projector = self.model.projector();
        let rows = self.sigma.nrows();
        let cols = self.sigma.ncols();

        let mut sums = Array2::<f64>::zeros((rows, cols));
        let mut counts = vec![0.0_f64; rows];

        for (particle, image) in self.particles.iter().zip(self.images.iter()) {
            let (q, (tx, ty)) = particle.best_pose();
            let mut proj = FourierImage::zeros(image.observed.n);
            project_with_quaternion(&projector, &mut proj, &q, Some((tx, ty)), InterpKind::Linear);

            let group = (image.group_id as usize).min(rows - 1);
            counts[group] += 1.0;

            let n = image.observed.n;
            let half = image.observed.half_width();
            for yi in 0..n {
                let j = if yi <= n / 2 { yi as isize } else { yi as isize - n as isize };
                for i in 0..half {
                    let shell = (((i as f64).powi(2) + (j as f64).powi(2)).sqrt().round() as usize).min(cols - 1);
                    if shell >= r {
                        continue;
                    }
                    let ctf_val = image.ctf.get(i as isize, j);
                    let model_val = proj.data[[yi, i]] * ctf_val;
                    let diff = image.observed.data[[yi, i]] - model_val;
                    let w = if i == 0 { 1.0 } else { 2.0 };
                    sums[[group, shell]] += w * diff.norm_sqr() / 2.0;
                }
            }
        }

        let mut flat: Vec<f64> = counts.into_iter().chain(sums.into_iter()).collect();
        self.transport.all_reduce_sum_hemisphere(&mut flat)?;
        let (counts_flat, sums_flat) = flat.split_at(rows);
        for g in 0..rows {
            let c = counts_flat[g].max(1.0);
            for k in 0..r.min(cols) {
                self.sigma[[g, k]] = (sums_flat[g * cols + k] / c).max(1e-12);
            }
        }
        Ok(())
    }

    fn reconstruct_reference(&mut self) -> Result<()> {
        let mut reconstructor = self.model.new_reconstructor();

        for (particle, image) in self.particles.iter().zip(self.images.iter()) {
            let (q, (tx, ty)) = particle.best_pose();
            let rot = q.to_mat3();
            let shifted = shift_image(&image.observed, tx, ty);
            reconstructor.insert(&shifted, &image.ctf.as_fourier_image(), &rot, 1.0);
        }

        reconstructor.prepare_tf(&self.transport, self.symmetry)?;
        let fsc = if self.config.wiener_filter_fsc {
            Some(self.model.fsc.as_slice())
        } else {
            None
        };
        let (_iters, _converged) = reconstructor.balance(fsc, self.config.join_half);
        let reconstructed = reconstructor.reconstruct(self.config.clamp_negative);
        self.model.set_reference_from_real(&reconstructed);
        Ok(())
    }
}

/// Undo a fitted in-plane shift: multiplies by the phase ramp opposite
/// the one `Projector::project` applies, bringing an observed image
/// back into the untranslated frame the Reconstructor inserts into.
fn shift_image(img: &FourierImage, tx: f64, ty: f64) -> FourierImage {
    let n = img.n;
    let mut out = FourierImage::zeros(n);
    for yi in 0..n {
        let j = if yi <= n / 2 { yi as isize } else { yi as isize - n as isize };
        for i in 0..img.half_width() {
            let phase = 2.0 * PI * (i as f64 * tx + j as f64 * ty) / n as f64;
            out.data[[yi, i]] = img.data[[yi, i]] * Complex64::new(phase.cos(), phase.sin());
        }
    }
    out
}

/// Chi-square quantile at `p = 0.5`, two degrees of freedom:
/// `F(x) = 1 - exp(-x/2) = 0.5 => x = 2 ln 2`.
fn translation_search_count(trans_s: f64) -> usize {
    let chi2_inv_half_df2 = 2.0 * std::f64::consts::LN_2;
    let count = (PI * trans_s * trans_s / chi2_inv_half_df2 * TRANS_SEARCH_FACTOR).round() as usize;
    count.max(MIN_TRANS_SEARCH)
}

/// Per-image phased pose search: GLOBAL phase zero replaces the filter
/// with a fresh rotation-by-translation grid, LOCAL phase zero
/// resamples-then-perturbs the existing filter, every later phase just
/// perturbs; each phase reweights by image likelihood, resamples back
/// to the phase's target count, and the loop exits early once the
/// filter's variance stops improving.
fn expectation_one<'a>(
    particle: &mut Particle<'a>,
    image: &ImageEntry,
    projector: &Projector,
    search_type: SearchType,
    interp: InterpKind,
    r_max: f64,
    symmetry: &'a [Mat3],
    config: &RefineConfig,
    sigma_row: &[f64],
    previous_best: Quaternion,
    rng: &mut StdRng,
) -> (Quaternion, f64) {
    let mut best_variance = f64::INFINITY;
    let mut no_decrease = 0u32;

    for phase in 0..MAX_N_PHASE_PER_ITER {
        if phase == 0 {
            match search_type {
                SearchType::Global => {
                    let n_r = config.mg;
                    let n_t = translation_search_count(config.trans_s);
                    let rotations = sample_acg(rng, 1.0, 1.0, n_r);
                    let translations: Vec<(f64, f64)> = (0..n_t)
                        .map(|_| (rng.gen_range(-config.max_x..=config.max_x), rng.gen_range(-config.max_y..=config.max_y)))
                        .collect();
                    *particle = Particle::from_grid(&rotations, &translations, symmetry);
                }
                _ => {
                    particle.resample_local(rng, config.ml);
                    particle.perturb(rng, 5.0);
                }
            }
        } else {
            particle.perturb(rng, 1.0);
        }

        let log_likelihood = compute_log_likelihood(particle, image, projector, interp, r_max, sigma_row);
        if log_likelihood.iter().any(|v| !v.is_finite()) {
            tracing::warn!("degenerate likelihood for a particle filter, stopping this image's phases early");
            break;
        }
        particle.update_weights(&log_likelihood);

        if phase == 0 && search_type == SearchType::Global {
            particle.truncate_top(config.mg);
            particle.shuffle(rng);
        }

        let target_n = match search_type {
            SearchType::Global => config.mg,
            _ => config.ml,
        };
        particle.resample_local(rng, target_n);

        let vari = particle.variance();
        let r_vari = 1.0 / vari.k1.max(1e-9);
        let t_vari = vari.s0.powi(2) + vari.s1.powi(2);
        let combined = r_vari + t_vari;

        if phase + 1 >= MIN_N_PHASE_PER_ITER {
            if combined < best_variance * (1.0 - VARI_DECREASE_FRACTION) {
                best_variance = combined;
                no_decrease = 0;
            } else {
                no_decrease += 1;
            }
            if no_decrease >= N_PHASE_NO_DECREASE {
                break;
            }
        } else {
            best_variance = best_variance.min(combined);
        }
    }

    let (best_q, _) = particle.best_pose();
    let r_change = particle.diff_top_r(previous_best);
    (best_q, r_change)
}

/// Per-sample log-likelihood: negative squared residual between the
/// observed image and the CTF-modulated projection at that sample's
/// pose, summed over the resolution band and scaled by the group's
/// per-shell noise variance. Half-spectrum columns carry weight 2
/// (they stand in for both themselves and their conjugate partner);
/// the self-conjugate `x == 0` column carries weight 1.
fn compute_log_likelihood(
    particle: &Particle,
    image: &ImageEntry,
    projector: &Projector,
    interp: InterpKind,
    r_max: f64,
    sigma_row: &[f64],
) -> Vec<f64> {
    let n = image.observed.n;
    let half = image.observed.half_width();
    let r_max2 = r_max * r_max;

    (0..particle.n())
        .map(|m| {
            let q = particle.quaternion(m);
            let (tx, ty) = particle.shift(m);
            let mut proj = FourierImage::zeros(n);
            project_with_quaternion(projector, &mut proj, &q, Some((tx, ty)), interp);

            let mut acc = 0.0;
            for yi in 0..n {
                let j = if yi <= n / 2 { yi as isize } else { yi as isize - n as isize };
                for i in 0..half {
                    let i_f = i as f64;
                    let j_f = j as f64;
                    if i_f * i_f + j_f * j_f >= r_max2 {
                        continue;
                    }
                    let shell = ((i_f * i_f + j_f * j_f).sqrt().round() as usize).min(sigma_row.len() - 1);
                    let sigma2 = sigma_row[shell].max(1e-12);
                    let ctf_val = image.ctf.get(i as isize, j);
                    let model_val = proj.data[[yi, i]] * ctf_val;
                    let diff = image.observed.data[[yi, i]] - model_val;
                    let weight = if i == 0 { 1.0 } else { 2.0 };
                    acc += -weight * diff.norm_sqr() / (2.0 * sigma2);
                }
            }
            acc
        })
        .collect()
}

/// Bootstrap the noise table before the first Expectation: every group
/// starts from the same global estimate, `(avgPs - psAvg) / 2`, where
/// `avgPs` is the shell-averaged power of every image and `psAvg` is
/// the shell-averaged power of their mean (the common-signal estimate).
fn estimate_initial_sigma(images: &[ImageEntry], rows: usize, max_shell: usize) -> Array2<f64> {
    let mut sigma = Array2::from_elem((rows, max_shell + 1), 1.0);
    if images.is_empty() {
        return sigma;
    }

    let n = images[0].observed.n;
    let half = images[0].observed.half_width();
    let n_images = images.len() as f64;

    let mut mean_image = FourierImage::zeros(n);
    for image in images {
        for (acc, &v) in mean_image.data.iter_mut().zip(image.observed.data.iter()) {
            *acc += v;
        }
    }
    for v in mean_image.data.iter_mut() {
        *v /= n_images;
    }

    let mut avg_ps = vec![0.0; max_shell + 1];
    for image in images {
        for yi in 0..n {
            let j = if yi <= n / 2 { yi as isize } else { yi as isize - n as isize };
            for i in 0..half {
                let shell = (((i as f64).powi(2) + (j as f64).powi(2)).sqrt().round() as usize).min(max_shell);
                avg_ps[shell] += image.observed.data[[yi, i]].norm_sqr();
            }
        }
    }
    for v in avg_ps.iter_mut() {
        *v /= n_images;
    }

    let mut ps_avg = vec![0.0; max_shell + 1];
    for yi in 0..n {
        let j = if yi <= n / 2 { yi as isize } else { yi as isize - n as isize };
        for i in 0..half {
            let shell = (((i as f64).powi(2) + (j as f64).powi(2)).sqrt().round() as usize).min(max_shell);
            ps_avg[shell] += mean_image.data[[yi, i]].norm_sqr();
        }
    }

    for k in 0..=max_shell {
        let value = ((avg_ps[k] - ps_avg[k]) / 2.0).max(1e-8);
        for g in 0..rows {
            sigma[[g, k]] = value;
        }
    }
    sigma
}

/// One completed EM iteration's headline statistics.
#[derive(Clone, Copy, Debug)]
pub struct IterationSummary {
    pub iteration: usize,
    pub r: usize,
    pub resolution_angstrom: f64,
    pub search_type: SearchType,
}

/// Drive two hemispheres through the full resolution-progression loop:
/// Expectation and Maximization run independently per hemisphere, then
/// their freshly reconstructed references are cross-correlated into a
/// shared FSC that both adopt before the next iteration's cutoff
/// decision. Stops early if either hemisphere's search reaches `Stop`.
///
/// Real multi-process MPI deployments would instead exchange each
/// hemisphere's leader reference via a point-to-point transfer outside
/// the within-hemisphere all-reduce/broadcast collectives `Transport`
/// exposes; this single-process pairing is the in-workspace stand-in
/// for that exchange (see DESIGN.md).
pub fn run_paired<T: Transport>(a: &mut Optimiser<'_, T>, b: &mut Optimiser<'_, T>) -> Result<Vec<IterationSummary>> {
    let iter_max = a.config.iter_max;
    let mut history = Vec::with_capacity(iter_max);

    for iteration in 0..iter_max {
        let (mean_a, std_a) = a.expectation();
        let (mean_b, std_b) = b.expectation();

        a.maximize()?;
        b.maximize()?;

        let max_shell = a.model.fsc.len().saturating_sub(1);
        let fsc = fourier_shell_correlation(&a.model.reference, &b.model.reference, max_shell);
        a.model.fsc = fsc.clone();
        b.model.fsc = fsc;

        a.model.refresh_snr();
        b.model.refresh_snr();
        a.model.refresh_tau();
        b.model.refresh_tau();

        let res = resolution_from_fsc(&a.model.fsc, a.model.pixel_size, a.model.n);
        let determine_increase_r = a.model.resolution.search_type != SearchType::Stop;

        a.model.resolution.advance(mean_a, std_a.max(1e-6), res, determine_increase_r);
        b.model.resolution.advance(mean_b, std_b.max(1e-6), res, determine_increase_r);

        tracing::info!(
            iteration,
            r = a.model.resolution.r,
            resolution = res,
            search_type = ?a.model.resolution.search_type,
            "completed EM iteration"
        );

        let stopped = a.model.resolution.search_type == SearchType::Stop;
        history.push(IterationSummary {
            iteration,
            r: a.model.resolution.r,
            resolution_angstrom: res,
            search_type: a.model.resolution.search_type,
        });
        if stopped {
            break;
        }
    }

    Ok(history)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symmetry::symmetry_operators;
    use rusqlite::Connection;
    use tempfile::TempDir;

    fn write_test_volume(path: &Path, n: usize) {
        let mut vol = RealVolume::zeros(n);
        for k in 0..n {
            for j in 0..n {
                for i in 0..n {
                    let d = ((i as f64 - n as f64 / 2.0).powi(2)
                        + (j as f64 - n as f64 / 2.0).powi(2)
                        + (k as f64 - n as f64 / 2.0).powi(2))
                    .sqrt();
                    vol.data[[k, j, i]] = (-d * d / 20.0).exp();
                }
            }
        }
        io::write_volume(path, &vol).unwrap();
    }

    fn write_test_image(path: &Path, n: usize, seed: u64) {
        let mut img = crate::image::RealImage::zeros(n);
        let mut state = seed.wrapping_mul(2685821657736338717).wrapping_add(1);
        for v in img.data.iter_mut() {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
            let u = (state >> 11) as f64 / (1u64 << 53) as f64;
            *v = u - 0.5;
        }
        io::write_image(path, &img).unwrap();
    }

    fn build_test_optimiser(dir: &TempDir, symmetry: &[Mat3]) -> Optimiser<'_, crate::transport::LocalTransport> {
        let n = 8;
        let init_path = dir.path().join("init.mrc");
        write_test_volume(&init_path, n);

        let db_path = dir.path().join("particles.db");
        let conn = Connection::open(&db_path).unwrap();
        conn.execute_batch(
            "CREATE TABLE micrographs (ID INTEGER, Voltage REAL, Cs REAL);
             CREATE TABLE particles (ID INTEGER, Name TEXT, GroupID INTEGER,
                                      micrographID INTEGER, DefocusU REAL,
                                      DefocusV REAL, DefocusAngle REAL);
             INSERT INTO micrographs VALUES (1, 300000.0, 2700000.0);",
        )
        .unwrap();

        for id in 1..=6u32 {
            let img_path = dir.path().join(format!("particle_{id}.mrc"));
            write_test_image(&img_path, n, id as u64);
            conn.execute(
                "INSERT INTO particles VALUES (?1, ?2, 1, 1, 10000.0, 9800.0, 0.1)",
                rusqlite::params![id, img_path.to_string_lossy().to_string()],
            )
            .unwrap();
        }
        drop(conn);

        let db = ParticleDb::open(db_path.to_str().unwrap()).unwrap();
        let ids = db.all_particle_ids().unwrap();

        let mut config = RefineConfig::default();
        config.size = n;
        config.pf = 1;
        config.iter_max = 1;
        config.mg = 16;
        config.ml = 8;
        config.mf = 1;
        config.db = db_path.clone();
        config.init_model = init_path.clone();
        config.initial_cutoff = Some(2);

        Optimiser::new(config, symmetry, crate::transport::LocalTransport, &db, &ids, 7).unwrap()
    }

    #[test]
    fn translation_search_count_respects_floor() {
        assert_eq!(translation_search_count(0.5), MIN_TRANS_SEARCH);
    }

    #[test]
    fn expectation_updates_best_pose_without_panicking() {
        let ops = symmetry_operators("C1").unwrap();
        let dir = TempDir::new().unwrap();
        let mut opt = build_test_optimiser(&dir, &ops);
        let (mean, std) = opt.expectation();
        assert!(mean.is_finite());
        assert!(std.is_finite());
        assert!(opt.particles[0].weights_sum_to_one());
    }

    #[test]
    fn maximize_reconstructs_a_finite_reference() {
        let ops = symmetry_operators("C1").unwrap();
        let dir = TempDir::new().unwrap();
        let mut opt = build_test_optimiser(&dir, &ops);
        opt.expectation();
        opt.maximize().unwrap();
        assert!(opt.model.reference.data.iter().all(|c| c.re.is_finite() && c.im.is_finite()));
    }

    #[test]
    fn run_paired_completes_one_iteration() {
        let ops = symmetry_operators("C1").unwrap();
        let dir_a = TempDir::new().unwrap();
        let dir_b = TempDir::new().unwrap();
        let mut a = build_test_optimiser(&dir_a, &ops);
        let mut b = build_test_optimiser(&dir_b, &ops);
        let history = run_paired(&mut a, &mut b).unwrap();
        assert_eq!(history.len(), 1);
        assert!(history[0].resolution_angstrom.is_finite());
    }
}
