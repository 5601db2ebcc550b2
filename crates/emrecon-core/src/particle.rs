//! Weighted pose-sample set ("particle filter") for one image: a
//! population of `{quaternion, 2D shift}` hypotheses with importance
//! weights, refined by perturbation, weighted resampling, and a bounded
//! log-likelihood transform.
//!
//! Grounded in `original_source/src/Particle.cpp`'s `reset`/`calVari`/
//! `perturb`/`resample`/`neff`/`iSort`/`symmetrise` set.

use ndarray::{Array1, Array2};
use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::consts::{ALPHA_LOCAL_SEARCH, EPSILON};
use crate::directional::{infer_acg, sample_acg};
use crate::linalg::{Mat3, Quaternion};
use crate::symmetry::fold_into_asymmetric_unit;

/// Variance summary recomputed before each perturbation. `rho` is always
/// zero: the original computes the R/T cross-covariance term but
/// discards it (`calVari` sets `rho := 0` unconditionally) and this keeps
/// that behavior rather than silently "fixing" it.
#[derive(Clone, Copy, Debug, Default)]
pub struct VarianceSummary {
    pub k0: f64,
    pub k1: f64,
    pub s0: f64,
    pub s1: f64,
    pub rho: f64,
}

pub struct Particle<'a> {
    /// `n x 4` unit quaternions, columns `(w, x, y, z)`.
    r: Array2<f64>,
    /// `n x 2` in-plane shifts, columns `(tx, ty)`.
    t: Array2<f64>,
    /// Nonnegative weights, `sum == 1`.
    w: Array1<f64>,
    max_x: f64,
    max_y: f64,
    symmetry: &'a [Mat3],
}

impl<'a> Particle<'a> {
    pub fn n(&self) -> usize {
        self.w.len()
    }

    pub fn weights(&self) -> &Array1<f64> {
        &self.w
    }

    pub fn quaternion(&self, i: usize) -> Quaternion {
        Quaternion::new(self.r[[i, 0]], self.r[[i, 1]], self.r[[i, 2]], self.r[[i, 3]])
    }

    pub fn shift(&self, i: usize) -> (f64, f64) {
        (self.t[[i, 0]], self.t[[i, 1]])
    }

    fn set_quaternion(&mut self, i: usize, q: Quaternion) {
        let a = q.as_array();
        for c in 0..4 {
            self.r[[i, c]] = a[c];
        }
    }

    /// Sum-of-weights invariant check (`Σ W = 1 ± ε`).
    pub fn weights_sum_to_one(&self) -> bool {
        (self.w.sum() - 1.0).abs() < 1e-6 && self.w.iter().all(|&w| w >= -EPSILON)
    }

    /// Initialise/reset `n` samples: uniform rotations via an identity-
    /// concentration ACG, translations uniform in the bounding box,
    /// uniform weights, folded into the asymmetric unit.
    pub fn reset<R: Rng + ?Sized>(
        rng: &mut R,
        n: usize,
        max_x: f64,
        max_y: f64,
        symmetry: &'a [Mat3],
    ) -> Self {
        let quats = sample_acg(rng, 1.0, 1.0, n);
        let mut r = Array2::zeros((n, 4));
        let mut t = Array2::zeros((n, 2));
        for (i, q) in quats.into_iter().enumerate() {
            let folded = fold_into_asymmetric_unit(q, symmetry);
            let a = folded.as_array();
            for c in 0..4 {
                r[[i, c]] = a[c];
            }
            t[[i, 0]] = rng.gen_range(-max_x..=max_x);
            t[[i, 1]] = rng.gen_range(-max_y..=max_y);
        }
        let w = Array1::from_elem(n, 1.0 / n as f64);
        Self { r, t, w, max_x, max_y, symmetry }
    }

    /// Build the `nR * nT` cross-product sample set used by GLOBAL phase
    /// zero: every rotation paired with every translation, uniform
    /// weight `1 / (nR*nT)`. Folded into the asymmetric unit like every
    /// other mutating operation.
    pub fn from_grid(rotations: &[Quaternion], translations: &[(f64, f64)], symmetry: &'a [Mat3]) -> Self {
        let n_r = rotations.len();
        let n_t = translations.len();
        let n = (n_r * n_t).max(1);
        let mut r = Array2::zeros((n, 4));
        let mut t = Array2::zeros((n, 2));
        let mut idx = 0;
        for q in rotations {
            let folded = fold_into_asymmetric_unit(*q, symmetry);
            let a = folded.as_array();
            for &(tx, ty) in translations {
                for c in 0..4 {
                    r[[idx, c]] = a[c];
                }
                t[[idx, 0]] = tx;
                t[[idx, 1]] = ty;
                idx += 1;
            }
        }
        let max_x = translations.iter().map(|p| p.0.abs()).fold(0.0, f64::max);
        let max_y = translations.iter().map(|p| p.1.abs()).fold(0.0, f64::max);
        let w = Array1::from_elem(n, 1.0 / n as f64);
        Self { r, t, w, max_x, max_y, symmetry }
    }

    /// Apply a random permutation to the sample set, preserving each
    /// sample's `(quaternion, shift, weight)` triple. Used after GLOBAL
    /// phase zero's truncate-to-top-`mG` step so that subsequent
    /// stratified resampling does not always draw from weight-sorted
    /// order.
    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let n = self.n();
        let mut order: Vec<usize> = (0..n).collect();
        for i in (1..n).rev() {
            let j = rng.gen_range(0..=i);
            order.swap(i, j);
        }
        let mut new_r = Array2::zeros((n, 4));
        let mut new_t = Array2::zeros((n, 2));
        let mut new_w = Array1::zeros(n);
        for (dst, &src) in order.iter().enumerate() {
            for c in 0..4 {
                new_r[[dst, c]] = self.r[[src, c]];
            }
            new_t[[dst, 0]] = self.t[[src, 0]];
            new_t[[dst, 1]] = self.t[[src, 1]];
            new_w[dst] = self.w[src];
        }
        self.r = new_r;
        self.t = new_t;
        self.w = new_w;
    }

    fn quaternions(&self) -> Vec<Quaternion> {
        (0..self.n()).map(|i| self.quaternion(i)).collect()
    }

    /// Fit `(k0, k1)` from `R`, marginal std-devs `(s0, s1)` from `T`; `rho := 0`.
    pub fn variance(&self) -> VarianceSummary {
        let (k0, k1) = infer_acg(&self.quaternions());
        let n = self.n() as f64;
        let mean0 = self.t.column(0).sum() / n;
        let mean1 = self.t.column(1).sum() / n;
        let var0 = self.t.column(0).iter().map(|v| (v - mean0).powi(2)).sum::<f64>() / n;
        let var1 = self.t.column(1).iter().map(|v| (v - mean1).powi(2)).sum::<f64>() / n;
        VarianceSummary {
            k0,
            k1,
            s0: var0.sqrt(),
            s1: var1.sqrt(),
            rho: 0.0,
        }
    }

    /// Perturb every sample: Gaussian shift jitter scaled `1/5` of the
    /// fitted translation std, small-quaternion ACG jitter at
    /// concentration `(confidence * 5 * k0, confidence * k1)` for
    /// `confidence == 1.0` (non-zero phases) or with the extra `5x` on
    /// `k0` folded in already for `confidence == 5.0` (phase-zero LOCAL).
    pub fn perturb<R: Rng + ?Sized>(&mut self, rng: &mut R, confidence: f64) {
        let vari = self.variance();
        let d0 = Normal::new(0.0, (vari.s0 / 5.0).max(EPSILON)).unwrap();
        let d1 = Normal::new(0.0, (vari.s1 / 5.0).max(EPSILON)).unwrap();
        for i in 0..self.n() {
            self.t[[i, 0]] = (self.t[[i, 0]] + d0.sample(rng)).clamp(-self.max_x, self.max_x);
            self.t[[i, 1]] = (self.t[[i, 1]] + d1.sample(rng)).clamp(-self.max_y, self.max_y);
        }

        let jitter = sample_acg(rng, confidence * 5.0 * vari.k0, confidence * vari.k1, self.n());
        for i in 0..self.n() {
            let current = self.quaternion(i);
            let moved = current.mul(&jitter[i]);
            self.set_quaternion(i, moved);
        }

        self.fold_all();
    }

    fn fold_all(&mut self) {
        for i in 0..self.n() {
            let folded = fold_into_asymmetric_unit(self.quaternion(i), self.symmetry);
            self.set_quaternion(i, folded);
        }
    }

    /// Stratified systematic resampling with a single uniform offset
    /// `u0 in [0, 1/n)`; the `j`-th draw lands at CDF position
    /// `u0 + j/n`.
    fn systematic_resample_indices<R: Rng + ?Sized>(&self, rng: &mut R, n: usize) -> Vec<usize> {
        let mut cdf = vec![0.0; self.n()];
        let mut acc = 0.0;
        for (i, &w) in self.w.iter().enumerate() {
            acc += w;
            cdf[i] = acc;
        }
        let last = *cdf.last().unwrap_or(&1.0);
        if last > 0.0 {
            for v in cdf.iter_mut() {
                *v /= last;
            }
        }

        let u0: f64 = rng.gen_range(0.0..(1.0 / n as f64));
        let mut out = Vec::with_capacity(n);
        let mut k = 0usize;
        for j in 0..n {
            let target = u0 + j as f64 / n as f64;
            while k + 1 < cdf.len() && cdf[k] < target {
                k += 1;
            }
            out.push(k);
        }
        out
    }

    /// `resample(n', alpha)`: `nG = round(alpha*n')` fresh global draws,
    /// `nL = n' - nG` local draws via stratified systematic resampling
    /// from the current weighted set. Builds both halves into fresh
    /// staging buffers and swaps them in at the end (matches the
    /// original's actual in-place-via-local-buffers strategy).
    pub fn resample<R: Rng + ?Sized>(&mut self, rng: &mut R, n_prime: usize, alpha: f64) {
        let n_global = (alpha * n_prime as f64).round() as usize;
        let n_global = n_global.min(n_prime);
        let n_local = n_prime - n_global;

        let mut new_r = Array2::zeros((n_prime, 4));
        let mut new_t = Array2::zeros((n_prime, 2));

        let quats = sample_acg(rng, 1.0, 1.0, n_global);
        for (i, q) in quats.into_iter().enumerate() {
            let folded = fold_into_asymmetric_unit(q, self.symmetry);
            let a = folded.as_array();
            for c in 0..4 {
                new_r[[i, c]] = a[c];
            }
            new_t[[i, 0]] = rng.gen_range(-self.max_x..=self.max_x);
            new_t[[i, 1]] = rng.gen_range(-self.max_y..=self.max_y);
        }

        if n_local > 0 {
            let picks = self.systematic_resample_indices(rng, n_local);
            for (offset, src) in picks.into_iter().enumerate() {
                let dst = n_global + offset;
                for c in 0..4 {
                    new_r[[dst, c]] = self.r[[src, c]];
                }
                new_t[[dst, 0]] = self.t[[src, 0]];
                new_t[[dst, 1]] = self.t[[src, 1]];
            }
        }

        self.r = new_r;
        self.t = new_t;
        self.w = Array1::from_elem(n_prime, 1.0 / n_prime as f64);
        self.fold_all();
    }

    /// Resample using the spec's LOCAL-phase default fraction.
    pub fn resample_local<R: Rng + ?Sized>(&mut self, rng: &mut R, n_prime: usize) {
        self.resample(rng, n_prime, ALPHA_LOCAL_SEARCH);
    }

    /// Bounded weight-update transform: `L -= max(L); L = 1/(1-L) -
    /// min(1/(1-L)); W *= L; normalise`.
    pub fn update_weights(&mut self, log_likelihood: &[f64]) {
        assert_eq!(log_likelihood.len(), self.n());
        let max_l = log_likelihood.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let shifted: Vec<f64> = log_likelihood.iter().map(|l| l - max_l).collect();
        let transformed: Vec<f64> = shifted.iter().map(|l| 1.0 / (1.0 - l)).collect();
        let min_t = transformed.iter().cloned().fold(f64::INFINITY, f64::min);
        for (i, t) in transformed.into_iter().enumerate() {
            self.w[i] *= t - min_t;
        }
        self.normalise_weights();
    }

    fn normalise_weights(&mut self) {
        let sum: f64 = self.w.sum();
        if sum > EPSILON {
            self.w.mapv_inplace(|v| v / sum);
        } else {
            let n = self.n();
            self.w.fill(1.0 / n as f64);
        }
    }

    /// Effective sample size `1 / Σ W²`.
    pub fn neff(&self) -> f64 {
        let ss: f64 = self.w.iter().map(|v| v * v).sum();
        if ss > EPSILON {
            1.0 / ss
        } else {
            0.0
        }
    }

    /// Permutation that sorts sample indices by descending weight.
    pub fn rank_by_weight(&self) -> Vec<usize> {
        let mut idx: Vec<usize> = (0..self.n()).collect();
        idx.sort_by(|&a, &b| self.w[b].partial_cmp(&self.w[a]).unwrap_or(std::cmp::Ordering::Equal));
        idx
    }

    /// Truncate to the top `k` samples by weight (used in GLOBAL phase 0
    /// after sorting), then re-normalise.
    pub fn truncate_top(&mut self, k: usize) {
        let order = self.rank_by_weight();
        let k = k.min(order.len());
        let mut new_r = Array2::zeros((k, 4));
        let mut new_t = Array2::zeros((k, 2));
        let mut new_w = Array1::zeros(k);
        for (dst, &src) in order.iter().take(k).enumerate() {
            for c in 0..4 {
                new_r[[dst, c]] = self.r[[src, c]];
            }
            new_t[[dst, 0]] = self.t[[src, 0]];
            new_t[[dst, 1]] = self.t[[src, 1]];
            new_w[dst] = self.w[src];
        }
        self.r = new_r;
        self.t = new_t;
        self.w = new_w;
        self.normalise_weights();
    }

    /// Angular distance between the best (rank-1) quaternion now and the
    /// previous best, for the rotation-change statistic.
    pub fn diff_top_r(&self, previous_best: Quaternion) -> f64 {
        let best = self.quaternion(self.rank_by_weight()[0]);
        best.angular_distance(&previous_best)
    }

    /// The rank-1 (highest weight) quaternion and shift.
    pub fn best_pose(&self) -> (Quaternion, (f64, f64)) {
        let top = self.rank_by_weight()[0];
        (self.quaternion(top), self.shift(top))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symmetry::symmetry_operators;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn weights_sum_to_one_after_reset_and_update() {
        let ops = symmetry_operators("C1").unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let mut p = Particle::reset(&mut rng, 64, 10.0, 10.0, &ops);
        assert!(p.weights_sum_to_one());
        let l: Vec<f64> = (0..64).map(|i| -(i as f64) * 0.1).collect();
        p.update_weights(&l);
        assert!(p.weights_sum_to_one());
    }

    #[test]
    fn resample_preserves_weight_invariant() {
        let ops = symmetry_operators("C1").unwrap();
        let mut rng = StdRng::seed_from_u64(2);
        let mut p = Particle::reset(&mut rng, 100, 5.0, 5.0, &ops);
        p.resample(&mut rng, 80, 0.1);
        assert_eq!(p.n(), 80);
        assert!(p.weights_sum_to_one());
    }

    #[test]
    fn stratified_resample_matches_weights_within_tolerance() {
        let ops = symmetry_operators("C1").unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        let mut p = Particle::reset(&mut rng, 4, 0.0, 0.0, &ops);
        p.w = Array1::from(vec![0.1, 0.2, 0.3, 0.4]);

        let n = 1_000_000;
        let picks = p.systematic_resample_indices(&mut rng, n);
        let mut counts = [0usize; 4];
        for idx in picks {
            counts[idx] += 1;
        }
        let target = [0.1, 0.2, 0.3, 0.4];
        for i in 0..4 {
            let freq = counts[i] as f64 / n as f64;
            assert!((freq - target[i]).abs() < 2e-3, "index {i}: {freq} vs {}", target[i]);
        }
    }

    #[test]
    fn neff_is_n_for_uniform_weights() {
        let ops = symmetry_operators("C1").unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let p = Particle::reset(&mut rng, 50, 1.0, 1.0, &ops);
        assert!((p.neff() - 50.0).abs() < 1e-6);
    }
}
