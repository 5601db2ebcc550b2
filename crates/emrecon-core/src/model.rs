//! Reference volume(s), projector/reconstructor ownership, FSC/SNR/tau
//! bookkeeping, and the resolution-driven search-type state machine.

use crate::consts::{
    FSC_RESOLUTION_THRESHOLD, MAX_ITER_RES_NO_IMPROVE, MAX_ITER_R_CHANGE_NO_DECREASE_GLOBAL,
    MAX_ITER_R_CHANGE_NO_DECREASE_LOCAL, R_CHANGE_DECREASE_NORM, SEARCH_RES_GAP_GLOBAL,
};
use crate::fft;
use crate::image::{FourierVolume, RealVolume};
use crate::kernel::KaiserBesselKernel;
use crate::projector::{InterpKind, Projector};
use crate::reconstructor::{Reconstruct, Reconstructor3D};

/// Which phase of search the Optimiser is in; drives the Projector's
/// interpolation kernel choice and the Particle filter's phase-zero policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchType {
    Global,
    Local,
    Stop,
}

impl SearchType {
    pub fn interp_kind(&self) -> InterpKind {
        match self {
            SearchType::Global => InterpKind::Nearest,
            _ => InterpKind::Linear,
        }
    }
}

/// Scalars and counters driving the cutoff-frequency progression
/// (`r, rU, rPrev, rT, res, resT, nRChangeNoDecrease, nTopResNoImprove`).
#[derive(Clone, Debug)]
pub struct ResolutionState {
    pub r: usize,
    pub r_prev: usize,
    pub r_top: usize,
    pub res: f64,
    pub res_top: f64,
    pub n_r_change_no_decrease: u32,
    pub n_top_res_no_improve: u32,
    pub search_type: SearchType,
    pub max_r: usize,
    last_r_change: Option<f64>,
}

impl ResolutionState {
    pub fn new(initial_r: usize, max_r: usize) -> Self {
        Self {
            r: initial_r,
            r_prev: initial_r,
            r_top: initial_r,
            res: 0.0,
            res_top: 0.0,
            n_r_change_no_decrease: 0,
            n_top_res_no_improve: 0,
            search_type: SearchType::Global,
            max_r,
            last_r_change: None,
        }
    }

    /// Reconstruct/FSC cutoff, `rU := min(r + GAP, maxR)`.
    pub fn r_u(&self) -> usize {
        (self.r + SEARCH_RES_GAP_GLOBAL).min(self.max_r)
    }

    /// Advance the state machine given this iteration's statistics.
    /// `r_change`/`std_r_change` are the mean/std of per-image rotation
    /// change (`Particle::diff_top_r`); `res` is the resolution (from
    /// FSC at `FSC_RESOLUTION_THRESHOLD`); `determine_increase_r` is the
    /// caller's decision (e.g. "did FSC improve enough at the current
    /// band") about whether to widen the cutoff this round.
    pub fn advance(&mut self, r_change: f64, std_r_change: f64, res: f64, determine_increase_r: bool) {
        self.r_prev = self.r;

        // The very first call only seeds the rotation-change baseline —
        // there is nothing yet to compare a decrease against, so it
        // neither resets nor increments the no-decrease counter.
        if let Some(previous) = self.last_r_change {
            let decreased = (previous - r_change) >= self.r_prev_change_threshold(std_r_change);
            if decreased {
                self.n_r_change_no_decrease = 0;
            } else {
                self.n_r_change_no_decrease += 1;
            }
        }
        self.last_r_change = Some(r_change);

        if res > self.res_top {
            self.res_top = res;
            self.n_top_res_no_improve = 0;
        } else {
            self.n_top_res_no_improve += 1;
        }
        self.res = res;

        match self.search_type {
            SearchType::Global if self.n_r_change_no_decrease >= MAX_ITER_R_CHANGE_NO_DECREASE_GLOBAL => {
                self.search_type = SearchType::Local;
            }
            SearchType::Local
                if self.n_r_change_no_decrease >= MAX_ITER_R_CHANGE_NO_DECREASE_LOCAL
                    && self.n_top_res_no_improve >= MAX_ITER_RES_NO_IMPROVE =>
            {
                self.search_type = SearchType::Stop;
            }
            _ => {}
        }

        if determine_increase_r {
            self.r = (self.r + SEARCH_RES_GAP_GLOBAL).min(self.r_u());
        }
        if self.res > self.r_top as f64 {
            self.r_top = self.r;
        }
    }

    fn r_prev_change_threshold(&self, std_r_change: f64) -> f64 {
        R_CHANGE_DECREASE_NORM * std_r_change
    }
}

/// Resolution (Angstroms) at which FSC first drops below
/// `FSC_RESOLUTION_THRESHOLD`, given FSC indexed by shell and the
/// pixel size.
pub fn resolution_from_fsc(fsc: &[f64], pixel_size: f64, side: usize) -> f64 {
    for (shell, &value) in fsc.iter().enumerate() {
        if value < FSC_RESOLUTION_THRESHOLD {
            let freq = shell as f64 / (side as f64 * pixel_size);
            return if freq > 0.0 { 1.0 / freq } else { f64::INFINITY };
        }
    }
    let last = fsc.len().max(1) as f64;
    side as f64 * pixel_size / last
}

/// Fourier Shell Correlation between two half-map Fourier volumes,
/// normalised by shell-wise magnitude.
pub fn fourier_shell_correlation(a: &FourierVolume, b: &FourierVolume, max_shell: usize) -> Vec<f64> {
    let n = a.n;
    let mut num = vec![num_complex::Complex64::new(0.0, 0.0); max_shell + 1];
    let mut den_a = vec![0.0f64; max_shell + 1];
    let mut den_b = vec![0.0f64; max_shell + 1];

    for z in 0..n {
        let zc = if z <= n / 2 { z as isize } else { z as isize - n as isize };
        for y in 0..n {
            let yc = if y <= n / 2 { y as isize } else { y as isize - n as isize };
            for x in 0..(n / 2 + 1) {
                let r = ((x as f64).powi(2) + (yc as f64).powi(2) + (zc as f64).powi(2)).sqrt();
                let shell = r.round() as usize;
                if shell > max_shell {
                    continue;
                }
                let va = a.data[[z, y, x]];
                let vb = b.data[[z, y, x]];
                num[shell] += va * vb.conj();
                den_a[shell] += va.norm_sqr();
                den_b[shell] += vb.norm_sqr();
            }
        }
    }

    (0..=max_shell)
        .map(|s| {
            let denom = (den_a[s] * den_b[s]).sqrt();
            if denom > 1e-300 {
                (num[s].re / denom).clamp(-1.0, 1.0)
            } else {
                0.0
            }
        })
        .collect()
}

/// Owns the reference volume, its Fourier-space forward transform, the
/// Projector's source data, a fresh Reconstructor per Maximization round,
/// and the FSC/resolution-state bookkeeping. One `Model` per hemisphere.
pub struct Model {
    pub n: usize,
    pub pf: usize,
    pub pixel_size: f64,
    pub reference: FourierVolume,
    pub fsc: Vec<f64>,
    pub snr: Vec<f64>,
    pub tau: Vec<f64>,
    pub resolution: ResolutionState,
    pub kernel_a: f64,
    pub kernel_alpha: f64,
}

impl Model {
    pub fn new(
        initial_volume: &RealVolume,
        pf: usize,
        pixel_size: f64,
        initial_r: usize,
        kernel_a: f64,
        kernel_alpha: f64,
    ) -> Self {
        let n = initial_volume.n;
        let padded = pad_volume(initial_volume, pf);
        let reference = fft::forward_3d(&padded);
        let max_r = n / 2;
        Self {
            n,
            pf,
            pixel_size,
            reference,
            fsc: vec![1.0; max_r * pf],
            snr: vec![1.0; max_r * pf],
            tau: vec![1.0; n * pf / 2 - 1],
            resolution: ResolutionState::new(initial_r, max_r),
            kernel_a,
            kernel_alpha,
        }
    }

    pub fn projector(&self) -> Projector<'_> {
        Projector::new(&self.reference, self.pf, self.resolution.r_u() as f64)
    }

    pub fn new_reconstructor(&self) -> Reconstructor3D {
        let kernel = KaiserBesselKernel::new(
            self.kernel_a,
            self.kernel_alpha,
            3,
            (self.resolution.r_u() * self.pf) as f64,
        );
        Reconstructor3D::new(self.n, self.pf, self.resolution.r_u() as f64, kernel)
    }

    /// Exchange references with the other hemisphere's model, compute
    /// FSC between them, and adopt the broadcast result. With a
    /// single-rank `LocalTransport`, `other` is this same hemisphere's
    /// previous reference and FSC degenerates to self-correlation (1.0
    /// everywhere) — acceptable for local/unit-test runs.
    pub fn bcast_fsc(&mut self, other: &FourierVolume) {
        let max_shell = self.fsc.len().saturating_sub(1);
        self.fsc = fourier_shell_correlation(&self.reference, other, max_shell);
        self.resolution.res = resolution_from_fsc(&self.fsc, self.pixel_size, self.n);
    }

    /// Replace the reference with a freshly reconstructed real-space
    /// volume: pad to the working side and forward-transform, mirroring
    /// what `new` does with the bootstrap volume.
    pub fn set_reference_from_real(&mut self, vol: &RealVolume) {
        let padded = pad_volume(vol, self.pf);
        self.reference = fft::forward_3d(&padded);
    }

    pub fn refresh_snr(&mut self) {
        self.snr = self
            .fsc
            .iter()
            .map(|&f| {
                let f = f.clamp(-0.999, 0.999);
                2.0 * f / (1.0 - f).max(1e-6)
            })
            .collect();
    }

    /// Shell-averaged signal power of the current reference, refreshed
    /// each iteration after `bcast_fsc`/`refresh_snr`.
    pub fn refresh_tau(&mut self) {
        let n = self.reference.n;
        let max_shell = self.tau.len().saturating_sub(1);
        let mut sum = vec![0.0; max_shell + 1];
        let mut count = vec![0usize; max_shell + 1];
        for z in 0..n {
            let zc = if z <= n / 2 { z as isize } else { z as isize - n as isize };
            for y in 0..n {
                let yc = if y <= n / 2 { y as isize } else { y as isize - n as isize };
                for x in 0..(n / 2 + 1) {
                    let r = ((x as f64).powi(2) + (yc as f64).powi(2) + (zc as f64).powi(2)).sqrt();
                    let s = (r.round() as usize).min(max_shell);
                    sum[s] += self.reference.data[[z, y, x]].norm_sqr();
                    count[s] += 1;
                }
            }
        }
        self.tau = sum
            .iter()
            .zip(count.iter())
            .map(|(&s, &c)| if c > 0 { s / c as f64 } else { 0.0 })
            .collect();
    }
}

fn pad_volume(vol: &RealVolume, pf: usize) -> RealVolume {
    if pf == 1 {
        return vol.clone();
    }
    let padded_n = vol.n * pf;
    let mut out = RealVolume::zeros(padded_n);
    let offset = (padded_n - vol.n) / 2;
    for k in 0..vol.n {
        for j in 0..vol.n {
            for i in 0..vol.n {
                out.data[[k + offset, j + offset, i + offset]] = vol.data[[k, j, i]];
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_state_transitions_global_to_local_at_expected_index() {
        let mut state = ResolutionState::new(16, 64);
        let r_changes = [1.0, 0.9, 0.85, 0.85, 0.85];
        let std_r_change = 0.1;
        let mut transitioned_at = None;
        for (idx, &rc) in r_changes.iter().enumerate() {
            state.advance(rc, std_r_change, 0.5, false);
            if state.search_type == SearchType::Local && transitioned_at.is_none() {
                transitioned_at = Some(idx);
            }
        }
        assert_eq!(transitioned_at, Some(3));
    }
}
