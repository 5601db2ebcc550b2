//! Gridding-based Fourier-space reconstruction: insertion of weighted 2D
//! slices into a (2D or 3D) Fourier buffer, iterative weight balancing by
//! fixed-point kernel deconvolution, symmetrization, and the final
//! inverse transform to a real-space density.
//!
//! Modeled as a shared [`Reconstruct`] trait with two distinct
//! implementations (`Reconstructor3D`, `Reconstructor2D`) rather than one
//! type carrying a runtime dimensionality flag, per the REDESIGN FLAGS
//! note preferring tagged-variant-of-modes or a shared trait over ad hoc
//! mode flags. [`ReconstructMode`] is the tag callers use to pick which
//! one to build.

use num_complex::Complex64;

use crate::consts::{
    BALANCE_C_FLOOR, DIFF_C_DECREASE_THRES, DIFF_C_THRES, FSC_BASE_H, FSC_BASE_L, EPSILON,
    MAX_N_ITER_BALANCE, MIN_N_ITER_BALANCE, N_DIFF_C_NO_DECREASE,
};
use crate::error::Result;
use crate::fft;
use crate::image::{FourierImage, FourierVolume, RealHalfImage, RealHalfVolume, RealImage, RealVolume};
use crate::kernel::{tikhonov_correction, KaiserBesselKernel};
use crate::linalg::Mat3;
use crate::transport::Transport;

/// Tag selecting which concrete reconstructor to build; carried by
/// `Model` rather than branched on inside a single reconstructor type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconstructMode {
    TwoD,
    ThreeD,
}

/// Shared contract both reconstructor dimensionalities implement.
pub trait Reconstruct {
    /// Accumulate one CTF-weighted 2D Fourier slice, spread with the
    /// gridding kernel under rotation/shift already baked into `rot`'s
    /// caller (the Projector supplies the same rotation used to produce
    /// the slice being inserted back).
    fn insert(&mut self, src: &FourierImage, ctf: &FourierImage, rot: &Mat3, weight: f64);

    /// All-reduce `F`/`T` within the hemisphere (delegated to the
    /// caller's `Transport`) and, for 3D, symmetrize both buffers.
    fn symmetrize(&mut self, ops: &[Mat3]);

    /// Run the balance loop, returning the number of iterations used and
    /// whether it converged (`false` means `MAX_N_ITER_BALANCE` was hit
    /// without satisfying either exit condition — not an error).
    fn balance(&mut self, fsc: Option<&[f64]>, join_half: bool) -> (usize, bool);

    fn r_max(&self) -> f64;
}

fn shell_index(r: f64) -> usize {
    r.round().max(0.0) as usize
}

fn wiener_term(fsc: f64, join_half: bool) -> f64 {
    let f = if join_half {
        (2.0 * fsc / (1.0 + fsc)).max(0.0).sqrt()
    } else {
        fsc
    };
    let clamped = f.clamp(FSC_BASE_L, FSC_BASE_H);
    (1.0 - clamped) / clamped
}

// --------------------------------------------------------------------
// 3D reconstructor
// --------------------------------------------------------------------

pub struct Reconstructor3D {
    n: usize,
    pf: usize,
    r_max: f64,
    kernel: KaiserBesselKernel,
    f: FourierVolume,
    t: RealHalfVolume,
    w: RealHalfVolume,
}

impl Reconstructor3D {
    pub fn new(n: usize, pf: usize, r_max: f64, kernel: KaiserBesselKernel) -> Self {
        let padded = n * pf;
        Self {
            n,
            pf,
            r_max,
            kernel,
            f: FourierVolume::zeros(padded),
            t: RealHalfVolume::zeros(padded),
            w: RealHalfVolume::zeros(padded),
        }
    }

    fn in_band(&self, x: f64, y: f64, z: f64) -> bool {
        let r2 = x * x + y * y + z * z;
        r2 < (self.r_max * self.pf as f64).powi(2)
    }

    /// Spread a single contribution onto the nearest integer grid point
    /// and its immediate neighbors, weighted by the kernel's real-space
    /// profile evaluated at each neighbor's distance from `p` — the
    /// standard gridding spread.
    fn spread<F: Fn(&mut FourierVolume, &mut RealHalfVolume, isize, isize, isize, f64)>(
        &mut self,
        p: (f64, f64, f64),
        apply: F,
    ) {
        let (x0, y0, z0) = (p.0.floor() as isize, p.1.floor() as isize, p.2.floor() as isize);
        for dx in -1..=2 {
            for dy in -1..=2 {
                for dz in -1..=2 {
                    let gx = x0 + dx;
                    let gy = y0 + dy;
                    let gz = z0 + dz;
                    let dist = ((gx as f64 - p.0).powi(2)
                        + (gy as f64 - p.1).powi(2)
                        + (gz as f64 - p.2).powi(2))
                    .sqrt();
                    let weight = self.kernel.rl(dist);
                    if weight <= 0.0 {
                        continue;
                    }
                    apply(&mut self.f, &mut self.t, gx, gy, gz, weight);
                }
            }
        }
    }
}

impl Reconstruct for Reconstructor3D {
    fn insert(&mut self, src: &FourierImage, ctf: &FourierImage, rot: &Mat3, weight: f64) {
        let n = src.n;
        let r_max2 = self.r_max * self.r_max;
        let pf = self.pf as f64;
        let half = src.half_width();

        for yi in 0..n {
            let j = if yi <= n / 2 { yi as isize } else { yi as isize - n as isize };
            for i in 0..half {
                let i_f = i as f64;
                let j_f = j as f64;
                if i_f * i_f + j_f * j_f >= r_max2 {
                    continue;
                }
                let p = rot.mul_vec(crate::linalg::Vec3::new(i_f * pf, j_f * pf, 0.0));
                let ctf_val = ctf.get(i as isize, j).re;
                let src_val = src.data[[yi, i]];
                let f_contrib = src_val * ctf_val * weight;
                let t_contrib = ctf_val * ctf_val * weight;

                if !self.in_band(p.x(), p.y(), p.z()) {
                    continue;
                }

                let point = (p.x(), p.y(), p.z());
                self.spread(point, |f, t, gx, gy, gz, w| {
                    f.add(gx, gy, gz, f_contrib * w);
                    t.add(gx, gy, gz, t_contrib * w);
                });
            }
        }
    }

    fn symmetrize(&mut self, ops: &[Mat3]) {
        if ops.len() <= 1 {
            return;
        }
        let order = ops.len() as f64;
        let original_f = self.f.clone();
        let original_t = self.t.clone();
        let n = self.f.n as isize;

        for z in 0..n {
            for y in 0..n {
                for x in 0..(n / 2 + 1) {
                    let zc = if z <= n / 2 { z } else { z - n };
                    let yc = if y <= n / 2 { y } else { y - n };
                    let mut f_acc = Complex64::new(0.0, 0.0);
                    let mut t_acc = 0.0;
                    for op in ops {
                        let src = op
                            .transpose()
                            .mul_vec(crate::linalg::Vec3::new(x as f64, yc as f64, zc as f64));
                        f_acc += interpolate_fourier_volume(&original_f, src);
                        t_acc += interpolate_real_half_volume(&original_t, src);
                    }
                    self.f.data[[z as usize, y as usize, x as usize]] = f_acc / order;
                    self.t.data[[z as usize, y as usize, x as usize]] = t_acc / order;
                }
            }
        }
    }

    fn balance(&mut self, fsc: Option<&[f64]>, join_half: bool) -> (usize, bool) {
        let n = self.w.n;
        let band2 = (self.r_max * self.pf as f64).powi(2);

        for z in 0..n {
            let zc = if z <= n / 2 { z as isize } else { z as isize - n as isize };
            for y in 0..n {
                let yc = if y <= n / 2 { y as isize } else { y as isize - n as isize };
                for x in 0..(n / 2 + 1) {
                    let r2 = (x as f64).powi(2) + (yc as f64).powi(2) + (zc as f64).powi(2);
                    self.w.data[[z, y, x]] = if r2 < band2 { 1.0 } else { 0.0 };
                }
            }
        }

        if let Some(fsc) = fsc {
            let mut shell_sum = vec![0.0; fsc.len() + 1];
            let mut shell_count = vec![0usize; fsc.len() + 1];
            for z in 0..n {
                let zc = if z <= n / 2 { z as isize } else { z as isize - n as isize };
                for y in 0..n {
                    let yc = if y <= n / 2 { y as isize } else { y as isize - n as isize };
                    for x in 0..(n / 2 + 1) {
                        let r = ((x as f64).powi(2) + (yc as f64).powi(2) + (zc as f64).powi(2)).sqrt();
                        let s = shell_index(r).min(fsc.len());
                        shell_sum[s] += self.t.data[[z, y, x]];
                        shell_count[s] += 1;
                    }
                }
            }
            let shell_avg: Vec<f64> = shell_sum
                .iter()
                .zip(shell_count.iter())
                .map(|(&s, &c)| if c > 0 { s / c as f64 } else { 0.0 })
                .collect();

            for z in 0..n {
                let zc = if z <= n / 2 { z as isize } else { z as isize - n as isize };
                for y in 0..n {
                    let yc = if y <= n / 2 { y as isize } else { y as isize - n as isize };
                    for x in 0..(n / 2 + 1) {
                        let r = ((x as f64).powi(2) + (yc as f64).powi(2) + (zc as f64).powi(2)).sqrt();
                        let s = shell_index(r).min(fsc.len() - 1);
                        let term = wiener_term(fsc[s], join_half) * shell_avg[s.min(shell_avg.len() - 1)];
                        self.t.data[[z, y, x]] += term;
                    }
                }
            }
        }

        let mut prev_diff = f64::INFINITY;
        let mut no_decrease = 0u32;

        for iter in 0..MAX_N_ITER_BALANCE {
            let mut c = FourierVolume::zeros(n);
            for z in 0..n {
                for y in 0..n {
                    for x in 0..(n / 2 + 1) {
                        c.data[[z, y, x]] = Complex64::new(self.t.data[[z, y, x]] * self.w.data[[z, y, x]], 0.0);
                    }
                }
            }

            let real_space = fft::inverse_3d(&c);
            let center = n as f64 / 2.0;
            let mut profiled = RealVolume::zeros(n);
            for (idx, &v) in real_space.data.indexed_iter() {
                let (k, j, i) = idx;
                let d = ((i as f64 - center).powi(2)
                    + (j as f64 - center).powi(2)
                    + (k as f64 - center).powi(2))
                .sqrt();
                profiled.data[idx] = v * self.kernel.rl(d);
            }
            let c = fft::forward_3d(&profiled);

            let mut diff_c = 0.0_f64;
            for z in 0..n {
                for y in 0..n {
                    for x in 0..(n / 2 + 1) {
                        let zc = if z <= n / 2 { z as isize } else { z as isize - n as isize };
                        let yc = if y <= n / 2 { y as isize } else { y as isize - n as isize };
                        let r2 = (x as f64).powi(2) + (yc as f64).powi(2) + (zc as f64).powi(2);
                        if r2 >= band2 {
                            continue;
                        }
                        let mag = c.data[[z, y, x]].norm();
                        self.w.data[[z, y, x]] /= mag.max(BALANCE_C_FLOOR);
                        diff_c = diff_c.max((mag - 1.0).abs());
                    }
                }
            }

            if diff_c < DIFF_C_THRES {
                return (iter + 1, true);
            }
            if iter + 1 >= MIN_N_ITER_BALANCE {
                if diff_c > prev_diff * DIFF_C_DECREASE_THRES {
                    no_decrease += 1;
                } else {
                    no_decrease = 0;
                }
                if no_decrease >= N_DIFF_C_NO_DECREASE as u32 {
                    return (iter + 1, true);
                }
            }
            prev_diff = diff_c;
        }

        tracing::warn!("reconstructor balance loop did not converge within {MAX_N_ITER_BALANCE} iterations");
        (MAX_N_ITER_BALANCE, false)
    }

    fn r_max(&self) -> f64 {
        self.r_max
    }
}

impl Reconstructor3D {
    /// `prepareTF`: all-reduce `F`/`T` within the hemisphere, then (for
    /// orders above `C1`) symmetrize both buffers.
    pub fn prepare_tf<Tr: Transport>(&mut self, transport: &Tr, ops: &[Mat3]) -> Result<()> {
        let mut f_flat: Vec<f64> = self.f.data.iter().flat_map(|c| [c.re, c.im]).collect();
        transport.all_reduce_sum_hemisphere(&mut f_flat)?;
        for (c, chunk) in self.f.data.iter_mut().zip(f_flat.chunks_exact(2)) {
            *c = Complex64::new(chunk[0], chunk[1]);
        }

        let mut t_flat: Vec<f64> = self.t.data.iter().cloned().collect();
        transport.all_reduce_sum_hemisphere(&mut t_flat)?;
        for (v, nv) in self.t.data.iter_mut().zip(t_flat) {
            *v = nv;
        }

        self.symmetrize(ops);
        Ok(())
    }
}

impl Reconstructor3D {
    /// Form `F * W`, inverse-FFT, crop to the unpadded side, divide by
    /// the kernel's real-space profile and the Tikhonov correction, and
    /// optionally clamp negative densities.
    pub fn reconstruct(&self, clamp_negative: bool) -> RealVolume {
        let padded = self.f.n;
        let mut weighted = FourierVolume::zeros(padded);
        for z in 0..padded {
            for y in 0..padded {
                for x in 0..(padded / 2 + 1) {
                    weighted.data[[z, y, x]] = self.f.data[[z, y, x]] * self.w.data[[z, y, x]];
                }
            }
        }
        let full = fft::inverse_3d(&weighted);

        let crop_start = (padded - self.n) / 2;
        let mut out = RealVolume::zeros(self.n);
        let center = self.n as f64 / 2.0;
        for k in 0..self.n {
            for j in 0..self.n {
                for i in 0..self.n {
                    let v = full.data[[k + crop_start, j + crop_start, i + crop_start]];
                    let d = ((i as f64 - center).powi(2) + (j as f64 - center).powi(2) + (k as f64 - center).powi(2))
                        .sqrt();
                    let profile = self.kernel.rl(d).max(EPSILON);
                    let tik = tikhonov_correction(d, self.n).max(EPSILON);
                    let mut value = v / profile / tik;
                    if clamp_negative {
                        value = value.max(0.0);
                    }
                    out.data[[k, j, i]] = value;
                }
            }
        }
        out
    }
}

fn interpolate_fourier_volume(vol: &FourierVolume, p: crate::linalg::Vec3) -> Complex64 {
    let (x0, y0, z0) = (p.x().floor() as isize, p.y().floor() as isize, p.z().floor() as isize);
    let (fx, fy, fz) = (p.x() - x0 as f64, p.y() - y0 as f64, p.z() - z0 as f64);
    let mut acc = Complex64::new(0.0, 0.0);
    for (dx, wx) in [(0isize, 1.0 - fx), (1, fx)] {
        for (dy, wy) in [(0isize, 1.0 - fy), (1, fy)] {
            for (dz, wz) in [(0isize, 1.0 - fz), (1, fz)] {
                acc += vol.get(x0 + dx, y0 + dy, z0 + dz) * (wx * wy * wz);
            }
        }
    }
    acc
}

fn interpolate_real_half_volume(vol: &RealHalfVolume, p: crate::linalg::Vec3) -> f64 {
    let (x0, y0, z0) = (p.x().floor() as isize, p.y().floor() as isize, p.z().floor() as isize);
    let (fx, fy, fz) = (p.x() - x0 as f64, p.y() - y0 as f64, p.z() - z0 as f64);
    let mut acc = 0.0;
    for (dx, wx) in [(0isize, 1.0 - fx), (1, fx)] {
        for (dy, wy) in [(0isize, 1.0 - fy), (1, fy)] {
            for (dz, wz) in [(0isize, 1.0 - fz), (1, fz)] {
                acc += vol.get(x0 + dx, y0 + dy, z0 + dz) * (wx * wy * wz);
            }
        }
    }
    acc
}

// --------------------------------------------------------------------
// 2D reconstructor (single-class-average / preset-pixel-list mode)
// --------------------------------------------------------------------

pub struct Reconstructor2D {
    n: usize,
    pf: usize,
    r_max: f64,
    kernel: KaiserBesselKernel,
    f: FourierImage,
    t: RealHalfImage,
    w: RealHalfImage,
}

impl Reconstructor2D {
    pub fn new(n: usize, pf: usize, r_max: f64, kernel: KaiserBesselKernel) -> Self {
        let padded = n * pf;
        Self {
            n,
            pf,
            r_max,
            kernel,
            f: FourierImage::zeros(padded),
            t: RealHalfImage::zeros(padded),
            w: RealHalfImage::zeros(padded),
        }
    }
}

impl Reconstruct for Reconstructor2D {
    fn insert(&mut self, src: &FourierImage, ctf: &FourierImage, rot: &Mat3, weight: f64) {
        let n = src.n;
        let r_max2 = self.r_max * self.r_max;
        let pf = self.pf as f64;
        let half = src.half_width();

        for yi in 0..n {
            let j = if yi <= n / 2 { yi as isize } else { yi as isize - n as isize };
            for i in 0..half {
                let i_f = i as f64;
                let j_f = j as f64;
                if i_f * i_f + j_f * j_f >= r_max2 {
                    continue;
                }
                let p = rot.mul_vec(crate::linalg::Vec3::new(i_f * pf, j_f * pf, 0.0));
                let ctf_val = ctf.get(i as isize, j).re;
                let f_contrib = src.data[[yi, i]] * ctf_val * weight;
                let t_contrib = ctf_val * ctf_val * weight;

                let (x0, y0) = (p.x().floor() as isize, p.y().floor() as isize);
                for dx in -1..=2 {
                    for dy in -1..=2 {
                        let gx = x0 + dx;
                        let gy = y0 + dy;
                        let dist = ((gx as f64 - p.x()).powi(2) + (gy as f64 - p.y()).powi(2)).sqrt();
                        let w = self.kernel.rl(dist);
                        if w <= 0.0 {
                            continue;
                        }
                        self.f.add(gx, gy, f_contrib * w);
                        self.t.add(gx, gy, t_contrib * w);
                    }
                }
            }
        }
    }

    fn symmetrize(&mut self, _ops: &[Mat3]) {
        // 2D class-average reconstructions are not symmetrized; symmetry
        // folding happens in the pose filter before insertion.
    }

    fn balance(&mut self, fsc: Option<&[f64]>, join_half: bool) -> (usize, bool) {
        let n = self.w.n;
        let band2 = (self.r_max * self.pf as f64).powi(2);

        for y in 0..n {
            let yc = if y <= n / 2 { y as isize } else { y as isize - n as isize };
            for x in 0..(n / 2 + 1) {
                let r2 = (x as f64).powi(2) + (yc as f64).powi(2);
                self.w.data[[y, x]] = if r2 < band2 { 1.0 } else { 0.0 };
            }
        }

        if let Some(fsc) = fsc {
            let mut shell_sum = vec![0.0; fsc.len() + 1];
            let mut shell_count = vec![0usize; fsc.len() + 1];
            for y in 0..n {
                let yc = if y <= n / 2 { y as isize } else { y as isize - n as isize };
                for x in 0..(n / 2 + 1) {
                    let r = ((x as f64).powi(2) + (yc as f64).powi(2)).sqrt();
                    let s = shell_index(r).min(fsc.len());
                    shell_sum[s] += self.t.data[[y, x]];
                    shell_count[s] += 1;
                }
            }
            let shell_avg: Vec<f64> = shell_sum
                .iter()
                .zip(shell_count.iter())
                .map(|(&s, &c)| if c > 0 { s / c as f64 } else { 0.0 })
                .collect();
            for y in 0..n {
                let yc = if y <= n / 2 { y as isize } else { y as isize - n as isize };
                for x in 0..(n / 2 + 1) {
                    let r = ((x as f64).powi(2) + (yc as f64).powi(2)).sqrt();
                    let s = shell_index(r).min(fsc.len() - 1);
                    let term = wiener_term(fsc[s], join_half) * shell_avg[s.min(shell_avg.len() - 1)];
                    self.t.data[[y, x]] += term;
                }
            }
        }

        let mut prev_diff = f64::INFINITY;
        let mut no_decrease = 0u32;

        for iter in 0..MAX_N_ITER_BALANCE {
            let mut c = FourierImage::zeros(n);
            for y in 0..n {
                for x in 0..(n / 2 + 1) {
                    c.data[[y, x]] = Complex64::new(self.t.data[[y, x]] * self.w.data[[y, x]], 0.0);
                }
            }
            let real_space = fft::inverse_2d(&c);
            let center = n as f64 / 2.0;
            let mut profiled = RealImage::zeros(n);
            for ((j, i), &v) in real_space.data.indexed_iter() {
                let d = ((i as f64 - center).powi(2) + (j as f64 - center).powi(2)).sqrt();
                profiled.data[[j, i]] = v * self.kernel.rl(d);
            }
            let c = fft::forward_2d(&profiled);

            let mut diff_c = 0.0_f64;
            for y in 0..n {
                let yc = if y <= n / 2 { y as isize } else { y as isize - n as isize };
                for x in 0..(n / 2 + 1) {
                    let r2 = (x as f64).powi(2) + (yc as f64).powi(2);
                    if r2 >= band2 {
                        continue;
                    }
                    let mag = c.data[[y, x]].norm();
                    self.w.data[[y, x]] /= mag.max(BALANCE_C_FLOOR);
                    diff_c = diff_c.max((mag - 1.0).abs());
                }
            }

            if diff_c < DIFF_C_THRES {
                return (iter + 1, true);
            }
            if iter + 1 >= MIN_N_ITER_BALANCE {
                if diff_c > prev_diff * DIFF_C_DECREASE_THRES {
                    no_decrease += 1;
                } else {
                    no_decrease = 0;
                }
                if no_decrease >= N_DIFF_C_NO_DECREASE as u32 {
                    return (iter + 1, true);
                }
            }
            prev_diff = diff_c;
        }

        tracing::warn!("reconstructor balance loop did not converge within {MAX_N_ITER_BALANCE} iterations");
        (MAX_N_ITER_BALANCE, false)
    }

    fn r_max(&self) -> f64 {
        self.r_max
    }
}

impl Reconstructor2D {
    /// `prepareTF`, 2D analogue of [`Reconstructor3D::prepare_tf`]. No
    /// symmetrization step: 2D class averages fold symmetry into the
    /// pose filter before insertion instead.
    pub fn prepare_tf<Tr: Transport>(&mut self, transport: &Tr, ops: &[Mat3]) -> Result<()> {
        let mut f_flat: Vec<f64> = self.f.data.iter().flat_map(|c| [c.re, c.im]).collect();
        transport.all_reduce_sum_hemisphere(&mut f_flat)?;
        for (c, chunk) in self.f.data.iter_mut().zip(f_flat.chunks_exact(2)) {
            *c = Complex64::new(chunk[0], chunk[1]);
        }

        let mut t_flat: Vec<f64> = self.t.data.iter().cloned().collect();
        transport.all_reduce_sum_hemisphere(&mut t_flat)?;
        for (v, nv) in self.t.data.iter_mut().zip(t_flat) {
            *v = nv;
        }

        self.symmetrize(ops);
        Ok(())
    }
}

impl Reconstructor2D {
    pub fn reconstruct(&self, clamp_negative: bool) -> RealImage {
        let padded = self.f.n;
        let mut weighted = FourierImage::zeros(padded);
        for y in 0..padded {
            for x in 0..(padded / 2 + 1) {
                weighted.data[[y, x]] = self.f.data[[y, x]] * self.w.data[[y, x]];
            }
        }
        let full = fft::inverse_2d(&weighted);

        let crop_start = (padded - self.n) / 2;
        let mut out = RealImage::zeros(self.n);
        let center = self.n as f64 / 2.0;
        for j in 0..self.n {
            for i in 0..self.n {
                let v = full.data[[j + crop_start, i + crop_start]];
                let d = ((i as f64 - center).powi(2) + (j as f64 - center).powi(2)).sqrt();
                let profile = self.kernel.rl(d).max(EPSILON);
                let tik = tikhonov_correction(d, self.n).max(EPSILON);
                let mut value = v / profile / tik;
                if clamp_negative {
                    value = value.max(0.0);
                }
                out.data[[j, i]] = value;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::KaiserBesselKernel;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_kernel(r_max: f64) -> KaiserBesselKernel {
        KaiserBesselKernel::new(2.0, 10.0, 3, r_max * 2.0)
    }

    #[test]
    fn balance_converges_from_random_insertions() {
        let n = 16;
        let r_max = (n / 2) as f64;
        let mut rec = Reconstructor3D::new(n, 1, r_max, random_kernel(r_max));
        let mut rng = StdRng::seed_from_u64(5);

        for _ in 0..10_000 {
            let p = (
                rng.gen_range(-r_max..r_max),
                rng.gen_range(-r_max..r_max),
                rng.gen_range(-r_max..r_max),
            );
            if p.0 * p.0 + p.1 * p.1 + p.2 * p.2 >= r_max * r_max {
                continue;
            }
            rec.spread(p, |f, t, gx, gy, gz, w| {
                f.add(gx, gy, gz, Complex64::new(w, 0.0));
                t.add(gx, gy, gz, w);
            });
        }

        let (iters, converged) = rec.balance(None, false);
        assert!(converged, "balance loop failed to converge");
        assert!(iters <= MAX_N_ITER_BALANCE);
    }
}
