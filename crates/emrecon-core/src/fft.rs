//! Forward/inverse FFTs between [`crate::image`]'s real-space types and
//! their Hermitian half-spectrum counterparts.
//!
//! Follows the teacher's row-then-column separable-pass approach (see
//! `compute/cpu.rs`'s `fft2d_forward`/`ifft2d_inverse`), generalised to
//! also drive a third axis for volumes, and to emit/consume the
//! half-spectrum representation rather than a full complex plane.

use ndarray::{Array2, Array3, Axis};
use num_complex::Complex64;
use rustfft::FftPlanner;

use crate::consts::PARALLEL_PIXEL_THRESHOLD;
use crate::image::{FourierImage, FourierVolume, RealImage, RealVolume};

fn fft_rows(plan: &dyn rustfft::Fft<f64>, data: &mut Array2<Complex64>) {
    let parallel = data.nrows() * data.ncols() >= PARALLEL_PIXEL_THRESHOLD;
    if parallel {
        use rayon::prelude::*;
        data.axis_iter_mut(Axis(0)).into_par_iter().for_each(|mut row| {
            let slice = row.as_slice_mut().expect("contiguous row");
            plan.process(slice);
        });
    } else {
        for mut row in data.axis_iter_mut(Axis(0)) {
            let slice = row.as_slice_mut().expect("contiguous row");
            plan.process(slice);
        }
    }
}

fn fft_cols(plan: &dyn rustfft::Fft<f64>, data: &mut Array2<Complex64>) {
    let ncols = data.ncols();
    let parallel = data.nrows() * ncols >= PARALLEL_PIXEL_THRESHOLD;
    let do_col = |data: &mut Array2<Complex64>, c: usize| {
        let mut col: Vec<Complex64> = data.column(c).to_vec();
        plan.process(&mut col);
        for (r, v) in col.into_iter().enumerate() {
            data[[r, c]] = v;
        }
    };
    if parallel {
        let mut cols: Vec<Vec<Complex64>> = (0..ncols).map(|c| data.column(c).to_vec()).collect();
        use rayon::prelude::*;
        cols.par_iter_mut().for_each(|col| plan.process(col));
        for (c, col) in cols.into_iter().enumerate() {
            for (r, v) in col.into_iter().enumerate() {
                data[[r, c]] = v;
            }
        }
    } else {
        for c in 0..ncols {
            do_col(data, c);
        }
    }
}

/// Forward real -> Hermitian half-spectrum, 2D.
pub fn forward_2d(img: &RealImage) -> FourierImage {
    let n = img.n;
    let mut plane: Array2<Complex64> =
        img.data.mapv(|v| Complex64::new(v, 0.0));

    let mut planner = FftPlanner::new();
    let row_plan = planner.plan_fft_forward(n);
    let col_plan = planner.plan_fft_forward(n);
    fft_rows(row_plan.as_ref(), &mut plane);
    fft_cols(col_plan.as_ref(), &mut plane);

    let mut out = FourierImage::zeros(n);
    let half = out.half_width();
    for y in 0..n {
        for x in 0..half {
            out.data[[y, x]] = plane[[y, x]];
        }
    }
    out
}

/// Inverse Hermitian half-spectrum -> real, 2D. Reconstructs the
/// redundant negative-frequency half via `F(-x, -y) = conj(F(x, y))`
/// before running the inverse complex FFT, then divides by `n^2`.
pub fn inverse_2d(spec: &FourierImage) -> RealImage {
    let n = spec.n;
    let mut plane: Array2<Complex64> = Array2::zeros((n, n));
    let half = spec.half_width();
    for y in 0..n {
        for x in 0..half {
            plane[[y, x]] = spec.data[[y, x]];
        }
    }
    for y in 0..n {
        for x in half..n {
            let src_y = (n - y) % n;
            let src_x = n - x;
            plane[[y, x]] = plane[[src_y, src_x]].conj();
        }
    }

    let mut planner = FftPlanner::new();
    let row_plan = planner.plan_fft_inverse(n);
    let col_plan = planner.plan_fft_inverse(n);
    fft_cols(col_plan.as_ref(), &mut plane);
    fft_rows(row_plan.as_ref(), &mut plane);

    let scale = 1.0 / (n * n) as f64;
    RealImage::from_data(plane.mapv(|v| v.re * scale))
}

/// Forward real -> Hermitian half-spectrum, 3D. Separable passes along
/// x, then y, then z.
pub fn forward_3d(vol: &RealVolume) -> FourierVolume {
    let n = vol.n;
    let mut cube: Array3<Complex64> = vol.data.mapv(|v| Complex64::new(v, 0.0));

    let mut planner = FftPlanner::new();
    let plan = planner.plan_fft_forward(n);

    for mut line in cube.lanes_mut(Axis(2)) {
        let slice = line.as_slice_mut().expect("contiguous x-lane");
        plan.process(slice);
    }
    for mut line in cube.lanes_mut(Axis(1)) {
        let mut buf: Vec<Complex64> = line.to_vec();
        plan.process(&mut buf);
        for (i, v) in buf.into_iter().enumerate() {
            line[i] = v;
        }
    }
    for mut line in cube.lanes_mut(Axis(0)) {
        let mut buf: Vec<Complex64> = line.to_vec();
        plan.process(&mut buf);
        for (i, v) in buf.into_iter().enumerate() {
            line[i] = v;
        }
    }

    let mut out = FourierVolume::zeros(n);
    let half = n / 2 + 1;
    for z in 0..n {
        for y in 0..n {
            for x in 0..half {
                out.data[[z, y, x]] = cube[[z, y, x]];
            }
        }
    }
    out
}

/// Inverse Hermitian half-spectrum -> real, 3D.
pub fn inverse_3d(spec: &FourierVolume) -> RealVolume {
    let n = spec.n;
    let half = n / 2 + 1;
    let mut cube: Array3<Complex64> = Array3::zeros((n, n, n));
    for z in 0..n {
        for y in 0..n {
            for x in 0..half {
                cube[[z, y, x]] = spec.data[[z, y, x]];
            }
        }
    }
    for z in 0..n {
        for y in 0..n {
            for x in half..n {
                let sz = (n - z) % n;
                let sy = (n - y) % n;
                let sx = n - x;
                cube[[z, y, x]] = cube[[sz, sy, sx]].conj();
            }
        }
    }

    let mut planner = FftPlanner::new();
    let plan = planner.plan_fft_inverse(n);

    for mut line in cube.lanes_mut(Axis(0)) {
        let mut buf: Vec<Complex64> = line.to_vec();
        plan.process(&mut buf);
        for (i, v) in buf.into_iter().enumerate() {
            line[i] = v;
        }
    }
    for mut line in cube.lanes_mut(Axis(1)) {
        let mut buf: Vec<Complex64> = line.to_vec();
        plan.process(&mut buf);
        for (i, v) in buf.into_iter().enumerate() {
            line[i] = v;
        }
    }
    for mut line in cube.lanes_mut(Axis(2)) {
        let slice = line.as_slice_mut().expect("contiguous x-lane");
        plan.process(slice);
    }

    let scale = 1.0 / (n * n * n) as f64;
    RealVolume::from_data(cube.mapv(|v| v.re * scale))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_2d_is_close_to_identity() {
        let n = 16;
        let mut img = RealImage::zeros(n);
        for i in 0..n {
            for j in 0..n {
                img.data[[i, j]] = ((i * 7 + j * 3) % 11) as f64 - 5.0;
            }
        }
        let spec = forward_2d(&img);
        let back = inverse_2d(&spec);

        let mut num = 0.0;
        let mut den = 0.0;
        for i in 0..n {
            for j in 0..n {
                let d = img.data[[i, j]] - back.data[[i, j]];
                num += d * d;
                den += img.data[[i, j]] * img.data[[i, j]];
            }
        }
        assert!((num / den).sqrt() < 1e-10);
    }

    #[test]
    fn round_trip_3d_is_close_to_identity() {
        let n = 8;
        let mut vol = RealVolume::zeros(n);
        for i in 0..n {
            for j in 0..n {
                for k in 0..n {
                    vol.data[[i, j, k]] = ((i + j * 2 + k * 5) % 7) as f64 - 3.0;
                }
            }
        }
        let spec = forward_3d(&vol);
        let back = inverse_3d(&spec);

        let mut num = 0.0;
        let mut den = 0.0;
        for ((i, j, k), &v) in vol.data.indexed_iter() {
            let d = v - back.data[[i, j, k]];
            num += d * d;
            den += v * v;
        }
        assert!((num / den).sqrt() < 1e-10);
    }
}
