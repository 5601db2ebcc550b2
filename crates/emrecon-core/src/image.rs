//! Real-space and Fourier-space image/volume types.
//!
//! A [`FourierImage`]/[`FourierVolume`] never actually materialises the
//! negative-frequency half of the spectrum: storage is the Hermitian
//! half-spectrum described in the data model, and `get`/`set`/`add` fold
//! negative logical frequencies onto their conjugate partner. This keeps
//! "at most one space populated at a time" true by construction — a caller
//! simply never has a type that could hold both.

use ndarray::{Array2, Array3};
use num_complex::Complex64;

/// A square real-space 2D image, side `n` (even).
#[derive(Clone, Debug)]
pub struct RealImage {
    pub data: Array2<f64>,
    pub n: usize,
}

impl RealImage {
    pub fn zeros(n: usize) -> Self {
        Self {
            data: Array2::zeros((n, n)),
            n,
        }
    }

    pub fn from_data(data: Array2<f64>) -> Self {
        let n = data.nrows();
        debug_assert_eq!(data.ncols(), n, "real images must be square");
        Self { data, n }
    }
}

/// The Hermitian half-spectrum of a 2D Fourier transform, side `n`.
/// Storage shape is `(n, n/2 + 1)`: row is the wrapped logical `y`
/// frequency (`0..n/2` is non-negative, `n/2..n` is negative), column is
/// the non-negative logical `x` frequency `0..=n/2`.
#[derive(Clone, Debug)]
pub struct FourierImage {
    pub data: Array2<Complex64>,
    pub n: usize,
}

fn wrap(v: isize, n: usize) -> usize {
    (v.rem_euclid(n as isize)) as usize
}

impl FourierImage {
    pub fn zeros(n: usize) -> Self {
        Self {
            data: Array2::zeros((n, n / 2 + 1)),
            n,
        }
    }

    /// Half-spectrum column count, `n/2 + 1`.
    pub fn half_width(&self) -> usize {
        self.n / 2 + 1
    }

    /// Get `F(x, y)` for logical (possibly negative) frequency coordinates.
    pub fn get(&self, x: isize, y: isize) -> Complex64 {
        if x >= 0 {
            self.data[[wrap(y, self.n), x as usize]]
        } else {
            self.data[[wrap(-y, self.n), (-x) as usize]].conj()
        }
    }

    /// Set `F(x, y)`, storing via the conjugate partner when `x < 0`.
    pub fn set(&mut self, x: isize, y: isize, v: Complex64) {
        if x >= 0 {
            self.data[[wrap(y, self.n), x as usize]] = v;
        } else {
            self.data[[wrap(-y, self.n), (-x) as usize]] = v.conj();
        }
    }

    /// Accumulate `F(x, y) += v`.
    pub fn add(&mut self, x: isize, y: isize, v: Complex64) {
        if x >= 0 {
            self.data[[wrap(y, self.n), x as usize]] += v;
        } else {
            self.data[[wrap(-y, self.n), (-x) as usize]] += v.conj();
        }
    }
}

/// A cubic real-space 3D volume, side `n` (even).
#[derive(Clone, Debug)]
pub struct RealVolume {
    pub data: Array3<f64>,
    pub n: usize,
}

impl RealVolume {
    pub fn zeros(n: usize) -> Self {
        Self {
            data: Array3::zeros((n, n, n)),
            n,
        }
    }

    pub fn from_data(data: Array3<f64>) -> Self {
        let n = data.shape()[0];
        Self { data, n }
    }
}

/// The Hermitian half-spectrum of a 3D Fourier transform, side `n`.
/// Storage shape `(n, n, n/2 + 1)`: first two axes are wrapped logical
/// `z`, `y`; last axis is the non-negative logical `x` frequency.
#[derive(Clone, Debug)]
pub struct FourierVolume {
    pub data: Array3<Complex64>,
    pub n: usize,
}

impl FourierVolume {
    pub fn zeros(n: usize) -> Self {
        Self {
            data: Array3::zeros((n, n, n / 2 + 1)),
            n,
        }
    }

    pub fn get(&self, x: isize, y: isize, z: isize) -> Complex64 {
        if x >= 0 {
            self.data[[wrap(z, self.n), wrap(y, self.n), x as usize]]
        } else {
            self.data[[wrap(-z, self.n), wrap(-y, self.n), (-x) as usize]].conj()
        }
    }

    pub fn set(&mut self, x: isize, y: isize, z: isize, v: Complex64) {
        if x >= 0 {
            self.data[[wrap(z, self.n), wrap(y, self.n), x as usize]] = v;
        } else {
            self.data[[wrap(-z, self.n), wrap(-y, self.n), (-x) as usize]] = v.conj();
        }
    }

    pub fn add(&mut self, x: isize, y: isize, z: isize, v: Complex64) {
        if x >= 0 {
            self.data[[wrap(z, self.n), wrap(y, self.n), x as usize]] += v;
        } else {
            self.data[[wrap(-z, self.n), wrap(-y, self.n), (-x) as usize]] += v.conj();
        }
    }
}

/// A real-valued scalar field over the same half-spectrum domain as
/// [`FourierImage`] (used for the Reconstructor's `T`/`W` buffers, which
/// are real and symmetric: `field(-x, -y) == field(x, y)`).
#[derive(Clone, Debug)]
pub struct RealHalfImage {
    pub data: Array2<f64>,
    pub n: usize,
}

impl RealHalfImage {
    pub fn zeros(n: usize) -> Self {
        Self {
            data: Array2::zeros((n, n / 2 + 1)),
            n,
        }
    }

    pub fn filled(n: usize, value: f64) -> Self {
        Self {
            data: Array2::from_elem((n, n / 2 + 1), value),
            n,
        }
    }

    pub fn get(&self, x: isize, y: isize) -> f64 {
        if x >= 0 {
            self.data[[wrap(y, self.n), x as usize]]
        } else {
            self.data[[wrap(-y, self.n), (-x) as usize]]
        }
    }

    pub fn set(&mut self, x: isize, y: isize, v: f64) {
        if x >= 0 {
            self.data[[wrap(y, self.n), x as usize]] = v;
        } else {
            self.data[[wrap(-y, self.n), (-x) as usize]] = v;
        }
    }

    pub fn add(&mut self, x: isize, y: isize, v: f64) {
        if x >= 0 {
            self.data[[wrap(y, self.n), x as usize]] += v;
        } else {
            self.data[[wrap(-y, self.n), (-x) as usize]] += v;
        }
    }
}

/// The 3D analogue of [`RealHalfImage`], for the volume Reconstructor's
/// `T`/`W` buffers.
#[derive(Clone, Debug)]
pub struct RealHalfVolume {
    pub data: Array3<f64>,
    pub n: usize,
}

impl RealHalfVolume {
    pub fn zeros(n: usize) -> Self {
        Self {
            data: Array3::zeros((n, n, n / 2 + 1)),
            n,
        }
    }

    pub fn filled(n: usize, value: f64) -> Self {
        Self {
            data: Array3::from_elem((n, n, n / 2 + 1), value),
            n,
        }
    }

    pub fn get(&self, x: isize, y: isize, z: isize) -> f64 {
        if x >= 0 {
            self.data[[wrap(z, self.n), wrap(y, self.n), x as usize]]
        } else {
            self.data[[wrap(-z, self.n), wrap(-y, self.n), (-x) as usize]]
        }
    }

    pub fn set(&mut self, x: isize, y: isize, z: isize, v: f64) {
        if x >= 0 {
            self.data[[wrap(z, self.n), wrap(y, self.n), x as usize]] = v;
        } else {
            self.data[[wrap(-z, self.n), wrap(-y, self.n), (-x) as usize]] = v;
        }
    }

    pub fn add(&mut self, x: isize, y: isize, z: isize, v: f64) {
        if x >= 0 {
            self.data[[wrap(z, self.n), wrap(y, self.n), x as usize]] += v;
        } else {
            self.data[[wrap(-z, self.n), wrap(-y, self.n), (-x) as usize]] += v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fourier_image_negative_lookup_is_conjugate() {
        let mut img = FourierImage::zeros(8);
        img.set(2, 3, Complex64::new(1.0, 2.0));
        assert_eq!(img.get(-2, -3), Complex64::new(1.0, -2.0));
    }

    #[test]
    fn fourier_volume_negative_lookup_is_conjugate() {
        let mut vol = FourierVolume::zeros(8);
        vol.set(1, 2, 3, Complex64::new(0.5, -1.5));
        assert_eq!(vol.get(-1, -2, -3), Complex64::new(0.5, 1.5));
    }
}
