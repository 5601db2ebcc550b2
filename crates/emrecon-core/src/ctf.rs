//! Contrast Transfer Function evaluator.
//!
//! Produces the real-valued oscillatory CTF image from known microscope
//! and per-particle parameters. Estimating these parameters from a
//! micrograph is out of scope; this module only evaluates the closed-form
//! CTF given them, matching spec's "external adapters" boundary.

use ndarray::Array2;

use crate::image::FourierImage;

/// Known microscope/particle parameters needed to evaluate a CTF image.
#[derive(Clone, Copy, Debug)]
pub struct CtfParams {
    pub voltage: f64,
    pub defocus_u: f64,
    pub defocus_v: f64,
    pub defocus_angle: f64,
    pub cs: f64,
    pub pixel_size: f64,
    pub amplitude_contrast: f64,
}

impl Default for CtfParams {
    fn default() -> Self {
        Self {
            voltage: 300_000.0,
            defocus_u: 10_000.0,
            defocus_v: 10_000.0,
            defocus_angle: 0.0,
            cs: 2_700_000.0,
            pixel_size: 1.0,
            amplitude_contrast: 0.1,
        }
    }
}

fn electron_wavelength_angstrom(voltage: f64) -> f64 {
    // Relativistic electron wavelength, voltage in volts, result in Angstroms.
    let h = 6.62607015e-34;
    let m = 9.1093837015e-31;
    let e = 1.602176634e-19;
    let c = 299_792_458.0;
    let lambda_m = h / (2.0 * m * e * voltage * (1.0 + e * voltage / (2.0 * m * c * c))).sqrt();
    lambda_m * 1e10
}

/// A 2D real-valued CTF image of side `n`, evaluated once at construction
/// and immutable thereafter (it is stored as a [`FourierImage`] even
/// though every value is real, since it is only ever multiplied against
/// true Fourier-space data).
#[derive(Clone, Debug)]
pub struct CtfImage {
    pub n: usize,
    pub values: Array2<f64>,
}

impl CtfImage {
    pub fn compute(n: usize, params: &CtfParams) -> Self {
        let lambda = electron_wavelength_angstrom(params.voltage);
        let cs = params.cs;
        let half = n / 2 + 1;
        let mut values = Array2::zeros((n, half));

        for y in 0..n {
            let ly = if y <= n / 2 { y as isize } else { y as isize - n as isize };
            for x in 0..half {
                let lx = x as isize;
                let freq_x = lx as f64 / (n as f64 * params.pixel_size);
                let freq_y = ly as f64 / (n as f64 * params.pixel_size);
                let freq2 = freq_x * freq_x + freq_y * freq_y;
                if freq2 <= 0.0 {
                    values[[y, x]] = -params.amplitude_contrast;
                    continue;
                }

                let angle = freq_y.atan2(freq_x);
                let defocus = 0.5
                    * (params.defocus_u + params.defocus_v
                        + (params.defocus_u - params.defocus_v)
                            * (2.0 * (angle - params.defocus_angle)).cos());

                let gamma = std::f64::consts::PI * lambda * freq2 * defocus
                    - 0.5 * std::f64::consts::PI * cs * lambda.powi(3) * freq2 * freq2;

                let ac = params.amplitude_contrast;
                values[[y, x]] = -(gamma.sin() * (1.0 - ac * ac).sqrt() + gamma.cos() * ac);
            }
        }

        Self { n, values }
    }

    pub fn get(&self, x: isize, y: isize) -> f64 {
        let half = self.n / 2 + 1;
        if x >= 0 && (x as usize) < half {
            let yy = ((y.rem_euclid(self.n as isize)) as usize).min(self.n - 1);
            self.values[[yy, x as usize]]
        } else {
            let yy = ((-y).rem_euclid(self.n as isize)) as usize;
            self.values[[yy, (-x) as usize]]
        }
    }

    /// View this CTF as a (real-valued) `FourierImage`.
    pub fn as_fourier_image(&self) -> FourierImage {
        let mut img = FourierImage::zeros(self.n);
        for y in 0..self.n {
            for x in 0..img.half_width() {
                img.data[[y, x]] = num_complex::Complex64::new(self.values[[y, x]], 0.0);
            }
        }
        img
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ctf_at_zero_frequency_is_minus_amplitude_contrast() {
        let params = CtfParams::default();
        let ctf = CtfImage::compute(32, &params);
        assert!((ctf.get(0, 0) - (-params.amplitude_contrast)).abs() < 1e-12);
    }

    #[test]
    fn ctf_values_are_bounded() {
        let params = CtfParams::default();
        let ctf = CtfImage::compute(32, &params);
        for &v in ctf.values.iter() {
            assert!(v >= -1.0 - 1e-9 && v <= 1.0 + 1e-9);
        }
    }
}
