//! Modified Kaiser-Bessel (MKB) gridding kernel, order-0 variant.
//!
//! The corpus has no special-functions crate, so the handful of Bessel
//! values the order-0 MKB blob needs are computed directly: `I0` via the
//! standard rational/polynomial approximation, `I1` the same way, and
//! `I_{3/2}` from its elementary closed form (`sqrt(2/(pi x)) * (cosh x -
//! sinh x / x)`), which exists because the order is a half-integer. Both
//! the real-space profile and its Fourier transform are then *tabulated*
//! once at construction and looked up by linear interpolation, matching
//! how the kernel tables are described: precomputed forward/inverse
//! transforms used during gridding, not evaluated from scratch per pixel.

use crate::consts::EPSILON;

fn bessel_i0(x: f64) -> f64 {
    let ax = x.abs();
    if ax < 3.75 {
        let t = (x / 3.75).powi(2);
        1.0 + t
            * (3.5156229
                + t * (3.0899424
                    + t * (1.2067492 + t * (0.2659732 + t * (0.0360768 + t * 0.0045813)))))
    } else {
        let t = 3.75 / ax;
        (ax.exp() / ax.sqrt())
            * (0.39894228
                + t * (0.01328592
                    + t * (0.00225319
                        + t * (-0.00157565
                            + t * (0.00916281
                                + t * (-0.02057706
                                    + t * (0.02635537
                                        + t * (-0.01647633 + t * 0.00392377))))))))
    }
}

fn bessel_i1(x: f64) -> f64 {
    let ax = x.abs();
    let result = if ax < 3.75 {
        let t = (x / 3.75).powi(2);
        ax * (0.5
            + t * (0.87890594
                + t * (0.51498869
                    + t * (0.15084934 + t * (0.02658733 + t * (0.00301532 + t * 0.00032411))))))
    } else {
        let t = 3.75 / ax;
        let poly = 0.39894228
            + t * (-0.03988024
                + t * (-0.00362018
                    + t * (0.00163801
                        + t * (-0.01031555
                            + t * (0.02282967
                                + t * (-0.02895312 + t * (0.01787654 + t * (-0.00420059))))))));
        (ax.exp() / ax.sqrt()) * poly
    };
    result.copysign(x)
}

/// `I_{3/2}(x)`, exact via the elementary half-integer-order closed form.
fn bessel_i_three_half(x: f64) -> f64 {
    if x.abs() < 1e-8 {
        return 0.0;
    }
    (2.0 / (std::f64::consts::PI * x)).sqrt() * (x.cosh() - x.sinh() / x)
}

/// Real-space order-0 MKB blob profile, `I0(alpha * sqrt(1 - (r/a)^2)) / I0(alpha)`.
fn mkb_rl(r: f64, a: f64, alpha: f64, i0_alpha: f64) -> f64 {
    if r >= a {
        return 0.0;
    }
    let u = 1.0 - (r / a).powi(2);
    bessel_i0(alpha * u.max(0.0).sqrt()) / i0_alpha
}

/// Fourier-space order-0 MKB blob profile in `dim` dimensions, evaluated
/// at the pixel radius `r` (reciprocal-space distance in pixels).
fn mkb_ft(r: f64, a: f64, alpha: f64, dim: usize, i0_alpha: f64) -> f64 {
    let k = 2.0 * std::f64::consts::PI * a * r;
    let beta2 = alpha * alpha - k * k;
    let nu = dim as f64 / 2.0;
    let prefactor = (2.0 * std::f64::consts::PI).powf(nu) * a.powi(dim as i32) / i0_alpha;

    if beta2 >= 0.0 {
        let beta = beta2.sqrt();
        let bess = if dim == 3 {
            bessel_i_three_half(beta)
        } else {
            bessel_i1(beta)
        };
        if beta < 1e-8 {
            // I_nu(beta)/beta^nu -> 1/(2^nu * Gamma(nu+1)) as beta -> 0.
            let limit = if dim == 3 {
                1.0 / (2f64.powf(1.5) * 1.5 * 0.5 * std::f64::consts::PI.sqrt())
            } else {
                0.5
            };
            prefactor * limit
        } else {
            prefactor * bess / beta.powf(nu)
        }
    } else {
        // beta imaginary: I_nu(i y) = i^nu J_nu(y); the order-0 blob's FT
        // stays real because the imaginary prefactor cancels against the
        // odd/even symmetry of J_nu for these half-integer/integer orders.
        // In practice |k| rarely exceeds alpha within the kernel support,
        // so this branch only matters at the extreme edge of the table.
        let beta = (-beta2).sqrt();
        let bess = if dim == 3 {
            // J_{3/2}(y) = sqrt(2/(pi y)) * (sin y / y - cos y)
            if beta < 1e-8 {
                0.0
            } else {
                (2.0 / (std::f64::consts::PI * beta)).sqrt() * (beta.sin() / beta - beta.cos())
            }
        } else {
            // J_1 via its standard series for small-to-moderate argument.
            bessel_j1(beta)
        };
        if beta < 1e-8 {
            prefactor * 0.5
        } else {
            prefactor * bess / beta.powf(nu)
        }
    }
}

fn bessel_j1(x: f64) -> f64 {
    // Abramowitz & Stegun 9.4.5 / 9.4.6 rational approximation.
    let ax = x.abs();
    if ax < 8.0 {
        let y = x * x;
        let p1 = x
            * (72362614232.0
                + y * (-7895059235.0
                    + y * (242396853.1 + y * (-2972611.439 + y * (34785.56 + y * (-76.1)))))) ;
        let p2 = 144725228442.0
            + y * (2300535178.0
                + y * (18583304.74 + y * (99447.43 + y * (376.9991 + y))));
        p1 / p2
    } else {
        let z = 8.0 / ax;
        let y = z * z;
        let xx = ax - 2.356194491;
        let p1 = 1.0 + y * (0.00183105 + y * (-0.00003516396 + y * (0.00000245752)));
        let p2 = 0.04687499995 + y * (-0.0002002690 + y * 0.00001130634);
        let amp = (0.636619772 / ax).sqrt();
        amp * (p1 * xx.cos() - z * p2 * xx.sin()) * x.signum()
    }
}

/// A precomputed order-0 MKB kernel with forward/inverse transform tables.
#[derive(Clone, Debug)]
pub struct KaiserBesselKernel {
    pub a: f64,
    pub alpha: f64,
    pub dim: usize,
    rl_step: f64,
    rl_table: Vec<f64>,
    ft_step: f64,
    ft_table: Vec<f64>,
}

const TABLE_LEN: usize = 4096;

impl KaiserBesselKernel {
    /// `a` is the blob support radius in pixels, `alpha` its smoothness
    /// parameter, `dim` is 2 or 3, `r_ft_max` bounds the Fourier-space
    /// table's pixel radius (the reconstruction volume/image's `rMax`).
    pub fn new(a: f64, alpha: f64, dim: usize, r_ft_max: f64) -> Self {
        let i0_alpha = bessel_i0(alpha);

        let rl_step = a / (TABLE_LEN - 1) as f64;
        let rl_table: Vec<f64> = (0..TABLE_LEN)
            .map(|i| mkb_rl(i as f64 * rl_step, a, alpha, i0_alpha))
            .collect();

        let ft_step = r_ft_max.max(1.0) / (TABLE_LEN - 1) as f64;
        let ft_table: Vec<f64> = (0..TABLE_LEN)
            .map(|i| mkb_ft(i as f64 * ft_step, a, alpha, dim, i0_alpha))
            .collect();

        Self {
            a,
            alpha,
            dim,
            rl_step,
            rl_table,
            ft_step,
            ft_table,
        }
    }

    fn lookup(table: &[f64], step: f64, r: f64) -> f64 {
        if step <= 0.0 {
            return table[0];
        }
        let pos = (r.abs() / step).min((table.len() - 1) as f64);
        let lo = pos.floor() as usize;
        let hi = (lo + 1).min(table.len() - 1);
        let frac = pos - lo as f64;
        table[lo] * (1.0 - frac) + table[hi] * frac
    }

    /// Real-space blob weight at radius `r` pixels.
    pub fn rl(&self, r: f64) -> f64 {
        if r >= self.a {
            0.0
        } else {
            Self::lookup(&self.rl_table, self.rl_step, r)
        }
    }

    /// Fourier-space blob weight at pixel radius `r`.
    pub fn ft(&self, r: f64) -> f64 {
        Self::lookup(&self.ft_table, self.ft_step, r)
    }
}

/// Tikhonov / sinc^2 apodization-correction factor applied on output,
/// `sinc(pi r / n)^2`.
pub fn tikhonov_correction(r: f64, n: usize) -> f64 {
    let x = std::f64::consts::PI * r / n as f64;
    if x.abs() < EPSILON {
        1.0
    } else {
        (x.sin() / x).powi(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn i0_matches_known_value_at_zero_and_one() {
        assert!((bessel_i0(0.0) - 1.0).abs() < 1e-9);
        assert!((bessel_i0(1.0) - 1.2660658).abs() < 1e-6);
    }

    #[test]
    fn rl_profile_decreases_from_center_to_edge() {
        let k = KaiserBesselKernel::new(2.0, 10.0, 3, 32.0);
        assert!(k.rl(0.0) > k.rl(1.0));
        assert!(k.rl(1.0) > k.rl(1.9));
        assert_eq!(k.rl(2.5), 0.0);
    }

    #[test]
    fn ft_profile_is_finite_and_peaks_near_zero() {
        let k = KaiserBesselKernel::new(2.0, 10.0, 3, 32.0);
        let v0 = k.ft(0.0);
        let v_far = k.ft(20.0);
        assert!(v0.is_finite() && v_far.is_finite());
        assert!(v0 > 0.0);
    }

    #[test]
    fn tikhonov_is_one_at_origin_and_decays() {
        assert!((tikhonov_correction(0.0, 64) - 1.0).abs() < 1e-9);
        assert!(tikhonov_correction(10.0, 64) < 1.0);
    }
}
