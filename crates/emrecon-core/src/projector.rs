//! Central-slice projection of a padded 3D Fourier reference onto a 2D
//! Fourier image under a rotation and an optional in-plane shift.

use num_complex::Complex64;

use crate::image::{FourierImage, FourierVolume};
use crate::linalg::{Mat3, Quaternion};

/// Interpolation kernel used when sampling the reference volume.
/// `Nearest` is used during the cheaper GLOBAL search phase, `Linear`
/// during LOCAL refinement and final reconstruction projections
/// (`INTERP_TYPE_GLOBAL`/`INTERP_TYPE_LOCAL` in the original).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InterpKind {
    Nearest,
    Linear,
}

pub struct Projector<'a> {
    reference: &'a FourierVolume,
    pf: usize,
    r_max: f64,
}

impl<'a> Projector<'a> {
    pub fn new(reference: &'a FourierVolume, pf: usize, r_max: f64) -> Self {
        Self { reference, pf, r_max }
    }

    fn sample(&self, p: (f64, f64, f64), kind: InterpKind) -> Complex64 {
        match kind {
            InterpKind::Nearest => {
                let (x, y, z) = (p.0.round() as isize, p.1.round() as isize, p.2.round() as isize);
                self.reference.get(x, y, z)
            }
            InterpKind::Linear => self.trilinear(p),
        }
    }

    fn trilinear(&self, (x, y, z): (f64, f64, f64)) -> Complex64 {
        let x0 = x.floor();
        let y0 = y.floor();
        let z0 = z.floor();
        let fx = x - x0;
        let fy = y - y0;
        let fz = z - z0;
        let (x0, y0, z0) = (x0 as isize, y0 as isize, z0 as isize);

        let mut acc = Complex64::new(0.0, 0.0);
        for (dx, wx) in [(0isize, 1.0 - fx), (1, fx)] {
            for (dy, wy) in [(0isize, 1.0 - fy), (1, fy)] {
                for (dz, wz) in [(0isize, 1.0 - fz), (1, fz)] {
                    let w = wx * wy * wz;
                    if w == 0.0 {
                        continue;
                    }
                    acc += self.reference.get(x0 + dx, y0 + dy, z0 + dz) * w;
                }
            }
        }
        acc
    }

    /// Fill `out` with the central slice of the padded reference under
    /// rotation `rot`, with an optional Fourier-space phase-ramp shift
    /// `(tx, ty)` (image pixels). Pixels with `i^2 + j^2 >= rMax^2` are
    /// left zero.
    pub fn project(
        &self,
        out: &mut FourierImage,
        rot: &Mat3,
        trans: Option<(f64, f64)>,
        kind: InterpKind,
    ) {
        let n = out.n;
        let r_max2 = self.r_max * self.r_max;
        let pf = self.pf as f64;
        let half = out.half_width();

        for yi in 0..n {
            let j = if yi <= n / 2 { yi as isize } else { yi as isize - n as isize };
            for i in 0..half {
                let i_f = i as f64;
                let j_f = j as f64;
                if i_f * i_f + j_f * j_f >= r_max2 {
                    continue;
                }
                let local = (i_f * pf, j_f * pf, 0.0);
                let p = rot.mul_vec(crate::linalg::Vec3::new(local.0, local.1, local.2));
                let mut v = self.sample((p.x(), p.y(), p.z()), kind);

                if let Some((tx, ty)) = trans {
                    let phase = -2.0 * std::f64::consts::PI * (i_f * tx + j_f * ty) / n as f64;
                    v *= Complex64::new(phase.cos(), phase.sin());
                }

                out.data[[yi, i]] = v;
            }
        }
    }
}

/// Quaternion-driven convenience wrapper around [`Projector::project`].
pub fn project_with_quaternion(
    projector: &Projector,
    out: &mut FourierImage,
    q: &Quaternion,
    trans: Option<(f64, f64)>,
    kind: InterpKind,
) {
    let rot = q.to_mat3();
    projector.project(out, &rot, trans, kind);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::RealVolume;

    #[test]
    fn identity_rotation_zero_translation_recovers_central_slice() {
        let n = 16;
        let pf = 1;
        let mut vol = RealVolume::zeros(n);
        for i in 0..n {
            for j in 0..n {
                for k in 0..n {
                    let di = i as f64 - n as f64 / 2.0;
                    let dj = j as f64 - n as f64 / 2.0;
                    let dk = k as f64 - n as f64 / 2.0;
                    vol.data[[k, j, i]] = (-(di * di + dj * dj + dk * dk) / 40.0).exp();
                }
            }
        }
        let spec = crate::fft::forward_3d(&vol);
        let projector = Projector::new(&spec, pf, (n / 2) as f64);

        let mut out = FourierImage::zeros(n);
        projector.project(&mut out, &Mat3::IDENTITY, None, InterpKind::Linear);

        for yi in 0..n {
            let j = if yi <= n / 2 { yi as isize } else { yi as isize - n as isize };
            for i in 0..out.half_width() {
                let expected = spec.get(i as isize, j, 0);
                let d = (out.data[[yi, i]] - expected).norm();
                assert!(d < 1e-9, "pixel ({i},{j}) diff {d}");
            }
        }
    }
}
