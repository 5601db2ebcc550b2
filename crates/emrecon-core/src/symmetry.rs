//! Symmetry point-group enumeration and fundamental-domain folding.
//!
//! `symmetry_operators` is a pure function from a group name to its
//! rotation-matrix set — no in-place parsing state, per the REDESIGN
//! FLAGS note against the original's string-driven group construction.

use std::f64::consts::PI;

use crate::error::{EmError, Result};
use crate::linalg::{Mat3, Quaternion};

fn rot_z(angle: f64) -> Mat3 {
    let (s, c) = angle.sin_cos();
    Mat3([[c, -s, 0.0], [s, c, 0.0], [0.0, 0.0, 1.0]])
}

fn rot_x(angle: f64) -> Mat3 {
    let (s, c) = angle.sin_cos();
    Mat3([[1.0, 0.0, 0.0], [0.0, c, -s], [0.0, s, c]])
}

fn cyclic(order: u32) -> Vec<Mat3> {
    (0..order)
        .map(|k| rot_z(2.0 * PI * k as f64 / order as f64))
        .collect()
}

fn dihedral(order: u32) -> Vec<Mat3> {
    let mut ops = cyclic(order);
    let flip = Mat3([[1.0, 0.0, 0.0], [0.0, -1.0, 0.0], [0.0, 0.0, -1.0]]);
    let extra: Vec<Mat3> = ops.iter().map(|m| m.mul_mat(&flip)).collect();
    ops.extend(extra);
    ops
}

/// `CnV`: an `n`-fold rotation axis plus `n` vertical mirror-equivalent
/// proper rotations (realized, as the original does, purely by proper
/// rotation matrices rather than true reflections).
fn cn_v(order: u32) -> Vec<Mat3> {
    let mut ops = cyclic(order);
    let flip = rot_x(PI);
    let extra: Vec<Mat3> = ops.iter().map(|m| m.mul_mat(&flip)).collect();
    ops.extend(extra);
    ops
}

fn tetrahedral() -> Vec<Mat3> {
    let mut ops = vec![Mat3::IDENTITY];
    let axes = [
        Vec3n::new(1.0, 1.0, 1.0),
        Vec3n::new(1.0, -1.0, -1.0),
        Vec3n::new(-1.0, 1.0, -1.0),
        Vec3n::new(-1.0, -1.0, 1.0),
    ];
    for axis in axes {
        for turns in 1..3 {
            ops.push(axis_angle(axis, 2.0 * PI * turns as f64 / 3.0));
        }
    }
    for axis in [Vec3n::new(1.0, 0.0, 0.0), Vec3n::new(0.0, 1.0, 0.0), Vec3n::new(0.0, 0.0, 1.0)] {
        ops.push(axis_angle(axis, PI));
    }
    ops
}

fn octahedral() -> Vec<Mat3> {
    let mut ops = vec![Mat3::IDENTITY];
    for axis in [Vec3n::new(1.0, 0.0, 0.0), Vec3n::new(0.0, 1.0, 0.0), Vec3n::new(0.0, 0.0, 1.0)] {
        for turns in 1..4 {
            ops.push(axis_angle(axis, PI / 2.0 * turns as f64));
        }
    }
    let face_diag = [
        Vec3n::new(1.0, 1.0, 0.0),
        Vec3n::new(1.0, -1.0, 0.0),
        Vec3n::new(1.0, 0.0, 1.0),
        Vec3n::new(1.0, 0.0, -1.0),
        Vec3n::new(0.0, 1.0, 1.0),
        Vec3n::new(0.0, 1.0, -1.0),
    ];
    for axis in face_diag {
        ops.push(axis_angle(axis, PI));
    }
    let body_diag = [
        Vec3n::new(1.0, 1.0, 1.0),
        Vec3n::new(1.0, -1.0, 1.0),
        Vec3n::new(1.0, 1.0, -1.0),
        Vec3n::new(1.0, -1.0, -1.0),
    ];
    for axis in body_diag {
        for turns in 1..3 {
            ops.push(axis_angle(axis, 2.0 * PI * turns as f64 / 3.0));
        }
    }
    ops
}

/// The 60 proper rotations of the icosahedral group, in the `I1`
/// convention (a 2-fold axis, not the 5-fold axis, lies along Z).
///
/// Built from the 120-element binary icosahedral group of unit
/// quaternions — the 24 Hurwitz units of the binary tetrahedral
/// subgroup plus the 96 "icosian" quaternions formed from even
/// permutations of `(0, ±1, ±phi, ±1/phi)/2` — then halved by
/// collapsing each antipodal pair `q, -q` to the one rotation they
/// both represent.
fn icosahedral() -> Vec<Mat3> {
    let phi = (1.0 + 5.0_f64.sqrt()) / 2.0;
    let inv_phi = phi - 1.0;

    let mut quats: Vec<[f64; 4]> = Vec::with_capacity(120);

    for i in 0..4 {
        for s in [1.0, -1.0] {
            let mut q = [0.0; 4];
            q[i] = s;
            quats.push(q);
        }
    }
    for s0 in [1.0, -1.0] {
        for s1 in [1.0, -1.0] {
            for s2 in [1.0, -1.0] {
                for s3 in [1.0, -1.0] {
                    quats.push([0.5 * s0, 0.5 * s1, 0.5 * s2, 0.5 * s3]);
                }
            }
        }
    }

    let values = [0.0, 1.0, phi, inv_phi];
    for perm in even_permutations_of_4() {
        let base = [values[perm[0]], values[perm[1]], values[perm[2]], values[perm[3]]];
        let zero_idx = base.iter().position(|&v| v == 0.0).unwrap();
        let nonzero: Vec<usize> = (0..4).filter(|&k| k != zero_idx).collect();
        for mask in 0..8u8 {
            let mut q = base;
            for (bit, &k) in nonzero.iter().enumerate() {
                if (mask >> bit) & 1 == 1 {
                    q[k] = -q[k];
                }
            }
            quats.push([q[0] * 0.5, q[1] * 0.5, q[2] * 0.5, q[3] * 0.5]);
        }
    }

    let mut seen: Vec<[f64; 4]> = Vec::with_capacity(60);
    let mut ops = Vec::with_capacity(60);
    'outer: for q in quats {
        for s in &seen {
            let same = (0..4).all(|i| (q[i] - s[i]).abs() < 1e-9);
            let opposite = (0..4).all(|i| (q[i] + s[i]).abs() < 1e-9);
            if same || opposite {
                continue 'outer;
            }
        }
        seen.push(q);
        ops.push(Quaternion::from_slice(q).to_mat3());
    }
    ops
}

/// The 12 even permutations of `[0, 1, 2, 3]`.
fn even_permutations_of_4() -> Vec<[usize; 4]> {
    let mut items = [0usize, 1, 2, 3];
    let mut all = Vec::with_capacity(24);
    permute(&mut items, 0, &mut all);
    all.into_iter().filter(is_even_permutation).collect()
}

fn permute(items: &mut [usize; 4], k: usize, out: &mut Vec<[usize; 4]>) {
    if k == items.len() {
        out.push(*items);
        return;
    }
    for i in k..items.len() {
        items.swap(k, i);
        permute(items, k + 1, out);
        items.swap(k, i);
    }
}

fn is_even_permutation(p: &[usize; 4]) -> bool {
    let mut inversions = 0;
    for i in 0..4 {
        for j in (i + 1)..4 {
            if p[i] > p[j] {
                inversions += 1;
            }
        }
    }
    inversions % 2 == 0
}

#[derive(Clone, Copy)]
struct Vec3n {
    v: [f64; 3],
}

impl Vec3n {
    fn new(x: f64, y: f64, z: f64) -> Self {
        let n = (x * x + y * y + z * z).sqrt();
        Self { v: [x / n, y / n, z / n] }
    }
}

fn axis_angle(axis: Vec3n, angle: f64) -> Mat3 {
    let (x, y, z) = (axis.v[0], axis.v[1], axis.v[2]);
    let (s, c) = angle.sin_cos();
    let t = 1.0 - c;
    Mat3([
        [t * x * x + c, t * x * y - s * z, t * x * z + s * y],
        [t * x * y + s * z, t * y * y + c, t * y * z - s * x],
        [t * x * z - s * y, t * y * z + s * x, t * z * z + c],
    ])
}

/// Enumerate the rotation matrices of a named point group (`C1, C2, ...,
/// C_nV, D2, D3, ..., T, O, I`). `I` is the 60-element icosahedral
/// rotation group in the `I1` axis convention (2-fold axis along Z).
pub fn symmetry_operators(name: &str) -> Result<Vec<Mat3>> {
    let upper = name.trim().to_ascii_uppercase();
    if upper == "C1" {
        return Ok(vec![Mat3::IDENTITY]);
    }
    if let Some(rest) = upper.strip_prefix('C') {
        if let Some(n) = rest.strip_suffix('V') {
            if let Ok(order) = n.parse::<u32>() {
                if order >= 2 {
                    return Ok(cn_v(order));
                }
            }
        } else if let Ok(order) = rest.parse::<u32>() {
            if order >= 1 {
                return Ok(cyclic(order));
            }
        }
    }
    if let Some(rest) = upper.strip_prefix('D') {
        if let Ok(order) = rest.parse::<u32>() {
            if order >= 2 {
                return Ok(dihedral(order));
            }
        }
    }
    match upper.as_str() {
        "T" => Ok(tetrahedral()),
        "O" => Ok(octahedral()),
        "I" => Ok(icosahedral()),
        _ => Err(EmError::UnknownSymmetry(name.to_string())),
    }
}

/// The order of the cyclic subgroup of rotations about the z-axis
/// within `ops`: `n` for `Cn`, `CnV`, and `Dn` alike (the latter two
/// carry `2n` operators total, but only `n` of them are pure z-axis
/// rotations — the rest are that same cyclic subgroup composed with an
/// x-axis flip). This is the quantity that sets the asymmetric unit's
/// `phi` period, not the group's full operator count.
///
/// For `T`, `O`, and `I` the z-axis is just one of several distinct
/// rotation axes (3-fold, 4-fold, 2-fold respectively for `T`/`O`, a
/// 2-fold axis for `I` in the `I1` convention), so the resulting `phi`
/// period folds only the cyclic symmetry about that one axis, not the
/// full polyhedral fundamental domain — the same approximation already
/// in use for `T` and `O` below, extended unchanged to `I`.
fn z_axis_fold_order(ops: &[Mat3]) -> usize {
    ops.iter()
        .filter(|m| {
            let r = &m.0;
            r[2][0].abs() < 1e-9 && r[2][1].abs() < 1e-9 && r[0][2].abs() < 1e-9 && r[1][2].abs() < 1e-9
                && (r[2][2] - 1.0).abs() < 1e-9
        })
        .count()
        .max(1)
}

/// `phi ∈ [0, 2π/n_fold)`-style fundamental-domain test for `CnV`/`Cn`
/// groups: `theta ∈ [0, π/2]` (projection direction folded to the upper
/// hemisphere) and `phi ∈ [0, π)` folded to the group's first sector.
/// For `C1` every direction is already fundamental.
pub fn in_asymmetric_unit(phi: f64, theta: f64, ops: &[Mat3]) -> bool {
    let phi_period = 2.0 * PI / z_axis_fold_order(ops) as f64;
    theta >= 0.0 && theta <= PI / 2.0 + 1e-9 && phi >= -1e-9 && phi < phi_period + 1e-9
}

/// Map a unit quaternion into the symmetry group's asymmetric unit by
/// converting to Euler angles, folding `(phi, theta)`, and converting
/// back; `psi` passes through unchanged.
pub fn fold_into_asymmetric_unit(q: Quaternion, ops: &[Mat3]) -> Quaternion {
    let (mut phi, mut theta, psi) = q.to_euler_zyz();

    if theta < 0.0 {
        theta = -theta;
        phi += PI;
    }
    if theta > PI / 2.0 {
        theta = PI - theta;
        phi += PI;
    }

    let phi_period = 2.0 * PI / z_axis_fold_order(ops) as f64;
    phi = phi.rem_euclid(2.0 * PI);
    phi = phi.rem_euclid(phi_period.max(1e-12));

    Quaternion::from_euler_zyz(phi, theta, psi)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn c1_has_one_operator() {
        assert_eq!(symmetry_operators("C1").unwrap().len(), 1);
    }

    #[test]
    fn c2v_has_four_operators() {
        assert_eq!(symmetry_operators("C2V").unwrap().len(), 4);
    }

    #[test]
    fn unknown_symmetry_is_an_error() {
        assert!(symmetry_operators("Z99").is_err());
    }

    #[test]
    fn icosahedral_has_sixty_operators() {
        assert_eq!(symmetry_operators("I").unwrap().len(), 60);
    }

    #[test]
    fn icosahedral_operators_are_all_proper_rotations() {
        let ops = symmetry_operators("I").unwrap();
        for op in &ops {
            let det = op.0[0][0] * (op.0[1][1] * op.0[2][2] - op.0[1][2] * op.0[2][1])
                - op.0[0][1] * (op.0[1][0] * op.0[2][2] - op.0[1][2] * op.0[2][0])
                + op.0[0][2] * (op.0[1][0] * op.0[2][1] - op.0[1][1] * op.0[2][0]);
            assert!((det - 1.0).abs() < 1e-9, "determinant {det}");
        }
    }

    #[test]
    fn icosahedral_operators_are_distinct() {
        let ops = symmetry_operators("I").unwrap();
        for i in 0..ops.len() {
            for j in (i + 1)..ops.len() {
                let same = ops[i]
                    .0
                    .iter()
                    .zip(ops[j].0.iter())
                    .all(|(a, b)| a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() < 1e-9));
                assert!(!same, "operators {i} and {j} coincide");
            }
        }
    }

    #[test]
    fn c2v_fold_order_is_the_two_fold_axis_not_the_operator_count() {
        let ops = symmetry_operators("C2V").unwrap();
        assert_eq!(ops.len(), 4);
        assert_eq!(z_axis_fold_order(&ops), 2);
    }

    #[test]
    fn c2v_fold_lands_in_asymmetric_unit() {
        let ops = symmetry_operators("C2V").unwrap();
        let mut rng_state: u64 = 0x2545F4914F6CDD1D;
        for _ in 0..10_000 {
            rng_state = rng_state.wrapping_mul(6364136223846793005).wrapping_add(1);
            let a = (rng_state >> 11) as f64 / (1u64 << 53) as f64;
            rng_state = rng_state.wrapping_mul(6364136223846793005).wrapping_add(1);
            let b = (rng_state >> 11) as f64 / (1u64 << 53) as f64;
            rng_state = rng_state.wrapping_mul(6364136223846793005).wrapping_add(1);
            let c = (rng_state >> 11) as f64 / (1u64 << 53) as f64;
            let q = Quaternion::new(a - 0.5, b - 0.5, c - 0.5, 0.3).normalized();
            let folded = fold_into_asymmetric_unit(q, &ops);
            let (phi, theta, _) = folded.to_euler_zyz();
            assert!(theta >= -1e-6 && theta <= PI / 2.0 + 1e-6, "theta={theta}");
            assert!(phi >= -1e-6 && phi <= PI + 1e-6, "phi={phi}");
        }
    }
}
