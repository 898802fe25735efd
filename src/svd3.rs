//! Fixed-size singular value decomposition of 3x3 matrices.
//!
//! Used by both [`crate::pca`] (covariance eigenbasis) and
//! [`crate::icp::kabsch`] (cross-covariance decomposition). A general-purpose
//! SVD routine would dominate runtime once called inside the ICP inner loop
//! (up to hundreds of times per `register` call), so this is a fixed-size
//! cyclic Jacobi routine instead.

use nalgebra::{Matrix3, Vector3};

use crate::error::RegistrationError;

const MAX_SWEEPS: usize = 30;
const CONVERGENCE_THRESHOLD: f64 = 1e-14;
const SINGULAR_VALUE_FLOOR: f64 = 1e-12;

/// `A = U * diag(singular_values) * Vᵀ`, singular values sorted descending.
#[derive(Clone, Copy, Debug)]
pub struct Svd3 {
    pub u: Matrix3<f64>,
    pub singular_values: Vector3<f64>,
    pub v: Matrix3<f64>,
}

/// Decomposes a 3x3 matrix via cyclic one-sided Jacobi on `AᵀA`.
///
/// Fails with [`RegistrationError::NumericBreakdown`] if a sweep produces
/// non-finite entries.
pub fn svd3(a: &Matrix3<f64>) -> Result<Svd3, RegistrationError> {
    let mut ata = a.transpose() * a;
    let mut v = Matrix3::<f64>::identity();

    for _ in 0..MAX_SWEEPS {
        if off_diagonal_sq_sum(&ata) < CONVERGENCE_THRESHOLD {
            break;
        }
        for p in 0..2 {
            for q in (p + 1)..3 {
                jacobi_rotate(&mut ata, &mut v, p, q);
            }
        }
        if !ata.iter().all(|x| x.is_finite()) {
            return Err(RegistrationError::NumericBreakdown { step: "svd3" });
        }
    }

    let mut singular_values = Vector3::new(
        ata[(0, 0)].max(0.0).sqrt(),
        ata[(1, 1)].max(0.0).sqrt(),
        ata[(2, 2)].max(0.0).sqrt(),
    );

    // Sort singular values (and the matching columns of V) descending.
    let mut order = [0usize, 1, 2];
    order.sort_by(|&i, &j| singular_values[j].partial_cmp(&singular_values[i]).unwrap());
    let sorted_values = Vector3::new(
        singular_values[order[0]],
        singular_values[order[1]],
        singular_values[order[2]],
    );
    let sorted_v = Matrix3::from_columns(&[
        v.column(order[0]).into_owned(),
        v.column(order[1]).into_owned(),
        v.column(order[2]).into_owned(),
    ]);
    singular_values = sorted_values;
    v = sorted_v;

    let mut u_columns: Vec<Vector3<f64>> = Vec::with_capacity(3);
    for col in 0..3 {
        if singular_values[col] > SINGULAR_VALUE_FLOOR {
            u_columns.push((a * v.column(col)) / singular_values[col]);
        } else {
            // Gram-Schmidt against the columns already settled, so U stays
            // orthonormal even when this singular value is (near) zero.
            let mut candidate = Vector3::new(1.0, 0.0, 0.0);
            if u_columns
                .iter()
                .any(|c| (c.dot(&candidate)).abs() > 1.0 - 1e-9)
            {
                candidate = Vector3::new(0.0, 1.0, 0.0);
            }
            for prior in &u_columns {
                candidate -= prior * prior.dot(&candidate);
            }
            let norm = candidate.norm();
            if norm < 1e-9 {
                candidate = Vector3::new(0.0, 0.0, 1.0);
                for prior in &u_columns {
                    candidate -= prior * prior.dot(&candidate);
                }
            }
            u_columns.push(candidate.normalize());
        }
    }
    let u = Matrix3::from_columns(&u_columns);

    if !u.iter().all(|x| x.is_finite()) || !v.iter().all(|x| x.is_finite()) {
        return Err(RegistrationError::NumericBreakdown { step: "svd3" });
    }

    Ok(Svd3 {
        u,
        singular_values,
        v,
    })
}

fn off_diagonal_sq_sum(m: &Matrix3<f64>) -> f64 {
    m[(0, 1)].powi(2) + m[(0, 2)].powi(2) + m[(1, 2)].powi(2)
}

/// One Jacobi rotation zeroing `m[(p,q)]` (and `m[(q,p)]`), accumulating the
/// rotation into `v`.
fn jacobi_rotate(m: &mut Matrix3<f64>, v: &mut Matrix3<f64>, p: usize, q: usize) {
    let mpq = m[(p, q)];
    if mpq.abs() < 1e-300 {
        return;
    }

    let theta = (m[(q, q)] - m[(p, p)]) / (2.0 * mpq);
    let t = theta.signum() / (theta.abs() + (1.0 + theta * theta).sqrt());
    let t = if theta == 0.0 { 1.0 } else { t };
    let c = 1.0 / (1.0 + t * t).sqrt();
    let s = t * c;

    let mpp = m[(p, p)];
    let mqq = m[(q, q)];
    m[(p, p)] = c * c * mpp - 2.0 * s * c * mpq + s * s * mqq;
    m[(q, q)] = s * s * mpp + 2.0 * s * c * mpq + c * c * mqq;
    m[(p, q)] = 0.0;
    m[(q, p)] = 0.0;

    for i in 0..3 {
        if i != p && i != q {
            let mip = m[(i, p)];
            let miq = m[(i, q)];
            m[(i, p)] = c * mip - s * miq;
            m[(p, i)] = m[(i, p)];
            m[(i, q)] = s * mip + c * miq;
            m[(q, i)] = m[(i, q)];
        }
        let vip = v[(i, p)];
        let viq = v[(i, q)];
        v[(i, p)] = c * vip - s * viq;
        v[(i, q)] = s * vip + c * viq;
    }
}
