//! Classical (Torgerson) scaling used as the deterministic starting
//! configuration for the nonmetric solver.
//!
//! B = −½ · J · D² · J with J the centring matrix; the embedding is the top-k
//! eigenvectors of B scaled by √λ. Eigenpairs come from cyclic Jacobi
//! rotations, which are exact enough for the site counts this crate sees and
//! fully deterministic.

use crate::distance::DistanceMatrix;

const MAX_SWEEPS: usize = 64;
const EPS: f64 = 1e-14;

/// Eigen-decomposition of the symmetric `n × n` row-major matrix `a`
/// (overwritten). Returns `(eigenvalues, eigenvectors)`; eigenvector `j` is
/// column `j` of the row-major `vectors` matrix.
pub(crate) fn jacobi_eigen(a: &mut [f64], n: usize) -> (Vec<f64>, Vec<f64>) {
    let mut v = vec![0.0; n * n];
    for i in 0..n {
        v[i * n + i] = 1.0;
    }

    let frob: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    for _ in 0..MAX_SWEEPS {
        let mut off = 0.0;
        for p in 0..n {
            for q in (p + 1)..n {
                off += a[p * n + q] * a[p * n + q];
            }
        }
        if off.sqrt() <= EPS * frob.max(f64::MIN_POSITIVE) {
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                let apq = a[p * n + q];
                if apq.abs() <= f64::MIN_POSITIVE {
                    continue;
                }
                let theta = (a[q * n + q] - a[p * n + p]) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for k in 0..n {
                    let akp = a[k * n + p];
                    let akq = a[k * n + q];
                    a[k * n + p] = c * akp - s * akq;
                    a[k * n + q] = s * akp + c * akq;
                }
                for k in 0..n {
                    let apk = a[p * n + k];
                    let aqk = a[q * n + k];
                    a[p * n + k] = c * apk - s * aqk;
                    a[q * n + k] = s * apk + c * aqk;
                }
                for k in 0..n {
                    let vkp = v[k * n + p];
                    let vkq = v[k * n + q];
                    v[k * n + p] = c * vkp - s * vkq;
                    v[k * n + q] = s * vkp + c * vkq;
                }
            }
        }
    }

    let values = (0..n).map(|i| a[i * n + i]).collect();
    (values, v)
}

/// Classical scaling of `matrix` into `k` dimensions.
///
/// Returns the row-major `n × k` coordinates and the eigenvalue behind each
/// dimension, largest first. Dimensions whose eigenvalue is not positive come
/// back as zero columns; the caller decides how to fill them.
pub(crate) fn classical_scaling(matrix: &DistanceMatrix, k: usize) -> (Vec<f64>, Vec<f64>) {
    let n = matrix.n();
    let mut b = vec![0.0; n * n];
    for i in 0..n {
        for j in 0..n {
            let d = matrix.get(i, j);
            b[i * n + j] = d * d;
        }
    }

    // Double centring.
    let row_means: Vec<f64> = (0..n).map(|i| b[i * n..(i + 1) * n].iter().sum::<f64>() / n as f64).collect();
    let grand = row_means.iter().sum::<f64>() / n as f64;
    for i in 0..n {
        for j in 0..n {
            b[i * n + j] = -0.5 * (b[i * n + j] - row_means[i] - row_means[j] + grand);
        }
    }

    let (values, vectors) = jacobi_eigen(&mut b, n);
    let mut idx: Vec<usize> = (0..n).collect();
    idx.sort_by(|&a, &b| values[b].total_cmp(&values[a]).then(a.cmp(&b)));

    let mut coords = vec![0.0; n * k];
    let mut lambdas = Vec::with_capacity(k);
    for (dim, &e) in idx.iter().take(k).enumerate() {
        let lambda = values[e];
        lambdas.push(lambda);
        if lambda <= 0.0 {
            continue;
        }
        let scale = lambda.sqrt();
        for i in 0..n {
            coords[i * k + dim] = vectors[i * n + e] * scale;
        }
    }
    (coords, lambdas)
}
