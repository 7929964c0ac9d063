//! Thin-plate-spline grid generation.
//!
//! The regression head predicts target positions for a regular lattice
//! of control points; the TPS interpolant through those points yields a
//! dense sampling grid for `grid_sample`. The radial-basis system
//! depends only on the (fixed) source lattice, so its inverse and the
//! per-pixel kernel matrix are computed once at construction; each
//! forward pass is two small matrix products per sample.

use candle_core::{bail, Result, Tensor};
use nalgebra::{DMatrix, DVector};

/// TPS radial basis: U(r^2) = r^2 ln(r^2), with U(0) = 0.
fn radial_basis(dist_sq: f64) -> f64 {
    if dist_sq == 0.0 {
        0.0
    } else {
        dist_sq * dist_sq.ln()
    }
}

pub struct TpsGridGen {
    height: usize,
    width: usize,
    /// Source control lattice coordinates in [-1, 1], row-major.
    control_x: Vec<f64>,
    control_y: Vec<f64>,
    /// Inverse of the (n+3) x (n+3) TPS system matrix.
    l_inv: DMatrix<f64>,
    /// Per-pixel kernel rows: [U(|p - P_0|), .., U(|p - P_{n-1}|), 1, px, py].
    pixel_kernel: DMatrix<f64>,
}

impl TpsGridGen {
    /// Build the generator for an output of `height` x `width` with a
    /// `grid_size` x `grid_size` control lattice.
    pub fn new(height: usize, width: usize, grid_size: usize) -> Result<Self> {
        if grid_size < 2 {
            bail!("TPS control lattice needs at least 2x2 points");
        }
        let n = grid_size * grid_size;

        let axis: Vec<f64> = (0..grid_size)
            .map(|i| 2.0 * i as f64 / (grid_size as f64 - 1.0) - 1.0)
            .collect();
        let mut control_x = Vec::with_capacity(n);
        let mut control_y = Vec::with_capacity(n);
        for &y in &axis {
            for &x in &axis {
                control_x.push(x);
                control_y.push(y);
            }
        }

        // L = [[K, P], [P^T, 0]] with K the pairwise radial basis and
        // P the affine part [1, x, y].
        let mut l = DMatrix::<f64>::zeros(n + 3, n + 3);
        for i in 0..n {
            for j in 0..n {
                let d2 = (control_x[i] - control_x[j]).powi(2)
                    + (control_y[i] - control_y[j]).powi(2);
                l[(i, j)] = radial_basis(d2);
            }
            l[(i, n)] = 1.0;
            l[(i, n + 1)] = control_x[i];
            l[(i, n + 2)] = control_y[i];
            l[(n, i)] = 1.0;
            l[(n + 1, i)] = control_x[i];
            l[(n + 2, i)] = control_y[i];
        }
        let l_inv = match l.try_inverse() {
            Some(inv) => inv,
            None => bail!("TPS system matrix is singular"),
        };

        let mut pixel_kernel = DMatrix::<f64>::zeros(height * width, n + 3);
        for py in 0..height {
            for px in 0..width {
                let x = 2.0 * px as f64 / (width as f64 - 1.0) - 1.0;
                let y = 2.0 * py as f64 / (height as f64 - 1.0) - 1.0;
                let row = py * width + px;
                for k in 0..n {
                    let d2 = (x - control_x[k]).powi(2) + (y - control_y[k]).powi(2);
                    pixel_kernel[(row, k)] = radial_basis(d2);
                }
                pixel_kernel[(row, n)] = 1.0;
                pixel_kernel[(row, n + 1)] = x;
                pixel_kernel[(row, n + 2)] = y;
            }
        }

        Ok(Self {
            height,
            width,
            control_x,
            control_y,
            l_inv,
            pixel_kernel,
        })
    }

    pub fn control_points(&self) -> usize {
        self.control_x.len()
    }

    /// Number of regression outputs this lattice expects (x then y).
    pub fn theta_dim(&self) -> usize {
        2 * self.control_points()
    }

    /// Evaluate the grid for a `[b, 2n]` batch of target control
    /// coordinates (first n are x, last n are y, all in [-1, 1]).
    /// Returns `[b, h, w, 2]`.
    pub fn forward(&self, theta: &Tensor) -> Result<Tensor> {
        let (batch, dim) = theta.dims2()?;
        let n = self.control_points();
        if dim != 2 * n {
            bail!("theta has {dim} values, lattice expects {}", 2 * n);
        }

        let device = theta.device().clone();
        let theta = theta.to_vec2::<f32>()?;
        let mut out = Vec::with_capacity(batch * self.height * self.width * 2);

        for sample in &theta {
            let solve = |targets: &[f32]| -> DVector<f64> {
                let mut rhs = DVector::<f64>::zeros(n + 3);
                for (i, &t) in targets.iter().enumerate() {
                    rhs[i] = t as f64;
                }
                &self.l_inv * rhs
            };
            let coeff_x = solve(&sample[..n]);
            let coeff_y = solve(&sample[n..]);

            let grid_x = &self.pixel_kernel * coeff_x;
            let grid_y = &self.pixel_kernel * coeff_y;

            for row in 0..self.height * self.width {
                out.push(grid_x[row] as f32);
                out.push(grid_y[row] as f32);
            }
        }

        Tensor::from_vec(out, (batch, self.height, self.width, 2), &device)
    }
}
