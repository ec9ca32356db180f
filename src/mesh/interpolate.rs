//! Thin-plate spline height interpolation
//!
//! The biharmonic spline `f(p) = a0 + a1*x + a2*y + sum(w_i * phi(|p - p_i|))`
//! with `phi(r) = r^2 ln r` passes exactly through every sample and bends as
//! little as possible between them. Queries outside the bounding box of the
//! samples have no answer.

use nalgebra::{DMatrix, DVector};

/// Slack on the sample bounding box, for path points that land on an edge
const EDGE_TOLERANCE: f64 = 1e-9;

/// Thin-plate kernel `r^2 ln r`, zero at the origin
fn kernel(r: f64) -> f64 {
    if r < 1e-10 { 0.0 } else { r * r * r.ln() }
}

/// Solved spline over a set of (x, y, height) samples
#[derive(Debug, Clone)]
pub struct SurfaceInterpolator {
    centers: Vec<(f64, f64)>,
    weights: DVector<f64>,
    /// min x, max x, min y, max y of the samples
    extent: [f64; 4],
}

impl SurfaceInterpolator {
    /// Solve the spline for the given samples.
    ///
    /// Degenerate layouts (fewer than three points, collinear samples) are
    /// solved in the least-squares sense. An empty sample set yields an
    /// interpolator that evaluates to NaN everywhere.
    pub fn new(samples: &[(f64, f64, f64)]) -> Self {
        let n = samples.len();
        if n == 0 {
            return Self {
                centers: Vec::new(),
                weights: DVector::zeros(0),
                extent: [f64::NAN; 4],
            };
        }

        // n kernel rows plus the affine block [1, x, y]
        let size = n + 3;
        let mut matrix = DMatrix::<f64>::zeros(size, size);
        let mut rhs = DVector::<f64>::zeros(size);

        for (i, &(xi, yi, zi)) in samples.iter().enumerate() {
            for (j, &(xj, yj, _)) in samples.iter().enumerate() {
                matrix[(i, j)] = kernel((xi - xj).hypot(yi - yj));
            }
            matrix[(i, n)] = 1.0;
            matrix[(i, n + 1)] = xi;
            matrix[(i, n + 2)] = yi;
            matrix[(n, i)] = 1.0;
            matrix[(n + 1, i)] = xi;
            matrix[(n + 2, i)] = yi;
            rhs[i] = zi;
        }

        let weights = match matrix.clone().lu().solve(&rhs) {
            Some(w) if w.iter().all(|v| v.is_finite()) => w,
            _ => {
                log::debug!("singular spline system for {} samples, using SVD", n);
                matrix
                    .svd(true, true)
                    .solve(&rhs, 1e-12)
                    .unwrap_or_else(|_| DVector::from_element(size, f64::NAN))
            }
        };

        let extent = samples.iter().fold(
            [f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY],
            |[x0, x1, y0, y1], &(x, y, _)| [x0.min(x), x1.max(x), y0.min(y), y1.max(y)],
        );

        Self {
            centers: samples.iter().map(|&(x, y, _)| (x, y)).collect(),
            weights,
            extent,
        }
    }

    /// Whether `(x, y)` lies within the sampled region
    pub fn covers(&self, x: f64, y: f64) -> bool {
        let [x0, x1, y0, y1] = self.extent;
        x >= x0 - EDGE_TOLERANCE
            && x <= x1 + EDGE_TOLERANCE
            && y >= y0 - EDGE_TOLERANCE
            && y <= y1 + EDGE_TOLERANCE
    }

    /// Interpolated height at `(x, y)`, NaN outside the sampled region
    pub fn evaluate(&self, x: f64, y: f64) -> f64 {
        let n = self.centers.len();
        if n == 0 || !self.covers(x, y) {
            return f64::NAN;
        }

        let radial: f64 = self
            .centers
            .iter()
            .zip(self.weights.iter())
            .map(|(&(cx, cy), w)| w * kernel((x - cx).hypot(y - cy)))
            .sum();

        radial + self.weights[n] + self.weights[n + 1] * x + self.weights[n + 2] * y
    }
}
