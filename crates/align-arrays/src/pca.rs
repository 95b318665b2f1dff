//! Dimensionality-reduction models fit per session.

use align_core::{AlignError, Result};
use nalgebra::DMatrix;
use ndarray::{Array1, Array2, ArrayView2, Axis};
use tracing::debug;

/// A model that learns a projection from one session's features.
pub trait ReductionModel {
    /// Dimensionality of the reduced space.
    fn n_components(&self) -> usize;

    /// Learn the projection from a `samples × features` matrix.
    fn fit(&mut self, data: ArrayView2<'_, f64>) -> Result<()>;

    /// Project a `samples × features` matrix into `samples × n_components`.
    fn transform(&self, data: ArrayView2<'_, f64>) -> Result<Array2<f64>>;
}

// ── Pca ───────────────────────────────────────────────────────────────────────

/// Principal component analysis through a full SVD of the centred data.
///
/// Component signs are fixed so that the largest-magnitude loading of every
/// component is positive, making fits reproducible.
#[derive(Debug, Clone)]
pub struct Pca {
    n_components: usize,
    mean: Option<Array1<f64>>,
    /// `n_components × features`, rows ordered by decreasing variance.
    components: Option<Array2<f64>>,
    explained_variance: Option<Array1<f64>>,
}

impl Pca {
    pub fn new(n_components: usize) -> Self {
        Self {
            n_components,
            mean: None,
            components: None,
            explained_variance: None,
        }
    }

    /// Principal axes of the last fit.
    pub fn components(&self) -> Option<&Array2<f64>> {
        self.components.as_ref()
    }

    /// Variance captured by each component in the last fit.
    pub fn explained_variance(&self) -> Option<&Array1<f64>> {
        self.explained_variance.as_ref()
    }
}

impl ReductionModel for Pca {
    fn n_components(&self) -> usize {
        self.n_components
    }

    fn fit(&mut self, data: ArrayView2<'_, f64>) -> Result<()> {
        let (n_samples, n_features) = data.dim();
        if self.n_components == 0 || self.n_components > n_samples.min(n_features) {
            return Err(AlignError::Reduction(format!(
                "cannot extract {} components from {} samples × {} features",
                self.n_components, n_samples, n_features
            )));
        }
        if data.iter().any(|v| !v.is_finite()) {
            return Err(AlignError::Reduction(format!(
                "cannot fit on non-finite values ({} samples × {} features)",
                n_samples, n_features
            )));
        }

        let mean = data
            .mean_axis(Axis(0))
            .ok_or_else(|| AlignError::Reduction("no samples to fit".to_string()))?;
        let centred = &data - &mean;
        let matrix = DMatrix::from_fn(n_samples, n_features, |i, j| centred[[i, j]]);

        let svd = matrix.svd(false, true);
        let v_t = svd
            .v_t
            .ok_or_else(|| AlignError::Reduction("SVD did not produce V^T".to_string()))?;

        let mut order: Vec<usize> = (0..svd.singular_values.len()).collect();
        order.sort_by(|&a, &b| svd.singular_values[b].total_cmp(&svd.singular_values[a]));

        let mut components = Array2::zeros((self.n_components, n_features));
        let mut variance = Array1::zeros(self.n_components);
        let dof = (n_samples.max(2) - 1) as f64;
        for (k, &src) in order.iter().take(self.n_components).enumerate() {
            let row = v_t.row(src);
            let pivot = row
                .iter()
                .copied()
                .max_by(|a, b| a.abs().total_cmp(&b.abs()))
                .unwrap_or(0.0);
            let sign = if pivot < 0.0 { -1.0 } else { 1.0 };
            for j in 0..n_features {
                components[[k, j]] = sign * row[j];
            }
            variance[k] = svd.singular_values[src].powi(2) / dof;
        }

        debug!(
            "PCA fit on {}x{}: explained variance {:?}",
            n_samples, n_features, variance
        );
        self.mean = Some(mean);
        self.components = Some(components);
        self.explained_variance = Some(variance);
        Ok(())
    }

    fn transform(&self, data: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        let (Some(mean), Some(components)) = (&self.mean, &self.components) else {
            return Err(AlignError::Reduction("PCA used before fit".to_string()));
        };
        if data.ncols() != mean.len() {
            return Err(AlignError::Reduction(format!(
                "model fit on {} features, got {}",
                mean.len(),
                data.ncols()
            )));
        }
        Ok((&data - mean).dot(&components.t()))
    }
}

// ── Reducer ───────────────────────────────────────────────────────────────────

/// Which reduction model the array builders fit per session.
pub enum Reducer {
    /// PCA with the given component count.
    Pca(Pca),
    /// Any other model.
    Custom(Box<dyn ReductionModel>),
}

impl Reducer {
    pub fn model_mut(&mut self) -> &mut dyn ReductionModel {
        match self {
            Reducer::Pca(pca) => pca,
            Reducer::Custom(model) => model.as_mut(),
        }
    }

    pub fn n_components(&self) -> usize {
        match self {
            Reducer::Pca(pca) => pca.n_components(),
            Reducer::Custom(model) => model.n_components(),
        }
    }
}

impl Default for Reducer {
    /// PCA with 10 components.
    fn default() -> Self {
        Reducer::Pca(Pca::new(10))
    }
}

impl From<usize> for Reducer {
    fn from(n_components: usize) -> Self {
        Reducer::Pca(Pca::new(n_components))
    }
}

impl From<Box<dyn ReductionModel>> for Reducer {
    fn from(model: Box<dyn ReductionModel>) -> Self {
        Reducer::Custom(model)
    }
}

impl std::fmt::Debug for Reducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reducer::Pca(pca) => write!(f, "Pca({})", pca.n_components()),
            Reducer::Custom(model) => write!(f, "Custom({})", model.n_components()),
        }
    }
}
