//! Imputation model interface and a concrete read-concordance model.
//!
//! The pipeline only needs two calls: `train(matrices)` and
//! `impute_many(matrices)`. Model internals are opaque to it. Input matrices
//! are sentinel-filled: observed cells are exactly `0.0` or `1.0` and
//! everything else is missing.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

use log::debug;
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::matrix::Call;

/// Weight of the column prior when no value is given.
pub const DEFAULT_PRIOR_WEIGHT: f64 = 1.0;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("training failed: {0}")]
    Training(String),
    #[error("imputation failed: {0}")]
    Imputation(String),
    #[error("model output does not match its input: {0}")]
    ShapeMismatch(String),
    #[error("model file I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("could not serialize model: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A model that can be trained for one feature density.
pub trait ImputationModel: Sized {
    type Trained: TrainedModel;

    /// An untrained model for matrices with `density` columns.
    fn for_density(density: usize) -> Self;

    /// Train on `matrices` and persist the trained model to `model_file`.
    fn train(self, matrices: &[Array2<f64>], model_file: &Path) -> Result<Self::Trained, ModelError>;
}

pub trait TrainedModel {
    /// Predict every matrix. The output has the same length and order as the
    /// input, and each prediction the same shape as its source.
    fn impute_many(&self, matrices: &[Array2<f64>]) -> Result<Vec<Array2<f64>>, ModelError>;
}

fn is_observed(value: f64) -> bool {
    !Call::from_f64(value).is_missing()
}

/// Fills a missing cell from the reads that agree with its read elsewhere in
/// the bin, shrunk towards the column's methylation rate.
#[derive(Clone, Debug, PartialEq)]
pub struct ConcordanceModel {
    density: usize,
    prior_weight: f64,
}

impl ConcordanceModel {
    pub fn new(density: usize, prior_weight: f64) -> Self {
        Self {
            density,
            prior_weight,
        }
    }

    pub fn density(&self) -> usize {
        self.density
    }
}

impl ImputationModel for ConcordanceModel {
    type Trained = TrainedConcordance;

    fn for_density(density: usize) -> Self {
        Self::new(density, DEFAULT_PRIOR_WEIGHT)
    }

    fn train(self, matrices: &[Array2<f64>], model_file: &Path) -> Result<TrainedConcordance, ModelError> {
        if !(self.prior_weight >= 0.0 && self.prior_weight.is_finite()) {
            return Err(ModelError::Training(format!(
                "invalid prior weight {}",
                self.prior_weight
            )));
        }
        let mut methylated = vec![0.0; self.density];
        let mut observed = vec![0.0; self.density];
        for (index, matrix) in matrices.iter().enumerate() {
            if matrix.ncols() != self.density {
                return Err(ModelError::Training(format!(
                    "matrix {} has {} columns, expected {}",
                    index,
                    matrix.ncols(),
                    self.density
                )));
            }
            for row in matrix.axis_iter(Axis(0)) {
                for (j, value) in row.iter().enumerate() {
                    if is_observed(*value) {
                        methylated[j] += *value;
                        observed[j] += 1.0;
                    }
                }
            }
        }
        let column_priors = methylated
            .iter()
            .zip(observed.iter())
            .map(|(m, n)| if *n > 0.0 { m / n } else { 0.5 })
            .collect();

        let trained = TrainedConcordance {
            density: self.density,
            column_priors,
            prior_weight: self.prior_weight,
            n_matrices: matrices.len(),
        };
        trained.save(model_file)?;
        debug!(
            "trained density {} model on {} matrices: {}",
            self.density,
            matrices.len(),
            model_file.display()
        );
        Ok(trained)
    }
}

/// The persisted state of a trained [`ConcordanceModel`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainedConcordance {
    pub density: usize,
    pub column_priors: Vec<f64>,
    pub prior_weight: f64,
    pub n_matrices: usize,
}

impl TrainedConcordance {
    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let reader = BufReader::new(File::open(path)?);
        let trained: Self = serde_json::from_reader(reader)?;
        trained.validate()?;
        Ok(trained)
    }

    /// Check that there is one column prior per site.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.column_priors.len() != self.density {
            return Err(ModelError::Imputation(format!(
                "{} column priors for density {}",
                self.column_priors.len(),
                self.density
            )));
        }
        Ok(())
    }

    fn impute(&self, matrix: &Array2<f64>) -> Array2<f64> {
        let observed = matrix.mapv(is_observed);
        let mut imputed = matrix.clone();
        for ((r, j), cell) in imputed.indexed_iter_mut() {
            if observed[[r, j]] {
                continue;
            }
            let prior = self.column_priors[j];
            let mut numerator = self.prior_weight * prior;
            let mut denominator = self.prior_weight;
            for other in 0..matrix.nrows() {
                if other == r || !observed[[other, j]] {
                    continue;
                }
                let (mut agreements, mut shared) = (0.0, 0.0);
                for k in 0..matrix.ncols() {
                    if observed[[r, k]] && observed[[other, k]] {
                        shared += 1.0;
                        if matrix[[r, k]] == matrix[[other, k]] {
                            agreements += 1.0;
                        }
                    }
                }
                let weight = (1.0 + agreements) / (2.0 + shared);
                numerator += weight * matrix[[other, j]];
                denominator += weight;
            }
            *cell = if denominator > 0.0 {
                numerator / denominator
            } else {
                prior
            };
        }
        imputed
    }
}

impl TrainedModel for TrainedConcordance {
    fn impute_many(&self, matrices: &[Array2<f64>]) -> Result<Vec<Array2<f64>>, ModelError> {
        self.validate()?;
        matrices
            .iter()
            .enumerate()
            .map(|(index, matrix)| {
                if matrix.ncols() != self.density {
                    return Err(ModelError::Imputation(format!(
                        "matrix {} has {} columns, expected {}",
                        index,
                        matrix.ncols(),
                        self.density
                    )));
                }
                Ok(self.impute(matrix))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::SENTINEL;
    use ndarray::array;
    use tempfile::tempdir;

    #[test]
    fn test_train_priors_and_persist() {
        let dir = tempdir().unwrap();
        let model_file = dir.path().join("model_file_cpg2");
        let matrices = vec![
            array![[1.0, SENTINEL], [1.0, 0.0]],
            array![[0.0, SENTINEL], [1.0, SENTINEL]],
        ];
        let trained = ConcordanceModel::for_density(2)
            .train(&matrices, &model_file)
            .unwrap();
        assert_eq!(trained.column_priors, vec![0.75, 0.0]);
        assert_eq!(trained.n_matrices, 2);

        let loaded = TrainedConcordance::load(&model_file).unwrap();
        assert_eq!(loaded, trained);
    }

    #[test]
    fn test_train_unobserved_column() {
        let dir = tempdir().unwrap();
        let matrices = vec![array![[1.0, SENTINEL]]];
        let trained = ConcordanceModel::for_density(2)
            .train(&matrices, &dir.path().join("m"))
            .unwrap();
        assert_eq!(trained.column_priors, vec![1.0, 0.5]);
    }

    #[test]
    fn test_train_wrong_density() {
        let dir = tempdir().unwrap();
        let matrices = vec![array![[1.0, 0.0, 1.0]]];
        let result = ConcordanceModel::for_density(2).train(&matrices, &dir.path().join("m"));
        assert!(matches!(result, Err(ModelError::Training(_))));
    }

    #[test]
    fn test_train_unwritable_model_file() {
        let dir = tempdir().unwrap();
        let model_file = dir.path().join("missing").join("model");
        let result = ConcordanceModel::for_density(2).train(&[], &model_file);
        assert!(matches!(result, Err(ModelError::Io(_))));
    }

    #[test]
    fn test_impute_observed_pass_through() {
        let trained = TrainedConcordance {
            density: 3,
            column_priors: vec![0.5; 3],
            prior_weight: 1.0,
            n_matrices: 1,
        };
        let matrix = array![[1.0, 0.0, SENTINEL], [0.0, SENTINEL, 1.0]];
        let imputed = trained.impute_many(&[matrix.clone()]).unwrap();
        let imputed = &imputed[0];
        assert_eq!(imputed.dim(), matrix.dim());
        assert_eq!(imputed[[0, 0]], 1.0);
        assert_eq!(imputed[[0, 1]], 0.0);
        assert_eq!(imputed[[1, 2]], 1.0);
        assert!(imputed.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_impute_follows_concordant_reads() {
        let trained = TrainedConcordance {
            density: 2,
            column_priors: vec![0.5, 0.5],
            prior_weight: 1.0,
            n_matrices: 1,
        };
        // reads 0 and 1 agree at site 0, read 1 is methylated at site 1
        let matrix = array![[1.0, SENTINEL], [1.0, 1.0], [0.0, 0.0]];
        let imputed = trained.impute_many(&[matrix]).unwrap();
        // prior: 1 * 0.5; read 1: weight 2/3 * 1.0; read 2: weight 1/3 * 0.0
        let expected = (0.5 + 2.0 / 3.0) / (1.0 + 2.0 / 3.0 + 1.0 / 3.0);
        assert!((imputed[0][[0, 1]] - expected).abs() < 1e-12);
    }

    #[test]
    fn test_impute_many_preserves_order() {
        let trained = TrainedConcordance {
            density: 2,
            column_priors: vec![0.1, 0.9],
            prior_weight: 1.0,
            n_matrices: 2,
        };
        let matrices = vec![
            array![[1.0, 1.0]],
            array![[0.0, 0.0], [1.0, 0.0]],
            array![[SENTINEL, SENTINEL]],
        ];
        let imputed = trained.impute_many(&matrices).unwrap();
        assert_eq!(imputed.len(), 3);
        assert_eq!(imputed[0], matrices[0]);
        assert_eq!(imputed[1], matrices[1]);
        assert_eq!(imputed[2], array![[0.1, 0.9]]);
    }

    #[test]
    fn test_impute_wrong_density() {
        let trained = TrainedConcordance {
            density: 2,
            column_priors: vec![0.5, 0.5],
            prior_weight: 1.0,
            n_matrices: 0,
        };
        let result = trained.impute_many(&[array![[1.0]]]);
        assert!(matches!(result, Err(ModelError::Imputation(_))));
    }

    #[test]
    fn test_impute_short_priors() {
        let trained = TrainedConcordance {
            density: 3,
            column_priors: vec![0.5, 0.5],
            prior_weight: 1.0,
            n_matrices: 1,
        };
        let result = trained.impute_many(&[array![[1.0, SENTINEL, SENTINEL]]]);
        assert!(matches!(result, Err(ModelError::Imputation(_))));
    }

    #[test]
    fn test_load_rejects_short_priors() {
        let dir = tempdir().unwrap();
        let model_file = dir.path().join("model_file_cpg3");
        std::fs::write(
            &model_file,
            r#"{"density": 3, "column_priors": [0.5], "prior_weight": 1.0, "n_matrices": 4}"#,
        )
        .unwrap();
        let result = TrainedConcordance::load(&model_file);
        assert!(matches!(result, Err(ModelError::Imputation(_))));
    }
}
