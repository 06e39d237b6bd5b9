//! Driving an [`ImputationModel`] over one density class.

use std::path::{Path, PathBuf};

use log::info;
use ndarray::Array2;

use crate::aggregate::{ClassMatrices, Density};
use crate::model::{ImputationModel, ModelError, TrainedModel};

/// Where the model for `density` is saved inside `model_dir`.
pub fn model_file(model_dir: &Path, density: Density) -> PathBuf {
    model_dir.join(format!("model_file_cpg{}", density.value()))
}

/// Train a fresh `M` on the class and predict every matrix in it.
///
/// Returns `Ok(None)` for an empty class, without touching the model. The
/// predictions are checked to match the input in length and shape.
pub fn impute_class<M>(
    density: Density,
    class: &ClassMatrices,
    model_dir: &Path,
) -> Result<Option<Vec<Array2<f64>>>, ModelError>
where
    M: ImputationModel,
{
    if class.is_empty() {
        info!("No matrices of density {}, skipping imputation", density);
        return Ok(None);
    }

    info!(
        "Imputing {} matrices of density {}",
        class.matrices.len(),
        density
    );
    let trained = M::for_density(density.value()).train(&class.matrices, &model_file(model_dir, density))?;
    let predicted = trained.impute_many(&class.matrices)?;

    if predicted.len() != class.matrices.len() {
        return Err(ModelError::ShapeMismatch(format!(
            "{} predictions for {} matrices",
            predicted.len(),
            class.matrices.len()
        )));
    }
    for (index, (input, output)) in class.matrices.iter().zip(predicted.iter()).enumerate() {
        if input.dim() != output.dim() {
            return Err(ModelError::ShapeMismatch(format!(
                "prediction {} ({}) has shape {:?}, expected {:?}",
                index,
                class.bins[index],
                output.dim(),
                input.dim()
            )));
        }
    }
    Ok(Some(predicted))
}
