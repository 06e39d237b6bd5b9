//! The end-to-end run: catalog, bins, parallel extraction, raw store,
//! per-density imputation and the imputed stores.

use std::fs;

use log::{info, warn};
use ndarray::Array2;

use crate::aggregate::Aggregation;
use crate::bam::BamOpener;
use crate::bins::generate_bins;
use crate::config::RunConfig;
use crate::error::MethBinsError;
use crate::impute::impute_class;
use crate::io::file::read_seqlens;
use crate::io::store::{write_imputed_matrices, write_raw_matrices};
use crate::matrix::Call;
use crate::model::{ConcordanceModel, ImputationModel};
use crate::pool::ExtractionPool;
use crate::postprocess::postprocess;
use crate::reads::{ReadSource, ReadSourceOpener};
use crate::reporting::{CommandOutput, Report, RunSummary, SequenceSummary};
use crate::seqlens::filter_catalog;

/// Run the whole pipeline with read sources from `opener` and one `M` per
/// density class.
///
/// Only configuration, catalog and persistence problems are errors. Failed
/// bins and density classes whose model failed are counted and listed in the
/// returned [`Report`].
pub fn run<O, M>(config: &RunConfig, opener: &O) -> Result<CommandOutput<RunSummary>, MethBinsError>
where
    O: ReadSourceOpener,
    M: ImputationModel,
{
    let mut report = Report::new();
    let mut summary = RunSummary::default();

    let catalog = match &config.seqlens_path {
        Some(path) => read_seqlens(path)?,
        None => opener.open()?.sequence_catalog()?,
    };
    let seqlens = filter_catalog(
        catalog,
        &config.sequence_filter,
        config.chromosome.as_deref(),
    )?;
    if seqlens.is_empty() {
        warn!("No sequences left after filtering the sequence catalog");
        report.add_issue("no sequences matched the sequence filter".to_string());
    }
    let bins = generate_bins(&seqlens, config.bin_size)?;

    fs::create_dir_all(&config.output_dir)?;

    let pool = ExtractionPool::from_config(config);
    let mut aggregation = Aggregation::default();
    for (seqname, sequence_bins) in &bins {
        let results = pool.extract_sequence(seqname, sequence_bins, opener, config.bin_size)?;
        let counts = SequenceSummary::from_results(&results);
        info!(
            "{}: {} bins, {} extracted ({} after correction), {} failed",
            seqname, counts.attempted, counts.succeeded, counts.corrected, counts.failed
        );
        if counts.failed > 0 {
            report.add_issue(format!(
                "{}: {} of {} bins produced no matrix",
                seqname, counts.failed, counts.attempted
            ));
        }
        aggregation.extend(&results);
        summary.sequences.insert(seqname.clone(), counts);
    }
    info!("Analysis complete");

    let names = config.store_names();
    write_raw_matrices(&names, &aggregation.raw)?;

    if !aggregation.classes.other.is_empty() {
        info!(
            "{} matrices outside CpG densities 2-5 are stored but not imputed",
            aggregation.classes.other.len()
        );
    }

    for (density, class) in aggregation.classes.iter() {
        match impute_class::<M>(density, class, names.model_dir()) {
            Ok(Some(predicted)) => {
                let called: Vec<Array2<Call>> = predicted
                    .iter()
                    .map(|matrix| postprocess(matrix, &config.thresholds))
                    .collect();
                write_imputed_matrices(&names, density, &class.bins, &called)?;
                summary.imputed.insert(density, called.len());
            }
            Ok(None) => {}
            Err(e) => {
                warn!("Skipping CpG density {}: {}", density, e);
                report.add_issue(format!("CpG density {} was not imputed: {}", density, e));
            }
        }
    }

    Ok(CommandOutput::new(summary, report))
}

/// [`run`] over the BAM file in `config.input` with the [`ConcordanceModel`].
pub fn run_bam(config: &RunConfig) -> Result<CommandOutput<RunSummary>, MethBinsError> {
    let opener = BamOpener::new(&config.input);
    run::<_, ConcordanceModel>(config, &opener)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::Density;
    use crate::model::{ModelError, TrainedConcordance};
    use crate::seqlens::SequenceFilter;
    use crate::test_utilities::{chrt_scenario, MockOpener};
    use std::path::Path;
    use std::time::Duration;
    use tempfile::tempdir;

    fn config(output_dir: &Path) -> RunConfig {
        RunConfig {
            output_dir: output_dir.to_path_buf(),
            threads: 2,
            chunk_size: 2,
            progress_interval: Duration::from_millis(50),
            ..RunConfig::new(100, "test.bam").unwrap()
        }
    }

    /// Fails to train for density 3 only.
    struct PickyModel(usize);

    impl ImputationModel for PickyModel {
        type Trained = TrainedConcordance;

        fn for_density(density: usize) -> Self {
            PickyModel(density)
        }

        fn train(self, matrices: &[Array2<f64>], model_file: &Path) -> Result<TrainedConcordance, ModelError> {
            if self.0 == 3 {
                return Err(ModelError::Training("density 3 unsupported".to_string()));
            }
            ConcordanceModel::for_density(self.0).train(matrices, model_file)
        }
    }

    #[test]
    fn test_run_chrt() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        let opener = MockOpener::new(chrt_scenario());
        let output = run::<_, ConcordanceModel>(&config, &opener).unwrap();

        let summary = output.value();
        // scaffold_1 is filtered out by the default prefix
        assert_eq!(summary.sequences.len(), 1);
        let chrt = summary.sequences["chrT"];
        assert_eq!(chrt.attempted, 3);
        assert_eq!(chrt.succeeded, 2);
        assert_eq!(chrt.failed, 1);
        assert_eq!(summary.imputed.get(&Density::Two), Some(&1));
        assert_eq!(summary.imputed.get(&Density::Three), Some(&1));
        assert_eq!(summary.imputed.get(&Density::Four), None);

        let names = config.store_names();
        assert!(names.raw_text().exists());
        assert!(names.imputed_text(Density::Two).exists());
        assert!(names.imputed_npz(Density::Three).exists());
        assert!(!names.imputed_text(Density::Four).exists());
        assert!(dir.path().join("model_file_cpg2").exists());
        assert_eq!(output.report().issues().len(), 1);
    }

    #[test]
    fn test_run_model_failure_is_local() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        let opener = MockOpener::new(chrt_scenario());
        let output = run::<_, PickyModel>(&config, &opener).unwrap();

        let names = config.store_names();
        assert!(names.imputed_text(Density::Two).exists());
        assert!(!names.imputed_text(Density::Three).exists());
        assert!(output
            .report()
            .issues()
            .iter()
            .any(|issue| issue.contains("CpG density 3")));
    }

    #[test]
    fn test_run_unknown_chromosome() {
        let dir = tempdir().unwrap();
        let config = RunConfig {
            chromosome: Some("scaffold_1".to_string()),
            ..config(dir.path())
        };
        let opener = MockOpener::new(chrt_scenario());
        let result = run::<_, ConcordanceModel>(&config, &opener);
        assert!(matches!(result, Err(MethBinsError::UnknownSequence(_))));
        // nothing was extracted
        assert_eq!(opener.opened(), 1);
    }

    #[test]
    fn test_run_all_sequences_single_chromosome() {
        let dir = tempdir().unwrap();
        let config = RunConfig {
            chromosome: Some("scaffold_1".to_string()),
            sequence_filter: SequenceFilter::All,
            ..config(dir.path())
        };
        let opener = MockOpener::new(chrt_scenario());
        let output = run::<_, ConcordanceModel>(&config, &opener).unwrap();
        assert_eq!(output.value().sequences["scaffold_1"].succeeded, 1);
        assert!(dir.path().join("test.bam.scaffold_1.txt").exists());
    }

    #[test]
    fn test_run_catalog_open_failure() {
        let dir = tempdir().unwrap();
        let opener = MockOpener::new(chrt_scenario()).failing_open();
        let result = run::<_, ConcordanceModel>(&config(dir.path()), &opener);
        assert!(matches!(result, Err(MethBinsError::Bam(_))));
    }
}
