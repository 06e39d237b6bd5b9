//! Durable output: raw and imputed matrix stores.
//!
//! Each store is written twice, as a human-readable text file and as an
//! `.npz` archive holding one `f64` array per bin id (missing cells are NaN).

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::info;
use ndarray::{Array2, Axis};
use ndarray_npy::NpzWriter;

use crate::aggregate::Density;
use crate::bins::Bin;
use crate::error::MethBinsError;
use crate::io::file::OutputFile;
use crate::matrix::{Call, ObservationMatrix};

/// Scope name used when no single sequence was selected.
pub const ALL_SCOPE: &str = "all";

/// Output file naming for one run: `{output_dir}/{sample}.{scope}...`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreNames {
    pub output_dir: PathBuf,
    pub sample: String,
    pub scope: String,
}

impl StoreNames {
    pub fn new(output_dir: impl Into<PathBuf>, sample: impl Into<String>, scope: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            sample: sample.into(),
            scope: scope.into(),
        }
    }

    fn stem(&self) -> String {
        format!("{}.{}", self.sample, self.scope)
    }

    pub fn raw_text(&self) -> PathBuf {
        self.output_dir.join(format!("{}.txt", self.stem()))
    }

    pub fn raw_npz(&self) -> PathBuf {
        self.output_dir.join(format!("{}.npz", self.stem()))
    }

    pub fn imputed_text(&self, density: Density) -> PathBuf {
        self.output_dir
            .join(format!("{}_IMPUTED_CPG{}.txt", self.stem(), density.value()))
    }

    pub fn imputed_npz(&self, density: Density) -> PathBuf {
        self.output_dir
            .join(format!("{}_IMPUTED_CPG{}.npz", self.stem(), density.value()))
    }

    pub fn model_dir(&self) -> &Path {
        &self.output_dir
    }
}

fn write_npz<'a, I>(path: &Path, arrays: I) -> Result<(), MethBinsError>
where
    I: IntoIterator<Item = (String, &'a Array2<f64>)>,
{
    let mut npz = NpzWriter::new(File::create(path)?);
    for (name, array) in arrays {
        npz.add_array(name, array)?;
    }
    npz.finish()?;
    Ok(())
}

/// Write every successful bin's matrix, in order, to the raw store.
pub fn write_raw_matrices(
    names: &StoreNames,
    matrices: &[(Bin, ObservationMatrix)],
) -> Result<(), MethBinsError> {
    let text = OutputFile::new(names.raw_text());
    let mut writer = text.writer()?;
    for (bin, matrix) in matrices {
        writeln!(writer, "{}", bin)?;
        writeln!(writer, "{}", matrix)?;
    }
    writeln!(writer, "BIN COUNT : {}", matrices.len())?;
    writer.flush()?;

    let arrays: Vec<(String, Array2<f64>)> = matrices
        .iter()
        .map(|(bin, matrix)| (bin.to_string(), matrix.to_nan_array()))
        .collect();
    write_npz(
        &names.raw_npz(),
        arrays.iter().map(|(name, array)| (name.clone(), array)),
    )?;

    info!(
        "Wrote {} raw matrices to {}",
        matrices.len(),
        text.path().display()
    );
    Ok(())
}

fn imputed_cell(call: Call) -> &'static str {
    match call {
        Call::Zero => "0.0",
        Call::One => "1.0",
        Call::Missing => "nan",
    }
}

/// Write the post-processed matrices of one density class.
pub fn write_imputed_matrices(
    names: &StoreNames,
    density: Density,
    bins: &[Bin],
    matrices: &[Array2<Call>],
) -> Result<(), MethBinsError> {
    if bins.len() != matrices.len() {
        return Err(MethBinsError::InvalidConfig(format!(
            "{} bins for {} imputed matrices",
            bins.len(),
            matrices.len()
        )));
    }

    let text = OutputFile::new(names.imputed_text(density));
    let mut writer = text.writer()?;
    writeln!(writer, "IMPUTED MATRIX COUNT : {}", matrices.len())?;
    for (bin, matrix) in bins.iter().zip(matrices) {
        writeln!(writer, "{}", bin)?;
        for row in matrix.axis_iter(Axis(0)) {
            let cells: Vec<&str> = row.iter().map(|call| imputed_cell(*call)).collect();
            writeln!(writer, "{}", cells.join("\t"))?;
        }
    }
    writer.flush()?;

    let arrays: Vec<(String, Array2<f64>)> = bins
        .iter()
        .zip(matrices)
        .map(|(bin, matrix)| (bin.to_string(), matrix.mapv(|call| call.to_f64_or(f64::NAN))))
        .collect();
    write_npz(
        &names.imputed_npz(density),
        arrays.iter().map(|(name, array)| (name.clone(), array)),
    )?;

    info!(
        "Wrote {} imputed matrices of density {} to {}",
        matrices.len(),
        density,
        text.path().display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::Call::*;
    use crate::test_utilities::observation_matrix;
    use ndarray::array;
    use ndarray_npy::NpzReader;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_store_names() {
        let names = StoreNames::new("out", "sample.bam", "chr1");
        assert_eq!(names.raw_text(), PathBuf::from("out/sample.bam.chr1.txt"));
        assert_eq!(names.raw_npz(), PathBuf::from("out/sample.bam.chr1.npz"));
        assert_eq!(
            names.imputed_text(Density::Three),
            PathBuf::from("out/sample.bam.chr1_IMPUTED_CPG3.txt")
        );
        assert_eq!(
            names.imputed_npz(Density::Five),
            PathBuf::from("out/sample.bam.chr1_IMPUTED_CPG5.npz")
        );
    }

    #[test]
    fn test_write_raw_matrices() {
        let dir = tempdir().unwrap();
        let names = StoreNames::new(dir.path(), "s.bam", ALL_SCOPE);
        let matrices = vec![
            (
                Bin::new("chr1", 100),
                observation_matrix(&[&[One, Missing], &[Zero, One]]),
            ),
            (Bin::new("chr1", 300), observation_matrix(&[&[Zero, Zero, One]])),
        ];
        write_raw_matrices(&names, &matrices).unwrap();

        let text = fs::read_to_string(names.raw_text()).unwrap();
        assert_eq!(
            text,
            "chr1_100\n1.0  NaN\n0.0  1.0\nchr1_300\n0.0  0.0  1.0\nBIN COUNT : 2\n"
        );

        let mut npz = NpzReader::new(File::open(names.raw_npz()).unwrap()).unwrap();
        let stored: Vec<String> = npz
            .names()
            .unwrap()
            .into_iter()
            .map(|name| name.trim_end_matches(".npy").to_string())
            .collect();
        assert_eq!(stored, vec!["chr1_100", "chr1_300"]);
        let first: Array2<f64> = npz.by_index(0).unwrap();
        assert_eq!(first[[0, 0]], 1.0);
        assert!(first[[0, 1]].is_nan());
    }

    #[test]
    fn test_write_raw_matrices_empty() {
        let dir = tempdir().unwrap();
        let names = StoreNames::new(dir.path(), "s.bam", "chr2");
        write_raw_matrices(&names, &[]).unwrap();
        let text = fs::read_to_string(names.raw_text()).unwrap();
        assert_eq!(text, "BIN COUNT : 0\n");
        assert!(names.raw_npz().exists());
    }

    #[test]
    fn test_write_imputed_matrices() {
        let dir = tempdir().unwrap();
        let names = StoreNames::new(dir.path(), "s.bam", "chrT");
        let bins = vec![Bin::new("chrT", 300)];
        let matrices = vec![array![[Zero, One, Missing], [One, One, One]]];
        write_imputed_matrices(&names, Density::Three, &bins, &matrices).unwrap();

        let text = fs::read_to_string(names.imputed_text(Density::Three)).unwrap();
        assert_eq!(
            text,
            "IMPUTED MATRIX COUNT : 1\nchrT_300\n0.0\t1.0\tnan\n1.0\t1.0\t1.0\n"
        );

        let mut npz = NpzReader::new(File::open(names.imputed_npz(Density::Three)).unwrap()).unwrap();
        let stored: Array2<f64> = npz.by_index(0).unwrap();
        assert_eq!(stored.dim(), (2, 3));
        assert!(stored[[0, 2]].is_nan());
    }

    #[test]
    fn test_write_imputed_length_mismatch() {
        let dir = tempdir().unwrap();
        let names = StoreNames::new(dir.path(), "s.bam", "chrT");
        let result = write_imputed_matrices(&names, Density::Two, &[], &[array![[One, Zero]]]);
        assert!(matches!(result, Err(MethBinsError::InvalidConfig(_))));
    }
}
