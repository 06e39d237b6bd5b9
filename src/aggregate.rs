//! Merging worker results and classifying matrices by feature density.

use std::fmt;

use ndarray::Array2;

use crate::bins::Bin;
use crate::extract::BinResult;
use crate::matrix::ObservationMatrix;

/// The feature densities (CpG sites per bin) that get their own model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Density {
    Two,
    Three,
    Four,
    Five,
}

impl Density {
    pub const ALL: [Density; 4] = [Density::Two, Density::Three, Density::Four, Density::Five];

    /// The density class for a matrix with `ncols` columns, if it has one.
    pub fn from_ncols(ncols: usize) -> Option<Self> {
        match ncols {
            2 => Some(Density::Two),
            3 => Some(Density::Three),
            4 => Some(Density::Four),
            5 => Some(Density::Five),
            _ => None,
        }
    }

    pub fn value(self) -> usize {
        match self {
            Density::Two => 2,
            Density::Three => 3,
            Density::Four => 4,
            Density::Five => 5,
        }
    }
}

impl fmt::Display for Density {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

/// Parallel lists of bins and their sentinel-filled matrices.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClassMatrices {
    pub bins: Vec<Bin>,
    pub matrices: Vec<Array2<f64>>,
}

impl ClassMatrices {
    pub fn push(&mut self, bin: Bin, matrix: Array2<f64>) {
        self.bins.push(bin);
        self.matrices.push(matrix);
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }
}

/// One [`ClassMatrices`] per [`Density`], plus everything else.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DensityClasses {
    two: ClassMatrices,
    three: ClassMatrices,
    four: ClassMatrices,
    five: ClassMatrices,
    /// Matrices with fewer than two or more than five sites. These are kept in
    /// the raw store but never imputed.
    pub other: ClassMatrices,
}

impl DensityClasses {
    pub fn get(&self, density: Density) -> &ClassMatrices {
        match density {
            Density::Two => &self.two,
            Density::Three => &self.three,
            Density::Four => &self.four,
            Density::Five => &self.five,
        }
    }

    fn get_mut(&mut self, density: Density) -> &mut ClassMatrices {
        match density {
            Density::Two => &mut self.two,
            Density::Three => &mut self.three,
            Density::Four => &mut self.four,
            Density::Five => &mut self.five,
        }
    }

    /// Place a matrix in the class matching its column count.
    pub fn insert(&mut self, bin: Bin, matrix: &ObservationMatrix) {
        let filled = matrix.sentinel_fill();
        match Density::from_ncols(matrix.ncols()) {
            Some(density) => self.get_mut(density).push(bin, filled),
            None => self.other.push(bin, filled),
        }
    }

    /// Iterate over the imputable classes, in increasing density.
    pub fn iter(&self) -> impl Iterator<Item = (Density, &ClassMatrices)> {
        Density::ALL.into_iter().map(move |density| (density, self.get(density)))
    }

    /// Total number of matrices across all classes, `other` included.
    pub fn len(&self) -> usize {
        self.iter().map(|(_, class)| class.len()).sum::<usize>() + self.other.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Successful matrices of a batch: all of them for the raw store, and
/// classified by density for imputation.
#[derive(Clone, Debug, Default)]
pub struct Aggregation {
    pub raw: Vec<(Bin, ObservationMatrix)>,
    pub classes: DensityClasses,
}

impl Aggregation {
    /// Fold in another batch of results (e.g. the next sequence).
    pub fn extend(&mut self, results: &[BinResult]) {
        for result in results {
            if let Some(matrix) = result.matrix() {
                self.classes.insert(result.bin.clone(), matrix);
                self.raw.push((result.bin.clone(), matrix.clone()));
            }
        }
    }
}

/// Drop failed bins and classify the rest, preserving encounter order.
pub fn aggregate(results: &[BinResult]) -> Aggregation {
    let mut aggregation = Aggregation::default();
    aggregation.extend(results);
    aggregation
}
