use log::trace;
use thiserror::Error;

use crate::{
    histogram::Histogram, shapes::SbShapes, traits::ScoreWeight,
};

/// Signal over signal plus background weight
///
/// For a score in bin `i` of the signal histogram `S` and the background
/// histogram `B` the weight is `S[i] / (S[i] + B[i])`, or zero if `B[i]`
/// is not positive. Scores below the first edge are treated as if they
/// were in the first bin; scores at or above the last edge use the
/// overflow bins.
#[derive(Clone, Debug, PartialEq)]
pub struct SbWeighter {
    signal: Histogram,
    background: Histogram,
}

impl SbWeighter {
    /// Construct from histograms with identical binning
    pub fn new(
        signal: Histogram,
        background: Histogram,
    ) -> Result<Self, WeightError> {
        if !signal.same_binning(&background) {
            return Err(WeightError::BinningMismatch(
                signal.edges().to_vec(),
                background.edges().to_vec(),
            ));
        }
        Ok(Self { signal, background })
    }

    /// Bin used for the given score
    pub fn bin_index(&self, score: f64) -> usize {
        match self.signal.find_bin(score) {
            0 => 1,
            bin => bin,
        }
    }

    /// Weight for the given score
    pub fn weight(&self, score: f64) -> f64 {
        let bin = self.bin_index(score);
        let s = self.signal.bin_content(bin);
        let b = self.background.bin_content(bin);
        trace!("score {score} -> bin {bin}, S = {s}, B = {b}");
        if b > 0. {
            s / (s + b)
        } else {
            0.
        }
    }

    /// Signal histogram
    pub fn signal(&self) -> &Histogram {
        &self.signal
    }

    /// Background histogram
    pub fn background(&self) -> &Histogram {
        &self.background
    }
}

impl TryFrom<SbShapes> for SbWeighter {
    type Error = WeightError;

    fn try_from(shapes: SbShapes) -> Result<Self, Self::Error> {
        Self::new(shapes.signal, shapes.background)
    }
}

impl ScoreWeight for SbWeighter {
    fn weight(&self, score: f64) -> f64 {
        SbWeighter::weight(self, score)
    }
}

/// Error constructing a weighter
#[derive(Debug, Error)]
pub enum WeightError {
    /// Signal and background are binned differently
    #[error("Signal binning {0:?} differs from background binning {1:?}")]
    BinningMismatch(Vec<f64>, Vec<f64>),
}
