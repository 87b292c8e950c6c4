pub use crate::{
    annotate::{AnnotateSummary, Annotator, WEIGHT_COLUMN},
    compression::Compression,
    container::{Directory, HistogramFile},
    decorrelate::Decorrelator,
    four_vector::FourVector,
    histogram::{Histogram, RebinPolicy},
    shapes::{SbShapes, ShapeConfig},
    table::{ScoreColumn, TableReader, TableWriter},
    traits::ScoreWeight,
    weight::SbWeighter,
};
