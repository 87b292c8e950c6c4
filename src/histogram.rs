use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

/// One-dimensional histogram with variable bin widths
///
/// Bins are numbered as in ROOT: `0` is the underflow bin, `1..=n` are
/// the regular bins and `n + 1` is the overflow bin. Bin `i` covers the
/// half-open interval `[edges[i - 1], edges[i])`.
#[derive(Clone, Debug, PartialEq)]
pub struct Histogram {
    edges: Vec<f64>,
    // including underflow and overflow
    contents: Vec<f64>,
    errors: Option<Vec<f64>>,
}

/// How to re-express a histogram on different bin edges
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    Display,
    EnumString,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Deserialize,
    Serialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum RebinPolicy {
    /// Only accept identical bin edges
    #[default]
    Strict,
    /// Copy bin `i` to bin `i`, requiring the same number of bins
    ///
    /// This is what is needed for fit outputs that are stored on a
    /// bin-index axis instead of the original observable.
    Positional,
}

impl Histogram {
    /// Empty histogram with the given bin edges
    pub fn new(edges: Vec<f64>) -> Result<Self, HistogramError> {
        check_edges(&edges)?;
        let contents = vec![0.; edges.len() + 1];
        Ok(Self {
            edges,
            contents,
            errors: None,
        })
    }

    /// Histogram with the given bin edges and contents of the regular bins
    ///
    /// Underflow and overflow are set to zero.
    pub fn from_contents(
        edges: Vec<f64>,
        contents: Vec<f64>,
    ) -> Result<Self, HistogramError> {
        let mut res = Self::new(edges)?;
        if contents.len() != res.nbins() {
            return Err(HistogramError::ContentLength {
                expected: res.nbins(),
                got: contents.len(),
            });
        }
        let n = res.nbins();
        res.contents[1..=n].copy_from_slice(&contents);
        Ok(res)
    }

    /// Set the errors of the regular bins
    pub fn with_errors(
        mut self,
        errors: Vec<f64>,
    ) -> Result<Self, HistogramError> {
        let n = self.nbins();
        if errors.len() != n {
            return Err(HistogramError::ErrorLength {
                expected: n,
                got: errors.len(),
            });
        }
        let mut all = vec![0.; n + 2];
        all[1..=n].copy_from_slice(&errors);
        self.errors = Some(all);
        Ok(self)
    }

    /// Number of regular bins
    pub fn nbins(&self) -> usize {
        self.edges.len() - 1
    }

    /// All bin edges, including the upper edge of the last bin
    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    /// Contents of the regular bins
    pub fn contents(&self) -> &[f64] {
        &self.contents[1..=self.nbins()]
    }

    /// Index of the bin containing `x`
    ///
    /// Values below the first edge map to the underflow bin `0`,
    /// values at or above the last edge (and NaN) to the overflow bin.
    pub fn find_bin(&self, x: f64) -> usize {
        if x < self.edges[0] {
            return 0;
        }
        if x.is_nan() || x >= self.edges[self.nbins()] {
            return self.nbins() + 1;
        }
        // number of edges <= x
        self.edges.partition_point(|&edge| edge <= x)
    }

    /// Content of the bin with the given index
    ///
    /// Indices beyond the overflow bin have content zero.
    pub fn bin_content(&self, bin: usize) -> f64 {
        self.contents.get(bin).copied().unwrap_or_default()
    }

    /// Set the content of the bin with the given index
    ///
    /// # Panics
    ///
    /// Panics if `bin` is beyond the overflow bin.
    pub fn set_bin_content(&mut self, bin: usize, content: f64) {
        self.contents[bin] = content;
    }

    /// Error of the bin with the given index
    ///
    /// Without explicit errors this is the square root of the content.
    pub fn bin_error(&self, bin: usize) -> f64 {
        match &self.errors {
            Some(errors) => errors.get(bin).copied().unwrap_or_default(),
            None => self.bin_content(bin).abs().sqrt(),
        }
    }

    /// Set the error of the bin with the given index
    ///
    /// # Panics
    ///
    /// Panics if `bin` is beyond the overflow bin.
    pub fn set_bin_error(&mut self, bin: usize, error: f64) {
        let errors = self.errors.get_or_insert_with(|| {
            self.contents.iter().map(|c| c.abs().sqrt()).collect()
        });
        errors[bin] = error;
    }

    /// Whether explicit bin errors are stored
    pub fn has_errors(&self) -> bool {
        self.errors.is_some()
    }

    /// Sum of the regular bin contents
    pub fn integral(&self) -> f64 {
        self.contents().iter().sum()
    }

    /// Whether both histograms have exactly the same bin edges
    pub fn same_binning(&self, other: &Histogram) -> bool {
        self.edges == other.edges
    }

    /// Add the contents of `other` bin by bin, including flow bins
    ///
    /// Errors are added in quadrature.
    pub fn add(&mut self, other: &Histogram) -> Result<(), HistogramError> {
        if !self.same_binning(other) {
            return Err(HistogramError::BinningMismatch(
                self.edges.clone(),
                other.edges.clone(),
            ));
        }
        if self.has_errors() || other.has_errors() {
            let errors: Vec<_> = (0..self.contents.len())
                .map(|bin| self.bin_error(bin).hypot(other.bin_error(bin)))
                .collect();
            self.errors = Some(errors);
        }
        for (c, o) in self.contents.iter_mut().zip(&other.contents) {
            *c += o;
        }
        Ok(())
    }

    /// Re-express this histogram on the given bin edges
    ///
    /// Identical edges always give a copy. Otherwise the result depends
    /// on the policy, see [RebinPolicy]. Positional rebinning leaves the
    /// flow bins of the result empty.
    pub fn rebin_onto(
        &self,
        edges: &[f64],
        policy: RebinPolicy,
    ) -> Result<Histogram, HistogramError> {
        if self.edges == edges {
            return Ok(self.clone());
        }
        match policy {
            RebinPolicy::Strict => Err(HistogramError::BinningMismatch(
                self.edges.clone(),
                edges.to_vec(),
            )),
            RebinPolicy::Positional => {
                let mut res = Histogram::new(edges.to_vec())?;
                if res.nbins() != self.nbins() {
                    return Err(HistogramError::BinCountMismatch {
                        expected: res.nbins(),
                        got: self.nbins(),
                    });
                }
                for bin in 1..=res.nbins() {
                    res.set_bin_content(bin, self.bin_content(bin));
                    if self.has_errors() {
                        res.set_bin_error(bin, self.bin_error(bin));
                    }
                }
                Ok(res)
            }
        }
    }
}

fn check_edges(edges: &[f64]) -> Result<(), HistogramError> {
    if edges.len() < 2 {
        return Err(HistogramError::TooFewEdges(edges.len()));
    }
    let valid = edges.iter().all(|e| e.is_finite())
        && edges.windows(2).all(|w| w[0] < w[1]);
    if valid {
        Ok(())
    } else {
        Err(HistogramError::InvalidEdges(edges.to_vec()))
    }
}

/// On-disk representation of a histogram
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct HistogramRepr {
    edges: Vec<f64>,
    contents: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    errors: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "is_zero")]
    underflow: f64,
    #[serde(default, skip_serializing_if = "is_zero")]
    overflow: f64,
}

fn is_zero(x: &f64) -> bool {
    *x == 0.
}

impl TryFrom<HistogramRepr> for Histogram {
    type Error = HistogramError;

    fn try_from(repr: HistogramRepr) -> Result<Self, Self::Error> {
        let HistogramRepr {
            edges,
            contents,
            errors,
            underflow,
            overflow,
        } = repr;
        let mut res = Histogram::from_contents(edges, contents)?;
        if let Some(errors) = errors {
            res = res.with_errors(errors)?;
        }
        let n = res.nbins();
        res.set_bin_content(0, underflow);
        res.set_bin_content(n + 1, overflow);
        Ok(res)
    }
}

impl From<&Histogram> for HistogramRepr {
    fn from(h: &Histogram) -> Self {
        let n = h.nbins();
        Self {
            edges: h.edges.clone(),
            contents: h.contents().to_vec(),
            errors: h.errors.as_ref().map(|e| e[1..=n].to_vec()),
            underflow: h.bin_content(0),
            overflow: h.bin_content(n + 1),
        }
    }
}

/// Error constructing or combining histograms
#[derive(Debug, Error)]
pub enum HistogramError {
    /// Not enough bin edges
    #[error("A histogram needs at least two bin edges, got {0}")]
    TooFewEdges(usize),
    /// Bin edges are not finite or not strictly increasing
    #[error("Bin edges have to be finite and strictly increasing: {0:?}")]
    InvalidEdges(Vec<f64>),
    /// Wrong number of bin contents
    #[error("Expected {expected} bin contents, got {got}")]
    ContentLength {
        /// Number of regular bins
        expected: usize,
        /// Number of given contents
        got: usize,
    },
    /// Wrong number of bin errors
    #[error("Expected {expected} bin errors, got {got}")]
    ErrorLength {
        /// Number of regular bins
        expected: usize,
        /// Number of given errors
        got: usize,
    },
    /// Bin edges differ
    #[error("Incompatible bin edges {0:?} and {1:?}")]
    BinningMismatch(Vec<f64>, Vec<f64>),
    /// Positional rebinning with a different number of bins
    #[error("Cannot copy {got} bins onto a histogram with {expected} bins")]
    BinCountMismatch {
        /// Number of target bins
        expected: usize,
        /// Number of source bins
        got: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hist(edges: &[f64], contents: &[f64]) -> Histogram {
        Histogram::from_contents(edges.to_vec(), contents.to_vec()).unwrap()
    }

    #[test]
    fn find_bin() {
        let h = hist(&[-1., 0., 0.5, 1.], &[1., 2., 3.]);
        assert_eq!(h.find_bin(-1.5), 0);
        assert_eq!(h.find_bin(-1.), 1);
        assert_eq!(h.find_bin(-0.5), 1);
        assert_eq!(h.find_bin(0.), 2);
        assert_eq!(h.find_bin(0.25), 2);
        assert_eq!(h.find_bin(0.5), 3);
        assert_eq!(h.find_bin(0.999), 3);
        assert_eq!(h.find_bin(1.), 4);
        assert_eq!(h.find_bin(10.), 4);
        assert_eq!(h.find_bin(f64::NAN), 4);
    }

    #[test]
    fn content_and_flows() {
        let mut h = hist(&[0., 1., 2.], &[3., 4.]);
        assert_eq!(h.nbins(), 2);
        assert_eq!(h.bin_content(0), 0.);
        assert_eq!(h.bin_content(1), 3.);
        assert_eq!(h.bin_content(2), 4.);
        assert_eq!(h.bin_content(3), 0.);
        assert_eq!(h.bin_content(17), 0.);
        h.set_bin_content(3, 1.);
        assert_eq!(h.bin_content(3), 1.);
        assert_eq!(h.integral(), 7.);
        assert_eq!(h.bin_error(2), 2.);
    }

    #[test]
    fn invalid_edges() {
        assert!(matches!(
            Histogram::new(vec![0.]),
            Err(HistogramError::TooFewEdges(1))
        ));
        assert!(matches!(
            Histogram::new(vec![0., 0., 1.]),
            Err(HistogramError::InvalidEdges(_))
        ));
        assert!(matches!(
            Histogram::new(vec![0., f64::INFINITY]),
            Err(HistogramError::InvalidEdges(_))
        ));
        assert!(matches!(
            Histogram::from_contents(vec![0., 1.], vec![1., 2.]),
            Err(HistogramError::ContentLength { expected: 1, got: 2 })
        ));
    }

    #[test]
    fn add() {
        let mut a = hist(&[0., 1., 2.], &[1., 2.])
            .with_errors(vec![3., 0.])
            .unwrap();
        let b = hist(&[0., 1., 2.], &[3., 4.])
            .with_errors(vec![4., 1.])
            .unwrap();
        a.add(&b).unwrap();
        assert_eq!(a.contents(), &[4., 6.]);
        assert_eq!(a.bin_error(1), 5.);
        assert_eq!(a.bin_error(2), 1.);

        let c = hist(&[0., 1., 3.], &[1., 1.]);
        assert!(matches!(a.add(&c), Err(HistogramError::BinningMismatch(..))));
    }

    #[test]
    fn rebin() {
        let fit = hist(&[0., 1., 2.], &[15., 10.])
            .with_errors(vec![1., 2.])
            .unwrap();
        let edges = [-1., 0., 1.];

        assert!(matches!(
            fit.rebin_onto(&edges, RebinPolicy::Strict),
            Err(HistogramError::BinningMismatch(..))
        ));

        let rebinned = fit.rebin_onto(&edges, RebinPolicy::Positional).unwrap();
        assert_eq!(rebinned.edges(), &edges);
        assert_eq!(rebinned.contents(), &[15., 10.]);
        assert_eq!(rebinned.bin_error(1), 1.);
        assert_eq!(rebinned.bin_error(2), 2.);
        assert_eq!(rebinned.bin_content(0), 0.);
        assert_eq!(rebinned.bin_content(3), 0.);

        let same = fit.rebin_onto(&[0., 1., 2.], RebinPolicy::Strict).unwrap();
        assert_eq!(same, fit);

        assert!(matches!(
            fit.rebin_onto(&[0., 0.5, 1., 1.5], RebinPolicy::Positional),
            Err(HistogramError::BinCountMismatch { expected: 3, got: 2 })
        ));
    }

    #[test]
    fn rebin_policy_from_str() {
        assert_eq!("strict".parse::<RebinPolicy>().unwrap(), RebinPolicy::Strict);
        assert_eq!(
            "Positional".parse::<RebinPolicy>().unwrap(),
            RebinPolicy::Positional
        );
        assert!("nearest".parse::<RebinPolicy>().is_err());
        assert_eq!(RebinPolicy::Positional.to_string(), "positional");
    }
}
