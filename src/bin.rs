//! Module containing the observable binning.

use crate::convert::{f64_from_usize, usize_from_f64};
use float_cmp::approx_eq;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
enum Limits {
    Equal { left: f64, right: f64, bins: usize },
    Unequal { limits: Vec<f64> },
}

/// Strictly monotone bin edges over the observable.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct BinLimits(Limits);

impl BinLimits {
    /// Constructor for `BinLimits`.
    ///
    /// # Panics
    ///
    /// Panics if `limits` contains fewer than two values or values that can
    /// not be ordered.
    #[must_use]
    pub fn new(mut limits: Vec<f64>) -> Self {
        assert!(limits.len() >= 2);

        limits.sort_by(|left, right| left.partial_cmp(right).unwrap());

        if limits
            .iter()
            .zip(limits.iter().skip(1))
            .map(|(current, next)| next - current)
            .collect::<Vec<f64>>()
            .windows(2)
            .all(|val| approx_eq!(f64, val[0], val[1], ulps = 8))
        {
            Self(Limits::Equal {
                left: *limits.first().unwrap(),
                right: *limits.last().unwrap(),
                bins: limits.len() - 1,
            })
        } else {
            Self(Limits::Unequal { limits })
        }
    }

    /// Returns the number of bins.
    #[must_use]
    pub fn bins(&self) -> usize {
        match &self.0 {
            Limits::Equal { bins, .. } => *bins,
            Limits::Unequal { limits } => limits.len() - 1,
        }
    }

    /// Returns the bin index for the observable `value`, or `None` if the
    /// value over- or underflows the edges.
    #[must_use]
    pub fn index(&self, value: f64) -> Option<usize> {
        match &self.0 {
            Limits::Equal { left, right, bins } => {
                if value < *left || value >= *right {
                    None
                } else {
                    Some(usize_from_f64(
                        (value - left) / (right - left) * f64_from_usize(*bins),
                    ))
                }
            }
            Limits::Unequal { limits } => {
                match limits.binary_search_by(|left| left.partial_cmp(&value).unwrap()) {
                    Err(0) => None,
                    Err(index) if index == limits.len() => None,
                    Ok(index) if index == limits.len() - 1 => None,
                    Ok(index) => Some(index),
                    Err(index) => Some(index - 1),
                }
            }
        }
    }

    /// Returns the edges in a `Vec`.
    #[must_use]
    pub fn limits(&self) -> Vec<f64> {
        match &self.0 {
            Limits::Equal { left, right, bins } => (0..=*bins)
                .map(|b| {
                    (*right - *left).mul_add(f64_from_usize(b) / f64_from_usize(*bins), *left)
                })
                .collect(),
            Limits::Unequal { limits } => limits.clone(),
        }
    }

    /// Returns the width of the bin with the given index.
    #[must_use]
    pub fn width(&self, bin: usize) -> f64 {
        debug_assert!(bin < self.bins());

        match &self.0 {
            Limits::Equal { left, right, bins } => (right - left) / f64_from_usize(*bins),
            Limits::Unequal { limits } => limits[bin + 1] - limits[bin],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;

    #[test]
    fn equal_bins() {
        let limits = BinLimits::new(vec![0.0, 0.25, 0.5, 0.75, 1.0]);

        assert_eq!(limits.bins(), 4);
        assert_eq!(limits.index(0.1), Some(0));
        assert_eq!(limits.index(0.25), Some(1));
        assert_eq!(limits.index(0.99), Some(3));
        assert_eq!(limits.index(-0.1), None);
        assert_eq!(limits.index(1.0), None);
        assert_eq!(limits.index(1.5), None);
        assert_approx_eq!(f64, limits.width(2), 0.25, ulps = 2);
        assert_eq!(limits.limits(), vec![0.0, 0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn unequal_bins() {
        let limits = BinLimits::new(vec![0.125, 0.25, 1.0, 1.5]);

        assert_eq!(limits.bins(), 3);
        assert_eq!(limits.index(0.2), Some(0));
        assert_eq!(limits.index(0.5), Some(1));
        assert_eq!(limits.index(1.25), Some(2));
        assert_eq!(limits.index(0.1), None);
        assert_eq!(limits.index(1.5), None);
        assert_approx_eq!(f64, limits.width(1), 0.75, ulps = 2);
        assert_eq!(limits.limits(), vec![0.125, 0.25, 1.0, 1.5]);
    }

    #[test]
    fn single_bin() {
        let limits = BinLimits::new(vec![0.0, 1.0]);

        assert_eq!(limits.bins(), 1);
        assert_eq!(limits.index(0.25), Some(0));
        assert_eq!(limits.index(1.5), None);
        assert_approx_eq!(f64, limits.width(0), 1.0, ulps = 2);
    }
}
