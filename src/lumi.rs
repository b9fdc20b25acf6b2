//! Module for everything related to luminosity functions.

use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Number of flavour slots: the (anti)quarks up to top, the gluon and the
/// photon.
pub const FLAVOURS: usize = 14;

/// Maps a PDG Monte-Carlo id to its flavour slot, with the gluon at index 6
/// and the photon at index 13. PDG id `0` is accepted as a gluon alias.
/// Returns `None` for ids without a slot.
#[must_use]
pub const fn flavour_index(pdg_id: i32) -> Option<usize> {
    match pdg_id {
        -6..=-1 | 1..=6 => Some((pdg_id + 6) as usize),
        0 | 21 => Some(6),
        22 => Some(13),
        _ => None,
    }
}

/// This structure represents an entry of a luminosity function. Each entry
/// consists of a tuple, which contains, in the following order, the PDG id
/// of the first incoming parton, then the PDG id of the second parton, and
/// finally a numerical factor that will multiply the product of the first
/// two distributions.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Channel {
    entry: Vec<(i32, i32, f64)>,
}

impl Channel {
    /// Constructor for `Channel`. Repeated flavour pairs are merged by
    /// summing their factors, so the order of the tuples does not matter.
    ///
    /// # Panics
    ///
    /// Panics if `entry` is empty.
    #[must_use]
    pub fn new(entry: Vec<(i32, i32, f64)>) -> Self {
        assert!(!entry.is_empty());

        let entry = entry
            .into_iter()
            .sorted_by_key(|&(a, b, _)| (a, b))
            .coalesce(|lhs, rhs| {
                if (lhs.0, lhs.1) == (rhs.0, rhs.1) {
                    Ok((lhs.0, lhs.1, lhs.2 + rhs.2))
                } else {
                    Err((lhs, rhs))
                }
            })
            .collect();

        Self { entry }
    }

    /// Returns a tuple representation of this entry.
    #[must_use]
    pub fn entry(&self) -> &[(i32, i32, f64)] {
        &self.entry
    }
}

/// Helper macro to quickly generate a `Channel` at compile time.
///
/// ```
/// # use applique::channel;
/// # use applique::lumi::Channel;
/// let entry1 = channel![2, 2, 1.0; 4, 4, 1.0];
/// let entry2 = Channel::new(vec![(2, 2, 1.0), (4, 4, 1.0)]);
/// assert_eq!(entry1, entry2);
/// ```
#[macro_export]
macro_rules! channel {
    ($a:expr, $b:expr, $factor:expr $(; $c:expr, $d:expr, $fac:expr)*) => {
        $crate::lumi::Channel::new(vec![($a, $b, $factor), $(($c, $d, $fac)),*])
    };
}

/// An ordered collection of channels combining incoming flavour pairs into
/// generalised PDFs.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Luminosity {
    channels: Vec<Channel>,
}

impl Luminosity {
    /// Constructor.
    ///
    /// # Panics
    ///
    /// Panics if `channels` is empty.
    #[must_use]
    pub fn new(channels: Vec<Channel>) -> Self {
        assert!(!channels.is_empty());

        Self { channels }
    }

    /// Returns the channels.
    #[must_use]
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Returns the number of channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Returns `true` if there are no channels; a constructed luminosity
    /// never is.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Contracts two flavour vectors into one value per channel. Slots the
    /// PDF provider disabled carry zeros and flavour pairs without a slot
    /// contribute nothing.
    pub fn evaluate(&self, f1: &[f64], f2: &[f64], out: &mut [f64]) {
        debug_assert_eq!(f1.len(), FLAVOURS);
        debug_assert_eq!(f2.len(), FLAVOURS);
        debug_assert_eq!(out.len(), self.channels.len());

        for (channel, out) in self.channels.iter().zip(out.iter_mut()) {
            *out = channel
                .entry
                .iter()
                .map(|&(a, b, factor)| {
                    match (flavour_index(a), flavour_index(b)) {
                        (Some(ia), Some(ib)) => factor * f1[ia] * f2[ib],
                        _ => 0.0,
                    }
                })
                .sum();
        }
    }

    /// Returns the luminosity restricted to the channels in `keep`, which
    /// must be sorted.
    ///
    /// # Panics
    ///
    /// Panics if `keep` is empty or contains an out-of-range index.
    #[must_use]
    pub fn shrink(&self, keep: &[usize]) -> Self {
        Self::new(keep.iter().map(|&c| self.channels[c].clone()).collect())
    }
}
