#![warn(clippy::all, clippy::cargo, clippy::nursery, clippy::pedantic)]
#![warn(missing_docs)]
#![allow(clippy::must_use_candidate)]

//! Interpolation grids that decouple the expensive parton-level computation
//! of a cross section from its convolution with parton distribution
//! functions and the running strong coupling. Weights accumulated during
//! event generation can be convoluted with any PDF set afterwards, without
//! revisiting the parton-level calculation.

pub mod axis;
pub mod bin;
mod convert;
pub mod convolution;
pub mod error;
pub mod grid;
pub mod igrid;
pub mod interpolation;
pub mod lumi;
pub mod sparse_tensor3;
pub mod transform;
