//! Module containing the top-level [`Grid`].

use crate::bin::BinLimits;
use crate::convolution::{ConvolutionCache, NodeCache};
use crate::error::GridError;
use crate::igrid::{ConvolveMode, IgridRecord, InterpGrid, InterpParams};
use crate::lumi::{Channel, Luminosity};
use lz4_flex::frame::{FrameDecoder, FrameEncoder};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};

/// Coupling powers carried by one interpolation grid.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Order {
    /// Exponent of the strong coupling.
    pub alphas: u32,
    /// Exponent of the electromagnetic coupling.
    pub alpha: u32,
    /// Exponent of the logarithm of the renormalisation scale factor.
    pub logxir: u32,
    /// Exponent of the logarithm of the factorisation scale factor.
    pub logxif: u32,
}

impl Order {
    /// Constructor.
    #[must_use]
    pub const fn new(alphas: u32, alpha: u32, logxir: u32, logxif: u32) -> Self {
        Self {
            alphas,
            alpha,
            logxir,
            logxif,
        }
    }
}

/// Main data structure: one [`InterpGrid`] for each perturbative order and
/// observable bin, sharing a luminosity function and construction
/// parameters.
#[derive(Clone, Debug)]
pub struct Grid {
    igrids: Array2<Option<InterpGrid>>,
    lumi: Luminosity,
    bin_limits: BinLimits,
    orders: Vec<Order>,
    params: InterpParams,
    template: InterpGrid,
    metadata: HashMap<String, String>,
}

const MAGIC: &[u8; 8] = b"applique";
const FORMAT_VERSION: u64 = 0;

impl Grid {
    /// Constructor.
    ///
    /// # Errors
    ///
    /// Fails with [`GridError::UnknownTransform`] if the transform named in
    /// `params` cannot be resolved.
    ///
    /// # Panics
    ///
    /// Panics if `orders` is empty or `bin_limits` has fewer than two
    /// entries.
    pub fn new(
        lumi: Luminosity,
        orders: Vec<Order>,
        bin_limits: Vec<f64>,
        params: InterpParams,
    ) -> Result<Self, GridError> {
        assert!(!orders.is_empty());

        let template = InterpGrid::new(&params, lumi.len())?;
        let bin_limits = BinLimits::new(bin_limits);

        Ok(Self {
            igrids: Array2::from_shape_simple_fn((orders.len(), bin_limits.bins()), || None),
            template,
            lumi,
            bin_limits,
            orders,
            params,
            metadata: [
                (
                    "creator".to_owned(),
                    concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION")).to_owned(),
                ),
                // protons unless the user says otherwise
                ("initial_state_1".to_owned(), "2212".to_owned()),
                ("initial_state_2".to_owned(), "2212".to_owned()),
            ]
            .into_iter()
            .collect(),
        })
    }

    /// Returns the luminosity function.
    #[must_use]
    pub const fn lumi(&self) -> &Luminosity {
        &self.lumi
    }

    /// Returns the perturbative orders.
    #[must_use]
    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    /// Returns the bin edges.
    #[must_use]
    pub fn bin_limits(&self) -> Vec<f64> {
        self.bin_limits.limits()
    }

    /// Returns the number of observable bins.
    #[must_use]
    pub fn bins(&self) -> usize {
        self.bin_limits.bins()
    }

    /// Returns the interpolation grid for the given order and bin, if it
    /// was ever filled.
    #[must_use]
    pub fn igrid(&self, order: usize, bin: usize) -> Option<&InterpGrid> {
        self.igrids[[order, bin]].as_ref()
    }

    /// Returns the key-value metadata.
    #[must_use]
    pub const fn key_values(&self) -> &HashMap<String, String> {
        &self.metadata
    }

    /// Sets the metadata entry `key` to `value`.
    pub fn set_key_value(&mut self, key: &str, value: &str) {
        self.metadata.insert(key.to_owned(), value.to_owned());
    }

    // difference of the highest and lowest power of the strong coupling
    fn nloop(&self) -> u32 {
        let min = self.orders.iter().map(|order| order.alphas).min();
        let max = self.orders.iter().map(|order| order.alphas).max();

        max.zip(min).map_or(0, |(max, min)| max - min)
    }

    fn igrid_or_insert(&mut self, order: usize, bin: usize) -> &mut InterpGrid {
        let igrid = &mut self.igrids[[order, bin]];
        if igrid.is_none() {
            *igrid = Some(self.template.clone());
        }
        // UNWRAP: just inserted above
        igrid.as_mut().unwrap_or_else(|| unreachable!())
    }

    /// Fills the grid at `(x1, x2, q2)` with one weight per channel, for
    /// the interpolation grid selected by `order` and the bin containing
    /// `observable`. Observables outside the bin edges are dropped.
    ///
    /// # Panics
    ///
    /// Panics if `order` is out of range or `weights` does not have one
    /// entry per channel.
    pub fn fill(
        &mut self,
        x1: f64,
        x2: f64,
        q2: f64,
        observable: f64,
        weights: &[f64],
        order: usize,
    ) {
        if let Some(bin) = self.bin_limits.index(observable) {
            self.igrid_or_insert(order, bin).fill(x1, x2, q2, weights);
        }
    }

    /// Books phase-space points without interpolation, to discover the
    /// populated region before [`Grid::optimise`].
    pub fn fill_phasespace(
        &mut self,
        x1: f64,
        x2: f64,
        q2: f64,
        observable: f64,
        weights: &[f64],
        order: usize,
    ) {
        if let Some(bin) = self.bin_limits.index(observable) {
            self.igrid_or_insert(order, bin)
                .fill_phasespace(x1, x2, q2, weights);
        }
    }

    /// Convolutes the stored weights with the providers in `cache` and
    /// returns the cross section per bin, multiplied by the bin widths.
    /// Channels whose `mask` entry is `false` are left out. The scale
    /// factors `xi_r` and `xi_f` multiply the renormalisation and
    /// factorisation scales, `beam_scale` rescales the parton momentum
    /// fractions for convolutions at a different beam energy.
    #[must_use]
    pub fn convolute(
        &self,
        cache: &mut ConvolutionCache,
        mask: Option<&[bool]>,
        xi_r: f64,
        xi_f: f64,
        beam_scale: f64,
    ) -> Vec<f64> {
        let mut bins = vec![0.0; self.bin_limits.bins()];
        let nloop = self.nloop();
        let lo_alphas = self
            .orders
            .iter()
            .map(|order| order.alphas)
            .min()
            // UNWRAP: grids are constructed with at least one order
            .unwrap_or_else(|| unreachable!());

        for ((iord, bin), igrid) in self.igrids.indexed_iter() {
            let Some(igrid) = igrid else {
                continue;
            };
            if igrid.is_empty() {
                continue;
            }

            let order = &self.orders[iord];

            // log grids carry nothing at the central scales
            if (order.logxir > 0 && xi_r == 1.0) || (order.logxif > 0 && xi_f == 1.0) {
                continue;
            }

            let nodes = NodeCache::new(igrid, cache, xi_r, xi_f, beam_scale, nloop);

            let mut value =
                igrid.convolve(&nodes, &self.lumi, mask, order.alphas, ConvolveMode::Standard);

            if order.logxir > 0 {
                value *= (xi_r * xi_r)
                    .ln()
                    .powi(order.logxir.try_into().unwrap_or_else(|_| unreachable!()));
            }
            if order.logxif > 0 {
                value *= (xi_f * xi_f)
                    .ln()
                    .powi(order.logxif.try_into().unwrap_or_else(|_| unreachable!()));
            }

            // factorisation-scale variation of the leading order through the
            // splitting functions, for calculations without explicit log grids
            if nodes.has_splitting()
                && order.alphas == lo_alphas
                && order.logxir == 0
                && order.logxif == 0
            {
                let counterterm = igrid.convolve(
                    &nodes,
                    &self.lumi,
                    mask,
                    order.alphas + 1,
                    ConvolveMode::Splitting1,
                ) + igrid.convolve(
                    &nodes,
                    &self.lumi,
                    mask,
                    order.alphas + 1,
                    ConvolveMode::Splitting2,
                );

                value -= (xi_f * xi_f).ln() * counterterm;
            }

            bins[bin] += value;
        }

        for (bin, value) in bins.iter_mut().enumerate() {
            *value *= self.bin_limits.width(bin);
        }

        bins
    }

    /// Multiplies every stored weight by `factor`.
    pub fn scale(&mut self, factor: f64) {
        for igrid in self.igrids.iter_mut().flatten() {
            igrid.scale(factor);
        }
    }

    /// Adds the weights of `other` to this grid.
    ///
    /// # Errors
    ///
    /// Fails with [`GridError::AxisMismatch`] unless both grids share the
    /// same orders, bins, channels and axes.
    pub fn merge(&mut self, other: &Self) -> Result<(), GridError> {
        if self.orders != other.orders
            || self.bin_limits != other.bin_limits
            || self.lumi != other.lumi
        {
            return Err(GridError::AxisMismatch);
        }

        for (igrid, other) in self.igrids.iter_mut().zip(other.igrids.iter()) {
            match (igrid.as_mut(), other) {
                (Some(igrid), Some(other)) => igrid.merge(other)?,
                (None, Some(other)) => *igrid = Some(other.clone()),
                (_, None) => {}
            }
        }

        Ok(())
    }

    /// Shrinks every interpolation grid to the populated subranges and
    /// reallocates the tensors with the construction node counts. Must be
    /// called after the phase-space discovery fills and before the
    /// interpolating fills.
    pub fn optimise(&mut self) {
        let (q2_nodes, x_nodes) = (self.params.q2_nodes(), self.params.x_nodes());

        for igrid in self.igrids.iter_mut().flatten() {
            igrid.optimise(q2_nodes, x_nodes, x_nodes);
        }
    }

    /// Restricts the grid to the channels in the sorted list `keep`.
    ///
    /// # Panics
    ///
    /// Panics if `keep` is empty or contains an out-of-range index.
    pub fn shrink(&mut self, keep: &[usize]) {
        self.lumi = self.lumi.shrink(keep);

        for igrid in self.igrids.iter_mut().flatten() {
            igrid.shrink(keep);
        }
    }

    /// Contracts every tensor to its minimal bounding boxes.
    pub fn trim(&mut self) {
        for igrid in self.igrids.iter_mut().flatten() {
            igrid.trim();
        }
    }

    /// Constructs a `Grid` by deserializing it from `reader`, transparently
    /// decompressing LZ4 frames. Reading is buffered.
    ///
    /// # Errors
    ///
    /// Fails if the stream is not a grid file, was written with an
    /// unsupported format version, or cannot be read.
    pub fn read(reader: impl Read) -> Result<Self, GridError> {
        let mut reader = BufReader::new(reader);
        let buffer = reader.fill_buf()?;

        if buffer.len() >= 4
            && u32::from_le_bytes(
                buffer[0..4]
                    .try_into()
                    // UNWRAP: the slice is four bytes long
                    .unwrap_or_else(|_| unreachable!()),
            ) == 0x184D_2204
        {
            Self::read_uncompressed(BufReader::new(FrameDecoder::new(reader)))
        } else {
            Self::read_uncompressed(reader)
        }
    }

    fn read_uncompressed(mut reader: impl BufRead) -> Result<Self, GridError> {
        let mut header = [0; 16];
        reader.read_exact(&mut header)?;

        if &header[0..8] != MAGIC {
            return Err(GridError::InvalidMagic);
        }

        let file_version = u64::from_le_bytes(
            header[8..16]
                .try_into()
                // UNWRAP: the slice is eight bytes long
                .unwrap_or_else(|_| unreachable!()),
        );

        if file_version != FORMAT_VERSION {
            return Err(GridError::FileVersionMismatch {
                file_version,
                supported_version: FORMAT_VERSION,
            });
        }

        let record = bincode::deserialize_from(reader).map_err(GridError::ReadFailure)?;

        Self::from_record(record)
    }

    /// Serializes `self` into `writer`. Writing is buffered.
    ///
    /// # Errors
    ///
    /// Fails if writing to `writer` fails.
    pub fn write(&self, writer: impl Write) -> Result<(), GridError> {
        let mut writer = BufWriter::new(writer);

        writer.write_all(MAGIC)?;
        writer.write_all(&FORMAT_VERSION.to_le_bytes())?;

        bincode::serialize_into(writer, &self.to_record()).map_err(GridError::WriteFailure)
    }

    /// Serializes `self` into `writer`, compressing with an LZ4 frame.
    ///
    /// # Errors
    ///
    /// Fails if writing or compression fails.
    pub fn write_lz4(&self, writer: impl Write) -> Result<(), GridError> {
        let mut encoder = FrameEncoder::new(writer);
        self.write(&mut encoder)?;
        encoder
            .try_finish()
            .map(|_| ())
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err).into())
    }

    fn to_record(&self) -> GridRecord {
        GridRecord {
            bin_limits: self.bin_limits.limits(),
            orders: self
                .orders
                .iter()
                .map(|order| (order.alphas, order.alpha, order.logxir, order.logxif))
                .collect(),
            channels: self
                .lumi
                .channels()
                .iter()
                .map(|channel| channel.entry().to_vec())
                .collect(),
            params: self.params.clone(),
            metadata: self.metadata.clone(),
            igrids: self
                .igrids
                .iter()
                .map(|igrid| igrid.as_ref().map(InterpGrid::to_record))
                .collect(),
        }
    }

    fn from_record(record: GridRecord) -> Result<Self, GridError> {
        let lumi = Luminosity::new(record.channels.into_iter().map(Channel::new).collect());
        let orders: Vec<_> = record
            .orders
            .into_iter()
            .map(|(alphas, alpha, logxir, logxif)| Order::new(alphas, alpha, logxir, logxif))
            .collect();

        let mut grid = Self::new(lumi, orders, record.bin_limits, record.params)?;
        grid.metadata = record.metadata;

        let shape = grid.igrids.raw_dim();
        debug_assert_eq!(shape[0] * shape[1], record.igrids.len());

        for (slot, igrid) in grid.igrids.iter_mut().zip(record.igrids) {
            *slot = igrid.map(InterpGrid::from_record).transpose()?;
        }

        Ok(grid)
    }
}

/// Serialized form of a [`Grid`].
#[derive(Deserialize, Serialize)]
struct GridRecord {
    bin_limits: Vec<f64>,
    orders: Vec<(u32, u32, u32, u32)>,
    channels: Vec<Vec<(i32, i32, f64)>>,
    params: InterpParams,
    metadata: HashMap<String, String>,
    igrids: Vec<Option<IgridRecord>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel;
    use crate::lumi::FLAVOURS;
    use float_cmp::assert_approx_eq;
    use std::io::Cursor;

    // the one-bin up-up scenario used throughout: transform f2, one order
    // (0, 2, 0, 0), xf = x and αₛ = 1, for which a unit fill convolutes to
    // exactly one
    fn scenario_grid() -> Grid {
        let mut params = InterpParams::default();
        params.set_q2_nodes(30);
        params.set_q2_range(100.0, 1e6);
        params.set_q2_order(1);
        params.set_x_nodes(50);
        params.set_x_range(2e-7, 1.0);
        params.set_x_order(1);

        Grid::new(
            Luminosity::new(vec![channel![2, 2, 1.0]]),
            vec![Order::new(0, 2, 0, 0)],
            vec![0.0, 1.0],
            params,
        )
        .unwrap()
    }

    fn convolute_simple(grid: &Grid, mask: Option<&[bool]>) -> Vec<f64> {
        let mut pdf1 = |x: f64, _: f64, out: &mut [f64; FLAVOURS]| out.fill(x);
        let mut pdf2 = |x: f64, _: f64, out: &mut [f64; FLAVOURS]| out.fill(x);
        let mut alphas = |_: f64| 1.0;
        let mut cache = ConvolutionCache::new(&mut pdf1, &mut pdf2, &mut alphas);

        grid.convolute(&mut cache, mask, 1.0, 1.0, 1.0)
    }

    #[test]
    fn single_point_fill() {
        let mut grid = scenario_grid();

        grid.fill(0.25, 0.25, 1e4, 0.25, &[1.0], 0);

        let results = convolute_simple(&grid, None);

        assert_eq!(results.len(), 1);
        assert_approx_eq!(f64, results[0], 1.0, ulps = 8);
    }

    #[test]
    fn filling_twice_doubles_and_scaling_halves() {
        let mut grid = scenario_grid();

        grid.fill(0.25, 0.25, 1e4, 0.25, &[1.0], 0);
        grid.fill(0.25, 0.25, 1e4, 0.25, &[1.0], 0);

        assert_approx_eq!(f64, convolute_simple(&grid, None)[0], 2.0, ulps = 8);

        grid.scale(0.5);

        assert_approx_eq!(f64, convolute_simple(&grid, None)[0], 1.0, ulps = 8);
    }

    #[test]
    fn persistence_round_trip() {
        let mut grid = scenario_grid();

        grid.fill(0.25, 0.25, 1e4, 0.25, &[1.0], 0);
        grid.set_key_value("events", "1");

        let mut bytes = Vec::new();
        grid.write(&mut bytes).unwrap();

        let restored = Grid::read(Cursor::new(&bytes)).unwrap();

        assert_eq!(restored.bins(), 1);
        assert_eq!(restored.orders(), grid.orders());
        assert_eq!(restored.lumi(), grid.lumi());
        assert_eq!(
            restored.key_values().get("events").map(String::as_str),
            Some("1")
        );
        assert_eq!(restored.igrid(0, 0), grid.igrid(0, 0));
        assert_approx_eq!(f64, convolute_simple(&restored, None)[0], 1.0, ulps = 8);
    }

    #[test]
    fn lz4_round_trip() {
        let mut grid = scenario_grid();

        grid.fill(0.25, 0.25, 1e4, 0.25, &[1.0], 0);

        let mut bytes = Vec::new();
        grid.write_lz4(&mut bytes).unwrap();

        let restored = Grid::read(Cursor::new(&bytes)).unwrap();

        assert_eq!(restored.igrid(0, 0), grid.igrid(0, 0));
    }

    #[test]
    fn read_rejects_junk() {
        assert!(matches!(
            Grid::read(Cursor::new(b"this is not a grid file")),
            Err(GridError::InvalidMagic)
        ));

        let mut bytes = Vec::new();
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&1_u64.to_le_bytes());

        assert!(matches!(
            Grid::read(Cursor::new(&bytes)),
            Err(GridError::FileVersionMismatch {
                file_version: 1,
                ..
            })
        ));
    }

    #[test]
    fn masked_channel_yields_zero() {
        let mut grid = scenario_grid();

        grid.fill(0.25, 0.25, 1e4, 0.25, &[1.0], 0);

        assert_eq!(convolute_simple(&grid, Some(&[false]))[0], 0.0);
    }

    #[test]
    fn out_of_range_observable_is_dropped() {
        let mut grid = scenario_grid();

        grid.fill(0.25, 0.25, 1e4, 1.5, &[1.0], 0);

        assert_eq!(convolute_simple(&grid, None)[0], 0.0);
    }

    #[test]
    fn empty_grid_convolutes_to_zeros() {
        let grid = scenario_grid();

        assert_eq!(convolute_simple(&grid, None), [0.0]);
    }

    #[test]
    fn dis_grid_round_trip() {
        let mut params = InterpParams::default();
        params.set_q2_nodes(30);
        params.set_q2_range(100.0, 1e6);
        params.set_q2_order(1);
        params.set_x_nodes(50);
        params.set_x_range(2e-7, 1.0);
        params.set_x_order(1);
        params.set_dis(true);

        let mut grid = Grid::new(
            Luminosity::new(vec![channel![2, 2, 1.0]]),
            vec![Order::new(0, 2, 0, 0)],
            vec![0.0, 1.0],
            params,
        )
        .unwrap();

        grid.fill(0.25, 0.7, 1e4, 0.25, &[1.0], 0);

        assert_approx_eq!(f64, convolute_simple(&grid, None)[0], 1.0, ulps = 8);
    }

    #[test]
    fn bin_widths_scale_the_results() {
        let mut params = InterpParams::default();
        params.set_q2_nodes(30);
        params.set_q2_range(100.0, 1e6);
        params.set_q2_order(1);
        params.set_x_nodes(50);
        params.set_x_order(1);

        let mut grid = Grid::new(
            Luminosity::new(vec![channel![2, 2, 1.0]]),
            vec![Order::new(0, 2, 0, 0)],
            vec![0.0, 2.0, 3.0],
            params,
        )
        .unwrap();

        grid.fill(0.25, 0.25, 1e4, 1.0, &[1.0], 0);
        grid.fill(0.25, 0.25, 1e4, 2.5, &[1.0], 0);

        let results = convolute_simple(&grid, None);

        assert_approx_eq!(f64, results[0], 2.0, ulps = 8);
        assert_approx_eq!(f64, results[1], 1.0, ulps = 8);
    }

    #[test]
    fn merging_concatenated_fills() {
        let mut all_at_once = scenario_grid();
        all_at_once.fill(0.25, 0.25, 1e4, 0.25, &[1.0], 0);
        all_at_once.fill(0.1, 0.3, 1e5, 0.75, &[0.5], 0);

        let mut first = scenario_grid();
        first.fill(0.25, 0.25, 1e4, 0.25, &[1.0], 0);
        let mut second = scenario_grid();
        second.fill(0.1, 0.3, 1e5, 0.75, &[0.5], 0);

        first.merge(&second).unwrap();

        assert_eq!(first.igrid(0, 0), all_at_once.igrid(0, 0));

        let incompatible = Grid::new(
            Luminosity::new(vec![channel![1, 1, 1.0]]),
            vec![Order::new(0, 2, 0, 0)],
            vec![0.0, 1.0],
            InterpParams::default(),
        )
        .unwrap();

        assert!(matches!(
            first.merge(&incompatible),
            Err(GridError::AxisMismatch)
        ));
    }

    #[test]
    fn shrink_to_kept_channels() {
        let mut params = InterpParams::default();
        params.set_q2_nodes(30);
        params.set_q2_range(100.0, 1e6);
        params.set_q2_order(1);
        params.set_x_nodes(50);
        params.set_x_order(1);

        let mut grid = Grid::new(
            Luminosity::new(vec![channel![1, 1, 1.0], channel![2, 2, 1.0]]),
            vec![Order::new(0, 2, 0, 0)],
            vec![0.0, 1.0],
            params,
        )
        .unwrap();

        grid.fill(0.25, 0.25, 1e4, 0.25, &[0.0, 1.0], 0);
        grid.shrink(&[1]);

        assert_eq!(grid.lumi().len(), 1);
        assert_approx_eq!(f64, convolute_simple(&grid, None)[0], 1.0, ulps = 8);
    }

    #[test]
    fn splitting_counterterm_off_the_central_scale() {
        let mut params = InterpParams::default();
        params.set_q2_nodes(30);
        params.set_q2_range(100.0, 1e6);
        params.set_q2_order(1);
        params.set_x_nodes(50);
        params.set_x_order(1);

        // LO plus an NLO order makes this a one-loop calculation
        let mut grid = Grid::new(
            Luminosity::new(vec![channel![2, 2, 1.0]]),
            vec![Order::new(0, 2, 0, 0), Order::new(1, 2, 0, 0)],
            vec![0.0, 1.0],
            params,
        )
        .unwrap();

        grid.fill(0.25, 0.25, 1e4, 0.25, &[1.0], 0);

        let xi_f: f64 = 2.0;

        let mut pdf1 = |x: f64, _: f64, out: &mut [f64; FLAVOURS]| out.fill(x);
        let mut pdf2 = |x: f64, _: f64, out: &mut [f64; FLAVOURS]| out.fill(x);
        let mut alphas = |_: f64| 1.0;
        let mut splitting = |x: f64, _: f64, out: &mut [f64; FLAVOURS]| out.fill(x);
        let mut cache = ConvolutionCache::new(&mut pdf1, &mut pdf2, &mut alphas)
            .with_splitting(&mut splitting);

        let results = grid.convolute(&mut cache, None, 1.0, xi_f, 1.0);

        // the LO value 1 gains −ln(ξ_F²)·(αₛ/2π)·(1 + 1)
        let expected = (xi_f * xi_f).ln().mul_add(-2.0 * 0.5 / std::f64::consts::PI, 1.0);

        assert_approx_eq!(f64, results[0], expected, epsilon = 1e-9);
    }

    #[test]
    fn log_grids_are_skipped_at_central_scales() {
        let mut params = InterpParams::default();
        params.set_q2_nodes(30);
        params.set_q2_range(100.0, 1e6);
        params.set_q2_order(1);
        params.set_x_nodes(50);
        params.set_x_order(1);

        let mut grid = Grid::new(
            Luminosity::new(vec![channel![2, 2, 1.0]]),
            vec![Order::new(0, 2, 0, 0), Order::new(1, 2, 1, 0)],
            vec![0.0, 1.0],
            params,
        )
        .unwrap();

        grid.fill(0.25, 0.25, 1e4, 0.25, &[1.0], 0);
        grid.fill(0.25, 0.25, 1e4, 0.25, &[1.0], 1);

        // at ξ_R = 1 only the plain order contributes
        assert_approx_eq!(f64, convolute_simple(&grid, None)[0], 1.0, ulps = 8);

        let mut pdf1 = |x: f64, _: f64, out: &mut [f64; FLAVOURS]| out.fill(x);
        let mut pdf2 = |x: f64, _: f64, out: &mut [f64; FLAVOURS]| out.fill(x);
        let mut alphas = |_: f64| 1.0;
        let mut cache = ConvolutionCache::new(&mut pdf1, &mut pdf2, &mut alphas);

        let results = grid.convolute(&mut cache, None, 2.0, 1.0, 1.0);
        let expected = (0.5 / std::f64::consts::PI) * (2.0_f64 * 2.0).ln() + 1.0;

        assert_approx_eq!(f64, results[0], expected, epsilon = 1e-9);
    }

    #[test]
    fn optimised_grid_still_reproduces_the_fill() {
        let mut grid = scenario_grid();

        grid.fill_phasespace(0.25, 0.25, 1e4, 0.25, &[1.0], 0);
        grid.optimise();

        grid.fill(0.25, 0.25, 1e4, 0.25, &[1.0], 0);

        assert_approx_eq!(f64, convolute_simple(&grid, None)[0], 1.0, epsilon = 1e-9);
    }
}
