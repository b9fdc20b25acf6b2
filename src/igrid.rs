//! Module containing the per-order, per-bin interpolation grid.

use crate::axis::Axis;
use crate::convolution::NodeCache;
use crate::error::GridError;
use crate::interpolation::{lower_node, node_weights, reweight_x, MAX_ORDER};
use crate::lumi::Luminosity;
use crate::sparse_tensor3::SparseTensor3;
use crate::transform::{ftau, Transform};
use log::warn;
use serde::{Deserialize, Serialize};
use std::mem;

/// Construction parameters for interpolation grids.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct InterpParams {
    q2_nodes: usize,
    q2_min: f64,
    q2_max: f64,
    q2_order: usize,
    x_nodes: usize,
    x_min: f64,
    x_max: f64,
    x_order: usize,
    transform: String,
    transvar: f64,
    reweight: bool,
    dis: bool,
    symmetrise: bool,
}

impl Default for InterpParams {
    fn default() -> Self {
        Self {
            q2_nodes: 40,
            q2_min: 1e2,
            q2_max: 1e8,
            q2_order: 3,
            x_nodes: 50,
            x_min: 2e-7,
            x_max: 1.0,
            x_order: 3,
            transform: "f2".to_owned(),
            transvar: 5.0,
            reweight: false,
            dis: false,
            symmetrise: false,
        }
    }
}

impl InterpParams {
    /// Returns the number of nodes of the `τ` axis.
    #[must_use]
    pub const fn q2_nodes(&self) -> usize {
        self.q2_nodes
    }

    /// Returns the lower limit of the `Q²` range.
    #[must_use]
    pub const fn q2_min(&self) -> f64 {
        self.q2_min
    }

    /// Returns the upper limit of the `Q²` range.
    #[must_use]
    pub const fn q2_max(&self) -> f64 {
        self.q2_max
    }

    /// Returns the interpolation order of the `τ` axis.
    #[must_use]
    pub const fn q2_order(&self) -> usize {
        self.q2_order
    }

    /// Returns the number of nodes of the `y` axes.
    #[must_use]
    pub const fn x_nodes(&self) -> usize {
        self.x_nodes
    }

    /// Returns the lower limit of the `x` range.
    #[must_use]
    pub const fn x_min(&self) -> f64 {
        self.x_min
    }

    /// Returns the upper limit of the `x` range.
    #[must_use]
    pub const fn x_max(&self) -> f64 {
        self.x_max
    }

    /// Returns the interpolation order of the `y` axes.
    #[must_use]
    pub const fn x_order(&self) -> usize {
        self.x_order
    }

    /// Returns the name of the `x ↔ y` transform.
    #[must_use]
    pub fn transform(&self) -> &str {
        &self.transform
    }

    /// Returns the `f2` stretch coefficient.
    #[must_use]
    pub const fn transvar(&self) -> f64 {
        self.transvar
    }

    /// Returns whether stored weights are flattened by `1/W(x)`.
    #[must_use]
    pub const fn reweight(&self) -> bool {
        self.reweight
    }

    /// Returns whether grids cover deep-inelastic kinematics with a
    /// degenerate second axis.
    #[must_use]
    pub const fn dis(&self) -> bool {
        self.dis
    }

    /// Returns whether the two `y` axes are marked as interchangeable.
    #[must_use]
    pub const fn symmetrise(&self) -> bool {
        self.symmetrise
    }

    /// Sets the number of nodes of the `τ` axis.
    pub fn set_q2_nodes(&mut self, q2_nodes: usize) {
        self.q2_nodes = q2_nodes;
    }

    /// Sets the `Q²` range.
    pub fn set_q2_range(&mut self, q2_min: f64, q2_max: f64) {
        self.q2_min = q2_min;
        self.q2_max = q2_max;
    }

    /// Sets the interpolation order of the `τ` axis.
    pub fn set_q2_order(&mut self, q2_order: usize) {
        self.q2_order = q2_order;
    }

    /// Sets the number of nodes of the `y` axes.
    pub fn set_x_nodes(&mut self, x_nodes: usize) {
        self.x_nodes = x_nodes;
    }

    /// Sets the `x` range.
    pub fn set_x_range(&mut self, x_min: f64, x_max: f64) {
        self.x_min = x_min;
        self.x_max = x_max;
    }

    /// Sets the interpolation order of the `y` axes.
    pub fn set_x_order(&mut self, x_order: usize) {
        self.x_order = x_order;
    }

    /// Sets the name of the `x ↔ y` transform.
    pub fn set_transform(&mut self, transform: &str) {
        self.transform = transform.to_owned();
    }

    /// Sets the `f2` stretch coefficient.
    pub fn set_transvar(&mut self, transvar: f64) {
        self.transvar = transvar;
    }

    /// Sets the reweighting flag.
    pub fn set_reweight(&mut self, reweight: bool) {
        self.reweight = reweight;
    }

    /// Sets the deep-inelastic flag.
    pub fn set_dis(&mut self, dis: bool) {
        self.dis = dis;
    }

    /// Sets the symmetrisation flag.
    pub fn set_symmetrise(&mut self, symmetrise: bool) {
        self.symmetrise = symmetrise;
    }
}

/// Selects which node tables a convolution contracts the tensors with.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum ConvolveMode {
    /// PDF tables on both axes.
    Standard,
    /// Splitting tables on the first axis, PDF tables on the second.
    Splitting1,
    /// PDF tables on the first axis, splitting tables on the second.
    Splitting2,
}

/// One interpolation grid: a sparse weight tensor over `(τ, y₁, y₂)` for
/// each partonic channel, together with the coordinate transform and the
/// per-axis interpolation orders.
#[derive(Clone, Debug)]
pub struct InterpGrid {
    taxis: Axis,
    y1axis: Axis,
    y2axis: Axis,
    tau_order: usize,
    y1_order: usize,
    y2_order: usize,
    transform: Transform,
    tensors: Vec<SparseTensor3>,
    reweight: bool,
    symmetrise: bool,
    optimised: bool,
    dis: bool,
    // whether interpolating fills have happened; true forbids optimisation
    filled: bool,
}

fn clamp_order(mut order: usize, nodes: usize, axis: &str) -> usize {
    if order > MAX_ORDER {
        warn!("interpolation order {order} exceeds the maximum of {MAX_ORDER} on the {axis} axis");
        order = MAX_ORDER;
    }
    if nodes <= order {
        warn!("not enough nodes for interpolation order {order} on the {axis} axis: {nodes}");
        order = nodes - 1;
    }
    order
}

impl InterpGrid {
    /// Constructs an empty grid with `channels` weight tensors.
    ///
    /// # Errors
    ///
    /// Fails with [`GridError::UnknownTransform`] if the transform name in
    /// `params` cannot be resolved.
    ///
    /// # Panics
    ///
    /// Panics if `channels` is zero or any node count is zero.
    pub fn new(params: &InterpParams, channels: usize) -> Result<Self, GridError> {
        assert!(channels > 0);

        let transform = Transform::from_name(params.transform(), params.transvar())?;

        let mut y1min = transform.y(params.x_max());
        let mut y1max = transform.y(params.x_min());
        // some transforms map the minimum in x to the maximum in y
        if y1min > y1max {
            mem::swap(&mut y1min, &mut y1max);
        }

        let y1axis = Axis::new(params.x_nodes(), y1min, y1max);
        let y2axis = if params.dis() {
            Axis::new(1, 1.0, 1.0)
        } else {
            y1axis
        };
        let taxis = Axis::new(
            params.q2_nodes(),
            ftau(params.q2_min()),
            ftau(params.q2_max()),
        );

        let tau_order = clamp_order(params.q2_order(), taxis.nodes(), "τ");
        let y1_order = clamp_order(params.x_order(), y1axis.nodes(), "y₁");
        let y2_order = clamp_order(params.x_order(), y2axis.nodes(), "y₂");

        Ok(Self {
            tensors: (0..channels)
                .map(|_| SparseTensor3::new(taxis, y1axis, y2axis))
                .collect(),
            taxis,
            y1axis,
            y2axis,
            tau_order,
            y1_order,
            y2_order,
            transform,
            reweight: params.reweight(),
            symmetrise: params.symmetrise(),
            optimised: false,
            dis: params.dis(),
            filled: false,
        })
    }

    /// Returns the `τ` axis.
    #[must_use]
    pub const fn taxis(&self) -> &Axis {
        &self.taxis
    }

    /// Returns the `y₁` axis.
    #[must_use]
    pub const fn y1axis(&self) -> &Axis {
        &self.y1axis
    }

    /// Returns the `y₂` axis.
    #[must_use]
    pub const fn y2axis(&self) -> &Axis {
        &self.y2axis
    }

    /// Returns the coordinate transform.
    #[must_use]
    pub const fn transform(&self) -> &Transform {
        &self.transform
    }

    /// Returns the number of partonic channels.
    #[must_use]
    pub fn channels(&self) -> usize {
        self.tensors.len()
    }

    /// Returns the weight tensor of the channel with the given index.
    #[must_use]
    pub fn tensor(&self, channel: usize) -> &SparseTensor3 {
        &self.tensors[channel]
    }

    /// Returns whether stored weights are flattened by `1/W(x)`.
    #[must_use]
    pub const fn reweight(&self) -> bool {
        self.reweight
    }

    /// Returns whether this is a deep-inelastic grid.
    #[must_use]
    pub const fn dis(&self) -> bool {
        self.dis
    }

    /// Returns whether the axes were optimised to the populated region.
    #[must_use]
    pub const fn optimised(&self) -> bool {
        self.optimised
    }

    /// Returns `true` when the two `y` tables of a convolution coincide.
    #[must_use]
    pub fn is_symmetric(&self) -> bool {
        self.symmetrise && self.y1axis == self.y2axis
    }

    /// Returns `true` if no tensor holds a non-zero weight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tensors.iter().all(SparseTensor3::is_empty)
    }

    /// Returns the `x` values of the `y₁` nodes.
    #[must_use]
    pub fn x1_values(&self) -> Vec<f64> {
        self.y1axis
            .node_values()
            .iter()
            .map(|&y| self.transform.x(y))
            .collect()
    }

    /// Returns the `x` values of the `y₂` nodes.
    #[must_use]
    pub fn x2_values(&self) -> Vec<f64> {
        self.y2axis
            .node_values()
            .iter()
            .map(|&y| self.transform.x(y))
            .collect()
    }

    /// Returns the `Q²` values of the `τ` nodes.
    #[must_use]
    pub fn q2_values(&self) -> Vec<f64> {
        self.taxis
            .node_values()
            .iter()
            .map(|&tau| crate::transform::fq2(tau))
            .collect()
    }

    /// Spreads `weights[c] · L_τ·L₁·L₂` over the interpolation stencil
    /// around `(x1, x2, q2)` for every channel `c`.
    pub fn fill(&mut self, x1: f64, x2: f64, q2: f64, weights: &[f64]) {
        debug_assert_eq!(weights.len(), self.tensors.len());

        if weights.iter().all(|&weight| weight == 0.0) {
            return;
        }

        self.filled = true;

        let (k1, k2, kt) = self.lower_nodes(x1, x2, q2);

        let offset = |axis: &Axis, k: usize, value: f64| {
            if axis.nodes() == 1 {
                0.0
            } else {
                (value - axis.node(k)) / axis.delta()
            }
        };

        let fi1 = node_weights(self.y1_order, offset(&self.y1axis, k1, self.transform.y(x1)));
        let fi2 = if self.y2axis.nodes() == 1 {
            node_weights(0, 0.0)
        } else {
            node_weights(self.y2_order, offset(&self.y2axis, k2, self.transform.y(x2)))
        };
        let fit = node_weights(self.tau_order, offset(&self.taxis, kt, ftau(q2)));

        let factor = if self.reweight {
            1.0 / (reweight_x(x1) * reweight_x(x2))
        } else {
            1.0
        };

        for (i3, fi3) in fit.iter().enumerate() {
            for (i1, fi1) in fi1.iter().enumerate() {
                for (i2, fi2) in fi2.iter().enumerate() {
                    let basis = factor * fi1 * fi2 * fi3;

                    for (tensor, &weight) in self.tensors.iter_mut().zip(weights) {
                        if weight != 0.0 {
                            tensor[[kt + i3, k1 + i1, k2 + i2]] += weight * basis;
                        }
                    }
                }
            }
        }
    }

    /// Books `weights` into the single cell at the lower stencil nodes,
    /// without interpolation. Used to discover the populated phase space
    /// before [`InterpGrid::optimise`].
    pub fn fill_phasespace(&mut self, x1: f64, x2: f64, q2: f64, weights: &[f64]) {
        debug_assert_eq!(weights.len(), self.tensors.len());

        let (k1, k2, kt) = self.lower_nodes(x1, x2, q2);

        for (tensor, &weight) in self.tensors.iter_mut().zip(weights) {
            if weight != 0.0 {
                tensor[[kt, k1, k2]] += weight;
            }
        }
    }

    fn lower_nodes(&self, x1: f64, x2: f64, q2: f64) -> (usize, usize, usize) {
        let (k1, _) = lower_node(&self.y1axis, self.y1_order, self.transform.y(x1));
        let (k2, _) = if self.y2axis.nodes() == 1 {
            (0, 0.0)
        } else {
            lower_node(&self.y2axis, self.y2_order, self.transform.y(x2))
        };
        let (kt, _) = lower_node(&self.taxis, self.tau_order, ftau(q2));

        (k1, k2, kt)
    }

    /// Contracts the weight tensors with the node tables in `cache`,
    /// summing `(αₛ(τ)/2π)^alphas_power · T_c · F_c` over all cells and
    /// channels. Channels whose `mask` entry is `false` are treated as
    /// absent.
    pub(crate) fn convolve(
        &self,
        cache: &NodeCache,
        lumi: &Luminosity,
        mask: Option<&[bool]>,
        alphas_power: u32,
        mode: ConvolveMode,
    ) -> f64 {
        debug_assert_eq!(lumi.len(), self.tensors.len());

        let mut sig = vec![0.0; self.tensors.len()];
        let mut flux = vec![0.0; self.tensors.len()];
        let mut dsigma = 0.0;

        for itau in 0..self.taxis.nodes() {
            let alphas = cache.alphas(itau).powi(
                alphas_power
                    .try_into()
                    .unwrap_or_else(|_| unreachable!()),
            );

            for iy1 in 0..self.y1axis.nodes() {
                for iy2 in 0..self.y2axis.nodes() {
                    let mut non_zero = false;

                    for (channel, (tensor, value)) in
                        self.tensors.iter().zip(sig.iter_mut()).enumerate()
                    {
                        *value = if mask.is_some_and(|mask| !mask[channel]) {
                            0.0
                        } else {
                            tensor[[itau, iy1, iy2]]
                        };
                        non_zero |= *value != 0.0;
                    }

                    if !non_zero {
                        continue;
                    }

                    let (f1, f2) = match mode {
                        ConvolveMode::Standard => {
                            (cache.pdf1(itau, iy1), cache.pdf2(itau, iy2))
                        }
                        ConvolveMode::Splitting1 => {
                            (cache.splitting1(itau, iy1), cache.pdf2(itau, iy2))
                        }
                        ConvolveMode::Splitting2 => {
                            (cache.pdf1(itau, iy1), cache.splitting2(itau, iy2))
                        }
                    };

                    lumi.evaluate(f1, f2, &mut flux);

                    let cell: f64 = sig.iter().zip(&flux).map(|(sig, flux)| sig * flux).sum();
                    dsigma += alphas * cell;
                }
            }
        }

        dsigma
    }

    /// Shrinks the axes to the populated subrange and reallocates empty
    /// tensors with the requested node counts. Any stored content is
    /// discarded, so this must run between the phase-space discovery fills
    /// and the interpolating fills; once interpolating fills have happened
    /// the call is refused.
    pub fn optimise(&mut self, q2_nodes: usize, x1_nodes: usize, x2_nodes: usize) {
        if self.filled {
            warn!("optimising a grid that already carries interpolated weights; ignored");
            return;
        }

        for tensor in &mut self.tensors {
            tensor.trim();
        }

        // union of the populated ranges over all channels
        let ranges = |f: fn(&SparseTensor3) -> Option<(usize, usize)>| {
            self.tensors
                .iter()
                .filter_map(f)
                .reduce(|(min, max), (low, high)| (min.min(low), max.max(high)))
        };
        let tau_set = ranges(SparseTensor3::tau_range);
        let y1_set = ranges(SparseTensor3::y_range);
        let y2_set = ranges(SparseTensor3::z_range);

        if let (Some(tau_set), Some(y1_set), Some(y2_set)) = (tau_set, y1_set, y2_set) {
            // a first optimisation sees phase-space fills that booked only
            // the lower stencil node, so the interpolation order is added
            // above; afterwards one node of margin on each side suffices
            let optimised = self.optimised;
            let widen = move |(low, mut high): (usize, usize), order: usize, axis: &Axis| {
                high = if optimised { high + 1 } else { high + order + 1 };
                (
                    axis.node(low.saturating_sub(1)),
                    axis.node(high.min(axis.nodes() - 1)),
                )
            };

            let (taumin, taumax) = widen(tau_set, self.tau_order, &self.taxis);
            let (y1min, y1max) = widen(y1_set, self.y1_order, &self.y1axis);

            if !self.dis {
                let (y2min, y2max) = widen(y2_set, self.y2_order, &self.y2axis);
                self.y2axis = Axis::new(x2_nodes, y2min, y2max);
            }
            self.taxis = Axis::new(q2_nodes, taumin, taumax);
            self.y1axis = Axis::new(x1_nodes, y1min, y1max);
        } else {
            // nothing was filled; keep the ranges, adopt the node counts
            self.taxis = Axis::new(q2_nodes, self.taxis.min(), self.taxis.max());
            self.y1axis = Axis::new(x1_nodes, self.y1axis.min(), self.y1axis.max());
            if !self.dis {
                self.y2axis = Axis::new(x2_nodes, self.y2axis.min(), self.y2axis.max());
            }
        }

        self.tau_order = clamp_order(self.tau_order, self.taxis.nodes(), "τ");
        self.y1_order = clamp_order(self.y1_order, self.y1axis.nodes(), "y₁");
        self.y2_order = clamp_order(self.y2_order, self.y2axis.nodes(), "y₂");

        for tensor in &mut self.tensors {
            *tensor = SparseTensor3::new(self.taxis, self.y1axis, self.y2axis);
        }

        self.optimised = true;
    }

    /// Reassigns the tensors so that the sorted channel indices in `keep`
    /// become channels `0..keep.len()`; all others are dropped.
    ///
    /// # Panics
    ///
    /// Panics if `keep` is empty or contains an out-of-range index.
    pub fn shrink(&mut self, keep: &[usize]) {
        assert!(!keep.is_empty());
        assert!(keep.iter().all(|&channel| channel < self.tensors.len()));

        let old = mem::take(&mut self.tensors);

        self.tensors = old
            .into_iter()
            .enumerate()
            .filter_map(|(channel, tensor)| keep.contains(&channel).then_some(tensor))
            .collect();
    }

    /// Multiplies every stored weight by `factor`.
    pub fn scale(&mut self, factor: f64) {
        for tensor in &mut self.tensors {
            *tensor *= factor;
        }
    }

    /// Adds the weights of `other` to this grid.
    ///
    /// # Errors
    ///
    /// Fails with [`GridError::AxisMismatch`] when the channel counts or
    /// axes differ.
    pub fn merge(&mut self, other: &Self) -> Result<(), GridError> {
        if self.tensors.len() != other.tensors.len() {
            return Err(GridError::AxisMismatch);
        }

        for (tensor, other) in self.tensors.iter_mut().zip(&other.tensors) {
            tensor.merge(other)?;
        }

        Ok(())
    }

    /// Contracts every tensor to its minimal bounding boxes.
    pub fn trim(&mut self) {
        for tensor in &mut self.tensors {
            tensor.trim();
        }
    }

    pub(crate) fn to_record(&self) -> IgridRecord {
        IgridRecord {
            transform: self.transform.name().to_owned(),
            parameters: [
                f64::from(u32::try_from(self.y1axis.nodes()).unwrap()),
                self.y1axis.min(),
                self.y1axis.max(),
                f64::from(u32::try_from(self.y2axis.nodes()).unwrap()),
                self.y2axis.min(),
                self.y2axis.max(),
                f64::from(u32::try_from(self.y1_order).unwrap()),
                f64::from(u32::try_from(self.taxis.nodes()).unwrap()),
                self.taxis.min(),
                self.taxis.max(),
                f64::from(u32::try_from(self.tau_order).unwrap()),
                self.transform.transvar(),
                f64::from(u32::try_from(self.tensors.len()).unwrap()),
                f64::from(u8::from(self.reweight)),
                f64::from(u8::from(self.symmetrise)),
                f64::from(u8::from(self.optimised)),
                f64::from(u8::from(self.dis)),
            ],
            weights: self
                .tensors
                .iter()
                .map(|tensor| WeightRecord {
                    taxis: *tensor.taxis(),
                    yaxis: *tensor.yaxis(),
                    zaxis: *tensor.zaxis(),
                    cells: tensor
                        .indexed_iter()
                        .map(|((it, iy, iz), value)| {
                            (
                                u32::try_from(it).unwrap(),
                                u32::try_from(iy).unwrap(),
                                u32::try_from(iz).unwrap(),
                                value,
                            )
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    pub(crate) fn from_record(record: IgridRecord) -> Result<Self, GridError> {
        // integers were stored as doubles; round to nearest in case of
        // truncation during the conversion
        let int = |value: f64| (value + 0.5) as usize;
        let parameters = &record.parameters;

        let transform = Transform::from_name(&record.transform, parameters[11])?;

        let y1axis = Axis::new(int(parameters[0]), parameters[1], parameters[2]);
        let y2axis = Axis::new(int(parameters[3]), parameters[4], parameters[5]);
        let taxis = Axis::new(int(parameters[7]), parameters[8], parameters[9]);
        let y_order = int(parameters[6]);

        let mut tensors = Vec::with_capacity(record.weights.len());
        for weights in record.weights {
            let mut tensor = SparseTensor3::new(weights.taxis, weights.yaxis, weights.zaxis);
            for (it, iy, iz, value) in weights.cells {
                tensor[[it as usize, iy as usize, iz as usize]] = value;
            }
            tensors.push(tensor);
        }
        debug_assert_eq!(tensors.len(), int(parameters[12]));

        let filled = tensors.iter().any(|tensor| !tensor.is_empty());

        Ok(Self {
            tensors,
            tau_order: int(parameters[10]),
            y1_order: y_order.min(y1axis.nodes() - 1),
            y2_order: y_order.min(y2axis.nodes() - 1),
            taxis,
            y1axis,
            y2axis,
            transform,
            reweight: parameters[13] != 0.0,
            symmetrise: parameters[14] != 0.0,
            optimised: parameters[15] != 0.0,
            dis: parameters[16] != 0.0,
            filled,
        })
    }
}

impl PartialEq for InterpGrid {
    fn eq(&self, other: &Self) -> bool {
        self.transform == other.transform
            && self.tau_order == other.tau_order
            && self.y1_order == other.y1_order
            && self.y2_order == other.y2_order
            && self.reweight == other.reweight
            && self.symmetrise == other.symmetrise
            && self.optimised == other.optimised
            && self.dis == other.dis
            && self.tensors == other.tensors
    }
}

/// Persisted form of one interpolation grid: the transform tag, the
/// 17-value parameter record and one weight histogram per channel.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub(crate) struct IgridRecord {
    pub(crate) transform: String,
    pub(crate) parameters: [f64; 17],
    pub(crate) weights: Vec<WeightRecord>,
}

/// Non-zero cells of one weight tensor together with its axes.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub(crate) struct WeightRecord {
    pub(crate) taxis: Axis,
    pub(crate) yaxis: Axis,
    pub(crate) zaxis: Axis,
    pub(crate) cells: Vec<(u32, u32, u32, f64)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel;
    use crate::convolution::ConvolutionCache;
    use crate::lumi::FLAVOURS;
    use float_cmp::assert_approx_eq;

    fn scenario_params() -> InterpParams {
        let mut params = InterpParams::default();
        params.set_q2_nodes(30);
        params.set_q2_range(100.0, 1e6);
        params.set_q2_order(1);
        params.set_x_nodes(50);
        params.set_x_range(2e-7, 1.0);
        params.set_x_order(1);
        params
    }

    fn up_up_lumi() -> Luminosity {
        Luminosity::new(vec![channel![2, 2, 1.0]])
    }

    fn convolve_unit_pdf(igrid: &InterpGrid, lumi: &Luminosity, alphas_power: u32) -> f64 {
        let mut pdf1 = |x: f64, _: f64, out: &mut [f64; FLAVOURS]| out.fill(x);
        let mut pdf2 = |x: f64, _: f64, out: &mut [f64; FLAVOURS]| out.fill(x);
        let mut alphas = |_: f64| 1.0;
        let mut providers = ConvolutionCache::new(&mut pdf1, &mut pdf2, &mut alphas);
        let cache = NodeCache::new(igrid, &mut providers, 1.0, 1.0, 1.0, 0);

        igrid.convolve(&cache, lumi, None, alphas_power, ConvolveMode::Standard)
    }

    #[test]
    fn single_fill_convolves_to_the_weight() {
        let lumi = up_up_lumi();
        let mut igrid = InterpGrid::new(&scenario_params(), 1).unwrap();

        igrid.fill(0.25, 0.25, 1e4, &[1.0]);

        // `xf = x` turns the luminosity into the partition of unity
        assert_approx_eq!(f64, convolve_unit_pdf(&igrid, &lumi, 0), 1.0, ulps = 8);
    }

    #[test]
    fn reweighted_fill_is_reconstructed() {
        let lumi = up_up_lumi();
        let mut params = scenario_params();
        params.set_reweight(true);

        let mut igrid = InterpGrid::new(&params, 1).unwrap();
        igrid.fill(0.25, 0.25, 1e4, &[1.0]);

        // the stored weight is flattened by 1/W and the node tables carry W
        // back in, leaving only the interpolation error of W itself
        assert_approx_eq!(f64, convolve_unit_pdf(&igrid, &lumi, 0), 1.0, epsilon = 1e-2);
    }

    #[test]
    fn dis_grid_uses_the_degenerate_axis() {
        let lumi = up_up_lumi();
        let mut params = scenario_params();
        params.set_dis(true);

        let mut igrid = InterpGrid::new(&params, 1).unwrap();

        assert_eq!(igrid.y2axis().nodes(), 1);

        igrid.fill(0.25, 0.7, 1e4, &[1.0]);

        // everything lands on the single y₂ node
        assert_eq!(igrid.tensor(0).z_range(), Some((0, 0)));
        assert_approx_eq!(f64, convolve_unit_pdf(&igrid, &lumi, 0), 1.0, ulps = 8);
    }

    #[test]
    fn alphas_prefactor_is_applied_per_node() {
        let lumi = up_up_lumi();
        let mut igrid = InterpGrid::new(&scenario_params(), 1).unwrap();

        igrid.fill(0.25, 0.25, 1e4, &[1.0]);

        let mut pdf1 = |x: f64, _: f64, out: &mut [f64; FLAVOURS]| out.fill(x);
        let mut pdf2 = |x: f64, _: f64, out: &mut [f64; FLAVOURS]| out.fill(x);
        let mut alphas = |_: f64| 3.0;
        let mut providers = ConvolutionCache::new(&mut pdf1, &mut pdf2, &mut alphas);
        let cache = NodeCache::new(&igrid, &mut providers, 1.0, 1.0, 1.0, 0);

        let value = igrid.convolve(&cache, &lumi, None, 2, ConvolveMode::Standard);

        assert_approx_eq!(
            f64,
            value,
            (3.0 * 0.5 / std::f64::consts::PI).powi(2),
            ulps = 16
        );
    }

    #[test]
    fn mask_disables_channels() {
        let lumi = Luminosity::new(vec![channel![2, 2, 1.0], channel![1, 1, 1.0]]);
        let mut igrid = InterpGrid::new(&scenario_params(), 2).unwrap();

        igrid.fill(0.25, 0.25, 1e4, &[1.0, 1.0]);

        let mut pdf1 = |x: f64, _: f64, out: &mut [f64; FLAVOURS]| out.fill(x);
        let mut pdf2 = |x: f64, _: f64, out: &mut [f64; FLAVOURS]| out.fill(x);
        let mut alphas = |_: f64| 1.0;
        let mut providers = ConvolutionCache::new(&mut pdf1, &mut pdf2, &mut alphas);
        let cache = NodeCache::new(&igrid, &mut providers, 1.0, 1.0, 1.0, 0);

        let masked = igrid.convolve(
            &cache,
            &lumi,
            Some(&[true, false]),
            0,
            ConvolveMode::Standard,
        );
        let full = igrid.convolve(&cache, &lumi, None, 0, ConvolveMode::Standard);

        assert_approx_eq!(f64, masked, 1.0, ulps = 8);
        assert_approx_eq!(f64, full, 2.0, ulps = 8);
    }

    #[test]
    fn fill_is_additive() {
        let mut once = InterpGrid::new(&scenario_params(), 1).unwrap();
        let mut twice = InterpGrid::new(&scenario_params(), 1).unwrap();

        once.fill(0.25, 0.25, 1e4, &[1.0]);
        once.fill(0.5, 0.1, 1e5, &[0.5]);

        twice.fill(0.25, 0.25, 1e4, &[1.0]);
        let mut other = InterpGrid::new(&scenario_params(), 1).unwrap();
        other.fill(0.5, 0.1, 1e5, &[0.5]);
        twice.merge(&other).unwrap();

        assert_eq!(once.tensor(0), twice.tensor(0));
    }

    #[test]
    fn scaling_is_linear() {
        let lumi = up_up_lumi();
        let mut igrid = InterpGrid::new(&scenario_params(), 1).unwrap();

        igrid.fill(0.25, 0.25, 1e4, &[1.0]);
        igrid.scale(0.5);

        assert_approx_eq!(f64, convolve_unit_pdf(&igrid, &lumi, 0), 0.5, ulps = 8);
    }

    #[test]
    fn shrink_preserves_kept_channels() {
        let mut igrid = InterpGrid::new(&scenario_params(), 3).unwrap();

        igrid.fill(0.25, 0.25, 1e4, &[1.0, 2.0, 3.0]);

        let original = igrid.clone();
        igrid.shrink(&[0, 2]);

        assert_eq!(igrid.channels(), 2);
        assert_eq!(igrid.tensor(0), original.tensor(0));
        assert_eq!(igrid.tensor(1), original.tensor(2));
    }

    #[test]
    fn optimise_shrinks_the_axes() {
        let mut igrid = InterpGrid::new(&scenario_params(), 1).unwrap();

        igrid.fill_phasespace(0.25, 0.25, 1e4, &[1.0]);
        igrid.fill_phasespace(0.2, 0.3, 2e4, &[1.0]);

        let old_taxis = *igrid.taxis();
        let old_y1axis = *igrid.y1axis();

        igrid.optimise(20, 30, 30);

        assert!(igrid.optimised());
        assert!(igrid.is_empty());
        assert_eq!(igrid.taxis().nodes(), 20);
        assert_eq!(igrid.y1axis().nodes(), 30);
        assert_eq!(igrid.y2axis().nodes(), 30);
        assert!(igrid.taxis().max() - igrid.taxis().min() < old_taxis.max() - old_taxis.min());
        assert!(
            igrid.y1axis().max() - igrid.y1axis().min() < old_y1axis.max() - old_y1axis.min()
        );

        // a second optimisation is refused
        let axes = (*igrid.taxis(), *igrid.y1axis());
        igrid.fill(0.25, 0.25, 1e4, &[1.0]);
        igrid.optimise(10, 10, 10);
        assert_eq!(axes, (*igrid.taxis(), *igrid.y1axis()));
        assert!(!igrid.is_empty());
    }

    #[test]
    fn optimise_on_an_empty_grid_keeps_the_ranges() {
        let mut igrid = InterpGrid::new(&scenario_params(), 1).unwrap();
        let taxis = *igrid.taxis();

        igrid.optimise(10, 20, 20);

        assert_eq!(igrid.taxis().min(), taxis.min());
        assert_eq!(igrid.taxis().max(), taxis.max());
        assert_eq!(igrid.taxis().nodes(), 10);
        assert_eq!(igrid.y1axis().nodes(), 20);
    }

    #[test]
    fn record_round_trip() {
        let mut igrid = InterpGrid::new(&scenario_params(), 2).unwrap();

        igrid.fill(0.25, 0.25, 1e4, &[1.0, -0.5]);
        igrid.fill(0.1, 0.03, 2e5, &[0.25, 0.0]);

        let record = igrid.to_record();
        let restored = InterpGrid::from_record(record).unwrap();

        assert!(restored == igrid);
    }

    #[test]
    fn order_is_clamped_to_the_node_count() {
        let mut params = scenario_params();
        params.set_q2_nodes(2);
        params.set_q2_order(3);

        let igrid = InterpGrid::new(&params, 1).unwrap();

        // order 3 cannot fit on two nodes
        assert_eq!(igrid.tau_order, 1);
    }

    #[test]
    fn unknown_transform_fails_construction() {
        let mut params = scenario_params();
        params.set_transform("nope");

        assert!(matches!(
            InterpGrid::new(&params, 1),
            Err(GridError::UnknownTransform(_))
        ));
    }

    #[test]
    fn node_values_in_x_space() {
        let igrid = InterpGrid::new(&scenario_params(), 1).unwrap();
        let x1 = igrid.x1_values();

        assert_eq!(x1.len(), 50);
        // y is decreasing in x, so the first node is the largest x
        assert_approx_eq!(f64, x1[0], 1.0, epsilon = 1e-10);
        assert_approx_eq!(f64, x1[49], 2e-7, epsilon = 1e-12);
    }
}
