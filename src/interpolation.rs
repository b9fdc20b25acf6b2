//! Lagrange interpolation kernels and node selection.

use crate::axis::Axis;
use crate::convert::f64_from_usize;
use arrayvec::ArrayVec;
use log::warn;
use std::sync::OnceLock;

/// Hard cap on the interpolation order of a single axis.
pub const MAX_ORDER: usize = 16;

/// Scratch capacity for the per-axis Lagrange coefficients.
pub(crate) const STENCIL_CAP: usize = MAX_ORDER + 1;

// largest supported factorial argument; an order-16 stencil needs at most 16!
const MAX_FACTORIAL: usize = 33;

fn factorials() -> &'static [f64; MAX_FACTORIAL + 1] {
    static TABLE: OnceLock<[f64; MAX_FACTORIAL + 1]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [1.0; MAX_FACTORIAL + 1];
        for i in 1..table.len() {
            table[i] = table[i - 1] * f64_from_usize(i);
        }
        table
    })
}

/// Lagrange basis value for node `i` of an order-`n` stencil, evaluated at
/// the fractional offset `u ∈ [0, n]`.
#[must_use]
pub fn fi(i: usize, n: usize, u: f64) -> f64 {
    debug_assert!(i <= n);
    debug_assert!(n <= MAX_ORDER);

    if n == 0 && i == 0 {
        return 1.0;
    }
    if (u - f64_from_usize(i)).abs() < 1e-8 {
        return 1.0;
    }

    let factorials = factorials();
    let sign = if (n - i) % 2 == 0 { 1.0 } else { -1.0 };
    let mut product = sign / (factorials[i] * factorials[n - i] * (u - f64_from_usize(i)));
    for z in 0..=n {
        product *= u - f64_from_usize(z);
    }
    product
}

/// All `order + 1` Lagrange coefficients of a stencil at offset `u`.
pub(crate) fn node_weights(order: usize, u: f64) -> ArrayVec<f64, STENCIL_CAP> {
    (0..=order).map(|i| fi(i, order, u)).collect()
}

/// Returns the lower node `k` of the `order + 1`-node stencil enclosing `y`
/// on `axis`, together with the fractional offset of `y` from node `k`.
///
/// The window is centred on `y` and clipped at the axis boundaries, so `k`
/// always satisfies `k + order <= nodes - 1`. Out-of-range coordinates are
/// reported but still clamped; range sanity is the caller's business.
pub(crate) fn lower_node(axis: &Axis, order: usize, y: f64) -> (usize, f64) {
    debug_assert!(order < axis.nodes());

    if axis.nodes() == 1 {
        return (0, 0.0);
    }

    if y < axis.min() || y > axis.max() {
        warn!(
            "coordinate {y} outside of the axis range [{}, {}]",
            axis.min(),
            axis.max()
        );
    }

    let k = (((y - axis.min()) / axis.delta()).floor() as isize - (order / 2) as isize)
        .clamp(0, (axis.nodes() - 1 - order) as isize) as usize;

    (k, (y - axis.node(k)) / axis.delta())
}

/// The weight `W(x) = (√x / (1 − 0.99 x))³` dividing stored fill weights
/// when reweighting is enabled; multiplied back during convolution.
#[must_use]
pub fn reweight_x(x: f64) -> f64 {
    (x.sqrt() / (1.0 - 0.99 * x)).powi(3)
}
