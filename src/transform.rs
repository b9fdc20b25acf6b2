//! Change-of-variable transforms between the momentum fraction `x` and the
//! interpolation variable `y`, and between the scale `Q²` and `τ`.

use crate::error::GridError;
use log::warn;
use std::collections::BTreeMap;
use std::sync::{OnceLock, RwLock};

/// The QCD scale `Λ² = 0.0625 GeV²` anchoring the `τ` map.
const LAMBDA2: f64 = 0.0625;

/// Maps the squared scale `Q²` to `τ = ln ln(Q²/Λ²)`.
#[must_use]
pub fn ftau(q2: f64) -> f64 {
    (q2 / LAMBDA2).ln().ln()
}

/// Inverse of [`ftau`].
#[must_use]
pub fn fq2(tau: f64) -> f64 {
    LAMBDA2 * tau.exp().exp()
}

/// Signature of one direction of a registered transform pair.
pub type MapFn = fn(f64) -> f64;

fn registry() -> &'static RwLock<BTreeMap<String, (MapFn, MapFn)>> {
    static REGISTRY: OnceLock<RwLock<BTreeMap<String, (MapFn, MapFn)>>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(BTreeMap::new()))
}

/// Registers the pair `(x(y), y(x))` under `name`, in addition to the six
/// built-in transforms. The built-in names cannot be shadowed and later
/// registrations of the same name win. Returns `false` if `name` is a
/// built-in and was therefore ignored.
pub fn register(name: &str, fx: MapFn, fy: MapFn) -> bool {
    if matches!(name, "f" | "f0" | "f1" | "f2" | "f3" | "f4") {
        warn!("transform `{name}` is built in and cannot be replaced");
        return false;
    }

    registry()
        .write()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .insert(name.to_owned(), (fx, fy));

    true
}

/// A pair of monotone maps `x ↔ y`, resolved once from its registry name.
#[derive(Clone, Debug, PartialEq)]
pub enum Transform {
    /// `y = ln(1/x − 1)`.
    F,
    /// `y = −ln x`.
    F0,
    /// `y = √(−ln x)`.
    F1,
    /// `y = −ln x + a(1−x)`, inverted by Newton iteration.
    F2 {
        /// The grid-scoped stretch coefficient, 5 by default.
        a: f64,
    },
    /// `y = √(−log₁₀ x)`.
    F3,
    /// `y = −log₁₀ x`.
    F4,
    /// A user-registered pair, resolved at construction time.
    Custom {
        /// Name under which the pair was registered.
        name: String,
        /// The map `y → x`.
        fx: MapFn,
        /// The map `x → y`.
        fy: MapFn,
    },
}

impl Transform {
    /// Resolves `name` against the built-ins and the registry. The
    /// coefficient `a` is only meaningful for `f2`.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::UnknownTransform`] if `name` is unknown.
    pub fn from_name(name: &str, a: f64) -> Result<Self, GridError> {
        match name {
            "f" => Ok(Self::F),
            "f0" => Ok(Self::F0),
            "f1" => Ok(Self::F1),
            "f2" => Ok(Self::F2 { a }),
            "f3" => Ok(Self::F3),
            "f4" => Ok(Self::F4),
            _ => registry()
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .get(name)
                .map(|&(fx, fy)| Self::Custom {
                    name: name.to_owned(),
                    fx,
                    fy,
                })
                .ok_or_else(|| GridError::UnknownTransform(name.to_owned())),
        }
    }

    /// Returns the registry name of this transform.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::F => "f",
            Self::F0 => "f0",
            Self::F1 => "f1",
            Self::F2 { .. } => "f2",
            Self::F3 => "f3",
            Self::F4 => "f4",
            Self::Custom { name, .. } => name,
        }
    }

    /// Returns the `f2` coefficient, or zero for every other transform.
    #[must_use]
    pub const fn transvar(&self) -> f64 {
        match self {
            Self::F2 { a } => *a,
            _ => 0.0,
        }
    }

    /// Maps the momentum fraction `x` to the interpolation variable `y`.
    #[must_use]
    pub fn y(&self, x: f64) -> f64 {
        match self {
            Self::F => (1.0 / x - 1.0).ln(),
            Self::F0 => -x.ln(),
            Self::F1 => (-x.ln()).sqrt(),
            Self::F2 { a } => (1.0 - x).mul_add(*a, -x.ln()),
            Self::F3 => (-x.log10()).sqrt(),
            Self::F4 => -x.log10(),
            Self::Custom { fy, .. } => fy(x),
        }
    }

    /// Maps the interpolation variable `y` back to the momentum fraction.
    #[must_use]
    pub fn x(&self, y: f64) -> f64 {
        match self {
            Self::F => 1.0 / (1.0 + y.exp()),
            Self::F0 => (-y).exp(),
            Self::F1 => (-y * y).exp(),
            Self::F2 { a } => f2_inverse(y, *a),
            Self::F3 => 10.0_f64.powf(-y * y),
            Self::F4 => 10.0_f64.powf(-y),
            Self::Custom { fx, .. } => fx(y),
        }
    }
}

// solve y = y' + a(1 - exp(-y')) for y' with Newton iterations; x = exp(-y')
fn f2_inverse(y: f64, a: f64) -> f64 {
    if a == 0.0 {
        return (-y).exp();
    }

    let mut yp = y;

    for _ in 0..100 {
        let x = (-yp).exp();
        let delta = y - yp - a * (1.0 - x);
        if delta.abs() < 1e-12 {
            return x;
        }
        let deriv = -1.0 - a * x;
        yp -= delta / deriv;
    }

    warn!("inversion of transform `f2` did not converge for y = {y}");

    (-yp).exp()
}
