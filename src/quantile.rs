use crate::error::{Error, Result};

/// A quantile to track and the error margin within which it must be answered.
///
/// Similar shape to the original `Quantile` type, but construction is
/// fallible (`try_new`) instead of asserting, since an embedded sketch must
/// not panic its host process on a bad config value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantileTarget {
    q: f64,
    epsilon: f64,
    // Precomputed CKMS coefficients, see `Sketch::allowable_error`.
    u: f64,
    v: f64,
}

impl QuantileTarget {
    /// Creates a `QuantileTarget` for quantile `q` with error margin `epsilon`.
    ///
    /// `q` must be in `(0, 1]` and `epsilon` in `(0, 1)`.
    pub fn try_new(q: f64, epsilon: f64) -> Result<Self> {
        if !(q > 0.0 && q <= 1.0) {
            return Err(Error::invalid_argument(format!(
                "quantile value must be in (0, 1], got {q}"
            )));
        }
        if !(epsilon > 0.0 && epsilon < 1.0) {
            return Err(Error::invalid_argument(format!(
                "quantile error must be in (0, 1), got {epsilon}"
            )));
        }
        // u's numerator divides by zero at q=1; treated as +infinity so the
        // u-branch of allowable_error never constrains the top target.
        let u = if q == 1.0 {
            f64::INFINITY
        } else {
            2.0 * epsilon / (1.0 - q)
        };
        let v = 2.0 * epsilon / q;
        Ok(Self { q, epsilon, u, v })
    }

    pub fn quantile(&self) -> f64 {
        self.q
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub(crate) fn u(&self) -> f64 {
        self.u
    }

    pub(crate) fn v(&self) -> f64 {
        self.v
    }
}

/// The default target list used by [`crate::Sketch::new`]: p99 and p50, both
/// at 0.1% error.
pub fn default_targets() -> Vec<QuantileTarget> {
    vec![
        QuantileTarget::try_new(0.99, 0.001).expect("default target is valid"),
        QuantileTarget::try_new(0.5, 0.001).expect("default target is valid"),
    ]
}
