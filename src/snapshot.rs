use crate::sketch::Sketch;

/// What a [`Snapshot`] actually holds: either a detached copy of a Sketch
/// (the normal case, produced by a `WindowedSampler`) or a plain sorted
/// value vector (for direct use when a caller already has the raw data
/// and just wants `Snapshot`'s quantile/aggregate surface over it).
#[derive(Debug, Clone)]
enum Backing {
    Sketch(Sketch),
    Values(Vec<f64>),
}

/// An immutable read-view, produced by value so it never reflects
/// updates made to its source after creation.
#[derive(Debug, Clone)]
pub struct Snapshot {
    backing: Backing,
    divisor: f64,
}

impl Snapshot {
    /// A Snapshot with nothing in it; every accessor reports zero/empty.
    pub fn empty() -> Self {
        Self {
            backing: Backing::Values(Vec::new()),
            divisor: 1.0,
        }
    }

    /// Takes a detached copy of `sketch`, draining its pending buffer
    /// first so the copy needs no further mutation to answer queries.
    pub fn from_sketch(sketch: &mut Sketch) -> Self {
        sketch.finalize();
        Self {
            backing: Backing::Sketch(sketch.clone()),
            divisor: 1.0,
        }
    }

    /// Builds a Snapshot directly from raw values, for callers who
    /// already hold a batch of observations rather than a Sketch.
    pub fn from_values(mut values: Vec<f64>) -> Self {
        values.sort_by(|a, b| a.partial_cmp(b).expect("non-finite value in snapshot input"));
        Self {
            backing: Backing::Values(values),
            divisor: 1.0,
        }
    }

    /// Scales every value-typed accessor's result by `1/d`. A no-op
    /// builder call with `d == 1.0`.
    pub fn with_divisor(mut self, d: f64) -> Self {
        self.divisor = d;
        self
    }

    pub fn size(&self) -> u64 {
        match &self.backing {
            Backing::Sketch(s) => s.count(),
            Backing::Values(v) => v.len() as u64,
        }
    }

    /// An ε-approximate value at quantile `q`, scaled by the divisor.
    pub fn value_at(&self, q: f64) -> f64 {
        let raw = match &self.backing {
            Backing::Sketch(s) => s.query_readonly(q),
            Backing::Values(v) => interpolate(v, q),
        };
        raw / self.divisor
    }

    pub fn min(&self) -> f64 {
        let raw = match &self.backing {
            Backing::Sketch(s) => s.min(),
            Backing::Values(v) => v.first().copied().unwrap_or(0.0),
        };
        raw / self.divisor
    }

    pub fn max(&self) -> f64 {
        let raw = match &self.backing {
            Backing::Sketch(s) => s.max(),
            Backing::Values(v) => v.last().copied().unwrap_or(0.0),
        };
        raw / self.divisor
    }

    pub fn sum(&self) -> f64 {
        let raw = match &self.backing {
            Backing::Sketch(s) => s.sum(),
            Backing::Values(v) => v.iter().sum(),
        };
        raw / self.divisor
    }

    pub fn variance(&self) -> f64 {
        let raw = match &self.backing {
            Backing::Sketch(s) => s.variance(),
            Backing::Values(v) => sample_variance(v),
        };
        raw / (self.divisor * self.divisor)
    }
}

/// Linear interpolation over a sorted slice at quantile `q`.
fn interpolate(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = q * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = (lower + 1).min(sorted.len() - 1);
    let frac = rank - lower as f64;
    sorted[lower] + frac * (sorted[upper] - sorted[lower])
}

fn sample_variance(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64
}
