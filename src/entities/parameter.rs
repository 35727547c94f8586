//! Parameter entity - one measured or derived electrical quantity

use serde::{Deserialize, Serialize};

/// Statistics of one parameter over the chips in scope
///
/// Every figure is optional: an undefined result (no data, zero spread, a
/// missing spec limit) is `None`, never a numeric stand-in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterStats {
    /// Number of non-missing values
    pub count: usize,

    pub mean: Option<f64>,

    /// Sample standard deviation (n - 1 denominator)
    pub std_dev: Option<f64>,

    pub median: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,

    /// Cp = (USL - LSL) / (6σ)
    pub cp: Option<f64>,

    /// Cpk = min(USL - μ, μ - LSL) / (3σ)
    pub cpk: Option<f64>,

    /// Percentage of values inside the spec limits
    pub yield_percent: Option<f64>,
}

/// A test item of the lot schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// Unique id within the lot
    pub id: String,

    /// Item name as displayed in the source file
    pub name: String,

    /// Unit symbol including any SI prefix (e.g. "mV")
    #[serde(default)]
    pub unit: String,

    /// Lower specification limit, in `unit`
    #[serde(default)]
    pub lower_limit: Option<f64>,

    /// Upper specification limit, in `unit`
    #[serde(default)]
    pub upper_limit: Option<f64>,

    /// Test-condition rows, verbatim (empty string for blank cells)
    #[serde(default)]
    pub test_conditions: Vec<String>,

    /// Statistics computed by the analyzer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stats: Option<ParameterStats>,
}

impl Parameter {
    /// Create a parameter with no limits or conditions
    pub fn new(id: impl Into<String>, name: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            unit: unit.into(),
            lower_limit: None,
            upper_limit: None,
            test_conditions: Vec::new(),
            stats: None,
        }
    }

    /// Builder-style limit setter
    pub fn with_limits(mut self, lower: Option<f64>, upper: Option<f64>) -> Self {
        self.lower_limit = lower;
        self.upper_limit = upper;
        self
    }

    /// Statistics from the last analysis run, if any
    pub fn stats(&self) -> Option<&ParameterStats> {
        self.stats.as_ref()
    }

    pub(crate) fn set_stats(&mut self, stats: Option<ParameterStats>) {
        self.stats = stats;
    }

    /// Check whether a value lies inside the limits (absent limits are open)
    pub fn in_spec(&self, value: f64) -> bool {
        self.lower_limit.map_or(true, |l| value >= l)
            && self.upper_limit.map_or(true, |u| value <= u)
    }
}
