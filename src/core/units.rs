//! SI-prefix unit normalization
//!
//! Units are handled as `<prefix><symbol>` strings such as `mV`, `uA` or
//! `kOhm`. Only the prefix matters for scaling; the symbol is carried along
//! untouched. Rates are expressed relative to the bare base unit, so `mV`
//! has a rate of 1e-3 and `V` a rate of 1.
//!
//! Prefixes are matched case-insensitively in a fixed priority order:
//! femto, pico, nano, micro (`u` or `μ`), milli, kilo, `meg`, giga, tera.
//! Because milli is checked before the three-letter mega spelling, a unit
//! such as `megOhm` resolves to milli. That ordering is kept as-is.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// `<number><optional prefix><unit letters>` inside free cell text
static QUANTITY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?P<value>[-+]?(?:\d+(?:\.\d*)?|\.\d+)(?:e[-+]?\d+)?)\s*(?P<unit>(?:meg|[fpnuμµmkgt])?[a-zωΩ]+)?",
    )
    .unwrap()
});

/// Prefixes in match priority, with their power of ten
const PREFIXES: &[(&str, i32)] = &[
    ("f", -15),
    ("p", -12),
    ("n", -9),
    ("u", -6),
    ("μ", -6),
    ("µ", -6),
    ("m", -3),
    ("k", 3),
    ("meg", 6),
    ("g", 9),
    ("t", 12),
];

/// Errors raised by unit conversion
#[derive(Debug, Error, PartialEq)]
pub enum UnitError {
    #[error("Unit '{unit}' has a zero conversion rate")]
    ZeroRate { unit: String },
}

/// Power of ten denoted by the prefix of `unit`
///
/// A prefix only counts when at least one symbol character follows it, so a
/// bare `m` or `F` is treated as a base unit rather than as milli or femto.
pub fn prefix_exponent(unit: &str) -> i32 {
    let lowered = unit.trim().to_lowercase();
    for (prefix, exponent) in PREFIXES {
        if lowered.starts_with(prefix) && lowered.chars().count() > prefix.chars().count() {
            return *exponent;
        }
    }
    0
}

/// Multiplicative rate of `unit` relative to its base unit
pub fn rate(unit: &str) -> f64 {
    10f64.powi(prefix_exponent(unit))
}

/// Factor converting a value expressed in `origin` into `target`
///
/// Computed as `rate(origin) / rate(target)`; multiply a value by it.
pub fn change_rate(target: &str, origin: &str) -> f64 {
    10f64.powi(prefix_exponent(origin) - prefix_exponent(target))
}

/// Convert a value expressed in `origin` into `target`
pub fn convert(value: f64, target: &str, origin: &str) -> f64 {
    value * change_rate(target, origin)
}

/// Convert a value assumed to be in the base unit into `unit`
pub fn change_with_unit(value: f64, unit: &str) -> Result<f64, UnitError> {
    let unit_rate = rate(unit);
    if unit_rate == 0.0 || !unit_rate.is_finite() {
        return Err(UnitError::ZeroRate {
            unit: unit.to_string(),
        });
    }
    Ok(value * 10f64.powi(-prefix_exponent(unit)))
}

/// Convert a value expressed in `unit` into the base unit
pub fn to_base_unit(value: f64, unit: &str) -> f64 {
    value * rate(unit)
}

/// Strip the recognized prefix from `unit`, leaving the symbol
pub fn base_symbol(unit: &str) -> &str {
    let trimmed = unit.trim();
    let lowered = trimmed.to_lowercase();
    for (prefix, _) in PREFIXES {
        if lowered.starts_with(prefix) && lowered.chars().count() > prefix.chars().count() {
            let skip = prefix.chars().count();
            let offset = trimmed
                .char_indices()
                .nth(skip)
                .map(|(i, _)| i)
                .unwrap_or(trimmed.len());
            return &trimmed[offset..];
        }
    }
    trimmed
}

/// A number with the unit it was written in
#[derive(Debug, Clone, PartialEq)]
pub struct Quantity {
    pub value: f64,
    /// Unit as written, including prefix; empty for a bare number
    pub unit: String,
}

impl Quantity {
    /// Value expressed in `target`
    pub fn in_unit(&self, target: &str) -> f64 {
        if self.unit.is_empty() {
            self.value
        } else {
            convert(self.value, target, &self.unit)
        }
    }
}

/// Find the first quantity token in `text`
///
/// `"USL=1.5mV"` gives 1.5 in `mV`; `"0.3"` gives 0.3 with no unit.
pub fn parse_quantity(text: &str) -> Option<Quantity> {
    let caps = QUANTITY_PATTERN.captures(text)?;
    let value = caps.name("value")?.as_str().parse::<f64>().ok()?;
    if !value.is_finite() {
        return None;
    }
    let unit = caps
        .name("unit")
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();
    Some(Quantity { value, unit })
}

/// Parse `text` only when the whole cell is one quantity token
///
/// `"2mA"` and `" 0.3 "` parse; `"see note 3"` does not.
pub fn parse_exact_quantity(text: &str) -> Option<Quantity> {
    let text = text.trim();
    let whole = QUANTITY_PATTERN.find(text)?;
    if whole.start() != 0 || whole.end() != text.len() {
        return None;
    }
    parse_quantity(text)
}
