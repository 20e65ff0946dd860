//! Kubernetes resource quantities (`512Mi`, `1Gi`, `200m`, `0.5`).

use crate::error::{Result, SynthError};

const BINARY_SUFFIXES: [(&str, f64); 6] = [
    ("Ki", 1024.0),
    ("Mi", 1_048_576.0),
    ("Gi", 1_073_741_824.0),
    ("Ti", 1_099_511_627_776.0),
    ("Pi", 1_125_899_906_842_624.0),
    ("Ei", 1_152_921_504_606_846_976.0),
];

const DECIMAL_SUFFIXES: [(&str, f64); 9] = [
    ("n", 1e-9),
    ("u", 1e-6),
    ("m", 1e-3),
    ("k", 1e3),
    ("M", 1e6),
    ("G", 1e9),
    ("T", 1e12),
    ("P", 1e15),
    ("E", 1e18),
];

/// Parses a quantity into its value in base units (bytes, cores).
pub fn parse_quantity(raw: &str) -> Result<f64> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(SynthError::InvalidQuantity(raw.to_string()));
    }

    let (number, multiplier) = split_suffix(text);
    let value: f64 = number
        .parse()
        .map_err(|_| SynthError::InvalidQuantity(raw.to_string()))?;
    if !value.is_finite() || value < 0.0 {
        return Err(SynthError::InvalidQuantity(raw.to_string()));
    }

    Ok(value * multiplier)
}

fn split_suffix(text: &str) -> (&str, f64) {
    for (suffix, multiplier) in BINARY_SUFFIXES {
        if let Some(number) = text.strip_suffix(suffix) {
            return (number, multiplier);
        }
    }
    for (suffix, multiplier) in DECIMAL_SUFFIXES {
        if let Some(number) = text.strip_suffix(suffix) {
            return (number, multiplier);
        }
    }
    (text, 1.0)
}
