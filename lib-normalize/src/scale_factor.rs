/// Arithmetic of the normalization modes.
use std::fmt;

use super::errors::*;
use options::NormalizationMode;

/// Multiplier applied to every raw bin count; finite and strictly positive.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScaleFactor(f64);

impl ScaleFactor {
    /// Wrap `value`, rejecting infinite, NaN, zero, and negative values.
    pub fn new(value: f64) -> Result<Self> {
        if value.is_finite() && value > 0.0 {
            Ok(ScaleFactor(value))
        } else {
            bail!(ErrorKind::Normalization(format!(
                "scale factor must be finite and positive but is {}",
                value
            )))
        }
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl fmt::Display for ScaleFactor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sequencing depth: bases covered by all fragments divided by the effective genome size.
pub fn sequencing_depth(mapped_count: u64, fragment_length: u32, effective_genome_size: u64) -> f64 {
    (mapped_count as f64 * fragment_length as f64) / effective_genome_size as f64
}

/// Compute the final scale factor for `mode`.
///
/// `base_factor` is the user's scale factor; the automatic normalizations multiply into it.
/// Fails if the modes dividing by the mapped read count see no reads.
pub fn compute_scale_factor(
    mode: &NormalizationMode,
    base_factor: f64,
    mapped_count: u64,
    fragment_length: u32,
    bin_size: u32,
) -> Result<ScaleFactor> {
    let factor = match *mode {
        NormalizationMode::None | NormalizationMode::ExplicitFactor => base_factor,
        NormalizationMode::OneXCoverage {
            effective_genome_size,
        } => {
            let current_coverage =
                sequencing_depth(mapped_count, fragment_length, effective_genome_size);
            if current_coverage == 0.0 {
                bail!(ErrorKind::Normalization(
                    "cannot normalize to 1x coverage, current coverage is zero (no mapped reads?)"
                        .to_string()
                ));
            }
            // the scaling sets the coverage to match 1x
            base_factor * (1.0 / current_coverage)
        }
        NormalizationMode::Rpkm => {
            if mapped_count == 0 {
                bail!(ErrorKind::Normalization(
                    "cannot normalize using RPKM without mapped reads".to_string()
                ));
            }
            let million_reads_mapped = mapped_count as f64 / 1e6;
            let bin_length_in_kb = bin_size as f64 / 1000.0;
            base_factor * (1.0 / (million_reads_mapped * bin_length_in_kb))
        }
    };

    ScaleFactor::new(factor)
}

/// Scale raw bin count `raw` by `factor`.
pub fn scale_coverage(raw: f64, factor: ScaleFactor) -> f64 {
    raw * factor.value()
}
