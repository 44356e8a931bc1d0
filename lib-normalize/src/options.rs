//! Selection of the normalization method.

/// Value of the user scale factor that leaves the automatic normalizations enabled.
pub const NEUTRAL_SCALE_FACTOR: f64 = 1.0;

/// Define the method for normalization.
#[derive(Clone, Debug, PartialEq)]
pub enum NormalizationMode {
    /// Use the base factor as is.
    None,
    /// Use the scale factor given by the user literally.
    ExplicitFactor,
    /// Scale to 1x average sequencing depth over the effective genome size (RPGC).
    OneXCoverage { effective_genome_size: u64 },
    /// Reads per kilobase of bin per million mapped reads.
    Rpkm,
}

/// The normalization-related user settings.
#[derive(Clone, Debug, PartialEq)]
pub struct NormalizationSettings {
    /// Scale factor given by the user.
    pub scale_factor: f64,
    /// Effective genome size for normalizing to 1x coverage.
    pub normalize_to_1x: Option<u64>,
    /// Whether to normalize using RPKM.
    pub normalize_using_rpkm: bool,
}

impl Default for NormalizationSettings {
    fn default() -> Self {
        NormalizationSettings {
            scale_factor: NEUTRAL_SCALE_FACTOR,
            normalize_to_1x: None,
            normalize_using_rpkm: false,
        }
    }
}

impl NormalizationSettings {
    /// Resolve the one normalization mode to use.
    ///
    /// 1x coverage (only with a positive genome size) applies if the scale factor is 1.0; a
    /// different scale factor disables it.  RPKM is multiplied into any scale factor.
    pub fn resolve(&self) -> NormalizationMode {
        let explicit = self.scale_factor != NEUTRAL_SCALE_FACTOR;
        match self.normalize_to_1x {
            Some(effective_genome_size) if effective_genome_size > 0 && !explicit => {
                NormalizationMode::OneXCoverage {
                    effective_genome_size,
                }
            }
            _ if self.normalize_using_rpkm => NormalizationMode::Rpkm,
            _ if explicit => NormalizationMode::ExplicitFactor,
            _ => NormalizationMode::None,
        }
    }

    /// Name of the requested normalization that is not applied because an explicit scale
    /// factor was given.
    pub fn overridden(&self) -> Option<&'static str> {
        match self.normalize_to_1x {
            Some(size) if size > 0 && self.scale_factor != NEUTRAL_SCALE_FACTOR => {
                Some("1x coverage (RPGC)")
            }
            _ => None,
        }
    }
}
