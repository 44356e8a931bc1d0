/// Assembly of the validated parameter set handed to the coverage engine.
use std::cmp::{max, min};
use std::collections::BTreeSet;

use slog::Logger;

use lib_normalize::{NormalizationSettings, ScaleFactor};
use lib_shared::regions::RegionSpec;

use super::errors::*;
use options::{CoverageOptions, MissingDataAsZero, OutputFormat};

/// Bin length used when the given one is not positive.
pub const DEFAULT_BIN_LENGTH: u32 = 50;

/// Fragment length used when none or a non-positive one is given.
pub const DEFAULT_FRAGMENT_LENGTH: u32 = 300;

/// Longest template that `extend_paired_ends` extends a read to.
pub const MAX_TEMPLATE_LENGTH: u32 = 1000;

/// Read-level filters and fragment transformations.
#[derive(Clone, Debug, PartialEq)]
pub struct ReadFilters {
    pub min_mapping_quality: u8,
    pub sam_flag_include: Option<u16>,
    pub sam_flag_exclude: Option<u16>,
    pub ignore_duplicates: bool,
    pub extend_paired_ends: bool,
    pub center_reads: bool,
}

impl Default for ReadFilters {
    fn default() -> Self {
        ReadFilters {
            min_mapping_quality: 0,
            sam_flag_include: None,
            sam_flag_exclude: None,
            ignore_duplicates: false,
            extend_paired_ends: false,
            center_reads: false,
        }
    }
}

/// Everything the coverage engine needs for one run.
#[derive(Clone, Debug)]
pub struct CoverageRequest {
    /// Path to the BAM file.
    pub input: String,
    /// Path to the BAI file, if not next to the BAM file.
    pub bam_index: Option<String>,
    /// Path to the output track.
    pub output: String,
    pub output_format: OutputFormat,
    pub bin_length: u32,
    /// Distance between bin starts; equal to `bin_length`.
    pub step_size: u32,
    pub fragment_length: u32,
    pub scale_factor: ScaleFactor,
    /// Smoothing window in bp, always larger than `bin_length` if set.
    pub smooth_length: Option<u32>,
    /// Write bins without reads as 0 instead of leaving them out.
    pub treat_missing_as_zero: bool,
    pub filters: ReadFilters,
    /// Optional restriction to one region.
    pub region: Option<RegionSpec>,
    /// Number of threads, 0 for all cores.
    pub num_processors: usize,
}

impl CoverageRequest {
    /// Distance beyond a region within which reads may have fragments reaching into it.
    pub fn fetch_margin(&self) -> u32 {
        if self.filters.extend_paired_ends {
            max(self.fragment_length, MAX_TEMPLATE_LENGTH)
        } else {
            self.fragment_length
        }
    }
}

/// Parse the comma-separated list of sequence names to ignore for normalization.
pub fn parse_exclusions(value: Option<&str>) -> BTreeSet<String> {
    match value {
        Some(value) => value
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect(),
        None => BTreeSet::new(),
    }
}

fn validation_error<S: Into<String>>(msg: S) -> Error {
    ErrorKind::Validation(msg.into()).into()
}

/// Take the required path option `value`, rejecting absent and empty strings.
fn required_path(value: &Option<String>, what: &str) -> Result<String> {
    match *value {
        Some(ref path) if !path.trim().is_empty() => Ok(path.clone()),
        _ => Err(validation_error(format!("no {} given", what))),
    }
}

/// Validates and defaults `CoverageOptions`; finalized by `build()` once the scale factor is
/// known.
#[derive(Debug)]
pub struct CoverageRequestBuilder {
    input: String,
    bam_index: Option<String>,
    output: String,
    output_format: OutputFormat,
    normalization: NormalizationSettings,
    exclusions: BTreeSet<String>,
    bin_length: u32,
    fragment_length: u32,
    smooth_length: Option<u32>,
    treat_missing_as_zero: bool,
    filters: ReadFilters,
    region: Option<RegionSpec>,
    num_processors: usize,
}

impl CoverageRequestBuilder {
    /// Validate `options` and apply defaults.  Does not touch the file system.
    pub fn new(logger: &Logger, options: &CoverageOptions) -> Result<Self> {
        let input = required_path(&options.input, "input BAM file")?;
        let output = required_path(&options.output, "output file")?;

        let bin_length = if options.bin_size > 0 && options.bin_size <= i64::from(u32::max_value())
        {
            options.bin_size as u32
        } else {
            DEFAULT_BIN_LENGTH
        };
        let fragment_length = match options.fragment_length {
            Some(len) if len > 0 && len <= i64::from(u32::max_value()) => len as u32,
            _ => DEFAULT_FRAGMENT_LENGTH,
        };

        let smooth_length = match options.smooth_length {
            Some(len) if len > i64::from(bin_length) => {
                Some(min(len, i64::from(u32::max_value())) as u32)
            }
            Some(len) => {
                warn!(
                    logger,
                    "The smooth length ({}) must be larger than the bin size ({}); no smoothing \
                     will be done",
                    len,
                    bin_length
                );
                None
            }
            None => None,
        };

        let region = match options.region {
            Some(ref region) => Some(
                RegionSpec::parse(region)
                    .map_err(|e| validation_error(format!("invalid region {}: {}", region, e)))?,
            ),
            None => None,
        };

        Ok(CoverageRequestBuilder {
            input,
            bam_index: options.bam_index.clone(),
            output,
            output_format: options.output_format.clone(),
            normalization: NormalizationSettings {
                scale_factor: options.scale_factor,
                normalize_to_1x: options.normalize_to_1x,
                normalize_using_rpkm: options.normalize_using_rpkm,
            },
            exclusions: parse_exclusions(options.ignore_for_normalization.as_ref().map(|s| s.as_str())),
            bin_length,
            fragment_length,
            smooth_length,
            treat_missing_as_zero: options.missing_data_as_zero != Some(MissingDataAsZero::No),
            filters: ReadFilters {
                min_mapping_quality: options.min_mapping_quality,
                sam_flag_include: options.sam_flag_include,
                sam_flag_exclude: options.sam_flag_exclude,
                ignore_duplicates: options.ignore_duplicates,
                extend_paired_ends: options.extend_paired_ends,
                center_reads: options.center_reads,
            },
            region,
            num_processors: options.num_processors,
        })
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn bam_index(&self) -> Option<&str> {
        self.bam_index.as_ref().map(|s| s.as_str())
    }

    /// Sequences not counted towards the mapped read total.
    pub fn exclusions(&self) -> &BTreeSet<String> {
        &self.exclusions
    }

    pub fn normalization(&self) -> &NormalizationSettings {
        &self.normalization
    }

    pub fn bin_length(&self) -> u32 {
        self.bin_length
    }

    pub fn fragment_length(&self) -> u32 {
        self.fragment_length
    }

    /// Finalize into a `CoverageRequest` scaling by `scale_factor`.
    pub fn build(self, scale_factor: ScaleFactor) -> CoverageRequest {
        CoverageRequest {
            input: self.input,
            bam_index: self.bam_index,
            output: self.output,
            output_format: self.output_format,
            bin_length: self.bin_length,
            step_size: self.bin_length,
            fragment_length: self.fragment_length,
            scale_factor,
            smooth_length: self.smooth_length,
            treat_missing_as_zero: self.treat_missing_as_zero,
            filters: self.filters,
            region: self.region,
            num_processors: self.num_processors,
        }
    }
}
