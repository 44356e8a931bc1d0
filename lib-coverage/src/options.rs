use std::fmt;
/// Types for configuring the coverage computation.
use std::str::FromStr;

use clap::ArgMatches;

use super::errors::*;

/// Enum for selecting the output track format.
#[derive(Clone, Debug, PartialEq, EnumString)]
pub enum OutputFormat {
    #[strum(serialize = "bigwig")]
    BigWig,
    #[strum(serialize = "bedgraph")]
    BedGraph,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Answer to "should bins without reads be written as zero?".
#[derive(Clone, Copy, Debug, PartialEq, EnumString)]
pub enum MissingDataAsZero {
    #[strum(serialize = "yes")]
    Yes,
    #[strum(serialize = "no")]
    No,
}

/// Number of counting threads when none is given.
pub const DEFAULT_NUM_PROCESSORS: usize = 1;

/// Options for computing a coverage track.
///
/// These are the values as given by the user; defaulting and validation happen when building
/// the `CoverageRequest`.
#[derive(Clone, Debug)]
pub struct CoverageOptions {
    // Generic arguments
    /// Number of threads for counting, 0 for all available cores.
    pub num_processors: usize,

    // I/O related
    /// Path to sample BAM file.
    pub input: Option<String>,
    /// Path to BAI index if not next to the BAM file.
    pub bam_index: Option<String>,
    /// Path to output track file.
    pub output: Option<String>,
    /// Format of the output track.
    pub output_format: OutputFormat,

    // Normalization
    /// Scale factor given by the user.
    pub scale_factor: f64,
    /// Effective genome size for normalizing to 1x coverage.
    pub normalize_to_1x: Option<u64>,
    /// Whether or not to normalize using RPKM.
    pub normalize_using_rpkm: bool,
    /// Comma-separated contigs to ignore when counting mapped reads for normalization.
    pub ignore_for_normalization: Option<String>,

    // Binning
    /// Length of the bins.
    pub bin_size: i64,
    /// Fragment length to extend reads to.
    pub fragment_length: Option<i64>,
    /// Length of the smoothing window in bp.
    pub smooth_length: Option<i64>,
    /// Whether to write bins without reads as zero.
    pub missing_data_as_zero: Option<MissingDataAsZero>,
    /// Optional genome region to limit analysis to.
    pub region: Option<String>,

    // Counting-related
    /// Minimal MAPQ of a read to count.
    pub min_mapping_quality: u8,
    /// Only count reads having all of these flag bits.
    pub sam_flag_include: Option<u16>,
    /// Do not count reads having any of these flag bits.
    pub sam_flag_exclude: Option<u16>,
    /// Whether or not to skip reads with the same start, mate start, and strand.
    pub ignore_duplicates: bool,
    /// Whether or not to extend proper pairs to the template.
    pub extend_paired_ends: bool,
    /// Whether or not to center reads on their fragment.
    pub center_reads: bool,
}

impl Default for CoverageOptions {
    fn default() -> Self {
        CoverageOptions {
            num_processors: DEFAULT_NUM_PROCESSORS,

            input: None,
            bam_index: None,
            output: None,
            output_format: OutputFormat::BigWig,

            scale_factor: 1.0,
            normalize_to_1x: None,
            normalize_using_rpkm: false,
            ignore_for_normalization: None,

            bin_size: 50,
            fragment_length: None,
            smooth_length: None,
            missing_data_as_zero: None,
            region: None,

            min_mapping_quality: 0,
            sam_flag_include: None,
            sam_flag_exclude: None,
            ignore_duplicates: false,
            extend_paired_ends: false,
            center_reads: false,
        }
    }
}

/// Parse value of argument `name`, if given.
fn parse_value<T>(matches: &ArgMatches, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match matches.value_of(name) {
        Some(value) => match value.parse::<T>() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(e) => bail!(
                "Invalid value for --{}: {} ({})",
                name.replace("_", "-"),
                value,
                e
            ),
        },
        None => Ok(None),
    }
}

/// Parse the number of processors, "max" meaning all.
fn parse_num_processors(matches: &ArgMatches) -> Result<usize> {
    match matches.value_of("num_processors") {
        Some("max") => Ok(0),
        None => Ok(DEFAULT_NUM_PROCESSORS),
        Some(_) => Ok(parse_value::<usize>(matches, "num_processors")?.unwrap_or(0)),
    }
}

impl CoverageOptions {
    /// Build options from ArgMatches.
    pub fn new(matches: &ArgMatches) -> Result<Self> {
        let defaults = CoverageOptions::default();

        Ok(CoverageOptions {
            num_processors: parse_num_processors(matches)?,

            input: matches.value_of("bam").map(|x| x.to_string()),
            bam_index: matches.value_of("bam_index").map(|x| x.to_string()),
            output: matches.value_of("output").map(|x| x.to_string()),
            output_format: parse_value(matches, "output_format")?
                .unwrap_or(defaults.output_format),

            scale_factor: parse_value(matches, "scale_factor")?.unwrap_or(defaults.scale_factor),
            normalize_to_1x: parse_value(matches, "normalize_to_1x")?,
            normalize_using_rpkm: matches.is_present("normalize_using_rpkm"),
            ignore_for_normalization: matches
                .value_of("ignore_for_normalization")
                .map(|x| x.to_string()),

            bin_size: parse_value(matches, "bin_size")?.unwrap_or(defaults.bin_size),
            fragment_length: parse_value(matches, "fragment_length")?,
            smooth_length: parse_value(matches, "smooth_length")?,
            missing_data_as_zero: parse_value(matches, "missing_data_as_zero")?,
            region: matches.value_of("region").map(|x| x.to_string()),

            min_mapping_quality: parse_value(matches, "min_mapping_quality")?
                .unwrap_or(defaults.min_mapping_quality),
            sam_flag_include: parse_value(matches, "sam_flag_include")?,
            sam_flag_exclude: parse_value(matches, "sam_flag_exclude")?,
            ignore_duplicates: matches.is_present("ignore_duplicates"),
            extend_paired_ends: matches.is_present("extend_paired_ends"),
            center_reads: matches.is_present("center_reads"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use clap::{App, Arg};

    fn app<'a, 'b>() -> App<'a, 'b> {
        App::new("test")
            .arg(Arg::with_name("bam").long("bam").takes_value(true))
            .arg(Arg::with_name("output").long("output").takes_value(true))
            .arg(
                Arg::with_name("output_format")
                    .long("output-format")
                    .takes_value(true),
            )
            .arg(
                Arg::with_name("scale_factor")
                    .long("scale-factor")
                    .takes_value(true),
            )
            .arg(Arg::with_name("bin_size").long("bin-size").takes_value(true))
            .arg(
                Arg::with_name("num_processors")
                    .long("num-processors")
                    .takes_value(true),
            )
            .arg(
                Arg::with_name("missing_data_as_zero")
                    .long("missing-data-as-zero")
                    .takes_value(true),
            )
            .arg(Arg::with_name("normalize_using_rpkm").long("normalize-using-rpkm"))
    }

    #[test]
    fn test_defaults_from_empty_command_line() {
        let matches = app().get_matches_from(vec!["test"]);
        let options = CoverageOptions::new(&matches).unwrap();
        assert_eq!(options.input, None);
        assert_eq!(options.output_format, OutputFormat::BigWig);
        assert_eq!(options.scale_factor, 1.0);
        assert_eq!(options.bin_size, 50);
        assert_eq!(options.num_processors, 1);
        assert_eq!(options.num_processors, CoverageOptions::default().num_processors);
        assert_eq!(options.missing_data_as_zero, None);
        assert!(!options.normalize_using_rpkm);
    }

    #[test]
    fn test_values_from_command_line() {
        let matches = app().get_matches_from(vec![
            "test",
            "--bam",
            "in.bam",
            "--output",
            "out.bg",
            "--output-format",
            "bedgraph",
            "--scale-factor",
            "0.5",
            "--bin-size",
            "25",
            "--num-processors",
            "4",
            "--missing-data-as-zero",
            "no",
            "--normalize-using-rpkm",
        ]);
        let options = CoverageOptions::new(&matches).unwrap();
        assert_eq!(options.input, Some("in.bam".to_string()));
        assert_eq!(options.output, Some("out.bg".to_string()));
        assert_eq!(options.output_format, OutputFormat::BedGraph);
        assert_eq!(options.scale_factor, 0.5);
        assert_eq!(options.bin_size, 25);
        assert_eq!(options.num_processors, 4);
        assert_eq!(options.missing_data_as_zero, Some(MissingDataAsZero::No));
        assert!(options.normalize_using_rpkm);
    }

    #[test]
    fn test_max_processors() {
        let matches = app().get_matches_from(vec!["test", "--num-processors", "max"]);
        assert_eq!(CoverageOptions::new(&matches).unwrap().num_processors, 0);
    }

    #[test]
    fn test_invalid_number_is_error() {
        let matches = app().get_matches_from(vec!["test", "--bin-size", "fifty"]);
        assert!(CoverageOptions::new(&matches).is_err());
    }
}
