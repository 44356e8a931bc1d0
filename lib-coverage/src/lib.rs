/// Computation of normalized, binned coverage tracks from BAM files.
extern crate bigtools;

#[macro_use]
extern crate error_chain;

extern crate clap;

extern crate crossbeam;

extern crate rayon;

extern crate separator;
use separator::Separatable;

#[macro_use]
extern crate slog;
use slog::Logger;

extern crate strum;
#[macro_use]
extern crate strum_macros;

extern crate rust_htslib;

extern crate tokio;

#[cfg(test)]
extern crate tempdir;

extern crate lib_normalize;
use lib_normalize::{compute_scale_factor, scale_coverage, sequencing_depth, NormalizationMode};

extern crate lib_shared;
use lib_shared::bam_utils::{self, AlignmentSource, BamSource};

mod agg;
pub use agg::*;

mod engine;
pub use engine::*;

mod options;
pub use options::*;

mod request;
pub use request::*;

mod writer;
pub use writer::*;

#[cfg(test)]
mod test_utils;

mod errors {
    // Create the Error, ErrorKind, ResultExt, and Result types
    error_chain! {
        links {
            DataSource(::lib_shared::bam_utils::Error, ::lib_shared::bam_utils::ErrorKind);
            Normalization(::lib_normalize::Error, ::lib_normalize::ErrorKind);
        }

        errors {
            Validation(msg: String) {
                description("invalid coverage parameters")
                display("invalid coverage parameters: {}", msg)
            }
        }
    }
}

pub use errors::*;

/// Determine the scale factor from the statistics of `source` and finalize the request.
pub fn prepare_request<S: AlignmentSource + ?Sized>(
    logger: &Logger,
    builder: CoverageRequestBuilder,
    source: &mut S,
) -> Result<CoverageRequest> {
    let mapped_count = bam_utils::mapped_fragment_count(source, builder.exclusions())?;
    info!(
        logger,
        "Mapped fragments in {}: {}",
        source.filename(),
        mapped_count.separated_string()
    );
    if !builder.exclusions().is_empty() {
        debug!(
            logger,
            "Ignored for normalization: {:?}",
            builder.exclusions()
        );
    }

    let settings = builder.normalization().clone();
    if let Some(overridden) = settings.overridden() {
        warn!(
            logger,
            "Scale factor {} given, {} normalization will not be applied",
            settings.scale_factor,
            overridden
        );
    }

    let mode = settings.resolve();
    let scale_factor = compute_scale_factor(
        &mode,
        settings.scale_factor,
        mapped_count,
        builder.fragment_length(),
        builder.bin_length(),
    )?;
    if let NormalizationMode::OneXCoverage {
        effective_genome_size,
    } = mode
    {
        debug!(
            logger,
            "Estimated current coverage: {}",
            sequencing_depth(
                mapped_count,
                builder.fragment_length(),
                effective_genome_size
            )
        );
    }
    info!(logger, "Normalization: {:?}, scale factor: {}", mode, scale_factor);

    Ok(builder.build(scale_factor))
}

/// Run the coverage computation with the given source opener and engine.
///
/// The options are validated before `open_source` is called.  The engine is only invoked
/// once the scale factor has been computed.
pub fn run_with<S, F, E>(
    logger: &mut Logger,
    options: &CoverageOptions,
    open_source: F,
    engine: &E,
) -> Result<()>
where
    S: AlignmentSource,
    F: FnOnce(&str, Option<&str>) -> bam_utils::Result<S>,
    E: CoverageEngine + ?Sized,
{
    let builder = CoverageRequestBuilder::new(logger, options)?;

    info!(logger, "Opening BAI-indexed BAM file...");
    let request = {
        let mut source = open_source(builder.input(), builder.bam_index())?;
        prepare_request(logger, builder, &mut source)?
    };

    let scale_factor = request.scale_factor;
    let scale = move |raw: f64| scale_coverage(raw, scale_factor);
    engine.compute(logger, &request, &scale)?;

    info!(logger, "All done. Have a nice day!");
    Ok(())
}

/// Main entry point for computing a coverage track.
pub fn run(logger: &mut Logger, options: &CoverageOptions) -> Result<()> {
    info!(logger, "Running: bamcov");
    info!(logger, "Options: {:?}", options);

    run_with(logger, options, BamSource::open, &BinnedCoverageEngine)
}
