/// Binned coverage computation on top of an indexed BAM file.
use std::cmp::min;

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;

use rust_htslib::bam::{self, Read};

use separator::Separatable;
use slog::Logger;

use lib_shared::bam_utils;
use lib_shared::regions::GenomeRegions;

use super::errors::*;
use agg::BinAggregator;
use request::CoverageRequest;
use writer::TrackWriter;

/// Number of bins processed as one unit of parallel work.
pub const CHUNK_BINS: u64 = 20_000;

/// Computes the binned, scaled coverage for a `CoverageRequest` and writes the track.
pub trait CoverageEngine {
    /// Run the computation, applying `scale` to every raw bin value.
    fn compute(
        &self,
        logger: &Logger,
        request: &CoverageRequest,
        scale: &(dyn Fn(f64) -> f64 + Sync),
    ) -> Result<()>;
}

/// Engine counting fragments per bin with one BAM reader per worker thread.
#[derive(Debug, Default)]
pub struct BinnedCoverageEngine;

/// Open the BAM file of `request`.
fn open_reader(request: &CoverageRequest) -> Result<bam::IndexedReader> {
    let reader = match request.bam_index {
        Some(ref index) => bam::IndexedReader::from_path_and_index(&request.input, index),
        None => bam::IndexedReader::from_path(&request.input),
    };
    reader.chain_err(|| format!("Could not open BAI-indexed BAM file {}", request.input))
}

/// Window of `smooth_length` in bins of `step`, made odd so it centers on a bin.
pub fn smoothing_window(smooth_length: u32, step: u32) -> usize {
    let window = (smooth_length / ::std::cmp::max(step, 1)) as usize;
    if window % 2 == 0 {
        window + 1
    } else {
        window
    }
}

/// Replace each value by the mean of the `window` values centered on it, clipped at the ends.
pub fn smooth(values: &[f64], window: usize) -> Vec<f64> {
    let half = window / 2;
    (0..values.len())
        .map(|i| {
            let from = i.saturating_sub(half);
            let to = min(i + half + 1, values.len());
            values[from..to].iter().sum::<f64>() / (to - from) as f64
        })
        .collect()
}

/// Apply the missing-data policy and the scaling to the (smoothed) raw values.
pub fn finalize_bins(
    values: &[f64],
    treat_missing_as_zero: bool,
    scale: &(dyn Fn(f64) -> f64 + Sync),
) -> Vec<Option<f64>> {
    values
        .iter()
        .map(|&value| {
            if value == 0.0 && !treat_missing_as_zero {
                None
            } else {
                Some(scale(value))
            }
        })
        .collect()
}

impl BinnedCoverageEngine {
    /// Count fragments in the bins of `start..end` on contig `name`.
    fn count_region(
        &self,
        logger: &Logger,
        request: &CoverageRequest,
        name: &str,
        start: u64,
        end: u64,
    ) -> Result<Vec<u32>> {
        let step = u64::from(request.step_size);
        let chunk_length = CHUNK_BINS * step;
        let chunks: Vec<(u64, u64)> = (start..end)
            .step_by(chunk_length as usize)
            .map(|chunk_start| (chunk_start, min(chunk_start + chunk_length, end)))
            .collect();
        let fetch_margin = u64::from(request.fetch_margin());

        let counts = chunks
            .par_iter()
            .map_init(
                || open_reader(request),
                |reader, &(chunk_start, chunk_end)| -> Result<Vec<u32>> {
                    let reader = match *reader {
                        Ok(ref mut reader) => reader,
                        Err(ref e) => bail!("{}", e),
                    };
                    let tid = match reader.header().tid(name.as_bytes()) {
                        Some(tid) => tid,
                        None => bail!("Unknown contig {} in BAM header", name),
                    };

                    let fetch_start = chunk_start.saturating_sub(fetch_margin);
                    let fetch_end = chunk_end + fetch_margin;
                    reader
                        .fetch((tid, fetch_start as u32, fetch_end as u32))
                        .chain_err(|| format!("Could not fetch region {}:{}-{}", name, fetch_start + 1, fetch_end))?;

                    let mut agg = BinAggregator::new(
                        &request.filters,
                        request.fragment_length,
                        request.bin_length,
                        chunk_start,
                        chunk_end,
                    );
                    agg.put_fetched_records(reader)?;
                    trace!(
                        logger,
                        "{}:{}-{}: processed {} records, skipped {}",
                        name,
                        (chunk_start + 1).separated_string(),
                        chunk_end.separated_string(),
                        agg.num_processed(),
                        agg.num_skipped()
                    );
                    Ok(agg.into_counts())
                },
            )
            .collect::<Result<Vec<Vec<u32>>>>()?;

        Ok(counts.into_iter().flat_map(|chunk| chunk.into_iter()).collect())
    }

    /// Count, smooth, scale, and write all `regions`.
    fn write_regions(
        &self,
        logger: &Logger,
        request: &CoverageRequest,
        scale: &(dyn Fn(f64) -> f64 + Sync),
        regions: &GenomeRegions,
        writer: &mut TrackWriter,
    ) -> Result<()> {
        let window = request
            .smooth_length
            .map(|len| smoothing_window(len, request.step_size));

        for &(ref name, start, end) in &regions.regions {
            info!(
                logger,
                "Processing {}:{}-{}",
                name,
                (start + 1).separated_string(),
                end.separated_string()
            );
            let counts = self.count_region(logger, request, name, start as u64, end as u64)?;
            let raw: Vec<f64> = counts.iter().map(|&c| f64::from(c)).collect();
            let raw = match window {
                Some(window) => smooth(&raw, window),
                None => raw,
            };
            let values = finalize_bins(&raw, request.treat_missing_as_zero, scale);
            writer.write_bins(
                name,
                start as u64,
                end as u64,
                u64::from(request.step_size),
                &values,
            )?;
        }
        Ok(())
    }
}

impl CoverageEngine for BinnedCoverageEngine {
    fn compute(
        &self,
        logger: &Logger,
        request: &CoverageRequest,
        scale: &(dyn Fn(f64) -> f64 + Sync),
    ) -> Result<()> {
        info!(logger, "Opening BAI-indexed BAM file...");
        let contigs = {
            let reader = open_reader(request)?;
            bam_utils::build_chroms_bam(reader.header())?
        };

        // Get list of regions to process.
        let regions = match request.region {
            Some(ref spec) => contigs
                .restrict_to(spec)
                .chain_err(|| "Problem restricting to region")?,
            None => contigs.clone(),
        };
        info!(logger, "Will process {} regions", regions.regions.len());
        debug!(
            logger,
            "Regions: {:?}",
            regions
                .regions
                .iter()
                .map(|(name, start, end)| format!(
                    "{}:{}-{}",
                    name,
                    (start + 1).separated_string(),
                    end.separated_string()
                ))
                .collect::<Vec<String>>()
        );

        let pool = ThreadPoolBuilder::new()
            .num_threads(request.num_processors)
            .build()
            .chain_err(|| "Could not create thread pool")?;
        info!(
            logger,
            "Counting with {} threads, bin size {}, scale factor {}",
            pool.current_num_threads(),
            request.bin_length,
            request.scale_factor
        );

        info!(logger, "Writing {} track to {}", request.output_format, request.output);
        let mut writer = TrackWriter::create(&request.output, &request.output_format, &contigs)?;
        let result =
            pool.install(|| self.write_regions(logger, request, scale, &regions, &mut writer));
        match result {
            Ok(()) => writer.finish(),
            Err(e) => {
                writer.abandon();
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_all_close(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected.iter()) {
            assert!((a - e).abs() < 1e-12, "{:?} != {:?}", actual, expected);
        }
    }

    #[test]
    fn test_smoothing_window_is_odd() {
        assert_eq!(smoothing_window(100, 50), 3);
        assert_eq!(smoothing_window(150, 50), 3);
        assert_eq!(smoothing_window(120, 50), 3);
        assert_eq!(smoothing_window(200, 50), 5);
        assert_eq!(smoothing_window(60, 50), 1);
    }

    #[test]
    fn test_smooth_uses_clipped_neighbourhood() {
        let values = [3.0, 0.0, 6.0, 0.0, 0.0];
        assert_all_close(&smooth(&values, 3), &[1.5, 3.0, 2.0, 2.0, 0.0]);
    }

    #[test]
    fn test_smooth_window_one_is_identity() {
        let values = [1.0, 5.0, 2.0];
        assert_all_close(&smooth(&values, 1), &values);
    }

    #[test]
    fn test_finalize_scales_and_keeps_zero() {
        let scale = |x: f64| x * 0.5;
        assert_eq!(
            finalize_bins(&[0.0, 4.0], true, &scale),
            vec![Some(0.0), Some(2.0)]
        );
    }

    #[test]
    fn test_finalize_drops_missing() {
        let scale = |x: f64| x * 2.0;
        assert_eq!(
            finalize_bins(&[0.0, 1.5, 0.0], false, &scale),
            vec![None, Some(3.0), None]
        );
    }
}
