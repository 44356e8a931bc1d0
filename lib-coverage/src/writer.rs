/// Writing of binned values as bedGraph or bigWig track.
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{bounded, Receiver, Sender};

use bigtools::beddata::BedParserStreamingIterator;
use bigtools::{BigWigWrite, Value};

use lib_shared::regions::GenomeRegions;

use super::errors::*;
use options::OutputFormat;

/// Merge runs of equal values of consecutive bins into intervals.
///
/// Bin `i` covers `start + i * step` up to `start + i * step + step`, clipped to `end`.
/// Absent bins are left out and break runs.
pub fn merge_bins(start: u64, end: u64, step: u64, values: &[Option<f64>]) -> Vec<(u64, u64, f64)> {
    let mut result: Vec<(u64, u64, f64)> = Vec::new();
    let mut prev_present = false;
    for (i, value) in values.iter().enumerate() {
        let bin_start = start + i as u64 * step;
        if bin_start >= end {
            break;
        }
        let bin_end = ::std::cmp::min(bin_start + step, end);
        match *value {
            Some(value) => {
                match result.last_mut() {
                    Some(ref mut last) if prev_present && last.2 == value => {
                        last.1 = bin_end;
                        continue;
                    }
                    _ => (),
                }
                result.push((bin_start, bin_end, value));
                prev_present = true;
            }
            None => prev_present = false,
        }
    }
    result
}

/// Contigs buffered between the counting and the bigWig writer thread.
const BIGWIG_CHANNEL_SIZE: usize = 2;

/// Output track in one of the supported formats.
pub enum TrackWriter {
    /// Lines are written as they come.
    BedGraph { path: String, out: BufWriter<File> },
    /// Intervals of each contig are sent to the thread running the bigWig writer.
    BigWig {
        path: String,
        sender: Sender<(String, Vec<Value>)>,
        handle: JoinHandle<Result<()>>,
    },
}

/// Write the intervals arriving on `receiver` to the bigWig file at `path`.
///
/// Returns once all senders are dropped and the file is complete.
fn write_bigwig(
    path: &str,
    chrom_sizes: HashMap<String, u32>,
    receiver: Receiver<(String, Vec<Value>)>,
) -> Result<()> {
    let mut outb = BigWigWrite::create_file(Path::new(path), chrom_sizes)
        .map_err(|e| format!("Could not create bigWig file {}: {}", path, e))?;
    outb.options.channel_size = 0;
    outb.options.max_zooms = 1;
    outb.options.manual_zoom_sizes = None;
    outb.options.compress = true;
    outb.options.inmemory = false;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .chain_err(|| "Could not create runtime for bigWig writing")?;
    let intervals = receiver.into_iter().flat_map(|(chrom, values)| {
        values
            .into_iter()
            .map(move |value| (chrom.clone(), value))
    });
    let data = BedParserStreamingIterator::wrap_infallible_iter(intervals, true);
    outb.write(data, runtime)
        .map_err(|e| format!("Problem writing bigWig file {}: {}", path, e))?;
    Ok(())
}

/// Wait for the bigWig writer thread and return its result.
fn join_bigwig(handle: JoinHandle<Result<()>>) -> Result<()> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => bail!("bigWig writer thread panicked"),
    }
}

/// Remove the file at `path` if it exists.
fn remove_output(path: &str) {
    if Path::new(path).exists() {
        let _ = fs::remove_file(path);
    }
}

/// Pass through `result`, removing the output file at `path` if it is an error.
fn discard_on_error(path: &str, result: Result<()>) -> Result<()> {
    if result.is_err() {
        remove_output(path);
    }
    result
}

impl TrackWriter {
    /// Create writer for `path`; `contigs` provides the chromosome sizes for bigWig.
    pub fn create(path: &str, format: &OutputFormat, contigs: &GenomeRegions) -> Result<Self> {
        match *format {
            OutputFormat::BedGraph => {
                let file = File::create(path)
                    .chain_err(|| format!("Could not open output file {}", path))?;
                Ok(TrackWriter::BedGraph {
                    path: path.to_string(),
                    out: BufWriter::new(file),
                })
            }
            OutputFormat::BigWig => {
                let chrom_sizes: HashMap<String, u32> = contigs
                    .regions
                    .iter()
                    .map(|(name, _, len)| (name.clone(), *len as u32))
                    .collect();
                let (sender, receiver) = bounded::<(String, Vec<Value>)>(BIGWIG_CHANNEL_SIZE);
                let out_path = path.to_string();
                let handle = thread::spawn(move || write_bigwig(&out_path, chrom_sizes, receiver));
                Ok(TrackWriter::BigWig {
                    path: path.to_string(),
                    sender,
                    handle,
                })
            }
        }
    }

    /// Path of the output file.
    pub fn path(&self) -> &str {
        match *self {
            TrackWriter::BedGraph { ref path, .. } | TrackWriter::BigWig { ref path, .. } => path,
        }
    }

    /// Write the values of consecutive bins on `chrom` starting at `start`.
    pub fn write_bins(
        &mut self,
        chrom: &str,
        start: u64,
        end: u64,
        step: u64,
        values: &[Option<f64>],
    ) -> Result<()> {
        let merged = merge_bins(start, end, step, values);
        match *self {
            TrackWriter::BedGraph { ref mut out, .. } => {
                for (start, end, value) in merged {
                    writeln!(out, "{}\t{}\t{}\t{}", chrom, start, end, value as f32)
                        .chain_err(|| "Problem writing bedGraph line")?;
                }
            }
            TrackWriter::BigWig { ref sender, .. } => {
                let values: Vec<Value> = merged
                    .into_iter()
                    .map(|(start, end, value)| Value {
                        start: start as u32,
                        end: end as u32,
                        value: value as f32,
                    })
                    .collect();
                if !values.is_empty() && sender.send((chrom.to_string(), values)).is_err() {
                    bail!("bigWig writer stopped before {} was written", chrom);
                }
            }
        }
        Ok(())
    }

    /// Flush and close the output file, removing it if this fails.
    pub fn finish(self) -> Result<()> {
        let path = self.path().to_string();
        let result = match self {
            TrackWriter::BedGraph { mut out, .. } => {
                out.flush().chain_err(|| "Problem flushing bedGraph file")
            }
            TrackWriter::BigWig { sender, handle, .. } => {
                drop(sender);
                join_bigwig(handle)
            }
        };
        discard_on_error(&path, result)
    }

    /// Close and remove a partially written output file.
    pub fn abandon(self) {
        let path = self.path().to_string();
        match self {
            TrackWriter::BedGraph { out, .. } => drop(out),
            TrackWriter::BigWig { sender, handle, .. } => {
                drop(sender);
                let _ = join_bigwig(handle);
            }
        }
        remove_output(&path);
    }
}
