use std::collections::BTreeSet;
use std::str;

use super::regions::GenomeRegions;
use rust_htslib::bam::{self, Read};

mod errors {
    // Create the Error, ErrorKind, ResultExt, and Result types
    error_chain! {
        errors {
            DataSource(msg: String) {
                description("alignment data source error")
                display("alignment data source error: {}", msg)
            }
        }
    }
}

pub use self::errors::*;

fn data_source_error<S: Into<String>>(msg: S) -> Error {
    ErrorKind::DataSource(msg.into()).into()
}

/// Mapping statistics of an opened alignment file.
///
/// The statistics come from the index, so querying them is cheap and does not iterate
/// over the records.
pub trait AlignmentSource {
    /// Path of the underlying file.
    fn filename(&self) -> &str;

    /// Total number of mapped reads.
    fn total_mapped_count(&mut self) -> Result<u64>;

    /// Number of mapped reads for each sequence, in header order.
    fn per_sequence_mapped_counts(&mut self) -> Result<Vec<(String, u64)>>;
}

/// Return the number of mapped fragments used as the normalization denominator.
///
/// Sequences listed in `exclusions` do not contribute.  Without exclusions, the total from
/// the index is used directly.
pub fn mapped_fragment_count<S: AlignmentSource + ?Sized>(
    source: &mut S,
    exclusions: &BTreeSet<String>,
) -> Result<u64> {
    if exclusions.is_empty() {
        return source.total_mapped_count();
    }

    Ok(source
        .per_sequence_mapped_counts()?
        .into_iter()
        .filter(|(name, _)| !exclusions.contains(name))
        .map(|(_, mapped)| mapped)
        .sum())
}

/// `AlignmentSource` backed by a BAI-indexed BAM file.
pub struct BamSource {
    path: String,
    reader: bam::IndexedReader,
}

impl BamSource {
    /// Open BAM file at `path`, using `index` instead of `path.bai` if given.
    pub fn open(path: &str, index: Option<&str>) -> Result<Self> {
        let reader = match index {
            Some(index) => bam::IndexedReader::from_path_and_index(path, index),
            None => bam::IndexedReader::from_path(path),
        };
        match reader {
            Ok(reader) => Ok(BamSource {
                path: path.to_string(),
                reader,
            }),
            Err(e) => Err(data_source_error(format!(
                "could not open BAI-indexed BAM file {}: {}",
                path, e
            ))),
        }
    }

    /// Return header of the wrapped reader.
    pub fn header(&self) -> &bam::HeaderView {
        self.reader.header()
    }

    /// Raw index statistics as (tid, length, mapped, unmapped).
    fn index_stats(&mut self) -> Result<Vec<(i64, u64, u64, u64)>> {
        let path = self.path.clone();
        self.reader.index_stats().map_err(|e| {
            data_source_error(format!(
                "could not read index statistics of {}: {}",
                path, e
            ))
        })
    }
}

impl AlignmentSource for BamSource {
    fn filename(&self) -> &str {
        &self.path
    }

    fn total_mapped_count(&mut self) -> Result<u64> {
        Ok(self
            .index_stats()?
            .iter()
            .map(|&(_, _, mapped, _)| mapped)
            .sum())
    }

    fn per_sequence_mapped_counts(&mut self) -> Result<Vec<(String, u64)>> {
        let stats = self.index_stats()?;
        let header = self.reader.header();

        let mut result = Vec::with_capacity(stats.len());
        for (tid, _length, mapped, _unmapped) in stats {
            // tid -1 holds the unplaced reads
            if tid < 0 {
                continue;
            }
            if tid as u32 >= header.target_count() {
                bail!(ErrorKind::DataSource(format!(
                    "index statistics of {} refer to unknown sequence id {}",
                    self.path, tid
                )));
            }
            let name = str::from_utf8(header.tid2name(tid as u32))
                .chain_err(|| "Could not decode contig name")?
                .to_string();
            result.push((name, mapped));
        }

        Ok(result)
    }
}

/// Generate list of all contigs from BAM header.
pub fn build_chroms_bam(header: &bam::HeaderView) -> Result<GenomeRegions> {
    let mut pairs: Vec<(String, usize)> = Vec::new();

    for (no, name) in header.target_names().iter().enumerate() {
        let name = str::from_utf8(name)
            .chain_err(|| "Could not decode contig name")?
            .to_string();
        let len = match header.target_len(no as u32) {
            Some(len) => len as usize,
            None => bail!(ErrorKind::DataSource(format!(
                "no length for contig {} in BAM header",
                name
            ))),
        };
        pairs.push((name, len));
    }

    Ok(GenomeRegions::from_name_and_length(&pairs))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Source with canned statistics, optionally failing on the per-sequence query.
    struct FakeSource {
        total: u64,
        per_sequence: Option<Vec<(String, u64)>>,
    }

    impl AlignmentSource for FakeSource {
        fn filename(&self) -> &str {
            "fake.bam"
        }

        fn total_mapped_count(&mut self) -> Result<u64> {
            Ok(self.total)
        }

        fn per_sequence_mapped_counts(&mut self) -> Result<Vec<(String, u64)>> {
            match self.per_sequence {
                Some(ref counts) => Ok(counts.clone()),
                None => Err(data_source_error("no index statistics")),
            }
        }
    }

    fn exclusions(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_no_exclusions_uses_total() {
        let mut source = FakeSource {
            total: 20_000_000,
            per_sequence: None,
        };
        assert_eq!(
            mapped_fragment_count(&mut source, &BTreeSet::new()).unwrap(),
            20_000_000
        );
    }

    #[test]
    fn test_exclusions_skip_sequences() {
        let mut source = FakeSource {
            total: 20_000_000,
            per_sequence: Some(vec![
                ("chr1".to_string(), 5_000_000),
                ("chr2".to_string(), 15_000_000),
            ]),
        };
        assert_eq!(
            mapped_fragment_count(&mut source, &exclusions(&["chr1"])).unwrap(),
            15_000_000
        );
    }

    #[test]
    fn test_exclusions_not_in_source() {
        let mut source = FakeSource {
            total: 7,
            per_sequence: Some(vec![("chr1".to_string(), 3), ("chr2".to_string(), 4)]),
        };
        assert_eq!(
            mapped_fragment_count(&mut source, &exclusions(&["chrM"])).unwrap(),
            7
        );
        assert_eq!(
            mapped_fragment_count(&mut source, &exclusions(&["chr1", "chr2"])).unwrap(),
            0
        );
    }

    #[test]
    fn test_missing_statistics_is_data_source_error() {
        let mut source = FakeSource {
            total: 10,
            per_sequence: None,
        };
        let err = mapped_fragment_count(&mut source, &exclusions(&["chrX"])).unwrap_err();
        match *err.kind() {
            ErrorKind::DataSource(_) => (),
            ref other => panic!("unexpected error kind: {:?}", other),
        }
    }

    #[test]
    fn test_open_missing_file_is_data_source_error() {
        let err = match BamSource::open("/nonexistent/does-not-exist.bam", None) {
            Ok(_) => panic!("opening a missing file must fail"),
            Err(err) => err,
        };
        match *err.kind() {
            ErrorKind::DataSource(_) => (),
            ref other => panic!("unexpected error kind: {:?}", other),
        }
    }
}
