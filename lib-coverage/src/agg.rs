/// Code for aggregating BAM records into per-bin fragment counts.
use std::cmp::{max, min};

use rust_htslib::bam::{self, Read};

use super::errors::*;
use request::{ReadFilters, MAX_TEMPLATE_LENGTH};

const FLAG_PAIRED: u16 = 0x1;
const FLAG_PROPER_PAIR: u16 = 0x2;
const FLAG_UNMAPPED: u16 = 0x4;
const FLAG_REVERSE: u16 = 0x10;

/// The parts of a BAM record relevant for counting.
#[derive(Clone, Debug, PartialEq)]
pub struct AlignedRead {
    /// 0-based start of the alignment.
    pub pos: i64,
    /// 0-based exclusive end of the alignment.
    pub end_pos: i64,
    /// Start of the mate's alignment.
    pub mate_pos: i64,
    /// Template length as given in the record.
    pub insert_size: i64,
    pub flags: u16,
    pub mapq: u8,
    /// Aligned blocks as half-open intervals, sorted by position.
    pub blocks: Vec<(i64, i64)>,
}

impl AlignedRead {
    /// Extract the information from `record`.
    pub fn from_record(record: &bam::Record) -> Self {
        AlignedRead {
            pos: record.pos(),
            end_pos: record.cigar().end_pos(),
            mate_pos: record.mpos(),
            insert_size: record.insert_size(),
            flags: record.flags(),
            mapq: record.mapq(),
            blocks: aligned_blocks(record),
        }
    }

    fn has_flag(&self, flag: u16) -> bool {
        self.flags & flag != 0
    }

    pub fn is_reverse(&self) -> bool {
        self.has_flag(FLAG_REVERSE)
    }

    pub fn is_unmapped(&self) -> bool {
        self.has_flag(FLAG_UNMAPPED)
    }

    /// Paired and mapped in proper pair with a known template length.
    pub fn is_proper_pair(&self) -> bool {
        self.has_flag(FLAG_PAIRED) && self.has_flag(FLAG_PROPER_PAIR) && self.insert_size != 0
    }

    /// Proper pair whose template is short enough to extend the read to.
    pub fn has_extendable_template(&self) -> bool {
        self.is_proper_pair() && self.insert_size.abs() <= i64::from(MAX_TEMPLATE_LENGTH)
    }
}

/// Reference intervals covered by the alignment of `record`, split at deletions and skips.
fn aligned_blocks(record: &bam::Record) -> Vec<(i64, i64)> {
    use rust_htslib::bam::record::Cigar::*;

    let mut blocks = Vec::new();
    let mut pos = record.pos();
    for c in record.cigar().iter() {
        match *c {
            Match(num) | Equal(num) | Diff(num) => {
                blocks.push((pos, pos + i64::from(num)));
                pos += i64::from(num);
            }
            Del(num) | RefSkip(num) => {
                pos += i64::from(num);
            }
            Ins(_) | SoftClip(_) | HardClip(_) | Pad(_) => (),
        }
    }
    blocks
}

/// Counts fragments in the bins of one chunk of a contig.
#[derive(Debug)]
pub struct BinAggregator<'a> {
    filters: &'a ReadFilters,
    fragment_length: i64,
    bin_length: i64,

    /// Start of the chunk on the contig.
    start: i64,
    /// End of the chunk on the contig.
    end: i64,

    /// Per-bin fragment counts.
    counters: Vec<u32>,
    /// (start, mate start, reverse) of the previously counted read.
    last_kept: Option<(i64, i64, bool)>,

    /// Number of processed records.
    num_processed: u32,
    /// Number of skipped records.
    num_skipped: u32,
}

impl<'a> BinAggregator<'a> {
    /// Construct aggregator for the bins covering `start..end`.
    pub fn new(
        filters: &'a ReadFilters,
        fragment_length: u32,
        bin_length: u32,
        start: u64,
        end: u64,
    ) -> Self {
        let bin_length = i64::from(max(bin_length, 1));
        let (start, end) = (start as i64, max(start, end) as i64);
        let num_bins = ((end - start + bin_length - 1) / bin_length) as usize;
        BinAggregator {
            filters,
            fragment_length: i64::from(fragment_length),
            bin_length,
            start,
            end,
            counters: vec![0; num_bins],
            last_kept: None,
            num_processed: 0,
            num_skipped: 0,
        }
    }

    /// Put all `fetch()`ed records from `reader` into the aggregator.
    pub fn put_fetched_records(&mut self, reader: &mut bam::IndexedReader) -> Result<()> {
        let mut record = bam::Record::new();
        while let Some(result) = reader.read(&mut record) {
            result.chain_err(|| "Problem reading BAM record")?;
            let read = AlignedRead::from_record(&record);
            self.put_read(&read);
        }
        Ok(())
    }

    /// Count `read` unless it is filtered out.
    pub fn put_read(&mut self, read: &AlignedRead) {
        if read.is_unmapped()
            || self.skip_mapq(read)
            || self.skip_flags(read)
            || self.skip_duplicate(read)
        {
            self.num_skipped += 1;
            return;
        }
        self.num_processed += 1;
        self.last_kept = Some((read.pos, read.mate_pos, read.is_reverse()));

        // blocks are sorted, so remembering the last bin suffices to count each bin once
        let mut last_bin: Option<usize> = None;
        for (block_start, block_end) in self.fragment_blocks(read) {
            let from = max(block_start, self.start);
            let to = min(block_end, self.end);
            if from >= to {
                continue;
            }
            let first = ((from - self.start) / self.bin_length) as usize;
            let last = ((to - 1 - self.start) / self.bin_length) as usize;
            for bin in first..=last {
                if last_bin.map_or(true, |prev| bin > prev) {
                    self.counters[bin] += 1;
                    last_bin = Some(bin);
                }
            }
        }
    }

    // Skip `read` based on `MAPQ`?
    fn skip_mapq(&self, read: &AlignedRead) -> bool {
        read.mapq < self.filters.min_mapping_quality
    }

    // Skip `read` because of flags.
    fn skip_flags(&self, read: &AlignedRead) -> bool {
        let missing_include = match self.filters.sam_flag_include {
            Some(include) => read.flags & include != include,
            None => false,
        };
        let has_exclude = match self.filters.sam_flag_exclude {
            Some(exclude) => read.flags & exclude != 0,
            None => false,
        };
        missing_include || has_exclude
    }

    // Skip `read` because it starts where the previously counted one did?
    fn skip_duplicate(&self, read: &AlignedRead) -> bool {
        self.filters.ignore_duplicates
            && self.last_kept == Some((read.pos, read.mate_pos, read.is_reverse()))
    }

    /// Intervals covered by the fragment of `read`.
    fn fragment_blocks(&self, read: &AlignedRead) -> Vec<(i64, i64)> {
        let blocks = if self.filters.extend_paired_ends && read.has_extendable_template() {
            if read.is_reverse() {
                vec![(min(read.mate_pos, read.end_pos), read.end_pos)]
            } else {
                vec![(read.pos, read.pos + read.insert_size.abs())]
            }
        } else if read.end_pos - read.pos < self.fragment_length {
            if read.is_reverse() {
                vec![(max(read.end_pos - self.fragment_length, 0), read.end_pos)]
            } else {
                vec![(read.pos, read.pos + self.fragment_length)]
            }
        } else if read.blocks.is_empty() {
            vec![(read.pos, read.end_pos)]
        } else {
            read.blocks.clone()
        };

        if !self.filters.center_reads {
            return blocks;
        }
        let (frag_start, frag_end) = match (blocks.first(), blocks.last()) {
            (Some(first), Some(last)) => (first.0, last.1),
            _ => return blocks,
        };
        let read_length = read.end_pos - read.pos;
        let center = frag_end - (frag_end - frag_start) / 2;
        let start = max(center - read_length / 2, 0);
        vec![(start, start + read_length)]
    }

    /// Per-bin counts of the chunk.
    pub fn counts(&self) -> &[u32] {
        &self.counters
    }

    pub fn into_counts(self) -> Vec<u32> {
        self.counters
    }

    /// Number of processed records.
    pub fn num_processed(&self) -> u32 {
        self.num_processed
    }

    /// Number of skipped records.
    pub fn num_skipped(&self) -> u32 {
        self.num_skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(pos: i64, end_pos: i64, flags: u16) -> AlignedRead {
        AlignedRead {
            pos,
            end_pos,
            mate_pos: -1,
            insert_size: 0,
            flags,
            mapq: 60,
            blocks: vec![(pos, end_pos)],
        }
    }

    fn aggregate(filters: &ReadFilters, fragment_length: u32, reads: &[AlignedRead]) -> Vec<u32> {
        let mut agg = BinAggregator::new(filters, fragment_length, 10, 0, 100);
        for read in reads {
            agg.put_read(read);
        }
        agg.into_counts()
    }

    #[test]
    fn test_num_bins_rounds_up() {
        let filters = ReadFilters::default();
        assert_eq!(BinAggregator::new(&filters, 1, 10, 0, 95).counts().len(), 10);
        assert_eq!(BinAggregator::new(&filters, 1, 10, 100, 200).counts().len(), 10);
        assert_eq!(BinAggregator::new(&filters, 1, 10, 100, 100).counts().len(), 0);
    }

    #[test]
    fn test_forward_read_is_extended() {
        let counts = aggregate(&ReadFilters::default(), 30, &[read(5, 15, 0)]);
        assert_eq!(counts, vec![1, 1, 1, 1, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_reverse_read_is_extended_upstream() {
        let counts = aggregate(&ReadFilters::default(), 30, &[read(50, 60, FLAG_REVERSE)]);
        assert_eq!(counts, vec![0, 0, 0, 1, 1, 1, 0, 0, 0, 0]);
    }

    #[test]
    fn test_long_read_uses_aligned_blocks() {
        let mut spliced = read(0, 80, 0);
        spliced.blocks = vec![(0, 15), (60, 80)];
        let counts = aggregate(&ReadFilters::default(), 20, &[spliced]);
        assert_eq!(counts, vec![1, 1, 0, 0, 0, 0, 1, 1, 0, 0]);
    }

    #[test]
    fn test_read_is_counted_once_per_bin() {
        let mut gapped = read(0, 40, 0);
        gapped.blocks = vec![(0, 5), (7, 9), (12, 40)];
        let counts = aggregate(&ReadFilters::default(), 1, &[gapped]);
        assert_eq!(counts, vec![1, 1, 1, 1, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_paired_end_extension() {
        let filters = ReadFilters {
            extend_paired_ends: true,
            ..ReadFilters::default()
        };
        let mut first = read(10, 20, FLAG_PAIRED | FLAG_PROPER_PAIR);
        first.mate_pos = 45;
        first.insert_size = 45;
        let mut second = read(45, 55, FLAG_PAIRED | FLAG_PROPER_PAIR | FLAG_REVERSE);
        second.mate_pos = 10;
        second.insert_size = -45;
        assert_eq!(
            aggregate(&filters, 300, &[first]),
            vec![0, 1, 1, 1, 1, 1, 0, 0, 0, 0]
        );
        assert_eq!(
            aggregate(&filters, 300, &[second]),
            vec![0, 1, 1, 1, 1, 1, 0, 0, 0, 0]
        );
    }

    #[test]
    fn test_long_template_falls_back_to_fragment_length() {
        let filters = ReadFilters {
            extend_paired_ends: true,
            ..ReadFilters::default()
        };
        let mut read = read(10, 20, FLAG_PAIRED | FLAG_PROPER_PAIR);
        read.mate_pos = 5_000;
        read.insert_size = 5_000;
        assert!(!read.has_extendable_template());
        assert_eq!(
            aggregate(&filters, 30, &[read]),
            vec![0, 1, 1, 1, 0, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn test_center_reads() {
        let filters = ReadFilters {
            center_reads: true,
            ..ReadFilters::default()
        };
        // fragment 20..60, centered read window 35..45
        let counts = aggregate(&filters, 40, &[read(20, 30, 0)]);
        assert_eq!(counts, vec![0, 0, 0, 1, 1, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_mapq_and_unmapped_filters() {
        let filters = ReadFilters {
            min_mapping_quality: 30,
            ..ReadFilters::default()
        };
        let mut low = read(0, 10, 0);
        low.mapq = 10;
        let mut agg = BinAggregator::new(&filters, 1, 10, 0, 100);
        agg.put_read(&low);
        agg.put_read(&read(0, 10, FLAG_UNMAPPED));
        agg.put_read(&read(20, 30, 0));
        assert_eq!(agg.num_skipped(), 2);
        assert_eq!(agg.num_processed(), 1);
        assert_eq!(agg.counts()[..3], [0, 0, 1]);
    }

    #[test]
    fn test_sam_flag_filters() {
        let filters = ReadFilters {
            sam_flag_include: Some(FLAG_PAIRED | FLAG_PROPER_PAIR),
            sam_flag_exclude: Some(FLAG_REVERSE),
            ..ReadFilters::default()
        };
        let reads = [
            read(0, 10, FLAG_PAIRED),
            read(10, 20, FLAG_PAIRED | FLAG_PROPER_PAIR | FLAG_REVERSE),
            read(20, 30, FLAG_PAIRED | FLAG_PROPER_PAIR),
        ];
        let counts = aggregate(&filters, 1, &reads);
        assert_eq!(counts, vec![0, 0, 1, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_ignore_duplicates() {
        let filters = ReadFilters {
            ignore_duplicates: true,
            ..ReadFilters::default()
        };
        let reads = [
            read(0, 10, 0),
            read(0, 10, 0),
            read(0, 10, FLAG_REVERSE),
            read(0, 10, 0),
        ];
        let counts = aggregate(&filters, 1, &reads);
        assert_eq!(counts[0], 3);

        let counts = aggregate(&ReadFilters::default(), 1, &reads);
        assert_eq!(counts[0], 4);
    }

    #[test]
    fn test_fragment_outside_chunk_is_clipped() {
        let filters = ReadFilters::default();
        let mut agg = BinAggregator::new(&filters, 50, 10, 100, 150);
        agg.put_read(&read(70, 80, 0));
        agg.put_read(&read(140, 150, 0));
        assert_eq!(agg.counts(), &[1, 1, 0, 0, 1]);
    }
}
