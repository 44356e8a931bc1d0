/// Helper code for handling genomic regions.
use regex::Regex;

mod errors {
    // Create the Error, ErrorKind, ResultExt, and Result types
    error_chain! {}
}

pub use self::errors::*;

/// Representation of a list of genomic regions.
#[derive(Debug, Clone, PartialEq)]
pub struct GenomeRegions {
    /// The regions as (chr, start, end), 0-based and half-open.
    pub regions: Vec<(String, usize, usize)>,
}

/// A region restriction as given by the user.
///
/// Positions are 0-based and half-open.  `end` is `None` if only the contig name was given,
/// in which case the region extends to the end of the contig.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionSpec {
    pub name: String,
    pub start: usize,
    pub end: Option<usize>,
}

/// Parse a position, allowing `,` and `_` as thousands separators.
fn parse_position(s: &str) -> Result<usize> {
    s.replace(",", "")
        .replace("_", "")
        .parse::<usize>()
        .chain_err(|| format!("Could not parse genome position: {}", s))
}

impl RegionSpec {
    /// Parse from `chr`, `chr:start-end`, or `chr:start:end` with 1-based, inclusive
    /// positions.
    pub fn parse(region: &str) -> Result<Self> {
        let re = Regex::new(r"^([^:\s]+)(?::([0-9,_]+)[-:]([0-9,_]+))?$")
            .chain_err(|| "Could not compile region pattern")?;
        let caps = match re.captures(region.trim()) {
            Some(caps) => caps,
            None => bail!("Could not parse genome region: {}", region),
        };

        let name = caps[1].to_string();
        match (caps.get(2), caps.get(3)) {
            (Some(start), Some(end)) => {
                let start = parse_position(start.as_str())?;
                let end = parse_position(end.as_str())?;
                if start == 0 || end < start {
                    bail!("Invalid genome region (need 1 <= start <= end): {}", region);
                }
                Ok(RegionSpec {
                    name,
                    start: start - 1,
                    end: Some(end),
                })
            }
            _ => Ok(RegionSpec {
                name,
                start: 0,
                end: None,
            }),
        }
    }
}

impl GenomeRegions {
    /// Create empty one.
    pub fn new() -> Self {
        GenomeRegions {
            regions: Vec::new(),
        }
    }

    /// Construct from list of names and lengths.
    pub fn from_name_and_length(pairs: &[(String, usize)]) -> Self {
        GenomeRegions {
            regions: pairs
                .iter()
                .map(|(chr, len)| (chr.clone(), 0, *len))
                .collect::<Vec<(String, usize, usize)>>(),
        }
    }

    /// Length of the contig with the given `name`, if any.
    pub fn contig_length(&self, name: &str) -> Option<usize> {
        self.regions
            .iter()
            .find(|(chr, _, _)| chr == name)
            .map(|(_, _, len)| *len)
    }

    /// Restrict whole-contig regions to the one given in `spec`, clamping at the contig end.
    pub fn restrict_to(&self, spec: &RegionSpec) -> Result<Self> {
        let length = match self.contig_length(&spec.name) {
            Some(length) => length,
            None => bail!("Unknown contig in region: {}", spec.name),
        };
        let end = match spec.end {
            Some(end) if end < length => end,
            _ => length,
        };
        if spec.start >= end {
            bail!(
                "Region {}:{}-{} is empty on contig of length {}",
                spec.name,
                spec.start + 1,
                end,
                length
            );
        }

        Ok(GenomeRegions {
            regions: vec![(spec.name.clone(), spec.start, end)],
        })
    }
}
