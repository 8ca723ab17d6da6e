//! Address samples and the grouped sample file format.
//!
//! A sample file lists hexadecimal physical addresses, one per line. A line
//! starting with `Bank` closes the current group:
//!
//! ```text
//! Bank 0
//! 0x1a2000
//! 0x1b6000
//! Bank 1
//! 0x1a3000
//! ```

use std::io::{BufRead, Write};

use itertools::Itertools;
use log::trace;
use thiserror::Error;

use crate::memory::PhysAddr;
use crate::util::BANK_MARKER;

/// A group of physical addresses hypothesised to share one bank.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AddressSample {
    addrs: Vec<PhysAddr>,
}

impl AddressSample {
    /// Creates a sample from physical addresses.
    pub fn new(addrs: Vec<PhysAddr>) -> Self {
        AddressSample { addrs }
    }

    /// Returns the addresses of this sample.
    pub fn addrs(&self) -> &[PhysAddr] {
        &self.addrs
    }

    /// Number of addresses in the sample.
    pub fn len(&self) -> usize {
        self.addrs.len()
    }

    /// Returns true if the sample holds no address.
    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }
}

impl FromIterator<u64> for AddressSample {
    fn from_iter<I: IntoIterator<Item = u64>>(iter: I) -> Self {
        AddressSample::new(iter.into_iter().map(PhysAddr::new).collect())
    }
}

impl FromIterator<PhysAddr> for AddressSample {
    fn from_iter<I: IntoIterator<Item = PhysAddr>>(iter: I) -> Self {
        AddressSample::new(iter.into_iter().collect())
    }
}

/// Errors that can occur while reading samples.
#[derive(Debug, Error)]
pub enum SampleError {
    /// Reading the underlying stream failed
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// A line is neither a group marker nor a hexadecimal address
    #[error("malformed line {line}: {content:?}")]
    Malformed {
        /// 1-based line number
        line: usize,
        /// The offending line
        content: String,
    },
    /// A group holds more addresses than permitted
    #[error("sample ending at line {line} exceeds {max} addresses")]
    TooManyAddresses {
        /// 1-based line number of the overflowing address
        line: usize,
        /// The configured maximum
        max: usize,
    },
}

/// Iterator over the samples of a grouped address stream.
///
/// Each yielded item is one non-empty group. The first error ends iteration.
pub struct SampleReader<R> {
    lines: std::io::Lines<R>,
    line_no: usize,
    max_addrs: usize,
    done: bool,
}

impl<R: BufRead> SampleReader<R> {
    /// Creates a reader that rejects groups larger than `max_addrs`.
    pub fn new(reader: R, max_addrs: usize) -> Self {
        SampleReader {
            lines: reader.lines(),
            line_no: 0,
            max_addrs,
            done: false,
        }
    }

    fn next_sample(&mut self) -> Result<Option<AddressSample>, SampleError> {
        let mut addrs = vec![];
        loop {
            let line = match self.lines.next() {
                Some(line) => line?,
                None => {
                    self.done = true;
                    break;
                }
            };
            self.line_no += 1;
            if line.starts_with(BANK_MARKER) {
                if addrs.is_empty() {
                    continue;
                }
                break;
            }
            if line.trim().is_empty() {
                continue;
            }
            let addr = parse_addr(&line).ok_or_else(|| SampleError::Malformed {
                line: self.line_no,
                content: line.clone(),
            })?;
            trace!("Got: 0x{:x}", addr);
            addrs.push(PhysAddr::new(addr));
            if addrs.len() > self.max_addrs {
                return Err(SampleError::TooManyAddresses {
                    line: self.line_no,
                    max: self.max_addrs,
                });
            }
        }
        if addrs.is_empty() {
            Ok(None)
        } else {
            Ok(Some(AddressSample::new(addrs)))
        }
    }
}

impl<R: BufRead> Iterator for SampleReader<R> {
    type Item = Result<AddressSample, SampleError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_sample() {
            Ok(Some(sample)) => Some(Ok(sample)),
            Ok(None) => None,
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Parses a `0x`-prefixed hexadecimal number at the start of `line`.
///
/// Anything after the first whitespace is ignored.
fn parse_addr(line: &str) -> Option<u64> {
    let token = line.split_whitespace().next()?;
    let digits = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))?;
    u64::from_str_radix(digits, 16).ok()
}

/// Writes groups in the format read by [`SampleReader`].
///
/// # Errors
///
/// Returns an I/O error if writing fails.
pub fn write_samples<'a, W: Write>(
    mut writer: W,
    groups: impl IntoIterator<Item = (usize, &'a AddressSample)>,
) -> std::io::Result<()> {
    for (id, sample) in groups {
        writeln!(writer, "{} {}", BANK_MARKER, id)?;
        writeln!(
            writer,
            "{}",
            sample.addrs().iter().map(|a| format!("0x{:x}", a)).join("\n")
        )?;
    }
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_all(input: &str, max: usize) -> Result<Vec<AddressSample>, SampleError> {
        SampleReader::new(input.as_bytes(), max).collect()
    }

    #[test]
    fn test_groups_split_on_marker() {
        let samples = read_all("Bank 0\n0x10\n0x20\nBank 1\n0x30\n", 10).expect("valid input");
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0], [0x10u64, 0x20].into_iter().collect::<AddressSample>());
        assert_eq!(samples[1], [0x30u64].into_iter().collect::<AddressSample>());
    }

    #[test]
    fn test_last_group_closed_by_eof() {
        let samples = read_all("0x1\n0x2", 10).expect("valid input");
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].len(), 2);
    }

    #[test]
    fn test_empty_groups_skipped() {
        let samples = read_all("Bank 0\nBank 1\n\n0xff trailing text\nBank 2\n", 10)
            .expect("valid input");
        assert_eq!(samples, vec![[0xffu64].into_iter().collect::<AddressSample>()]);
    }

    #[test]
    fn test_malformed_line() {
        let err = read_all("Bank 0\n0x10\nfoo\n", 10).unwrap_err();
        assert!(matches!(err, SampleError::Malformed { line: 3, .. }));
    }

    #[test]
    fn test_missing_prefix_is_malformed() {
        let err = read_all("1234\n", 10).unwrap_err();
        assert!(matches!(err, SampleError::Malformed { line: 1, .. }));
    }

    #[test]
    fn test_too_many_addresses() {
        let err = read_all("0x1\n0x2\n0x3\n", 2).unwrap_err();
        assert!(matches!(err, SampleError::TooManyAddresses { line: 3, max: 2 }));
    }

    #[test]
    fn test_write_then_read() {
        let a: AddressSample = [0x1000u64, 0x3000].into_iter().collect();
        let b: AddressSample = [0x2000u64].into_iter().collect();
        let mut buf = vec![];
        write_samples(&mut buf, [(0, &a), (7, &b)]).expect("write to vec");
        let text = String::from_utf8(buf).expect("utf8");
        assert!(text.starts_with("Bank 0\n0x1000\n0x3000\nBank 7\n"));
        assert_eq!(read_all(&text, 10).expect("valid input"), vec![a, b]);
    }
}
