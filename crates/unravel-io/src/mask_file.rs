//! Mask-record text files (`M0.txt`, `M1.txt`, ...).
//!
//! A record is whitespace-separated integers. The first is the byte
//! offset where the mask lands in the flattened image; the rest are
//! `R G B` triples, one per mask pixel, holding the expected
//! image-plus-mask sums. Writers put the offset on its own line and one
//! triple per line, but any whitespace layout parses.

use std::fmt::Write as _;
use std::path::Path;

use unravel_pipeline::StageMaskRecord;

use crate::IoError;

/// Why a mask-record file could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MaskFileError {
    /// The file has no tokens at all.
    #[error("mask record is empty")]
    Empty,

    /// The first token is not a non-negative integer.
    #[error("invalid offset '{0}'")]
    InvalidOffset(String),

    /// A sum token is not a non-negative integer.
    #[error("invalid value '{token}' at position {position}")]
    InvalidValue {
        /// Zero-based index among the sum tokens.
        position: usize,
        /// The offending text.
        token: String,
    },
}

/// Parse the text of a mask-record file.
///
/// A trailing group of fewer than three values is not a pixel and is
/// dropped.
///
/// # Errors
///
/// Returns [`MaskFileError`] if the file is empty or a token is not a
/// non-negative integer.
pub fn parse_mask_record(text: &str) -> Result<StageMaskRecord, MaskFileError> {
    let mut tokens = text.split_whitespace();
    let first = tokens.next().ok_or(MaskFileError::Empty)?;
    let offset = first
        .parse::<usize>()
        .map_err(|_| MaskFileError::InvalidOffset(first.to_string()))?;

    let mut expected = tokens
        .enumerate()
        .map(|(position, token)| {
            token.parse::<u32>().map_err(|_| MaskFileError::InvalidValue {
                position,
                token: token.to_string(),
            })
        })
        .collect::<Result<Vec<u32>, _>>()?;

    let partial = expected.len() % 3;
    if partial != 0 {
        log::warn!("ignoring {partial} trailing values that do not form a pixel");
        expected.truncate(expected.len() - partial);
    }
    Ok(StageMaskRecord::new(offset, expected))
}

/// Read and parse a mask-record file.
///
/// # Errors
///
/// Returns [`IoError::Io`] if the file cannot be read and
/// [`IoError::MaskFile`] if its contents do not parse.
pub fn load_mask_record(path: &Path) -> Result<StageMaskRecord, IoError> {
    let text = std::fs::read_to_string(path)?;
    let record = parse_mask_record(&text).map_err(|source| IoError::MaskFile {
        path: path.to_path_buf(),
        source,
    })?;
    log::debug!(
        "{}: offset {}, {} pixels",
        path.display(),
        record.offset,
        record.pixel_count()
    );
    Ok(record)
}

/// Render a record in the file layout [`parse_mask_record`] reads.
#[must_use]
pub fn format_mask_record(record: &StageMaskRecord) -> String {
    let mut text = format!("{}\n", record.offset);
    for pixel in record.expected.chunks(3) {
        let line = pixel
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(" ");
        let _ = writeln!(text, "{line}");
    }
    text
}

/// Write a record to `path`.
///
/// # Errors
///
/// Returns [`IoError::Io`] if the file cannot be written.
pub fn save_mask_record(record: &StageMaskRecord, path: &Path) -> Result<(), IoError> {
    std::fs::write(path, format_mask_record(record))?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn parses_offset_and_triples() {
        let record = parse_mask_record("42\n16 26 36\n300 0 7\n").unwrap();
        assert_eq!(record.offset, 42);
        assert_eq!(record.expected, vec![16, 26, 36, 300, 0, 7]);
        assert_eq!(record.pixel_count(), 2);
    }

    #[test]
    fn layout_is_free_whitespace() {
        let record = parse_mask_record("  3 1\t2\r\n3   4 5 6").unwrap();
        assert_eq!(record.offset, 3);
        assert_eq!(record.expected, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn incomplete_trailing_pixel_is_dropped() {
        let record = parse_mask_record("0\n1 2 3\n4 5").unwrap();
        assert_eq!(record.expected, vec![1, 2, 3]);
    }

    #[test]
    fn offset_only_is_an_empty_record() {
        let record = parse_mask_record("17").unwrap();
        assert_eq!(record.offset, 17);
        assert!(record.expected.is_empty());
    }

    #[test]
    fn rejects_bad_tokens() {
        assert_eq!(parse_mask_record(" \n"), Err(MaskFileError::Empty));
        assert_eq!(
            parse_mask_record("-4\n1 2 3"),
            Err(MaskFileError::InvalidOffset("-4".to_string()))
        );
        assert_eq!(
            parse_mask_record("0\n1 x 3"),
            Err(MaskFileError::InvalidValue {
                position: 1,
                token: "x".to_string(),
            })
        );
    }

    #[test]
    fn format_puts_one_pixel_per_line() {
        let record = StageMaskRecord::new(9, vec![1, 2, 3, 400, 5, 6]);
        assert_eq!(format_mask_record(&record), "9\n1 2 3\n400 5 6\n");
    }

    #[test]
    fn load_reports_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("M3.txt");
        std::fs::write(&path, "zero").unwrap();
        let err = load_mask_record(&path).unwrap_err();
        assert!(matches!(
            err,
            IoError::MaskFile {
                source: MaskFileError::InvalidOffset(_),
                ..
            }
        ));
        assert!(err.to_string().contains("M3.txt"));
    }

    proptest! {
        #[test]
        fn formatted_records_parse_back(
            offset in any::<u32>(),
            pixels in prop::collection::vec(any::<[u32; 3]>(), 0..20),
        ) {
            let record = StageMaskRecord::new(offset as usize, pixels.concat());
            prop_assert_eq!(parse_mask_record(&format_mask_record(&record)).unwrap(), record);
        }
    }
}
