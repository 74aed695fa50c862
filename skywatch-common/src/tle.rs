//! Structural checks for two-line element text.
//!
//! Only the prefix, length and catalog-number columns are checked here; the
//! propagation library does the numeric parsing.

use thiserror::Error;

use crate::types::NoradId;

/// Minimum length of a well-formed element line.
pub const TLE_LINE_LEN: usize = 69;

/// A fetched payload failed structural validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedElementData {
    #[error("payload is missing {0}")]
    Missing(&'static str),

    #[error("line {line} must start with \"{expected}\"")]
    BadPrefix { line: u8, expected: &'static str },

    #[error("line {line} is {len} characters long, expected at least 69")]
    TooShort { line: u8, len: usize },

    #[error("line {line} carries catalog number '{found}', expected {expected}")]
    CatalogMismatch {
        line: u8,
        found: String,
        expected: NoradId,
    },
}

/// Validate both element lines for the requested catalog number.
pub fn validate_lines(norad_id: NoradId, line1: &str, line2: &str) -> Result<(), MalformedElementData> {
    check_line(1, "1 ", norad_id, line1)?;
    check_line(2, "2 ", norad_id, line2)?;
    Ok(())
}

fn check_line(
    line: u8,
    prefix: &'static str,
    norad_id: NoradId,
    text: &str,
) -> Result<(), MalformedElementData> {
    if !text.starts_with(prefix) {
        return Err(MalformedElementData::BadPrefix { line, expected: prefix });
    }
    if !text.is_ascii() || text.len() < TLE_LINE_LEN {
        return Err(MalformedElementData::TooShort { line, len: text.chars().count() });
    }

    let found = catalog_number(text).unwrap_or_default();
    if found.parse::<NoradId>().ok() != Some(norad_id) {
        return Err(MalformedElementData::CatalogMismatch {
            line,
            found: found.to_string(),
            expected: norad_id,
        });
    }
    Ok(())
}

/// Catalog number field (columns 3-7) of an element line, trimmed.
pub fn catalog_number(line: &str) -> Option<&str> {
    line.get(2..7).map(str::trim)
}

/// True when the text looks like either element line.
pub fn is_element_line(text: &str) -> bool {
    (text.starts_with("1 ") || text.starts_with("2 ")) && text.len() >= TLE_LINE_LEN
}

#[cfg(test)]
mod tests {
    use super::*;

    const L1: &str = "1 25544U 98067A   20194.88612269 -.00002218  00000-0 -31515-4 0  9992";
    const L2: &str = "2 25544  51.6461 221.2784 0001413  89.1723 280.4612 15.49507896236008";

    #[test]
    fn test_accepts_well_formed_lines() {
        assert!(validate_lines(25544, L1, L2).is_ok());
    }

    #[test]
    fn test_rejects_swapped_lines() {
        let err = validate_lines(25544, L2, L1).unwrap_err();
        assert_eq!(err, MalformedElementData::BadPrefix { line: 1, expected: "1 " });
    }

    #[test]
    fn test_rejects_truncated_line() {
        let err = validate_lines(25544, L1, &L2[..40]).unwrap_err();
        assert!(matches!(err, MalformedElementData::TooShort { line: 2, len: 40 }));
    }

    #[test]
    fn test_rejects_other_object() {
        let err = validate_lines(48274, L1, L2).unwrap_err();
        assert!(matches!(
            err,
            MalformedElementData::CatalogMismatch { line: 1, expected: 48274, .. }
        ));
    }

    #[test]
    fn test_catalog_number_columns() {
        assert_eq!(catalog_number(L1), Some("25544"));
        assert_eq!(catalog_number("1 "), None);
        assert!(is_element_line(L2));
        assert!(!is_element_line("ISS (ZARYA)"));
    }
}
