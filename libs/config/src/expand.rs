//! Brace expansion for `bot_id` entries.
//!
//! A literal ID entry may contain at most one `{...}` span. Inside the
//! braces: a comma-separated list (`{100,150,200}`) or an inclusive numeric
//! range (`{1..10}`). Expansion replaces the span with each element's
//! textual form, preserving the surrounding literal text.
//!
//! The membership list is a compact serialized encoding of a set; it is
//! materialized into explicit IDs once, at validation time.

use thiserror::Error;

/// Errors for a malformed brace expression.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExpandError {
    /// A `{` without a matching `}`, or a stray `}`.
    #[error("unbalanced braces")]
    UnbalancedBraces,

    /// More than one `{...}` span in a single entry.
    #[error("more than one brace expansion span")]
    MultipleSpans,

    /// `{}` with nothing inside.
    #[error("empty brace expansion span")]
    EmptySpan,

    /// A comma list with an empty element, e.g. `{1,,3}`.
    #[error("empty element in brace expansion list")]
    EmptyElement,

    /// A range endpoint that is not a non-negative integer.
    #[error("non-numeric range endpoint {endpoint:?}")]
    NonNumericRange { endpoint: String },

    /// A range with `start > end`.
    #[error("reversed range {start}..{end}")]
    ReversedRange { start: u64, end: u64 },
}

/// Expand one `bot_id` entry into its literal IDs.
///
/// An entry without braces expands to itself. Returns every malformed-brace
/// condition as a typed error.
pub fn expand_bot_id(entry: &str) -> Result<Vec<String>, ExpandError> {
    let Some(open) = entry.find('{') else {
        if entry.contains('}') {
            return Err(ExpandError::UnbalancedBraces);
        }
        return Ok(vec![entry.to_string()]);
    };

    let after_open = &entry[open + 1..];
    let Some(close_rel) = after_open.find('}') else {
        return Err(ExpandError::UnbalancedBraces);
    };

    let span = &after_open[..close_rel];
    let tail = &after_open[close_rel + 1..];

    if span.contains('{') || tail.contains('{') || tail.contains('}') {
        return Err(ExpandError::MultipleSpans);
    }
    if span.is_empty() {
        return Err(ExpandError::EmptySpan);
    }

    let head = &entry[..open];
    let elements = expand_span(span)?;

    Ok(elements
        .iter()
        .map(|e| format!("{head}{e}{tail}"))
        .collect())
}

/// Expand the text inside one brace span into its elements.
fn expand_span(span: &str) -> Result<Vec<String>, ExpandError> {
    if let Some((start, end)) = span.split_once("..") {
        let start = parse_endpoint(start)?;
        let end = parse_endpoint(end)?;
        if start > end {
            return Err(ExpandError::ReversedRange { start, end });
        }
        return Ok((start..=end).map(|n| n.to_string()).collect());
    }

    let mut elements = Vec::new();
    for element in span.split(',') {
        if element.is_empty() {
            return Err(ExpandError::EmptyElement);
        }
        elements.push(element.to_string());
    }
    Ok(elements)
}

fn parse_endpoint(raw: &str) -> Result<u64, ExpandError> {
    raw.parse::<u64>()
        .map_err(|_| ExpandError::NonNumericRange {
            endpoint: raw.to_string(),
        })
}
