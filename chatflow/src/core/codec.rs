//! Routing token wire codec.
//!
//! A token travels as the opaque callback identifier of an outbound action:
//! branch indices joined by [`DELIMITER`], e.g. `"1,0,2"`. Decoding is strict
//! because the string comes back from the platform and may be forged.

use crate::core::types::{BranchIndex, RoutingToken};
use crate::error::RoutingError;

/// Separator between branch indices on the wire.
pub const DELIMITER: char = ',';

/// Callback data limit of the reference transport, in bytes.
pub const DEFAULT_PAYLOAD_LIMIT_BYTES: usize = 64;

/// Join branch indices with [`DELIMITER`]. An empty token encodes to `""`.
pub fn encode(token: &RoutingToken) -> String {
    let mut buf = String::new();
    for (i, choice) in token.as_slice().iter().enumerate() {
        if i > 0 {
            buf.push(DELIMITER);
        }
        buf.push_str(&choice.to_string());
    }
    buf
}

/// Parse a wire token. `None` and `""` decode to an empty token.
///
/// Every segment must be a non-empty run of ASCII digits that fits in
/// `usize`; signs, whitespace, and empty segments are rejected.
pub fn decode(raw: Option<&str>) -> Result<RoutingToken, RoutingError> {
    let raw = match raw {
        None | Some("") => return Ok(RoutingToken::default()),
        Some(raw) => raw,
    };
    raw.split(DELIMITER)
        .map(|segment| parse_segment(raw, segment))
        .collect()
}

fn parse_segment(raw: &str, segment: &str) -> Result<BranchIndex, RoutingError> {
    if segment.is_empty() {
        return Err(RoutingError::malformed(raw, "empty segment"));
    }
    if !segment.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RoutingError::malformed(
            raw,
            format!("non-numeric segment '{segment}'"),
        ));
    }
    segment
        .parse::<usize>()
        .map(BranchIndex::new)
        .map_err(|_| RoutingError::malformed(raw, format!("segment '{segment}' out of range")))
}

/// Encode the token an outbound action carries: the choices consumed so far
/// followed by this action's own branch index.
pub fn stamp(prefix: &RoutingToken, branch: BranchIndex) -> String {
    let mut buf = encode(prefix);
    if !buf.is_empty() {
        buf.push(DELIMITER);
    }
    buf.push_str(&branch.to_string());
    buf
}

/// Fail when an encoded token would not fit the platform payload limit.
pub fn check_len(encoded: &str, limit: usize) -> Result<(), RoutingError> {
    if encoded.len() > limit {
        return Err(RoutingError::PayloadTooLarge {
            len: encoded.len(),
            limit,
        });
    }
    Ok(())
}
