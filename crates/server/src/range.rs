// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! `Range` header parsing for single byte ranges.
//!
//! The parser is a pure function of the header value and the asset size, so
//! the clamping rules can be tested without a server.

use std::fmt;

use snafu::{Snafu, ensure};

/// An inclusive byte span of an asset. Always satisfies
/// `start <= end < size` for the size it was resolved against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end:   u64,
}

impl ByteRange {
    /// Number of bytes in the span.
    #[must_use]
    pub const fn len(&self) -> u64 { self.end - self.start + 1 }

    #[must_use]
    pub const fn is_empty(&self) -> bool { false }

    /// `Content-Range` value for a `206` response.
    #[must_use]
    pub fn content_range(&self, size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, size)
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

#[derive(Debug, Snafu, PartialEq, Eq)]
#[snafu(visibility(pub))]
pub enum RangeError {
    /// The header cannot be honoured as a single byte range. Callers ignore
    /// the header and serve the whole asset.
    #[snafu(display("Unsupported or malformed range {header:?}: {reason}"))]
    Malformed {
        header: String,
        reason: &'static str,
    },

    /// The range starts at or beyond the end of the asset.
    #[snafu(display("Range {header:?} not satisfiable for size {size}"))]
    NotSatisfiable { header: String, size: u64 },
}

/// Resolve a `Range` header against an asset of `size` bytes.
///
/// - `None` header: `Ok(None)`, serve the full body.
/// - `bytes=S-E`: `E` is clamped to `size - 1`.
/// - `bytes=S-`: runs to the end of the asset.
/// - `bytes=-N`: the last `N` bytes.
///
/// `S >= size` and `bytes=-0` are [`RangeError::NotSatisfiable`]. Other units,
/// multiple ranges, `E < S` and garbage are [`RangeError::Malformed`].
pub fn parse_range(header: Option<&str>, size: u64) -> Result<Option<ByteRange>, RangeError> {
    let Some(header) = header else {
        return Ok(None);
    };
    let malformed = |reason| RangeError::Malformed {
        header: header.to_string(),
        reason,
    };

    let (unit, spec) = header.split_once('=').ok_or_else(|| malformed("missing '='"))?;
    if !unit.trim().eq_ignore_ascii_case("bytes") {
        return Err(malformed("unit is not bytes"));
    }
    if spec.contains(',') {
        return Err(malformed("multiple ranges"));
    }
    let (first, last) = spec
        .trim()
        .split_once('-')
        .ok_or_else(|| malformed("missing '-'"))?;
    let (first, last) = (first.trim(), last.trim());

    if first.is_empty() {
        let suffix = parse_offset(last).ok_or_else(|| malformed("invalid suffix length"))?;
        ensure!(
            suffix > 0 && size > 0,
            NotSatisfiableSnafu { header, size }
        );
        return Ok(Some(ByteRange {
            start: size.saturating_sub(suffix),
            end:   size - 1,
        }));
    }

    let start = parse_offset(first).ok_or_else(|| malformed("invalid first byte position"))?;
    let end = if last.is_empty() {
        None
    } else {
        let end = parse_offset(last).ok_or_else(|| malformed("invalid last byte position"))?;
        if end < start {
            return Err(malformed("last byte position before first"));
        }
        Some(end)
    };

    ensure!(start < size, NotSatisfiableSnafu { header, size });

    let end = end.map_or(size - 1, |end| end.min(size - 1));
    Ok(Some(ByteRange { start, end }))
}

/// Digits only. Positions past `u64::MAX` saturate, so they still clamp or
/// fail as unsatisfiable instead of looking malformed.
fn parse_offset(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(s.parse().unwrap_or(u64::MAX))
}
