//! Wire framing for the device link.
//!
//! Outbound frames are a `$` followed by every value zero-padded to a fixed
//! number of decimal digits, with no separator and no terminator:
//!
//! ```text
//! values [1, 23], digits 2  ->  $0123
//! ```
//!
//! Inbound frames are text lines terminated by `\n`. The line is split on `#`
//! and the segment after the last `#` (normally just the line terminator) is
//! dropped, so `a#b#c\n` yields `["a", "b"]`.

use bytes::{Buf, BufMut, BytesMut};
use std::{io, str};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

/// First byte of every outbound frame.
pub const FRAME_START: char = '$';

/// Separator between inbound fields.
pub const FIELD_SEPARATOR: char = '#';

/// Terminator of an inbound line.
pub const LINE_TERMINATOR: u8 = b'\n';

/// Longest inbound line accepted by default, terminator excluded.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 1024;

/// Framing errors.
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("value {value} does not fit in {digits} digits")]
    Overflow { value: i64, digits: usize },
    #[error("line is not valid UTF-8: {0}")]
    Decode(#[from] str::Utf8Error),
    #[error("line longer than {max_length} bytes")]
    LineTooLong { max_length: usize },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Zero-pad `value` to exactly `digits` characters.
///
/// Negative values keep their sign in front and the sign counts toward the
/// width, so `-5` at three digits is `-05`. A value whose decimal form is
/// wider than `digits` is rejected rather than truncated.
pub fn pad_field(value: i64, digits: usize) -> Result<String, FrameError> {
    let field = format!("{:0width$}", value, width = digits);
    if field.len() > digits {
        return Err(FrameError::Overflow { value, digits });
    }
    Ok(field)
}

/// Build the text of an outbound frame.
pub fn encode_frame(values: &[i64], digits: usize) -> Result<String, FrameError> {
    let mut frame = String::with_capacity(1 + values.len() * digits);
    frame.push(FRAME_START);
    for &value in values {
        frame.push_str(&pad_field(value, digits)?);
    }
    Ok(frame)
}

/// Split an inbound line into its fields, dropping the final segment.
pub fn split_fields(line: &str) -> Vec<String> {
    let mut fields: Vec<String> = line.split(FIELD_SEPARATOR).map(str::to_owned).collect();
    fields.pop();
    fields
}

/// One inbound line as cut from the stream.
///
/// Text decoding is deferred to [`InboundLine::fields`] so that a bad line is
/// consumed from the stream and reported on its own, without failing the
/// codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundLine {
    /// Raw bytes, terminator included when one was received.
    Text(BytesMut),
    /// A line exceeded the maximum length and was discarded.
    TooLong { max_length: usize },
}

impl InboundLine {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            InboundLine::Text(bytes) => bytes,
            InboundLine::TooLong { .. } => &[],
        }
    }

    /// Decode the line and split it into fields.
    pub fn fields(&self) -> Result<Vec<String>, FrameError> {
        match self {
            InboundLine::Text(bytes) => Ok(split_fields(str::from_utf8(bytes)?)),
            InboundLine::TooLong { max_length } => Err(FrameError::LineTooLong {
                max_length: *max_length,
            }),
        }
    }
}

/// Codec for device link frames.
///
/// Inbound lines longer than `max_length` bytes (terminator excluded) are
/// reported once as [`InboundLine::TooLong`]; the rest of that line, up to the
/// next terminator, is then dropped.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    digits: usize,
    max_length: usize,
    // Bytes of the buffer already searched for a terminator.
    scanned: usize,
    discarding: bool,
}

impl FrameCodec {
    pub fn new(digits: usize) -> Self {
        Self::with_max_length(digits, DEFAULT_MAX_LINE_LENGTH)
    }

    pub fn with_max_length(digits: usize, max_length: usize) -> Self {
        Self {
            digits,
            max_length,
            scanned: 0,
            discarding: false,
        }
    }

    pub fn digits(&self) -> usize {
        self.digits
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }
}

impl Encoder<&[i64]> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, values: &[i64], dst: &mut BytesMut) -> Result<(), Self::Error> {
        // Render first so an overflowing field leaves dst untouched.
        let frame = encode_frame(values, self.digits)?;
        dst.reserve(frame.len());
        dst.put_slice(frame.as_bytes());
        Ok(())
    }
}

impl Decoder for FrameCodec {
    type Item = InboundLine;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let read_to = self.max_length.saturating_add(1).min(src.len());
            let found = src[self.scanned..read_to]
                .iter()
                .position(|&b| b == LINE_TERMINATOR)
                .map(|offset| self.scanned + offset);

            match (self.discarding, found) {
                (true, Some(end)) => {
                    src.advance(end + 1);
                    self.discarding = false;
                    self.scanned = 0;
                }
                (true, None) => {
                    src.advance(read_to);
                    self.scanned = 0;
                    if src.is_empty() {
                        return Ok(None);
                    }
                }
                (false, Some(end)) => {
                    let line = src.split_to(end + 1);
                    self.scanned = 0;
                    return Ok(Some(InboundLine::Text(line)));
                }
                (false, None) if src.len() > self.max_length => {
                    self.discarding = true;
                    self.scanned = 0;
                    return Ok(Some(InboundLine::TooLong {
                        max_length: self.max_length,
                    }));
                }
                (false, None) => {
                    self.scanned = read_to;
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        // An unterminated tail is still handed out as a final line, unless
        // it belongs to a line already reported as too long.
        self.scanned = 0;
        if self.discarding {
            self.discarding = false;
            src.clear();
            return Ok(None);
        }
        if src.is_empty() {
            Ok(None)
        } else {
            Ok(Some(InboundLine::Text(src.split())))
        }
    }
}
