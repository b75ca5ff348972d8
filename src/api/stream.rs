use super::logging::emit_frame_decode_error;
use crate::error::StreamError;
use crate::types::Chunk;
use crate::util::media_type;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";
pub const MSGPACK_CONTENT_TYPE: &str = "application/x-msgpack";

const LENGTH_PREFIX_LEN: usize = 4;
/// Binary frames above this size are treated as corrupt and skipped.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Wire encoding of a stream. Both ends of one session must agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// Newline-delimited JSON, one chunk per line.
    Text,
    /// `[u32 big-endian length][MessagePack map]` per chunk.
    #[default]
    Binary,
}

impl WireFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            WireFormat::Text => NDJSON_CONTENT_TYPE,
            WireFormat::Binary => MSGPACK_CONTENT_TYPE,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WireFormat::Text => "ndjson",
            WireFormat::Binary => "msgpack",
        }
    }

    pub fn from_content_type(content_type: &str) -> Result<Self, StreamError> {
        match media_type(content_type).as_str() {
            NDJSON_CONTENT_TYPE => Ok(WireFormat::Text),
            MSGPACK_CONTENT_TYPE => Ok(WireFormat::Binary),
            _ => Err(StreamError::UnsupportedContentType(content_type.to_string())),
        }
    }
}

impl fmt::Display for WireFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WireFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ndjson" | "text" | "json" => Ok(WireFormat::Text),
            "msgpack" | "binary" => Ok(WireFormat::Binary),
            other => Err(format!(
                "unknown wire format '{other}' (expected ndjson or msgpack)"
            )),
        }
    }
}

/// Encodes one chunk as a complete frame.
pub fn encode_frame(chunk: &Chunk, format: WireFormat) -> Result<Bytes, StreamError> {
    match format {
        WireFormat::Text => {
            let mut line =
                serde_json::to_vec(chunk).map_err(|e| StreamError::Encode(e.to_string()))?;
            line.push(b'\n');
            Ok(Bytes::from(line))
        }
        WireFormat::Binary => {
            let payload =
                rmp_serde::to_vec_named(chunk).map_err(|e| StreamError::Encode(e.to_string()))?;
            let len = u32::try_from(payload.len())
                .ok()
                .filter(|len| *len as usize <= MAX_FRAME_LEN)
                .ok_or_else(|| {
                    StreamError::Encode(format!("frame of {} bytes is too large", payload.len()))
                })?;
            let mut frame = BytesMut::with_capacity(LENGTH_PREFIX_LEN + payload.len());
            frame.put_u32(len);
            frame.extend_from_slice(&payload);
            Ok(frame.freeze())
        }
    }
}

/// Incremental decoder that turns arbitrarily split reads back into chunks.
///
/// Malformed frames are logged and skipped so one bad frame never stalls the
/// stream.
#[derive(Debug)]
pub enum FrameDecoder {
    Text(TextFrameDecoder),
    Binary(BinaryFrameDecoder),
}

impl FrameDecoder {
    pub fn new(format: WireFormat) -> Self {
        match format {
            WireFormat::Text => FrameDecoder::Text(TextFrameDecoder::default()),
            WireFormat::Binary => FrameDecoder::Binary(BinaryFrameDecoder::default()),
        }
    }

    pub fn format(&self) -> WireFormat {
        match self {
            FrameDecoder::Text(_) => WireFormat::Text,
            FrameDecoder::Binary(_) => WireFormat::Binary,
        }
    }

    pub fn process(&mut self, bytes: &[u8]) -> Vec<Chunk> {
        match self {
            FrameDecoder::Text(decoder) => decoder.process(bytes),
            FrameDecoder::Binary(decoder) => decoder.process(bytes),
        }
    }

    /// Ends the stream, returning how many buffered bytes belonged to an
    /// unterminated trailing frame and were discarded.
    pub fn finish(&mut self) -> usize {
        match self {
            FrameDecoder::Text(decoder) => decoder.finish(),
            FrameDecoder::Binary(decoder) => decoder.finish(),
        }
    }

    pub fn skipped_frames(&self) -> usize {
        match self {
            FrameDecoder::Text(decoder) => decoder.skipped_frames,
            FrameDecoder::Binary(decoder) => decoder.skipped_frames,
        }
    }

    pub fn buffered_len(&self) -> usize {
        match self {
            FrameDecoder::Text(decoder) => decoder.buffer.len(),
            FrameDecoder::Binary(decoder) => decoder.buffer.len(),
        }
    }
}

#[derive(Debug, Default)]
pub struct TextFrameDecoder {
    buffer: Vec<u8>,
    /// Prefix of `buffer` already searched for a newline.
    scanned: usize,
    /// Dropping the rest of an oversized line up to its newline.
    discarding: bool,
    skipped_frames: usize,
}

impl TextFrameDecoder {
    pub fn process(&mut self, bytes: &[u8]) -> Vec<Chunk> {
        self.buffer.extend_from_slice(bytes);
        let mut chunks = Vec::new();
        let mut start = 0;

        loop {
            let search_from = self.scanned.max(start);
            let Some(offset) = self.buffer[search_from..].iter().position(|b| *b == b'\n') else {
                self.scanned = self.buffer.len();
                break;
            };
            let line_start = start;
            let line_end = search_from + offset;
            start = line_end + 1;
            self.scanned = start;

            if self.discarding {
                self.discarding = false;
                continue;
            }

            let line = &self.buffer[line_start..line_end];
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            if line.len() > MAX_FRAME_LEN {
                self.skipped_frames += 1;
                emit_frame_decode_error(
                    WireFormat::Text,
                    &[],
                    &format_args!("line length {} exceeds {MAX_FRAME_LEN}", line.len()),
                );
                continue;
            }

            match serde_json::from_slice::<Chunk>(line) {
                Ok(chunk) => chunks.push(chunk),
                Err(e) => {
                    self.skipped_frames += 1;
                    emit_frame_decode_error(WireFormat::Text, line, &e);
                }
            }
        }

        if start > 0 {
            self.buffer.drain(..start);
            self.scanned -= start;
        }

        if !self.discarding && self.buffer.len() > MAX_FRAME_LEN {
            self.discarding = true;
            self.skipped_frames += 1;
            emit_frame_decode_error(
                WireFormat::Text,
                &[],
                &format_args!("unterminated line exceeds {MAX_FRAME_LEN} bytes"),
            );
        }
        if self.discarding {
            self.buffer.clear();
            self.scanned = 0;
        }

        chunks
    }

    pub fn finish(&mut self) -> usize {
        let leftover = std::mem::take(&mut self.buffer);
        self.scanned = 0;
        self.discarding = false;
        if leftover.iter().all(u8::is_ascii_whitespace) {
            0
        } else {
            leftover.len()
        }
    }
}

#[derive(Debug, Default)]
pub struct BinaryFrameDecoder {
    buffer: BytesMut,
    /// Bytes still to throw away from an oversized frame.
    discard_remaining: usize,
    skipped_frames: usize,
}

impl BinaryFrameDecoder {
    pub fn process(&mut self, bytes: &[u8]) -> Vec<Chunk> {
        self.buffer.extend_from_slice(bytes);
        let mut chunks = Vec::new();

        loop {
            if self.discard_remaining > 0 {
                let n = self.discard_remaining.min(self.buffer.len());
                self.buffer.advance(n);
                self.discard_remaining -= n;
                if self.discard_remaining > 0 {
                    break;
                }
            }

            if self.buffer.len() < LENGTH_PREFIX_LEN {
                break;
            }

            let len = u32::from_be_bytes([
                self.buffer[0],
                self.buffer[1],
                self.buffer[2],
                self.buffer[3],
            ]) as usize;

            if len > MAX_FRAME_LEN {
                self.buffer.advance(LENGTH_PREFIX_LEN);
                self.discard_remaining = len;
                self.skipped_frames += 1;
                emit_frame_decode_error(
                    WireFormat::Binary,
                    &[],
                    &format_args!("declared frame length {len} exceeds {MAX_FRAME_LEN}"),
                );
                continue;
            }

            if self.buffer.len() < LENGTH_PREFIX_LEN + len {
                break;
            }

            self.buffer.advance(LENGTH_PREFIX_LEN);
            let payload = self.buffer.split_to(len);
            match rmp_serde::from_slice::<Chunk>(&payload) {
                Ok(chunk) => chunks.push(chunk),
                Err(e) => {
                    self.skipped_frames += 1;
                    emit_frame_decode_error(WireFormat::Binary, &payload, &e);
                }
            }
        }

        chunks
    }

    pub fn finish(&mut self) -> usize {
        let leftover = self.buffer.len();
        self.buffer.clear();
        self.discard_remaining = 0;
        leftover
    }
}
