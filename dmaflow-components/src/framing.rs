// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Length-prefixed frames on a byte stream.
//!
//! Each frame is a 4-byte big-endian length `L` followed by exactly `L`
//! payload bytes. The stream ends when the peer closes the connection
//! between two frames.

use std::io::{self, ErrorKind, Read, Write};

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};

use crate::types::{PipelineError, PipelineResult};

/// Size of the length prefix.
pub const HEADER_LEN: usize = 4;

/// Write one frame.
///
/// The payload must be shorter than 4 GiB.
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(ErrorKind::InvalidInput, "frame payload too large"))?;
    writer.write_u32::<BigEndian>(len)?;
    writer.write_all(payload)
}

/// Read into `buf` until it is full or the stream ends, returning the number
/// of bytes read.
fn read_until_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Read one frame of at most `max_frame` payload bytes into `payload`,
/// replacing its contents.
///
/// Returns `Ok(None)` if the stream ended cleanly before the frame and
/// [`PipelineError::TruncatedFrame`] if it ended part way through one. A
/// header announcing more than `max_frame` bytes is rejected before anything
/// is allocated.
pub fn read_frame<R: Read>(
    reader: &mut R,
    payload: &mut Vec<u8>,
    max_frame: usize,
) -> PipelineResult<Option<usize>> {
    let mut header = [0u8; HEADER_LEN];
    match read_until_full(reader, &mut header)? {
        0 => return Ok(None),
        HEADER_LEN => {}
        received => {
            return Err(PipelineError::TruncatedFrame {
                expected: HEADER_LEN,
                received,
            });
        }
    }

    let expected = BigEndian::read_u32(&header) as usize;
    if expected > max_frame {
        return Err(PipelineError::OversizedFrame {
            length: expected,
            limit: max_frame,
        });
    }
    payload.resize(expected, 0);
    let received = read_until_full(reader, payload)?;
    if received != expected {
        payload.truncate(received);
        return Err(PipelineError::TruncatedFrame { expected, received });
    }
    Ok(Some(expected))
}
