//! Frame layout shared by every journal.
//!
//! ```text
//! +----------------+----------------+------------------+
//! | len (u32 LE)   | crc32 (u32 LE) | payload (len B)  |
//! +----------------+----------------+------------------+
//! ```

use crate::error::{StorageError, StorageResult};

/// Size of the per-frame header in bytes.
pub const FRAME_HEADER_SIZE: usize = 8;

/// Encodes a payload as a single frame.
#[must_use]
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let len = u32::try_from(payload.len()).unwrap_or(u32::MAX);
    let mut buf = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(&compute_crc32(payload).to_le_bytes());
    buf.extend_from_slice(payload);
    buf
}

/// Decodes every intact frame from `bytes`.
///
/// Returns the frames plus the length of the valid prefix. A trailing
/// frame that is cut short, or whose checksum fails, is treated as a torn
/// write and excluded from the valid prefix.
///
/// # Errors
///
/// Returns [`StorageError::Corrupted`] when a checksum fails on a frame
/// that is followed by more data.
pub fn decode_frames(bytes: &[u8]) -> StorageResult<(Vec<Vec<u8>>, usize)> {
    let mut frames = Vec::new();
    let mut cursor = 0usize;

    while cursor < bytes.len() {
        if cursor + FRAME_HEADER_SIZE > bytes.len() {
            break;
        }
        let len = u32::from_le_bytes([
            bytes[cursor],
            bytes[cursor + 1],
            bytes[cursor + 2],
            bytes[cursor + 3],
        ]) as usize;
        let crc = u32::from_le_bytes([
            bytes[cursor + 4],
            bytes[cursor + 5],
            bytes[cursor + 6],
            bytes[cursor + 7],
        ]);

        let start = cursor + FRAME_HEADER_SIZE;
        let Some(end) = start.checked_add(len).filter(|end| *end <= bytes.len()) else {
            break;
        };

        let payload = &bytes[start..end];
        if compute_crc32(payload) != crc {
            if end == bytes.len() {
                break;
            }
            return Err(StorageError::Corrupted(format!(
                "checksum mismatch in frame {} at offset {cursor}",
                frames.len()
            )));
        }

        frames.push(payload.to_vec());
        cursor = end;
    }

    Ok((frames, cursor))
}

/// Computes the IEEE CRC32 of `data`.
#[must_use]
pub fn compute_crc32(data: &[u8]) -> u32 {
    const TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut bit = 0;
            while bit < 8 {
                crc = if crc & 1 != 0 {
                    (crc >> 1) ^ 0xEDB8_8320
                } else {
                    crc >> 1
                };
                bit += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    !data.iter().fold(0xFFFF_FFFF_u32, |crc, &byte| {
        (crc >> 8) ^ TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize]
    })
}
