//! Binary frame format for byte-keyed change-log entries
//!
//! Every frame follows a consistent layout:
//! FrameHeader (24 bytes) + key_len(u32) + value_len(u32) + key_bytes + value_bytes
//!
//! The header carries the protocol version and the request-kind tag, so a
//! consumer built against an older revision rejects frames it cannot read
//! instead of misinterpreting them.

use crate::changelog::{ChangeItem, ChangeLogEntry};
use crate::error::{HeapError, HeapResult};
use crate::protocol::{RequestKind, PROTOCOL_VERSION};

/// Magic bytes identifying OrderHeap change-log frames: "OHCL" in ASCII
pub const MAGIC_ARRAY: [u8; 4] = [0x4F, 0x48, 0x43, 0x4C];

/// Maximum key size in bytes
pub const MAX_KEY_SIZE: usize = 1024;

/// Maximum value size in bytes (32MB)
pub const MAX_VALUE_SIZE: usize = 32 * 1024 * 1024;

/// Header size in bytes
pub const HEADER_SIZE: usize = 24;

/// Byte-keyed change-log entry, the only shape this codec frames.
pub type ByteEntry = ChangeLogEntry<Vec<u8>, Vec<u8>>;

/// Fixed-size header for each frame
///
/// Layout:
///   [0..4]   magic:    [u8;4] - "OHCL"
///   [4]      version:  u8     - PROTOCOL_VERSION
///   [5]      tag:      u8     - RequestKind of the change (Put or Delete)
///   [6..8]   reserved: [u8;2]
///   [8..16]  seq:      u64    - change-log sequence number
///   [16..20] length:   u32    - payload length in bytes
///   [20..24] checksum: u32    - CRC32C of payload bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub magic: [u8; 4],
    pub version: u8,
    pub tag: u8,
    pub seq: u64,
    pub length: u32,
    pub checksum: u32,
}

impl FrameHeader {
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.magic);
        buf[4] = self.version;
        buf[5] = self.tag;
        // [6..8] reserved, zeroed
        buf[8..16].copy_from_slice(&self.seq.to_le_bytes());
        buf[16..20].copy_from_slice(&self.length.to_le_bytes());
        buf[20..24].copy_from_slice(&self.checksum.to_le_bytes());
        buf
    }

    pub fn from_bytes(bytes: &[u8; HEADER_SIZE]) -> Self {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);
        let mut seq = [0u8; 8];
        seq.copy_from_slice(&bytes[8..16]);

        Self {
            magic,
            version: bytes[4],
            tag: bytes[5],
            seq: u64::from_le_bytes(seq),
            length: u32::from_le_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]),
            checksum: u32::from_le_bytes([bytes[20], bytes[21], bytes[22], bytes[23]]),
        }
    }
}

/// Serialize one entry into a complete frame
pub fn encode_entry(entry: &ByteEntry) -> HeapResult<Vec<u8>> {
    let (kind, key, value): (RequestKind, &[u8], &[u8]) = match &entry.item {
        ChangeItem::Put { index, item } => (RequestKind::Put, index.as_slice(), item.as_slice()),
        ChangeItem::Delete { index } => (RequestKind::Delete, index.as_slice(), b"".as_slice()),
    };

    // Validate input sizes BEFORE any allocation
    if key.len() > MAX_KEY_SIZE {
        return Err(HeapError::LimitExceeded { component: "key", size: key.len() as u64, limit: MAX_KEY_SIZE as u64 });
    }
    if value.len() > MAX_VALUE_SIZE {
        return Err(HeapError::LimitExceeded { component: "value", size: value.len() as u64, limit: MAX_VALUE_SIZE as u64 });
    }

    let mut payload = Vec::with_capacity(8 + key.len() + value.len());
    payload.extend_from_slice(&(key.len() as u32).to_le_bytes());
    payload.extend_from_slice(&(value.len() as u32).to_le_bytes());
    payload.extend_from_slice(key);
    payload.extend_from_slice(value);

    let header = FrameHeader {
        magic: MAGIC_ARRAY,
        version: PROTOCOL_VERSION,
        tag: kind.tag(),
        seq: entry.seq,
        length: payload.len() as u32,
        checksum: crc32c::crc32c(&payload),
    };

    let mut buffer = Vec::with_capacity(HEADER_SIZE + payload.len());
    buffer.extend_from_slice(&header.to_bytes());
    buffer.extend_from_slice(&payload);
    Ok(buffer)
}

/// Deserialize one frame from the start of `data`, returning the entry and
/// the number of bytes consumed.
pub fn decode_entry(data: &[u8]) -> HeapResult<(ByteEntry, usize)> {
    let header_bytes: &[u8; HEADER_SIZE] = data
        .get(..HEADER_SIZE)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| HeapError::Codec {
            offset: 0,
            reason: format!("frame too short: {} bytes, need at least {}", data.len(), HEADER_SIZE),
        })?;
    let header = FrameHeader::from_bytes(header_bytes);

    if header.magic != MAGIC_ARRAY {
        return Err(HeapError::Codec { offset: 0, reason: format!("bad magic {:02x?}", header.magic) });
    }
    if header.version != PROTOCOL_VERSION {
        return Err(HeapError::UnsupportedVersion { found: header.version, supported: PROTOCOL_VERSION });
    }
    let kind = RequestKind::from_tag(header.tag).ok_or(HeapError::UnknownTag(header.tag))?;

    let payload_end = HEADER_SIZE + header.length as usize;
    let payload = data.get(HEADER_SIZE..payload_end).ok_or_else(|| HeapError::Codec {
        offset: HEADER_SIZE as u64,
        reason: format!("torn frame: expected {} payload bytes, {} available", header.length, data.len() - HEADER_SIZE),
    })?;

    let computed = crc32c::crc32c(payload);
    if computed != header.checksum {
        return Err(HeapError::ChecksumMismatch { expected: header.checksum, actual: computed, offset: HEADER_SIZE as u64 });
    }

    if payload.len() < 8 {
        return Err(HeapError::Codec { offset: HEADER_SIZE as u64, reason: "payload too short for length fields".into() });
    }
    let key_len = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]) as usize;
    let value_len = u32::from_le_bytes([payload[4], payload[5], payload[6], payload[7]]) as usize;
    if key_len > MAX_KEY_SIZE || value_len > MAX_VALUE_SIZE || 8 + key_len + value_len != payload.len() {
        return Err(HeapError::Codec {
            offset: HEADER_SIZE as u64,
            reason: format!("payload of {} bytes does not hold key({}) + value({})", payload.len(), key_len, value_len),
        });
    }

    let key = payload[8..8 + key_len].to_vec();
    let value = payload[8 + key_len..].to_vec();
    let item = match kind {
        RequestKind::Put => ChangeItem::Put { index: key, item: value },
        RequestKind::Delete if value_len != 0 => {
            return Err(HeapError::Codec {
                offset: (HEADER_SIZE + 4) as u64,
                reason: format!("delete frame carries a {}-byte value", value_len),
            });
        }
        RequestKind::Delete => ChangeItem::Delete { index: key },
        other => {
            return Err(HeapError::Codec { offset: 5, reason: format!("{} is not a change-log kind", other) });
        }
    };

    Ok((ChangeLogEntry { seq: header.seq, item }, payload_end))
}

/// Encode a page of entries back to back.
pub fn encode_batch(entries: &[ByteEntry]) -> HeapResult<Vec<u8>> {
    let mut out = Vec::new();
    for entry in entries {
        out.extend_from_slice(&encode_entry(entry)?);
    }
    Ok(out)
}

/// Decode every frame in `data`.
pub fn decode_batch(mut data: &[u8]) -> HeapResult<Vec<ByteEntry>> {
    let mut entries = Vec::new();
    while !data.is_empty() {
        let (entry, used) = decode_entry(data)?;
        entries.push(entry);
        data = &data[used..];
    }
    Ok(entries)
}
