//! Wire encoding and decoding of RIPv2-shaped advertisement packets.
//!
//! ```text
//! Packet: command(1) version(1) sender_id(2) entry[1..=25]
//! Entry:  family(2) zero(2) dest_id(4) zero(8) metric(4)     -- 20 bytes
//! ```
//! All integers are big-endian.

use crate::error::CodecError;

/// Address-family id used for every outbound entry (RFC 2453's AFI for IPv4).
pub const ADDRESS_FAMILY_ID: u16 = 2;

const ENTRY_LEN: usize = 20;
const HEADER_LEN: usize = 4;
const MAX_ENTRIES: usize = 25;

/// RIP command byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    Request = 1,
    Response = 2,
}

impl Command {
    fn from_u8(v: u8) -> Option<Command> {
        match v {
            1 => Some(Command::Request),
            2 => Some(Command::Response),
            _ => None,
        }
    }
}

/// A single decoded entry: `(family_id, dest_id, metric)`.
pub type DecodedEntry = (u16, u32, u32);

/// An entry to be encoded: destination router id and metric. The family id
/// is always [`ADDRESS_FAMILY_ID`] on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutEntry {
    pub dest_id: u32,
    pub metric: u32,
}

fn check_width(value: u64, bits: u32) -> Result<(), CodecError> {
    if value >= 1u64 << bits {
        Err(CodecError::IntegerRange { value, bits })
    } else {
        Ok(())
    }
}

/// Encode a response/request packet. Fails if `entries` is empty or has more
/// than 25 elements, or if any field overflows its wire width.
pub fn encode(command: Command, version: u8, sender_id: u16, entries: &[OutEntry]) -> Result<Vec<u8>, CodecError> {
    if entries.is_empty() || entries.len() > MAX_ENTRIES {
        return Err(CodecError::EntryCount(entries.len()));
    }
    for e in entries {
        check_width(e.dest_id as u64, 32)?;
        check_width(e.metric as u64, 32)?;
    }

    let mut buf = Vec::with_capacity(HEADER_LEN + ENTRY_LEN * entries.len());
    buf.push(command as u8);
    buf.push(version);
    buf.extend_from_slice(&sender_id.to_be_bytes());
    for e in entries {
        buf.extend_from_slice(&ADDRESS_FAMILY_ID.to_be_bytes());
        buf.extend_from_slice(&[0u8; 2]);
        buf.extend_from_slice(&e.dest_id.to_be_bytes());
        buf.extend_from_slice(&[0u8; 8]);
        buf.extend_from_slice(&e.metric.to_be_bytes());
    }
    Ok(buf)
}

/// Decode a packet into its header fields and entries. Only checks shape
/// (length); version mismatch and unknown senders are the router core's
/// concern, not the codec's.
pub fn decode(bytes: &[u8]) -> Result<(u8, u8, u16, Vec<DecodedEntry>), CodecError> {
    if bytes.len() < HEADER_LEN || (bytes.len() - HEADER_LEN) % ENTRY_LEN != 0 {
        return Err(CodecError::PacketTruncated { len: bytes.len() });
    }
    let command = bytes[0];
    let version = bytes[1];
    let sender_id = u16::from_be_bytes([bytes[2], bytes[3]]);

    let mut entries = Vec::new();
    let mut pos = HEADER_LEN;
    while pos < bytes.len() {
        entries.push(decode_entry(&bytes[pos..pos + ENTRY_LEN]));
        pos += ENTRY_LEN;
    }
    Ok((command, version, sender_id, entries))
}

fn decode_entry(entry: &[u8]) -> DecodedEntry {
    let family_id = u16::from_be_bytes([entry[0], entry[1]]);
    let dest_id = u32::from_be_bytes([entry[4], entry[5], entry[6], entry[7]]);
    let metric = u32::from_be_bytes([entry[16], entry[17], entry[18], entry[19]]);
    (family_id, dest_id, metric)
}

/// Whether an entry's reserved regions are all-zero, one of the checks the
/// router core performs before trusting a decoded packet.
pub fn entry_reserved_is_zero(entry: &[u8]) -> bool {
    entry.len() == ENTRY_LEN
        && entry[2..4].iter().all(|&b| b == 0)
        && entry[8..16].iter().all(|&b| b == 0)
}

impl Command {
    /// Parse the wire byte, used by the router core to decide whether to
    /// even look at a packet further.
    pub fn parse(byte: u8) -> Option<Command> {
        Command::from_u8(byte)
    }
}
