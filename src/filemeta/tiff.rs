//! Metadata tags in the first IFD of a classic (32-bit offset) TIFF file.
//!
//! Edits never move existing data. Replacement values and a rewritten IFD0
//! are appended to the file and the header is pointed at the new IFD, so
//! every offset the old directory held stays valid.

use std::collections::BTreeMap;

use super::MetadataError;

/// IPTC-NAA dataset stream.
pub const IPTC_TAG: u16 = 33723;
/// XMP packet.
pub const XMP_TAG: u16 = 700;

const TYPE_BYTE: u16 = 1;
const TYPE_UNDEFINED: u16 = 7;

const HEADER_LEN: usize = 8;
const ENTRY_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    fn u16(self, bytes: [u8; 2]) -> u16 {
        match self {
            ByteOrder::Little => u16::from_le_bytes(bytes),
            ByteOrder::Big => u16::from_be_bytes(bytes),
        }
    }

    fn u32(self, bytes: [u8; 4]) -> u32 {
        match self {
            ByteOrder::Little => u32::from_le_bytes(bytes),
            ByteOrder::Big => u32::from_be_bytes(bytes),
        }
    }

    fn u16_bytes(self, value: u16) -> [u8; 2] {
        match self {
            ByteOrder::Little => value.to_le_bytes(),
            ByteOrder::Big => value.to_be_bytes(),
        }
    }

    fn u32_bytes(self, value: u32) -> [u8; 4] {
        match self {
            ByteOrder::Little => value.to_le_bytes(),
            ByteOrder::Big => value.to_be_bytes(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
    tag: u16,
    kind: u16,
    count: u32,
    /// The value itself when it fits in four bytes, otherwise its offset.
    value: [u8; 4],
}

#[derive(Debug, Clone)]
pub struct Tiff {
    bytes: Vec<u8>,
    order: ByteOrder,
    entries: Vec<Entry>,
    next_ifd: u32,
    /// Tags to replace (`Some`) or drop (`None`) on save.
    pending: BTreeMap<u16, Option<(u16, Vec<u8>)>>,
}

impl Tiff {
    pub fn parse(bytes: &[u8]) -> Result<Self, MetadataError> {
        let order = match bytes.get(..4) {
            Some(b"II*\0") => ByteOrder::Little,
            Some(b"MM\0*") => ByteOrder::Big,
            Some(b"II+\0") | Some(b"MM\0+") => {
                return Err(MetadataError::UnsupportedFormat("BigTIFF".to_string()))
            }
            _ => return Err(MetadataError::Corrupt("missing TIFF header".to_string())),
        };

        let ifd0 = order.u32(read_array(bytes, 4)?) as usize;
        if ifd0 < HEADER_LEN {
            return Err(MetadataError::Corrupt(format!("IFD0 offset {} inside header", ifd0)));
        }
        let count = order.u16(read_array(bytes, ifd0)?) as usize;

        let mut entries = Vec::with_capacity(count);
        for index in 0..count {
            let pos = ifd0 + 2 + index * ENTRY_LEN;
            entries.push(Entry {
                tag: order.u16(read_array(bytes, pos)?),
                kind: order.u16(read_array(bytes, pos + 2)?),
                count: order.u32(read_array(bytes, pos + 4)?),
                value: read_array(bytes, pos + 8)?,
            });
        }
        let next_ifd = order.u32(read_array(bytes, ifd0 + 2 + count * ENTRY_LEN)?);

        Ok(Self {
            bytes: bytes.to_vec(),
            order,
            entries,
            next_ifd,
            pending: BTreeMap::new(),
        })
    }

    /// Raw bytes of an IFD0 tag, ignoring unsaved edits.
    pub fn field(&self, tag: u16) -> Result<Option<&[u8]>, MetadataError> {
        let Some(entry) = self.entries.iter().find(|e| e.tag == tag) else {
            return Ok(None);
        };
        let size = type_size(entry.kind)?
            .checked_mul(entry.count as usize)
            .ok_or_else(|| MetadataError::Corrupt(format!("tag {} is too large", tag)))?;
        if size <= 4 {
            return Ok(Some(&entry.value[..size]));
        }
        let offset = self.order.u32(entry.value) as usize;
        self.bytes
            .get(offset..offset + size)
            .map(Some)
            .ok_or(MetadataError::Truncated(offset))
    }

    pub fn set_iptc(&mut self, stream: Option<Vec<u8>>) {
        self.pending.insert(IPTC_TAG, stream.map(|data| (TYPE_UNDEFINED, data)));
    }

    pub fn set_xmp(&mut self, packet: Option<Vec<u8>>) {
        self.pending.insert(XMP_TAG, packet.map(|data| (TYPE_BYTE, data)));
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, MetadataError> {
        if self.pending.is_empty() {
            return Ok(self.bytes.clone());
        }

        let mut out = self.bytes.clone();
        let mut entries: Vec<Entry> = self
            .entries
            .iter()
            .filter(|e| !self.pending.contains_key(&e.tag))
            .copied()
            .collect();

        for (&tag, replacement) in &self.pending {
            let Some((kind, data)) = replacement else {
                continue;
            };
            let mut value = [0u8; 4];
            if data.len() <= 4 {
                value[..data.len()].copy_from_slice(data);
            } else {
                pad_to_word(&mut out);
                value = self.order.u32_bytes(offset_of(&out)?);
                out.extend_from_slice(data);
            }
            let count = u32::try_from(data.len()).map_err(|_| MetadataError::SegmentTooLarge(data.len()))?;
            entries.push(Entry { tag, kind: *kind, count, value });
        }
        entries.sort_by_key(|e| e.tag);

        pad_to_word(&mut out);
        let ifd0 = offset_of(&out)?;
        let count = u16::try_from(entries.len())
            .map_err(|_| MetadataError::Corrupt("too many IFD entries".to_string()))?;
        out.extend_from_slice(&self.order.u16_bytes(count));
        for entry in &entries {
            out.extend_from_slice(&self.order.u16_bytes(entry.tag));
            out.extend_from_slice(&self.order.u16_bytes(entry.kind));
            out.extend_from_slice(&self.order.u32_bytes(entry.count));
            out.extend_from_slice(&entry.value);
        }
        out.extend_from_slice(&self.order.u32_bytes(self.next_ifd));

        out[4..HEADER_LEN].copy_from_slice(&self.order.u32_bytes(ifd0));
        Ok(out)
    }
}

fn type_size(kind: u16) -> Result<usize, MetadataError> {
    match kind {
        1 | 2 | 6 | 7 => Ok(1),
        3 | 8 => Ok(2),
        4 | 9 | 11 | 13 => Ok(4),
        5 | 10 | 12 => Ok(8),
        other => Err(MetadataError::Corrupt(format!("unknown TIFF field type {}", other))),
    }
}

fn pad_to_word(out: &mut Vec<u8>) {
    if out.len() % 2 == 1 {
        out.push(0);
    }
}

fn offset_of(out: &[u8]) -> Result<u32, MetadataError> {
    u32::try_from(out.len()).map_err(|_| MetadataError::SegmentTooLarge(out.len()))
}

fn read_array<const N: usize>(bytes: &[u8], pos: usize) -> Result<[u8; N], MetadataError> {
    bytes
        .get(pos..pos + N)
        .and_then(|slice| slice.try_into().ok())
        .ok_or(MetadataError::Truncated(pos))
}
