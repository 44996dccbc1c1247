//! JPEG marker segment splitting.
//!
//! Only the header segments before the first scan are parsed; the scan data
//! and everything after it are carried through untouched.

use super::MetadataError;

pub const APP1: u8 = 0xE1;
pub const APP13: u8 = 0xED;

const SOI: u8 = 0xD8;
const EOI: u8 = 0xD9;
const SOS: u8 = 0xDA;
const TEM: u8 = 0x01;

/// Largest payload a length-prefixed segment can hold.
pub const MAX_SEGMENT_PAYLOAD: usize = u16::MAX as usize - 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub marker: u8,
    pub payload: Vec<u8>,
}

impl Segment {
    fn is_standalone(&self) -> bool {
        self.marker == TEM || (0xD0..=0xD7).contains(&self.marker)
    }

    fn is_app(&self) -> bool {
        (0xE0..=0xEF).contains(&self.marker)
    }
}

#[derive(Debug, Clone)]
pub struct Jpeg {
    segments: Vec<Segment>,
    /// From the SOS (or EOI) marker to the end of the file.
    image_data: Vec<u8>,
}

impl Jpeg {
    pub fn parse(bytes: &[u8]) -> Result<Self, MetadataError> {
        if bytes.len() < 4 || bytes[0] != 0xFF || bytes[1] != SOI {
            return Err(MetadataError::NotJpeg);
        }

        let mut segments = Vec::new();
        let mut pos = 2;
        loop {
            if pos >= bytes.len() {
                return Err(MetadataError::Truncated(pos));
            }
            if bytes[pos] != 0xFF {
                return Err(MetadataError::Corrupt(format!("expected marker at offset {}", pos)));
            }
            let marker_start = pos;
            // Any number of 0xFF fill bytes may precede a marker.
            while pos < bytes.len() && bytes[pos] == 0xFF {
                pos += 1;
            }
            if pos >= bytes.len() {
                return Err(MetadataError::Truncated(pos));
            }
            let marker = bytes[pos];
            pos += 1;

            if marker == SOS || marker == EOI {
                return Ok(Self {
                    segments,
                    image_data: bytes[marker_start..].to_vec(),
                });
            }

            let segment = Segment { marker, payload: Vec::new() };
            if segment.is_standalone() {
                segments.push(segment);
                continue;
            }

            if pos + 2 > bytes.len() {
                return Err(MetadataError::Truncated(pos));
            }
            let length = u16::from_be_bytes([bytes[pos], bytes[pos + 1]]) as usize;
            if length < 2 || pos + length > bytes.len() {
                return Err(MetadataError::Truncated(pos));
            }
            segments.push(Segment {
                marker,
                payload: bytes[pos + 2..pos + length].to_vec(),
            });
            pos += length;
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, MetadataError> {
        let header_len: usize = self.segments.iter().map(|s| s.payload.len() + 4).sum();
        let mut out = Vec::with_capacity(2 + header_len + self.image_data.len());
        out.extend_from_slice(&[0xFF, SOI]);

        for segment in &self.segments {
            out.extend_from_slice(&[0xFF, segment.marker]);
            if segment.is_standalone() {
                continue;
            }
            if segment.payload.len() > MAX_SEGMENT_PAYLOAD {
                return Err(MetadataError::SegmentTooLarge(segment.payload.len()));
            }
            let length = (segment.payload.len() + 2) as u16;
            out.extend_from_slice(&length.to_be_bytes());
            out.extend_from_slice(&segment.payload);
        }

        out.extend_from_slice(&self.image_data);
        Ok(out)
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Body of the first `marker` segment whose payload starts with `signature`.
    pub fn app_segment(&self, marker: u8, signature: &[u8]) -> Option<&[u8]> {
        self.segments
            .iter()
            .find(|s| s.marker == marker && s.payload.starts_with(signature))
            .map(|s| &s.payload[signature.len()..])
    }

    /// Replace, insert or (with `None`) remove a signed APP segment.
    ///
    /// New segments go after the leading run of APP segments so EXIF stays first.
    pub fn set_app_segment(&mut self, marker: u8, signature: &[u8], body: Option<Vec<u8>>) {
        let existing = self
            .segments
            .iter()
            .position(|s| s.marker == marker && s.payload.starts_with(signature));

        match (existing, body) {
            (Some(index), Some(body)) => {
                self.segments[index].payload = [signature, body.as_slice()].concat();
            }
            (Some(index), None) => {
                self.segments.remove(index);
            }
            (None, Some(body)) => {
                let index = self
                    .segments
                    .iter()
                    .position(|s| !s.is_app())
                    .unwrap_or(self.segments.len());
                self.segments.insert(
                    index,
                    Segment { marker, payload: [signature, body.as_slice()].concat() },
                );
            }
            (None, None) => {}
        }
    }
}
