//! IPTC-IIM inside a Photoshop image resource block (JPEG APP13).
//!
//! ```text
//! "Photoshop 3.0\0"
//! "8BIM" id:u16 name:pascal(even) size:u32 data(even) ...
//!                 id 0x0404 -> 0x1C record number length:u16 data ...
//! ```
//!
//! TIFF files carry the bare dataset stream (the part after `0x0404`) in an
//! IFD tag instead; see [`IptcBlock::from_datasets`].

use super::MetadataError;

pub const PHOTOSHOP_SIGNATURE: &[u8] = b"Photoshop 3.0\0";

const RESOURCE_SIGNATURE: [u8; 4] = *b"8BIM";
/// Other writers' resource signatures. Their resources are kept but not read.
const FOREIGN_SIGNATURES: [[u8; 4]; 4] = [*b"MeSa", *b"PHUT", *b"AgHg", *b"DCSR"];
const IPTC_RESOURCE_ID: u16 = 0x0404;
const TAG_MARKER: u8 = 0x1C;

const ENVELOPE_RECORD: u8 = 1;
const APPLICATION_RECORD: u8 = 2;
const CODED_CHARACTER_SET: u8 = 90;
const RECORD_VERSION: u8 = 0;
const KEYWORDS: u8 = 25;
const CAPTION: u8 = 120;

const UTF8_MARKER: &[u8] = b"\x1b%G";

/// One entry of a Photoshop resource block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageResource {
    pub signature: [u8; 4],
    pub id: u16,
    pub name: Vec<u8>,
    pub data: Vec<u8>,
}

pub fn parse_resources(block: &[u8]) -> Result<Vec<ImageResource>, MetadataError> {
    let mut resources = Vec::new();
    let mut pos = 0;

    while pos + 4 <= block.len() {
        let signature: [u8; 4] = read_array(block, pos)?;
        if signature != RESOURCE_SIGNATURE && !FOREIGN_SIGNATURES.contains(&signature) {
            // Trailing padding after the last resource.
            if block[pos..].iter().all(|&b| b == 0) {
                break;
            }
            return Err(MetadataError::Iptc(format!("bad resource signature at offset {}", pos)));
        }
        pos += 4;

        let id = u16::from_be_bytes(read_array(block, pos)?);
        pos += 2;

        let name_len = *block.get(pos).ok_or(MetadataError::Truncated(pos))? as usize;
        let name = block
            .get(pos + 1..pos + 1 + name_len)
            .ok_or(MetadataError::Truncated(pos))?
            .to_vec();
        pos += pad_even(1 + name_len);

        let size = u32::from_be_bytes(read_array(block, pos)?) as usize;
        pos += 4;
        let data = block
            .get(pos..pos + size)
            .ok_or(MetadataError::Truncated(pos))?
            .to_vec();
        pos += pad_even(size);

        resources.push(ImageResource { signature, id, name, data });
    }

    Ok(resources)
}

pub fn serialize_resources(resources: &[ImageResource]) -> Vec<u8> {
    let mut out = Vec::new();
    for resource in resources {
        out.extend_from_slice(&resource.signature);
        out.extend_from_slice(&resource.id.to_be_bytes());

        let name = &resource.name[..resource.name.len().min(255)];
        out.push(name.len() as u8);
        out.extend_from_slice(name);
        if (1 + name.len()) % 2 == 1 {
            out.push(0);
        }

        out.extend_from_slice(&(resource.data.len() as u32).to_be_bytes());
        out.extend_from_slice(&resource.data);
        if resource.data.len() % 2 == 1 {
            out.push(0);
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    pub record: u8,
    pub number: u8,
    pub data: Vec<u8>,
}

/// The IPTC datasets of one image, plus the resource block they came from.
#[derive(Debug, Clone, Default)]
pub struct IptcBlock {
    resources: Vec<ImageResource>,
    datasets: Vec<Dataset>,
}

impl IptcBlock {
    /// Parse the APP13 body (after the Photoshop signature).
    pub fn parse(app13_body: &[u8]) -> Result<Self, MetadataError> {
        let resources = parse_resources(app13_body)?;
        let datasets = match resources.iter().find(|r| is_iptc_resource(r)) {
            Some(resource) => parse_datasets(&resource.data)?,
            None => Vec::new(),
        };
        Ok(Self { resources, datasets })
    }

    /// A bare dataset stream, as stored in the TIFF IPTC tag.
    pub fn from_datasets(stream: &[u8]) -> Result<Self, MetadataError> {
        Ok(Self {
            resources: Vec::new(),
            datasets: parse_datasets(stream)?,
        })
    }

    /// The dataset stream alone, or `None` when there are no datasets.
    pub fn to_datasets(&self) -> Option<Vec<u8>> {
        if self.datasets.is_empty() {
            None
        } else {
            Some(serialize_datasets(&self.datasets))
        }
    }

    /// APP13 body with the IPTC resource replaced, or `None` if nothing is left.
    pub fn to_app13_body(&self) -> Option<Vec<u8>> {
        let mut resources = self.resources.clone();
        let iptc = serialize_datasets(&self.datasets);

        match resources.iter().position(is_iptc_resource) {
            Some(index) if self.datasets.is_empty() => {
                resources.remove(index);
            }
            Some(index) => resources[index].data = iptc,
            None if !self.datasets.is_empty() => resources.push(ImageResource {
                signature: RESOURCE_SIGNATURE,
                id: IPTC_RESOURCE_ID,
                name: Vec::new(),
                data: iptc,
            }),
            None => {}
        }

        if resources.is_empty() {
            None
        } else {
            Some(serialize_resources(&resources))
        }
    }

    pub fn keywords(&self) -> Option<Vec<String>> {
        let keywords: Vec<String> = self
            .values(APPLICATION_RECORD, KEYWORDS)
            .map(decode_text)
            .collect();
        if keywords.is_empty() {
            None
        } else {
            Some(keywords)
        }
    }

    pub fn caption(&self) -> Option<String> {
        self.values(APPLICATION_RECORD, CAPTION).next().map(decode_text)
    }

    /// Replace all keywords. Values are stored whole, whatever their length.
    pub fn set_keywords(&mut self, keywords: &[String]) {
        let values = keywords.iter().map(|k| k.as_bytes().to_vec()).collect();
        self.replace(KEYWORDS, values);
    }

    pub fn set_caption(&mut self, caption: Option<&str>) {
        let values = caption.map(|c| vec![c.as_bytes().to_vec()]).unwrap_or_default();
        self.replace(CAPTION, values);
    }

    fn values(&self, record: u8, number: u8) -> impl Iterator<Item = &[u8]> + '_ {
        self.datasets
            .iter()
            .filter(move |d| d.record == record && d.number == number)
            .map(|d| d.data.as_slice())
    }

    /// Swap every application dataset `number` for `values`, keeping position.
    fn replace(&mut self, number: u8, values: Vec<Vec<u8>>) {
        let is_target = |d: &Dataset| d.record == APPLICATION_RECORD && d.number == number;
        let mut index = self.datasets.iter().position(is_target).unwrap_or_else(|| {
            self.datasets
                .iter()
                .position(|d| d.record > APPLICATION_RECORD)
                .unwrap_or(self.datasets.len())
        });
        self.datasets.retain(|d| !is_target(d));

        if values.is_empty() {
            return;
        }

        // Headers are only ever inserted ahead of `index`.
        let before = self.datasets.len();
        self.ensure_headers();
        index += self.datasets.len() - before;
        let index = index.max(self.header_len()).min(self.datasets.len());

        for (offset, data) in values.into_iter().enumerate() {
            self.datasets.insert(
                index + offset,
                Dataset { record: APPLICATION_RECORD, number, data },
            );
        }
    }

    /// Mark the text as UTF-8 and give the application record a version.
    fn ensure_headers(&mut self) {
        match self
            .datasets
            .iter_mut()
            .find(|d| d.record == ENVELOPE_RECORD && d.number == CODED_CHARACTER_SET)
        {
            Some(charset) => charset.data = UTF8_MARKER.to_vec(),
            None => {
                let index = self
                    .datasets
                    .iter()
                    .position(|d| d.record > ENVELOPE_RECORD)
                    .unwrap_or(self.datasets.len());
                self.datasets.insert(
                    index,
                    Dataset {
                        record: ENVELOPE_RECORD,
                        number: CODED_CHARACTER_SET,
                        data: UTF8_MARKER.to_vec(),
                    },
                );
            }
        }

        let has_version = self
            .datasets
            .iter()
            .any(|d| d.record == APPLICATION_RECORD && d.number == RECORD_VERSION);
        if !has_version {
            let index = self
                .datasets
                .iter()
                .position(|d| d.record >= APPLICATION_RECORD)
                .unwrap_or(self.datasets.len());
            self.datasets.insert(
                index,
                Dataset { record: APPLICATION_RECORD, number: RECORD_VERSION, data: vec![0x00, 0x04] },
            );
        }
    }

    /// Envelope datasets plus the application record version.
    fn header_len(&self) -> usize {
        self.datasets
            .iter()
            .take_while(|d| {
                d.record < APPLICATION_RECORD
                    || (d.record == APPLICATION_RECORD && d.number == RECORD_VERSION)
            })
            .count()
    }
}

pub fn parse_datasets(block: &[u8]) -> Result<Vec<Dataset>, MetadataError> {
    let mut datasets = Vec::new();
    let mut pos = 0;

    while pos < block.len() && block[pos] == TAG_MARKER {
        if pos + 5 > block.len() {
            return Err(MetadataError::Truncated(pos));
        }
        let record = block[pos + 1];
        let number = block[pos + 2];
        let mut length = u16::from_be_bytes([block[pos + 3], block[pos + 4]]) as usize;
        pos += 5;

        // Extended dataset: the low bits give the size of the length field.
        if length & 0x8000 != 0 {
            let count = length & 0x7FFF;
            if count == 0 || count > 4 {
                return Err(MetadataError::Iptc(format!("unsupported extended length at offset {}", pos)));
            }
            let bytes = block.get(pos..pos + count).ok_or(MetadataError::Truncated(pos))?;
            length = bytes.iter().fold(0usize, |acc, &b| (acc << 8) | b as usize);
            pos += count;
        }

        let data = block
            .get(pos..pos + length)
            .ok_or(MetadataError::Truncated(pos))?
            .to_vec();
        pos += length;
        datasets.push(Dataset { record, number, data });
    }

    Ok(datasets)
}

pub fn serialize_datasets(datasets: &[Dataset]) -> Vec<u8> {
    let mut out = Vec::new();
    for dataset in datasets {
        out.extend_from_slice(&[TAG_MARKER, dataset.record, dataset.number]);
        if dataset.data.len() <= 0x7FFF {
            out.extend_from_slice(&(dataset.data.len() as u16).to_be_bytes());
        } else {
            out.extend_from_slice(&0x8004u16.to_be_bytes());
            out.extend_from_slice(&(dataset.data.len() as u32).to_be_bytes());
        }
        out.extend_from_slice(&dataset.data);
    }
    out
}

fn is_iptc_resource(resource: &ImageResource) -> bool {
    resource.signature == RESOURCE_SIGNATURE && resource.id == IPTC_RESOURCE_ID
}

/// UTF-8 when valid, otherwise Latin-1.
fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

fn pad_even(len: usize) -> usize {
    len + len % 2
}

fn read_array<const N: usize>(block: &[u8], pos: usize) -> Result<[u8; N], MetadataError> {
    block
        .get(pos..pos + N)
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or(MetadataError::Truncated(pos))
}
