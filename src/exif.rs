//! Read capture metadata from the EXIF block of JPEGs and
//! carry it over to regenerated outputs.
//!
//! Only enough of the TIFF structure is parsed to find the
//! capture timestamp: `DateTimeOriginal` from the Exif
//! sub-IFD, falling back to `DateTime` in IFD0.
use std::{fs::read, io::Cursor, path::Path};

use anyhow::{anyhow, bail, ensure, Context, Result};
use byteordered::{ByteOrdered, Endianness};
use chrono::NaiveDateTime;
use img_parts::{jpeg::Jpeg, Bytes, ImageEXIF};

const EXIF_PREFIX: &[u8] = b"Exif\0\0";
const TAG_DATE_TIME: u16 = 0x0132;
const TAG_EXIF_IFD: u16 = 0x8769;
const TAG_DATE_TIME_ORIGINAL: u16 = 0x9003;
const TYPE_ASCII: u16 = 2;
const DATE_TIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Capture timestamp of a JPEG file. `Ok(None)` if the file
/// has no EXIF block or the block has no usable timestamp.
pub fn capture_timestamp(path: &Path) -> Result<Option<NaiveDateTime>> {
    let jpeg = read_jpeg(path)?;
    match jpeg.exif() {
        Some(exif) => timestamp_from_tiff(strip_prefix(&exif)),
        None => Ok(None),
    }
}

/// Re-encode `encoded` (a JPEG) with the EXIF block of the
/// JPEG at `source`. Returns `encoded` unchanged if the
/// source has none.
pub fn with_exif_of(encoded: Vec<u8>, source: &Path) -> Result<Vec<u8>> {
    let exif = match read_jpeg(source)?.exif() {
        Some(exif) => exif,
        None => return Ok(encoded),
    };

    let mut target = Jpeg::from_bytes(Bytes::from(encoded))
        .map_err(|e| anyhow!("could not parse encoded jpeg: {}", e))?;
    target.set_exif(Some(exif));

    let mut out = Vec::new();
    target.encoder().write_to(&mut out)?;
    Ok(out)
}

pub(crate) fn read_jpeg(path: &Path) -> Result<Jpeg> {
    let bytes = read(path).with_context(|| format!("reading {}", path.display()))?;
    Jpeg::from_bytes(Bytes::from(bytes))
        .map_err(|e| anyhow!("could not parse jpeg {}: {}", path.display(), e))
}

fn strip_prefix(exif: &[u8]) -> &[u8] {
    exif.strip_prefix(EXIF_PREFIX).unwrap_or(exif)
}

/// Find the capture timestamp in a TIFF-structured EXIF
/// block.
pub fn timestamp_from_tiff(data: &[u8]) -> Result<Option<NaiveDateTime>> {
    ensure!(data.len() >= 8, "exif block too short: {} bytes", data.len());
    let endianness = match &data[0..2] {
        b"II" => Endianness::Little,
        b"MM" => Endianness::Big,
        other => bail!("unexpected tiff byte order marker: {:?}", other),
    };

    let mut rdr = ByteOrdered::runtime(Cursor::new(&data[2..8]), endianness);
    let magic = rdr.read_u16()?;
    ensure!(magic == 42, "unexpected tiff magic: {}", magic);
    let ifd0 = rdr.read_u32()? as usize;

    let entries = read_ifd(data, endianness, ifd0).context("parsing IFD0")?;

    let exif_ifd = entries.iter().find(|e| e.tag == TAG_EXIF_IFD);
    if let Some(ptr) = exif_ifd {
        let sub = read_ifd(data, endianness, ptr.value as usize).context("parsing Exif IFD")?;
        if let Some(ts) = find_timestamp(data, &sub, TAG_DATE_TIME_ORIGINAL) {
            return Ok(Some(ts));
        }
    }
    Ok(find_timestamp(data, &entries, TAG_DATE_TIME))
}

#[derive(Debug)]
struct IfdEntry {
    tag: u16,
    ty: u16,
    count: u32,
    // Offset of the 4-byte value field within the block.
    field_offset: usize,
    value: u32,
}

impl IfdEntry {
    fn ascii<'a>(&self, data: &'a [u8]) -> Option<&'a str> {
        if self.ty != TYPE_ASCII {
            return None;
        }
        let len = self.count as usize;
        let start = if len <= 4 {
            self.field_offset
        } else {
            self.value as usize
        };
        let bytes = data.get(start..start.checked_add(len)?)?;
        std::str::from_utf8(bytes).ok()
    }
}

fn read_ifd(data: &[u8], endianness: Endianness, offset: usize) -> Result<Vec<IfdEntry>> {
    let header = data
        .get(offset..offset + 2)
        .ok_or_else(|| anyhow!("IFD offset out of bounds: {}", offset))?;
    let count = ByteOrdered::runtime(header, endianness).read_u16()? as usize;

    let body_start = offset + 2;
    let body = data
        .get(body_start..body_start + 12 * count)
        .ok_or_else(|| anyhow!("IFD with {} entries overruns block", count))?;

    let mut rdr = ByteOrdered::runtime(Cursor::new(body), endianness);
    (0..count)
        .map(|idx| -> Result<IfdEntry> {
            Ok(IfdEntry {
                tag: rdr.read_u16()?,
                ty: rdr.read_u16()?,
                count: rdr.read_u32()?,
                field_offset: body_start + 12 * idx + 8,
                value: rdr.read_u32()?,
            })
        })
        .collect()
}

fn find_timestamp(data: &[u8], entries: &[IfdEntry], tag: u16) -> Option<NaiveDateTime> {
    let raw = entries.iter().find(|e| e.tag == tag)?.ascii(data)?;
    let raw = raw.trim_end_matches('\0').trim();
    NaiveDateTime::parse_from_str(raw, DATE_TIME_FORMAT).ok()
}
