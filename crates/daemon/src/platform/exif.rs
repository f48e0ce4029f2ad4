//! Minimal EXIF reader for the capture date of JPEG files.
//!
//! Only the path to `DateTimeOriginal` is walked: JPEG APP1 segment, TIFF
//! header, IFD0, the Exif sub-IFD pointer, then the tag itself.

use chrono::NaiveDateTime;

const MARKER_SOI: u8 = 0xD8;
const MARKER_EOI: u8 = 0xD9;
const MARKER_SOS: u8 = 0xDA;
const MARKER_APP1: u8 = 0xE1;

const EXIF_HEADER: &[u8] = b"Exif\0\0";

const TAG_EXIF_IFD_POINTER: u16 = 0x8769;
const TAG_DATE_TIME_ORIGINAL: u16 = 0x9003;

const TYPE_ASCII: u16 = 2;
const IFD_ENTRY_SIZE: usize = 12;

/// Extract `DateTimeOriginal` from the leading bytes of a JPEG file.
///
/// The value carries no time zone; callers decide how to interpret it.
pub fn read_date_time_original(data: &[u8]) -> Option<NaiveDateTime> {
    let tiff = Tiff::new(find_exif_payload(data)?)?;

    let ifd0 = tiff.u32(4)? as usize;
    let exif_ifd = tiff.find_entry(ifd0, TAG_EXIF_IFD_POINTER)?;
    let exif_offset = tiff.u32(exif_ifd + 8)? as usize;

    let entry = tiff.find_entry(exif_offset, TAG_DATE_TIME_ORIGINAL)?;
    if tiff.u16(entry + 2)? != TYPE_ASCII {
        return None;
    }
    let count = tiff.u32(entry + 4)? as usize;
    let value_offset = if count <= 4 {
        entry + 8
    } else {
        tiff.u32(entry + 8)? as usize
    };

    let raw = tiff.data.get(value_offset..value_offset.checked_add(count)?)?;
    let text = std::str::from_utf8(raw).ok()?.trim_end_matches('\0').trim();

    NaiveDateTime::parse_from_str(text, "%Y:%m:%d %H:%M:%S").ok()
}

/// Locate the TIFF payload of the first EXIF APP1 segment.
fn find_exif_payload(data: &[u8]) -> Option<&[u8]> {
    if data.len() < 4 || data[0] != 0xFF || data[1] != MARKER_SOI {
        return None;
    }

    let mut pos = 2;
    while pos + 4 <= data.len() {
        if data[pos] != 0xFF {
            return None;
        }
        let marker = data[pos + 1];
        match marker {
            0xFF => {
                pos += 1;
                continue;
            }
            MARKER_EOI | MARKER_SOS => return None,
            0x01 | 0xD0..=0xD7 => {
                pos += 2;
                continue;
            }
            _ => {}
        }

        let len = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        if len < 2 {
            return None;
        }
        let start = pos + 4;
        let end = pos + 2 + len;
        if end > data.len() {
            return None;
        }

        let segment = &data[start..end];
        if marker == MARKER_APP1 && segment.starts_with(EXIF_HEADER) {
            return Some(&segment[EXIF_HEADER.len()..]);
        }
        pos = end;
    }

    None
}

struct Tiff<'a> {
    data: &'a [u8],
    big_endian: bool,
}

impl<'a> Tiff<'a> {
    fn new(data: &'a [u8]) -> Option<Self> {
        let big_endian = match data.get(0..2)? {
            b"MM" => true,
            b"II" => false,
            _ => return None,
        };
        let tiff = Self { data, big_endian };
        (tiff.u16(2)? == 42).then_some(tiff)
    }

    fn u16(&self, offset: usize) -> Option<u16> {
        let bytes: [u8; 2] = self.data.get(offset..offset + 2)?.try_into().ok()?;
        Some(if self.big_endian {
            u16::from_be_bytes(bytes)
        } else {
            u16::from_le_bytes(bytes)
        })
    }

    fn u32(&self, offset: usize) -> Option<u32> {
        let bytes: [u8; 4] = self.data.get(offset..offset + 4)?.try_into().ok()?;
        Some(if self.big_endian {
            u32::from_be_bytes(bytes)
        } else {
            u32::from_le_bytes(bytes)
        })
    }

    /// Offset of the IFD entry carrying `tag`.
    fn find_entry(&self, ifd_offset: usize, tag: u16) -> Option<usize> {
        let count = self.u16(ifd_offset)? as usize;
        (0..count)
            .map(|i| ifd_offset + 2 + i * IFD_ENTRY_SIZE)
            .find(|&entry| self.u16(entry) == Some(tag))
    }
}
