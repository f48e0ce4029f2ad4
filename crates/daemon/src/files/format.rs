//! Content sniffing for uploads that arrive without a usable name.

/// Image formats recognised by their leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Bmp,
    Tiff,
}

impl ImageFormat {
    /// File extension without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
            ImageFormat::Gif => "gif",
            ImageFormat::Bmp => "bmp",
            ImageFormat::Tiff => "tiff",
        }
    }
}

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Identify an image format from magic bytes. Needs at least 8 bytes.
pub fn detect_format(data: &[u8]) -> Option<ImageFormat> {
    if data.len() < 8 {
        return None;
    }

    match data {
        [0xFF, 0xD8, ..] => Some(ImageFormat::Jpeg),
        _ if data[..8] == PNG_SIGNATURE => Some(ImageFormat::Png),
        [b'G', b'I', b'F', ..] => Some(ImageFormat::Gif),
        [b'B', b'M', ..] => Some(ImageFormat::Bmp),
        [b'I', b'I', ..] | [b'M', b'M', ..] => Some(ImageFormat::Tiff),
        _ => None,
    }
}

/// Name used when the client did not send a usable file name.
pub fn fallback_name(content: &[u8]) -> String {
    match detect_format(content) {
        Some(format) => format!("image_received.{}", format.extension()),
        None => "file_received.bin".to_string(),
    }
}
