use std::io::{Read, Write};

use flate2::{Compression, read::GzDecoder, write::GzEncoder};

/// what we ask upstreams for, we decode these ourselves
pub const UPSTREAM_ACCEPT_ENCODING: &str = "gzip, zstd";

/// Supported compression encodings
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ContentEncoding {
    Zstd,
    Gzip,
    None,
}

impl ContentEncoding {
    /// determine the best encoding based on Accept-Encoding header
    /// apple HLS player sends "gzip, deflate" or "identity" and that has to be respected
    pub fn from_accept_encoding(accept_encoding: Option<&str>) -> Self {
        match accept_encoding {
            Some(v) => {
                // don't compress if client explicitly requests identity-only
                if v == "identity" || v.starts_with("identity,") {
                    return Self::None;
                }
                // Prefer zstd if supported (better compression), fallback to gzip
                if v.contains("zstd") {
                    Self::Zstd
                } else if v.contains("gzip") {
                    Self::Gzip
                } else {
                    Self::None
                }
            }
            None => Self::None,
        }
    }

    /// from an upstream Content-Encoding header
    pub fn from_content_encoding(content_encoding: Option<&str>) -> Self {
        match content_encoding.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("zstd") => Self::Zstd,
            Some("gzip") | Some("x-gzip") => Self::Gzip,
            _ => Self::None,
        }
    }

    pub fn as_header_value(&self) -> Option<&'static str> {
        match self {
            Self::Zstd => Some("zstd"),
            Self::Gzip => Some("gzip"),
            Self::None => None,
        }
    }

    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>, std::io::Error> {
        match self {
            Self::Zstd => zstd::encode_all(data, 3),
            Self::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(data)?;
                encoder.finish()
            }
            Self::None => Ok(data.to_vec()),
        }
    }

    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, std::io::Error> {
        match self {
            Self::Zstd => zstd::decode_all(data),
            Self::Gzip => {
                let mut decoder = GzDecoder::new(data);
                let mut decomp = Vec::new();
                decoder.read_to_end(&mut decomp)?;
                Ok(decomp)
            }
            Self::None => Ok(data.to_vec()),
        }
    }
}
