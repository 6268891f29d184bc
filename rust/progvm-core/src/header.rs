//! Image header: sixteen packed 32-bit little-endian fields.

use serde::Serialize;

/// The only format version this runtime accepts.
pub const FORMAT_VERSION: i32 = 6;

/// Size of the packed header in bytes (16 fields of 4 bytes).
pub const HEADER_BYTES: usize = 64;

/// One (offset, count) lump descriptor from the header.
///
/// `offset` is a byte position in the file; `count` is the number of
/// elements (or bytes, for the string and global data lumps, which use
/// 1- and 4-byte elements respectively).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Lump {
    pub offset: i32,
    pub count: i32,
}

impl Lump {
    /// Whether this lump of `element_size`-byte records fits inside a
    /// file of `file_size` bytes.
    pub fn fits(&self, element_size: usize, file_size: usize) -> bool {
        if self.offset < 0 || self.count < 0 {
            return false;
        }
        let end = self.offset as i64 + self.count as i64 * element_size as i64;
        end <= file_size as i64
    }
}

/// Decoded image header.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ImageHeader {
    pub version: i32,
    pub crc: i32,
    pub statements: Lump,
    pub global_defs: Lump,
    pub field_defs: Lump,
    pub functions: Lump,
    pub string_data: Lump,
    pub global_data: Lump,
    /// Entity record size in 32-bit cells (not counting the runtime's
    /// hidden reuse-timestamp header).
    pub entity_size: i32,
}

impl ImageHeader {
    /// Decode the header from the front of an image. Returns `None` when
    /// fewer than [`HEADER_BYTES`] bytes are available.
    pub fn parse(bytes: &[u8]) -> Option<ImageHeader> {
        if bytes.len() < HEADER_BYTES {
            return None;
        }
        let word = |i: usize| {
            let at = i * 4;
            i32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
        };
        let lump = |i: usize| Lump {
            offset: word(i),
            count: word(i + 1),
        };
        Some(ImageHeader {
            version: word(0),
            crc: word(1),
            statements: lump(2),
            global_defs: lump(4),
            field_defs: lump(6),
            functions: lump(8),
            string_data: lump(10),
            global_data: lump(12),
            entity_size: word(14),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rejects_short_input() {
        assert!(ImageHeader::parse(&[0u8; 63]).is_none());
    }

    #[test]
    fn parse_reads_all_fields() {
        let mut bytes = Vec::new();
        for v in 0..16i32 {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        let header = ImageHeader::parse(&bytes).unwrap();
        assert_eq!(header.version, 0);
        assert_eq!(header.crc, 1);
        assert_eq!(header.statements, Lump { offset: 2, count: 3 });
        assert_eq!(header.global_data, Lump { offset: 12, count: 13 });
        assert_eq!(header.entity_size, 14);
    }

    #[test]
    fn lump_bounds() {
        let lump = Lump { offset: 8, count: 4 };
        assert!(lump.fits(8, 40));
        assert!(!lump.fits(8, 39));
        assert!(!Lump { offset: -1, count: 0 }.fits(1, 100));
    }
}
