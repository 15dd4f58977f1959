//! Splitting a package into LOAD blocks
//!
//! The card receives a single load file data block (`C4`, BER length, package
//! bytes) cut into consecutive LOAD commands numbered from zero.

use bytes::{BufMut, Bytes, BytesMut};

use crate::constants::tags;
use crate::{Error, Result};

/// One LOAD command's worth of the load file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadBlock {
    /// Block sequence number, P2 of the LOAD command
    pub number: u8,
    /// Set on the final block
    pub last: bool,
    /// Slice of the load file data block
    pub data: Bytes,
}

/// Package encoded as a load file data block, ready to be cut into blocks
#[derive(Debug, Clone)]
pub struct LoadFile {
    encoded: Bytes,
    block_size: usize,
}

impl LoadFile {
    /// Encode `package`; each block carries at most `block_size` bytes
    ///
    /// The block number is one byte, so at most 256 blocks are allowed.
    pub fn new(package: &[u8], block_size: usize) -> Result<Self> {
        if block_size == 0 {
            return Err(Error::InvalidFormat("load block size must be positive"));
        }
        let mut encoded = BytesMut::with_capacity(package.len() + 5);
        encoded.put_u8(tags::LOAD_FILE_DATA_BLOCK);
        put_ber_length(&mut encoded, package.len());
        encoded.put_slice(package);

        let file = Self { encoded: encoded.freeze(), block_size };
        if file.block_count() > 256 {
            return Err(Error::InvalidFormat("package needs more than 256 load blocks"));
        }
        Ok(file)
    }

    /// Number of LOAD commands needed
    pub fn block_count(&self) -> usize {
        self.encoded.len().div_ceil(self.block_size)
    }

    /// Blocks in sending order
    pub fn blocks(&self) -> impl Iterator<Item = LoadBlock> + '_ {
        let count = self.block_count();
        (0..count).map(move |index| {
            let start = index * self.block_size;
            let end = (start + self.block_size).min(self.encoded.len());
            LoadBlock {
                number: index as u8,
                last: index + 1 == count,
                data: self.encoded.slice(start..end),
            }
        })
    }
}

/// Append a BER-TLV definite length
pub fn put_ber_length(out: &mut BytesMut, length: usize) {
    let significant = match length {
        0..=0x7F => {
            out.put_u8(length as u8);
            return;
        }
        0x80..=0xFF => 1,
        0x100..=0xFFFF => 2,
        _ => 3,
    };
    out.put_u8(0x80 | significant as u8);
    out.put_slice(&(length as u32).to_be_bytes()[4 - significant..]);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ber(length: usize) -> Vec<u8> {
        let mut out = BytesMut::new();
        put_ber_length(&mut out, length);
        out.to_vec()
    }

    #[test]
    fn ber_length_forms() {
        assert_eq!(ber(0x00), [0x00]);
        assert_eq!(ber(0x7F), [0x7F]);
        assert_eq!(ber(0x80), [0x81, 0x80]);
        assert_eq!(ber(0x1234), [0x82, 0x12, 0x34]);
        assert_eq!(ber(0x012345), [0x83, 0x01, 0x23, 0x45]);
    }

    #[test]
    fn splits_package_into_numbered_blocks() {
        let file = LoadFile::new(&[0x5Au8; 300], 240).unwrap();
        assert_eq!(file.block_count(), 2);

        let blocks: Vec<_> = file.blocks().collect();
        assert_eq!(blocks[0].number, 0);
        assert!(!blocks[0].last);
        assert_eq!(blocks[0].data.len(), 240);
        assert_eq!(&blocks[0].data[..4], &[0xC4, 0x82, 0x01, 0x2C]);

        assert_eq!(blocks[1].number, 1);
        assert!(blocks[1].last);
        assert_eq!(blocks[1].data.len(), 304 - 240);
    }

    #[test]
    fn limits() {
        assert!(LoadFile::new(&[0x01], 0).is_err());
        assert!(LoadFile::new(&[0u8; 256 * 8], 8).is_err());
        assert_eq!(LoadFile::new(&[], 16).unwrap().blocks().count(), 1);
    }
}
