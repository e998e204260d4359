//! Framed binary IO with checksum validation.
//!
//! Segment and manifest files are written through [`StructWriter`] and read
//! back through [`StructReader`]. All integers are little-endian; byte
//! buffers are length-prefixed. Every file ends with a CRC32 of its payload,
//! which [`StructReader::finish`] verifies after the payload has been
//! consumed.

use std::io::Read;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Result, SalixError};
use crate::storage::{StorageInput, StorageOutput};

const CRC_TRAILER_LEN: u64 = 4;

/// Writer for framed binary files.
pub struct StructWriter {
    output: Box<dyn StorageOutput>,
    hasher: crc32fast::Hasher,
}

impl StructWriter {
    pub fn new(output: Box<dyn StorageOutput>) -> Self {
        StructWriter {
            output,
            hasher: crc32fast::Hasher::new(),
        }
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.hasher.update(&value.to_le_bytes());
        self.output.write_u32::<LittleEndian>(value)?;
        Ok(())
    }

    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.hasher.update(&value.to_le_bytes());
        self.output.write_u64::<LittleEndian>(value)?;
        Ok(())
    }

    /// Write a length-prefixed byte buffer.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let len: u32 = bytes
            .len()
            .try_into()
            .map_err(|_| SalixError::invalid_argument("byte buffer exceeds u32::MAX"))?;
        self.write_u32(len)?;
        self.hasher.update(bytes);
        use std::io::Write;
        self.output.write_all(bytes)?;
        Ok(())
    }

    /// Write a length-prefixed UTF-8 string.
    pub fn write_string(&mut self, value: &str) -> Result<()> {
        self.write_bytes(value.as_bytes())
    }

    /// Append the checksum trailer, flush and sync the file.
    pub fn close(mut self) -> Result<()> {
        let checksum = self.hasher.finalize();
        self.output.write_u32::<LittleEndian>(checksum)?;
        self.output.flush_and_sync()?;
        Ok(())
    }
}

/// Reader for framed binary files.
pub struct StructReader {
    input: Box<dyn StorageInput>,
    hasher: crc32fast::Hasher,
    position: u64,
    payload_len: u64,
}

impl StructReader {
    pub fn new(input: Box<dyn StorageInput>) -> Result<Self> {
        let size = input.size()?;
        if size < CRC_TRAILER_LEN {
            return Err(SalixError::corrupt("file too small for checksum trailer"));
        }
        Ok(StructReader {
            input,
            hasher: crc32fast::Hasher::new(),
            position: 0,
            payload_len: size - CRC_TRAILER_LEN,
        })
    }

    /// Bytes of payload remaining before the checksum trailer.
    pub fn remaining(&self) -> u64 {
        self.payload_len - self.position
    }

    fn take(&mut self, len: u64) -> Result<Vec<u8>> {
        if self.remaining() < len {
            return Err(SalixError::corrupt("unexpected end of file"));
        }
        let mut buf = vec![0u8; len as usize];
        self.input.read_exact(&mut buf)?;
        self.hasher.update(&buf);
        self.position += len;
        Ok(buf)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let buf = self.take(4)?;
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&buf);
        Ok(u32::from_le_bytes(bytes))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let buf = self.take(8)?;
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&buf);
        Ok(u64::from_le_bytes(bytes))
    }

    /// Read a length-prefixed byte buffer.
    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.read_u32()? as u64;
        self.take(len)
    }

    /// Read a length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes).map_err(|_| SalixError::corrupt("invalid UTF-8 string"))
    }

    /// Verify that the payload was fully consumed and matches the checksum
    /// trailer.
    pub fn finish(mut self) -> Result<()> {
        if self.remaining() != 0 {
            return Err(SalixError::corrupt("trailing bytes before checksum"));
        }
        let expected = self.input.read_u32::<LittleEndian>()?;
        let actual = self.hasher.finalize();
        if expected != actual {
            return Err(SalixError::corrupt(format!(
                "checksum mismatch: expected {expected:#010x}, got {actual:#010x}"
            )));
        }
        Ok(())
    }
}
