// Wire encoding helpers
//
// Every persisted record uses the same deterministic framing: fixed-width
// little-endian integers, varint-prefixed counts and byte strings. The
// transaction layout is also the signing preimage and must never change.

use std::io::Read;

use crate::error::{Error, Result};

/// Types with a stable binary representation.
pub trait Serializable: Sized {
    fn serialize(&self) -> Vec<u8>;
    fn deserialize(data: &[u8]) -> Result<Self>;
}

/// Write a variable-length integer (compact size prefix).
pub fn write_varint(buf: &mut Vec<u8>, value: u64) {
    match value {
        0..=0xfc => buf.push(value as u8),
        0xfd..=0xffff => {
            buf.push(0xfd);
            buf.extend_from_slice(&(value as u16).to_le_bytes());
        }
        0x10000..=0xffffffff => {
            buf.push(0xfe);
            buf.extend_from_slice(&(value as u32).to_le_bytes());
        }
        _ => {
            buf.push(0xff);
            buf.extend_from_slice(&value.to_le_bytes());
        }
    }
}

/// Read a variable-length integer.
pub fn read_varint<R: Read + ?Sized>(reader: &mut R) -> Result<u64> {
    match read_array::<1, _>(reader)?[0] {
        tag @ 0..=0xfc => Ok(tag as u64),
        0xfd => Ok(u16::from_le_bytes(read_array(reader)?) as u64),
        0xfe => Ok(u32::from_le_bytes(read_array(reader)?) as u64),
        0xff => Ok(u64::from_le_bytes(read_array(reader)?)),
    }
}

/// Write bytes behind a varint length prefix.
pub fn write_var_bytes(buf: &mut Vec<u8>, data: &[u8]) {
    write_varint(buf, data.len() as u64);
    buf.extend_from_slice(data);
}

/// Read bytes behind a varint length prefix.
pub fn read_var_bytes<R: Read + ?Sized>(reader: &mut R) -> Result<Vec<u8>> {
    let len = read_varint(reader)? as usize;
    let mut data = vec![0u8; len];
    reader
        .read_exact(&mut data)
        .map_err(|e| Error::encoding(e.to_string()))?;
    Ok(data)
}

/// Read a fixed-width field.
pub fn read_array<const N: usize, R: Read + ?Sized>(reader: &mut R) -> Result<[u8; N]> {
    let mut bytes = [0u8; N];
    reader
        .read_exact(&mut bytes)
        .map_err(|e| Error::encoding(e.to_string()))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_varint_widths() {
        for (value, expected_len) in [(0u64, 1), (0xfc, 1), (0xfd, 3), (1000, 3), (100_000, 5), (u64::MAX, 9)] {
            let mut buf = Vec::new();
            write_varint(&mut buf, value);
            assert_eq!(buf.len(), expected_len, "width for {}", value);

            let mut cursor = Cursor::new(buf);
            assert_eq!(read_varint(&mut cursor).unwrap(), value);
        }
    }

    #[test]
    fn test_var_bytes_round_trip() {
        let data = b"hello world";
        let mut buf = Vec::new();
        write_var_bytes(&mut buf, data);

        let mut cursor = Cursor::new(buf);
        assert_eq!(read_var_bytes(&mut cursor).unwrap(), data);
    }

    #[test]
    fn test_truncated_input_is_an_encoding_error() {
        let mut buf = Vec::new();
        write_var_bytes(&mut buf, b"payload");
        buf.truncate(buf.len() - 2);

        let mut cursor = Cursor::new(buf);
        assert!(read_var_bytes(&mut cursor).is_err());
    }
}
