//! Helper functions for reading binary data

use std::io::{Cursor, Read, Seek, SeekFrom};

use crate::error::LoadError;

pub(crate) type ByteCursor<'a> = Cursor<&'a [u8]>;

/// Read a single byte
pub(crate) fn read_u8(cursor: &mut ByteCursor<'_>) -> Result<u8, LoadError> {
    let mut buf = [0u8; 1];
    cursor.read_exact(&mut buf).map_err(LoadError::from_read)?;
    Ok(buf[0])
}

/// Read a 16-bit little-endian integer
pub(crate) fn read_u16(cursor: &mut ByteCursor<'_>) -> Result<u16, LoadError> {
    let mut buf = [0u8; 2];
    cursor.read_exact(&mut buf).map_err(LoadError::from_read)?;
    Ok(u16::from_le_bytes(buf))
}

/// Read a 16-bit big-endian integer (ProTracker headers)
pub(crate) fn read_u16_be(cursor: &mut ByteCursor<'_>) -> Result<u16, LoadError> {
    let mut buf = [0u8; 2];
    cursor.read_exact(&mut buf).map_err(LoadError::from_read)?;
    Ok(u16::from_be_bytes(buf))
}

/// Read a 32-bit little-endian integer
pub(crate) fn read_u32(cursor: &mut ByteCursor<'_>) -> Result<u32, LoadError> {
    let mut buf = [0u8; 4];
    cursor.read_exact(&mut buf).map_err(LoadError::from_read)?;
    Ok(u32::from_le_bytes(buf))
}

/// Read a fixed-size byte array
pub(crate) fn read_array<const N: usize>(
    cursor: &mut ByteCursor<'_>,
) -> Result<[u8; N], LoadError> {
    let mut buf = [0u8; N];
    cursor.read_exact(&mut buf).map_err(LoadError::from_read)?;
    Ok(buf)
}

/// Read a fixed-length text field
pub(crate) fn read_text<const N: usize>(cursor: &mut ByteCursor<'_>) -> Result<String, LoadError> {
    Ok(read_string(&read_array::<N>(cursor)?))
}

/// Skip `count` bytes forward
pub(crate) fn skip(cursor: &mut ByteCursor<'_>, count: u64) -> Result<(), LoadError> {
    seek_to(cursor, cursor.position() + count)
}

/// Move to an absolute offset, failing if it lies past the end of the data
pub(crate) fn seek_to(cursor: &mut ByteCursor<'_>, offset: u64) -> Result<(), LoadError> {
    if offset > cursor.get_ref().len() as u64 {
        return Err(LoadError::UnexpectedEof);
    }
    cursor.seek(SeekFrom::Start(offset))?;
    Ok(())
}

/// Borrow `len` bytes starting at `offset`, clamped to the data that is present
pub(crate) fn slice_at(data: &[u8], offset: usize, len: usize) -> &[u8] {
    let start = offset.min(data.len());
    let end = offset.saturating_add(len).min(data.len());
    &data[start..end]
}

/// Read a null-terminated or fixed-length string
pub(crate) fn read_string(bytes: &[u8]) -> String {
    // Find null terminator or end of slice
    let len = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    // Control characters show up in old trackers' padding
    let text: String = bytes[..len]
        .iter()
        .map(|&b| if b < 0x20 { ' ' } else { b as char })
        .collect();
    text.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_string() {
        assert_eq!(read_string(b"Hello\0World"), "Hello");
        assert_eq!(read_string(b"No null"), "No null");
        assert_eq!(read_string(b"Trailing   "), "Trailing");
        assert_eq!(read_string(b"Tab\there"), "Tab here");
        assert_eq!(read_string(b""), "");
    }

    #[test]
    fn test_read_past_end_is_eof() {
        let data = [1u8, 2, 3];
        let mut cursor = Cursor::new(&data[..]);
        assert_eq!(read_u16(&mut cursor).unwrap(), 0x0201);
        assert!(matches!(read_u16(&mut cursor), Err(LoadError::UnexpectedEof)));
    }

    #[test]
    fn test_seek_past_end_fails() {
        let data = [0u8; 4];
        let mut cursor = Cursor::new(&data[..]);
        assert!(seek_to(&mut cursor, 4).is_ok());
        assert!(matches!(
            seek_to(&mut cursor, 5),
            Err(LoadError::UnexpectedEof)
        ));
    }

    #[test]
    fn test_slice_at_clamps() {
        let data = [0u8, 1, 2, 3, 4];
        assert_eq!(slice_at(&data, 3, 10), &[3, 4]);
        assert!(slice_at(&data, 9, 2).is_empty());
    }
}
