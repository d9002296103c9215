//! Length-prefixed and fixed-layout primitives shared by serializers.

use uuid::Uuid;

use crate::buffer::Buffer;
use crate::error::{Result, WireError};

/// Read an `i32` length prefix and check it against the readable bytes.
///
/// `min_item_width` is the smallest encoded size of one counted item, so a
/// hostile count cannot trigger a huge allocation.
pub fn read_length(buf: &mut Buffer, what: &str, min_item_width: usize) -> Result<usize> {
    let length = buf.read_int()?;
    if length < 0 {
        return Err(WireError::serialization(format!(
            "negative {what} length {length}"
        )));
    }
    let length = length as usize;
    if length.saturating_mul(min_item_width) > buf.readable_bytes() {
        return Err(WireError::serialization(format!(
            "{what} length {length} exceeds {} readable bytes",
            buf.readable_bytes()
        )));
    }
    Ok(length)
}

/// Write an `i32` length prefix.
pub fn write_length(buf: &mut Buffer, length: usize) -> Result<()> {
    let length = i32::try_from(length)
        .map_err(|_| WireError::serialization(format!("length {length} exceeds i32::MAX")))?;
    buf.write_int(length)?;
    Ok(())
}

/// Read `<i32 byteLen><utf8 bytes>`.
pub fn read_string(buf: &mut Buffer) -> Result<String> {
    let length = read_length(buf, "string", 1)?;
    let bytes = buf.read_vec(length)?;
    String::from_utf8(bytes).map_err(|e| WireError::serialization(format!("invalid UTF-8: {e}")))
}

/// Write `<i32 byteLen><utf8 bytes>`.
pub fn write_string(buf: &mut Buffer, value: &str) -> Result<()> {
    write_length(buf, value.len())?;
    buf.write_bytes(value.as_bytes())?;
    Ok(())
}

/// Read 16 bytes, most significant half first.
pub fn read_uuid(buf: &mut Buffer) -> Result<Uuid> {
    let msb = buf.read_long()? as u64;
    let lsb = buf.read_long()? as u64;
    Ok(Uuid::from_u64_pair(msb, lsb))
}

/// Write 16 bytes, most significant half first.
pub fn write_uuid(buf: &mut Buffer, value: &Uuid) -> Result<()> {
    let (msb, lsb) = value.as_u64_pair();
    buf.write_long(msb as i64)?;
    buf.write_long(lsb as i64)?;
    Ok(())
}

/// Read one UTF-8 encoded scalar value (1 to 4 bytes).
pub fn read_char(buf: &mut Buffer) -> Result<char> {
    let first = buf.read_u8()?;
    let width = match first {
        0x00..=0x7F => 1,
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF7 => 4,
        _ => {
            return Err(WireError::serialization(format!(
                "invalid UTF-8 lead byte 0x{first:02x} for char"
            )))
        }
    };
    let mut bytes = [first, 0, 0, 0];
    buf.read_bytes(&mut bytes[1..width])?;
    std::str::from_utf8(&bytes[..width])
        .ok()
        .and_then(|s| s.chars().next())
        .ok_or_else(|| WireError::serialization("invalid UTF-8 sequence for char"))
}

/// Write one scalar value as UTF-8.
pub fn write_char(buf: &mut Buffer, value: char) -> Result<()> {
    let mut scratch = [0u8; 4];
    buf.write_bytes(value.encode_utf8(&mut scratch).as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_layout() {
        let mut buf = Buffer::new();
        write_string(&mut buf, "héllo").unwrap();
        assert_eq!(
            &buf.nio_buffer().unwrap()[..],
            &[0x00, 0x00, 0x00, 0x06, 0x68, 0xC3, 0xA9, 0x6C, 0x6C, 0x6F]
        );
        assert_eq!(read_string(&mut buf).unwrap(), "héllo");
        assert_eq!(buf.readable_bytes(), 0);
    }

    #[test]
    fn test_empty_string() {
        let mut buf = Buffer::new();
        write_string(&mut buf, "").unwrap();
        assert_eq!(buf.readable_bytes(), 4);
        assert_eq!(read_string(&mut buf).unwrap(), "");
    }

    #[test]
    fn test_negative_length_rejected() {
        let mut buf = Buffer::wrap(&[0xFF, 0xFF, 0xFF, 0xFF]);
        let err = read_string(&mut buf).unwrap_err();
        assert!(err.to_string().contains("negative string length"));
    }

    #[test]
    fn test_oversized_length_rejected() {
        let mut buf = Buffer::wrap(&[0x00, 0x00, 0x00, 0x09, b'a']);
        assert!(matches!(
            read_string(&mut buf),
            Err(WireError::Serialization(_))
        ));
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let mut buf = Buffer::wrap(&[0x00, 0x00, 0x00, 0x01, 0xFF]);
        assert!(read_string(&mut buf).is_err());
    }

    #[test]
    fn test_uuid_layout() {
        let id = Uuid::parse_str("00112233-4455-6677-8899-aabbccddeeff").unwrap();
        let mut buf = Buffer::new();
        write_uuid(&mut buf, &id).unwrap();
        assert_eq!(&buf.nio_buffer().unwrap()[..], id.as_bytes());
        assert_eq!(read_uuid(&mut buf).unwrap(), id);
    }

    #[test]
    fn test_char_widths() {
        for ch in ['a', 'é', '€', '😀'] {
            let mut buf = Buffer::new();
            write_char(&mut buf, ch).unwrap();
            assert_eq!(buf.readable_bytes(), ch.len_utf8());
            assert_eq!(read_char(&mut buf).unwrap(), ch);
        }
    }

    #[test]
    fn test_invalid_char_lead_byte() {
        let mut buf = Buffer::wrap(&[0x80]);
        assert!(read_char(&mut buf).is_err());
    }
}
