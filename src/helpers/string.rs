//! Binary record conversion utilities for the paged shared strings cache.
//! Index records are little-endian `(u32 offset, u16 length)` pairs packed into 6 bytes.

/// Size in bytes of one index record.
pub(crate) const RECORD_SIZE: usize = 6;

/// Converts the first 4 bytes of a slice to a 32-bit unsigned integer.
/// Uses little-endian byte order for conversion.
#[inline]
pub(crate) fn to_u32(s: &[u8]) -> u32 {
    u32::from_le_bytes([s[0], s[1], s[2], s[3]])
}

/// Converts the first 2 bytes of a slice to a 16-bit unsigned integer.
/// Uses little-endian byte order for conversion.
#[inline]
pub(crate) fn to_u16(s: &[u8]) -> u16 {
    u16::from_le_bytes([s[0], s[1]])
}

/// Packs an `(offset, length)` pair into one index record.
#[inline]
pub(crate) fn to_record(offset: u32, length: u16) -> [u8; RECORD_SIZE] {
    let mut record = [0u8; RECORD_SIZE];
    record[..4].copy_from_slice(&offset.to_le_bytes());
    record[4..].copy_from_slice(&length.to_le_bytes());
    record
}

/// Reads the `slot`-th record out of a packed index, if the index is long enough.
pub(crate) fn read_record(index: &[u8], slot: usize) -> Option<(u32, u16)> {
    let start = slot.checked_mul(RECORD_SIZE)?;
    let record = index.get(start..start + RECORD_SIZE)?;
    Some((to_u32(record), to_u16(&record[4..])))
}

/// Escapes line feeds and backslashes so a value fits on one line of a data segment.
pub(crate) fn escape_line(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for character in value.chars() {
        match character {
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            _ => escaped.push(character),
        }
    }
    escaped
}

/// Reverses [`escape_line`].
pub(crate) fn unescape_line(line: &str) -> String {
    let mut value = String::with_capacity(line.len());
    let mut characters = line.chars();
    while let Some(character) = characters.next() {
        if character == '\\' {
            match characters.next() {
                Some('n') => value.push('\n'),
                Some(other) => value.push(other),
                None => value.push('\\'),
            }
        } else {
            value.push(character);
        }
    }
    value
}
