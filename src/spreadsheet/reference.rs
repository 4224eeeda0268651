//! A1-style cell references.

/// Number of columns of a worksheet, `A` to `XFD`
pub const MAX_COLUMNS: usize = 16_384;

/// Converts a zero-based column index to its letters: 0 → `A`, 25 → `Z`, 26 → `AA`.
pub fn column_letters(mut col: usize) -> String {
    let mut letters = Vec::with_capacity(3);
    loop {
        letters.push(b'A' + (col % 26) as u8);
        if col < 26 {
            break;
        }
        col = col / 26 - 1;
    }
    letters.iter().rev().map(|letter| *letter as char).collect()
}

/// Converts zero-based `(row, col)` to a reference such as `B3`.
pub fn index_to_reference(row: usize, col: usize) -> String {
    format!("{}{}", column_letters(col), row + 1)
}

/// Parses a reference such as `B3` (or `$B$3`) to zero-based `(row, col)`.
///
/// A reference made of letters only yields row 0. Columns past `XFD` are rejected.
pub fn reference_to_index(reference: &str) -> Option<(usize, usize)> {
    let reference = reference.trim();
    let mut col = 0usize;
    let mut letters = 0usize;
    let mut digits = String::new();
    for character in reference.chars() {
        match character {
            '$' => (),
            'A'..='Z' | 'a'..='z' if digits.is_empty() => {
                col = col * 26 + (character.to_ascii_uppercase() as u8 - b'A') as usize + 1;
                if col > MAX_COLUMNS {
                    return None;
                }
                letters += 1;
            }
            '0'..='9' => digits.push(character),
            _ => return None,
        }
    }
    if letters == 0 {
        return None;
    }
    let row = if digits.is_empty() {
        0
    } else {
        digits.parse::<usize>().ok()?.checked_sub(1)?
    };
    Some((row, col - 1))
}

/// Parses the end column of a range such as `A1:D20` or a `spans` attribute such as `1:4`,
/// returning the number of columns it covers. Widths past `XFD` are rejected.
pub(crate) fn range_width(range: &str) -> Option<usize> {
    let end = range.rsplit(':').next()?.trim();
    if !end.is_empty() && end.chars().all(|character| character.is_ascii_digit()) {
        end.parse().ok().filter(|width| *width <= MAX_COLUMNS)
    } else {
        reference_to_index(end).map(|(_, col)| col + 1)
    }
}
