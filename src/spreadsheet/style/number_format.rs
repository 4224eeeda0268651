//! Number formats: the builtin table, date detection and conversion of format codes
//! to chrono patterns.

use chrono::NaiveDateTime;
use std::borrow::Cow;
use std::fmt::Write;

/// First id available to custom format codes
pub const FIRST_CUSTOM_FORMAT_ID: u16 = 164;

/// Code used for builtin date ids whose code depends on the locale
const LOCALE_DATE_CODE: &str = "yyyy-mm-dd";

/// Builtin number format or custom format code
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NumberFormat {
    Builtin(u16),
    Custom(String),
}

impl NumberFormat {
    pub const GENERAL: NumberFormat = NumberFormat::Builtin(0);
    pub const INTEGER: NumberFormat = NumberFormat::Builtin(1);
    pub const DECIMAL: NumberFormat = NumberFormat::Builtin(2);
    pub const THOUSANDS: NumberFormat = NumberFormat::Builtin(3);
    pub const THOUSANDS_DECIMAL: NumberFormat = NumberFormat::Builtin(4);
    pub const CURRENCY: NumberFormat = NumberFormat::Builtin(7);
    pub const PERCENT: NumberFormat = NumberFormat::Builtin(9);
    pub const PERCENT_DECIMAL: NumberFormat = NumberFormat::Builtin(10);
    pub const SCIENTIFIC: NumberFormat = NumberFormat::Builtin(11);
    pub const FRACTION: NumberFormat = NumberFormat::Builtin(12);
    pub const DATE: NumberFormat = NumberFormat::Builtin(14);
    pub const TIME: NumberFormat = NumberFormat::Builtin(21);
    pub const DATETIME: NumberFormat = NumberFormat::Builtin(22);
    pub const TEXT: NumberFormat = NumberFormat::Builtin(49);

    /// Builtin format for `id`, if such a builtin exists.
    pub fn builtin(id: u16) -> Option<Self> {
        (is_builtin_date_id(id) || builtin_code(id).is_some()).then_some(NumberFormat::Builtin(id))
    }

    pub fn custom(code: &str) -> Self {
        NumberFormat::Custom(code.to_owned())
    }

    /// Format code, with locale dependent builtin dates rendered as ISO dates.
    pub fn code(&self) -> Cow<'_, str> {
        match self {
            NumberFormat::Builtin(id) => Cow::Borrowed(builtin_code(*id).unwrap_or(if is_builtin_date_id(*id) {
                LOCALE_DATE_CODE
            } else {
                "General"
            })),
            NumberFormat::Custom(code) => Cow::Borrowed(code),
        }
    }

    /// Whether numbers shown with this format are dates or times
    pub fn is_date(&self) -> bool {
        match self {
            NumberFormat::Builtin(id) => is_builtin_date_id(*id),
            NumberFormat::Custom(code) => is_date_format_code(code),
        }
    }
}

/// Code of a builtin number format (en-US)
pub fn builtin_code(id: u16) -> Option<&'static str> {
    let code = match id {
        0 => "General",
        1 => "0",
        2 => "0.00",
        3 => "#,##0",
        4 => "#,##0.00",
        5 => "$#,##0_);($#,##0)",
        6 => "$#,##0_);[Red]($#,##0)",
        7 => "$#,##0.00_);($#,##0.00)",
        8 => "$#,##0.00_);[Red]($#,##0.00)",
        9 => "0%",
        10 => "0.00%",
        11 => "0.00E+00",
        12 => "# ?/?",
        13 => "# ??/??",
        14 => "m/d/yyyy",
        15 => "d-mmm-yy",
        16 => "d-mmm",
        17 => "mmm-yy",
        18 => "h:mm AM/PM",
        19 => "h:mm:ss AM/PM",
        20 => "h:mm",
        21 => "h:mm:ss",
        22 => "m/d/yyyy h:mm",
        37 => "#,##0_);(#,##0)",
        38 => "#,##0_);[Red](#,##0)",
        39 => "#,##0.00_);(#,##0.00)",
        40 => "#,##0.00_);[Red](#,##0.00)",
        45 => "mm:ss",
        46 => "[h]:mm:ss",
        47 => "mm:ss.0",
        48 => "##0.0E+0",
        49 => "@",
        _ => return None,
    };
    Some(code)
}

/// Builtin ids that display dates or times
pub fn is_builtin_date_id(id: u16) -> bool {
    matches!(id, 14..=22 | 27..=36 | 45..=47 | 50..=58)
}

/// Scans a custom format code for date or time tokens.
///
/// Quoted literals, escaped characters (`\x`, `_x`, `*x`) and bracketed sections such as
/// `[Red]` or `[$-409]` are ignored.
pub fn is_date_format_code(format: &str) -> bool {
    let mut is_escaped = false;
    let mut is_literal = false;
    let mut is_bracket = false;
    for character in format.chars() {
        match character {
            _ if is_escaped => is_escaped = false,
            '_' | '\\' | '*' if !is_literal && !is_bracket => is_escaped = true,

            '"' if is_literal => is_literal = false,
            '"' if !is_bracket => is_literal = true,

            ']' if is_bracket => is_bracket = false,
            '[' if !is_literal => is_bracket = true,
            _ if is_literal || is_bracket => (),

            'Y' | 'y' | 'M' | 'm' | 'D' | 'd' | 'H' | 'h' | 'S' | 's' => return true,
            _ => (),
        }
    }
    false
}

#[derive(Debug, PartialEq)]
enum Token {
    Year(usize),
    Month(usize),
    Day(usize),
    Hour(usize),
    Second(usize),
    Fraction(usize),
    Meridiem,
    Literal(String),
}

impl Token {
    fn is_field(&self) -> bool {
        !matches!(self, Token::Literal(_))
    }
}

fn tokenize(section: &str) -> Vec<Token> {
    let characters: Vec<char> = section.chars().collect();
    let mut tokens = Vec::new();
    let mut index = 0;
    let run = |start: usize, target: char| {
        characters[start..]
            .iter()
            .take_while(|character| character.eq_ignore_ascii_case(&target))
            .count()
    };
    while index < characters.len() {
        let character = characters[index];
        let rest: String = characters[index..].iter().take(5).collect();
        let (token, length) = match character {
            '"' => {
                let literal: String = characters[index + 1..].iter().take_while(|c| **c != '"').collect();
                let length = literal.chars().count() + 2;
                (Token::Literal(literal), length)
            }
            '\\' => (Token::Literal(characters.get(index + 1).map(|c| c.to_string()).unwrap_or_default()), 2),
            '_' => (Token::Literal(" ".to_owned()), 2),
            '*' => (Token::Literal(String::new()), 2),
            '[' => {
                let inner: String = characters[index + 1..].iter().take_while(|c| **c != ']').collect();
                let length = inner.chars().count() + 2;
                let lower = inner.to_ascii_lowercase();
                // Elapsed time such as [h] or [mm]
                let token = if !lower.is_empty() && lower.chars().all(|c| c == 'h') {
                    Token::Hour(lower.len().max(2))
                } else if !lower.is_empty() && lower.chars().all(|c| c == 'm') {
                    Token::Month(lower.len())
                } else if !lower.is_empty() && lower.chars().all(|c| c == 's') {
                    Token::Second(lower.len())
                } else {
                    Token::Literal(String::new())
                };
                (token, length)
            }
            _ if rest.eq_ignore_ascii_case("AM/PM") => (Token::Meridiem, 5),
            _ if rest.get(..3).is_some_and(|prefix| prefix.eq_ignore_ascii_case("A/P")) => (Token::Meridiem, 3),
            'y' | 'Y' => {
                let length = run(index, character);
                (Token::Year(length), length)
            }
            'm' | 'M' => {
                let length = run(index, 'm');
                (Token::Month(length), length)
            }
            'd' | 'D' => {
                let length = run(index, 'd');
                (Token::Day(length), length)
            }
            'h' | 'H' => {
                let length = run(index, 'h');
                (Token::Hour(length), length)
            }
            's' | 'S' => {
                let length = run(index, 's');
                (Token::Second(length), length)
            }
            '.' if matches!(tokens.last(), Some(Token::Second(_))) && characters.get(index + 1) == Some(&'0') => {
                let length = run(index + 1, '0');
                (Token::Fraction(length), length + 1)
            }
            _ => (Token::Literal(character.to_string()), 1),
        };
        tokens.push(token);
        index += length.max(1);
    }
    tokens
}

/// Converts a spreadsheet format code to a chrono `strftime` pattern.
///
/// Only the first section (up to an unquoted `;`) is used. `m` runs next to hours or
/// seconds are minutes. Hours become 12-hour when an `AM/PM` marker is present.
pub fn to_chrono_format(code: &str) -> String {
    let section = first_section(code);
    let tokens = tokenize(section);
    let is_twelve_hour = tokens.contains(&Token::Meridiem);
    let fields: Vec<usize> = (0..tokens.len()).filter(|index| tokens[*index].is_field()).collect();

    let mut format = String::new();
    for (index, token) in tokens.iter().enumerate() {
        let field = fields.iter().position(|field| *field == index);
        let previous = field.and_then(|p| p.checked_sub(1)).map(|p| &tokens[fields[p]]);
        let next = field.and_then(|p| fields.get(p + 1)).map(|p| &tokens[*p]);
        match token {
            Token::Year(length) if *length <= 2 => format.push_str("%y"),
            Token::Year(_) => format.push_str("%Y"),
            Token::Month(length)
                if matches!(previous, Some(Token::Hour(_))) || matches!(next, Some(Token::Second(_))) =>
            {
                format.push_str(if *length == 1 { "%-M" } else { "%M" })
            }
            Token::Month(1) => format.push_str("%-m"),
            Token::Month(2) => format.push_str("%m"),
            Token::Month(4) => format.push_str("%B"),
            Token::Month(_) => format.push_str("%b"),
            Token::Day(1) => format.push_str("%-d"),
            Token::Day(2) => format.push_str("%d"),
            Token::Day(3) => format.push_str("%a"),
            Token::Day(_) => format.push_str("%A"),
            Token::Hour(length) => format.push_str(match (is_twelve_hour, *length == 1) {
                (true, true) => "%-I",
                (true, false) => "%I",
                (false, true) => "%-H",
                (false, false) => "%H",
            }),
            Token::Second(1) => format.push_str("%-S"),
            Token::Second(_) => format.push_str("%S"),
            Token::Fraction(_) => format.push_str("%.3f"),
            Token::Meridiem => format.push_str("%p"),
            Token::Literal(text) => format.push_str(&text.replace('%', "%%")),
        }
    }
    format
}

/// Renders `datetime` with a format code. Codes chrono cannot render fall back to ISO 8601.
pub fn format_datetime(datetime: &NaiveDateTime, code: &str) -> String {
    let pattern = to_chrono_format(code);
    let mut text = String::new();
    if write!(text, "{}", datetime.format(&pattern)).is_ok() && !text.is_empty() {
        return text;
    }
    datetime.format("%Y-%m-%dT%H:%M:%S").to_string()
}

fn first_section(code: &str) -> &str {
    let mut is_literal = false;
    for (index, character) in code.char_indices() {
        match character {
            '"' => is_literal = !is_literal,
            ';' if !is_literal => return &code[..index],
            _ => (),
        }
    }
    code
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_date_formats() {
        assert!(is_date_format_code("d-mmm-yy;@"));
        assert!(is_date_format_code("yyyy-mm-dd hh:mm:ss"));
        assert!(is_date_format_code("[$-409]h:mm AM/PM"));
        assert!(!is_date_format_code("General"));
        assert!(!is_date_format_code("[Red]0.00"));
        assert!(!is_date_format_code("0.00\"days\""));
        assert!(!is_date_format_code("_(* #,##0_);_(* \\(#,##0\\)"));

        assert!(NumberFormat::DATETIME.is_date());
        assert!(NumberFormat::Builtin(31).is_date());
        assert!(!NumberFormat::Builtin(23).is_date());
        assert!(!NumberFormat::PERCENT.is_date());
        assert!(NumberFormat::custom("mm/dd").is_date());
    }

    #[test]
    fn builtin_codes() {
        assert_eq!(NumberFormat::DATE.code(), "m/d/yyyy");
        assert_eq!(NumberFormat::DATETIME.code(), "m/d/yyyy h:mm");
        assert_eq!(NumberFormat::Builtin(31).code(), "yyyy-mm-dd");
        assert_eq!(NumberFormat::builtin(49), Some(NumberFormat::TEXT));
        assert_eq!(NumberFormat::builtin(30), Some(NumberFormat::Builtin(30)));
        assert_eq!(NumberFormat::builtin(100), None);
    }

    #[test]
    fn chrono_patterns() {
        assert_eq!(to_chrono_format("yyyy-mm-dd hh:mm:ss"), "%Y-%m-%d %H:%M:%S");
        assert_eq!(to_chrono_format("m/d/yyyy h:mm"), "%-m/%-d/%Y %-H:%M");
        assert_eq!(to_chrono_format("d-mmm-yy;@"), "%-d-%b-%y");
        assert_eq!(to_chrono_format("h:mm:ss AM/PM"), "%-I:%M:%S %p");
        assert_eq!(to_chrono_format("mm:ss.0"), "%M:%S%.3f");
        assert_eq!(to_chrono_format("dddd, mmmm d"), "%A, %B %-d");
        assert_eq!(to_chrono_format("[$-409]yyyy\"年\"m\"月\""), "%Y年%-m月");
        assert_eq!(to_chrono_format("[h]:mm"), "%H:%M");
    }

    #[test]
    fn formats_datetimes() {
        let datetime = chrono::NaiveDate::from_ymd_opt(2024, 3, 5)
            .and_then(|date| date.and_hms_opt(14, 7, 9))
            .unwrap();
        assert_eq!(format_datetime(&datetime, "yyyy-mm-dd"), "2024-03-05");
        assert_eq!(format_datetime(&datetime, "m/d/yyyy h:mm"), "3/5/2024 14:07");
        assert_eq!(format_datetime(&datetime, "h:mm AM/PM"), "2:07 PM");
        assert_eq!(format_datetime(&datetime, "0%"), "0%");
        assert_eq!(format_datetime(&datetime, ""), "2024-03-05T14:07:09");
    }
}
