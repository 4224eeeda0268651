use crate::spreadsheet::style::Style;
use chrono::Duration;
use chrono::NaiveDate;
use chrono::NaiveDateTime;
use std::fmt::Display;

/// Milliseconds per day
const DAY_MILLISECONDS: i64 = 86_400_000;

/// Days between 1899-12-30 and 1904-01-01
const EPOCH_1904_OFFSET: i64 = 1_462;

/// Maximum number of characters a cell may hold
pub const MAX_CELL_CHARACTERS: usize = 32_767;

/// Typed content of a cell
#[derive(Clone, Debug, Default, PartialEq)]
pub enum CellValue {
    #[default]
    Empty,
    Boolean(bool),
    Number(f64),
    String(String),
    /// Number carrying a date format, decoded to a calendar date and time
    DateTime(NaiveDateTime),
    /// Formula expression (without the leading `=`) and its last computed result
    Formula {
        expression: String,
        cached: Option<Box<CellValue>>,
    },
    /// Error literal such as `#DIV/0!`
    Error(String),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::String(value) => value.is_empty(),
            _ => false,
        }
    }

    /// Name of the variant, used in error messages
    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            CellValue::Empty => "empty",
            CellValue::Boolean(_) => "boolean",
            CellValue::Number(_) => "number",
            CellValue::String(_) => "string",
            CellValue::DateTime(_) => "datetime",
            CellValue::Formula { .. } => "formula",
            CellValue::Error(_) => "error",
        }
    }
}

impl Display for CellValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Boolean(value) => write!(f, "{}", if *value { "TRUE" } else { "FALSE" }),
            CellValue::Number(value) => write!(f, "{value}"),
            CellValue::String(value) | CellValue::Error(value) => write!(f, "{value}"),
            CellValue::DateTime(value) => write!(f, "{}", value.format("%Y-%m-%d %H:%M:%S")),
            CellValue::Formula { expression, .. } => write!(f, "={expression}"),
        }
    }
}

macro_rules! impl_from_value {
    ($($source:ty => $variant:ident($convert:expr)),* $(,)?) => {
        $(
            impl From<$source> for CellValue {
                fn from(value: $source) -> Self {
                    CellValue::$variant($convert(value))
                }
            }

            impl From<$source> for Cell {
                fn from(value: $source) -> Self {
                    Cell::new(CellValue::from(value))
                }
            }
        )*
    };
}

impl_from_value! {
    bool => Boolean(|value| value),
    f64 => Number(|value| value),
    i32 => Number(f64::from),
    i64 => Number(|value: i64| value as f64),
    u32 => Number(f64::from),
    &str => String(str::to_owned),
    String => String(|value| value),
    NaiveDateTime => DateTime(|value| value),
}

/// Value plus optional style
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Cell {
    value: CellValue,
    style: Option<Style>,
}

impl Cell {
    pub fn new(value: CellValue) -> Self {
        Cell { value, style: None }
    }

    pub fn empty() -> Self {
        Cell::default()
    }

    /// Formula cell; a leading `=` is dropped
    pub fn formula(expression: &str) -> Self {
        Cell::new(CellValue::Formula {
            expression: expression.strip_prefix('=').unwrap_or(expression).to_owned(),
            cached: None,
        })
    }

    pub fn error(literal: &str) -> Self {
        Cell::new(CellValue::Error(literal.to_owned()))
    }

    pub fn with_style(mut self, style: Style) -> Self {
        self.style = Some(style);
        self
    }

    pub fn set_style(&mut self, style: Style) {
        self.style = Some(style);
    }

    pub fn value(&self) -> &CellValue {
        &self.value
    }

    pub fn into_value(self) -> CellValue {
        self.value
    }

    pub fn style(&self) -> Option<&Style> {
        self.style.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Date cells are decoded date-times and numbers whose style carries a date format
    pub fn is_date(&self) -> bool {
        match &self.value {
            CellValue::DateTime(_) => true,
            CellValue::Number(_) => self.style.as_ref().is_some_and(Style::is_date),
            _ => false,
        }
    }
}

impl From<CellValue> for Cell {
    fn from(value: CellValue) -> Self {
        Cell::new(value)
    }
}

fn base_date() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// Converts a date serial number to a date-time, rounded to the millisecond.
///
/// The 1900 system counts the fictitious 1900-02-29, so serials before 60 are shifted by
/// one day; the 1904 system counts from 1904-01-01.
pub fn serial_to_datetime(serial: f64, is_1904: bool) -> Option<NaiveDateTime> {
    if !serial.is_finite() {
        return None;
    }
    let milliseconds = (serial * DAY_MILLISECONDS as f64).round();
    if milliseconds.abs() > i64::MAX as f64 / 2.0 {
        return None;
    }
    let milliseconds = milliseconds as i64;
    let mut days = milliseconds.div_euclid(DAY_MILLISECONDS);
    let time = milliseconds.rem_euclid(DAY_MILLISECONDS);
    if is_1904 {
        days += EPOCH_1904_OFFSET;
    } else if days < 60 {
        days += 1;
    }
    base_date()
        .checked_add_signed(Duration::try_days(days)?)?
        .checked_add_signed(Duration::milliseconds(time))
}

/// Converts a date-time to its date serial number, inverse of [`serial_to_datetime`].
pub fn datetime_to_serial(datetime: &NaiveDateTime, is_1904: bool) -> f64 {
    let milliseconds = datetime.signed_duration_since(base_date()).num_milliseconds();
    let mut days = milliseconds.div_euclid(DAY_MILLISECONDS);
    let time = milliseconds.rem_euclid(DAY_MILLISECONDS);
    if is_1904 {
        days -= EPOCH_1904_OFFSET;
    } else if days < 61 {
        days -= 1;
    }
    days as f64 + time as f64 / DAY_MILLISECONDS as f64
}

/// Converts an ISO 8601 duration such as `PT13H30M` to a date-time on the 1899-12-30 base.
pub(crate) fn duration_to_datetime(value: &str) -> Option<NaiveDateTime> {
    let duration = value.parse::<iso8601_duration::Duration>().ok()?;
    let milliseconds = (duration.day as f64 * DAY_MILLISECONDS as f64
        + duration.hour as f64 * 3_600_000.0
        + duration.minute as f64 * 60_000.0
        + duration.second as f64 * 1_000.0)
        .round() as i64;
    base_date().checked_add_signed(Duration::milliseconds(milliseconds))
}

/// Parses an ISO 8601 date or date-time such as `2024-01-31` or `2024-01-31T14:30:00.5`.
pub(crate) fn parse_iso_datetime(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim().trim_end_matches('Z');
    if value.contains('T') {
        NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f").ok()
    } else {
        NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
    }
}
