//! Cell styles and the registry that deduplicates them into container style tables.

mod border;
mod color;
pub mod number_format;
mod registry;

pub use border::Border;
pub use border::BorderName;
pub use border::BorderPart;
pub use border::BorderStyle;
pub use border::BorderWidth;
pub use color::Color;
pub use number_format::NumberFormat;
pub use registry::StyleRegistry;

use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellValue;
use thiserror::Error;

/// Errors raised while building styles
#[derive(Error, Debug)]
pub enum StyleError {
    #[error("Invalid border name '{0}', expected left, right, top or bottom")]
    InvalidBorderName(String),

    #[error("Invalid border style '{0}', expected none, solid, dashed, dotted or double")]
    InvalidBorderStyle(String),

    #[error("Invalid border width '{0}', expected thin, medium or thick")]
    InvalidBorderWidth(String),

    #[error("Invalid color '{0}'")]
    InvalidColor(String),

    #[error("Too many custom number formats, '{0}' does not fit in the format table")]
    TooManyNumberFormats(String),
}

/// Font attributes; unset attributes inherit from the row style or the document default
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Font {
    pub name: Option<String>,
    /// Size in points
    pub size: Option<u16>,
    pub bold: Option<bool>,
    pub italic: Option<bool>,
    pub underline: Option<bool>,
    pub strikethrough: Option<bool>,
    pub color: Option<Color>,
}

impl Font {
    pub(crate) const DEFAULT_NAME: &'static str = "Calibri";
    pub(crate) const DEFAULT_SIZE: u16 = 11;

    fn merge_with(&self, base: &Font) -> Font {
        Font {
            name: self.name.clone().or_else(|| base.name.clone()),
            size: self.size.or(base.size),
            bold: self.bold.or(base.bold),
            italic: self.italic.or(base.italic),
            underline: self.underline.or(base.underline),
            strikethrough: self.strikethrough.or(base.strikethrough),
            color: self.color.clone().or_else(|| base.color.clone()),
        }
    }
}

/// Visual attributes of a cell or a row.
///
/// Equality is structural: two styles with the same attributes register under the same id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Style {
    pub font: Font,
    pub background_color: Option<Color>,
    pub border: Option<Border>,
    pub number_format: Option<NumberFormat>,
    pub wrap_text: Option<bool>,
}

/// Builder methods each set one attribute and return the style, so they chain:
///
/// ```
/// use sheet_stream::Style;
///
/// let header = Style::new().bold().font_size(14).wrap_text(true);
/// assert!(!header.is_default());
/// ```
impl Style {
    /// Style with no attribute set
    pub fn new() -> Self {
        Style::default()
    }

    pub fn bold(mut self) -> Self {
        self.font.bold = Some(true);
        self
    }

    pub fn italic(mut self) -> Self {
        self.font.italic = Some(true);
        self
    }

    pub fn underline(mut self) -> Self {
        self.font.underline = Some(true);
        self
    }

    pub fn strikethrough(mut self) -> Self {
        self.font.strikethrough = Some(true);
        self
    }

    /// Font size in points
    pub fn font_size(mut self, points: u16) -> Self {
        self.font.size = Some(points);
        self
    }

    pub fn font_color(mut self, color: Color) -> Self {
        self.font.color = Some(color);
        self
    }

    /// Font family, such as `Calibri`
    pub fn font_name(mut self, name: &str) -> Self {
        self.font.name = Some(name.to_owned());
        self
    }

    /// Solid fill color of the cell
    pub fn background_color(mut self, color: Color) -> Self {
        self.background_color = Some(color);
        self
    }

    pub fn border(mut self, border: Border) -> Self {
        self.border = Some(border);
        self
    }

    /// Sets the number format.
    ///
    /// # Arguments
    /// * `format` - A built-in format such as [`NumberFormat::DATE`], or a custom one
    ///
    /// Numbers written with a date format read back as date cells.
    pub fn number_format(mut self, format: NumberFormat) -> Self {
        self.number_format = Some(format);
        self
    }

    /// Shorthand for a custom format code such as `0.00%` or `yyyy-mm-dd hh:mm`
    pub fn custom_format(self, code: &str) -> Self {
        self.number_format(NumberFormat::custom(code))
    }

    /// Wraps long text inside the cell instead of overflowing into its neighbours
    pub fn wrap_text(mut self, wrap: bool) -> Self {
        self.wrap_text = Some(wrap);
        self
    }

    /// True when no attribute is set
    pub fn is_default(&self) -> bool {
        *self == Style::default()
    }

    /// Combines this style with `base`: attributes set here win, unset ones fall back to `base`.
    pub fn merge_with(&self, base: &Style) -> Style {
        Style {
            font: self.font.merge_with(&base.font),
            background_color: self.background_color.clone().or_else(|| base.background_color.clone()),
            border: self.border.clone().or_else(|| base.border.clone()),
            number_format: self.number_format.clone().or_else(|| base.number_format.clone()),
            wrap_text: self.wrap_text.or(base.wrap_text),
        }
    }

    /// Whether numbers shown with this style are dates
    pub fn is_date(&self) -> bool {
        self.number_format.as_ref().is_some_and(NumberFormat::is_date)
    }
}

/// Style a cell is written with: its own attributes over those of its row.
///
/// Date-times without a number format get the default date-time format.
pub(crate) fn cell_style(cell: &Cell, row_style: Option<&Style>) -> Style {
    let mut style = match (cell.style(), row_style) {
        (Some(style), Some(base)) => style.merge_with(base),
        (Some(style), None) => style.clone(),
        (None, Some(base)) => base.clone(),
        (None, None) => Style::default(),
    };
    let is_datetime = match cell.value() {
        CellValue::DateTime(_) => true,
        CellValue::Formula { cached, .. } => matches!(cached.as_deref(), Some(CellValue::DateTime(_))),
        _ => false,
    };
    if is_datetime && style.number_format.is_none() {
        style.number_format = Some(NumberFormat::DATETIME);
    }
    style
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_attributes_win_over_row_attributes() {
        let row = Style::new().bold().font_size(14).background_color(Color::black());
        let cell = Style::new().font_size(9).italic().wrap_text(true);
        let merged = cell.merge_with(&row);
        assert_eq!(merged.font.size, Some(9));
        assert_eq!(merged.font.bold, Some(true));
        assert_eq!(merged.font.italic, Some(true));
        assert_eq!(merged.background_color, Some(Color::black()));
        assert_eq!(merged.wrap_text, Some(true));
        assert!(Style::new().merge_with(&Style::new()).is_default());
    }

    #[test]
    fn date_styles() {
        assert!(Style::new().number_format(NumberFormat::DATE).is_date());
        assert!(Style::new().custom_format("hh:mm").is_date());
        assert!(!Style::new().custom_format("0.00").is_date());
        assert!(!Style::new().is_date());
    }

    #[test]
    fn cell_styles_fall_back_to_the_row() {
        let row = Style::new().bold();
        let cell = Cell::from(1.0).with_style(Style::new().italic());
        let style = cell_style(&cell, Some(&row));
        assert_eq!((style.font.bold, style.font.italic), (Some(true), Some(true)));
        assert_eq!(cell_style(&Cell::from(1.0), Some(&row)), row);
        assert!(cell_style(&Cell::from(1.0), None).is_default());

        let date = chrono::NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .unwrap();
        assert_eq!(cell_style(&Cell::from(date), None).number_format, Some(NumberFormat::DATETIME));
        let dated = Cell::from(date).with_style(Style::new().number_format(NumberFormat::DATE));
        assert_eq!(cell_style(&dated, None).number_format, Some(NumberFormat::DATE));
    }
}
