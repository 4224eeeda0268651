use super::StyleError;
use std::fmt::Display;

/// Opaque ARGB color, stored upper-case such as `FF1F4E79`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Color(String);

impl Color {
    /// Builds a color from `RRGGBB`, `#RRGGBB` or `AARRGGBB` hex notation.
    pub fn parse(hex: &str) -> Result<Self, StyleError> {
        let digits = hex.trim().trim_start_matches('#');
        if !digits.chars().all(|character| character.is_ascii_hexdigit()) {
            Err(StyleError::InvalidColor(hex.to_owned()))?;
        }
        match digits.len() {
            6 => Ok(Color(format!("FF{}", digits.to_ascii_uppercase()))),
            8 => Ok(Color(digits.to_ascii_uppercase())),
            _ => Err(StyleError::InvalidColor(hex.to_owned())),
        }
    }

    /// Builds an opaque color from its components.
    pub fn rgb(red: u8, green: u8, blue: u8) -> Self {
        Color(format!("FF{red:02X}{green:02X}{blue:02X}"))
    }

    pub fn black() -> Self {
        Self::rgb(0, 0, 0)
    }

    pub fn white() -> Self {
        Self::rgb(0xFF, 0xFF, 0xFF)
    }

    /// `AARRGGBB` notation used by SpreadsheetML
    pub fn argb(&self) -> &str {
        &self.0
    }

    /// `RRGGBB` notation used by OpenDocument
    pub fn rgb_hex(&self) -> &str {
        &self.0[2..]
    }
}

impl Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.rgb_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notations() {
        assert_eq!(Color::parse("#1f4e79").unwrap().argb(), "FF1F4E79");
        assert_eq!(Color::parse("801F4E79").unwrap().rgb_hex(), "1F4E79");
        assert_eq!(Color::rgb(255, 0, 16).to_string(), "#FF0010");
        assert!(Color::parse("red").is_err());
        assert!(Color::parse("#12345").is_err());
    }
}
