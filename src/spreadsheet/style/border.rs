use super::Color;
use super::StyleError;
use std::str::FromStr;

/// Side of a cell a [`BorderPart`] is drawn on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BorderName {
    Left,
    Right,
    Top,
    Bottom,
}

impl FromStr for BorderName {
    type Err = StyleError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            "top" => Ok(Self::Top),
            "bottom" => Ok(Self::Bottom),
            _ => Err(StyleError::InvalidBorderName(name.to_owned())),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum BorderWidth {
    Thin,
    #[default]
    Medium,
    Thick,
}

impl FromStr for BorderWidth {
    type Err = StyleError;

    fn from_str(width: &str) -> Result<Self, Self::Err> {
        match width {
            "thin" => Ok(Self::Thin),
            "medium" => Ok(Self::Medium),
            "thick" => Ok(Self::Thick),
            _ => Err(StyleError::InvalidBorderWidth(width.to_owned())),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum BorderStyle {
    None,
    #[default]
    Solid,
    Dashed,
    Dotted,
    Double,
}

impl FromStr for BorderStyle {
    type Err = StyleError;

    fn from_str(style: &str) -> Result<Self, Self::Err> {
        match style {
            "none" => Ok(Self::None),
            "solid" => Ok(Self::Solid),
            "dashed" => Ok(Self::Dashed),
            "dotted" => Ok(Self::Dotted),
            "double" => Ok(Self::Double),
            _ => Err(StyleError::InvalidBorderStyle(style.to_owned())),
        }
    }
}

/// One side of a border
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BorderPart {
    pub name: BorderName,
    pub color: Color,
    pub width: BorderWidth,
    pub style: BorderStyle,
}

impl BorderPart {
    pub fn new(name: BorderName, color: Color, width: BorderWidth, style: BorderStyle) -> Self {
        BorderPart { name, color, width, style }
    }

    /// Builds a part from its textual description, e.g. `("top", "#000000", "thin", "dashed")`.
    pub fn parse(name: &str, color: &str, width: &str, style: &str) -> Result<Self, StyleError> {
        Ok(BorderPart {
            name: name.parse()?,
            color: Color::parse(color)?,
            width: width.parse()?,
            style: style.parse()?,
        })
    }

    /// SpreadsheetML `style` attribute, `None` when nothing is drawn
    pub(crate) fn xlsx_style(&self) -> Option<&'static str> {
        let style = match (self.style, self.width) {
            (BorderStyle::None, _) => return None,
            (BorderStyle::Solid, BorderWidth::Thin) => "thin",
            (BorderStyle::Solid, BorderWidth::Medium) => "medium",
            (BorderStyle::Solid, BorderWidth::Thick) => "thick",
            (BorderStyle::Dotted, BorderWidth::Thin) => "dotted",
            (BorderStyle::Dotted, _) => "mediumDashDot",
            (BorderStyle::Dashed, BorderWidth::Thin) => "dashed",
            (BorderStyle::Dashed, _) => "mediumDashed",
            (BorderStyle::Double, _) => "double",
        };
        Some(style)
    }

    /// OpenDocument `fo:border-*` value such as `0.75pt solid #000000`
    pub(crate) fn ods_value(&self) -> String {
        let width = match self.width {
            BorderWidth::Thin => "0.75pt",
            BorderWidth::Medium => "1.75pt",
            BorderWidth::Thick => "2.5pt",
        };
        let style = match self.style {
            BorderStyle::None => return "none".to_owned(),
            BorderStyle::Solid => "solid",
            BorderStyle::Dashed => "dashed",
            BorderStyle::Dotted => "dotted",
            BorderStyle::Double => "double",
        };
        format!("{width} {style} {}", self.color)
    }
}

/// Up to four independently configured sides
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Border {
    pub left: Option<BorderPart>,
    pub right: Option<BorderPart>,
    pub top: Option<BorderPart>,
    pub bottom: Option<BorderPart>,
}

impl Border {
    pub fn new(parts: impl IntoIterator<Item = BorderPart>) -> Self {
        parts.into_iter().fold(Border::default(), Border::with_part)
    }

    /// Sets the side named by `part`, replacing any previous part on that side.
    pub fn with_part(mut self, part: BorderPart) -> Self {
        let side = match part.name {
            BorderName::Left => &mut self.left,
            BorderName::Right => &mut self.right,
            BorderName::Top => &mut self.top,
            BorderName::Bottom => &mut self.bottom,
        };
        *side = Some(part);
        self
    }

    /// The same part on all four sides
    pub fn all(color: Color, width: BorderWidth, style: BorderStyle) -> Self {
        Border::new([BorderName::Left, BorderName::Right, BorderName::Top, BorderName::Bottom]
            .map(|name| BorderPart::new(name, color.clone(), width, style)))
    }

    pub fn parts(&self) -> impl Iterator<Item = &BorderPart> {
        [&self.left, &self.right, &self.top, &self.bottom]
            .into_iter()
            .flatten()
    }

    pub(crate) fn to_xlsx_xml(&self) -> String {
        let mut xml = String::from("<border>");
        for (tag, part) in [("left", &self.left), ("right", &self.right), ("top", &self.top), ("bottom", &self.bottom)] {
            match part.as_ref().and_then(|part| part.xlsx_style().map(|style| (part, style))) {
                Some((part, style)) => xml.push_str(&format!(
                    "<{tag} style=\"{style}\"><color rgb=\"{}\"/></{tag}>",
                    part.color.argb()
                )),
                None => xml.push_str(&format!("<{tag}/>")),
            }
        }
        xml.push_str("<diagonal/></border>");
        xml
    }

    pub(crate) fn to_ods_attributes(&self) -> String {
        let mut attributes = String::new();
        for (name, part) in [("left", &self.left), ("right", &self.right), ("top", &self.top), ("bottom", &self.bottom)] {
            if let Some(part) = part {
                attributes.push_str(&format!(" fo:border-{name}=\"{}\"", part.ods_value()));
            }
        }
        attributes
    }
}
