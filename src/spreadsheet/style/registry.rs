use super::number_format::FIRST_CUSTOM_FORMAT_ID;
use super::Border;
use super::Color;
use super::Font;
use super::NumberFormat;
use super::Style;
use super::StyleError;
use crate::helpers::xml::escape;
use std::collections::BTreeSet;
use std::collections::HashMap;

/// Indexes of one `cellXfs` record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CellFormat {
    font_id: usize,
    fill_id: usize,
    border_id: usize,
    number_format_id: u16,
    wrap_text: bool,
}

/// Document-wide style table.
///
/// Styles are deduplicated structurally and numbered in registration order, id 0 being the
/// default style. Fonts, fills, borders and number formats are deduplicated separately
/// since SpreadsheetML stores them in their own tables.
pub struct StyleRegistry {
    styles: Vec<Style>,
    style_index: HashMap<Style, u32>,
    cell_formats: Vec<CellFormat>,
    fonts: Vec<Font>,
    font_index: HashMap<Font, usize>,
    fills: Vec<Option<Color>>,
    fill_index: HashMap<Color, usize>,
    borders: Vec<Border>,
    border_index: HashMap<Border, usize>,
    number_formats: Vec<(u16, String)>,
    number_format_index: HashMap<String, u16>,
}

impl Default for StyleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StyleRegistry {
    pub fn new() -> Self {
        let mut registry = StyleRegistry {
            styles: Vec::new(),
            style_index: HashMap::new(),
            cell_formats: Vec::new(),
            fonts: Vec::new(),
            font_index: HashMap::new(),
            // 0 is "none" and 1 is the mandatory "gray125" pattern
            fills: vec![None, None],
            fill_index: HashMap::new(),
            borders: Vec::new(),
            border_index: HashMap::new(),
            number_formats: Vec::new(),
            number_format_index: HashMap::new(),
        };
        let default = Style::default();
        let cell_format = CellFormat {
            font_id: registry.intern_font(&default.font),
            fill_id: 0,
            border_id: registry.intern_border(None),
            number_format_id: 0,
            wrap_text: false,
        };
        registry.insert(&default, cell_format);
        registry
    }

    /// Returns the id of `style`, registering it on first sight.
    ///
    /// # Arguments
    /// * `style` - Fully merged cell style
    ///
    /// # Returns
    /// * `Result<u32, StyleError>` - Id of the style; `TooManyNumberFormats` once custom
    ///   number format ids would pass `u16::MAX`
    pub fn register(&mut self, style: &Style) -> Result<u32, StyleError> {
        if let Some(id) = self.style_index.get(style) {
            return Ok(*id);
        }

        let number_format_id = self.intern_number_format(style.number_format.as_ref())?;
        let cell_format = CellFormat {
            font_id: self.intern_font(&style.font),
            fill_id: self.intern_fill(style.background_color.as_ref()),
            border_id: self.intern_border(style.border.as_ref()),
            number_format_id,
            wrap_text: style.wrap_text.unwrap_or(false),
        };
        Ok(self.insert(style, cell_format))
    }

    fn insert(&mut self, style: &Style, cell_format: CellFormat) -> u32 {
        let id = self.styles.len() as u32;
        self.styles.push(style.clone());
        self.style_index.insert(style.clone(), id);
        self.cell_formats.push(cell_format);
        id
    }

    /// Registered style by id
    pub fn style(&self, id: u32) -> Option<&Style> {
        self.styles.get(id as usize)
    }

    /// Number of registered styles, the default one included
    pub fn len(&self) -> usize {
        self.styles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }

    fn intern_font(&mut self, font: &Font) -> usize {
        if let Some(id) = self.font_index.get(font) {
            return *id;
        }
        let id = self.fonts.len();
        self.font_index.insert(font.clone(), id);
        self.fonts.push(font.clone());
        id
    }

    fn intern_fill(&mut self, color: Option<&Color>) -> usize {
        let Some(color) = color else {
            return 0;
        };
        if let Some(id) = self.fill_index.get(color) {
            return *id;
        }
        let id = self.fills.len();
        self.fill_index.insert(color.clone(), id);
        self.fills.push(Some(color.clone()));
        id
    }

    fn intern_border(&mut self, border: Option<&Border>) -> usize {
        let empty = Border::default();
        let border = border.unwrap_or(&empty);
        if let Some(id) = self.border_index.get(border) {
            return *id;
        }
        let id = self.borders.len();
        self.border_index.insert(border.clone(), id);
        self.borders.push(border.clone());
        id
    }

    fn intern_number_format(&mut self, format: Option<&NumberFormat>) -> Result<u16, StyleError> {
        match format {
            None => Ok(0),
            Some(NumberFormat::Builtin(id)) => Ok(*id),
            Some(NumberFormat::Custom(code)) => {
                if let Some(id) = self.number_format_index.get(code) {
                    return Ok(*id);
                }
                let id = u16::try_from(self.number_formats.len())
                    .ok()
                    .and_then(|count| FIRST_CUSTOM_FORMAT_ID.checked_add(count))
                    .ok_or_else(|| StyleError::TooManyNumberFormats(code.clone()))?;
                self.number_format_index.insert(code.clone(), id);
                self.number_formats.push((id, code.clone()));
                Ok(id)
            }
        }
    }

    /// Renders `xl/styles.xml`
    pub(crate) fn to_xlsx_xml(&self) -> String {
        let mut xml = String::from(concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
            "\n",
            r#"<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#,
        ));

        if !self.number_formats.is_empty() {
            xml.push_str(&format!(r#"<numFmts count="{}">"#, self.number_formats.len()));
            for (id, code) in &self.number_formats {
                xml.push_str(&format!(r#"<numFmt numFmtId="{id}" formatCode="{}"/>"#, escape(code)));
            }
            xml.push_str("</numFmts>");
        }

        xml.push_str(&format!(r#"<fonts count="{}">"#, self.fonts.len()));
        for font in &self.fonts {
            xml.push_str(&font_xml(font));
        }
        xml.push_str("</fonts>");

        xml.push_str(&format!(r#"<fills count="{}">"#, self.fills.len()));
        for (id, fill) in self.fills.iter().enumerate() {
            match fill {
                Some(color) => xml.push_str(&format!(
                    r#"<fill><patternFill patternType="solid"><fgColor rgb="{}"/><bgColor indexed="64"/></patternFill></fill>"#,
                    color.argb()
                )),
                None if id == 1 => xml.push_str(r#"<fill><patternFill patternType="gray125"/></fill>"#),
                None => xml.push_str(r#"<fill><patternFill patternType="none"/></fill>"#),
            }
        }
        xml.push_str("</fills>");

        xml.push_str(&format!(r#"<borders count="{}">"#, self.borders.len()));
        for border in &self.borders {
            xml.push_str(&border.to_xlsx_xml());
        }
        xml.push_str("</borders>");

        xml.push_str(r#"<cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs>"#);

        xml.push_str(&format!(r#"<cellXfs count="{}">"#, self.cell_formats.len()));
        for format in &self.cell_formats {
            xml.push_str(&format!(
                r#"<xf numFmtId="{}" fontId="{}" fillId="{}" borderId="{}" xfId="0""#,
                format.number_format_id, format.font_id, format.fill_id, format.border_id
            ));
            for (applied, attribute) in [
                (format.number_format_id != 0, "applyNumberFormat"),
                (format.font_id != 0, "applyFont"),
                (format.fill_id != 0, "applyFill"),
                (format.border_id != 0, "applyBorder"),
            ] {
                if applied {
                    xml.push_str(&format!(r#" {attribute}="1""#));
                }
            }
            if format.wrap_text {
                xml.push_str(r#" applyAlignment="1"><alignment wrapText="1"/></xf>"#);
            } else {
                xml.push_str("/>");
            }
        }
        xml.push_str("</cellXfs>");

        xml.push_str(r#"<cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles>"#);
        xml.push_str("</styleSheet>");
        xml
    }

    /// Renders `<style:font-face>` declarations for every font name in use
    pub(crate) fn to_ods_font_faces(&self) -> String {
        let names: BTreeSet<&str> = self
            .fonts
            .iter()
            .map(|font| font.name.as_deref().unwrap_or(Font::DEFAULT_NAME))
            .collect();
        let mut xml = String::from("<office:font-face-decls>");
        for name in names {
            let name = escape(name);
            xml.push_str(&format!(r#"<style:font-face style:name="{name}" svg:font-family="{name}"/>"#));
        }
        xml.push_str("</office:font-face-decls>");
        xml
    }

    /// Renders the `ce{id}` cell styles of `<office:automatic-styles>`
    pub(crate) fn to_ods_cell_styles(&self) -> String {
        let mut xml = String::new();
        for (id, style) in self.styles.iter().enumerate() {
            xml.push_str(&format!(
                r#"<style:style style:name="ce{id}" style:family="table-cell" style:parent-style-name="Default">"#
            ));

            let mut cell_properties = String::new();
            if let Some(color) = &style.background_color {
                cell_properties.push_str(&format!(r#" fo:background-color="{color}""#));
            }
            if let Some(border) = &style.border {
                cell_properties.push_str(&border.to_ods_attributes());
            }
            if style.wrap_text == Some(true) {
                cell_properties.push_str(r#" fo:wrap-option="wrap""#);
            }
            if !cell_properties.is_empty() {
                xml.push_str(&format!("<style:table-cell-properties{cell_properties}/>"));
            }

            let font = &style.font;
            let mut text_properties = String::new();
            if let Some(name) = &font.name {
                text_properties.push_str(&format!(r#" style:font-name="{}""#, escape(name)));
            }
            if let Some(size) = font.size {
                text_properties.push_str(&format!(r#" fo:font-size="{size}pt""#));
            }
            if font.bold == Some(true) {
                text_properties.push_str(r#" fo:font-weight="bold""#);
            }
            if font.italic == Some(true) {
                text_properties.push_str(r#" fo:font-style="italic""#);
            }
            if font.underline == Some(true) {
                text_properties.push_str(r#" style:text-underline-style="solid" style:text-underline-width="auto" style:text-underline-color="font-color""#);
            }
            if font.strikethrough == Some(true) {
                text_properties.push_str(r#" style:text-line-through-style="solid""#);
            }
            if let Some(color) = &font.color {
                text_properties.push_str(&format!(r#" fo:color="{color}""#));
            }
            if !text_properties.is_empty() {
                xml.push_str(&format!("<style:text-properties{text_properties}/>"));
            }

            xml.push_str("</style:style>");
        }
        xml
    }
}

fn font_xml(font: &Font) -> String {
    let mut xml = String::from("<font>");
    if font.bold == Some(true) {
        xml.push_str("<b/>");
    }
    if font.italic == Some(true) {
        xml.push_str("<i/>");
    }
    if font.strikethrough == Some(true) {
        xml.push_str("<strike/>");
    }
    if font.underline == Some(true) {
        xml.push_str("<u/>");
    }
    xml.push_str(&format!(r#"<sz val="{}"/>"#, font.size.unwrap_or(Font::DEFAULT_SIZE)));
    if let Some(color) = &font.color {
        xml.push_str(&format!(r#"<color rgb="{}"/>"#, color.argb()));
    }
    xml.push_str(&format!(
        r#"<name val="{}"/>"#,
        escape(font.name.as_deref().unwrap_or(Font::DEFAULT_NAME))
    ));
    xml.push_str("</font>");
    xml
}
