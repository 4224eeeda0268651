use crate::spreadsheet::SpreadsheetError;
use regex::Regex;
use std::sync::LazyLock;

/// Longest sheet name accepted by spreadsheet applications
pub const MAX_SHEET_NAME_LENGTH: usize = 31;

static FORBIDDEN_NAME_CHARACTERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\\/?*\[\]:]").expect("Hardcode regex pattern"));

/// Worksheet metadata
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sheet {
    index: usize,
    name: String,
    is_active: bool,
    is_visible: bool,
}

impl Sheet {
    pub(crate) fn new(index: usize, name: &str, is_active: bool, is_visible: bool) -> Self {
        Sheet {
            index,
            name: name.to_owned(),
            is_active,
            is_visible,
        }
    }

    /// Zero-based position in the document
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the sheet is the one selected when the document opens
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn is_visible(&self) -> bool {
        self.is_visible
    }
}

/// Checks a sheet name against the container rules and the names already in use.
///
/// Names are compared case-insensitively, as spreadsheet applications do.
pub fn validate_sheet_name<'a>(name: &str, used_names: impl IntoIterator<Item = &'a str>) -> Result<(), SpreadsheetError> {
    let invalid = |reason: &str| SpreadsheetError::InvalidSheetName {
        name: name.to_owned(),
        reason: reason.to_owned(),
    };
    if name.is_empty() {
        Err(invalid("name is empty"))?;
    }
    if name.chars().count() > MAX_SHEET_NAME_LENGTH {
        Err(invalid("name is longer than 31 characters"))?;
    }
    if FORBIDDEN_NAME_CHARACTERS.is_match(name) {
        Err(invalid("name contains one of \\ / ? * [ ] :"))?;
    }
    if name.starts_with('\'') || name.ends_with('\'') {
        Err(invalid("name starts or ends with a single quote"))?;
    }
    let lower = name.to_lowercase();
    if used_names.into_iter().any(|used| used.to_lowercase() == lower) {
        Err(invalid("name is already used in this document"))?;
    }
    Ok(())
}

/// Sheets of a document being written, with the current sheet rows go to.
///
/// The current sheet is also the active one when the document is opened.
#[derive(Clone, Debug)]
pub struct Workbook {
    sheets: Vec<Sheet>,
    current: usize,
}

impl Default for Workbook {
    fn default() -> Self {
        Self::new()
    }
}

impl Workbook {
    /// Creates a document holding a single sheet named `Sheet1`
    pub fn new() -> Self {
        Workbook {
            sheets: vec![Sheet::new(0, "Sheet1", true, true)],
            current: 0,
        }
    }

    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }

    pub fn current(&self) -> &Sheet {
        &self.sheets[self.current]
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Appends a sheet with the first free `Sheet{n}` name and returns its index.
    pub fn add_sheet(&mut self) -> usize {
        let index = self.sheets.len();
        let mut number = index + 1;
        let name = loop {
            let candidate = format!("Sheet{number}");
            if validate_sheet_name(&candidate, self.names()).is_ok() {
                break candidate;
            }
            number += 1;
        };
        self.sheets.push(Sheet::new(index, &name, false, true));
        index
    }

    /// Makes the sheet at `index` current and active
    pub fn set_current(&mut self, index: usize) -> Result<(), SpreadsheetError> {
        if index >= self.sheets.len() {
            Err(SpreadsheetError::SheetNotFound(index.to_string()))?;
        }
        self.current = index;
        for sheet in &mut self.sheets {
            sheet.is_active = sheet.index == index;
        }
        Ok(())
    }

    /// Renames the current sheet
    pub fn set_current_name(&mut self, name: &str) -> Result<(), SpreadsheetError> {
        let current = self.current;
        let others = self
            .sheets
            .iter()
            .filter(|sheet| sheet.index != current)
            .map(|sheet| sheet.name.as_str());
        validate_sheet_name(name, others)?;
        self.sheets[current].name = name.to_owned();
        Ok(())
    }

    pub fn set_current_visible(&mut self, visible: bool) {
        let current = self.current;
        self.sheets[current].is_visible = visible;
    }

    fn names(&self) -> impl Iterator<Item = &str> {
        self.sheets.iter().map(|sheet| sheet.name.as_str())
    }
}
