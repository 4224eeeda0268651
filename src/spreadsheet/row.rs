use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::style::Style;

/// Ordered cells of one worksheet row, column 0 first
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Row {
    cells: Vec<Cell>,
    style: Option<Style>,
}

impl Row {
    /// Creates an unstyled row from cells in column order.
    ///
    /// # Arguments
    /// * `cells` - Cells of the row, column 0 first
    pub fn new(cells: Vec<Cell>) -> Self {
        Row { cells, style: None }
    }

    /// Row made of values converted to cells
    pub fn from_values<T: Into<Cell>>(values: impl IntoIterator<Item = T>) -> Self {
        Row::new(values.into_iter().map(Into::into).collect())
    }

    /// Dense row from cells placed at column indexes; gaps become empty cells.
    ///
    /// # Arguments
    /// * `cells` - Zero-based column index and cell pairs, in any order; a later pair wins
    /// * `width` - Minimum number of cells, padding the tail with empty cells
    ///
    /// # Returns
    /// A row as long as the larger of `width` and the highest index plus one
    pub fn fill_missing_indexes(cells: impl IntoIterator<Item = (usize, Cell)>, width: usize) -> Self {
        let mut row = Row::default();
        for (index, cell) in cells {
            row.set_cell_at(index, cell);
        }
        if row.cells.len() < width {
            row.cells.resize_with(width, Cell::empty);
        }
        row
    }

    /// Builder form of [`Row::set_style`]
    pub fn with_style(mut self, style: Style) -> Self {
        self.style = Some(style);
        self
    }

    /// Sets the row style.
    ///
    /// Writers merge it under every cell style, so attributes set on a cell win.
    pub fn set_style(&mut self, style: Style) {
        self.style = Some(style);
    }

    pub fn style(&self) -> Option<&Style> {
        self.style.as_ref()
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Consumes the row, keeping only its cells
    pub fn into_cells(self) -> Vec<Cell> {
        self.cells
    }

    /// Cell at zero-based column `index`, `None` past the end of the row
    pub fn cell(&self, index: usize) -> Option<&Cell> {
        self.cells.get(index)
    }

    pub fn push(&mut self, cell: Cell) {
        self.cells.push(cell);
    }

    /// Places `cell` at `index`, growing the row with empty cells when needed.
    ///
    /// # Arguments
    /// * `index` - Zero-based column index
    /// * `cell` - Cell replacing whatever was at `index`
    pub fn set_cell_at(&mut self, index: usize, cell: Cell) {
        if index >= self.cells.len() {
            self.cells.resize_with(index + 1, Cell::empty);
        }
        self.cells[index] = cell;
    }

    /// Number of cells, empty ones included
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// True when every cell is empty, or there are no cells at all
    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(Cell::is_empty)
    }
}

impl<T: Into<Cell>> FromIterator<T> for Row {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Row::from_values(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spreadsheet::cell::CellValue;

    #[test]
    fn gaps_are_filled_with_empty_cells() {
        let row = Row::fill_missing_indexes([(1, Cell::from("c1")), (3, Cell::from("c3"))], 0);
        assert_eq!(
            row.cells().iter().map(Cell::value).cloned().collect::<Vec<_>>(),
            vec![CellValue::Empty, CellValue::from("c1"), CellValue::Empty, CellValue::from("c3")]
        );

        let padded = Row::fill_missing_indexes([(0, Cell::from(1.0))], 3);
        assert_eq!(padded.len(), 3);
    }

    #[test]
    fn emptiness() {
        assert!(Row::default().is_empty());
        assert!(Row::new(vec![Cell::empty(), Cell::from("")]).is_empty());
        assert!(Row::new(vec![Cell::empty()]).with_style(Style::new().bold()).is_empty());
        assert!(!Row::from_values([1.0]).is_empty());
        assert!(!Row::new(vec![Cell::empty(), Cell::from(false)]).is_empty());
    }
}
