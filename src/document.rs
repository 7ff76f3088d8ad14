//! What the layout model hands back, reduced to the parts the pipeline reads.
//!
//! The remote `prebuilt-layout` result is far richer (bounding polygons,
//! spans, styles, paragraphs). Only text lines and table cells survive the
//! trip into [`RecognizedDocument`]; everything else is dropped while the
//! wire response is decoded in [`crate::pipeline::layout`].

use serde::{Deserialize, Serialize};

/// Text lines and tables recognised on one image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognizedDocument {
    /// Pages in service order; an image is normally a single page.
    pub pages: Vec<Page>,
    /// Tables in service order.
    pub tables: Vec<Table>,
}

/// One page of recognised text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Layout lines in reading order.
    pub lines: Vec<String>,
}

/// A recognised table: declared dimensions plus the cells the service found.
///
/// Cells are sparse. Any (row, column) slot with no matching cell renders as
/// an empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub row_count: usize,
    pub column_count: usize,
    pub cells: Vec<TableCell>,
}

/// A single table cell addressed by 0-based row and column index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCell {
    pub row_index: usize,
    pub column_index: usize,
    pub content: String,
}

impl RecognizedDocument {
    /// Iterate every line of every page in reading order.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.pages
            .iter()
            .flat_map(|p| p.lines.iter().map(String::as_str))
    }

    /// Total number of lines across pages.
    pub fn line_count(&self) -> usize {
        self.pages.iter().map(|p| p.lines.len()).sum()
    }
}

impl Table {
    pub fn new(row_count: usize, column_count: usize) -> Self {
        Self {
            row_count,
            column_count,
            cells: Vec::new(),
        }
    }

    /// Builder-style helper used mostly by tests and fakes.
    pub fn with_cell(mut self, row: usize, column: usize, content: impl Into<String>) -> Self {
        self.cells.push(TableCell {
            row_index: row,
            column_index: column,
            content: content.into(),
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_flatten_pages_in_order() {
        let doc = RecognizedDocument {
            pages: vec![
                Page {
                    lines: vec!["INGREDIENTS:".into(), "Potatoes,".into()],
                },
                Page {
                    lines: vec!["Salt".into()],
                },
            ],
            tables: vec![],
        };
        let lines: Vec<&str> = doc.lines().collect();
        assert_eq!(lines, vec!["INGREDIENTS:", "Potatoes,", "Salt"]);
        assert_eq!(doc.line_count(), 3);
    }

    #[test]
    fn with_cell_appends() {
        let t = Table::new(1, 2).with_cell(0, 1, "532 kcal");
        assert_eq!(t.cells.len(), 1);
        assert_eq!(t.cells[0].column_index, 1);
    }
}
