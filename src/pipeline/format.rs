//! Content formatting: recognised lines and tables → one prompt-ready string.
//!
//! All functions here are pure. The layout is fixed:
//!
//! ```text
//! Ingredients:
//! <line>\n<line>\n…
//! \n
//! Nutrition Table:
//! \nTable #1:\n<cell>\t<cell>\n…
//! \nTable #2:\n…
//! ```
//!
//! Tabs and newlines inside recognised text are passed through untouched, so
//! a cell containing `\t` shifts the visual columns of its row. The model
//! copes; nothing downstream parses this text back.

use crate::document::{RecognizedDocument, Table};
use crate::error::{NutriError, Service};

/// Header preceding the ingredient lines.
pub const INGREDIENTS_HEADER: &str = "Ingredients:";

/// Header preceding the serialised tables.
pub const NUTRITION_HEADER: &str = "Nutrition Table:";

/// Largest grid accepted from the service. Real label tables hold a few
/// dozen cells.
pub const MAX_TABLE_CELLS: usize = 100_000;

/// Concatenate every recognised line, each followed by `\n`.
pub fn ingredient_text(doc: &RecognizedDocument) -> String {
    let mut out = String::new();
    for line in doc.lines() {
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// Rebuild a table's `row_count × column_count` grid.
///
/// Every slot starts as an empty string and is overwritten by the cell that
/// addresses it; a later cell for the same slot wins.
///
/// # Errors
/// [`NutriError::MalformedTable`] when a cell lies outside the declared
/// dimensions. `table_number` is the 1-based position used in the message.
/// [`NutriError::MalformedResponse`] when the declared dimensions exceed
/// [`MAX_TABLE_CELLS`].
pub fn table_grid(table: &Table, table_number: usize) -> Result<Vec<Vec<String>>, NutriError> {
    match table.row_count.checked_mul(table.column_count) {
        Some(cells) if cells <= MAX_TABLE_CELLS => {}
        _ => {
            return Err(NutriError::MalformedResponse {
                service: Service::DocumentAnalysis,
                detail: format!(
                    "table #{table_number} declares a {}×{} grid, more than {MAX_TABLE_CELLS} cells",
                    table.row_count, table.column_count
                ),
            })
        }
    }

    let mut grid = vec![vec![String::new(); table.column_count]; table.row_count];

    for cell in &table.cells {
        let slot = grid
            .get_mut(cell.row_index)
            .and_then(|row| row.get_mut(cell.column_index))
            .ok_or(NutriError::MalformedTable {
                table: table_number,
                row: cell.row_index,
                column: cell.column_index,
                rows: table.row_count,
                columns: table.column_count,
            })?;
        *slot = cell.content.clone();
    }

    Ok(grid)
}

/// Serialise one table as `"\nTable #N:\n"` plus one tab-joined line per row.
pub fn serialize_table(table: &Table, table_number: usize) -> Result<String, NutriError> {
    let grid = table_grid(table, table_number)?;
    let mut out = format!("\nTable #{table_number}:\n");
    for row in grid {
        out.push_str(&row.join("\t"));
        out.push('\n');
    }
    Ok(out)
}

/// Serialise every table of `doc` in service order, numbered from 1.
pub fn serialize_tables(doc: &RecognizedDocument) -> Result<String, NutriError> {
    doc.tables
        .iter()
        .enumerate()
        .map(|(idx, table)| serialize_table(table, idx + 1))
        .collect()
}

/// Join the ingredient text and serialised tables under their fixed headers.
pub fn combine(ingredients: &str, tables: &str) -> String {
    format!("{INGREDIENTS_HEADER}\n{ingredients}\n{NUTRITION_HEADER}\n{tables}")
}

/// Build the combined content from the two recognised documents: text lines
/// from the ingredients photo, tables from the nutrition photo.
pub fn combined_content(
    ingredients: &RecognizedDocument,
    nutrition: &RecognizedDocument,
) -> Result<String, NutriError> {
    let tables = serialize_tables(nutrition)?;
    Ok(combine(&ingredient_text(ingredients), &tables))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Page;

    fn energy_table() -> Table {
        Table::new(2, 2)
            .with_cell(0, 0, "Energy")
            .with_cell(0, 1, "532 kcal")
            .with_cell(1, 0, "Fat")
            .with_cell(1, 1, "31.5g")
    }

    #[test]
    fn worked_example_table() {
        let s = serialize_table(&energy_table(), 1).unwrap();
        assert_eq!(s, "\nTable #1:\nEnergy\t532 kcal\nFat\t31.5g\n");
    }

    #[test]
    fn missing_cells_default_to_empty() {
        let t = Table::new(2, 3).with_cell(1, 2, "x");
        let grid = table_grid(&t, 1).unwrap();
        assert_eq!(grid, vec![vec!["", "", ""], vec!["", "", "x"]]);
        assert_eq!(serialize_table(&t, 1).unwrap(), "\nTable #1:\n\t\t\n\t\tx\n");
    }

    #[test]
    fn grid_shape_matches_declared_dimensions() {
        for (rows, cols) in [(0, 0), (1, 1), (3, 4), (5, 2)] {
            let t = Table::new(rows, cols);
            let s = serialize_table(&t, 7).unwrap();
            let body: Vec<&str> = s
                .strip_prefix("\nTable #7:\n")
                .unwrap()
                .split_terminator('\n')
                .collect();
            assert_eq!(body.len(), rows);
            for line in body {
                assert_eq!(line.split('\t').count(), cols.max(1));
            }
        }
    }

    #[test]
    fn later_cell_overwrites_earlier() {
        let t = Table::new(1, 1).with_cell(0, 0, "old").with_cell(0, 0, "new");
        assert_eq!(table_grid(&t, 1).unwrap(), vec![vec!["new"]]);
    }

    #[test]
    fn out_of_range_cell_is_rejected() {
        let t = Table::new(1, 2).with_cell(1, 0, "oops");
        match table_grid(&t, 3).unwrap_err() {
            NutriError::MalformedTable {
                table,
                row,
                column,
                rows,
                columns,
            } => assert_eq!((table, row, column, rows, columns), (3, 1, 0, 1, 2)),
            other => panic!("unexpected error: {other:?}"),
        }

        let t = Table::new(1, 2).with_cell(0, 2, "oops");
        assert!(table_grid(&t, 1).is_err());
    }

    #[test]
    fn oversized_dimensions_are_rejected_before_allocating() {
        for t in [
            Table::new(1, usize::MAX),
            Table::new(usize::MAX, 2),
            Table::new(1_000, 1_000),
        ] {
            match table_grid(&t, 1).unwrap_err() {
                NutriError::MalformedResponse { service, detail } => {
                    assert_eq!(service, Service::DocumentAnalysis);
                    assert!(detail.contains("table #1"), "got: {detail}");
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }
        assert!(table_grid(&Table::new(10, MAX_TABLE_CELLS / 10), 1).is_ok());
    }

    #[test]
    fn tables_numbered_in_order() {
        let doc = RecognizedDocument {
            pages: vec![],
            tables: vec![energy_table(), Table::new(1, 1).with_cell(0, 0, "Salt")],
        };
        let s = serialize_tables(&doc).unwrap();
        assert_eq!(
            s,
            "\nTable #1:\nEnergy\t532 kcal\nFat\t31.5g\n\nTable #2:\nSalt\n"
        );
    }

    #[test]
    fn combined_layout() {
        let ingredients = RecognizedDocument {
            pages: vec![Page {
                lines: vec!["Potatoes, Vegetable Oils,".into(), "Salt".into()],
            }],
            tables: vec![],
        };
        let nutrition = RecognizedDocument {
            pages: vec![],
            tables: vec![energy_table()],
        };
        let combined = combined_content(&ingredients, &nutrition).unwrap();
        assert_eq!(
            combined,
            "Ingredients:\nPotatoes, Vegetable Oils,\nSalt\n\nNutrition Table:\n\nTable #1:\nEnergy\t532 kcal\nFat\t31.5g\n"
        );
        assert_eq!(combined.matches(INGREDIENTS_HEADER).count(), 1);
        assert_eq!(combined.matches(NUTRITION_HEADER).count(), 1);
    }

    #[test]
    fn empty_documents_still_carry_headers() {
        let empty = RecognizedDocument::default();
        let combined = combined_content(&empty, &empty).unwrap();
        assert_eq!(combined, "Ingredients:\n\nNutrition Table:\n");
    }

    #[test]
    fn nutrition_lines_and_ingredient_tables_are_ignored() {
        let ingredients = RecognizedDocument {
            pages: vec![],
            tables: vec![energy_table()],
        };
        let nutrition = RecognizedDocument {
            pages: vec![Page {
                lines: vec!["Nutrition Facts".into()],
            }],
            tables: vec![],
        };
        let combined = combined_content(&ingredients, &nutrition).unwrap();
        assert!(!combined.contains("Energy"));
        assert!(!combined.contains("Nutrition Facts"));
    }
}
