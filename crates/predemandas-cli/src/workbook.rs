//! Reference workbook reading (xlsx, xls, ods) for the dispatch phase.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use calamine::{open_workbook_auto, Data, Reader};
use predemandas_core::ReferenceTable;

/// Parse the first worksheet of `path` into a reference table.
pub fn read_reference(path: &Path) -> Result<ReferenceTable> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("failed to open reference workbook {}", path.display()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| anyhow!("reference workbook {} has no worksheets", path.display()))?
        .with_context(|| format!("failed to read first worksheet of {}", path.display()))?;

    let rows = range
        .rows()
        .map(|row| row.iter().map(cell_to_string).collect::<Vec<_>>())
        .collect::<Vec<_>>();
    let table = ReferenceTable::from_rows(rows)
        .with_context(|| format!("invalid reference workbook {}", path.display()))?;
    tracing::info!(
        rows = table.len(),
        workbook = %path.display(),
        "loaded reference table"
    );
    Ok(table)
}

/// Cédulas typed into a spreadsheet usually come back as floats; render
/// integral values without a fractional part.
fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(value) | Data::DateTimeIso(value) | Data::DurationIso(value) => value.clone(),
        Data::Float(value) => {
            if value.fract() == 0.0 {
                format!("{value:.0}")
            } else {
                value.to_string()
            }
        }
        Data::Int(value) => value.to_string(),
        Data::Bool(value) => String::from(if *value { "TRUE" } else { "FALSE" }),
        Data::Error(err) => format!("#ERROR: {err:?}"),
        Data::DateTime(value) => value.to_string(),
    }
}
