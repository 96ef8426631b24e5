use serde::{Deserialize, Serialize};

use crate::normalize::normalize_text;

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum ReferenceError {
    #[error("reference table is empty")]
    Empty,
    #[error("reference table is missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
}

/// One case from the reference table.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct CaseRow {
    /// 1-based position in the table, header included.
    pub row_number: usize,
    pub client_id: String,
    pub display_name: String,
    pub venue: String,
    pub amount_class: String,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum Column {
    ClientId,
    DisplayName,
    Venue,
    AmountClass,
}

impl Column {
    const REQUIRED: [Self; 4] = [Self::ClientId, Self::DisplayName, Self::Venue, Self::AmountClass];

    fn index(self) -> usize {
        match self {
            Self::ClientId => 0,
            Self::DisplayName => 1,
            Self::Venue => 2,
            Self::AmountClass => 3,
        }
    }

    fn header(self) -> &'static str {
        match self {
            Self::ClientId => "CC_DDO",
            Self::DisplayName => "NOMBRE_DDO",
            Self::Venue => "JUZGADO",
            Self::AmountClass => "CUANTIA",
        }
    }
}

/// Header comparison ignores case, accents and whitespace, so `Cuantía`,
/// `CUANTIA` and ` cc_ddo ` all match.
fn header_key(value: &str) -> String {
    normalize_text(value)
        .chars()
        .filter(|ch| !ch.is_whitespace())
        .collect()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct ReferenceTable {
    rows: Vec<CaseRow>,
}

impl ReferenceTable {
    /// Build the table from raw string cells; the first row is the header.
    /// Fully blank rows are skipped.
    ///
    /// # Errors
    /// Returns [`ReferenceError::Empty`] without a header row and
    /// [`ReferenceError::MissingColumns`] when any required column is absent.
    pub fn from_rows(rows: Vec<Vec<String>>) -> Result<Self, ReferenceError> {
        let mut rows = rows.into_iter();
        let Some(header) = rows.next() else {
            return Err(ReferenceError::Empty);
        };

        let keys = header
            .iter()
            .map(|cell| header_key(cell))
            .collect::<Vec<_>>();
        let mut positions = [0_usize; Column::REQUIRED.len()];
        let mut missing = Vec::new();
        for column in Column::REQUIRED {
            match keys.iter().position(|key| key == column.header()) {
                Some(position) => positions[column.index()] = position,
                None => missing.push(column.header().to_string()),
            }
        }
        if !missing.is_empty() {
            return Err(ReferenceError::MissingColumns(missing));
        }

        let cell = |row: &[String], column: Column| -> String {
            row.get(positions[column.index()])
                .map(|value| value.trim().to_string())
                .unwrap_or_default()
        };

        let rows = rows
            .enumerate()
            .filter(|(_, row)| row.iter().any(|value| !value.trim().is_empty()))
            .map(|(index, row)| CaseRow {
                row_number: index + 2,
                client_id: cell(&row, Column::ClientId),
                display_name: cell(&row, Column::DisplayName),
                venue: cell(&row, Column::Venue),
                amount_class: cell(&row, Column::AmountClass),
            })
            .collect();

        Ok(Self { rows })
    }

    #[must_use]
    pub fn rows(&self) -> &[CaseRow] {
        &self.rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| (*value).to_string()).collect()
    }

    #[test]
    fn headers_match_regardless_of_case_spacing_and_accents() {
        let table = match ReferenceTable::from_rows(vec![
            strings(&["Cuantía", " nombre_ddo ", "OTRA", "cc_ddo", "Juzgado"]),
            strings(&["MINIMA", "Ana Ruiz", "x", " 123 ", "j01@cendoj.example"]),
        ]) {
            Ok(table) => table,
            Err(err) => panic!("table should parse: {err}"),
        };
        assert_eq!(
            table.rows(),
            &[CaseRow {
                row_number: 2,
                client_id: "123".to_string(),
                display_name: "Ana Ruiz".to_string(),
                venue: "j01@cendoj.example".to_string(),
                amount_class: "MINIMA".to_string(),
            }]
        );
    }

    #[test]
    fn unaccented_cuantia_header_is_accepted() {
        let table = ReferenceTable::from_rows(vec![strings(&[
            "CC_DDO",
            "NOMBRE_DDO",
            "JUZGADO",
            "CUANTIA",
        ])]);
        assert_eq!(table.map(|table| table.len()), Ok(0));
    }

    #[test]
    fn missing_columns_are_all_reported() {
        let err = ReferenceTable::from_rows(vec![strings(&["CC_DDO", "JUZGADO"])]);
        assert_eq!(
            err,
            Err(ReferenceError::MissingColumns(vec![
                "NOMBRE_DDO".to_string(),
                "CUANTIA".to_string()
            ]))
        );
    }

    #[test]
    fn empty_input_is_rejected() {
        assert_eq!(
            ReferenceTable::from_rows(Vec::new()),
            Err(ReferenceError::Empty)
        );
    }

    #[test]
    fn blank_rows_are_skipped_and_short_rows_padded() {
        let table = match ReferenceTable::from_rows(vec![
            strings(&["CC_DDO", "NOMBRE_DDO", "JUZGADO", "CUANTIA"]),
            strings(&["", " ", "", ""]),
            strings(&["55", "Luz"]),
        ]) {
            Ok(table) => table,
            Err(err) => panic!("table should parse: {err}"),
        };
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows()[0].row_number, 3);
        assert_eq!(table.rows()[0].venue, "");
    }
}
