use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::category::Category;
use crate::identity::ClientKey;
use crate::registry::{Resolution, Session};

/// Literal written in the export for a category nobody provided.
pub const NOT_PROVIDED: &str = "NO SE APORTÓ";
pub const CLIENT_KEY_COLUMN: &str = "CÉDULA";
pub const DISPLAY_NAME_COLUMN: &str = "NOMBRE CLIENTE";

static MISSING_CELL: Cell = Cell::NotProvided;

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(tag = "provenance", content = "file_name", rename_all = "snake_case")]
pub enum Cell {
    Own(String),
    Shared(String),
    NotProvided,
}

impl Cell {
    #[must_use]
    pub fn render(&self) -> &str {
        match self {
            Self::Own(name) | Self::Shared(name) => name,
            Self::NotProvided => NOT_PROVIDED,
        }
    }

    #[must_use]
    pub fn is_provided(&self) -> bool {
        !matches!(self, Self::NotProvided)
    }
}

impl From<Resolution<'_>> for Cell {
    fn from(resolution: Resolution<'_>) -> Self {
        match resolution {
            Resolution::Own(document) => Self::Own(document.name().to_string()),
            Resolution::Shared(document) => Self::Shared(document.name().to_string()),
            Resolution::NotProvided => Self::NotProvided,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct TraceabilityRow {
    pub client_key: ClientKey,
    pub display_name: String,
    pub cells: BTreeMap<Category, Cell>,
}

impl TraceabilityRow {
    #[must_use]
    pub fn cell(&self, category: Category) -> &Cell {
        self.cells.get(&category).unwrap_or(&MISSING_CELL)
    }
}

/// One row per client in first-seen order, cells resolved with the same
/// own -> shared fallback the merge uses.
#[must_use]
pub fn build_matrix(session: &Session) -> Vec<TraceabilityRow> {
    session
        .clients()
        .map(|record| TraceabilityRow {
            client_key: record.client_key().clone(),
            display_name: record.display_name().to_string(),
            cells: Category::ALL
                .into_iter()
                .map(|category| {
                    let resolution = session.resolve(record.client_key().as_str(), category);
                    (category, Cell::from(resolution))
                })
                .collect(),
        })
        .collect()
}

/// Tabular form of the matrix: header row plus rendered cells.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct TableExport {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[must_use]
pub fn traceability_columns() -> Vec<String> {
    [CLIENT_KEY_COLUMN, DISPLAY_NAME_COLUMN]
        .into_iter()
        .map(str::to_string)
        .chain(
            Category::ALL
                .into_iter()
                .map(|category| category.label().to_string()),
        )
        .collect()
}

#[must_use]
pub fn export_matrix(rows: &[TraceabilityRow]) -> TableExport {
    TableExport {
        columns: traceability_columns(),
        rows: rows
            .iter()
            .map(|row| {
                let cells = Category::ALL
                    .into_iter()
                    .map(|category| row.cell(category).render().to_string());
                [row.client_key.to_string(), row.display_name.clone()]
                    .into_iter()
                    .chain(cells)
                    .collect()
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::registry::RawDocument;

    fn session_with(names: &[&str]) -> Session {
        let mut session = Session::default();
        for name in names {
            if let Err(err) = session.ingest(RawDocument::new(*name, Vec::new())) {
                panic!("ingest of {name} should succeed: {err}");
            }
        }
        session
    }

    #[test]
    fn worked_example_matches_expected_row() {
        let session = session_with(&[
            "123_JohnDoe_DEMANDA.pdf",
            "123_JohnDoe_PAGARE.pdf",
            "CAMARA_COMERCIO_GLOBAL.pdf",
        ]);
        let rows = build_matrix(&session);
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.client_key.as_str(), "123");
        assert_eq!(row.display_name, "JohnDoe");
        assert_eq!(
            row.cell(Category::Demanda),
            &Cell::Own("123_JohnDoe_DEMANDA.pdf".to_string())
        );
        assert_eq!(
            row.cell(Category::Pagare),
            &Cell::Own("123_JohnDoe_PAGARE.pdf".to_string())
        );
        assert_eq!(
            row.cell(Category::CamaraYComercio),
            &Cell::Shared("CAMARA_COMERCIO_GLOBAL.pdf".to_string())
        );
        for category in [
            Category::RemisionDelPoder,
            Category::Poder,
            Category::Ubica,
            Category::Superfinanciera,
            Category::Sirna,
            Category::Medidas,
        ] {
            assert_eq!(row.cell(category), &Cell::NotProvided);
        }

        let export = export_matrix(&rows);
        assert_eq!(
            export.columns,
            vec![
                "CÉDULA",
                "NOMBRE CLIENTE",
                "DEMANDA",
                "REMISION DEL PODER",
                "PODER",
                "PAGARE",
                "UBICA",
                "CAMARA Y COMERCIO",
                "SUPERFINANCIERA",
                "SIRNA",
                "MEDIDAS",
            ]
        );
        assert_eq!(
            export.rows[0],
            vec![
                "123",
                "JohnDoe",
                "123_JohnDoe_DEMANDA.pdf",
                NOT_PROVIDED,
                NOT_PROVIDED,
                "123_JohnDoe_PAGARE.pdf",
                NOT_PROVIDED,
                "CAMARA_COMERCIO_GLOBAL.pdf",
                NOT_PROVIDED,
                NOT_PROVIDED,
                NOT_PROVIDED,
            ]
        );
    }

    #[test]
    fn rows_follow_registry_order_and_include_clients_without_documents() {
        let session = session_with(&["2_Beto_anexo.pdf", "1_Ana_DEMANDA.pdf", "SIRNA.pdf"]);
        let rows = build_matrix(&session);
        let keys = rows
            .iter()
            .map(|row| row.client_key.as_str())
            .collect::<Vec<_>>();
        assert_eq!(keys, vec!["2", "1"]);
        assert_eq!(rows[0].cell(Category::Demanda), &Cell::NotProvided);
        assert_eq!(
            rows[0].cell(Category::Sirna),
            &Cell::Shared("SIRNA.pdf".to_string())
        );
    }

    #[test]
    fn empty_session_exports_header_only() {
        let export = export_matrix(&build_matrix(&Session::default()));
        assert_eq!(export.columns.len(), 11);
        assert!(export.rows.is_empty());
    }

    fn planned_categories(session: &Session, client_key: &str) -> Option<Vec<Category>> {
        session
            .merge_plan(client_key)
            .map(|plan| plan.categories().collect())
    }

    const POOL: [&str; 12] = [
        "7_Ana_DEMANDA.pdf",
        "7_Ana_PODER.pdf",
        "8_Beto_PAGARE.pdf",
        "8_Beto_REMISION_PODER.pdf",
        "9_Caro_UBICA.pdf",
        "CAMARA_COMERCIO.pdf",
        "SUPERFINANCIERA.pdf",
        "SIRNA.pdf",
        "MEDIDAS.pdf",
        "PAGARE_GENERAL.pdf",
        "7_Ana_MEDIDAS.pdf",
        "9_Caro_anexo.pdf",
    ];

    proptest! {
        #[test]
        fn property_not_provided_iff_merge_has_no_contribution(
            picks in proptest::collection::vec(0_usize..POOL.len(), 0..20),
        ) {
            let names = picks.iter().map(|index| POOL[*index]).collect::<Vec<_>>();
            let session = session_with(&names);
            for row in build_matrix(&session) {
                let plan = match session.merge_plan(row.client_key.as_str()) {
                    Some(plan) => plan,
                    None => panic!("every row has a registered client"),
                };
                for category in Category::ALL {
                    prop_assert_eq!(
                        !row.cell(category).is_provided(),
                        !plan.contributes(category)
                    );
                }
            }
        }

        #[test]
        fn property_reingesting_same_files_is_stable(
            picks in proptest::collection::vec(0_usize..POOL.len(), 0..20),
        ) {
            let names = picks.iter().map(|index| POOL[*index]).collect::<Vec<_>>();
            let first = session_with(&names);
            let second = session_with(&names);
            prop_assert_eq!(build_matrix(&first), build_matrix(&second));
            for key in first.client_keys() {
                prop_assert_eq!(
                    planned_categories(&first, key.as_str()),
                    planned_categories(&second, key.as_str())
                );
            }
        }
    }
}
