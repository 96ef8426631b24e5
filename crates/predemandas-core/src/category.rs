use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::normalize::normalize_text;

/// Document categories of a lawsuit bundle. Declaration order is the canonical
/// merge order, so the derived `Ord` agrees with [`Category::rank`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Demanda,
    RemisionDelPoder,
    Poder,
    Pagare,
    Ubica,
    CamaraYComercio,
    Superfinanciera,
    Sirna,
    Medidas,
}

impl Category {
    /// All categories in ascending rank.
    pub const ALL: [Self; 9] = [
        Self::Demanda,
        Self::RemisionDelPoder,
        Self::Poder,
        Self::Pagare,
        Self::Ubica,
        Self::CamaraYComercio,
        Self::Superfinanciera,
        Self::Sirna,
        Self::Medidas,
    ];

    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            Self::Demanda => 1,
            Self::RemisionDelPoder => 2,
            Self::Poder => 3,
            Self::Pagare => 4,
            Self::Ubica => 5,
            Self::CamaraYComercio => 6,
            Self::Superfinanciera => 7,
            Self::Sirna => 8,
            Self::Medidas => 9,
        }
    }

    /// Column header used in the traceability export.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Demanda => "DEMANDA",
            Self::RemisionDelPoder => "REMISION DEL PODER",
            Self::Poder => "PODER",
            Self::Pagare => "PAGARE",
            Self::Ubica => "UBICA",
            Self::CamaraYComercio => "CAMARA Y COMERCIO",
            Self::Superfinanciera => "SUPERFINANCIERA",
            Self::Sirna => "SIRNA",
            Self::Medidas => "MEDIDAS",
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Demanda => "DEMANDA",
            Self::RemisionDelPoder => "REMISION_DEL_PODER",
            Self::Poder => "PODER",
            Self::Pagare => "PAGARE",
            Self::Ubica => "UBICA",
            Self::CamaraYComercio => "CAMARA_Y_COMERCIO",
            Self::Superfinanciera => "SUPERFINANCIERA",
            Self::Sirna => "SIRNA",
            Self::Medidas => "MEDIDAS",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == value)
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of running the keyword rules over a filename.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(tag = "classification", content = "category", rename_all = "snake_case")]
pub enum Classification {
    Matched(Category),
    Unmatched,
}

impl Classification {
    #[must_use]
    pub fn category(self) -> Option<Category> {
        match self {
            Self::Matched(category) => Some(category),
            Self::Unmatched => None,
        }
    }
}

/// Classify an already normalized name. Rules are evaluated in order and the
/// first hit wins; several categories share substrings.
#[must_use]
pub fn classify(normalized: &str) -> Classification {
    let has = |needle: &str| normalized.contains(needle);

    let category = if has("DEMANDA") {
        Category::Demanda
    } else if has("REMISION") && has("PODER") {
        Category::RemisionDelPoder
    } else if has("PODER") && !has("REMISION") {
        Category::Poder
    } else if has("PAGARE") {
        Category::Pagare
    } else if has("UBICA") {
        Category::Ubica
    } else if has("CAMARA_COMERCIO") || has("CAMARA") || has("COMERCIO") {
        Category::CamaraYComercio
    } else if has("SUPERFINANCIERA") {
        Category::Superfinanciera
    } else if has("SIRNA") {
        Category::Sirna
    } else if has("MEDIDAS") {
        Category::Medidas
    } else {
        return Classification::Unmatched;
    };

    Classification::Matched(category)
}

/// Normalize a raw filename and classify it.
#[must_use]
pub fn classify_filename(file_name: &str) -> Classification {
    classify(&normalize_text(file_name))
}
