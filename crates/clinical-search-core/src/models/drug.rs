//! Drug library models.

use serde::{Deserialize, Serialize};

use crate::search::collapse_whitespace;

/// A drug in the prescribing library.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Drug {
    pub id: i64,
    /// Generic or brand name (e.g., "Metformina")
    pub name: String,
    /// Pharmaceutical form (e.g., "tabletas")
    pub presentation: Option<String>,
    /// Strength (e.g., "850 mg")
    pub strength: Option<String>,
    pub created_at: String,
}

/// Payload for adding a drug to the library.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NewDrug {
    pub name: String,
    #[serde(default)]
    pub presentation: Option<String>,
    #[serde(default)]
    pub strength: Option<String>,
}

impl NewDrug {
    /// Create a payload with only a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Single-spaced copy with blank optional fields collapsed to `None`.
    ///
    /// Returns `None` when the name is blank.
    pub fn cleaned(&self) -> Option<NewDrug> {
        let name = collapse_whitespace(&self.name);
        if name.is_empty() {
            return None;
        }
        Some(NewDrug {
            name,
            presentation: non_blank(self.presentation.as_deref()),
            strength: non_blank(self.strength.as_deref()),
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(collapse_whitespace).filter(|v| !v.is_empty())
}
