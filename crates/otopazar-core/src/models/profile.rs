use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_DISPLAY_NAME;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    #[serde(rename = "ad_soyad", default)]
    pub display_name: Option<String>,
    #[serde(rename = "resim_url", default)]
    pub avatar_url: Option<String>,
}

impl Profile {
    /// Placeholder for a user whose profile row is missing
    pub fn unknown(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
            avatar_url: None,
        }
    }

    pub fn display_name_or_default(&self) -> &str {
        match self.display_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => DEFAULT_DISPLAY_NAME,
        }
    }
}
