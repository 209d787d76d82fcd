use serde::{Deserialize, Serialize};

/// Listing columns embedded in a message query (`arabalar(baslik)`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingRef {
    #[serde(rename = "baslik")]
    pub title: String,
}

/// The parts of a listing the inbox needs to contact its seller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: String,
    #[serde(rename = "baslik", default)]
    pub title: String,
    #[serde(rename = "kullanici_id")]
    pub owner_id: String,
}
