use super::validation::{require_positive, require_text, ValidationError};
use crate::store::{Collection, Record};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A farm holding livestock.
///
/// Serialized with the document field names the frontend consumes
/// (`_id`, `productionType`, `createdAt`, ...).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Farm {
    /// Store-assigned identifier
    #[serde(rename = "_id")]
    pub id: String,

    pub name: String,

    pub location: String,

    /// Area in hectares
    pub size: f64,

    /// Production tags in the order given (e.g. "dairy", "crops")
    #[serde(default)]
    pub production_type: Vec<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Record for Farm {
    const COLLECTION: Collection = Collection::Farms;

    fn id(&self) -> &str {
        &self.id
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require_text("name", &self.name)?;
        require_text("location", &self.location)?;
        require_positive("size", self.size)?;
        Ok(())
    }
}
