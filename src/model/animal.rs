use super::validation::{require_text, ValidationError};
use super::Farm;
use crate::store::{Collection, Record};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Health status of an animal
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnimalStatus {
    #[default]
    Healthy,
    Sick,
    Quarantine,
}

impl fmt::Display for AnimalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AnimalStatus::Healthy => "healthy",
            AnimalStatus::Sick => "sick",
            AnimalStatus::Quarantine => "quarantine",
        };
        f.write_str(s)
    }
}

/// An animal registered to a farm.
///
/// `farm_id` is a plain reference: it is not checked against the farms
/// collection and survives deletion of the farm.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Animal {
    #[serde(rename = "_id")]
    pub id: String,

    pub name: String,

    pub species: String,

    pub breed: String,

    #[serde(deserialize_with = "deserialize_birth_date")]
    pub birth_date: NaiveDate,

    pub farm_id: String,

    #[serde(default)]
    pub status: AnimalStatus,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Record for Animal {
    const COLLECTION: Collection = Collection::Animals;

    fn id(&self) -> &str {
        &self.id
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require_text("name", &self.name)?;
        require_text("species", &self.species)?;
        require_text("breed", &self.breed)?;
        require_text("farmId", &self.farm_id)?;
        Ok(())
    }
}

/// Animal with its owning farm resolved for read responses.
///
/// `farm` is `None` when `farmId` dangles.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AnimalView {
    #[serde(flatten)]
    pub animal: Animal,
    pub farm: Option<Farm>,
}

/// Accepts `YYYY-MM-DD` or a full RFC 3339 timestamp (HTML date inputs send the
/// former, JavaScript `Date` serialization the latter).
fn deserialize_birth_date<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_birth_date(&raw).map_err(serde::de::Error::custom)
}

pub(crate) fn parse_birth_date(raw: &str) -> Result<NaiveDate, String> {
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date);
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc).date_naive())
        .map_err(|_| format!("birthDate '{}' is not a valid date", raw))
}
