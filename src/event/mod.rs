use crate::model::{Animal, Farm};
use serde::{Deserialize, Serialize};
use std::fmt;

#[cfg(test)]
mod tests;

/// Mutation notification published after a successful store write.
///
/// Wire shape is a flat JSON object tagged by `type`:
/// `{"type":"FARM_CREATED","farmId":"..","farmName":".."}` or
/// `{"type":"ANIMAL_DELETED","animalId":"..","animalName":"..","farmId":".."}`.
/// Events are not persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationEvent {
    FarmCreated(FarmRef),
    FarmUpdated(FarmRef),
    FarmDeleted(FarmRef),
    AnimalCreated(AnimalRef),
    AnimalUpdated(AnimalRef),
    AnimalDeleted(AnimalRef),
}

/// Identifies the farm a farm event is about
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FarmRef {
    pub farm_id: String,
    pub farm_name: String,
}

/// Identifies the animal an animal event is about, plus its owning farm
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnimalRef {
    pub animal_id: String,
    pub animal_name: String,
    pub farm_id: String,
}

/// Kind of store mutation an event reports
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mutation {
    Created,
    Updated,
    Deleted,
}

impl NotificationEvent {
    pub fn for_farm(mutation: Mutation, farm: &Farm) -> Self {
        let r = FarmRef {
            farm_id: farm.id.clone(),
            farm_name: farm.name.clone(),
        };
        match mutation {
            Mutation::Created => NotificationEvent::FarmCreated(r),
            Mutation::Updated => NotificationEvent::FarmUpdated(r),
            Mutation::Deleted => NotificationEvent::FarmDeleted(r),
        }
    }

    pub fn for_animal(mutation: Mutation, animal: &Animal) -> Self {
        let r = AnimalRef {
            animal_id: animal.id.clone(),
            animal_name: animal.name.clone(),
            farm_id: animal.farm_id.clone(),
        };
        match mutation {
            Mutation::Created => NotificationEvent::AnimalCreated(r),
            Mutation::Updated => NotificationEvent::AnimalUpdated(r),
            Mutation::Deleted => NotificationEvent::AnimalDeleted(r),
        }
    }

    /// Value of the `type` tag
    pub fn event_type(&self) -> &'static str {
        match self {
            NotificationEvent::FarmCreated(_) => "FARM_CREATED",
            NotificationEvent::FarmUpdated(_) => "FARM_UPDATED",
            NotificationEvent::FarmDeleted(_) => "FARM_DELETED",
            NotificationEvent::AnimalCreated(_) => "ANIMAL_CREATED",
            NotificationEvent::AnimalUpdated(_) => "ANIMAL_UPDATED",
            NotificationEvent::AnimalDeleted(_) => "ANIMAL_DELETED",
        }
    }

    /// Id of the farm or animal the event is about
    pub fn entity_id(&self) -> &str {
        match self {
            NotificationEvent::FarmCreated(r)
            | NotificationEvent::FarmUpdated(r)
            | NotificationEvent::FarmDeleted(r) => &r.farm_id,
            NotificationEvent::AnimalCreated(r)
            | NotificationEvent::AnimalUpdated(r)
            | NotificationEvent::AnimalDeleted(r) => &r.animal_id,
        }
    }

    pub fn entity_name(&self) -> &str {
        match self {
            NotificationEvent::FarmCreated(r)
            | NotificationEvent::FarmUpdated(r)
            | NotificationEvent::FarmDeleted(r) => &r.farm_name,
            NotificationEvent::AnimalCreated(r)
            | NotificationEvent::AnimalUpdated(r)
            | NotificationEvent::AnimalDeleted(r) => &r.animal_name,
        }
    }
}

/// Human-readable form used by the log transport
impl fmt::Display for NotificationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationEvent::FarmCreated(r)
            | NotificationEvent::FarmUpdated(r)
            | NotificationEvent::FarmDeleted(r) => write!(
                f,
                "{} farmId={} farmName={:?}",
                self.event_type(),
                r.farm_id,
                r.farm_name
            ),
            NotificationEvent::AnimalCreated(r)
            | NotificationEvent::AnimalUpdated(r)
            | NotificationEvent::AnimalDeleted(r) => write!(
                f,
                "{} animalId={} animalName={:?} farmId={}",
                self.event_type(),
                r.animal_id,
                r.animal_name,
                r.farm_id
            ),
        }
    }
}
