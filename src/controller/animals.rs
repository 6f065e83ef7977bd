use super::{into_fields, ControllerError, Notifier, StoreHandle};
use crate::event::{Mutation, NotificationEvent};
use crate::model::{Animal, AnimalView, Farm};
use crate::store::{DocumentStore, StoreError};
use serde_json::Value;
use std::collections::HashMap;
use tracing::info;

/// Animal CRUD with a notification per successful mutation.
///
/// Read responses embed the owning farm; writes do not check that it exists.
#[derive(Clone)]
pub struct AnimalController {
    store: StoreHandle,
    notifier: Notifier,
}

impl AnimalController {
    pub fn new(store: StoreHandle, notifier: Notifier) -> Self {
        Self { store, notifier }
    }

    pub async fn create(&self, body: Value) -> Result<Animal, ControllerError> {
        let fields = into_fields(body)?;
        let animal: Animal = self.store.write(move |s| s.insert(fields)).await?;

        info!(animal_id = %animal.id, farm_id = %animal.farm_id, "Animal created");
        self.notifier
            .notify(NotificationEvent::for_animal(Mutation::Created, &animal))
            .await;
        Ok(animal)
    }

    /// All animals, or only those whose `farmId` equals `farm_id`
    pub async fn list(&self, farm_id: Option<String>) -> Result<Vec<AnimalView>, ControllerError> {
        let views = self
            .store
            .run(move |s| {
                let animals: Vec<Animal> = match farm_id {
                    Some(farm_id) => s.find_where("farmId", &farm_id)?,
                    None => s.find_all()?,
                };
                resolve_farms(s, animals)
            })
            .await?;
        Ok(views)
    }

    pub async fn get_one(&self, id: &str) -> Result<AnimalView, ControllerError> {
        let key = id.to_string();
        self.store
            .run(move |s| match s.find_by_id::<Animal>(&key)? {
                Some(animal) => Ok(resolve_farms(s, vec![animal])?.pop()),
                None => Ok(None),
            })
            .await?
            .ok_or_else(|| not_found(id))
    }

    /// Replaces the supplied fields of an existing animal
    pub async fn update(&self, id: &str, body: Value) -> Result<AnimalView, ControllerError> {
        let fields = match into_fields(body) {
            Ok(fields) => fields,
            Err(e) => {
                // An unknown id reports NotFound whatever the body
                self.get_one(id).await?;
                return Err(e.into());
            }
        };
        let key = id.to_string();
        let view = self
            .store
            .write(move |s| match s.update_by_id::<Animal>(&key, fields)? {
                Some(animal) => Ok(resolve_farms(s, vec![animal])?.pop()),
                None => Ok(None),
            })
            .await?
            .ok_or_else(|| not_found(id))?;

        info!(animal_id = %view.animal.id, "Animal updated");
        self.notifier
            .notify(NotificationEvent::for_animal(Mutation::Updated, &view.animal))
            .await;
        Ok(view)
    }

    /// Removes an animal, returning the removed record
    pub async fn delete(&self, id: &str) -> Result<Animal, ControllerError> {
        let key = id.to_string();
        let animal: Animal = self
            .store
            .write(move |s| s.delete_by_id(&key))
            .await?
            .ok_or_else(|| not_found(id))?;

        info!(animal_id = %animal.id, "Animal deleted");
        self.notifier
            .notify(NotificationEvent::for_animal(Mutation::Deleted, &animal))
            .await;
        Ok(animal)
    }
}

/// Attach each animal's farm, looking every distinct farm up once.
fn resolve_farms(
    store: &DocumentStore,
    animals: Vec<Animal>,
) -> Result<Vec<AnimalView>, StoreError> {
    let mut farms: HashMap<String, Option<Farm>> = HashMap::new();
    let mut views = Vec::with_capacity(animals.len());

    for animal in animals {
        let farm = match farms.get(&animal.farm_id) {
            Some(cached) => cached.clone(),
            None => {
                let found: Option<Farm> = store.find_by_id(&animal.farm_id)?;
                farms.insert(animal.farm_id.clone(), found.clone());
                found
            }
        };
        views.push(AnimalView { animal, farm });
    }

    Ok(views)
}

fn not_found(id: &str) -> ControllerError {
    ControllerError::NotFound {
        entity: "Animal",
        id: id.to_string(),
    }
}
