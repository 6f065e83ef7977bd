use super::{into_fields, ControllerError, Notifier, StoreHandle};
use crate::event::{Mutation, NotificationEvent};
use crate::model::Farm;
use serde_json::Value;
use tracing::info;

/// Farm CRUD with a notification per successful mutation
#[derive(Clone)]
pub struct FarmController {
    store: StoreHandle,
    notifier: Notifier,
}

impl FarmController {
    pub fn new(store: StoreHandle, notifier: Notifier) -> Self {
        Self { store, notifier }
    }

    pub async fn create(&self, body: Value) -> Result<Farm, ControllerError> {
        let fields = into_fields(body)?;
        let farm: Farm = self.store.write(move |s| s.insert(fields)).await?;

        info!(farm_id = %farm.id, name = %farm.name, "Farm created");
        self.notifier
            .notify(NotificationEvent::for_farm(Mutation::Created, &farm))
            .await;
        Ok(farm)
    }

    pub async fn list(&self) -> Result<Vec<Farm>, ControllerError> {
        Ok(self.store.run(|s| s.find_all()).await?)
    }

    pub async fn get_one(&self, id: &str) -> Result<Farm, ControllerError> {
        let key = id.to_string();
        self.store
            .run(move |s| s.find_by_id(&key))
            .await?
            .ok_or_else(|| not_found(id))
    }

    /// Replaces the supplied fields of an existing farm
    pub async fn update(&self, id: &str, body: Value) -> Result<Farm, ControllerError> {
        let fields = match into_fields(body) {
            Ok(fields) => fields,
            Err(e) => {
                // An unknown id reports NotFound whatever the body
                self.get_one(id).await?;
                return Err(e.into());
            }
        };
        let key = id.to_string();
        let farm: Farm = self
            .store
            .write(move |s| s.update_by_id(&key, fields))
            .await?
            .ok_or_else(|| not_found(id))?;

        info!(farm_id = %farm.id, "Farm updated");
        self.notifier
            .notify(NotificationEvent::for_farm(Mutation::Updated, &farm))
            .await;
        Ok(farm)
    }

    /// Removes a farm, returning the removed record. Animals referencing it are kept.
    pub async fn delete(&self, id: &str) -> Result<Farm, ControllerError> {
        let key = id.to_string();
        let farm: Farm = self
            .store
            .write(move |s| s.delete_by_id(&key))
            .await?
            .ok_or_else(|| not_found(id))?;

        info!(farm_id = %farm.id, "Farm deleted");
        self.notifier
            .notify(NotificationEvent::for_farm(Mutation::Deleted, &farm))
            .await;
        Ok(farm)
    }
}

fn not_found(id: &str) -> ControllerError {
    ControllerError::NotFound {
        entity: "Farm",
        id: id.to_string(),
    }
}
