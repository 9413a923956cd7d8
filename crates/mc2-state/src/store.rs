//! StateStore — redb-backed controller persistence.
//!
//! Controllers are JSON-serialized into the `controllers` table. A second
//! table reserves app ids so that two controllers can never share one,
//! even after a soft delete. Inserts check both tables inside a single
//! write transaction.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::transitions::ControllerState;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe controller store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(CONTROLLERS).map_err(map_err!(Table))?;
        txn.open_table(APP_IDS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Insert a new controller and reserve its app id.
    ///
    /// Fails with `Conflict` if the id or the app id is already taken.
    pub fn insert_controller(&self, controller: &Controller) -> StateResult<()> {
        let value = serde_json::to_vec(controller).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut controllers = txn.open_table(CONTROLLERS).map_err(map_err!(Table))?;
            let mut app_ids = txn.open_table(APP_IDS).map_err(map_err!(Table))?;

            if controllers
                .get(controller.id.as_str())
                .map_err(map_err!(Read))?
                .is_some()
            {
                return Err(StateError::Conflict(format!(
                    "controller {} already exists",
                    controller.id
                )));
            }
            if let Some(owner) = app_ids
                .get(controller.app_id.as_str())
                .map_err(map_err!(Read))?
            {
                return Err(StateError::Conflict(format!(
                    "app id {} is reserved by controller {}",
                    controller.app_id,
                    owner.value()
                )));
            }

            controllers
                .insert(controller.id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
            app_ids
                .insert(controller.app_id.as_str(), controller.id.as_str())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(controller = %controller.id, app_id = %controller.app_id, "controller inserted");
        Ok(())
    }

    /// Overwrite an existing controller.
    ///
    /// Fails with `NotFound` for unknown ids and `Immutable` when the app
    /// id differs from the stored one.
    pub fn put_controller(&self, controller: &Controller) -> StateResult<()> {
        let value = serde_json::to_vec(controller).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut controllers = txn.open_table(CONTROLLERS).map_err(map_err!(Table))?;
            let stored: Controller = match controllers
                .get(controller.id.as_str())
                .map_err(map_err!(Read))?
            {
                Some(guard) => {
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?
                }
                None => return Err(StateError::NotFound(controller.id.clone())),
            };
            if stored.app_id != controller.app_id {
                return Err(StateError::Immutable(format!(
                    "{} -> {}",
                    stored.app_id, controller.app_id
                )));
            }
            controllers
                .insert(controller.id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(controller = %controller.id, state = %controller.state(), "controller stored");
        Ok(())
    }

    /// Get a controller by id.
    pub fn get_controller(&self, id: &str) -> StateResult<Option<Controller>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(CONTROLLERS).map_err(map_err!(Table))?;
        match table.get(id).map_err(map_err!(Read))? {
            Some(guard) => {
                let controller: Controller =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(controller))
            }
            None => Ok(None),
        }
    }

    /// Look up which controller holds an app id.
    pub fn controller_id_for_app(&self, app_id: &str) -> StateResult<Option<ControllerId>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(APP_IDS).map_err(map_err!(Table))?;
        Ok(table
            .get(app_id)
            .map_err(map_err!(Read))?
            .map(|guard| guard.value().to_string()))
    }

    /// List every controller, including soft-deleted ones.
    pub fn list_controllers(&self) -> StateResult<Vec<Controller>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(CONTROLLERS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let controller: Controller =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(controller);
        }
        Ok(results)
    }

    /// Live (not deleted) controllers owned by an organization.
    pub fn list_controllers_for_org(&self, organization_id: &str) -> StateResult<Vec<Controller>> {
        Ok(self
            .list_controllers()?
            .into_iter()
            .filter(|c| c.organization_id == organization_id)
            .filter(|c| c.state() != ControllerState::Deleted)
            .collect())
    }

    /// Controllers currently in one of `states`, deleted ones included
    /// when `states` lists `Deleted`.
    pub fn list_controllers_in(&self, states: &[ControllerState]) -> StateResult<Vec<Controller>> {
        Ok(self
            .list_controllers()?
            .into_iter()
            .filter(|c| states.contains(&c.state()))
            .collect())
    }
}
