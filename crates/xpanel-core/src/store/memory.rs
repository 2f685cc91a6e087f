//! Process-local backend, used by tests and dry runs.

use std::sync::{Mutex, PoisonError};

use super::{Backend, Database, StoreError};

#[derive(Debug, Default)]
pub struct MemoryBackend {
    database: Mutex<Database>,
}

impl MemoryBackend {
    pub fn new(database: Database) -> Self {
        Self {
            database: Mutex::new(database),
        }
    }
}

impl Backend for MemoryBackend {
    fn load(&self) -> Result<Database, StoreError> {
        let database = self
            .database
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(database.clone())
    }

    fn persist(&self, database: &Database) -> Result<(), StoreError> {
        let mut current = self
            .database
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *current = database.clone();
        Ok(())
    }
}
