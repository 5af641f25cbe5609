use super::RecordStore;
use crate::error::StoreError;
use crate::record::DocumentRecord;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Mutex;

/// Records held in a process-local map.
///
/// Suitable for tests and throwaway runs; everything is lost on drop.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, DocumentRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RecordStore for MemoryStore {
    fn insert(&self, record: DocumentRecord) -> Result<(), StoreError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".into()))?;
        match records.entry(record.code.clone()) {
            Entry::Occupied(_) => Err(StoreError::Conflict { code: record.code }),
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(())
            }
        }
    }

    fn get_by_code(&self, code: &str) -> Result<Option<DocumentRecord>, StoreError> {
        let records = self
            .records
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".into()))?;
        Ok(records.get(code).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::contract;

    #[test]
    fn insert_then_get() {
        contract::insert_then_get(&MemoryStore::new());
    }

    #[test]
    fn missing_code_is_none() {
        contract::missing_code_is_none(&MemoryStore::new());
    }

    #[test]
    fn duplicate_insert_conflicts() {
        let store = MemoryStore::new();
        contract::duplicate_insert_conflicts(&store);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn lookup_is_repeatable() {
        contract::lookup_is_repeatable(&MemoryStore::new());
    }
}
