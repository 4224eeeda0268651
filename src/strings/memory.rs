use super::CacheError;
use super::StringStore;
use crate::error::SheetStreamError;

/// Strings kept in a plain vector
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Vec<String>,
    closed: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StringStore for MemoryStore {
    fn push(&mut self, value: &str) -> Result<(), SheetStreamError> {
        if self.closed {
            Err(CacheError::Closed)?;
        }
        self.values.push(value.to_owned());
        Ok(())
    }

    fn get(&mut self, index: usize) -> Result<String, SheetStreamError> {
        match self.values.get(index) {
            Some(value) => Ok(value.clone()),
            None => Err(CacheError::NotFound(index))?,
        }
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    fn close(&mut self) -> Result<(), SheetStreamError> {
        self.closed = true;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), SheetStreamError> {
        self.values = Vec::new();
        Ok(())
    }
}
