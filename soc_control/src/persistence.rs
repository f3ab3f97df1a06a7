use core::mem::size_of;

use log::warn;

use crate::bsp::storage::{Storage, StorageError};

/// One little-endian `f32` holding the remaining capacity in Ah
pub const RECORD_SIZE: usize = size_of::<f32>();

/// Remaining capacity record at a fixed offset of the non-volatile storage
pub struct CapacityStore<'a> {
    storage: &'a dyn Storage,
    offset: u32,
}

impl<'a> CapacityStore<'a> {
    pub fn new(storage: &'a dyn Storage, offset: u32) -> Self {
        CapacityStore { storage, offset }
    }

    /// Previously saved value, if there is one. The value itself is not validated here.
    pub fn load(&self) -> Option<f32> {
        let mut record = [0u8; RECORD_SIZE];
        match self.storage.read(self.offset, &mut record) {
            Ok(()) => Some(f32::from_le_bytes(record)),
            Err(StorageError::Unwritten) => None,
            Err(e) => {
                warn!("cannot read capacity record: {}", e);
                None
            }
        }
    }

    pub fn save(&self, remaining_capacity_ah: f32) -> Result<(), StorageError> {
        self.storage
            .write(self.offset, &remaining_capacity_ah.to_le_bytes())
    }
}
