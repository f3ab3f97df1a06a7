use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use log::warn;

use soc_control::bsp::storage::{Storage, StorageError};

/// Non-volatile memory of the simulated board, kept in a file between runs
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn create(path: PathBuf) -> Self {
        FileStorage { path }
    }
}

fn io_error(e: std::io::Error) -> StorageError {
    warn!("storage: {}", e);
    StorageError::Io
}

impl Storage for FileStorage {
    fn read(&self, offset: u32, buf: &mut [u8]) -> Result<(), StorageError> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(StorageError::Unwritten),
            Err(e) => return Err(io_error(e)),
        };
        let len = file.metadata().map_err(io_error)?.len();
        if len < offset as u64 + buf.len() as u64 {
            return Err(StorageError::Unwritten);
        }
        file.seek(SeekFrom::Start(offset as u64))
            .map_err(io_error)?;
        file.read_exact(buf).map_err(io_error)
    }

    fn write(&self, offset: u32, data: &[u8]) -> Result<(), StorageError> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&self.path)
            .map_err(io_error)?;
        file.seek(SeekFrom::Start(offset as u64))
            .map_err(io_error)?;
        file.write_all(data).map_err(io_error)?;
        file.sync_all().map_err(io_error)
    }
}
