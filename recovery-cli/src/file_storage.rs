use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Result, bail};
use log::info;
use recovery_core::hal::NonVolatileStorage;

/// Same size as the board's EEPROM.
pub const EEPROM_SIZE: usize = 1024;

/// EEPROM image kept in memory and written back to a file on [`flush`].
///
/// [`flush`]: FileStorage::flush
pub struct FileStorage {
    path: PathBuf,
    bytes: Vec<u8>,
}

impl FileStorage {
    /// Opens the image at `path`, starting from an erased one if the file does
    /// not exist or `fresh` is set.
    pub fn open(path: &Path, fresh: bool) -> Result<Self> {
        let bytes = if path.exists() && !fresh {
            let bytes = fs::read(path)?;
            if bytes.len() != EEPROM_SIZE {
                bail!(
                    "{} is {} bytes, expected an image of {} bytes",
                    path.display(),
                    bytes.len(),
                    EEPROM_SIZE
                );
            }
            info!("loaded eeprom image {}", path.display());
            bytes
        } else {
            vec![0; EEPROM_SIZE]
        };
        Ok(Self {
            path: path.to_path_buf(),
            bytes,
        })
    }

    pub fn flush(&self) -> Result<()> {
        fs::write(&self.path, &self.bytes)?;
        Ok(())
    }
}

impl NonVolatileStorage for FileStorage {
    fn capacity(&self) -> usize {
        self.bytes.len()
    }

    fn read(&mut self, address: usize, buffer: &mut [u8]) {
        let end = (address + buffer.len()).min(self.bytes.len());
        if address < end {
            buffer[..end - address].copy_from_slice(&self.bytes[address..end]);
        }
    }

    fn write(&mut self, address: usize, data: &[u8]) {
        let end = (address + data.len()).min(self.bytes.len());
        if address < end {
            self.bytes[address..end].copy_from_slice(&data[..end - address]);
        }
    }
}
