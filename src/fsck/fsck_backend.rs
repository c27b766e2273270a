/*Acceso por bloques a la imagen. Define el trait que usa el fsck para
leer y escribir bloques completos, y el backend real sobre un archivo.
Cada llamada transfiere exactamente un bloque en offset = índice × block_size,
sin caché. */

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum FsckError {
    #[error("cannot open image {path:?}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("image {path:?} already exists (use --force to overwrite)")]
    AlreadyExists { path: PathBuf },
    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
    #[error("image is too small: {actual} bytes (need {required})")]
    ImageTooSmall { actual: u64, required: u64 },
    #[error("block {index} out of range (image has {total} blocks)")]
    BlockOutOfRange { index: u32, total: u32 },
    #[error("backend block size {backend} does not match geometry block size {geometry}")]
    BlockSizeMismatch { backend: u32, geometry: u32 },
    #[error("block buffer has {actual} bytes, expected {expected}")]
    ShortBuffer { expected: usize, actual: usize },
}

pub trait FsckBackend {
    /// Tamaño del bloque con el que trabaja el backend.
    fn block_size(&self) -> u32;
    /// Tamaño real de la imagen en bytes.
    fn size_bytes(&mut self) -> Result<u64, FsckError>;
    fn read_block(&mut self, index: u32) -> Result<Vec<u8>, FsckError>;
    fn write_block(&mut self, index: u32, data: &[u8]) -> Result<(), FsckError>;
}

/// Imagen VSFS en un archivo. En modo sólo lectura cualquier escritura falla
/// en el sistema operativo, el checker nunca la intenta.
pub struct FileBackend {
    file: File,
    block_size: u32,
}

impl FileBackend {
    pub fn open(path: &Path, block_size: u32, writable: bool) -> Result<Self, FsckError> {
        let file = OpenOptions::new()
            .read(true)
            .write(writable)
            .open(path)
            .map_err(|source| FsckError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        debug!(?path, writable, "image opened");
        Ok(Self { file, block_size })
    }

    /// Crea (o trunca con `force`) un archivo de exactamente `len` bytes.
    pub fn create(path: &Path, block_size: u32, len: u64, force: bool) -> Result<Self, FsckError> {
        if path.exists() && !force {
            return Err(FsckError::AlreadyExists {
                path: path.to_path_buf(),
            });
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|source| FsckError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        file.set_len(len).map_err(|source| FsckError::Io {
            context: format!("cannot resize image to {len} bytes"),
            source,
        })?;
        Ok(Self { file, block_size })
    }

    fn seek_to(&mut self, index: u32) -> Result<(), FsckError> {
        let offset = u64::from(index) * u64::from(self.block_size);
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|source| FsckError::Io {
                context: format!("cannot seek to block {index}"),
                source,
            })?;
        Ok(())
    }
}

impl FsckBackend for FileBackend {
    fn block_size(&self) -> u32 {
        self.block_size
    }

    fn size_bytes(&mut self) -> Result<u64, FsckError> {
        let meta = self.file.metadata().map_err(|source| FsckError::Io {
            context: "cannot stat image".into(),
            source,
        })?;
        Ok(meta.len())
    }

    fn read_block(&mut self, index: u32) -> Result<Vec<u8>, FsckError> {
        self.seek_to(index)?;
        let mut buf = vec![0u8; self.block_size as usize];
        self.file
            .read_exact(&mut buf)
            .map_err(|source| FsckError::Io {
                context: format!("cannot read block {index}"),
                source,
            })?;
        debug!(block = index, "block read");
        Ok(buf)
    }

    fn write_block(&mut self, index: u32, data: &[u8]) -> Result<(), FsckError> {
        if data.len() != self.block_size as usize {
            return Err(FsckError::ShortBuffer {
                expected: self.block_size as usize,
                actual: data.len(),
            });
        }
        self.seek_to(index)?;
        self.file
            .write_all(data)
            .and_then(|()| self.file.flush())
            .map_err(|source| FsckError::Io {
                context: format!("cannot write block {index}"),
                source,
            })?;
        debug!(block = index, "block written");
        Ok(())
    }
}
