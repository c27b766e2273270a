/*Backend en memoria. Guarda la imagen completa en un Vec<u8> y cuenta las
escrituras, así las pruebas pueden construir imágenes corruptas a mano y
verificar qué tocó el fsck sin pasar por un archivo. */

use super::fsck_backend::{FsckBackend, FsckError};
use crate::fs::{Geometry, InodeDisk, SuperblockDisk};

#[derive(Debug, Clone)]
pub struct MemBackend {
    pub image: Vec<u8>,
    pub block_size: u32,
    pub writes: usize,
}

impl MemBackend {
    /// Imagen de ceros del tamaño exacto de `geometry`.
    pub fn zeroed(geometry: &Geometry) -> Self {
        Self {
            image: vec![0u8; geometry.image_bytes() as usize],
            block_size: geometry.block_size(),
            writes: 0,
        }
    }

    pub fn from_bytes(image: Vec<u8>, block_size: u32) -> Self {
        Self {
            image,
            block_size,
            writes: 0,
        }
    }

    fn range(&self, index: u32) -> Result<std::ops::Range<usize>, FsckError> {
        let bs = self.block_size as usize;
        let start = index as usize * bs;
        if start + bs > self.image.len() {
            return Err(FsckError::BlockOutOfRange {
                index,
                total: (self.image.len() / bs) as u32,
            });
        }
        Ok(start..start + bs)
    }

    // --------- Ayudas para armar y leer imágenes en pruebas ---------

    pub fn superblock(&self) -> SuperblockDisk {
        SuperblockDisk::decode(&self.image[..self.block_size as usize])
    }

    pub fn put_superblock(&mut self, sb: &SuperblockDisk) {
        sb.encode_into(&mut self.image[..self.block_size as usize]);
    }

    pub fn inode(&self, geometry: &Geometry, index: u32) -> InodeDisk {
        let start = self.inode_offset(geometry, index);
        InodeDisk::decode(&self.image[start..start + geometry.inode_size() as usize])
    }

    pub fn put_inode(&mut self, geometry: &Geometry, index: u32, inode: &InodeDisk) {
        let start = self.inode_offset(geometry, index);
        inode.encode_into(&mut self.image[start..start + geometry.inode_size() as usize]);
    }

    /// Lee el bit `index` del bitmap guardado en el bloque `block`.
    pub fn bit(&self, block: u32, index: u32) -> bool {
        let byte = block as usize * self.block_size as usize + (index / 8) as usize;
        (self.image[byte] >> (index % 8)) & 1 == 1
    }

    pub fn put_bit(&mut self, block: u32, index: u32, used: bool) {
        let byte = block as usize * self.block_size as usize + (index / 8) as usize;
        if used {
            self.image[byte] |= 1 << (index % 8);
        } else {
            self.image[byte] &= !(1 << (index % 8));
        }
    }

    fn inode_offset(&self, geometry: &Geometry, index: u32) -> usize {
        let (block, offset) = geometry.inode_location(index);
        block as usize * self.block_size as usize + offset
    }
}

impl FsckBackend for MemBackend {
    fn block_size(&self) -> u32 {
        self.block_size
    }

    fn size_bytes(&mut self) -> Result<u64, FsckError> {
        Ok(self.image.len() as u64)
    }

    fn read_block(&mut self, index: u32) -> Result<Vec<u8>, FsckError> {
        let range = self.range(index)?;
        Ok(self.image[range].to_vec())
    }

    fn write_block(&mut self, index: u32, data: &[u8]) -> Result<(), FsckError> {
        let range = self.range(index)?;
        if data.len() != range.len() {
            return Err(FsckError::ShortBuffer {
                expected: range.len(),
                actual: data.len(),
            });
        }
        self.image[range].copy_from_slice(data);
        self.writes += 1;
        Ok(())
    }
}
