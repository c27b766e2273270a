/*Formateo de imágenes VSFS. Escribe una imagen vacía y consistente:
superblock canónico, bitmaps y tabla de inodos en cero, región de datos en cero. */

use tracing::info;

use crate::fs::{Geometry, SuperblockDisk};
use crate::fsck::fsck_backend::{FsckBackend, FsckError};

pub fn format_image<B: FsckBackend>(backend: &mut B, geometry: &Geometry) -> Result<(), FsckError> {
    if backend.block_size() != geometry.block_size() {
        return Err(FsckError::BlockSizeMismatch {
            backend: backend.block_size(),
            geometry: geometry.block_size(),
        });
    }

    let zero = vec![0u8; geometry.block_size() as usize];

    write_superblock(backend, geometry)?;
    write_bitmaps(backend, geometry, &zero)?;
    write_inode_table(backend, geometry, &zero)?;
    zero_data_blocks(backend, geometry, &zero)?;

    info!(
        blocks = geometry.total_blocks(),
        inodes = geometry.max_inodes(),
        data_blocks = geometry.data_block_count(),
        "image formatted"
    );
    Ok(())
}

fn write_superblock<B: FsckBackend>(backend: &mut B, geometry: &Geometry) -> Result<(), FsckError> {
    let mut block = vec![0u8; geometry.block_size() as usize];
    SuperblockDisk::for_geometry(geometry).encode_into(&mut block);
    backend.write_block(0, &block)
}

fn write_bitmaps<B: FsckBackend>(
    backend: &mut B,
    geometry: &Geometry,
    zero: &[u8],
) -> Result<(), FsckError> {
    backend.write_block(geometry.inode_bitmap_block(), zero)?;
    backend.write_block(geometry.data_bitmap_block(), zero)
}

fn write_inode_table<B: FsckBackend>(
    backend: &mut B,
    geometry: &Geometry,
    zero: &[u8],
) -> Result<(), FsckError> {
    let start = geometry.inode_table_start();
    for block in start..start + geometry.inode_table_blocks() {
        backend.write_block(block, zero)?;
    }
    Ok(())
}

fn zero_data_blocks<B: FsckBackend>(
    backend: &mut B,
    geometry: &Geometry,
    zero: &[u8],
) -> Result<(), FsckError> {
    for block in geometry.first_data_block()..geometry.total_blocks() {
        backend.write_block(block, zero)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{VSFS_BLOCK_SIZE, VSFS_MAGIC};
    use crate::fsck::mock::MemBackend;

    #[test]
    fn formats_every_region() {
        let geo = Geometry::vsfs();
        let mut mem = MemBackend::from_bytes(vec![0xFF; geo.image_bytes() as usize], VSFS_BLOCK_SIZE);

        format_image(&mut mem, &geo).expect("format");

        let sb = mem.superblock();
        assert_eq!(sb.magic, VSFS_MAGIC);
        assert_eq!(sb.inode_count, 80);
        assert_eq!(sb.first_data_block, 8);
        assert!(mem.image[VSFS_BLOCK_SIZE as usize..].iter().all(|&b| b == 0));
        // bloques 0..3, tabla 3..8, datos 8..64
        assert_eq!(mem.writes, 64);
    }

    #[test]
    fn rejects_mismatched_block_size() {
        let geo = Geometry::vsfs();
        let mut mem = MemBackend::from_bytes(vec![0; 64 * 1024], 1024);
        assert!(matches!(
            format_image(&mut mem, &geo),
            Err(FsckError::BlockSizeMismatch { backend: 1024, geometry: 4096 })
        ));
    }
}
