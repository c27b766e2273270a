use thiserror::Error;

// -----------------------------------------------------------------------------
// Constantes del formato VSFS
// -----------------------------------------------------------------------------

pub const VSFS_MAGIC: u16 = 0xD34D;
pub const VSFS_BLOCK_SIZE: u32 = 4096;
pub const VSFS_TOTAL_BLOCKS: u32 = 64;
pub const VSFS_INODE_SIZE: u32 = 256;
pub const VSFS_INODE_BITMAP_BLOCK: u32 = 1;
pub const VSFS_DATA_BITMAP_BLOCK: u32 = 2;
pub const VSFS_INODE_TABLE_START: u32 = 3;
pub const VSFS_INODE_TABLE_BLOCKS: u32 = 5;
pub const VSFS_FIRST_DATA_BLOCK: u32 = 8;

/// Bytes ocupados por los campos del superblock (magic u16 + 8 campos u32).
/// El resto del bloque 0 es relleno reservado.
pub const SUPERBLOCK_FIELDS_LEN: usize = 2 + 8 * 4;

/// Bytes ocupados por los campos del inodo (14 campos u32).
/// El resto del registro es relleno reservado.
pub const INODE_FIELDS_LEN: usize = 14 * 4;

// -----------------------------------------------------------------------------
// Geometría
// -----------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GeometryError {
    #[error("block size {0} cannot hold the superblock fields")]
    BlockSize(u32),
    #[error("inode size {inode_size} must fit the inode fields and the block size {block_size}")]
    InodeSize { inode_size: u32, block_size: u32 },
    #[error("regions out of order: inode bitmap {inode_bitmap}, data bitmap {data_bitmap}, inode table {inode_table_start}..{inode_table_end}, data {first_data_block}..{total_blocks}")]
    Layout {
        inode_bitmap: u32,
        data_bitmap: u32,
        inode_table_start: u32,
        inode_table_end: u32,
        first_data_block: u32,
        total_blocks: u32,
    },
    #[error("{what} bitmap needs {bits} bits but one block holds only {capacity}")]
    BitmapTooLarge {
        what: &'static str,
        bits: u64,
        capacity: u64,
    },
}

/// Geometría fija de una imagen. Se construye una sola vez y se pasa por
/// referencia a cada componente del checker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    block_size: u32,
    total_blocks: u32,
    inode_bitmap_block: u32,
    data_bitmap_block: u32,
    inode_table_start: u32,
    inode_table_blocks: u32,
    first_data_block: u32,
    inode_size: u32,
}

impl Geometry {
    /// La geometría de producción de VSFS: 64 bloques de 4 KiB.
    pub const fn vsfs() -> Self {
        Self {
            block_size: VSFS_BLOCK_SIZE,
            total_blocks: VSFS_TOTAL_BLOCKS,
            inode_bitmap_block: VSFS_INODE_BITMAP_BLOCK,
            data_bitmap_block: VSFS_DATA_BITMAP_BLOCK,
            inode_table_start: VSFS_INODE_TABLE_START,
            inode_table_blocks: VSFS_INODE_TABLE_BLOCKS,
            first_data_block: VSFS_FIRST_DATA_BLOCK,
            inode_size: VSFS_INODE_SIZE,
        }
    }

    /// Geometría a medida (por ejemplo una imagen sintética más pequeña).
    /// Exige el orden superblock, bitmap de inodos, bitmap de datos,
    /// tabla de inodos, datos.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        block_size: u32,
        total_blocks: u32,
        inode_bitmap_block: u32,
        data_bitmap_block: u32,
        inode_table_start: u32,
        inode_table_blocks: u32,
        first_data_block: u32,
        inode_size: u32,
    ) -> Result<Self, GeometryError> {
        if (block_size as usize) < SUPERBLOCK_FIELDS_LEN {
            return Err(GeometryError::BlockSize(block_size));
        }
        if (inode_size as usize) < INODE_FIELDS_LEN || inode_size > block_size {
            return Err(GeometryError::InodeSize { inode_size, block_size });
        }

        let inode_table_end = inode_table_start.saturating_add(inode_table_blocks);
        let ordered = inode_bitmap_block >= 1
            && data_bitmap_block > inode_bitmap_block
            && inode_table_start > data_bitmap_block
            && inode_table_blocks > 0
            && first_data_block >= inode_table_end
            && total_blocks > first_data_block;
        if !ordered {
            return Err(GeometryError::Layout {
                inode_bitmap: inode_bitmap_block,
                data_bitmap: data_bitmap_block,
                inode_table_start,
                inode_table_end,
                first_data_block,
                total_blocks,
            });
        }

        // Los conteos se calculan en u64 y la capacidad se acota a u32, así
        // `max_inodes()` nunca desborda en una geometría aceptada.
        let capacity = (u64::from(block_size) * 8).min(u64::from(u32::MAX));
        let max_inodes = u64::from(inode_table_blocks) * u64::from(block_size / inode_size);
        if max_inodes > capacity {
            return Err(GeometryError::BitmapTooLarge {
                what: "inode",
                bits: max_inodes,
                capacity,
            });
        }
        let data_blocks = u64::from(total_blocks - first_data_block);
        if data_blocks > capacity {
            return Err(GeometryError::BitmapTooLarge {
                what: "data",
                bits: data_blocks,
                capacity,
            });
        }

        Ok(Self {
            block_size,
            total_blocks,
            inode_bitmap_block,
            data_bitmap_block,
            inode_table_start,
            inode_table_blocks,
            first_data_block,
            inode_size,
        })
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn total_blocks(&self) -> u32 {
        self.total_blocks
    }

    pub fn inode_bitmap_block(&self) -> u32 {
        self.inode_bitmap_block
    }

    pub fn data_bitmap_block(&self) -> u32 {
        self.data_bitmap_block
    }

    pub fn inode_table_start(&self) -> u32 {
        self.inode_table_start
    }

    pub fn inode_table_blocks(&self) -> u32 {
        self.inode_table_blocks
    }

    pub fn first_data_block(&self) -> u32 {
        self.first_data_block
    }

    pub fn inode_size(&self) -> u32 {
        self.inode_size
    }

    pub fn inodes_per_block(&self) -> u32 {
        self.block_size / self.inode_size
    }

    pub fn max_inodes(&self) -> u32 {
        self.inode_table_blocks * self.inodes_per_block()
    }

    pub fn data_block_count(&self) -> u32 {
        self.total_blocks - self.first_data_block
    }

    /// Tamaño mínimo que debe tener el archivo de imagen.
    pub fn image_bytes(&self) -> u64 {
        u64::from(self.total_blocks) * u64::from(self.block_size)
    }

    /// `true` si `block` cae dentro de la región de datos.
    pub fn is_data_block(&self, block: u32) -> bool {
        block >= self.first_data_block && block < self.total_blocks
    }

    /// Ubica el inodo `index`: (bloque de la tabla, offset en bytes dentro del bloque).
    pub fn inode_location(&self, index: u32) -> (u32, usize) {
        let per_block = self.inodes_per_block();
        let block = self.inode_table_start + index / per_block;
        let offset = ((index % per_block) * self.inode_size) as usize;
        (block, offset)
    }
}

// -----------------------------------------------------------------------------
// Lectura/escritura little-endian
// -----------------------------------------------------------------------------

fn read_le_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buf[offset], buf[offset + 1]])
}

fn read_le_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

fn write_le_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn write_le_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

// -------------------- Estructuras en disco --------------------

/// Superblock VSFS (bloque 0), campos empaquetados en little-endian.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SuperblockDisk {
    pub magic: u16,
    pub block_size: u32,
    pub total_blocks: u32,
    pub inode_bitmap_block: u32,
    pub data_bitmap_block: u32,
    pub inode_table_start: u32,
    pub first_data_block: u32,
    pub inode_size: u32,
    pub inode_count: u32,
}

impl SuperblockDisk {
    /// Superblock canónico para `geometry`, con todos los inodos disponibles.
    pub fn for_geometry(geometry: &Geometry) -> Self {
        Self {
            magic: VSFS_MAGIC,
            block_size: geometry.block_size(),
            total_blocks: geometry.total_blocks(),
            inode_bitmap_block: geometry.inode_bitmap_block(),
            data_bitmap_block: geometry.data_bitmap_block(),
            inode_table_start: geometry.inode_table_start(),
            first_data_block: geometry.first_data_block(),
            inode_size: geometry.inode_size(),
            inode_count: geometry.max_inodes(),
        }
    }

    /// `block` debe tener al menos `SUPERBLOCK_FIELDS_LEN` bytes.
    pub fn decode(block: &[u8]) -> Self {
        Self {
            magic: read_le_u16(block, 0),
            block_size: read_le_u32(block, 2),
            total_blocks: read_le_u32(block, 6),
            inode_bitmap_block: read_le_u32(block, 10),
            data_bitmap_block: read_le_u32(block, 14),
            inode_table_start: read_le_u32(block, 18),
            first_data_block: read_le_u32(block, 22),
            inode_size: read_le_u32(block, 26),
            inode_count: read_le_u32(block, 30),
        }
    }

    /// Escribe los campos sobre `block` sin tocar el relleno reservado.
    pub fn encode_into(&self, block: &mut [u8]) {
        write_le_u16(block, 0, self.magic);
        write_le_u32(block, 2, self.block_size);
        write_le_u32(block, 6, self.total_blocks);
        write_le_u32(block, 10, self.inode_bitmap_block);
        write_le_u32(block, 14, self.data_bitmap_block);
        write_le_u32(block, 18, self.inode_table_start);
        write_le_u32(block, 22, self.first_data_block);
        write_le_u32(block, 26, self.inode_size);
        write_le_u32(block, 30, self.inode_count);
    }
}

/// Inodo VSFS. Los punteros indirectos se conservan pero el checker no los interpreta.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InodeDisk {
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub file_size: u32,
    pub atime: u32,
    pub ctime: u32,
    pub mtime: u32,
    pub dtime: u32,
    pub links: u32,
    pub blocks: u32,
    pub direct: u32,
    pub single_indirect: u32,
    pub double_indirect: u32,
    pub triple_indirect: u32,
}

impl InodeDisk {
    /// Un inodo está vivo si tiene enlaces y no fue borrado.
    pub fn is_valid(&self) -> bool {
        self.links > 0 && self.dtime == 0
    }

    /// `record` debe tener al menos `INODE_FIELDS_LEN` bytes.
    pub fn decode(record: &[u8]) -> Self {
        let field = |i: usize| read_le_u32(record, i * 4);
        Self {
            mode: field(0),
            uid: field(1),
            gid: field(2),
            file_size: field(3),
            atime: field(4),
            ctime: field(5),
            mtime: field(6),
            dtime: field(7),
            links: field(8),
            blocks: field(9),
            direct: field(10),
            single_indirect: field(11),
            double_indirect: field(12),
            triple_indirect: field(13),
        }
    }

    pub fn encode_into(&self, record: &mut [u8]) {
        let fields = [
            self.mode,
            self.uid,
            self.gid,
            self.file_size,
            self.atime,
            self.ctime,
            self.mtime,
            self.dtime,
            self.links,
            self.blocks,
            self.direct,
            self.single_indirect,
            self.double_indirect,
            self.triple_indirect,
        ];
        for (i, value) in fields.into_iter().enumerate() {
            write_le_u32(record, i * 4, value);
        }
    }
}
