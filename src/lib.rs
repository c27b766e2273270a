mod bitmap;
mod fs;
pub mod fsck;
pub mod mkfs;

pub use crate::bitmap::Bitmap;
pub use crate::fs::{
    Geometry,
    GeometryError,
    SuperblockDisk,
    InodeDisk,
    VSFS_BLOCK_SIZE,
    VSFS_MAGIC,
};
pub use crate::fsck::fsck_backend::{FileBackend, FsckBackend, FsckError};
pub use crate::fsck::fsck_types::{
    Finding,
    FsckOptions,
    FsckReport,
    Issue,
    Phase,
    Severity,
    SuperblockField,
};
pub use crate::fsck::mock::MemBackend;
