pub mod fsck_backend;
pub mod fsck_types;
pub mod mock;
#[allow(clippy::module_inception)]
pub mod fsck;

pub use fsck::{check_superblock, reconcile_data_bitmap, run_fsck, scan_inodes};
