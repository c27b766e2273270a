/*Define los tipos del reporte del fsck:
fases del chequeo, severidad, cada inconsistencia encontrada (Issue)
y el FsckReport donde se acumulan junto con los contadores del recorrido. */

use std::fmt;

/// Modo de ejecución del fsck.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FsckOptions {
    /// Con `repair` las correcciones se aplican y se escriben a la imagen.
    pub repair: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Superblock,
    Inodes,
    DataBitmap,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::Superblock, Phase::Inodes, Phase::DataBitmap];

    /// Línea que se imprime al iniciar la fase.
    pub fn banner(self) -> &'static str {
        match self {
            Phase::Superblock => "Validating Superblock...",
            Phase::Inodes => "Checking Inodes and Bitmaps...",
            Phase::DataBitmap => "Checking Data Bitmap...",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// Campos del superblock que deben coincidir exactamente con la geometría.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuperblockField {
    Magic,
    BlockSize,
    TotalBlocks,
    InodeBitmapBlock,
    DataBitmapBlock,
    InodeTableStart,
    FirstDataBlock,
    InodeSize,
}

impl SuperblockField {
    fn label(self) -> &'static str {
        match self {
            SuperblockField::Magic => "Magic number",
            SuperblockField::BlockSize => "Block size",
            SuperblockField::TotalBlocks => "Total blocks",
            SuperblockField::InodeBitmapBlock => "Inode bitmap block",
            SuperblockField::DataBitmapBlock => "Data bitmap block",
            SuperblockField::InodeTableStart => "Inode table start",
            SuperblockField::FirstDataBlock => "First data block",
            SuperblockField::InodeSize => "Inode size",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Issue {
    SuperblockField {
        field: SuperblockField,
        found: u32,
        expected: u32,
    },
    InodeCountExceedsMax { found: u32, max: u32 },
    InodeMarkedButInvalid { inode: u32 },
    InodeValidButUnmarked { inode: u32 },
    /// `block` es el número absoluto de bloque, no el relativo.
    BlockNotMarked { block: u32, inode: u32 },
    DuplicateBlock { block: u32, inode: u32 },
    InvalidPointer { pointer: u32, inode: u32 },
    UnreferencedBlock { block: u32 },
}

impl Issue {
    pub fn severity(&self) -> Severity {
        match self {
            Issue::InodeCountExceedsMax { .. } | Issue::UnreferencedBlock { .. } => {
                Severity::Warning
            }
            _ => Severity::Error,
        }
    }

    pub fn phase(&self) -> Phase {
        match self {
            Issue::SuperblockField { .. } | Issue::InodeCountExceedsMax { .. } => {
                Phase::Superblock
            }
            Issue::UnreferencedBlock { .. } => Phase::DataBitmap,
            _ => Phase::Inodes,
        }
    }

    /// Descripción de la corrección aplicada en modo reparación.
    pub fn fix_description(&self) -> String {
        match self {
            Issue::SuperblockField { expected, .. } => format!("Fixed: restored to {expected}"),
            Issue::InodeCountExceedsMax { max, .. } => format!("Fixed: clamped to {max}"),
            Issue::InodeMarkedButInvalid { .. } => "Fixed: Inode bitmap cleared".into(),
            Issue::InodeValidButUnmarked { .. } => "Fixed: Inode bitmap set".into(),
            Issue::BlockNotMarked { block, .. } => {
                format!("Fixed: Data bitmap set for block {block}")
            }
            Issue::DuplicateBlock { inode, .. } => {
                format!("Fixed: Inode {inode} direct pointer cleared")
            }
            Issue::InvalidPointer { inode, .. } => {
                format!("Fixed: Cleared invalid direct pointer in inode {inode}")
            }
            Issue::UnreferencedBlock { block } => {
                format!("Fixed: Cleared data bitmap for block {block}")
            }
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Issue::SuperblockField {
                field: SuperblockField::Magic,
                found,
                ..
            } => write!(f, "Invalid magic number: {found:#x}"),
            Issue::SuperblockField { field, found, .. } => {
                write!(f, "{} is {found}", field.label())
            }
            Issue::InodeCountExceedsMax { found, max } => {
                write!(f, "inode_count ({found}) exceeds max ({max}). Clamping.")
            }
            Issue::InodeMarkedButInvalid { inode } => {
                write!(f, "Inode {inode} marked used but invalid")
            }
            Issue::InodeValidButUnmarked { inode } => {
                write!(f, "Inode {inode} not marked but valid")
            }
            Issue::BlockNotMarked { block, inode } => {
                write!(f, "Data block {block} used by inode {inode} not marked in bitmap")
            }
            Issue::DuplicateBlock { block, inode } => {
                write!(f, "Duplicate data block {block} used in inode {inode}")
            }
            Issue::InvalidPointer { pointer, inode } => {
                write!(f, "Invalid direct pointer {pointer} in inode {inode}")
            }
            Issue::UnreferencedBlock { block } => {
                write!(f, "Data block {block} marked used but unreferenced")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub issue: Issue,
    pub fixed: bool,
}

#[derive(Debug, Default)]
pub struct FsckReport {
    pub repair: bool,
    pub findings: Vec<Finding>,
    pub inodes_scanned: u32,
    pub data_blocks_swept: u32,
    pub blocks_written: u32,
}

impl FsckReport {
    pub fn new(options: FsckOptions) -> Self {
        Self {
            repair: options.repair,
            ..Self::default()
        }
    }

    pub fn record(&mut self, issue: Issue, fixed: bool) {
        self.findings.push(Finding { issue, fixed });
    }

    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn in_phase(&self, phase: Phase) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(move |f| f.issue.phase() == phase)
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.findings
            .iter()
            .filter(|f| f.issue.severity() == severity)
            .count()
    }

    pub fn fixed_count(&self) -> usize {
        self.findings.iter().filter(|f| f.fixed).count()
    }
}
