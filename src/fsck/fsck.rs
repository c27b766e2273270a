/*EL ARCHIVO PRINCIPAL DE FSCK. Valida el superblock contra la geometría,
recorre la tabla de inodos reconciliando el bitmap de inodos y el de datos,
barre el bitmap de datos buscando bloques sin dueño y, en modo reparación,
escribe todo lo corregido de vuelta a la imagen. */

use tracing::{debug, info};

use super::fsck_backend::{FsckBackend, FsckError};
use super::fsck_types::*;
use crate::bitmap::Bitmap;
use crate::fs::{Geometry, InodeDisk, SuperblockDisk, VSFS_MAGIC};

/// Escribe un bloque y lo cuenta en el reporte.
fn write_counted<B: FsckBackend>(
    backend: &mut B,
    report: &mut FsckReport,
    index: u32,
    data: &[u8],
) -> Result<(), FsckError> {
    backend.write_block(index, data)?;
    report.blocks_written += 1;
    Ok(())
}

fn record(report: &mut FsckReport, issue: Issue, fixed: bool) {
    debug!(phase = ?issue.phase(), fixed, "{issue}");
    report.record(issue, fixed);
}

fn check_image_size<B: FsckBackend>(backend: &mut B, geometry: &Geometry) -> Result<(), FsckError> {
    if backend.block_size() != geometry.block_size() {
        return Err(FsckError::BlockSizeMismatch {
            backend: backend.block_size(),
            geometry: geometry.block_size(),
        });
    }

    let actual = backend.size_bytes()?;
    let required = geometry.image_bytes();
    if actual < required {
        return Err(FsckError::ImageTooSmall { actual, required });
    }
    Ok(())
}

/// Compara cada campo del superblock con la geometría. En modo reparación
/// corrige los campos y reescribe el bloque 0 sólo si algo cambió.
pub fn check_superblock<B: FsckBackend>(
    backend: &mut B,
    geometry: &Geometry,
    options: FsckOptions,
    report: &mut FsckReport,
) -> Result<SuperblockDisk, FsckError> {
    let mut block = backend.read_block(0)?;
    let mut sb = SuperblockDisk::decode(&block);
    let mut changed = false;

    // 1. Campos con valor exacto
    let exact = [
        (SuperblockField::Magic, u32::from(sb.magic), u32::from(VSFS_MAGIC)),
        (SuperblockField::BlockSize, sb.block_size, geometry.block_size()),
        (SuperblockField::TotalBlocks, sb.total_blocks, geometry.total_blocks()),
        (SuperblockField::InodeBitmapBlock, sb.inode_bitmap_block, geometry.inode_bitmap_block()),
        (SuperblockField::DataBitmapBlock, sb.data_bitmap_block, geometry.data_bitmap_block()),
        (SuperblockField::InodeTableStart, sb.inode_table_start, geometry.inode_table_start()),
        (SuperblockField::FirstDataBlock, sb.first_data_block, geometry.first_data_block()),
        (SuperblockField::InodeSize, sb.inode_size, geometry.inode_size()),
    ];

    for (field, found, expected) in exact {
        if found == expected {
            continue;
        }
        if options.repair {
            match field {
                SuperblockField::Magic => sb.magic = VSFS_MAGIC,
                SuperblockField::BlockSize => sb.block_size = expected,
                SuperblockField::TotalBlocks => sb.total_blocks = expected,
                SuperblockField::InodeBitmapBlock => sb.inode_bitmap_block = expected,
                SuperblockField::DataBitmapBlock => sb.data_bitmap_block = expected,
                SuperblockField::InodeTableStart => sb.inode_table_start = expected,
                SuperblockField::FirstDataBlock => sb.first_data_block = expected,
                SuperblockField::InodeSize => sb.inode_size = expected,
            }
            changed = true;
        }
        record(
            report,
            Issue::SuperblockField { field, found, expected },
            options.repair,
        );
    }

    // 2. inode_count sólo tiene cota superior
    let max = geometry.max_inodes();
    if sb.inode_count > max {
        let found = sb.inode_count;
        if options.repair {
            sb.inode_count = max;
            changed = true;
        }
        record(report, Issue::InodeCountExceedsMax { found, max }, options.repair);
    }

    if changed {
        debug!("writing fixed superblock");
        sb.encode_into(&mut block);
        write_counted(backend, report, 0, &block)?;
    }

    info!(issues = report.in_phase(Phase::Superblock).count(), "superblock validated");
    Ok(sb)
}

/// Recorre los `max_inodes` slots en orden ascendente. Reconcilia el bitmap
/// de inodos con la validez de cada inodo y, para los válidos, el puntero
/// directo contra el bitmap de datos y contra `seen`. Ante dos inodos con el
/// mismo bloque se queda el de menor índice.
pub fn scan_inodes<B: FsckBackend>(
    backend: &mut B,
    geometry: &Geometry,
    options: FsckOptions,
    inode_bitmap: &mut Bitmap,
    data_bitmap: &mut Bitmap,
    seen: &mut Bitmap,
    report: &mut FsckReport,
) -> Result<(), FsckError> {
    let size = geometry.inode_size() as usize;

    for index in 0..geometry.max_inodes() {
        let (block_index, offset) = geometry.inode_location(index);
        let mut block = backend.read_block(block_index)?;
        let mut inode = InodeDisk::decode(&block[offset..offset + size]);
        report.inodes_scanned += 1;

        // 1. Bitmap de inodos vs validez
        let valid = inode.is_valid();
        let marked = inode_bitmap.is_set(index);
        if marked && !valid {
            if options.repair {
                inode_bitmap.clear(index);
            }
            record(report, Issue::InodeMarkedButInvalid { inode: index }, options.repair);
        } else if !marked && valid {
            if options.repair {
                inode_bitmap.set(index);
            }
            record(report, Issue::InodeValidButUnmarked { inode: index }, options.repair);
        }

        if !valid {
            continue;
        }

        // 2. Puntero directo
        let pointer = inode.direct;
        if geometry.is_data_block(pointer) {
            let rel = pointer - geometry.first_data_block();

            if !data_bitmap.is_set(rel) {
                if options.repair {
                    data_bitmap.set(rel);
                }
                record(
                    report,
                    Issue::BlockNotMarked { block: pointer, inode: index },
                    options.repair,
                );
            }

            if seen.is_set(rel) {
                if options.repair {
                    inode.direct = 0;
                    inode.encode_into(&mut block[offset..offset + size]);
                    write_counted(backend, report, block_index, &block)?;
                }
                record(
                    report,
                    Issue::DuplicateBlock { block: pointer, inode: index },
                    options.repair,
                );
            } else {
                seen.set(rel);
            }
        } else if pointer != 0 {
            if options.repair {
                inode.direct = 0;
                inode.encode_into(&mut block[offset..offset + size]);
                write_counted(backend, report, block_index, &block)?;
            }
            record(
                report,
                Issue::InvalidPointer { pointer, inode: index },
                options.repair,
            );
        }
    }

    info!(inodes = report.inodes_scanned, "inode scan complete");
    Ok(())
}

/// Barre el bitmap de datos: todo bloque marcado que ningún inodo válido
/// referenció durante el scan queda huérfano. Debe correr después de
/// `scan_inodes`, cuando `seen` ya está completo.
pub fn reconcile_data_bitmap(
    geometry: &Geometry,
    options: FsckOptions,
    data_bitmap: &mut Bitmap,
    seen: &Bitmap,
    report: &mut FsckReport,
) {
    for rel in 0..geometry.data_block_count() {
        report.data_blocks_swept += 1;
        if data_bitmap.is_set(rel) && !seen.is_set(rel) {
            if options.repair {
                data_bitmap.clear(rel);
            }
            record(
                report,
                Issue::UnreferencedBlock { block: rel + geometry.first_data_block() },
                options.repair,
            );
        }
    }

    info!(blocks = report.data_blocks_swept, "data bitmap swept");
}

pub fn run_fsck<B: FsckBackend>(
    backend: &mut B,
    geometry: &Geometry,
    options: FsckOptions,
) -> Result<FsckReport, FsckError> {
    let mut report = FsckReport::new(options);

    // --- Paso 0: la imagen debe tener el tamaño completo ---
    check_image_size(backend, geometry)?;

    // --- Paso 1: superblock ---
    check_superblock(backend, geometry, options, &mut report)?;

    // --- Paso 2: bitmaps, siempre desde la geometría corregida ---
    let mut inode_bitmap = Bitmap::from_block(backend.read_block(geometry.inode_bitmap_block())?);
    let mut data_bitmap = Bitmap::from_block(backend.read_block(geometry.data_bitmap_block())?);
    let mut seen = Bitmap::zeroed(geometry.block_size() as usize);

    // --- Paso 3: inodos ---
    scan_inodes(
        backend,
        geometry,
        options,
        &mut inode_bitmap,
        &mut data_bitmap,
        &mut seen,
        &mut report,
    )?;

    // --- Paso 4: bloques marcados sin referencia ---
    reconcile_data_bitmap(geometry, options, &mut data_bitmap, &seen, &mut report);

    // --- Paso 5: persistir bitmaps una sola vez ---
    if options.repair {
        if inode_bitmap.is_dirty() {
            write_counted(backend, &mut report, geometry.inode_bitmap_block(), inode_bitmap.as_bytes())?;
        }
        if data_bitmap.is_dirty() {
            write_counted(backend, &mut report, geometry.data_bitmap_block(), data_bitmap.as_bytes())?;
        }
    }

    info!(
        findings = report.findings.len(),
        written = report.blocks_written,
        "fsck finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsck::mock::MemBackend;
    use crate::mkfs::format_image;

    const REPAIR: FsckOptions = FsckOptions { repair: true };
    const CHECK: FsckOptions = FsckOptions { repair: false };

    /// Imagen sintética chica: bloques de 512 B, 4 inodos por bloque,
    /// 2 bloques de tabla (8 inodos), datos en 6..16.
    fn small() -> Geometry {
        Geometry::new(512, 16, 1, 2, 3, 2, 6, 128).expect("small geometry")
    }

    fn formatted(geo: &Geometry) -> MemBackend {
        let mut mem = MemBackend::zeroed(geo);
        format_image(&mut mem, geo).expect("format");
        mem.writes = 0;
        mem
    }

    fn live(direct: u32) -> InodeDisk {
        InodeDisk {
            links: 1,
            direct,
            ..Default::default()
        }
    }

    fn issues(report: &FsckReport) -> Vec<Issue> {
        report.findings.iter().map(|f| f.issue.clone()).collect()
    }

    #[test]
    fn fresh_image_is_clean_and_fully_visited() {
        let geo = small();
        let mut mem = formatted(&geo);

        let rep = run_fsck(&mut mem, &geo, REPAIR).expect("fsck");
        assert!(rep.is_clean(), "{:?}", rep.findings);
        assert_eq!(rep.inodes_scanned, 8);
        assert_eq!(rep.data_blocks_swept, 10);
        assert_eq!(rep.blocks_written, 0);
        assert_eq!(mem.writes, 0);
    }

    #[test]
    fn too_small_image_aborts_before_checks() {
        let geo = small();
        let mut mem = MemBackend::from_bytes(vec![0u8; 512 * 15], 512);

        let err = run_fsck(&mut mem, &geo, REPAIR).expect_err("too small");
        assert!(matches!(
            err,
            FsckError::ImageTooSmall { actual: 7680, required: 8192 }
        ));
        assert_eq!(mem.writes, 0);
    }

    #[test]
    fn backend_with_other_block_size_is_rejected() {
        let geo = small();
        let mut mem = MemBackend::from_bytes(vec![0u8; 1024 * 16], 1024);

        let err = run_fsck(&mut mem, &geo, CHECK).expect_err("mismatch");
        assert!(matches!(
            err,
            FsckError::BlockSizeMismatch { backend: 1024, geometry: 512 }
        ));
    }

    #[test]
    fn superblock_fields_restored_and_written_once() {
        let geo = small();
        let mut mem = formatted(&geo);
        let mut sb = mem.superblock();
        sb.magic = 0;
        sb.block_size = 1;
        sb.first_data_block = 99;
        mem.put_superblock(&sb);

        let rep = run_fsck(&mut mem, &geo, REPAIR).expect("fsck");
        assert_eq!(rep.in_phase(Phase::Superblock).count(), 3);
        assert!(rep.findings.iter().all(|f| f.fixed));
        assert_eq!(mem.superblock(), SuperblockDisk::for_geometry(&geo));
        assert_eq!(mem.writes, 1);
    }

    #[test]
    fn inode_count_is_clamped_not_canonicalized() {
        let geo = small();
        let mut mem = formatted(&geo);
        let mut sb = mem.superblock();
        sb.inode_count = 3;
        mem.put_superblock(&sb);

        let rep = run_fsck(&mut mem, &geo, REPAIR).expect("fsck");
        assert!(rep.is_clean());
        assert_eq!(mem.superblock().inode_count, 3);

        sb.inode_count = 500;
        mem.put_superblock(&sb);
        let rep = run_fsck(&mut mem, &geo, REPAIR).expect("fsck");
        assert_eq!(
            issues(&rep),
            vec![Issue::InodeCountExceedsMax { found: 500, max: 8 }]
        );
        assert_eq!(mem.superblock().inode_count, 8);
    }

    #[test]
    fn inode_bitmap_follows_validity() {
        let geo = small();
        let mut mem = formatted(&geo);
        // 1: vivo sin marcar; 2: marcado pero borrado; 3: marcado sin enlaces
        mem.put_inode(&geo, 1, &live(0));
        mem.put_inode(&geo, 2, &InodeDisk { links: 1, dtime: 42, ..Default::default() });
        mem.put_bit(1, 2, true);
        mem.put_bit(1, 3, true);

        let rep = run_fsck(&mut mem, &geo, REPAIR).expect("fsck");
        assert_eq!(
            issues(&rep),
            vec![
                Issue::InodeValidButUnmarked { inode: 1 },
                Issue::InodeMarkedButInvalid { inode: 2 },
                Issue::InodeMarkedButInvalid { inode: 3 },
            ]
        );
        assert!(mem.bit(1, 1));
        assert!(!mem.bit(1, 2));
        assert!(!mem.bit(1, 3));
    }

    #[test]
    fn invalid_inode_pointers_are_ignored() {
        let geo = small();
        let mut mem = formatted(&geo);
        mem.put_inode(&geo, 4, &InodeDisk { links: 0, direct: 999, ..Default::default() });

        let rep = run_fsck(&mut mem, &geo, REPAIR).expect("fsck");
        assert!(rep.is_clean());
        assert_eq!(mem.inode(&geo, 4).direct, 999);
    }

    #[test]
    fn unmarked_used_block_gets_marked() {
        let geo = small();
        let mut mem = formatted(&geo);
        mem.put_inode(&geo, 0, &live(7));
        mem.put_bit(1, 0, true);

        let rep = run_fsck(&mut mem, &geo, REPAIR).expect("fsck");
        assert_eq!(issues(&rep), vec![Issue::BlockNotMarked { block: 7, inode: 0 }]);
        assert!(mem.bit(2, 1));
        assert_eq!(mem.writes, 1);
    }

    #[test]
    fn duplicate_keeps_lowest_inode() {
        let geo = small();
        let mut mem = formatted(&geo);
        for i in [1, 5, 6] {
            mem.put_inode(&geo, i, &live(9));
            mem.put_bit(1, i, true);
        }
        mem.put_bit(2, 3, true);

        let rep = run_fsck(&mut mem, &geo, REPAIR).expect("fsck");
        assert_eq!(
            issues(&rep),
            vec![
                Issue::DuplicateBlock { block: 9, inode: 5 },
                Issue::DuplicateBlock { block: 9, inode: 6 },
            ]
        );
        assert_eq!(mem.inode(&geo, 1).direct, 9);
        assert_eq!(mem.inode(&geo, 5).direct, 0);
        assert_eq!(mem.inode(&geo, 6).direct, 0);
        // el bloque sigue marcado por su dueño
        assert!(mem.bit(2, 3));
    }

    #[test]
    fn out_of_range_pointer_is_cleared() {
        let geo = small();
        let mut mem = formatted(&geo);
        // 3 cae en la tabla de inodos, 16 fuera de la imagen
        for (i, ptr) in [(0, 3), (1, 16), (2, 0)] {
            mem.put_inode(&geo, i, &live(ptr));
            mem.put_bit(1, i, true);
        }

        let rep = run_fsck(&mut mem, &geo, REPAIR).expect("fsck");
        assert_eq!(
            issues(&rep),
            vec![
                Issue::InvalidPointer { pointer: 3, inode: 0 },
                Issue::InvalidPointer { pointer: 16, inode: 1 },
            ]
        );
        assert_eq!(mem.inode(&geo, 0).direct, 0);
        assert_eq!(mem.inode(&geo, 1).direct, 0);
        assert_eq!(mem.inode(&geo, 0).links, 1);
    }

    #[test]
    fn unreferenced_marked_blocks_are_released() {
        let geo = small();
        let mut mem = formatted(&geo);
        mem.put_inode(&geo, 0, &live(6));
        mem.put_bit(1, 0, true);
        mem.put_bit(2, 0, true);
        mem.put_bit(2, 9, true);

        let rep = run_fsck(&mut mem, &geo, REPAIR).expect("fsck");
        assert_eq!(issues(&rep), vec![Issue::UnreferencedBlock { block: 15 }]);
        assert!(mem.bit(2, 0));
        assert!(!mem.bit(2, 9));
    }

    #[test]
    fn check_mode_reports_without_touching_the_image() {
        let geo = small();
        let mut mem = formatted(&geo);
        let mut sb = mem.superblock();
        sb.magic = 0x1234;
        mem.put_superblock(&sb);
        mem.put_inode(&geo, 0, &live(8));
        mem.put_inode(&geo, 1, &live(8));
        mem.put_bit(2, 5, true);
        let before = mem.image.clone();

        let rep = run_fsck(&mut mem, &geo, CHECK).expect("fsck");
        assert_eq!(
            issues(&rep),
            vec![
                Issue::SuperblockField {
                    field: SuperblockField::Magic,
                    found: 0x1234,
                    expected: 0xD34D
                },
                Issue::InodeValidButUnmarked { inode: 0 },
                Issue::BlockNotMarked { block: 8, inode: 0 },
                Issue::InodeValidButUnmarked { inode: 1 },
                Issue::BlockNotMarked { block: 8, inode: 1 },
                Issue::DuplicateBlock { block: 8, inode: 1 },
                Issue::UnreferencedBlock { block: 11 },
            ]
        );
        assert!(rep.findings.iter().all(|f| !f.fixed));
        assert_eq!(mem.writes, 0);
        assert_eq!(mem.image, before);
    }

    #[test]
    fn second_repair_run_is_a_no_op() {
        let geo = small();
        let mut mem = formatted(&geo);
        let mut sb = mem.superblock();
        sb.total_blocks = 3;
        sb.inode_count = 1000;
        mem.put_superblock(&sb);
        mem.put_inode(&geo, 0, &live(10));
        mem.put_inode(&geo, 3, &live(10));
        mem.put_inode(&geo, 7, &live(2));
        mem.put_bit(1, 4, true);
        mem.put_bit(2, 8, true);

        let first = run_fsck(&mut mem, &geo, REPAIR).expect("first run");
        assert!(!first.is_clean());
        assert!(first.blocks_written > 0);

        mem.writes = 0;
        let second = run_fsck(&mut mem, &geo, REPAIR).expect("second run");
        assert!(second.is_clean(), "{:?}", second.findings);
        assert_eq!(second.blocks_written, 0);
        assert_eq!(mem.writes, 0);
    }

    #[test]
    fn inode_rewrite_preserves_neighbours_and_padding() {
        let geo = small();
        let mut mem = formatted(&geo);
        // inodos 4 y 5 comparten el bloque 4 de la tabla
        let (block, offset) = geo.inode_location(5);
        let pad = block as usize * 512 + offset + 100;
        mem.image[pad] = 0xEE;
        mem.put_inode(&geo, 4, &live(12));
        mem.put_inode(&geo, 5, &InodeDisk { uid: 7, ..live(40) });
        mem.put_bit(1, 4, true);
        mem.put_bit(1, 5, true);
        mem.put_bit(2, 6, true);

        run_fsck(&mut mem, &geo, REPAIR).expect("fsck");
        assert_eq!(mem.inode(&geo, 4).direct, 12);
        assert_eq!(mem.inode(&geo, 5).direct, 0);
        assert_eq!(mem.inode(&geo, 5).uid, 7);
        assert_eq!(mem.image[pad], 0xEE);
    }
}
