use crate::error::FsError;
use crate::handle::OpenFlags;
use crate::test_utils::{create_engine, create_engine_with, reopen};

#[test]
fn file_lifecycle_survives_reopen() {
    let (dir, mut engine) = create_engine();
    engine.mknod("/hello.txt").expect("mknod");

    let fh = engine
        .open_file("/hello.txt", OpenFlags::write())
        .expect("open for write");
    engine.write(fh, b"hello", 0).expect("write");
    engine.flush_handle(fh).expect("flush");
    engine.release(fh).expect("release");

    let mut engine = reopen(&dir, engine);
    let attrs = engine.get_attributes("/hello.txt").expect("attributes");
    assert!(!attrs.is_dir);
    assert_eq!(attrs.size, 5);

    let fh = engine
        .open_file("/hello.txt", OpenFlags::read())
        .expect("open for read");
    assert_eq!(engine.read(fh, 16, 0).expect("read"), b"hello");
    engine.release(fh).expect("release");
}

#[test]
fn directory_lifecycle() {
    let (dir, mut engine) = create_engine();
    engine.mkdir("/docs").expect("mkdir");
    engine.mkdir("/docs/old").expect("mkdir nested");
    engine.mknod("/docs/old/a.txt").expect("mknod");

    assert!(matches!(engine.mkdir("/docs"), Err(FsError::AlreadyExists)));
    assert!(matches!(
        engine.mkdir("/missing/sub"),
        Err(FsError::NotFound)
    ));
    assert!(matches!(engine.rmdir("/docs/old"), Err(FsError::NotEmpty)));
    assert!(matches!(
        engine.rmdir("/docs/old/a.txt"),
        Err(FsError::NotADirectory)
    ));
    assert!(matches!(
        engine.unlink("/docs/old"),
        Err(FsError::IsADirectory)
    ));

    engine.unlink("/docs/old/a.txt").expect("unlink");
    engine.rmdir("/docs/old").expect("rmdir");

    let engine = reopen(&dir, engine);
    assert_eq!(engine.list_directory("/").expect("list root"), vec!["docs"]);
    assert!(engine.list_directory("/docs").expect("list docs").is_empty());
    assert!(matches!(
        engine.list_directory("/docs/old"),
        Err(FsError::NotFound)
    ));
}

#[test]
fn rename_moves_data_across_directories() {
    let (dir, mut engine) = create_engine();
    engine.mkdir("/src").expect("mkdir src");
    engine.mkdir("/dst").expect("mkdir dst");
    engine.mknod("/src/data.bin").expect("mknod");

    let fh = engine
        .open_file("/src/data.bin", OpenFlags::write())
        .expect("open");
    engine.write(fh, b"payload", 0).expect("write");
    engine.flush_handle(fh).expect("flush");
    engine.release(fh).expect("release");

    engine.rename("/src/data.bin", "/dst/moved.bin").expect("rename");
    assert!(matches!(
        engine.get_attributes("/src/data.bin"),
        Err(FsError::NotFound)
    ));

    let mut engine = reopen(&dir, engine);
    let fh = engine
        .open_file("/dst/moved.bin", OpenFlags::read())
        .expect("open moved");
    assert_eq!(engine.read(fh, 32, 0).expect("read"), b"payload");
    engine.release(fh).expect("release");
}

#[test]
fn rename_overwrites_existing_file() {
    let (_dir, mut engine) = create_engine();
    engine.mknod("/a").expect("mknod a");
    engine.mknod("/b").expect("mknod b");

    let fh = engine.open_file("/a", OpenFlags::write()).expect("open");
    engine.write(fh, b"from a", 0).expect("write");
    engine.flush_handle(fh).expect("flush");
    engine.release(fh).expect("release");

    engine.rename("/a", "/b").expect("rename over file");
    assert_eq!(engine.list_directory("/").expect("list"), vec!["b"]);

    let fh = engine.open_file("/b", OpenFlags::read()).expect("open b");
    assert_eq!(engine.read(fh, 16, 0).expect("read"), b"from a");
    engine.release(fh).expect("release");
}

#[test]
fn rename_rejects_type_mismatch_and_self_moves() {
    let (_dir, mut engine) = create_engine();
    engine.mkdir("/d").expect("mkdir");
    engine.mkdir("/full").expect("mkdir");
    engine.mknod("/full/x").expect("mknod");
    engine.mknod("/f").expect("mknod");

    assert!(matches!(engine.rename("/f", "/d"), Err(FsError::IsADirectory)));
    assert!(matches!(
        engine.rename("/d", "/f"),
        Err(FsError::NotADirectory)
    ));
    assert!(matches!(engine.rename("/d", "/full"), Err(FsError::NotEmpty)));
    assert!(matches!(
        engine.rename("/d", "/d/inside"),
        Err(FsError::InvalidArgument(_))
    ));
    assert!(matches!(
        engine.rename("/missing", "/f"),
        Err(FsError::NotFound)
    ));

    // Renaming a node onto itself is a no-op.
    engine.rename("/d", "/d").expect("self rename");
    assert!(engine.get_attributes("/d").expect("attrs").is_dir);
}

#[test]
fn out_of_space_write_leaves_prior_content() {
    let (dir, mut engine) = create_engine_with(64, 12);
    engine.mknod("/small").expect("mknod");

    let fh = engine
        .open_file("/small", OpenFlags::write())
        .expect("open");
    engine.write(fh, b"hi", 0).expect("write");
    engine.flush_handle(fh).expect("first flush");

    // Far more blocks than the image has left.
    let big = vec![0xABu8; 64 * 20];
    engine.write(fh, &big, 0).expect("buffered write");
    assert!(matches!(engine.flush_handle(fh), Err(FsError::OutOfSpace)));
    engine.release(fh).expect("release");

    let mut engine = reopen(&dir, engine);
    assert_eq!(engine.get_attributes("/small").expect("attrs").size, 2);
    let fh = engine.open_file("/small", OpenFlags::read()).expect("open");
    assert_eq!(engine.read(fh, 16, 0).expect("read"), b"hi");
    engine.release(fh).expect("release");
}

#[test]
fn failed_large_write_does_not_pin_free_blocks() {
    let (_dir, mut engine) = create_engine_with(64, 16);
    engine.mknod("/a").expect("mknod");

    let fh = engine.open_file("/a", OpenFlags::write()).expect("open");
    let used_before = engine.used_block_count();

    let big = vec![0xCDu8; 64 * 50];
    engine.write(fh, &big, 0).expect("buffered write");
    assert!(matches!(engine.flush_handle(fh), Err(FsError::OutOfSpace)));

    // The blocks reserved for the aborted write must be free again, so
    // small allocations keep working without a remount.
    assert_eq!(engine.used_block_count(), used_before);

    engine.write(fh, b"ok", 0).expect("rewrite");
    engine.flush_handle(fh).expect("small flush");
    engine.release(fh).expect("release");
    engine.mknod("/b").expect("mknod after failure");

    let fh = engine.open_file("/b", OpenFlags::write()).expect("open b");
    engine.write(fh, b"more", 0).expect("write b");
    engine.flush_handle(fh).expect("flush b");
    engine.release(fh).expect("release b");

    assert!(engine.used_block_count() < engine.block_count());
}

#[test]
fn open_honors_create_and_exclusive() {
    let (_dir, mut engine) = create_engine();
    assert!(matches!(
        engine.open_file("/new", OpenFlags::write()),
        Err(FsError::NotFound)
    ));

    let fh = engine
        .open_file("/new", OpenFlags::write().with_create(false))
        .expect("create on open");
    engine.release(fh).expect("release");
    assert_eq!(engine.get_attributes("/new").expect("attrs").size, 0);

    assert!(matches!(
        engine.open_file("/new", OpenFlags::write().with_create(true)),
        Err(FsError::AlreadyExists)
    ));

    engine.mkdir("/d").expect("mkdir");
    assert!(matches!(
        engine.open_file("/d", OpenFlags::read()),
        Err(FsError::IsADirectory)
    ));
}

#[test]
fn access_mode_is_enforced_per_handle() {
    let (_dir, mut engine) = create_engine();
    engine.mknod("/f").expect("mknod");

    let ro = engine.open_file("/f", OpenFlags::read()).expect("open ro");
    assert!(matches!(
        engine.write(ro, b"x", 0),
        Err(FsError::AccessMode(_))
    ));
    assert!(matches!(
        engine.flush_handle(ro),
        Err(FsError::AccessMode(_))
    ));
    assert!(matches!(
        engine.ftruncate(ro, 0),
        Err(FsError::AccessMode(_))
    ));

    let wo = engine.open_file("/f", OpenFlags::write()).expect("open wo");
    assert!(matches!(engine.read(wo, 1, 0), Err(FsError::AccessMode(_))));

    let rw = engine
        .open_file("/f", OpenFlags::read_write())
        .expect("open rw");
    engine.write(rw, b"ok", 0).expect("write");
    assert_eq!(engine.read(rw, 2, 0).expect("read"), b"ok");

    for fh in [ro, wo, rw] {
        engine.release(fh).expect("release");
    }
    assert!(matches!(engine.read(rw, 1, 0), Err(FsError::BadHandle)));
}

#[test]
fn read_clips_to_file_length() {
    let (_dir, mut engine) = create_engine();
    engine.mknod("/f").expect("mknod");
    let fh = engine
        .open_file("/f", OpenFlags::read_write())
        .expect("open");
    engine.write(fh, b"0123456789", 0).expect("write");

    assert_eq!(engine.read(fh, 4, 3).expect("read"), b"3456");
    assert_eq!(engine.read(fh, 100, 8).expect("read"), b"89");
    assert!(engine.read(fh, 4, 10).expect("read at eof").is_empty());
    assert!(engine.read(fh, 4, 1000).expect("read past eof").is_empty());
    engine.release(fh).expect("release");
}

#[test]
fn sparse_write_zero_fills_the_gap() {
    let (_dir, mut engine) = create_engine();
    engine.mknod("/f").expect("mknod");
    let fh = engine
        .open_file("/f", OpenFlags::read_write())
        .expect("open");
    engine.write(fh, b"end", 5).expect("sparse write");
    assert_eq!(engine.read(fh, 16, 0).expect("read"), b"\0\0\0\0\0end");
    engine.flush_handle(fh).expect("flush");
    engine.release(fh).expect("release");
    assert_eq!(engine.get_attributes("/f").expect("attrs").size, 8);
}

#[test]
fn ftruncate_grows_and_shrinks() {
    let (dir, mut engine) = create_engine();
    engine.mknod("/f").expect("mknod");
    let fh = engine
        .open_file("/f", OpenFlags::read_write())
        .expect("open");
    engine.write(fh, b"abc", 0).expect("write");
    engine.ftruncate(fh, 6).expect("grow");
    assert_eq!(engine.read(fh, 16, 0).expect("read"), b"abc\0\0\0");

    engine.ftruncate(fh, 1).expect("shrink");
    engine.release(fh).expect("release");

    let engine = reopen(&dir, engine);
    assert_eq!(engine.get_attributes("/f").expect("attrs").size, 1);
}

#[test]
fn truncate_by_path_patches_open_handles() {
    let (_dir, mut engine) = create_engine();
    engine.mknod("/f").expect("mknod");
    let writer = engine
        .open_file("/f", OpenFlags::read_write())
        .expect("open writer");
    engine.write(writer, b"long content", 0).expect("write");
    engine.flush_handle(writer).expect("flush");

    let reader = engine.open_file("/f", OpenFlags::read()).expect("open reader");
    engine.truncate("/f", 4).expect("truncate");

    assert_eq!(engine.read(writer, 32, 0).expect("read writer"), b"long");
    assert_eq!(engine.read(reader, 32, 0).expect("read reader"), b"long");
    assert_eq!(engine.get_attributes("/f").expect("attrs").size, 4);

    engine.release(writer).expect("release");
    engine.release(reader).expect("release");

    assert!(matches!(engine.truncate("/missing", 0), Err(FsError::NotFound)));
    engine.mkdir("/d").expect("mkdir");
    assert!(matches!(engine.truncate("/d", 0), Err(FsError::IsADirectory)));
}

#[test]
fn truncate_to_zero_releases_blocks_after_reopen() {
    let (dir, mut engine) = create_engine();
    engine.mknod("/f").expect("mknod");
    let fh = engine
        .open_file("/f", OpenFlags::write())
        .expect("open");
    engine.write(fh, &[7u8; 300], 0).expect("write");
    engine.flush_handle(fh).expect("flush");
    engine.release(fh).expect("release");
    let with_data = reopen(&dir, engine);
    let used_with_data = with_data.used_block_count();

    let mut engine = with_data;
    engine.truncate("/f", 0).expect("truncate");
    let engine = reopen(&dir, engine);
    assert!(
        engine.used_block_count() < used_with_data,
        "trimmed extents must be free again after a full decode"
    );
    assert_eq!(engine.get_attributes("/f").expect("attrs").size, 0);
}

#[test]
fn unlinked_blocks_are_reclaimed_only_on_reopen() {
    let (dir, mut engine) = create_engine();
    engine.mknod("/f").expect("mknod");
    let fh = engine
        .open_file("/f", OpenFlags::write())
        .expect("open");
    engine.write(fh, &[1u8; 200], 0).expect("write");
    engine.flush_handle(fh).expect("flush");
    engine.release(fh).expect("release");

    let used_before = engine.used_block_count();
    engine.unlink("/f").expect("unlink");
    assert_eq!(
        engine.used_block_count(),
        used_before,
        "unlink defers reclamation"
    );

    let engine = reopen(&dir, engine);
    assert!(engine.used_block_count() < used_before);
}

#[test]
fn utimens_persists_timestamps() {
    let (dir, mut engine) = create_engine();
    engine.mknod("/f").expect("mknod");
    engine.utimens("/f", 111, 222).expect("utimens");

    let engine = reopen(&dir, engine);
    let attrs = engine.get_attributes("/f").expect("attrs");
    assert_eq!(attrs.date_accessed, 111);
    assert_eq!(attrs.date_modified, 222);
    assert!(!attrs.is_dir);
}

#[test]
fn paths_with_redundant_slashes_resolve() {
    let (_dir, mut engine) = create_engine();
    engine.mkdir("/dir").expect("mkdir");
    engine.mknod("//dir//f").expect("mknod");

    let fh = engine
        .open_file("/dir/f/", OpenFlags::write())
        .expect("open");
    engine.write(fh, b"x", 0).expect("write");
    engine.flush_handle(fh).expect("flush");
    engine.release(fh).expect("release");

    assert_eq!(engine.get_attributes("/dir/f").expect("attrs").size, 1);
}

#[test]
fn fact_file_exposes_catalog_bytes() {
    let (_dir, mut engine) = create_engine();
    engine.mkdir("/seen").expect("mkdir");

    let size = engine.fact_file_size() as usize;
    let bytes = engine.fact_file_read(size, 0);
    assert_eq!(bytes.len(), size);
    let doc: serde_json::Value = serde_json::from_slice(&bytes).expect("catalog is JSON");
    assert_eq!(doc["contents"][0]["name"], "seen");

    assert!(engine.fact_file_read(16, size as u64).is_empty());
    let tail = engine.fact_file_read(1000, size as u64 - 2);
    assert_eq!(tail.len(), 2);
}

#[test]
fn fact_file_flush_commits_valid_edits() {
    let (dir, mut engine) = create_engine();
    let fs_size = engine.block_size() * engine.block_count();
    let doc = format!(
        r#"{{ "filesystem_info": {{ "size": {fs_size} }},
             "contents": [ {{ "name": "made_via_fact", "is_dir": true }} ] }}"#
    );

    engine.fact_file_truncate(0).expect("truncate staging");
    engine.fact_file_write(doc.as_bytes(), 0).expect("stage");
    engine.fact_file_flush().expect("commit");

    assert!(engine.get_attributes("/made_via_fact").expect("attrs").is_dir);
    let engine = reopen(&dir, engine);
    assert_eq!(
        engine.list_directory("/").expect("list"),
        vec!["made_via_fact"]
    );
}

#[test]
fn fact_file_flush_rejects_invalid_edits_and_resets_staging() {
    let (dir, mut engine) = create_engine();
    engine.mkdir("/keep").expect("mkdir");

    engine.fact_file_truncate(0).expect("truncate staging");
    engine
        .fact_file_write(b"this is not a catalog", 0)
        .expect("stage garbage");
    assert!(matches!(engine.fact_file_flush(), Err(FsError::Schema(_))));

    // Staging rolled back to the on-disk bytes: flushing again is a no-op.
    engine.fact_file_flush().expect("flush rolled-back staging");
    assert!(engine.get_attributes("/keep").expect("attrs").is_dir);

    let engine = reopen(&dir, engine);
    assert_eq!(engine.list_directory("/").expect("list"), vec!["keep"]);
}

#[test]
fn fact_file_reclaims_unlinked_blocks_on_commit() {
    let (_dir, mut engine) = create_engine();
    engine.mknod("/f").expect("mknod");
    let fh = engine.open_file("/f", OpenFlags::write()).expect("open");
    engine.write(fh, &[9u8; 200], 0).expect("write");
    engine.flush_handle(fh).expect("flush");
    engine.release(fh).expect("release");

    engine.unlink("/f").expect("unlink");
    let used_before = engine.used_block_count();

    // A FACT commit revalidates from scratch, so it reclaims without a
    // remount.
    let size = engine.fact_file_size() as usize;
    let bytes = engine.fact_file_read(size, 0);
    engine.fact_file_truncate(0).expect("truncate staging");
    engine.fact_file_write(&bytes, 0).expect("stage");
    engine.fact_file_flush().expect("commit");

    assert!(engine.used_block_count() < used_before);
}
