// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! End-to-end behaviour of the filesystem verbs on a fresh mount

use memfs_core::catalog::Catalog;
use memfs_core::{FileHandle, FsConfig, FsError, Storage, UnlinkOpenPolicy};

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    // Several tests race to install the subscriber; only the first wins.
    let _ = tracing_subscriber::fmt().with_env_filter(env_filter).with_test_writer().try_init();
}

fn mount() -> Storage {
    init_tracing();
    Storage::new(FsConfig::default()).unwrap()
}

fn read_all(fs: &Storage, handle: FileHandle) -> Vec<u8> {
    let size = fs.stat_handle(handle).unwrap().size as usize;
    let mut buf = vec![0u8; size];
    let n = fs.read_at(handle, &mut buf, 0).unwrap();
    buf.truncate(n);
    buf
}

#[test]
fn test_write_then_read_small_file() {
    let fs = mount();
    fs.make_file("/a.txt", 0o644).unwrap();
    let h = fs.open_for_io("/a.txt").unwrap();

    assert_eq!(fs.write_at(h, b"hello", 0).unwrap(), 5);
    let mut buf = [0u8; 5];
    assert_eq!(fs.read_at(h, &mut buf, 0).unwrap(), 5);
    assert_eq!(&buf, b"hello");
    fs.close(h).unwrap();
}

#[test]
fn test_make_directory_twice_fails() {
    let fs = mount();
    fs.make_directory("/d", 0o755).unwrap();
    assert_eq!(fs.make_directory("/d", 0o755), Err(FsError::AlreadyExists));
    assert_eq!(fs.make_file("/d", 0o644), Err(FsError::AlreadyExists));
}

#[test]
fn test_remove_directory_after_emptying() {
    let fs = mount();
    fs.make_directory("/d", 0o755).unwrap();
    fs.make_file("/d/f.txt", 0o644).unwrap();
    assert_eq!(fs.remove_directory("/d"), Err(FsError::NotEmpty));
    fs.unlink("/d/f.txt").unwrap();
    fs.remove_directory("/d").unwrap();
    assert_eq!(fs.stat("/d"), Err(FsError::NotFound));
}

#[test]
fn test_dotdot_from_child_is_root() {
    let fs = mount();
    fs.make_directory("/d", 0o755).unwrap();
    assert_eq!(fs.resolve("/d/..").unwrap(), fs.root());
    assert_eq!(fs.resolve("/d/.").unwrap(), fs.resolve("/d").unwrap());
    assert_eq!(fs.resolve("/..").unwrap(), fs.root());
}

#[test]
fn test_write_past_end_requires_extension_first() {
    let fs = mount();
    fs.make_file("/f", 0o644).unwrap();
    let h = fs.open_for_io("/f").unwrap();
    fs.write_at(h, b"0123456789", 0).unwrap();

    // No sparse writes past the logical end
    assert_eq!(fs.write_at(h, b"abcde", 20), Err(FsError::Overflow));
    assert_eq!(fs.stat("/f").unwrap().size, 10);

    fs.set_size("/f", 20).unwrap();
    assert_eq!(fs.write_at(h, b"abcde", 20).unwrap(), 5);
    let content = read_all(&fs, h);
    assert_eq!(content.len(), 25);
    assert_eq!(&content[..10], b"0123456789");
    assert!(content[10..20].iter().all(|b| *b == 0));
    assert_eq!(&content[20..], b"abcde");
}

#[test]
fn test_round_trip_at_various_offsets() {
    let fs = mount();
    fs.make_file("/f", 0o644).unwrap();
    let h = fs.open_for_io("/f").unwrap();
    fs.write_at(h, &[b'.'; 64], 0).unwrap();

    let samples: [(&[u8], u64); 4] = [
        (b"x", 0),
        (b"middle", 30),
        (b"tail-crossing-the-end", 50),
        (&[0xff, 0x00, 0x7f], 71),
    ];
    for (data, offset) in samples {
        assert_eq!(fs.write_at(h, data, offset).unwrap(), data.len());
        let mut buf = vec![0u8; data.len()];
        assert_eq!(fs.read_at(h, &mut buf, offset).unwrap(), data.len());
        assert_eq!(buf, data);
    }
}

#[test]
fn test_read_at_or_past_eof_returns_zero() {
    let fs = mount();
    fs.make_file("/f", 0o644).unwrap();
    let h = fs.open_for_io("/f").unwrap();
    let mut buf = [0u8; 8];
    assert_eq!(fs.read_at(h, &mut buf, 0).unwrap(), 0);

    fs.write_at(h, b"abc", 0).unwrap();
    assert_eq!(fs.read_at(h, &mut buf, 3).unwrap(), 0);
    assert_eq!(fs.read_at(h, &mut buf, u64::MAX).unwrap(), 0);
    assert_eq!(fs.read_at(h, &mut buf, 1).unwrap(), 2);
}

#[test]
fn test_size_grows_monotonically_and_capacity_follows() {
    let fs = mount();
    fs.make_file("/f", 0o644).unwrap();
    let h = fs.open_for_io("/f").unwrap();

    let mut expected = 0u64;
    for (len, offset) in [(4usize, 0u64), (2, 1), (6, 4), (1, 10), (3, 0)] {
        fs.write_at(h, &vec![b'z'; len], offset).unwrap();
        expected = expected.max(offset + len as u64);
        assert_eq!(fs.stat_handle(h).unwrap().size, expected);
        fs.inodes()
            .with_inode(h, |inode| assert!(inode.capacity() >= inode.size()))
            .unwrap();
    }
}

#[test]
fn test_existing_paths_are_never_overwritten() {
    let fs = mount();
    fs.make_file("/f", 0o644).unwrap();
    let h = fs.open_for_io("/f").unwrap();
    fs.write_at(h, b"keep", 0).unwrap();
    fs.close(h).unwrap();

    assert_eq!(fs.make_file("/f", 0o600), Err(FsError::AlreadyExists));
    assert_eq!(fs.make_directory("/f", 0o755), Err(FsError::AlreadyExists));
    assert_eq!(fs.make_directory("/", 0o755), Err(FsError::AlreadyExists));

    let attrs = fs.stat("/f").unwrap();
    assert_eq!(attrs.ino, h);
    assert_eq!(attrs.size, 4);
    assert_eq!(attrs.permissions(), 0o644);
}

#[test]
fn test_every_node_resolves_back_through_dotdot() {
    let fs = mount();
    for dir in ["/a", "/a/b", "/a/b/c", "/x"] {
        fs.make_directory(dir, 0o755).unwrap();
    }
    for file in ["/a/f", "/a/b/c/g", "/x/h"] {
        fs.make_file(file, 0o644).unwrap();
    }

    fs.with_catalog(|catalog: &Catalog| {
        for path in ["/a", "/a/b", "/a/b/c", "/x", "/a/f", "/a/b/c/g", "/x/h"] {
            let node = catalog.resolve(path).unwrap();
            let parent = catalog.parent_of(node).unwrap();
            assert_eq!(catalog.path_of(node).unwrap(), path);
            if catalog.node(node).unwrap().is_directory() {
                assert_eq!(catalog.resolve(&format!("{path}/..")).unwrap(), parent);
                assert_eq!(catalog.resolve(&format!("{path}/.")).unwrap(), node);
            } else {
                assert_eq!(
                    catalog.resolve(&format!("{path}/..")),
                    Err(FsError::NotADirectory)
                );
            }
        }
    });
}

#[test]
fn test_busy_removal_leaves_everything_untouched() {
    let fs = mount();
    fs.make_directory("/d", 0o755).unwrap();
    fs.make_file("/d/f", 0o644).unwrap();
    let fh = fs.open_for_io("/d/f").unwrap();
    fs.write_at(fh, b"payload", 0).unwrap();
    let before = fs.stats();

    assert_eq!(fs.unlink("/d/f"), Err(FsError::Busy));
    assert_eq!(fs.stats(), before);
    assert_eq!(fs.stat("/d/f").unwrap().ino, fh);
    assert_eq!(read_all(&fs, fh), b"payload");

    fs.close(fh).unwrap();
    let dh = fs.open_directory("/d").unwrap();
    assert_eq!(fs.remove_directory("/d"), Err(FsError::Busy));
    assert!(fs.exists("/d/f"));
    fs.close_directory(dh).unwrap();
}

#[test]
fn test_deferred_unlink_reclaims_on_last_close() {
    init_tracing();
    let fs = Storage::new(FsConfig {
        unlink_open: UnlinkOpenPolicy::Defer,
        ..FsConfig::default()
    })
    .unwrap();
    fs.make_file("/f", 0o644).unwrap();
    let first = fs.open_for_io("/f").unwrap();
    let second = fs.open_for_io("/f").unwrap();
    fs.write_at(first, b"abc", 0).unwrap();

    fs.unlink("/f").unwrap();
    assert_eq!(fs.stat("/f"), Err(FsError::NotFound));
    assert_eq!(fs.stats().inodes, 2);

    fs.close(first).unwrap();
    assert_eq!(read_all(&fs, second), b"abc");
    fs.close(second).unwrap();
    assert_eq!(fs.stats().inodes, 1);
    assert_eq!(fs.stats().bytes_in_memory, 0);
}

#[test]
fn test_list_includes_dot_entries_first() {
    let fs = mount();
    fs.make_directory("/d", 0o755).unwrap();
    fs.make_file("/d/one", 0o644).unwrap();
    fs.make_directory("/d/two", 0o755).unwrap();

    let root_ino = fs.stat("/").unwrap().ino;
    let d_ino = fs.stat("/d").unwrap().ino;
    let entries: Vec<_> = fs.list("/d").unwrap().collect();
    assert_eq!(entries.len(), 4);
    assert_eq!((entries[0].name.as_str(), entries[0].ino), (".", d_ino));
    assert_eq!((entries[1].name.as_str(), entries[1].ino), ("..", root_ino));
    assert_eq!(entries[2].name, "one");
    assert!(!entries[2].is_dir);
    assert_eq!(entries[3].name, "two");
    assert!(entries[3].is_dir);
}

#[test]
fn test_malformed_paths_are_rejected() {
    let fs = mount();
    assert_eq!(fs.make_file("relative", 0o644), Err(FsError::InvalidInput));
    assert_eq!(fs.make_file("", 0o644), Err(FsError::InvalidInput));
    assert_eq!(fs.make_file("/nul\0byte", 0o644), Err(FsError::InvalidInput));
    assert_eq!(fs.stat("no/leading/slash"), Err(FsError::InvalidInput));
}

#[test]
fn test_stats_account_for_open_buffers_until_reclaimed() {
    let fs = Storage::new(FsConfig {
        unlink_open: UnlinkOpenPolicy::Defer,
        ..FsConfig::default()
    })
    .unwrap();
    fs.make_directory("/d", 0o755).unwrap();
    fs.make_file("/d/f", 0o644).unwrap();
    let h = fs.open_for_io("/d/f").unwrap();
    fs.write_at(h, &[1u8; 4096], 0).unwrap();

    let stats = fs.stats();
    assert_eq!((stats.inodes, stats.catalog_entries), (3, 3));
    assert_eq!((stats.open_handles, stats.bytes_in_memory), (1, 4096));

    // Unlinked but still open: the buffer stays charged
    fs.unlink("/d/f").unwrap();
    let stats = fs.stats();
    assert_eq!((stats.inodes, stats.catalog_entries), (3, 2));
    assert_eq!(stats.bytes_in_memory, 4096);

    fs.close(h).unwrap();
    let stats = fs.stats();
    assert_eq!((stats.inodes, stats.open_handles, stats.bytes_in_memory), (2, 0, 0));
}

#[test]
fn test_errno_for_each_failure_kind() {
    let cases = [
        (FsError::NotFound, libc::ENOENT),
        (FsError::AlreadyExists, libc::EEXIST),
        (FsError::NotADirectory, libc::ENOTDIR),
        (FsError::IsADirectory, libc::EISDIR),
        (FsError::NotEmpty, libc::ENOTEMPTY),
        (FsError::Busy, libc::EBUSY),
        (FsError::BadDescriptor, libc::EBADF),
        (FsError::Overflow, libc::EOVERFLOW),
        (FsError::OutOfMemory, libc::ENOMEM),
        (FsError::InvalidInput, libc::EINVAL),
    ];
    for (err, errno) in cases {
        assert_eq!(err.errno(), errno);
        assert_eq!(memfs_core::status(Err::<(), _>(err)), -errno);
    }
}
