use pretty_assertions::assert_eq;
use seqarchive_core::logging::build_dispatch;
use seqarchive_core::manifest::verify_copy;
use seqarchive_core::{ArchiveError, IntegrityVerdict, SelectiveCopier, TreeDiffer};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn setup() -> (TempDir, PathBuf, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let src = temp_dir.path().join("usb");
    let dst = temp_dir.path().join("archive");
    fs::create_dir_all(&src).unwrap();
    fs::create_dir_all(&dst).unwrap();
    (temp_dir, src, dst)
}

fn relative_entries(root: &Path) -> BTreeSet<PathBuf> {
    walkdir::WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .map(|e| e.unwrap().path().strip_prefix(root).unwrap().to_path_buf())
        .collect()
}

#[test]
fn copy_then_rediff_reports_nothing_new() {
    let (_tmp, src, dst) = setup();
    write(&src.join("a.txt"), "alpha");
    write(&src.join("sub/b.txt"), "beta");

    let differ = TreeDiffer::new();
    let changes = differ.diff(&src, &dst).unwrap();
    assert_eq!(
        changes.new_files,
        vec![
            PathBuf::from("a.txt"),
            PathBuf::from("sub"),
            PathBuf::from("sub/b.txt")
        ]
    );
    assert!(changes.updated_files.is_empty());

    let outcome = SelectiveCopier::new().copy_selected(&src, &dst, &changes.new_files);
    assert_eq!(outcome.succeeded, 3);
    assert!(outcome.is_complete());

    let again = differ.diff(&src, &dst).unwrap();
    assert!(again.new_files.is_empty());
    assert!(again.updated_files.is_empty());
    assert_eq!(relative_entries(&src), relative_entries(&dst));
    assert_eq!(
        verify_copy(&src, &dst).unwrap(),
        IntegrityVerdict::Verified { files: 2 }
    );
}

#[test]
fn new_entries_are_exactly_source_minus_destination() {
    let (_tmp, src, dst) = setup();
    for rel in [
        "run1/SampleSheet.csv",
        "run1/Data/S1.fastq.gz",
        "run1/Data/S2.fastq.gz",
        "run2/RunInfo.xml",
        "notes.txt",
    ] {
        write(&src.join(rel), rel);
    }
    for rel in ["run1/SampleSheet.csv", "run1/Data/S1.fastq.gz", "other/kept.txt"] {
        write(&dst.join(rel), rel);
    }

    let changes = TreeDiffer::new().diff(&src, &dst).unwrap();

    let expected: BTreeSet<PathBuf> = relative_entries(&src)
        .into_iter()
        .filter(|rel| !dst.join(rel).exists())
        .collect();
    let actual: BTreeSet<PathBuf> = changes.new_files.iter().cloned().collect();
    assert_eq!(actual, expected);
    assert_eq!(changes.new_files.len(), expected.len());
    assert_eq!(changes.summary.new_dirs, 1);
    assert_eq!(changes.summary.new_files, 3);
}

#[test]
fn directories_precede_their_descendants() {
    let (_tmp, src, dst) = setup();
    write(&src.join("b/inner/deep/file.bin"), "x");
    write(&src.join("b-sibling.txt"), "x");
    write(&src.join("a/one.txt"), "x");

    let changes = TreeDiffer::new().diff(&src, &dst).unwrap();

    for (index, entry) in changes.new_files.iter().enumerate() {
        for ancestor in entry.ancestors().skip(1) {
            if ancestor.as_os_str().is_empty() {
                continue;
            }
            let ancestor_index = changes
                .new_files
                .iter()
                .position(|p| p == ancestor)
                .expect("ancestor listed");
            assert!(ancestor_index < index, "{:?} before {:?}", ancestor, entry);
        }
    }

    let outcome = SelectiveCopier::new().copy_selected(&src, &dst, &changes.new_files);
    assert!(outcome.is_complete());
}

#[test]
fn one_failing_entry_does_not_stop_the_others() {
    let (_tmp, src, dst) = setup();
    for name in ["a.txt", "b.txt", "c.txt", "d.txt", "e.txt"] {
        write(&src.join(name), &format!("content of {}", name));
    }

    let changes = TreeDiffer::new().diff(&src, &dst).unwrap();
    assert_eq!(changes.new_files.len(), 5);

    // c.txt becomes unwritable between the diff and the copy.
    fs::create_dir(dst.join("c.txt")).unwrap();

    let outcome = SelectiveCopier::new().copy_selected(&src, &dst, &changes.new_files);

    assert_eq!(outcome.succeeded, 4);
    assert_eq!(outcome.failed_paths(), vec![PathBuf::from("c.txt")]);
    assert!(matches!(
        outcome.failed[0].error,
        ArchiveError::DestinationExists { .. }
    ));
    for name in ["a.txt", "b.txt", "d.txt", "e.txt"] {
        assert_eq!(
            fs::read_to_string(dst.join(name)).unwrap(),
            format!("content of {}", name)
        );
    }

    match outcome.into_result() {
        Err(ArchiveError::PartialTransferFailure { failed, succeeded }) => {
            assert_eq!(failed, vec![PathBuf::from("c.txt")]);
            assert_eq!(succeeded, 4);
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn file_blocking_a_directory_fails_only_its_children() {
    let (_tmp, src, dst) = setup();
    write(&src.join("x/y.txt"), "y");
    write(&src.join("z.txt"), "z");
    write(&dst.join("x"), "a file where a folder belongs");

    let changes = TreeDiffer::new().diff(&src, &dst).unwrap();
    assert_eq!(
        changes.new_files,
        vec![PathBuf::from("x/y.txt"), PathBuf::from("z.txt")]
    );

    let outcome = SelectiveCopier::new().copy_selected(&src, &dst, &changes.new_files);

    assert_eq!(outcome.succeeded, 1);
    assert_eq!(outcome.failed_paths(), vec![PathBuf::from("x/y.txt")]);
    assert_eq!(fs::read_to_string(dst.join("z.txt")).unwrap(), "z");
    assert_eq!(
        fs::read_to_string(dst.join("x")).unwrap(),
        "a file where a folder belongs"
    );
}

#[cfg(unix)]
#[test]
fn permission_denied_is_isolated_per_entry() {
    use std::os::unix::fs::PermissionsExt;

    let (_tmp, src, dst) = setup();
    for name in ["a.txt", "b.txt", "c.txt", "d.txt", "e.txt"] {
        write(&src.join(name), name);
    }
    let locked = src.join("c.txt");
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
    if fs::File::open(&locked).is_ok() {
        // Permission bits are not enforced for this user.
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o644)).unwrap();
        return;
    }

    let changes = TreeDiffer::new().diff(&src, &dst).unwrap();
    let outcome = SelectiveCopier::new().copy_selected(&src, &dst, &changes.new_files);
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o644)).unwrap();

    assert_eq!(outcome.succeeded, 4);
    assert_eq!(outcome.failed_paths(), vec![PathBuf::from("c.txt")]);
    assert!(matches!(
        outcome.failed[0].error,
        ArchiveError::PermissionDenied { .. }
    ));
}

#[test]
fn injected_dispatch_receives_component_logs() {
    let (tmp, src, dst) = setup();
    write(&src.join("a.txt"), "a");
    write(&src.join("sub/b.txt"), "b");
    let log_path = tmp.path().join("logs/run.log");

    let dispatch = build_dispatch(false, Some(&log_path)).unwrap();
    let changes = TreeDiffer::new()
        .with_dispatch(dispatch.clone())
        .diff(&src, &dst)
        .unwrap();
    SelectiveCopier::new()
        .with_dispatch(dispatch)
        .copy_selected(&src, &dst, &changes.new_files);

    let log = fs::read_to_string(&log_path).unwrap();
    assert!(log.contains(" INFO : Found 3 total new paths: 1 folder(s) and 2 file(s)"));
    assert!(log.contains(" INFO : Backup finished. Successfully copied 3 file(s)."));
}
