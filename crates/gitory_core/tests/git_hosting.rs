use gitory_core::{GitHosting, HostingError, LocalGitHosting, RepositoryIdentifier};
use std::path::Path;

fn hosting() -> (tempfile::TempDir, LocalGitHosting) {
    let dir = tempfile::tempdir().unwrap();
    let hosting = LocalGitHosting::open(dir.path().join("repos")).unwrap();
    (dir, hosting)
}

fn id(raw: &str) -> RepositoryIdentifier {
    RepositoryIdentifier::parse(raw).unwrap()
}

fn seed_commit(path: &Path) -> git2::Oid {
    let repo = git2::Repository::open_bare(path).unwrap();
    let signature = git2::Signature::now("Gitory Test", "test@example.com").unwrap();
    let tree_id = repo.treebuilder(None).unwrap().write().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();
    let oid = repo
        .commit(Some("HEAD"), &signature, &signature, "initial", &tree, &[])
        .unwrap();
    let commit = repo.find_commit(oid).unwrap();
    repo.branch("feature", &commit, false).unwrap();
    repo.tag_lightweight("v1.0", commit.as_object(), false)
        .unwrap();
    oid
}

#[test]
fn location_is_root_joined_with_identifier() {
    let (_dir, hosting) = hosting();
    assert_eq!(hosting.location(&id("proj-a")), hosting.root().join("proj-a"));
}

#[test]
fn create_provisions_bare_repository() {
    let (_dir, hosting) = hosting();

    let handle = hosting.create(&id("proj-a")).unwrap();
    assert_eq!(handle.path, hosting.root().join("proj-a"));
    assert!(hosting.exists(&id("proj-a")));

    let repo = git2::Repository::open(&handle.path).unwrap();
    assert!(repo.is_bare());
}

#[test]
fn create_leaves_no_bookkeeping_entries_behind() {
    let (_dir, hosting) = hosting();
    hosting.create(&id("proj-a")).unwrap();

    let mut names: Vec<String> = std::fs::read_dir(hosting.root())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, vec![".proj-a.lock".to_string(), "proj-a".to_string()]);
}

#[test]
fn create_over_existing_repository_fails() {
    let (_dir, hosting) = hosting();
    hosting.create(&id("proj-a")).unwrap();

    let err = hosting.create(&id("proj-a")).unwrap_err();
    assert!(matches!(err, HostingError::AlreadyExists(_)));
}

#[test]
fn create_detects_unrelated_occupant() {
    let (_dir, hosting) = hosting();
    std::fs::write(hosting.root().join("proj-a"), b"not a repository").unwrap();

    let err = hosting.create(&id("proj-a")).unwrap_err();
    assert!(matches!(err, HostingError::AlreadyExists(_)));
    assert!(!hosting.exists(&id("proj-a")));
}

#[test]
fn lock_file_left_by_dead_process_does_not_block_create_or_destroy() {
    let (_dir, hosting) = hosting();
    std::fs::write(hosting.root().join(".proj-a.lock"), b"4242\n").unwrap();

    hosting.create(&id("proj-a")).expect("no live process holds the lock");
    assert!(hosting.exists(&id("proj-a")));
    hosting.destroy(&id("proj-a")).expect("lock is free again");
    hosting.create(&id("proj-a")).expect("location reusable");
}

#[test]
fn inspect_fresh_repository_is_empty() {
    let (_dir, hosting) = hosting();
    hosting.create(&id("proj-a")).unwrap();

    let info = hosting.inspect(&id("proj-a")).unwrap();
    assert!(info.branches.is_empty());
    assert!(info.tags.is_empty());
    assert_eq!(info.head_commit, None);
    assert!(info.size_bytes > 0);
}

#[test]
fn inspect_reports_branches_tags_and_head() {
    let (_dir, hosting) = hosting();
    let handle = hosting.create(&id("proj-a")).unwrap();
    let oid = seed_commit(&handle.path);

    let info = hosting.inspect(&id("proj-a")).unwrap();
    assert_eq!(info.branches.len(), 2);
    assert!(info.branches.contains(&"feature".to_string()));
    assert_eq!(info.tags, vec!["v1.0".to_string()]);
    assert_eq!(info.head_commit, Some(oid.to_string()));
}

#[test]
fn inspect_missing_repository_fails() {
    let (_dir, hosting) = hosting();
    let err = hosting.inspect(&id("ghost")).unwrap_err();
    assert!(matches!(err, HostingError::NotFound(_)));
}

#[test]
fn destroy_removes_repository_and_second_destroy_fails() {
    let (_dir, hosting) = hosting();
    hosting.create(&id("proj-a")).unwrap();

    hosting.destroy(&id("proj-a")).unwrap();
    assert!(!hosting.exists(&id("proj-a")));
    assert!(!hosting.root().join("proj-a").exists());

    let err = hosting.destroy(&id("proj-a")).unwrap_err();
    assert!(matches!(err, HostingError::NotFound(_)));
}

#[test]
fn destroy_then_create_reuses_location() {
    let (_dir, hosting) = hosting();
    hosting.create(&id("proj-a")).unwrap();
    hosting.destroy(&id("proj-a")).unwrap();

    hosting.create(&id("proj-a")).unwrap();
    assert!(hosting.exists(&id("proj-a")));
}

#[test]
fn list_identifiers_skips_bookkeeping_and_foreign_entries() {
    let (_dir, hosting) = hosting();
    hosting.create(&id("beta")).unwrap();
    hosting.create(&id("alpha")).unwrap();
    std::fs::create_dir(hosting.root().join("plain-dir")).unwrap();
    std::fs::create_dir(hosting.root().join(".alpha.0123.trash")).unwrap();
    std::fs::write(hosting.root().join(".gamma.lock"), b"1").unwrap();
    std::fs::write(hosting.root().join("notes.txt"), b"hello").unwrap();

    let listed = hosting.list_identifiers().unwrap();
    assert_eq!(listed, vec![id("alpha"), id("beta")]);
}
