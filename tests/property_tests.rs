//! Property-based tests for core types and commit composition.
//!
//! These tests use proptest to verify invariants hold across
//! randomly generated inputs.

use std::collections::BTreeMap;
use std::sync::Arc;

use proptest::prelude::*;

use refgate::core::types::{BranchName, FileChange, FileContent, Oid, RepoId, RepoPath};
use refgate::engine::{CommitRequest, Engine, EngineOptions};
use refgate::forge::mock::MockStore;

/// Strategy for generating valid branch name characters.
fn branch_name_char() -> impl Strategy<Value = char> {
    prop_oneof![
        prop::char::range('a', 'z'),
        prop::char::range('A', 'Z'),
        prop::char::range('0', '9'),
        Just('-'),
        Just('_'),
        Just('.'),
        Just('/'),
    ]
}

/// Strategy for generating valid branch names.
fn valid_branch_name() -> impl Strategy<Value = String> {
    prop::collection::vec(branch_name_char(), 1..40).prop_filter_map(
        "must be valid branch name",
        |chars| {
            let name: String = chars.into_iter().collect();
            if name.starts_with('.')
                || name.starts_with('-')
                || name.ends_with('/')
                || name.ends_with('.')
                || name.ends_with(".lock")
                || name.contains("..")
                || name.contains("//")
                || name.contains("/.")
                || name.split('/').any(|c| c.ends_with(".lock"))
            {
                None
            } else {
                Some(name)
            }
        },
    )
}

/// Strategy for one path component that is never `.` or `..`.
fn path_component() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_ -]{1,8}(\\.[a-z]{1,3})?"
}

fn valid_repo_path() -> impl Strategy<Value = String> {
    prop::collection::vec(path_component(), 1..5).prop_map(|parts| parts.join("/"))
}

/// Files always end in `.txt` and directories never do, so no generated
/// path is both a file and a directory.
fn file_path() -> impl Strategy<Value = String> {
    (
        prop::sample::select(vec!["", "src/", "docs/nested/"]),
        "[a-f]{1,2}",
    )
        .prop_map(|(dir, stem)| format!("{dir}{stem}.txt"))
}

fn file_content() -> impl Strategy<Value = Vec<u8>> {
    "[a-z]{1,8}".prop_map(String::into_bytes)
}

fn run<F: std::future::Future>(fut: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(fut)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn valid_branch_names_are_accepted(name in valid_branch_name()) {
        let branch = BranchName::new(name.clone()).unwrap();
        prop_assert_eq!(branch.as_str(), name.as_str());
        prop_assert_eq!(branch.qualified_ref(), format!("refs/heads/{name}"));
    }

    #[test]
    fn branch_names_with_forbidden_characters_are_rejected(
        prefix in "[a-z]{1,5}",
        bad in prop::sample::select(vec![" ", "~", "^", ":", "?", "*", "[", "\\", "..", "@{"]),
        suffix in "[a-z]{1,5}",
    ) {
        let name = format!("{prefix}{bad}{suffix}");
        prop_assert!(BranchName::new(name).is_err());
    }

    #[test]
    fn valid_repo_paths_round_trip(p in valid_repo_path()) {
        let path = RepoPath::new(p.clone()).unwrap();
        prop_assert_eq!(path.as_str(), p.as_str());
    }

    #[test]
    fn dot_components_are_rejected(
        head in valid_repo_path(),
        dots in prop::sample::select(vec![".", ".."]),
        tail in valid_repo_path(),
    ) {
        let p1 = format!("{head}/{dots}/{tail}");
        let p2 = format!("{dots}/{tail}");
        let p3 = format!("/{head}");
        let p4 = format!("{head}/");
        prop_assert!(RepoPath::new(p1).is_err());
        prop_assert!(RepoPath::new(p2).is_err());
        prop_assert!(RepoPath::new(p3).is_err());
        prop_assert!(RepoPath::new(p4).is_err());
    }

    #[test]
    fn oids_are_normalized_to_lowercase(hex in "[0-9a-fA-F]{40}") {
        let oid = Oid::new(hex.clone()).unwrap();
        prop_assert_eq!(oid.as_str(), hex.to_ascii_lowercase());
    }

    #[test]
    fn oids_of_other_lengths_are_rejected(hex in "[0-9a-f]{1,39}") {
        prop_assert!(Oid::new(hex).is_err());
    }

    /// After a commit, the branch holds exactly the base files overlaid with
    /// the last content written to each path.
    #[test]
    fn commit_overlays_changes_on_base(
        base in prop::collection::btree_map(file_path(), file_content(), 0..6),
        changes in prop::collection::vec((file_path(), file_content()), 1..8),
    ) {
        let repo = RepoId::new("acme", "site").unwrap();
        let main = BranchName::new("main").unwrap();
        let store = MockStore::new();
        store.seed_branch(
            &repo,
            &main,
            base.iter()
                .map(|(p, c)| (RepoPath::new(p.clone()).unwrap(), c.clone())),
        );

        let mut expected: BTreeMap<String, Vec<u8>> = base.clone();
        let mut first_seen: Vec<String> = Vec::new();
        for (p, c) in &changes {
            expected.insert(p.clone(), c.clone());
            if !first_seen.contains(p) {
                first_seen.push(p.clone());
            }
        }

        let files = changes
            .iter()
            .map(|(p, c)| {
                FileChange::new(
                    RepoPath::new(p.clone()).unwrap(),
                    FileContent::from_bytes(c.clone()).unwrap(),
                )
            })
            .collect();
        let request = CommitRequest::new(repo.clone(), main.clone(), "update", files).unwrap();
        let engine = Engine::new(Arc::new(store.clone()), EngineOptions::new(main.clone()));
        let outcome = run(engine.commit_files(request)).unwrap();

        prop_assert_eq!(store.files_at(&repo, &main), expected);
        let paths: Vec<String> = outcome.paths.into_iter().map(String::from).collect();
        prop_assert_eq!(paths, first_seen);
    }
}
