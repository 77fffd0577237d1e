use super::*;
use crate::kernel::services::adapters::file::MemoryFsProvider;
use crate::kernel::services::ports::WatchEvent;
use std::time::Duration;

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

fn workspace() -> MemoryFsProvider {
    MemoryFsProvider::with_entries([
        ("src", EntryKind::Directory),
        ("src/a.txt", EntryKind::File),
        ("src/b.txt", EntryKind::File),
        ("src/nested", EntryKind::Directory),
        ("src/nested/deep.txt", EntryKind::File),
        ("docs", EntryKind::Directory),
        ("README.md", EntryKind::File),
    ])
}

async fn start(provider: &MemoryFsProvider) -> Synchronizer {
    Synchronizer::start(Arc::new(provider.clone()), SyncConfig::default())
        .await
        .unwrap()
}

/// Drains store changes until `cond` holds.
async fn wait_until(sync: &Synchronizer, rx: &mut ChangeReceiver, cond: impl Fn(&Synchronizer) -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cond(sync) {
            let _ = rx.recv().await;
        }
    })
    .await
    .expect("condition not reached");
}

/// Lets aborted forwarding tasks run to completion.
async fn settle(done: impl Fn() -> bool) -> bool {
    for _ in 0..32 {
        if done() {
            return true;
        }
        tokio::task::yield_now().await;
    }
    done()
}

fn paths(sync: &Synchronizer) -> Vec<String> {
    sync.entries().into_iter().map(|entry| entry.path).collect()
}

#[test]
fn start_lists_and_watches_the_root_only() {
    let provider = workspace();
    block_on(async {
        let sync = start(&provider).await;
        assert_eq!(paths(&sync), vec!["README.md", "docs", "src"]);
        assert!(sync.is_watching(""));
        assert!(sync.is_expanded(""));
        assert_eq!(provider.active_watchers(""), 1);
        assert!(sync.entry("src/a.txt").is_none());
    });
}

#[test]
fn start_skips_ignored_names() {
    let provider = MemoryFsProvider::with_entries([
        (".git", EntryKind::Directory),
        ("node_modules", EntryKind::Directory),
        ("main.rs", EntryKind::File),
    ]);
    block_on(async {
        let sync = start(&provider).await;
        assert_eq!(paths(&sync), vec!["main.rs"]);
    });
}

#[test]
fn root_watch_failure_does_not_fail_start() {
    let provider = workspace();
    provider.fail_watch("", true);
    block_on(async {
        let sync = start(&provider).await;
        assert_eq!(sync.watch_state(""), WatchState::Unwatched);
        assert!(sync.entry("src").is_some());
    });
}

#[test]
fn expand_loads_children_and_acquires_one_watch() {
    let provider = workspace();
    block_on(async {
        let sync = start(&provider).await;
        let mut rx = sync.subscribe();

        sync.expand("src").await.unwrap();
        sync.expand("src").await.unwrap();

        assert!(sync.entry("src/a.txt").is_some());
        assert!(sync.entry("src/nested").is_some());
        assert!(sync.entry("src/nested/deep.txt").is_none());
        assert!(sync.is_watching("src"));
        assert_eq!(provider.active_watchers("src"), 1);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.cause, ChangeCause::Reconciled { dir: "src".to_string() });
        let second = rx.recv().await.unwrap();
        assert_eq!(second.cause, ChangeCause::Expanded { path: "src".to_string() });
        assert!(second.version > first.version);
    });
}

#[test]
fn expand_rejects_files_and_unknown_paths() {
    let provider = workspace();
    block_on(async {
        let sync = start(&provider).await;
        assert_eq!(
            sync.expand("README.md").await,
            Err(SyncError::NotADirectory("README.md".to_string()))
        );
        assert_eq!(
            sync.expand("missing").await,
            Err(SyncError::NotFound("missing".to_string()))
        );
    });
}

#[test]
fn collapse_releases_watch_and_keeps_entries() {
    let provider = workspace();
    block_on(async {
        let sync = start(&provider).await;
        sync.expand("src").await.unwrap();

        sync.collapse("src");
        sync.collapse("src");

        assert_eq!(sync.watch_state("src"), WatchState::Unwatched);
        assert!(!sync.is_expanded("src"));
        assert!(sync.entry("src/a.txt").is_some());
        assert!(settle(|| provider.active_watchers("src") == 0).await);
    });
}

#[test]
fn visible_rows_follow_expansion() {
    let provider = workspace();
    block_on(async {
        let sync = start(&provider).await;
        sync.expand("src").await.unwrap();

        let rows: Vec<(String, u16)> = sync
            .visible_rows()
            .into_iter()
            .map(|row| (row.path, row.depth))
            .collect();
        assert_eq!(
            rows,
            vec![
                ("docs".to_string(), 0),
                ("src".to_string(), 0),
                ("src/nested".to_string(), 1),
                ("src/a.txt".to_string(), 1),
                ("src/b.txt".to_string(), 1),
                ("README.md".to_string(), 0),
            ]
        );
    });
}

#[test]
fn projection_puts_directories_first_at_every_level() {
    let provider = workspace();
    block_on(async {
        let sync = start(&provider).await;
        sync.expand("src").await.unwrap();
        sync.expand("src/nested").await.unwrap();

        fn check(nodes: &[TreeNode]) {
            let first_file = nodes.iter().position(|node| !node.is_dir()).unwrap_or(nodes.len());
            assert!(nodes[first_file..].iter().all(|node| !node.is_dir()));
            assert!(nodes[..first_file].windows(2).all(|w| w[0].path < w[1].path));
            assert!(nodes[first_file..].windows(2).all(|w| w[0].path < w[1].path));
            for node in nodes {
                check(&node.children);
            }
        }
        let projection = sync.projection();
        check(&projection);
        assert_eq!(projection, sync.projection());
    });
}

#[test]
fn create_entry_writes_through_and_rejects_duplicates() {
    let provider = workspace();
    block_on(async {
        let sync = start(&provider).await;
        sync.expand("src").await.unwrap();

        let file = sync.create_entry("src", "c.rs", EntryKind::File).await.unwrap();
        assert_eq!(file, "src/c.rs");
        assert_eq!(provider.kind_of("src/c.rs"), Some(EntryKind::File));
        assert_eq!(sync.entry("src/c.rs"), Some(Entry::file("src/c.rs")));

        let dir = sync.create_entry("", "lib", EntryKind::Directory).await.unwrap();
        assert_eq!(dir, "lib");
        assert_eq!(provider.kind_of("lib"), Some(EntryKind::Directory));

        provider.external_write("src/a.txt", b"keep me").unwrap();
        assert_eq!(
            sync.create_entry("src", "a.txt", EntryKind::File).await,
            Err(SyncError::AlreadyExists("src/a.txt".to_string()))
        );
        assert_eq!(provider.contents("src/a.txt"), Some(b"keep me".to_vec()));

        assert_eq!(
            sync.create_entry("README.md", "x", EntryKind::File).await,
            Err(SyncError::NotADirectory("README.md".to_string()))
        );
        assert!(matches!(
            sync.create_entry("src", "", EntryKind::File).await,
            Err(SyncError::InvalidPath(_))
        ));
    });
}

#[test]
fn create_over_unlisted_file_keeps_its_contents() {
    let provider = workspace();
    provider.external_write("src/a.txt", b"precious").unwrap();
    block_on(async {
        let sync = start(&provider).await;
        assert!(sync.entry("src/a.txt").is_none());
        let before = sync.version();

        let result = sync.create_entry("src", "a.txt", EntryKind::File).await;

        assert_eq!(result, Err(SyncError::AlreadyExists("src/a.txt".to_string())));
        assert_eq!(provider.contents("src/a.txt"), Some(b"precious".to_vec()));
        assert!(sync.entry("src/a.txt").is_none());
        assert_eq!(sync.version(), before);
    });
}

#[test]
fn failed_create_leaves_store_untouched() {
    let provider = workspace();
    block_on(async {
        let sync = start(&provider).await;
        provider.external_mkdir("ghost").unwrap();
        let before = sync.version();

        let result = sync.create_entry("", "ghost", EntryKind::Directory).await;

        assert_eq!(result, Err(SyncError::AlreadyExists("ghost".to_string())));
        assert!(sync.entry("ghost").is_none());
        assert_eq!(sync.version(), before);
    });
}

#[test]
fn paths_stay_unique_across_mutations() {
    let provider = workspace();
    block_on(async {
        let sync = start(&provider).await;
        sync.expand("src").await.unwrap();
        sync.create_entry("src", "c.rs", EntryKind::File).await.unwrap();
        sync.rename_entry("src/c.rs", "docs/c.rs").await.unwrap();
        let _ = sync.create_entry("docs", "c.rs", EntryKind::File).await;
        sync.delete_entry("src/b.txt").await.unwrap();
        sync.rename_entry("docs", "src/docs").await.unwrap();

        let mut all = paths(&sync);
        let total = all.len();
        all.dedup();
        assert_eq!(all.len(), total);
        assert!(sync.entry("src/docs/c.rs").is_some());
    });
}

#[test]
fn delete_cascades_to_subtree_tabs_selection_and_watches() {
    let provider = workspace();
    block_on(async {
        let sync = start(&provider).await;
        sync.expand("src").await.unwrap();
        sync.expand("src/nested").await.unwrap();
        sync.activate("src/a.txt").unwrap();
        sync.activate("README.md").unwrap();
        sync.activate("src/nested/deep.txt").unwrap();

        sync.delete_entry("src").await.unwrap();

        assert_eq!(paths(&sync), vec!["README.md", "docs"]);
        assert_eq!(sync.active_selection(), None);
        let tabs: Vec<String> = sync.open_tabs().into_iter().map(|tab| tab.path).collect();
        assert_eq!(tabs, vec!["README.md"]);
        assert_eq!(sync.watched_paths(), vec![""]);
        assert!(!sync.is_expanded("src/nested"));
        assert!(!provider.exists("src"));
    });
}

#[test]
fn delete_of_active_file_clears_selection_and_tab() {
    let provider = MemoryFsProvider::with_entries([
        ("src", EntryKind::Directory),
        ("src/a.txt", EntryKind::File),
    ]);
    block_on(async {
        let sync = start(&provider).await;
        sync.expand("src").await.unwrap();
        sync.activate("src/a.txt").unwrap();

        sync.delete_entry("src").await.unwrap();

        assert_eq!(sync.active_selection(), None);
        assert!(sync.open_tabs().is_empty());
    });
}

#[test]
fn delete_root_is_rejected() {
    let provider = workspace();
    block_on(async {
        let sync = start(&provider).await;
        assert!(matches!(sync.delete_entry("").await, Err(SyncError::InvalidPath(_))));
        assert!(provider.exists("src"));
    });
}

#[test]
fn rename_directory_moves_subtree_tab_and_watch() {
    let provider = MemoryFsProvider::with_entries([
        ("src", EntryKind::Directory),
        ("src/a.txt", EntryKind::File),
    ]);
    block_on(async {
        let sync = start(&provider).await;
        sync.expand("src").await.unwrap();
        sync.activate("src/a.txt").unwrap();

        sync.rename_entry("src", "lib").await.unwrap();

        assert_eq!(
            sync.entries(),
            vec![Entry::directory("lib"), Entry::file("lib/a.txt")]
        );
        let tabs = sync.open_tabs();
        assert_eq!(tabs.len(), 1);
        assert_eq!(tabs[0].path, "lib/a.txt");
        assert_eq!(tabs[0].title, "a.txt");
        assert_eq!(sync.active_selection().as_deref(), Some("lib/a.txt"));
        assert!(sync.is_expanded("lib"));
        assert!(sync.is_watching("lib"));
        assert_eq!(sync.watch_state("src"), WatchState::Unwatched);
        assert_eq!(provider.active_watchers("lib"), 1);
        assert!(settle(|| provider.active_watchers("src") == 0).await);
    });
}

#[test]
fn rename_there_and_back_restores_state() {
    let provider = workspace();
    provider.external_write("src/a.txt", b"alpha").unwrap();
    block_on(async {
        let sync = start(&provider).await;
        sync.expand("src").await.unwrap();
        sync.open_file("src/a.txt").await.unwrap();
        sync.activate("README.md").unwrap();
        sync.activate("src/b.txt").unwrap();

        let entries = sync.entries();
        let tabs = sync.open_tabs();
        let active = sync.active_selection();

        sync.rename_entry("src", "lib").await.unwrap();
        sync.rename_entry("lib", "src").await.unwrap();

        assert_eq!(sync.entries(), entries);
        assert_eq!(sync.open_tabs(), tabs);
        assert_eq!(sync.active_selection(), active);
        assert!(sync.is_watching("src"));
    });
}

#[test]
fn rename_rejects_collisions_and_self_nesting() {
    let provider = workspace();
    block_on(async {
        let sync = start(&provider).await;
        sync.expand("src").await.unwrap();
        let before = sync.entries();

        assert_eq!(
            sync.rename_entry("src/a.txt", "src/b.txt").await,
            Err(SyncError::AlreadyExists("src/b.txt".to_string()))
        );
        assert!(matches!(
            sync.rename_entry("src", "src/nested/src").await,
            Err(SyncError::InvalidPath(_))
        ));
        assert_eq!(sync.entries(), before);
        assert_eq!(provider.kind_of("src/a.txt"), Some(EntryKind::File));
    });
}

#[test]
fn rename_of_vanished_entry_reports_not_found() {
    let provider = workspace();
    block_on(async {
        let sync = start(&provider).await;
        sync.state().entries.upsert(Entry::file("ghost.txt"));
        assert_eq!(
            sync.rename_entry("ghost.txt", "spirit.txt").await,
            Err(SyncError::NotFound("ghost.txt".to_string()))
        );
        assert!(sync.entry("ghost.txt").is_some());
    });
}

#[test]
fn move_entry_keeps_the_name() {
    let provider = workspace();
    block_on(async {
        let sync = start(&provider).await;
        sync.expand("docs").await.unwrap();

        let moved = sync.move_entry("README.md", "docs").await.unwrap();
        assert_eq!(moved, "docs/README.md");
        assert!(sync.entry("README.md").is_none());
        assert!(sync.entry("docs/README.md").is_some());
        assert!(provider.exists("docs/README.md"));

        let version = sync.version();
        assert_eq!(sync.move_entry("docs/README.md", "docs").await.unwrap(), "docs/README.md");
        assert_eq!(sync.version(), version);
    });
}

#[test]
fn closing_tabs_falls_back_to_last_remaining() {
    let provider = workspace();
    block_on(async {
        let sync = start(&provider).await;
        sync.expand("src").await.unwrap();
        sync.activate("src/a.txt").unwrap();
        sync.activate("src/b.txt").unwrap();

        assert!(sync.close("src/b.txt"));
        assert_eq!(sync.active_selection().as_deref(), Some("src/a.txt"));
        assert!(sync.close("src/a.txt"));
        assert_eq!(sync.active_selection(), None);
        assert!(!sync.close("src/a.txt"));
    });
}

#[test]
fn activate_rejects_directories() {
    let provider = workspace();
    block_on(async {
        let sync = start(&provider).await;
        assert_eq!(sync.activate("src"), Err(SyncError::NotAFile("src".to_string())));
        assert_eq!(sync.active_selection(), None);
    });
}

#[test]
fn open_file_loads_content() {
    let provider = workspace();
    provider.external_write("README.md", b"# hello").unwrap();
    block_on(async {
        let sync = start(&provider).await;
        let entry = sync.open_file("README.md").await.unwrap();
        assert_eq!(entry.content, "# hello");
        assert_eq!(sync.active_selection().as_deref(), Some("README.md"));
    });
}

#[test]
fn reconcile_applies_minimal_diff() {
    let provider = MemoryFsProvider::with_entries([
        ("src", EntryKind::Directory),
        ("src/old.txt", EntryKind::Directory),
        ("src/old.txt/inner.rs", EntryKind::File),
        ("src/keep.txt", EntryKind::File),
    ]);
    provider.external_write("src/keep.txt", b"kept").unwrap();
    block_on(async {
        let sync = start(&provider).await;
        sync.expand("src").await.unwrap();
        sync.expand("src/old.txt").await.unwrap();
        sync.open_file("src/keep.txt").await.unwrap();
        let reads = provider.read_calls();
        let mut rx = sync.subscribe();

        provider.external_remove("src/old.txt").unwrap();
        provider.external_write("src/new.txt", b"fresh").unwrap();

        wait_until(&sync, &mut rx, |sync| {
            sync.entry("src/old.txt").is_none() && sync.entry("src/new.txt").is_some()
        })
        .await;

        assert!(sync.entry("src/old.txt/inner.rs").is_none());
        assert_eq!(sync.entry("src/new.txt"), Some(Entry::file("src/new.txt")));
        assert_eq!(sync.entry("src/keep.txt").unwrap().content, "kept");
        assert_eq!(provider.read_calls(), reads);
        assert_eq!(sync.watch_state("src/old.txt"), WatchState::Unwatched);
    });
}

#[test]
fn external_removal_clears_selection() {
    let provider = workspace();
    block_on(async {
        let sync = start(&provider).await;
        sync.expand("src").await.unwrap();
        sync.activate("src/a.txt").unwrap();
        let mut rx = sync.subscribe();

        provider.external_remove("src/a.txt").unwrap();
        wait_until(&sync, &mut rx, |sync| sync.entry("src/a.txt").is_none()).await;

        assert_eq!(sync.active_selection(), None);
        assert!(sync.open_tabs().is_empty());
    });
}

#[test]
fn reconcile_replaces_entry_whose_kind_changed() {
    let provider = workspace();
    block_on(async {
        let sync = start(&provider).await;
        sync.expand("src").await.unwrap();
        let mut rx = sync.subscribe();

        provider.external_remove("src/a.txt").unwrap();
        provider.external_mkdir("src/a.txt").unwrap();
        wait_until(&sync, &mut rx, |sync| {
            sync.entry("src/a.txt").is_some_and(|entry| entry.is_dir())
        })
        .await;
    });
}

#[test]
fn content_refresh_only_for_active_selection() {
    let provider = workspace();
    block_on(async {
        let sync = start(&provider).await;
        sync.expand("src").await.unwrap();
        sync.activate("src/a.txt").unwrap();
        let mut rx = sync.subscribe();

        provider.external_write("src/b.txt", b"unviewed").unwrap();
        provider.external_write("src/a.txt", b"viewed").unwrap();
        wait_until(&sync, &mut rx, |sync| {
            sync.entry("src/a.txt").is_some_and(|entry| entry.content == "viewed")
        })
        .await;

        assert_eq!(provider.read_calls(), 1);
        assert_eq!(sync.entry("src/b.txt").unwrap().content, "");
    });
}

#[test]
fn failed_write_keeps_local_content() {
    let provider = workspace();
    block_on(async {
        let sync = start(&provider).await;
        sync.expand("src").await.unwrap();
        provider.fail_writes(true);

        let result = sync.write_content("src/a.txt", "draft".to_string()).await;

        assert!(matches!(result, Err(SyncError::IoFailure { .. })));
        assert_eq!(sync.entry("src/a.txt").unwrap().content, "draft");
        assert_eq!(provider.contents("src/a.txt"), Some(Vec::new()));
    });
}

#[test]
fn write_content_reaches_provider() {
    let provider = workspace();
    block_on(async {
        let sync = start(&provider).await;
        sync.expand("src").await.unwrap();
        sync.write_content("src/a.txt", "saved".to_string()).await.unwrap();
        assert_eq!(provider.contents("src/a.txt"), Some(b"saved".to_vec()));
        assert_eq!(sync.entry("src/a.txt").unwrap().content, "saved");
        assert_eq!(
            sync.write_content("src", "x".to_string()).await,
            Err(SyncError::NotAFile("src".to_string()))
        );
    });
}

#[test]
fn watch_failure_reverts_to_unwatched_until_reexpanded() {
    let provider = workspace();
    provider.fail_watch("src", true);
    block_on(async {
        let sync = start(&provider).await;

        let err = sync.expand("src").await.unwrap_err();
        assert!(matches!(err, SyncError::WatchFailure { ref path, .. } if path == "src"));
        assert_eq!(sync.watch_state("src"), WatchState::Unwatched);
        assert!(sync.entry("src/a.txt").is_some());

        provider.fail_watch("src", false);
        sync.expand("src").await.unwrap();
        assert!(sync.is_watching("src"));
    });
}

#[test]
fn terminated_watch_is_reported_and_released() {
    let provider = workspace();
    block_on(async {
        let sync = start(&provider).await;
        sync.expand("src").await.unwrap();
        let mut rx = sync.subscribe();

        assert_eq!(provider.terminate_watchers("src"), 1);
        wait_until(&sync, &mut rx, |sync| !sync.is_watching("src")).await;

        assert_eq!(sync.watch_state("src"), WatchState::Unwatched);
        assert!(sync.is_expanded("src"));
    });
}

#[test]
fn events_from_released_watch_are_discarded() {
    let provider = workspace();
    block_on(async {
        let sync = start(&provider).await;
        sync.expand("src").await.unwrap();
        sync.collapse("src");
        provider.external_write("src/late.txt", b"").unwrap();
        let lists = provider.list_calls();
        let version = sync.version();

        sync.handle_routed(RoutedEvent {
            watched: "src".to_string(),
            generation: 1,
            signal: WatchSignal::Event(WatchEvent::structural("src")),
        })
        .await;
        sync.handle_routed(RoutedEvent {
            watched: "src".to_string(),
            generation: 1,
            signal: WatchSignal::Terminated,
        })
        .await;

        assert_eq!(provider.list_calls(), lists);
        assert_eq!(sync.version(), version);
        assert!(sync.entry("src/late.txt").is_none());
    });
}

#[test]
fn versions_increase_with_every_change() {
    let provider = workspace();
    block_on(async {
        let sync = start(&provider).await;
        let mut rx = sync.subscribe();
        sync.expand("src").await.unwrap();
        sync.activate("src/a.txt").unwrap();
        sync.close("src/a.txt");

        let mut last = 0;
        let mut seen = 0;
        while let Ok(change) = rx.try_recv() {
            assert!(change.version > last);
            last = change.version;
            seen += 1;
        }
        assert_eq!(seen, 4);
        assert_eq!(sync.version(), last);
    });
}

#[test]
fn shutdown_releases_every_watch() {
    let provider = workspace();
    block_on(async {
        let sync = start(&provider).await;
        sync.expand("src").await.unwrap();

        sync.shutdown();

        assert!(sync.watched_paths().is_empty());
        assert!(settle(|| provider.active_watchers("") == 0 && provider.active_watchers("src") == 0).await);
    });
}
