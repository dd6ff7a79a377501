//! End-to-end scenarios from spec.md §8 "Concrete end-to-end scenarios", exercised
//! against a real temp-directory project rather than individual unit fixtures.

use std::fs;

use ice_core::engine::IceEngine;
use ice_core::io::WriteMode;
use ice_core::types::{ChangeEvent, ChangeKind, FilePath, UpdateOptions, UpdateRequest};
use ice_core::{EngineConfig, IceError};
use tempfile::tempdir;

fn write(path: &std::path::Path, contents: &str) {
    fs::write(path, contents).unwrap();
}

/// Scenario 1: linear chain reachability and depth.
#[tokio::test]
async fn linear_chain_affected_files_and_depth() {
    let dir = tempdir().unwrap();
    write(&dir.path().join("main.ts"), "import './app';");
    write(&dir.path().join("app.tsx"), "import './header';");
    write(&dir.path().join("header.tsx"), "import './button';");
    write(&dir.path().join("button.tsx"), "import './utils';");
    write(&dir.path().join("utils.ts"), "export const x = 1;");

    let engine = IceEngine::new(EngineConfig::default()).unwrap();
    let root = FilePath::new(dir.path());
    let report = engine.scan_project(&root);
    assert_eq!(report.files_scanned, 5);
    assert!(report.errors.is_empty());

    // Confirmed indirectly through a Cascade update: every file in the chain must
    // be touched when the leaf changes (see scenario 3 for the ordering check).
    let utils = FilePath::new(dir.path().join("utils.ts"));
    let result = engine
        .process_update(UpdateRequest::Cascade(utils), &UpdateOptions::default())
        .await;
    assert!(result.success);
    assert_eq!(result.updated_files.len(), 5);
}

/// Scenario 2: three-file cycle detection.
#[tokio::test]
async fn three_file_cycle_is_detected_and_scan_still_succeeds() {
    let dir = tempdir().unwrap();
    write(&dir.path().join("A.ts"), "import './B';");
    write(&dir.path().join("B.ts"), "import './C';");
    write(&dir.path().join("C.ts"), "import './A';");

    let engine = IceEngine::new(EngineConfig::default()).unwrap();
    let root = FilePath::new(dir.path());
    let report = engine.scan_project(&root);
    assert_eq!(report.files_scanned, 3);

    let cycles = engine.detect_cycles();
    assert_eq!(cycles.len(), 1);
    let mut names: Vec<String> = cycles[0]
        .cycle
        .iter()
        .map(|p| p.as_path().file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, vec!["A.ts", "B.ts", "C.ts"]);
}

/// Scenario 3: cascade update on a leaf change orders dependencies before dependents.
#[tokio::test]
async fn cascade_on_leaf_change_orders_updates_dependency_first() {
    let dir = tempdir().unwrap();
    write(&dir.path().join("main.ts"), "import './app';");
    write(&dir.path().join("app.tsx"), "import './header';");
    write(&dir.path().join("header.tsx"), "import './button';");
    write(&dir.path().join("button.tsx"), "import './utils';");
    write(&dir.path().join("utils.ts"), "export const x = 1;");

    let engine = IceEngine::new(EngineConfig::default()).unwrap();
    let root = FilePath::new(dir.path());
    engine.scan_project(&root);

    let utils = FilePath::new(dir.path().join("utils.ts"));
    let event = ChangeEvent::new(ChangeKind::Modified, utils.clone());
    let result = engine.handle_change(event, &UpdateOptions::default()).await;

    assert!(result.success);
    assert_eq!(result.updated_files.len(), 5);

    let order = result.update_order.unwrap();
    let pos = |name: &str| {
        order
            .iter()
            .position(|p| p.as_path().file_name().unwrap().to_string_lossy() == name)
            .unwrap()
    };
    assert!(pos("utils.ts") < pos("button.tsx"));
    assert!(pos("button.tsx") < pos("header.tsx"));
    assert!(pos("header.tsx") < pos("app.tsx"));
    assert!(pos("app.tsx") < pos("main.ts"));
}

/// Scenario 4: Smart update skips an unchanged file on the second pass.
#[tokio::test]
async fn smart_update_skips_unchanged_file_on_repeat() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("utils.ts");
    write(&file, "export const x = 1;");
    let path = FilePath::new(&file);

    let engine = IceEngine::new(EngineConfig::default()).unwrap();
    let opts = UpdateOptions::default();

    let first = engine
        .process_update(UpdateRequest::Smart(path.clone()), &opts)
        .await;
    assert!(first.success);
    assert_eq!(first.processed_count, 1);

    let second = engine
        .process_update(UpdateRequest::Smart(path), &opts)
        .await;
    assert!(second.success);
    assert_eq!(second.processed_count, 0);
    assert_eq!(second.skipped_count, 1);
}

/// Scenario 5: overwrite write coalescing collapses to last-write-wins.
#[tokio::test]
async fn overwrite_write_coalescing_is_last_write_wins() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("log.txt");
    fs::write(&file, "").unwrap();
    let path = FilePath::new(&file);

    let engine = IceEngine::new(EngineConfig::default()).unwrap();
    let io = engine.io();

    let mut handles = Vec::new();
    for i in 0..5 {
        let io = io.clone();
        let path = path.clone();
        handles.push(tokio::spawn(async move {
            let contents = format!("Write {i}");
            io.write_file(&path, contents.as_bytes(), WriteMode::Overwrite)
                .await
        }));
    }

    for h in handles {
        let outcome = h.await.unwrap().unwrap();
        assert!(outcome.bytes_written == 0 || outcome.bytes_written == "Write 4".len());
    }

    let on_disk = fs::read_to_string(&file).unwrap();
    assert_eq!(on_disk, "Write 4");
}

/// Scenario 6: with one permit and a backlog of one, a second concurrent acquire on a
/// new path rejects synchronously with `QueueFull`.
#[tokio::test]
async fn queue_backpressure_rejects_when_saturated() {
    use ice_core::io::{ReadPriority as Priority, ReadQueue};
    use std::sync::Arc;

    let queue = Arc::new(ReadQueue::new(1, 1));
    let held_path = FilePath::new("/held.ts");
    let waiting_path = FilePath::new("/waiting.ts");
    let rejected_path = FilePath::new("/rejected.ts");

    // One permit held, one slot in the backlog occupied by a parked waiter.
    let held = queue.acquire(&held_path, Priority::Normal).await.unwrap();
    let queue_for_waiter = queue.clone();
    let waiter = tokio::spawn(async move {
        queue_for_waiter.acquire(&waiting_path, Priority::Normal).await
    });
    tokio::task::yield_now().await;
    assert_eq!(queue.queue_depth(), 1);

    let rejected = queue.acquire(&rejected_path, Priority::Normal).await;
    assert!(matches!(rejected, Err(IceError::QueueFull)));

    drop(held);
    waiter.await.unwrap().unwrap();
}
