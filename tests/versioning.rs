use dbengine::error::EngineError;
use dbengine::logic::{branches, columns};
use dbengine::model::{Branch, BranchType, MergeStatus, Table};
use dbengine::store::traits::{CommitStore, TableStore};
use dbengine::store::MemoryStore;

async fn setup() -> (MemoryStore, Branch, Table) {
    let store = MemoryStore::new();
    branches::ensure_main_branch(&store).await.unwrap();
    let branch = branches::create_branch(&store, "feature-1").await.unwrap();
    let table = Table::new("users".to_string());
    store.insert_table(table.clone()).await.unwrap();
    (store, branch, table)
}

#[tokio::test]
async fn create_then_get_returns_supplied_attributes() {
    let (store, branch, table) = setup().await;

    let (column, attributes, commit) =
        columns::create_column(&store, &branch, &table, "age", "int")
            .await
            .unwrap();
    assert_eq!(attributes.name, "age");
    assert_eq!(attributes.datatype, "int");
    assert!(commit.is_initial());
    assert_eq!(commit.attribute_id_out.as_ref(), Some(&column.id));

    let (read_column, read_attributes) =
        columns::get_column(&store, &branch, &table, &column.id)
            .await
            .unwrap();
    assert_eq!(read_column, column);
    assert_eq!(read_attributes.name, "age");
    assert_eq!(read_attributes.datatype, "int");
}

#[tokio::test]
async fn mutations_on_main_fail_with_no_partial_state() {
    let (store, branch, table) = setup().await;
    let main = branches::ensure_main_branch(&store).await.unwrap();
    assert_eq!(main.branch_type, BranchType::Main);

    let err = columns::create_column(&store, &main, &table, "age", "int")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ProhibitedAction { .. }));
    assert_eq!(err.status_code(), 403);

    // Target an existing column version via the main branch as well
    let (column, _, _) = columns::create_column(&store, &branch, &table, "age", "int")
        .await
        .unwrap();
    let err = columns::update_column(&store, &main, &table, &column, Some("years"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ProhibitedAction { .. }));
    let err = columns::delete_column(&store, &main, &column).await.unwrap_err();
    assert!(matches!(err, EngineError::ProhibitedAction { .. }));

    let main_log = store.list_commits_for_branch(&main.id).await.unwrap();
    assert!(main_log.is_empty());
    let branch_log = store.list_commits_for_branch(&branch.id).await.unwrap();
    assert_eq!(branch_log.len(), 1);
}

#[tokio::test]
async fn update_keeps_prior_version_readable() {
    let (store, branch, table) = setup().await;

    let (v1, _, first_commit) = columns::create_column(&store, &branch, &table, "age", "int")
        .await
        .unwrap();
    let (v2, v2_attributes, second_commit) =
        columns::update_column(&store, &branch, &table, &v1, None, Some("bigint"))
            .await
            .unwrap();

    // New version carries the merged attributes
    assert_ne!(v2.id, v1.id);
    assert_eq!(v2.lineage_id, v1.lineage_id);
    assert_eq!(v2_attributes.name, "age");
    assert_eq!(v2_attributes.datatype, "bigint");

    // Prior version is untouched
    let (_, v1_attributes) = columns::get_column(&store, &branch, &table, &v1.id)
        .await
        .unwrap();
    assert_eq!(v1_attributes.datatype, "int");

    // The commit chains prior to new and links back to its predecessor
    assert_eq!(second_commit.attribute_id_in.as_ref(), Some(&v1.id));
    assert_eq!(second_commit.attribute_id_out.as_ref(), Some(&v2.id));
    assert_eq!(second_commit.prev_commit_id.as_ref(), Some(&first_commit.id));

    let log = store.list_commits_for_branch(&branch.id).await.unwrap();
    assert_eq!(log.len(), 2);
}

#[tokio::test]
async fn update_with_only_name_keeps_datatype() {
    let (store, branch, table) = setup().await;

    let (v1, _, _) = columns::create_column(&store, &branch, &table, "age", "int")
        .await
        .unwrap();
    let (_, attributes, _) =
        columns::update_column(&store, &branch, &table, &v1, Some("years"), None)
            .await
            .unwrap();
    assert_eq!(attributes.name, "years");
    assert_eq!(attributes.datatype, "int");
}

#[tokio::test]
async fn delete_appends_terminal_commit_and_removes_nothing() {
    let (store, branch, table) = setup().await;

    let (column, _, _) = columns::create_column(&store, &branch, &table, "age", "int")
        .await
        .unwrap();
    let terminal = columns::delete_column(&store, &branch, &column).await.unwrap();

    assert!(terminal.is_terminal());
    assert_eq!(terminal.attribute_id_in.as_ref(), Some(&column.id));

    // History is preserved: the version and its commit are still readable
    let (_, attributes) = columns::get_column(&store, &branch, &table, &column.id)
        .await
        .unwrap();
    assert_eq!(attributes.datatype, "int");
    let log = store.list_commits_for_branch(&branch.id).await.unwrap();
    assert_eq!(log.len(), 2);

    // But the lineage head resolves to deleted
    let err = columns::get_latest_column(&store, &branch, &table, &column.lineage_id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound { .. }));
}

#[tokio::test]
async fn chain_positions_increase_in_insertion_order() {
    let (store, branch, table) = setup().await;

    let (column, _, _) = columns::create_column(&store, &branch, &table, "age", "int")
        .await
        .unwrap();
    let (v2, _, _) = columns::update_column(&store, &branch, &table, &column, None, Some("bigint"))
        .await
        .unwrap();
    columns::create_column(&store, &branch, &table, "name", "text")
        .await
        .unwrap();
    columns::delete_column(&store, &branch, &v2).await.unwrap();

    let log = store.list_commits_for_branch(&branch.id).await.unwrap();
    let ordinals: Vec<i64> = log.iter().map(|c| c.ordinal).collect();
    assert_eq!(ordinals, vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn get_latest_follows_lineage_to_newest_version() {
    let (store, branch, table) = setup().await;

    let (v1, _, _) = columns::create_column(&store, &branch, &table, "age", "int")
        .await
        .unwrap();
    let (v2, _, _) = columns::update_column(&store, &branch, &table, &v1, None, Some("bigint"))
        .await
        .unwrap();

    // Exact-version lookup stays pinned to the id given
    let (_, v1_attributes) = columns::get_column(&store, &branch, &table, &v1.id)
        .await
        .unwrap();
    assert_eq!(v1_attributes.datatype, "int");

    // Lineage lookup resolves the newest version
    let (latest, latest_attributes) =
        columns::get_latest_column(&store, &branch, &table, &v1.lineage_id)
            .await
            .unwrap();
    assert_eq!(latest.id, v2.id);
    assert_eq!(latest_attributes.datatype, "bigint");
}

#[tokio::test]
async fn versioning_scenario_age_int_to_bigint() {
    let (store, branch, table) = setup().await;

    let (v1, v1_attributes, _) = columns::create_column(&store, &branch, &table, "age", "int")
        .await
        .unwrap();
    assert_eq!(v1_attributes.name, "age");
    assert_eq!(v1_attributes.datatype, "int");

    let (v2, v2_attributes, _) =
        columns::update_column(&store, &branch, &table, &v1, None, Some("bigint"))
            .await
            .unwrap();
    assert_eq!(v2_attributes.name, "age");
    assert_eq!(v2_attributes.datatype, "bigint");
    assert_ne!(v2.id, v1.id);

    let (_, prior) = columns::get_column(&store, &branch, &table, &v1.id)
        .await
        .unwrap();
    assert_eq!(prior.datatype, "int");

    let log = store.list_commits_for_branch(&branch.id).await.unwrap();
    assert_eq!(log.len(), 2);
}

#[tokio::test]
async fn merge_request_state_machine() {
    let (store, branch, _) = setup().await;

    let requested = branches::request_merge_branch(&store, &branch).await.unwrap();
    assert_eq!(requested.merge_status, MergeStatus::Requested);

    let err = branches::request_merge_branch(&store, &requested)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));
    assert_eq!(err.status_code(), 409);

    let unrequested = branches::unrequest_merge_branch(&store, &requested)
        .await
        .unwrap();
    assert_eq!(unrequested.merge_status, MergeStatus::None);

    let err = branches::unrequest_merge_branch(&store, &unrequested)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));
}

#[tokio::test]
async fn approve_requires_pending_request() {
    let (store, branch, _) = setup().await;

    let err = branches::approve_merge_branch(&store, &branch).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));
}

#[tokio::test]
async fn approve_merge_folds_history_into_main() {
    let (store, branch, table) = setup().await;
    let main = branches::ensure_main_branch(&store).await.unwrap();

    let (v1, _, _) = columns::create_column(&store, &branch, &table, "age", "int")
        .await
        .unwrap();
    let (v2, _, _) = columns::update_column(&store, &branch, &table, &v1, None, Some("bigint"))
        .await
        .unwrap();

    let requested = branches::request_merge_branch(&store, &branch).await.unwrap();
    let merged = branches::approve_merge_branch(&store, &requested).await.unwrap();
    assert_eq!(merged.merge_status, MergeStatus::Merged);

    // Main now carries the branch's mutations in commit order
    let main_log = store.list_commits_for_branch(&main.id).await.unwrap();
    assert_eq!(main_log.len(), 2);
    assert_eq!(main_log[0].attribute_id_out.as_ref(), Some(&v1.id));
    assert_eq!(main_log[1].attribute_id_out.as_ref(), Some(&v2.id));
    assert_eq!(main_log[1].prev_commit_id.as_ref(), Some(&main_log[0].id));

    let (latest, latest_attributes) =
        columns::get_latest_column(&store, &main, &table, &v1.lineage_id)
            .await
            .unwrap();
    assert_eq!(latest.id, v2.id);
    assert_eq!(latest_attributes.datatype, "bigint");

    // The merged branch's own log is intact and its state terminal
    let branch_log = store.list_commits_for_branch(&branch.id).await.unwrap();
    assert_eq!(branch_log.len(), 2);
    let err = branches::request_merge_branch(&store, &merged).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));
}

#[tokio::test]
async fn approve_retry_does_not_duplicate_main_history() {
    let (store, branch, table) = setup().await;
    let main = branches::ensure_main_branch(&store).await.unwrap();

    let (v1, _, _) = columns::create_column(&store, &branch, &table, "age", "int")
        .await
        .unwrap();
    columns::update_column(&store, &branch, &table, &v1, None, Some("bigint"))
        .await
        .unwrap();

    branches::request_merge_branch(&store, &branch).await.unwrap();
    branches::approve_merge_branch(&store, &branch).await.unwrap();

    // A retry straight at the store is a no-op once the branch is merged
    let replayed = store.approve_merge(&branch.id, &main.id).await.unwrap();
    assert_eq!(replayed, 0);
    let main_log = store.list_commits_for_branch(&main.id).await.unwrap();
    assert_eq!(main_log.len(), 2);

    // And the engine rejects it outright
    let err = branches::approve_merge_branch(&store, &branch).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));
    let main_log = store.list_commits_for_branch(&main.id).await.unwrap();
    assert_eq!(main_log.len(), 2);
}

#[tokio::test]
async fn stale_snapshot_cannot_bypass_merge_guards() {
    let (store, branch, _) = setup().await;

    // `branch` still reads as merge_status None after this
    branches::request_merge_branch(&store, &branch).await.unwrap();

    // Transitions check the stored row, not the snapshot handed in
    let err = branches::request_merge_branch(&store, &branch)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));

    let requested = branches::get_branch(&store, &branch.id).await.unwrap();
    assert_eq!(requested.merge_status, MergeStatus::Requested);

    branches::unrequest_merge_branch(&store, &branch).await.unwrap();
    let err = branches::unrequest_merge_branch(&store, &requested)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));
}

#[tokio::test]
async fn rename_protects_main() {
    let (store, branch, _) = setup().await;
    let main = branches::ensure_main_branch(&store).await.unwrap();

    let err = branches::rename_branch(&store, &main.id, "trunk").await.unwrap_err();
    assert!(matches!(err, EngineError::ProhibitedAction { .. }));

    let renamed = branches::rename_branch(&store, &branch.id, "feature-2")
        .await
        .unwrap();
    assert_eq!(renamed.name, "feature-2");
    let reread = branches::get_branch(&store, &branch.id).await.unwrap();
    assert_eq!(reread.name, "feature-2");
}

#[tokio::test]
async fn main_bootstrap_is_idempotent() {
    let store = MemoryStore::new();
    let first = branches::ensure_main_branch(&store).await.unwrap();
    let second = branches::ensure_main_branch(&store).await.unwrap();
    assert_eq!(first.id, second.id);

    let mains: Vec<_> = branches::list_branches(&store)
        .await
        .unwrap()
        .into_iter()
        .filter(|b| b.branch_type == BranchType::Main)
        .collect();
    assert_eq!(mains.len(), 1);
}

#[tokio::test]
async fn missing_branch_and_column_read_as_not_found() {
    let (store, branch, table) = setup().await;

    let err = branches::get_branch(&store, &"nope".to_string()).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound { .. }));
    assert_eq!(err.status_code(), 404);

    let err = columns::get_column(&store, &branch, &table, &"nope".to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound { .. }));
}

#[tokio::test]
async fn column_reads_are_scoped_to_their_table() {
    let (store, branch, table) = setup().await;
    let other_table = Table::new("orders".to_string());
    store.insert_table(other_table.clone()).await.unwrap();

    let (column, _, _) = columns::create_column(&store, &branch, &table, "age", "int")
        .await
        .unwrap();

    let err = columns::get_column(&store, &branch, &other_table, &column.id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound { .. }));
}

#[tokio::test]
async fn branch_serializes_as_plain_data() {
    let branch = Branch::new("feature-1".to_string());
    let value = serde_json::to_value(&branch).unwrap();
    assert_eq!(value["name"], "feature-1");
    assert_eq!(value["branch_type"], "feature");
    assert_eq!(value["merge_status"], "none");
}
