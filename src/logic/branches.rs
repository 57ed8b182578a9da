use crate::error::EngineError;
use crate::model::{Branch, BranchType, Id, MergeStatus};
use crate::store::traits::Store;

/// Bootstrap the protected main branch. Idempotent; the one path that may
/// create a branch of type Main.
pub async fn ensure_main_branch<S: Store>(store: &S) -> Result<Branch, EngineError> {
    log::debug!("ensure_main_branch");
    if let Some(main) = store.get_main_branch().await? {
        return Ok(main);
    }
    let main = Branch::new_main();
    store.insert_branch(main.clone()).await?;
    Ok(main)
}

/// Create a feature branch. Names need not be unique; the id is authoritative.
pub async fn create_branch<S: Store>(store: &S, name: &str) -> Result<Branch, EngineError> {
    log::debug!("create_branch name={}", name);
    let branch = Branch::new(name.to_string());
    store.insert_branch(branch.clone()).await?;
    Ok(branch)
}

pub async fn get_branch<S: Store>(store: &S, id: &Id) -> Result<Branch, EngineError> {
    log::debug!("get_branch id={}", id);
    store
        .get_branch(id)
        .await?
        .ok_or_else(|| EngineError::not_found("branch", id))
}

pub async fn list_branches<S: Store>(store: &S) -> Result<Vec<Branch>, EngineError> {
    log::debug!("list_branches");
    Ok(store.list_branches().await?)
}

/// Flag a branch for merging into main.
///
/// The transition is validated against the stored row, not the caller's
/// snapshot, so a stale snapshot cannot sidestep the state check.
pub async fn request_merge_branch<S: Store>(
    store: &S,
    branch: &Branch,
) -> Result<Branch, EngineError> {
    log::debug!("request_merge_branch id={}", branch.id);
    let branch = get_branch(store, &branch.id).await?;
    match branch.merge_status {
        MergeStatus::None => {}
        MergeStatus::Requested => {
            return Err(EngineError::InvalidState(format!(
                "merge already requested for branch '{}'",
                branch.name
            )))
        }
        MergeStatus::Merged => {
            return Err(EngineError::InvalidState(format!(
                "branch '{}' is already merged",
                branch.name
            )))
        }
    }

    let mut updated = branch.clone();
    updated.merge_status = MergeStatus::Requested;
    store.update_branch(updated.clone()).await?;
    Ok(updated)
}

/// Withdraw a pending merge request.
pub async fn unrequest_merge_branch<S: Store>(
    store: &S,
    branch: &Branch,
) -> Result<Branch, EngineError> {
    log::debug!("unrequest_merge_branch id={}", branch.id);
    let branch = get_branch(store, &branch.id).await?;
    if !branch.merge_requested() {
        return Err(EngineError::InvalidState(format!(
            "no merge requested for branch '{}'",
            branch.name
        )));
    }

    let mut updated = branch.clone();
    updated.merge_status = MergeStatus::None;
    store.update_branch(updated.clone()).await?;
    Ok(updated)
}

/// Approve a pending merge request: fold the branch's commit history into
/// main in commit order and mark the branch merged, as one atomic store
/// operation — a failure leaves neither the replayed commits nor the status
/// flip behind, so the caller's retry cannot duplicate main's history.
///
/// After approval, reads against main resolve every column mutation the
/// branch committed. The branch's own log stays intact and inspectable;
/// merged state is terminal.
pub async fn approve_merge_branch<S: Store>(
    store: &S,
    branch: &Branch,
) -> Result<Branch, EngineError> {
    log::debug!("approve_merge_branch id={}", branch.id);
    let branch = get_branch(store, &branch.id).await?;
    if !branch.merge_requested() {
        return Err(EngineError::InvalidState(format!(
            "no merge requested for branch '{}'",
            branch.name
        )));
    }

    let main = store
        .get_main_branch()
        .await?
        .ok_or_else(|| EngineError::not_found("branch", "main"))?;

    let replayed = store.approve_merge(&branch.id, &main.id).await?;
    log::debug!(
        "approve_merge_branch replayed {} commits from '{}' into main",
        replayed,
        branch.name
    );

    get_branch(store, &branch.id).await
}

/// Rename a branch. Main is protected from renaming.
pub async fn rename_branch<S: Store>(
    store: &S,
    id: &Id,
    name: &str,
) -> Result<Branch, EngineError> {
    log::debug!("rename_branch id={} name={}", id, name);
    let branch = get_branch(store, id).await?;
    if branch.branch_type == BranchType::Main {
        return Err(EngineError::prohibited("Branch renaming", &branch.name));
    }

    let mut updated = branch;
    updated.name = name.to_string();
    store.update_branch(updated.clone()).await?;
    Ok(updated)
}
