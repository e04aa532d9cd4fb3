//! Directory tree operations.
//!
//! Every operation takes a [`VfsContext`] and keeps the byte storage and
//! the document store in step: backend first, then the record through the
//! path cache, undoing the backend step when a create cannot be persisted.
//!
//! Renaming or moving a directory rewrites the stored `path` of every
//! descendant directory. That fan-out runs as one task per descendant on a
//! [`JoinSet`]; all tasks are joined, the first error is returned and the
//! rest are logged. A failed fan-out is not rolled back.

use std::time::SystemTime;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::backend::BackendError;
use crate::context::VfsContext;
use crate::entry::{AnyRecord, Children, DirRecord, DocPatch, FileRecord, ROOT_DIR_ID, validate_name};
use crate::error::{FsError, FsResult};
use crate::paths;
use crate::store::{FindRequest, Selector, find_docs};

const DIR_MODE: u32 = 0o755;
const FILE_MODE: u32 = 0o644;
const EXEC_MODE: u32 = 0o755;

/// Absolute path of a directory, memoized on the record.
pub async fn derive_path(ctx: &VfsContext, dir: &mut DirRecord) -> FsResult<String> {
    ctx.cache().derive_path(dir).await
}

/// Absolute path of a file record.
pub async fn file_path(ctx: &VfsContext, file: &FileRecord) -> FsResult<String> {
    ctx.cache().file_path(file).await
}

// ============================================================================
// Directories
// ============================================================================

/// Create the tenant root at `/`, or return it if it already exists.
#[tracing::instrument(skip(ctx), name = "vfs.create_root")]
pub async fn create_root(ctx: &VfsContext) -> FsResult<DirRecord> {
    match ctx.cache().dir_by_id(ROOT_DIR_ID).await {
        Ok(root) => return Ok(root),
        Err(FsError::NotExist(_)) => {}
        Err(e) => return Err(e),
    }

    ctx.fs().mkdir_all(paths::ROOT, DIR_MODE).await?;
    let mut root = DirRecord::root();
    match ctx.cache().create_root(&mut root).await {
        Ok(()) => {
            info!(id = %root.id, "created root directory");
            Ok(root)
        }
        // Lost a race with another provisioner; theirs is as good as ours.
        Err(FsError::RevisionConflict(_)) => ctx.cache().dir_by_id(ROOT_DIR_ID).await,
        Err(e) => Err(e),
    }
}

/// Create a directory under its `folder_id`.
///
/// On success `dir` carries its id, rev and path.
#[tracing::instrument(skip(ctx, dir), name = "vfs.create_directory", fields(name = %dir.name))]
pub async fn create_directory(ctx: &VfsContext, dir: &mut DirRecord) -> FsResult<()> {
    validate_name(&dir.name)?;
    let path = ctx.cache().derive_path(dir).await?;
    ctx.fs()
        .mkdir(&path, DIR_MODE)
        .await
        .map_err(|e| occupied(e, &path))?;

    if let Err(e) = ctx.cache().create_dir(dir).await {
        if let Err(cleanup) = ctx.fs().remove(&path).await {
            warn!(path = %path, error = %cleanup, "failed to remove directory after create error");
        }
        return Err(e);
    }

    info!(id = %dir.id, path = %path, "created directory");
    Ok(())
}

/// Apply a metadata patch to a directory, moving it if its path changes.
///
/// Returns the updated record. When the path changes the backend directory
/// is renamed and every descendant directory's stored path is rewritten.
/// `old` must carry the current revision; a stale one is a
/// `RevisionConflict` before anything is touched.
#[tracing::instrument(skip(ctx, old, patch), name = "vfs.modify_dir_metadata", fields(id = %old.id))]
pub async fn modify_dir_metadata(
    ctx: &VfsContext,
    old: &DirRecord,
    patch: &DocPatch,
) -> FsResult<DirRecord> {
    // A record fetched before an ancestor moved holds a stale path.
    let current = ctx.cache().dir_by_id(&old.id).await?;
    if current.rev != old.rev {
        return Err(FsError::RevisionConflict(old.id.clone()));
    }

    let mut old = old.clone();
    let old_path = ctx.cache().derive_path(&mut old).await?;

    let mut new = patch.apply_to_dir(&old)?;
    let new_path = ctx.cache().derive_path(&mut new).await?;

    if new_path == old_path {
        ctx.cache().update_dir(&mut new).await?;
        return Ok(new);
    }

    if paths::is_strict_descendant(&new_path, &old_path) {
        return Err(FsError::ForbiddenMove {
            from: old_path,
            to: new_path,
        });
    }
    match ctx.fs().stat(&new_path).await {
        Ok(_) => return Err(FsError::AlreadyExists(new_path)),
        Err(e) if e.is_not_found() => {}
        Err(e) => return Err(e.into()),
    }

    ctx.fs().rename(&old_path, &new_path).await?;
    ctx.cache().update_dir(&mut new).await?;
    info!(from = %old_path, to = %new_path, "moved directory");

    propagate(ctx, &old_path, &new_path).await?;
    Ok(new)
}

/// Rewrite the stored path of every directory under `old_path`.
#[tracing::instrument(skip(ctx), name = "vfs.propagate")]
async fn propagate(ctx: &VfsContext, old_path: &str, new_path: &str) -> FsResult<()> {
    let req = FindRequest::new(Selector::starts_with(
        "path",
        paths::descendant_prefix(old_path),
    ));
    let descendants: Vec<DirRecord> =
        find_docs(ctx.store(), &ctx.config().doctype, &req).await?;
    let count = descendants.len();

    let mut tasks = JoinSet::new();
    for child in descendants {
        let ctx = ctx.clone();
        let old_path = old_path.to_string();
        let new_path = new_path.to_string();
        tasks.spawn(async move { rebase_descendant(&ctx, child, &old_path, &new_path).await });
    }

    let mut first_error = None;
    while let Some(joined) = tasks.join_next().await {
        let result = joined
            .map_err(|e| FsError::Task(e.to_string()))
            .and_then(|r| r);
        if let Err(e) = result {
            if first_error.is_none() {
                first_error = Some(e);
            } else {
                warn!(error = %e, "discarding propagation error");
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => {
            info!(count, "rewrote descendant paths");
            Ok(())
        }
    }
}

async fn rebase_descendant(
    ctx: &VfsContext,
    mut child: DirRecord,
    old_path: &str,
    new_path: &str,
) -> FsResult<()> {
    child.path = paths::rebase(&child.path, old_path, new_path).ok_or_else(|| {
        FsError::CacheInconsistency(format!("{} is not under {old_path}", child.path))
    })?;
    child.updated_at = SystemTime::now().max(child.updated_at);
    ctx.cache().update_dir(&mut child).await
}

/// Populate `dir.children` with its direct children, up to the configured page size.
pub async fn fetch_children(ctx: &VfsContext, dir: &mut DirRecord) -> FsResult<()> {
    if dir.id.is_empty() {
        return Err(FsError::not_exist(&dir.name));
    }
    let (dirs, files) = ctx
        .cache()
        .list_children(&dir.id, ctx.config().children_limit)
        .await?;
    dir.children = Some(Children { dirs, files });
    Ok(())
}

pub async fn get_dir_by_id(
    ctx: &VfsContext,
    id: &str,
    with_children: bool,
) -> FsResult<DirRecord> {
    let mut dir = ctx.cache().dir_by_id(id).await?;
    if with_children {
        fetch_children(ctx, &mut dir).await?;
    }
    Ok(dir)
}

pub async fn get_dir_by_path(
    ctx: &VfsContext,
    path: &str,
    with_children: bool,
) -> FsResult<DirRecord> {
    if !paths::is_absolute(path) {
        return Err(FsError::InvalidPath(path.to_string()));
    }
    let mut dir = ctx.cache().dir_by_path(path).await?;
    if with_children {
        fetch_children(ctx, &mut dir).await?;
    }
    Ok(dir)
}

// ============================================================================
// Files
// ============================================================================

pub async fn get_file_by_id(ctx: &VfsContext, id: &str) -> FsResult<FileRecord> {
    ctx.cache().file_by_id(id).await
}

pub async fn get_file_by_path(ctx: &VfsContext, path: &str) -> FsResult<FileRecord> {
    if !paths::is_absolute(path) {
        return Err(FsError::InvalidPath(path.to_string()));
    }
    ctx.cache().file_by_path(path).await
}

/// Create an empty file under its `folder_id`.
#[tracing::instrument(skip(ctx, file), name = "vfs.create_file", fields(name = %file.name))]
pub async fn create_file(ctx: &VfsContext, file: &mut FileRecord) -> FsResult<()> {
    validate_name(&file.name)?;
    let path = ctx.cache().file_path(file).await?;
    ctx.fs()
        .create(&path, if file.executable { EXEC_MODE } else { FILE_MODE })
        .await
        .map_err(|e| occupied(e, &path))?;

    if let Err(e) = ctx.cache().create_file(file).await {
        if let Err(cleanup) = ctx.fs().remove(&path).await {
            warn!(path = %path, error = %cleanup, "failed to remove file after create error");
        }
        return Err(e);
    }

    info!(id = %file.id, path = %path, "created file");
    Ok(())
}

/// Persist metadata changes to a file record.
///
/// Content and location are untouched: a change of `name` or `folder_id`
/// is rejected. `updated_at` is stamped with the current time unless the
/// caller already moved it past the stored value.
#[tracing::instrument(skip(ctx, file), name = "vfs.update_file", fields(id = %file.id))]
pub async fn update_file(ctx: &VfsContext, file: &mut FileRecord) -> FsResult<()> {
    let stored = ctx.cache().file_by_id(&file.id).await?;
    if stored.name != file.name || stored.folder_id != file.folder_id {
        return Err(FsError::invalid_patch("files cannot be renamed or moved"));
    }
    if file.updated_at < file.created_at {
        return Err(FsError::invalid_patch("updated_at is earlier than created_at"));
    }
    if file.updated_at <= stored.updated_at {
        file.updated_at = SystemTime::now().max(stored.updated_at);
    }
    ctx.cache().update_file(file).await
}

/// Write `data` into a file's content at `offset` and record the new size.
#[tracing::instrument(skip(ctx, file, data), name = "vfs.write_file", fields(id = %file.id, len = data.len()))]
pub async fn write_file(
    ctx: &VfsContext,
    file: &mut FileRecord,
    offset: u64,
    data: &[u8],
) -> FsResult<()> {
    let path = ctx.cache().file_path(file).await?;
    ctx.fs().write(&path, offset, data).await?;
    file.size = ctx.fs().stat(&path).await?.size;
    update_file(ctx, file).await
}

/// Whole content of a file.
pub async fn read_file(ctx: &VfsContext, file: &FileRecord) -> FsResult<Vec<u8>> {
    let path = ctx.cache().file_path(file).await?;
    Ok(ctx.fs().read_all(&path).await?)
}

// ============================================================================
// Either kind
// ============================================================================

/// Look up a record by id without knowing its kind.
pub async fn get_by_id(ctx: &VfsContext, id: &str) -> FsResult<AnyRecord> {
    ctx.cache().dir_or_file_by_id(id).await
}

/// Report an occupied target as a tree-level conflict.
fn occupied(e: BackendError, path: &str) -> FsError {
    match e {
        BackendError::AlreadyExists(_) => FsError::AlreadyExists(path.to_string()),
        other => other.into(),
    }
}
