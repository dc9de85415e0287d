use serde::Serialize;
use std::collections::HashMap;

use super::path::path_chain;
use crate::error::Error;
use crate::storage::models::{CatalogFile, Folder};
use crate::storage::Database;

/// A folder with its loaded children, for tree views.
#[derive(Debug, Clone, Serialize)]
pub struct FolderNode {
    #[serde(flatten)]
    pub folder: Folder,
    pub children: Vec<FolderNode>,
}

pub fn root_folders(db: &Database, library_id: i64) -> Result<Vec<Folder>, Error> {
    Ok(db.root_folders(library_id)?)
}

pub fn child_folders(db: &Database, folder_id: i64) -> Result<Vec<Folder>, Error> {
    if db.get_folder(folder_id)?.is_none() {
        return Err(Error::not_found("folder", folder_id));
    }
    Ok(db.child_folders(folder_id)?)
}

/// Breadcrumbs from the top-level folder down to and including `folder_id`.
pub fn ancestor_chain(db: &Database, folder_id: i64) -> Result<Vec<Folder>, Error> {
    let folder = db
        .get_folder(folder_id)?
        .ok_or_else(|| Error::not_found("folder", folder_id))?;
    Ok(db.folders_by_paths(folder.library_id, &path_chain(&folder.path))?)
}

/// Find a folder by its library-relative path.
pub fn folder_at_path(db: &Database, library_id: i64, path: &str) -> Result<Folder, Error> {
    let path = super::path::normalize_folder_path(path)?;
    db.get_folder_by_path(library_id, &path)?
        .ok_or_else(|| Error::not_found("folder", path))
}

/// Files directly in a folder, or anywhere below it when `recursive`.
pub fn files_in_folder(
    db: &Database,
    folder_id: i64,
    recursive: bool,
) -> Result<Vec<CatalogFile>, Error> {
    let folder = db
        .get_folder(folder_id)?
        .ok_or_else(|| Error::not_found("folder", folder_id))?;
    Ok(db.files_in_folder(&folder, recursive)?)
}

/// The folder and its descendants at most `max_depth` levels below it.
pub fn folder_subtree(db: &Database, folder_id: i64, max_depth: i64) -> Result<FolderNode, Error> {
    let root = db
        .get_folder(folder_id)?
        .ok_or_else(|| Error::not_found("folder", folder_id))?;

    let limit = root.depth.saturating_add(max_depth.max(0));
    let descendants = db.descendant_folders(root.library_id, &root.path, limit)?;

    let mut by_parent: HashMap<i64, Vec<Folder>> = HashMap::new();
    for folder in descendants {
        if let Some(parent_id) = folder.parent_id {
            by_parent.entry(parent_id).or_default().push(folder);
        }
    }

    Ok(build_node(root, &mut by_parent))
}

fn build_node(folder: Folder, by_parent: &mut HashMap<i64, Vec<Folder>>) -> FolderNode {
    let mut children: Vec<FolderNode> = by_parent
        .remove(&folder.id)
        .unwrap_or_default()
        .into_iter()
        .map(|child| build_node(child, by_parent))
        .collect();
    children.sort_by(|a, b| a.folder.name.cmp(&b.folder.name));
    FolderNode { folder, children }
}
