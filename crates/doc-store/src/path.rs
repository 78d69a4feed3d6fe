//! Slash-separated document and collection paths.

use crate::{StoreError, StoreResult};

fn segments(path: &str) -> Vec<&str> {
    path.trim_matches('/').split('/').collect()
}

fn check_segments(path: &str, parts: &[&str]) -> StoreResult<()> {
    if parts.iter().any(|s| s.is_empty()) {
        return Err(StoreError::InvalidPath(format!("empty segment in '{}'", path)));
    }
    Ok(())
}

/// A document path has an even number of segments (`posts/p1`).
pub fn validate_document_path(path: &str) -> StoreResult<()> {
    let parts = segments(path);
    check_segments(path, &parts)?;
    if parts.len() % 2 != 0 {
        return Err(StoreError::InvalidPath(format!(
            "'{}' is not a document path",
            path
        )));
    }
    Ok(())
}

/// A collection path has an odd number of segments (`posts`, `posts/p1/comments`).
pub fn validate_collection_path(path: &str) -> StoreResult<()> {
    let parts = segments(path);
    check_segments(path, &parts)?;
    if parts.len() % 2 != 1 {
        return Err(StoreError::InvalidPath(format!(
            "'{}' is not a collection path",
            path
        )));
    }
    Ok(())
}

/// Last segment of a document path.
pub fn document_id(path: &str) -> StoreResult<String> {
    validate_document_path(path)?;
    Ok(segments(path).last().map(|s| s.to_string()).unwrap_or_default())
}

/// Parent collection of a document path.
pub fn collection_of(path: &str) -> StoreResult<String> {
    validate_document_path(path)?;
    let parts = segments(path);
    Ok(parts[..parts.len() - 1].join("/"))
}

pub fn join_path(collection: &str, id: &str) -> String {
    format!("{}/{}", collection.trim_matches('/'), id)
}
