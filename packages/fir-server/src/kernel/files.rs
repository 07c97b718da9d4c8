//! Directory listing of downloaded artifacts.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

/// One node of the download tree returned by the files endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum FileNode {
    #[serde(rename = "directory")]
    Directory { name: String, children: Vec<FileNode> },
    #[serde(rename = "file")]
    File { name: String, size: u64 },
}

impl FileNode {
    pub fn name(&self) -> &str {
        match self {
            FileNode::Directory { name, .. } | FileNode::File { name, .. } => name,
        }
    }
}

/// Walk the download root into a tree. Returns an empty listing when the
/// root does not exist yet (nothing downloaded so far).
pub async fn download_tree(root: &Path) -> Result<Vec<FileNode>> {
    let root = root.to_path_buf();
    tokio::task::spawn_blocking(move || {
        if !root.exists() {
            return Ok(Vec::new());
        }
        walk(&root)
    })
    .await
    .context("file tree task panicked")?
}

fn walk(dir: &Path) -> Result<Vec<FileNode>> {
    let mut nodes = Vec::new();
    let mut entries: Vec<_> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read {}", dir.display()))?
        .collect::<std::io::Result<_>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let name = entry.file_name().to_string_lossy().into_owned();
        let metadata = entry.metadata()?;
        if metadata.is_dir() {
            nodes.push(FileNode::Directory {
                children: walk(&entry.path())?,
                name,
            });
        } else {
            nodes.push(FileNode::File {
                name,
                size: metadata.len(),
            });
        }
    }
    Ok(nodes)
}
