//! Content-addressed snapshot of a directory tree and a node-by-node diff.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use sha2::Digest;

pub type Hash = [u8; 32];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node {
    pub name: String,
    pub path: PathBuf,
    /// File: sha256 of the bytes. Directory: sha256 over child names and hashes.
    pub hash: Hash,
    /// `None` for files. Sorted by name.
    pub children: Option<Vec<Node>>,
}

impl Node {
    pub fn is_dir(&self) -> bool {
        self.children.is_some()
    }

    pub fn child(&self, name: &str) -> Option<&Node> {
        self.children.as_ref()?.iter().find(|c| c.name == name)
    }
}

/// Dotfiles (editor swap files and the like) are not part of the tree.
pub fn build(root: &Path) -> anyhow::Result<Node> {
    let name = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    build_node(root, name)
}

fn build_node(path: &Path, name: String) -> anyhow::Result<Node> {
    let meta = std::fs::metadata(path).with_context(|| format!("stat {}", path.display()))?;
    if !meta.is_dir() {
        let bytes = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
        return Ok(Node {
            name,
            path: path.to_path_buf(),
            hash: sha2::Sha256::digest(&bytes).into(),
            children: None,
        });
    }

    let mut children = Vec::new();
    for ent in std::fs::read_dir(path).with_context(|| format!("read dir {}", path.display()))? {
        let ent = ent.with_context(|| format!("read dir {}", path.display()))?;
        let child_name = ent.file_name().to_string_lossy().into_owned();
        if child_name.starts_with('.') {
            continue;
        }
        children.push(build_node(&ent.path(), child_name)?);
    }
    children.sort_by(|a, b| a.name.cmp(&b.name));

    let mut h = sha2::Sha256::new();
    for c in &children {
        h.update(c.name.as_bytes());
        h.update([0u8]);
        h.update(c.hash);
    }
    Ok(Node {
        name,
        path: path.to_path_buf(),
        hash: h.finalize().into(),
        children: Some(children),
    })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Change {
    Unchanged,
    Added,
    Removed,
    Changed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diff {
    pub name: String,
    pub path: PathBuf,
    pub change: Change,
    pub is_dir: bool,
    /// Directories list every child. Added and removed subtrees carry the
    /// same change all the way down.
    pub children: Vec<Diff>,
}

impl Diff {
    pub fn child(&self, name: &str) -> Option<&Diff> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn is_unchanged(&self) -> bool {
        self.change == Change::Unchanged
    }
}

fn whole(node: &Node, change: Change) -> Diff {
    Diff {
        name: node.name.clone(),
        path: node.path.clone(),
        change,
        is_dir: node.is_dir(),
        children: node
            .children
            .iter()
            .flatten()
            .map(|c| whole(c, change))
            .collect(),
    }
}

pub fn compare(old: &Node, new: &Node) -> Diff {
    if old.hash == new.hash && old.is_dir() == new.is_dir() {
        return whole(new, Change::Unchanged);
    }
    let (Some(old_children), Some(new_children)) = (&old.children, &new.children) else {
        return Diff {
            name: new.name.clone(),
            path: new.path.clone(),
            change: Change::Changed,
            is_dir: new.is_dir(),
            children: Vec::new(),
        };
    };

    let mut names: BTreeMap<&str, (Option<&Node>, Option<&Node>)> = BTreeMap::new();
    for c in old_children {
        names.entry(c.name.as_str()).or_default().0 = Some(c);
    }
    for c in new_children {
        names.entry(c.name.as_str()).or_default().1 = Some(c);
    }

    let children = names
        .into_values()
        .filter_map(|pair| match pair {
            (Some(o), Some(n)) => Some(compare(o, n)),
            (Some(o), None) => Some(whole(o, Change::Removed)),
            (None, Some(n)) => Some(whole(n, Change::Added)),
            (None, None) => None,
        })
        .collect();

    Diff {
        name: new.name.clone(),
        path: new.path.clone(),
        change: Change::Changed,
        is_dir: true,
        children,
    }
}
