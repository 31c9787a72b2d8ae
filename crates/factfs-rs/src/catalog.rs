//! The in-memory catalog: a typed directory tree decoded from the FACT's
//! JSON document.
//!
//! Schema checking happens once, at the decode boundary. Everything past
//! `Catalog::decode` works on the typed tree; a catalog that fails to decode
//! is never written back to the image.
//!
//! On-disk document shape:
//!
//! ```json
//! {
//!   "filesystem_info": { "size": 4096 },
//!   "attributes": { "date_created": 0, "date_modified": 0,
//!                   "date_accessed": 0, "permissions": "755" },
//!   "contents": [
//!     { "name": "notes.txt", "is_dir": false, "attributes": { ... },
//!       "file_size": 5, "allocation": [ { "from": 3, "length": 1 } ] },
//!     { "name": "sub", "is_dir": true, "attributes": { ... },
//!       "contents": [ ... ] }
//!   ]
//! }
//! ```

use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::{Value, json};

use crate::error::{FsError, Result};

/// Default permissions for directory nodes missing their attributes.
pub const DIR_PERMISSIONS: &str = "755";
/// Default permissions for file nodes missing their attributes.
pub const FILE_PERMISSIONS: &str = "644";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Attributes {
    pub date_created: i64,
    pub date_modified: i64,
    pub date_accessed: i64,
    /// Three-digit octal string, e.g. `"644"`.
    pub permissions: String,
}

impl Attributes {
    #[must_use]
    pub fn new(now: i64, permissions: &str) -> Self {
        Self {
            date_created: now,
            date_modified: now,
            date_accessed: now,
            permissions: permissions.to_string(),
        }
    }

    /// Permission bits parsed from the octal string, falling back to the
    /// node-kind default when the stored string is not octal.
    #[must_use]
    pub fn mode(&self, is_dir: bool) -> u32 {
        u32::from_str_radix(&self.permissions, 8)
            .unwrap_or(if is_dir { 0o755 } else { 0o644 })
    }
}

/// A contiguous run of blocks assigned to a file. Extents concatenate in
/// list order to form the file's data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Extent {
    pub from: u64,
    pub length: u64,
}

impl Extent {
    pub fn blocks(&self) -> impl Iterator<Item = u64> + use<> {
        self.from..self.from.saturating_add(self.length)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    Directory {
        name: String,
        attrs: Attributes,
        contents: Vec<Node>,
    },
    File {
        name: String,
        attrs: Attributes,
        size: u64,
        allocation: Vec<Extent>,
    },
}

impl Node {
    #[must_use]
    pub fn new_directory(name: &str, now: i64) -> Self {
        Self::Directory {
            name: name.to_string(),
            attrs: Attributes::new(now, DIR_PERMISSIONS),
            contents: Vec::new(),
        }
    }

    #[must_use]
    pub fn new_file(name: &str, now: i64) -> Self {
        Self::File {
            name: name.to_string(),
            attrs: Attributes::new(now, FILE_PERMISSIONS),
            size: 0,
            allocation: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Directory { name, .. } | Self::File { name, .. } => name,
        }
    }

    pub fn set_name(&mut self, new_name: &str) {
        match self {
            Self::Directory { name, .. } | Self::File { name, .. } => {
                *name = new_name.to_string();
            }
        }
    }

    #[must_use]
    pub const fn is_dir(&self) -> bool {
        matches!(self, Self::Directory { .. })
    }

    #[must_use]
    pub const fn attrs(&self) -> &Attributes {
        match self {
            Self::Directory { attrs, .. } | Self::File { attrs, .. } => attrs,
        }
    }

    pub const fn attrs_mut(&mut self) -> &mut Attributes {
        match self {
            Self::Directory { attrs, .. } | Self::File { attrs, .. } => attrs,
        }
    }
}

/// The decoded FACT document: filesystem info plus the directory tree. The
/// root is always a `Node::Directory` whose name is empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Catalog {
    pub fs_size: u64,
    pub root: Node,
}

impl Catalog {
    /// A fresh catalog with an empty root directory, as written by mkfs.
    #[must_use]
    pub fn empty(fs_size: u64, now: i64) -> Self {
        Self {
            fs_size,
            root: Node::new_directory("", now),
        }
    }

    /// Parses and validates the on-disk JSON document.
    ///
    /// Missing attribute objects are synthesized with defaults in place;
    /// a present attribute of the wrong type fails with an error naming the
    /// node and field. Duplicate names within one directory are rejected.
    ///
    /// # Errors
    /// Returns `Schema` describing the first violation found.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let doc: Value = serde_json::from_slice(bytes)
            .map_err(|e| FsError::Schema(format!("catalog is not valid JSON: {e}")))?;

        let fs_info = doc.get("filesystem_info");
        let fs_size = fs_info
            .and_then(|info| info.get("size"))
            .and_then(Value::as_u64)
            .ok_or_else(|| FsError::Schema("filesystem_info.size is missing or not a number".into()))?;

        let attrs = decode_attributes(&doc, "/", true)?;
        let contents = decode_contents(&doc, "/")?;
        Ok(Self {
            fs_size,
            root: Node::Directory {
                name: String::new(),
                attrs,
                contents,
            },
        })
    }

    /// Serializes the catalog back to its on-disk JSON document.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let Node::Directory { attrs, contents, .. } = &self.root else {
            unreachable!("catalog root is always a directory");
        };
        let doc = json!({
            "filesystem_info": { "size": self.fs_size },
            "attributes": attrs,
            "contents": contents.iter().map(encode_node).collect::<Vec<_>>(),
        });
        doc.to_string().into_bytes()
    }

    /// Every block referenced by some file's allocation extents. The engine
    /// unions this with the FACT chain to rebuild the used-block set.
    #[must_use]
    pub fn used_blocks(&self) -> BTreeSet<u64> {
        let mut used = BTreeSet::new();
        collect_used(&self.root, &mut used);
        used
    }

    /// Resolves an absolute path to a node. Empty components (leading,
    /// doubled, or trailing slashes) are ignored; `/` resolves to the root.
    #[must_use]
    pub fn lookup(&self, path: &str) -> Option<&Node> {
        self.lookup_components(&components(path))
    }

    #[must_use]
    pub fn lookup_components(&self, comps: &[&str]) -> Option<&Node> {
        let mut current = &self.root;
        for comp in comps {
            let Node::Directory { contents, .. } = current else {
                // A file cannot appear mid-path.
                return None;
            };
            current = contents.iter().find(|n| n.name() == *comp)?;
        }
        Some(current)
    }

    pub fn lookup_components_mut(&mut self, comps: &[&str]) -> Option<&mut Node> {
        let mut current = &mut self.root;
        for comp in comps {
            let Node::Directory { contents, .. } = current else {
                return None;
            };
            current = contents.iter_mut().find(|n| n.name() == *comp)?;
        }
        Some(current)
    }

    pub fn lookup_mut(&mut self, path: &str) -> Option<&mut Node> {
        self.lookup_components_mut(&components(path))
    }

    /// The mutable entry list of the directory at `comps`.
    ///
    /// # Errors
    /// `NotFound` when the path does not resolve, `NotADirectory` when it
    /// resolves to a file.
    pub fn dir_contents_mut(&mut self, comps: &[&str]) -> Result<&mut Vec<Node>> {
        match self.lookup_components_mut(comps) {
            None => Err(FsError::NotFound),
            Some(Node::File { .. }) => Err(FsError::NotADirectory),
            Some(Node::Directory { contents, .. }) => Ok(contents),
        }
    }
}

/// Splits an absolute path into its non-empty components.
#[must_use]
pub fn components(path: &str) -> Vec<&str> {
    path.split('/').filter(|c| !c.is_empty()).collect()
}

/// Splits a path into parent components and basename.
///
/// # Errors
/// `InvalidArgument` for the root path, which has no parent.
pub fn split_parent(path: &str) -> Result<(Vec<&str>, &str)> {
    let mut comps = components(path);
    let name = comps
        .pop()
        .ok_or_else(|| FsError::InvalidArgument(format!("path {path} has no basename")))?;
    Ok((comps, name))
}

fn collect_used(node: &Node, used: &mut BTreeSet<u64>) {
    match node {
        Node::Directory { contents, .. } => {
            for child in contents {
                collect_used(child, used);
            }
        }
        Node::File { allocation, .. } => {
            for extent in allocation {
                used.extend(extent.blocks());
            }
        }
    }
}

fn encode_node(node: &Node) -> Value {
    match node {
        Node::Directory {
            name,
            attrs,
            contents,
        } => json!({
            "name": name,
            "is_dir": true,
            "attributes": attrs,
            "contents": contents.iter().map(encode_node).collect::<Vec<_>>(),
        }),
        Node::File {
            name,
            attrs,
            size,
            allocation,
        } => json!({
            "name": name,
            "is_dir": false,
            "attributes": attrs,
            "file_size": size,
            "allocation": allocation,
        }),
    }
}

fn decode_contents(dir: &Value, dir_name: &str) -> Result<Vec<Node>> {
    let mut nodes = Vec::new();
    let Some(items) = dir.get("contents").and_then(Value::as_array) else {
        return Ok(nodes);
    };

    let mut names = BTreeSet::new();
    for item in items {
        let node = decode_node(item)?;
        if !names.insert(node.name().to_string()) {
            return Err(FsError::Schema(format!(
                "duplicate name {} in directory {dir_name}",
                node.name()
            )));
        }
        nodes.push(node);
    }
    Ok(nodes)
}

fn decode_node(item: &Value) -> Result<Node> {
    let name = item
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| FsError::Schema("item without a string name".into()))?
        .to_string();
    let is_dir = item
        .get("is_dir")
        .and_then(Value::as_bool)
        .ok_or_else(|| FsError::Schema(format!("is_dir of item {name} is not a boolean")))?;

    let attrs = decode_attributes(item, &name, is_dir)?;

    if is_dir {
        let contents = decode_contents(item, &name)?;
        return Ok(Node::Directory {
            name,
            attrs,
            contents,
        });
    }

    let size = item
        .get("file_size")
        .and_then(Value::as_u64)
        .ok_or_else(|| FsError::Schema(format!("file_size of file {name} is not a valid number")))?;
    let allocation = decode_allocation(item, &name)?;
    Ok(Node::File {
        name,
        attrs,
        size,
        allocation,
    })
}

fn decode_attributes(item: &Value, name: &str, is_dir: bool) -> Result<Attributes> {
    let Some(attrs) = item.get("attributes").and_then(Value::as_object) else {
        // All attributes missing is not an error; synthesize defaults.
        return Ok(Attributes::new(
            0,
            if is_dir { DIR_PERMISSIONS } else { FILE_PERMISSIONS },
        ));
    };

    let timestamp = |field: &str| -> Result<i64> {
        attrs.get(field).and_then(Value::as_i64).ok_or_else(|| {
            FsError::Schema(format!(
                "attribute {field} of item {name} is not of a valid type"
            ))
        })
    };
    let permissions = attrs
        .get("permissions")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            FsError::Schema(format!(
                "attribute permissions of item {name} is not of a valid type"
            ))
        })?;

    Ok(Attributes {
        date_created: timestamp("date_created")?,
        date_modified: timestamp("date_modified")?,
        date_accessed: timestamp("date_accessed")?,
        permissions: permissions.to_string(),
    })
}

fn decode_allocation(item: &Value, name: &str) -> Result<Vec<Extent>> {
    let Some(entries) = item.get("allocation") else {
        return Ok(Vec::new());
    };
    let Some(entries) = entries.as_array() else {
        return Err(FsError::Schema(format!(
            "allocation of file {name} is not a list"
        )));
    };

    let mut allocation = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let from = entry.get("from").and_then(Value::as_u64).ok_or_else(|| {
            FsError::Schema(format!(
                "`from` field of allocation at index {index} of file {name} is not a valid number"
            ))
        })?;
        let length = entry.get("length").and_then(Value::as_u64).ok_or_else(|| {
            FsError::Schema(format!(
                "`length` field of allocation at index {index} of file {name} is not a valid number"
            ))
        })?;
        allocation.push(Extent { from, length });
    }
    Ok(allocation)
}
