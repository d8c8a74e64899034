use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use folio_types::error::{FolioError, Result};
use folio_types::SnapshotId;

use super::{split_tree_path, ChildKind, ContentStore, TreeChild};

const OBJECTS_DIR: &str = "objects";

/// Leading tag byte of every stored object. Part of the hashed bytes, so a
/// blob can never collide with a tree node of identical encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum ObjectTag {
    Blob = 1,
    Tree = 2,
}

impl ObjectTag {
    fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(Self::Blob),
            2 => Some(Self::Tree),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TreeNode {
    entries: Vec<NodeEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct NodeEntry {
    name: String,
    kind: ChildKind,
    id: SnapshotId,
    size: u64,
}

/// Reference content-addressed store on the local filesystem.
///
/// Blobs and tree nodes live at `objects/<shard>/<id>`; ids are BLAKE2b-256
/// over the tagged object bytes, so identical trees share one id.
pub struct LocalContentStore {
    root: PathBuf,
}

impl LocalContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join(OBJECTS_DIR))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, id: &SnapshotId) -> Result<PathBuf> {
        if !id.is_well_formed() {
            return Err(FolioError::NotFound(format!("object '{id}'")));
        }
        Ok(self
            .root
            .join(OBJECTS_DIR)
            .join(id.shard_prefix())
            .join(id.as_str()))
    }

    fn write_object(&self, tag: ObjectTag, payload: &[u8]) -> Result<SnapshotId> {
        let mut data = Vec::with_capacity(payload.len() + 1);
        data.push(tag as u8);
        data.extend_from_slice(payload);
        let id = SnapshotId::digest(&data);

        let path = self.object_path(&id)?;
        if path.exists() {
            return Ok(id);
        }
        let dir = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&data)?;
        tmp.persist(&path).map_err(|e| e.error)?;
        Ok(id)
    }

    fn read_object(&self, id: &SnapshotId) -> Result<(ObjectTag, Vec<u8>)> {
        let path = self.object_path(id)?;
        let mut data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(FolioError::NotFound(format!("object '{id}'")));
            }
            Err(e) => return Err(e.into()),
        };
        if data.is_empty() {
            return Err(FolioError::Corrupt(format!("object '{id}' is empty")));
        }
        let tag = ObjectTag::from_u8(data[0])
            .ok_or_else(|| FolioError::Corrupt(format!("object '{id}' has unknown tag {}", data[0])))?;
        data.remove(0);
        Ok((tag, data))
    }

    fn read_tree(&self, id: &SnapshotId) -> Result<TreeNode> {
        match self.read_object(id)? {
            (ObjectTag::Tree, payload) => rmp_serde::from_slice(&payload)
                .map_err(|e| FolioError::Corrupt(format!("tree node '{id}': {e}"))),
            (ObjectTag::Blob, _) => Err(FolioError::Corrupt(format!(
                "object '{id}' is a file, expected a tree"
            ))),
        }
    }

    /// Store `dir` recursively, returning its node id and total file bytes.
    fn store_dir(&self, dir: &Path) -> Result<(SnapshotId, u64)> {
        let mut entries = Vec::new();
        for dirent in fs::read_dir(dir)? {
            let dirent = dirent?;
            let name = dirent.file_name().into_string().map_err(|raw| {
                FolioError::InvalidRequest(format!("non UTF-8 file name {raw:?}"))
            })?;
            let file_type = dirent.file_type()?;
            let (kind, id, size) = if file_type.is_dir() {
                let (id, size) = self.store_dir(&dirent.path())?;
                (ChildKind::Directory, id, size)
            } else if file_type.is_file() {
                let data = fs::read(dirent.path())?;
                let size = data.len() as u64;
                (ChildKind::File, self.write_object(ObjectTag::Blob, &data)?, size)
            } else {
                debug!(path = %dirent.path().display(), "skipping special file");
                continue;
            };
            entries.push(NodeEntry {
                name,
                kind,
                id,
                size,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        let total = entries.iter().map(|e| e.size).sum();

        let encoded = rmp_serde::to_vec(&TreeNode { entries })
            .map_err(|e| FolioError::Corrupt(format!("encode tree node: {e}")))?;
        Ok((self.write_object(ObjectTag::Tree, &encoded)?, total))
    }

    fn materialize(&self, id: &SnapshotId, dest: &Path) -> Result<()> {
        fs::create_dir_all(dest)?;
        for entry in self.read_tree(id)?.entries {
            if split_tree_path(&entry.name).map_or(true, |p| p.len() != 1) {
                return Err(FolioError::Corrupt(format!(
                    "tree node '{id}' has unsafe entry name '{}'",
                    entry.name
                )));
            }
            let path = dest.join(&entry.name);
            match entry.kind {
                ChildKind::Directory => self.materialize(&entry.id, &path)?,
                ChildKind::File => match self.read_object(&entry.id)? {
                    (ObjectTag::Blob, data) => fs::write(&path, data)?,
                    (ObjectTag::Tree, _) => {
                        return Err(FolioError::Corrupt(format!(
                            "entry '{}' in '{id}' points at a tree",
                            entry.name
                        )))
                    }
                },
            }
        }
        Ok(())
    }
}

impl ContentStore for LocalContentStore {
    fn put_tree(&self, root: &Path) -> Result<SnapshotId> {
        let (id, size) = self.store_dir(root)?;
        debug!(snapshot = %id, bytes = size, "stored tree");
        Ok(id)
    }

    fn get_tree(&self, id: &SnapshotId, dest: &Path) -> Result<PathBuf> {
        let root = dest.join(id.as_str());
        self.materialize(id, &root)?;
        Ok(root)
    }

    fn list_children(&self, id: &SnapshotId) -> Result<Vec<TreeChild>> {
        match self.read_object(id)? {
            (ObjectTag::Blob, _) => Ok(Vec::new()),
            (ObjectTag::Tree, _) => Ok(self
                .read_tree(id)?
                .entries
                .into_iter()
                .map(|e| TreeChild {
                    name: e.name,
                    id: e.id,
                    kind: e.kind,
                    size: e.size,
                })
                .collect()),
        }
    }

    fn read_file(&self, id: &SnapshotId, path: &str) -> Result<Option<Vec<u8>>> {
        let Some(parts) = split_tree_path(path) else {
            return Ok(None);
        };
        let Some((file_name, dirs)) = parts.split_last() else {
            return Ok(None);
        };

        let mut node = self.read_tree(id)?;
        for dir in dirs {
            let next = node
                .entries
                .iter()
                .find(|e| e.name == *dir && e.kind == ChildKind::Directory)
                .map(|e| e.id.clone());
            match next {
                Some(next) => node = self.read_tree(&next)?,
                None => return Ok(None),
            }
        }

        let Some(entry) = node
            .entries
            .iter()
            .find(|e| e.name == *file_name && e.kind == ChildKind::File)
        else {
            return Ok(None);
        };
        match self.read_object(&entry.id)? {
            (ObjectTag::Blob, data) => Ok(Some(data)),
            (ObjectTag::Tree, _) => Err(FolioError::Corrupt(format!(
                "entry '{path}' in '{id}' points at a tree"
            ))),
        }
    }
}
