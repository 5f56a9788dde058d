//! # Work tree — presentation layer over the mutation tree (C5, spec.md §4.5)
//!
//! Where [`crate::diskarc`] models physical nesting and commit propagation, `WorkTreeNode`
//! models what a browser UI shows: one node per archive entry, disk-image partition, or
//! file-system directory entry, lazily expanded according to a depth policy so a ZIP full of
//! ZIPs doesn't eagerly open every nested container.

use std::collections::HashSet;

use crate::attribs::FileAttribs;
use crate::capability::{ChildKind, DaObjectKind, DepthPolicy, ParentKind};
use crate::error::CoreError;
use crate::hook::{AppHook, LogLevel};

/// A node's health, derived from the library object's `dubious` flag, warning count, and
/// error count (spec.md §4.5 "post-open classification").
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum NodeStatus {
    /// Not yet classified (a container not yet opened).
    Unknown,
    /// Readable, and its kind (if a container) matches its file extension/type, with no
    /// warnings or errors reported.
    Ok,
    /// The library object flagged itself dubious (e.g. a `.zip` that isn't actually a ZIP,
    /// or content that parsed but looks inconsistent).
    Dubious,
    /// Parsed, but the library object reported one or more non-fatal warnings.
    Warning,
    /// Looked like a container by name/type, but the bytes didn't parse as one at all, or
    /// the library object reported one or more fatal errors.
    Error,
    /// An ordinary file; no further descent is possible.
    Leaf,
}

/// Derives a node's [`NodeStatus`] from the library object's diagnostic counters (spec.md
/// §4.5, §11): any error wins outright, then a dubious flag, then a plain warning count,
/// else `Ok`.
pub fn classify_from_diagnostics(dubious: bool, warnings: usize, errors: usize) -> NodeStatus {
    if errors > 0 {
        NodeStatus::Error
    } else if dubious {
        NodeStatus::Dubious
    } else if warnings > 0 {
        NodeStatus::Warning
    } else {
        NodeStatus::Ok
    }
}

/// One node in the presentation tree (spec.md §3 `WorkTreeNode`).
pub struct WorkTreeNode {
    pub label: String,
    pub attribs: Option<FileAttribs>,
    pub kind: Option<DaObjectKind>,
    pub status: NodeStatus,
    pub children: Vec<WorkTreeNode>,
    /// Whether this node's children have been discovered yet (lazy expansion).
    pub expanded: bool,
}

impl WorkTreeNode {
    pub fn leaf(label: impl Into<String>, attribs: FileAttribs) -> Self {
        Self {
            label: label.into(),
            attribs: Some(attribs),
            kind: None,
            status: NodeStatus::Leaf,
            children: Vec::new(),
            expanded: true,
        }
    }

    pub fn container(label: impl Into<String>, kind: DaObjectKind) -> Self {
        Self {
            label: label.into(),
            attribs: None,
            kind: Some(kind),
            status: NodeStatus::Unknown,
            children: Vec::new(),
            expanded: false,
        }
    }

    /// True if this node or any descendant needs a commit propagated (placeholder for a
    /// dirty flag plugged in by the owning [`crate::diskarc::DiskArcTree`]; the CORE tracks
    /// modification at the `DiskArcNode` level, not here, so this always walks children).
    pub fn iter_depth_first(&self) -> Vec<&WorkTreeNode> {
        let mut out = vec![self];
        for child in &self.children {
            out.extend(child.iter_depth_first());
        }
        out
    }

    /// Health check: walks the tree and verifies every node reachable from the root has a
    /// consistent status and no orphaned expansion state (spec.md §4.5 "Health check",
    /// §8 property 3/4). Returns one message per problem found.
    pub fn health_check(&self) -> Vec<String> {
        let mut issues = Vec::new();
        self.health_check_into(&mut issues, &self.label);
        issues
    }

    fn health_check_into(&self, issues: &mut Vec<String>, path: &str) {
        if self.expanded && self.kind.is_some() && self.status == NodeStatus::Error && !self.children.is_empty() {
            issues.push(format!("{path}: errored node reports children"));
        }
        if !self.expanded && !self.children.is_empty() {
            issues.push(format!("{path}: unexpanded node has children"));
        }
        for child in &self.children {
            self.health_check_into_child(issues, path, child);
        }
    }

    fn health_check_into_child(&self, issues: &mut Vec<String>, parent_path: &str, child: &WorkTreeNode) {
        let path = format!("{parent_path}/{}", child.label);
        child.health_check_into(issues, &path);
    }
}

/// Extensions recognized as "this looks like an archive/disk image by name" for the
/// mismatch/damaged classification (spec.md §4.5 "child identification").
const ARCHIVE_EXTENSIONS: &[&str] = &["zip", "shk", "sdk", "bxy", "bqy", "gz"];
const DISK_IMAGE_EXTENSIONS: &[&str] = &["dsk", "po", "do", "2mg", "woz", "nib", "hdv"];

fn extension_of(name: &str) -> Option<String> {
    name.rsplit('.').next().map(|s| s.to_ascii_lowercase()).filter(|_| name.contains('.'))
}

/// Determines what kind of child a leaf's name/type suggests it might be, for the depth
/// policy to weigh in on before anything is actually opened (spec.md §4.5).
pub fn guess_child_kind(name: &str) -> ChildKind {
    match extension_of(name) {
        Some(ext) if ARCHIVE_EXTENSIONS.contains(&ext.as_str()) => ChildKind::FileArchive,
        Some(ext) if DISK_IMAGE_EXTENSIONS.contains(&ext.as_str()) => ChildKind::DiskImage,
        _ => ChildKind::AnyFile,
    }
}

/// Runs a depth policy over a (parent, candidate-child) pair; `known_parent_kinds` lets
/// callers special-case e.g. a `.gz`-in-`.gz` bomb without walking the policy twice.
pub fn should_descend(policy: DepthPolicy, parent: ParentKind, child_name: &str) -> bool {
    policy(parent, guess_child_kind(child_name))
}

/// Classifies a node immediately after an attempted open (spec.md §4.5 "post-open
/// classification"): did the bytes parse as the kind the name suggested?
pub fn classify_after_open(
    name: &str,
    parse_succeeded: bool,
    actual_kind: Option<DaObjectKind>,
) -> NodeStatus {
    let guessed = guess_child_kind(name);
    let guessed_is_container = !matches!(guessed, ChildKind::AnyFile);
    match (guessed_is_container, parse_succeeded, actual_kind) {
        (false, _, None) => NodeStatus::Leaf,
        (true, false, _) => NodeStatus::Error,
        (true, true, Some(kind)) => {
            let expected_archive = matches!(guessed, ChildKind::FileArchive) && kind == DaObjectKind::Archive;
            let expected_disk = matches!(guessed, ChildKind::DiskImage) && kind == DaObjectKind::DiskImage;
            if expected_archive || expected_disk {
                NodeStatus::Ok
            } else {
                NodeStatus::Dubious
            }
        }
        _ => NodeStatus::Leaf,
    }
}

/// Detects a guaranteed-infinite descent (a self-referential embedded volume, or depth past
/// any sane limit) so expansion can refuse rather than loop forever (spec.md §8 "Boundary
/// behaviors": "descent into a maliciously/accidentally self-referential container must
/// terminate").
pub struct DescentGuard {
    seen_signatures: HashSet<String>,
    max_depth: usize,
}

impl DescentGuard {
    pub fn new(max_depth: usize) -> Self {
        Self { seen_signatures: HashSet::new(), max_depth }
    }

    /// `signature` should uniquely identify the bytes being descended into (e.g. a content
    /// hash); returns `Err` if this would exceed the depth limit or repeat a signature
    /// already on the current path.
    pub fn enter(&mut self, depth: usize, signature: String) -> Result<(), CoreError> {
        if depth > self.max_depth {
            return Err(CoreError::policy(format!("nesting depth {depth} exceeds limit {}", self.max_depth)));
        }
        if !self.seen_signatures.insert(signature) {
            return Err(CoreError::policy("self-referential container detected during descent"));
        }
        Ok(())
    }
}

/// Re-walks a node's children after an external mutation (a file added via a different
/// path into the same archive, for instance), discarding and rebuilding the expanded set
/// (spec.md §4.5 "reprocess").
pub fn reprocess<F>(node: &mut WorkTreeNode, hook: &dyn AppHook, mut rebuild: F) -> Result<(), CoreError>
where
    F: FnMut() -> Result<Vec<WorkTreeNode>, CoreError>,
{
    if !node.expanded {
        return Ok(());
    }
    hook.log(LogLevel::Info, &format!("reprocessing {}", node.label));
    node.children = rebuild()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guesses_child_kind_from_extension() {
        assert_eq!(guess_child_kind("game.zip"), ChildKind::FileArchive);
        assert_eq!(guess_child_kind("disk.2mg"), ChildKind::DiskImage);
        assert_eq!(guess_child_kind("readme.txt"), ChildKind::AnyFile);
        assert_eq!(guess_child_kind("noext"), ChildKind::AnyFile);
    }

    #[test]
    fn classifies_dubious_when_bytes_dont_match_name() {
        let status = classify_after_open("archive.zip", true, Some(DaObjectKind::DiskImage));
        assert_eq!(status, NodeStatus::Dubious);
    }

    #[test]
    fn classifies_error_when_parse_fails_on_expected_container() {
        let status = classify_after_open("archive.zip", false, None);
        assert_eq!(status, NodeStatus::Error);
    }

    #[test]
    fn classify_from_diagnostics_prioritizes_errors_over_dubious_and_warnings() {
        assert_eq!(classify_from_diagnostics(true, 3, 1), NodeStatus::Error);
        assert_eq!(classify_from_diagnostics(true, 3, 0), NodeStatus::Dubious);
        assert_eq!(classify_from_diagnostics(false, 3, 0), NodeStatus::Warning);
        assert_eq!(classify_from_diagnostics(false, 0, 0), NodeStatus::Ok);
    }

    #[test]
    fn classifies_leaf_for_ordinary_files() {
        let status = classify_after_open("readme.txt", false, None);
        assert_eq!(status, NodeStatus::Leaf);
    }

    #[test]
    fn descent_guard_rejects_repeat_signature() {
        let mut guard = DescentGuard::new(8);
        guard.enter(1, "sig-a".into()).unwrap();
        assert!(guard.enter(2, "sig-a".into()).is_err());
    }

    #[test]
    fn descent_guard_rejects_past_max_depth() {
        let mut guard = DescentGuard::new(2);
        assert!(guard.enter(3, "sig-b".into()).is_err());
    }

    #[test]
    fn health_check_flags_unexpanded_node_with_children() {
        let mut node = WorkTreeNode::container("root.zip", DaObjectKind::Archive);
        node.children.push(WorkTreeNode::leaf("a.txt", FileAttribs::new("a.txt")));
        let issues = node.health_check();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].contains("unexpanded"));
    }
}
