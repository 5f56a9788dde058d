//! # Clipboard transfer set (C9, spec.md §4.9)
//!
//! A clip operation (copy/cut within or across open archives) serializes a list of
//! [`ClipFileEntry`] records so the receiving side can lazily pull bytes back out of
//! whichever source produced them, without the host process needing to keep every fork's
//! bytes resident between the "copy" and "paste" gestures.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::attribs::FileAttribs;
use crate::capability::{Archive, EntryHandle, Part};
use crate::error::CoreError;
use crate::partsrc::PartSource;
use crate::workers::PreserveMode;

/// Sentinel for [`ClipFileEntry::output_length`] when the byte count at the destination
/// can't be known up front (spec.md §3, §4.9: a converter or a MacZip synthesis can change
/// the length between copy and paste).
pub const OUTPUT_LENGTH_UNKNOWN: i64 = -1;

/// One file on the clipboard: enough metadata to recreate it at the destination, plus a
/// pointer back to where its bytes can be re-read (spec.md §3, §4.9 `ClipFileEntry`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClipFileEntry {
    /// Name of the capability (`"archive"`, `"filesystem"`, ...) the entry came from, for a
    /// receiving side that supports more than one kind of source.
    pub fs_type: String,
    pub part: Part,
    pub attribs: FileAttribs,
    pub is_mac_zip_sidecar: bool,
    /// Path the entry would land at if extracted to a host directory, if that's how this
    /// entry is being carried; `None` for an in-process archive-to-archive transfer.
    pub extract_path: Option<String>,
    /// Byte length of the data this entry will produce at the destination, or
    /// [`OUTPUT_LENGTH_UNKNOWN`] when that can't be known until paste time.
    pub output_length: i64,
    /// Deterministic fingerprint of the entry's identity within its clip set, stable across
    /// the copy/paste gap even though `source_index` is only meaningful in-process.
    pub entry_hash: u64,
    pub preserve_mode: PreserveMode,
    /// Opaque index into the owning [`ClipFileSet`]'s source list; not meaningful outside
    /// the process that created it (spec.md §4.9: clip data does not cross process
    /// boundaries with live source handles).
    pub source_index: usize,
}

/// Computes a deterministic fingerprint for a clip entry from its path and position, so a
/// receiving side can recognize the "same" entry across the copy/paste gap without relying
/// on `source_index`, which is only meaningful within the process that created it.
pub fn compute_entry_hash(path: &str, source_index: usize) -> u64 {
    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    source_index.hash(&mut hasher);
    hasher.finish()
}

/// A full clipboard payload: the serializable entry list plus live lazy sources
/// (spec.md §4.9 `ClipFileSet`).
pub struct ClipFileSet {
    pub entries: Vec<ClipFileEntry>,
    sources: Vec<Box<dyn ClipFileSource>>,
}

/// Lazily produces a fork's bytes on demand; implementations wrap a still-open `Archive` or
/// a `FileSystem` file handle (spec.md §4.9 `ClipFileSource`).
pub trait ClipFileSource {
    fn read_data(&self) -> Result<Option<Vec<u8>>, CoreError>;
    fn read_rsrc(&self) -> Result<Option<Vec<u8>>, CoreError>;
}

/// A `ClipFileSource` that pulls from a live `Archive` entry.
pub struct ArchiveClipSource<'a> {
    pub archive: &'a dyn Archive,
    pub entry: EntryHandle,
}

impl<'a> ClipFileSource for ArchiveClipSource<'a> {
    fn read_data(&self) -> Result<Option<Vec<u8>>, CoreError> {
        read_optional_part(self.archive, &self.entry, Part::Data)
    }
    fn read_rsrc(&self) -> Result<Option<Vec<u8>>, CoreError> {
        read_optional_part(self.archive, &self.entry, Part::Rsrc)
    }
}

fn read_optional_part(archive: &dyn Archive, entry: &EntryHandle, part: Part) -> Result<Option<Vec<u8>>, CoreError> {
    match archive.open_part(entry, part) {
        Ok(mut r) => {
            let mut buf = Vec::new();
            std::io::Read::read_to_end(&mut r, &mut buf).map_err(CoreError::Fatal)?;
            Ok(Some(buf))
        }
        Err(_) => Ok(None),
    }
}

/// `ClipFileSource` variant that synthesizes a MacZip sidecar on demand instead of reading
/// one that already exists, for a destination that cannot hold a resource fork natively
/// (spec.md §4.9 `ClipFileSourceMZ`).
pub struct MacZipClipSource {
    pub attribs: FileAttribs,
    pub rsrc: Option<Vec<u8>>,
}

impl ClipFileSource for MacZipClipSource {
    fn read_data(&self) -> Result<Option<Vec<u8>>, CoreError> {
        Ok(None)
    }
    fn read_rsrc(&self) -> Result<Option<Vec<u8>>, CoreError> {
        Ok(Some(crate::adf::build(&self.attribs, None, self.rsrc.as_deref(), true)))
    }
}

impl ClipFileSet {
    pub fn new() -> Self {
        Self { entries: Vec::new(), sources: Vec::new() }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn push(
        &mut self,
        fs_type: impl Into<String>,
        part: Part,
        attribs: FileAttribs,
        is_mac_zip_sidecar: bool,
        extract_path: Option<String>,
        preserve_mode: PreserveMode,
        source: Box<dyn ClipFileSource>,
    ) {
        let source_index = self.sources.len();
        let entry_hash = compute_entry_hash(&attribs.full_path, source_index);
        self.sources.push(source);
        self.entries.push(ClipFileEntry {
            fs_type: fs_type.into(),
            part,
            attribs,
            is_mac_zip_sidecar,
            extract_path,
            output_length: OUTPUT_LENGTH_UNKNOWN,
            entry_hash,
            preserve_mode,
            source_index,
        });
    }

    pub fn source_for(&self, entry: &ClipFileEntry) -> Option<&dyn ClipFileSource> {
        self.sources.get(entry.source_index).map(|b| b.as_ref())
    }

    /// Builds the "xfer" list (spec.md §4.9 `xfer_entries`): every primary entry the
    /// destination can directly receive, skipping sidecars, which are folded back in by
    /// `foreign_entries` when the destination cannot represent resource forks natively.
    pub fn xfer_entries(&self) -> Vec<&ClipFileEntry> {
        self.entries.iter().filter(|e| !e.is_mac_zip_sidecar).collect()
    }

    /// Builds the "foreign" list (spec.md §4.9 `foreign_entries`): sidecars that must be
    /// synthesized fresh for a destination lacking native resource-fork support, rather than
    /// copied byte for byte, since the source's sidecar path won't exist at the destination.
    pub fn foreign_entries(&self, dest_has_rsrc_forks: bool) -> Vec<ClipFileEntry> {
        if dest_has_rsrc_forks {
            return Vec::new();
        }
        self.entries
            .iter()
            .filter(|e| !e.is_mac_zip_sidecar && e.attribs.has_rsrc_fork())
            .filter_map(|e| {
                crate::maczip::generate_mac_zip_name(&e.attribs.full_path).map(|sidecar_path| {
                    let mut sidecar_attribs = e.attribs.clone();
                    sidecar_attribs.full_path = sidecar_path.clone();
                    sidecar_attribs.filename_only =
                        sidecar_path.rsplit(['/', ':']).next().unwrap_or(&sidecar_path).to_string();
                    ClipFileEntry {
                        fs_type: e.fs_type.clone(),
                        part: Part::Rsrc,
                        entry_hash: compute_entry_hash(&sidecar_path, e.source_index),
                        attribs: sidecar_attribs,
                        is_mac_zip_sidecar: true,
                        extract_path: None,
                        output_length: OUTPUT_LENGTH_UNKNOWN,
                        preserve_mode: PreserveMode::Adf,
                        source_index: e.source_index,
                    }
                })
            })
            .collect()
    }

    /// Opens a [`PartSource`] over one entry's data fork, to feed directly into the Add
    /// worker at paste time.
    pub fn data_part_source(&self, entry: &ClipFileEntry) -> Result<Box<dyn PartSource>, CoreError> {
        let source = self
            .source_for(entry)
            .ok_or_else(|| CoreError::structural("clip entry source index out of range"))?;
        let bytes = source.read_data()?.unwrap_or_default();
        Ok(Box::new(crate::partsrc::MemoryBacked::new(bytes)))
    }

    pub fn rsrc_part_source(&self, entry: &ClipFileEntry) -> Result<Option<Box<dyn PartSource>>, CoreError> {
        let source = self
            .source_for(entry)
            .ok_or_else(|| CoreError::structural("clip entry source index out of range"))?;
        Ok(source.read_rsrc()?.map(|bytes| Box::new(crate::partsrc::MemoryBacked::new(bytes)) as Box<dyn PartSource>))
    }
}

impl Default for ClipFileSet {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializes a clip entry list to JSON, the wire format it takes when copy and paste are
/// different processes (spec.md §4.9) and live source handles can't follow along.
pub fn entries_to_json(entries: &[ClipFileEntry]) -> Result<String, CoreError> {
    serde_json::to_string(entries).map_err(|e| CoreError::structural(e.to_string()))
}

pub fn entries_from_json(json: &str) -> Result<Vec<ClipFileEntry>, CoreError> {
    serde_json::from_str(json).map_err(|e| CoreError::structural(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribs::DateField;

    struct FixedSource {
        data: Option<Vec<u8>>,
        rsrc: Option<Vec<u8>>,
    }
    impl ClipFileSource for FixedSource {
        fn read_data(&self) -> Result<Option<Vec<u8>>, CoreError> {
            Ok(self.data.clone())
        }
        fn read_rsrc(&self) -> Result<Option<Vec<u8>>, CoreError> {
            Ok(self.rsrc.clone())
        }
    }

    fn entry_with_rsrc(path: &str) -> FileAttribs {
        let mut a = FileAttribs::new(path);
        a.rsrc_length = 10;
        a.mod_when = DateField::Valid(1_000);
        a
    }

    #[test]
    fn xfer_entries_excludes_sidecars() {
        let mut set = ClipFileSet::new();
        set.push(
            "archive",
            Part::Data,
            FileAttribs::new("a.txt"),
            false,
            None,
            PreserveMode::None,
            Box::new(FixedSource { data: Some(b"x".to_vec()), rsrc: None }),
        );
        set.push(
            "archive",
            Part::Rsrc,
            FileAttribs::new("__MACOSX/._a.txt"),
            true,
            None,
            PreserveMode::Adf,
            Box::new(FixedSource { data: None, rsrc: Some(b"r".to_vec()) }),
        );
        assert_eq!(set.xfer_entries().len(), 1);
    }

    #[test]
    fn foreign_entries_empty_when_destination_supports_forks() {
        let mut set = ClipFileSet::new();
        set.push(
            "archive",
            Part::Data,
            entry_with_rsrc("a.txt"),
            false,
            None,
            PreserveMode::None,
            Box::new(FixedSource { data: Some(vec![]), rsrc: Some(vec![1]) }),
        );
        assert!(set.foreign_entries(true).is_empty());
    }

    #[test]
    fn foreign_entries_synthesizes_sidecar_when_destination_cannot() {
        let mut set = ClipFileSet::new();
        set.push(
            "archive",
            Part::Data,
            entry_with_rsrc("dir/a.txt"),
            false,
            None,
            PreserveMode::None,
            Box::new(FixedSource { data: Some(vec![]), rsrc: Some(vec![1, 2]) }),
        );
        let foreign = set.foreign_entries(false);
        assert_eq!(foreign.len(), 1);
        assert_eq!(foreign[0].attribs.full_path, "dir/__MACOSX/._a.txt");
        assert!(foreign[0].is_mac_zip_sidecar);
        assert_eq!(foreign[0].output_length, OUTPUT_LENGTH_UNKNOWN);
    }

    #[test]
    fn data_part_source_reads_through_live_source() {
        let mut set = ClipFileSet::new();
        set.push(
            "archive",
            Part::Data,
            FileAttribs::new("a.txt"),
            false,
            None,
            PreserveMode::None,
            Box::new(FixedSource { data: Some(b"hi".to_vec()), rsrc: None }),
        );
        let entry = set.entries[0].clone();
        let mut src = set.data_part_source(&entry).unwrap();
        src.open().unwrap();
        assert_eq!(crate::partsrc::read_to_end(src.as_mut()).unwrap(), b"hi");
    }

    #[test]
    fn entry_hash_is_deterministic_for_same_path_and_index() {
        assert_eq!(compute_entry_hash("a.txt", 0), compute_entry_hash("a.txt", 0));
        assert_ne!(compute_entry_hash("a.txt", 0), compute_entry_hash("b.txt", 0));
    }

    #[test]
    fn entries_round_trip_through_json() {
        let mut set = ClipFileSet::new();
        set.push(
            "archive",
            Part::Data,
            entry_with_rsrc("a.txt"),
            false,
            Some("/tmp/out/a.txt".to_string()),
            PreserveMode::Naps,
            Box::new(FixedSource { data: Some(b"hi".to_vec()), rsrc: None }),
        );
        let json = entries_to_json(&set.entries).unwrap();
        let restored = entries_from_json(&json).unwrap();
        assert_eq!(restored.len(), 1);
        assert_eq!(restored[0].extract_path.as_deref(), Some("/tmp/out/a.txt"));
        assert_eq!(restored[0].preserve_mode, PreserveMode::Naps);
        assert_eq!(restored[0].output_length, OUTPUT_LENGTH_UNKNOWN);
    }
}
