//! # Consumed capabilities (spec.md §6 "Consumed")
//!
//! The CORE never implements codecs; it consumes `Archive`, `FileSystem`, `DiskImage`,
//! `MultiPart`, and `Converter` through these traits. Concrete codecs (NuFX, ZIP, ProDOS,
//! HFS, DOS 3.3, AppleSingle container I/O, ...) are out of scope (spec.md §1) and live in a
//! separate crate; `tests/common/mock.rs` provides small in-memory implementations used only
//! to exercise the CORE's orchestration logic.
//!
//! Design note (spec.md §9 "Polymorphism"): every place the original used a type check to
//! branch on Archive / FileSystem / DiskImage / MultiPart / Partition is expressed here as a
//! variant match over [`DaObject`] rather than `dyn Any` downcasting.

use std::io::Read;

use serde::{Deserialize, Serialize};

use crate::attribs::FileAttribs;
use crate::error::CoreError;

/// Which fork/part of an entry a stream operation addresses.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Serialize, Deserialize)]
pub enum Part {
    Data,
    Rsrc,
    DiskImage,
    Raw,
}

/// Characteristics an `Archive` or `FileSystem` reports about itself, consulted by the
/// Add/Extract/Copy workers (spec.md §6).
#[derive(Clone, Copy, Debug)]
pub struct Characteristics {
    pub default_separator: char,
    pub has_single_entry: bool,
    pub has_resource_forks: bool,
    pub hierarchical: bool,
}

/// A stable handle to one entry inside an `Archive` or directory entry inside a
/// `FileSystem`. Capability implementations define their own internal representation;
/// the CORE only ever threads this opaque index back through the same capability object.
#[derive(Clone, Debug)]
pub struct EntryHandle(pub u64);

/// Disposition used by `create_file`/`open_file` (spec.md §6 `FileSystem::open_file`).
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum OpenMode {
    CreateNew,
    Existing,
    /// Create with both forks addressable (spec.md §4.6 step 7 "Extended mode").
    Extended,
}

/// Abstract archive container: ZIP, NuFX, gzip, AppleSingle-as-archive, etc. (spec.md §6).
pub trait Archive {
    fn iter_entries(&self) -> Vec<EntryHandle>;
    fn attribs(&self, entry: &EntryHandle) -> Result<FileAttribs, CoreError>;
    fn find_entry(&self, full_path: &str) -> Option<EntryHandle>;
    /// Possibly non-seekable readable byte stream for one fork of `entry`.
    fn open_part(&self, entry: &EntryHandle, part: Part) -> Result<Box<dyn Read>, CoreError>;
    fn characteristics(&self) -> Characteristics;
    /// Normalize `name` to this archive format's filename rules (illegal chars, case).
    fn adjust_file_name(&self, name: &str) -> String;
    /// Validate a fully composed storage name/path; `Err` carries the reason (too long, etc).
    fn check_storage_name(&self, path: &str) -> Result<(), CoreError>;

    fn start_transaction(&mut self) -> Result<(), CoreError>;
    fn delete_entry(&mut self, entry: &EntryHandle) -> Result<(), CoreError>;
    fn add_entry(
        &mut self,
        attribs: FileAttribs,
        data: Option<&mut dyn crate::partsrc::PartSource>,
        rsrc: Option<&mut dyn crate::partsrc::PartSource>,
    ) -> Result<EntryHandle, CoreError>;
    /// Commits the open transaction, writing to a fresh output stream.
    fn commit_transaction(&mut self, out: &mut dyn std::io::Write) -> Result<(), CoreError>;
    fn cancel_transaction(&mut self) -> Result<(), CoreError>;

    /// Swap in a freshly reopened stream after the owning `DiskArcNode` rotates storage,
    /// preserving entry-handle identity (spec.md §4.4 invariant).
    fn reopen_stream(&mut self, new: Box<dyn crate::diskarc::Stream>) -> Result<(), CoreError>;
}

/// Abstract file system: ProDOS, DOS 3.3, HFS, Pascal, CP/M, FAT, etc. (spec.md §6).
pub trait FileSystem {
    fn volume_name(&self) -> String;
    fn iter_directory(&self, dir_path: &str) -> Result<Vec<EntryHandle>, CoreError>;
    fn attribs(&self, entry: &EntryHandle) -> Result<FileAttribs, CoreError>;
    fn find_entry(&self, full_path: &str) -> Option<EntryHandle>;
    fn open_file(
        &mut self,
        entry: &EntryHandle,
        mode: OpenMode,
        part: Part,
    ) -> Result<Box<dyn ReadWrite>, CoreError>;
    fn create_file(
        &mut self,
        parent_dir: &str,
        name: &str,
        mode: OpenMode,
        file_type: Option<u8>,
    ) -> Result<EntryHandle, CoreError>;
    fn create_directory(&mut self, parent_dir: &str, name: &str) -> Result<EntryHandle, CoreError>;
    fn delete_file(&mut self, entry: &EntryHandle) -> Result<(), CoreError>;
    fn move_file(&mut self, entry: &EntryHandle, new_parent_dir: &str, new_name: &str) -> Result<(), CoreError>;
    fn set_attribs(&mut self, entry: &EntryHandle, attribs: &FileAttribs) -> Result<(), CoreError>;
    fn find_embedded_volumes(&self) -> Vec<Box<dyn MultiPart>>;
    fn characteristics(&self) -> Characteristics;
    fn adjust_file_name(&self, name: &str) -> String;
    fn adjust_volume_name(&self, name: &str) -> String;
    fn is_read_only(&self) -> bool;
}

pub trait ReadWrite: std::io::Read + std::io::Write {}
impl<T: std::io::Read + std::io::Write> ReadWrite for T {}

/// Abstract disk image: decodes/encodes tracks without interpreting a file system
/// (spec.md §6).
pub trait DiskImage {
    fn analyze_disk(&mut self, order_hint: &str, depth: DepthPolicy) -> Result<DaObject, CoreError>;
    fn contents(&self) -> Option<DaObjectKind>;
    fn test_block(&self, n: usize) -> bool;
    fn test_sector(&self, track: usize, sector: usize) -> bool;
    fn flush(&mut self) -> Result<(), CoreError>;
    fn is_modified(&self) -> bool;
    fn is_read_only(&self) -> bool;
}

/// A container that holds multiple independently addressable partitions (spec.md §6).
pub trait MultiPart {
    fn partition_count(&self) -> usize;
    fn partition(&self, index: usize) -> Option<DaObject>;
}

/// What kind of output a converter can produce (spec.md §6 `Converter::convert_file`).
#[derive(Clone, Debug)]
pub enum ConvertedOutput {
    SimpleText(String),
    FancyText(String),
    CellGrid(Vec<Vec<String>>),
    Bitmap(Vec<u8>),
    HostConv(Vec<u8>),
    ErrorText(String),
}

/// Import/export converter, looked up by tag in an open-ended registry (spec.md §6, §9
/// "Dynamic dispatch for converters": "the converter list is open-ended; expose as a
/// registry keyed by string tag plus a runtime applicability score").
pub trait Converter {
    fn tag(&self) -> &str;
    /// A score in `0.0..=1.0`; 0 means "cannot handle this", used to pick the best converter
    /// for a given file among several registered ones.
    fn applicability(&self, attribs: &FileAttribs, sample: &[u8]) -> f32;
    fn convert_file(&self, attribs: &FileAttribs, data: &[u8]) -> Result<ConvertedOutput, CoreError>;
    /// Canonical extension appended to export output (spec.md §4.9: `.txt`, `.rtf`, `.csv`,
    /// `.png`, or empty for host-passthrough).
    fn output_extension(&self) -> &str;
}

/// Open-ended converter registry (spec.md §9).
#[derive(Default)]
pub struct ConverterRegistry {
    converters: Vec<Box<dyn Converter>>,
}

impl ConverterRegistry {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn register(&mut self, converter: Box<dyn Converter>) {
        self.converters.push(converter);
    }
    /// Picks the converter with the highest applicability score above zero, preferring the
    /// first registered on ties (stable selection, no surprise reordering).
    pub fn best_for(&self, attribs: &FileAttribs, sample: &[u8]) -> Option<&dyn Converter> {
        self.converters
            .iter()
            .map(|c| (c.applicability(attribs, sample), c.as_ref()))
            .filter(|(score, _)| *score > 0.0)
            .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(_, c)| c)
    }
    pub fn by_tag(&self, tag: &str) -> Option<&dyn Converter> {
        self.converters.iter().find(|c| c.tag() == tag).map(|c| c.as_ref())
    }
}

/// Tagged union over the kinds of library object a work-tree/disk-arc node can wrap
/// (spec.md §3 `WorkTreeNode.da_object`, §9 "Polymorphism").
pub enum DaObject {
    Archive(Box<dyn Archive>),
    DiskImage(Box<dyn DiskImage>),
    MultiPart(Box<dyn MultiPart>),
    FileSystem(Box<dyn FileSystem>),
    Partition,
}

/// Discriminant-only form of [`DaObject`], used where only the kind (not the object) is
/// needed, e.g. depth-policy decisions (spec.md §4.5).
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum DaObjectKind {
    Archive,
    DiskImage,
    MultiPart,
    FileSystem,
    Partition,
}

impl DaObject {
    pub fn kind(&self) -> DaObjectKind {
        match self {
            DaObject::Archive(_) => DaObjectKind::Archive,
            DaObject::DiskImage(_) => DaObjectKind::DiskImage,
            DaObject::MultiPart(_) => DaObjectKind::MultiPart,
            DaObject::FileSystem(_) => DaObjectKind::FileSystem,
            DaObject::Partition => DaObjectKind::Partition,
        }
    }
}

/// Kind of thing that might contain further nested content, consulted by a depth policy
/// predicate before opening any child stream (spec.md §4.5).
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum ParentKind {
    Zip,
    GZip,
    NuFX,
    Archive,
    FileSystem,
    MultiPart,
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum ChildKind {
    AnyFile,
    FileArchive,
    DiskImage,
    DiskPart,
    Embed,
}

/// Pluggable predicate `descend(parent_kind, child_kind) -> bool` (spec.md §4.5).
pub type DepthPolicy = fn(ParentKind, ChildKind) -> bool;

/// A depth policy that descends into everything (used when no host-configured limit
/// applies).
pub fn descend_all(_parent: ParentKind, _child: ChildKind) -> bool {
    true
}

/// A depth policy that never descends: the work tree contains only the root
/// (spec.md §8 "Boundary behaviors").
pub fn descend_none(_parent: ParentKind, _child: ChildKind) -> bool {
    false
}
