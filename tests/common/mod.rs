//! In-memory stand-ins for `Archive`/`FileSystem`/`DiskImage`/`Converter`. Concrete codecs
//! are out of scope for this crate; these mocks exist purely to exercise the CORE's
//! orchestration logic end to end.
#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Read;

use retrocore::attribs::FileAttribs;
use retrocore::capability::{
    Archive, Characteristics, ConvertedOutput, Converter, DiskImage, EntryHandle, FileSystem, OpenMode, Part,
};
use retrocore::diskarc::Stream;
use retrocore::error::CoreError;
use retrocore::partsrc::PartSource;

#[derive(Clone)]
struct StoredEntry {
    attribs: FileAttribs,
    data: Vec<u8>,
    rsrc: Vec<u8>,
}

/// A trivial flat archive: no real compression, no on-disk format, just entries keyed by
/// path. Transactions stage writes in a side buffer and apply them atomically on commit.
pub struct MockArchive {
    entries: HashMap<u64, StoredEntry>,
    next_id: u64,
    in_transaction: bool,
    staged_deletes: Vec<u64>,
    staged_adds: Vec<(u64, StoredEntry)>,
}

impl MockArchive {
    pub fn new() -> Self {
        Self { entries: HashMap::new(), next_id: 0, in_transaction: false, staged_deletes: Vec::new(), staged_adds: Vec::new() }
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
}

impl Default for MockArchive {
    fn default() -> Self {
        Self::new()
    }
}

impl Archive for MockArchive {
    fn iter_entries(&self) -> Vec<EntryHandle> {
        self.entries.keys().map(|id| EntryHandle(*id)).collect()
    }

    fn attribs(&self, entry: &EntryHandle) -> Result<FileAttribs, CoreError> {
        self.entries
            .get(&entry.0)
            .map(|e| e.attribs.clone())
            .ok_or_else(|| CoreError::structural("no such entry"))
    }

    fn find_entry(&self, full_path: &str) -> Option<EntryHandle> {
        self.entries
            .iter()
            .find(|(_, e)| e.attribs.full_path == full_path)
            .map(|(id, _)| EntryHandle(*id))
    }

    fn open_part(&self, entry: &EntryHandle, part: Part) -> Result<Box<dyn Read>, CoreError> {
        let stored = self.entries.get(&entry.0).ok_or_else(|| CoreError::structural("no such entry"))?;
        let bytes = match part {
            Part::Data => stored.data.clone(),
            Part::Rsrc => {
                if stored.rsrc.is_empty() {
                    return Err(CoreError::structural("no resource fork"));
                }
                stored.rsrc.clone()
            }
            _ => return Err(CoreError::structural("unsupported part for mock archive")),
        };
        Ok(Box::new(std::io::Cursor::new(bytes)))
    }

    fn characteristics(&self) -> Characteristics {
        Characteristics { default_separator: '/', has_single_entry: false, has_resource_forks: false, hierarchical: true }
    }

    fn adjust_file_name(&self, name: &str) -> String {
        name.to_string()
    }

    fn check_storage_name(&self, path: &str) -> Result<(), CoreError> {
        if path.len() > 255 {
            return Err(CoreError::policy("storage path too long"));
        }
        Ok(())
    }

    fn start_transaction(&mut self) -> Result<(), CoreError> {
        if self.in_transaction {
            return Err(CoreError::TransactionAlreadyOpen);
        }
        self.in_transaction = true;
        self.staged_deletes.clear();
        self.staged_adds.clear();
        Ok(())
    }

    fn delete_entry(&mut self, entry: &EntryHandle) -> Result<(), CoreError> {
        if !self.in_transaction {
            return Err(CoreError::NoTransaction);
        }
        self.staged_deletes.push(entry.0);
        Ok(())
    }

    fn add_entry(
        &mut self,
        attribs: FileAttribs,
        data: Option<&mut dyn PartSource>,
        rsrc: Option<&mut dyn PartSource>,
    ) -> Result<EntryHandle, CoreError> {
        if !self.in_transaction {
            return Err(CoreError::NoTransaction);
        }
        let data_bytes = match data {
            Some(src) => {
                src.open()?;
                let bytes = retrocore::partsrc::read_to_end(src)?;
                src.close()?;
                bytes
            }
            None => Vec::new(),
        };
        let rsrc_bytes = match rsrc {
            Some(src) => {
                src.open()?;
                let bytes = retrocore::partsrc::read_to_end(src)?;
                src.close()?;
                bytes
            }
            None => Vec::new(),
        };
        let id = self.next_id;
        self.next_id += 1;
        self.staged_adds.push((id, StoredEntry { attribs, data: data_bytes, rsrc: rsrc_bytes }));
        Ok(EntryHandle(id))
    }

    fn commit_transaction(&mut self, _out: &mut dyn std::io::Write) -> Result<(), CoreError> {
        if !self.in_transaction {
            return Err(CoreError::NoTransaction);
        }
        for id in self.staged_deletes.drain(..) {
            self.entries.remove(&id);
        }
        for (id, entry) in self.staged_adds.drain(..) {
            self.entries.insert(id, entry);
        }
        self.in_transaction = false;
        Ok(())
    }

    fn cancel_transaction(&mut self) -> Result<(), CoreError> {
        self.staged_deletes.clear();
        self.staged_adds.clear();
        self.in_transaction = false;
        Ok(())
    }

    fn reopen_stream(&mut self, _new: Box<dyn Stream>) -> Result<(), CoreError> {
        Ok(())
    }
}

/// A flat, single-directory file system mock.
pub struct MockFileSystem {
    files: HashMap<u64, StoredEntry>,
    next_id: u64,
    read_only: bool,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self { files: HashMap::new(), next_id: 0, read_only: false }
    }
}

impl Default for MockFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem for MockFileSystem {
    fn volume_name(&self) -> String {
        "MOCK.VOL".into()
    }

    fn iter_directory(&self, _dir_path: &str) -> Result<Vec<EntryHandle>, CoreError> {
        Ok(self.files.keys().map(|id| EntryHandle(*id)).collect())
    }

    fn attribs(&self, entry: &EntryHandle) -> Result<FileAttribs, CoreError> {
        self.files
            .get(&entry.0)
            .map(|e| e.attribs.clone())
            .ok_or_else(|| CoreError::structural("no such file"))
    }

    fn find_entry(&self, full_path: &str) -> Option<EntryHandle> {
        self.files.iter().find(|(_, e)| e.attribs.full_path == full_path).map(|(id, _)| EntryHandle(*id))
    }

    fn open_file(
        &mut self,
        entry: &EntryHandle,
        _mode: OpenMode,
        _part: Part,
    ) -> Result<Box<dyn retrocore::capability::ReadWrite>, CoreError> {
        let bytes = self.files.get(&entry.0).map(|e| e.data.clone()).unwrap_or_default();
        Ok(Box::new(std::io::Cursor::new(bytes)))
    }

    fn create_file(
        &mut self,
        parent_dir: &str,
        name: &str,
        _mode: OpenMode,
        file_type: Option<u8>,
    ) -> Result<EntryHandle, CoreError> {
        if self.read_only {
            return Err(CoreError::policy("file system is read-only"));
        }
        let full_path = if parent_dir.is_empty() { name.to_string() } else { format!("{parent_dir}/{name}") };
        let mut attribs = FileAttribs::new(&full_path);
        attribs.prodos_type = file_type.unwrap_or(0);
        let id = self.next_id;
        self.next_id += 1;
        self.files.insert(id, StoredEntry { attribs, data: Vec::new(), rsrc: Vec::new() });
        Ok(EntryHandle(id))
    }

    fn create_directory(&mut self, parent_dir: &str, name: &str) -> Result<EntryHandle, CoreError> {
        let full_path = if parent_dir.is_empty() { name.to_string() } else { format!("{parent_dir}/{name}") };
        let mut attribs = FileAttribs::new(&full_path);
        attribs.is_directory = true;
        let id = self.next_id;
        self.next_id += 1;
        self.files.insert(id, StoredEntry { attribs, data: Vec::new(), rsrc: Vec::new() });
        Ok(EntryHandle(id))
    }

    fn delete_file(&mut self, entry: &EntryHandle) -> Result<(), CoreError> {
        self.files.remove(&entry.0).ok_or_else(|| CoreError::structural("no such file"))?;
        Ok(())
    }

    fn move_file(&mut self, entry: &EntryHandle, new_parent_dir: &str, new_name: &str) -> Result<(), CoreError> {
        let stored = self.files.get_mut(&entry.0).ok_or_else(|| CoreError::structural("no such file"))?;
        stored.attribs.full_path = if new_parent_dir.is_empty() {
            new_name.to_string()
        } else {
            format!("{new_parent_dir}/{new_name}")
        };
        stored.attribs.filename_only = new_name.to_string();
        Ok(())
    }

    fn set_attribs(&mut self, entry: &EntryHandle, attribs: &FileAttribs) -> Result<(), CoreError> {
        let stored = self.files.get_mut(&entry.0).ok_or_else(|| CoreError::structural("no such file"))?;
        stored.attribs = attribs.clone();
        Ok(())
    }

    fn find_embedded_volumes(&self) -> Vec<Box<dyn retrocore::capability::MultiPart>> {
        Vec::new()
    }

    fn characteristics(&self) -> Characteristics {
        Characteristics { default_separator: '/', has_single_entry: false, has_resource_forks: false, hierarchical: false }
    }

    fn adjust_file_name(&self, name: &str) -> String {
        name.to_uppercase()
    }

    fn adjust_volume_name(&self, name: &str) -> String {
        name.to_uppercase()
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }
}

/// Converter mock that upper-cases simple text, used to exercise the Extract worker's
/// converter path without needing a real text-encoding codec.
pub struct UppercaseConverter;

impl Converter for UppercaseConverter {
    fn tag(&self) -> &str {
        "uppercase"
    }
    fn applicability(&self, attribs: &FileAttribs, _sample: &[u8]) -> f32 {
        if attribs.prodos_type == 0x04 {
            1.0
        } else {
            0.0
        }
    }
    fn convert_file(&self, _attribs: &FileAttribs, data: &[u8]) -> Result<ConvertedOutput, CoreError> {
        let text = String::from_utf8_lossy(data).to_uppercase();
        Ok(ConvertedOutput::SimpleText(text))
    }
    fn output_extension(&self) -> &str {
        ".txt"
    }
}

/// A disk image mock with a fixed block count and no real track encoding; flush just marks
/// itself clean.
pub struct MockDiskImage {
    pub blocks: usize,
    dirty: bool,
}

impl MockDiskImage {
    pub fn new(blocks: usize) -> Self {
        Self { blocks, dirty: false }
    }
}

impl DiskImage for MockDiskImage {
    fn analyze_disk(
        &mut self,
        _order_hint: &str,
        _depth: retrocore::capability::DepthPolicy,
    ) -> Result<retrocore::capability::DaObject, CoreError> {
        Ok(retrocore::capability::DaObject::FileSystem(Box::new(MockFileSystem::new())))
    }
    fn contents(&self) -> Option<retrocore::capability::DaObjectKind> {
        Some(retrocore::capability::DaObjectKind::FileSystem)
    }
    fn test_block(&self, n: usize) -> bool {
        n < self.blocks
    }
    fn test_sector(&self, _track: usize, _sector: usize) -> bool {
        true
    }
    fn flush(&mut self) -> Result<(), CoreError> {
        self.dirty = false;
        Ok(())
    }
    fn is_modified(&self) -> bool {
        self.dirty
    }
    fn is_read_only(&self) -> bool {
        false
    }
}
