mod common;

use std::io::Write;

use retrocore::attribs::{AddFileEntry, DataSourceKind, DateField, FileAttribs};
use retrocore::callback::{CallbackResult, PathSeparator};
use retrocore::capability::{Archive, Part};
use retrocore::diskarc::{DiskArcTree, MemStream, NodeVariant, ParentLocator};
use retrocore::hook::DefaultHook;
use retrocore::workers::add::add_files;
use retrocore::workers::copy::copy_entries;
use retrocore::workers::PreserveMode;

use common::MockArchive;

fn plain_entry(name: &str) -> AddFileEntry {
    AddFileEntry {
        has_data: true,
        data_path: None,
        data_source_kind: DataSourceKind::Plain,
        has_rsrc: false,
        rsrc_path: None,
        rsrc_source_kind: DataSourceKind::Plain,
        has_adf_attribs: false,
        storage_dir: String::new(),
        storage_dir_sep: PathSeparator::Char('/'),
        storage_name: name.into(),
        mod_when: DateField::NoDate,
        create_when: DateField::NoDate,
        file_type: 0x04,
        aux_type: 0,
        hfs_type: 0,
        hfs_creator: 0,
        access: 0,
    }
}

#[test]
fn add_files_writes_entries_into_archive() {
    let mut archive = MockArchive::new();
    let entries = vec![plain_entry("b.txt"), plain_entry("a.txt")];
    let mut cb = |_facts: retrocore::callback::CallbackFacts| CallbackResult::Continue;
    let handles = add_files(&mut archive, entries, PreserveMode::None, &DefaultHook, &mut cb).unwrap();
    assert_eq!(handles.len(), 2);
    assert_eq!(archive.entry_count(), 2);
}

#[test]
fn add_files_duplicate_path_keeps_last_one() {
    let mut archive = MockArchive::new();
    let mut first = plain_entry("dup.txt");
    first.file_type = 0x04;
    let mut second = plain_entry("dup.txt");
    second.file_type = 0x06;
    let mut cb = |_: retrocore::callback::CallbackFacts| CallbackResult::Continue;
    add_files(&mut archive, vec![first, second], PreserveMode::None, &DefaultHook, &mut cb).unwrap();
    assert_eq!(archive.entry_count(), 1);
    let entry = archive.find_entry("dup.txt").unwrap();
    assert_eq!(archive.attribs(&entry).unwrap().prodos_type, 0x06);
}

#[test]
fn copy_entries_transfers_between_two_archives() {
    let mut source = MockArchive::new();
    source.start_transaction().unwrap();
    let mut attribs = FileAttribs::new("report.txt");
    attribs.prodos_type = 0x04;
    let mut part = retrocore::partsrc::MemoryBacked::new(b"hello".to_vec());
    let entry = source.add_entry(attribs, Some(&mut part), None).unwrap();
    let mut sink = std::io::sink();
    source.commit_transaction(&mut sink).unwrap();

    let mut dest = MockArchive::new();
    let mut cb = |_: retrocore::callback::CallbackFacts| CallbackResult::Continue;
    let written = copy_entries(&source, &mut dest, &[entry], PreserveMode::None, retrocore::callback::DosTextMode::None, &DefaultHook, &mut cb).unwrap();
    assert_eq!(written.len(), 1);
    assert_eq!(dest.entry_count(), 1);
}

#[test]
fn commit_into_host_root_writes_bytes_atomically() {
    let dir = tempfile::tempdir().unwrap();
    let host_path = dir.path().join("archive.bin");

    struct TestArchive {
        bytes: Vec<u8>,
    }
    impl Archive for TestArchive {
        fn iter_entries(&self) -> Vec<retrocore::capability::EntryHandle> {
            vec![]
        }
        fn attribs(&self, _e: &retrocore::capability::EntryHandle) -> Result<FileAttribs, retrocore::error::CoreError> {
            unimplemented!()
        }
        fn find_entry(&self, _p: &str) -> Option<retrocore::capability::EntryHandle> {
            None
        }
        fn open_part(
            &self,
            _e: &retrocore::capability::EntryHandle,
            _p: Part,
        ) -> Result<Box<dyn std::io::Read>, retrocore::error::CoreError> {
            unimplemented!()
        }
        fn characteristics(&self) -> retrocore::capability::Characteristics {
            retrocore::capability::Characteristics {
                default_separator: '/',
                has_single_entry: false,
                has_resource_forks: false,
                hierarchical: true,
            }
        }
        fn adjust_file_name(&self, n: &str) -> String {
            n.to_string()
        }
        fn check_storage_name(&self, _p: &str) -> Result<(), retrocore::error::CoreError> {
            Ok(())
        }
        fn start_transaction(&mut self) -> Result<(), retrocore::error::CoreError> {
            Ok(())
        }
        fn delete_entry(&mut self, _e: &retrocore::capability::EntryHandle) -> Result<(), retrocore::error::CoreError> {
            Ok(())
        }
        fn add_entry(
            &mut self,
            _a: FileAttribs,
            _d: Option<&mut dyn retrocore::partsrc::PartSource>,
            _r: Option<&mut dyn retrocore::partsrc::PartSource>,
        ) -> Result<retrocore::capability::EntryHandle, retrocore::error::CoreError> {
            Ok(retrocore::capability::EntryHandle(0))
        }
        fn commit_transaction(&mut self, out: &mut dyn std::io::Write) -> Result<(), retrocore::error::CoreError> {
            out.write_all(&self.bytes).unwrap();
            Ok(())
        }
        fn cancel_transaction(&mut self) -> Result<(), retrocore::error::CoreError> {
            Ok(())
        }
        fn reopen_stream(&mut self, _new: Box<dyn retrocore::diskarc::Stream>) -> Result<(), retrocore::error::CoreError> {
            Ok(())
        }
    }

    std::fs::File::create(&host_path).unwrap().write_all(b"placeholder").unwrap();
    let mut tree = DiskArcTree::new_host_root(&host_path, Box::new(MemStream::new(b"placeholder".to_vec())));
    let root = tree.root();
    let child = tree
        .add_child(
            root,
            ParentLocator::HostRoot,
            Box::new(MemStream::default()),
            NodeVariant::Archive(Box::new(TestArchive { bytes: b"final-bytes".to_vec() })),
        )
        .unwrap();

    tree.save_updates(child, false, &DefaultHook).unwrap();
    let written = std::fs::read(&host_path).unwrap();
    assert_eq!(written, b"final-bytes");
    assert!(tree.health_check().is_empty());
}
