//! # Add worker (C6, spec.md §4.6)

use std::collections::HashMap;

use crate::attribs::{AddFileEntry, DataSourceKind, FileAttribs};
use crate::callback::{ask, Callback, CallbackFacts, CallbackResult, Reason};
use crate::capability::{Archive, EntryHandle};
use crate::error::CoreError;
use crate::hook::AppHook;
use crate::partsrc::{FileBacked, MemoryBacked, PartSource};

use super::PreserveMode;

/// Adds a batch of pending entries to `archive`, one combined transaction for the whole
/// batch (spec.md §4.6 steps 1-9). Returns the handle for each entry actually written; an
/// entry the host chose to skip is simply absent, not an error.
pub fn add_files(
    archive: &mut dyn Archive,
    entries: Vec<AddFileEntry>,
    preserve: PreserveMode,
    hook: &dyn AppHook,
    cb: &mut Callback,
) -> Result<Vec<EntryHandle>, CoreError> {
    let entries = sort_and_dedup(entries, hook.case_sensitive_names());
    let total = entries.len().max(1);
    archive.start_transaction()?;
    let mut written = Vec::new();

    for (i, entry) in entries.into_iter().enumerate() {
        entry.validate()?;

        let percent = ((i * 100) / total) as u8;
        match ask(cb, CallbackFacts::progress(&entry.storage_name, percent)) {
            CallbackResult::Cancel => {
                archive.cancel_transaction()?;
                return Err(CoreError::Consent);
            }
            _ => {}
        }

        let storage_path = compose_path(&entry);
        let adjusted = archive.adjust_file_name(&storage_path);
        if let Err(e) = archive.check_storage_name(&adjusted) {
            match ask(cb, CallbackFacts::failure(&adjusted, Reason::PathTooLong, e.to_string())) {
                CallbackResult::Skip => continue,
                _ => {
                    archive.cancel_transaction()?;
                    return Err(e);
                }
            }
        }

        if let Some(existing) = archive.find_entry(&adjusted) {
            let result = ask(cb, CallbackFacts::new(Reason::FileNameExists, &adjusted));
            match result {
                CallbackResult::Skip => continue,
                CallbackResult::Overwrite => {
                    archive.delete_entry(&existing)?;
                }
                _ => {
                    archive.cancel_transaction()?;
                    return Err(CoreError::Consent);
                }
            }
        }

        if entry.has_rsrc && !archive.characteristics().has_resource_forks && preserve == PreserveMode::None {
            let result = ask(cb, CallbackFacts::new(Reason::ResourceForkIgnored, &adjusted));
            if result == CallbackResult::Cancel {
                archive.cancel_transaction()?;
                return Err(CoreError::Consent);
            }
        }

        let maczip_active = preserve == PreserveMode::Adf
            && hook.maczip_enabled()
            && !archive.characteristics().has_resource_forks;

        let mut attribs = attribs_from_entry(&entry, &adjusted);
        super::translate_types(&mut attribs);
        let mut data_src = if !entry.has_data && maczip_active && entry.has_rsrc {
            // AppleDouble needs both records; synthesize an empty data fork so the sidecar
            // has a primary to pair with (spec.md §4.6 step 6, scenario 2).
            Some(Box::new(MemoryBacked::empty()) as Box<dyn PartSource>)
        } else {
            make_source(entry.has_data, entry.data_path.as_deref(), entry.data_source_kind)
        };
        let mut rsrc_src = make_source(entry.has_rsrc, entry.rsrc_path.as_deref(), entry.rsrc_source_kind);

        let add_result = archive.add_entry(
            attribs,
            data_src.as_deref_mut(),
            rsrc_src.as_deref_mut(),
        );
        match add_result {
            Ok(handle) => {
                written.push(handle);
                if maczip_active && entry.has_rsrc {
                    add_maczip_sidecar(archive, &entry, &adjusted)?;
                }
            }
            Err(e) => {
                let result = ask(cb, CallbackFacts::failure(&adjusted, Reason::OverwriteFailure, e.to_string()));
                if result != CallbackResult::Skip {
                    archive.cancel_transaction()?;
                    return Err(e);
                }
            }
        }
    }

    let mut sink = std::io::sink();
    archive.commit_transaction(&mut sink)?;
    Ok(written)
}

/// Sort by [`AddFileEntry::sort_key`], then dedupe on the composed storage path: the last
/// entry for a given path wins (spec.md §4.6 step 2, duplicate-entry resolution).
fn sort_and_dedup(mut entries: Vec<AddFileEntry>, case_sensitive: bool) -> Vec<AddFileEntry> {
    entries.sort_by(|a, b| a.sort_key().cmp(b.sort_key()));
    let mut order: Vec<String> = Vec::new();
    let mut by_key: HashMap<String, AddFileEntry> = HashMap::new();
    for entry in entries {
        let raw = compose_path(&entry);
        let key = if case_sensitive { raw } else { raw.to_ascii_lowercase() };
        if !by_key.contains_key(&key) {
            order.push(key.clone());
        }
        by_key.insert(key, entry);
    }
    order.into_iter().filter_map(|key| by_key.remove(&key)).collect()
}

fn compose_path(entry: &AddFileEntry) -> String {
    let sep = match entry.storage_dir_sep {
        crate::callback::PathSeparator::Char(c) => c.to_string(),
        crate::callback::PathSeparator::None => String::new(),
    };
    if entry.storage_dir.is_empty() {
        entry.storage_name.clone()
    } else {
        format!("{}{}{}", entry.storage_dir, sep, entry.storage_name)
    }
}

fn attribs_from_entry(entry: &AddFileEntry, adjusted_path: &str) -> FileAttribs {
    let mut attribs = FileAttribs::new(adjusted_path);
    attribs.prodos_type = entry.file_type;
    attribs.aux_type = entry.aux_type;
    attribs.hfs_type = entry.hfs_type;
    attribs.hfs_creator = entry.hfs_creator;
    attribs.access_flags = entry.access;
    attribs.create_when = entry.create_when;
    attribs.mod_when = entry.mod_when;
    attribs
}

fn make_source(
    present: bool,
    path: Option<&str>,
    kind: DataSourceKind,
) -> Option<Box<dyn PartSource>> {
    if !present {
        return None;
    }
    match (path, kind) {
        (Some(p), DataSourceKind::Plain | DataSourceKind::Import) => {
            Some(Box::new(FileBacked::new(p)))
        }
        (Some(p), DataSourceKind::AppleSingle | DataSourceKind::AppleDouble) => {
            Some(Box::new(FileBacked::new(p)))
        }
        (None, _) => Some(Box::new(MemoryBacked::empty())),
    }
}

fn add_maczip_sidecar(
    archive: &mut dyn Archive,
    entry: &AddFileEntry,
    primary_path: &str,
) -> Result<(), CoreError> {
    let Some(sidecar_path) = crate::maczip::generate_mac_zip_name(primary_path) else {
        return Ok(());
    };
    let mut attribs = FileAttribs::new(&sidecar_path);
    attribs.hfs_type = entry.hfs_type;
    attribs.hfs_creator = entry.hfs_creator;
    attribs.create_when = entry.create_when;
    attribs.mod_when = entry.mod_when;
    let rsrc_bytes = match &entry.rsrc_path {
        Some(p) => std::fs::read(p).map_err(CoreError::Fatal)?,
        None => Vec::new(),
    };
    let mut source = crate::partsrc::GeneratedADF::new(attribs.clone(), Some(rsrc_bytes));
    archive.add_entry(attribs, Some(&mut source as &mut dyn PartSource), None)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribs::DateField;
    use crate::callback::PathSeparator;

    fn sample(name: &str) -> AddFileEntry {
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
            file_type: 0,
            aux_type: 0,
            hfs_type: 0,
            hfs_creator: 0,
            access: 0,
        }
    }

    #[test]
    fn dedup_keeps_last_entry_for_duplicate_path() {
        let mut a = sample("same.txt");
        a.file_type = 0x04;
        let mut b = sample("same.txt");
        b.file_type = 0x06;
        let deduped = sort_and_dedup(vec![a, b], false);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].file_type, 0x06);
    }

    #[test]
    fn dedup_is_case_insensitive_by_default() {
        let a = sample("Same.txt");
        let b = sample("same.TXT");
        let deduped = sort_and_dedup(vec![a, b], false);
        assert_eq!(deduped.len(), 1);
    }

    #[test]
    fn compose_path_joins_dir_and_name() {
        let mut e = sample("file.txt");
        e.storage_dir = "a/b".into();
        assert_eq!(compose_path(&e), "a/b/file.txt");
    }
}
