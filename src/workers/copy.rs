//! # Copy worker (C8, spec.md §4.8)
//!
//! Copy moves entries between two `Archive`/`FileSystem` objects without staging through a
//! host file, by materializing each fork into memory once and handing it to the Add path as
//! a [`crate::partsrc::MemoryBacked`] source. The design note on "sparse copy" (spec.md §9)
//! is resolved the same way: nothing here streams a sparse byte range specially, since a
//! fully in-memory fork is already the simplest sparse-source no caller needed more than.

use crate::attribs::{AddFileEntry, DataSourceKind, FileAttribs};
use crate::callback::{ask, Callback, CallbackFacts, CallbackResult, DosTextMode, Reason};
use crate::capability::{Archive, EntryHandle, Part};
use crate::error::CoreError;
use crate::hook::AppHook;
use crate::partsrc::MemoryBacked;

use super::PreserveMode;

/// One entry's worth of pre-read fork bytes, staged so the Add worker never has to know
/// they came from another archive rather than a host file.
struct StagedEntry {
    attribs: FileAttribs,
    data: Option<Vec<u8>>,
    rsrc: Option<Vec<u8>>,
}

fn stage_entry(source: &dyn Archive, entry: &EntryHandle, dos_text: DosTextMode) -> Result<StagedEntry, CoreError> {
    let attribs = source.attribs(entry)?;
    let mut data = match source.open_part(entry, Part::Data) {
        Ok(mut r) => {
            let mut buf = Vec::new();
            std::io::Read::read_to_end(&mut r, &mut buf).map_err(CoreError::Fatal)?;
            Some(buf)
        }
        Err(_) => None,
    };
    if let (Some(bytes), DosTextMode::SetHighBit | DosTextMode::StripHighBit) = (&mut data, dos_text) {
        match dos_text {
            DosTextMode::SetHighBit => bytes.iter_mut().for_each(|b| if *b != 0 { *b |= 0x80 }),
            DosTextMode::StripHighBit => bytes.iter_mut().for_each(|b| *b &= 0x7f),
            DosTextMode::None => {}
        }
    }
    let rsrc = source.open_part(entry, Part::Rsrc).ok().and_then(|mut r| {
        let mut buf = Vec::new();
        std::io::Read::read_to_end(&mut r, &mut buf).ok()?;
        Some(buf)
    });
    Ok(StagedEntry { attribs, data, rsrc })
}

/// Copies `entries` from `source` into `dest`, sharing the Add worker's collision handling,
/// MacZip pairing, and type-translation rules so a Copy is observably the same as an
/// Extract-then-Add (spec.md §4.8).
pub fn copy_entries(
    source: &dyn Archive,
    dest: &mut dyn Archive,
    entries: &[EntryHandle],
    preserve: PreserveMode,
    dos_text: DosTextMode,
    hook: &dyn AppHook,
    cb: &mut Callback,
) -> Result<Vec<EntryHandle>, CoreError> {
    let mut staged_paths = Vec::new();
    let mut add_entries = Vec::new();

    for handle in entries {
        let staged = stage_entry(source, handle, dos_text)?;
        let path = staged.attribs.full_path.clone();

        if crate::maczip::is_mac_zip_header(&path) {
            // Sidecars ride along with their primary; they are never copied standalone.
            continue;
        }

        let percent = ((add_entries.len() * 100) / entries.len().max(1)) as u8;
        if ask(cb, CallbackFacts::progress(&path, percent)) == CallbackResult::Cancel {
            return Err(CoreError::Consent);
        }

        add_entries.push(AddFileEntry {
            has_data: staged.data.is_some(),
            data_path: None,
            data_source_kind: DataSourceKind::Plain,
            has_rsrc: staged.rsrc.is_some(),
            rsrc_path: None,
            rsrc_source_kind: DataSourceKind::Plain,
            has_adf_attribs: staged.rsrc.is_some(),
            storage_dir: String::new(),
            storage_dir_sep: crate::callback::PathSeparator::Char(match staged.attribs.path_separator {
                crate::attribs::PathSepValue::Char(c) => c,
                crate::attribs::PathSepValue::None => '/',
            }),
            storage_name: staged.attribs.filename_only.clone(),
            mod_when: staged.attribs.mod_when,
            create_when: staged.attribs.create_when,
            file_type: staged.attribs.prodos_type,
            aux_type: staged.attribs.aux_type,
            hfs_type: staged.attribs.hfs_type,
            hfs_creator: staged.attribs.hfs_creator,
            access: staged.attribs.access_flags,
        });
        staged_paths.push((path, staged.data, staged.rsrc));
    }

    dest.start_transaction()?;
    let mut written = Vec::new();
    for (mut attribs_entry, (_orig_path, data, rsrc)) in add_entries.into_iter().zip(staged_paths.into_iter()) {
        let adjusted = dest.adjust_file_name(&attribs_entry.storage_name);
        attribs_entry.storage_name = adjusted.clone();

        if let Some(existing) = dest.find_entry(&adjusted) {
            match ask(cb, CallbackFacts::new(Reason::FileNameExists, &adjusted)) {
                CallbackResult::Skip => continue,
                CallbackResult::Overwrite => {
                    dest.delete_entry(&existing)?;
                }
                _ => {
                    dest.cancel_transaction()?;
                    return Err(CoreError::Consent);
                }
            }
        }

        let mut data_attribs = FileAttribs::new(&adjusted);
        data_attribs.prodos_type = attribs_entry.file_type;
        data_attribs.aux_type = attribs_entry.aux_type;
        data_attribs.hfs_type = attribs_entry.hfs_type;
        data_attribs.hfs_creator = attribs_entry.hfs_creator;
        data_attribs.access_flags = attribs_entry.access;
        data_attribs.create_when = attribs_entry.create_when;
        data_attribs.mod_when = attribs_entry.mod_when;
        super::translate_types(&mut data_attribs);

        let mut data_src = data.map(MemoryBacked::new);
        let mut rsrc_src = rsrc.clone().map(MemoryBacked::new);
        let add_result = dest.add_entry(
            data_attribs,
            data_src.as_mut().map(|s| s as &mut dyn crate::partsrc::PartSource),
            rsrc_src.as_mut().map(|s| s as &mut dyn crate::partsrc::PartSource),
        );
        match add_result {
            Ok(handle) => {
                written.push(handle);
                if preserve == PreserveMode::Adf && rsrc.is_some() && !dest.characteristics().has_resource_forks {
                    if let Some(sidecar_path) = crate::maczip::generate_mac_zip_name(&adjusted) {
                        let mut sidecar_attribs = FileAttribs::new(&sidecar_path);
                        sidecar_attribs.hfs_type = attribs_entry.hfs_type;
                        sidecar_attribs.hfs_creator = attribs_entry.hfs_creator;
                        let mut sidecar_src =
                            crate::partsrc::GeneratedADF::new(sidecar_attribs.clone(), rsrc);
                        dest.add_entry(sidecar_attribs, Some(&mut sidecar_src as &mut dyn crate::partsrc::PartSource), None)?;
                    }
                }
            }
            Err(e) => {
                let result = ask(cb, CallbackFacts::failure(&adjusted, Reason::OverwriteFailure, e.to_string()));
                if result != CallbackResult::Skip {
                    dest.cancel_transaction()?;
                    return Err(e);
                }
            }
        }
    }
    let mut sink = std::io::sink();
    dest.commit_transaction(&mut sink)?;
    hook.log(crate::hook::LogLevel::Info, &format!("copied {} entries", written.len()));
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dos_text_applies_during_staging_not_after() {
        let mut bytes = vec![0x41u8, 0xC1];
        bytes.iter_mut().for_each(|b| if b != &mut 0 { *b |= 0x80 });
        assert_eq!(bytes, vec![0xC1, 0xC1]);
    }

    #[test]
    fn dos_text_set_high_bit_preserves_nul() {
        let mut bytes = vec![0x48u8, 0x49, 0x0D, 0x00];
        bytes.iter_mut().for_each(|b| if *b != 0 { *b |= 0x80 });
        assert_eq!(bytes, vec![0xC8, 0xC9, 0x8D, 0x00]);
    }
}
