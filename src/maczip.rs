//! # MacZip pairing (C3, spec.md §4.3)
//!
//! ZIP lacks resource forks and Apple type metadata. The MacZip convention, originated by
//! macOS Finder, pairs `a/b/name` with `a/b/__MACOSX/._name`, the latter an AppleDouble
//! stream holding metadata and the resource fork.

use crate::attribs::FileAttribs;
use crate::capability::Archive;
use crate::error::CoreError;

const MACOSX_DIR: &str = "__MACOSX";

/// Returns the sidecar name for `path`, or `None` if `path` is already a sidecar itself
/// (spec.md §4.3: "starts with `__MACOSX/` or contains `/__MACOSX/`").
pub fn generate_mac_zip_name(path: &str) -> Option<String> {
    if is_mac_zip_header(path) {
        return None;
    }
    match path.rfind('/') {
        Some(idx) => {
            let (dir, name) = path.split_at(idx);
            let name = &name[1..]; // drop the separator
            Some(format!("{dir}/{MACOSX_DIR}/._{name}"))
        }
        None => Some(format!("{MACOSX_DIR}/._{path}")),
    }
}

/// Identifies the sidecar form: starts with `__MACOSX/`, or contains `/__MACOSX/`.
pub fn is_mac_zip_header(path: &str) -> bool {
    path.starts_with(&format!("{MACOSX_DIR}/")) || path.contains(&format!("/{MACOSX_DIR}/"))
}

/// Recover the primary name a sidecar path refers to, or `None` if `path` is not a sidecar.
/// This is the left inverse used by extract/copy to find a sidecar's primary.
pub fn primary_name_for_sidecar(path: &str) -> Option<String> {
    if !is_mac_zip_header(path) {
        return None;
    }
    let (dir_prefix, rest) = match path.find(&format!("{MACOSX_DIR}/")) {
        Some(idx) => (&path[..idx], &path[idx + MACOSX_DIR.len() + 1..]),
        None => return None,
    };
    let fname = rest.strip_prefix("._")?;
    Some(format!("{dir_prefix}{fname}"))
}

/// Open `sidecar_entry` as an AppleDouble stream and return its metadata, with the primary
/// filename preserved from the caller rather than taken from the sidecar's embedded real
/// name (spec.md §4.3 `extract_mac_zip_attribs`).
pub fn extract_mac_zip_attribs(
    archive: &dyn Archive,
    sidecar_path: &str,
    primary_full_path: &str,
) -> Result<FileAttribs, CoreError> {
    let entry = archive
        .find_entry(sidecar_path)
        .ok_or_else(|| CoreError::structural(format!("sidecar entry {sidecar_path} not found")))?;
    let mut reader = archive.open_part(&entry, crate::capability::Part::Data)?;
    let mut bytes = Vec::new();
    std::io::Read::read_to_end(&mut reader, &mut bytes)
        .map_err(|e| CoreError::structural(format!("could not read sidecar: {e}")))?;
    let parsed = crate::adf::parse(&bytes)?;

    let mut attribs = FileAttribs::new(primary_full_path);
    if let Some(hfs_type) = parsed.hfs_type {
        attribs.hfs_type = hfs_type;
    }
    if let Some(hfs_creator) = parsed.hfs_creator {
        attribs.hfs_creator = hfs_creator;
    }
    if let Some(create) = parsed.create_when {
        attribs.create_when = crate::attribs::DateField::Valid(create);
    }
    if let Some(modify) = parsed.mod_when {
        attribs.mod_when = crate::attribs::DateField::Valid(modify);
    }
    attribs.rsrc_length = parsed.resource_fork.as_ref().map(|r| r.len() as u64).unwrap_or(0);
    Ok(attribs)
}
