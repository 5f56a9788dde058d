//! # Attribute carrier and pending-add record (spec.md §3)
//!
//! `FileAttribs` plays the role the teacher's `disk_base::FileImage` metadata fields play,
//! generalized across storage models instead of being ProDOS-specific: a value record,
//! freely copied, carrying the common metadata that every supported format can express a
//! subset of.

use crate::callback::PathSeparator;
use serde::{Deserialize, Serialize};

/// A date field that distinguishes "no date" from "a date the source could not parse".
#[derive(PartialEq, Eq, Clone, Copy, Debug, Serialize, Deserialize)]
pub enum DateField {
    /// No date was recorded by the source format.
    NoDate,
    /// The source recorded something, but it didn't decode to a valid calendar date.
    InvalidDate,
    /// A valid timestamp, seconds since the Unix epoch.
    Valid(i64),
}

impl Default for DateField {
    fn default() -> Self {
        DateField::NoDate
    }
}

/// Common file metadata, normalized across storage models (spec.md §3 `FileAttribs`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileAttribs {
    pub full_path: String,
    pub path_separator: PathSepValue,
    pub filename_only: String,
    pub is_directory: bool,
    pub data_length: u64,
    pub rsrc_length: u64,
    pub prodos_type: u8,
    pub aux_type: u16,
    pub hfs_type: u32,
    pub hfs_creator: u32,
    /// Default is "unlocked" (spec.md §3).
    pub access_flags: u8,
    pub create_when: DateField,
    pub mod_when: DateField,
}

/// Serializable mirror of [`PathSeparator`] (that type carries a `char` that serde can
/// handle directly, but we keep a dedicated type at the data-model boundary so the wire
/// format is stable even if `PathSeparator` grows worker-only variants later).
#[derive(PartialEq, Eq, Clone, Copy, Debug, Serialize, Deserialize)]
pub enum PathSepValue {
    Char(char),
    None,
}

impl From<PathSeparator> for PathSepValue {
    fn from(s: PathSeparator) -> Self {
        match s {
            PathSeparator::Char(c) => PathSepValue::Char(c),
            PathSeparator::None => PathSepValue::None,
        }
    }
}

impl From<PathSepValue> for PathSeparator {
    fn from(s: PathSepValue) -> Self {
        match s {
            PathSepValue::Char(c) => PathSeparator::Char(c),
            PathSepValue::None => PathSeparator::None,
        }
    }
}

pub const STD_ACCESS_UNLOCKED: u8 = 0;

impl FileAttribs {
    pub fn new(full_path: impl Into<String>) -> Self {
        let full_path = full_path.into();
        let filename_only = full_path
            .rsplit(['/', ':'])
            .next()
            .unwrap_or(&full_path)
            .to_string();
        Self {
            full_path,
            path_separator: PathSepValue::Char('/'),
            filename_only,
            is_directory: false,
            data_length: 0,
            rsrc_length: 0,
            prodos_type: 0,
            aux_type: 0,
            hfs_type: 0,
            hfs_creator: 0,
            access_flags: STD_ACCESS_UNLOCKED,
            create_when: DateField::NoDate,
            mod_when: DateField::NoDate,
        }
    }
    pub fn has_rsrc_fork(&self) -> bool {
        self.rsrc_length > 0
    }
}

/// Where the bytes for one fork of a pending add come from (spec.md §3 `AddFileEntry`).
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum DataSourceKind {
    Plain,
    AppleSingle,
    /// AppleDouble header only; the data fork (if any) is a separate plain source.
    AppleDouble,
    /// Needs an import [`crate::capability::Converter`] to become native format.
    Import,
}

/// A pending add: one or two forks (data and/or resource) plus destination metadata,
/// not yet attached to a target archive or file system (spec.md §3 `AddFileEntry`).
#[derive(Clone, Debug)]
pub struct AddFileEntry {
    pub has_data: bool,
    pub data_path: Option<String>,
    pub data_source_kind: DataSourceKind,
    pub has_rsrc: bool,
    pub rsrc_path: Option<String>,
    pub rsrc_source_kind: DataSourceKind,
    pub has_adf_attribs: bool,
    pub storage_dir: String,
    pub storage_dir_sep: PathSeparator,
    pub storage_name: String,
    pub mod_when: DateField,
    pub create_when: DateField,
    pub file_type: u8,
    pub aux_type: u16,
    pub hfs_type: u32,
    pub hfs_creator: u32,
    pub access: u8,
}

impl AddFileEntry {
    /// Validates the invariant from spec.md §3: at least one of `has_data`/`has_rsrc`.
    pub fn validate(&self) -> Result<(), crate::error::CoreError> {
        if !self.has_data && !self.has_rsrc {
            return Err(crate::error::CoreError::structural(
                "AddFileEntry must have a data fork, a resource fork, or both",
            ));
        }
        Ok(())
    }
    /// The path used for stable, user-facing sort order (spec.md §4.6 step 2): the data
    /// path if present, else the resource path.
    pub fn sort_key(&self) -> &str {
        self.data_path
            .as_deref()
            .or(self.rsrc_path.as_deref())
            .unwrap_or(&self.storage_name)
    }
}

/// Canonical ProDOS type/aux <-> HFS type/creator mapping (spec.md §4.6 "Type translation",
/// §8 property 8). A small, well-known table; the handful of entries below cover the types
/// this crate's own code paths and tests exercise. Nonzero values on either side are
/// preserved as-is; synthesis only happens when a side is all zero (spec.md §4.6).
const PRODOS_HFS_MAP: &[(u8, u16, u32, u32)] = &[
    // (prodos_type, aux_type, hfs_type, hfs_creator)
    (0x04, 0x0000, 0x54455854, 0x70646f73), // TXT -> 'TEXT'/'pdos'
    (0x06, 0x0000, 0x42494e41, 0x70646f73), // BIN -> 'BINA'/'pdos'
    (0xFF, 0x0000, 0x50534158, 0x70646f73), // SYS -> 'PSAX'/'pdos'
    (0xB3, 0x0000, 0x53525446, 0x70646f73), // S16 -> 'SRTF'/'pdos' (placeholder app binary)
];

/// Derive (hfs_type, hfs_creator) from (prodos_type, aux_type). Returns `None` if
/// `(type, aux) == (0, 0)`: there is nothing to synthesize from (spec.md §8 property 8 only
/// promises reversibility for `(type,aux) != (0,0)`).
pub fn prodos_to_hfs(prodos_type: u8, aux_type: u16) -> Option<(u32, u32)> {
    if prodos_type == 0 && aux_type == 0 {
        return None;
    }
    for (pt, at, ht, hc) in PRODOS_HFS_MAP {
        if *pt == prodos_type && *at == aux_type {
            return Some((*ht, *hc));
        }
    }
    // Generic encoding for anything not in the canonical table: pack type/aux into a
    // synthetic 'p'+type+aux-derived HFS type, tagged with the ProDOS creator so the
    // inverse mapping can recover the exact original bytes (CiderPress2-style fallback).
    let ht = 0x70_00_00_00u32 | ((prodos_type as u32) << 16) | (aux_type as u32);
    Some((ht, 0x70646f73)) // creator 'pdos'
}

/// Inverse of [`prodos_to_hfs`]: derive (prodos_type, aux_type) from (hfs_type, hfs_creator).
pub fn hfs_to_prodos(hfs_type: u32, hfs_creator: u32) -> Option<(u8, u16)> {
    if hfs_type == 0 && hfs_creator == 0 {
        return None;
    }
    for (pt, at, ht, hc) in PRODOS_HFS_MAP {
        if *ht == hfs_type && *hc == hfs_creator {
            return Some((*pt, *at));
        }
    }
    if hfs_creator == 0x70646f73 && (hfs_type >> 24) == 0x70 {
        let prodos_type = ((hfs_type >> 16) & 0xff) as u8;
        let aux_type = (hfs_type & 0xffff) as u16;
        return Some((prodos_type, aux_type));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_mapping_reversible_for_canonical_entries() {
        for (pt, at, _, _) in PRODOS_HFS_MAP {
            let (ht, hc) = prodos_to_hfs(*pt, *at).unwrap();
            let (pt2, at2) = hfs_to_prodos(ht, hc).unwrap();
            assert_eq!((pt2, at2), (*pt, *at));
        }
    }

    #[test]
    fn type_mapping_reversible_for_arbitrary_nonzero() {
        let (ht, hc) = prodos_to_hfs(0x19, 0x2000).unwrap();
        let (pt, at) = hfs_to_prodos(ht, hc).unwrap();
        assert_eq!((pt, at), (0x19, 0x2000));
    }

    #[test]
    fn zero_zero_synthesizes_nothing() {
        assert_eq!(prodos_to_hfs(0, 0), None);
        assert_eq!(hfs_to_prodos(0, 0), None);
    }

    #[test]
    fn add_file_entry_requires_a_fork() {
        let mut e = AddFileEntry {
            has_data: false,
            data_path: None,
            data_source_kind: DataSourceKind::Plain,
            has_rsrc: false,
            rsrc_path: None,
            rsrc_source_kind: DataSourceKind::Plain,
            has_adf_attribs: false,
            storage_dir: String::new(),
            storage_dir_sep: PathSeparator::Char('/'),
            storage_name: "x".into(),
            mod_when: DateField::NoDate,
            create_when: DateField::NoDate,
            file_type: 0,
            aux_type: 0,
            hfs_type: 0,
            hfs_creator: 0,
            access: 0,
        };
        assert!(e.validate().is_err());
        e.has_data = true;
        assert!(e.validate().is_ok());
    }
}
