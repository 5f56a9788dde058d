//! # Transfer workers (C6-C8, spec.md §4.6-§4.8)
//!
//! Add, Extract, and Copy share the same metadata-preservation vocabulary and the same
//! callback-driven collision/error handling, so the common pieces live here and the three
//! pipelines each pull from it.

pub mod add;
pub mod copy;
pub mod extract;

use crate::attribs::FileAttribs;
use serde::{Deserialize, Serialize};

/// How a transfer carries Apple metadata that the destination can't store natively
/// (spec.md §4.6 "preserve modes").
#[derive(PartialEq, Eq, Clone, Copy, Debug, Serialize, Deserialize)]
pub enum PreserveMode {
    /// Drop anything the destination can't represent natively.
    None,
    /// Write a `__MACOSX/._name` AppleDouble sidecar alongside the primary entry.
    Adf,
    /// Combine both forks plus metadata into one AppleSingle stream.
    As,
    /// Use the host file system's native extended-attribute mechanism (passthrough; the
    /// CORE does not implement the OS-specific half of this, only threads the mode through).
    Host,
    /// NuFX Attribute Preservation String: append `#ttaaaa` (hex file type, hex aux type)
    /// to the host file name.
    Naps,
}

/// Decoded form of a NAPS suffix (spec.md §4.7 NAPS table): ProDOS type/aux when the file
/// carries one, otherwise the HFS type/creator, hex-encoded.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum NapsTypeInfo {
    Prodos { file_type: u8, aux_type: u16 },
    Hfs { hfs_type: u32, hfs_creator: u32 },
}

/// Encode a NAPS suffix for `attribs` (spec.md §4.6, §4.7, §4.9 NAPS mode): `#ttaaaa` from
/// the ProDOS type/aux when either is set, otherwise `#ttttttttcccccccc` hex of the HFS
/// type/creator. `for_rsrc` appends the trailing `r` marker the resource-fork companion
/// file carries (spec.md §4.7 table).
pub fn naps_suffix(attribs: &FileAttribs, for_rsrc: bool) -> String {
    let body = if attribs.prodos_type != 0 || attribs.aux_type != 0 {
        format!("{}{}", hex::encode([attribs.prodos_type]), hex::encode(attribs.aux_type.to_be_bytes()))
    } else {
        format!("{}{}", hex::encode(attribs.hfs_type.to_be_bytes()), hex::encode(attribs.hfs_creator.to_be_bytes()))
    };
    format!("#{body}{}", if for_rsrc { "r" } else { "" })
}

/// Decode a NAPS suffix from the end of `name`, if present. Returns `(base_name, info, is_rsrc)`.
pub fn naps_decode(name: &str) -> Option<(&str, NapsTypeInfo, bool)> {
    let idx = name.rfind('#')?;
    let (base, tail) = name.split_at(idx);
    let tail = &tail[1..];
    let (hex_part, is_rsrc) = match tail.strip_suffix('r') {
        Some(stripped) => (stripped, true),
        None => (tail, false),
    };
    let bytes = hex::decode(hex_part).ok()?;
    match bytes.len() {
        3 => {
            let file_type = bytes[0];
            let aux_type = u16::from_be_bytes([bytes[1], bytes[2]]);
            Some((base, NapsTypeInfo::Prodos { file_type, aux_type }, is_rsrc))
        }
        8 => {
            let hfs_type = u32::from_be_bytes(bytes[0..4].try_into().ok()?);
            let hfs_creator = u32::from_be_bytes(bytes[4..8].try_into().ok()?);
            Some((base, NapsTypeInfo::Hfs { hfs_type, hfs_creator }, is_rsrc))
        }
        _ => None,
    }
}

/// Translates type metadata across the ProDOS/HFS boundary whenever one side is unset,
/// leaving both sides untouched when both already carry nonzero values (spec.md §4.6
/// "Type translation").
pub fn translate_types(attribs: &mut FileAttribs) {
    let prodos_set = attribs.prodos_type != 0 || attribs.aux_type != 0;
    let hfs_set = attribs.hfs_type != 0 || attribs.hfs_creator != 0;
    match (prodos_set, hfs_set) {
        (true, false) => {
            if let Some((ht, hc)) = crate::attribs::prodos_to_hfs(attribs.prodos_type, attribs.aux_type) {
                attribs.hfs_type = ht;
                attribs.hfs_creator = hc;
            }
        }
        (false, true) => {
            if let Some((pt, at)) = crate::attribs::hfs_to_prodos(attribs.hfs_type, attribs.hfs_creator) {
                attribs.prodos_type = pt;
                attribs.aux_type = at;
            }
        }
        _ => {}
    }
}
