//! # AppleSingle / AppleDouble encoding (spec.md glossary, §4.2, §4.3, §4.7, §4.9)
//!
//! AppleSingle packs a whole forked file (both forks plus metadata) into one stream.
//! AppleDouble splits it: a bare data-fork file alongside a `._name` header holding
//! metadata and the resource fork. Both share the same container format — only the set of
//! entries differs (AppleDouble omits the data-fork entry, since that lives in the sibling
//! file). Layout follows the `other_examples` AppleSingle reference
//! (`jyelloz-forkcordion::src::applesingle`), reimplemented with `binrw` since the teacher
//! crate already depends on it for binary record packing.

use binrw::{BinWrite, BinRead};
use std::io::Cursor;

use crate::attribs::{DateField, FileAttribs};
use crate::error::CoreError;

pub const MAGIC_APPLESINGLE: u32 = 0x0005_1600;
pub const MAGIC_APPLEDOUBLE: u32 = 0x0005_1607;
const VERSION: u32 = 0x0002_0000;

const ENTRY_DATA_FORK: u32 = 1;
const ENTRY_RESOURCE_FORK: u32 = 2;
const ENTRY_REAL_NAME: u32 = 3;
const ENTRY_FILE_DATES: u32 = 8;
const ENTRY_FINDER_INFO: u32 = 9;

/// Mac epoch (1904-01-01) offset from the Unix epoch, in seconds.
const MAC_EPOCH_OFFSET: i64 = 2_082_844_800;

#[derive(BinWrite, BinRead, Clone, Copy, Debug)]
#[brw(big)]
struct RawHeader {
    magic: u32,
    version: u32,
    #[brw(pad_before = 16)]
    n_entries: u16,
}

#[derive(BinWrite, BinRead, Clone, Copy, Debug)]
#[brw(big)]
struct RawEntry {
    id: u32,
    offset: u32,
    length: u32,
}

/// One decoded entry's payload, as produced by [`parse`].
#[derive(Clone, Debug)]
pub enum Segment {
    DataFork(Vec<u8>),
    ResourceFork(Vec<u8>),
    RealName(String),
    FileDates { create: i64, modify: i64 },
    FinderInfo { hfs_type: u32, hfs_creator: u32 },
    Other { id: u32, data: Vec<u8> },
}

/// The decoded contents of an AppleSingle/AppleDouble stream.
#[derive(Clone, Debug, Default)]
pub struct Container {
    pub is_double: bool,
    pub data_fork: Option<Vec<u8>>,
    pub resource_fork: Option<Vec<u8>>,
    pub real_name: Option<String>,
    pub create_when: Option<i64>,
    pub mod_when: Option<i64>,
    pub hfs_type: Option<u32>,
    pub hfs_creator: Option<u32>,
}

fn mac_time(unix_secs: i64) -> u32 {
    (unix_secs + MAC_EPOCH_OFFSET) as u32
}

fn unix_time(mac_secs: u32) -> i64 {
    mac_secs as i64 - MAC_EPOCH_OFFSET
}

/// Build an AppleSingle (both forks combined) or AppleDouble (header only; the data fork
/// is a sibling file) byte stream from normalized attributes plus optional fork contents.
///
/// `data` is included as an entry only when `is_double` is false: AppleDouble headers never
/// carry the data fork (spec.md glossary: "AppleDouble = two files").
pub fn build(
    attribs: &FileAttribs,
    data: Option<&[u8]>,
    rsrc: Option<&[u8]>,
    is_double: bool,
) -> Vec<u8> {
    let mut entries: Vec<(u32, Vec<u8>)> = Vec::new();

    if !is_double {
        if let Some(d) = data {
            entries.push((ENTRY_DATA_FORK, d.to_vec()));
        }
    }
    if let Some(r) = rsrc {
        entries.push((ENTRY_RESOURCE_FORK, r.to_vec()));
    }
    entries.push((ENTRY_REAL_NAME, attribs.filename_only.clone().into_bytes()));

    let create = match attribs.create_when {
        DateField::Valid(t) => mac_time(t),
        _ => 0,
    };
    let modify = match attribs.mod_when {
        DateField::Valid(t) => mac_time(t),
        _ => 0,
    };
    let mut dates_buf = Vec::with_capacity(16);
    dates_buf.extend_from_slice(&create.to_be_bytes());
    dates_buf.extend_from_slice(&modify.to_be_bytes());
    dates_buf.extend_from_slice(&0u32.to_be_bytes()); // backup
    dates_buf.extend_from_slice(&0u32.to_be_bytes()); // access
    entries.push((ENTRY_FILE_DATES, dates_buf));

    let mut finfo = Vec::with_capacity(16);
    finfo.extend_from_slice(&attribs.hfs_type.to_be_bytes());
    finfo.extend_from_slice(&attribs.hfs_creator.to_be_bytes());
    finfo.extend_from_slice(&[0u8; 8]); // flags + location, unused here
    entries.push((ENTRY_FINDER_INFO, finfo));

    let magic = if is_double { MAGIC_APPLEDOUBLE } else { MAGIC_APPLESINGLE };
    let header = RawHeader {
        magic,
        version: VERSION,
        n_entries: entries.len() as u16,
    };

    let mut out = Vec::new();
    let mut cursor = Cursor::new(&mut out);
    header.write(&mut cursor).expect("header always serializes");

    // offset of the first entry's data: 26-byte fixed header + 12 bytes per entry record.
    let mut offset = 26 + 12 * entries.len() as u32;
    let mut raw_entries = Vec::with_capacity(entries.len());
    for (id, bytes) in &entries {
        raw_entries.push(RawEntry { id: *id, offset, length: bytes.len() as u32 });
        offset += bytes.len() as u32;
    }
    for entry in &raw_entries {
        entry.write(&mut cursor).expect("entry record always serializes");
    }
    for (_, bytes) in &entries {
        std::io::Write::write_all(&mut cursor, bytes).expect("in-memory write cannot fail");
    }
    out
}

/// Parse an AppleSingle or AppleDouble byte stream (spec.md §4.3 `extract_mac_zip_attribs`,
/// §4.7 `AS` mode extraction).
pub fn parse(bytes: &[u8]) -> Result<Container, CoreError> {
    if bytes.len() < 26 {
        return Err(CoreError::structural("AppleSingle/Double stream too short for header"));
    }
    let mut cursor = Cursor::new(bytes);
    let header = RawHeader::read(&mut cursor)
        .map_err(|e| CoreError::structural(format!("bad AppleSingle/Double header: {e}")))?;
    let is_double = match header.magic {
        MAGIC_APPLESINGLE => false,
        MAGIC_APPLEDOUBLE => true,
        _ => return Err(CoreError::structural("not an AppleSingle/Double magic number")),
    };
    let mut container = Container { is_double, ..Default::default() };
    let mut raw_entries = Vec::with_capacity(header.n_entries as usize);
    for _ in 0..header.n_entries {
        let entry = RawEntry::read(&mut cursor)
            .map_err(|e| CoreError::structural(format!("bad AppleSingle/Double entry: {e}")))?;
        raw_entries.push(entry);
    }
    for entry in raw_entries {
        let start = entry.offset as usize;
        let end = start + entry.length as usize;
        let slice = bytes.get(start..end).ok_or_else(|| {
            CoreError::structural("AppleSingle/Double entry extends past end of stream")
        })?;
        match entry.id {
            ENTRY_DATA_FORK => container.data_fork = Some(slice.to_vec()),
            ENTRY_RESOURCE_FORK => container.resource_fork = Some(slice.to_vec()),
            ENTRY_REAL_NAME => {
                container.real_name = Some(String::from_utf8_lossy(slice).into_owned())
            }
            ENTRY_FILE_DATES if slice.len() >= 8 => {
                let create = u32::from_be_bytes(slice[0..4].try_into().unwrap());
                let modify = u32::from_be_bytes(slice[4..8].try_into().unwrap());
                container.create_when = Some(unix_time(create));
                container.mod_when = Some(unix_time(modify));
            }
            ENTRY_FINDER_INFO if slice.len() >= 8 => {
                container.hfs_type = Some(u32::from_be_bytes(slice[0..4].try_into().unwrap()));
                container.hfs_creator = Some(u32::from_be_bytes(slice[4..8].try_into().unwrap()));
            }
            _ => {}
        }
    }
    Ok(container)
}
