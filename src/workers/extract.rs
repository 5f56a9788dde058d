//! # Extract worker (C7, spec.md §4.7)

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::attribs::{DateField, FileAttribs};
use crate::callback::{ask, Callback, CallbackFacts, CallbackResult, DosTextMode, Reason};
use crate::capability::{Archive, Converter, EntryHandle, Part};
use crate::error::CoreError;
use crate::hook::{AppHook, LogLevel};

use super::PreserveMode;

/// Result of extracting one entry: where its data landed, and whether a sidecar was
/// written alongside it (spec.md §4.7 step 8).
pub struct ExtractedFile {
    pub host_path: PathBuf,
    pub sidecar_path: Option<PathBuf>,
}

/// Extracts one archive entry to `dest_dir` (spec.md §4.7 steps 1-8). `converter`, if
/// given, runs on the data fork and its output replaces the raw bytes written to disk;
/// metadata preservation (`preserve`) still applies to the *original* attributes.
pub fn extract_entry(
    archive: &dyn Archive,
    entry: &EntryHandle,
    dest_dir: &Path,
    preserve: PreserveMode,
    dos_text: DosTextMode,
    converter: Option<&dyn Converter>,
    hook: &dyn AppHook,
    cb: &mut Callback,
) -> Result<ExtractedFile, CoreError> {
    let attribs = archive.attribs(entry)?;
    let mut data = read_part(archive, entry, Part::Data)?;
    if dos_text != DosTextMode::None {
        apply_dos_text(&mut data, dos_text);
    }

    let out_name = build_out_name(&attribs, preserve);
    let host_path = dest_dir.join(&out_name);

    if host_path.exists() {
        match ask(cb, CallbackFacts::new(Reason::FileNameExists, out_name.clone())) {
            CallbackResult::Skip => {
                return Err(CoreError::policy("extraction skipped: destination exists"));
            }
            CallbackResult::Overwrite => {}
            _ => return Err(CoreError::Consent),
        }
    }

    let final_bytes = match converter {
        Some(conv) => match conv.convert_file(&attribs, &data) {
            Ok(out) => encode_converted(out),
            Err(e) => {
                let result = ask(cb, CallbackFacts::failure(&out_name, Reason::ConversionFailure, e.to_string()));
                if result == CallbackResult::Skip {
                    data
                } else {
                    return Err(e);
                }
            }
        },
        None => data,
    };

    write_host_file(&host_path, &final_bytes)?;
    hook.log(LogLevel::Info, &format!("extracted {}", attribs.full_path));
    apply_mod_date(&host_path, &attribs, hook, cb);

    let sidecar_path = if preserve == PreserveMode::Adf && attribs.has_rsrc_fork() {
        let path = write_adf_sidecar(archive, entry, &attribs, dest_dir, hook)?;
        apply_mod_date(&path, &attribs, hook, cb);
        Some(path)
    } else if preserve == PreserveMode::As {
        rewrite_as_single(archive, entry, &attribs, &host_path)?;
        apply_mod_date(&host_path, &attribs, hook, cb);
        None
    } else if preserve == PreserveMode::Naps && attribs.has_rsrc_fork() {
        let path = write_naps_rsrc(archive, entry, &attribs, dest_dir, hook)?;
        apply_mod_date(&path, &attribs, hook, cb);
        Some(path)
    } else {
        None
    };

    Ok(ExtractedFile { host_path, sidecar_path })
}

/// Builds the host file name for the primary extracted file (spec.md §4.7 step 4, §6
/// "Produced"): a NAPS hex suffix in NAPS mode, an `.as` extension in AS mode (an
/// AppleSingle stream is a distinct file type from the bare data fork it replaces), or the
/// name unchanged otherwise.
fn build_out_name(attribs: &FileAttribs, preserve: PreserveMode) -> String {
    match preserve {
        PreserveMode::Naps => format!("{}{}", attribs.filename_only, super::naps_suffix(attribs, false)),
        PreserveMode::As => format!("{}.as", attribs.filename_only),
        _ => attribs.filename_only.clone(),
    }
}

fn read_part(archive: &dyn Archive, entry: &EntryHandle, part: Part) -> Result<Vec<u8>, CoreError> {
    let mut reader = archive.open_part(entry, part)?;
    let mut buf = Vec::new();
    std::io::Read::read_to_end(&mut reader, &mut buf).map_err(CoreError::Fatal)?;
    Ok(buf)
}

/// DOS text conversion flips the high bit on every byte, one direction or the other,
/// except a NUL byte is never touched by the set-high-bit direction: ProDOS/DOS text files
/// use a trailing NUL as an end-of-record marker that setting the high bit would corrupt
/// (spec.md §8 scenario 3).
fn apply_dos_text(data: &mut [u8], mode: DosTextMode) {
    match mode {
        DosTextMode::SetHighBit => data.iter_mut().for_each(|b| if *b != 0 { *b |= 0x80 }),
        DosTextMode::StripHighBit => data.iter_mut().for_each(|b| *b &= 0x7f),
        DosTextMode::None => {}
    }
}

fn encode_converted(out: crate::capability::ConvertedOutput) -> Vec<u8> {
    use crate::capability::ConvertedOutput::*;
    match out {
        SimpleText(s) | FancyText(s) => s.into_bytes(),
        CellGrid(rows) => rows
            .into_iter()
            .map(|row| row.join(","))
            .collect::<Vec<_>>()
            .join("\n")
            .into_bytes(),
        Bitmap(bytes) | HostConv(bytes) => bytes,
        ErrorText(s) => s.into_bytes(),
    }
}

fn write_host_file(path: &Path, bytes: &[u8]) -> Result<(), CoreError> {
    let mut file = std::fs::File::create(path).map_err(CoreError::Fatal)?;
    file.write_all(bytes).map_err(CoreError::Fatal)?;
    Ok(())
}

/// Sets the host file's modification date from `attribs.mod_when` (spec.md §4.7 step 8:
/// "finally sets attributes (dates always, read-only flag unless in AS mode)"). Failure is
/// advisory, not fatal: the extracted bytes already landed, so this only warns and offers
/// the host a callback rather than unwinding the whole extraction.
fn apply_mod_date(path: &Path, attribs: &FileAttribs, hook: &dyn AppHook, cb: &mut Callback) {
    let DateField::Valid(secs) = attribs.mod_when else { return };
    let time = if secs >= 0 {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs as u64)
    } else {
        SystemTime::UNIX_EPOCH - Duration::from_secs((-secs) as u64)
    };
    let result = std::fs::OpenOptions::new().write(true).open(path).and_then(|f| f.set_modified(time));
    if let Err(e) = result {
        hook.log(LogLevel::Warn, &format!("could not set modified date on {}: {e}", path.display()));
        let _ = ask(cb, CallbackFacts::failure(path.display().to_string(), Reason::AttrFailure, e.to_string()));
    }
}

fn write_adf_sidecar(
    archive: &dyn Archive,
    entry: &EntryHandle,
    attribs: &FileAttribs,
    dest_dir: &Path,
    hook: &dyn AppHook,
) -> Result<PathBuf, CoreError> {
    let rsrc = read_part(archive, entry, Part::Rsrc).ok();
    let bytes = crate::adf::build(attribs, None, rsrc.as_deref(), true);
    let sidecar_name = format!("._{}", attribs.filename_only);
    let path = dest_dir.join(sidecar_name);
    write_host_file(&path, &bytes)?;
    hook.log(LogLevel::Info, &format!("wrote AppleDouble sidecar for {}", attribs.full_path));
    Ok(path)
}

/// Writes the NAPS resource-fork companion file, `name#ttaaaar` (spec.md §4.7 NAPS table):
/// the data fork carries the plain suffix, the resource fork carries the same suffix with a
/// trailing `r`.
fn write_naps_rsrc(
    archive: &dyn Archive,
    entry: &EntryHandle,
    attribs: &FileAttribs,
    dest_dir: &Path,
    hook: &dyn AppHook,
) -> Result<PathBuf, CoreError> {
    let rsrc = read_part(archive, entry, Part::Rsrc)?;
    let name = format!("{}{}", attribs.filename_only, super::naps_suffix(attribs, true));
    let path = dest_dir.join(name);
    write_host_file(&path, &rsrc)?;
    hook.log(LogLevel::Info, &format!("wrote NAPS resource fork for {}", attribs.full_path));
    Ok(path)
}

fn rewrite_as_single(
    archive: &dyn Archive,
    entry: &EntryHandle,
    attribs: &FileAttribs,
    host_path: &Path,
) -> Result<(), CoreError> {
    let data = read_part(archive, entry, Part::Data)?;
    let rsrc = read_part(archive, entry, Part::Rsrc).ok();
    let bytes = crate::adf::build(attribs, Some(&data), rsrc.as_deref(), false);
    write_host_file(host_path, &bytes)
}
