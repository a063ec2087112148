//! Path helpers that treat `/vsizip/` virtual paths like ordinary files.
//!
//! The raster engine addresses members of a zip archive as
//! `/vsizip/<path to archive.zip>/<member path>`. Crawling and the format
//! drivers need to list, test and read such members without extracting them,
//! which is done here with the `zip` crate. Every other path goes straight to
//! `std::fs`.
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use zip::ZipArchive;

pub const VSIZIP_PREFIX: &str = "/vsizip/";

/// True when the path addresses a member of an archive
pub fn is_virtual(path: &Path) -> bool {
    path.to_string_lossy().starts_with(VSIZIP_PREFIX)
}

/// Build the virtual path of `member` inside `archive`
pub fn zip_member_path(archive: &Path, member: &str) -> PathBuf {
    PathBuf::from(format!("{VSIZIP_PREFIX}{}/{}", archive.display(), member))
}

/// Split a virtual path into (archive path, member path)
pub fn split_zip_path(path: &Path) -> Option<(PathBuf, String)> {
    let text = path.to_string_lossy();
    let rest = text.strip_prefix(VSIZIP_PREFIX)?;
    let lower = rest.to_ascii_lowercase();
    let idx = lower.find(".zip/")?;
    let archive = rest[..idx + 4].to_string();
    let member = rest[idx + 5..].to_string();
    Some((PathBuf::from(archive), member))
}

/// True when the lower-cased name looks like an archive we can expand
pub fn is_archive(path: &Path) -> bool {
    path.extension()
        .map(|e| e.eq_ignore_ascii_case("zip"))
        .unwrap_or(false)
}

fn open_archive(archive: &Path) -> io::Result<ZipArchive<File>> {
    let file = File::open(archive)?;
    ZipArchive::new(file).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// List the file members of an archive as virtual paths, sorted.
///
/// With `recurse` false only members at the archive root are returned.
pub fn archive_members(archive: &Path, recurse: bool) -> io::Result<Vec<PathBuf>> {
    let mut zip = open_archive(archive)?;
    let mut members = Vec::with_capacity(zip.len());
    for i in 0..zip.len() {
        let entry = zip
            .by_index(i)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        if !recurse && name.trim_end_matches('/').contains('/') {
            continue;
        }
        members.push(zip_member_path(archive, &name));
    }
    members.sort();
    Ok(members)
}

/// Does the file exist (on disk or inside its archive)?
pub fn exists(path: &Path) -> bool {
    match split_zip_path(path) {
        Some((archive, member)) => match open_archive(&archive) {
            Ok(mut zip) => {
                let found = zip.by_name(&member).is_ok();
                found
            }
            Err(_) => false,
        },
        None => path.is_file(),
    }
}

/// Read at most `limit` bytes from the start of the file
pub fn read_prefix(path: &Path, limit: usize) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    match split_zip_path(path) {
        Some((archive, member)) => {
            let mut zip = open_archive(&archive)?;
            let entry = zip
                .by_name(&member)
                .map_err(|e| io::Error::new(io::ErrorKind::NotFound, e))?;
            entry.take(limit as u64).read_to_end(&mut buf)?;
        }
        None => {
            File::open(path)?.take(limit as u64).read_to_end(&mut buf)?;
        }
    }
    Ok(buf)
}

/// Read the whole file
pub fn read(path: &Path) -> io::Result<Vec<u8>> {
    read_prefix(path, usize::MAX)
}

pub fn read_to_string(path: &Path) -> io::Result<String> {
    let bytes = read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Size of the file in bytes
pub fn file_len(path: &Path) -> io::Result<u64> {
    match split_zip_path(path) {
        Some((archive, member)) => {
            let mut zip = open_archive(&archive)?;
            let entry = zip
                .by_name(&member)
                .map_err(|e| io::Error::new(io::ErrorKind::NotFound, e))?;
            Ok(entry.size())
        }
        None => Ok(fs::metadata(path)?.len()),
    }
}

/// Files sharing the parent directory of `path` (including `path` itself), sorted
pub fn siblings(path: &Path) -> io::Result<Vec<PathBuf>> {
    match split_zip_path(path) {
        Some((archive, member)) => {
            let dir = match member.rfind('/') {
                Some(idx) => member[..idx + 1].to_string(),
                None => String::new(),
            };
            let mut zip = open_archive(&archive)?;
            let mut out = Vec::new();
            for i in 0..zip.len() {
                let entry = zip
                    .by_index(i)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                let name = entry.name();
                if entry.is_dir() {
                    continue;
                }
                if let Some(rest) = name.strip_prefix(dir.as_str()) {
                    if !rest.contains('/') {
                        out.push(zip_member_path(&archive, name));
                    }
                }
            }
            out.sort();
            Ok(out)
        }
        None => {
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            let mut out = Vec::new();
            for entry in fs::read_dir(dir)? {
                let p = entry?.path();
                if p.is_file() {
                    out.push(p);
                }
            }
            out.sort();
            Ok(out)
        }
    }
}

/// Resolve `name` next to `path`, matching case-insensitively against existing
/// siblings. Falls back to the literal joined path when nothing matches so the
/// caller can still report the reference as missing.
pub fn sibling(path: &Path, name: &str) -> PathBuf {
    if let Ok(all) = siblings(path) {
        if let Some(found) = all.into_iter().find(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy().eq_ignore_ascii_case(name))
                .unwrap_or(false)
        }) {
            return found;
        }
    }
    match path.parent() {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    }
}

/// Lower-cased basename used for pattern matching
pub fn basename_lower(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}
