//! In-memory OPC package backed by a zip archive.
//!
//! The archive is loaded once. Parts are read on demand, replaced or added in memory,
//! and the whole archive is re-serialized at the end. Entries that were never replaced
//! are raw-copied (compressed data and headers as-is), so they come out byte-identical.

use std::collections::HashMap;
use std::io::{Cursor, Read, Write};

use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{DocxError, Result};

pub struct Package {
    archive: ZipArchive<Cursor<Vec<u8>>>,
    replaced: HashMap<String, Vec<u8>>,
    added: Vec<(String, Vec<u8>)>,
}

impl std::fmt::Debug for Package {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Package")
            .field("entries", &self.archive.len())
            .field("replaced", &self.replaced.keys().collect::<Vec<_>>())
            .field(
                "added",
                &self.added.iter().map(|(name, _)| name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Package {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let archive = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| DocxError::MalformedArchive(format!("Cannot read zip archive: {}", e)))?;
        Ok(Self {
            archive,
            replaced: HashMap::new(),
            added: Vec::new(),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.replaced.contains_key(name)
            || self.added.iter().any(|(n, _)| n == name)
            || self.archive.index_for_name(name).is_some()
    }

    /// Current bytes of a part, including in-memory replacements. `None` if absent.
    pub fn read(&mut self, name: &str) -> Result<Option<Vec<u8>>> {
        if let Some(bytes) = self.replaced.get(name) {
            return Ok(Some(bytes.clone()));
        }
        if let Some((_, bytes)) = self.added.iter().find(|(n, _)| n == name) {
            return Ok(Some(bytes.clone()));
        }
        let Some(index) = self.archive.index_for_name(name) else {
            return Ok(None);
        };
        let mut entry = self.archive.by_index(index).map_err(|e| {
            DocxError::MalformedArchive(format!("Cannot open part '{}': {}", name, e))
        })?;
        let mut buf = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut buf).map_err(|e| {
            DocxError::MalformedArchive(format!("Cannot read part '{}': {}", name, e))
        })?;
        Ok(Some(buf))
    }

    /// Current content of a part as UTF-8 text. `None` if absent.
    pub fn read_string(&mut self, name: &str) -> Result<Option<String>> {
        match self.read(name)? {
            Some(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|_| DocxError::Utf8 {
                    part: name.to_string(),
                }),
            None => Ok(None),
        }
    }

    /// Replace an existing part or add a new one.
    pub fn put(&mut self, name: &str, bytes: Vec<u8>) {
        if self.archive.index_for_name(name).is_some() {
            self.replaced.insert(name.to_string(), bytes);
        } else if let Some(slot) = self.added.iter_mut().find(|(n, _)| n == name) {
            slot.1 = bytes;
        } else {
            self.added.push((name.to_string(), bytes));
        }
    }

    /// Re-serialize the archive. Original entry order is kept; added parts go last.
    pub fn to_bytes(mut self) -> Result<Vec<u8>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

        for i in 0..self.archive.len() {
            let file = self
                .archive
                .by_index_raw(i)
                .map_err(|e| packaging(&format!("entry #{}", i), e))?;
            let name = file.name().to_string();
            match self.replaced.remove(&name) {
                Some(bytes) => {
                    let method = match file.compression() {
                        CompressionMethod::Stored => CompressionMethod::Stored,
                        _ => CompressionMethod::Deflated,
                    };
                    drop(file);
                    let options = SimpleFileOptions::default().compression_method(method);
                    writer
                        .start_file(name.as_str(), options)
                        .map_err(|e| packaging(&name, e))?;
                    writer.write_all(&bytes).map_err(|e| packaging(&name, e))?;
                    debug!("Rewrote part {} ({} bytes)", name, bytes.len());
                }
                None => writer
                    .raw_copy_file(file)
                    .map_err(|e| packaging(&name, e))?,
            }
        }

        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        for (name, bytes) in &self.added {
            writer
                .start_file(name.as_str(), options)
                .map_err(|e| packaging(name, e))?;
            writer.write_all(bytes).map_err(|e| packaging(name, e))?;
            debug!("Added part {} ({} bytes)", name, bytes.len());
        }

        let cursor = writer
            .finish()
            .map_err(|e| packaging("central directory", e))?;
        Ok(cursor.into_inner())
    }
}

fn packaging(what: &str, e: impl std::fmt::Display) -> DocxError {
    DocxError::PackagingFailure(format!("Cannot write {}: {}", what, e))
}

/// Directory part of a part name (`word/document.xml` → `word`).
pub fn part_dir(part: &str) -> &str {
    part.rfind('/').map(|i| &part[..i]).unwrap_or("")
}

/// Relationships part belonging to `part` (`word/document.xml` → `word/_rels/document.xml.rels`).
pub fn rels_part_for(part: &str) -> String {
    match part.rfind('/') {
        Some(i) => format!("{}/_rels/{}.rels", &part[..i], &part[i + 1..]),
        None => format!("_rels/{}.rels", part),
    }
}

/// Resolve a relationship target against the directory of its source part.
pub fn resolve_target(source_dir: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut segments: Vec<&str> = source_dir.split('/').filter(|s| !s.is_empty()).collect();
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Relative target for `part` as seen from a source part living in `source_dir`.
pub fn relative_target(source_dir: &str, part: &str) -> String {
    match part.strip_prefix(source_dir).and_then(|rest| rest.strip_prefix('/')) {
        Some(rest) if !source_dir.is_empty() => rest.to_string(),
        _ => format!("/{}", part),
    }
}
