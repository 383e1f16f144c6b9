use std::collections::HashMap;
use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

use zip::result::ZipError;
use zip::write::SimpleFileOptions;

use crate::error::Error;

pub(crate) type Archive<'a> = zip::ZipArchive<Cursor<&'a [u8]>>;

pub(crate) fn open(bytes: &[u8]) -> Result<Archive<'_>, Error> {
    zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|_| Error::InvalidDocx("file is not a ZIP archive".into()))
}

fn strip_bom(mut content: String) -> String {
    if content.starts_with('\u{feff}') {
        content.drain(..'\u{feff}'.len_utf8());
    }
    content
}

/// Read a UTF-8 part. `Ok(None)` when the archive has no such entry.
pub(crate) fn read_text(archive: &mut Archive, name: &str) -> Result<Option<String>, Error> {
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(Error::InvalidDocx(format!("cannot read {name}: {e}"))),
    };
    let mut content = String::new();
    file.read_to_string(&mut content)
        .map_err(|e| Error::InvalidDocx(format!("cannot read {name}: {e}")))?;
    Ok(Some(strip_bom(content)))
}

/// Write a new archive with the same entries in the same order. Entries in
/// `replaced` are re-encoded with their original compression method; every
/// other entry is copied raw, so its stored bytes are unchanged. `added`
/// entries are appended at the end.
pub(crate) fn repack(
    archive: &mut Archive,
    replaced: &HashMap<String, Vec<u8>>,
    added: &[(String, Vec<u8>)],
) -> Result<Vec<u8>, Error> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for i in 0..archive.len() {
        let entry = archive.by_index_raw(i)?;
        match replaced.get(entry.name()) {
            Some(data) => {
                let name = entry.name().to_string();
                let options = SimpleFileOptions::default().compression_method(entry.compression());
                drop(entry);
                writer.start_file(name, options)?;
                writer.write_all(data)?;
            }
            None => writer.raw_copy_file(entry)?,
        }
    }
    let deflated =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    for (name, data) in added {
        writer.start_file(name.as_str(), deflated)?;
        writer.write_all(data)?;
    }
    Ok(writer.finish()?.into_inner())
}

/// Per-call working directory holding an unpacked copy of the archive.
/// Removed recursively when dropped, on success and error paths alike.
pub(crate) struct Scratch {
    dir: tempfile::TempDir,
}

impl Scratch {
    pub fn new() -> Result<Self, Error> {
        let dir = tempfile::Builder::new().prefix("docx-markers-").tempdir()?;
        log::debug!("Scratch directory {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn part_path(&self, name: &str) -> PathBuf {
        name.split('/').fold(self.path().to_path_buf(), |p, seg| p.join(seg))
    }

    pub fn unpack(&self, archive: &mut Archive) -> Result<(), Error> {
        archive.extract(self.path()).map_err(|e| match e {
            ZipError::Io(io) => Error::Io(io),
            other => Error::InvalidDocx(format!("cannot unpack archive: {other}")),
        })
    }

    pub fn read(&self, name: &str) -> Result<Vec<u8>, Error> {
        Ok(fs::read(self.part_path(name))?)
    }

    pub fn read_text(&self, name: &str) -> Result<Option<String>, Error> {
        let path = self.part_path(name);
        if !path.is_file() {
            return Ok(None);
        }
        let content = String::from_utf8(fs::read(&path)?)
            .map_err(|_| Error::InvalidDocx(format!("{name} is not UTF-8")))?;
        Ok(Some(strip_bom(content)))
    }

    pub fn write(&self, name: &str, data: &[u8]) -> Result<(), Error> {
        let path = self.part_path(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, data)?;
        Ok(())
    }

    /// File names directly inside a package directory, e.g. `word/media`.
    pub fn list(&self, dir: &str) -> Result<Vec<String>, Error> {
        let path = self.part_path(dir);
        if !path.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(names)
    }
}
