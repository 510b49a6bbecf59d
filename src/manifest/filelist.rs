//! Checksummed file list shipped at the root of a cpk package.
//!
//! One line per entry:
//!
//! ```text
//! F,<path>,<size>,<mode>,<sha1>
//! D,<path>,<size>,<mode>
//! ```

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use sha1::{Digest, Sha1};

use crate::error::{ManifestContext, Result};
use crate::staging;

pub const FILE_MODE: u32 = 0o666;
pub const DIR_MODE: u32 = 0o777;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileListEntry {
    File {
        path: String,
        size: u64,
        mode: u32,
        sha1: String,
    },
    Dir {
        path: String,
        size: u64,
        mode: u32,
    },
}

impl fmt::Display for FileListEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileListEntry::File {
                path,
                size,
                mode,
                sha1,
            } => write!(f, "F,{path},{size},{mode:04o},{sha1}"),
            FileListEntry::Dir { path, size, mode } => write!(f, "D,{path},{size},{mode:04o}"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileList {
    entries: Vec<FileListEntry>,
}

impl FileList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `local` (a file already written to disk) under package path
    /// `path`, hashing its bytes.
    pub fn push_file(&mut self, path: &str, local: &Path) -> Result<()> {
        let (sha1, size) = sha1_file(local)?;
        self.entries.push(FileListEntry::File {
            path: path.to_string(),
            size,
            mode: FILE_MODE,
            sha1,
        });
        Ok(())
    }

    pub fn push_dir(&mut self, path: &str) {
        self.entries.push(FileListEntry::Dir {
            path: path.to_string(),
            size: 0,
            mode: DIR_MODE,
        });
    }

    pub fn entries(&self) -> &[FileListEntry] {
        &self.entries
    }

    /// Newline-separated entries, no trailing newline.
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn write_to(&self, staging_dir: &Path, rel: &str) -> Result<()> {
        staging::write_file(staging_dir, rel, self.render())?;
        Ok(())
    }
}

fn sha1_file(path: &Path) -> Result<(String, u64)> {
    let f = File::open(path).manifest_context(|| format!("opening '{}'", path.display()))?;
    let mut r = BufReader::new(f);
    let mut hasher = Sha1::new();
    let mut buf = vec![0u8; 1024 * 1024];
    let mut size = 0u64;
    loop {
        let n = r
            .read(&mut buf)
            .manifest_context(|| format!("hashing '{}'", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    Ok((format!("{:x}", hasher.finalize()), size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn file_entry_carries_size_mode_and_sha1() {
        let temp = TempDir::new().unwrap();
        let local = temp.path().join("hello.txt");
        fs::write(&local, "hello").unwrap();

        let mut list = FileList::new();
        list.push_file("/hello.txt", &local).unwrap();

        assert_eq!(
            list.render(),
            "F,/hello.txt,5,0666,aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d"
        );
    }

    #[test]
    fn entries_keep_insertion_order_without_trailing_newline() {
        let temp = TempDir::new().unwrap();
        let local = temp.path().join("empty");
        fs::write(&local, "").unwrap();

        let mut list = FileList::new();
        list.push_file("/image.json", &local).unwrap();
        list.push_dir("/image");

        let rendered = list.render();
        assert_eq!(
            rendered,
            "F,/image.json,0,0666,da39a3ee5e6b4b0d3255bfef95601890afd80709\nD,/image,0,0777"
        );
        assert!(!rendered.ends_with('\n'));
    }

    #[test]
    fn missing_file_is_a_manifest_error() {
        let temp = TempDir::new().unwrap();
        let mut list = FileList::new();

        let err = list
            .push_file("/absent", &temp.path().join("absent"))
            .unwrap_err();

        assert!(err.to_string().starts_with("manifest: opening"));
        assert!(list.entries().is_empty());
    }

    #[test]
    fn write_to_places_list_in_staging() {
        let temp = TempDir::new().unwrap();
        let mut list = FileList::new();
        list.push_dir("/image");

        list.write_to(temp.path(), "filelist").unwrap();

        assert_eq!(
            fs::read_to_string(temp.path().join("filelist")).unwrap(),
            "D,/image,0,0777"
        );
    }
}
