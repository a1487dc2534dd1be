#[cfg(test)]
use std::collections::HashMap;
use std::{
    fs::File,
    io::{BufReader, Read},
    path::{Path, PathBuf},
};

use zip::{result::ZipError, ZipArchive};

use crate::error::PipelineError;

/// Somewhere GTFS tables can be read from, by file name (`stops.txt`, ...).
///
/// `Ok(None)` means the table is absent, which is legal for optional tables.
pub trait TableSource {
    fn open(&mut self, name: &str) -> Result<Option<Box<dyn Read + '_>>, PipelineError>;
}

/// A GTFS zip archive read in place, without extraction.
pub struct ZipSource {
    archive: ZipArchive<BufReader<File>>,
}

impl ZipSource {
    pub fn new(path: &Path) -> Result<Self, PipelineError> {
        let file = BufReader::new(File::open(path)?);
        Ok(Self {
            archive: ZipArchive::new(file)?,
        })
    }
}

impl TableSource for ZipSource {
    fn open(&mut self, name: &str) -> Result<Option<Box<dyn Read + '_>>, PipelineError> {
        match self.archive.by_name(name) {
            Ok(entry) => Ok(Some(Box::new(entry))),
            Err(ZipError::FileNotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// An already extracted GTFS feed.
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }
}

impl TableSource for DirectorySource {
    fn open(&mut self, name: &str) -> Result<Option<Box<dyn Read + '_>>, PipelineError> {
        let path = self.root.join(name);
        if !path.is_file() {
            return Ok(None);
        }
        Ok(Some(Box::new(BufReader::new(File::open(path)?))))
    }
}

/// Tables held in memory, used for synthetic feeds.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemorySource {
    tables: HashMap<String, String>,
}

#[cfg(test)]
impl MemorySource {
    pub fn with(mut self, name: &str, contents: &str) -> Self {
        self.tables.insert(name.to_owned(), contents.to_owned());
        self
    }
}

#[cfg(test)]
impl TableSource for MemorySource {
    fn open(&mut self, name: &str) -> Result<Option<Box<dyn Read + '_>>, PipelineError> {
        Ok(self
            .tables
            .get(name)
            .map(|contents| Box::new(contents.as_bytes()) as Box<dyn Read + '_>))
    }
}

/// Picks the source implementation for a local feed path.
pub fn open_feed(path: &Path) -> Result<Box<dyn TableSource>, PipelineError> {
    if path.is_dir() {
        Ok(Box::new(DirectorySource::new(path)))
    } else {
        Ok(Box::new(ZipSource::new(path)?))
    }
}
