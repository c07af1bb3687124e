//! File manager for page-level I/O over named paged files.

use burrow_common::{BurrowError, FileId, PageId, Result, PAGE_SIZE};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Configuration for the file manager.
#[derive(Debug, Clone)]
pub struct FileManagerConfig {
    /// Base directory for data files.
    pub data_dir: PathBuf,
    /// Enable fsync after writes.
    pub fsync_enabled: bool,
}

impl Default for FileManagerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            fsync_enabled: true,
        }
    }
}

/// Handle for an open paged file.
struct FileHandle {
    /// The OS file handle.
    file: File,
    /// The caller-facing file name.
    name: String,
    /// Number of pages in the file, including the reserved page 0.
    num_pages: u32,
}

/// Manages named paged files on disk.
///
/// Every file is a sequence of PAGE_SIZE blocks. Page 0 is materialized at
/// creation and never handed out by `allocate_page`, so real pages start at 1.
pub struct FileManager {
    /// Configuration.
    config: FileManagerConfig,
    /// Open file state, keyed by FileId and indexed by name.
    inner: Mutex<Inner>,
}

struct Inner {
    files: HashMap<FileId, FileHandle>,
    by_name: HashMap<String, FileId>,
    next_file_id: u32,
}

impl FileManager {
    /// Creates a new file manager, creating the data directory if needed.
    pub fn new(config: FileManagerConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        Ok(Self {
            config,
            inner: Mutex::new(Inner {
                files: HashMap::new(),
                by_name: HashMap::new(),
                next_file_id: 0,
            }),
        })
    }

    /// Returns the data directory path.
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Generates the on-disk path for a file name.
    fn file_path(&self, name: &str) -> PathBuf {
        self.config.data_dir.join(name)
    }

    /// Returns true if a file with the given name exists.
    pub fn exists(&self, name: &str) -> bool {
        if self.inner.lock().by_name.contains_key(name) {
            return true;
        }
        self.file_path(name).exists()
    }

    /// Opens a paged file by name, creating it if absent.
    ///
    /// A newly created file is extended with the reserved zero page so that
    /// the first `allocate_page` returns page 1.
    pub fn open(&self, name: &str) -> Result<FileId> {
        let mut inner = self.inner.lock();

        if let Some(&file_id) = inner.by_name.get(name) {
            return Ok(file_id);
        }

        let path = self.file_path(name);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        let file_size = file.metadata()?.len();
        let mut num_pages = (file_size / PAGE_SIZE as u64) as u32;

        if num_pages == 0 {
            // Reserve page 0
            file.write_all(&[0u8; PAGE_SIZE])?;
            if self.config.fsync_enabled {
                file.sync_all()?;
            }
            num_pages = 1;
        }

        let file_id = FileId(inner.next_file_id);
        inner.next_file_id += 1;

        inner.by_name.insert(name.to_string(), file_id);
        inner.files.insert(
            file_id,
            FileHandle {
                file,
                name: name.to_string(),
                num_pages,
            },
        );

        Ok(file_id)
    }

    /// Returns the name a file was opened under.
    pub fn name_of(&self, file_id: FileId) -> Result<String> {
        let inner = self.inner.lock();
        inner
            .files
            .get(&file_id)
            .map(|h| h.name.clone())
            .ok_or_else(|| BurrowError::FileNotOpen(file_id.to_string()))
    }

    /// Reads a page from disk.
    pub fn read_page(&self, file_id: FileId, page_no: PageId) -> Result<[u8; PAGE_SIZE]> {
        let mut inner = self.inner.lock();
        let handle = inner
            .files
            .get_mut(&file_id)
            .ok_or_else(|| BurrowError::FileNotOpen(file_id.to_string()))?;

        if page_no.0 >= handle.num_pages {
            return Err(BurrowError::PageNotFound {
                file: handle.name.clone(),
                page_no: page_no.0,
            });
        }

        let offset = (page_no.0 as u64) * (PAGE_SIZE as u64);
        handle.file.seek(SeekFrom::Start(offset))?;

        let mut buffer = [0u8; PAGE_SIZE];
        handle.file.read_exact(&mut buffer)?;

        Ok(buffer)
    }

    /// Writes a page to disk.
    pub fn write_page(&self, file_id: FileId, page_no: PageId, data: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock();
        let handle = inner
            .files
            .get_mut(&file_id)
            .ok_or_else(|| BurrowError::FileNotOpen(file_id.to_string()))?;

        let offset = (page_no.0 as u64) * (PAGE_SIZE as u64);
        handle.file.seek(SeekFrom::Start(offset))?;
        handle.file.write_all(data)?;

        if self.config.fsync_enabled {
            handle.file.sync_all()?;
        }

        if page_no.0 >= handle.num_pages {
            handle.num_pages = page_no.0 + 1;
        }

        Ok(())
    }

    /// Allocates a new zero-filled page at the end of the file.
    pub fn allocate_page(&self, file_id: FileId) -> Result<PageId> {
        let mut inner = self.inner.lock();
        let handle = inner
            .files
            .get_mut(&file_id)
            .ok_or_else(|| BurrowError::FileNotOpen(file_id.to_string()))?;

        let page_no = handle.num_pages;

        let offset = (page_no as u64) * (PAGE_SIZE as u64);
        handle.file.seek(SeekFrom::Start(offset))?;
        handle.file.write_all(&[0u8; PAGE_SIZE])?;

        if self.config.fsync_enabled {
            handle.file.sync_all()?;
        }

        handle.num_pages = page_no + 1;

        Ok(PageId(page_no))
    }

    /// Returns the number of pages in a file, including the reserved page 0.
    pub fn num_pages(&self, file_id: FileId) -> Result<u32> {
        let inner = self.inner.lock();
        inner
            .files
            .get(&file_id)
            .map(|h| h.num_pages)
            .ok_or_else(|| BurrowError::FileNotOpen(file_id.to_string()))
    }

    /// Flushes a file's pending writes to disk.
    pub fn sync(&self, file_id: FileId) -> Result<()> {
        let inner = self.inner.lock();
        let handle = inner
            .files
            .get(&file_id)
            .ok_or_else(|| BurrowError::FileNotOpen(file_id.to_string()))?;
        handle.file.sync_all()?;
        Ok(())
    }

    /// Closes a file, flushing it first.
    pub fn close(&self, file_id: FileId) -> Result<()> {
        let mut inner = self.inner.lock();
        if let Some(handle) = inner.files.remove(&file_id) {
            inner.by_name.remove(&handle.name);
            handle.file.sync_all()?;
        }
        Ok(())
    }

    /// Deletes a file by name, closing it first if open.
    pub fn delete(&self, name: &str) -> Result<()> {
        {
            let mut inner = self.inner.lock();
            if let Some(file_id) = inner.by_name.remove(name) {
                inner.files.remove(&file_id);
            }
        }
        let path = self.file_path(name);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Closes all open files.
    pub fn close_all(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.by_name.clear();
        for (_, handle) in inner.files.drain() {
            handle.file.sync_all()?;
        }
        Ok(())
    }
}

impl Drop for FileManager {
    fn drop(&mut self) {
        let _ = self.close_all();
    }
}
