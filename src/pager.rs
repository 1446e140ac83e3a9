// Page-based I/O layer between the B+tree and the filesystem.
//
// The pager reads and writes fixed-size pages and keeps every page it has
// ever touched resident in a fixed array of cache slots. There is no
// eviction: a page buffer stays valid for the pager's lifetime, and dirty
// state is carried in memory until flush time.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::{DbError, Result};
use crate::journal::Journal;

/// Size of a database page in bytes. Every page holds exactly one node.
pub const PAGE_SIZE: usize = 4096;

/// Hard cap on the number of pages the cache can hold at once.
pub const MAX_PAGES: usize = 100;

/// A single database page.
pub struct Page {
    /// Raw page data.
    pub data: [u8; PAGE_SIZE],
}

impl Page {
    fn zeroed() -> Box<Self> {
        Box::new(Self {
            data: [0u8; PAGE_SIZE],
        })
    }
}

/// The pager owns the database file and the page cache.
pub struct Pager {
    /// The open file handle.
    file: File,
    /// File length observed at open time. Cache misses read only within
    /// this extent; anything written later is necessarily resident.
    file_length: u64,
    /// Number of pages the database logically contains. Grows as fresh
    /// pages are touched; never shrinks.
    num_pages: u32,
    /// One slot per possible page. `None` until first access.
    cache: Vec<Option<Box<Page>>>,
    /// Optional sidecar journal, written before pages are overwritten.
    journal: Option<Journal>,
}

impl Pager {
    /// Open the database file, creating it if absent. A leftover journal
    /// from an interrupted flush is replayed into the file first.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_inner(path.as_ref(), None)
    }

    /// Like [`Pager::open`], but attaches a journal so that every flush
    /// writes page pre-images to a sidecar file before touching the
    /// database.
    pub fn open_journaled<P: AsRef<Path>>(path: P) -> Result<Self> {
        let journal = Journal::new(path.as_ref());
        Self::open_inner(path.as_ref(), Some(journal))
    }

    fn open_inner(path: &Path, journal: Option<Journal>) -> Result<Self> {
        let recovered = Journal::recover(path)?;

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        for (page_num, data) in &recovered {
            file.seek(SeekFrom::Start(*page_num as u64 * PAGE_SIZE as u64))?;
            file.write_all(data.as_slice())?;
        }
        if !recovered.is_empty() {
            file.sync_all()?;
        }

        let file_length = file.metadata()?.len();
        if file_length % PAGE_SIZE as u64 != 0 {
            return Err(DbError::Corrupt(
                "database file is not a whole number of pages".into(),
            ));
        }
        let num_pages = (file_length / PAGE_SIZE as u64) as u32;

        let mut cache = Vec::with_capacity(MAX_PAGES);
        cache.resize_with(MAX_PAGES, || None);

        Ok(Self {
            file,
            file_length,
            num_pages,
            cache,
            journal,
        })
    }

    /// Number of pages the database currently contains.
    pub fn num_pages(&self) -> u32 {
        self.num_pages
    }

    /// Page number for the next fresh page. New pages always go onto the
    /// end of the file; there is no free list.
    pub fn unused_page_num(&self) -> u32 {
        self.num_pages
    }

    /// Read a page by number, loading it into the cache on first access.
    pub fn get_page(&mut self, page_num: u32) -> Result<&Page> {
        self.ensure_loaded(page_num)?;
        Ok(self.cache[page_num as usize].as_deref().unwrap())
    }

    /// Mutable access to a page, loading it into the cache on first access.
    pub fn get_page_mut(&mut self, page_num: u32) -> Result<&mut Page> {
        self.ensure_loaded(page_num)?;
        Ok(self.cache[page_num as usize].as_deref_mut().unwrap())
    }

    fn ensure_loaded(&mut self, page_num: u32) -> Result<()> {
        if page_num as usize >= MAX_PAGES {
            return Err(DbError::Corrupt(format!(
                "page number out of bounds: {page_num} >= {MAX_PAGES}"
            )));
        }

        if self.cache[page_num as usize].is_none() {
            let mut page = Page::zeroed();

            let offset = page_num as u64 * PAGE_SIZE as u64;
            if offset + PAGE_SIZE as u64 <= self.file_length {
                self.file.seek(SeekFrom::Start(offset))?;
                self.file.read_exact(&mut page.data)?;
            }

            self.cache[page_num as usize] = Some(page);

            if page_num >= self.num_pages {
                self.num_pages = page_num + 1;
            }
        }

        Ok(())
    }

    /// Write one resident page back to the file.
    pub fn flush(&mut self, page_num: u32) -> Result<()> {
        if page_num as usize >= MAX_PAGES {
            return Err(DbError::Corrupt(format!(
                "page number out of bounds: {page_num} >= {MAX_PAGES}"
            )));
        }
        let page = self.cache[page_num as usize]
            .as_deref()
            .ok_or_else(|| DbError::Internal(format!("tried to flush non-resident page {page_num}")))?;

        self.file
            .seek(SeekFrom::Start(page_num as u64 * PAGE_SIZE as u64))?;
        self.file.write_all(&page.data)?;
        Ok(())
    }

    /// Write every resident page back to the file. With a journal attached,
    /// every page image is journaled and synced before the database file is
    /// touched; the journal is deleted once the flush completes.
    pub fn flush_all(&mut self) -> Result<()> {
        let resident: Vec<u32> = (0..MAX_PAGES as u32)
            .filter(|&n| self.cache[n as usize].is_some())
            .collect();

        if let Some(journal) = self.journal.as_mut() {
            journal.begin()?;
            for &page_num in &resident {
                let page = self.cache[page_num as usize].as_deref().unwrap();
                journal.record(page_num, &page.data)?;
            }
        }

        for &page_num in &resident {
            self.flush(page_num)?;
        }
        self.file.sync_all()?;

        if let Some(journal) = self.journal.as_mut() {
            journal.commit()?;
        }
        Ok(())
    }
}
