//! Directories.
//!
//! No dedicated `directory.cc`/`.h` survived into the retrieved original
//! sources; this is rebuilt from how `filesys.cc` drives one — `Find`,
//! `FindIndex`, `Add`, a fixed-size entry table with `inUse`/`isDir`/`name`
//! fields, and a `goTo`-style walk down nested path components to support
//! the directory tree the flat classic Nachos filesystem didn't have. A
//! directory is itself stored as an ordinary file (a header plus data
//! sectors), serialized through the same sector-level read/write helpers an
//! [`super::open_file::OpenFile`] uses.
use super::cache::SectorCache;
use super::free_map::{FreeMap, ROOT_DIR_SECTOR};
use super::header::FileHeader;
use super::open_file::{read_at, write_at};
use crate::error::{KernelError, NachosError, Result};

/// Longest file or directory name component (excludes any path separator).
pub const NAME_MAX_LEN: usize = 32;
/// Entries a freshly-created directory is sized to hold before it must
/// grow.
pub const INITIAL_DIR_ENTRIES: usize = 16;

const ENTRY_SIZE: usize = 1 + 1 + 4 + 4 + NAME_MAX_LEN; // in_use, is_dir, sector, parent, name

#[derive(Clone)]
struct DirEntry {
    in_use: bool,
    is_dir: bool,
    sector: u32,
    /// Sector of the directory this entry lives in, so a removed entry's
    /// containing directory can be found without re-walking the path.
    parent: u32,
    name: [u8; NAME_MAX_LEN],
}

impl DirEntry {
    fn empty() -> Self {
        Self {
            in_use: false,
            is_dir: false,
            sector: 0,
            parent: 0,
            name: [0; NAME_MAX_LEN],
        }
    }

    fn name_str(&self) -> &str {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(NAME_MAX_LEN);
        std::str::from_utf8(&self.name[..len]).unwrap_or("")
    }

    fn set_name(&mut self, name: &str) -> Result<()> {
        if name.len() > NAME_MAX_LEN {
            return Err(NachosError::Kernel(KernelError::NameTooLong));
        }
        self.name = [0; NAME_MAX_LEN];
        self.name[..name.len()].copy_from_slice(name.as_bytes());
        Ok(())
    }

    fn encode(&self, out: &mut [u8]) {
        out[0] = self.in_use as u8;
        out[1] = self.is_dir as u8;
        out[2..6].copy_from_slice(&self.sector.to_le_bytes());
        out[6..10].copy_from_slice(&self.parent.to_le_bytes());
        out[10..10 + NAME_MAX_LEN].copy_from_slice(&self.name);
    }

    fn decode(raw: &[u8]) -> Self {
        let mut name = [0u8; NAME_MAX_LEN];
        name.copy_from_slice(&raw[10..10 + NAME_MAX_LEN]);
        Self {
            in_use: raw[0] != 0,
            is_dir: raw[1] != 0,
            sector: u32::from_le_bytes(raw[2..6].try_into().unwrap()),
            parent: u32::from_le_bytes(raw[6..10].try_into().unwrap()),
            name,
        }
    }
}

/// One listed entry, as returned to callers outside this module.
pub struct Listing {
    pub name: String,
    pub sector: u32,
    pub is_dir: bool,
    pub parent: u32,
}

/// The in-memory directory table, one entry per file or subdirectory
/// immediately contained in this directory.
pub struct Directory {
    entries: Vec<DirEntry>,
}

impl Directory {
    /// A fresh, empty directory with room for [`INITIAL_DIR_ENTRIES`]
    /// entries before it must grow.
    pub fn empty() -> Self {
        Self {
            entries: vec![DirEntry::empty(); INITIAL_DIR_ENTRIES],
        }
    }

    pub fn fetch_from(header: &FileHeader, cache: &SectorCache) -> Self {
        let len = header.file_length();
        let count = len / ENTRY_SIZE;
        let mut raw = vec![0u8; len];
        read_at(header, cache, 0, &mut raw);
        let entries = (0..count).map(|i| DirEntry::decode(&raw[i * ENTRY_SIZE..(i + 1) * ENTRY_SIZE])).collect();
        Self { entries }
    }

    /// Serialize back to the sectors behind `header`, growing the
    /// underlying file first if this directory gained entries since it was
    /// last sized.
    pub fn write_back(&self, header: &mut FileHeader, cache: &SectorCache, free_map: &mut FreeMap) -> Result<()> {
        let needed = self.entries.len() * ENTRY_SIZE;
        if needed > header.file_length() {
            header.grow(free_map, cache, needed - header.file_length())?;
        }
        let mut raw = vec![0u8; needed];
        for (i, e) in self.entries.iter().enumerate() {
            e.encode(&mut raw[i * ENTRY_SIZE..(i + 1) * ENTRY_SIZE]);
        }
        write_at(header, cache, 0, &raw);
        Ok(())
    }

    fn find_index(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.in_use && e.name_str() == name)
    }

    /// The sector holding `name`'s header, if this directory contains it.
    pub fn find(&self, name: &str) -> Option<u32> {
        self.find_index(name).map(|i| self.entries[i].sector)
    }

    pub fn is_dir_entry(&self, name: &str) -> Option<bool> {
        self.find_index(name).map(|i| self.entries[i].is_dir)
    }

    /// Add a new entry, growing the table if every slot is in use.
    /// `parent_sector` is this directory's own sector, stamped onto the
    /// entry so it can be found again without re-walking the path.
    pub fn add(&mut self, name: &str, sector: u32, is_dir: bool, parent_sector: u32) -> Result<()> {
        if self.find_index(name).is_some() {
            return Err(NachosError::Kernel(KernelError::FileExist));
        }
        let slot = self.entries.iter().position(|e| !e.in_use).unwrap_or_else(|| {
            self.entries.push(DirEntry::empty());
            self.entries.len() - 1
        });
        let entry = &mut self.entries[slot];
        entry.in_use = true;
        entry.is_dir = is_dir;
        entry.sector = sector;
        entry.parent = parent_sector;
        entry.set_name(name)?;
        Ok(())
    }

    /// Remove `name`'s entry. Does not touch the removed file's data; the
    /// caller is responsible for deallocating or deferring that.
    pub fn remove(&mut self, name: &str) -> Result<()> {
        let idx = self.find_index(name).ok_or(NachosError::Kernel(KernelError::NoSuchEntry))?;
        self.entries[idx] = DirEntry::empty();
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        !self.entries.iter().any(|e| e.in_use)
    }

    pub fn list(&self) -> Vec<Listing> {
        self.entries
            .iter()
            .filter(|e| e.in_use)
            .map(|e| Listing {
                name: e.name_str().to_string(),
                sector: e.sector,
                is_dir: e.is_dir,
                parent: e.parent,
            })
            .collect()
    }
}

/// Split a `/`-separated path into its component names. A leading `/` is
/// treated as rooted at [`ROOT_DIR_SECTOR`]; a path with no leading `/` is
/// also resolved from the root, matching the original's single-root
/// namespace (there is no concept of a per-process current directory here).
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|c| !c.is_empty()).collect()
}

/// The sentinel directory entry naming the filesystem root.
pub const ROOT_SECTOR: u32 = ROOT_DIR_SECTOR;
