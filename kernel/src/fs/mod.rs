//! The on-disk filesystem, tying together the free-sector bitmap, two-level
//! file headers, directories and the synchronous sector cache.
//!
//! Grounded on the original's `FileSystem::Create/Open/Remove/List`, with
//! one generalization the distillation called for: paths may name nested
//! directories (`goTo`-style traversal down a tree) rather than the
//! original's single flat root directory.
pub mod cache;
pub mod directory;
pub mod free_map;
pub mod header;
pub mod open_file;

use self::cache::SectorCache;
use self::directory::{split_path, Directory, Listing};
use self::free_map::{FreeMap, FREE_MAP_SECTOR, ROOT_DIR_SECTOR};
use self::header::FileHeader;
use self::open_file::{read_at, write_at, OpenFile, SharedFile};
use crate::error::{KernelError, NachosError, Result};
use crate::thread::scheduler::Scheduler;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

/// The mounted filesystem: the single entry point callers use to create,
/// open, remove and list files and directories.
pub struct FileSystem {
    cache: Arc<SectorCache>,
    free_map: Arc<Mutex<FreeMap>>,
    scheduler: Arc<Scheduler>,
    open_files: Mutex<HashMap<u32, Weak<SharedFile>>>,
}

impl FileSystem {
    /// Lay down a fresh filesystem: an empty free-sector bitmap (with its
    /// own and the root directory's sectors pre-allocated) and an empty
    /// root directory, both written through to disk.
    pub fn format(cache: Arc<SectorCache>, scheduler: Arc<Scheduler>, num_sectors: usize) -> Result<Self> {
        let mut free_map = FreeMap::new(num_sectors);

        let mut free_map_header = FileHeader::allocate(&mut free_map, &cache, 0)?;
        let mut root_header = FileHeader::allocate(&mut free_map, &cache, 0)?;

        let root_dir = Directory::empty();
        root_dir.write_back(&mut root_header, &cache, &mut free_map)?;
        root_header.write_back(&cache, ROOT_DIR_SECTOR);

        // Grow the bitmap's own file to its final size before taking the
        // snapshot that gets written into it, so the sectors consumed by
        // this very allocation are reflected in what's persisted.
        let bitmap_len = num_sectors.div_ceil(8);
        free_map_header.grow(&mut free_map, &cache, bitmap_len)?;
        let bitmap_bytes = free_map.to_bytes();
        write_at(&free_map_header, &cache, 0, &bitmap_bytes);
        free_map_header.write_back(&cache, FREE_MAP_SECTOR);

        cache.flush_all();

        Ok(Self {
            cache,
            free_map: Arc::new(Mutex::new(free_map)),
            scheduler,
            open_files: Mutex::new(HashMap::new()),
        })
    }

    /// Mount a previously formatted filesystem, reading the bitmap back
    /// off disk.
    pub fn mount(cache: Arc<SectorCache>, scheduler: Arc<Scheduler>) -> Result<Self> {
        let free_map_header = FileHeader::fetch_from(&cache, FREE_MAP_SECTOR);
        let mut bytes = vec![0u8; free_map_header.file_length()];
        read_at(&free_map_header, &cache, 0, &mut bytes);
        let free_map = FreeMap::from_bytes(&bytes, cache.num_sectors());
        Ok(Self {
            cache,
            free_map: Arc::new(Mutex::new(free_map)),
            scheduler,
            open_files: Mutex::new(HashMap::new()),
        })
    }

    fn load_directory(&self, sector: u32) -> (FileHeader, Directory) {
        let header = FileHeader::fetch_from(&self.cache, sector);
        let dir = Directory::fetch_from(&header, &self.cache);
        (header, dir)
    }

    /// Walk every path component but the last, requiring each to be a
    /// directory. Returns the sector of the containing directory and the
    /// leaf component's name.
    fn resolve_parent(&self, path: &str) -> Result<(u32, String)> {
        let mut components = split_path(path);
        let leaf = components
            .pop()
            .ok_or(NachosError::Kernel(KernelError::InvalidArgument))?;
        let mut sector = ROOT_DIR_SECTOR;
        for comp in components {
            let (_, dir) = self.load_directory(sector);
            if dir.is_dir_entry(comp) != Some(true) {
                return Err(NachosError::Kernel(KernelError::NotDirectory));
            }
            sector = dir.find(comp).ok_or(NachosError::Kernel(KernelError::NoSuchEntry))?;
        }
        Ok((sector, leaf.to_string()))
    }

    /// Walk every path component, requiring each (including the last) to be
    /// a directory. Returns that directory's sector.
    fn resolve_dir(&self, path: &str) -> Result<u32> {
        let mut sector = ROOT_DIR_SECTOR;
        for comp in split_path(path) {
            let (_, dir) = self.load_directory(sector);
            if dir.is_dir_entry(comp) != Some(true) {
                return Err(NachosError::Kernel(KernelError::NotDirectory));
            }
            sector = dir.find(comp).ok_or(NachosError::Kernel(KernelError::NoSuchEntry))?;
        }
        Ok(sector)
    }

    fn persist_free_map(&self) {
        let header = FileHeader::fetch_from(&self.cache, FREE_MAP_SECTOR);
        let free_map = self.free_map.lock().unwrap();
        write_at(&header, &self.cache, 0, &free_map.to_bytes());
    }

    fn create_entry(&self, path: &str, initial_size: usize, is_dir: bool) -> Result<()> {
        let (parent_sector, name) = self.resolve_parent(path)?;
        let (mut parent_header, mut parent_dir) = self.load_directory(parent_sector);
        if parent_dir.find(&name).is_some() {
            return Err(NachosError::Kernel(KernelError::FileExist));
        }

        let mut free_map = self.free_map.lock().unwrap();
        let new_sector = free_map.find().ok_or(NachosError::Kernel(KernelError::NoSpace))?;
        let new_header = if is_dir {
            let mut h = FileHeader::allocate(&mut free_map, &self.cache, 0)?;
            Directory::empty().write_back(&mut h, &self.cache, &mut free_map)?;
            h
        } else {
            FileHeader::allocate(&mut free_map, &self.cache, initial_size)?
        };
        new_header.write_back(&self.cache, new_sector);

        parent_dir.add(&name, new_sector, is_dir, parent_sector)?;
        parent_dir.write_back(&mut parent_header, &self.cache, &mut free_map)?;
        parent_header.write_back(&self.cache, parent_sector);
        drop(free_map);
        self.persist_free_map();
        Ok(())
    }

    /// Create a new regular file at `path` with `initial_size` bytes
    /// already allocated.
    pub fn create(&self, path: &str, initial_size: usize) -> Result<()> {
        self.create_entry(path, initial_size, false)
    }

    /// Create a new, empty directory at `path`.
    pub fn mkdir(&self, path: &str) -> Result<()> {
        self.create_entry(path, 0, true)
    }

    fn get_or_open_shared(&self, sector: u32) -> Arc<SharedFile> {
        let mut table = self.open_files.lock().unwrap();
        if let Some(shared) = table.get(&sector).and_then(Weak::upgrade) {
            return shared;
        }
        let shared = SharedFile::open(self.scheduler.clone(), sector, self.cache.clone(), self.free_map.clone());
        table.insert(sector, Arc::downgrade(&shared));
        shared
    }

    /// Open `path` for reading and writing. Two opens of the same file
    /// share one [`SharedFile`], so writes through one handle are visible
    /// to reads through another.
    pub fn open(&self, path: &str) -> Result<OpenFile> {
        let (parent_sector, name) = self.resolve_parent(path)?;
        let (_, dir) = self.load_directory(parent_sector);
        if dir.is_dir_entry(&name) == Some(true) {
            return Err(NachosError::Kernel(KernelError::IsDirectory));
        }
        let sector = dir.find(&name).ok_or(NachosError::Kernel(KernelError::NoSuchEntry))?;
        Ok(OpenFile::new(self.get_or_open_shared(sector)))
    }

    /// Remove `path`. If the file is currently open elsewhere, the
    /// directory entry is removed immediately but the data sectors are
    /// deallocated only once the last open handle is dropped, matching the
    /// original's `OpenFileEntry::remove` flag; the caller sees this case as
    /// `Ok(false)` rather than success, since the removal isn't actually
    /// complete yet. Removing a non-empty directory recursively removes
    /// every child first, reusing the already-loaded parent directory for
    /// each step rather than re-resolving the path.
    pub fn remove(&self, path: &str) -> Result<bool> {
        let (parent_sector, name) = self.resolve_parent(path)?;
        self.remove_in_directory(parent_sector, &name)
    }

    /// Remove `name` from the directory at `dir_sector`. Returns `Ok(true)`
    /// once the entry's sectors are fully deallocated, `Ok(false)` if a
    /// regular file's removal had to be deferred because it's still open.
    fn remove_in_directory(&self, dir_sector: u32, name: &str) -> Result<bool> {
        let (mut dir_header, mut dir) = self.load_directory(dir_sector);
        let sector = dir.find(name).ok_or(NachosError::Kernel(KernelError::NoSuchEntry))?;
        let is_dir = dir.is_dir_entry(name).unwrap_or(false);

        if is_dir {
            let (_, child) = self.load_directory(sector);
            for entry in child.list() {
                self.remove_in_directory(sector, &entry.name)?;
            }
        }

        dir.remove(name)?;
        {
            let mut free_map = self.free_map.lock().unwrap();
            dir.write_back(&mut dir_header, &self.cache, &mut free_map)?;
        }
        dir_header.write_back(&self.cache, dir_sector);
        self.persist_free_map();

        if is_dir {
            // A directory has no open-handle concept; its own header and
            // (now-empty) data sectors can be freed immediately.
            let header = FileHeader::fetch_from(&self.cache, sector);
            let mut free_map = self.free_map.lock().unwrap();
            header.deallocate(&mut free_map, &self.cache);
            free_map.clear(sector);
            drop(free_map);
            self.persist_free_map();
            return Ok(true);
        }

        let already_open = {
            let table = self.open_files.lock().unwrap();
            table.get(&sector).and_then(Weak::upgrade)
        };
        match already_open {
            Some(shared) => {
                shared.mark_pending_remove();
                Ok(false)
            }
            None => {
                let header = FileHeader::fetch_from(&self.cache, sector);
                let mut free_map = self.free_map.lock().unwrap();
                header.deallocate(&mut free_map, &self.cache);
                free_map.clear(sector);
                drop(free_map);
                self.persist_free_map();
                Ok(true)
            }
        }
    }

    /// List the immediate contents of the directory at `path` (`""` or
    /// `"/"` for the root).
    pub fn list(&self, path: &str) -> Result<Vec<Listing>> {
        let sector = self.resolve_dir(path)?;
        let (_, dir) = self.load_directory(sector);
        Ok(dir.list())
    }

    pub fn cache(&self) -> &Arc<SectorCache> {
        &self.cache
    }

    /// Number of sectors currently marked free on the bitmap. Exposed so
    /// callers (and tests) can confirm the free map returns to its
    /// pre-create count after a matching remove.
    pub fn free_sectors(&self) -> usize {
        self.free_map.lock().unwrap().num_clear()
    }
}
