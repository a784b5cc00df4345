//! The on-disk file header (the original's `FileHeader`, an inode in
//! everything but name): a fixed-size table of sector pointers, sized to
//! fit in exactly one disk sector, with first-level direct pointers and a
//! second level of indirect blocks for files too large for direct pointers
//! alone.
use super::cache::SectorCache;
use super::free_map::FreeMap;
use crate::error::{KernelError, NachosError, Result};
use machine::disk::SECTOR_SIZE;

/// Direct (first-level) sector pointers stored in the header itself.
/// Sized down from a plain indexed layout to leave room in the header's
/// one sector for the type tag and timestamps below.
pub const NUM_FIRST_INDEX: usize = 8;
/// Indirect (second-level) block pointers stored in the header; each
/// points to a sector holding [`POINTERS_PER_SECTOR`] further data sector
/// numbers.
pub const NUM_SECOND_INDEX: usize = 2;
/// How many sector numbers (u32, 4 bytes each) fit in one sector.
pub const POINTERS_PER_SECTOR: usize = SECTOR_SIZE / 4;
/// Maximum file size this header format can address.
pub const MAX_FILE_SIZE: usize =
    NUM_FIRST_INDEX * SECTOR_SIZE + NUM_SECOND_INDEX * POINTERS_PER_SECTOR * SECTOR_SIZE;

const NUM_HEADER_POINTERS: usize = NUM_FIRST_INDEX + NUM_SECOND_INDEX;

/// Width of each of the three on-disk timestamp fields, matching the
/// original's fixed `char time...[25]` buffers (a `ctime()`-style string,
/// null-padded).
const TIMESTAMP_LEN: usize = 25;
/// Width of the on-disk type tag (`char type[4]`).
const TYPE_LEN: usize = 4;
const HEADER_FIXED_BYTES: usize = 4 + 4 + TYPE_LEN + 3 * TIMESTAMP_LEN;

/// Render the current local time as a fixed-width, null-padded string the
/// way the original's `ctime()` calls would have, for the header's
/// timestamp fields.
fn stamp_now() -> [u8; TIMESTAMP_LEN] {
    let text = chrono::Local::now().format("%a %b %e %T %Y").to_string();
    let mut buf = [0u8; TIMESTAMP_LEN];
    let len = text.len().min(TIMESTAMP_LEN - 1);
    buf[..len].copy_from_slice(&text.as_bytes()[..len]);
    buf
}

/// The in-memory file header. `data_sectors[..NUM_FIRST_INDEX]` are direct
/// pointers; `data_sectors[NUM_FIRST_INDEX..]` point to indirect blocks.
#[derive(Clone)]
pub struct FileHeader {
    pub num_bytes: u32,
    pub num_sectors: u32,
    /// Four-character type tag, carried over from the original header
    /// format but not otherwise interpreted here (directory-ness is
    /// tracked by the containing `DirEntry`, not this tag).
    pub file_type: [u8; TYPE_LEN],
    pub time_created: [u8; TIMESTAMP_LEN],
    pub time_accessed: [u8; TIMESTAMP_LEN],
    pub time_modified: [u8; TIMESTAMP_LEN],
    data_sectors: [u32; NUM_HEADER_POINTERS],
}

impl FileHeader {
    pub fn empty() -> Self {
        Self {
            num_bytes: 0,
            num_sectors: 0,
            file_type: *b"RAW\0",
            time_created: [0; TIMESTAMP_LEN],
            time_accessed: [0; TIMESTAMP_LEN],
            time_modified: [0; TIMESTAMP_LEN],
            data_sectors: [0; NUM_HEADER_POINTERS],
        }
    }

    /// Allocate enough sectors for a fresh file of `file_size` bytes,
    /// drawing from `free_map`. Direct pointers are filled first, then
    /// indirect blocks are allocated and their index sectors written to
    /// `cache`.
    pub fn allocate(free_map: &mut FreeMap, cache: &SectorCache, file_size: usize) -> Result<Self> {
        if file_size > MAX_FILE_SIZE {
            return Err(NachosError::Kernel(KernelError::NoSpace));
        }
        let num_sectors = file_size.div_ceil(SECTOR_SIZE);
        if free_map.num_clear() < num_sectors {
            return Err(NachosError::Kernel(KernelError::NoSpace));
        }
        let now = stamp_now();
        let mut header = Self {
            num_bytes: file_size as u32,
            num_sectors: num_sectors as u32,
            file_type: *b"RAW\0",
            time_created: now,
            time_accessed: now,
            time_modified: now,
            data_sectors: [0; NUM_HEADER_POINTERS],
        };
        let mut remaining = num_sectors;
        let mut i = 0;
        while i < NUM_FIRST_INDEX && remaining > 0 {
            header.data_sectors[i] = free_map.find().expect("checked num_clear above");
            remaining -= 1;
            i += 1;
        }
        let mut block = 0;
        while remaining > 0 {
            assert!(
                NUM_FIRST_INDEX + block < NUM_HEADER_POINTERS,
                "file size exceeds header capacity despite earlier check"
            );
            let index_sector = free_map.find().expect("checked num_clear above");
            header.data_sectors[NUM_FIRST_INDEX + block] = index_sector;
            let mut index_block = [0u32; POINTERS_PER_SECTOR];
            let mut j = 0;
            while j < POINTERS_PER_SECTOR && remaining > 0 {
                index_block[j] = free_map.find().expect("checked num_clear above");
                remaining -= 1;
                j += 1;
            }
            cache.write_sector(index_sector, &pack_u32s(&index_block));
            block += 1;
        }
        Ok(header)
    }

    /// Grow the file by `extra_bytes`, allocating new sectors only if the
    /// existing allocation can't already hold the new length.
    pub fn grow(&mut self, free_map: &mut FreeMap, cache: &SectorCache, extra_bytes: usize) -> Result<()> {
        let max_length = self.num_sectors as usize * SECTOR_SIZE;
        let new_len = self.num_bytes as usize + extra_bytes;
        if new_len <= max_length {
            self.num_bytes = new_len as u32;
            self.time_modified = stamp_now();
            return Ok(());
        }
        let increase_sectors = (new_len - max_length).div_ceil(SECTOR_SIZE);
        if free_map.num_clear() < increase_sectors {
            return Err(NachosError::Kernel(KernelError::NoSpace));
        }
        let mut remaining = increase_sectors;
        while (self.num_sectors as usize) < NUM_FIRST_INDEX && remaining > 0 {
            let idx = self.num_sectors as usize;
            self.data_sectors[idx] = free_map.find().expect("checked num_clear above");
            self.num_sectors += 1;
            remaining -= 1;
        }
        while remaining > 0 {
            let slot = self.num_sectors as usize - NUM_FIRST_INDEX;
            let block = slot / POINTERS_PER_SECTOR;
            let offset = slot % POINTERS_PER_SECTOR;
            assert!(
                NUM_FIRST_INDEX + block < NUM_HEADER_POINTERS,
                "file growth exceeds header capacity"
            );
            let index_sector = if offset == 0 {
                let s = free_map.find().expect("checked num_clear above");
                self.data_sectors[NUM_FIRST_INDEX + block] = s;
                cache.write_sector(s, &pack_u32s(&[0u32; POINTERS_PER_SECTOR]));
                s
            } else {
                self.data_sectors[NUM_FIRST_INDEX + block]
            };
            let mut index_block = unpack_u32s(&cache.read_sector(index_sector));
            index_block[offset] = free_map.find().expect("checked num_clear above");
            cache.write_sector(index_sector, &pack_u32s(&index_block));
            self.num_sectors += 1;
            remaining -= 1;
        }
        self.num_bytes = new_len as u32;
        self.time_modified = stamp_now();
        Ok(())
    }

    /// Release every sector this header owns back to `free_map`.
    pub fn deallocate(&self, free_map: &mut FreeMap, cache: &SectorCache) {
        let mut remaining = self.num_sectors as usize;
        let mut i = 0;
        while i < NUM_FIRST_INDEX && remaining > 0 {
            free_map.clear(self.data_sectors[i]);
            remaining -= 1;
            i += 1;
        }
        let mut block = 0;
        while remaining > 0 {
            let index_sector = self.data_sectors[NUM_FIRST_INDEX + block];
            let index_block = unpack_u32s(&cache.read_sector(index_sector));
            let mut j = 0;
            while j < POINTERS_PER_SECTOR && remaining > 0 {
                free_map.clear(index_block[j]);
                remaining -= 1;
                j += 1;
            }
            free_map.clear(index_sector);
            block += 1;
        }
    }

    /// Translate a logical sector index within the file to its physical
    /// disk sector.
    pub fn index_to_sector(&self, cache: &SectorCache, index: usize) -> u32 {
        if index < NUM_FIRST_INDEX {
            return self.data_sectors[index];
        }
        let block = (index - NUM_FIRST_INDEX) / POINTERS_PER_SECTOR;
        let offset = (index - NUM_FIRST_INDEX) % POINTERS_PER_SECTOR;
        let index_sector = self.data_sectors[NUM_FIRST_INDEX + block];
        let index_block = unpack_u32s(&cache.read_sector(index_sector));
        index_block[offset]
    }

    /// Translate a byte offset within the file to its physical disk
    /// sector.
    pub fn byte_to_sector(&self, cache: &SectorCache, offset: usize) -> u32 {
        self.index_to_sector(cache, offset / SECTOR_SIZE)
    }

    pub fn file_length(&self) -> usize {
        self.num_bytes as usize
    }

    /// Load a header from its on-disk sector.
    pub fn fetch_from(cache: &SectorCache, sector: u32) -> Self {
        let raw = cache.read_sector(sector);
        let num_bytes = u32::from_le_bytes(raw[0..4].try_into().unwrap());
        let num_sectors = u32::from_le_bytes(raw[4..8].try_into().unwrap());
        let file_type: [u8; TYPE_LEN] = raw[8..8 + TYPE_LEN].try_into().unwrap();
        let mut offset = 8 + TYPE_LEN;
        let time_created: [u8; TIMESTAMP_LEN] = raw[offset..offset + TIMESTAMP_LEN].try_into().unwrap();
        offset += TIMESTAMP_LEN;
        let time_accessed: [u8; TIMESTAMP_LEN] = raw[offset..offset + TIMESTAMP_LEN].try_into().unwrap();
        offset += TIMESTAMP_LEN;
        let time_modified: [u8; TIMESTAMP_LEN] = raw[offset..offset + TIMESTAMP_LEN].try_into().unwrap();
        offset += TIMESTAMP_LEN;
        let mut data_sectors = [0u32; NUM_HEADER_POINTERS];
        for (i, slot) in data_sectors.iter_mut().enumerate() {
            let start = offset + i * 4;
            *slot = u32::from_le_bytes(raw[start..start + 4].try_into().unwrap());
        }
        Self {
            num_bytes,
            num_sectors,
            file_type,
            time_created,
            time_accessed,
            time_modified,
            data_sectors,
        }
    }

    /// Persist this header to its on-disk sector.
    pub fn write_back(&self, cache: &SectorCache, sector: u32) {
        let mut raw = [0u8; SECTOR_SIZE];
        raw[0..4].copy_from_slice(&self.num_bytes.to_le_bytes());
        raw[4..8].copy_from_slice(&self.num_sectors.to_le_bytes());
        raw[8..8 + TYPE_LEN].copy_from_slice(&self.file_type);
        let mut offset = 8 + TYPE_LEN;
        raw[offset..offset + TIMESTAMP_LEN].copy_from_slice(&self.time_created);
        offset += TIMESTAMP_LEN;
        raw[offset..offset + TIMESTAMP_LEN].copy_from_slice(&self.time_accessed);
        offset += TIMESTAMP_LEN;
        raw[offset..offset + TIMESTAMP_LEN].copy_from_slice(&self.time_modified);
        offset += TIMESTAMP_LEN;
        for (i, slot) in self.data_sectors.iter().enumerate() {
            let start = offset + i * 4;
            raw[start..start + 4].copy_from_slice(&slot.to_le_bytes());
        }
        cache.write_sector(sector, &raw);
    }
}

fn pack_u32s(values: &[u32; POINTERS_PER_SECTOR]) -> [u8; SECTOR_SIZE] {
    let mut out = [0u8; SECTOR_SIZE];
    for (i, v) in values.iter().enumerate() {
        out[i * 4..i * 4 + 4].copy_from_slice(&v.to_le_bytes());
    }
    out
}

fn unpack_u32s(bytes: &[u8; SECTOR_SIZE]) -> [u32; POINTERS_PER_SECTOR] {
    let mut out = [0u32; POINTERS_PER_SECTOR];
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = u32::from_le_bytes(bytes[i * 4..i * 4 + 4].try_into().unwrap());
    }
    out
}

const _: () = assert!(HEADER_FIXED_BYTES + NUM_HEADER_POINTERS * 4 <= SECTOR_SIZE);
