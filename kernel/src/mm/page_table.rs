//! Per-address-space page table.
//!
//! Each entry tracks the flags spec.md's data model calls for (valid,
//! dirty, used) plus exactly one of a physical frame, a swap slot or an
//! executable file offset — [`Backing`] makes that mutual exclusion
//! explicit instead of the original's sentinel `-1` fields.
use machine::addressing::{FrameNumber, Vpn};
use std::sync::Mutex;

/// Where to refill a page from once it's no longer resident.
#[derive(Clone, Copy, Debug)]
pub enum Backing {
    /// Evicted to a swap slot (always true of a page that was ever
    /// written to after becoming resident).
    Swap(u32),
    /// Backed by the program's executable image at this byte offset.
    File { offset: usize },
    /// Never written to disk; demand-zero on first fault.
    Zero,
}

#[derive(Clone, Copy, Debug)]
pub struct PageTableEntry {
    pub valid: bool,
    pub dirty: bool,
    pub used: bool,
    pub frame: Option<FrameNumber>,
    pub backing: Backing,
}

impl PageTableEntry {
    fn demand_zero() -> Self {
        Self { valid: false, dirty: false, used: false, frame: None, backing: Backing::Zero }
    }

    fn from_executable(offset: usize) -> Self {
        Self { valid: false, dirty: false, used: false, frame: None, backing: Backing::File { offset } }
    }
}

/// The page table for one address space, indexed by virtual page number.
pub struct PageTable {
    entries: Mutex<Vec<PageTableEntry>>,
}

impl PageTable {
    /// A page table for `num_pages` pages, the first `exec_pages` of which
    /// are backed by the executable at `page * PAGE_SIZE`, the rest
    /// demand-zero (BSS and stack/heap growth).
    pub fn new(num_pages: usize, exec_pages: usize) -> Self {
        let exec_pages = exec_pages.min(num_pages);
        let mut entries = Vec::with_capacity(num_pages);
        for i in 0..num_pages {
            entries.push(if i < exec_pages {
                PageTableEntry::from_executable(i * machine::addressing::PAGE_SIZE)
            } else {
                PageTableEntry::demand_zero()
            });
        }
        Self { entries: Mutex::new(entries) }
    }

    pub fn num_pages(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn get(&self, vpn: Vpn) -> Option<PageTableEntry> {
        self.entries.lock().unwrap().get(vpn.0).copied()
    }

    pub fn set(&self, vpn: Vpn, entry: PageTableEntry) {
        self.entries.lock().unwrap()[vpn.0] = entry;
    }

    /// Every page index currently resident (`valid`), for [`super::MemoryManager::suspend`].
    pub fn resident_pages(&self) -> Vec<Vpn> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .enumerate()
            .filter(|(_, e)| e.valid)
            .map(|(i, _)| Vpn(i))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_splits_executable_and_demand_zero_pages() {
        let table = PageTable::new(4, 2);
        assert!(matches!(table.get(Vpn(0)).unwrap().backing, Backing::File { offset: 0 }));
        assert!(matches!(table.get(Vpn(1)).unwrap().backing, Backing::File { .. }));
        assert!(matches!(table.get(Vpn(2)).unwrap().backing, Backing::Zero));
        assert!(matches!(table.get(Vpn(3)).unwrap().backing, Backing::Zero));
        assert!(table.resident_pages().is_empty());
    }

    #[test]
    fn set_marks_a_page_resident() {
        let table = PageTable::new(2, 0);
        let mut entry = table.get(Vpn(0)).unwrap();
        entry.valid = true;
        entry.frame = Some(FrameNumber(3));
        table.set(Vpn(0), entry);
        assert_eq!(table.resident_pages(), vec![Vpn(0)]);
        assert_eq!(table.get(Vpn(0)).unwrap().frame, Some(FrameNumber(3)));
    }
}
