//! Demand-paged virtual memory: per-address-space page tables, the
//! physical-frame map, the swap area, and the page-fault handler that ties
//! them to the machine's software-filled TLB.
pub mod frame;
pub mod page_table;
pub mod swap;
pub mod tlb;

use self::frame::FrameAllocator;
use self::page_table::{Backing, PageTable, PageTableEntry};
use self::swap::SwapArea;
use self::tlb::TlbReplacementPolicy;
use crate::error::{KernelError, NachosError, Result};
use machine::addressing::{FrameNumber, Pa, Va, Vpn, PAGE_SIZE};
use machine::{PhysicalMemory, Tlb};
use std::sync::{Arc, Mutex};

/// One user process's address space: its page table plus the executable
/// image pages are demand-loaded from.
pub struct AddressSpace {
    page_table: PageTable,
    executable: Arc<Vec<u8>>,
}

impl AddressSpace {
    /// Build an address space of `num_pages` pages backed by `executable`,
    /// whose first `executable.len().div_ceil(PAGE_SIZE)` pages are
    /// demand-loaded from the image and the rest are demand-zero.
    pub fn new(num_pages: usize, executable: Arc<Vec<u8>>) -> Self {
        let exec_pages = executable.len().div_ceil(PAGE_SIZE);
        Self { page_table: PageTable::new(num_pages, exec_pages), executable }
    }

    pub fn num_pages(&self) -> usize {
        self.page_table.num_pages()
    }

    pub fn page_table(&self) -> &PageTable {
        &self.page_table
    }

    /// A fresh address space with the same page count and executable
    /// backing as this one, for `fork`'s "new address space cloned from
    /// the current one". A structural clone of the layout, not a deep
    /// copy of resident frame contents — the forked process demand-pages
    /// its own copy in from the same executable rather than inheriting
    /// the parent's live memory image.
    pub fn clone_layout(&self) -> Self {
        Self::new(self.num_pages(), self.executable.clone())
    }
}

struct FrameOwner {
    space: Arc<AddressSpace>,
    vpn: Vpn,
    last_used: u64,
}

/// The kernel's virtual-memory subsystem: frame allocator, swap area and
/// the simulated machine's physical memory, plus a reverse map from frame
/// to current owner so a fault that finds no free frame can pick a
/// victim to evict.
pub struct MemoryManager {
    frames: Mutex<FrameAllocator>,
    swap: SwapArea,
    physical: Mutex<PhysicalMemory>,
    owners: Mutex<Vec<Option<FrameOwner>>>,
    /// The single software TLB, shared by every address space: only one
    /// kernel thread ever runs at a time, so one translation cache mirrors
    /// the original's single-CPU MMU. Flushed whenever the thread holding
    /// the run token belongs to a different address space than the one
    /// the cache currently reflects.
    tlb: Mutex<Tlb>,
    tlb_owner: Mutex<Option<usize>>,
    tlb_replacement_policy: TlbReplacementPolicy,
    clock: std::sync::atomic::AtomicU64,
}

impl MemoryManager {
    pub fn new(num_frames: usize, num_swap_slots: usize, tlb_size: usize) -> Self {
        Self::with_tlb_replacement_policy(num_frames, num_swap_slots, tlb_size, TlbReplacementPolicy::Lru)
    }

    pub fn with_tlb_replacement_policy(
        num_frames: usize,
        num_swap_slots: usize,
        tlb_size: usize,
        tlb_replacement_policy: TlbReplacementPolicy,
    ) -> Self {
        Self {
            frames: Mutex::new(FrameAllocator::new(num_frames)),
            swap: SwapArea::new(num_swap_slots),
            physical: Mutex::new(PhysicalMemory::new(num_frames, PAGE_SIZE)),
            owners: Mutex::new((0..num_frames).map(|_| None).collect()),
            tlb: Mutex::new(Tlb::new(tlb_size)),
            tlb_owner: Mutex::new(None),
            tlb_replacement_policy,
            clock: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// The next tick of this manager's logical clock, used to stamp
    /// last-used times for TLB and frame-eviction LRU. Monotonic, but not
    /// tied to the machine's timer-interrupt tick count: every access that
    /// needs an ordering, not a wall-clock rate, draws from here.
    pub fn next_tick(&self) -> u64 {
        self.clock.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1
    }

    fn ensure_tlb_owner(&self, space: &Arc<AddressSpace>) {
        let id = Arc::as_ptr(space) as usize;
        let mut owner = self.tlb_owner.lock().unwrap();
        if *owner != Some(id) {
            self.tlb.lock().unwrap().flush();
            *owner = Some(id);
        }
    }

    /// Translate `va` in `space` to a physical address, faulting the page
    /// in (and refilling the TLB) on a miss. `write` additionally marks the
    /// page dirty, for a store instruction.
    pub fn translate(&self, space: &Arc<AddressSpace>, va: Va, tick: u64, write: bool) -> Result<Pa> {
        self.ensure_tlb_owner(space);
        let vpn = va.vpn();
        let hit = self.tlb.lock().unwrap().lookup(vpn, tick);
        let frame = match hit {
            Some(f) => f,
            None => {
                let mut tlb = self.tlb.lock().unwrap();
                self.handle_fault(space, vpn, tick, &mut *tlb)?
            }
        };
        if write {
            self.mark_dirty(space, vpn);
            self.tlb.lock().unwrap().mark_dirty(vpn);
        }
        Ok(Pa::new(frame.base().into_usize() + va.offset()))
    }

    pub fn num_frames(&self) -> usize {
        self.frames.lock().unwrap().num_frames()
    }

    /// Read `buf.len()` bytes of physical memory starting at `frame`'s
    /// base address plus `offset`.
    pub fn read_frame(&self, frame: FrameNumber, offset: usize, buf: &mut [u8]) {
        self.physical.lock().unwrap().read(frame.base().into_usize() + offset, buf);
    }

    /// Write `data` into physical memory starting at `frame`'s base
    /// address plus `offset`.
    pub fn write_frame(&self, frame: FrameNumber, offset: usize, data: &[u8]) {
        self.physical.lock().unwrap().write(frame.base().into_usize() + offset, data);
    }

    fn alloc_frame(&self) -> Option<FrameNumber> {
        self.frames.lock().unwrap().alloc()
    }

    /// Evict a resident page to free up its frame: if it's dirty, copy it
    /// to a fresh swap slot first and repoint its page-table entry there;
    /// either way mark the entry non-resident. Returns the freed frame and
    /// which address space/page it used to belong to, so the caller can
    /// invalidate a stale TLB entry if that page table is the one
    /// currently mapped.
    fn evict_one(&self) -> Result<(FrameNumber, Arc<AddressSpace>, Vpn)> {
        let mut owners = self.owners.lock().unwrap();
        let (idx, _) = owners
            .iter()
            .enumerate()
            .filter_map(|(i, o)| o.as_ref().map(|o| (i, o.last_used)))
            .min_by_key(|&(_, t)| t)
            .ok_or(NachosError::Kernel(KernelError::NoMemory))?;
        let owner = owners[idx].take().unwrap();
        drop(owners);

        let frame = FrameNumber(idx);
        let mut entry = owner
            .space
            .page_table
            .get(owner.vpn)
            .expect("frame owner references a page outside its address space");

        if entry.dirty {
            let slot = self.swap.alloc_slot().ok_or(NachosError::Kernel(KernelError::NoMemory))?;
            let mut page = [0u8; PAGE_SIZE];
            self.read_frame(frame, 0, &mut page);
            self.swap.write_slot(slot, &page);
            entry.backing = Backing::Swap(slot);
        }
        entry.valid = false;
        entry.dirty = false;
        entry.used = false;
        entry.frame = None;
        owner.space.page_table.set(owner.vpn, entry);

        Ok((frame, owner.space, owner.vpn))
    }

    fn refill_content(&self, frame: FrameNumber, space: &AddressSpace, entry: &PageTableEntry) {
        match entry.backing {
            Backing::Zero => {
                self.physical.lock().unwrap().zero_frame(frame, PAGE_SIZE);
            }
            Backing::File { offset } => {
                let mut page = [0u8; PAGE_SIZE];
                let avail = space.executable.len().saturating_sub(offset).min(PAGE_SIZE);
                page[..avail].copy_from_slice(&space.executable[offset..offset + avail]);
                self.write_frame(frame, 0, &page);
            }
            Backing::Swap(slot) => {
                let page = self.swap.read_slot(slot);
                self.write_frame(frame, 0, &page);
                self.swap.free_slot(slot);
            }
        }
    }

    /// Service a fault (a TLB miss, whether or not the page table entry it
    /// names is already resident) for `vpn` in `space`, installing the
    /// resulting mapping into `tlb`.
    pub fn handle_fault(&self, space: &Arc<AddressSpace>, vpn: Vpn, tick: u64, tlb: &mut Tlb) -> Result<FrameNumber> {
        let mut entry = space.page_table.get(vpn).ok_or(NachosError::Kernel(KernelError::BadAddress))?;

        let frame = if entry.valid {
            entry.frame.expect("valid page-table entry with no frame (fatal kernel invariant violated)")
        } else {
            let frame = match self.alloc_frame() {
                Some(f) => f,
                None => {
                    let (f, victim_space, victim_vpn) = self.evict_one()?;
                    if Arc::ptr_eq(&victim_space, space) {
                        tlb.invalidate(victim_vpn);
                    }
                    f
                }
            };
            self.refill_content(frame, space, &entry);
            entry.valid = true;
            entry.dirty = false;
            entry.frame = Some(frame);
            space.page_table.set(vpn, entry);

            let mut owners = self.owners.lock().unwrap();
            owners[frame.0] = Some(FrameOwner { space: space.clone(), vpn, last_used: tick });
            frame
        };

        {
            let mut owners = self.owners.lock().unwrap();
            if let Some(o) = owners[frame.0].as_mut() {
                o.last_used = tick;
            }
        }
        tlb::refill(tlb, vpn, frame, tick, self.tlb_replacement_policy);
        Ok(frame)
    }

    /// Record a store through an already-resident TLB entry: mark the
    /// page-table entry dirty too, so a later eviction knows to swap it
    /// out rather than silently discard it.
    pub fn mark_dirty(&self, space: &AddressSpace, vpn: Vpn) {
        if let Some(mut entry) = space.page_table.get(vpn) {
            entry.dirty = true;
            space.page_table.set(vpn, entry);
        }
    }

    /// Swap out and invalidate every resident page of `space`, releasing
    /// its frames. Used to suspend a thread under memory pressure without
    /// tearing its address space down.
    pub fn suspend(&self, space: &Arc<AddressSpace>) -> Result<()> {
        for vpn in space.page_table.resident_pages() {
            let mut entry = space.page_table.get(vpn).expect("just listed as resident");
            if !entry.valid {
                continue;
            }
            let frame = entry.frame.expect("valid entry with no frame");
            if entry.dirty {
                let slot = self.swap.alloc_slot().ok_or(NachosError::Kernel(KernelError::NoMemory))?;
                let mut page = [0u8; PAGE_SIZE];
                self.read_frame(frame, 0, &mut page);
                self.swap.write_slot(slot, &page);
                entry.backing = Backing::Swap(slot);
            }
            entry.valid = false;
            entry.dirty = false;
            entry.used = false;
            entry.frame = None;
            space.page_table.set(vpn, entry);

            self.frames.lock().unwrap().free(frame);
            self.owners.lock().unwrap()[frame.0] = None;
            self.tlb.lock().unwrap().invalidate(vpn);
        }
        Ok(())
    }

    /// Free every valid frame of `space` outright, with no swap-out. Used
    /// on process exit, where the contents no longer matter.
    pub fn release_address_space(&self, space: &Arc<AddressSpace>) {
        for vpn in space.page_table.resident_pages() {
            let mut entry = space.page_table.get(vpn).expect("just listed as resident");
            if !entry.valid {
                continue;
            }
            let frame = entry.frame.expect("valid entry with no frame");
            entry.valid = false;
            entry.frame = None;
            space.page_table.set(vpn, entry);

            self.frames.lock().unwrap().free(frame);
            self.owners.lock().unwrap()[frame.0] = None;
            self.tlb.lock().unwrap().invalidate(vpn);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eviction_swaps_a_dirty_page_out_and_back_in_under_frame_pressure() {
        // Two frames, three demand-zero pages: touching all three forces
        // an eviction, and writing before eviction forces a swap round
        // trip rather than a silent drop.
        let mm = MemoryManager::new(2, 2, 4);
        let space = Arc::new(AddressSpace::new(3, Arc::new(Vec::new())));

        let tick = mm.next_tick();
        let pa0 = mm.translate(&space, Vpn(0).base(), tick, true).unwrap();
        mm.write_frame(pa0.frame(), 0, b"page-zero");

        let tick = mm.next_tick();
        let pa1 = mm.translate(&space, Vpn(1).base(), tick, true).unwrap();
        mm.write_frame(pa1.frame(), 0, b"page-one!");

        // Touching page 2 has no free frame left: this must evict page 0
        // or page 1 (whichever is older), swapping it out since we wrote
        // to it above.
        let tick = mm.next_tick();
        let pa2 = mm.translate(&space, Vpn(2).base(), tick, true).unwrap();
        mm.write_frame(pa2.frame(), 0, b"page-two!");

        // Faulting page 0 back in (whether or not it was the one evicted)
        // must still see its original contents.
        let tick = mm.next_tick();
        let pa0_again = mm.translate(&space, Vpn(0).base(), tick, false).unwrap();
        let mut buf = [0u8; 9];
        mm.read_frame(pa0_again.frame(), 0, &mut buf);
        assert_eq!(&buf, b"page-zero");
    }

    #[test]
    fn release_address_space_frees_every_resident_frame() {
        let mm = MemoryManager::new(2, 2, 4);
        let space = Arc::new(AddressSpace::new(2, Arc::new(Vec::new())));
        mm.translate(&space, Vpn(0).base(), mm.next_tick(), false).unwrap();
        mm.translate(&space, Vpn(1).base(), mm.next_tick(), false).unwrap();
        assert_eq!(mm.frames.lock().unwrap().free_count(), 0);

        mm.release_address_space(&space);
        assert_eq!(mm.frames.lock().unwrap().free_count(), 2);
    }
}
