//! The swap area: a dedicated region of page-sized slots, bitmap-tracked,
//! that evicted dirty pages are written to and demand-paged back from.
use machine::addressing::PAGE_SIZE;
use std::sync::Mutex;

struct Inner {
    used: Vec<bool>,
    slots: Vec<[u8; PAGE_SIZE]>,
}

pub struct SwapArea {
    inner: Mutex<Inner>,
}

impl SwapArea {
    pub fn new(num_slots: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                used: vec![false; num_slots],
                slots: vec![[0u8; PAGE_SIZE]; num_slots],
            }),
        }
    }

    /// Claim a free slot, if any.
    pub fn alloc_slot(&self) -> Option<u32> {
        let mut inner = self.inner.lock().unwrap();
        let idx = inner.used.iter().position(|b| !*b)?;
        inner.used[idx] = true;
        Some(idx as u32)
    }

    pub fn free_slot(&self, slot: u32) {
        let mut inner = self.inner.lock().unwrap();
        assert!(
            inner.used[slot as usize],
            "freeing an already-free swap slot (fatal kernel invariant violated)"
        );
        inner.used[slot as usize] = false;
    }

    pub fn read_slot(&self, slot: u32) -> [u8; PAGE_SIZE] {
        self.inner.lock().unwrap().slots[slot as usize]
    }

    pub fn write_slot(&self, slot: u32, data: &[u8; PAGE_SIZE]) {
        self.inner.lock().unwrap().slots[slot as usize] = *data;
    }

    pub fn num_clear(&self) -> usize {
        self.inner.lock().unwrap().used.iter().filter(|b| !**b).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_page_through_a_slot() {
        let swap = SwapArea::new(2);
        let slot = swap.alloc_slot().unwrap();
        let mut page = [0u8; PAGE_SIZE];
        page[0] = 7;
        page[PAGE_SIZE - 1] = 9;
        swap.write_slot(slot, &page);
        assert_eq!(swap.read_slot(slot), page);
        assert_eq!(swap.num_clear(), 1);
        swap.free_slot(slot);
        assert_eq!(swap.num_clear(), 2);
    }

    #[test]
    fn alloc_exhausts_when_full() {
        let swap = SwapArea::new(1);
        assert!(swap.alloc_slot().is_some());
        assert!(swap.alloc_slot().is_none());
    }
}
