//! Try-region bookkeeping.
//!
//! Regions are kept sorted by begin PC ascending and, for equal begins, by
//! end PC descending, so an outer region always precedes the regions nested
//! inside it.

use abir_ir::BlockId;

use crate::method::CatchEntry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handler {
    pub pc: u32,
    pub type_id: u32,
}

#[derive(Debug, Clone)]
pub struct TryRegion {
    pub id: u32,
    pub begin: u32,
    /// Exclusive.
    pub end: u32,
    /// In exception-table order.
    pub handlers: Vec<Handler>,
    /// Blocks whose innermost enclosing region this is.
    pub blocks: Vec<BlockId>,
    /// Covers at least one instruction that can throw.
    pub throwing: bool,
}

impl TryRegion {
    #[inline]
    pub fn covers(&self, pc: u32) -> bool {
        self.begin <= pc && pc < self.end
    }
}

#[derive(Debug, Clone, Default)]
pub struct RegionTracker {
    regions: Vec<TryRegion>,
}

impl RegionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Group an exception table into regions, one per distinct try range.
    pub fn from_catches(catches: &[CatchEntry]) -> Self {
        let mut tracker = Self::new();
        for c in catches {
            let id = tracker.insert(c.try_begin, c.try_end);
            tracker.add_handler(id, c.handler_pc, c.type_id);
        }
        tracker
    }

    /// Region for `[begin, end)`, created on first use. Returns its id.
    pub fn insert(&mut self, begin: u32, end: u32) -> u32 {
        if let Some(r) = self.regions.iter().find(|r| r.begin == begin && r.end == end) {
            return r.id;
        }
        let id = self.regions.len() as u32;
        let at = self
            .regions
            .partition_point(|r| r.begin < begin || (r.begin == begin && r.end > end));
        self.regions.insert(
            at,
            TryRegion {
                id,
                begin,
                end,
                handlers: Vec::new(),
                blocks: Vec::new(),
                throwing: false,
            },
        );
        id
    }

    /// Append a handler to region `id`; repeated handlers are ignored.
    pub fn add_handler(&mut self, id: u32, pc: u32, type_id: u32) {
        if let Some(region) = self.get_mut(id) {
            let handler = Handler { pc, type_id };
            if !region.handlers.contains(&handler) {
                region.handlers.push(handler);
            }
        }
    }

    pub fn get(&self, id: u32) -> Option<&TryRegion> {
        self.regions.iter().find(|r| r.id == id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut TryRegion> {
        self.regions.iter_mut().find(|r| r.id == id)
    }

    /// All regions, outer before inner.
    pub fn regions(&self) -> &[TryRegion] {
        &self.regions
    }

    pub(crate) fn regions_mut(&mut self) -> &mut [TryRegion] {
        &mut self.regions
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Regions whose range contains `pc`, outer before inner.
    pub fn enumerate_covering(&self, pc: u32) -> impl Iterator<Item = &TryRegion> {
        self.regions
            .iter()
            .take_while(move |r| r.begin <= pc)
            .filter(move |r| pc < r.end)
    }

    /// The innermost region containing `pc`.
    pub fn innermost_covering(&self, pc: u32) -> Option<&TryRegion> {
        self.enumerate_covering(pc).last()
    }

    /// Distinct handler PCs over all regions, in first-seen order.
    pub fn handler_pcs(&self) -> Vec<u32> {
        let mut pcs = Vec::new();
        for h in self.regions.iter().flat_map(|r| &r.handlers) {
            if !pcs.contains(&h.pc) {
                pcs.push(h.pc);
            }
        }
        pcs
    }
}
