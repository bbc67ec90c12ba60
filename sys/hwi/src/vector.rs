// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The vector table and the dispatch routers.
//!
//! [`VectorTable`] is the kernel's record of what each vector points at.
//! The live, hardware-visible table is updated in step with it through
//! [`crate::arch::Platform::plug_vector`].
//!
//! When an interrupt goes through the dispatcher, something has to map the
//! vector back to its interrupt object. That's a [`VectorRouter`]. Parts
//! with plenty of RAM use [`DenseRouter`], a direct array indexed by vector
//! number. Parts with few managed interrupts use [`SparseRouter`], a small
//! pool of records each vector slot can point at.

use abi::InterruptNum;

use crate::config::{NUM_INTERRUPTS, NUM_SPARSE_INTERRUPTS};
use crate::err::HwiError;
use crate::hwi::HwiHandle;

/// Architecturally defined entries at the start of the table.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SystemVector {
    Stack,
    Reset,
    Nmi,
    HardFault,
    MemFault,
    BusFault,
    UsageFault,
    Reserved,
    SvCall,
    DebugMon,
    PendSv,
}

/// What a vector table entry points at.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum VectorSlot {
    /// Nothing. Taking this vector is reported as a no-ISR fault.
    NullIsr,
    System(SystemVector),
    /// A handler called directly by the hardware. Holds its address.
    Bypass(usize),
    /// The shared dispatcher entry.
    Dispatcher,
    /// Sparse dispatch record `index`, at address `record`.
    Sparse { index: u16, record: usize },
}

pub struct VectorTable {
    slots: [VectorSlot; NUM_INTERRUPTS],
}

impl Default for VectorTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Slots 0-14 at boot.
const SYSTEM_VECTORS: [SystemVector; 15] = {
    use SystemVector::*;
    [
        Stack, Reset, Nmi, HardFault, MemFault, BusFault, UsageFault,
        Reserved, Reserved, Reserved, Reserved, SvCall, DebugMon, Reserved,
        PendSv,
    ]
};

impl VectorTable {
    /// Creates the boot-time table: system entries in slots 0-14, and
    /// SysTick and every device interrupt unclaimed.
    pub const fn new() -> Self {
        let mut slots = [VectorSlot::NullIsr; NUM_INTERRUPTS];
        let mut i = 0;
        while i < SYSTEM_VECTORS.len() {
            slots[i] = VectorSlot::System(SYSTEM_VECTORS[i]);
            i += 1;
        }
        Self { slots }
    }

    /// What `num` holds at boot, and goes back to when its interrupt object
    /// is destroyed.
    pub fn boot_slot(num: InterruptNum) -> VectorSlot {
        SYSTEM_VECTORS
            .get(num.index())
            .map_or(VectorSlot::NullIsr, |&v| VectorSlot::System(v))
    }

    pub fn get(&self, num: InterruptNum) -> Option<VectorSlot> {
        self.slots.get(num.index()).copied()
    }

    pub fn is_null(&self, num: InterruptNum) -> bool {
        self.get(num) == Some(VectorSlot::NullIsr)
    }

    /// Whether an interrupt object may take `num` over: it holds nothing,
    /// or the kernel's own handler for an exception. The initial stack
    /// pointer and reset entries are never claimable.
    pub fn is_claimable(&self, num: InterruptNum) -> bool {
        match self.get(num) {
            Some(VectorSlot::NullIsr) => true,
            Some(VectorSlot::System(v)) => {
                !matches!(v, SystemVector::Stack | SystemVector::Reset)
            }
            _ => false,
        }
    }

    pub(crate) fn set(&mut self, num: InterruptNum, slot: VectorSlot) {
        if let Some(s) = self.slots.get_mut(num.index()) {
            *s = slot;
        }
    }

    /// Iterates over every entry along with its vector number.
    pub fn iter(
        &self,
    ) -> impl Iterator<Item = (InterruptNum, VectorSlot)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .map(|(i, s)| (InterruptNum(i as u16), *s))
    }
}

/// Maps dispatched vectors back to their interrupt objects.
pub trait VectorRouter {
    /// Records `owner` as the object behind `num` and returns the slot to
    /// plug into the vector table.
    fn bind(
        &mut self,
        num: InterruptNum,
        owner: HwiHandle,
    ) -> Result<VectorSlot, HwiError>;

    /// Releases whatever `bind` set up for `num`, given the slot it
    /// returned.
    fn unbind(&mut self, num: InterruptNum, slot: VectorSlot);

    /// Finds the object behind `num`, whose vector table entry is `slot`.
    fn resolve(&self, num: InterruptNum, slot: VectorSlot) -> Option<HwiHandle>;
}

impl<T: VectorRouter + ?Sized> VectorRouter for &mut T {
    fn bind(
        &mut self,
        num: InterruptNum,
        owner: HwiHandle,
    ) -> Result<VectorSlot, HwiError> {
        (**self).bind(num, owner)
    }
    fn unbind(&mut self, num: InterruptNum, slot: VectorSlot) {
        (**self).unbind(num, slot)
    }
    fn resolve(
        &self,
        num: InterruptNum,
        slot: VectorSlot,
    ) -> Option<HwiHandle> {
        (**self).resolve(num, slot)
    }
}

/// One owner per vector, looked up by vector number.
pub struct DenseRouter {
    table: [Option<HwiHandle>; NUM_INTERRUPTS],
}

impl Default for DenseRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl DenseRouter {
    pub const fn new() -> Self {
        Self {
            table: [None; NUM_INTERRUPTS],
        }
    }
}

impl VectorRouter for DenseRouter {
    fn bind(
        &mut self,
        num: InterruptNum,
        owner: HwiHandle,
    ) -> Result<VectorSlot, HwiError> {
        let entry = self
            .table
            .get_mut(num.index())
            .ok_or(HwiError::BadIntNum(num))?;
        *entry = Some(owner);
        Ok(VectorSlot::Dispatcher)
    }

    fn unbind(&mut self, num: InterruptNum, _slot: VectorSlot) {
        if let Some(entry) = self.table.get_mut(num.index()) {
            *entry = None;
        }
    }

    fn resolve(
        &self,
        num: InterruptNum,
        _slot: VectorSlot,
    ) -> Option<HwiHandle> {
        self.table.get(num.index()).copied().flatten()
    }
}

/// A sparse dispatch record.
///
/// The vector slot points at the record itself; `thread` is the address the
/// record's trampoline branches to (the dispatcher). An entry whose `owner`
/// is `None` is free.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(C)]
pub struct SparseEntry {
    pub thread: usize,
    pub reserved: usize,
    pub owner: Option<HwiHandle>,
}

impl SparseEntry {
    const EMPTY: Self = Self {
        thread: 0,
        reserved: 0,
        owner: None,
    };
}

/// A fixed pool of `M` dispatch records shared by all managed interrupts.
///
/// Running out of records is an error, not something to paper over.
pub struct SparseRouter<const M: usize = NUM_SPARSE_INTERRUPTS> {
    entries: [SparseEntry; M],
    dispatcher: usize,
}

impl<const M: usize> SparseRouter<M> {
    /// Creates an empty pool whose records branch to `dispatcher`.
    pub const fn new(dispatcher: usize) -> Self {
        Self {
            entries: [SparseEntry::EMPTY; M],
            dispatcher,
        }
    }

    pub fn entries(&self) -> &[SparseEntry] {
        &self.entries
    }

    pub fn free_count(&self) -> usize {
        self.entries.iter().filter(|e| e.owner.is_none()).count()
    }
}

impl<const M: usize> VectorRouter for SparseRouter<M> {
    fn bind(
        &mut self,
        _num: InterruptNum,
        owner: HwiHandle,
    ) -> Result<VectorSlot, HwiError> {
        let index = self
            .entries
            .iter()
            .position(|e| e.owner.is_none())
            .ok_or(HwiError::LimitExceeded)?;
        let entry = &mut self.entries[index];
        *entry = SparseEntry {
            thread: self.dispatcher,
            reserved: 0,
            owner: Some(owner),
        };
        Ok(VectorSlot::Sparse {
            index: index as u16,
            record: entry as *const SparseEntry as usize,
        })
    }

    fn unbind(&mut self, _num: InterruptNum, slot: VectorSlot) {
        if let VectorSlot::Sparse { index, .. } = slot {
            if let Some(e) = self.entries.get_mut(usize::from(index)) {
                e.owner = None;
            }
        }
    }

    fn resolve(
        &self,
        _num: InterruptNum,
        slot: VectorSlot,
    ) -> Option<HwiHandle> {
        match slot {
            VectorSlot::Sparse { index, .. } => {
                self.entries.get(usize::from(index))?.owner
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(index: u16) -> HwiHandle {
        HwiHandle::new(index, 0)
    }

    #[test]
    fn boot_table_layout() {
        let t = VectorTable::new();
        assert_eq!(
            t.get(InterruptNum(0)),
            Some(VectorSlot::System(SystemVector::Stack))
        );
        assert_eq!(
            t.get(InterruptNum::SVCALL),
            Some(VectorSlot::System(SystemVector::SvCall))
        );
        assert_eq!(
            t.get(InterruptNum(13)),
            Some(VectorSlot::System(SystemVector::Reserved))
        );
        assert_eq!(
            t.get(InterruptNum::PENDSV),
            Some(VectorSlot::System(SystemVector::PendSv))
        );
        assert!(t.is_null(InterruptNum::SYSTICK));
        assert!(t.iter().skip(15).all(|(_, s)| s == VectorSlot::NullIsr));
        assert!(t.iter().all(|(n, s)| VectorTable::boot_slot(n) == s));
        assert!(!t.is_claimable(InterruptNum(1)));
        assert!(t.is_claimable(InterruptNum::BUS_FAULT));
        assert_eq!(t.get(InterruptNum(NUM_INTERRUPTS as u16)), None);
    }

    #[test]
    fn dense_round_trip() {
        let mut r = DenseRouter::new();
        let slot = r.bind(InterruptNum(20), handle(3)).unwrap();
        assert_eq!(slot, VectorSlot::Dispatcher);
        assert_eq!(r.resolve(InterruptNum(20), slot), Some(handle(3)));
        assert_eq!(r.resolve(InterruptNum(21), slot), None);
        r.unbind(InterruptNum(20), slot);
        assert_eq!(r.resolve(InterruptNum(20), slot), None);
    }

    #[test]
    fn sparse_exhaustion_is_an_error() {
        let mut r = SparseRouter::<2>::new(0x1234);
        let a = r.bind(InterruptNum(16), handle(0)).unwrap();
        let b = r.bind(InterruptNum(17), handle(1)).unwrap();
        assert_eq!(
            r.bind(InterruptNum(18), handle(2)),
            Err(HwiError::LimitExceeded)
        );
        assert_eq!(r.free_count(), 0);
        assert_eq!(r.entries()[0].thread, 0x1234);

        assert_eq!(r.resolve(InterruptNum(17), b), Some(handle(1)));
        r.unbind(InterruptNum(16), a);
        assert_eq!(r.resolve(InterruptNum(16), a), None);
        assert_eq!(r.free_count(), 1);

        // The freed record is reused.
        let c = r.bind(InterruptNum(18), handle(2)).unwrap();
        assert!(matches!(c, VectorSlot::Sparse { index: 0, .. }));
    }

    #[test]
    fn sparse_slot_points_at_record() {
        let mut r = SparseRouter::<4>::new(0);
        let slot = r.bind(InterruptNum(30), handle(0)).unwrap();
        let VectorSlot::Sparse { index, record } = slot else {
            panic!("expected sparse slot, got {slot:?}");
        };
        let expected = &r.entries()[usize::from(index)] as *const _ as usize;
        assert_eq!(record, expected);
    }
}
