// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-memory model of the interrupt hardware, for host builds.
//!
//! Each core gets its own register file. The "current" core is whichever one
//! was last selected with [`FakePlatform::switch_core`]; every `Platform`
//! call acts on it, which is how tests play the part of two CPUs from one
//! thread.

use std::cell::{Cell, RefCell};

use abi::{CoreId, InterruptNum, MAX_CORES};

use super::{icsr, IrqKey, NvicBank, Platform, ScbReg, AIRCR_VECTKEY};
use crate::config::{NUM_DEVICE_IRQS, NUM_INTERRUPTS, NVIC_WORDS};
use crate::vector::VectorSlot;

/// A register write, as seen by the fake hardware.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Access {
    Bank {
        core: CoreId,
        bank: NvicBank,
        word: usize,
        value: u32,
    },
    Ipr {
        core: CoreId,
        irq: usize,
        value: u8,
    },
}

#[derive(Clone, Debug)]
struct FakeRegs {
    enabled: [u32; NVIC_WORDS],
    pending: [u32; NVIC_WORDS],
    active: [u32; NVIC_WORDS],
    ipr: [u8; NUM_DEVICE_IRQS],
    /// Priorities of exceptions 4 through 15.
    shpr: [u8; 12],
    icsr_pend: u32,
    vtor: u32,
    aircr: u32,
    ccr: u32,
    shcsr: u32,
    cfsr: u32,
    hfsr: u32,
    dfsr: u32,
    mmfar: u32,
    bfar: u32,
    afsr: u32,
    syst_csr: u32,
    masked: bool,
    active_vector: u16,
    sp: usize,
}

impl Default for FakeRegs {
    fn default() -> Self {
        Self {
            enabled: [0; NVIC_WORDS],
            pending: [0; NVIC_WORDS],
            active: [0; NVIC_WORDS],
            ipr: [0; NUM_DEVICE_IRQS],
            shpr: [0; 12],
            icsr_pend: 0,
            vtor: 0,
            aircr: 0xFA05_0000,
            // STKALIGN is set out of reset on most parts.
            ccr: 1 << 9,
            shcsr: 0,
            cfsr: 0,
            hfsr: 0,
            dfsr: 0,
            mmfar: 0,
            bfar: 0,
            afsr: 0,
            syst_csr: 0,
            masked: false,
            active_vector: 0,
            sp: 0,
        }
    }
}

pub struct FakePlatform {
    current: Cell<u8>,
    regs: [RefCell<FakeRegs>; MAX_CORES],
    accesses: RefCell<Vec<Access>>,
    notifications: RefCell<Vec<CoreId>>,
    vectors: RefCell<[VectorSlot; NUM_INTERRUPTS]>,
    svc: Cell<u8>,
}

impl Default for FakePlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl FakePlatform {
    pub fn new() -> Self {
        Self {
            current: Cell::new(0),
            regs: core::array::from_fn(|_| RefCell::new(FakeRegs::default())),
            accesses: RefCell::new(vec![]),
            notifications: RefCell::new(vec![]),
            vectors: RefCell::new([VectorSlot::NullIsr; NUM_INTERRUPTS]),
            svc: Cell::new(0),
        }
    }

    /// Makes subsequent calls act as `core`.
    pub fn switch_core(&self, core: CoreId) {
        assert!(core.index() < MAX_CORES);
        self.current.set(core.0);
    }

    fn regs(&self) -> std::cell::RefMut<'_, FakeRegs> {
        self.regs[usize::from(self.current.get())].borrow_mut()
    }

    fn regs_of(&self, core: CoreId) -> std::cell::Ref<'_, FakeRegs> {
        self.regs[core.index()].borrow()
    }

    /// Every NVIC bank and priority write so far, oldest first.
    pub fn accesses(&self) -> Vec<Access> {
        self.accesses.borrow().clone()
    }

    pub fn clear_accesses(&self) {
        self.accesses.borrow_mut().clear();
    }

    /// Cores that were sent a notification, in order.
    pub fn notifications(&self) -> Vec<CoreId> {
        self.notifications.borrow().clone()
    }

    /// What the live vector table holds for `num`.
    pub fn plugged(&self, num: InterruptNum) -> VectorSlot {
        self.vectors.borrow()[num.index()]
    }

    pub fn is_masked(&self) -> bool {
        self.regs().masked
    }

    pub fn enabled_word(&self, core: CoreId, word: usize) -> u32 {
        self.regs_of(core).enabled[word]
    }

    pub fn pending_word(&self, core: CoreId, word: usize) -> u32 {
        self.regs_of(core).pending[word]
    }

    pub fn set_enabled_word(&self, core: CoreId, word: usize, value: u32) {
        self.regs[core.index()].borrow_mut().enabled[word] = value;
    }

    pub fn set_pending_word(&self, core: CoreId, word: usize, value: u32) {
        self.regs[core.index()].borrow_mut().pending[word] = value;
    }

    pub fn ipr(&self, core: CoreId, irq: usize) -> u8 {
        self.regs_of(core).ipr[irq]
    }

    /// Pretends the CPU has taken exception `num` on the current core.
    pub fn set_active_vector(&self, num: InterruptNum) {
        self.regs().active_vector = num.0;
    }

    /// Latches fault status as the hardware would on a fault.
    pub fn latch_fault(&self, reg: ScbReg, value: u32) {
        let mut r = self.regs();
        match reg {
            ScbReg::Cfsr => r.cfsr |= value,
            ScbReg::Hfsr => r.hfsr |= value,
            ScbReg::Dfsr => r.dfsr |= value,
            ScbReg::Mmfar => r.mmfar = value,
            ScbReg::Bfar => r.bfar = value,
            ScbReg::Afsr => r.afsr = value,
            other => panic!("{other:?} is not a fault register"),
        }
    }

    pub fn set_svc_number(&self, n: u8) {
        self.svc.set(n);
    }

    pub fn set_stack_pointer(&self, sp: usize) {
        self.regs().sp = sp;
    }
}

impl Platform for FakePlatform {
    fn read_bank(&self, bank: NvicBank, word: usize) -> u32 {
        let r = self.regs();
        let words = match bank {
            NvicBank::Iser | NvicBank::Icer => &r.enabled,
            NvicBank::Ispr | NvicBank::Icpr => &r.pending,
            NvicBank::Iabr => &r.active,
        };
        words.get(word).copied().unwrap_or(0)
    }

    fn write_bank(&self, bank: NvicBank, word: usize, value: u32) {
        let core = CoreId(self.current.get());
        self.accesses.borrow_mut().push(Access::Bank {
            core,
            bank,
            word,
            value,
        });
        let mut r = self.regs();
        if word >= NVIC_WORDS {
            return;
        }
        match bank {
            NvicBank::Iser => r.enabled[word] |= value,
            NvicBank::Icer => r.enabled[word] &= !value,
            NvicBank::Ispr => r.pending[word] |= value,
            NvicBank::Icpr => r.pending[word] &= !value,
            NvicBank::Iabr => (),
        }
    }

    fn read_ipr(&self, irq: usize) -> u8 {
        self.regs().ipr.get(irq).copied().unwrap_or(0)
    }

    fn write_ipr(&self, irq: usize, value: u8) {
        let core = CoreId(self.current.get());
        self.accesses
            .borrow_mut()
            .push(Access::Ipr { core, irq, value });
        if let Some(p) = self.regs().ipr.get_mut(irq) {
            *p = value;
        }
    }

    fn read_shpr(&self, num: InterruptNum) -> u8 {
        self.regs().shpr[num.index() - 4]
    }

    fn write_shpr(&self, num: InterruptNum, value: u8) {
        self.regs().shpr[num.index() - 4] = value;
    }

    fn read_scb(&self, reg: ScbReg) -> u32 {
        let r = self.regs();
        match reg {
            ScbReg::Icsr => {
                r.icsr_pend | (u32::from(r.active_vector) & icsr::VECTACTIVE)
            }
            ScbReg::Vtor => r.vtor,
            ScbReg::Aircr => r.aircr,
            ScbReg::Ccr => r.ccr,
            ScbReg::Shcsr => r.shcsr,
            ScbReg::Cfsr => r.cfsr,
            ScbReg::Hfsr => r.hfsr,
            ScbReg::Dfsr => r.dfsr,
            ScbReg::Mmfar => r.mmfar,
            ScbReg::Bfar => r.bfar,
            ScbReg::Afsr => r.afsr,
            ScbReg::SystCsr => r.syst_csr,
        }
    }

    fn write_scb(&self, reg: ScbReg, value: u32) {
        let mut r = self.regs();
        match reg {
            ScbReg::Icsr => {
                if value & icsr::NMIPENDSET != 0 {
                    r.icsr_pend |= icsr::NMIPENDSET;
                }
                if value & icsr::PENDSVSET != 0 {
                    r.icsr_pend |= icsr::PENDSVSET;
                }
                if value & icsr::PENDSVCLR != 0 {
                    r.icsr_pend &= !icsr::PENDSVSET;
                }
                if value & icsr::PENDSTSET != 0 {
                    r.icsr_pend |= icsr::PENDSTSET;
                }
                if value & icsr::PENDSTCLR != 0 {
                    r.icsr_pend &= !icsr::PENDSTSET;
                }
            }
            ScbReg::Vtor => r.vtor = value,
            ScbReg::Aircr => {
                // Writes without the key are discarded; reads show the
                // complemented key.
                if value & 0xFFFF_0000 == AIRCR_VECTKEY {
                    r.aircr = 0xFA05_0000 | (value & 0xFFFF);
                }
            }
            ScbReg::Ccr => r.ccr = value,
            ScbReg::Shcsr => r.shcsr = value,
            ScbReg::Cfsr => r.cfsr &= !value,
            ScbReg::Hfsr => r.hfsr &= !value,
            ScbReg::Dfsr => r.dfsr &= !value,
            ScbReg::Mmfar => r.mmfar = value,
            ScbReg::Bfar => r.bfar = value,
            ScbReg::Afsr => r.afsr = value,
            ScbReg::SystCsr => r.syst_csr = value,
        }
    }

    fn barrier(&self) {}

    fn disable_interrupts(&self) -> IrqKey {
        let mut r = self.regs();
        let was = r.masked;
        r.masked = true;
        IrqKey(u32::from(was))
    }

    fn enable_interrupts(&self) {
        self.regs().masked = false;
    }

    fn restore_interrupts(&self, key: IrqKey) {
        self.regs().masked = key.0 != 0;
    }

    fn active_vector(&self) -> InterruptNum {
        InterruptNum(self.regs().active_vector)
    }

    fn core_id(&self) -> CoreId {
        CoreId(self.current.get())
    }

    fn notify_core(&self, core: CoreId) {
        self.notifications.borrow_mut().push(core);
    }

    fn plug_vector(&self, num: InterruptNum, slot: VectorSlot) {
        if let Some(v) = self.vectors.borrow_mut().get_mut(num.index()) {
            *v = slot;
        }
    }

    fn vector_table_base(&self) -> u32 {
        0x2000_0000
    }

    fn svc_number(&self, _pc: u32) -> u8 {
        self.svc.get()
    }

    fn stack_pointer(&self) -> usize {
        self.regs().sp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn banks_share_state() {
        let p = FakePlatform::new();
        p.write_bank(NvicBank::Iser, 0, 0b1010);
        p.write_bank(NvicBank::Icer, 0, 0b0010);
        assert_eq!(p.read_bank(NvicBank::Iser, 0), 0b1000);
        assert_eq!(p.read_bank(NvicBank::Icer, 0), 0b1000);
        assert_eq!(p.read_bank(NvicBank::Iser, 99), 0);
    }

    #[test]
    fn cores_are_separate() {
        let p = FakePlatform::new();
        p.switch_core(CoreId(1));
        p.write_bank(NvicBank::Ispr, 1, 4);
        assert_eq!(p.pending_word(CoreId(1), 1), 4);
        assert_eq!(p.pending_word(CoreId(0), 1), 0);
    }

    #[test]
    fn fault_registers_are_write_one_to_clear() {
        let p = FakePlatform::new();
        p.latch_fault(ScbReg::Cfsr, 0x0001_0400);
        p.write_scb(ScbReg::Cfsr, 0x0000_0400);
        assert_eq!(p.read_scb(ScbReg::Cfsr), 0x0001_0000);
    }

    #[test]
    fn aircr_needs_key() {
        let p = FakePlatform::new();
        p.write_scb(ScbReg::Aircr, 3 << 8);
        assert_eq!(p.read_scb(ScbReg::Aircr) & 0x700, 0);
        p.write_scb(ScbReg::Aircr, AIRCR_VECTKEY | 3 << 8);
        assert_eq!(p.read_scb(ScbReg::Aircr) & 0x700, 3 << 8);
    }
}
