// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Cortex-M (ARMv6-M, ARMv7-M, ARMv8-M) register access.
//!
//! # Masking
//!
//! On ARMv7-M and ARMv8-M, "disabling interrupts" raises BASEPRI to the
//! configured disable priority, so interrupts more urgent than that keep
//! running (they're the ones the dispatcher is bypassed for). ARMv6-M has no
//! BASEPRI and falls back to PRIMASK, which masks everything.
//!
//! # Vector table
//!
//! The live vector table is a RAM copy owned by this module. Entry stubs
//! that save state and call into [`crate::InterruptController`] are provided
//! by the kernel's assembly entry code as `hwi_dispatch` (the shared
//! dispatcher) and `hwi_exc_entry` (faults, and vectors with no handler).

use core::arch;
use core::sync::atomic::{AtomicU32, Ordering};

use abi::{CoreId, InterruptNum, Priority};

use super::{IrqKey, NvicBank, Platform, ScbReg};
use crate::config::NUM_INTERRUPTS;
use crate::vector::{SystemVector, VectorSlot};

extern "C" {
    fn hwi_dispatch();
    fn hwi_exc_entry();
    // Provided by the runtime's linker script and reset code.
    static _stack_start: u32;
    fn Reset() -> !;
}

/// VTOR needs the table aligned to its size rounded up to a power of two.
#[repr(C, align(1024))]
struct RamVectors([AtomicU32; NUM_INTERRUPTS]);

static_assertions::const_assert!(NUM_INTERRUPTS * 4 <= 1024);

static RAM_VECTORS: RamVectors =
    RamVectors([const { AtomicU32::new(0) }; NUM_INTERRUPTS]);

pub struct ArmM {
    disable_priority: Priority,
    core_id: fn() -> CoreId,
    notify: fn(CoreId),
}

fn single_core() -> CoreId {
    CoreId(0)
}

fn no_notify(_: CoreId) {}

impl ArmM {
    pub const fn new(disable_priority: Priority) -> Self {
        Self {
            disable_priority,
            core_id: single_core,
            notify: no_notify,
        }
    }

    /// Configures the board's hooks for identifying the current core and for
    /// interrupting the other one.
    pub const fn with_smp(
        self,
        core_id: fn() -> CoreId,
        notify: fn(CoreId),
    ) -> Self {
        Self {
            core_id,
            notify,
            ..self
        }
    }

    fn vector_address(slot: VectorSlot) -> u32 {
        match slot {
            VectorSlot::System(SystemVector::Stack) => {
                // Safety: we only take the address of the linker symbol.
                unsafe { core::ptr::addr_of!(_stack_start) as u32 }
            }
            VectorSlot::System(SystemVector::Reset) => Reset as usize as u32,
            VectorSlot::NullIsr | VectorSlot::System(_) => {
                hwi_exc_entry as usize as u32
            }
            VectorSlot::Bypass(addr) => addr as u32,
            VectorSlot::Dispatcher => hwi_dispatch as usize as u32,
            // Sparse records begin with a branch to the dispatcher; set the
            // Thumb bit.
            VectorSlot::Sparse { record, .. } => record as u32 | 1,
        }
    }
}

fn scb_ptr(reg: ScbReg) -> *mut u32 {
    let addr: usize = match reg {
        ScbReg::SystCsr => 0xE000_E010,
        ScbReg::Icsr => 0xE000_ED04,
        ScbReg::Vtor => 0xE000_ED08,
        ScbReg::Aircr => 0xE000_ED0C,
        ScbReg::Ccr => 0xE000_ED14,
        ScbReg::Shcsr => 0xE000_ED24,
        ScbReg::Cfsr => 0xE000_ED28,
        ScbReg::Hfsr => 0xE000_ED2C,
        ScbReg::Dfsr => 0xE000_ED30,
        ScbReg::Mmfar => 0xE000_ED34,
        ScbReg::Bfar => 0xE000_ED38,
        ScbReg::Afsr => 0xE000_ED3C,
    };
    addr as *mut u32
}

/// ARMv6-M has no configurable fault status registers; reads of them return
/// zero and writes are dropped.
fn scb_implemented(reg: ScbReg) -> bool {
    if cfg!(armv6m) {
        !matches!(
            reg,
            ScbReg::Cfsr
                | ScbReg::Hfsr
                | ScbReg::Dfsr
                | ScbReg::Mmfar
                | ScbReg::Bfar
                | ScbReg::Afsr
        )
    } else {
        true
    }
}

impl Platform for ArmM {
    fn read_bank(&self, bank: NvicBank, word: usize) -> u32 {
        // Safety: NVIC::PTR is the architecturally fixed NVIC address; we
        // only make a shared reference to its registers.
        let nvic = unsafe { &*cortex_m::peripheral::NVIC::PTR };
        let reg = match bank {
            NvicBank::Iser => nvic.iser.get(word),
            NvicBank::Icer => nvic.icer.get(word),
            NvicBank::Ispr => nvic.ispr.get(word),
            NvicBank::Icpr => nvic.icpr.get(word),
            NvicBank::Iabr => {
                return nvic.iabr.get(word).map_or(0, |r| r.read());
            }
        };
        reg.map_or(0, |r| r.read())
    }

    fn write_bank(&self, bank: NvicBank, word: usize, value: u32) {
        let nvic = unsafe { &*cortex_m::peripheral::NVIC::PTR };
        let reg = match bank {
            NvicBank::Iser => nvic.iser.get(word),
            NvicBank::Icer => nvic.icer.get(word),
            NvicBank::Ispr => nvic.ispr.get(word),
            NvicBank::Icpr => nvic.icpr.get(word),
            NvicBank::Iabr => None,
        };
        if let Some(reg) = reg {
            // Safety: these are write-one-to-act registers; writing zeros
            // has no effect on other lines.
            unsafe { reg.write(value) }
        }
    }

    #[cfg(not(armv6m))]
    fn read_ipr(&self, irq: usize) -> u8 {
        let nvic = unsafe { &*cortex_m::peripheral::NVIC::PTR };
        nvic.ipr.get(irq).map_or(0, |r| r.read())
    }

    #[cfg(not(armv6m))]
    fn write_ipr(&self, irq: usize, value: u8) {
        let nvic = unsafe { &*cortex_m::peripheral::NVIC::PTR };
        if let Some(r) = nvic.ipr.get(irq) {
            // Safety: changing a priority can't violate memory safety.
            unsafe { r.write(value) }
        }
    }

    // ARMv6-M only supports word access to the priority registers.
    #[cfg(armv6m)]
    fn read_ipr(&self, irq: usize) -> u8 {
        let nvic = unsafe { &*cortex_m::peripheral::NVIC::PTR };
        let shift = (irq % 4) * 8;
        nvic.ipr.get(irq / 4).map_or(0, |r| (r.read() >> shift) as u8)
    }

    #[cfg(armv6m)]
    fn write_ipr(&self, irq: usize, value: u8) {
        let nvic = unsafe { &*cortex_m::peripheral::NVIC::PTR };
        let shift = (irq % 4) * 8;
        if let Some(r) = nvic.ipr.get(irq / 4) {
            unsafe {
                r.modify(|w| {
                    (w & !(0xff << shift)) | (u32::from(value) << shift)
                })
            }
        }
    }

    fn read_shpr(&self, num: InterruptNum) -> u8 {
        // SHPR1 at 0xE000ED18 holds exception 4's priority in its low byte.
        let addr = 0xE000_ED18 + (num.index() - 4);
        if cfg!(armv6m) {
            let word = addr & !3;
            let v = unsafe { core::ptr::read_volatile(word as *const u32) };
            (v >> ((addr & 3) * 8)) as u8
        } else {
            unsafe { core::ptr::read_volatile(addr as *const u8) }
        }
    }

    fn write_shpr(&self, num: InterruptNum, value: u8) {
        let addr = 0xE000_ED18 + (num.index() - 4);
        if cfg!(armv6m) {
            let word = (addr & !3) as *mut u32;
            let shift = (addr & 3) * 8;
            // Safety: word-aligned access to a system handler priority
            // register.
            unsafe {
                let v = core::ptr::read_volatile(word);
                core::ptr::write_volatile(
                    word,
                    (v & !(0xff << shift)) | (u32::from(value) << shift),
                );
            }
        } else {
            unsafe { core::ptr::write_volatile(addr as *mut u8, value) }
        }
    }

    fn read_scb(&self, reg: ScbReg) -> u32 {
        if !scb_implemented(reg) {
            return 0;
        }
        // Safety: fixed, aligned system register address.
        unsafe { core::ptr::read_volatile(scb_ptr(reg)) }
    }

    fn write_scb(&self, reg: ScbReg, value: u32) {
        if !scb_implemented(reg) {
            return;
        }
        // Safety: fixed, aligned system register address. The fault status
        // registers are write-one-to-clear.
        unsafe { core::ptr::write_volatile(scb_ptr(reg), value) }
    }

    fn barrier(&self) {
        cortex_m::asm::dsb();
        cortex_m::asm::isb();
    }

    #[cfg(not(armv6m))]
    fn disable_interrupts(&self) -> IrqKey {
        let prev = cortex_m::register::basepri::read();
        // Safety: raising BASEPRI only ever masks more.
        unsafe {
            cortex_m::register::basepri_max::write(self.disable_priority.0)
        };
        IrqKey(u32::from(prev))
    }

    #[cfg(not(armv6m))]
    fn enable_interrupts(&self) {
        unsafe { cortex_m::register::basepri::write(0) }
    }

    #[cfg(not(armv6m))]
    fn restore_interrupts(&self, key: IrqKey) {
        unsafe { cortex_m::register::basepri::write(key.0 as u8) }
    }

    #[cfg(armv6m)]
    fn disable_interrupts(&self) -> IrqKey {
        let was_active = cortex_m::register::primask::read().is_active();
        cortex_m::interrupt::disable();
        IrqKey(u32::from(was_active))
    }

    #[cfg(armv6m)]
    fn enable_interrupts(&self) {
        // Safety: we're not inside a critical section that relies on
        // interrupts staying off; the caller is asking for exactly this.
        unsafe { cortex_m::interrupt::enable() }
    }

    #[cfg(armv6m)]
    fn restore_interrupts(&self, key: IrqKey) {
        if key.0 != 0 {
            unsafe { cortex_m::interrupt::enable() }
        }
    }

    fn active_vector(&self) -> InterruptNum {
        let ipsr: u32;
        // Safety: reading IPSR has no side effects.
        unsafe {
            arch::asm!(
                "mrs {}, IPSR",
                out(reg) ipsr,
                options(pure, nomem, preserves_flags, nostack),
            );
        }
        InterruptNum((ipsr & 0x1FF) as u16)
    }

    fn core_id(&self) -> CoreId {
        (self.core_id)()
    }

    fn notify_core(&self, core: CoreId) {
        (self.notify)(core)
    }

    fn plug_vector(&self, num: InterruptNum, slot: VectorSlot) {
        if let Some(entry) = RAM_VECTORS.0.get(num.index()) {
            entry.store(Self::vector_address(slot), Ordering::Release);
        }
    }

    fn vector_table_base(&self) -> u32 {
        RAM_VECTORS.0.as_ptr() as u32
    }

    fn svc_number(&self, pc: u32) -> u8 {
        // The SVC immediate is the low byte of the instruction preceding the
        // return address.
        //
        let addr = super::svc_immediate_addr(pc);
        // Safety: `pc` came from an exception frame, so the halfword before
        // it is mapped code.
        unsafe { core::ptr::read_volatile(addr as *const u8) }
    }

    fn stack_pointer(&self) -> usize {
        cortex_m::register::msp::read() as usize
    }
}
