// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Architecture-specific support.
//!
//! The rest of the crate touches the interrupt controller and system control
//! block only through the [`Platform`] trait. Exactly one implementation is
//! compiled in:
//!
//! - `arm_m`, on bare-metal Arm targets, drives the real registers.
//! - `fake`, everywhere else, models the register file in memory so the
//!   kernel logic can be tested on the host.

use abi::{CoreId, InterruptNum};

use crate::vector::VectorSlot;

cfg_if::cfg_if! {
    if #[cfg(all(target_arch = "arm", target_os = "none"))] {
        pub mod arm_m;
        pub use arm_m::ArmM;
    } else {
        pub mod fake;
        pub use fake::FakePlatform;
    }
}

/// One of the NVIC's per-line bit banks. Each bank is an array of 32-bit
/// words covering device interrupts 32 at a time.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum NvicBank {
    /// Set-enable. Writing 1 enables; reads return the enable state.
    Iser,
    /// Clear-enable. Writing 1 disables; reads return the enable state.
    Icer,
    /// Set-pending. Writing 1 pends; reads return the pending state.
    Ispr,
    /// Clear-pending. Writing 1 unpends; reads return the pending state.
    Icpr,
    /// Active bits. Read-only.
    Iabr,
}

/// System control registers the interrupt subsystem uses.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ScbReg {
    Icsr,
    Vtor,
    Aircr,
    Ccr,
    Shcsr,
    Cfsr,
    Hfsr,
    Dfsr,
    Mmfar,
    Bfar,
    Afsr,
    /// SysTick control and status.
    SystCsr,
}

/// Bits in ICSR.
pub mod icsr {
    pub const NMIPENDSET: u32 = 1 << 31;
    pub const PENDSVSET: u32 = 1 << 28;
    pub const PENDSVCLR: u32 = 1 << 27;
    pub const PENDSTSET: u32 = 1 << 26;
    pub const PENDSTCLR: u32 = 1 << 25;
    pub const VECTACTIVE: u32 = 0x1ff;
}

/// Bits in SHCSR.
pub mod shcsr {
    pub const MEMFAULTENA: u32 = 1 << 16;
    pub const BUSFAULTENA: u32 = 1 << 17;
    pub const USGFAULTENA: u32 = 1 << 18;
}

/// SysTick CSR bit that routes the timer to its exception.
pub const SYST_TICKINT: u32 = 1 << 1;

/// AIRCR only accepts writes carrying this key in its upper half.
pub const AIRCR_VECTKEY: u32 = 0x05FA << 16;

/// Saved interrupt mask state, returned when masking and consumed when
/// restoring.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct IrqKey(pub u32);

/// Access to the interrupt-related hardware of the core we're running on.
pub trait Platform {
    /// Reads `word` of `bank`. Words past the end of the bank read as zero.
    fn read_bank(&self, bank: NvicBank, word: usize) -> u32;
    /// Writes `value` to `word` of `bank`. Writes past the end are ignored.
    fn write_bank(&self, bank: NvicBank, word: usize, value: u32);

    /// Reads the priority byte of device interrupt `irq` (zero-based).
    fn read_ipr(&self, irq: usize) -> u8;
    fn write_ipr(&self, irq: usize, value: u8);

    /// Reads the priority byte of system exception `num`, which must be in
    /// 4..=15.
    fn read_shpr(&self, num: InterruptNum) -> u8;
    fn write_shpr(&self, num: InterruptNum, value: u8);

    fn read_scb(&self, reg: ScbReg) -> u32;
    fn write_scb(&self, reg: ScbReg, value: u32);

    /// Makes preceding register writes take effect before continuing.
    fn barrier(&self);

    /// Masks every interrupt the kernel is allowed to mask, returning the
    /// previous state.
    fn disable_interrupts(&self) -> IrqKey;
    fn enable_interrupts(&self);
    fn restore_interrupts(&self, key: IrqKey);

    /// Vector number of the exception or interrupt being handled, or 0 in
    /// thread mode.
    fn active_vector(&self) -> InterruptNum;

    fn core_id(&self) -> CoreId;
    /// Interrupts `core` so that it will look at its pending NVIC work.
    fn notify_core(&self, core: CoreId);

    /// Points the live vector table entry for `num` at whatever `slot`
    /// stands for.
    fn plug_vector(&self, num: InterruptNum, slot: VectorSlot);
    /// Address to program into VTOR.
    fn vector_table_base(&self) -> u32;

    /// Decodes the immediate of the SVC instruction that returned to `pc`.
    fn svc_number(&self, pc: u32) -> u8;
    fn stack_pointer(&self) -> usize;
}

impl<T: Platform + ?Sized> Platform for &T {
    fn read_bank(&self, bank: NvicBank, word: usize) -> u32 {
        (**self).read_bank(bank, word)
    }
    fn write_bank(&self, bank: NvicBank, word: usize, value: u32) {
        (**self).write_bank(bank, word, value)
    }
    fn read_ipr(&self, irq: usize) -> u8 {
        (**self).read_ipr(irq)
    }
    fn write_ipr(&self, irq: usize, value: u8) {
        (**self).write_ipr(irq, value)
    }
    fn read_shpr(&self, num: InterruptNum) -> u8 {
        (**self).read_shpr(num)
    }
    fn write_shpr(&self, num: InterruptNum, value: u8) {
        (**self).write_shpr(num, value)
    }
    fn read_scb(&self, reg: ScbReg) -> u32 {
        (**self).read_scb(reg)
    }
    fn write_scb(&self, reg: ScbReg, value: u32) {
        (**self).write_scb(reg, value)
    }
    fn barrier(&self) {
        (**self).barrier()
    }
    fn disable_interrupts(&self) -> IrqKey {
        (**self).disable_interrupts()
    }
    fn enable_interrupts(&self) {
        (**self).enable_interrupts()
    }
    fn restore_interrupts(&self, key: IrqKey) {
        (**self).restore_interrupts(key)
    }
    fn active_vector(&self) -> InterruptNum {
        (**self).active_vector()
    }
    fn core_id(&self) -> CoreId {
        (**self).core_id()
    }
    fn notify_core(&self, core: CoreId) {
        (**self).notify_core(core)
    }
    fn plug_vector(&self, num: InterruptNum, slot: VectorSlot) {
        (**self).plug_vector(num, slot)
    }
    fn vector_table_base(&self) -> u32 {
        (**self).vector_table_base()
    }
    fn svc_number(&self, pc: u32) -> u8 {
        (**self).svc_number(pc)
    }
    fn stack_pointer(&self) -> usize {
        (**self).stack_pointer()
    }
}

/// Address of the SVC immediate for an exception that returned to `pc`: the
/// low byte of the halfword instruction before it.
pub fn svc_immediate_addr(pc: u32) -> u32 {
    pc.wrapping_sub(2)
}

/// Runs `body` with interrupts masked.
pub fn with_interrupts_masked<P: Platform + ?Sized, R>(
    platform: &P,
    body: impl FnOnce() -> R,
) -> R {
    let key = platform.disable_interrupts();
    let r = body();
    platform.restore_interrupts(key);
    r
}
