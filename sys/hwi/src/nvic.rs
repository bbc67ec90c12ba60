// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Interrupt controller operations.
//!
//! [`NvicOps`] is what the rest of the kernel uses to enable, disable,
//! prioritize and pend interrupt lines. [`Nvic`] implements it by writing
//! the hardware directly, which is right for single-core parts. The
//! dual-core variant is in [`crate::vnvic`].
//!
//! Vector numbers are used throughout: device interrupts start at 16, and
//! map to NVIC word `(num - 16) / 32`, bit `(num - 16) % 32`. The system
//! exceptions below 16 are handled case by case:
//!
//! - SysTick (15) is enabled through the TICKINT bit of the SysTick control
//!   register, and pended through ICSR.
//! - PendSV (14) and NMI (2) can be pended through ICSR.
//! - Mem, bus and usage faults (4-6) are enabled through SHCSR.
//! - Exceptions 4-15 have priorities in the system handler priority
//!   registers; the rest have fixed priorities.
//!
//! Anything else is silently ignored, as the hardware would.

use abi::{InterruptNum, IrqStatus, Priority};

use crate::arch::{
    self, icsr, shcsr, NvicBank, Platform, ScbReg, SYST_TICKINT,
};

pub trait NvicOps {
    type Platform: Platform;

    fn platform(&self) -> &Self::Platform;

    /// Enables `num`, returning whether it was enabled before.
    fn enable(&self, num: InterruptNum) -> bool;

    /// Disables `num`, returning whether it was enabled before.
    fn disable(&self, num: InterruptNum) -> bool;

    /// Puts `num` back in the state `enable` or `disable` reported.
    fn restore(&self, num: InterruptNum, was_enabled: bool) {
        if was_enabled {
            self.enable(num);
        } else {
            self.disable(num);
        }
    }

    fn clear_pending(&self, num: InterruptNum);

    fn set_priority(&self, num: InterruptNum, priority: Priority);

    /// Triggers `num` from software.
    fn post(&self, num: InterruptNum);

    fn status(&self, num: InterruptNum) -> IrqStatus;

    /// Commits any staged changes this core is responsible for, returning
    /// whether there were any. Controllers that write through have nothing
    /// to do.
    fn flush(&self) -> bool {
        false
    }
}

impl<T: NvicOps + ?Sized> NvicOps for &T {
    type Platform = T::Platform;

    fn platform(&self) -> &Self::Platform {
        (**self).platform()
    }
    fn enable(&self, num: InterruptNum) -> bool {
        (**self).enable(num)
    }
    fn disable(&self, num: InterruptNum) -> bool {
        (**self).disable(num)
    }
    fn restore(&self, num: InterruptNum, was_enabled: bool) {
        (**self).restore(num, was_enabled)
    }
    fn clear_pending(&self, num: InterruptNum) {
        (**self).clear_pending(num)
    }
    fn set_priority(&self, num: InterruptNum, priority: Priority) {
        (**self).set_priority(num, priority)
    }
    fn post(&self, num: InterruptNum) {
        (**self).post(num)
    }
    fn status(&self, num: InterruptNum) -> IrqStatus {
        (**self).status(num)
    }
    fn flush(&self) -> bool {
        (**self).flush()
    }
}

fn fault_enable_bit(num: InterruptNum) -> Option<u32> {
    match num {
        InterruptNum::MEM_FAULT => Some(shcsr::MEMFAULTENA),
        InterruptNum::BUS_FAULT => Some(shcsr::BUSFAULTENA),
        InterruptNum::USAGE_FAULT => Some(shcsr::USGFAULTENA),
        _ => None,
    }
}

/// Sets or clears enable bits in a read-modify-write register, returning
/// the previous state.
fn modify_enable(p: &impl Platform, reg: ScbReg, bit: u32, on: bool) -> bool {
    let v = p.read_scb(reg);
    let new = if on { v | bit } else { v & !bit };
    p.write_scb(reg, new);
    v & bit != 0
}

/// Enables `num` in hardware. Also used by the virtual NVIC for system
/// exceptions, which are private to each core.
pub(crate) fn hw_enable(p: &impl Platform, num: InterruptNum) -> bool {
    let was = if let Some((word, mask)) = num.bank_position() {
        let was = p.read_bank(NvicBank::Iser, word) & mask != 0;
        p.write_bank(NvicBank::Iser, word, mask);
        was
    } else if num == InterruptNum::SYSTICK {
        modify_enable(p, ScbReg::SystCsr, SYST_TICKINT, true)
    } else if let Some(bit) = fault_enable_bit(num) {
        modify_enable(p, ScbReg::Shcsr, bit, true)
    } else {
        return false;
    };
    p.barrier();
    was
}

pub(crate) fn hw_disable(p: &impl Platform, num: InterruptNum) -> bool {
    let was = if let Some((word, mask)) = num.bank_position() {
        let was = p.read_bank(NvicBank::Icer, word) & mask != 0;
        p.write_bank(NvicBank::Icer, word, mask);
        was
    } else if num == InterruptNum::SYSTICK {
        modify_enable(p, ScbReg::SystCsr, SYST_TICKINT, false)
    } else if let Some(bit) = fault_enable_bit(num) {
        modify_enable(p, ScbReg::Shcsr, bit, false)
    } else {
        return false;
    };
    p.barrier();
    was
}

pub(crate) fn hw_clear_pending(p: &impl Platform, num: InterruptNum) {
    if let Some((word, mask)) = num.bank_position() {
        p.write_bank(NvicBank::Icpr, word, mask);
    } else if num == InterruptNum::SYSTICK {
        p.write_scb(ScbReg::Icsr, icsr::PENDSTCLR);
    } else if num == InterruptNum::PENDSV {
        p.write_scb(ScbReg::Icsr, icsr::PENDSVCLR);
    } else {
        return;
    }
    p.barrier();
}

pub(crate) fn hw_set_priority(
    p: &impl Platform,
    num: InterruptNum,
    priority: Priority,
) {
    if let Some(irq) = num.device_irq() {
        p.write_ipr(usize::from(irq), priority.0);
    } else if num.0 >= 4 {
        p.write_shpr(num, priority.0);
    } else {
        return;
    }
    p.barrier();
}

pub(crate) fn hw_post(p: &impl Platform, num: InterruptNum) {
    if let Some((word, mask)) = num.bank_position() {
        p.write_bank(NvicBank::Ispr, word, mask);
    } else {
        let bit = match num {
            InterruptNum::NMI => icsr::NMIPENDSET,
            InterruptNum::PENDSV => icsr::PENDSVSET,
            InterruptNum::SYSTICK => icsr::PENDSTSET,
            _ => return,
        };
        p.write_scb(ScbReg::Icsr, bit);
    }
    p.barrier();
}

/// Looks up an interrupt and returns a cross-platform summary of its state.
pub(crate) fn hw_status(p: &impl Platform, num: InterruptNum) -> IrqStatus {
    let mut status = IrqStatus::empty();
    if let Some((word, mask)) = num.bank_position() {
        status.set(
            IrqStatus::ENABLED,
            p.read_bank(NvicBank::Iser, word) & mask != 0,
        );
        status.set(
            IrqStatus::PENDING,
            p.read_bank(NvicBank::Ispr, word) & mask != 0,
        );
        return status;
    }
    let icsr_now = p.read_scb(ScbReg::Icsr);
    match num {
        InterruptNum::SYSTICK => {
            status.set(
                IrqStatus::ENABLED,
                p.read_scb(ScbReg::SystCsr) & SYST_TICKINT != 0,
            );
            status.set(IrqStatus::PENDING, icsr_now & icsr::PENDSTSET != 0);
        }
        InterruptNum::PENDSV => {
            status.insert(IrqStatus::ENABLED);
            status.set(IrqStatus::PENDING, icsr_now & icsr::PENDSVSET != 0);
        }
        InterruptNum::NMI => {
            status.insert(IrqStatus::ENABLED);
            status.set(IrqStatus::PENDING, icsr_now & icsr::NMIPENDSET != 0);
        }
        _ => {
            if let Some(bit) = fault_enable_bit(num) {
                status.set(
                    IrqStatus::ENABLED,
                    p.read_scb(ScbReg::Shcsr) & bit != 0,
                );
            } else if num.0 != 0 {
                // Everything else is always on.
                status.insert(IrqStatus::ENABLED);
            }
        }
    }
    status
}

/// Write-through interrupt controller for single-core parts.
///
/// Each operation runs with interrupts masked, so a handler can't observe a
/// read-modify-write half done.
pub struct Nvic<P> {
    platform: P,
}

impl<P: Platform> Nvic<P> {
    pub const fn new(platform: P) -> Self {
        Self { platform }
    }
}

impl<P: Platform> NvicOps for Nvic<P> {
    type Platform = P;

    fn platform(&self) -> &P {
        &self.platform
    }

    fn enable(&self, num: InterruptNum) -> bool {
        arch::with_interrupts_masked(&self.platform, || {
            hw_enable(&self.platform, num)
        })
    }

    fn disable(&self, num: InterruptNum) -> bool {
        arch::with_interrupts_masked(&self.platform, || {
            hw_disable(&self.platform, num)
        })
    }

    fn clear_pending(&self, num: InterruptNum) {
        hw_clear_pending(&self.platform, num)
    }

    fn set_priority(&self, num: InterruptNum, priority: Priority) {
        hw_set_priority(&self.platform, num, priority)
    }

    fn post(&self, num: InterruptNum) {
        hw_post(&self.platform, num)
    }

    fn status(&self, num: InterruptNum) -> IrqStatus {
        hw_status(&self.platform, num)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::fake::FakePlatform;
    use abi::CoreId;

    #[test]
    fn enable_returns_previous_state() {
        let p = FakePlatform::new();
        let nvic = Nvic::new(&p);
        assert!(!nvic.enable(InterruptNum(20)));
        assert!(nvic.enable(InterruptNum(20)));
        assert_eq!(p.enabled_word(CoreId(0), 0), 1 << 4);
        assert!(nvic.disable(InterruptNum(20)));
        assert!(!nvic.disable(InterruptNum(20)));
        assert_eq!(p.enabled_word(CoreId(0), 0), 0);
    }

    #[test]
    fn bank_indexing() {
        let p = FakePlatform::new();
        let nvic = Nvic::new(&p);
        // Device IRQ 33 is word 1, bit 1.
        nvic.enable(InterruptNum(16 + 33));
        assert_eq!(p.enabled_word(CoreId(0), 0), 0);
        assert_eq!(p.enabled_word(CoreId(0), 1), 1 << 1);
        nvic.post(InterruptNum(16 + 33));
        assert_eq!(p.pending_word(CoreId(0), 1), 1 << 1);
        nvic.clear_pending(InterruptNum(16 + 33));
        assert_eq!(p.pending_word(CoreId(0), 1), 0);
    }

    #[test]
    fn restore_round_trips() {
        let p = FakePlatform::new();
        let nvic = Nvic::new(&p);
        let key = nvic.disable(InterruptNum(40));
        nvic.enable(InterruptNum(40));
        nvic.restore(InterruptNum(40), key);
        assert!(!nvic.status(InterruptNum(40)).contains(IrqStatus::ENABLED));

        nvic.enable(InterruptNum(41));
        let key = nvic.disable(InterruptNum(41));
        nvic.restore(InterruptNum(41), key);
        assert!(nvic.status(InterruptNum(41)).contains(IrqStatus::ENABLED));
    }

    #[test]
    fn systick_uses_tickint() {
        let p = FakePlatform::new();
        let nvic = Nvic::new(&p);
        assert!(!nvic.enable(InterruptNum::SYSTICK));
        assert_eq!(p.read_scb(ScbReg::SystCsr), SYST_TICKINT);
        assert!(nvic.disable(InterruptNum::SYSTICK));
        assert_eq!(p.read_scb(ScbReg::SystCsr), 0);

        nvic.post(InterruptNum::SYSTICK);
        assert!(nvic
            .status(InterruptNum::SYSTICK)
            .contains(IrqStatus::PENDING));
        nvic.clear_pending(InterruptNum::SYSTICK);
        assert!(!nvic
            .status(InterruptNum::SYSTICK)
            .contains(IrqStatus::PENDING));
    }

    #[test]
    fn pendsv_and_nmi_post_through_icsr() {
        let p = FakePlatform::new();
        let nvic = Nvic::new(&p);
        nvic.post(InterruptNum::PENDSV);
        nvic.post(InterruptNum::NMI);
        let icsr_now = p.read_scb(ScbReg::Icsr);
        assert_ne!(icsr_now & icsr::PENDSVSET, 0);
        assert_ne!(icsr_now & icsr::NMIPENDSET, 0);
        nvic.clear_pending(InterruptNum::PENDSV);
        assert_eq!(p.read_scb(ScbReg::Icsr) & icsr::PENDSVSET, 0);
    }

    #[test]
    fn fault_handlers_enable_through_shcsr() {
        let p = FakePlatform::new();
        let nvic = Nvic::new(&p);
        nvic.enable(InterruptNum::BUS_FAULT);
        assert_eq!(p.read_scb(ScbReg::Shcsr), shcsr::BUSFAULTENA);
        assert!(nvic
            .status(InterruptNum::BUS_FAULT)
            .contains(IrqStatus::ENABLED));
    }

    #[test]
    fn fixed_exceptions_are_untouched() {
        let p = FakePlatform::new();
        let nvic = Nvic::new(&p);
        assert!(!nvic.enable(InterruptNum::HARD_FAULT));
        nvic.set_priority(InterruptNum::HARD_FAULT, Priority(3));
        nvic.set_priority(InterruptNum::NMI, Priority(3));
        assert!(p.accesses().is_empty());
        assert_eq!(p.read_scb(ScbReg::Shcsr), 0);
    }

    #[test]
    fn priorities_go_to_the_right_register() {
        let p = FakePlatform::new();
        let nvic = Nvic::new(&p);
        nvic.set_priority(InterruptNum(20), Priority(0x80));
        assert_eq!(p.ipr(CoreId(0), 4), 0x80);
        nvic.set_priority(InterruptNum::SVCALL, Priority(0x20));
        assert_eq!(p.read_shpr(InterruptNum::SVCALL), 0x20);
        nvic.set_priority(InterruptNum::MEM_FAULT, Priority(0x10));
        assert_eq!(p.read_shpr(InterruptNum::MEM_FAULT), 0x10);
    }

    #[test]
    fn operations_leave_mask_as_found() {
        let p = FakePlatform::new();
        let nvic = Nvic::new(&p);
        nvic.enable(InterruptNum(20));
        assert!(!p.is_masked());
        let key = p.disable_interrupts();
        nvic.enable(InterruptNum(21));
        assert!(p.is_masked());
        p.restore_interrupts(key);
    }
}
