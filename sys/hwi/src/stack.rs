// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Interrupt stack watermarking.
//!
//! The interrupt stack is filled with [`STACK_FILL`] at boot, before any
//! interrupt can fire. Stacks grow down, so the deepest point ever reached
//! is the lowest byte that no longer holds the fill pattern, and a base
//! byte that has been overwritten means the stack has overflowed.
//!
//! This only notices an overflow after the fact. It's a diagnostic.

use abi::{CoreId, MAX_CORES};

use crate::arch::Platform;
use crate::err::{ErrorSink, HwiError, KernelError};
use crate::trace::{self, Trace};

pub const STACK_FILL: u8 = 0xBE;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct StackInfo {
    /// Lowest address of the stack region.
    pub base: usize,
    pub size: usize,
    /// Deepest use seen, in bytes. Zero unless asked for.
    pub used: usize,
    pub overflow: bool,
}

/// One core's interrupt stack.
pub struct IsrStack<'a> {
    mem: &'a mut [u8],
}

impl<'a> IsrStack<'a> {
    pub fn new(mem: &'a mut [u8]) -> Self {
        Self { mem }
    }

    pub fn base(&self) -> usize {
        self.mem.as_ptr() as usize
    }

    pub fn size(&self) -> usize {
        self.mem.len()
    }

    /// Fills the region below `live_sp` with the sentinel. Bytes at and
    /// above `live_sp` are in use by the caller and are left alone.
    pub fn init(&mut self, live_sp: usize) {
        let end = live_sp.saturating_sub(self.base()).min(self.mem.len());
        self.mem[..end].fill(STACK_FILL);
    }

    /// Reports on the stack. Finding the high-water mark scans the whole
    /// unused part of the region, so it is only done if `compute_used` is
    /// set.
    pub fn info(&self, compute_used: bool) -> StackInfo {
        let overflow = self.mem.first().is_some_and(|&b| b != STACK_FILL);
        let used = if overflow {
            self.mem.len()
        } else if compute_used {
            let untouched = self
                .mem
                .iter()
                .position(|&b| b != STACK_FILL)
                .unwrap_or(self.mem.len());
            self.mem.len() - untouched
        } else {
            0
        };
        StackInfo {
            base: self.base(),
            size: self.size(),
            used,
            overflow,
        }
    }

    pub fn check(&self) -> Result<(), KernelError> {
        if self.info(false).overflow {
            Err(KernelError::StackOverflow {
                base: self.base(),
                size: self.size(),
            })
        } else {
            Ok(())
        }
    }
}

/// The interrupt stacks of every core.
pub struct StackGuard<'a> {
    stacks: [Option<IsrStack<'a>>; MAX_CORES],
}

impl Default for StackGuard<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> StackGuard<'a> {
    pub const fn new() -> Self {
        Self {
            stacks: [const { None }; MAX_CORES],
        }
    }

    /// Hands `core`'s interrupt stack region to the guard.
    pub fn attach(
        &mut self,
        core: CoreId,
        mem: &'a mut [u8],
    ) -> Result<(), HwiError> {
        let slot = self
            .stacks
            .get_mut(core.index())
            .ok_or(HwiError::BadCore(core))?;
        *slot = Some(IsrStack::new(mem));
        Ok(())
    }

    /// Fills the calling core's stack up to its current stack pointer.
    pub fn init(&mut self, platform: &impl Platform) {
        let sp = platform.stack_pointer();
        let core = platform.core_id().index();
        if let Some(Some(stack)) = self.stacks.get_mut(core) {
            stack.init(sp);
        }
    }

    pub fn core_stack_info(
        &self,
        core: CoreId,
        compute_used: bool,
    ) -> Option<StackInfo> {
        self.stacks
            .get(core.index())?
            .as_ref()
            .map(|s| s.info(compute_used))
    }

    /// Stack info for the calling core.
    pub fn stack_info(
        &self,
        platform: &impl Platform,
        compute_used: bool,
    ) -> Option<StackInfo> {
        self.core_stack_info(platform.core_id(), compute_used)
    }

    /// Checks the calling core's stack. An overflow is raised through
    /// `errors` and then panics; there is no recovering from it.
    pub fn check_stack(
        &self,
        platform: &impl Platform,
        errors: &dyn ErrorSink,
    ) {
        let core = platform.core_id().index();
        let Some(Some(stack)) = self.stacks.get(core) else {
            return;
        };
        if let Err(e) = stack.check() {
            trace::record(Trace::StackOverflow { base: stack.base() });
            errors.raise(e);
            panic!("{e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::fake::FakePlatform;

    #[test]
    fn init_stops_at_live_sp() {
        let mut buf = [0u8; 64];
        let base = buf.as_ptr() as usize;
        let mut s = IsrStack::new(&mut buf);
        s.init(base + 48);
        drop(s);
        assert!(buf[..48].iter().all(|&b| b == STACK_FILL));
        assert!(buf[48..].iter().all(|&b| b == 0));
    }

    #[test]
    fn peak_and_overflow() {
        let mut buf = [0u8; 128];
        let base = buf.as_ptr() as usize;
        IsrStack::new(&mut buf).init(base + 128);
        buf[100..].fill(0x11);

        let info = IsrStack::new(&mut buf).info(true);
        assert_eq!(info.size, 128);
        assert_eq!(info.used, 28);
        assert!(!info.overflow);
        assert_eq!(IsrStack::new(&mut buf).info(false).used, 0);
        assert!(IsrStack::new(&mut buf).check().is_ok());

        buf[0] = 0;
        let s = IsrStack::new(&mut buf);
        assert!(s.info(false).overflow);
        assert_eq!(
            s.check(),
            Err(KernelError::StackOverflow { base, size: 128 })
        );
    }

    #[test]
    fn guard_uses_current_core() {
        let p = FakePlatform::new();
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        let mut extra = [0u8; 4];
        let top_b = b.as_ptr() as usize + 32;
        let mut g = StackGuard::new();
        g.attach(CoreId(0), &mut a).unwrap();
        g.attach(CoreId(1), &mut b).unwrap();
        assert_eq!(
            g.attach(CoreId(MAX_CORES as u8), &mut extra),
            Err(HwiError::BadCore(CoreId(MAX_CORES as u8)))
        );

        p.switch_core(CoreId(1));
        p.set_stack_pointer(top_b);
        g.init(&p);

        assert_eq!(g.stack_info(&p, true).map(|i| i.used), Some(0));
        assert_eq!(
            g.core_stack_info(CoreId(0), false).map(|i| i.overflow),
            Some(true)
        );
        g.check_stack(&p, &crate::err::IgnoreErrors);
    }

    #[test]
    #[should_panic(expected = "interrupt stack overflow")]
    fn overflow_is_fatal() {
        let p = FakePlatform::new();
        let mut a = [0u8; 16];
        let mut g = StackGuard::new();
        g.attach(CoreId(0), &mut a).unwrap();
        g.check_stack(&p, &crate::err::IgnoreErrors);
    }
}
