// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Virtual NVIC for dual-core parts.
//!
//! Each core has its own NVIC, and each device interrupt is owned by one
//! core (its "affinity"). Either core may ask for any line to be enabled,
//! disabled, cleared, pended or reprioritized, but only the owner ever
//! touches the hardware for it.
//!
//! Requests are staged in a shared shadow copy of the enable, pending and
//! priority banks, which is the authoritative state. Staging a change marks
//! the owning core as having work; if that's another core, it is also sent
//! a notification. Each core then calls [`VirtualNvic::flush`] (the
//! interrupt controller does so after every local request, and the
//! notification handler does so for remote ones) to copy its share of the
//! shadow state into its own NVIC.
//!
//! A flush always applies disables, then pending-clears, then enables, then
//! software pends, so a line that has just been enabled never keeps a stale
//! pending bit.
//!
//! Pending state is readable from any core. The owner reads its hardware,
//! adjusted by requests it hasn't flushed yet. Other cores read a shared
//! copy that requests update and that the owner refreshes from hardware at
//! each flush, so it can lag behind lines the owner has since serviced.
//!
//! System exceptions (vectors below 16) are private to each core and are
//! written straight through.

use abi::{
    CoreId, InterruptNum, IrqStatus, Priority, AFFINITY_WORDS, MAX_CORES,
};

use crate::arch::{self, NvicBank, Platform};
use crate::config::{HwiConfig, NUM_DEVICE_IRQS, NUM_INTERRUPTS};
use crate::err::HwiError;
use crate::nvic::{self, NvicOps};
use crate::trace::{self, Trace};

/// Where staged changes need to be flushed.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FlushTarget {
    /// The calling core owns the line and should flush itself.
    Local,
    /// Another core owns the line and has been notified.
    Remote(CoreId),
}

#[derive(Copy, Clone, Debug, Default)]
struct CoreFlushState {
    flush_pending: bool,
    /// Device interrupts this core owns, one bit per line.
    affinity: [u32; AFFINITY_WORDS],
}

struct VnvicState {
    /// Lines requested enabled. Mutually exclusive with `icer`.
    iser: [u32; AFFINITY_WORDS],
    /// Lines requested disabled.
    icer: [u32; AFFINITY_WORDS],
    /// Pending bits to clear at the next flush. Mutually exclusive with
    /// `ispr`.
    icpr: [u32; AFFINITY_WORDS],
    /// Pending bits to set at the next flush.
    ispr: [u32; AFFINITY_WORDS],
    /// Pending state as other cores see it: the owner's hardware as of its
    /// last flush, with later requests applied.
    pending: [u32; AFFINITY_WORDS],
    ipr: [u8; NUM_DEVICE_IRQS],
    cores: [CoreFlushState; MAX_CORES],
}

pub struct VirtualNvic<P> {
    platform: P,
    state: spin::Mutex<VnvicState>,
}

impl<P: Platform> VirtualNvic<P> {
    /// Builds the shadow state and per-core ownership masks from `config`.
    ///
    /// Fails if an interrupt is assigned to a core past `num_cores`, since
    /// nothing would ever flush it, or if the vector table has more device
    /// lines than the shadow banks cover.
    pub fn new(platform: P, config: &HwiConfig) -> Result<Self, HwiError> {
        if NUM_DEVICE_IRQS > AFFINITY_WORDS * 32 {
            return Err(HwiError::BadIntNum(InterruptNum(
                NUM_INTERRUPTS as u16 - 1,
            )));
        }
        if config.num_cores == 0 || config.num_cores > MAX_CORES {
            return Err(HwiError::BadCore(CoreId(config.num_cores as u8)));
        }
        if let Some(a) = config.affinity.iter().find(|a| {
            a.irq < abi::NUM_SYSTEM_VECTORS
                || usize::from(a.irq) >= NUM_INTERRUPTS
        }) {
            return Err(HwiError::BadIntNum(InterruptNum(a.irq)));
        }

        let mut cores = [CoreFlushState::default(); MAX_CORES];
        for irq in 0..NUM_DEVICE_IRQS {
            let num = InterruptNum(irq as u16 + abi::NUM_SYSTEM_VECTORS);
            let owner = config.affinity_of(num);
            if owner.index() >= config.num_cores {
                return Err(HwiError::InvalidAffinity { irq: num, core: owner });
            }
            cores[owner.index()].affinity[irq / 32] |= 1 << (irq % 32);
        }

        Ok(Self {
            platform,
            state: spin::Mutex::new(VnvicState {
                iser: [0; AFFINITY_WORDS],
                icer: [0; AFFINITY_WORDS],
                icpr: [0; AFFINITY_WORDS],
                ispr: [0; AFFINITY_WORDS],
                pending: [0; AFFINITY_WORDS],
                ipr: [0; NUM_DEVICE_IRQS],
                cores,
            }),
        })
    }

    /// Core that owns device interrupt `num`.
    pub fn owner(&self, num: InterruptNum) -> Option<CoreId> {
        let (word, mask) = num.bank_position()?;
        let state = self.state.lock();
        state
            .cores
            .iter()
            .position(|c| c.affinity[word] & mask != 0)
            .map(|i| CoreId(i as u8))
    }

    /// Whether `core` has staged work it hasn't flushed.
    pub fn flush_pending(&self, core: CoreId) -> bool {
        self.state
            .lock()
            .cores
            .get(core.index())
            .is_some_and(|c| c.flush_pending)
    }

    /// Runs `body` on the shadow bank word and mask for `num`, then marks
    /// the owner as needing a flush.
    fn stage<R>(
        &self,
        num: InterruptNum,
        body: impl FnOnce(&mut VnvicState, usize, u32) -> R,
    ) -> (R, FlushTarget) {
        arch::with_interrupts_masked(&self.platform, || {
            let mut state = self.state.lock();
            let (word, mask) = num.bank_position().unwrap_or((0, 0));
            let r = body(&mut state, word, mask);
            (r, self.update_nvic(&mut state, word, mask))
        })
    }

    /// Marks the owner of the line at `word`/`mask` as having work and, if
    /// that isn't us, tells it so.
    fn update_nvic(
        &self,
        state: &mut VnvicState,
        word: usize,
        mask: u32,
    ) -> FlushTarget {
        let me = self.platform.core_id();
        let owner = state
            .cores
            .iter()
            .position(|c| c.affinity[word] & mask != 0)
            .map_or(me, |i| CoreId(i as u8));
        if let Some(c) = state.cores.get_mut(owner.index()) {
            c.flush_pending = true;
        }
        if owner == me {
            FlushTarget::Local
        } else {
            trace::record(Trace::FlushRequested(owner));
            self.platform.notify_core(owner);
            FlushTarget::Remote(owner)
        }
    }

    /// Stages an enable of `num`, returning the previous requested state and
    /// where it must be flushed.
    pub fn stage_enable(&self, num: InterruptNum) -> (bool, FlushTarget) {
        self.stage(num, |s, w, m| {
            let was = s.iser[w] & m != 0;
            s.iser[w] |= m;
            s.icer[w] &= !m;
            was
        })
    }

    pub fn stage_disable(&self, num: InterruptNum) -> (bool, FlushTarget) {
        self.stage(num, |s, w, m| {
            let was = s.iser[w] & m != 0;
            s.icer[w] |= m;
            s.iser[w] &= !m;
            was
        })
    }

    pub fn stage_clear_pending(&self, num: InterruptNum) -> FlushTarget {
        self.stage(num, |s, w, m| {
            s.icpr[w] |= m;
            s.ispr[w] &= !m;
            s.pending[w] &= !m;
        })
        .1
    }

    pub fn stage_post(&self, num: InterruptNum) -> FlushTarget {
        self.stage(num, |s, w, m| {
            s.ispr[w] |= m;
            s.icpr[w] &= !m;
            s.pending[w] |= m;
        })
        .1
    }

    pub fn stage_priority(
        &self,
        num: InterruptNum,
        priority: Priority,
    ) -> FlushTarget {
        self.stage(num, |s, _, _| {
            if let Some(p) = num
                .device_irq()
                .and_then(|irq| s.ipr.get_mut(usize::from(irq)))
            {
                *p = priority.0;
            }
        })
        .1
    }

    /// Commits this core's share of the shadow state to its NVIC.
    ///
    /// Does nothing, and returns `false`, unless this core has been marked
    /// as having work. Calling it again right away is harmless.
    pub fn flush(&self) -> bool {
        let p = &self.platform;
        arch::with_interrupts_masked(p, || {
            let mut state = self.state.lock();
            let me = p.core_id();
            let Some(core) = state.cores.get_mut(me.index()) else {
                return false;
            };
            if !core.flush_pending {
                return false;
            }
            core.flush_pending = false;
            let owned = core.affinity;

            for (irq, &want) in state.ipr.iter().enumerate() {
                if owned[irq / 32] & (1 << (irq % 32)) != 0
                    && p.read_ipr(irq) != want
                {
                    p.write_ipr(irq, want);
                }
            }

            for (w, &mask) in owned.iter().enumerate() {
                let off = state.icer[w] & mask;
                if off != 0 {
                    p.write_bank(NvicBank::Icer, w, off);
                }
                let clear = state.icpr[w] & mask;
                if clear != 0 {
                    p.write_bank(NvicBank::Icpr, w, clear);
                }
                let on = state.iser[w] & mask;
                if on != 0 {
                    p.write_bank(NvicBank::Iser, w, on);
                }
                let set = state.ispr[w] & mask;
                if set != 0 {
                    p.write_bank(NvicBank::Ispr, w, set);
                }
                // Pending requests are one-shot; enable state persists.
                state.icpr[w] &= !mask;
                state.ispr[w] &= !mask;
                let hw = p.read_bank(NvicBank::Ispr, w);
                state.pending[w] = (state.pending[w] & !mask) | (hw & mask);
            }
            p.barrier();
            trace::record(Trace::Flushed(me));
            true
        })
    }
}

impl<P: Platform> NvicOps for VirtualNvic<P> {
    type Platform = P;

    fn platform(&self) -> &P {
        &self.platform
    }

    fn enable(&self, num: InterruptNum) -> bool {
        if num.device_irq().is_none() {
            return arch::with_interrupts_masked(&self.platform, || {
                nvic::hw_enable(&self.platform, num)
            });
        }
        self.stage_enable(num).0
    }

    fn disable(&self, num: InterruptNum) -> bool {
        if num.device_irq().is_none() {
            return arch::with_interrupts_masked(&self.platform, || {
                nvic::hw_disable(&self.platform, num)
            });
        }
        self.stage_disable(num).0
    }

    fn clear_pending(&self, num: InterruptNum) {
        if num.device_irq().is_none() {
            nvic::hw_clear_pending(&self.platform, num);
        } else {
            self.stage_clear_pending(num);
        }
    }

    fn set_priority(&self, num: InterruptNum, priority: Priority) {
        if num.device_irq().is_none() {
            nvic::hw_set_priority(&self.platform, num, priority);
        } else {
            self.stage_priority(num, priority);
        }
    }

    fn post(&self, num: InterruptNum) {
        if num.device_irq().is_none() {
            nvic::hw_post(&self.platform, num);
        } else {
            self.stage_post(num);
        }
    }

    /// Reports the requested enable state and the pending state: from
    /// hardware plus unflushed requests for lines this core owns, and from
    /// the shared copy for the rest.
    fn status(&self, num: InterruptNum) -> IrqStatus {
        let Some((word, mask)) = num.bank_position() else {
            return nvic::hw_status(&self.platform, num);
        };
        let mut status = IrqStatus::empty();
        let state = self.state.lock();
        status.set(IrqStatus::ENABLED, state.iser[word] & mask != 0);
        let owned = state
            .cores
            .get(self.platform.core_id().index())
            .is_some_and(|c| c.affinity[word] & mask != 0);
        let pending = if owned {
            let hw = self.platform.read_bank(NvicBank::Ispr, word);
            (hw & !state.icpr[word]) | state.ispr[word]
        } else {
            state.pending[word]
        };
        let pending = pending & mask != 0;
        status.set(IrqStatus::PENDING, pending);
        status
    }

    fn flush(&self) -> bool {
        VirtualNvic::flush(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::fake::{Access, FakePlatform};
    use abi::IrqAffinity;
    use proptest::prelude::*;

    const C0: CoreId = CoreId(0);
    const C1: CoreId = CoreId(1);

    // Device IRQs 4 and 36 (vectors 20 and 52) belong to core 1.
    const AFFINITY: &[IrqAffinity] = &[
        IrqAffinity { irq: 20, core: C1 },
        IrqAffinity { irq: 52, core: C1 },
    ];

    fn dual() -> HwiConfig {
        HwiConfig {
            num_cores: 2,
            affinity: AFFINITY,
            ..HwiConfig::DEFAULT
        }
    }

    #[test]
    fn rejects_affinity_to_missing_core() {
        let p = FakePlatform::new();
        let cfg = HwiConfig {
            affinity: AFFINITY,
            ..HwiConfig::DEFAULT
        };
        assert_eq!(
            VirtualNvic::new(&p, &cfg).err(),
            Some(HwiError::InvalidAffinity {
                irq: InterruptNum(20),
                core: C1,
            })
        );
    }

    #[test]
    fn ownership_follows_affinity() {
        let p = FakePlatform::new();
        let v = VirtualNvic::new(&p, &dual()).unwrap();
        assert_eq!(v.owner(InterruptNum(20)), Some(C1));
        assert_eq!(v.owner(InterruptNum(21)), Some(C0));
        assert_eq!(v.owner(InterruptNum::SYSTICK), None);
    }

    #[test]
    fn local_change_waits_for_flush() {
        let p = FakePlatform::new();
        let v = VirtualNvic::new(&p, &dual()).unwrap();
        assert_eq!(
            v.stage_enable(InterruptNum(21)),
            (false, FlushTarget::Local)
        );
        assert_eq!(p.enabled_word(C0, 0), 0);
        assert!(v.flush_pending(C0));
        assert!(v.flush());
        assert_eq!(p.enabled_word(C0, 0), 1 << 5);
        assert!(!v.flush());
        assert!(p.notifications().is_empty());
    }

    #[test]
    fn remote_change_notifies_owner() {
        let p = FakePlatform::new();
        let v = VirtualNvic::new(&p, &dual()).unwrap();
        assert_eq!(
            v.stage_enable(InterruptNum(20)),
            (false, FlushTarget::Remote(C1))
        );
        assert_eq!(p.notifications(), vec![C1]);

        // Core 0 has nothing to do, and must not touch line 20 itself.
        assert!(!v.flush());
        assert_eq!(p.enabled_word(C0, 0), 0);

        p.switch_core(C1);
        assert!(v.flush());
        assert_eq!(p.enabled_word(C1, 0), 1 << 4);
    }

    #[test]
    fn flush_filters_by_affinity() {
        let p = FakePlatform::new();
        let v = VirtualNvic::new(&p, &dual()).unwrap();
        v.stage_enable(InterruptNum(20));
        v.stage_enable(InterruptNum(21));

        p.switch_core(C1);
        v.flush();
        assert_eq!(p.enabled_word(C1, 0), 1 << 4);

        p.switch_core(C0);
        v.flush();
        assert_eq!(p.enabled_word(C0, 0), 1 << 5);
    }

    #[test]
    fn flush_order_is_disable_clear_enable() {
        let p = FakePlatform::new();
        let v = VirtualNvic::new(&p, &HwiConfig::DEFAULT).unwrap();
        v.stage_enable(InterruptNum(16));
        v.stage_clear_pending(InterruptNum(17));
        v.stage_disable(InterruptNum(18));
        p.clear_accesses();
        v.flush();
        let banks: Vec<_> = p
            .accesses()
            .into_iter()
            .filter_map(|a| match a {
                Access::Bank { bank, word: 0, .. } => Some(bank),
                _ => None,
            })
            .collect();
        assert_eq!(banks, vec![NvicBank::Icer, NvicBank::Icpr, NvicBank::Iser]);
    }

    #[test]
    fn priorities_copied_only_when_changed() {
        let p = FakePlatform::new();
        let v = VirtualNvic::new(&p, &HwiConfig::DEFAULT).unwrap();
        v.stage_priority(InterruptNum(30), Priority(0x40));
        v.flush();
        assert_eq!(p.ipr(C0, 14), 0x40);

        p.clear_accesses();
        v.stage_enable(InterruptNum(31));
        v.flush();
        assert!(p
            .accesses()
            .iter()
            .all(|a| !matches!(a, Access::Ipr { .. })));
    }

    #[test]
    fn system_exceptions_write_through() {
        let p = FakePlatform::new();
        let v = VirtualNvic::new(&p, &dual()).unwrap();
        v.enable(InterruptNum::SYSTICK);
        assert!(v.status(InterruptNum::SYSTICK).contains(IrqStatus::ENABLED));
        assert!(!v.flush_pending(C0));
    }

    #[test]
    fn status_reports_requested_enable() {
        let p = FakePlatform::new();
        let v = VirtualNvic::new(&p, &dual()).unwrap();
        v.enable(InterruptNum(20));
        v.post(InterruptNum(20));
        let s = v.status(InterruptNum(20));
        assert!(s.contains(IrqStatus::ENABLED));
        assert!(s.contains(IrqStatus::PENDING));
    }

    #[test]
    fn remote_pending_survives_owner_flush() {
        let p = FakePlatform::new();
        let v = VirtualNvic::new(&p, &dual()).unwrap();
        v.post(InterruptNum(20));

        p.switch_core(C1);
        assert!(v.flush());
        assert_eq!(p.pending_word(C1, 0), 1 << 4);

        p.switch_core(C0);
        assert!(v.status(InterruptNum(20)).contains(IrqStatus::PENDING));

        // A staged clear reads as not pending everywhere, even before the
        // owner has applied it.
        v.clear_pending(InterruptNum(20));
        assert!(!v.status(InterruptNum(20)).contains(IrqStatus::PENDING));
        p.switch_core(C1);
        assert!(!v.status(InterruptNum(20)).contains(IrqStatus::PENDING));
        assert_eq!(p.pending_word(C1, 0), 1 << 4);
        v.flush();
        assert!(!v.status(InterruptNum(20)).contains(IrqStatus::PENDING));
        assert_eq!(p.pending_word(C1, 0), 0);
    }

    #[test]
    fn local_pending_visible_before_flush() {
        let p = FakePlatform::new();
        let v = VirtualNvic::new(&p, &dual()).unwrap();
        v.post(InterruptNum(21));
        assert_eq!(p.pending_word(C0, 0), 0);
        assert!(v.status(InterruptNum(21)).contains(IrqStatus::PENDING));
        v.flush();
        assert_eq!(p.pending_word(C0, 0), 1 << 5);
        assert!(v.status(InterruptNum(21)).contains(IrqStatus::PENDING));
    }

    #[derive(Copy, Clone, Debug)]
    enum Op {
        Enable(u16),
        Disable(u16),
        Clear(u16),
    }

    fn op() -> impl Strategy<Value = Op> {
        // Lines 16..80 cover both banks.
        (0..3u8, 16u16..80).prop_map(|(k, n)| match k {
            0 => Op::Enable(n),
            1 => Op::Disable(n),
            _ => Op::Clear(n),
        })
    }

    proptest! {
        /// After the owning core flushes, its hardware matches the shadow
        /// state with disables, then clears, then enables applied, no matter
        /// the order the requests were staged in.
        #[test]
        fn remote_flush_matches_virtual_state(
            ops in prop::collection::vec(op(), 0..40),
            enabled0 in any::<[u32; 2]>(),
            pending0 in any::<[u32; 2]>(),
        ) {
            const ALL_ODD: &[IrqAffinity] = &{
                let mut t = [IrqAffinity { irq: 0, core: CoreId(1) }; 32];
                let mut i = 0;
                while i < 32 {
                    t[i].irq = 17 + 2 * i as u16;
                    i += 1;
                }
                t
            };
            let cfg = HwiConfig {
                num_cores: 2,
                affinity: ALL_ODD,
                ..HwiConfig::DEFAULT
            };
            let p = FakePlatform::new();
            let v = VirtualNvic::new(&p, &cfg).unwrap();
            for w in 0..2 {
                p.set_enabled_word(C1, w, enabled0[w]);
                p.set_pending_word(C1, w, pending0[w]);
            }

            // Reference model of the shadow banks.
            let mut on = [0u32; 2];
            let mut off = [0u32; 2];
            let mut clr = [0u32; 2];
            for op in &ops {
                match *op {
                    Op::Enable(n) => {
                        let (w, m) = InterruptNum(n).bank_position().unwrap();
                        v.enable(InterruptNum(n));
                        on[w] |= m;
                        off[w] &= !m;
                    }
                    Op::Disable(n) => {
                        let (w, m) = InterruptNum(n).bank_position().unwrap();
                        v.disable(InterruptNum(n));
                        off[w] |= m;
                        on[w] &= !m;
                    }
                    Op::Clear(n) => {
                        let (w, m) = InterruptNum(n).bank_position().unwrap();
                        v.clear_pending(InterruptNum(n));
                        clr[w] |= m;
                    }
                }
            }

            p.switch_core(C1);
            v.flush();

            // Vectors 17, 19, ... are device IRQs 1, 3, ..., the odd bits.
            let owned = 0xAAAA_AAAAu32;
            for w in 0..2 {
                let want_en =
                    (enabled0[w] & !(off[w] & owned)) | (on[w] & owned);
                let want_pend = pending0[w] & !(clr[w] & owned);
                prop_assert_eq!(p.enabled_word(C1, w), want_en);
                prop_assert_eq!(p.pending_word(C1, w), want_pend);
                // Core 0 never saw a write.
                prop_assert_eq!(p.enabled_word(C0, w), 0);
            }
        }
    }
}
