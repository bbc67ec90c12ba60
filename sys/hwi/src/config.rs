// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Kernel-wide interrupt configuration.
//!
//! The build script turns the RON-encoded `HWI_KCONFIG` environment variable
//! into [`KCONFIG`] and the table-sizing constants below. Boards that need
//! something different at runtime (and the tests) can build their own
//! [`HwiConfig`] instead.

use abi::{
    CcrFlags, CoreId, ExceptionPolicy, InterruptNum, IrqAffinity, Priority,
};

#[derive(Copy, Clone, Debug)]
pub struct HwiConfig {
    /// Interrupts numerically below this priority are never masked by the
    /// kernel and never go through the dispatcher.
    pub disable_priority: Priority,
    /// Value for AIRCR.PRIGROUP.
    pub pri_group: u8,
    pub ccr: CcrFlags,
    /// Re-enable interrupts while a dispatched handler runs.
    pub auto_nesting: bool,
    /// Suspend the task scheduler around dispatched handlers.
    pub task_support: bool,
    /// Suspend the software-interrupt scheduler around dispatched handlers.
    pub swi_support: bool,
    pub exc_policy: ExceptionPolicy,
    pub num_cores: usize,
    /// Owning core for each device interrupt. Lines not listed belong to
    /// core 0.
    pub affinity: &'static [IrqAffinity],
}

impl HwiConfig {
    pub const DEFAULT: Self = Self {
        disable_priority: Priority(32),
        pri_group: 0,
        ccr: CcrFlags::STKALIGN,
        auto_nesting: true,
        task_support: true,
        swi_support: true,
        exc_policy: ExceptionPolicy::Max,
        num_cores: 1,
        affinity: &[],
    };

    /// Returns the core responsible for programming `num`.
    pub fn affinity_of(&self, num: InterruptNum) -> CoreId {
        self.affinity
            .iter()
            .find(|a| a.irq == num.0)
            .map_or(CoreId(0), |a| a.core)
    }
}

impl Default for HwiConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

include!(concat!(env!("OUT_DIR"), "/kconfig.rs"));

static_assertions::const_assert!(
    NUM_INTERRUPTS > abi::NUM_SYSTEM_VECTORS as usize
);
static_assertions::const_assert!(MAX_HWI <= u16::MAX as usize);

/// Number of device interrupt lines, i.e. vectors past the system
/// exceptions.
pub const NUM_DEVICE_IRQS: usize =
    NUM_INTERRUPTS - abi::NUM_SYSTEM_VECTORS as usize;

/// Number of 32-bit words in each NVIC enable/pending bank.
pub const NVIC_WORDS: usize = NUM_DEVICE_IRQS.div_ceil(32);
