// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Interrupt subsystem ABI definitions, shared between the kernel crate and
//! its build script.

#![no_std]

use serde::{Deserialize, Serialize};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Largest number of cores the interrupt subsystem will coordinate.
pub const MAX_CORES: usize = 2;

/// Number of architecturally defined exception vectors that precede the
/// first device interrupt.
pub const NUM_SYSTEM_VECTORS: u16 = 16;

/// Number of 32-bit enable/pending words covered by the per-core affinity
/// masks. The dual-core parts this was designed for implement 64 device
/// interrupts, so two words is the whole controller.
pub const AFFINITY_WORDS: usize = 2;

/// Names an entry in the vector table.
///
/// Numbers below 16 are the architecturally defined exceptions (NMI, the
/// faults, SVCall, PendSV, SysTick); device interrupts start at 16. This is
/// the same numbering the processor reports in IPSR, *not* the zero-based IRQ
/// numbering used by vendor headers.
#[derive(
    Copy,
    Clone,
    Debug,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Serialize,
    Deserialize,
)]
#[repr(transparent)]
pub struct InterruptNum(pub u16);

impl InterruptNum {
    pub const NMI: Self = Self(2);
    pub const HARD_FAULT: Self = Self(3);
    pub const MEM_FAULT: Self = Self(4);
    pub const BUS_FAULT: Self = Self(5);
    pub const USAGE_FAULT: Self = Self(6);
    pub const SVCALL: Self = Self(11);
    pub const DEBUG_MON: Self = Self(12);
    pub const PENDSV: Self = Self(14);
    pub const SYSTICK: Self = Self(15);

    /// Index of this interrupt in the vector table.
    pub fn index(self) -> usize {
        usize::from(self.0)
    }

    /// Zero-based device IRQ number, if this is a device interrupt.
    pub fn device_irq(self) -> Option<u16> {
        self.0.checked_sub(NUM_SYSTEM_VECTORS)
    }

    /// Word index and bit mask of this interrupt in the NVIC enable/pending
    /// banks, or `None` for system exceptions (which aren't in those banks).
    pub fn bank_position(self) -> Option<(usize, u32)> {
        let irq = self.device_irq()?;
        Some((usize::from(irq / 32), 1 << (irq % 32)))
    }
}

impl From<u16> for InterruptNum {
    fn from(x: u16) -> Self {
        Self(x)
    }
}

/// Hardware interrupt priority.
///
/// Numerically lower priorities are more urgent. Priority 0 preempts
/// everything else that is maskable; 255 is the least urgent.
///
/// Like the task `Priority` it replaces, this type *deliberately* does not
/// implement `PartialOrd`/`Ord`, so that nobody has to remember which way
/// `<` points.
#[derive(
    Copy,
    Clone,
    Debug,
    Eq,
    PartialEq,
    Hash,
    FromBytes,
    IntoBytes,
    Immutable,
    KnownLayout,
    Unaligned,
    Serialize,
    Deserialize,
)]
#[repr(transparent)]
pub struct Priority(pub u8);

impl Priority {
    /// The most urgent priority.
    pub const HIGHEST: Self = Self(0);
    /// The least urgent priority, and the one used when the creator doesn't
    /// ask for anything in particular.
    pub const LOWEST: Self = Self(255);

    /// Checks if `self` is strictly more urgent than `other`.
    pub fn is_more_urgent_than(self, other: Self) -> bool {
        self.0 < other.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::LOWEST
    }
}

/// Identifies a processor core.
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    Eq,
    PartialEq,
    Hash,
    Serialize,
    Deserialize,
)]
#[repr(transparent)]
pub struct CoreId(pub u8);

impl CoreId {
    pub fn index(self) -> usize {
        usize::from(self.0)
    }
}

/// How an interrupt's vector reaches its handler.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum DispatchMode {
    /// The vector points straight at the handler. The dispatcher, its hooks
    /// and its scheduler bookkeeping never run for this interrupt.
    Bypassed,
    /// The vector points at the shared dispatcher, which looks up the
    /// interrupt object and runs its handler.
    Dispatched,
}

/// Kind of thread currently running on a core.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum ThreadType {
    #[default]
    Main = 0,
    Task = 1,
    Swi = 2,
    Hwi = 3,
}

impl ThreadType {
    /// Decodes a thread type stored as its discriminant. Unknown values read
    /// as `Main`.
    pub fn from_u8(x: u8) -> Self {
        match x {
            1 => Self::Task,
            2 => Self::Swi,
            3 => Self::Hwi,
            _ => Self::Main,
        }
    }
}

/// What happens after a fault has been decoded.
#[derive(
    Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize,
)]
pub enum ExceptionPolicy {
    /// Raise the classified error and return to the kernel's error path,
    /// leaving recovery to the application's error hook.
    Min,
    /// Dump the full exception context and stop the system.
    #[default]
    Max,
}

/// Which interrupts an interrupt object masks while its handler runs.
///
/// The NVIC masks everything at the same or lower urgency automatically, so
/// `Lower` is the only option this controller can honor.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum MaskingOption {
    None,
    All,
    SelfOnly,
    Bitmask,
    #[default]
    Lower,
}

/// Assigns a device interrupt to the core responsible for programming it.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct IrqAffinity {
    /// Vector number (16 and up).
    pub irq: u16,
    pub core: CoreId,
}

bitflags::bitflags! {
    /// Bits in the Configuration and Control Register.
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    #[repr(transparent)]
    pub struct CcrFlags: u32 {
        const NONBASETHRDENA = 1 << 0;
        const USERSETMPEND = 1 << 1;
        const UNALIGN_TRP = 1 << 3;
        const DIV_0_TRP = 1 << 4;
        const BFHFNMIGN = 1 << 8;
        const STKALIGN = 1 << 9;
    }
}

bitflags::bitflags! {
    /// Cross-platform summary of an interrupt line's state.
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    #[repr(transparent)]
    pub struct IrqStatus: u32 {
        const ENABLED = 1 << 0;
        const PENDING = 1 << 1;
    }
}

/// Serialized form of `CcrFlags`, one field per bit, as written in the kernel
/// configuration.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CcrDesc {
    pub stkalign: bool,
    pub bfhfnmign: bool,
    pub div_0_trp: bool,
    pub unalign_trp: bool,
    pub usersetmpend: bool,
    pub nonebasethrdena: bool,
}

impl Default for CcrDesc {
    fn default() -> Self {
        Self {
            stkalign: true,
            bfhfnmign: false,
            div_0_trp: false,
            unalign_trp: false,
            usersetmpend: false,
            nonebasethrdena: false,
        }
    }
}

impl CcrDesc {
    pub fn flags(&self) -> CcrFlags {
        let mut f = CcrFlags::empty();
        f.set(CcrFlags::STKALIGN, self.stkalign);
        f.set(CcrFlags::BFHFNMIGN, self.bfhfnmign);
        f.set(CcrFlags::DIV_0_TRP, self.div_0_trp);
        f.set(CcrFlags::UNALIGN_TRP, self.unalign_trp);
        f.set(CcrFlags::USERSETMPEND, self.usersetmpend);
        f.set(CcrFlags::NONBASETHRDENA, self.nonebasethrdena);
        f
    }
}
