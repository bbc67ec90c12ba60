// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types.
//!
//! There are two families here. [`HwiError`] covers configuration mistakes
//! made while setting interrupts up; these are returned synchronously and
//! the caller can recover, since nothing was created. [`Fault`] covers
//! hardware exceptions decoded at runtime; these are raised through an
//! [`ErrorSink`] as a [`KernelError`], along with stack overflows.

use core::fmt;

use abi::{CoreId, InterruptNum, MaskingOption};

use crate::hook::HookId;

/// Failure to create, reconfigure or look up an interrupt object.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum HwiError {
    /// The interrupt number is past the end of the vector table.
    BadIntNum(InterruptNum),
    /// Something already owns this vector.
    AlreadyDefined(InterruptNum),
    /// A module hook refused to allocate its per-interrupt context.
    HookAllocationFailure(HookId),
    /// No free interrupt object or sparse dispatch entry.
    LimitExceeded,
    /// The interrupt controller can only mask lower-priority interrupts.
    UnsupportedMaskingOption(MaskingOption),
    /// The handle is stale or was never valid.
    InvalidHandle,
    /// An interrupt is assigned to a core that isn't running.
    InvalidAffinity { irq: InterruptNum, core: CoreId },
    /// The application's exception context buffer is too small or
    /// misaligned.
    BadExcBuffer,
    /// The core index is past the configured number of cores.
    BadCore(CoreId),
    /// More module hooks were supplied than there are context slots.
    TooManyHooks,
}

impl fmt::Display for HwiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadIntNum(n) => write!(f, "intnum: {} is out of range", n.0),
            Self::AlreadyDefined(n) => {
                write!(f, "Hwi already defined: intr# {}", n.0)
            }
            Self::HookAllocationFailure(id) => {
                write!(f, "hook {} failed to allocate", id.0)
            }
            Self::LimitExceeded => f.write_str("Too many interrupts defined"),
            Self::UnsupportedMaskingOption(m) => {
                write!(f, "unsupported masking option {m:?}")
            }
            Self::InvalidHandle => f.write_str("invalid Hwi handle"),
            Self::InvalidAffinity { irq, core } => write!(
                f,
                "intr# {} assigned to core {} which is not running",
                irq.0, core.0
            ),
            Self::BadExcBuffer => f.write_str("bad exception context buffer"),
            Self::BadCore(c) => write!(f, "no such core {}", c.0),
            Self::TooManyHooks => f.write_str("too many hooks"),
        }
    }
}

/// A hardware exception, classified by cause.
///
/// The cause strings are fixed text chosen by the decoder in
/// [`crate::exc`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Fault {
    Nmi(&'static str),
    HardFault(&'static str),
    MemFault { cause: &'static str, address: u32 },
    BusFault { cause: &'static str, address: u32 },
    UsageFault(&'static str),
    SvCall { number: u8 },
    DebugMon(&'static str),
    Reserved { cause: &'static str, id: u16 },
    /// An interrupt fired whose vector has no handler.
    NoIsr { id: u16, pc: u32 },
}

impl Fault {
    /// Returns the cause string, for the variants that have one.
    pub fn cause(&self) -> Option<&'static str> {
        match self {
            Self::Nmi(c)
            | Self::HardFault(c)
            | Self::UsageFault(c)
            | Self::DebugMon(c) => Some(c),
            Self::MemFault { cause, .. }
            | Self::BusFault { cause, .. }
            | Self::Reserved { cause, .. } => Some(cause),
            Self::SvCall { .. } | Self::NoIsr { .. } => None,
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nmi(c) => write!(f, "NMI: {c}"),
            Self::HardFault(c) => write!(f, "hard fault: {c}"),
            Self::MemFault { cause, address } => {
                write!(f, "mem fault: {cause}, address: {address:08x}")
            }
            Self::BusFault { cause, address } => {
                write!(f, "bus fault: {cause}, address: {address:08x}")
            }
            Self::UsageFault(c) => write!(f, "usage fault: {c}"),
            Self::SvCall { number } => write!(f, "SVCall: svNum = {number}"),
            Self::DebugMon(c) => write!(f, "debug monitor: {c}"),
            Self::Reserved { cause, id } => write!(f, "reserved: {cause} {id}"),
            Self::NoIsr { id, pc } => {
                write!(f, "no ISR: id = {id}, pc = {pc:08x}")
            }
        }
    }
}

/// Anything the interrupt subsystem reports to the kernel's error path.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum KernelError {
    Config(HwiError),
    Fault(Fault),
    StackOverflow { base: usize, size: usize },
}

impl From<HwiError> for KernelError {
    fn from(e: HwiError) -> Self {
        Self::Config(e)
    }
}

impl From<Fault> for KernelError {
    fn from(f: Fault) -> Self {
        Self::Fault(f)
    }
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => e.fmt(f),
            Self::Fault(x) => x.fmt(f),
            Self::StackOverflow { base, size } => write!(
                f,
                "interrupt stack overflow: base {base:#x}, size {size:#x}"
            ),
        }
    }
}

/// Receives errors raised by the interrupt subsystem.
///
/// What happens next is up to the kernel. For runtime faults under the
/// `Min` exception policy, returning from `raise` hands control back to the
/// interrupted code's error path.
pub trait ErrorSink {
    fn raise(&self, err: KernelError);
}

impl<T: ErrorSink + ?Sized> ErrorSink for &T {
    fn raise(&self, err: KernelError) {
        (**self).raise(err)
    }
}

/// Sink that drops everything.
#[derive(Copy, Clone, Debug, Default)]
pub struct IgnoreErrors;

impl ErrorSink for IgnoreErrors {
    fn raise(&self, _err: KernelError) {}
}
