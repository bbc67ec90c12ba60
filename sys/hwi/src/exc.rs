// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fault exception decoding.
//!
//! The architectural fault handlers all funnel into
//! [`InterruptController::handle_exception`], which reads the fault status
//! registers, turns them into exactly one [`Fault`], records an
//! [`ExcContext`] for post-mortem inspection and raises the fault. What
//! happens after that depends on the configured [`ExceptionPolicy`]: `Min`
//! returns to the caller, `Max` dumps the context and panics.
//!
//! The decoding itself is a set of pure functions over [`FaultStatus`], so it
//! can be tested without any hardware.

use core::fmt;

use abi::{CoreId, ExceptionPolicy, InterruptNum, ThreadType, MAX_CORES};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::arch::{Platform, ScbReg};
use crate::err::{Fault, HwiError, KernelError};
use crate::hwi::InterruptController;
use crate::nvic::NvicOps;
use crate::trace::{self, Trace};
use crate::vector::VectorRouter;

bitflags::bitflags! {
    /// Bits in the Configurable Fault Status Register.
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    #[repr(transparent)]
    pub struct Cfsr: u32 {
        // Bits 0-7: MMFSR (Memory Management Fault Status Register)
        const IACCVIOL = 1 << 0;
        const DACCVIOL = 1 << 1;
        const MUNSTKERR = 1 << 3;
        const MSTKERR = 1 << 4;
        const MLSPERR = 1 << 5;
        const MMARVALID = 1 << 7;

        // Bits 8-15: BFSR (Bus Fault Status Register)
        const IBUSERR = 1 << (8 + 0);
        const PRECISERR = 1 << (8 + 1);
        const IMPRECISERR = 1 << (8 + 2);
        const UNSTKERR = 1 << (8 + 3);
        const STKERR = 1 << (8 + 4);
        const LSPERR = 1 << (8 + 5);
        const BFARVALID = 1 << (8 + 7);

        // Bits 16-31: UFSR (Usage Fault Status Register)
        const UNDEFINSTR = 1 << (16 + 0);
        const INVSTATE = 1 << (16 + 1);
        const INVPC = 1 << (16 + 2);
        const NOCP = 1 << (16 + 3);
        // ARMv8-M only; reserved on ARMv7-M.
        const STKOF = 1 << (16 + 4);
        const UNALIGNED = 1 << (16 + 8);
        const DIVBYZERO = 1 << (16 + 9);
    }
}

bitflags::bitflags! {
    /// Bits in the HardFault Status Register.
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    #[repr(transparent)]
    pub struct Hfsr: u32 {
        const VECTTBL = 1 << 1;
        const FORCED = 1 << 30;
        const DEBUGEVT = 1 << 31;
    }
}

bitflags::bitflags! {
    /// Bits in the Debug Fault Status Register.
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    #[repr(transparent)]
    pub struct Dfsr: u32 {
        const HALTED = 1 << 0;
        const BKPT = 1 << 1;
        const DWTTRAP = 1 << 2;
        const VCATCH = 1 << 3;
        const EXTERNAL = 1 << 4;
    }
}

/// Exceptions with a decoder of their own. Anything else that reaches the
/// exception entry is reserved or has no handler.
#[derive(Copy, Clone, Debug, Eq, PartialEq, FromPrimitive)]
pub enum Exception {
    Nmi = 2,
    HardFault = 3,
    MemFault = 4,
    BusFault = 5,
    UsageFault = 6,
    SvCall = 11,
    DebugMon = 12,
}

/// Reserved vector numbers.
fn is_reserved(num: InterruptNum) -> bool {
    matches!(num.0, 7..=10 | 13)
}

/// Snapshot of the fault status registers.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct FaultStatus {
    pub cfsr: Cfsr,
    pub hfsr: Hfsr,
    pub dfsr: Dfsr,
    pub mmfar: u32,
    pub bfar: u32,
    pub afsr: u32,
    pub icsr: u32,
}

impl FaultStatus {
    pub fn read(p: &impl Platform) -> Self {
        Self {
            cfsr: Cfsr::from_bits_retain(p.read_scb(ScbReg::Cfsr)),
            hfsr: Hfsr::from_bits_retain(p.read_scb(ScbReg::Hfsr)),
            dfsr: Dfsr::from_bits_retain(p.read_scb(ScbReg::Dfsr)),
            mmfar: p.read_scb(ScbReg::Mmfar),
            bfar: p.read_scb(ScbReg::Bfar),
            afsr: p.read_scb(ScbReg::Afsr),
            icsr: p.read_scb(ScbReg::Icsr),
        }
    }
}

/// Returns the cause of the first bit in `order` set in `bits`.
fn first_cause<F: bitflags::Flags + Copy>(
    bits: F,
    order: &[(F, &'static str)],
) -> Option<&'static str> {
    order
        .iter()
        .find(|(flag, _)| bits.contains(*flag))
        .map(|&(_, cause)| cause)
}

const MEM_CAUSES: &[(Cfsr, &str)] = &[
    (Cfsr::MSTKERR, "MSTKERR: Stacking Error (RD/WR failed), Stack Push"),
    (
        Cfsr::MUNSTKERR,
        "MUNSTKERR: Unstacking Error (RD/WR failed), Stack Pop",
    ),
    (
        Cfsr::MLSPERR,
        "MLSPERR: FP Lazy State Preservation Error (RD/WR failed)",
    ),
    (Cfsr::DACCVIOL, "DACCVIOL: Data Access Violation (RD/WR failed)"),
    (Cfsr::IACCVIOL, "IACCVIOL: Instruction Access Violation"),
];

const BUS_CAUSES: &[(Cfsr, &str)] = &[
    (Cfsr::STKERR, "STKERR: Bus Fault caused by Stack Push"),
    (Cfsr::UNSTKERR, "UNSTKERR: Bus Fault caused by Stack Pop"),
    (
        Cfsr::IMPRECISERR,
        "IMPRECISERR: Delayed Bus Fault, exact addr unknown",
    ),
    (
        Cfsr::PRECISERR,
        "PRECISERR: Immediate Bus Fault, exact addr known",
    ),
    (Cfsr::IBUSERR, "IBUSERR: Instruction Access Violation"),
    (
        Cfsr::LSPERR,
        "LSPERR: Bus Fault during FP Lazy State Preservation",
    ),
];

const USAGE_CAUSES: &[(Cfsr, &str)] = &[
    (Cfsr::UNDEFINSTR, "UNDEFINSTR: Undefined instruction"),
    (Cfsr::INVSTATE, "INVSTATE: Invalid EPSR and instruction combination"),
    (Cfsr::INVPC, "INVPC: Invalid PC"),
    (Cfsr::NOCP, "NOCP: Attempting to use co-processor"),
    (Cfsr::STKOF, "STKOF: Stack overflow"),
    (Cfsr::UNALIGNED, "UNALIGNED: Unaligned memory access"),
    (Cfsr::DIVBYZERO, "DIVBYZERO: Divide by zero"),
];

const DEBUG_CAUSES: &[(Dfsr, &str)] = &[
    (Dfsr::EXTERNAL, "EXTERNAL"),
    (Dfsr::VCATCH, "VCATCH"),
    (Dfsr::DWTTRAP, "DWTTRAP"),
    (Dfsr::BKPT, "BKPT"),
    (Dfsr::HALTED, "HALTED"),
];

const UNKNOWN: &str = "Unknown";

fn mem_fault(s: &FaultStatus) -> Option<Fault> {
    first_cause(s.cfsr, MEM_CAUSES).map(|cause| Fault::MemFault {
        cause,
        address: if s.cfsr.contains(Cfsr::MMARVALID) { s.mmfar } else { 0 },
    })
}

fn bus_fault(s: &FaultStatus) -> Option<Fault> {
    first_cause(s.cfsr, BUS_CAUSES).map(|cause| Fault::BusFault {
        cause,
        address: if s.cfsr.contains(Cfsr::BFARVALID) { s.bfar } else { 0 },
    })
}

fn usage_fault(s: &FaultStatus) -> Option<Fault> {
    first_cause(s.cfsr, USAGE_CAUSES).map(Fault::UsageFault)
}

/// Decodes a memory management fault.
pub fn classify_mem(s: &FaultStatus) -> Fault {
    mem_fault(s).unwrap_or(Fault::MemFault {
        cause: UNKNOWN,
        address: 0,
    })
}

/// Decodes a bus fault.
pub fn classify_bus(s: &FaultStatus) -> Fault {
    bus_fault(s).unwrap_or(Fault::BusFault {
        cause: UNKNOWN,
        address: 0,
    })
}

pub fn classify_usage(s: &FaultStatus) -> Fault {
    usage_fault(s).unwrap_or(Fault::UsageFault(UNKNOWN))
}

/// Decodes a hard fault.
///
/// A forced hard fault is an escalated configurable fault, so the
/// configurable fault registers are searched for the real cause, usage
/// fault first, then bus, then memory management.
pub fn classify_hard(s: &FaultStatus) -> Fault {
    if s.hfsr.contains(Hfsr::FORCED) {
        usage_fault(s)
            .or_else(|| bus_fault(s))
            .or_else(|| mem_fault(s))
            .unwrap_or(Fault::HardFault("FORCED"))
    } else if s.hfsr.contains(Hfsr::DEBUGEVT) {
        Fault::HardFault("Debug Event")
    } else if s.hfsr.contains(Hfsr::VECTTBL) {
        Fault::HardFault(
            "Bus Fault Vector Table Read during exception processing",
        )
    } else {
        Fault::HardFault(UNKNOWN)
    }
}

pub fn classify_debug(s: &FaultStatus) -> Fault {
    Fault::DebugMon(first_cause(s.dfsr, DEBUG_CAUSES).unwrap_or(UNKNOWN))
}

/// Decodes an exception taken on vector `num`. `svc_number` is only called
/// for SVCall.
pub fn classify(
    num: InterruptNum,
    s: &FaultStatus,
    svc_number: impl FnOnce() -> u8,
) -> Fault {
    match Exception::from_u16(num.0) {
        Some(Exception::Nmi) => Fault::Nmi("NMI"),
        Some(Exception::HardFault) => classify_hard(s),
        Some(Exception::MemFault) => classify_mem(s),
        Some(Exception::BusFault) => classify_bus(s),
        Some(Exception::UsageFault) => classify_usage(s),
        Some(Exception::SvCall) => Fault::SvCall {
            number: svc_number(),
        },
        Some(Exception::DebugMon) => classify_debug(s),
        None if is_reserved(num) => Fault::Reserved {
            cause: "Exception #:",
            id: num.0,
        },
        None => Fault::NoIsr { id: num.0, pc: 0 },
    }
}

/// Registers stacked on exception entry, plus the callee-saved ones the
/// entry code pushes. `r[0..4]` and `r[12]` come from the hardware frame.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ExcFrame {
    pub r: [u32; 13],
    pub sp: u32,
    pub lr: u32,
    pub pc: u32,
    pub psr: u32,
}

/// Everything known about an exception, in a layout applications can map
/// onto a buffer of their own.
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    Eq,
    PartialEq,
    FromBytes,
    IntoBytes,
    KnownLayout,
    Immutable,
)]
#[repr(C)]
pub struct ExcContext {
    pub thread_type: u32,
    pub core: u32,
    pub r: [u32; 13],
    pub sp: u32,
    pub lr: u32,
    pub pc: u32,
    pub psr: u32,
    pub icsr: u32,
    pub cfsr: u32,
    pub hfsr: u32,
    pub dfsr: u32,
    pub mmar: u32,
    pub bfar: u32,
    pub afsr: u32,
}

static_assertions::const_assert_eq!(core::mem::size_of::<ExcContext>(), 26 * 4);

impl ExcContext {
    pub fn new(
        thread_type: ThreadType,
        core: CoreId,
        frame: &ExcFrame,
        s: &FaultStatus,
    ) -> Self {
        Self {
            thread_type: thread_type as u32,
            core: u32::from(core.0),
            r: frame.r,
            sp: frame.sp,
            lr: frame.lr,
            pc: frame.pc,
            psr: frame.psr,
            icsr: s.icsr,
            cfsr: s.cfsr.bits(),
            hfsr: s.hfsr.bits(),
            dfsr: s.dfsr.bits(),
            mmar: s.mmfar,
            bfar: s.bfar,
            afsr: s.afsr,
        }
    }
}

impl fmt::Display for ExcContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "core {} in {:?}",
            self.core,
            ThreadType::from_u8(self.thread_type as u8)
        )?;
        for (i, r) in self.r.iter().enumerate() {
            writeln!(f, "R{i} = {r:#010x}")?;
        }
        writeln!(f, "SP = {:#010x}", self.sp)?;
        writeln!(f, "LR = {:#010x}", self.lr)?;
        writeln!(f, "PC = {:#010x}", self.pc)?;
        writeln!(f, "PSR = {:#010x}", self.psr)?;
        writeln!(f, "ICSR = {:#010x}", self.icsr)?;
        writeln!(f, "CFSR = {:#010x}", self.cfsr)?;
        writeln!(f, "HFSR = {:#010x}", self.hfsr)?;
        writeln!(f, "DFSR = {:#010x}", self.dfsr)?;
        writeln!(f, "MMAR = {:#010x}", self.mmar)?;
        writeln!(f, "BFAR = {:#010x}", self.bfar)?;
        write!(f, "AFSR = {:#010x}", self.afsr)
    }
}

/// Called with the context of every exception on its core, before the
/// fault is raised.
pub type ExcHook = fn(&ExcContext);

#[derive(Default)]
struct CoreExc<'a> {
    buffer: Option<&'a mut [u8]>,
    storage: ExcContext,
    /// Set once a context has been written.
    bound: bool,
    hook: Option<ExcHook>,
}

impl CoreExc<'_> {
    fn context_mut(&mut self) -> &mut ExcContext {
        match self.buffer.as_deref_mut() {
            Some(buf) => match ExcContext::mut_from_prefix(buf) {
                Ok((ctx, _)) => ctx,
                // Checked when the buffer was installed.
                Err(_) => &mut self.storage,
            },
            None => &mut self.storage,
        }
    }

    fn context(&self) -> Option<ExcContext> {
        if !self.bound {
            return None;
        }
        match self.buffer.as_deref() {
            Some(buf) => ExcContext::read_from_prefix(buf).ok().map(|(c, _)| c),
            None => Some(self.storage),
        }
    }
}

/// Per-core exception context storage and hooks.
pub(crate) struct ExcState<'a> {
    cores: [CoreExc<'a>; MAX_CORES],
}

impl ExcState<'_> {
    pub(crate) fn new() -> Self {
        Self {
            cores: Default::default(),
        }
    }
}

impl<'a, M: NvicOps, R: VectorRouter> InterruptController<'a, M, R> {
    fn exc_core(&self, core: CoreId) -> Result<usize, HwiError> {
        if core.index() < self.config.num_cores {
            Ok(core.index())
        } else {
            Err(HwiError::BadCore(core))
        }
    }

    /// Has exceptions on `core` record their context in `buf` rather than
    /// in the controller.
    pub fn set_exc_buffer(
        &self,
        core: CoreId,
        buf: &'a mut [u8],
    ) -> Result<(), HwiError> {
        let i = self.exc_core(core)?;
        if ExcContext::mut_from_prefix(&mut *buf).is_err() {
            return Err(HwiError::BadExcBuffer);
        }
        self.exc.lock().cores[i].buffer = Some(buf);
        Ok(())
    }

    pub fn set_exception_hook(
        &self,
        core: CoreId,
        hook: Option<ExcHook>,
    ) -> Result<(), HwiError> {
        let i = self.exc_core(core)?;
        self.exc.lock().cores[i].hook = hook;
        Ok(())
    }

    /// The context of the most recent exception on `core`, if there has
    /// been one.
    pub fn exc_context(&self, core: CoreId) -> Option<ExcContext> {
        let i = self.exc_core(core).ok()?;
        self.exc.lock().cores[i].context()
    }

    /// Entry point for every fault exception and for vectors with no
    /// handler. `frame` holds the interrupted registers.
    ///
    /// Under the `Min` policy this returns the decoded fault after raising
    /// it. Under `Max` it does not return.
    pub fn handle_exception(&self, frame: &ExcFrame) -> Fault {
        let p = self.nvic.platform();
        let num = p.active_vector();
        let status = FaultStatus::read(p);
        let fault = match classify(num, &status, || p.svc_number(frame.pc)) {
            Fault::NoIsr { id, .. } => Fault::NoIsr { id, pc: frame.pc },
            f => f,
        };

        // The status registers are write-one-to-clear.
        p.write_scb(ScbReg::Cfsr, status.cfsr.bits());
        p.write_scb(ScbReg::Hfsr, status.hfsr.bits());
        p.write_scb(ScbReg::Dfsr, status.dfsr.bits());

        self.report(fault, frame, &status);
        fault
    }

    /// Raises a fault detected outside the exception entry.
    pub(crate) fn raise_fault(&self, fault: Fault, frame: &ExcFrame) {
        let status = FaultStatus::read(self.nvic.platform());
        self.report(fault, frame, &status);
    }

    fn report(&self, fault: Fault, frame: &ExcFrame, status: &FaultStatus) {
        let core = self.nvic.platform().core_id();
        let ctx = ExcContext::new(self.thread_type(), core, frame, status);

        // A fault taken while another one is being recorded keeps the first
        // context.
        let hook = self.exc.try_lock().and_then(|mut exc| {
            let c = exc.cores.get_mut(core.index())?;
            *c.context_mut() = ctx;
            c.bound = true;
            c.hook
        });
        if let Some(hook) = hook {
            hook(&ctx);
        }

        trace::record(Trace::Exception(fault));
        self.errors.raise(KernelError::Fault(fault));

        if self.config.exc_policy == ExceptionPolicy::Max {
            panic!("{fault}\n{ctx}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::fake::FakePlatform;
    use crate::config::HwiConfig;
    use crate::dispatch::NoScheduler;
    use crate::err::IgnoreErrors;
    use crate::nvic::Nvic;
    use crate::vector::DenseRouter;
    use std::cell::Cell;

    fn status(cfsr: Cfsr) -> FaultStatus {
        FaultStatus {
            cfsr,
            mmfar: 0x2000_0010,
            bfar: 0x4000_0020,
            ..FaultStatus::default()
        }
    }

    #[test]
    fn bus_fault_priority() {
        let s = status(Cfsr::STKERR | Cfsr::PRECISERR | Cfsr::BFARVALID);
        assert_eq!(
            classify_bus(&s),
            Fault::BusFault {
                cause: BUS_CAUSES[0].1,
                address: 0x4000_0020
            }
        );
        let s = status(Cfsr::PRECISERR);
        assert_eq!(
            classify_bus(&s),
            Fault::BusFault {
                cause: "PRECISERR: Immediate Bus Fault, exact addr known",
                address: 0
            }
        );
    }

    #[test]
    fn mem_fault_address_only_when_valid() {
        let s = status(Cfsr::DACCVIOL | Cfsr::MMARVALID);
        assert!(matches!(
            classify_mem(&s),
            Fault::MemFault { address: 0x2000_0010, .. }
        ));
        let s = status(Cfsr::DACCVIOL);
        assert!(matches!(classify_mem(&s), Fault::MemFault { address: 0, .. }));
    }

    #[test]
    fn forced_hard_fault_cascades() {
        let mut s = status(Cfsr::DIVBYZERO | Cfsr::IBUSERR);
        s.hfsr = Hfsr::FORCED;
        assert_eq!(
            classify_hard(&s),
            Fault::UsageFault("DIVBYZERO: Divide by zero")
        );

        s.cfsr = Cfsr::IACCVIOL;
        assert!(matches!(classify_hard(&s), Fault::MemFault { .. }));

        s.cfsr = Cfsr::empty();
        assert_eq!(classify_hard(&s), Fault::HardFault("FORCED"));

        s.hfsr = Hfsr::VECTTBL;
        assert_eq!(
            classify_hard(&s),
            Fault::HardFault(
                "Bus Fault Vector Table Read during exception processing"
            )
        );
    }

    #[test]
    fn classify_by_vector() {
        let s = FaultStatus::default();
        assert_eq!(classify(InterruptNum::NMI, &s, || 0), Fault::Nmi("NMI"));
        assert_eq!(
            classify(InterruptNum::SVCALL, &s, || 9),
            Fault::SvCall { number: 9 }
        );
        assert_eq!(
            classify(InterruptNum(7), &s, || 0),
            Fault::Reserved {
                cause: "Exception #:",
                id: 7
            }
        );
        assert_eq!(
            classify(InterruptNum(13), &s, || 0),
            Fault::Reserved {
                cause: "Exception #:",
                id: 13
            }
        );
        assert_eq!(
            classify(InterruptNum(40), &s, || 0),
            Fault::NoIsr { id: 40, pc: 0 }
        );
        let s = FaultStatus {
            dfsr: Dfsr::BKPT | Dfsr::HALTED,
            ..FaultStatus::default()
        };
        assert_eq!(
            classify(InterruptNum::DEBUG_MON, &s, || 0),
            Fault::DebugMon("BKPT")
        );
    }

    fn controller(
        p: &FakePlatform,
        policy: ExceptionPolicy,
    ) -> InterruptController<'_, Nvic<&FakePlatform>, DenseRouter> {
        InterruptController::new(
            HwiConfig {
                exc_policy: policy,
                ..HwiConfig::DEFAULT
            },
            Nvic::new(p),
            DenseRouter::new(),
            &NoScheduler,
            &IgnoreErrors,
            &[],
        )
        .unwrap()
    }

    thread_local! {
        static HOOKED_PC: Cell<u32> = const { Cell::new(0) };
    }

    fn hook(ctx: &ExcContext) {
        HOOKED_PC.with(|c| c.set(ctx.pc));
    }

    #[test]
    fn min_policy_records_and_clears() {
        let p = FakePlatform::new();
        let c = controller(&p, ExceptionPolicy::Min);
        c.set_exception_hook(CoreId(0), Some(hook)).unwrap();
        p.latch_fault(ScbReg::Cfsr, (Cfsr::UNSTKERR | Cfsr::BFARVALID).bits());
        p.latch_fault(ScbReg::Bfar, 0x6000_0000);
        p.set_active_vector(InterruptNum::BUS_FAULT);

        assert_eq!(c.exc_context(CoreId(0)), None);
        let frame = ExcFrame {
            pc: 0x0800_0100,
            ..ExcFrame::default()
        };
        let fault = c.handle_exception(&frame);
        assert_eq!(
            fault,
            Fault::BusFault {
                cause: "UNSTKERR: Bus Fault caused by Stack Pop",
                address: 0x6000_0000
            }
        );
        assert_eq!(p.read_scb(ScbReg::Cfsr), 0);
        let ctx = c.exc_context(CoreId(0)).unwrap();
        assert_eq!(ctx.pc, 0x0800_0100);
        assert_eq!(ctx.bfar, 0x6000_0000);
        assert_eq!(HOOKED_PC.with(Cell::get), 0x0800_0100);
    }

    #[test]
    fn context_goes_to_application_buffer() {
        let p = FakePlatform::new();
        let mut words = [0u32; 32];
        let c = controller(&p, ExceptionPolicy::Min);
        c.set_exc_buffer(CoreId(0), words.as_mut_bytes()).unwrap();
        p.set_active_vector(InterruptNum::NMI);
        c.handle_exception(&ExcFrame {
            lr: 0xffff_fff9,
            ..ExcFrame::default()
        });
        assert_eq!(c.exc_context(CoreId(0)).map(|x| x.lr), Some(0xffff_fff9));
        drop(c);
        // lr follows thread type, core, r[13] and sp.
        assert_eq!(words[16], 0xffff_fff9);
    }

    #[test]
    fn short_buffer_is_rejected() {
        let p = FakePlatform::new();
        let mut words = [0u32; 4];
        let c = controller(&p, ExceptionPolicy::Min);
        assert_eq!(
            c.set_exc_buffer(CoreId(0), words.as_mut_bytes()),
            Err(HwiError::BadExcBuffer)
        );
        assert_eq!(
            c.set_exception_hook(CoreId(1), None),
            Err(HwiError::BadCore(CoreId(1)))
        );
    }

    #[test]
    #[should_panic(expected = "usage fault: UNDEFINSTR")]
    fn max_policy_panics() {
        let p = FakePlatform::new();
        let c = controller(&p, ExceptionPolicy::Max);
        p.latch_fault(ScbReg::Cfsr, Cfsr::UNDEFINSTR.bits());
        p.set_active_vector(InterruptNum::USAGE_FAULT);
        c.handle_exception(&ExcFrame::default());
    }
}
