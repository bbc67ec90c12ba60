// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Interrupt objects and the controller that owns them.
//!
//! An interrupt object binds one vector to a handler function and its
//! argument. Creating one claims the vector; destroying it gives the vector
//! back. At most one object owns a given vector at a time.
//!
//! # Placement
//!
//! When an object is created it is "placed" in the vector table in one of
//! two ways:
//!
//! - *Bypassed*: the vector points straight at the handler. This happens
//!   when the object asks for no dispatcher, or when its priority is more
//!   urgent than the configured disable priority (such interrupts are never
//!   masked by the kernel, so they must not touch kernel state, which is
//!   what the dispatcher does).
//! - *Dispatched*: the vector points at the shared dispatcher, and the
//!   [`VectorRouter`] records which object to run.
//!
//! # Locking
//!
//! The registry is behind a spin lock, and every mutation happens with
//! interrupts masked as well, so the dispatcher (which takes the same lock)
//! never sees an object half updated. Module hooks are always called with
//! the lock released.

use core::sync::atomic::{AtomicU8, Ordering};

use abi::{
    CoreId, DispatchMode, InterruptNum, IrqStatus, MaskingOption, Priority,
    ThreadType, MAX_CORES,
};

use crate::arch::{self, shcsr, IrqKey, Platform, ScbReg, AIRCR_VECTKEY};
use crate::config::{HwiConfig, MAX_HWI, NUM_INTERRUPTS};
use crate::dispatch::KernelScheduler;
use crate::err::{ErrorSink, HwiError, KernelError};
use crate::exc::ExcState;
use crate::hook::{HookError, HookId, InterruptHook, MAX_HOOKS};
use crate::nvic::NvicOps;
use crate::trace::{self, Trace};
use crate::vector::{VectorRouter, VectorSlot, VectorTable};

/// An interrupt handler. Called with the object's argument.
pub type HwiFunc = fn(usize);

/// Creation parameters.
#[derive(Copy, Clone, Debug)]
pub struct HwiParams {
    /// Passed to the handler.
    pub arg: usize,
    /// `None` means the least urgent priority.
    pub priority: Option<Priority>,
    /// Enable the line once the object is placed.
    pub enable_int: bool,
    /// Go through the dispatcher, unless the priority forces a bypass.
    pub use_dispatcher: bool,
    pub mask_setting: MaskingOption,
}

impl Default for HwiParams {
    fn default() -> Self {
        Self {
            arg: 0,
            priority: None,
            enable_int: true,
            use_dispatcher: true,
            mask_setting: MaskingOption::Lower,
        }
    }
}

/// An object to create during [`InterruptController::startup`].
#[derive(Copy, Clone, Debug)]
pub struct StaticHwi {
    pub num: InterruptNum,
    pub func: HwiFunc,
    pub params: HwiParams,
}

/// Names an interrupt object.
///
/// Handles carry a generation number, so a handle kept after its object was
/// destroyed is rejected rather than silently naming a newer object in the
/// same slot.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct HwiHandle {
    index: u16,
    generation: u32,
}

impl HwiHandle {
    pub(crate) fn new(index: u16, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn index(&self) -> usize {
        usize::from(self.index)
    }
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct HwiObject {
    pub(crate) num: InterruptNum,
    pub(crate) mode: DispatchMode,
    pub(crate) priority: Priority,
    pub(crate) func: HwiFunc,
    pub(crate) arg: usize,
    /// Return address of the most recent dispatch.
    pub(crate) irp: usize,
    use_dispatcher: bool,
    enable_int: bool,
    slot: VectorSlot,
    pub(crate) hook_env: [usize; MAX_HOOKS],
}

#[derive(Copy, Clone, Debug, Default)]
struct ObjectSlot {
    generation: u32,
    obj: Option<HwiObject>,
}

pub(crate) struct Registry<R> {
    pub(crate) vectors: VectorTable,
    pub(crate) router: R,
    objects: [ObjectSlot; MAX_HWI],
}

impl<R> Registry<R> {
    pub(crate) fn object(&self, h: HwiHandle) -> Result<&HwiObject, HwiError> {
        self.objects
            .get(h.index())
            .filter(|s| s.generation == h.generation)
            .and_then(|s| s.obj.as_ref())
            .ok_or(HwiError::InvalidHandle)
    }

    pub(crate) fn object_mut(
        &mut self,
        h: HwiHandle,
    ) -> Result<&mut HwiObject, HwiError> {
        self.objects
            .get_mut(h.index())
            .filter(|s| s.generation == h.generation)
            .and_then(|s| s.obj.as_mut())
            .ok_or(HwiError::InvalidHandle)
    }

    fn owner_of(&self, num: InterruptNum) -> Option<HwiHandle> {
        self.objects.iter().enumerate().find_map(|(i, s)| {
            s.obj
                .filter(|o| o.num == num)
                .map(|_| HwiHandle::new(i as u16, s.generation))
        })
    }

    fn release(&mut self, h: HwiHandle) {
        if let Some(s) = self.objects.get_mut(h.index()) {
            if s.generation == h.generation {
                s.obj = None;
                s.generation = s.generation.wrapping_add(1);
            }
        }
    }
}

/// The kernel's interrupt subsystem: vector table, interrupt objects,
/// interrupt controller, dispatcher and exception decoding.
///
/// `M` is the interrupt controller driver ([`crate::nvic::Nvic`] or
/// [`crate::vnvic::VirtualNvic`]) and `R` the dispatch router
/// ([`crate::vector::DenseRouter`] or [`crate::vector::SparseRouter`]).
///
/// The controller must not move once interrupts have been placed, since
/// the sparse router hands out addresses of its records.
pub struct InterruptController<'a, M, R> {
    pub(crate) config: HwiConfig,
    pub(crate) nvic: M,
    pub(crate) hooks: heapless::Vec<&'a dyn InterruptHook, MAX_HOOKS>,
    pub(crate) scheduler: &'a dyn KernelScheduler,
    pub(crate) errors: &'a dyn ErrorSink,
    pub(crate) state: spin::Mutex<Registry<R>>,
    pub(crate) exc: spin::Mutex<ExcState<'a>>,
    thread_types: [AtomicU8; MAX_CORES],
}

impl<'a, M: NvicOps, R: VectorRouter> InterruptController<'a, M, R> {
    /// Builds a controller. Each hook is told its ID, in order.
    pub fn new(
        config: HwiConfig,
        nvic: M,
        router: R,
        scheduler: &'a dyn KernelScheduler,
        errors: &'a dyn ErrorSink,
        hooks: &[&'a dyn InterruptHook],
    ) -> Result<Self, HwiError> {
        if config.num_cores == 0 || config.num_cores > MAX_CORES {
            return Err(HwiError::BadCore(CoreId(config.num_cores as u8)));
        }
        let hooks: heapless::Vec<_, MAX_HOOKS> =
            heapless::Vec::from_slice(hooks)
                .map_err(|_| HwiError::TooManyHooks)?;
        for (i, hook) in hooks.iter().enumerate() {
            hook.register(HookId(i as u8));
        }
        Ok(Self {
            config,
            nvic,
            hooks,
            scheduler,
            errors,
            state: spin::Mutex::new(Registry {
                vectors: VectorTable::new(),
                router,
                objects: [ObjectSlot::default(); MAX_HWI],
            }),
            exc: spin::Mutex::new(ExcState::new()),
            thread_types: [const { AtomicU8::new(0) }; MAX_CORES],
        })
    }

    pub fn config(&self) -> &HwiConfig {
        &self.config
    }

    pub fn nvic(&self) -> &M {
        &self.nvic
    }

    /// Runs `body` on the registry with interrupts masked and the lock held.
    pub(crate) fn critical<T>(
        &self,
        body: impl FnOnce(&mut Registry<R>) -> T,
    ) -> T {
        arch::with_interrupts_masked(self.nvic.platform(), || {
            body(&mut *self.state.lock())
        })
    }

    /// Programs this core's NVIC and system control block for the kernel,
    /// and copies the vector table into the live one.
    ///
    /// On multi-core parts, each core calls this for itself.
    pub fn init_nvic(&self) {
        let p = self.nvic.platform();
        self.critical(|reg| {
            for (num, slot) in reg.vectors.iter() {
                p.plug_vector(num, slot);
            }
        });
        arch::with_interrupts_masked(p, || {
            p.write_scb(ScbReg::Vtor, p.vector_table_base());
            p.write_scb(
                ScbReg::Aircr,
                AIRCR_VECTKEY | (u32::from(self.config.pri_group & 7) << 8),
            );
            p.write_scb(ScbReg::Ccr, self.config.ccr.bits());
            let sh = p.read_scb(ScbReg::Shcsr);
            p.write_scb(
                ScbReg::Shcsr,
                sh | shcsr::MEMFAULTENA
                    | shcsr::BUSFAULTENA
                    | shcsr::USGFAULTENA,
            );
            // SVCs are made with interrupts masked, so SVCall must not be
            // masked along with them.
            p.write_shpr(InterruptNum::SVCALL, self.config.disable_priority.0);
            p.write_shpr(InterruptNum::PENDSV, Priority::LOWEST.0);
            p.barrier();
        });
    }

    /// Boot-time setup: initializes the NVIC and creates the statically
    /// configured objects, in order.
    pub fn startup(&self, statics: &[StaticHwi]) -> Result<(), HwiError> {
        self.init_nvic();
        for s in statics {
            self.create(s.num, s.func, &s.params)?;
        }
        Ok(())
    }

    fn placement(
        &self,
        priority: Priority,
        use_dispatcher: bool,
    ) -> DispatchMode {
        if !use_dispatcher
            || priority.is_more_urgent_than(self.config.disable_priority)
        {
            DispatchMode::Bypassed
        } else {
            DispatchMode::Dispatched
        }
    }

    fn check_num(num: InterruptNum) -> Result<(), HwiError> {
        if num.index() < NUM_INTERRUPTS {
            Ok(())
        } else {
            Err(HwiError::BadIntNum(num))
        }
    }

    fn check_params(params: &HwiParams) -> Result<(), HwiError> {
        match params.mask_setting {
            MaskingOption::Lower => Ok(()),
            other => Err(HwiError::UnsupportedMaskingOption(other)),
        }
    }

    /// Hands a configuration failure to the error sink as well as back to
    /// the caller.
    fn config_error(&self, e: HwiError) -> HwiError {
        self.errors.raise(KernelError::Config(e));
        e
    }

    /// Creates an interrupt object for `num` and places it.
    ///
    /// Nothing is left behind on failure: hooks whose `create` already ran
    /// get `delete` calls in reverse order, and the vector stays unclaimed.
    /// Failures are also raised through the error sink.
    pub fn create(
        &self,
        num: InterruptNum,
        func: HwiFunc,
        params: &HwiParams,
    ) -> Result<HwiHandle, HwiError> {
        self.create_object(num, func, params)
            .map_err(|e| self.config_error(e))
    }

    fn create_object(
        &self,
        num: InterruptNum,
        func: HwiFunc,
        params: &HwiParams,
    ) -> Result<HwiHandle, HwiError> {
        Self::check_num(num)?;
        Self::check_params(params)?;

        let handle = self.critical(|reg| {
            if !reg.vectors.is_claimable(num) || reg.owner_of(num).is_some() {
                return Err(HwiError::AlreadyDefined(num));
            }
            let index = reg
                .objects
                .iter()
                .position(|s| s.obj.is_none())
                .ok_or(HwiError::LimitExceeded)?;
            let slot = &mut reg.objects[index];
            slot.obj = Some(HwiObject {
                num,
                mode: DispatchMode::Dispatched,
                priority: params.priority.unwrap_or(Priority::LOWEST),
                func,
                arg: params.arg,
                irp: 0,
                use_dispatcher: params.use_dispatcher,
                enable_int: params.enable_int,
                slot: VectorSlot::NullIsr,
                hook_env: [0; MAX_HOOKS],
            });
            Ok(HwiHandle::new(index as u16, slot.generation))
        })?;

        let mut env = [0; MAX_HOOKS];
        for (i, hook) in self.hooks.iter().enumerate() {
            match hook.create(handle) {
                Ok(context) => env[i] = context,
                Err(HookError) => {
                    self.unwind_hooks(handle, &env, i);
                    self.critical(|reg| reg.release(handle));
                    return Err(HwiError::HookAllocationFailure(HookId(
                        i as u8,
                    )));
                }
            }
        }
        self.critical(|reg| {
            if let Ok(obj) = reg.object_mut(handle) {
                obj.hook_env = env;
            }
        });

        if let Err(e) = self.post_init(handle) {
            self.unwind_hooks(handle, &env, self.hooks.len());
            self.critical(|reg| reg.release(handle));
            return Err(e);
        }
        Ok(handle)
    }

    /// Calls `delete` on the first `count` hooks, last first.
    fn unwind_hooks(
        &self,
        h: HwiHandle,
        env: &[usize; MAX_HOOKS],
        count: usize,
    ) {
        for i in (0..count).rev() {
            self.hooks[i].delete(h, env[i]);
        }
    }

    /// Chooses bypass or dispatch for a new object, sets its priority,
    /// plugs its vector and enables it if asked to.
    fn post_init(&self, h: HwiHandle) -> Result<(), HwiError> {
        let p = self.nvic.platform();
        self.critical(|reg| {
            let obj = *reg.object(h)?;
            let mode = self.placement(obj.priority, obj.use_dispatcher);
            let slot = match mode {
                DispatchMode::Bypassed => VectorSlot::Bypass(obj.func as usize),
                DispatchMode::Dispatched => reg.router.bind(obj.num, h)?,
            };
            self.nvic.set_priority(obj.num, obj.priority);
            reg.vectors.set(obj.num, slot);
            p.plug_vector(obj.num, slot);
            let o = reg.object_mut(h)?;
            o.mode = mode;
            o.slot = slot;
            trace::record(Trace::Created(obj.num, mode));
            if obj.enable_int {
                self.nvic.enable(obj.num);
            }
            Ok(())
        })?;
        self.nvic.flush();
        Ok(())
    }

    /// Changes an object's handler and parameters.
    ///
    /// The line is disabled for the duration and only re-enabled if
    /// `params.enable_int` is set. The object may move between bypassed and
    /// dispatched if the new priority calls for it. Failures are also raised
    /// through the error sink.
    pub fn reconfigure(
        &self,
        h: HwiHandle,
        func: HwiFunc,
        params: &HwiParams,
    ) -> Result<(), HwiError> {
        self.reconfigure_object(h, func, params)
            .map_err(|e| self.config_error(e))
    }

    fn reconfigure_object(
        &self,
        h: HwiHandle,
        func: HwiFunc,
        params: &HwiParams,
    ) -> Result<(), HwiError> {
        Self::check_params(params)?;
        let priority = params.priority.unwrap_or(Priority::LOWEST);
        let p = self.nvic.platform();
        self.critical(|reg| {
            let obj = *reg.object(h)?;
            let num = obj.num;
            let mode = self.placement(priority, params.use_dispatcher);
            let slot = match (obj.mode, mode) {
                (DispatchMode::Dispatched, DispatchMode::Dispatched) => {
                    obj.slot
                }
                (_, DispatchMode::Dispatched) => reg.router.bind(num, h)?,
                (_, DispatchMode::Bypassed) => {
                    VectorSlot::Bypass(func as usize)
                }
            };

            self.nvic.disable(num);
            if obj.mode == DispatchMode::Dispatched
                && mode == DispatchMode::Bypassed
            {
                reg.router.unbind(num, obj.slot);
            }
            let o = reg.object_mut(h)?;
            o.func = func;
            o.arg = params.arg;
            o.priority = priority;
            o.use_dispatcher = params.use_dispatcher;
            o.enable_int = params.enable_int;
            o.mode = mode;
            o.slot = slot;
            self.nvic.set_priority(num, priority);
            reg.vectors.set(num, slot);
            p.plug_vector(num, slot);
            trace::record(Trace::Reconfigured(num, mode));
            if params.enable_int {
                self.nvic.enable(num);
            }
            Ok(())
        })?;
        self.nvic.flush();
        Ok(())
    }

    /// Destroys an object: disables its line, returns its vector to its
    /// boot-time entry, frees any dispatch record and calls every hook's
    /// `delete`, in registration order.
    pub fn destroy(&self, h: HwiHandle) -> Result<(), HwiError> {
        let p = self.nvic.platform();
        let obj = self.critical(|reg| {
            let obj = *reg.object(h)?;
            self.nvic.disable(obj.num);
            let boot = VectorTable::boot_slot(obj.num);
            reg.vectors.set(obj.num, boot);
            p.plug_vector(obj.num, boot);
            if obj.mode == DispatchMode::Dispatched {
                reg.router.unbind(obj.num, obj.slot);
            }
            reg.release(h);
            trace::record(Trace::Deleted(obj.num));
            Ok::<_, HwiError>(obj)
        })?;
        self.nvic.flush();
        for (i, hook) in self.hooks.iter().enumerate() {
            hook.delete(h, obj.hook_env[i]);
        }
        Ok(())
    }

    /// Points vector `num` straight at `addr` without creating an object.
    ///
    /// The vector must be free, or already plugged this way. Once plugged it
    /// can't be claimed by [`Self::create`]; plugging is permanent.
    pub fn plug(
        &self,
        num: InterruptNum,
        addr: usize,
    ) -> Result<(), HwiError> {
        Self::check_num(num)?;
        let p = self.nvic.platform();
        self.critical(|reg| {
            let free = match reg.vectors.get(num) {
                Some(VectorSlot::Bypass(_)) => reg.owner_of(num).is_none(),
                _ => reg.vectors.is_claimable(num),
            };
            if !free || reg.owner_of(num).is_some() {
                return Err(HwiError::AlreadyDefined(num));
            }
            let slot = VectorSlot::Bypass(addr);
            reg.vectors.set(num, slot);
            p.plug_vector(num, slot);
            trace::record(Trace::Plugged(num));
            Ok(())
        })
    }

    fn read<T>(
        &self,
        h: HwiHandle,
        body: impl FnOnce(&HwiObject) -> T,
    ) -> Result<T, HwiError> {
        self.critical(|reg| reg.object(h).map(body))
    }

    /// Finds the object that owns `num`.
    pub fn handle(&self, num: InterruptNum) -> Option<HwiHandle> {
        self.critical(|reg| reg.owner_of(num))
    }

    pub fn function(&self, h: HwiHandle) -> Result<(HwiFunc, usize), HwiError> {
        self.read(h, |o| (o.func, o.arg))
    }

    /// Replaces the handler and argument. A dispatch in progress keeps the
    /// old pair; the next one sees the new pair.
    pub fn set_function(
        &self,
        h: HwiHandle,
        func: HwiFunc,
        arg: usize,
    ) -> Result<(), HwiError> {
        let p = self.nvic.platform();
        self.critical(|reg| {
            let o = reg.object_mut(h)?;
            o.func = func;
            o.arg = arg;
            if o.mode == DispatchMode::Bypassed {
                let (num, slot) = (o.num, VectorSlot::Bypass(func as usize));
                o.slot = slot;
                reg.vectors.set(num, slot);
                p.plug_vector(num, slot);
            }
            Ok(())
        })
    }

    /// Returns hook `id`'s context for the object. Unknown hook IDs are
    /// reported as an invalid handle.
    pub fn hook_context(
        &self,
        h: HwiHandle,
        id: HookId,
    ) -> Result<usize, HwiError> {
        self.read(h, |o| o.hook_env.get(id.index()).copied())?
            .filter(|_| id.index() < self.hooks.len())
            .ok_or(HwiError::InvalidHandle)
    }

    pub fn set_hook_context(
        &self,
        h: HwiHandle,
        id: HookId,
        context: usize,
    ) -> Result<(), HwiError> {
        if id.index() >= self.hooks.len() {
            return Err(HwiError::InvalidHandle);
        }
        self.critical(|reg| {
            reg.object_mut(h)?.hook_env[id.index()] = context;
            Ok(())
        })
    }

    /// Return address captured by the most recent dispatch of the object.
    pub fn irp(&self, h: HwiHandle) -> Result<usize, HwiError> {
        self.read(h, |o| o.irp)
    }

    pub fn interrupt_number(
        &self,
        h: HwiHandle,
    ) -> Result<InterruptNum, HwiError> {
        self.read(h, |o| o.num)
    }

    pub fn priority(&self, h: HwiHandle) -> Result<Priority, HwiError> {
        self.read(h, |o| o.priority)
    }

    pub fn mode(&self, h: HwiHandle) -> Result<DispatchMode, HwiError> {
        self.read(h, |o| o.mode)
    }

    /// The kernel's record of vector `num`.
    pub fn vector(&self, num: InterruptNum) -> Option<VectorSlot> {
        self.critical(|reg| reg.vectors.get(num))
    }

    /// The object the dispatcher would run for `num`.
    pub fn dispatch_target(&self, num: InterruptNum) -> Option<HwiHandle> {
        self.critical(|reg| {
            let slot = reg.vectors.get(num)?;
            reg.router.resolve(num, slot)
        })
    }

    /// Enables `num`, returning whether it was enabled before.
    pub fn enable_interrupt(
        &self,
        num: InterruptNum,
    ) -> Result<bool, HwiError> {
        Self::check_num(num)?;
        let was = self.nvic.enable(num);
        self.nvic.flush();
        Ok(was)
    }

    /// Disables `num`, returning whether it was enabled before.
    pub fn disable_interrupt(
        &self,
        num: InterruptNum,
    ) -> Result<bool, HwiError> {
        Self::check_num(num)?;
        let was = self.nvic.disable(num);
        self.nvic.flush();
        Ok(was)
    }

    /// Returns `num` to a state reported by `enable_interrupt` or
    /// `disable_interrupt`.
    pub fn restore_interrupt(
        &self,
        num: InterruptNum,
        was_enabled: bool,
    ) -> Result<(), HwiError> {
        Self::check_num(num)?;
        self.nvic.restore(num, was_enabled);
        self.nvic.flush();
        Ok(())
    }

    pub fn clear_interrupt(&self, num: InterruptNum) -> Result<(), HwiError> {
        Self::check_num(num)?;
        self.nvic.clear_pending(num);
        self.nvic.flush();
        Ok(())
    }

    /// Triggers `num` from software.
    pub fn post(&self, num: InterruptNum) -> Result<(), HwiError> {
        Self::check_num(num)?;
        self.nvic.post(num);
        self.nvic.flush();
        Ok(())
    }

    /// Changes the priority of `num`, and of the object that owns it if
    /// there is one. Placement is not revisited.
    pub fn set_priority(
        &self,
        num: InterruptNum,
        priority: Priority,
    ) -> Result<(), HwiError> {
        Self::check_num(num)?;
        self.critical(|reg| {
            if let Some(h) = reg.owner_of(num) {
                if let Ok(o) = reg.object_mut(h) {
                    o.priority = priority;
                }
            }
            self.nvic.set_priority(num, priority);
        });
        self.nvic.flush();
        Ok(())
    }

    pub fn interrupt_status(
        &self,
        num: InterruptNum,
    ) -> Result<IrqStatus, HwiError> {
        Self::check_num(num)?;
        Ok(self.nvic.status(num))
    }

    /// Applies NVIC changes other cores have staged for this one. Call from
    /// the inter-core notification handler.
    pub fn flush_vnvic(&self) -> bool {
        self.nvic.flush()
    }

    /// Masks interrupts the kernel may mask, returning the previous state.
    pub fn disable(&self) -> IrqKey {
        self.nvic.platform().disable_interrupts()
    }

    pub fn enable(&self) {
        self.nvic.platform().enable_interrupts()
    }

    pub fn restore(&self, key: IrqKey) {
        self.nvic.platform().restore_interrupts(key)
    }

    /// What kind of thread the current core is running.
    pub fn thread_type(&self) -> ThreadType {
        let core = self.nvic.platform().core_id();
        self.thread_types
            .get(core.index())
            .map_or(ThreadType::Main, |t| {
                ThreadType::from_u8(t.load(Ordering::Relaxed))
            })
    }

    /// Sets the current core's thread type, returning the old one.
    pub fn set_thread_type(&self, ty: ThreadType) -> ThreadType {
        let core = self.nvic.platform().core_id();
        self.thread_types
            .get(core.index())
            .map_or(ThreadType::Main, |t| {
                ThreadType::from_u8(t.swap(ty as u8, Ordering::Relaxed))
            })
    }
}
