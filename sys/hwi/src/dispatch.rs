// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Dispatcher bottom half.
//!
//! Every dispatched vector points at one assembly entry point, which saves
//! the caller-saved registers, masks interrupts and calls
//! [`InterruptController::dispatch`]. That works out which object owns the
//! active vector and runs its handler bracketed by the module hooks. The
//! keys it returns go to [`InterruptController::finish_dispatch`] on the way
//! out, which is where the task scheduler may switch context.

use abi::ThreadType;

use crate::arch::Platform;
use crate::err::Fault;
use crate::exc::ExcFrame;
use crate::hwi::InterruptController;
use crate::nvic::NvicOps;
use crate::trace::{self, Trace};
use crate::vector::VectorRouter;

/// The task and software-interrupt schedulers, as far as the dispatcher is
/// concerned.
///
/// `*_disable` stop the scheduler from acting on new work and return a key;
/// `*_restore_hwi` take the key back and may run whatever became ready,
/// including switching tasks. Both restores are called with interrupts
/// masked.
pub trait KernelScheduler {
    fn task_disable(&self) -> u32;
    fn task_restore_hwi(&self, key: u32);
    fn swi_disable(&self) -> u32;
    fn swi_restore_hwi(&self, key: u32);
}

impl<T: KernelScheduler + ?Sized> KernelScheduler for &T {
    fn task_disable(&self) -> u32 {
        (**self).task_disable()
    }
    fn task_restore_hwi(&self, key: u32) {
        (**self).task_restore_hwi(key)
    }
    fn swi_disable(&self) -> u32 {
        (**self).swi_disable()
    }
    fn swi_restore_hwi(&self, key: u32) {
        (**self).swi_restore_hwi(key)
    }
}

/// For kernels without a task or software-interrupt scheduler.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoScheduler;

impl KernelScheduler for NoScheduler {
    fn task_disable(&self) -> u32 {
        0
    }
    fn task_restore_hwi(&self, _key: u32) {}
    fn swi_disable(&self) -> u32 {
        0
    }
    fn swi_restore_hwi(&self, _key: u32) {}
}

/// Scheduler keys held across a dispatch. `None` when the corresponding
/// scheduler support is configured out.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[must_use]
pub struct DispatchKeys {
    pub task: Option<u32>,
    pub swi: Option<u32>,
}

impl<M: NvicOps, R: VectorRouter> InterruptController<'_, M, R> {
    /// Runs the handler for the active vector.
    ///
    /// Must be entered with interrupts masked; returns with them masked.
    /// `irp` is the interrupted program counter, kept on the object for
    /// diagnostics.
    ///
    /// A vector that resolves to no object is reported as a no-ISR fault.
    pub fn dispatch(&self, irp: usize) -> DispatchKeys {
        let keys = DispatchKeys {
            task: self
                .config
                .task_support
                .then(|| self.scheduler.task_disable()),
            swi: self.config.swi_support.then(|| self.scheduler.swi_disable()),
        };

        let p = self.nvic.platform();
        let num = p.active_vector();
        let target = self.critical(|reg| {
            let slot = reg.vectors.get(num)?;
            let h = reg.router.resolve(num, slot)?;
            let obj = reg.object_mut(h).ok()?;
            obj.irp = irp;
            Some((h, obj.func, obj.arg, obj.hook_env))
        });
        let Some((h, func, arg, env)) = target else {
            let frame = ExcFrame {
                pc: irp as u32,
                ..ExcFrame::default()
            };
            self.raise_fault(
                Fault::NoIsr {
                    id: num.0,
                    pc: irp as u32,
                },
                &frame,
            );
            return keys;
        };

        let pre_thread = self.set_thread_type(ThreadType::Hwi);
        trace::record(Trace::Begin {
            hwi: h,
            func: func as usize,
            pre_thread,
            num,
            irp,
        });

        for (hook, &context) in self.hooks.iter().zip(&env) {
            hook.begin(h, context);
        }

        if self.config.auto_nesting {
            p.enable_interrupts();
            func(arg);
            let _ = p.disable_interrupts();
        } else {
            func(arg);
        }

        // The handler may have changed hook contexts, or destroyed its own
        // object.
        let env =
            self.critical(|reg| reg.object(h).map_or(env, |o| o.hook_env));
        for (hook, &context) in self.hooks.iter().zip(&env) {
            hook.end(h, context);
        }

        trace::record(Trace::End { hwi: h });
        self.set_thread_type(pre_thread);
        keys
    }

    /// Exit path: hands the keys back to the software-interrupt scheduler
    /// and then to the task scheduler. Returns with interrupts masked.
    pub fn finish_dispatch(&self, keys: DispatchKeys) {
        if let Some(key) = keys.swi {
            self.scheduler.swi_restore_hwi(key);
        }
        if let Some(key) = keys.task {
            self.scheduler.task_restore_hwi(key);
        }
    }
}
