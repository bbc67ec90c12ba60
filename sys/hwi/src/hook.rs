// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Module hooks.
//!
//! Other kernel modules (loggers, load monitors) can watch interrupt
//! objects come and go and bracket each dispatched handler. Each hook gets
//! one `usize` of context per interrupt object, which it sets up in
//! `create` and gets back in the other callbacks.
//!
//! Hooks run in registration order, for `begin` and `end` alike. Bypassed
//! interrupts never run hooks.

use crate::hwi::HwiHandle;

/// Maximum number of hooks a controller accepts.
pub const MAX_HOOKS: usize = 4;

/// Position of a hook in registration order.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct HookId(pub u8);

impl HookId {
    pub fn index(self) -> usize {
        usize::from(self.0)
    }
}

/// Returned by [`InterruptHook::create`] to refuse an interrupt object.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct HookError;

pub trait InterruptHook {
    /// Called once, when the controller is built, with this hook's ID.
    fn register(&self, _id: HookId) {}

    /// Called for each new interrupt object. Returns the hook's initial
    /// context for it. An error aborts the object's creation.
    fn create(&self, _hwi: HwiHandle) -> Result<usize, HookError> {
        Ok(0)
    }

    /// Called before a dispatched handler runs.
    fn begin(&self, _hwi: HwiHandle, _context: usize) {}

    /// Called after a dispatched handler returns.
    fn end(&self, _hwi: HwiHandle, _context: usize) {}

    /// Called when the object is destroyed, or when a later hook's `create`
    /// failed.
    fn delete(&self, _hwi: HwiHandle, _context: usize) {}
}

impl<T: InterruptHook + ?Sized> InterruptHook for &T {
    fn register(&self, id: HookId) {
        (**self).register(id)
    }
    fn create(&self, hwi: HwiHandle) -> Result<usize, HookError> {
        (**self).create(hwi)
    }
    fn begin(&self, hwi: HwiHandle, context: usize) {
        (**self).begin(hwi, context)
    }
    fn end(&self, hwi: HwiHandle, context: usize) {
        (**self).end(hwi, context)
    }
    fn delete(&self, hwi: HwiHandle, context: usize) {
        (**self).delete(hwi, context)
    }
}
