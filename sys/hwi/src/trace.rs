// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Payload for the crate's trace ring buffer, and the one place that writes
//! to it.

use abi::{CoreId, DispatchMode, InterruptNum, ThreadType};

use crate::err::Fault;
use crate::hwi::HwiHandle;

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Trace {
    None,
    Created(InterruptNum, DispatchMode),
    Reconfigured(InterruptNum, DispatchMode),
    Deleted(InterruptNum),
    Plugged(InterruptNum),
    Begin {
        hwi: HwiHandle,
        func: usize,
        pre_thread: ThreadType,
        num: InterruptNum,
        irp: usize,
    },
    End {
        hwi: HwiHandle,
    },
    FlushRequested(CoreId),
    Flushed(CoreId),
    Exception(Fault),
    StackOverflow {
        base: usize,
    },
}

static RECORDING: spin::Mutex<()> = spin::Mutex::new(());

/// Appends `entry` to the trace buffer.
///
/// The ring buffer panics if it is borrowed twice, which could otherwise
/// happen when a fault or a second core races an entry in progress. Such
/// entries are dropped instead.
pub(crate) fn record(entry: Trace) {
    if let Some(_guard) = RECORDING.try_lock() {
        ringbuf::ringbuf_entry_root!(entry);
    }
}
