// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Hardware interrupt management for Cortex-M kernels.
//!
//! This crate owns the vector table and the NVIC on behalf of the kernel. It
//! provides
//!
//! - a registry of interrupt objects, each binding one interrupt line to a
//!   handler function, created at boot or dynamically;
//! - a direct NVIC driver for single-core parts, and a "virtual" NVIC for
//!   dual-core parts that stages register writes and lets each core commit
//!   only the lines it owns;
//! - the bottom half of the interrupt dispatcher, which runs module hooks,
//!   coordinates with the task and software-interrupt schedulers, and
//!   optionally lets higher-priority interrupts nest;
//! - decoding of the architectural fault exceptions into a single classified
//!   error; and
//! - a sentinel-filled interrupt stack with high-water-mark reporting.
//!
//! Everything hangs off an explicit [`InterruptController`], which the
//! kernel constructs once during boot. There is no module-global registry.
//!
//! The register file is reached through the [`arch::Platform`] trait. On a
//! bare-metal Arm target that's the real hardware; everywhere else it's
//! [`arch::fake::FakePlatform`], an in-memory model used by the tests.

#![cfg_attr(target_os = "none", no_std)]

pub mod arch;
pub mod config;
pub mod dispatch;
pub mod err;
pub mod exc;
pub mod hook;
pub mod hwi;
pub mod nvic;
pub mod stack;
pub mod trace;
pub mod vector;
pub mod vnvic;

pub use crate::config::HwiConfig;
pub use crate::err::{ErrorSink, Fault, HwiError, KernelError};
pub use crate::hwi::{HwiFunc, HwiHandle, HwiParams, InterruptController};

ringbuf::ringbuf!(trace::Trace, 64, trace::Trace::None);
