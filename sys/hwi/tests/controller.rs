// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Interrupt object lifecycle and dispatch, driven through the public API
//! against the in-memory platform.

use std::cell::{Cell, RefCell};

use abi::{DispatchMode, InterruptNum, Priority};
use hwi::arch::fake::FakePlatform;
use hwi::arch::Platform;
use hwi::config::NUM_INTERRUPTS;
use hwi::dispatch::NoScheduler;
use hwi::err::IgnoreErrors;
use hwi::hook::{HookError, InterruptHook};
use hwi::nvic::Nvic;
use hwi::vector::{DenseRouter, VectorSlot, VectorTable};
use hwi::{HwiConfig, HwiHandle, HwiParams, InterruptController};
use proptest::prelude::*;

type Ctl =
    InterruptController<'static, Nvic<&'static FakePlatform>, DenseRouter>;

fn leak<T: Default>() -> &'static T {
    Box::leak(Box::default())
}

fn controller(
    p: &'static FakePlatform,
    hooks: &[&'static dyn InterruptHook],
) -> &'static Ctl {
    Box::leak(Box::new(
        InterruptController::new(
            HwiConfig::DEFAULT,
            Nvic::new(p),
            DenseRouter::new(),
            &NoScheduler,
            &IgnoreErrors,
            hooks,
        )
        .unwrap(),
    ))
}

fn at(priority: u8) -> HwiParams {
    HwiParams {
        priority: Some(Priority(priority)),
        ..HwiParams::default()
    }
}

fn nop(_: usize) {}

#[test]
fn dispatched_and_bypassed_placement() {
    fn uart_isr(_: usize) {}
    fn fast_isr(_: usize) {}

    let p = leak::<FakePlatform>();
    let c = controller(p, &[]);
    let uart = c.create(InterruptNum(20), uart_isr, &at(128)).unwrap();
    let fast = c.create(InterruptNum(5), fast_isr, &at(10)).unwrap();

    assert_eq!(c.mode(uart), Ok(DispatchMode::Dispatched));
    assert_eq!(p.plugged(InterruptNum(20)), VectorSlot::Dispatcher);
    assert_eq!(c.dispatch_target(InterruptNum(20)), Some(uart));

    assert_eq!(c.mode(fast), Ok(DispatchMode::Bypassed));
    assert_eq!(
        p.plugged(InterruptNum(5)),
        VectorSlot::Bypass(fast_isr as usize)
    );
    assert_eq!(c.dispatch_target(InterruptNum(5)), None);
}

thread_local! {
    static CTL: Cell<Option<&'static Ctl>> = const { Cell::new(None) };
    static PLATFORM: Cell<Option<&'static FakePlatform>> =
        const { Cell::new(None) };
    static LOG: RefCell<Vec<(&'static str, usize)>> =
        const { RefCell::new(Vec::new()) };
}

fn log(event: &'static str, n: usize) {
    LOG.with(|l| l.borrow_mut().push((event, n)));
}

#[derive(Default)]
struct Tracer;

impl InterruptHook for Tracer {
    fn create(&self, hwi: HwiHandle) -> Result<usize, HookError> {
        Ok(hwi.index())
    }
    fn begin(&self, _hwi: HwiHandle, context: usize) {
        log("begin", context);
    }
    fn end(&self, _hwi: HwiHandle, context: usize) {
        log("end", context);
    }
}

/// Models the hardware taking vector `num` from wherever we are now.
fn take_interrupt(num: InterruptNum) {
    let c = CTL.with(Cell::get).unwrap();
    let p = PLATFORM.with(Cell::get).unwrap();
    let outer = p.active_vector();
    let key = p.disable_interrupts();
    p.set_active_vector(num);
    let keys = c.dispatch(0x0800_0000 + usize::from(num.0));
    c.finish_dispatch(keys);
    p.set_active_vector(outer);
    p.restore_interrupts(key);
}

fn low_isr(arg: usize) {
    log("low start", arg);
    take_interrupt(InterruptNum(21));
    log("low done", arg);
}

fn high_isr(arg: usize) {
    log("high", arg);
}

#[test]
fn nested_dispatch_brackets_like_a_stack() {
    let p = leak::<FakePlatform>();
    let tracer = leak::<Tracer>();
    let c = controller(p, &[tracer]);
    CTL.with(|x| x.set(Some(c)));
    PLATFORM.with(|x| x.set(Some(p)));

    let low = c
        .create(InterruptNum(20), low_isr, &HwiParams { arg: 20, ..at(200) })
        .unwrap();
    let high = c
        .create(InterruptNum(21), high_isr, &HwiParams { arg: 21, ..at(64) })
        .unwrap();

    take_interrupt(InterruptNum(20));

    let (l, h) = (low.index(), high.index());
    assert_eq!(
        LOG.with(|x| x.borrow().clone()),
        vec![
            ("begin", l),
            ("low start", 20),
            ("begin", h),
            ("high", 21),
            ("end", h),
            ("low done", 20),
            ("end", l),
        ]
    );
    assert_eq!(c.irp(low), Ok(0x0800_0014));
    assert_eq!(c.irp(high), Ok(0x0800_0015));
    assert!(!p.is_masked());
}

#[test]
fn masking_options_other_than_lower_fail() {
    let p = leak::<FakePlatform>();
    let c = controller(p, &[]);
    let params = HwiParams {
        mask_setting: abi::MaskingOption::SelfOnly,
        ..at(100)
    };
    assert!(c.create(InterruptNum(40), nop, &params).is_err());
    assert_eq!(c.handle(InterruptNum(40)), None);
}

fn claimable() -> impl Strategy<Value = u16> {
    2..NUM_INTERRUPTS as u16
}

proptest! {
    #[test]
    fn create_then_destroy_restores_the_vector(
        num in claimable(),
        priority in any::<u8>(),
        use_dispatcher in any::<bool>(),
    ) {
        let p = leak::<FakePlatform>();
        let c = controller(p, &[]);
        let num = InterruptNum(num);
        let before = c.vector(num);
        let h = c
            .create(num, nop, &HwiParams { use_dispatcher, ..at(priority) })
            .unwrap();
        c.destroy(h).unwrap();
        prop_assert_eq!(c.vector(num), before);
        prop_assert_eq!(c.vector(num), Some(VectorTable::boot_slot(num)));
        prop_assert_eq!(p.plugged(num), VectorTable::boot_slot(num));
        prop_assert_eq!(c.dispatch_target(num), None);
        prop_assert_eq!(c.handle(num), None);
    }

    #[test]
    fn placement_follows_the_cutoff(
        num in 16..NUM_INTERRUPTS as u16,
        priority in any::<u8>(),
    ) {
        let p = leak::<FakePlatform>();
        let c = controller(p, &[]);
        let num = InterruptNum(num);
        let h = c.create(num, nop, &at(priority)).unwrap();
        if priority < HwiConfig::DEFAULT.disable_priority.0 {
            prop_assert_eq!(c.mode(h), Ok(DispatchMode::Bypassed));
            prop_assert_eq!(
                c.vector(num),
                Some(VectorSlot::Bypass(nop as usize))
            );
        } else {
            prop_assert_eq!(c.mode(h), Ok(DispatchMode::Dispatched));
            prop_assert_eq!(c.dispatch_target(num), Some(h));
        }
    }

    #[test]
    fn second_create_changes_nothing(
        num in claimable(),
        first in any::<u8>(),
        second in any::<u8>(),
    ) {
        fn other(_: usize) {}
        let p = leak::<FakePlatform>();
        let c = controller(p, &[]);
        let num = InterruptNum(num);
        let h = c.create(num, nop, &at(first)).unwrap();
        let vector = c.vector(num);
        prop_assert_eq!(
            c.create(num, other, &at(second)),
            Err(hwi::HwiError::AlreadyDefined(num))
        );
        prop_assert_eq!(c.vector(num), vector);
        prop_assert_eq!(c.priority(h), Ok(Priority(first)));
        prop_assert_eq!(
            c.function(h).map(|(f, _)| f as usize),
            Ok(nop as usize)
        );
    }
}
