//! Property-based tests for the invoker's completion guarantees
//!
//! Each property runs whole invocations on a fresh virtual-clock loop, so
//! every case is deterministic and instant.

use std::result::Result;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use proptest::prelude::*;
use step_invoker::prelude::*;

type Deliveries = Arc<Mutex<Vec<Result<u64, InvocationError>>>>;

fn recorder() -> (Deliveries, impl FnOnce(Result<u64, InvocationError>) + Send + 'static) {
    let deliveries: Deliveries = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&deliveries);
    (deliveries, move |result: Result<u64, InvocationError>| {
        sink.lock().push(result);
    })
}

fn policy() -> impl Strategy<Value = SchedulingPolicy> {
    prop_oneof![
        Just(SchedulingPolicy::Fifo),
        Just(SchedulingPolicy::Lifo),
        any::<u64>().prop_map(SchedulingPolicy::SeededRandom),
    ]
}

/// A callback-style function that signals once per entry of `delays`,
/// passing the entry's index.
fn signals_at(delays: Vec<u64>) -> UserFunction<u64> {
    UserFunction::new(1, move |call| {
        let done = call.done().expect("callback style");
        for (index, delay) in delays.into_iter().enumerate() {
            let done = done.clone();
            call.event_loop().set_timeout(Duration::from_millis(delay), move || {
                done.ok(index as u64);
                Ok(())
            });
        }
        Ok(Returned::Value(u64::MAX))
    })
}

// =============================================================================
// Direct returns
// =============================================================================

proptest! {
    /// Property: a function declaring exactly its arguments completes inside
    /// `invoke` and never touches the timer queue or the interceptor stack.
    #[test]
    fn direct_return_completes_synchronously(
        arguments in prop::collection::vec(any::<u64>(), 0..6),
        timeout in 0u64..10_000,
    ) {
        let event_loop = EventLoop::new();
        let invoker = Invoker::new(event_loop.clone());
        let (deliveries, on_complete) = recorder();

        let declared = arguments.len();
        let function: UserFunction<u64> = UserFunction::new(declared, |call| {
            Ok(Returned::Value(call.arguments().iter().fold(0u64, |acc, n| acc.wrapping_add(*n))))
        });
        let expected = arguments.iter().fold(0u64, |acc, n| acc.wrapping_add(*n));

        let handle = invoker.invoke(
            InvocationRequest::new(function)
                .with_arguments(arguments)
                .with_timeout_millis(timeout),
            on_complete,
        );

        prop_assert_eq!(deliveries.lock().clone(), vec![Ok(expected)]);
        prop_assert!(handle.completed_immediately());
        prop_assert!(!handle.timer_created());
        prop_assert!(!handle.interceptor_installed());
        prop_assert!(event_loop.is_idle());
    }

    /// Property: declared counts other than `n` or `n + 1` are rejected
    /// before the function runs.
    #[test]
    fn wrong_arity_never_dispatches(supplied in 0usize..5, declared in 0usize..8) {
        prop_assume!(declared != supplied && declared != supplied + 1);

        let invoker = Invoker::new(EventLoop::new());
        let called = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&called);
        let function: UserFunction<u64> = UserFunction::new(declared, move |_| {
            *flag.lock() = true;
            Ok(Returned::Value(0))
        });

        let completion = invoker.run(
            InvocationRequest::new(function).with_arguments(vec![0; supplied]),
        );

        let is_arity_error = matches!(completion.result, Err(InvocationError::InvalidArity { .. }));
        prop_assert!(is_arity_error);
        prop_assert!(!*called.lock());
        prop_assert_eq!(completion.convention(), None);
    }
}

// =============================================================================
// Deferred completion races
// =============================================================================

proptest! {
    /// Property: a single callback signal races the timeout; the earlier one
    /// wins, a tie goes to the signal because its timer was created first.
    #[test]
    fn callback_races_timeout(delay in 0u64..200, timeout in 1u64..200) {
        let event_loop = EventLoop::new();
        let invoker = Invoker::new(event_loop.clone());

        let completion = invoker.run(
            InvocationRequest::new(signals_at(vec![delay])).with_timeout_millis(timeout),
        );

        if delay <= timeout {
            prop_assert_eq!(completion.result, Ok(0));
            prop_assert_eq!(completion.duration, Duration::from_millis(delay));
        } else {
            prop_assert_eq!(completion.result, Err(InvocationError::Timeout { millis: timeout }));
            prop_assert_eq!(completion.duration, Duration::from_millis(timeout));
        }
        prop_assert_eq!(event_loop.interceptor_depth(), 0);
        prop_assert_eq!(completion.invocation.cleanups(), 1);
    }

    /// Property: however many signals fire, exactly one is delivered, the
    /// earliest wins, and every other one is counted as late.
    #[test]
    fn exactly_one_delivery(
        delays in prop::collection::vec(0u64..100, 1..8),
        policy in policy(),
    ) {
        let event_loop = EventLoop::with_config(
            MockClock::new(),
            EventLoopConfig::new().with_policy(policy),
        );
        let invoker = Invoker::new(event_loop.clone());
        let (deliveries, on_complete) = recorder();

        let earliest = delays
            .iter()
            .enumerate()
            .min_by_key(|(index, delay)| (**delay, *index))
            .map(|(index, _)| index as u64);
        let signals = delays.len();

        let handle = invoker.invoke(InvocationRequest::new(signals_at(delays)), on_complete);
        event_loop.run_until_idle().unwrap();

        prop_assert_eq!(deliveries.lock().clone(), vec![Ok(earliest.unwrap())]);
        prop_assert_eq!(handle.late_signals(), signals - 1);
        prop_assert_eq!(handle.cleanups(), 1);
        prop_assert_eq!(event_loop.interceptor_depth(), 0);
    }

    /// Property: with a zero or absent timeout no timer is ever created.
    #[test]
    fn no_timer_without_timeout(delay in 0u64..500, explicit_zero in any::<bool>()) {
        let event_loop = EventLoop::new();
        let invoker = Invoker::new(event_loop.clone());

        let mut request = InvocationRequest::new(signals_at(vec![delay]));
        if explicit_zero {
            request = request.with_timeout_millis(0);
        }
        let completion = invoker.run(request);

        prop_assert_eq!(completion.result, Ok(0));
        prop_assert!(!completion.invocation.timer_created());
        prop_assert!(event_loop.is_idle());
    }

    /// Property: a fault raised by deferred work competes with the callback
    /// under any job order; exactly one outcome is delivered and the loop
    /// ends clean.
    #[test]
    fn fault_and_signal_race(policy in policy(), fault_first in any::<bool>()) {
        let event_loop = EventLoop::with_config(
            MockClock::new(),
            EventLoopConfig::new().with_policy(policy),
        );
        let invoker = Invoker::new(event_loop.clone());
        let (deliveries, on_complete) = recorder();

        let function: UserFunction<u64> = UserFunction::new(1, move |call| {
            let done = call.done().expect("callback style");
            let signal = move || {
                done.ok(1);
                Ok(())
            };
            let fault = || Err(Fault::new("deferred failure"));
            if fault_first {
                call.event_loop().defer(fault);
                call.event_loop().defer(signal);
            } else {
                call.event_loop().defer(signal);
                call.event_loop().defer(fault);
            }
            Ok(Returned::Value(0))
        });

        let handle = invoker.invoke(InvocationRequest::new(function).with_timeout_millis(10), on_complete);
        event_loop.run_until_idle().unwrap();

        let deliveries = deliveries.lock().clone();
        prop_assert_eq!(deliveries.len(), 1);
        let delivered_fault = deliveries[0].is_err();
        // the losing fault finds no interceptor and is recorded as uncaught
        prop_assert_eq!(event_loop.uncaught().len(), usize::from(!delivered_fault));
        prop_assert_eq!(handle.late_signals(), usize::from(delivered_fault));
        prop_assert!(event_loop.is_idle());
        prop_assert_eq!(event_loop.now(), Duration::ZERO);
    }
}
