//! The single synchronous call into user code.

use std::panic::{self, AssertUnwindSafe};

use crate::error::Fault;
use crate::invoker::request::{Body, Call, Returned};

/// Runs `body` once. A panic unwinding out of it becomes a [`Fault`], the
/// same as a returned `Err`.
pub(crate) fn dispatch<T, W>(body: Body<T, W>, call: Call<T, W>) -> Result<Returned<T>, Fault> {
    match panic::catch_unwind(AssertUnwindSafe(move || body(call))) {
        Ok(returned) => returned,
        Err(payload) => Err(Fault::from_panic(payload)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_loop::EventLoop;

    fn call() -> Call<u32> {
        Call::new(vec![4], None, None, EventLoop::new())
    }

    #[test]
    fn test_returned_value_passes_through() {
        let body: Body<u32, ()> = Box::new(|call| Ok(Returned::Value(call.arguments()[0] * 2)));
        match dispatch(body, call()) {
            Ok(Returned::Value(v)) => assert_eq!(v, 8),
            other => panic!("unexpected dispatch result: {other:?}"),
        }
    }

    #[test]
    fn test_err_passes_through() {
        let body: Body<u32, ()> = Box::new(|_| Err(Fault::new("bad argument")));
        let fault = dispatch(body, call()).unwrap_err();
        assert_eq!(fault.message(), "bad argument");
        assert!(!fault.is_panic());
    }

    #[test]
    fn test_panic_becomes_fault() {
        let body: Body<u32, ()> = Box::new(|_| panic!("step exploded"));
        let fault = dispatch(body, call()).unwrap_err();
        assert_eq!(fault.message(), "step exploded");
        assert!(fault.is_panic());
    }
}
