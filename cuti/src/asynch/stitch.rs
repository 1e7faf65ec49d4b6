//! Stitching (spec §4.3 "Stitch (sequencing)"): runs a fixed sequence of
//! async steps, forwarding each step's success value as an input to the
//! next, short-circuiting the whole chain on the first failure.

use super::result::Continuation;
use crate::error::Result as CutiResult;

/// Runs `step1`, then on success runs `step2` with `step1`'s value,
/// delivering `step2`'s outcome to `final_cont`. Either step's failure
/// propagates straight to `final_cont`, bypassing the other step.
pub fn stitch2<A, B>(
    step1: impl FnOnce(Continuation<A>),
    step2: impl FnOnce(A, Continuation<B>) + 'static,
    final_cont: Continuation<B>,
) where
    A: 'static,
    B: 'static,
{
    step1(Box::new(move |outcome: CutiResult<A>| match outcome {
        Ok(a) => step2(a, final_cont),
        Err(e) => final_cont(Err(e)),
    }));
}

/// Three-stage variant, used by e.g. "write opening brace, write each
/// field, write closing brace" chains in the structure writer.
pub fn stitch3<A, B, C>(
    step1: impl FnOnce(Continuation<A>),
    step2: impl FnOnce(A, Continuation<B>) + 'static,
    step3: impl FnOnce(B, Continuation<C>) + 'static,
    final_cont: Continuation<C>,
) where
    A: 'static,
    B: 'static,
    C: 'static,
{
    stitch2(
        step1,
        move |a, cont_b: Continuation<B>| step2(a, cont_b),
        Box::new(move |outcome: CutiResult<B>| match outcome {
            Ok(b) => step3(b, final_cont),
            Err(e) => final_cont(Err(e)),
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn chains_two_successful_steps() {
        let result = Rc::new(RefCell::new(None));
        let r = result.clone();
        stitch2(
            |cont: Continuation<u32>| cont(Ok(1)),
            |a, cont: Continuation<u32>| cont(Ok(a + 41)),
            Box::new(move |outcome| *r.borrow_mut() = Some(outcome)),
        );
        assert_eq!(result.borrow().as_ref().unwrap().as_ref().unwrap(), &42);
    }

    #[test]
    fn first_failure_short_circuits_the_second_step() {
        let result = Rc::new(RefCell::new(None));
        let r = result.clone();
        let second_ran = Rc::new(RefCell::new(false));
        let second_ran_clone = second_ran.clone();
        stitch2(
            |cont: Continuation<u32>| cont(Err(crate::error::Error::protocol("boom"))),
            move |a: u32, cont: Continuation<u32>| {
                *second_ran_clone.borrow_mut() = true;
                cont(Ok(a))
            },
            Box::new(move |outcome| *r.borrow_mut() = Some(outcome)),
        );
        assert!(result.borrow().as_ref().unwrap().is_err());
        assert!(!*second_ran.borrow());
    }
}
