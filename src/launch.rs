// The MIT License (MIT)

// Copyright (c) 2026 Cotest Developers

// Permission is hereby granted, free of charge, to any person obtaining a copy of
// this software and associated documentation files (the "Software"), to deal in
// the Software without restriction, including without limitation the rights to
// use, copy, modify, merge, publish, distribute, sublicense, and/or sell copies of
// the Software, and to permit persons to whom the Software is furnished to do so,
// subject to the following conditions:

// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.

// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS
// FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR
// COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER
// IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN
// CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

//! Launch sessions: one invocation of the code-under-test running in its own
//! coroutine, its captured result, and the typed handles used to collect it.

use std::any::Any;
use std::marker::PhantomData;
use std::panic;
use std::sync::Arc;

use crate::scheduler::{programming_error, Core};
use crate::{CoroId, LaunchId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionState {
    Running,
    Completed,
    Collected,
}

pub(crate) struct LaunchRecord {
    /// Test coroutine that issued the launch and may collect it.
    pub owner: CoroId,
    /// Coroutine the CUT invocation runs in.
    pub coro: CoroId,
    pub state: SessionState,
    /// `Ok` carries the boxed return value, `Err` the CUT's panic payload.
    pub result: Option<Result<Box<dyn Any + Send>, Box<dyn Any + Send>>>,
}

impl LaunchRecord {
    pub(crate) fn new(owner: CoroId) -> LaunchRecord {
        LaunchRecord { owner, coro: usize::MAX, state: SessionState::Running, result: None }
    }
}

/// Handle to a launch session, parameterized over the CUT expression's
/// result type so collection comes back typed.
pub struct Launch<T> {
    pub(crate) core: Arc<Core>,
    pub(crate) id: LaunchId,
    _result: PhantomData<fn() -> T>,
}

impl<T> Launch<T> {
    pub(crate) fn new(core: Arc<Core>, id: LaunchId) -> Launch<T> {
        Launch { core, id, _result: PhantomData }
    }
}

impl<T> Clone for Launch<T> {
    fn clone(&self) -> Launch<T> {
        Launch { core: self.core.clone(), id: self.id, _result: PhantomData }
    }
}

/// A collected launch completion of unknown origin, as returned by
/// `Coro::wait_for_result`. Identifying it against a launch handle recovers
/// the typed result.
pub struct Completion {
    pub(crate) core: Arc<Core>,
    pub(crate) launch: LaunchId,
}

impl Completion {
    /// Whether this completion belongs to `launch`.
    pub fn of<T>(&self, launch: &Launch<T>) -> bool {
        self.launch == launch.id
    }

    /// Extract the result, re-raising the CUT's panic if it had one.
    pub fn value<T: Send + 'static>(&self, launch: &Launch<T>) -> T {
        if self.launch != launch.id {
            panic!(
                "completion of launch #{} read through the handle of launch #{}",
                self.launch, launch.id
            );
        }
        collect_value(&self.core, self.launch)
    }
}

/// Take the stored result out of a collected session. Exactly one taker:
/// a second attempt is a programming error.
pub(crate) fn collect_value<T: 'static>(core: &Arc<Core>, launch: LaunchId) -> T {
    let mut g = core.lock();
    let result = match g.launches[launch].result.take() {
        Some(result) => result,
        None => {
            let msg = format!("the result of launch #{} was already taken", launch);
            programming_error(g, msg);
        }
    };
    drop(g);
    match result {
        Ok(value) => match value.downcast::<T>() {
            Ok(boxed) => *boxed,
            Err(_) => unreachable!("launch handles carry the result type"),
        },
        Err(payload) => panic::resume_unwind(payload),
    }
}
