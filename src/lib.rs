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

//! # Cotest
//!
//! Write a mock-driven test as one linear coroutine: launch the
//! code-under-test, wait for the mock calls it issues, answer each one, and
//! collect the result, all in the order the test author wants to assert.
//!
//! Coroutines run on OS threads but cooperate through a single scheduling
//! token, so exactly one is ever active and the interleaving is fully
//! deterministic.
//!
//! ```
//! use cotest::{CallFilter, Mock, MockTarget, ObjectId};
//!
//! struct MockLamp {
//!     mock: Mock,
//! }
//!
//! impl MockLamp {
//!     fn set_level(&self, level: u32) {
//!         self.mock.call::<(u32,), ()>("SetLevel", (level,))
//!     }
//! }
//!
//! impl MockTarget for MockLamp {
//!     fn object_id(&self) -> ObjectId { self.mock.object_id() }
//!     fn object_name(&self) -> &str { self.mock.object_name() }
//! }
//!
//! fn dim(lamp: &MockLamp) {
//!     lamp.set_level(3);
//! }
//!
//! cotest::run(|co| {
//!     let lamp = MockLamp { mock: Mock::new(co, "lamp") };
//!     co.watch_call();
//!     let session = co.launch(|| dim(&lamp));
//!     let call = co.wait_for_call(CallFilter::method(&lamp, "SetLevel"));
//!     assert_eq!(call.args::<(u32,)>(), Some((3,)));
//!     call.ret(());
//!     co.wait_for_result_from(&session);
//! });
//! ```

#[macro_use]
extern crate log;

pub use builder::Builder;
pub use coroutine::{Coro, CoroutineHandle, PendingEvent, PendingKind};
pub use handles::{CallCheck, CallEvent, Event, ReturnCheck, TupleArg, TypedCall};
pub use launch::{Completion, Launch};
pub use mock::{ExpectationBuilder, Mock, MockTarget, ObjectId};
pub use options::Options;
pub use registry::{CallFilter, CallView, HostExpectation};

mod builder;
mod coroutine;
mod error;
mod events;
mod handles;
mod launch;
mod mock;
mod options;
mod registry;
mod scheduler;
mod substrate;

#[cfg(test)]
mod tests;

pub(crate) type CoroId = usize;
pub(crate) type CallId = usize;
pub(crate) type LaunchId = usize;

use std::panic::{self, AssertUnwindSafe};

/// Run a test body as the top-level test coroutine.
///
/// The body's scope handle drives everything: launching the code-under-test,
/// declaring watches, waiting for events. When the body returns, every
/// remaining coroutine is unwound and joined, cardinality and expectations
/// are verified, and any accumulated failure is reported in one panic.
pub fn run<F: FnOnce(&Coro)>(body: F) {
    run_named("main", body)
}

/// `run` with a name for the top-level coroutine, for logs and reports.
pub fn run_named<F: FnOnce(&Coro)>(name: &str, body: F) {
    let core = scheduler::Core::new_arc();
    let root = core.register_root(name);
    let scope = Coro::new(core.clone(), root);
    debug!("test coroutine '{}' starts", name);
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| body(&scope)));
    core.finish(root, outcome);
}
