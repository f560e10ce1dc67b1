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

//! The coroutine substrate: one OS thread per context, gated by the core's
//! scheduling token so exactly one runs at a time.
//!
//! A context spends its whole life inside `context_main`: wait for the first
//! resume, run the body, classify how the body left, hand the baton onward.
//! Spawning switches directly to the child and the spawner blocks until the
//! child has blocked or exited for the first time, which is what makes
//! freshly declared coroutines immediately eligible for upcoming calls.

use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use crate::coroutine::{CoroRecord, ExitKind, LifeState, Role, WaitKind};
use crate::error::{ExitToken, ForcedUnwind};
use crate::scheduler::Core;
use crate::CoroId;

pub(crate) type ContextBody = Box<dyn FnOnce(CoroId) + Send + 'static>;

/// Erase the borrow lifetime of a context body so it can cross onto the
/// context's thread.
///
/// Safety: the core force-unwinds and joins every context before `run`
/// returns, so whatever the body borrowed outlives the thread that uses it.
/// Single-active-coroutine scheduling rules out concurrent access.
pub(crate) unsafe fn erase_body<'env>(
    body: Box<dyn FnOnce(CoroId) + Send + 'env>,
) -> ContextBody {
    mem::transmute(body)
}

/// Create a context, run it until it first blocks or exits, and return its
/// id to the (by then resumed) spawner.
pub(crate) fn spawn_context(
    core: &Arc<Core>,
    name: Option<String>,
    role: Role,
    stack_size: Option<usize>,
    body: ContextBody,
) -> CoroId {
    let mut g = core.lock();
    let me = g.running;
    let id = g.coros.insert(CoroRecord::new(String::new(), role));
    let name = name.unwrap_or_else(|| format!("coroutine-{}", id));
    g.coros[id].name = name.clone();
    debug!("'{}' spawns '{}' ({})", g.coros[me].name, name, id);
    let thread_core = core.clone();
    let mut builder = thread::Builder::new().name(name);
    if let Some(size) = stack_size {
        builder = builder.stack_size(size);
    }
    let join = builder
        .spawn(move || context_main(thread_core, id, body))
        .expect("failed to spawn a coroutine thread");
    g.coros[id].join = Some(join);
    g.coros[me].state = LifeState::Blocked(WaitKind::ChildStart(id));
    g.coros[me].has_blocked = true;
    let g = core.switch_to(g, me, id);
    let g = core.check_poison(g, me);
    drop(g);
    id
}

fn context_main(core: Arc<Core>, me: CoroId, body: ContextBody) {
    {
        let g = core.lock();
        let g = core.wait_for_baton(g, me);
        // Poisoned before ever running: the test tore down first.
        if g.coros[me].poison.is_some() {
            core.exit_context(g, me, ExitKind::Forced);
            return;
        }
        drop(g);
    }
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| body(me)));
    let g = core.lock();
    match outcome {
        Ok(()) => core.exit_context(g, me, ExitKind::Normal),
        Err(payload) => {
            if payload.is::<ExitToken>() {
                core.exit_context(g, me, ExitKind::Normal);
            } else if payload.is::<ForcedUnwind>() {
                core.exit_context(g, me, ExitKind::Forced);
            } else {
                core.exit_context(g, me, ExitKind::Panicked(payload));
            }
        }
    }
}
