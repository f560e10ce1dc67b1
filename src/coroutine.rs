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

//! Per-coroutine state and the scope object test code drives everything
//! through.

use std::any::{type_name, Any, TypeId};
use std::panic;
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::error::{ExitToken, Poison};
use crate::events::{EventTag, Payload};
use crate::handles::{Event, CallEvent, TypedCall};
use crate::launch::{collect_value, Completion, Launch, LaunchRecord};
use crate::mock::MockTarget;
use crate::options::Options;
use crate::registry::CallFilter;
use crate::scheduler::{programming_error, Core};
use crate::substrate;
use crate::{CallId, CoroId, LaunchId};

#[derive(Debug, Clone, Copy)]
pub(crate) enum Role {
    /// Written by the test author; issues launches and consumes events.
    Test,
    /// Runs one invocation of the code-under-test.
    Launch(LaunchId),
}

#[derive(Debug)]
pub(crate) enum LifeState {
    /// Created, never scheduled.
    Ready,
    Running,
    Blocked(WaitKind),
    Exited,
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum WaitKind {
    /// Inside the wait primitive.
    Event(EventTag),
    /// A launch coroutine waiting for its mock call to come back.
    CallReturn(CallId),
    /// A spawner waiting for its child's initial activity to end.
    ChildStart(CoroId),
}

pub(crate) enum ExitKind {
    Normal,
    Forced,
    Panicked(Box<dyn Any + Send>),
}

pub(crate) struct CoroRecord {
    pub name: String,
    pub role: Role,
    pub state: LifeState,
    pub satisfied: bool,
    pub retired: bool,
    pub oversaturation_reported: bool,
    pub poison: Option<Poison>,
    /// Set the first time this context relinquishes the token; spawners
    /// block on it.
    pub has_blocked: bool,
    /// The call taken by `next_event` and not yet accepted, dropped or
    /// returned.
    pub undisposed: Option<CallId>,
    pub join: Option<JoinHandle<()>>,
}

impl CoroRecord {
    pub(crate) fn new(name: String, role: Role) -> CoroRecord {
        CoroRecord {
            name,
            role,
            state: LifeState::Ready,
            satisfied: false,
            retired: false,
            oversaturation_reported: false,
            poison: None,
            has_blocked: false,
            undisposed: None,
            join: None,
        }
    }
}

/// Head of a coroutine's pending event queue, as seen by `peek_event`.
#[derive(Debug, Clone)]
pub struct PendingEvent {
    pub kind: PendingKind,
    pub label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingKind {
    MockCall,
    LaunchCompleted,
}

/// Handle to a spawned test coroutine.
pub struct CoroutineHandle {
    pub(crate) id: CoroId,
    name: String,
}

impl CoroutineHandle {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// The scope a coroutine body receives: every operation of the framework is
/// a method on it. It is bound to one coroutine; using it while another
/// coroutine holds the token is a programming error.
pub struct Coro {
    pub(crate) core: Arc<Core>,
    pub(crate) id: CoroId,
}

impl Coro {
    pub(crate) fn new(core: Arc<Core>, id: CoroId) -> Coro {
        Coro { core, id }
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, crate::scheduler::State> {
        let g = self.core.lock();
        if g.running != self.id {
            let msg = format!(
                "scope of '{}' used while '{}' holds the token",
                g.coros[self.id].name, g.coros[g.running].name
            );
            programming_error(g, msg);
        }
        g
    }

    // ---------- launching the code-under-test ----------

    /// Evaluate `f` (one invocation of the code-under-test) in its own
    /// coroutine. Returns once that coroutine first blocks, typically on its
    /// first mock call, or exits.
    ///
    /// Anything `f` borrows must stay alive until the session is collected;
    /// the framework force-joins every coroutine before `run` returns.
    pub fn launch<'env, T, F>(&self, f: F) -> Launch<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'env,
    {
        let launch_id = {
            let mut g = self.guard();
            if !matches!(g.coros[self.id].role, Role::Test) {
                let msg = format!(
                    "'{}' runs a launched invocation and cannot launch",
                    g.coros[self.id].name
                );
                programming_error(g, msg);
            }
            if let Some(held) = g.coros[self.id].undisposed {
                let msg = format!(
                    "'{}' launched while {} is still undisposed",
                    g.coros[self.id].name,
                    g.calls[held].label()
                );
                programming_error(g, msg);
            }
            g.launches.insert(LaunchRecord::new(self.id))
        };
        let core = self.core.clone();
        let body: Box<dyn FnOnce(CoroId) + Send + 'env> = Box::new(move |_| {
            let value = f();
            let mut g = core.lock();
            g.launches[launch_id].result = Some(Ok(Box::new(value)));
        });
        let body = unsafe { substrate::erase_body(body) };
        let coro = substrate::spawn_context(
            &self.core,
            Some(format!("launch-{}", launch_id)),
            Role::Launch(launch_id),
            None,
            body,
        );
        self.core.lock().launches[launch_id].coro = coro;
        Launch::new(self.core.clone(), launch_id)
    }

    /// Spawn an additional test coroutine with default options. The new
    /// coroutine runs immediately until it first blocks or exits, so watches
    /// it declares up front apply to everything launched afterwards.
    pub fn spawn<'env, F>(&self, f: F) -> CoroutineHandle
    where
        F: FnOnce(&Coro) + Send + 'env,
    {
        spawn_impl(self, Options::default(), f)
    }

    // ---------- collecting launch results ----------

    /// Wait for the completion of any launch owned by this coroutine.
    pub fn wait_for_result(&self) -> Completion {
        drop(self.guard());
        let event = self.core.next_event_raw(EventTag::AnyResult);
        let launch = match event.payload {
            Payload::Completion(launch) => launch,
            Payload::Call(_) => unreachable!("tag admits completions only"),
        };
        Completion { core: self.core.clone(), launch }
    }

    /// Wait for one specific launch and hand back its typed result. A panic
    /// that unwound the code-under-test is re-raised here.
    pub fn wait_for_result_from<T: Send + 'static>(&self, launch: &Launch<T>) -> T {
        {
            let g = self.guard();
            let owner = g.launches[launch.id].owner;
            if owner != self.id {
                let msg = format!(
                    "'{}' tried to collect launch #{} owned by '{}'",
                    g.coros[self.id].name, launch.id, g.coros[owner].name
                );
                programming_error(g, msg);
            }
        }
        let _event = self.core.next_event_raw(EventTag::ResultOf(launch.id));
        collect_value(&self.core, launch.id)
    }

    // ---------- watches ----------

    /// Watch every mock call, steering them into this coroutine's inbox.
    pub fn watch_call(&self) {
        self.watch(CallFilter::any());
    }

    /// Watch calls matching `filter`.
    pub fn watch(&self, filter: CallFilter) {
        drop(self.guard());
        self.core.add_watch_for(self.id, filter);
    }

    /// Declare a watch owned by another coroutine.
    pub fn watch_on(&self, owner: &CoroutineHandle, filter: CallFilter) {
        drop(self.guard());
        self.core.add_watch_for(owner.id, filter);
    }

    // ---------- waiting for calls ----------

    /// Wait for a mock call matching `filter`; anything else this coroutine
    /// sees in the meantime is dropped back into dispatch.
    pub fn wait_for_call(&self, filter: CallFilter) -> CallEvent {
        self.wait_call_inner(filter, None)
    }

    /// Like `wait_for_call`, additionally constrained to calls issued by
    /// `from`.
    pub fn wait_for_call_from<T>(&self, filter: CallFilter, from: &Launch<T>) -> CallEvent {
        self.wait_call_inner(filter, Some(from.id))
    }

    fn wait_call_inner(&self, filter: CallFilter, origin: Option<LaunchId>) -> CallEvent {
        drop(self.guard());
        loop {
            let event = self.core.next_event_raw(EventTag::Call);
            let call = match event.payload {
                Payload::Call(call) => call,
                Payload::Completion(_) => unreachable!("tag admits calls only"),
            };
            let matched = {
                let g = self.core.lock();
                let record = &g.calls[call];
                filter.matches(record) && origin.map_or(true, |l| record.session == l)
            };
            if matched {
                self.core.accept_call(call);
                return CallEvent::new(self.core.clone(), call);
            }
            self.core.reject_call(call);
        }
    }

    /// Wait for `method` on `object` with the signature known at compile
    /// time, enabling typed argument access and a typed return.
    pub fn wait_typed<A, R>(&self, object: &impl MockTarget, method: &'static str) -> TypedCall<A, R>
    where
        A: 'static,
        R: Send + 'static,
    {
        self.wait_typed_inner(object.object_id(), method, None)
    }

    /// `wait_typed` constrained to calls issued by `from`.
    pub fn wait_typed_from<A, R, T>(
        &self,
        object: &impl MockTarget,
        method: &'static str,
        from: &Launch<T>,
    ) -> TypedCall<A, R>
    where
        A: 'static,
        R: Send + 'static,
    {
        self.wait_typed_inner(object.object_id(), method, Some(from.id))
    }

    fn wait_typed_inner<A, R>(
        &self,
        object: crate::mock::ObjectId,
        method: &'static str,
        origin: Option<LaunchId>,
    ) -> TypedCall<A, R>
    where
        A: 'static,
        R: Send + 'static,
    {
        drop(self.guard());
        loop {
            let event = self.core.next_event_raw(EventTag::Call);
            let call = match event.payload {
                Payload::Call(call) => call,
                Payload::Completion(_) => unreachable!("tag admits calls only"),
            };
            let matched = {
                let g = self.core.lock();
                let record = &g.calls[call];
                if record.object == object
                    && record.method == method
                    && origin.map_or(true, |l| record.session == l)
                {
                    if record.signature.args_id != TypeId::of::<A>()
                        || record.signature.ret_id != TypeId::of::<R>()
                    {
                        let msg = format!(
                            "{} has signature {} -> {}, not {} -> {}",
                            record.label(),
                            record.signature.args_name,
                            record.signature.ret_name,
                            type_name::<A>(),
                            type_name::<R>()
                        );
                        programming_error(g, msg);
                    }
                    true
                } else {
                    false
                }
            };
            if matched {
                self.core.accept_call(call);
                return TypedCall::new(self.core.clone(), call);
            }
            self.core.reject_call(call);
        }
    }

    // ---------- the server-style primitive ----------

    /// Take the next event targeted at this coroutine, of either kind. A
    /// returned mock call is undisposed until accepted, dropped or returned.
    pub fn next_event(&self) -> Event {
        drop(self.guard());
        let event = self.core.next_event_raw(EventTag::Any);
        Event::new(self.core.clone(), &event)
    }

    /// Non-destructive look at the head of this coroutine's event queue.
    pub fn peek_event(&self) -> Option<PendingEvent> {
        let g = self.guard();
        g.bus.peek(self.id).map(|q| match q.payload {
            Payload::Call(call) => PendingEvent {
                kind: PendingKind::MockCall,
                label: g.calls[call].label(),
            },
            Payload::Completion(launch) => PendingEvent {
                kind: PendingKind::LaunchCompleted,
                label: format!("launch #{}", launch),
            },
        })
    }

    // ---------- cardinality controls ----------

    /// Mark this coroutine satisfied ahead of its exit, so the test may end
    /// while it is still waiting.
    pub fn satisfy(&self) {
        let mut g = self.guard();
        g.coros[self.id].satisfied = true;
        debug!("'{}' marked itself satisfied", g.coros[self.id].name);
    }

    /// Withdraw this coroutine from dispatch: its watches stop matching and
    /// no call can oversaturate it.
    pub fn retire(&self) {
        let mut g = self.guard();
        g.coros[self.id].retired = true;
        debug!("'{}' retired", g.coros[self.id].name);
    }

    /// Leave the coroutine body right here; counts as a normal exit.
    pub fn exit_coroutine(&self) -> ! {
        drop(self.guard());
        panic::panic_any(ExitToken);
    }
}

pub(crate) fn spawn_impl<'env, F>(co: &Coro, opts: Options, f: F) -> CoroutineHandle
where
    F: FnOnce(&Coro) + Send + 'env,
{
    {
        let g = co.guard();
        if !matches!(g.coros[co.id].role, Role::Test) {
            let msg = format!(
                "'{}' runs a launched invocation and cannot spawn coroutines",
                g.coros[co.id].name
            );
            programming_error(g, msg);
        }
    }
    let core = co.core.clone();
    let body: Box<dyn FnOnce(CoroId) + Send + 'env> = Box::new(move |id| {
        let scope = Coro::new(core, id);
        f(&scope);
    });
    let body = unsafe { substrate::erase_body(body) };
    let id = substrate::spawn_context(&co.core, opts.name, Role::Test, opts.stack_size, body);
    let name = co.core.lock().coros[id].name.clone();
    CoroutineHandle { id, name }
}
