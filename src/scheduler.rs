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

//! The per-test core: one lock, one condvar, and everything the coroutines
//! share behind them.
//!
//! The mutex doubles as the scheduling token. `State.running` names the
//! single active coroutine; every suspension point hands the token to a
//! successor (directly, or by letting `pick_next` choose) and then waits on
//! the condvar until the token comes back. Memory ordering across a switch
//! falls out of the mutex.

use std::any::Any;
use std::panic;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use slab::Slab;

use crate::coroutine::{CoroRecord, ExitKind, LifeState, Role, WaitKind};
use crate::error::{panic_message, render_report, Failure, ForcedUnwind, Poison};
use crate::events::{EventBus, EventTag, Payload, Queued};
use crate::launch::{LaunchRecord, SessionState};
use crate::mock::{CallRecord, CallState, ObjectId, Signature};
use crate::registry::{CallFilter, CallView, Entry, HostExpectation, Registry};
use crate::{CallId, CoroId};

pub(crate) struct State {
    /// Id of the coroutine holding the scheduling token.
    pub running: CoroId,
    /// Id of the top-level test coroutine.
    pub root: CoroId,
    /// Preferred successor for the next relinquish, set by dispatch offers,
    /// returns and completions.
    pub hint: Option<CoroId>,
    pub winding_down: bool,
    deadlock_reported: bool,
    pub coros: Slab<CoroRecord>,
    pub calls: Slab<CallRecord>,
    pub launches: Slab<LaunchRecord>,
    pub bus: EventBus,
    pub registry: Registry,
    pub failures: Vec<Failure>,
    pub objects: Vec<String>,
}

pub(crate) struct Core {
    state: Mutex<State>,
    cond: Condvar,
}

/// Drop the lock, then fail the test right here with a precise message.
pub(crate) fn programming_error(guard: MutexGuard<'_, State>, msg: String) -> ! {
    drop(guard);
    error!("{}", msg);
    panic!("{}", msg);
}

fn wait_ready(g: &State, wait: &WaitKind, owner: CoroId) -> bool {
    match *wait {
        WaitKind::Event(tag) => g.bus.has_match(owner, tag),
        WaitKind::CallReturn(call) => {
            g.calls[call].return_slot.is_some()
                || matches!(g.calls[call].state, CallState::Finished)
        }
        WaitKind::ChildStart(child) => {
            g.coros[child].has_blocked || matches!(g.coros[child].state, LifeState::Exited)
        }
    }
}

fn is_runnable(g: &State, id: CoroId) -> bool {
    let c = &g.coros[id];
    match &c.state {
        LifeState::Ready => true,
        LifeState::Running | LifeState::Exited => false,
        LifeState::Blocked(wait) => c.poison.is_some() || wait_ready(g, wait, id),
    }
}

/// Choose who runs next: the hinted coroutine if it can run, otherwise the
/// lowest-id runnable one. Deterministic by construction.
fn pick_next(g: &mut State) -> Option<CoroId> {
    if let Some(hinted) = g.hint.take() {
        if is_runnable(g, hinted) {
            return Some(hinted);
        }
    }
    let ids: Vec<CoroId> = g.coros.iter().map(|(id, _)| id).collect();
    ids.into_iter().find(|&id| is_runnable(g, id))
}

fn describe_wait(g: &State, wait: &WaitKind) -> String {
    match *wait {
        WaitKind::Event(EventTag::Any) => "waiting for any event".to_string(),
        WaitKind::Event(EventTag::Call) => "waiting for a mock call".to_string(),
        WaitKind::Event(EventTag::AnyResult) => "waiting for any of its launches".to_string(),
        WaitKind::Event(EventTag::ResultOf(l)) => {
            format!("waiting for the result of launch #{}", l)
        }
        WaitKind::CallReturn(call) => {
            format!("waiting for {} to be returned", g.calls[call].label())
        }
        WaitKind::ChildStart(child) => {
            format!("waiting for '{}' to block or exit", g.coros[child].name)
        }
    }
}

impl Core {
    pub(crate) fn new_arc() -> Arc<Core> {
        Arc::new(Core {
            state: Mutex::new(State {
                running: 0,
                root: 0,
                hint: None,
                winding_down: false,
                deadlock_reported: false,
                coros: Slab::new(),
                calls: Slab::new(),
                launches: Slab::new(),
                bus: EventBus::new(),
                registry: Registry::new(),
                failures: Vec::new(),
                objects: Vec::new(),
            }),
            cond: Condvar::new(),
        })
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub(crate) fn register_root(&self, name: &str) -> CoroId {
        let mut g = self.lock();
        let id = g.coros.insert(CoroRecord::new(name.to_string(), Role::Test));
        g.coros[id].state = LifeState::Running;
        g.running = id;
        g.root = id;
        id
    }

    pub(crate) fn register_object(&self, name: &str) -> ObjectId {
        let mut g = self.lock();
        g.objects.push(name.to_string());
        g.objects.len() - 1
    }

    // ---------- baton passing ----------

    /// Park until the scheduling token names `me`, then mark `me` running.
    pub(crate) fn wait_for_baton<'a>(
        &self,
        mut g: MutexGuard<'a, State>,
        me: CoroId,
    ) -> MutexGuard<'a, State> {
        while g.running != me {
            g = match self.cond.wait(g) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
        g.coros[me].state = LifeState::Running;
        g
    }

    /// Hand the token to a named successor and park.
    pub(crate) fn switch_to<'a>(
        &self,
        mut g: MutexGuard<'a, State>,
        me: CoroId,
        target: CoroId,
    ) -> MutexGuard<'a, State> {
        trace!("baton: {} -> {}", me, target);
        g.running = target;
        self.cond.notify_all();
        self.wait_for_baton(g, me)
    }

    /// Let the scheduler choose a successor and park. The caller must have
    /// moved itself to a `Blocked` state first.
    pub(crate) fn reschedule<'a>(
        &self,
        mut g: MutexGuard<'a, State>,
        me: CoroId,
    ) -> MutexGuard<'a, State> {
        match pick_next(&mut g) {
            Some(next) => {
                if next != me {
                    trace!("baton: {} -> {}", me, next);
                    g.running = next;
                    self.cond.notify_all();
                }
            }
            None => {
                // Nobody can run: the test is stuck. Report once, poison
                // every live context so the whole tree unwinds, starting
                // with the caller (the token stays with it).
                self.report_deadlock(&mut g);
            }
        }
        self.wait_for_baton(g, me)
    }

    /// Resume-side poison check; every suspension point calls this right
    /// after getting the token back.
    pub(crate) fn check_poison<'a>(
        &self,
        g: MutexGuard<'a, State>,
        me: CoroId,
    ) -> MutexGuard<'a, State> {
        match g.coros[me].poison.clone() {
            None => g,
            Some(Poison::Teardown) => {
                drop(g);
                panic::panic_any(ForcedUnwind);
            }
            Some(Poison::Fault(msg)) => {
                drop(g);
                panic::panic_any(msg);
            }
        }
    }

    fn report_deadlock(&self, g: &mut State) {
        if !g.deadlock_reported {
            g.deadlock_reported = true;
            let ids: Vec<CoroId> = g.coros.iter().map(|(id, _)| id).collect();
            let mut waiting = Vec::new();
            for id in ids {
                if let LifeState::Blocked(wait) = &g.coros[id].state {
                    waiting.push(format!("'{}' is {}", g.coros[id].name, describe_wait(g, wait)));
                }
            }
            error!("no runnable coroutine left; the test cannot make progress");
            g.failures.push(Failure::Deadlock { waiting });
        }
        // Poison unconditionally so whoever hit the wall unwinds instead of
        // spinning on an unsatisfiable wait.
        for (_, c) in g.coros.iter_mut() {
            if !matches!(c.state, LifeState::Exited) && c.poison.is_none() {
                c.poison = Some(Poison::Teardown);
            }
        }
    }

    // ---------- mock-call dispatch ----------

    /// Entry point for the CUT: create the call record, walk the handler
    /// chain, then block until someone fills the return slot.
    pub(crate) fn dispatch_call(
        &self,
        object: ObjectId,
        object_name: &str,
        method: &'static str,
        signature: Signature,
        args: Arc<dyn Any + Send + Sync>,
        args_repr: String,
    ) -> Box<dyn Any + Send> {
        let mut g = self.lock();
        let me = g.running;
        let session = match g.coros[me].role {
            Role::Launch(session) => session,
            Role::Test => {
                let msg = format!(
                    "mock call {}.{} issued directly from test coroutine '{}'; \
                     mock calls must come out of a launched invocation",
                    object_name, method, g.coros[me].name
                );
                programming_error(g, msg);
            }
        };
        let id = g.calls.insert(CallRecord {
            object,
            object_name: object_name.to_string(),
            method,
            issuer: me,
            session,
            signature,
            args,
            args_repr,
            cursor: u64::MAX,
            state: CallState::Dispatching,
            return_slot: None,
        });
        debug!("'{}' issued {}", g.coros[me].name, g.calls[id].label());
        self.drive_dispatch(&mut g, id);
        g.coros[me].state = LifeState::Blocked(WaitKind::CallReturn(id));
        g.coros[me].has_blocked = true;
        let g = self.reschedule(g, me);
        let mut g = self.check_poison(g, me);
        let value = g.calls[id]
            .return_slot
            .take()
            .expect("the issuer only resumes once the return slot is filled");
        g.calls[id].state = CallState::Finished;
        value
    }

    /// Walk the handler chain from the call's cursor downwards until a watch
    /// takes the offer, a host expectation answers, or the chain runs out.
    fn drive_dispatch(&self, g: &mut State, call: CallId) {
        enum Kind {
            Watch { owner: CoroId },
            Host,
        }
        loop {
            let cursor = g.calls[call].cursor;
            let idx = match g.registry.next_below(cursor) {
                Some(idx) => idx,
                None => {
                    let label = g.calls[call].label();
                    warn!("nothing consumed {}", label);
                    let issuer = g.calls[call].issuer;
                    g.failures.push(Failure::UnmatchedCall { call: label.clone() });
                    if g.coros[issuer].poison.is_none() {
                        g.coros[issuer].poison =
                            Some(Poison::Fault(format!("unmatched mock call {}", label)));
                    }
                    g.calls[call].state = CallState::Finished;
                    return;
                }
            };
            let (priority, kind) = match &g.registry.entries[idx] {
                Entry::Watch(w) => (w.priority, Kind::Watch { owner: w.owner }),
                Entry::Host(h) => (h.priority, Kind::Host),
            };
            g.calls[call].cursor = priority;
            match kind {
                Kind::Watch { owner } => {
                    if g.coros[owner].retired {
                        continue;
                    }
                    let matched = match &g.registry.entries[idx] {
                        Entry::Watch(w) => w.filter.matches(&g.calls[call]),
                        Entry::Host(_) => unreachable!(),
                    };
                    if !matched {
                        continue;
                    }
                    if matches!(g.coros[owner].state, LifeState::Exited) {
                        // The watch still matches but its owner is gone.
                        if !g.coros[owner].oversaturation_reported {
                            g.coros[owner].oversaturation_reported = true;
                            let label = g.calls[call].label();
                            let name = g.coros[owner].name.clone();
                            warn!("'{}' is oversaturated by {}", name, label);
                            g.failures
                                .push(Failure::Oversaturated { coroutine: name, call: label });
                        }
                        continue;
                    }
                    debug!("offering {} to '{}'", g.calls[call].label(), g.coros[owner].name);
                    g.calls[call].state = CallState::Offered;
                    g.bus.offer_call(owner, call);
                    g.hint = Some(owner);
                    return;
                }
                Kind::Host => {
                    let handled = match &mut g.registry.entries[idx] {
                        Entry::Host(h) => {
                            let view = CallView { record: &g.calls[call] };
                            if h.expectation.matches(&view) {
                                h.expectation.handle(&view)
                            } else {
                                None
                            }
                        }
                        Entry::Watch(_) => unreachable!(),
                    };
                    if let Some(value) = handled {
                        debug!("a host expectation answered {}", g.calls[call].label());
                        let issuer = g.calls[call].issuer;
                        g.calls[call].return_slot = Some(value);
                        g.calls[call].state = CallState::ReturnReady;
                        g.hint = Some(issuer);
                        return;
                    }
                }
            }
        }
    }

    // ---------- the wait primitive and call dispositions ----------

    /// Take a matching queued event or block until one arrives. The sole
    /// primitive under every `wait_for_*`.
    pub(crate) fn next_event_raw(&self, tag: EventTag) -> Queued {
        let mut g = self.lock();
        let me = g.running;
        if let Some(held) = g.coros[me].undisposed {
            let msg = format!(
                "'{}' waited for another event while {} is still undisposed",
                g.coros[me].name,
                g.calls[held].label()
            );
            programming_error(g, msg);
        }
        loop {
            if let Some(event) = g.bus.take(me, tag) {
                match event.payload {
                    Payload::Call(call) => {
                        g.calls[call].state = CallState::Held { owner: me, accepted: false };
                        g.coros[me].undisposed = Some(call);
                        debug!("'{}' took {}", g.coros[me].name, g.calls[call].label());
                    }
                    Payload::Completion(launch) => {
                        g.launches[launch].state = SessionState::Collected;
                        debug!("'{}' collected launch #{}", g.coros[me].name, launch);
                    }
                }
                return event;
            }
            trace!("'{}' blocks on {:?}", g.coros[me].name, tag);
            g.coros[me].state = LifeState::Blocked(WaitKind::Event(tag));
            g.coros[me].has_blocked = true;
            g = self.reschedule(g, me);
            g = self.check_poison(g, me);
        }
    }

    pub(crate) fn accept_call(&self, call: CallId) {
        let mut g = self.lock();
        let me = g.running;
        match g.calls[call].state {
            CallState::Held { owner, .. } if owner == me => {}
            _ => {
                let msg = format!(
                    "'{}' accepted {} without holding it",
                    g.coros[me].name,
                    g.calls[call].label()
                );
                programming_error(g, msg);
            }
        }
        g.calls[call].state = CallState::Held { owner: me, accepted: true };
        g.coros[me].undisposed = None;
        trace!("'{}' accepted {}", g.coros[me].name, g.calls[call].label());
    }

    /// Drop the call back into dispatch: the walk resumes strictly below the
    /// watch that steered it here.
    pub(crate) fn reject_call(&self, call: CallId) {
        let mut g = self.lock();
        let me = g.running;
        match g.calls[call].state {
            CallState::Held { owner, accepted: false } if owner == me => {}
            CallState::Held { accepted: true, .. } => {
                let msg = format!(
                    "'{}' dropped {} after accepting it",
                    g.coros[me].name,
                    g.calls[call].label()
                );
                programming_error(g, msg);
            }
            _ => {
                let msg = format!(
                    "'{}' dropped {} without holding it",
                    g.coros[me].name,
                    g.calls[call].label()
                );
                programming_error(g, msg);
            }
        }
        g.coros[me].undisposed = None;
        g.calls[call].state = CallState::Dispatching;
        debug!("'{}' dropped {}; dispatch continues", g.coros[me].name, g.calls[call].label());
        self.drive_dispatch(&mut g, call);
    }

    /// Fill the return slot. Implies accept. The issuer becomes runnable and
    /// is preferred at the next relinquish.
    pub(crate) fn return_call(
        &self,
        call: CallId,
        value: Box<dyn Any + Send>,
        value_ty: std::any::TypeId,
        value_ty_name: &'static str,
    ) {
        let mut g = self.lock();
        let me = g.running;
        if let Some(held) = g.coros[me].undisposed {
            if held != call {
                let msg = format!(
                    "'{}' returned {} while {} is still undisposed",
                    g.coros[me].name,
                    g.calls[call].label(),
                    g.calls[held].label()
                );
                programming_error(g, msg);
            }
        }
        match g.calls[call].state {
            CallState::Held { owner, .. } if owner == me => {}
            _ => {
                let msg = format!(
                    "'{}' returned {} without holding it",
                    g.coros[me].name,
                    g.calls[call].label()
                );
                programming_error(g, msg);
            }
        }
        if g.calls[call].signature.ret_id != value_ty {
            let msg = format!(
                "{} returns {}, but a {} was supplied",
                g.calls[call].label(),
                g.calls[call].signature.ret_name,
                value_ty_name
            );
            programming_error(g, msg);
        }
        g.coros[me].undisposed = None;
        let issuer = g.calls[call].issuer;
        g.calls[call].return_slot = Some(value);
        g.calls[call].state = CallState::ReturnReady;
        g.hint = Some(issuer);
        debug!("'{}' returned {}", g.coros[me].name, g.calls[call].label());
    }

    // ---------- registry plumbing ----------

    pub(crate) fn add_watch_for(&self, owner: CoroId, filter: CallFilter) {
        let mut g = self.lock();
        if !matches!(g.coros[owner].role, Role::Test) {
            let msg = format!(
                "watches belong to test coroutines; '{}' runs a launched invocation",
                g.coros[owner].name
            );
            programming_error(g, msg);
        }
        let description = filter.describe();
        let priority = g.registry.add_watch(owner, filter);
        debug!("'{}' watches {} at priority {}", g.coros[owner].name, description, priority);
    }

    pub(crate) fn add_host(&self, expectation: Box<dyn HostExpectation>) {
        let mut g = self.lock();
        let description = expectation.describe();
        let priority = g.registry.add_host(expectation);
        debug!("{} enters the chain at priority {}", description, priority);
    }

    // ---------- context exit and teardown ----------

    /// Final bookkeeping for a coroutine leaving its body, and the baton
    /// hand-off that lets the rest of the test continue. The thread dies
    /// right after.
    pub(crate) fn exit_context(&self, mut g: MutexGuard<'_, State>, me: CoroId, kind: ExitKind) {
        let role = g.coros[me].role;
        match kind {
            ExitKind::Normal => {
                if let Some(held) = g.coros[me].undisposed.take() {
                    let name = g.coros[me].name.clone();
                    let label = g.calls[held].label();
                    g.failures.push(Failure::ServerRule { coroutine: name, call: label });
                }
                g.coros[me].satisfied = true;
                debug!("'{}' exited", g.coros[me].name);
                if let Role::Launch(launch) = role {
                    g.launches[launch].state = SessionState::Completed;
                    let owner = g.launches[launch].owner;
                    g.bus.offer_completion(owner, launch);
                    g.hint = Some(owner);
                }
            }
            ExitKind::Panicked(payload) => match role {
                Role::Launch(launch) => {
                    // The CUT threw: park the payload in the session so the
                    // collecting coroutine re-raises it.
                    warn!(
                        "launch coroutine '{}' panicked: {}",
                        g.coros[me].name,
                        panic_message(&*payload)
                    );
                    g.coros[me].satisfied = true;
                    g.launches[launch].result = Some(Err(payload));
                    g.launches[launch].state = SessionState::Completed;
                    let owner = g.launches[launch].owner;
                    g.bus.offer_completion(owner, launch);
                    g.hint = Some(owner);
                }
                Role::Test => {
                    let name = g.coros[me].name.clone();
                    let message = panic_message(&*payload).to_string();
                    error!("'{}' panicked: {}", name, message);
                    g.coros[me].satisfied = true;
                    g.failures.push(Failure::CoroutinePanicked { coroutine: name, message });
                }
            },
            ExitKind::Forced => {
                trace!("'{}' unwound during teardown", g.coros[me].name);
            }
        }
        g.coros[me].state = LifeState::Exited;
        g.coros[me].has_blocked = true;
        match pick_next(&mut g) {
            Some(next) => {
                trace!("baton: {} -> {} (exit)", me, next);
                g.running = next;
                self.cond.notify_all();
            }
            None => {
                if !g.winding_down {
                    self.report_deadlock(&mut g);
                }
                match pick_next(&mut g) {
                    Some(next) => {
                        g.running = next;
                        self.cond.notify_all();
                    }
                    None => {
                        let root = g.root;
                        g.running = root;
                        self.cond.notify_all();
                    }
                }
            }
        }
        drop(g);
    }

    /// Teardown after the top-level test body has left: cardinality
    /// accounting, forced unwind of every live context, thread joins, host
    /// verification, and the final aggregated report.
    pub(crate) fn finish(&self, root: CoroId, outcome: Result<(), Box<dyn Any + Send>>) {
        {
            let mut g = self.lock();
            debug_assert_eq!(g.running, root);
            match outcome {
                Ok(()) => {}
                Err(payload) => {
                    if payload.is::<crate::error::ExitToken>() {
                        // Early exit of the test body counts as a return.
                    } else if payload.is::<ForcedUnwind>() {
                        // Teardown unwind after a recorded failure.
                    } else {
                        let name = g.coros[root].name.clone();
                        let message = panic_message(&*payload).to_string();
                        g.failures.push(Failure::CoroutinePanicked { coroutine: name, message });
                    }
                }
            }
            if let Some(held) = g.coros[root].undisposed.take() {
                let name = g.coros[root].name.clone();
                let label = g.calls[held].label();
                g.failures.push(Failure::ServerRule { coroutine: name, call: label });
            }
            g.coros[root].satisfied = true;
            g.coros[root].state = LifeState::Exited;
            // Cardinality is judged on the state the test actually reached,
            // before teardown forces anything.
            let ids: Vec<CoroId> = g.coros.iter().map(|(id, _)| id).collect();
            for id in ids {
                let c = &g.coros[id];
                if matches!(c.role, Role::Test)
                    && !matches!(c.state, LifeState::Exited)
                    && !c.satisfied
                {
                    let name = c.name.clone();
                    g.failures.push(Failure::Unsatisfied { coroutine: name });
                }
            }
            g.winding_down = true;
        }
        // Force-unwind whatever is still alive, one resume at a time. Each
        // context hands the baton onward as it dies and the last hand-off
        // comes back here.
        loop {
            let mut g = self.lock();
            let target = g
                .coros
                .iter()
                .find(|(id, c)| *id != root && !matches!(c.state, LifeState::Exited))
                .map(|(id, _)| id);
            let target = match target {
                Some(target) => target,
                None => break,
            };
            for (_, c) in g.coros.iter_mut() {
                if !matches!(c.state, LifeState::Exited) && c.poison.is_none() {
                    c.poison = Some(Poison::Teardown);
                }
            }
            debug!("unwinding '{}'", g.coros[target].name);
            g.running = target;
            self.cond.notify_all();
            while g.running != root {
                g = match self.cond.wait(g) {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
            }
        }
        let joins: Vec<_> = {
            let mut g = self.lock();
            g.coros.iter_mut().filter_map(|(_, c)| c.join.take()).collect()
        };
        for join in joins {
            let _ = join.join();
        }
        let mut g = self.lock();
        let uncollected: Vec<String> = g
            .launches
            .iter()
            .filter(|(_, l)| l.state != SessionState::Collected)
            .map(|(id, l)| {
                let coro = g.coros.get(l.coro).map(|c| c.name.as_str()).unwrap_or("?");
                format!("launch #{} ('{}', owned by '{}')", id, coro, g.coros[l.owner].name)
            })
            .collect();
        for launch in uncollected {
            g.failures.push(Failure::UncollectedLaunch { launch });
        }
        let verify_errors: Vec<String> = g
            .registry
            .entries
            .iter()
            .filter_map(|entry| match entry {
                Entry::Host(h) => h.expectation.verify().err(),
                Entry::Watch(_) => None,
            })
            .collect();
        for message in verify_errors {
            g.failures.push(Failure::Expectation { message });
        }
        if !g.failures.is_empty() {
            let report = render_report(&g.failures);
            drop(g);
            error!("{}", report);
            panic!("{}", report);
        }
    }
}
