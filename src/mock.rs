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

//! The mock side of the house: the object handle CUT-facing mocks call
//! through, signature descriptors for typed argument and return handling,
//! and a small built-in expectation layer that plugs into the dispatch chain
//! below the watches.

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::sync::Arc;

use crate::registry::{CallView, HostExpectation};
use crate::scheduler::Core;
use crate::{Coro, CoroId, LaunchId};

/// Identity of a registered mock object.
pub type ObjectId = usize;

/// Anything call filters and checkers can name as a call target.
pub trait MockTarget {
    fn object_id(&self) -> ObjectId;
    fn object_name(&self) -> &str;
}

/// Runtime witness of a mock method's signature: the argument tuple type and
/// the return type, by `TypeId` plus a readable name for diagnostics.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Signature {
    pub args_id: TypeId,
    pub ret_id: TypeId,
    pub args_name: &'static str,
    pub ret_name: &'static str,
}

impl Signature {
    pub(crate) fn of<A: 'static, R: 'static>() -> Signature {
        Signature {
            args_id: TypeId::of::<A>(),
            ret_id: TypeId::of::<R>(),
            args_name: type_name::<A>(),
            ret_name: type_name::<R>(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CallState {
    /// Walking the handler chain.
    Dispatching,
    /// Queued in a coroutine's inbox.
    Offered,
    /// Pulled out by `next_event`; `accepted` once the owner committed to it.
    Held { owner: CoroId, accepted: bool },
    /// Return slot filled, issuer not yet resumed.
    ReturnReady,
    Finished,
}

/// One mock call in flight, owned by the scheduler from the moment the CUT
/// issues it until its return value travels back.
pub(crate) struct CallRecord {
    pub object: ObjectId,
    pub object_name: String,
    pub method: &'static str,
    /// Launch coroutine the call came out of.
    pub issuer: CoroId,
    /// Launch session the call belongs to.
    pub session: LaunchId,
    pub signature: Signature,
    pub args: Arc<dyn Any + Send + Sync>,
    pub args_repr: String,
    /// Dispatch continues strictly below this registry priority.
    pub cursor: u64,
    pub state: CallState,
    pub return_slot: Option<Box<dyn Any + Send>>,
}

impl CallRecord {
    pub(crate) fn label(&self) -> String {
        format!("{}.{}{}", self.object_name, self.method, self.args_repr)
    }
}

/// Per-object handle a hand-written mock embeds. `call` is the single entry
/// point the CUT-facing stubs route through; `expect` declares host-side
/// expectations that sit below all watches declared afterwards.
pub struct Mock {
    core: Arc<Core>,
    id: ObjectId,
    name: String,
}

impl Mock {
    pub fn new(co: &Coro, name: &str) -> Mock {
        let id = co.core.register_object(name);
        Mock { core: co.core.clone(), id, name: name.to_string() }
    }

    /// Issue a mock call and block the current launch coroutine until some
    /// consumer supplies the return value.
    pub fn call<A, R>(&self, method: &'static str, args: A) -> R
    where
        A: fmt::Debug + Send + Sync + 'static,
        R: Send + 'static,
    {
        let args_repr = format!("{:?}", args);
        let value = self.core.dispatch_call(
            self.id,
            &self.name,
            method,
            Signature::of::<A, R>(),
            Arc::new(args),
            args_repr,
        );
        match value.downcast::<R>() {
            Ok(v) => *v,
            Err(_) => unreachable!("return value type is checked at the return site"),
        }
    }

    /// Start declaring an expectation for `method`. The expectation enters
    /// the handler chain when a terminal (`any_times`, `times`) is called.
    pub fn expect<A, R>(&self, method: &'static str) -> ExpectationBuilder<A, R>
    where
        A: Send + Sync + 'static,
        R: Send + 'static,
    {
        ExpectationBuilder {
            core: self.core.clone(),
            object: self.id,
            object_name: self.name.clone(),
            method,
            matcher: None,
            action: None,
        }
    }
}

impl MockTarget for Mock {
    fn object_id(&self) -> ObjectId {
        self.id
    }

    fn object_name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, Copy)]
enum Cardinality {
    AnyTimes,
    Exactly(usize),
}

pub struct ExpectationBuilder<A, R> {
    core: Arc<Core>,
    object: ObjectId,
    object_name: String,
    method: &'static str,
    matcher: Option<Box<dyn Fn(&A) -> bool + Send>>,
    action: Option<Box<dyn FnMut(&A) -> R + Send>>,
}

impl<A, R> ExpectationBuilder<A, R>
where
    A: Send + Sync + 'static,
    R: Send + 'static,
{
    pub fn matching<P>(mut self, pred: P) -> Self
    where
        P: Fn(&A) -> bool + Send + 'static,
    {
        self.matcher = Some(Box::new(pred));
        self
    }

    pub fn returning<F>(mut self, action: F) -> Self
    where
        F: FnMut(&A) -> R + Send + 'static,
    {
        self.action = Some(Box::new(action));
        self
    }

    /// Register with no upper or lower bound on matches.
    pub fn any_times(self) {
        self.register(Cardinality::AnyTimes);
    }

    /// Register with an exact match count, verified at the end of the test.
    pub fn times(self, count: usize) {
        self.register(Cardinality::Exactly(count));
    }

    fn register(self, cardinality: Cardinality) {
        let label = format!("{}.{}", self.object_name, self.method);
        let matcher = self.matcher.map(|m| {
            Box::new(move |call: &CallView<'_>| call.args::<A>().map(|a| m(a)).unwrap_or(false))
                as Box<dyn Fn(&CallView<'_>) -> bool + Send>
        });
        let action_label = label.clone();
        let action: Box<dyn FnMut(&CallView<'_>) -> Box<dyn Any + Send> + Send> = match self.action
        {
            Some(mut f) => Box::new(move |call: &CallView<'_>| {
                let args = call.args::<A>().expect("signature checked before handling");
                Box::new(f(args)) as Box<dyn Any + Send>
            }),
            None => Box::new(move |_call: &CallView<'_>| {
                if TypeId::of::<R>() == TypeId::of::<()>() {
                    Box::new(()) as Box<dyn Any + Send>
                } else {
                    panic!(
                        "expectation on {} must declare a return action for {}",
                        action_label,
                        type_name::<R>()
                    );
                }
            }),
        };
        let expectation = BasicExpectation {
            object: self.object,
            method: self.method,
            label,
            args_id: TypeId::of::<A>(),
            matcher,
            action,
            cardinality,
            matched: 0,
        };
        self.core.add_host(Box::new(expectation));
    }
}

/// The built-in expectation entry: one method, optional argument matcher,
/// mutable return action, exact-or-unbounded cardinality.
struct BasicExpectation {
    object: ObjectId,
    method: &'static str,
    label: String,
    args_id: TypeId,
    matcher: Option<Box<dyn Fn(&CallView<'_>) -> bool + Send>>,
    action: Box<dyn FnMut(&CallView<'_>) -> Box<dyn Any + Send> + Send>,
    cardinality: Cardinality,
    matched: usize,
}

impl HostExpectation for BasicExpectation {
    fn matches(&self, call: &CallView<'_>) -> bool {
        if call.record.object != self.object || call.record.method != self.method {
            return false;
        }
        if call.record.signature.args_id != self.args_id {
            return false;
        }
        if let Cardinality::Exactly(limit) = self.cardinality {
            if self.matched >= limit {
                return false;
            }
        }
        match &self.matcher {
            Some(m) => m(call),
            None => true,
        }
    }

    fn handle(&mut self, call: &CallView<'_>) -> Option<Box<dyn Any + Send>> {
        self.matched += 1;
        Some((self.action)(call))
    }

    fn verify(&self) -> Result<(), String> {
        match self.cardinality {
            Cardinality::AnyTimes => Ok(()),
            Cardinality::Exactly(expected) if self.matched == expected => Ok(()),
            Cardinality::Exactly(expected) => Err(format!(
                "expectation on {} matched {} time(s), expected {}",
                self.label, self.matched, expected
            )),
        }
    }

    fn describe(&self) -> String {
        format!("expectation on {}", self.label)
    }
}
