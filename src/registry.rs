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

//! The handler registry: the ordered chain a mock call walks down until
//! somebody consumes it.
//!
//! Entries are either watches (owned by a coroutine, steering matching calls
//! into its inbox) or host expectations (opaque handlers that answer the call
//! in place). Priority is reverse declaration order: the entry declared last
//! is consulted first.

use std::any::Any;

use crate::mock::{CallRecord, ObjectId};
use crate::CoroId;

/// A read-only view of a pending mock call, as seen by filter predicates and
/// host expectations.
pub struct CallView<'a> {
    pub(crate) record: &'a CallRecord,
}

impl<'a> CallView<'a> {
    pub fn object_name(&self) -> &str {
        &self.record.object_name
    }

    pub fn method(&self) -> &'static str {
        self.record.method
    }

    /// The argument tuple, if it is of type `A`.
    pub fn args<A: Any>(&self) -> Option<&A> {
        self.record.args.downcast_ref::<A>()
    }

    /// The arguments as rendered at call time, for diagnostics.
    pub fn rendered_args(&self) -> &str {
        &self.record.args_repr
    }
}

/// Matcher over mock calls. Used both as the exterior filter of a watch
/// (what a coroutine can see) and as the interior filter of a wait (what it
/// accepts out of what it sees).
pub struct CallFilter {
    object: Option<ObjectId>,
    method: Option<&'static str>,
    args: Option<Box<dyn Fn(&CallRecord) -> bool + Send>>,
    with: Option<Box<dyn Fn(&CallView<'_>) -> bool + Send>>,
}

impl CallFilter {
    /// Matches every mock call.
    pub fn any() -> CallFilter {
        CallFilter { object: None, method: None, args: None, with: None }
    }

    /// Matches any method of one mock object.
    pub fn on(object: &impl crate::mock::MockTarget) -> CallFilter {
        CallFilter { object: Some(object.object_id()), ..CallFilter::any() }
    }

    /// Matches one method of one mock object.
    pub fn method(object: &impl crate::mock::MockTarget, method: &'static str) -> CallFilter {
        CallFilter {
            object: Some(object.object_id()),
            method: Some(method),
            ..CallFilter::any()
        }
    }

    /// Matches a method name on any object.
    pub fn named(method: &'static str) -> CallFilter {
        CallFilter { method: Some(method), ..CallFilter::any() }
    }

    /// Restrict to calls whose argument tuple is an `A` satisfying `pred`.
    pub fn args<A, P>(mut self, pred: P) -> CallFilter
    where
        A: Any,
        P: Fn(&A) -> bool + Send + 'static,
    {
        self.args = Some(Box::new(move |record: &CallRecord| {
            record.args.downcast_ref::<A>().map(|a| pred(a)).unwrap_or(false)
        }));
        self
    }

    /// Attach a free-form predicate over the whole call.
    pub fn with<P>(mut self, pred: P) -> CallFilter
    where
        P: Fn(&CallView<'_>) -> bool + Send + 'static,
    {
        self.with = Some(Box::new(pred));
        self
    }

    pub(crate) fn matches(&self, record: &CallRecord) -> bool {
        if let Some(object) = self.object {
            if record.object != object {
                return false;
            }
        }
        if let Some(method) = self.method {
            if record.method != method {
                return false;
            }
        }
        if let Some(args) = &self.args {
            if !args(record) {
                return false;
            }
        }
        if let Some(with) = &self.with {
            if !with(&CallView { record }) {
                return false;
            }
        }
        true
    }

    pub(crate) fn describe(&self) -> String {
        match self.method {
            Some(method) => format!("calls to {}", method),
            None => "any call".to_string(),
        }
    }
}

/// The contract a host-library expectation satisfies to take part in the
/// dispatch walk: match, handle-or-decline, and end-of-test verification.
pub trait HostExpectation: Send {
    /// Whether this entry would consume the call.
    fn matches(&self, call: &CallView<'_>) -> bool;

    /// Consume the call and produce its boxed return value, or `None` to let
    /// the walk continue.
    fn handle(&mut self, call: &CallView<'_>) -> Option<Box<dyn Any + Send>>;

    /// End-of-test cardinality check.
    fn verify(&self) -> Result<(), String>;

    fn describe(&self) -> String;
}

pub(crate) struct WatchEntry {
    pub priority: u64,
    pub owner: CoroId,
    pub filter: CallFilter,
}

pub(crate) struct HostEntry {
    pub priority: u64,
    pub expectation: Box<dyn HostExpectation>,
}

pub(crate) enum Entry {
    Watch(WatchEntry),
    Host(HostEntry),
}

impl Entry {
    pub(crate) fn priority(&self) -> u64 {
        match self {
            Entry::Watch(w) => w.priority,
            Entry::Host(h) => h.priority,
        }
    }
}

pub(crate) struct Registry {
    pub entries: Vec<Entry>,
    next_priority: u64,
}

impl Registry {
    pub(crate) fn new() -> Registry {
        Registry { entries: Vec::new(), next_priority: 0 }
    }

    pub(crate) fn add_watch(&mut self, owner: CoroId, filter: CallFilter) -> u64 {
        let priority = self.next_priority;
        self.next_priority += 1;
        self.entries.push(Entry::Watch(WatchEntry { priority, owner, filter }));
        priority
    }

    pub(crate) fn add_host(&mut self, expectation: Box<dyn HostExpectation>) -> u64 {
        let priority = self.next_priority;
        self.next_priority += 1;
        self.entries.push(Entry::Host(HostEntry { priority, expectation }));
        priority
    }

    /// Index of the highest-priority entry strictly below `cursor`. Entries
    /// are stored in declaration order, so priorities ascend with index.
    pub(crate) fn next_below(&self, cursor: u64) -> Option<usize> {
        self.entries.iter().rposition(|e| e.priority() < cursor)
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;
    use crate::mock::{CallState, Signature};

    fn record(object: ObjectId, method: &'static str, args: (i32, i32)) -> CallRecord {
        CallRecord {
            object,
            object_name: "turtle".to_string(),
            method,
            issuer: 0,
            session: 0,
            signature: Signature::of::<(i32, i32), ()>(),
            args_repr: format!("{:?}", args),
            args: Arc::new(args),
            cursor: u64::MAX,
            state: CallState::Dispatching,
            return_slot: None,
        }
    }

    #[test]
    fn test_filter_narrows_stepwise() {
        let call = record(3, "GoTo", (5, 1));
        assert!(CallFilter::any().matches(&call));
        assert!(CallFilter::named("GoTo").matches(&call));
        assert!(!CallFilter::named("PenUp").matches(&call));
        assert!(CallFilter::any().args(|&(_, y): &(i32, i32)| y == 1).matches(&call));
        assert!(!CallFilter::any().args(|&(x, _): &(i32, i32)| x == 0).matches(&call));
        // Wrong tuple type never matches.
        assert!(!CallFilter::any().args(|_: &(i32,)| true).matches(&call));
        assert!(CallFilter::any().with(|c| c.method() == "GoTo").matches(&call));
    }

    #[test]
    fn test_walk_order_is_reverse_declaration() {
        let mut registry = Registry::new();
        let p0 = registry.add_watch(1, CallFilter::any());
        let p1 = registry.add_watch(2, CallFilter::any());
        assert!(p1 > p0);
        // The walk starts at the newest entry and a drop continues below it.
        let first = registry.next_below(u64::MAX).unwrap();
        assert_eq!(registry.entries[first].priority(), p1);
        let next = registry.next_below(p1).unwrap();
        assert_eq!(registry.entries[next].priority(), p0);
        assert!(registry.next_below(p0).is_none());
    }
}
