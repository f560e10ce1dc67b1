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

//! The value handles user code manipulates: events, mock calls (erased and
//! signature-typed) and the null-propagating checker chains.
//!
//! A checker that fails returns a null handle; further checks on a null
//! handle stay null, so a chain behaves as one logical AND with no branching
//! in the test.

use std::any::{type_name, Any, TypeId};
use std::sync::Arc;

use crate::events::{Payload, Queued};
use crate::launch::Launch;
use crate::mock::MockTarget;
use crate::scheduler::Core;
use crate::{CallId, LaunchId};

/// Either kind of event, as handed out by `Coro::next_event`.
#[derive(Clone)]
pub struct Event {
    core: Arc<Core>,
    inner: EventInner,
}

#[derive(Clone, Copy)]
enum EventInner {
    Call(CallId),
    Result(LaunchId),
}

impl Event {
    pub(crate) fn new(core: Arc<Core>, queued: &Queued) -> Event {
        let inner = match queued.payload {
            Payload::Call(call) => EventInner::Call(call),
            Payload::Completion(launch) => EventInner::Result(launch),
        };
        Event { core, inner }
    }

    /// Commit to handling this mock call. Completions need no disposition.
    pub fn accept(&self) {
        if let EventInner::Call(call) = self.inner {
            self.core.accept_call(call);
        }
    }

    /// Hand the mock call back to dispatch so a lower-priority handler can
    /// take it.
    pub fn reject(&self) {
        match self.inner {
            EventInner::Call(call) => self.core.reject_call(call),
            EventInner::Result(_) => panic!("a launch completion cannot be dropped"),
        }
    }

    /// Return `value` to the code-under-test; implies accept.
    pub fn ret<T: Send + 'static>(&self, value: T) {
        match self.inner {
            EventInner::Call(call) => self.core.return_call(
                call,
                Box::new(value),
                TypeId::of::<T>(),
                type_name::<T>(),
            ),
            EventInner::Result(_) => panic!("a launch completion has no return value to fill"),
        }
    }

    /// Start a checker chain: non-null when this event is a call of `method`
    /// on `object`.
    pub fn is_call<M: MockTarget>(&self, object: &M, method: &str) -> CallCheck {
        let call = match self.inner {
            EventInner::Call(call) => {
                let g = self.core.lock();
                let record = &g.calls[call];
                if record.object == object.object_id() && record.method == method {
                    Some(call)
                } else {
                    None
                }
            }
            EventInner::Result(_) => None,
        };
        CallCheck { core: self.core.clone(), call }
    }

    /// Checker chain entry for completions: non-null when this event is a
    /// launch result.
    pub fn is_return(&self) -> ReturnCheck {
        ReturnCheck {
            launch: match self.inner {
                EventInner::Result(launch) => Some(launch),
                EventInner::Call(_) => None,
            },
        }
    }
}

/// Null-propagating view of a mock call under inspection.
#[derive(Clone)]
pub struct CallCheck {
    core: Arc<Core>,
    call: Option<CallId>,
}

impl CallCheck {
    /// Keep the chain alive only if the argument tuple is an `A` satisfying
    /// `pred`.
    pub fn args<A, P>(self, pred: P) -> CallCheck
    where
        A: Any,
        P: FnOnce(&A) -> bool,
    {
        let keep = match self.call {
            Some(call) => {
                let g = self.core.lock();
                g.calls[call].args.downcast_ref::<A>().map(pred).unwrap_or(false)
            }
            None => false,
        };
        CallCheck { call: if keep { self.call } else { None }, core: self.core }
    }

    /// Keep the chain alive only if the call was issued by `launch`.
    pub fn from<T>(self, launch: &Launch<T>) -> CallCheck {
        let keep = match self.call {
            Some(call) => self.core.lock().calls[call].session == launch.id,
            None => false,
        };
        CallCheck { call: if keep { self.call } else { None }, core: self.core }
    }

    /// Whether the whole chain held.
    pub fn matched(&self) -> bool {
        self.call.is_some()
    }

    /// The argument tuple, if the chain is alive and the tuple is an `A`.
    pub fn get_args<A: Any + Clone>(&self) -> Option<A> {
        self.call.and_then(|call| {
            self.core.lock().calls[call].args.downcast_ref::<A>().cloned()
        })
    }
}

/// Null-propagating view of a launch completion under inspection.
#[derive(Clone)]
pub struct ReturnCheck {
    launch: Option<LaunchId>,
}

impl ReturnCheck {
    pub fn from<T>(self, launch: &Launch<T>) -> ReturnCheck {
        ReturnCheck {
            launch: match self.launch {
                Some(l) if l == launch.id => Some(l),
                _ => None,
            },
        }
    }

    pub fn matched(&self) -> bool {
        self.launch.is_some()
    }
}

/// An accepted mock call with its signature erased: arguments come back via
/// runtime-checked downcasts and the return value is checked against the
/// recorded signature when supplied.
#[derive(Clone)]
pub struct CallEvent {
    core: Arc<Core>,
    pub(crate) id: CallId,
}

impl CallEvent {
    pub(crate) fn new(core: Arc<Core>, id: CallId) -> CallEvent {
        CallEvent { core, id }
    }

    /// Return `value` to the code-under-test and unblock the launch that
    /// issued the call.
    pub fn ret<T: Send + 'static>(&self, value: T) {
        self.core.return_call(self.id, Box::new(value), TypeId::of::<T>(), type_name::<T>());
    }

    pub fn method(&self) -> &'static str {
        self.core.lock().calls[self.id].method
    }

    pub fn object_name(&self) -> String {
        self.core.lock().calls[self.id].object_name.clone()
    }

    /// The argument tuple, if it is an `A`.
    pub fn args<A: Any + Clone>(&self) -> Option<A> {
        self.core.lock().calls[self.id].args.downcast_ref::<A>().cloned()
    }

    pub fn is_from<T>(&self, launch: &Launch<T>) -> bool {
        self.core.lock().calls[self.id].session == launch.id
    }
}

/// Index-typed access into an argument tuple. Implemented for tuples up to
/// four elements; `TypedCall::get_arg::<N>()` resolves through it.
pub trait TupleArg<const I: usize> {
    type Arg;
    fn tuple_arg(&self) -> &Self::Arg;
}

macro_rules! tuple_arg {
    ($index:literal ; $($name:ident)* ; $field:tt -> $arg:ident) => {
        impl<$($name),*> TupleArg<$index> for ($($name,)*) {
            type Arg = $arg;
            fn tuple_arg(&self) -> &$arg {
                &self.$field
            }
        }
    };
}

tuple_arg!(0 ; A ; 0 -> A);
tuple_arg!(0 ; A B ; 0 -> A);
tuple_arg!(1 ; A B ; 1 -> B);
tuple_arg!(0 ; A B C ; 0 -> A);
tuple_arg!(1 ; A B C ; 1 -> B);
tuple_arg!(2 ; A B C ; 2 -> C);
tuple_arg!(0 ; A B C D ; 0 -> A);
tuple_arg!(1 ; A B C D ; 1 -> B);
tuple_arg!(2 ; A B C D ; 2 -> C);
tuple_arg!(3 ; A B C D ; 3 -> D);

/// An accepted mock call witnessed at a known signature: `A` is the argument
/// tuple, `R` the return type. The witness was verified against the call's
/// recorded signature when it matched.
pub struct TypedCall<A, R> {
    core: Arc<Core>,
    pub(crate) id: CallId,
    _sig: std::marker::PhantomData<fn(A) -> R>,
}

impl<A, R> Clone for TypedCall<A, R> {
    fn clone(&self) -> TypedCall<A, R> {
        TypedCall { core: self.core.clone(), id: self.id, _sig: std::marker::PhantomData }
    }
}

impl<A, R> TypedCall<A, R>
where
    A: Any,
    R: Send + 'static,
{
    pub(crate) fn new(core: Arc<Core>, id: CallId) -> TypedCall<A, R> {
        TypedCall { core, id, _sig: std::marker::PhantomData }
    }

    /// Return a value of the method's actual return type.
    pub fn ret(&self, value: R) {
        self.core.return_call(self.id, Box::new(value), TypeId::of::<R>(), type_name::<R>());
    }

    /// The `I`-th argument, cloned out of the call.
    pub fn get_arg<const I: usize>(&self) -> <A as TupleArg<I>>::Arg
    where
        A: TupleArg<I>,
        <A as TupleArg<I>>::Arg: Clone,
    {
        let args = {
            let g = self.core.lock();
            g.calls[self.id].args.clone()
        };
        let tuple = args
            .downcast_ref::<A>()
            .expect("signature verified when the call was matched");
        tuple.tuple_arg().clone()
    }

    /// The whole argument tuple.
    pub fn args(&self) -> A
    where
        A: Clone,
    {
        let args = {
            let g = self.core.lock();
            g.calls[self.id].args.clone()
        };
        args.downcast_ref::<A>()
            .expect("signature verified when the call was matched")
            .clone()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_tuple_arg_indices() {
        type T = (i32, &'static str, f64);
        let t: T = (1, "two", 3.0);
        assert_eq!(*<T as TupleArg<0>>::tuple_arg(&t), 1);
        assert_eq!(*<T as TupleArg<1>>::tuple_arg(&t), "two");
        assert_eq!(*<T as TupleArg<2>>::tuple_arg(&t), 3.0);
    }
}
