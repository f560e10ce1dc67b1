//! The event bus: pending mock calls and launch completions, in arrival
//! order.
//!
//! Two queues share one sequence counter, so a coroutine that asks for "the
//! next event" observes calls and completions in the order they actually
//! happened even though they are stored separately.

use std::collections::VecDeque;

use crate::{CallId, CoroId, LaunchId};

/// What a blocked coroutine is prepared to wake up for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EventTag {
    /// Any event targeted at the waiter.
    Any,
    /// Mock calls only.
    Call,
    /// Any launch completion owned by the waiter.
    AnyResult,
    /// The completion of one specific launch.
    ResultOf(LaunchId),
}

impl EventTag {
    pub(crate) fn admits(&self, payload: &Payload) -> bool {
        match (self, payload) {
            (EventTag::Any, _) => true,
            (EventTag::Call, Payload::Call(_)) => true,
            (EventTag::AnyResult, Payload::Completion(_)) => true,
            (EventTag::ResultOf(wanted), Payload::Completion(launch)) => wanted == launch,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Payload {
    Call(CallId),
    Completion(LaunchId),
}

#[derive(Debug)]
pub(crate) struct Queued {
    pub seq: u64,
    pub owner: CoroId,
    pub payload: Payload,
}

pub(crate) struct EventBus {
    /// Calls offered to a coroutine and not yet taken.
    inbox: VecDeque<Queued>,
    /// Launch completions awaiting collection by their owner.
    completions: VecDeque<Queued>,
    next_seq: u64,
}

impl EventBus {
    pub(crate) fn new() -> EventBus {
        EventBus {
            inbox: VecDeque::new(),
            completions: VecDeque::new(),
            next_seq: 0,
        }
    }

    fn seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    pub(crate) fn offer_call(&mut self, owner: CoroId, call: CallId) {
        let seq = self.seq();
        self.inbox.push_back(Queued { seq, owner, payload: Payload::Call(call) });
    }

    pub(crate) fn offer_completion(&mut self, owner: CoroId, launch: LaunchId) {
        let seq = self.seq();
        self.completions.push_back(Queued { seq, owner, payload: Payload::Completion(launch) });
    }

    /// Remove and return the oldest event targeted at `owner` that the tag
    /// admits. Events for other coroutines are never visible through here.
    pub(crate) fn take(&mut self, owner: CoroId, tag: EventTag) -> Option<Queued> {
        let call = self
            .inbox
            .iter()
            .position(|q| q.owner == owner && tag.admits(&q.payload));
        let done = self
            .completions
            .iter()
            .position(|q| q.owner == owner && tag.admits(&q.payload));
        match (call, done) {
            (Some(i), Some(j)) => {
                if self.inbox[i].seq < self.completions[j].seq {
                    self.inbox.remove(i)
                } else {
                    self.completions.remove(j)
                }
            }
            (Some(i), None) => self.inbox.remove(i),
            (None, Some(j)) => self.completions.remove(j),
            (None, None) => None,
        }
    }

    /// Non-destructive look at the oldest event targeted at `owner`.
    pub(crate) fn peek(&self, owner: CoroId) -> Option<&Queued> {
        let call = self.inbox.iter().find(|q| q.owner == owner);
        let done = self.completions.iter().find(|q| q.owner == owner);
        match (call, done) {
            (Some(a), Some(b)) => Some(if a.seq < b.seq { a } else { b }),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        }
    }

    pub(crate) fn has_match(&self, owner: CoroId, tag: EventTag) -> bool {
        self.inbox.iter().any(|q| q.owner == owner && tag.admits(&q.payload))
            || self.completions.iter().any(|q| q.owner == owner && tag.admits(&q.payload))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_take_is_owner_scoped() {
        let mut bus = EventBus::new();
        bus.offer_call(1, 10);
        bus.offer_call(2, 11);
        assert!(bus.take(3, EventTag::Any).is_none());
        let q = bus.take(2, EventTag::Any).unwrap();
        assert!(matches!(q.payload, Payload::Call(11)));
    }

    #[test]
    fn test_arrival_order_spans_both_queues() {
        let mut bus = EventBus::new();
        bus.offer_call(1, 10);
        bus.offer_completion(1, 0);
        bus.offer_call(1, 12);
        let first = bus.take(1, EventTag::Any).unwrap();
        let second = bus.take(1, EventTag::Any).unwrap();
        let third = bus.take(1, EventTag::Any).unwrap();
        assert!(matches!(first.payload, Payload::Call(10)));
        assert!(matches!(second.payload, Payload::Completion(0)));
        assert!(matches!(third.payload, Payload::Call(12)));
    }

    #[test]
    fn test_tags_filter_without_consuming() {
        let mut bus = EventBus::new();
        bus.offer_completion(1, 7);
        bus.offer_call(1, 10);
        // A call-only wait skips the older completion but leaves it queued.
        let q = bus.take(1, EventTag::Call).unwrap();
        assert!(matches!(q.payload, Payload::Call(10)));
        assert!(bus.take(1, EventTag::ResultOf(8)).is_none());
        let q = bus.take(1, EventTag::ResultOf(7)).unwrap();
        assert!(matches!(q.payload, Payload::Completion(7)));
    }

    #[test]
    fn test_peek_does_not_remove() {
        let mut bus = EventBus::new();
        bus.offer_call(4, 2);
        assert!(bus.peek(4).is_some());
        assert!(bus.peek(4).is_some());
        assert!(bus.has_match(4, EventTag::Call));
        bus.take(4, EventTag::Any).unwrap();
        assert!(bus.peek(4).is_none());
    }
}
