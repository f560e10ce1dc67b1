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

use std::panic::{self, AssertUnwindSafe};

use crate::{run, Builder, CallFilter, Coro, Mock, MockTarget, ObjectId};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Run a test body that is expected to fail and hand back the report.
fn failure_report<F: FnOnce(&Coro)>(body: F) -> String {
    match panic::catch_unwind(AssertUnwindSafe(|| run(body))) {
        Ok(()) => panic!("expected the test to fail"),
        Err(payload) => match payload.downcast::<String>() {
            Ok(message) => *message,
            Err(payload) => match payload.downcast::<&'static str>() {
                Ok(message) => message.to_string(),
                Err(_) => "<opaque panic payload>".to_string(),
            },
        },
    }
}

// ---------- fixtures ----------

struct Arith;

impl Arith {
    fn triple(&self, a: i32) -> i32 {
        a * 3
    }

    fn triple_in_place(&self, a: &mut i32) {
        *a *= 3;
    }
}

struct MockTurtle {
    mock: Mock,
}

impl MockTurtle {
    fn new(co: &Coro) -> MockTurtle {
        MockTurtle { mock: Mock::new(co, "turtle") }
    }

    fn pen_down(&self) {
        self.mock.call::<(), ()>("PenDown", ())
    }

    fn pen_up(&self) {
        self.mock.call::<(), ()>("PenUp", ())
    }

    fn forward(&self, distance: i32) {
        self.mock.call::<(i32,), ()>("Forward", (distance,))
    }

    fn turn(&self, degrees: i32) {
        self.mock.call::<(i32,), ()>("Turn", (degrees,))
    }

    fn go_to(&self, x: i32, y: i32) {
        self.mock.call::<(i32, i32), ()>("GoTo", (x, y))
    }

    fn get_x(&self) -> i32 {
        self.mock.call::<(), i32>("GetX", ())
    }

    fn ink_check(&self) -> bool {
        self.mock.call::<(), bool>("InkCheck", ())
    }
}

impl MockTarget for MockTurtle {
    fn object_id(&self) -> ObjectId {
        self.mock.object_id()
    }

    fn object_name(&self) -> &str {
        self.mock.object_name()
    }
}

/// The code-under-test: drives a turtle it only knows as a collaborator.
struct Painter<'a> {
    turtle: &'a MockTurtle,
}

impl<'a> Painter<'a> {
    fn go_to_point_top_left(&self) {
        self.turtle.go_to(0, 1);
    }

    fn draw_square(&self, side: i32) {
        self.turtle.pen_down();
        for _ in 0..4 {
            self.turtle.forward(side);
            self.turtle.turn(90);
        }
        self.turtle.pen_up();
    }

    fn check_position(&self) {
        if self.turtle.get_x() < -100 {
            self.turtle.go_to(0, 0);
        }
    }

    fn draw_dot(&self) {
        self.turtle.pen_down();
        self.turtle.pen_up();
    }

    fn empty_method(&self) {}

    fn draw_square_ink_checks(&self, side: i32) {
        for _ in 0..4 {
            if self.turtle.ink_check() {
                self.turtle.forward(side);
                self.turtle.turn(90);
            }
        }
        self.turtle.pen_up();
    }
}

// ---------- plain launches, no mocks ----------

#[test]
fn test_plain_result() {
    init();
    run(|co| {
        let x = Arith;
        let l = co.launch(|| x.triple(24));
        let r = co.wait_for_result();
        assert!(r.of(&l));
        assert_eq!(r.value(&l), 72);
    });
}

#[test]
fn test_reference_argument_and_void_return() {
    init();
    run(|co| {
        let x = Arith;
        let mut i = 24;
        let l = co.launch(|| x.triple_in_place(&mut i));
        co.wait_for_result_from(&l);
        assert_eq!(i, 72);
    });
}

// ---------- single calls and framing ----------

#[test]
fn test_single_mock_call() {
    init();
    run(|co| {
        let turtle = MockTurtle::new(co);
        let painter = Painter { turtle: &turtle };
        co.watch_call();
        let l = co.launch(|| painter.go_to_point_top_left());
        let e = co.next_event();
        assert!(!e.is_return().matched());
        assert!(e.is_call(&turtle, "GoTo").args(|&(_, y): &(i32, i32)| y == 1).matched());
        assert!(!e.is_call(&turtle, "PenUp").matched());
        e.ret(());
        let r = co.wait_for_result();
        assert!(r.of(&l));
    });
}

#[test]
fn test_square_drawing_frames_every_side() {
    init();
    run(|co| {
        let turtle = MockTurtle::new(co);
        let painter = Painter { turtle: &turtle };
        co.watch_call();
        let l = co.launch(|| painter.draw_square(5));
        co.wait_for_call(CallFilter::method(&turtle, "PenDown")).ret(());
        for _ in 0..4 {
            co.wait_for_call(
                CallFilter::method(&turtle, "Forward").args(|&(d,): &(i32,)| d == 5),
            )
            .ret(());
            co.wait_for_call(
                CallFilter::method(&turtle, "Turn").args(|&(a,): &(i32,)| a == 90),
            )
            .ret(());
        }
        co.wait_for_call(CallFilter::method(&turtle, "PenUp")).ret(());
        co.wait_for_result_from(&l);
    });
}

#[test]
fn test_typed_return_drives_behavior() {
    init();
    run(|co| {
        let turtle = MockTurtle::new(co);
        let painter = Painter { turtle: &turtle };
        co.watch_call();
        let l = co.launch(|| painter.check_position());
        co.wait_typed::<(), i32>(&turtle, "GetX").ret(-200);
        // Reporting a far-out position must make the painter recenter.
        co.wait_for_call(
            CallFilter::method(&turtle, "GoTo").args(|&(x, y): &(i32, i32)| x == 0 && y == 0),
        )
        .ret(());
        co.wait_for_result_from(&l);
    });
}

#[test]
fn test_signature_handle_typed_args() {
    init();
    run(|co| {
        let turtle = MockTurtle::new(co);
        let painter = Painter { turtle: &turtle };
        co.watch_call();
        let l = co.launch(|| painter.go_to_point_top_left());
        let c = co.wait_typed::<(i32, i32), ()>(&turtle, "GoTo");
        assert_eq!(c.get_arg::<0>(), 0);
        assert_eq!(c.get_arg::<1>(), 1);
        assert_eq!(c.args(), (0, 1));
        c.ret(());
        co.wait_for_result_from(&l);
    });
}

#[test]
fn test_typed_wait_constrained_to_launch() {
    init();
    run(|co| {
        let turtle = MockTurtle::new(co);
        let painter = Painter { turtle: &turtle };
        co.watch_call();
        let l = co.launch(|| painter.draw_dot());
        co.wait_typed_from::<(), (), _>(&turtle, "PenDown", &l).ret(());
        co.wait_typed::<(), ()>(&turtle, "PenUp").ret(());
        co.wait_for_result_from(&l);
    });
}

// ---------- multiple launches and homing ----------

#[test]
fn test_multi_launch_collection_order() {
    init();
    run(|co| {
        let turtle = MockTurtle::new(co);
        let painter = Painter { turtle: &turtle };
        co.watch_call();
        let l1 = co.launch(|| painter.draw_dot());
        let c1 = co.wait_for_call_from(CallFilter::method(&turtle, "PenDown"), &l1);
        // A second launch completes and is collected while the first one is
        // still parked inside PenDown.
        let l2 = co.launch(|| painter.empty_method());
        co.wait_for_result_from(&l2);
        c1.ret(());
        co.wait_for_call(CallFilter::method(&turtle, "PenUp")).ret(());
        co.wait_for_result_from(&l1);
    });
}

#[test]
fn test_completion_event_checkers() {
    init();
    run(|co| {
        let turtle = MockTurtle::new(co);
        let l = co.launch(|| 7i32);
        let e = co.next_event();
        assert!(e.is_return().matched());
        assert!(e.is_return().from(&l).matched());
        assert!(!e.is_call(&turtle, "PenUp").matched());
    });
}

// ---------- server style ----------

#[test]
fn test_server_style_drop_reaches_host_expectation() {
    init();
    run(|co| {
        let turtle = MockTurtle::new(co);
        let painter = Painter { turtle: &turtle };
        turtle.mock.expect::<(), bool>("InkCheck").returning(|_| true).any_times();
        co.watch_call();
        let l = co.launch(|| painter.draw_square_ink_checks(5));
        let mut forwards = 0;
        loop {
            let e = co.next_event();
            if e.is_call(&turtle, "PenUp").matched() {
                e.ret(());
                break;
            } else if e.is_call(&turtle, "Forward").matched() {
                forwards += 1;
                e.ret(());
            } else if e.is_call(&turtle, "Turn").matched() {
                e.ret(());
            } else {
                // InkCheck: not ours, hand it down the chain.
                e.reject();
            }
        }
        co.wait_for_result_from(&l);
        assert_eq!(forwards, 4);
    });
}

#[test]
fn test_host_expectation_answers() {
    init();
    run(|co| {
        let turtle = MockTurtle::new(co);
        turtle.mock.expect::<(), bool>("InkCheck").returning(|_| true).any_times();
        let l = co.launch(|| turtle.ink_check());
        assert!(co.wait_for_result_from(&l));
    });
}

// ---------- retirement and oversaturation ----------

#[test]
fn test_retire_gates_oversaturation() {
    init();
    run(|co| {
        let turtle = MockTurtle::new(co);
        let _low = co.spawn(|c| {
            c.watch_call();
            c.wait_for_call(CallFilter::any()).ret(());
        });
        let _high = co.spawn(|c| {
            c.watch_call();
            c.wait_for_call(CallFilter::any()).ret(());
            c.retire();
        });
        let l = co.launch(|| {
            turtle.pen_down();
            turtle.pen_down();
        });
        co.wait_for_result_from(&l);
    });
}

#[test]
fn test_oversaturation_without_retire_is_reported() {
    init();
    let report = failure_report(|co| {
        let turtle = MockTurtle::new(co);
        let _low = co.spawn(|c| {
            c.watch_call();
            c.wait_for_call(CallFilter::any()).ret(());
        });
        let _high = co.spawn(|c| {
            c.watch_call();
            c.wait_for_call(CallFilter::any()).ret(());
            // No retire: the exited coroutine stays visible to dispatch.
        });
        let l = co.launch(|| {
            turtle.pen_down();
            turtle.pen_down();
        });
        co.wait_for_result_from(&l);
    });
    assert!(report.contains("still matched"), "unexpected report: {}", report);
}

// ---------- watches owned elsewhere ----------

#[test]
fn test_watch_declared_for_another_coroutine() {
    init();
    run(|co| {
        let turtle = MockTurtle::new(co);
        let server = co.spawn(|c| {
            c.wait_for_call(CallFilter::any()).ret(());
        });
        co.watch_on(&server, CallFilter::any());
        let l = co.launch(|| turtle.pen_down());
        co.wait_for_result_from(&l);
    });
}

#[test]
fn test_builder_names_coroutine() {
    init();
    run(|co| {
        let handle = Builder::new().name("server".to_string()).spawn(co, |c| {
            c.watch_call();
        });
        assert_eq!(handle.name(), "server");
    });
}

// ---------- cardinality at test end ----------

#[test]
fn test_satisfied_server_may_outlive_the_test() {
    init();
    run(|co| {
        let turtle = MockTurtle::new(co);
        let painter = Painter { turtle: &turtle };
        co.spawn(|c| {
            c.watch_call();
            c.satisfy();
            loop {
                let e = c.next_event();
                e.ret(());
            }
        });
        let l = co.launch(|| painter.draw_dot());
        co.wait_for_result_from(&l);
    });
}

#[test]
fn test_unsatisfied_coroutine_fails_the_test() {
    init();
    let report = failure_report(|co| {
        co.spawn(|c| {
            c.watch_call();
            let _ = c.next_event();
        });
    });
    assert!(report.contains("marked satisfied"), "unexpected report: {}", report);
}

#[test]
fn test_exit_coroutine_counts_as_normal_return() {
    init();
    run(|co| {
        co.spawn(|c| {
            c.satisfy();
            c.exit_coroutine();
        });
    });
}

// ---------- failure reporting ----------

#[test]
fn test_uncollected_launch_fails_the_test() {
    init();
    let report = failure_report(|co| {
        let _l = co.launch(|| 5i32);
    });
    assert!(report.contains("never collected"), "unexpected report: {}", report);
}

#[test]
fn test_deadlock_is_detected_and_described() {
    init();
    let report = failure_report(|co| {
        let turtle = MockTurtle::new(co);
        co.watch_call();
        let l = co.launch(|| drop(&turtle));
        co.wait_for_call(CallFilter::any()).ret(());
        co.wait_for_result_from(&l);
    });
    assert!(report.contains("make progress"), "unexpected report: {}", report);
}

#[test]
fn test_server_rule_violation_is_a_programming_error() {
    init();
    let report = failure_report(|co| {
        let turtle = MockTurtle::new(co);
        let painter = Painter { turtle: &turtle };
        co.watch_call();
        let _l = co.launch(|| painter.draw_dot());
        let _e = co.next_event();
        // Launching with an undisposed call in hand breaks the server rule.
        let _ = co.launch(|| ());
    });
    assert!(report.contains("undisposed"), "unexpected report: {}", report);
}

#[test]
fn test_mistyped_return_is_a_programming_error() {
    init();
    let report = failure_report(|co| {
        let turtle = MockTurtle::new(co);
        let painter = Painter { turtle: &turtle };
        co.watch_call();
        let _l = co.launch(|| painter.draw_dot());
        let c = co.wait_for_call(CallFilter::method(&turtle, "PenDown"));
        c.ret(5i32);
    });
    assert!(report.contains("i32 was supplied"), "unexpected report: {}", report);
}

#[test]
fn test_collecting_a_foreign_launch_fails() {
    init();
    let report = failure_report(|co| {
        let l = co.launch(|| 5i32);
        co.spawn(|c| {
            let _ = c.wait_for_result_from(&l);
        });
        assert_eq!(co.wait_for_result_from(&l), 5);
    });
    assert!(report.contains("tried to collect"), "unexpected report: {}", report);
}

#[test]
fn test_cut_panic_propagates_to_the_collection_site() {
    init();
    let report = failure_report(|co| {
        let l = co.launch::<(), _>(|| panic!("the painter slipped"));
        co.wait_for_result_from(&l);
    });
    assert!(report.contains("the painter slipped"), "unexpected report: {}", report);
}

#[test]
fn test_unmatched_call_is_reported() {
    init();
    let report = failure_report(|co| {
        let turtle = MockTurtle::new(co);
        let l = co.launch(|| turtle.pen_down());
        co.wait_for_result_from(&l);
    });
    assert!(report.contains("unmatched mock call"), "unexpected report: {}", report);
}

#[test]
fn test_expectation_cardinality_is_verified() {
    init();
    let report = failure_report(|co| {
        let turtle = MockTurtle::new(co);
        turtle.mock.expect::<(), bool>("InkCheck").returning(|_| false).times(2);
        let l = co.launch(|| turtle.ink_check());
        assert!(!co.wait_for_result_from(&l));
    });
    assert!(report.contains("expected 2"), "unexpected report: {}", report);
}

// ---------- odds and ends ----------

#[test]
fn test_peek_is_non_destructive() {
    init();
    run(|co| {
        let turtle = MockTurtle::new(co);
        let painter = Painter { turtle: &turtle };
        co.watch_call();
        let l = co.launch(|| painter.go_to_point_top_left());
        assert!(co.peek_event().is_some());
        assert!(co.peek_event().is_some());
        co.wait_for_call(CallFilter::method(&turtle, "GoTo")).ret(());
        co.wait_for_result_from(&l);
    });
}
