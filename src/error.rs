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

//! Failure taxonomy and panic-payload classification.

use std::any::Any;
use std::fmt;

/// Payload of `Coro::exit_coroutine`. Unwinds the coroutine body and is
/// treated as a normal exit.
pub(crate) struct ExitToken;

/// Payload of a teardown unwind. A context that resumes with this pending
/// leaves no cardinality trace; the test has already finished or failed.
pub(crate) struct ForcedUnwind;

/// Pending unwind instruction for a suspended context, acted on the next
/// time it gets the scheduling token back.
#[derive(Debug, Clone)]
pub(crate) enum Poison {
    /// Unwind quietly; the test is over.
    Teardown,
    /// Unwind with a message; the failure happened on this context's behalf
    /// while it was suspended.
    Fault(String),
}

/// Everything the core can hold against a test at the end of a run.
/// Expectation-level failures are accumulated here so the test can wind
/// down before the whole list is reported in one panic.
#[derive(Debug)]
pub(crate) enum Failure {
    UnmatchedCall { call: String },
    Oversaturated { coroutine: String, call: String },
    Unsatisfied { coroutine: String },
    UncollectedLaunch { launch: String },
    Deadlock { waiting: Vec<String> },
    ServerRule { coroutine: String, call: String },
    Expectation { message: String },
    CoroutinePanicked { coroutine: String, message: String },
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::UnmatchedCall { call } => {
                write!(f, "unmatched mock call {}: no watch or expectation consumed it", call)
            }
            Failure::Oversaturated { coroutine, call } => {
                write!(f, "coroutine '{}' exited but still matched {}", coroutine, call)
            }
            Failure::Unsatisfied { coroutine } => {
                write!(f, "coroutine '{}' never exited and was not marked satisfied", coroutine)
            }
            Failure::UncollectedLaunch { launch } => {
                write!(f, "{} was never collected", launch)
            }
            Failure::Deadlock { waiting } => {
                write!(f, "no coroutine can make progress; waiting:")?;
                for w in waiting {
                    write!(f, "\n      {}", w)?;
                }
                Ok(())
            }
            Failure::ServerRule { coroutine, call } => {
                write!(f, "coroutine '{}' exited while {} was still undisposed", coroutine, call)
            }
            Failure::Expectation { message } => write!(f, "{}", message),
            Failure::CoroutinePanicked { coroutine, message } => {
                write!(f, "coroutine '{}' panicked: {}", coroutine, message)
            }
        }
    }
}

/// Render the accumulated failures into the message `run` panics with.
pub(crate) fn render_report(failures: &[Failure]) -> String {
    let mut out = format!("test failed with {} problem(s):", failures.len());
    for failure in failures {
        out.push_str("\n  - ");
        out.push_str(&failure.to_string());
    }
    out
}

/// Best-effort rendering of a panic payload.
pub(crate) fn panic_message(err: &(dyn Any + Send)) -> &str {
    match err.downcast_ref::<&'static str>() {
        Some(s) => s,
        None => match err.downcast_ref::<String>() {
            Some(s) => &s[..],
            None => "Box<Any>",
        },
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_report_lists_every_failure() {
        let failures = vec![
            Failure::Unsatisfied { coroutine: "server".to_string() },
            Failure::UncollectedLaunch { launch: "launch #0".to_string() },
        ];
        let report = render_report(&failures);
        assert!(report.contains("2 problem(s)"));
        assert!(report.contains("'server'"));
        assert!(report.contains("launch #0"));
    }

    #[test]
    fn test_panic_message_downcasts() {
        let boxed: Box<dyn Any + Send> = Box::new("static str");
        assert_eq!(panic_message(&*boxed), "static str");
        let boxed: Box<dyn Any + Send> = Box::new("owned".to_string());
        assert_eq!(panic_message(&*boxed), "owned");
        let boxed: Box<dyn Any + Send> = Box::new(7usize);
        assert_eq!(panic_message(&*boxed), "Box<Any>");
    }
}
