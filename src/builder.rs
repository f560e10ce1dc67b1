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

use crate::coroutine::{spawn_impl, Coro, CoroutineHandle};
use crate::options::Options;

/// Coroutine configuration. Provides detailed control over the properties
/// of new test coroutines.
///
/// ```ignore
/// let server = Builder::new().name("server".to_string())
///                            .stack_size(4096 * 16)
///                            .spawn(co, |co| { /* ... */ });
/// ```
pub struct Builder {
    opts: Options,
}

impl Builder {
    /// Generate the base configuration for spawning a coroutine, from which
    /// configuration methods can be chained.
    pub fn new() -> Builder {
        Builder { opts: Default::default() }
    }

    /// Name the coroutine-to-be. The name shows up in logs and in failure
    /// reports.
    pub fn name(mut self, name: String) -> Builder {
        self.opts.name = Some(name);
        self
    }

    /// Set the stack size of the thread backing the new coroutine.
    pub fn stack_size(mut self, size: usize) -> Builder {
        self.opts.stack_size = Some(size);
        self
    }

    /// Spawn a new test coroutine owned by `co`'s test, and return a handle
    /// for it. The coroutine runs immediately until it first blocks or
    /// exits.
    pub fn spawn<'env, F>(self, co: &Coro, f: F) -> CoroutineHandle
    where
        F: FnOnce(&Coro) + Send + 'env,
    {
        spawn_impl(co, self.opts, f)
    }
}

impl Default for Builder {
    fn default() -> Builder {
        Builder::new()
    }
}
