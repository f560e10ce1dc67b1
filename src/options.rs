//! Coroutine spawn options

/// Coroutine spawn options
#[derive(Debug, Default)]
pub struct Options {
    /// The name of the coroutine, used in logs and failure reports
    pub name: Option<String>,

    /// The stack size of the backing OS thread; the platform default when
    /// unset
    pub stack_size: Option<usize>,
}
