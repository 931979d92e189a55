//! Upper-layer notification hooks, provided by the integrator.

/// Callbacks invoked when a non-internal job terminates. Modeled as
/// methods on a trait object rather than free function pointers so
/// the integrator can close over whatever state it needs.
pub trait EngineObserver {
    /// Called when a request completes successfully.
    fn job_end(&mut self) {}

    /// Called when a request terminates with a failure, a logical
    /// block error, or corruption.
    fn job_error(&mut self) {}
}

/// The default observer: no notifications wired up.
impl EngineObserver for () {}
