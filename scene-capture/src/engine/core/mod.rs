//! Plugin wiring for the capture pipeline.

/// Registers resources, events and the ordered capture systems.
///
/// The render worker is started here, inline when threads are unavailable.
pub mod plugin;
