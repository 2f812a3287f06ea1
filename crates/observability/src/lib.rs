//! Process-wide logging setup shared by the binaries.

/// Install the JSON subscriber with the `info` default filter.
///
/// Later calls are no-ops.
pub fn init() {
    self::tracing::init("info");
}

pub use self::tracing::init as init_with_default;

/// Subscriber construction.
pub mod tracing;
