//! Hotwire Testing
//!
//! Test doubles for the host side of the hot-reload engine, so reload
//! scenarios run without a real interpreter:
//! - [`RecordingLoader`]: an `ExtensionLoader` that records every call
//! - [`InMemoryRegistry`]: a `ModuleRegistry` with injectable failures
//! - [`RecordingHook`]: a `SpecialReloadHook` that records rebinds
//! - [`SourceTree`]: an on-disk package tree in a temporary directory

pub mod fixture;
pub mod host;

pub use fixture::SourceTree;
pub use host::{InMemoryRegistry, LoaderCall, RecordingHook, RecordingLoader};

/// Install a test-friendly tracing subscriber once; later calls are no-ops.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Assert the loader received exactly these calls, in order.
#[macro_export]
macro_rules! assert_loader_calls {
    ($loader:expr, [$($call:expr),* $(,)?]) => {
        let expected: Vec<$crate::LoaderCall> = vec![$($call),*];
        assert_eq!(
            $loader.calls(),
            expected,
            "Unexpected loader calls"
        );
    };
}
