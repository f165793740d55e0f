//! Hotwire kernel
//!
//! Contracts shared between the hot-reload engine and the application that
//! hosts it:
//! - host traits the engine drives ([`ExtensionLoader`], [`ModuleRegistry`],
//!   [`SpecialReloadHook`])
//! - the error taxonomy ([`HotReloadError`], [`LoaderError`], [`ModuleError`])
//! - reload events and outcomes broadcast to subscribers
//! - the span observer used for instrumentation

pub mod error;
pub mod event;
pub mod host;
pub mod observer;

pub use error::{HotReloadError, HotReloadResult, LoaderError, ModuleError};
pub use event::{ReloadEvent, ReloadOutcome};
pub use host::{ExtensionLoader, ModuleObject, ModuleRegistry, SpecialReloadHook};
pub use observer::{NoopObserver, SpanObserver, SpanOutcome, SpanTimer, TracingObserver};
