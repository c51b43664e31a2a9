//! Binds session identity to outgoing trace spans.
//!
//! Span creation and OTLP export belong to the tracing pipeline; this crate
//! only supplies the attributes every span must carry and the callback that
//! instrumentations call to apply them.

mod binder;
mod instrumentation;
mod propagation;

pub use binder::{OtelSpan, SpanAttributes, TraceSessionBinder};
pub use instrumentation::{
    register_instrumentations, AttributeCallback, Instrumentation, InstrumentationHooks, SpanHookInstrumentation,
    DOCUMENT_LOAD, FETCH, XML_HTTP_REQUEST,
};
pub use propagation::{resource_attributes, TracePropagation, TracingError, DEFAULT_PROPAGATION_PATTERN};
