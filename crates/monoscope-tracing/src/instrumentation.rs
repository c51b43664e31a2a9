use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::binder::SpanAttributes;

pub const DOCUMENT_LOAD: &str = "document-load";
pub const FETCH: &str = "fetch";
pub const XML_HTTP_REQUEST: &str = "xml-http-request";

/// Applied to every span an instrumentation starts.
pub type AttributeCallback = Arc<dyn Fn(&mut dyn SpanAttributes) + Send + Sync>;

/// A span source that accepts attribute callbacks.
pub trait Instrumentation: Send + Sync {
    fn name(&self) -> &str;

    fn register(&self, callback: AttributeCallback);
}

/// Optional host callbacks for the built-in instrumentations, run after the
/// session attributes.
#[derive(Clone, Default)]
pub struct InstrumentationHooks {
    pub document_load: Option<AttributeCallback>,
    pub fetch: Option<AttributeCallback>,
    pub xml_http_request: Option<AttributeCallback>,
}

impl fmt::Debug for InstrumentationHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrumentationHooks")
            .field("document_load", &self.document_load.is_some())
            .field("fetch", &self.fetch.is_some())
            .field("xml_http_request", &self.xml_http_request.is_some())
            .finish()
    }
}

/// Instrumentation that decorates spans through its registered callbacks and
/// then an optional host hook.
pub struct SpanHookInstrumentation {
    name: String,
    callbacks: RwLock<Vec<AttributeCallback>>,
    hook: Option<AttributeCallback>,
}

impl SpanHookInstrumentation {
    pub fn new(name: impl Into<String>, hook: Option<AttributeCallback>) -> Self {
        Self {
            name: name.into(),
            callbacks: RwLock::new(Vec::new()),
            hook,
        }
    }

    /// The document-load, fetch and XHR instrumentations, in that order.
    pub fn builtins(hooks: InstrumentationHooks) -> Vec<Arc<Self>> {
        vec![
            Arc::new(Self::new(DOCUMENT_LOAD, hooks.document_load)),
            Arc::new(Self::new(FETCH, hooks.fetch)),
            Arc::new(Self::new(XML_HTTP_REQUEST, hooks.xml_http_request)),
        ]
    }

    /// Decorate a span this instrumentation started.
    pub fn apply(&self, span: &mut dyn SpanAttributes) {
        for callback in self.callbacks.read().iter() {
            callback(&mut *span);
        }
        if let Some(hook) = &self.hook {
            hook(&mut *span);
        }
    }
}

impl Instrumentation for SpanHookInstrumentation {
    fn name(&self) -> &str {
        &self.name
    }

    fn register(&self, callback: AttributeCallback) {
        self.callbacks.write().push(callback);
    }
}

/// Install `callback` on every instrumentation in `instrumentations`.
pub fn register_instrumentations(instrumentations: &[Arc<dyn Instrumentation>], callback: AttributeCallback) {
    for instrumentation in instrumentations {
        instrumentation.register(Arc::clone(&callback));
        debug!(instrumentation = instrumentation.name(), "instrumentation registered");
    }
}
