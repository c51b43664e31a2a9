use async_trait::async_trait;
use monoscope_core::{MonoscopeUser, SessionId, SessionIdentity, TabId};
use monoscope_session::SessionObserver;
use opentelemetry::KeyValue;
use parking_lot::RwLock;
use tracing::debug;

pub const SESSION_ID_ATTR: &str = "session.id";
pub const TAB_ID_ATTR: &str = "tab.id";

/// Anything span-like that accepts attributes.
pub trait SpanAttributes {
    fn set_attribute(&mut self, attribute: KeyValue);
}

impl SpanAttributes for Vec<KeyValue> {
    fn set_attribute(&mut self, attribute: KeyValue) {
        self.push(attribute);
    }
}

/// Adapts an OpenTelemetry span to [`SpanAttributes`].
pub struct OtelSpan<'a, S>(pub &'a mut S);

impl<S: opentelemetry::trace::Span> SpanAttributes for OtelSpan<'_, S> {
    fn set_attribute(&mut self, attribute: KeyValue) {
        opentelemetry::trace::Span::set_attribute(self.0, attribute);
    }
}

struct Binding {
    session_id: SessionId,
    tab_id: TabId,
    user: MonoscopeUser,
}

/// Source of the identity attributes stamped on every span.
///
/// Spans read the binding when they are decorated, so a rotation or user
/// update only affects spans decorated afterwards.
pub struct TraceSessionBinder {
    binding: RwLock<Binding>,
}

impl TraceSessionBinder {
    pub fn new(identity: &SessionIdentity, user: Option<MonoscopeUser>) -> Self {
        Self {
            binding: RwLock::new(Binding {
                session_id: identity.session_id,
                tab_id: identity.tab_id,
                user: user.unwrap_or_default(),
            }),
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.binding.read().session_id
    }

    pub fn update_session_id(&self, session_id: SessionId) {
        self.binding.write().session_id = session_id;
        debug!(session_id = %session_id, "trace binder rebound");
    }

    /// Merge `user` into the bound user. Present fields win; extras merge per key.
    pub fn set_user(&self, user: MonoscopeUser) {
        self.binding.write().user.merge(user);
    }

    pub fn user(&self) -> MonoscopeUser {
        self.binding.read().user.clone()
    }

    pub fn attributes(&self) -> Vec<KeyValue> {
        let binding = self.binding.read();
        let mut attrs = vec![
            KeyValue::new(SESSION_ID_ATTR, binding.session_id.to_string()),
            KeyValue::new(TAB_ID_ATTR, binding.tab_id.to_string()),
        ];
        attrs.extend(
            binding
                .user
                .attributes()
                .into_iter()
                .map(|(k, v)| KeyValue::new(k, v)),
        );
        attrs
    }

    pub fn decorate(&self, span: &mut dyn SpanAttributes) {
        for attr in self.attributes() {
            span.set_attribute(attr);
        }
    }
}

#[async_trait]
impl SessionObserver for TraceSessionBinder {
    fn session_rotated(&self, _previous: &SessionIdentity, current: &SessionIdentity) {
        self.update_session_id(current.session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use opentelemetry::Value;

    fn identity() -> SessionIdentity {
        SessionIdentity {
            session_id: SessionId::new(),
            tab_id: TabId::new(),
            last_activity_at: Utc::now(),
        }
    }

    fn get(attrs: &[KeyValue], key: &str) -> Option<String> {
        attrs
            .iter()
            .find(|kv| kv.key.as_str() == key)
            .map(|kv| match &kv.value {
                Value::String(s) => s.as_str().to_string(),
                other => other.to_string(),
            })
    }

    #[test]
    fn decorates_with_session_and_tab() {
        let id = identity();
        let binder = TraceSessionBinder::new(&id, None);
        let mut span: Vec<KeyValue> = Vec::new();
        binder.decorate(&mut span);
        assert_eq!(span.len(), 2);
        assert_eq!(get(&span, SESSION_ID_ATTR), Some(id.session_id.to_string()));
        assert_eq!(get(&span, TAB_ID_ATTR), Some(id.tab_id.to_string()));
    }

    #[test]
    fn rotation_only_affects_later_spans() {
        let old = identity();
        let binder = TraceSessionBinder::new(&old, None);
        let mut before: Vec<KeyValue> = Vec::new();
        binder.decorate(&mut before);

        let new = SessionIdentity {
            session_id: SessionId::new(),
            ..old.clone()
        };
        binder.session_rotated(&old, &new);
        let mut after: Vec<KeyValue> = Vec::new();
        binder.decorate(&mut after);

        assert_eq!(get(&before, SESSION_ID_ATTR), Some(old.session_id.to_string()));
        assert_eq!(get(&after, SESSION_ID_ATTR), Some(new.session_id.to_string()));
        assert_eq!(get(&after, TAB_ID_ATTR), Some(old.tab_id.to_string()));
    }

    #[test]
    fn set_user_merges() {
        let binder = TraceSessionBinder::new(
            &identity(),
            Some(MonoscopeUser {
                id: Some("u-1".into()),
                email: Some("a@example.com".into()),
                ..Default::default()
            }),
        );
        binder.set_user(MonoscopeUser {
            name: Some("Ada".into()),
            roles: vec!["admin".into(), "billing".into()],
            ..Default::default()
        });

        let attrs = binder.attributes();
        assert_eq!(get(&attrs, "user.id"), Some("u-1".into()));
        assert_eq!(get(&attrs, "user.email"), Some("a@example.com".into()));
        assert_eq!(get(&attrs, "user.name"), Some("Ada".into()));
        assert_eq!(get(&attrs, "user.roles"), Some("admin,billing".into()));
    }

    #[test]
    fn decorates_sdk_span() {
        use opentelemetry::trace::{Span as _, Tracer as _, TracerProvider as _};
        use opentelemetry_sdk::testing::trace::InMemorySpanExporter;
        use opentelemetry_sdk::trace::TracerProvider;

        let exporter = InMemorySpanExporter::default();
        let provider = TracerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();
        let tracer = provider.tracer("monoscope-test");

        let id = identity();
        let binder = TraceSessionBinder::new(
            &id,
            Some(MonoscopeUser {
                id: Some("u-9".into()),
                ..Default::default()
            }),
        );
        let mut span = tracer.start("GET /users");
        binder.decorate(&mut OtelSpan(&mut span));
        span.end();

        let finished = exporter.get_finished_spans().unwrap();
        assert_eq!(finished.len(), 1);
        let attrs = &finished[0].attributes;
        assert_eq!(get(attrs, SESSION_ID_ATTR), Some(id.session_id.to_string()));
        assert_eq!(get(attrs, TAB_ID_ATTR), Some(id.tab_id.to_string()));
        assert_eq!(get(attrs, "user.id"), Some("u-9".into()));
    }
}
