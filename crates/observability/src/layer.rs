use std::collections::BTreeMap;

use chrono::Utc;
use tracing::{
    Event, Level, Subscriber,
    field::{Field, Visit},
    span::{Attributes, Id, Record},
};
use tracing_subscriber::{Layer, layer::Context, registry::LookupSpan};

use crate::{
    config::ServiceIdentity,
    dispatcher::{AlertDispatcher, AlertEvent, SpanSnapshot},
};

const REDACTED: &str = "[REDACTED]";
const SENSITIVE_FIELD_MARKERS: [&str; 7] = [
    "secret",
    "signature",
    "token",
    "authorization",
    "webhook",
    "password",
    "digest",
];

/// Forwards events at or above `min_level` to the alert dispatcher, together
/// with the fields recorded on the enclosing spans.
#[derive(Clone)]
pub(crate) struct ErrorAlertLayer {
    dispatcher: AlertDispatcher,
    identity: ServiceIdentity,
    min_level: Level,
}

impl ErrorAlertLayer {
    pub(crate) fn new(dispatcher: AlertDispatcher, identity: ServiceIdentity, min_level: Level) -> Self {
        Self {
            dispatcher,
            identity,
            min_level,
        }
    }
}

#[derive(Default)]
struct RedactingVisitor {
    fields: BTreeMap<String, String>,
}

impl RedactingVisitor {
    fn insert(&mut self, field: &Field, value: String) {
        let name = field.name();
        let value = if is_sensitive(name) {
            REDACTED.to_string()
        } else {
            value
        };
        self.fields.insert(name.to_string(), value);
    }
}

impl Visit for RedactingVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.insert(field, format!("{value:?}"));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, value.to_string());
    }
}

struct SpanFields(BTreeMap<String, String>);

impl<S> Layer<S> for ErrorAlertLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let mut visitor = RedactingVisitor::default();
        attrs.record(&mut visitor);

        if visitor.fields.is_empty() {
            return;
        }
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(SpanFields(visitor.fields));
        }
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };

        let mut visitor = RedactingVisitor::default();
        values.record(&mut visitor);
        if visitor.fields.is_empty() {
            return;
        }

        let mut extensions = span.extensions_mut();
        match extensions.get_mut::<SpanFields>() {
            Some(existing) => existing.0.extend(visitor.fields),
            None => extensions.insert(SpanFields(visitor.fields)),
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if *metadata.level() > self.min_level {
            return;
        }

        let mut visitor = RedactingVisitor::default();
        event.record(&mut visitor);
        let message = visitor.fields.remove("message").map(|raw| unquote(&raw));

        let spans = ctx
            .event_span(event)
            .map(|leaf| {
                leaf.scope()
                    .from_root()
                    .map(|span| SpanSnapshot {
                        name: span.metadata().name().to_string(),
                        fields: span
                            .extensions()
                            .get::<SpanFields>()
                            .map(|fields| fields.0.clone())
                            .unwrap_or_default(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        self.dispatcher.dispatch(AlertEvent {
            level: *metadata.level(),
            timestamp: Utc::now(),
            service_name: self.identity.service_name.clone(),
            stage: self.identity.stage.clone(),
            component: self.identity.component.clone(),
            target: metadata.target().to_string(),
            location: metadata
                .file()
                .zip(metadata.line())
                .map(|(file, line)| format!("{file}:{line}")),
            message,
            fields: visitor.fields,
            spans,
        });
    }
}

fn unquote(raw: &str) -> String {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(trimmed)
        .to_string()
}

pub(crate) fn is_sensitive(field_name: &str) -> bool {
    let field_name = field_name.to_ascii_lowercase();
    SENSITIVE_FIELD_MARKERS
        .iter()
        .any(|marker| field_name.contains(marker))
}
