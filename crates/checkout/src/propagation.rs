//! Trace context propagation in the W3C `traceparent` / `baggage` format.
//!
//! Context is always passed explicitly. Nothing here reads or writes ambient
//! state; a [`TraceContext`] travels as a value through every call signature.

use std::collections::{BTreeMap, HashMap};

use common::{SpanId, TraceId};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

pub const TRACEPARENT: &str = "traceparent";
pub const BAGGAGE: &str = "baggage";

const MAX_BAGGAGE_ENTRIES: usize = 64;

/// Write side of a carrier (request headers, record headers).
pub trait Injector {
    fn set(&mut self, key: &str, value: String);
}

/// Read side of a carrier.
pub trait Extractor {
    fn get(&self, key: &str) -> Option<&str>;
}

impl Injector for BTreeMap<String, String> {
    fn set(&mut self, key: &str, value: String) {
        self.insert(key.to_string(), value);
    }
}

impl Extractor for BTreeMap<String, String> {
    fn get(&self, key: &str) -> Option<&str> {
        BTreeMap::get(self, key).map(String::as_str)
    }
}

impl Injector for HashMap<String, String> {
    fn set(&mut self, key: &str, value: String) {
        self.insert(key.to_string(), value);
    }
}

impl Extractor for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<&str> {
        HashMap::get(self, key).map(String::as_str)
    }
}

impl Injector for HeaderMap {
    fn set(&mut self, key: &str, value: String) {
        let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(&value),
        ) else {
            tracing::debug!(key, "dropping header that is not valid HTTP");
            return;
        };
        self.insert(name, value);
    }
}

impl Extractor for HeaderMap {
    fn get(&self, key: &str) -> Option<&str> {
        HeaderMap::get(self, key).and_then(|value| value.to_str().ok())
    }
}

/// The causal identity of one hop plus the baggage of its request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceContext {
    trace_id: TraceId,
    span_id: SpanId,
    parent_span_id: Option<SpanId>,
    sampled: bool,
    baggage: BTreeMap<String, String>,
}

impl TraceContext {
    /// Starts a new trace.
    pub fn new_root() -> Self {
        Self {
            trace_id: TraceId::generate(),
            span_id: SpanId::generate(),
            parent_span_id: None,
            sampled: true,
            baggage: BTreeMap::new(),
        }
    }

    /// Continues the caller's trace, or starts a new one if the carrier holds none.
    pub fn extract(carrier: &impl Extractor) -> Self {
        let baggage = carrier.get(BAGGAGE).map(parse_baggage).unwrap_or_default();

        match carrier.get(TRACEPARENT).and_then(parse_traceparent) {
            Some((trace_id, parent, sampled)) => Self {
                trace_id,
                span_id: SpanId::generate(),
                parent_span_id: Some(parent),
                sampled,
                baggage,
            },
            None => Self {
                baggage,
                ..Self::new_root()
            },
        }
    }

    /// Writes `traceparent` and, when non-empty, `baggage` into the carrier.
    pub fn inject(&self, carrier: &mut impl Injector) {
        carrier.set(TRACEPARENT, self.traceparent());
        if !self.baggage.is_empty() {
            carrier.set(BAGGAGE, format_baggage(&self.baggage));
        }
    }

    /// A context for an outbound call: same trace and baggage, new span.
    pub fn child(&self) -> Self {
        Self {
            trace_id: self.trace_id,
            span_id: SpanId::generate(),
            parent_span_id: Some(self.span_id),
            sampled: self.sampled,
            baggage: self.baggage.clone(),
        }
    }

    pub fn with_baggage(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.baggage.insert(key.into(), value.into());
        self
    }

    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    pub fn span_id(&self) -> SpanId {
        self.span_id
    }

    pub fn parent_span_id(&self) -> Option<SpanId> {
        self.parent_span_id
    }

    pub fn baggage(&self) -> &BTreeMap<String, String> {
        &self.baggage
    }

    pub fn baggage_item(&self, key: &str) -> Option<&str> {
        self.baggage.get(key).map(String::as_str)
    }

    pub fn traceparent(&self) -> String {
        let flags = if self.sampled { "01" } else { "00" };
        format!("00-{}-{}-{flags}", self.trace_id, self.span_id)
    }
}

/// Parses `00-<trace id>-<span id>-<flags>`.
fn parse_traceparent(value: &str) -> Option<(TraceId, SpanId, bool)> {
    let mut parts = value.trim().split('-');
    let version = parts.next()?;
    let trace_id = TraceId::from_hex(parts.next()?)?;
    let span_id = SpanId::from_hex(parts.next()?)?;
    let flags = parts.next()?;

    // Version ff is forbidden; version 00 has exactly four fields.
    if version.len() != 2 || version == "ff" || !version.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    if version == "00" && parts.next().is_some() {
        return None;
    }
    let flags = u8::from_str_radix(flags, 16).ok().filter(|_| flags.len() == 2)?;

    Some((trace_id, span_id, flags & 0x01 == 0x01))
}

fn parse_baggage(value: &str) -> BTreeMap<String, String> {
    value
        .split(',')
        .filter_map(|member| {
            // Properties after ';' are ignored.
            let entry = member.split(';').next()?.trim();
            let (key, value) = entry.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), percent_decode(value.trim())?))
        })
        .take(MAX_BAGGAGE_ENTRIES)
        .collect()
}

fn format_baggage(baggage: &BTreeMap<String, String>) -> String {
    baggage
        .iter()
        .map(|(key, value)| format!("{key}={}", percent_encode(value)))
        .collect::<Vec<_>>()
        .join(",")
}

fn percent_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'!' | b'#'..=b'+' | b'-'..=b':' | b'<' | b'>'..=b'[' | b']'..=b'~'
                if byte != b'%' =>
            {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

fn percent_decode(value: &str) -> Option<String> {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = value.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARENT: &str = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";

    fn carrier(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_extract_continues_trace() {
        let ctx = TraceContext::extract(&carrier(&[(TRACEPARENT, PARENT)]));
        assert_eq!(ctx.trace_id().to_string(), "4bf92f3577b34da6a3ce929d0e0e4736");
        assert_eq!(
            ctx.parent_span_id().map(|s| s.to_string()).as_deref(),
            Some("00f067aa0ba902b7")
        );
        assert_ne!(ctx.span_id().to_string(), "00f067aa0ba902b7");
    }

    #[test]
    fn test_malformed_traceparent_starts_new_trace() {
        for bad in [
            "garbage",
            "00-00000000000000000000000000000000-00f067aa0ba902b7-01",
            "ff-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01-extra",
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-1",
        ] {
            let ctx = TraceContext::extract(&carrier(&[(TRACEPARENT, bad)]));
            assert!(ctx.parent_span_id().is_none(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_child_keeps_trace_and_baggage() {
        let root = TraceContext::new_root().with_baggage("session", "s-1");
        let child = root.child();
        assert_eq!(child.trace_id(), root.trace_id());
        assert_eq!(child.parent_span_id(), Some(root.span_id()));
        assert_eq!(child.baggage_item("session"), Some("s-1"));
    }

    #[test]
    fn test_inject_then_extract() {
        let ctx = TraceContext::new_root()
            .with_baggage("synthetic_request", "true")
            .with_baggage("note", "a b,c=d%");
        let mut headers = BTreeMap::new();
        ctx.inject(&mut headers);

        assert!(headers[BAGGAGE].contains("note=a%20b%2Cc%3Dd%25"));

        let back = TraceContext::extract(&headers);
        assert_eq!(back.trace_id(), ctx.trace_id());
        assert_eq!(back.baggage(), ctx.baggage());
    }

    #[test]
    fn test_baggage_ignores_properties_and_junk() {
        let ctx = TraceContext::extract(&carrier(&[(BAGGAGE, "a=1;prop=x, =2,b,c=%ZZ,d=4")]));
        assert_eq!(ctx.baggage_item("a"), Some("1"));
        assert_eq!(ctx.baggage_item("d"), Some("4"));
        assert_eq!(ctx.baggage().len(), 2);
    }

    #[test]
    fn test_header_map_carrier() {
        let ctx = TraceContext::new_root().with_baggage("k", "v");
        let mut headers = HeaderMap::new();
        ctx.inject(&mut headers);
        assert_eq!(Extractor::get(&headers, TRACEPARENT), Some(ctx.traceparent().as_str()));
        assert_eq!(TraceContext::extract(&headers).trace_id(), ctx.trace_id());
    }
}
