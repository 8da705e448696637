use axum::{
    extract::Request,
    http::{header::HeaderName, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use tracing::Instrument;
use uuid::Uuid;

pub const TRACE_ID_HEADER: &str = "x-trace-id";

/// Longest client-supplied trace id we accept before minting our own.
const MAX_TRACE_ID_LEN: usize = 64;

#[derive(Clone, Debug)]
pub struct RequestTraceContext {
    pub trace_id: String,
}

/// Trace id supplied by the caller, if it is usable as-is.
fn incoming_trace_id(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(TRACE_ID_HEADER)?.to_str().ok()?.trim();
    if value.is_empty() || value.len() > MAX_TRACE_ID_LEN {
        return None;
    }
    Some(value.to_string())
}

/// Ensures every request/response pair carries a trace identifier and runs
/// the handler inside a span tagged with it, so the log lines of one sprint
/// start or synthesis call can be pulled out as a unit.
pub async fn trace_context_middleware(mut request: Request, next: Next) -> Response {
    let trace_id =
        incoming_trace_id(request.headers()).unwrap_or_else(|| Uuid::new_v4().to_string());

    request.extensions_mut().insert(RequestTraceContext {
        trace_id: trace_id.clone(),
    });

    if let Ok(header_value) = HeaderValue::from_str(&trace_id) {
        request
            .headers_mut()
            .insert(HeaderName::from_static(TRACE_ID_HEADER), header_value);
    }

    let span = tracing::info_span!("request", trace_id = %trace_id);
    let mut response = next.run(request).instrument(span).await;

    if response.headers().get(TRACE_ID_HEADER).is_none() {
        if let Ok(value) = HeaderValue::from_str(&trace_id) {
            response
                .headers_mut()
                .insert(HeaderName::from_static(TRACE_ID_HEADER), value);
        }
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incoming_id_is_reused() {
        let mut headers = HeaderMap::new();
        headers.insert(TRACE_ID_HEADER, "abc-123".parse().unwrap());
        assert_eq!(incoming_trace_id(&headers), Some("abc-123".to_string()));
    }

    #[test]
    fn blank_or_oversized_ids_are_replaced() {
        let mut headers = HeaderMap::new();
        headers.insert(TRACE_ID_HEADER, "   ".parse().unwrap());
        assert_eq!(incoming_trace_id(&headers), None);

        let mut headers = HeaderMap::new();
        headers.insert(TRACE_ID_HEADER, "x".repeat(65).parse().unwrap());
        assert_eq!(incoming_trace_id(&headers), None);
    }

    #[test]
    fn missing_header_yields_none() {
        let headers = HeaderMap::new();
        assert_eq!(incoming_trace_id(&headers), None);
    }
}
