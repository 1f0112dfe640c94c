use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Method, Request, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use crudapi_api::{ApiError, JSONAPI_MEDIA_TYPE};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

// Request ID middleware: propagate an incoming x-request-id or generate one.
pub async fn request_id(mut req: Request<Body>, next: Next) -> Response {
    let header_name = HeaderName::from_static(REQUEST_ID_HEADER);

    let req_id_value = match req.headers().get(&header_name) {
        Some(value) => value.clone(),
        None => match HeaderValue::from_str(&Uuid::new_v4().to_string()) {
            Ok(value) => value,
            Err(_) => return next.run(req).await,
        },
    };

    // Downstream layers (the trace span) read it from extensions
    req.extensions_mut().insert(req_id_value.clone());

    let mut res = next.run(req).await;
    res.headers_mut().insert(header_name, req_id_value);
    res
}

// Content negotiation: JSON:API or plain JSON in Accept, and a JSON body type
// whenever a body is sent.
pub async fn content_negotiation(req: Request<Body>, next: Next) -> Response {
    let accept = req
        .headers()
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok());
    if let Some(accept) = accept {
        if !accept_ok(accept) {
            return ApiError::not_acceptable(format!(
                "Accept must allow {JSONAPI_MEDIA_TYPE} without media type parameters"
            ))
            .into_response();
        }
    }

    if carries_body(&req) {
        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok());
        if !content_type.is_some_and(content_type_ok) {
            return ApiError::unsupported_media_type(format!(
                "Content-Type must be {JSONAPI_MEDIA_TYPE} or application/json"
            ))
            .into_response();
        }
    }

    next.run(req).await
}

fn media_ranges(value: &str) -> impl Iterator<Item = (String, bool)> + '_ {
    value.split(',').map(|range| {
        let mut parts = range.split(';');
        let media = parts.next().unwrap_or("").trim().to_ascii_lowercase();
        let has_params = parts.any(|p| {
            let name = p.split('=').next().unwrap_or("").trim().to_ascii_lowercase();
            !name.is_empty() && name != "q" && name != "charset"
        });
        (media, has_params)
    })
}

fn accept_ok(value: &str) -> bool {
    media_ranges(value).any(|(media, has_params)| match media.as_str() {
        JSONAPI_MEDIA_TYPE => !has_params,
        "application/json" | "application/*" | "*/*" => true,
        _ => false,
    })
}

fn content_type_ok(value: &str) -> bool {
    media_ranges(value).next().is_some_and(|(media, has_params)| {
        (media == JSONAPI_MEDIA_TYPE && !has_params) || media == "application/json"
    })
}

fn carries_body(req: &Request<Body>) -> bool {
    if !matches!(
        *req.method(),
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    ) {
        return false;
    }
    if req.headers().contains_key(header::TRANSFER_ENCODING) {
        return true;
    }
    req.headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .is_some_and(|len| len > 0)
}
