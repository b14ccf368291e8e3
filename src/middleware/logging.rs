//! Per-request logging with a request id.
//!
//! Every request gets a fresh UUID stored in its extensions (handlers reuse it
//! as the transcode session id) and echoed back in the `x-request-id` header.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderName, HeaderValue},
    Error, HttpMessage, HttpRequest,
};
use futures_util::future::LocalBoxFuture;
use std::{
    future::{ready, Ready},
    time::Instant,
};
use tracing::{error, info};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Request id assigned by `RequestLogging`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestId(pub Uuid);

impl RequestId {
    /// The id of `req`, or a fresh one when the middleware isn't mounted.
    pub fn of(req: &HttpRequest) -> Self {
        req.extensions()
            .get::<RequestId>()
            .copied()
            .unwrap_or_else(|| RequestId(Uuid::new_v4()))
    }
}

pub struct RequestLogging;

impl<S, B> Transform<S, ServiceRequest> for RequestLogging
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RequestLoggingMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequestLoggingMiddleware { service }))
    }
}

pub struct RequestLoggingMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for RequestLoggingMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let start_time = Instant::now();
        let request_id = Uuid::new_v4();
        req.extensions_mut().insert(RequestId(request_id));

        let method = req.method().to_string();
        let path = req.path().to_string();
        let content_length = req
            .headers()
            .get(actix_web::http::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);

        info!(
            request_id = %request_id,
            method = %method,
            path = %path,
            content_length,
            "Request started"
        );

        let fut = self.service.call(req);

        Box::pin(async move {
            let result = fut.await;
            let duration_ms = start_time.elapsed().as_millis();

            match result {
                Ok(mut response) => {
                    // Streaming bodies are still running here; this marks the headers going out.
                    info!(
                        request_id = %request_id,
                        method = %method,
                        path = %path,
                        status = response.status().as_u16(),
                        duration_ms = %duration_ms,
                        "Request completed"
                    );
                    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
                        response
                            .headers_mut()
                            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
                    }
                    Ok(response)
                }
                Err(err) => {
                    error!(
                        request_id = %request_id,
                        method = %method,
                        path = %path,
                        duration_ms = %duration_ms,
                        error = %err,
                        "Request failed"
                    );
                    Err(err)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, web, App, HttpResponse};

    async fn echo_id(req: HttpRequest) -> HttpResponse {
        HttpResponse::Ok().body(RequestId::of(&req).0.to_string())
    }

    #[actix_web::test]
    async fn test_request_id_header_matches_extension() {
        let app = test::init_service(
            App::new().wrap(RequestLogging).route("/id", web::get().to(echo_id)),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/id").to_request()).await;
        let header = resp
            .headers()
            .get(REQUEST_ID_HEADER)
            .expect("request id header")
            .to_str()
            .unwrap()
            .to_string();
        let body = test::read_body(resp).await;

        assert_eq!(header.as_bytes(), &body[..]);
        assert!(Uuid::parse_str(&header).is_ok());
    }
}
