use crate::http::{full_body, make_error_response};
use http_body_util::combinators::BoxBody;
use hyper::body::{Bytes, Incoming};
use hyper::header::{CONTENT_TYPE, HeaderValue};
use hyper::service::Service;
use hyper::{Method, Request, Response, StatusCode};
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// What the admin listener reports about the service it sits next to.
pub trait AdminProbe: Send + Sync + 'static {
    fn is_ready(&self) -> bool;

    /// Arbitrary JSON served on `/status`.
    fn status(&self) -> serde_json::Value;
}

/// Serves `/health`, `/ready` and `/status` on the admin listener.
pub struct AdminService<P> {
    probe: Arc<P>,
}

impl<P: AdminProbe> AdminService<P> {
    pub fn new(probe: Arc<P>) -> Self {
        Self { probe }
    }

    fn respond(&self, method: &Method, path: &str) -> Response<BoxBody<Bytes, Infallible>> {
        if method != Method::GET {
            return make_error_response(StatusCode::METHOD_NOT_ALLOWED);
        }

        match path {
            "/health" => Response::new(full_body("ok\n")),
            "/ready" if self.probe.is_ready() => Response::new(full_body("ok\n")),
            "/ready" => make_error_response(StatusCode::SERVICE_UNAVAILABLE),
            "/status" => {
                let mut response = Response::new(full_body(self.probe.status().to_string()));
                response
                    .headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                response
            }
            _ => make_error_response(StatusCode::NOT_FOUND),
        }
    }
}

impl<P: AdminProbe> Service<Request<Incoming>> for AdminService<P> {
    type Response = Response<BoxBody<Bytes, Infallible>>;
    type Error = Infallible;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let res = self.respond(req.method(), req.uri().path());
        Box::pin(async move { Ok(res) })
    }
}
