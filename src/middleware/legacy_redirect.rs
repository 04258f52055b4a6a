//! Permanent redirects from legacy media URLs to the storage proxy.
//!
//! Old pages link media as `/uploads/{dir}/{file}` or `/{alias}/{file}`.
//! Those requests are answered with `301 Moved Permanently` pointing at the
//! canonical `/api/storage-proxy/...` location; everything else passes
//! through untouched.

use std::future::{Ready, ready};
use std::sync::Arc;

use actix_web::body::{BoxBody, EitherBody};
use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready};
use actix_web::http::{Method, header};
use actix_web::{Error, HttpResponse};
use futures_util::future::LocalBoxFuture;
use tracing::debug;

use crate::services::normalizer::{CanonicalPath, LEGACY_UPLOADS_SEGMENT, Normalizer};

/// Canonical location for a legacy media request path, if it is one.
pub fn legacy_redirect_target(normalizer: &Normalizer, path: &str) -> Option<String> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let (first, last) = (segments.first()?, segments.last()?);

    if segments.len() < 2 || first.eq_ignore_ascii_case("api") {
        return None;
    }
    if !(first.eq_ignore_ascii_case(LEGACY_UPLOADS_SEGMENT)
        || normalizer.registry().lookup(first).is_some())
    {
        return None;
    }
    if last.starts_with('.') || !last.contains('.') {
        return None;
    }

    let canonical = normalizer.normalize(path, None);
    (canonical != path && CanonicalPath::parse(&canonical).is_some()).then_some(canonical)
}

/// Legacy redirect middleware factory.
pub struct LegacyRedirect {
    normalizer: Arc<Normalizer>,
}

impl LegacyRedirect {
    pub fn new(normalizer: Arc<Normalizer>) -> Self {
        Self { normalizer }
    }
}

impl<S, B> Transform<S, ServiceRequest> for LegacyRedirect
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B, BoxBody>>;
    type Error = Error;
    type InitError = ();
    type Transform = LegacyRedirectMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(LegacyRedirectMiddleware {
            service,
            normalizer: self.normalizer.clone(),
        }))
    }
}

/// Legacy redirect middleware service.
pub struct LegacyRedirectMiddleware<S> {
    service: S,
    normalizer: Arc<Normalizer>,
}

impl<S, B> Service<ServiceRequest> for LegacyRedirectMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B, BoxBody>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let target = if req.method() == Method::GET || req.method() == Method::HEAD {
            legacy_redirect_target(&self.normalizer, req.path())
        } else {
            None
        };

        if let Some(location) = target {
            debug!(target: "media", from = %req.path(), to = %location, "Redirecting legacy media URL");
            return Box::pin(async move {
                let response = HttpResponse::MovedPermanently()
                    .insert_header((header::LOCATION, location))
                    .finish()
                    .map_into_right_body();
                Ok(req.into_response(response))
            });
        }

        let fut = self.service.call(req);
        Box::pin(async move {
            let res = fut.await?;
            Ok(res.map_into_left_body())
        })
    }
}
