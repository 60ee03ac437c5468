//! JSON API. Every response, failures included, is wrapped in the envelope
//! from [`response`].

pub mod auth;
pub mod catalog;
pub mod ideas;
pub mod response;
pub mod users;
pub mod votes;

use actix_web::{error, web, HttpRequest};
use response::{ok, ApiError, ApiResult, Rejection};

pub async fn health(req: HttpRequest) -> ApiResult {
    Ok(ok(&req, Some("ideabox server is running"), ()))
}

fn bad_request(req: &HttpRequest, err: impl std::fmt::Display) -> error::Error {
    Rejection::new(req, ApiError::BadRequest(err.to_string())).into()
}

/// Extractor settings so that malformed input is answered in the envelope too.
pub fn configure_extractors(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, req| bad_request(req, err)))
        .app_data(web::PathConfig::default().error_handler(|err, req| bad_request(req, err)))
        .app_data(web::QueryConfig::default().error_handler(|err, req| bad_request(req, err)));
}
