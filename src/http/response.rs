use crate::services::vote::VoteError;
use actix::MailboxError;
use actix_web::{http::StatusCode, HttpRequest, HttpResponse, ResponseError};
use color_eyre::eyre::Report;
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SuccessEnvelope<'a, T> {
    req_path: &'a str,
    success: SuccessBody<'a, T>,
}

#[derive(Serialize)]
struct SuccessBody<'a, T> {
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorEnvelope<'a> {
    req_path: &'a str,
    error: ErrorBody<'a>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    message: &'a str,
}

pub fn ok<T: Serialize>(req: &HttpRequest, message: Option<&str>, data: T) -> HttpResponse {
    reply(req, StatusCode::OK, message, data)
}

pub fn created<T: Serialize>(req: &HttpRequest, message: &str, data: T) -> HttpResponse {
    reply(req, StatusCode::CREATED, Some(message), data)
}

fn reply<T: Serialize>(
    req: &HttpRequest,
    status: StatusCode,
    message: Option<&str>,
    data: T,
) -> HttpResponse {
    HttpResponse::build(status).json(SuccessEnvelope {
        req_path: req.path(),
        success: SuccessBody { data, message },
    })
}

/// Failure of a request, before it is tied to the request path.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Vote(#[from] VoteError),
    #[error("internal server error")]
    Internal(Report),
}

impl From<Report> for ApiError {
    fn from(report: Report) -> Self {
        ApiError::Internal(report)
    }
}

impl From<MailboxError> for ApiError {
    fn from(err: MailboxError) -> Self {
        ApiError::Internal(Report::new(err))
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Vote(err) => match err {
                VoteError::NotFound(_) => StatusCode::NOT_FOUND,
                VoteError::DuplicateVote(_) | VoteError::NoSuchVote(_) => StatusCode::CONFLICT,
                VoteError::ConsistencyViolation(_) | VoteError::Storage(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the client. Server-side failures stay generic.
    pub fn public_message(&self) -> String {
        if self.status().is_server_error() {
            "internal server error".to_owned()
        } else {
            self.to_string()
        }
    }
}

/// An [`ApiError`] rendered in the response envelope of the request it failed.
#[derive(Debug)]
pub struct Rejection {
    req_path: String,
    error: ApiError,
}

impl Rejection {
    pub fn new(req: &HttpRequest, error: ApiError) -> Self {
        Self {
            req_path: req.path().to_owned(),
            error,
        }
    }

    pub fn error(&self) -> &ApiError {
        &self.error
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.req_path, self.error)
    }
}

impl ResponseError for Rejection {
    fn status_code(&self) -> StatusCode {
        self.error.status()
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        match &self.error {
            ApiError::Internal(report) | ApiError::Vote(VoteError::Storage(report)) => {
                error!(req_path = self.req_path.as_str(), "Request failed: {:?}", report)
            }
            // Consistency violations are logged where they are detected
            ApiError::Vote(VoteError::ConsistencyViolation(_)) => {}
            err => warn!(req_path = self.req_path.as_str(), %status, "Request rejected: {}", err),
        }
        HttpResponse::build(status).json(ErrorEnvelope {
            req_path: &self.req_path,
            error: ErrorBody {
                message: &self.error.public_message(),
            },
        })
    }
}

/// Ties an error to the request it failed.
pub trait AtPath<T> {
    fn at(self, req: &HttpRequest) -> Result<T, Rejection>;
}

impl<T, E> AtPath<T> for Result<T, E>
where
    E: Into<ApiError>,
{
    fn at(self, req: &HttpRequest) -> Result<T, Rejection> {
        self.map_err(|err| Rejection::new(req, err.into()))
    }
}

pub type ApiResult = Result<HttpResponse, Rejection>;
