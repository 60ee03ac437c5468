use super::response::{ApiError, Rejection};
use crate::db::{
    user::{UserById, UserId},
    DbExecutor,
};
use crate::span::SpanMessage;
use actix::SystemService;
use actix_web::{dev::Payload, FromRequest, HttpRequest};
use futures::future::LocalBoxFuture;
use sqlx::types::Uuid;
use tracing::debug;

/// Header carrying the id of the calling user. Verifying that the caller owns
/// the id is left to whatever sits in front of this server.
pub const USER_ID_HEADER: &str = "X-User-Id";

/// Looks up the user named by [`USER_ID_HEADER`]. `None` when the header is
/// absent; an error when it is malformed or names no user.
async fn resolve_caller(header: Option<Result<Uuid, String>>) -> Result<Option<UserId>, ApiError> {
    let user_id = match header {
        None => return Ok(None),
        Some(Ok(uuid)) => UserId(uuid),
        Some(Err(raw)) => {
            return Err(ApiError::Unauthorized(format!(
                "invalid {} header: {:?}",
                USER_ID_HEADER, raw
            )))
        }
    };
    let user = DbExecutor::from_registry()
        .send(SpanMessage::new(UserById(user_id.clone())))
        .await??;
    match user {
        Some(user) => {
            debug!(user_id = user.id.as_string().as_str(), "Caller identified");
            Ok(Some(user.id))
        }
        None => Err(ApiError::Unauthorized(format!(
            "unknown user {}",
            user_id.as_string()
        ))),
    }
}

fn read_header(req: &HttpRequest) -> Option<Result<Uuid, String>> {
    let value = req.headers().get(USER_ID_HEADER)?;
    let raw = String::from_utf8_lossy(value.as_bytes()).into_owned();
    Some(Uuid::parse_str(raw.trim()).map_err(|_| raw))
}

/// Caller that must be identified.
#[derive(Clone, Debug)]
pub struct AuthenticatedUser(pub UserId);

impl FromRequest for AuthenticatedUser {
    type Error = Rejection;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let req = req.clone();
        let header = read_header(&req);
        Box::pin(async move {
            match resolve_caller(header).await {
                Ok(Some(user_id)) => Ok(AuthenticatedUser(user_id)),
                Ok(None) => Err(Rejection::new(
                    &req,
                    ApiError::Unauthorized(format!("missing {} header", USER_ID_HEADER)),
                )),
                Err(err) => Err(Rejection::new(&req, err)),
            }
        })
    }
}

/// Caller that may be anonymous. A header that is present must still be valid.
#[derive(Clone, Debug)]
pub struct Caller(pub Option<UserId>);

impl FromRequest for Caller {
    type Error = Rejection;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let req = req.clone();
        let header = read_header(&req);
        Box::pin(async move {
            resolve_caller(header)
                .await
                .map(Caller)
                .map_err(|err| Rejection::new(&req, err))
        })
    }
}
