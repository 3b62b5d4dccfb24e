//! The authentication extractor: every guarded route declares a policy with
//! the access level it requires; the extractor runs the handler chain and
//! enforces the level before the handler body executes.

use std::marker::PhantomData;
use std::ops::Deref;

use actix_web::dev::Payload;
use actix_web::http::header::AUTHORIZATION;
use actix_web::web::Data;
use actix_web::{FromRequest, HttpRequest};
use futures::future::LocalBoxFuture;
use searchdock_auth::{AccessLevel, AuthController, AuthOutcome, AuthRequest};
use searchdock_types::error::{Code, ResponseError};

pub mod policies {
    use searchdock_auth::AccessLevel;

    pub trait Policy {
        const REQUIRED: AccessLevel;
    }

    /// Query-side verbs: search, suggest, autocomplete, lookups, counts.
    pub struct IndexDataReaderPolicy;
    impl Policy for IndexDataReaderPolicy {
        const REQUIRED: AccessLevel = AccessLevel::IndexDataReader;
    }

    /// Document batch writes.
    pub struct IndexDataContributorPolicy;
    impl Policy for IndexDataContributorPolicy {
        const REQUIRED: AccessLevel = AccessLevel::IndexDataContributor;
    }

    /// Control-plane CRUD and indexer management.
    pub struct ServiceContributorPolicy;
    impl Policy for ServiceContributorPolicy {
        const REQUIRED: AccessLevel = AccessLevel::ServiceContributor;
    }
}

use policies::Policy;

/// Handler data that only materializes once the request passed the policy.
pub struct GuardedData<P, D> {
    data: D,
    level: AccessLevel,
    _marker: PhantomData<P>,
}

impl<P, D> GuardedData<P, D> {
    pub fn level(&self) -> AccessLevel {
        self.level
    }
}

impl<P, D> Deref for GuardedData<P, D> {
    type Target = D;

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

pub fn credentials_from_request(req: &HttpRequest) -> AuthRequest {
    let api_key = req
        .headers()
        .get("api-key")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let bearer_token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string);
    AuthRequest { api_key, bearer_token }
}

impl<P: Policy, D: FromRequest + 'static> FromRequest for GuardedData<P, D>
where
    D::Future: 'static,
{
    type Error = ResponseError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, payload: &mut Payload) -> Self::Future {
        let controller = req.app_data::<Data<AuthController>>().cloned();
        let credentials = credentials_from_request(req);
        let data_future = D::from_request(req, payload);

        Box::pin(async move {
            let Some(controller) = controller else {
                return Err(ResponseError::from_msg(
                    "The authentication controller is not configured.".to_string(),
                    Code::InternalServerError,
                ));
            };

            let level = match controller.authenticate(&credentials) {
                AuthOutcome::Success { level, .. } => level,
                AuthOutcome::Failure { message, .. } => {
                    return Err(ResponseError::from_msg(message, Code::InvalidApiKey));
                }
                AuthOutcome::NoCredentials => {
                    return Err(ResponseError::from_msg(
                        "The request carries no credentials. Provide an `api-key` header or an `Authorization: Bearer` token.".to_string(),
                        Code::InvalidApiKey,
                    ));
                }
            };
            if !level.satisfies(P::REQUIRED) {
                return Err(ResponseError::from_msg(
                    format!(
                        "This operation requires the {:?} access level.",
                        P::REQUIRED
                    ),
                    Code::Forbidden,
                ));
            }

            let data = data_future.await.map_err(|_| {
                ResponseError::from_msg(
                    "Required application data is missing.".to_string(),
                    Code::InternalServerError,
                )
            })?;
            Ok(GuardedData { data, level, _marker: PhantomData })
        })
    }
}
