//! The authentication front: an ordered chain of credential handlers, each
//! advertising a mode and a priority. A request is presented to every
//! applicable handler until one produces a success or fails explicitly;
//! merely having no matching credentials moves on to the next handler.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

mod handlers;

pub use handlers::{ApiKeyHandler, EntraIdHandler, SimulatedHandler};

/// The effective RBAC grade assigned after authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AccessLevel {
    None,
    IndexDataReader,
    Reader,
    IndexDataContributor,
    ServiceContributor,
    Contributor,
    FullAccess,
}

impl AccessLevel {
    fn rank(&self) -> u8 {
        match self {
            AccessLevel::None => 0,
            AccessLevel::IndexDataReader => 1,
            AccessLevel::Reader => 2,
            AccessLevel::IndexDataContributor => 3,
            AccessLevel::ServiceContributor => 4,
            AccessLevel::Contributor => 5,
            AccessLevel::FullAccess => 6,
        }
    }

    pub fn satisfies(&self, required: AccessLevel) -> bool {
        self.rank() >= required.rank()
    }
}

#[derive(Debug, thiserror::Error)]
#[error("`{0}` is not a valid access level")]
pub struct ParseAccessLevelError(String);

impl FromStr for AccessLevel {
    type Err = ParseAccessLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(AccessLevel::None),
            "indexDataReader" => Ok(AccessLevel::IndexDataReader),
            "reader" => Ok(AccessLevel::Reader),
            "indexDataContributor" => Ok(AccessLevel::IndexDataContributor),
            "serviceContributor" => Ok(AccessLevel::ServiceContributor),
            "contributor" => Ok(AccessLevel::Contributor),
            "fullAccess" => Ok(AccessLevel::FullAccess),
            other => Err(ParseAccessLevelError(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthMode {
    ApiKey,
    Simulated,
    EntraId,
}

#[derive(Debug, thiserror::Error)]
#[error("`{0}` is not a valid authentication mode. Expected `apiKey`, `simulated` or `entraId`.")]
pub struct ParseAuthModeError(String);

impl FromStr for AuthMode {
    type Err = ParseAuthModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "apiKey" => Ok(AuthMode::ApiKey),
            "simulated" => Ok(AuthMode::Simulated),
            "entraId" => Ok(AuthMode::EntraId),
            other => Err(ParseAuthModeError(other.to_string())),
        }
    }
}

/// The credentials extracted from a request.
#[derive(Debug, Clone, Default)]
pub struct AuthRequest {
    /// Value of the `api-key` header.
    pub api_key: Option<String>,
    /// Token of an `Authorization: Bearer …` header.
    pub bearer_token: Option<String>,
}

/// Every outcome, including failure, carries enough to answer the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Success { mode: AuthMode, level: AccessLevel },
    Failure { mode: AuthMode, message: String },
    /// The handler found no credentials of its shape; the chain continues.
    NoCredentials,
}

pub trait AuthHandler: Send + Sync {
    fn mode(&self) -> AuthMode;
    /// Lower runs earlier.
    fn priority(&self) -> u8;
    fn can_handle(&self, request: &AuthRequest) -> bool;
    fn authenticate(&self, request: &AuthRequest) -> AuthOutcome;
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub admin_api_key: Option<String>,
    pub query_api_key: Option<String>,
    pub enabled_modes: Vec<AuthMode>,
    pub api_key_takes_precedence: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            admin_api_key: None,
            query_api_key: None,
            enabled_modes: vec![AuthMode::ApiKey, AuthMode::Simulated],
            api_key_takes_precedence: true,
        }
    }
}

pub struct AuthController {
    handlers: Vec<Box<dyn AuthHandler>>,
    api_key_takes_precedence: bool,
}

impl AuthController {
    pub fn new(config: AuthConfig) -> Self {
        let mut handlers: Vec<Box<dyn AuthHandler>> = Vec::new();
        for mode in &config.enabled_modes {
            match mode {
                AuthMode::ApiKey => handlers.push(Box::new(ApiKeyHandler::new(
                    config.admin_api_key.clone(),
                    config.query_api_key.clone(),
                ))),
                AuthMode::Simulated => handlers.push(Box::new(SimulatedHandler)),
                AuthMode::EntraId => handlers.push(Box::new(EntraIdHandler)),
            }
        }
        handlers.sort_by_key(|h| h.priority());
        Self { handlers, api_key_takes_precedence: config.api_key_takes_precedence }
    }

    /// Present the request to each applicable handler in order. When both an
    /// API key and a Bearer token are present and precedence is configured,
    /// the API-key handler runs first.
    pub fn authenticate(&self, request: &AuthRequest) -> AuthOutcome {
        let mut ordered: Vec<&dyn AuthHandler> =
            self.handlers.iter().map(AsRef::as_ref).collect();
        if self.api_key_takes_precedence && request.api_key.is_some() {
            ordered.sort_by_key(|h| (h.mode() != AuthMode::ApiKey, h.priority()));
        }

        for handler in ordered {
            if !handler.can_handle(request) {
                continue;
            }
            match handler.authenticate(request) {
                AuthOutcome::NoCredentials => continue,
                outcome @ AuthOutcome::Success { mode, level } => {
                    tracing::debug!(?mode, ?level, "request authenticated");
                    return outcome;
                }
                outcome @ AuthOutcome::Failure { .. } => return outcome,
            }
        }

        AuthOutcome::NoCredentials
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> AuthController {
        AuthController::new(AuthConfig {
            admin_api_key: Some("admin-key".to_string()),
            query_api_key: Some("query-key".to_string()),
            enabled_modes: vec![AuthMode::ApiKey, AuthMode::Simulated, AuthMode::EntraId],
            api_key_takes_precedence: true,
        })
    }

    #[test]
    fn access_levels_are_ordered() {
        assert!(AccessLevel::FullAccess.satisfies(AccessLevel::IndexDataReader));
        assert!(AccessLevel::IndexDataReader.satisfies(AccessLevel::IndexDataReader));
        assert!(!AccessLevel::IndexDataReader.satisfies(AccessLevel::Contributor));
        assert!(!AccessLevel::None.satisfies(AccessLevel::IndexDataReader));
    }

    #[test]
    fn admin_key_gets_full_access() {
        let outcome = controller().authenticate(&AuthRequest {
            api_key: Some("admin-key".to_string()),
            bearer_token: None,
        });
        assert_eq!(
            outcome,
            AuthOutcome::Success { mode: AuthMode::ApiKey, level: AccessLevel::FullAccess }
        );
    }

    #[test]
    fn query_key_gets_read_access() {
        let outcome = controller().authenticate(&AuthRequest {
            api_key: Some("query-key".to_string()),
            bearer_token: None,
        });
        assert_eq!(
            outcome,
            AuthOutcome::Success { mode: AuthMode::ApiKey, level: AccessLevel::IndexDataReader }
        );
    }

    #[test]
    fn wrong_key_fails_explicitly_without_falling_through() {
        let outcome = controller().authenticate(&AuthRequest {
            api_key: Some("wrong".to_string()),
            bearer_token: Some("simulated".to_string()),
        });
        assert!(matches!(outcome, AuthOutcome::Failure { mode: AuthMode::ApiKey, .. }));
    }

    #[test]
    fn api_key_takes_precedence_over_bearer() {
        let outcome = controller().authenticate(&AuthRequest {
            api_key: Some("admin-key".to_string()),
            bearer_token: Some("simulated:indexDataReader".to_string()),
        });
        assert_eq!(
            outcome,
            AuthOutcome::Success { mode: AuthMode::ApiKey, level: AccessLevel::FullAccess }
        );
    }

    #[test]
    fn simulated_token_grants_requested_level() {
        let outcome = controller().authenticate(&AuthRequest {
            api_key: None,
            bearer_token: Some("simulated:indexDataContributor".to_string()),
        });
        assert_eq!(
            outcome,
            AuthOutcome::Success {
                mode: AuthMode::Simulated,
                level: AccessLevel::IndexDataContributor
            }
        );
    }

    #[test]
    fn no_credentials_at_all() {
        let outcome = controller().authenticate(&AuthRequest::default());
        assert_eq!(outcome, AuthOutcome::NoCredentials);
    }
}
