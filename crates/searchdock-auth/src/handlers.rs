use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use crate::{AccessLevel, AuthHandler, AuthMode, AuthOutcome, AuthRequest};

/// Validates the `api-key` header against the configured admin and query
/// keys. A present-but-wrong key is an explicit failure: the chain stops.
pub struct ApiKeyHandler {
    admin_key: Option<String>,
    query_key: Option<String>,
}

impl ApiKeyHandler {
    pub fn new(admin_key: Option<String>, query_key: Option<String>) -> Self {
        Self { admin_key, query_key }
    }
}

impl AuthHandler for ApiKeyHandler {
    fn mode(&self) -> AuthMode {
        AuthMode::ApiKey
    }

    fn priority(&self) -> u8 {
        10
    }

    fn can_handle(&self, request: &AuthRequest) -> bool {
        request.api_key.is_some()
    }

    fn authenticate(&self, request: &AuthRequest) -> AuthOutcome {
        let Some(key) = request.api_key.as_deref() else {
            return AuthOutcome::NoCredentials;
        };
        if self.admin_key.as_deref() == Some(key) {
            return AuthOutcome::Success { mode: AuthMode::ApiKey, level: AccessLevel::FullAccess };
        }
        if self.query_key.as_deref() == Some(key) {
            return AuthOutcome::Success {
                mode: AuthMode::ApiKey,
                level: AccessLevel::IndexDataReader,
            };
        }
        AuthOutcome::Failure {
            mode: AuthMode::ApiKey,
            message: "The provided api-key does not match any configured key.".to_string(),
        }
    }
}

/// Accepts bearer tokens of the shape `simulated` (full access) or
/// `simulated:<accessLevel>`. Anything else is left for later handlers.
pub struct SimulatedHandler;

impl AuthHandler for SimulatedHandler {
    fn mode(&self) -> AuthMode {
        AuthMode::Simulated
    }

    fn priority(&self) -> u8 {
        20
    }

    fn can_handle(&self, request: &AuthRequest) -> bool {
        request.bearer_token.is_some()
    }

    fn authenticate(&self, request: &AuthRequest) -> AuthOutcome {
        let Some(token) = request.bearer_token.as_deref() else {
            return AuthOutcome::NoCredentials;
        };
        if token == "simulated" {
            return AuthOutcome::Success {
                mode: AuthMode::Simulated,
                level: AccessLevel::FullAccess,
            };
        }
        let Some(level) = token.strip_prefix("simulated:") else {
            return AuthOutcome::NoCredentials;
        };
        match level.parse::<AccessLevel>() {
            Ok(level) => AuthOutcome::Success { mode: AuthMode::Simulated, level },
            Err(e) => AuthOutcome::Failure { mode: AuthMode::Simulated, message: e.to_string() },
        }
    }
}

/// Decodes a JWT bearer token and maps its role claims to an access level.
///
/// The emulator trusts the caller: signature validation is disabled, as are
/// expiry and audience checks. What matters is that clients exercise the
/// same header shape they will use against the real service.
pub struct EntraIdHandler;

#[derive(Debug, Deserialize)]
struct TokenClaims {
    #[serde(default)]
    roles: Vec<String>,
}

fn role_to_level(role: &str) -> Option<AccessLevel> {
    match role {
        "Search Index Data Reader" => Some(AccessLevel::IndexDataReader),
        "Reader" => Some(AccessLevel::Reader),
        "Search Index Data Contributor" => Some(AccessLevel::IndexDataContributor),
        "Search Service Contributor" => Some(AccessLevel::ServiceContributor),
        "Contributor" | "Owner" => Some(AccessLevel::Contributor),
        _ => None,
    }
}

impl AuthHandler for EntraIdHandler {
    fn mode(&self) -> AuthMode {
        AuthMode::EntraId
    }

    fn priority(&self) -> u8 {
        30
    }

    fn can_handle(&self, request: &AuthRequest) -> bool {
        request.bearer_token.is_some()
    }

    fn authenticate(&self, request: &AuthRequest) -> AuthOutcome {
        let Some(token) = request.bearer_token.as_deref() else {
            return AuthOutcome::NoCredentials;
        };

        let mut validation = Validation::new(Algorithm::RS256);
        validation.insecure_disable_signature_validation();
        validation.algorithms = vec![Algorithm::RS256, Algorithm::HS256];
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let decoded = jsonwebtoken::decode::<TokenClaims>(
            token,
            &DecodingKey::from_secret(&[]),
            &validation,
        );
        match decoded {
            Ok(data) => {
                // the strongest granted role wins
                let level = data
                    .claims
                    .roles
                    .iter()
                    .filter_map(|role| role_to_level(role))
                    .fold(AccessLevel::None, |best, candidate| {
                        if candidate.satisfies(best) {
                            candidate
                        } else {
                            best
                        }
                    });
                AuthOutcome::Success { mode: AuthMode::EntraId, level }
            }
            Err(e) => AuthOutcome::Failure {
                mode: AuthMode::EntraId,
                message: format!("The bearer token is not a decodable JWT: {e}."),
            },
        }
    }
}
