//! Caller authentication for HTTP requests and real-time connections
//!
//! Staff present a signed HS256 token. End users present their id and a
//! declared role; declaring `staff` without a signed token is rejected.

pub mod jwt;
pub mod middleware;

pub use jwt::{JwtError, StaffTokenVerifier};
pub use middleware::require_auth;

use tourline_shared::{ChatError, ChatResult, Identity, Role};
use uuid::Uuid;

/// Raw credentials as presented by a client
#[derive(Debug, Default, Clone)]
pub struct Credentials {
    pub token: Option<String>,
    pub user_id: Option<String>,
    pub role: Option<String>,
}

/// Resolve credentials into an identity, or fail with `ChatError::Auth`
pub fn authenticate(verifier: &StaffTokenVerifier, credentials: &Credentials) -> ChatResult<Identity> {
    if let Some(token) = credentials.token.as_deref().filter(|t| !t.is_empty()) {
        return verifier
            .verify(token)
            .map(Identity::staff)
            .map_err(|e| {
                tracing::warn!(error = %e, "Staff token rejected");
                ChatError::Auth(e.to_string())
            });
    }

    let Some(raw_id) = credentials.user_id.as_deref().filter(|id| !id.is_empty()) else {
        return Err(ChatError::Auth("Missing credentials".to_string()));
    };
    let user_id = Uuid::parse_str(raw_id)
        .map_err(|_| ChatError::Auth("Malformed user id".to_string()))?;

    match credentials.role.as_deref().map(Role::parse) {
        None | Some(Some(Role::User)) => Ok(Identity::user(user_id)),
        Some(Some(Role::Staff)) => Err(ChatError::Auth(
            "Staff role requires a signed token".to_string(),
        )),
        Some(None) => Err(ChatError::Auth("Unknown role".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn verifier() -> StaffTokenVerifier {
        StaffTokenVerifier::new("test-secret-key-at-least-32-chars!")
    }

    #[test]
    fn test_user_identity_from_declared_id() {
        let id = Uuid::new_v4();
        let creds = Credentials {
            user_id: Some(id.to_string()),
            role: Some("user".to_string()),
            ..Default::default()
        };
        assert_eq!(authenticate(&verifier(), &creds).unwrap(), Identity::user(id));
    }

    #[test]
    fn test_staff_identity_from_token() {
        let v = verifier();
        let staff = Uuid::new_v4();
        let creds = Credentials {
            token: Some(v.issue(staff, Duration::hours(1)).unwrap()),
            ..Default::default()
        };
        assert_eq!(authenticate(&v, &creds).unwrap(), Identity::staff(staff));
    }

    #[test]
    fn test_rejections() {
        let v = verifier();
        assert!(matches!(
            authenticate(&v, &Credentials::default()),
            Err(ChatError::Auth(_))
        ));

        let declared_staff = Credentials {
            user_id: Some(Uuid::new_v4().to_string()),
            role: Some("staff".to_string()),
            ..Default::default()
        };
        assert!(matches!(authenticate(&v, &declared_staff), Err(ChatError::Auth(_))));

        let garbage_token = Credentials {
            token: Some("not-a-jwt".to_string()),
            user_id: Some(Uuid::new_v4().to_string()),
            ..Default::default()
        };
        assert!(matches!(authenticate(&v, &garbage_token), Err(ChatError::Auth(_))));

        let bad_id = Credentials {
            user_id: Some("nope".to_string()),
            ..Default::default()
        };
        assert!(matches!(authenticate(&v, &bad_id), Err(ChatError::Auth(_))));
    }
}
