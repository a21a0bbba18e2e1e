//! Identity gateway: Google sign-in and the authentication check every
//! protected route runs first.

pub mod common;
pub mod google_oauth;

pub use google_oauth::{AuthError, CallbackParams, GoogleIdentity, OAuthEndpoints};

use chrono::{DateTime, Duration, Utc};

use crate::session::Session;

/// Tokens this close to expiry are treated as already expired.
pub const TOKEN_EXPIRY_LEEWAY_SECS: i64 = 60;

/// True when the session holds a token that is still usable.
pub fn is_authenticated(session: &Session) -> bool {
    is_authenticated_at(session, Utc::now())
}

pub fn is_authenticated_at(session: &Session, now: DateTime<Utc>) -> bool {
    session.token.as_ref().is_some_and(|token| {
        !token.secret.is_empty()
            && !token.is_expired(now, Duration::seconds(TOKEN_EXPIRY_LEEWAY_SECS))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{AccessToken, SessionStore};

    fn fresh_session() -> Session {
        let store = SessionStore::new("k", "c", Duration::hours(1), false).unwrap();
        let id = store.create();
        store.get(&id).unwrap()
    }

    #[test]
    fn session_without_token_is_anonymous() {
        assert!(!is_authenticated(&fresh_session()));
    }

    #[test]
    fn valid_token_authenticates() {
        let mut session = fresh_session();
        session.token = Some(AccessToken::new("tok", Some(Utc::now() + Duration::hours(1))));
        assert!(is_authenticated(&session));
    }

    #[test]
    fn nearly_expired_token_does_not_authenticate() {
        let now = Utc::now();
        let mut session = fresh_session();
        session.token = Some(AccessToken::new("tok", Some(now + Duration::seconds(30))));
        assert!(!is_authenticated_at(&session, now));
    }

    #[test]
    fn empty_token_does_not_authenticate() {
        let mut session = fresh_session();
        session.token = Some(AccessToken::new("", None));
        assert!(!is_authenticated(&session));
    }
}
