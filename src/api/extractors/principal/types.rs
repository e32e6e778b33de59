/*
 * Responsibility
 * - The "who is calling" type seen by the authorization stage and handlers
 * - Filled in by middleware::auth::access; handlers only ever read it
 */
use crate::services::auth::Session;
use crate::services::auth::access_jwt::VerifiedAccessToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthSource {
    /// Browser session cookie.
    Session,
    /// `Authorization: Bearer` access token.
    BearerToken,
}

/// An authenticated caller.
#[derive(Debug, Clone)]
pub struct Principal {
    pub subject: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub source: AuthSource,
}

impl Principal {
    pub fn from_session(session: Session) -> Self {
        Self {
            subject: session.subject,
            email: session.email,
            name: session.name,
            source: AuthSource::Session,
        }
    }

    pub fn from_token(token: VerifiedAccessToken) -> Self {
        Self {
            subject: token.subject,
            email: token.email,
            name: token.name,
            source: AuthSource::BearerToken,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn session_principal_carries_identity_only() {
        let principal = Principal::from_session(Session {
            subject: "auth0|7".into(),
            email: Some("g@h.io".into()),
            name: Some("Grace".into()),
            id_token: Some("h.p.s".into()),
            created_at: Utc::now(),
        });

        assert_eq!(principal.subject, "auth0|7");
        assert_eq!(principal.email.as_deref(), Some("g@h.io"));
        assert_eq!(principal.source, AuthSource::Session);
    }
}
