use std::sync::Arc;

use chrono::{Duration, Utc};
use thiserror::Error;

use crate::{
    util::{hash_secret, random_string, verify_secret},
    Database, DatabaseError, NewSession, NewUser, SessionData, UserData,
};

/// Issues and resolves the credentials presented by clients, both at
/// login and at real-time handshake time.
pub struct Auth<Db> {
    db: Arc<Db>,
}

#[derive(Debug, Error)]
pub enum AuthError {
    /// Username or password is incorrect
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Missing token")]
    MissingToken,
    #[error("Invalid token")]
    InvalidToken,
    #[error("Session has expired")]
    SessionExpired,
    /// Something else went wrong with the database
    #[error(transparent)]
    Db(DatabaseError),
    #[error("HashError: {0}")]
    HashError(String),
}

impl<Db> Auth<Db>
where
    Db: Database,
{
    const SESSION_DURATION_IN_DAYS: usize = 1;

    pub fn new(db: &Arc<Db>) -> Self {
        Self { db: db.clone() }
    }

    /// Logs in a user, returning a new session
    pub async fn login(&self, credentials: Credentials) -> Result<SessionData, AuthError> {
        self.clear_expired().await;

        let user = self
            .db
            .user_by_username(&credentials.username)
            .await
            .map_err(|e| match e {
                DatabaseError::NotFound { .. } => AuthError::InvalidCredentials,
                err => AuthError::Db(err),
            })?;

        if !verify_secret(&credentials.password, &user.password) {
            return Err(AuthError::InvalidCredentials);
        }

        self.create_session(&user).await
    }

    /// Creates a new account and logs it in right away
    pub async fn register(&self, new_user: Credentials) -> Result<SessionData, AuthError> {
        let hashed_password = hash_secret(&new_user.password).map_err(AuthError::HashError)?;

        let user = self
            .db
            .create_user(NewUser {
                username: new_user.username,
                password: hashed_password,
            })
            .await
            .map_err(AuthError::Db)?;

        self.create_session(&user).await
    }

    /// Deletes the associated session, if it exists
    pub async fn logout(&self, token: &str) -> Result<(), DatabaseError> {
        self.db.delete_session_by_token(token).await
    }

    /// Resolves a presented token to the identity behind it. This is the
    /// gate in front of every real-time connection: failure means the
    /// connection attempt is refused outright.
    pub async fn authenticate(&self, token: Option<&str>) -> Result<SessionData, AuthError> {
        let token = token.ok_or(AuthError::MissingToken)?;

        let session = self
            .db
            .session_by_token(token)
            .await
            .map_err(|e| match e {
                DatabaseError::NotFound { .. } => AuthError::InvalidToken,
                err => AuthError::Db(err),
            })?;

        if session.expires_at < Utc::now() {
            return Err(AuthError::SessionExpired);
        }

        Ok(session)
    }

    async fn create_session(&self, user: &UserData) -> Result<SessionData, AuthError> {
        let expires_at = Utc::now() + Duration::days(Self::SESSION_DURATION_IN_DAYS as i64);

        self.db
            .create_session(NewSession {
                token: random_string(32),
                user_id: user.id,
                expires_at,
            })
            .await
            .map_err(AuthError::Db)
    }

    async fn clear_expired(&self) {
        if let Err(e) = self.db.clear_expired_sessions().await {
            log::warn!("Failed to clear expired sessions: {}", e);
        }
    }
}

#[derive(Debug)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::MemoryDatabase;

    fn auth() -> Auth<MemoryDatabase> {
        Auth::new(&Arc::new(MemoryDatabase::new()))
    }

    fn credentials() -> Credentials {
        Credentials {
            username: "ada".to_string(),
            password: "engine123".to_string(),
        }
    }

    #[tokio::test]
    async fn missing_token_is_refused() {
        let result = auth().authenticate(None).await;

        assert!(matches!(result, Err(AuthError::MissingToken)));
    }

    #[tokio::test]
    async fn unknown_token_is_refused() {
        let result = auth().authenticate(Some("bogus")).await;

        assert!(matches!(result, Err(AuthError::InvalidToken)));
    }

    #[tokio::test]
    async fn registered_session_resolves_to_its_user() {
        let auth = auth();

        let session = auth.register(credentials()).await.unwrap();
        let resolved = auth.authenticate(Some(&session.token)).await.unwrap();

        assert_eq!(resolved.user.username, "ada");
    }

    #[tokio::test]
    async fn login_rejects_a_wrong_password() {
        let auth = auth();
        auth.register(credentials()).await.unwrap();

        let result = auth
            .login(Credentials {
                username: "ada".to_string(),
                password: "wrong".to_string(),
            })
            .await;

        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn logged_out_token_no_longer_resolves() {
        let auth = auth();

        let session = auth.register(credentials()).await.unwrap();
        auth.logout(&session.token).await.unwrap();

        let result = auth.authenticate(Some(&session.token)).await;
        assert!(matches!(result, Err(AuthError::InvalidToken)));
    }
}
