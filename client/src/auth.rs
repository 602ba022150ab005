//! Bearer tokens for messages that need authorization.
//!
//! Token issuance lives in a separate service; the client only talks to it
//! through [`AuthBackend`]. A failure at any step is returned to the caller,
//! which aborts whatever it was about to send.

use crate::error::AuthError;
use log::{debug, info};
use shared::PlayerId;

pub trait TokenProvider {
    /// Returns a bearer token that is valid right now.
    fn bearer_token(&mut self) -> Result<String, AuthError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Credentials {
    pub user_id: PlayerId,
    pub access_token: String,
    pub refresh_token: String,
}

/// Outcome of validating an access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStatus {
    Valid,
    Expired,
}

pub trait AuthBackend {
    fn validate(&self, credentials: &Credentials) -> Result<TokenStatus, AuthError>;

    /// Exchanges the refresh token for a new `(access, refresh)` pair.
    fn refresh(&self, credentials: &Credentials) -> Result<(String, String), AuthError>;
}

/// Validates the stored access token and refreshes it once when it expired.
pub struct VerifyingTokenProvider<B> {
    backend: B,
    credentials: Option<Credentials>,
}

impl<B: AuthBackend> VerifyingTokenProvider<B> {
    pub fn new(backend: B, credentials: Option<Credentials>) -> Self {
        Self {
            backend,
            credentials,
        }
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }
}

impl<B: AuthBackend> TokenProvider for VerifyingTokenProvider<B> {
    fn bearer_token(&mut self) -> Result<String, AuthError> {
        let credentials = self
            .credentials
            .as_mut()
            .ok_or(AuthError::MissingCredentials)?;

        match self.backend.validate(credentials)? {
            TokenStatus::Valid => {
                debug!("Access token for user {} is valid", credentials.user_id);
                Ok(credentials.access_token.clone())
            }
            TokenStatus::Expired => {
                info!("Access token for user {} expired, refreshing", credentials.user_id);
                let (access, refresh) = self.backend.refresh(credentials)?;
                credentials.access_token = access;
                credentials.refresh_token = refresh;
                Ok(credentials.access_token.clone())
            }
        }
    }
}

/// A token handed in from the outside, e.g. on the command line.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

impl TokenProvider for StaticToken {
    fn bearer_token(&mut self) -> Result<String, AuthError> {
        if self.0.is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        Ok(self.0.clone())
    }
}

/// Provider for matches that never leave this device.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalOnly;

impl TokenProvider for LocalOnly {
    fn bearer_token(&mut self) -> Result<String, AuthError> {
        Err(AuthError::MissingCredentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct FakeBackend {
        status: Result<TokenStatus, AuthError>,
        refresh: Result<(String, String), AuthError>,
        refresh_calls: Cell<u32>,
    }

    impl FakeBackend {
        fn new(
            status: Result<TokenStatus, AuthError>,
            refresh: Result<(String, String), AuthError>,
        ) -> Self {
            Self {
                status,
                refresh,
                refresh_calls: Cell::new(0),
            }
        }
    }

    impl AuthBackend for FakeBackend {
        fn validate(&self, _: &Credentials) -> Result<TokenStatus, AuthError> {
            self.status.clone()
        }

        fn refresh(&self, _: &Credentials) -> Result<(String, String), AuthError> {
            self.refresh_calls.set(self.refresh_calls.get() + 1);
            self.refresh.clone()
        }
    }

    fn credentials() -> Credentials {
        Credentials {
            user_id: 42,
            access_token: "old-access".to_string(),
            refresh_token: "old-refresh".to_string(),
        }
    }

    #[test]
    fn test_valid_token_is_returned() {
        let backend = FakeBackend::new(Ok(TokenStatus::Valid), Err(AuthError::RefreshFailed("unused".into())));
        let mut provider = VerifyingTokenProvider::new(backend, Some(credentials()));

        assert_eq!(provider.bearer_token().unwrap(), "old-access");
        assert_eq!(provider.backend.refresh_calls.get(), 0);
    }

    #[test]
    fn test_expired_token_is_refreshed_once() {
        let backend = FakeBackend::new(
            Ok(TokenStatus::Expired),
            Ok(("new-access".to_string(), "new-refresh".to_string())),
        );
        let mut provider = VerifyingTokenProvider::new(backend, Some(credentials()));

        assert_eq!(provider.bearer_token().unwrap(), "new-access");
        assert_eq!(provider.backend.refresh_calls.get(), 1);
        assert_eq!(provider.credentials().unwrap().refresh_token, "new-refresh");
    }

    #[test]
    fn test_refresh_failure_propagates() {
        let backend = FakeBackend::new(
            Ok(TokenStatus::Expired),
            Err(AuthError::RefreshFailed("401".to_string())),
        );
        let mut provider = VerifyingTokenProvider::new(backend, Some(credentials()));

        assert_eq!(
            provider.bearer_token(),
            Err(AuthError::RefreshFailed("401".to_string()))
        );
        assert_eq!(provider.backend.refresh_calls.get(), 1);
        assert_eq!(provider.credentials().unwrap().access_token, "old-access");
    }

    #[test]
    fn test_validation_failure_propagates_without_refresh() {
        let backend = FakeBackend::new(
            Err(AuthError::Backend("503".to_string())),
            Ok(("x".to_string(), "y".to_string())),
        );
        let mut provider = VerifyingTokenProvider::new(backend, Some(credentials()));

        assert!(matches!(provider.bearer_token(), Err(AuthError::Backend(_))));
        assert_eq!(provider.backend.refresh_calls.get(), 0);
    }

    #[test]
    fn test_missing_credentials() {
        let backend = FakeBackend::new(Ok(TokenStatus::Valid), Ok(("x".into(), "y".into())));
        let mut provider = VerifyingTokenProvider::new(backend, None);
        assert_eq!(provider.bearer_token(), Err(AuthError::MissingCredentials));
    }

    #[test]
    fn test_static_and_local_only_providers() {
        assert_eq!(StaticToken("t".to_string()).bearer_token().unwrap(), "t");
        assert!(StaticToken(String::new()).bearer_token().is_err());
        assert_eq!(LocalOnly.bearer_token(), Err(AuthError::MissingCredentials));
    }
}
