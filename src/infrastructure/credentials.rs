use crate::domain::ports::{BearerToken, CredentialSource};
use std::sync::RwLock;

/// A token handed in at startup, for example from `SCOOTER_TOKEN`.
///
/// The authentication flow may replace it with [`StaticCredentials::replace`];
/// the rental flow only ever reads it.
#[derive(Debug, Default)]
pub struct StaticCredentials {
    token: RwLock<Option<BearerToken>>,
}

impl StaticCredentials {
    pub fn new(token: Option<BearerToken>) -> Self {
        Self {
            token: RwLock::new(token),
        }
    }

    pub fn replace(&self, token: Option<BearerToken>) {
        let mut slot = self.token.write().unwrap_or_else(|e| e.into_inner());
        *slot = token;
    }
}

impl CredentialSource for StaticCredentials {
    fn bearer_token(&self) -> Option<BearerToken> {
        self.token
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_token() {
        let credentials = StaticCredentials::default();
        assert!(credentials.bearer_token().is_none());
        credentials.replace(Some(BearerToken::new("abc")));
        assert_eq!(credentials.bearer_token(), Some(BearerToken::new("abc")));
        credentials.replace(None);
        assert!(credentials.bearer_token().is_none());
    }
}
