use super::ports::BearerToken;
use crate::error::RentalError;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;
use std::fmt;

/// What a signed-in user is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Manages the fleet inventory.
    Admin,
    /// Inspects the fleet.
    Manager,
    /// Rents scooters.
    Renter,
}

impl Role {
    pub fn can_rent(self) -> bool {
        match self {
            Role::Renter => true,
            Role::Admin | Role::Manager => false,
        }
    }

    pub fn can_edit_fleet(self) -> bool {
        match self {
            Role::Admin => true,
            Role::Manager | Role::Renter => false,
        }
    }

    /// Decodes the `role` claim of a JWT.
    ///
    /// The signature is not checked here: the backend verifies it on every
    /// call, this only picks which menu to offer.
    pub fn from_token(token: &BearerToken) -> Result<Self, RentalError> {
        #[derive(Deserialize)]
        struct Claims {
            role: i64,
        }

        let payload = token
            .expose()
            .split('.')
            .nth(1)
            .ok_or_else(|| RentalError::AuthError("token is not a JWT".to_string()))?;
        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| RentalError::AuthError(format!("malformed token payload: {e}")))?;
        let claims: Claims = serde_json::from_slice(&bytes)
            .map_err(|e| RentalError::AuthError(format!("malformed token claims: {e}")))?;
        Self::try_from(claims.role)
    }
}

impl TryFrom<i64> for Role {
    type Error = RentalError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Role::Admin),
            2 => Ok(Role::Manager),
            3 => Ok(Role::Renter),
            other => Err(RentalError::AuthError(format!("unknown role {other}"))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Renter => "renter",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_with_claims(claims: &str) -> BearerToken {
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims);
        BearerToken::new(format!("{header}.{payload}.signature"))
    }

    #[test]
    fn test_role_from_numeric_claim() {
        assert_eq!(Role::try_from(1).unwrap(), Role::Admin);
        assert_eq!(Role::try_from(2).unwrap(), Role::Manager);
        assert_eq!(Role::try_from(3).unwrap(), Role::Renter);
        assert!(matches!(Role::try_from(0), Err(RentalError::AuthError(_))));
    }

    #[test]
    fn test_role_from_token() {
        let token = token_with_claims(r#"{"sub":"alice","role":3,"exp":1999999999}"#);
        let role = Role::from_token(&token).unwrap();
        assert_eq!(role, Role::Renter);
        assert!(role.can_rent());
        assert!(!role.can_edit_fleet());

        let admin = token_with_claims(r#"{"sub":"root","role":1}"#);
        assert!(Role::from_token(&admin).unwrap().can_edit_fleet());
    }

    #[test]
    fn test_malformed_tokens() {
        assert!(Role::from_token(&BearerToken::new("opaque")).is_err());
        assert!(Role::from_token(&BearerToken::new("a.!!!.c")).is_err());
        assert!(Role::from_token(&token_with_claims(r#"{"sub":"bob"}"#)).is_err());
    }
}
