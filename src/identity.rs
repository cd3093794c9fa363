//! Ephemeral visitor identities.
//!
//! A visitor id is a process-local integer carried in a signed HS256 token.
//! Nothing is persisted: a token is honoured only if its signature and
//! expiry check out *and* this process issued the id. After a restart every
//! old token is rejected and the visitor gets a new id.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::IdentityConfig;
use crate::errors::{Result, ShortenerError};

/// Visitor token claims
#[derive(Debug, Serialize, Deserialize)]
pub struct VisitorClaims {
    pub user_id: i64,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

/// A validated or freshly issued visitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisitorIdentity {
    pub id: i64,
    pub token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// `true` when the token was issued by this call and the caller should
    /// hand it back to the client.
    pub fresh: bool,
}

pub struct IdentityIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
    cookie_name: String,
    next_id: AtomicI64,
    /// ids issued by this process, expiring with their tokens; when full the
    /// least recently used id goes, never the one just issued
    issued: Cache<i64, ()>,
}

impl IdentityIssuer {
    pub fn new(secret: &str, ttl: Duration, registry_capacity: u64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "iat"]);

        // 起点随机，避免不同进程实例发出相同的 id 序列
        let start = rand::random_range(1..=i64::from(u32::MAX));

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl,
            cookie_name: "ClientID".to_string(),
            next_id: AtomicI64::new(start),
            issued: Cache::builder()
                .max_capacity(registry_capacity.max(1))
                .eviction_policy(EvictionPolicy::lru())
                .time_to_live(ttl)
                .build(),
        }
    }

    /// An empty secret is replaced by a random one, so tokens only survive
    /// as long as the process.
    pub fn from_config(config: &IdentityConfig) -> Self {
        let secret = if config.secret.is_empty() {
            warn!("Identity secret not configured, generating a random per-process secret");
            crate::utils::generate_secret(32)
        } else {
            config.secret.clone()
        };

        let mut issuer = Self::new(
            &secret,
            Duration::from_secs(config.token_ttl_secs.max(1)),
            config.registry_capacity,
        );
        issuer.cookie_name = config.cookie_name.clone();
        issuer
    }

    /// Name of the cookie the boundary layer should carry the token in.
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Allocates a new id and signs a token for it.
    pub fn issue(&self) -> Result<(i64, String)> {
        let identity = self.issue_identity()?;
        Ok((identity.id, identity.token))
    }

    fn issue_identity(&self) -> Result<VisitorIdentity> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let issued_at = Utc::now();
        let ttl = chrono::Duration::from_std(self.ttl)
            .map_err(|e| ShortenerError::config(format!("Invalid token TTL: {}", e)))?;
        let expires_at = issued_at + ttl;

        let claims = VisitorClaims {
            user_id: id,
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
            jti: uuid::Uuid::new_v4().to_string(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| ShortenerError::config(format!("Failed to sign visitor token: {}", e)))?;

        self.issued.insert(id, ());
        debug!("Issued visitor id {}", id);

        Ok(VisitorIdentity {
            id,
            token,
            issued_at,
            expires_at,
            fresh: true,
        })
    }

    /// Returns the visitor id in `token`.
    ///
    /// Fails with `IdentityInvalid` on a bad signature, a malformed or
    /// expired token, or an id this process never issued.
    pub fn validate(&self, token: &str) -> Result<i64> {
        self.validate_claims(token).map(|claims| claims.user_id)
    }

    fn validate_claims(&self, token: &str) -> Result<VisitorClaims> {
        let claims = decode::<VisitorClaims>(token, &self.decoding_key, &self.validation)?.claims;

        if !self.issued.contains_key(&claims.user_id) {
            return Err(ShortenerError::identity_invalid(format!(
                "Visitor id {} was not issued by this process",
                claims.user_id
            )));
        }
        Ok(claims)
    }

    /// Validates `token` if present, otherwise (or on failure) issues a new
    /// identity.
    pub fn identify(&self, token: Option<&str>) -> Result<VisitorIdentity> {
        let Some(token) = token.filter(|t| !t.is_empty()) else {
            return self.issue_identity();
        };

        match self.validate_claims(token) {
            Ok(claims) => Ok(VisitorIdentity {
                id: claims.user_id,
                token: token.to_string(),
                issued_at: timestamp(claims.iat),
                expires_at: timestamp(claims.exp),
                fresh: false,
            }),
            Err(e) if e.is_recoverable() => {
                debug!("Reissuing visitor identity: {}", e);
                self.issue_identity()
            }
            Err(e) => Err(e),
        }
    }

    /// Number of ids currently remembered.
    pub fn registry_len(&self) -> u64 {
        self.issued.run_pending_tasks();
        self.issued.entry_count()
    }
}

fn timestamp(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_issuer() -> IdentityIssuer {
        IdentityIssuer::new("test_secret_key_32_bytes_long!!", Duration::from_secs(60), 100)
    }

    #[test]
    fn test_issue_and_validate() {
        let issuer = create_test_issuer();
        let (id, token) = issuer.issue().unwrap();
        assert_eq!(issuer.validate(&token).unwrap(), id);
    }

    #[test]
    fn test_ids_are_unique() {
        let issuer = create_test_issuer();
        let (a, _) = issuer.issue().unwrap();
        let (b, _) = issuer.issue().unwrap();
        assert_ne!(a, b);
        assert_eq!(issuer.registry_len(), 2);
    }

    #[test]
    fn test_garbage_token_is_invalid() {
        let issuer = create_test_issuer();
        let err = issuer.validate("not-a-token").unwrap_err();
        assert!(matches!(err, ShortenerError::IdentityInvalid(_)));
    }

    #[test]
    fn test_token_from_other_secret_is_invalid() {
        let issuer = create_test_issuer();
        let other = IdentityIssuer::new("another_secret_of_some_length!!", Duration::from_secs(60), 100);
        let (_, token) = other.issue().unwrap();
        assert!(issuer.validate(&token).is_err());
    }

    #[test]
    fn test_signed_but_unregistered_id_is_invalid() {
        let secret = "shared_secret_between_epochs!!!";
        let old_epoch = IdentityIssuer::new(secret, Duration::from_secs(60), 100);
        let new_epoch = IdentityIssuer::new(secret, Duration::from_secs(60), 100);

        let (_, token) = old_epoch.issue().unwrap();
        let err = new_epoch.validate(&token).unwrap_err();
        assert!(matches!(err, ShortenerError::IdentityInvalid(_)));
    }

    #[test]
    fn test_identify_without_token_issues_fresh() {
        let issuer = create_test_issuer();
        let identity = issuer.identify(None).unwrap();
        assert!(identity.fresh);
        assert!(identity.expires_at > identity.issued_at);

        let again = issuer.identify(Some(&identity.token)).unwrap();
        assert!(!again.fresh);
        assert_eq!(again.id, identity.id);
    }

    #[test]
    fn test_identify_replaces_invalid_token() {
        let issuer = create_test_issuer();
        let identity = issuer.identify(Some("garbage")).unwrap();
        assert!(identity.fresh);
        assert_eq!(issuer.validate(&identity.token).unwrap(), identity.id);
    }

    #[test]
    fn test_from_config_uses_cookie_name() {
        let config = IdentityConfig::default();
        let issuer = IdentityIssuer::from_config(&config);
        assert_eq!(issuer.cookie_name(), "ClientID");
        let (id, token) = issuer.issue().unwrap();
        assert_eq!(issuer.validate(&token).unwrap(), id);
    }
}
