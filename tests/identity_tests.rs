//! Visitor identity tests

use std::collections::HashSet;
use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header, encode};
use shortener::config::IdentityConfig;
use shortener::errors::ShortenerError;
use shortener::identity::{IdentityIssuer, VisitorClaims};

const SECRET: &str = "integration_test_secret_value!!";

fn create_issuer() -> IdentityIssuer {
    IdentityIssuer::new(SECRET, Duration::from_secs(3600), 1000)
}

/// Signs arbitrary claims with the test secret.
fn forge(user_id: i64, iat: i64, exp: i64) -> String {
    let claims = VisitorClaims {
        user_id,
        iat,
        exp,
        jti: "forged".to_string(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

#[tokio::test]
async fn test_scenario_d_expired_token_is_invalid() {
    let issuer = create_issuer();
    let (id, _) = issuer.issue().unwrap();

    // registered id, valid signature, but already expired
    let now = Utc::now().timestamp();
    let expired = forge(id, now - 7200, now - 3600);
    let err = issuer.validate(&expired).unwrap_err();
    assert!(matches!(err, ShortenerError::IdentityInvalid(_)));
    assert!(err.is_recoverable());

    let (fresh_id, fresh_token) = issuer.issue().unwrap();
    assert_eq!(issuer.validate(&fresh_token).unwrap(), fresh_id);
}

#[tokio::test]
async fn test_correctly_signed_unknown_id_is_rejected() {
    let issuer = create_issuer();
    let now = Utc::now().timestamp();
    let token = forge(42, now, now + 600);
    assert!(matches!(
        issuer.validate(&token),
        Err(ShortenerError::IdentityInvalid(_))
    ));
}

#[tokio::test]
async fn test_tampered_token_is_rejected() {
    let issuer = create_issuer();
    let (_, token) = issuer.issue().unwrap();
    let (_, other) = issuer.issue().unwrap();

    // payload of one token, signature of the other
    let (signed_part, _) = token.rsplit_once('.').unwrap();
    let (_, other_signature) = other.rsplit_once('.').unwrap();
    let tampered = format!("{}.{}", signed_part, other_signature);
    assert!(matches!(
        issuer.validate(&tampered),
        Err(ShortenerError::IdentityInvalid(_))
    ));
}

#[tokio::test]
async fn test_concurrent_issue_yields_unique_ids() {
    let issuer = std::sync::Arc::new(create_issuer());
    let mut handles = Vec::new();
    for _ in 0..8 {
        let issuer = issuer.clone();
        handles.push(tokio::spawn(async move {
            (0..50)
                .map(|_| issuer.issue().unwrap().0)
                .collect::<Vec<_>>()
        }));
    }

    let mut seen = HashSet::new();
    for handle in handles {
        for id in handle.await.unwrap() {
            assert!(seen.insert(id), "id {} issued twice", id);
        }
    }
    assert_eq!(seen.len(), 400);
}

#[tokio::test]
async fn test_identify_round_trip_with_config() {
    let config = IdentityConfig {
        secret: SECRET.to_string(),
        token_ttl_secs: 60,
        cookie_name: "Visitor".to_string(),
        registry_capacity: 10,
    };
    let issuer = IdentityIssuer::from_config(&config);
    assert_eq!(issuer.cookie_name(), "Visitor");

    let first = issuer.identify(None).unwrap();
    assert!(first.fresh);
    assert_eq!((first.expires_at - first.issued_at).num_seconds(), 60);

    let again = issuer.identify(Some(&first.token)).unwrap();
    assert!(!again.fresh);
    assert_eq!(again.id, first.id);

    let replaced = issuer.identify(Some("")).unwrap();
    assert!(replaced.fresh);
    assert_ne!(replaced.id, first.id);
}

#[tokio::test]
async fn test_full_registry_still_admits_new_ids() {
    let issuer = IdentityIssuer::new(SECRET, Duration::from_secs(600), 4);

    // 先把登记表填满，并让旧 id 频繁被访问
    let hot: Vec<(i64, String)> = (0..4).map(|_| issuer.issue().unwrap()).collect();
    for (id, token) in &hot {
        for _ in 0..50 {
            assert_eq!(issuer.validate(token).unwrap(), *id);
        }
    }

    let mut rejected = 0;
    for _ in 0..20 {
        let (id, token) = issuer.issue().unwrap();
        match issuer.validate(&token) {
            Ok(validated) => assert_eq!(validated, id),
            Err(_) => rejected += 1,
        }
    }
    assert_eq!(rejected, 0);

    let identity = issuer.identify(None).unwrap();
    let again = issuer.identify(Some(&identity.token)).unwrap();
    assert!(!again.fresh);
    assert_eq!(again.id, identity.id);
    assert!(issuer.registry_len() <= 4);
}
