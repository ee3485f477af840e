//! Single-active-session authority.
//!
//! Issues, rotates, and invalidates the one allowed device session for the
//! admin identity, plus the routing slug that masks the vault URL
//! namespace. Login is last-writer-wins across concurrent devices: the
//! deactivate-then-insert sequence makes whichever login lands last
//! authoritative, and every other context self-evicts on its next
//! revalidation poll.

use std::sync::Arc;

use argon2::password_hash::PasswordHash;
use argon2::{Argon2, PasswordVerifier};
use chrono::Utc;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use thiserror::Error;
use uuid::Uuid;

use ridgeline_core::{Email, RoutingSlug, SessionToken};

use crate::db::{Store, StoreError};
use crate::models::{AuditEventType, LoginSession, NewAuditEvent, Profile};

type HmacSha256 = Hmac<Sha256>;

/// Cookie carrying the signed routing slug.
pub const SLUG_COOKIE: &str = "session_routing_slug";

/// Slug cookie lifetime: 24 hours.
const SLUG_COOKIE_MAX_AGE_SECS: u64 = 24 * 60 * 60;

/// Subdomain tag stamped on audit events from this service.
const SUBDOMAIN: &str = "admin";

/// Characters a routing slug is minted from.
const SLUG_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Errors from the authentication boundary. All variants are terminal for
/// the attempt; none leak whether the email or the password was wrong
/// beyond what the single authorized address already implies.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The email is not the authorized admin address.
    #[error("unauthorized email")]
    Unauthorized,

    /// The password did not verify.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The operator profile row is missing from the store.
    #[error("operator profile missing")]
    ProfileMissing,

    /// Storage failure during the login sequence.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of a successful login.
#[derive(Debug, Clone)]
pub struct LoginSuccess {
    /// Token for the device's local storage.
    pub token: SessionToken,
    /// Freshly minted routing slug.
    pub slug: RoutingSlug,
    /// The authenticated identity.
    pub identity_id: ridgeline_core::IdentityId,
}

/// Outcome of a revalidation poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Revalidation {
    /// The device token still matches the most recent active session.
    Valid {
        /// The profile's current slug, for path correction.
        slug: Option<RoutingSlug>,
    },
    /// Another device logged in; this context must self-evict. A takeover
    /// signal, not an error.
    Invalidated,
    /// No identity or no active session at all.
    Unauthenticated,
}

/// Outcome of checking a navigated path's slug against the binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlugCheck {
    /// The path slug matches the profile slug.
    Match,
    /// Stale slug; redirect to the corrected path.
    Corrected {
        /// Where to send the caller.
        location: String,
    },
    /// No resolvable binding; deny outright. There is no safe
    /// auto-correction target, which is what distinguishes this from a
    /// mere mismatch.
    Denied,
}

/// The session authority.
pub struct SessionAuthority {
    store: Arc<dyn Store>,
    admin_email: Email,
    password_hash: SecretString,
    cookie_secret: SecretString,
}

impl SessionAuthority {
    /// Create the authority.
    pub fn new(
        store: Arc<dyn Store>,
        admin_email: Email,
        password_hash: SecretString,
        cookie_secret: SecretString,
    ) -> Self {
        Self {
            store,
            admin_email,
            password_hash,
            cookie_secret,
        }
    }

    /// The authorized admin address.
    #[must_use]
    pub const fn admin_email(&self) -> &Email {
        &self.admin_email
    }

    /// Make sure the operator profile row exists, creating it on first
    /// boot. Returns the profile either way.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store cannot be read or written.
    pub async fn ensure_profile(&self, full_name: &str) -> Result<Profile, StoreError> {
        if let Some(profile) = self.store.profile().await? {
            return Ok(profile);
        }

        let profile = Profile {
            id: ridgeline_core::IdentityId::generate(),
            email: self.admin_email.clone(),
            full_name: full_name.to_string(),
            current_session_slug: None,
            created_at: Utc::now(),
        };
        self.store.upsert_profile(&profile).await?;
        Ok(profile)
    }

    /// Authenticate and mint a new `{session token, routing slug}` pair.
    ///
    /// On success all prior sessions are deactivated, the new session is
    /// inserted, the profile slug is rewritten, and a `login_success`
    /// audit event is appended fire-and-forget.
    ///
    /// # Errors
    ///
    /// [`AuthError::Unauthorized`] for any email other than the configured
    /// admin address, [`AuthError::InvalidCredentials`] for a failed
    /// password check, [`AuthError::Store`] for storage failures.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        user_agent: &str,
    ) -> Result<LoginSuccess, AuthError> {
        if !self.admin_email.matches(email) {
            return Err(AuthError::Unauthorized);
        }
        self.verify_password(password)?;

        let profile = self
            .store
            .profile()
            .await?
            .ok_or(AuthError::ProfileMissing)?;

        let token = mint_token();
        let slug = mint_slug();

        // Deactivate-then-insert: both are plain overwrites, so concurrent
        // logins race to last-writer-wins without a lock and the
        // one-active invariant still holds.
        self.store.deactivate_sessions(profile.id).await?;
        self.store
            .insert_session(&LoginSession {
                token: token.clone(),
                identity_id: profile.id,
                user_agent: user_agent.to_string(),
                active: true,
                created_at: Utc::now(),
            })
            .await?;
        self.store.set_profile_slug(profile.id, &slug).await?;

        let store = Arc::clone(&self.store);
        let event = NewAuditEvent {
            subdomain: SUBDOMAIN.to_string(),
            event_type: AuditEventType::LoginSuccess,
            identity_id: Some(profile.id),
            ip_address: "0.0.0.0".to_string(),
            user_agent: user_agent.to_string(),
            country: "Unknown".to_string(),
            metadata: serde_json::json!({
                "device": user_agent,
                "session_slug": slug.as_str(),
            }),
        }
        .into_event();
        tokio::spawn(async move {
            if let Err(e) = store.append_audit(&event).await {
                tracing::warn!(error = %e, "login_success audit append failed");
            }
        });

        tracing::info!(identity = %profile.id, "admin login, slug rotated");

        Ok(LoginSuccess {
            token,
            slug,
            identity_id: profile.id,
        })
    }

    /// Check whether a device token is still the live session.
    ///
    /// A differing token on the most recent active session means another
    /// device logged in; the stale token is deactivated and the caller is
    /// told to self-evict.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store cannot be read.
    pub async fn revalidate(&self, token: &SessionToken) -> Result<Revalidation, StoreError> {
        let Some(profile) = self.store.profile().await? else {
            return Ok(Revalidation::Unauthenticated);
        };
        let Some(latest) = self.store.latest_active_session(profile.id).await? else {
            return Ok(Revalidation::Unauthenticated);
        };

        if latest.token != *token {
            // Belt and braces: the token is normally already inactive, but
            // a raced insert may have left it live.
            self.store.deactivate_token(token).await?;
            tracing::info!("stale session evicted by newer login");
            return Ok(Revalidation::Invalidated);
        }

        Ok(Revalidation::Valid {
            slug: profile.current_session_slug,
        })
    }

    /// Explicit sign-out for a device token.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store cannot be written.
    pub async fn sign_out(&self, token: &SessionToken) -> Result<(), StoreError> {
        self.store.deactivate_token(token).await
    }

    /// Compare a navigated path's slug against the current binding.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store cannot be read.
    pub async fn check_slug(&self, requested: &str, page: &str) -> Result<SlugCheck, StoreError> {
        let Some(profile) = self.store.profile().await? else {
            return Ok(SlugCheck::Denied);
        };
        let Some(current) = profile.current_session_slug else {
            return Ok(SlugCheck::Denied);
        };
        // A slug with no live session behind it is not a binding either.
        if self
            .store
            .latest_active_session(profile.id)
            .await?
            .is_none()
        {
            return Ok(SlugCheck::Denied);
        }

        if requested == current.as_str() {
            Ok(SlugCheck::Match)
        } else {
            Ok(SlugCheck::Corrected {
                location: format!("/vault/{current}/{page}"),
            })
        }
    }

    /// Force-rotate the routing slug. Every open context picks up the
    /// correction on its next revalidation.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if no profile exists or the write fails.
    pub async fn rotate_slug(&self) -> Result<RoutingSlug, StoreError> {
        let profile = self.store.profile().await?.ok_or(StoreError::NotFound)?;
        let slug = mint_slug();
        self.store.set_profile_slug(profile.id, &slug).await?;
        tracing::info!("routing slug force-rotated");
        Ok(slug)
    }

    fn verify_password(&self, password: &str) -> Result<(), AuthError> {
        let parsed = PasswordHash::new(self.password_hash.expose_secret())
            .map_err(|_| AuthError::InvalidCredentials)?;
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .map_err(|_| AuthError::InvalidCredentials)
    }

    // -- slug cookie ---------------------------------------------------------

    /// Build the signed `Set-Cookie` value for a slug.
    #[must_use]
    pub fn slug_cookie(&self, slug: &RoutingSlug) -> String {
        let signature = self.sign_slug(slug.as_str());
        format!(
            "{SLUG_COOKIE}={}.{signature}; Path=/; Max-Age={SLUG_COOKIE_MAX_AGE_SECS}; SameSite=Strict; HttpOnly",
            slug.as_str()
        )
    }

    /// `Set-Cookie` value that removes the slug cookie.
    #[must_use]
    pub fn clear_slug_cookie() -> String {
        format!("{SLUG_COOKIE}=; Path=/; Max-Age=0; SameSite=Strict; HttpOnly")
    }

    /// Verify a cookie value and recover the slug. `None` for a missing
    /// signature, a bad signature, or a malformed slug.
    #[must_use]
    pub fn verify_slug_cookie(&self, value: &str) -> Option<RoutingSlug> {
        let (slug, signature_hex) = value.split_once('.')?;
        let signature = hex::decode(signature_hex).ok()?;

        let mut mac = self.mac();
        mac.update(slug.as_bytes());
        mac.verify_slice(&signature).ok()?;

        RoutingSlug::parse(slug).ok()
    }

    fn sign_slug(&self, slug: &str) -> String {
        let mut mac = self.mac();
        mac.update(slug.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn mac(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(self.cookie_secret.expose_secret().as_bytes())
            .expect("HMAC accepts any key length")
    }
}

/// Mint a fresh opaque session token.
fn mint_token() -> SessionToken {
    SessionToken::new(Uuid::new_v4().to_string())
}

/// Mint a fresh 8-character routing slug.
fn mint_slug() -> RoutingSlug {
    use rand::Rng;
    let mut rng = rand::rng();
    let raw: String = (0..RoutingSlug::LENGTH)
        .map(|_| {
            let idx = rng.random_range(0..SLUG_CHARSET.len());
            // SAFETY: idx is always within bounds since random_range returns 0..len
            char::from(*SLUG_CHARSET.get(idx).expect("idx within bounds"))
        })
        .collect();
    RoutingSlug::parse(&raw).expect("minted slug is charset-valid")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use argon2::password_hash::{PasswordHasher, SaltString, rand_core::OsRng};

    use crate::db::MemoryStore;

    use super::*;

    fn hash(password: &str) -> String {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .unwrap()
            .to_string()
    }

    fn authority(store: Arc<dyn Store>) -> SessionAuthority {
        SessionAuthority::new(
            store,
            Email::parse("ops@ridgeline-hq.dev").unwrap(),
            SecretString::from(hash("correct horse battery staple")),
            SecretString::from("0123456789abcdef0123456789abcdef"),
        )
    }

    async fn ready_authority() -> (Arc<MemoryStore>, SessionAuthority) {
        let store = Arc::new(MemoryStore::new());
        let auth = authority(Arc::clone(&store) as Arc<dyn Store>);
        auth.ensure_profile("Ridgeline Ops").await.unwrap();
        (store, auth)
    }

    #[test]
    fn test_mint_slug_shape() {
        for _ in 0..100 {
            let slug = mint_slug();
            assert_eq!(slug.as_str().len(), RoutingSlug::LENGTH);
        }
    }

    #[test]
    fn test_mint_token_is_unique() {
        assert_ne!(mint_token(), mint_token());
    }

    #[tokio::test]
    async fn test_login_rejects_unknown_email() {
        let (_, auth) = ready_authority().await;
        let result = auth
            .login("intruder@evil.test", "correct horse battery staple", "ua")
            .await;
        assert!(matches!(result, Err(AuthError::Unauthorized)));
    }

    #[tokio::test]
    async fn test_login_rejects_bad_password() {
        let (_, auth) = ready_authority().await;
        let result = auth.login("ops@ridgeline-hq.dev", "wrong", "ua").await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_login_email_match_is_caseless() {
        let (_, auth) = ready_authority().await;
        let result = auth
            .login("OPS@Ridgeline-HQ.dev", "correct horse battery staple", "ua")
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_second_login_invalidates_first_token() {
        let (store, auth) = ready_authority().await;

        let first = auth
            .login("ops@ridgeline-hq.dev", "correct horse battery staple", "a")
            .await
            .unwrap();
        let second = auth
            .login("ops@ridgeline-hq.dev", "correct horse battery staple", "b")
            .await
            .unwrap();

        assert_ne!(first.token, second.token);
        assert_ne!(first.slug, second.slug);

        let profile = store.profile().await.unwrap().unwrap();
        assert_eq!(store.active_session_count(profile.id).await.unwrap(), 1);

        assert_eq!(
            auth.revalidate(&first.token).await.unwrap(),
            Revalidation::Invalidated
        );
        assert!(matches!(
            auth.revalidate(&second.token).await.unwrap(),
            Revalidation::Valid { slug: Some(_) }
        ));
    }

    #[tokio::test]
    async fn test_revalidate_without_any_session() {
        let (_, auth) = ready_authority().await;
        let outcome = auth.revalidate(&SessionToken::from("ghost")).await.unwrap();
        assert_eq!(outcome, Revalidation::Unauthenticated);
    }

    #[tokio::test]
    async fn test_sign_out_ends_the_session() {
        let (_, auth) = ready_authority().await;
        let login = auth
            .login("ops@ridgeline-hq.dev", "correct horse battery staple", "a")
            .await
            .unwrap();

        auth.sign_out(&login.token).await.unwrap();
        assert_eq!(
            auth.revalidate(&login.token).await.unwrap(),
            Revalidation::Unauthenticated
        );
    }

    #[tokio::test]
    async fn test_check_slug_match_corrected_denied() {
        let (_, auth) = ready_authority().await;

        // No login yet: no binding, denied.
        assert_eq!(
            auth.check_slug("whatever1", "dashboard").await.unwrap(),
            SlugCheck::Denied
        );

        let login = auth
            .login("ops@ridgeline-hq.dev", "correct horse battery staple", "a")
            .await
            .unwrap();

        assert_eq!(
            auth.check_slug(login.slug.as_str(), "dashboard")
                .await
                .unwrap(),
            SlugCheck::Match
        );

        let stale = auth.check_slug("stalestal", "dashboard").await.unwrap();
        assert_eq!(
            stale,
            SlugCheck::Corrected {
                location: format!("/vault/{}/dashboard", login.slug)
            }
        );

        // Signing out removes the live session behind the binding.
        auth.sign_out(&login.token).await.unwrap();
        assert_eq!(
            auth.check_slug(login.slug.as_str(), "dashboard")
                .await
                .unwrap(),
            SlugCheck::Denied
        );
    }

    #[tokio::test]
    async fn test_rotate_slug_changes_binding() {
        let (_, auth) = ready_authority().await;
        let login = auth
            .login("ops@ridgeline-hq.dev", "correct horse battery staple", "a")
            .await
            .unwrap();

        let rotated = auth.rotate_slug().await.unwrap();
        assert_ne!(rotated, login.slug);

        // The old slug now corrects to the new one.
        let check = auth.check_slug(login.slug.as_str(), "security").await.unwrap();
        assert_eq!(
            check,
            SlugCheck::Corrected {
                location: format!("/vault/{rotated}/security")
            }
        );
    }

    #[tokio::test]
    async fn test_slug_cookie_round_trip_and_tampering() {
        let (_, auth) = ready_authority().await;
        let slug = RoutingSlug::parse("k3v9x2aq").unwrap();

        let cookie = auth.slug_cookie(&slug);
        assert!(cookie.starts_with("session_routing_slug=k3v9x2aq."));
        assert!(cookie.contains("SameSite=Strict"));
        assert!(cookie.contains("Max-Age=86400"));

        let value = cookie
            .split_once('=')
            .and_then(|(_, rest)| rest.split(';').next())
            .unwrap();
        assert_eq!(auth.verify_slug_cookie(value), Some(slug));

        // Swap the slug while keeping the signature: must not verify.
        let signature = value.split_once('.').unwrap().1;
        assert_eq!(
            auth.verify_slug_cookie(&format!("zzzzzzzz.{signature}")),
            None
        );
        assert_eq!(auth.verify_slug_cookie("unsigned"), None);
    }

    #[tokio::test]
    async fn test_login_appends_audit_event() {
        let (store, auth) = ready_authority().await;
        auth.login("ops@ridgeline-hq.dev", "correct horse battery staple", "ua")
            .await
            .unwrap();

        // The append is spawned; give it a few ticks to land.
        let mut seen = false;
        for _ in 0..50 {
            tokio::task::yield_now().await;
            let events = store.recent_audit(10).await.unwrap();
            if events
                .iter()
                .any(|e| e.event_type == AuditEventType::LoginSuccess)
            {
                seen = true;
                break;
            }
        }
        assert!(seen, "login_success audit event not appended");
    }
}
