use anyhow::Result;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Duration;
use regex::Regex;
use std::sync::LazyLock;

use crate::config::{SurveyConfig, MAX_SESSION_TTL_DAYS};
use crate::database::Database;
use crate::log_api_warn;

static SESSION_KEY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-fA-F0-9]{10,40}$").expect("static regex"));

/// Shape check for session keys taken from URLs and cookies.
pub fn is_valid_session_key(key: &str) -> bool {
    SESSION_KEY_PATTERN.is_match(key)
}

/// Issues and resolves the respondent session cookie.
#[derive(Clone)]
pub struct SessionManager {
    db: Database,
    cookie_name: String,
    ttl: Duration,
    secure: bool,
}

impl SessionManager {
    pub fn new(db: Database, config: &SurveyConfig) -> Self {
        Self {
            db,
            cookie_name: config.session_cookie_name.clone(),
            ttl: Duration::days(config.session_ttl_days.clamp(1, MAX_SESSION_TTL_DAYS)),
            secure: config.session_cookie_secure,
        }
    }

    /// The live session key carried by the request, if any.
    pub async fn resolve(&self, jar: &CookieJar) -> Result<Option<String>> {
        let key = match jar.get(&self.cookie_name) {
            Some(cookie) => cookie.value().to_lowercase(),
            None => return Ok(None),
        };

        if !is_valid_session_key(&key) {
            log_api_warn!("resolve_session", session_key = key, "malformed session cookie");
            return Ok(None);
        }

        Ok(self.db.get_session(&key).await?.map(|session| session.session_key))
    }

    /// Resolve the request's session, starting a new one when it has none.
    pub async fn resolve_or_create(&self, jar: CookieJar) -> Result<(CookieJar, String)> {
        if let Some(key) = self.resolve(&jar).await? {
            return Ok((jar, key));
        }

        let session = self.db.create_session(self.ttl).await?;
        let cookie = Cookie::build((self.cookie_name.clone(), session.session_key.clone()))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax);

        Ok((jar.add(cookie), session.session_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_key_shape() {
        assert!(is_valid_session_key("0123456789"));
        assert!(is_valid_session_key("ABCDEF0123456789abcdef0123456789"));
        assert!(!is_valid_session_key("012345678"));
        assert!(!is_valid_session_key(&"a".repeat(41)));
        assert!(!is_valid_session_key("not-a-session-key"));
    }

    #[tokio::test]
    async fn test_resolve_or_create_reuses_live_session() {
        let db = Database::new("sqlite::memory:").await.unwrap();
        let manager = SessionManager::new(db, &SurveyConfig::default());

        let (jar, key) = manager.resolve_or_create(CookieJar::new()).await.unwrap();
        assert_eq!(jar.get("sessionid").unwrap().value(), key);

        let (_, again) = manager.resolve_or_create(jar).await.unwrap();
        assert_eq!(again, key);
    }

    #[tokio::test]
    async fn test_oversized_ttl_is_capped() {
        let db = Database::new("sqlite::memory:").await.unwrap();
        let config = SurveyConfig {
            session_ttl_days: i64::MAX,
            ..SurveyConfig::default()
        };
        let manager = SessionManager::new(db, &config);
        assert_eq!(manager.ttl, Duration::days(MAX_SESSION_TTL_DAYS));

        let (_, key) = manager.resolve_or_create(CookieJar::new()).await.unwrap();
        assert!(is_valid_session_key(&key));
    }

    #[tokio::test]
    async fn test_unknown_cookie_is_ignored() {
        let db = Database::new("sqlite::memory:").await.unwrap();
        let manager = SessionManager::new(db, &SurveyConfig::default());

        let jar = CookieJar::new().add(Cookie::new("sessionid", "0123456789abcdef0123456789abcdef"));
        assert_eq!(manager.resolve(&jar).await.unwrap(), None);
    }
}
