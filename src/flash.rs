// src/flash.rs

use axum::response::Redirect;
use axum_extra::extract::cookie::{Cookie, SameSite, SignedCookieJar};
use serde::{Deserialize, Serialize};

const FLASH_COOKIE: &str = "flash";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashLevel {
    Success,
    Error,
}

/// One-shot status message shown on the next rendered page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flash {
    pub level: FlashLevel,
    pub message: String,
}

impl Flash {
    pub fn success(message: impl Into<String>) -> Self {
        Flash {
            level: FlashLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Flash {
            level: FlashLevel::Error,
            message: message.into(),
        }
    }
}

/// Store `flash` in the signed cookie and send the browser to `to` (303).
pub fn redirect(jar: SignedCookieJar, to: &str, flash: Flash) -> (SignedCookieJar, Redirect) {
    let jar = match serde_json::to_string(&flash) {
        Ok(value) => jar.add(
            Cookie::build((FLASH_COOKIE, value))
                .path("/")
                .http_only(true)
                .same_site(SameSite::Lax),
        ),
        Err(e) => {
            tracing::warn!("dropping flash message: {e}");
            jar
        }
    };
    (jar, Redirect::to(to))
}

/// Read the pending flash, if any, and clear it.
pub fn take(jar: SignedCookieJar) -> (SignedCookieJar, Option<Flash>) {
    let Some(cookie) = jar.get(FLASH_COOKIE) else {
        return (jar, None);
    };
    let flash = serde_json::from_str::<Flash>(cookie.value()).ok();
    let jar = jar.remove(Cookie::build(FLASH_COOKIE).path("/"));
    (jar, flash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, response::IntoResponse};
    use axum_extra::extract::cookie::Key;

    #[test]
    fn flash_round_trips_through_the_jar() {
        let jar = SignedCookieJar::new(Key::generate());
        let (jar, redirect) = redirect(jar, "/patients", Flash::success("Patient registered successfully!"));
        assert_eq!(redirect.into_response().status(), StatusCode::SEE_OTHER);

        let (jar, flash) = take(jar);
        assert_eq!(flash, Some(Flash::success("Patient registered successfully!")));

        let (_, again) = take(jar);
        assert_eq!(again, None);
    }
}
