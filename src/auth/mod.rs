use axum::http::{header, HeaderMap, HeaderValue};
use tower_sessions::cookie::{Cookie, SameSite};

use crate::{config::Config, token::Token, AppResult};

mod gateway;
mod guard;

pub use gateway::gateway;
pub use guard::{check_membership, Member};

pub const TOKEN_COOKIE: &str = "x-auth-token";

/// The room token carried by the request's cookie, if any.
pub fn read_token(headers: &HeaderMap) -> Option<Token> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| Cookie::split_parse(value))
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == TOKEN_COOKIE && !cookie.value().is_empty())
        .map(|cookie| Token::from(cookie.value().to_owned()))
}

/// Site-wide, script-inaccessible, same-site-only cookie living as long as a room can.
pub fn token_cookie(token: &Token, config: &Config) -> AppResult<HeaderValue> {
    let cookie = Cookie::build((TOKEN_COOKIE, token.as_str().to_owned()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict)
        .secure(config.secure_cookies)
        .max_age(time::Duration::seconds(i64::try_from(config.room_ttl.as_secs()).unwrap_or(i64::MAX)))
        .build();

    Ok(HeaderValue::from_str(&cookie.to_string()).map_err(anyhow::Error::from)?)
}
