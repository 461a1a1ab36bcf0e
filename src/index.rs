use axum::{debug_handler, extract::Query, response::Html};
use serde::Deserialize;

use crate::include_res;

#[derive(Debug, Deserialize)]
pub struct LandingQuery {
    error: Option<String>,
    destroyed: Option<String>,
}

/// Landing page. Explains why the visitor ended up here, if there is a reason.
#[debug_handler]
pub async fn index(Query(LandingQuery { error, destroyed }): Query<LandingQuery>) -> Html<String> {
    Html(
        include_res!(str, "/pages/index.html")
            .replace("{notice}", notice(error.as_deref(), destroyed.as_deref() == Some("true")))
    )
}

fn notice(error: Option<&str>, destroyed: bool) -> &'static str {
    match error {
        Some("room-not-found") => r#"<p class="notice">Room not found. It may have expired or been destroyed.</p>"#,
        Some("room-full") => r#"<p class="notice">Room is full.</p>"#,
        _ if destroyed => r#"<p class="notice">Room destroyed. All messages were deleted.</p>"#,
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_reasons_only() {
        assert!(notice(Some("room-not-found"), false).contains("not found"));
        assert!(notice(Some("room-full"), false).contains("full"));
        assert!(notice(None, true).contains("destroyed"));
        assert_eq!(notice(Some("<script>"), false), "");
        assert_eq!(notice(None, false), "");
    }
}
