//! Server rendered HTML pages.

use axum::response::Html;

use super::{principal::OidcPrincipal, resolver::DEFAULT_AUTHORIZATION_REQUEST_BASE_URI};
use crate::middleware::csrf::CSRF_PARAMETER;

/// Escape text for use in HTML content and quoted attributes
pub fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn layout(title: &str, body: &str) -> Html<String> {
    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <title>{title}</title>
    <link rel="stylesheet" href="/css/site.css">
</head>
<body>
{body}
</body>
</html>
"#,
        title = escape_html(title),
    ))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LoginBanner {
    pub error: bool,
    pub logged_out: bool,
}

/// Login page with one link per client registration
pub fn login_page(registration_ids: &[&str], banner: LoginBanner) -> Html<String> {
    let mut body = String::from("    <h1>Login with OpenID Connect</h1>\n");

    if banner.error {
        body.push_str("    <div class=\"alert alert-danger\">Login failed, please try again.</div>\n");
    }
    if banner.logged_out {
        body.push_str("    <div class=\"alert alert-info\">You have been logged out.</div>\n");
    }

    body.push_str("    <ul>\n");
    for id in registration_ids {
        let id = escape_html(id);
        body.push_str(&format!(
            "        <li><a href=\"{DEFAULT_AUTHORIZATION_REQUEST_BASE_URI}/{id}\">{id}</a></li>\n"
        ));
    }
    body.push_str("    </ul>");

    layout("Login", &body)
}

/// Home page of an authenticated user
pub fn home_page(principal: &OidcPrincipal, csrf_token: &str) -> Html<String> {
    let email = principal
        .email
        .as_deref()
        .map(|email| format!("    <p>Email: {}</p>\n", escape_html(email)))
        .unwrap_or_default();

    let body = format!(
        r#"    <h1>Welcome, {name}</h1>
    <p>Signed in with {registration} as <code>{subject}</code></p>
{email}    <form method="post" action="/logout">
        <input type="hidden" name="{CSRF_PARAMETER}" value="{csrf}">
        <button type="submit">Logout</button>
    </form>"#,
        name = escape_html(principal.display_name()),
        registration = escape_html(&principal.registration_id),
        subject = escape_html(&principal.subject),
        csrf = escape_html(csrf_token),
    );

    layout("Home", &body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#x27;Jerry&#x27;&lt;/a&gt;"
        );
        assert_eq!(escape_html("plain"), "plain");
    }

    #[test]
    fn test_login_page_lists_registrations() {
        let Html(html) = login_page(&["pingone", "other"], LoginBanner::default());

        assert!(html.contains(r#"href="/oauth2/authorization/pingone""#));
        assert!(html.contains(r#"href="/oauth2/authorization/other""#));
        assert!(!html.contains("Login failed"));
        assert!(!html.contains("logged out"));
    }

    #[test]
    fn test_login_page_banners() {
        let Html(html) = login_page(
            &["pingone"],
            LoginBanner {
                error: true,
                logged_out: true,
            },
        );

        assert!(html.contains("Login failed"));
        assert!(html.contains("You have been logged out"));
    }

    #[test]
    fn test_home_page_escapes_claims() {
        let principal = OidcPrincipal::new("pingone", "sub-1", "https://auth.example.com")
            .with_name("<script>alert(1)</script>")
            .with_email("jane@example.com");

        let Html(html) = home_page(&principal, "token-123");

        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("jane@example.com"));
        assert!(html.contains(r#"name="_csrf" value="token-123""#));
    }
}
