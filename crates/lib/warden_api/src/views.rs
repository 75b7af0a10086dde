//! HTML pages shown to the resource owner.

use warden_core::client::ClientRecord;
use warden_core::scope::ScopeSet;

/// Escape text for use in HTML element content and quoted attributes.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            c => out.push(c),
        }
    }
    out
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>{title}</title>\n</head>\n<body>\n{body}\n</body>\n</html>\n",
        title = escape(title),
    )
}

pub fn error_page(title: &str, message: &str) -> String {
    page(
        title,
        &format!("<h1>{}</h1>\n<p>{}</p>", escape(title), escape(message)),
    )
}

/// Consent prompt. The form posts back to the current URL.
pub fn consent_page(client: &ClientRecord, scope: &ScopeSet, owner_id: &str) -> String {
    let mut body = format!(
        "<h1>Approve application</h1>\n<p><strong>{name}</strong> ({id}) wants to access your data.</p>\n",
        name = escape(client.name()),
        id = escape(client.id()),
    );
    if let Some(description) = client.description() {
        body.push_str(&format!("<p>{}</p>\n", escape(description)));
    }
    if let Some(icon) = client.icon() {
        body.push_str(&format!(
            "<img src=\"{}\" alt=\"\" width=\"64\" height=\"64\">\n",
            escape(icon)
        ));
    }
    if !scope.is_empty() {
        body.push_str("<ul>\n");
        for token in scope.iter() {
            body.push_str(&format!("<li>{}</li>\n", escape(token)));
        }
        body.push_str("</ul>\n");
    }
    body.push_str(&format!(
        "<p>Signed in as {owner}. You will be redirected to <code>{redirect}</code>.</p>\n\
         <form method=\"post\">\n\
         <input type=\"hidden\" name=\"scope\" value=\"{scope}\">\n\
         <button type=\"submit\" name=\"approval\" value=\"approve\">Approve</button>\n\
         <button type=\"submit\" name=\"approval\" value=\"reject\">Reject</button>\n\
         </form>",
        owner = escape(owner_id),
        redirect = escape(client.redirect_uri()),
        scope = escape(&scope.to_string()),
    ));
    page("Approve application", &body)
}
