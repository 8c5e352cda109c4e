//! Minimal HTML result pages for the OAuth callback.

use crate::region::region_display_name;

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!doctype html>\n<html lang=\"en\">\n<head><meta charset=\"utf-8\"><title>{}</title></head>\n<body>\n<h1>{}</h1>\n{body}\n</body>\n</html>\n",
        escape(title),
        escape(title)
    )
}

#[must_use]
pub fn success_page(company_name: &str, organization_id: &str, region: &str, mcp_url: &str) -> String {
    page(
        "Zoho Books connected",
        &format!(
            "<p>Company: <strong>{}</strong></p>\n<p>Organization ID: <code>{}</code></p>\n<p>Region: {} ({})</p>\n<p>MCP endpoint: <code>{}</code></p>",
            escape(company_name),
            escape(organization_id),
            escape(region_display_name(region)),
            escape(region),
            escape(mcp_url),
        ),
    )
}

#[must_use]
pub fn setup_required_page(region: &str) -> String {
    page(
        "Zoho Books setup required",
        &format!(
            "<p>This Zoho account ({} data center) has no Zoho Books organization yet.</p>\n<p>Create an organization in Zoho Books, then connect again.</p>",
            escape(region_display_name(region)),
        ),
    )
}

#[must_use]
pub fn error_page(message: &str) -> String {
    page(
        "Connection failed",
        &format!("<pre>{}</pre>", escape(message)),
    )
}
