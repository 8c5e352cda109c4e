//! Data-center region detection from the API domain Zoho hands back with tokens.

pub const DEFAULT_REGION: &str = "com";

/// `https://www.zohoapis.com.au` → `com.au`, `https://www.zohoapis.eu` → `eu`.
///
/// Anything that does not look like a Zoho API host falls back to `com`.
#[must_use]
pub fn region_from_api_domain(api_domain: &str) -> String {
    if !api_domain.contains(".zohoapis.") {
        return DEFAULT_REGION.to_string();
    }
    let host = api_domain
        .split_once("//")
        .map_or(api_domain, |(_, rest)| rest);
    let host = host.split(['/', ':']).next().unwrap_or(host);

    let parts: Vec<&str> = host.split('.').collect();
    match parts.len() {
        4 => format!("{}.{}", parts[2], parts[3]),
        n if n > 2 => parts[2].to_string(),
        _ => DEFAULT_REGION.to_string(),
    }
}

#[must_use]
pub fn region_display_name(region: &str) -> &'static str {
    match region {
        "com" => "United States",
        "in" => "India",
        "eu" => "Europe",
        "com.au" => "Australia",
        "jp" => "Japan",
        "ca" => "Canada",
        "com.cn" => "China",
        "sa" => "Saudi Arabia",
        _ => "Unknown region",
    }
}
