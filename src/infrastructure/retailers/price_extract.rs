//! Price extraction from retailer product pages.
//!
//! Recognizes the embedded forms most shops publish for search engines:
//! schema.org microdata, Open Graph product meta tags and JSON-LD offers.

use rust_decimal::Decimal;
use std::str::FromStr;

/// First positive price found in `html`, trying microdata, meta tags, then JSON-LD.
pub fn extract_price(html: &str) -> Option<Decimal> {
    attribute_price(html, "itemprop=\"price\"")
        .or_else(|| attribute_price(html, "property=\"product:price:amount\""))
        .or_else(|| attribute_price(html, "property=\"og:price:amount\""))
        .or_else(|| json_ld_price(html))
}

/// Captcha or robot-check interstitial instead of a product page.
pub fn looks_blocked(html: &str) -> bool {
    let lower = html.to_ascii_lowercase();
    lower.contains("captcha") || lower.contains("robot check") || lower.contains("access denied")
}

fn attribute_price(html: &str, marker: &str) -> Option<Decimal> {
    let mut from = 0;
    while let Some(pos) = html[from..].find(marker) {
        let at = from + pos;
        let tag_start = html[..at].rfind('<').unwrap_or(0);
        let tag_end = html[at..].find('>').map(|i| at + i).unwrap_or(html.len());
        let tag = &html[tag_start..tag_end];
        if let Some(price) = attr_value(tag, "content").and_then(parse_price_text) {
            return Some(price);
        }
        from = at + marker.len();
    }
    None
}

fn attr_value<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    let needle = format!("{name}=");
    let start = tag.find(&needle)? + needle.len();
    let rest = &tag[start..];
    let quote = rest.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let rest = &rest[1..];
    let end = rest.find(quote)?;
    Some(&rest[..end])
}

fn json_ld_price(html: &str) -> Option<Decimal> {
    let mut from = 0;
    while let Some(pos) = html[from..].find("\"price\"") {
        let after = from + pos + "\"price\"".len();
        let rest = html[after..].trim_start();
        if let Some(rest) = rest.strip_prefix(':') {
            let rest = rest.trim_start();
            let price = if let Some(quoted) = rest.strip_prefix('"') {
                quoted.split('"').next().and_then(parse_price_text)
            } else {
                // A bare JSON number always uses `.` as the decimal point.
                rest.split(|c: char| c == ',' || c == '}' || c.is_whitespace())
                    .next()
                    .and_then(|n| Decimal::from_str(n).ok())
                    .filter(|d| d.is_sign_positive() && !d.is_zero())
            };
            if price.is_some() {
                return price;
            }
        }
        from = after;
    }
    None
}

/// Parses human or machine price text: `19.99`, `19,99 €`, `1.299,00`, `$1,299.00`.
///
/// When only one kind of separator appears it is read as a thousands
/// separator if it repeats (`1.299.000`) or if it is followed by exactly
/// three digits after a non-zero integer part (`1.299`, `1,299`). Otherwise
/// it is the decimal point (`19,99`, `0.995`).
pub fn parse_price_text(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    if !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    let normalized = match (cleaned.rfind('.'), cleaned.rfind(',')) {
        (Some(dot), Some(comma)) if comma > dot => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (None, Some(_)) => single_separator(&cleaned, ','),
        (Some(_), None) => single_separator(&cleaned, '.'),
        (None, None) => cleaned,
    };
    Decimal::from_str(&normalized)
        .ok()
        .filter(|d| d.is_sign_positive() && !d.is_zero())
}

fn single_separator(cleaned: &str, sep: char) -> String {
    let groups: Vec<&str> = cleaned.split(sep).collect();
    let leading = groups[0];
    let thousands = match groups.len() {
        1 => false,
        2 => groups[1].len() == 3 && !leading.is_empty() && !leading.starts_with('0'),
        _ => groups[1..].iter().all(|g| g.len() == 3),
    };
    if thousands {
        groups.concat()
    } else {
        cleaned.replace(sep, ".")
    }
}
