//! Website experience: speed, essential information, structured data, mobile
//! readiness and conversion aids.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};

use crate::models::analysis::{PageSpeedResult, WebsiteDetails, WebsiteExperienceResult};
use crate::services::analysis::pagespeed::score_core_web_vitals;

static HOURS_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)(mon|tue|wed|thu|fri|sat|sun).*(am|pm|\d{1,2}:\d{2})")
            .expect("hours regex should compile"),
        Regex::new(r"(?i)hours.*open").expect("hours regex should compile"),
        Regex::new(r"(?i)open.*\d{1,2}").expect("hours regex should compile"),
    ]
});

static PHONE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\(\d{3}\)\s*\d{3}-\d{4}|\d{3}-\d{3}-\d{4}").expect("phone regex should compile")
});

static ADDRESS_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)\d+\s+[\w\s]+\s+(street|st|avenue|ave|road|rd|drive|dr)")
            .expect("address regex should compile"),
        Regex::new(r"\d{5}").expect("zip regex should compile"),
    ]
});

const SERVICE_KEYWORDS: [&str; 6] = ["atm", "lottery", "hot food", "coffee", "car wash", "propane"];
const PROMOTION_KEYWORDS: [&str; 6] = ["deal", "special", "sale", "discount", "promotion", "offer"];
const BUSINESS_SCHEMA_TYPES: [&str; 4] = ["LocalBusiness", "ConvenienceStore", "GasStation", "Store"];

/// Run the content checks over a fetched page.
pub fn inspect_html(html: &str) -> WebsiteDetails {
    let document = Html::parse_document(html);
    let lower = html.to_lowercase();
    let schema = first_json_ld(&document);

    WebsiteDetails {
        has_hours: HOURS_PATTERNS.iter().any(|re| re.is_match(html)),
        has_phone: has_phone(&document),
        has_address: ADDRESS_PATTERNS.iter().any(|re| re.is_match(html)),
        has_services: SERVICE_KEYWORDS.iter().any(|k| lower.contains(k)),
        has_promotions: PROMOTION_KEYWORDS.iter().any(|k| lower.contains(k)),
        has_schema: schema.as_ref().is_some_and(is_business_schema),
        has_opening_hours_schema: schema.as_ref().is_some_and(|s| {
            s.get("openingHoursSpecification").is_some() || s.get("openingHours").is_some()
        }),
        has_mobile_viewport: exists(&document, r#"meta[name="viewport"]"#),
        has_directions: exists(
            &document,
            r#"a[href*="maps.google.com"], a[href*="google.com/maps"]"#,
        ),
    }
}

fn exists(document: &Html, selector: &str) -> bool {
    let selector = Selector::parse(selector).expect("valid selector");
    document.select(&selector).next().is_some()
}

fn has_phone(document: &Html) -> bool {
    if exists(document, r#"a[href^="tel:"]"#) {
        return true;
    }
    let body = Selector::parse("body").expect("valid selector");
    document
        .select(&body)
        .next()
        .map(|b| b.text().collect::<String>())
        .is_some_and(|text| PHONE_PATTERN.is_match(&text))
}

fn first_json_ld(document: &Html) -> Option<serde_json::Value> {
    let selector = Selector::parse(r#"script[type="application/ld+json"]"#).expect("valid selector");
    let script = document.select(&selector).next()?;
    serde_json::from_str(&script.inner_html()).ok()
}

fn is_business_schema(schema: &serde_json::Value) -> bool {
    match schema.get("@type") {
        Some(serde_json::Value::String(kind)) => BUSINESS_SCHEMA_TYPES.contains(&kind.as_str()),
        Some(serde_json::Value::Array(kinds)) => kinds
            .iter()
            .filter_map(|k| k.as_str())
            .any(|k| BUSINESS_SCHEMA_TYPES.contains(&k)),
        _ => false,
    }
}

/// Combine the audit and content checks into the dimension score, capped at 100.
pub fn score_website(
    page_speed: Option<PageSpeedResult>,
    details: WebsiteDetails,
) -> WebsiteExperienceResult {
    let core_web_vitals_score = page_speed.as_ref().map(score_core_web_vitals).unwrap_or(0);

    let essential_info_score = [
        (details.has_hours, 8),
        (details.has_phone, 6),
        (details.has_address, 6),
        (details.has_services, 5),
        (details.has_promotions, 5),
    ]
    .iter()
    .filter(|(present, _)| *present)
    .map(|(_, points)| points)
    .sum::<u32>();

    let schema_score = if details.has_schema { 10 } else { 0 }
        + if details.has_opening_hours_schema { 5 } else { 0 };
    // Pages that load get baseline mobile and conversion credit.
    let mobile_score = 7 + if details.has_mobile_viewport { 3 } else { 0 };
    let conversion_score = 3 + if details.has_directions { 2 } else { 0 };

    let total = core_web_vitals_score
        + essential_info_score
        + schema_score
        + mobile_score
        + conversion_score;

    WebsiteExperienceResult {
        score: total.min(100),
        core_web_vitals_score,
        essential_info_score,
        schema_score,
        mobile_score,
        conversion_score,
        page_speed,
        has_website: true,
        details,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_PAGE: &str = r#"<!doctype html>
<html>
<head>
  <meta name="viewport" content="width=device-width">
  <script type="application/ld+json">
    {"@type": ["ConvenienceStore", "GasStation"], "openingHours": "Mo-Su 00:00-24:00"}
  </script>
</head>
<body>
  <p>Open every day 6am to midnight. Mon-Sun 6:00 am</p>
  <a href="tel:5125550100">Call us</a>
  <p>1200 Congress Avenue, Austin TX 78701</p>
  <p>Hot food, coffee and an ATM inside. Weekly deals!</p>
  <a href="https://www.google.com/maps/place/quick-stop">Directions</a>
</body>
</html>"#;

    #[test]
    fn test_inspect_full_page() {
        let details = inspect_html(FULL_PAGE);
        assert!(details.has_hours);
        assert!(details.has_phone);
        assert!(details.has_address);
        assert!(details.has_services);
        assert!(details.has_promotions);
        assert!(details.has_schema);
        assert!(details.has_opening_hours_schema);
        assert!(details.has_mobile_viewport);
        assert!(details.has_directions);
    }

    #[test]
    fn test_inspect_bare_page() {
        let details = inspect_html("<html><body><h1>Welcome</h1></body></html>");
        assert_eq!(details, WebsiteDetails::default());
    }

    #[test]
    fn test_phone_from_body_text() {
        let details = inspect_html("<html><body>Call (512) 555-0100</body></html>");
        assert!(details.has_phone);
    }

    #[test]
    fn test_invalid_json_ld_is_not_schema() {
        let html = r#"<html><head><script type="application/ld+json">{not json</script></head></html>"#;
        let details = inspect_html(html);
        assert!(!details.has_schema);
        assert!(!details.has_opening_hours_schema);
    }

    #[test]
    fn test_score_without_audit_has_baseline() {
        let result = score_website(None, WebsiteDetails::default());
        assert!(result.has_website);
        assert_eq!(result.score, 10);
        assert_eq!(result.core_web_vitals_score, 0);
    }

    #[test]
    fn test_score_full_marks() {
        let audit = PageSpeedResult {
            performance_score: 98,
            lcp: 1200.0,
            fid: 30.0,
            cls: 0.01,
            fetch_success: true,
        };
        let result = score_website(Some(audit), inspect_html(FULL_PAGE));
        assert_eq!(result.essential_info_score, 30);
        assert_eq!(result.schema_score, 15);
        assert_eq!(result.score, 40 + 30 + 15 + 10 + 5);
    }
}
