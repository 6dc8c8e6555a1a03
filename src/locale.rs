// Copyright © 2024 PageFlow. All rights reserved.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! # Locale Resolution
//!
//! Derives the active language and text direction. A path segment naming a
//! right-to-left language wins; otherwise the document's declared language
//! is used, and finally the configured default.

use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Text direction of a locale.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Left to right.
    #[default]
    Ltr,
    /// Right to left.
    Rtl,
}

impl Direction {
    /// The value of the `dir` attribute.
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Ltr => "ltr",
            Direction::Rtl => "rtl",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A language code and its text direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locale {
    /// Language code, e.g. `en`.
    pub language: String,
    /// Text direction.
    pub direction: Direction,
}

impl Locale {
    /// Creates a locale.
    pub fn new<S: Into<String>>(
        language: S,
        direction: Direction,
    ) -> Self {
        Self {
            language: language.into(),
            direction,
        }
    }
}

/// Resolves the locale of a page.
///
/// # Arguments
///
/// * `href` - The effective page URL.
/// * `declared_language` - The document's `lang` attribute, if set.
/// * `rtl_languages` - Languages flagged by a path segment, e.g. `/ar/`.
/// * `default_language` - Used when nothing else applies.
pub fn resolve_locale(
    href: &str,
    declared_language: Option<&str>,
    rtl_languages: &[String],
    default_language: &str,
) -> Locale {
    if let Some(language) = rtl_languages
        .iter()
        .find(|language| href.contains(&format!("/{}/", language)))
    {
        return Locale::new(language.as_str(), Direction::Rtl);
    }

    match declared_language.map(str::trim) {
        Some(language) if !language.is_empty() => {
            Locale::new(language, Direction::Ltr)
        }
        _ => Locale::new(default_language, Direction::Ltr),
    }
}

const MONTHS_EN: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep",
    "Oct", "Nov", "Dec",
];

const MONTHS_AR: [&str; 12] = [
    "يناير",
    "فبراير",
    "مارس",
    "أبريل",
    "مايو",
    "يونيو",
    "يوليو",
    "أغسطس",
    "سبتمبر",
    "أكتوبر",
    "نوفمبر",
    "ديسمبر",
];

/// Formats a date as `DD Mon YYYY` with a short month name for `language`.
///
/// Accepts `YYYY-MM-DD` or an RFC 3339 timestamp. Returns `None` when the
/// input is neither.
pub fn format_date(date: &str, language: &str) -> Option<String> {
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(date)
                .ok()
                .map(|timestamp| timestamp.date_naive())
        })?;

    let months = if language.starts_with("ar") {
        &MONTHS_AR
    } else {
        &MONTHS_EN
    };
    let month = months[date.month0() as usize];
    Some(format!("{:02} {} {}", date.day(), month, date.year()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locale_of(href: &str, declared: Option<&str>) -> Locale {
        resolve_locale(href, declared, &["ar".to_string()], "en")
    }

    #[test]
    fn test_rtl_path_segment_wins() {
        let locale =
            locale_of("https://www.example.com/ar/shop", Some("en"));
        assert_eq!(locale, Locale::new("ar", Direction::Rtl));
    }

    #[test]
    fn test_declared_language_is_ltr() {
        let locale =
            locale_of("https://www.example.com/fr/", Some("fr"));
        assert_eq!(locale, Locale::new("fr", Direction::Ltr));
    }

    #[test]
    fn test_defaults_to_english() {
        let locale = locale_of("https://www.example.com/", None);
        assert_eq!(locale, Locale::new("en", Direction::Ltr));

        let blank = locale_of("https://www.example.com/", Some("  "));
        assert_eq!(blank, Locale::new("en", Direction::Ltr));
    }

    #[test]
    fn test_segment_must_be_whole() {
        // `/arabic/` is not the `ar` segment.
        let locale = locale_of("https://www.example.com/arabic/", None);
        assert_eq!(locale.direction, Direction::Ltr);
    }

    #[test]
    fn test_format_date() {
        assert_eq!(
            format_date("2024-03-07", "en").as_deref(),
            Some("07 Mar 2024")
        );
        assert_eq!(
            format_date("2024-12-25T10:00:00+04:00", "en-GB")
                .as_deref(),
            Some("25 Dec 2024")
        );
        assert_eq!(
            format_date("2024-01-02", "ar").as_deref(),
            Some("02 يناير 2024")
        );
        assert_eq!(format_date("yesterday", "en"), None);
    }
}
