//! Browser header profiles
//!
//! Catalog sites behind bot protection reject requests that do not look
//! like a desktop browser. Providers that configure their own `User-Agent`
//! keep it; everything else gets a realistic profile filled in.

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::Rng;

/// Real Chrome versions (high market share)
const CHROME_VERSIONS: &[(&str, &str)] = &[
    ("131", "131.0.0.0"),
    ("130", "130.0.0.0"),
    ("129", "129.0.0.0"),
    ("128", "128.0.0.0"),
];

/// Real Firefox versions
const FIREFOX_VERSIONS: &[&str] = &["133.0", "132.0", "131.0"];

/// Languages the catalog sites serve; the first tag matches the site locale.
const ACCEPT_LANGUAGES: &[&str] = &[
    "ru-RU,ru;q=0.9,en-US;q=0.8,en;q=0.7",
    "uk-UA,uk;q=0.9,ru;q=0.8,en;q=0.7",
    "ru,en;q=0.9",
];

const DESKTOP_OS: &[&str] = &[
    "Windows NT 10.0; Win64; x64",
    "Macintosh; Intel Mac OS X 10_15_7",
    "X11; Linux x86_64",
];

/// Header set that identifies as one desktop browser.
#[derive(Debug, Clone)]
pub struct BrowserProfile {
    pub user_agent: String,
    pub accept: &'static str,
    pub accept_language: String,
    /// Client hints; Firefox sends none.
    pub sec_ch_ua: Option<String>,
}

/// Generate a Chrome profile on a random desktop OS
#[must_use]
pub fn chrome_profile() -> BrowserProfile {
    let mut rng = rand::thread_rng();
    let os = DESKTOP_OS.choose(&mut rng).copied().unwrap_or(DESKTOP_OS[0]);
    let (major, full) = CHROME_VERSIONS
        .choose(&mut rng)
        .copied()
        .unwrap_or(CHROME_VERSIONS[0]);

    BrowserProfile {
        user_agent: format!(
            "Mozilla/5.0 ({os}) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{full} Safari/537.36"
        ),
        accept: "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        accept_language: random_accept_language(&mut rng),
        sec_ch_ua: Some(format!(
            "\"Google Chrome\";v=\"{major}\", \"Chromium\";v=\"{major}\", \"Not_A Brand\";v=\"24\""
        )),
    }
}

/// Generate a Firefox profile on a random desktop OS
#[must_use]
pub fn firefox_profile() -> BrowserProfile {
    let mut rng = rand::thread_rng();
    let os = DESKTOP_OS.choose(&mut rng).copied().unwrap_or(DESKTOP_OS[0]);
    let version = FIREFOX_VERSIONS
        .choose(&mut rng)
        .copied()
        .unwrap_or(FIREFOX_VERSIONS[0]);

    BrowserProfile {
        user_agent: format!("Mozilla/5.0 ({os}; rv:{version}) Gecko/20100101 Firefox/{version}"),
        accept: "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        accept_language: random_accept_language(&mut rng),
        sec_ch_ua: None,
    }
}

/// Chrome three times out of four, Firefox otherwise.
#[must_use]
pub fn random_profile() -> BrowserProfile {
    if rand::thread_rng().gen_bool(0.75) {
        chrome_profile()
    } else {
        firefox_profile()
    }
}

fn random_accept_language(rng: &mut impl Rng) -> String {
    ACCEPT_LANGUAGES
        .choose(rng)
        .copied()
        .unwrap_or(ACCEPT_LANGUAGES[0])
        .to_string()
}

impl BrowserProfile {
    /// Add this profile's headers to `headers` without touching any
    /// header the provider already configured (case-insensitive).
    pub fn fill_missing(&self, headers: &mut BTreeMap<String, String>) {
        let mut defaults = vec![
            ("User-Agent", self.user_agent.clone()),
            ("Accept", self.accept.to_string()),
            ("Accept-Language", self.accept_language.clone()),
        ];
        if let Some(ua) = &self.sec_ch_ua {
            defaults.push(("Sec-CH-UA", ua.clone()));
            defaults.push(("Sec-CH-UA-Mobile", "?0".to_string()));
        }

        for (name, value) in defaults {
            let present = headers.keys().any(|k| k.eq_ignore_ascii_case(name));
            if !present {
                headers.insert(name.to_string(), value);
            }
        }
    }
}
