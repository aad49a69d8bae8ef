//! Crawler detection for the bot guard.

/// User-agent needles of the crawlers the guard buffers for. Matching is
/// case-insensitive substring search.
const BOT_NEEDLES: &[&str] = &[
    "googlebot",
    "bingbot",
    "slurp",
    "duckduckbot",
    "baiduspider",
    "yandexbot",
    "applebot",
    "facebookexternalhit",
    "twitterbot",
];

pub fn is_search_bot(user_agent: &str) -> bool {
    let ua = user_agent.to_ascii_lowercase();
    BOT_NEEDLES.iter().any(|needle| ua.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_common_crawlers() {
        assert!(is_search_bot("Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)"));
        assert!(is_search_bot("Mozilla/5.0 (compatible; bingbot/2.0)"));
        assert!(is_search_bot("Mozilla/5.0 (compatible; YandexBot/3.0)"));
    }

    #[test]
    fn ignores_browsers() {
        assert!(!is_search_bot("Mozilla/5.0 (X11; Linux x86_64) Firefox/128.0"));
        assert!(!is_search_bot(""));
    }
}
