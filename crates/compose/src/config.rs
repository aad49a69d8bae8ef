//! Composer configuration.

/// All tunables of a [`Composer`](crate::Composer), with the defaults spelled
/// out in one place. Hosts build this once and hand it to the composer; no
/// option is read from the environment.
#[derive(Debug, Clone)]
pub struct ComposeConfig {
    /// Tag name treated as a fragment placeholder in templates.
    pub fragment_tag: String,
    /// Additional tag names delegated to the host's tag handler.
    pub handled_tags: Vec<String>,
    /// Upper bound on scripts and on stylesheets taken from one fragment's
    /// link headers. Also the position-index stride. Clamped to at least 1.
    pub max_asset_links: usize,
    /// Parsed-template cache capacity in entries. 0 disables caching.
    pub template_cache_size: usize,
    /// When enabled, responses to known crawlers are buffered until every
    /// fragment reported, and any fragment failure fails the page.
    pub bots_guard_enabled: bool,
    /// AMD loader preloaded on every page via the `Link` response header.
    pub amd_loader_url: String,
}

pub const DEFAULT_AMD_LOADER_URL: &str =
    "https://cdnjs.cloudflare.com/ajax/libs/require.js/2.1.22/require.min.js";

pub const DEFAULT_FRAGMENT_TIMEOUT_MS: u64 = 3000;

impl Default for ComposeConfig {
    fn default() -> Self {
        Self {
            fragment_tag: "fragment".to_string(),
            handled_tags: Vec::new(),
            max_asset_links: 1,
            template_cache_size: 0,
            bots_guard_enabled: false,
            amd_loader_url: DEFAULT_AMD_LOADER_URL.to_string(),
        }
    }
}

impl ComposeConfig {
    pub fn max_asset_links(&self) -> usize {
        self.max_asset_links.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = ComposeConfig::default();
        assert_eq!(config.fragment_tag, "fragment");
        assert_eq!(config.max_asset_links(), 1);
        assert_eq!(config.template_cache_size, 0);
        assert!(!config.bots_guard_enabled);
    }

    #[test]
    fn max_asset_links_clamped_to_one() {
        let config = ComposeConfig { max_asset_links: 0, ..Default::default() };
        assert_eq!(config.max_asset_links(), 1);
    }
}
