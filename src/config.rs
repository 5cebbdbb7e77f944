use std::{fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use tracing::warn;

const CONFIG_PATH_VAR: &str = "TAZKARTI_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub feed_url: String,
    /// Listing page; also the `eventUrl` of last resort.
    pub page_url: String,
    pub site_url: String,
    pub image_base_url: String,
    pub event_base_url: String,
    pub category_id: i64,
    pub category_label: String,
    pub cache_ttl_secs: u64,
    pub request_timeout_secs: u64,
    pub pipeline_timeout_secs: u64,
    pub user_agent: String,
    pub bind_addr: String,
    pub default_location: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            feed_url: "https://www.tazkarti.com/bookenter/Entertainment/get-events?allowPaging=false"
                .to_string(),
            page_url: "https://www.tazkarti.com/#/events/category/3".to_string(),
            site_url: "https://www.tazkarti.com/".to_string(),
            image_base_url: "https://www.tazkarti.com/bookenter/Entertainment/events/".to_string(),
            event_base_url: "https://www.tazkarti.com/#/e/".to_string(),
            category_id: 3,
            category_label: "Music".to_string(),
            cache_ttl_secs: 30 * 60,
            request_timeout_secs: 15,
            pipeline_timeout_secs: 30,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".to_string(),
            bind_addr: "0.0.0.0:3000".to_string(),
            default_location: None,
        }
    }
}

impl AppConfig {
    /// Defaults, then the JSON file named by `TAZKARTI_CONFIG`, then
    /// `TAZKARTI_*` variables. Never fails; bad input is logged and skipped.
    pub fn load() -> Self {
        let _ = dotenvy::dotenv();
        let mut config = match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) => read_config(Path::new(&path)).unwrap_or_else(|err| {
                warn!(path = %path, error = %err, "ignoring unreadable config file");
                AppConfig::default()
            }),
            Err(_) => AppConfig::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, target: &mut String| {
            if let Some(value) = lookup(key).filter(|v| !v.trim().is_empty()) {
                *target = value.trim().to_string();
            }
        };
        text("TAZKARTI_FEED_URL", &mut self.feed_url);
        text("TAZKARTI_PAGE_URL", &mut self.page_url);
        text("TAZKARTI_SITE_URL", &mut self.site_url);
        text("TAZKARTI_IMAGE_BASE_URL", &mut self.image_base_url);
        text("TAZKARTI_EVENT_BASE_URL", &mut self.event_base_url);
        text("TAZKARTI_CATEGORY_LABEL", &mut self.category_label);
        text("TAZKARTI_USER_AGENT", &mut self.user_agent);
        text("TAZKARTI_BIND_ADDR", &mut self.bind_addr);

        let number = |key: &str| -> Option<u64> {
            let raw = lookup(key)?;
            match raw.trim().parse::<u64>() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(key, value = %raw, "ignoring non-numeric setting");
                    None
                }
            }
        };
        if let Some(value) = number("TAZKARTI_CATEGORY_ID") {
            self.category_id = value as i64;
        }
        if let Some(value) = number("TAZKARTI_CACHE_TTL_SECS") {
            self.cache_ttl_secs = value;
        }
        if let Some(value) = number("TAZKARTI_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = value;
        }
        if let Some(value) = number("TAZKARTI_PIPELINE_TIMEOUT_SECS") {
            self.pipeline_timeout_secs = value;
        }

        if let Some(location) = lookup("TAZKARTI_DEFAULT_LOCATION") {
            let location = location.trim();
            self.default_location = (!location.is_empty()).then(|| location.to_string());
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn pipeline_timeout(&self) -> Duration {
        Duration::from_secs(self.pipeline_timeout_secs)
    }
}

fn read_config(path: &Path) -> Result<AppConfig, String> {
    if !path.exists() {
        return Err(format!("{} does not exist", path.display()));
    }
    let contents = fs::read_to_string(path).map_err(|err| err.to_string())?;
    serde_json::from_str(&contents).map_err(|err| err.to_string())
}
