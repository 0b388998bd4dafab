//! Remote tier configuration, read from the environment.

use log::warn;
use url::Url;

const REMOTE_URL_ENV: &str = "FOCUS_GARDEN_REMOTE_URL";
const REMOTE_TOKEN_ENV: &str = "FOCUS_GARDEN_REMOTE_TOKEN";
const MANAGEMENT_URL_ENV: &str = "FOCUS_GARDEN_MANAGEMENT_URL";
const USER_ID_ENV: &str = "FOCUS_GARDEN_USER_ID";
const DEFAULT_MANAGEMENT_URL: &str = "https://api.supabase.com";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    pub base_url: Url,
    pub api_token: String,
    /// Project identifier taken from the base URL's subdomain. Schema
    /// provisioning needs it.
    pub project_ref: Option<String>,
    pub management_url: Url,
    /// Authenticated identity, used instead of the anonymous local id.
    pub user_id: Option<String>,
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl RemoteConfig {
    /// Reads the remote configuration. Returns `None` (local-only mode) when
    /// the URL or token is missing.
    pub fn from_env() -> Option<Self> {
        let env = |key: &str| std::env::var(key).ok();
        let mut config = Self::from_parts(
            env(REMOTE_URL_ENV).as_deref(),
            env(REMOTE_TOKEN_ENV).as_deref(),
        )?;

        if let Some(raw) = non_blank(env(MANAGEMENT_URL_ENV).as_deref()) {
            match Url::parse(raw) {
                Ok(url) => config.management_url = url,
                Err(e) => warn!("ignoring invalid {}: {}", MANAGEMENT_URL_ENV, e),
            }
        }
        config.user_id = non_blank(env(USER_ID_ENV).as_deref()).map(str::to_string);
        Some(config)
    }

    /// Builds a configuration from a base URL and API token.
    pub fn from_parts(base_url: Option<&str>, api_token: Option<&str>) -> Option<Self> {
        let raw_url = non_blank(base_url)?;
        let api_token = non_blank(api_token)?;

        let base_url = match Url::parse(raw_url) {
            Ok(url) if !url.cannot_be_a_base() => url,
            Ok(_) => {
                warn!("remote URL {} cannot be used as a base; staying local-only", raw_url);
                return None;
            }
            Err(e) => {
                warn!("invalid remote URL {}: {}; staying local-only", raw_url, e);
                return None;
            }
        };
        let management_url = Url::parse(DEFAULT_MANAGEMENT_URL).ok()?;

        Some(Self {
            project_ref: project_ref_from(&base_url),
            base_url,
            api_token: api_token.to_string(),
            management_url,
            user_id: None,
        })
    }
}

/// First label of a host with at least three labels, e.g. `abcd` in
/// `abcd.supabase.co`.
fn project_ref_from(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() < 3 || host.parse::<std::net::Ipv4Addr>().is_ok() {
        return None;
    }
    Some(labels[0].to_string()).filter(|label| !label.is_empty())
}
