use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, render::TrailingLink, Result};

/// Feed polling interval bounds (seconds).
const MIN_POLL_SECS: u64 = 30;
const MAX_POLL_SECS: u64 = 3600;

/// Typed configuration for the bot, loaded from the environment
/// (with an optional `.env` file that never overrides real env vars).
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub bot_token: String,
    /// Operators allowed to drive the bot. Empty means "open" (single-owner
    /// deployments that never set ADMIN_IDS).
    pub admin_ids: Vec<i64>,
    /// Default publish target; a stored channel binding takes precedence.
    pub target_channel_id: Option<i64>,
    pub data_dir: PathBuf,

    // Posting behavior
    pub default_silent: bool,
    pub disable_link_preview: bool,
    pub trailing_link: Option<TrailingLink>,

    // Feed ingestion
    pub feed_poll_interval: Duration,
    pub feed_max_per_cycle: usize,
    pub feed_notify_per_cycle: usize,
    pub feed_include_link: bool,
    pub http_timeout: Duration,

    // Album assembly
    pub media_group_window: Duration,

    // Schedule engine
    pub schedule_tick: Duration,
    pub schedule_batch: u32,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let bot_token = env_str("BOT_TOKEN").unwrap_or_default();
        if bot_token.trim().is_empty() {
            return Err(Error::Config(
                "BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let admin_ids = parse_csv_i64(env_str("ADMIN_IDS"));
        let target_channel_id = env_str("TARGET_CHANNEL_ID")
            .and_then(non_empty)
            .and_then(|s| s.trim().parse::<i64>().ok());

        let data_dir = PathBuf::from(env_str("DATA_DIR").unwrap_or("./data".to_string()));
        fs::create_dir_all(&data_dir)?;

        let default_silent = env_bool("DEFAULT_SILENT").unwrap_or(false);
        let disable_link_preview = env_bool("DISABLE_LINK_PREVIEW").unwrap_or(true);

        let trailing_link = match (
            env_str("TRAILING_LINK_URL").and_then(non_empty),
            env_str("TRAILING_LINK_TEXT").and_then(non_empty),
        ) {
            (Some(url), text) => Some(TrailingLink {
                text: text.unwrap_or_else(|| url.clone()),
                url,
            }),
            (None, _) => None,
        };

        let feed_poll_interval = Duration::from_secs(
            env_u64("RSS_POLL_INTERVAL")
                .unwrap_or(180)
                .clamp(MIN_POLL_SECS, MAX_POLL_SECS),
        );
        let feed_max_per_cycle = env_usize("RSS_MAX_PER_CYCLE").unwrap_or(10);
        let feed_notify_per_cycle = env_usize("RSS_NOTIFY_PER_CYCLE").unwrap_or(3);
        let feed_include_link = env_bool("RSS_INCLUDE_LINK").unwrap_or(true);
        let http_timeout = Duration::from_secs(env_u64("HTTP_TIMEOUT_SECS").unwrap_or(15));

        let media_group_window =
            Duration::from_millis(env_u64("MEDIA_GROUP_WINDOW_MS").unwrap_or(900));

        let schedule_tick = Duration::from_secs(env_u64("SCHEDULE_TICK_SECS").unwrap_or(10));
        let schedule_batch = env_u64("SCHEDULE_BATCH").unwrap_or(50) as u32;

        Ok(Self {
            bot_token,
            admin_ids,
            target_channel_id,
            data_dir,
            default_silent,
            disable_link_preview,
            trailing_link,
            feed_poll_interval,
            feed_max_per_cycle,
            feed_notify_per_cycle,
            feed_include_link,
            http_timeout,
            media_group_window,
            schedule_tick,
            schedule_batch,
        })
    }

    /// Operator allow-list check. An empty list means every user is allowed.
    pub fn is_admin(&self, user_id: i64) -> bool {
        self.admin_ids.is_empty() || self.admin_ids.contains(&user_id)
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|s| {
        matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

fn parse_csv_i64(v: Option<String>) -> Vec<i64> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<i64>().ok())
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}
