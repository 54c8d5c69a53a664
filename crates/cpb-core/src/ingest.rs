//! Feed ingestion: periodic RSS polling into deduplicated drafts.
//!
//! Parsing is deliberately lenient (regex scan, first match per tag)
//! because real-world feeds are messy; a feed that fails to parse yields
//! zero items, never an error that stops the loop.

use std::fmt::Write as _;
use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDateTime};
use regex::Regex;
use sha2::{Digest, Sha256};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::domain::ChatId;
use crate::messaging::port::PostSender;
use crate::messaging::types::MediaRef;
use crate::store::{ContentType, Feed, NewDraft, Store};
use crate::{Error, Result};

/// One entry scraped out of a feed document.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FeedItem {
    pub title: Option<String>,
    pub link: Option<String>,
    pub guid: Option<String>,
    pub summary: Option<String>,
    /// Local wall-clock publication time, when the feed's date parsed.
    pub published: Option<NaiveDateTime>,
    /// Image URL from an enclosure or media:content tag.
    pub media_url: Option<String>,
}

pub struct FeedWorker {
    cfg: Arc<Config>,
    store: Arc<dyn Store>,
    notifier: Arc<dyn PostSender>,
    http: reqwest::Client,
    /// Items dated before this are ignored. Fixed at construction: start
    /// of the current local day, so a restart mid-day cannot re-surface
    /// the morning's backlog.
    cutoff: NaiveDateTime,
}

impl FeedWorker {
    pub fn new(
        cfg: Arc<Config>,
        store: Arc<dyn Store>,
        notifier: Arc<dyn PostSender>,
    ) -> Result<Self> {
        let cutoff = start_of_local_day();
        Self::with_cutoff(cfg, store, notifier, cutoff)
    }

    fn with_cutoff(
        cfg: Arc<Config>,
        store: Arc<dyn Store>,
        notifier: Arc<dyn PostSender>,
        cutoff: NaiveDateTime,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(cfg.http_timeout)
            .user_agent(concat!("cpb/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Http(format!("http client: {e}")))?;
        Ok(Self {
            cfg,
            store,
            notifier,
            http,
            cutoff,
        })
    }

    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(self.cfg.feed_poll_interval);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(
                "feed worker started (interval {:?}, cutoff {})",
                self.cfg.feed_poll_interval, self.cutoff
            );
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tick.tick() => {
                        if let Err(e) = self.process_once().await {
                            warn!("feed cycle failed: {e}");
                        }
                    }
                }
            }
        })
    }

    /// One polling cycle over all active feeds. Per-feed failures are
    /// logged and skipped.
    pub async fn process_once(&self) -> Result<()> {
        let feeds = self.store.active_feeds()?;
        let mut notified = 0usize;
        for feed in &feeds {
            let body = match self.fetch(&feed.url).await {
                Ok(b) => b,
                Err(e) => {
                    warn!("feed {} ({}): fetch failed: {e}", feed.id, feed.url);
                    continue;
                }
            };
            let mut items = extract_items(&body);
            items.truncate(self.cfg.feed_max_per_cycle);
            if let Err(e) = self.ingest_feed(feed, items, &mut notified).await {
                warn!("feed {}: ingest failed: {e}", feed.id);
            }
        }
        Ok(())
    }

    async fn ingest_feed(
        &self,
        feed: &Feed,
        items: Vec<FeedItem>,
        notified: &mut usize,
    ) -> Result<()> {
        for item in items {
            // An unparseable date is not grounds for dropping the item.
            if let Some(dt) = item.published {
                if dt < self.cutoff {
                    debug!("feed {}: item older than cutoff, skipping", feed.id);
                    continue;
                }
            }

            let hash = fingerprint(
                feed.id.0,
                item.guid.as_deref(),
                item.link.as_deref(),
                item.title.as_deref(),
            );

            let image = match &item.media_url {
                Some(url) => Some(url.clone()),
                None => match &item.link {
                    Some(link) => self.og_image(link).await,
                    None => None,
                },
            };

            let text = build_post_text(&item, self.cfg.feed_include_link);
            let draft = NewDraft {
                author_id: 0,
                content_type: if image.is_some() {
                    ContentType::Photo
                } else {
                    ContentType::Text
                },
                text: Some(text),
                media: image.clone().map(MediaRef),
                source_url: item.link.clone(),
                media_url: image,
                dedup_hash: Some(hash),
                ..Default::default()
            };

            let Some(id) = self.store.insert_draft(draft)? else {
                debug!("feed {}: item already seen", feed.id);
                continue;
            };
            info!("feed {}: new draft {id}", feed.id);

            if *notified < self.cfg.feed_notify_per_cycle {
                *notified += 1;
                let title = item.title.as_deref().unwrap_or("(untitled)");
                let note = format!("New feed draft #{id}: {title}");
                for admin in &self.cfg.admin_ids {
                    if let Err(e) = self
                        .notifier
                        .send_text(ChatId(*admin), &crate::render::escape_html(&note), None)
                        .await
                    {
                        warn!("notify {admin} failed: {e}");
                    }
                }
            }
        }
        Ok(())
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::Http(e.to_string()))?;
        resp.text().await.map_err(|e| Error::Http(e.to_string()))
    }

    /// Best-effort og:image scrape of an article page.
    async fn og_image(&self, url: &str) -> Option<String> {
        let html = self.fetch(url).await.ok()?;
        og_image_from_html(&html)
    }
}

fn start_of_local_day() -> NaiveDateTime {
    Local::now().date_naive().and_hms_opt(0, 0, 0).unwrap_or_else(|| Local::now().naive_local())
}

/// Scrape `<item>` blocks out of a feed document.
pub fn extract_items(xml: &str) -> Vec<FeedItem> {
    let item_re = Regex::new(r"(?is)<item\b.*?</item>").expect("valid regex");
    item_re
        .find_iter(xml)
        .map(|m| {
            let block = m.as_str();
            FeedItem {
                title: first_tag(block, "title").map(|s| clean_text(&s)).filter(|s| !s.is_empty()),
                link: first_tag(block, "link").map(|s| clean_text(&s)).filter(|s| !s.is_empty()),
                guid: first_tag(block, "guid").map(|s| clean_text(&s)).filter(|s| !s.is_empty()),
                summary: first_tag(block, "description")
                    .map(|s| clean_text(&s))
                    .filter(|s| !s.is_empty()),
                published: ["pubDate", "published", "updated"]
                    .into_iter()
                    .find_map(|tag| first_tag(block, tag))
                    .and_then(|s| parse_pub_date(s.trim())),
                media_url: media_attachment(block),
            }
        })
        .collect()
}

fn first_tag(block: &str, tag: &str) -> Option<String> {
    let re = Regex::new(&format!(r"(?is)<{tag}\b[^>]*>(.*?)</{tag}>")).expect("valid regex");
    re.captures(block).map(|c| c[1].to_string())
}

fn media_attachment(block: &str) -> Option<String> {
    // Some feeds spell the attribute `href` instead of `url`.
    let re = Regex::new(
        r#"(?is)<(?:enclosure|media:content)\b[^>]*\b(?:url|href)\s*=\s*["']([^"']+)["']"#,
    )
    .expect("valid regex");
    re.captures(block).map(|c| c[1].to_string())
}

/// Strip markup down to plain text: unwrap CDATA, drop tags, decode the
/// common entities, collapse whitespace.
pub fn clean_text(s: &str) -> String {
    let cdata_re = Regex::new(r"(?s)<!\[CDATA\[(.*?)\]\]>").expect("valid regex");
    let s = cdata_re.replace_all(s, "$1");
    let tag_re = Regex::new(r"(?s)<[^>]+>").expect("valid regex");
    let s = tag_re.replace_all(&s, " ");
    let s = s
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ");
    let ws_re = Regex::new(r"\s+").expect("valid regex");
    ws_re.replace_all(s.trim(), " ").into_owned()
}

/// Parse a feed date (RFC 2822, then RFC 3339) into local wall-clock
/// time. Anything else is `None` — the item is kept, undated.
pub fn parse_pub_date(s: &str) -> Option<NaiveDateTime> {
    DateTime::parse_from_rfc2822(s)
        .or_else(|_| DateTime::parse_from_rfc3339(s))
        .ok()
        .map(|dt| dt.with_timezone(&Local).naive_local())
}

/// Content fingerprint over (feed id, guid, link, title). Each part is
/// length-prefixed before hashing so part boundaries cannot collide
/// ("ab"+"c" hashes differently from "a"+"bc").
pub fn fingerprint(
    feed_id: i64,
    guid: Option<&str>,
    link: Option<&str>,
    title: Option<&str>,
) -> String {
    let mut hasher = Sha256::new();
    let id_part = feed_id.to_string();
    for part in [Some(id_part.as_str()), guid, link, title] {
        let bytes = part.unwrap_or("").as_bytes();
        hasher.update((bytes.len() as u64).to_be_bytes());
        hasher.update(bytes);
    }
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        let _ = write!(out, "{b:02x}");
    }
    out
}

/// Synthesize the draft body: title, summary, optional source link,
/// joined by blank lines.
pub fn build_post_text(item: &FeedItem, include_link: bool) -> String {
    let mut parts: Vec<&str> = Vec::new();
    if let Some(t) = item.title.as_deref() {
        parts.push(t);
    }
    if let Some(s) = item.summary.as_deref() {
        if Some(s) != item.title.as_deref() {
            parts.push(s);
        }
    }
    if include_link {
        if let Some(l) = item.link.as_deref() {
            parts.push(l);
        }
    }
    parts.join("\n\n")
}

fn og_image_from_html(html: &str) -> Option<String> {
    let fwd = Regex::new(
        r#"(?is)<meta\b[^>]*\bproperty\s*=\s*["']og:image["'][^>]*\bcontent\s*=\s*["']([^"']+)["']"#,
    )
    .expect("valid regex");
    if let Some(c) = fwd.captures(html) {
        return Some(c[1].to_string());
    }
    // Attribute order is not fixed in the wild.
    let rev = Regex::new(
        r#"(?is)<meta\b[^>]*\bcontent\s*=\s*["']([^"']+)["'][^>]*\bproperty\s*=\s*["']og:image["']"#,
    )
    .expect("valid regex");
    rev.captures(html).map(|c| c[1].to_string())
}
