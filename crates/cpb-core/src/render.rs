//! Content renderer: draft fields → outbound message plan.
//!
//! Pure and side-effect-free, so previews and actual publishes go through
//! the exact same code path.

use crate::messaging::types::{AlbumItem, Keyboard, MediaKind, MediaRef};
use crate::store::{ContentType, Draft};

/// Hard limit for a standalone message (Telegram).
pub const TEXT_LIMIT: usize = 4096;
/// Limit under which text may ride along as a media caption.
pub const CAPTION_LIMIT: usize = 1024;

const EMPTY_ALBUM_NOTICE: &str = "(empty album)";

// Telegram rejects empty message bodies, so a keyboard-only follow-up
// after a media group rides on a zero-width space.
const KEYBOARD_CARRIER: &str = "\u{200b}";

/// Fixed promotional link appended to every rendered post.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrailingLink {
    pub url: String,
    pub text: String,
}

/// One outbound message of a publish plan, in send order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
    Text {
        html: String,
        keyboard: Option<Keyboard>,
    },
    Media {
        kind: MediaKind,
        media: MediaRef,
        caption: Option<String>,
        keyboard: Option<Keyboard>,
    },
    MediaGroup {
        items: Vec<AlbumItem>,
        caption_first: Option<String>,
    },
}

/// Minimal HTML escaping for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Truncate to at most `max` characters (not bytes). Hard cut, no ellipsis.
pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    s.chars().take(max).collect()
}

/// Escape the body and append the configured trailing link.
///
/// A raw occurrence of the link URL inside the body is turned into the
/// anchor instead of appending a second one.
pub fn render_html(body: &str, link: Option<&TrailingLink>) -> String {
    let mut safe = escape_html(body);

    let Some(link) = link else {
        return safe;
    };

    let anchor = format!("<a href=\"{}\">{}</a>", link.url, escape_html(&link.text));
    safe = safe.replace(&link.url, &anchor);
    if !safe.contains(&format!("href=\"{}\"", link.url)) {
        if !safe.trim().is_empty() {
            safe.push_str("\n\n");
        }
        safe.push_str(&anchor);
    }
    safe
}

/// Build the outbound plan for one draft.
///
/// Size rules: a standalone text is hard-truncated to [`TEXT_LIMIT`]; text
/// rides as a caption only when it fits [`CAPTION_LIMIT`], otherwise the
/// media goes out bare and the full text follows as a separate message
/// carrying the keyboard. For albums the caption decision is made once for
/// the whole batch and only the first item may carry it; a keyboard always
/// goes via a trailing text message because media groups cannot hold one.
pub fn plan(draft: &Draft, link: Option<&TrailingLink>) -> Vec<Outbound> {
    let html = render_html(draft.text.as_deref().unwrap_or(""), link);
    let keyboard = Keyboard::from_buttons(&draft.buttons);

    match draft.content_type {
        ContentType::Text => vec![Outbound::Text {
            html: truncate_chars(&html, TEXT_LIMIT),
            keyboard,
        }],

        ContentType::Photo | ContentType::Video | ContentType::Document => {
            let kind = match draft.content_type {
                ContentType::Photo => MediaKind::Photo,
                ContentType::Video => MediaKind::Video,
                _ => MediaKind::Document,
            };
            let media = draft
                .media
                .clone()
                .unwrap_or_else(|| MediaRef(String::new()));

            if html.is_empty() {
                // No text at all: the media goes out alone and carries
                // the keyboard itself.
                vec![Outbound::Media {
                    kind,
                    media,
                    caption: None,
                    keyboard,
                }]
            } else if caption_fits(&html) {
                vec![Outbound::Media {
                    kind,
                    media,
                    caption: Some(html),
                    keyboard,
                }]
            } else {
                vec![
                    Outbound::Media {
                        kind,
                        media,
                        caption: None,
                        keyboard: None,
                    },
                    Outbound::Text {
                        html: truncate_chars(&html, TEXT_LIMIT),
                        keyboard,
                    },
                ]
            }
        }

        ContentType::Album => {
            if draft.album.is_empty() {
                return vec![Outbound::Text {
                    html: EMPTY_ALBUM_NOTICE.to_string(),
                    keyboard,
                }];
            }

            let use_caption = caption_fits(&html);
            let mut out = vec![Outbound::MediaGroup {
                items: draft.album.clone(),
                caption_first: use_caption.then(|| html.clone()),
            }];

            // Trailing text when the caption did not fit, or whenever
            // buttons exist (the group itself cannot carry a keyboard).
            let overflow = !use_caption && !html.is_empty();
            if overflow || keyboard.is_some() {
                let body = if overflow {
                    truncate_chars(&html, TEXT_LIMIT)
                } else {
                    KEYBOARD_CARRIER.to_string()
                };
                out.push(Outbound::Text {
                    html: body,
                    keyboard,
                });
            }
            out
        }
    }
}

fn caption_fits(html: &str) -> bool {
    !html.is_empty() && html.chars().count() <= CAPTION_LIMIT
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DraftId;
    use crate::messaging::types::LinkButton;
    use crate::store::DraftStatus;
    use chrono::NaiveDate;

    fn link() -> TrailingLink {
        TrailingLink {
            url: "https://t.me/chan".to_string(),
            text: "Channel".to_string(),
        }
    }

    fn draft(content_type: ContentType, text: Option<&str>) -> Draft {
        Draft {
            id: DraftId(1),
            author_id: 10,
            content_type,
            text: text.map(|s| s.to_string()),
            media: Some(MediaRef("file-1".to_string())),
            album: Vec::new(),
            buttons: Vec::new(),
            source_url: None,
            media_url: None,
            dedup_hash: None,
            status: DraftStatus::Draft,
            created_at: NaiveDate::from_ymd_opt(2025, 1, 2)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
            published_at: None,
        }
    }

    #[test]
    fn escapes_minimal_html() {
        assert_eq!(escape_html("a<b>&c"), "a&lt;b&gt;&amp;c");
    }

    #[test]
    fn appends_trailing_link_with_blank_line() {
        let html = render_html("hello", Some(&link()));
        assert_eq!(
            html,
            "hello\n\n<a href=\"https://t.me/chan\">Channel</a>"
        );
    }

    #[test]
    fn linkifies_existing_url_instead_of_appending() {
        let html = render_html("see https://t.me/chan now", Some(&link()));
        assert_eq!(
            html,
            "see <a href=\"https://t.me/chan\">Channel</a> now"
        );
        assert_eq!(html.matches("href=").count(), 1);
    }

    #[test]
    fn empty_body_renders_just_the_link() {
        let html = render_html("", Some(&link()));
        assert_eq!(html, "<a href=\"https://t.me/chan\">Channel</a>");
    }

    #[test]
    fn text_draft_is_truncated_to_hard_limit() {
        let body = "x".repeat(5000);
        let d = draft(ContentType::Text, Some(&body));
        let plan = plan(&d, None);
        match &plan[0] {
            Outbound::Text { html, .. } => assert_eq!(html.chars().count(), TEXT_LIMIT),
            other => panic!("unexpected plan: {other:?}"),
        }
    }

    #[test]
    fn short_caption_rides_on_media() {
        let d = draft(ContentType::Photo, Some("short"));
        let plan = plan(&d, None);
        assert_eq!(plan.len(), 1);
        match &plan[0] {
            Outbound::Media { caption, .. } => assert_eq!(caption.as_deref(), Some("short")),
            other => panic!("unexpected plan: {other:?}"),
        }
    }

    #[test]
    fn long_caption_splits_into_bare_media_plus_text() {
        let body = "y".repeat(1200);
        let mut d = draft(ContentType::Photo, Some(&body));
        d.buttons = vec![LinkButton {
            label: "More".to_string(),
            url: "https://example.com".to_string(),
        }];
        let plan = plan(&d, None);
        assert_eq!(plan.len(), 2);
        match &plan[0] {
            Outbound::Media {
                caption, keyboard, ..
            } => {
                assert!(caption.is_none());
                assert!(keyboard.is_none());
            }
            other => panic!("unexpected plan: {other:?}"),
        }
        match &plan[1] {
            Outbound::Text { html, keyboard } => {
                assert_eq!(html.chars().count(), 1200);
                assert!(keyboard.is_some());
            }
            other => panic!("unexpected plan: {other:?}"),
        }
    }

    #[test]
    fn boundary_caption_exactly_at_limit_fits() {
        let body = "z".repeat(CAPTION_LIMIT);
        let d = draft(ContentType::Video, Some(&body));
        let plan = plan(&d, None);
        assert_eq!(plan.len(), 1);
    }

    #[test]
    fn album_long_text_goes_as_trailing_message() {
        let body = "a".repeat(1200);
        let mut d = draft(ContentType::Album, Some(&body));
        d.media = None;
        d.album = vec![
            AlbumItem {
                kind: MediaKind::Photo,
                media: MediaRef("f1".to_string()),
            },
            AlbumItem {
                kind: MediaKind::Photo,
                media: MediaRef("f2".to_string()),
            },
            AlbumItem {
                kind: MediaKind::Photo,
                media: MediaRef("f3".to_string()),
            },
        ];
        let plan = plan(&d, None);
        assert_eq!(plan.len(), 2);
        match &plan[0] {
            Outbound::MediaGroup {
                items,
                caption_first,
            } => {
                assert_eq!(items.len(), 3);
                assert!(caption_first.is_none());
            }
            other => panic!("unexpected plan: {other:?}"),
        }
        match &plan[1] {
            Outbound::Text { html, .. } => assert_eq!(html.chars().count(), 1200),
            other => panic!("unexpected plan: {other:?}"),
        }
    }

    #[test]
    fn album_with_buttons_sends_keyboard_in_trailing_text_even_when_caption_fits() {
        let mut d = draft(ContentType::Album, Some("short"));
        d.media = None;
        d.album = vec![AlbumItem {
            kind: MediaKind::Photo,
            media: MediaRef("f1".to_string()),
        }];
        d.buttons = vec![LinkButton {
            label: "Go".to_string(),
            url: "https://example.com".to_string(),
        }];
        let plan = plan(&d, None);
        assert_eq!(plan.len(), 2);
        match &plan[0] {
            Outbound::MediaGroup { caption_first, .. } => {
                assert_eq!(caption_first.as_deref(), Some("short"))
            }
            other => panic!("unexpected plan: {other:?}"),
        }
        match &plan[1] {
            Outbound::Text { keyboard, .. } => assert!(keyboard.is_some()),
            other => panic!("unexpected plan: {other:?}"),
        }
    }

    #[test]
    fn captionless_media_is_a_single_message() {
        let mut d = draft(ContentType::Photo, None);
        d.buttons = vec![LinkButton {
            label: "Go".to_string(),
            url: "https://example.com".to_string(),
        }];
        let plan = plan(&d, None);
        assert_eq!(plan.len(), 1);
        match &plan[0] {
            Outbound::Media {
                caption, keyboard, ..
            } => {
                assert!(caption.is_none());
                assert!(keyboard.is_some());
            }
            other => panic!("unexpected plan: {other:?}"),
        }
    }

    #[test]
    fn textless_album_with_buttons_still_sends_the_keyboard() {
        let mut d = draft(ContentType::Album, None);
        d.media = None;
        d.album = vec![AlbumItem {
            kind: MediaKind::Photo,
            media: MediaRef("f1".to_string()),
        }];
        d.buttons = vec![LinkButton {
            label: "Go".to_string(),
            url: "https://example.com".to_string(),
        }];
        let plan = plan(&d, None);
        assert_eq!(plan.len(), 2);
        match &plan[0] {
            Outbound::MediaGroup { caption_first, .. } => assert!(caption_first.is_none()),
            other => panic!("unexpected plan: {other:?}"),
        }
        match &plan[1] {
            Outbound::Text { html, keyboard } => {
                assert!(!html.is_empty());
                assert!(keyboard.is_some());
            }
            other => panic!("unexpected plan: {other:?}"),
        }
    }

    #[test]
    fn textless_album_without_buttons_is_just_the_group() {
        let mut d = draft(ContentType::Album, None);
        d.media = None;
        d.album = vec![AlbumItem {
            kind: MediaKind::Photo,
            media: MediaRef("f1".to_string()),
        }];
        let plan = plan(&d, None);
        assert_eq!(plan.len(), 1);
    }

    #[test]
    fn empty_album_renders_placeholder() {
        let mut d = draft(ContentType::Album, None);
        d.media = None;
        let plan = plan(&d, None);
        assert_eq!(plan.len(), 1);
        match &plan[0] {
            Outbound::Text { html, .. } => assert_eq!(html, EMPTY_ALBUM_NOTICE),
            other => panic!("unexpected plan: {other:?}"),
        }
    }
}
