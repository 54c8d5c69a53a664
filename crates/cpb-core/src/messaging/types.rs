use serde::{Deserialize, Serialize};

/// Opaque reference to a media asset the messenger can resolve: a Telegram
/// file id for forwarded media, or a fetchable URL for feed-ingested images.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef(pub String);

impl MediaRef {
    pub fn is_url(&self) -> bool {
        self.0.starts_with("http://") || self.0.starts_with("https://")
    }
}

/// Kind of a single media asset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Video,
    Document,
}

/// One item of a multi-media album, in send order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlbumItem {
    #[serde(rename = "type")]
    pub kind: MediaKind,
    pub media: MediaRef,
}

/// One URL button attached to a published post.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkButton {
    pub label: String,
    pub url: String,
}

/// Inline keyboard of URL buttons (adapters lay them out two per row).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyboard {
    pub buttons: Vec<LinkButton>,
}

impl Keyboard {
    pub fn new(buttons: Vec<LinkButton>) -> Self {
        Self { buttons }
    }

    /// `None` for an empty button list, so callers can skip the markup.
    pub fn from_buttons(buttons: &[LinkButton]) -> Option<Self> {
        if buttons.is_empty() {
            None
        } else {
            Some(Self::new(buttons.to_vec()))
        }
    }
}
