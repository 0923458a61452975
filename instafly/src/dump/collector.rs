//! Pulls profiles and thumbnails out of recorded Instagram traffic.
//!
//! Profile responses (`GET /<name>/?__a=1` on the profile host) carry a user's
//! follower count and recent posts, each with a list of thumbnail urls. Any
//! later CDN response for one of those urls is kept as an image of that post.
//! Flows are handled in order, so a thumbnail is only recognised once the
//! profile listing it has been seen.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Deserializer};
use tracing::{debug, warn};

use super::flow::HttpFlow;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorConfig {
    /// Host serving profile JSON.
    pub profile_host: String,
    /// Substring identifying CDN hosts serving thumbnails.
    pub thumbnail_host_marker: String,
    /// Whether thumbnail bodies are kept at all.
    pub collect_images: bool,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            profile_host: "www.instagram.com".to_string(),
            thumbnail_host_marker: "cdninstagram.com".to_string(),
            collect_images: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub name: String,
    pub followed_by: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Media {
    pub id: String,
    pub owner: String,
    pub likes: u64,
    pub thumbnails: Vec<String>,
}

/// A thumbnail body matched to the post it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectedImage {
    pub id: String,
    pub likes: u64,
    pub owner: String,
    pub content: Vec<u8>,
}

#[derive(Deserialize)]
struct ProfileJson {
    user: UserJson,
}

#[derive(Deserialize)]
struct UserJson {
    #[serde(deserialize_with = "id_string")]
    id: String,
    #[serde(default)]
    full_name: Option<String>,
    followed_by: CountJson,
    media: MediaPageJson,
}

#[derive(Deserialize)]
struct CountJson {
    count: u64,
}

#[derive(Deserialize)]
struct MediaPageJson {
    nodes: Vec<NodeJson>,
}

#[derive(Deserialize)]
struct NodeJson {
    #[serde(deserialize_with = "id_string")]
    id: String,
    owner: OwnerJson,
    likes: CountJson,
    #[serde(default)]
    thumbnail_resources: Vec<ThumbnailJson>,
}

#[derive(Deserialize)]
struct OwnerJson {
    #[serde(deserialize_with = "id_string")]
    id: String,
}

#[derive(Deserialize)]
struct ThumbnailJson {
    src: String,
}

/// Ids show up both as JSON strings and as numbers.
fn id_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Str(String),
        Int(u64),
    }
    Ok(match Id::deserialize(d)? {
        Id::Str(s) => s,
        Id::Int(i) => i.to_string(),
    })
}

fn parse_profile(body: &[u8]) -> Result<(User, Vec<Media>), serde_json::Error> {
    let profile: ProfileJson = serde_json::from_slice(body)?;
    let u = profile.user;
    let media = u
        .media
        .nodes
        .into_iter()
        .map(|n| Media {
            id: n.id,
            owner: n.owner.id,
            likes: n.likes.count,
            thumbnails: n.thumbnail_resources.into_iter().map(|t| t.src).collect(),
        })
        .collect();
    let user = User {
        id: u.id,
        name: u.full_name.unwrap_or_default(),
        followed_by: u.followed_by.count,
    };
    Ok((user, media))
}

/// Matches `/<name>/?__a=1` at the start of `path`, where `<name>` is made of
/// ascii alphanumerics, `.` and `_`.
pub fn is_profile_path(path: &str) -> bool {
    let Some(rest) = path.strip_prefix('/') else {
        return false;
    };
    let name_len = rest
        .bytes()
        .take_while(|b| b.is_ascii_alphanumeric() || *b == b'.' || *b == b'_')
        .count();
    name_len > 0 && rest[name_len..].starts_with("/?__a=1")
}

#[derive(Debug, Default)]
pub struct Collector {
    cfg: CollectorConfig,
    users: BTreeMap<String, User>,
    thumbnails: HashMap<String, Media>,
    images: BTreeMap<String, CollectedImage>,
}

impl Collector {
    pub fn new(cfg: CollectorConfig) -> Self {
        Self {
            cfg,
            ..Default::default()
        }
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.cfg
    }

    pub fn accepts_profile(&self, flow: &HttpFlow) -> bool {
        flow.host == self.cfg.profile_host && is_profile_path(&flow.path)
    }

    pub fn accepts_thumbnail(&self, flow: &HttpFlow) -> bool {
        self.cfg.collect_images && flow.host.contains(&self.cfg.thumbnail_host_marker)
    }

    /// Feeds one flow through every matching handler.
    pub fn handle(&mut self, flow: &HttpFlow) {
        if self.accepts_profile(flow) {
            self.handle_profile(flow);
        }
        if self.accepts_thumbnail(flow) {
            self.handle_thumbnail(flow);
        }
    }

    pub fn handle_all<'a, I: IntoIterator<Item = &'a HttpFlow>>(&mut self, flows: I) {
        for flow in flows {
            self.handle(flow);
        }
    }

    fn handle_profile(&mut self, flow: &HttpFlow) {
        let (user, media) = match parse_profile(&flow.body) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(url = %flow.url(), %err, "skipping malformed profile response");
                return;
            }
        };
        debug!(user = %user.id, posts = media.len(), "profile");
        for m in media {
            for thumb in m.thumbnails.iter() {
                self.thumbnails.insert(thumb.clone(), m.clone());
            }
        }
        self.users.insert(user.id.clone(), user);
    }

    fn handle_thumbnail(&mut self, flow: &HttpFlow) {
        let url = flow.url();
        if let Some(media) = self.thumbnails.get(&url) {
            debug!(media = %media.id, %url, "thumbnail");
            let image = CollectedImage {
                id: media.id.clone(),
                likes: media.likes,
                owner: media.owner.clone(),
                content: flow.body.clone(),
            };
            self.images.insert(image.id.clone(), image);
        }
    }

    /// Users seen so far, ordered by id.
    pub fn users(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }

    pub fn user(&self, id: &str) -> Option<&User> {
        self.users.get(id)
    }

    /// Images seen so far, ordered by media id. A post seen through several
    /// thumbnails keeps the last one.
    pub fn images(&self) -> impl Iterator<Item = &CollectedImage> {
        self.images.values()
    }

    pub fn num_thumbnails(&self) -> usize {
        self.thumbnails.len()
    }

    /// Likes per follower of the image's owner, or 0 when the owner is
    /// unknown or has no followers.
    pub fn like_rate(&self, image: &CollectedImage) -> f32 {
        match self.users.get(&image.owner) {
            Some(u) if u.followed_by > 0 => image.likes as f32 / u.followed_by as f32,
            _ => 0.0,
        }
    }
}
