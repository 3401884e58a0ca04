//! Representative location photos from public feeds that need no API key.

use crate::constants::{
    IMAGE_CACHE_MAX_ENTRIES, IMAGE_REQUEST_TIMEOUT_SECONDS, IMAGE_SUBREDDITS, IMAGE_TITLE_EXCLUDE,
    USER_AGENT,
};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use moka::future::Cache;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const REDDIT_BASE_URL: &str = "https://www.reddit.com";
const FLICKR_FEED_URL: &str = "https://www.flickr.com/services/feeds/photos_public.gne";
const MAX_CANDIDATES: usize = 20;
const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".webp"];
const IMAGE_HOSTS: &[&str] = &["i.redd.it", "i.imgur.com"];
const IMAGE_CACHE_TTL_SECONDS: u64 = 86_400;
const RETRY_BASE_MS: u64 = 500;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ImagePlatform {
    Reddit,
    Flickr,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocationImage {
    pub url: String,
    pub title: Option<String>,
    pub author: Option<String>,
    pub platform: ImagePlatform,
    pub score: i64,
    pub source_url: Option<String>,
}

#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Best image for a query. `Ok(None)` when every feed answered but none
    /// had a usable photo.
    async fn fetch_image(&self, query: &str) -> Result<Option<LocationImage>>;
}

pub struct PublicImageClient {
    client: Client,
    reddit_base_url: String,
    flickr_feed_url: String,
}

impl PublicImageClient {
    pub fn new() -> Self {
        Self::with_base_urls(REDDIT_BASE_URL.to_string(), FLICKR_FEED_URL.to_string())
    }

    pub fn with_base_urls(reddit_base_url: String, flickr_feed_url: String) -> Self {
        PublicImageClient {
            client: Client::new(),
            reddit_base_url: reddit_base_url.trim_end_matches('/').to_string(),
            flickr_feed_url,
        }
    }

    async fn search_subreddit(&self, subreddit: &str, query: &str) -> Result<Vec<LocationImage>> {
        let url = format!("{}/r/{}/search.json", self.reddit_base_url, subreddit);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("q", query),
                ("restrict_sr", "1"),
                ("sort", "top"),
                ("limit", "25"),
            ])
            .header("User-Agent", USER_AGENT)
            .timeout(Duration::from_secs(IMAGE_REQUEST_TIMEOUT_SECONDS))
            .send()
            .await
            .map_err(|e| AppError::Images(format!("Reddit request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Images(format!(
                "r/{} returned {}",
                subreddit,
                response.status()
            )));
        }

        let listing: RedditListing = response
            .json()
            .await
            .map_err(|e| AppError::Images(format!("Failed to parse Reddit response: {}", e)))?;
        Ok(listing.into_images())
    }

    async fn search_flickr(&self, query: &str) -> Result<Vec<LocationImage>> {
        let response = self
            .client
            .get(&self.flickr_feed_url)
            .query(&[("tags", query), ("format", "json"), ("nojsoncallback", "1")])
            .header("User-Agent", USER_AGENT)
            .timeout(Duration::from_secs(IMAGE_REQUEST_TIMEOUT_SECONDS))
            .send()
            .await
            .map_err(|e| AppError::Images(format!("Flickr request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Images(format!(
                "Flickr returned {}",
                response.status()
            )));
        }

        let feed: FlickrFeed = response
            .json()
            .await
            .map_err(|e| AppError::Images(format!("Failed to parse Flickr response: {}", e)))?;
        Ok(feed.into_images())
    }
}

impl Default for PublicImageClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageSource for PublicImageClient {
    async fn fetch_image(&self, query: &str) -> Result<Option<LocationImage>> {
        let mut candidates = Vec::new();
        let mut failures = 0;
        let mut last_error = None;

        for subreddit in IMAGE_SUBREDDITS {
            if candidates.len() >= MAX_CANDIDATES {
                break;
            }
            match self.search_subreddit(subreddit, query).await {
                Ok(images) => candidates.extend(images),
                Err(e) => {
                    tracing::debug!(subreddit, "Image search failed: {}", e);
                    failures += 1;
                    last_error = Some(e);
                }
            }
        }

        if candidates.len() < MAX_CANDIDATES {
            match self.search_flickr(query).await {
                Ok(images) => candidates.extend(images),
                Err(e) => {
                    tracing::debug!("Flickr image search failed: {}", e);
                    failures += 1;
                    last_error = Some(e);
                }
            }
        }

        // Every feed failed: let the caller retry
        if failures == IMAGE_SUBREDDITS.len() + 1 {
            if let Some(e) = last_error {
                return Err(e);
            }
        }

        Ok(best_image(candidates))
    }
}

/// Highest scoring candidate; ties keep feed order.
pub fn best_image(mut candidates: Vec<LocationImage>) -> Option<LocationImage> {
    candidates.sort_by(|a, b| b.score.cmp(&a.score));
    candidates.into_iter().next()
}

fn is_image_url(url: &str) -> bool {
    let lower = url.to_lowercase();
    let path = lower.split('?').next().unwrap_or(&lower);
    IMAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
        || IMAGE_HOSTS.iter().any(|host| lower.contains(host))
}

fn is_excluded_title(title: &str) -> bool {
    let lower = title.to_lowercase();
    IMAGE_TITLE_EXCLUDE.iter().any(|kw| lower.contains(kw))
}

// Reddit search listing

#[derive(Debug, Deserialize)]
struct RedditListing {
    data: RedditListingData,
}

#[derive(Debug, Deserialize)]
struct RedditListingData {
    #[serde(default)]
    children: Vec<RedditChild>,
}

#[derive(Debug, Deserialize)]
struct RedditChild {
    data: RedditPost,
}

#[derive(Debug, Deserialize)]
struct RedditPost {
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    permalink: Option<String>,
}

impl RedditListing {
    fn into_images(self) -> Vec<LocationImage> {
        self.data
            .children
            .into_iter()
            .map(|child| child.data)
            .filter(|post| is_image_url(&post.url) && !is_excluded_title(&post.title))
            .map(|post| LocationImage {
                url: post.url,
                title: Some(post.title).filter(|t| !t.is_empty()),
                author: post.author,
                platform: ImagePlatform::Reddit,
                score: post.score,
                source_url: post.permalink.map(|p| format!("https://reddit.com{}", p)),
            })
            .collect()
    }
}

// Flickr public feed

#[derive(Debug, Deserialize)]
struct FlickrFeed {
    #[serde(default)]
    items: Vec<FlickrItem>,
}

#[derive(Debug, Deserialize)]
struct FlickrItem {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    media: Option<FlickrMedia>,
    #[serde(default)]
    author: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FlickrMedia {
    #[serde(default)]
    m: Option<String>,
}

/// `nobody@flickr.com ("username")` → `username`
fn flickr_author(raw: &str) -> Option<String> {
    let start = raw.find('(')?;
    let end = raw[start..].find(')')? + start;
    let name = raw[start + 1..end].trim().trim_matches('"').trim();
    (!name.is_empty()).then(|| name.to_string())
}

impl FlickrFeed {
    fn into_images(self) -> Vec<LocationImage> {
        self.items
            .into_iter()
            .take(MAX_CANDIDATES)
            .filter_map(|item| {
                let medium = item.media?.m.filter(|m| !m.is_empty())?;
                Some(LocationImage {
                    // _m is the medium rendition, _b the large one
                    url: medium.replace("_m.jpg", "_b.jpg"),
                    title: item.title.filter(|t| !t.trim().is_empty()),
                    author: item.author.as_deref().and_then(flickr_author),
                    platform: ImagePlatform::Flickr,
                    score: 0,
                    source_url: item.link,
                })
            })
            .collect()
    }
}

/// Image lookup with retry and an in-process cache of found images.
#[derive(Clone)]
pub struct ImageService {
    source: Arc<dyn ImageSource>,
    cache: Cache<String, LocationImage>,
}

impl ImageService {
    pub fn new(source: Arc<dyn ImageSource>) -> Self {
        ImageService {
            source,
            cache: Cache::builder()
                .max_capacity(IMAGE_CACHE_MAX_ENTRIES)
                .time_to_live(Duration::from_secs(IMAGE_CACHE_TTL_SECONDS))
                .build(),
        }
    }

    /// Try up to `attempts` times with exponential backoff. Never fails:
    /// an image is decoration, so errors only reach the log.
    pub async fn fetch_with_retry(&self, query: &str, attempts: usize) -> Option<LocationImage> {
        let key = query.trim().to_lowercase();
        if key.is_empty() {
            return None;
        }
        if let Some(image) = self.cache.get(&key).await {
            return Some(image);
        }

        let attempts = attempts.max(1);
        for attempt in 0..attempts {
            match self.source.fetch_image(query).await {
                Ok(Some(image)) => {
                    self.cache.insert(key, image.clone()).await;
                    return Some(image);
                }
                Ok(None) => {
                    tracing::debug!(query, "No image found");
                    return None;
                }
                Err(e) => {
                    tracing::warn!(query, attempt = attempt + 1, attempts, "Image fetch failed: {}", e);
                    if attempt + 1 < attempts {
                        let delay = RETRY_BASE_MS * (1u64 << attempt.min(6));
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                    }
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_reddit_listing_filters() {
        let listing: RedditListing = serde_json::from_value(json!({
            "data": {"children": [
                {"data": {"url": "https://i.redd.it/abc123.jpg", "title": "Sunset over Lyon", "author": "ana", "score": 420, "permalink": "/r/cityporn/comments/1"}},
                {"data": {"url": "https://i.redd.it/def.jpg", "title": "Funny meme from Lyon", "score": 9000}},
                {"data": {"url": "https://www.reddit.com/r/cityporn/comments/2", "title": "Text post", "score": 10}},
                {"data": {"url": "https://i.imgur.com/xyz", "title": "Old town", "score": 15}}
            ]}
        }))
        .unwrap();

        let images = listing.into_images();
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].source_url.as_deref(), Some("https://reddit.com/r/cityporn/comments/1"));
        assert_eq!(images[1].url, "https://i.imgur.com/xyz");
    }

    #[test]
    fn test_flickr_feed_upgrades_size() {
        let feed: FlickrFeed = serde_json::from_value(json!({
            "items": [
                {"title": "Lac d'Annecy", "link": "https://www.flickr.com/photos/x/1/",
                 "media": {"m": "https://live.staticflickr.com/1/2_m.jpg"},
                 "author": "nobody@flickr.com (\"alpine\")"},
                {"title": "No media"}
            ]
        }))
        .unwrap();

        let images = feed.into_images();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].url, "https://live.staticflickr.com/1/2_b.jpg");
        assert_eq!(images[0].author.as_deref(), Some("alpine"));
        assert_eq!(images[0].platform, ImagePlatform::Flickr);
    }

    #[test]
    fn test_best_image_by_score() {
        let image = |url: &str, score| LocationImage {
            url: url.to_string(),
            title: None,
            author: None,
            platform: ImagePlatform::Reddit,
            score,
            source_url: None,
        };
        let best = best_image(vec![image("a", 3), image("b", 50), image("c", 7)]).unwrap();
        assert_eq!(best.url, "b");
        assert!(best_image(Vec::new()).is_none());
    }

    #[test]
    fn test_url_and_title_checks() {
        assert!(is_image_url("https://example.com/photo.JPG"));
        assert!(is_image_url("https://example.com/photo.webp?width=640"));
        assert!(!is_image_url("https://example.com/gallery"));
        assert!(is_excluded_title("My SELFIE in Rome"));
        assert!(!is_excluded_title("Colosseum at dawn"));
    }

    struct FlakySource {
        calls: AtomicUsize,
        fail_first: usize,
    }

    #[async_trait]
    impl ImageSource for FlakySource {
        async fn fetch_image(&self, query: &str) -> Result<Option<LocationImage>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                return Err(AppError::Images("feed down".to_string()));
            }
            Ok(Some(LocationImage {
                url: format!("https://img.test/{}.jpg", query),
                title: None,
                author: None,
                platform: ImagePlatform::Flickr,
                score: 0,
                source_url: None,
            }))
        }
    }

    #[tokio::test]
    async fn test_fetch_with_retry_recovers_and_caches() {
        let source = Arc::new(FlakySource {
            calls: AtomicUsize::new(0),
            fail_first: 1,
        });
        let service = ImageService::new(source.clone());

        let image = service.fetch_with_retry("Lyon", 3).await.unwrap();
        assert_eq!(image.url, "https://img.test/Lyon.jpg");
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);

        // Second lookup is served from the cache
        service.fetch_with_retry("lyon", 3).await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_fetch_with_retry_gives_up() {
        let source = Arc::new(FlakySource {
            calls: AtomicUsize::new(0),
            fail_first: usize::MAX,
        });
        let service = ImageService::new(source.clone());

        assert!(service.fetch_with_retry("Nowhere", 2).await.is_none());
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }
}
