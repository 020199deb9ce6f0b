// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Instagram tag feed: recent media carrying a hashtag.

use serde::Deserialize;
use tracing::{debug, instrument};

use tagprint_core::error::{Result, TagprintError};
use tagprint_core::types::ImageDescriptor;
use tagprint_print::request_error;

#[derive(Debug, Deserialize)]
struct RecentMedia {
    #[serde(default)]
    data: Vec<MediaItem>,
}

#[derive(Debug, Deserialize)]
struct MediaItem {
    id: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    created_time: String,
    images: Option<Renditions>,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Renditions {
    standard_resolution: Option<Rendition>,
}

#[derive(Debug, Deserialize)]
struct Rendition {
    url: String,
    width: Option<u32>,
    height: Option<u32>,
}

/// Decode a recent-media reply into printable pictures.
///
/// Videos and items without a standard-resolution rendition are skipped.
pub fn parse_recent(body: &str) -> Result<Vec<ImageDescriptor>> {
    let media: RecentMedia = serde_json::from_str(body)?;
    Ok(media
        .data
        .into_iter()
        .filter(|item| item.kind == "image")
        .filter_map(|item| {
            let rendition = item.images?.standard_resolution?;
            Some(ImageDescriptor {
                id: item.id,
                created_time: item.created_time,
                image_url: rendition.url,
                width: rendition.width,
                height: rendition.height,
                tags: item.tags,
            })
        })
        .collect())
}

/// Client for the tag recent-media endpoint.
#[derive(Clone)]
pub struct InstagramFeed {
    http: reqwest::Client,
    base_url: String,
    client_id: String,
}

impl InstagramFeed {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client_id: client_id.into(),
        }
    }

    /// Most recent pictures tagged `tag`.
    #[instrument(skip(self))]
    pub async fn recent(&self, tag: &str) -> Result<Vec<ImageDescriptor>> {
        let url = format!("{}/tags/{tag}/media/recent", self.base_url);
        let response = self
            .http
            .get(url.as_str())
            .query(&[("client_id", self.client_id.as_str())])
            .send()
            .await
            .map_err(|e| request_error(&url, e))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| request_error(&url, e))?;

        if !(200..300).contains(&status) {
            return Err(TagprintError::RemoteRejected { status, body });
        }

        let images = parse_recent(&body)?;
        debug!(count = images.len(), "recent pictures fetched");
        Ok(images)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "pagination": {},
        "meta": { "code": 200 },
        "data": [
            {
                "id": "111_1",
                "type": "image",
                "created_time": "1400000001",
                "tags": ["tagprint", "party"],
                "images": {
                    "thumbnail": { "url": "https://cdn.test/111_t.jpg", "width": 150, "height": 150 },
                    "standard_resolution": { "url": "https://cdn.test/111.jpg", "width": 640, "height": 640 }
                }
            },
            {
                "id": "222_2",
                "type": "video",
                "created_time": "1400000002",
                "tags": ["tagprint"],
                "images": {
                    "standard_resolution": { "url": "https://cdn.test/222.jpg", "width": 640, "height": 640 }
                }
            },
            {
                "id": "333_3",
                "type": "image",
                "created_time": "1400000003",
                "images": {}
            }
        ]
    }"#;

    #[test]
    fn keeps_only_images_with_standard_resolution() {
        let images = parse_recent(SAMPLE).unwrap();
        assert_eq!(images.len(), 1);

        let image = &images[0];
        assert_eq!(image.id, "111_1");
        assert_eq!(image.image_url, "https://cdn.test/111.jpg");
        assert_eq!(image.width, Some(640));
        assert_eq!(image.tags, vec!["tagprint", "party"]);
    }

    #[test]
    fn missing_data_is_an_empty_feed() {
        assert!(parse_recent(r#"{"meta":{"code":200}}"#).unwrap().is_empty());
    }

    #[test]
    fn garbage_is_a_serialization_error() {
        assert!(matches!(
            parse_recent("<html>"),
            Err(TagprintError::Serialization(_))
        ));
    }
}
