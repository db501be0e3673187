// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Instagram client for fetching public profile follower counts.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

const PROFILE_INFO_URL: &str = "https://i.instagram.com/api/v1/users/web_profile_info/";

/// Public app id sent by the Instagram web client.
const WEB_APP_ID: &str = "936619743392459";

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Environment variable holding an optional `sessionid` cookie.
pub const SESSION_ID_ENV: &str = "INSTAGRAM_SESSION_ID";

/// What the collector needs from a profile.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Profile {
    pub display_name: String,
    pub follower_count: u64,
}

/// Any failure to fetch a profile: not found, blocked, rate limited, network.
///
/// Callers treat every variant the same way.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("profile '{0}' not found")]
    NotFound(String),

    #[error("{0}")]
    Other(String),
}

#[async_trait]
pub trait ProfileFetcher: Send + Sync {
    async fn fetch_profile(&self, handle: &str) -> Result<Profile, FetchError>;
}

#[derive(Debug, Deserialize)]
struct ProfileInfoResponse {
    data: ProfileInfoData,
}

#[derive(Debug, Deserialize)]
struct ProfileInfoData {
    user: Option<User>,
}

#[derive(Debug, Deserialize)]
struct User {
    #[serde(default)]
    full_name: Option<String>,
    edge_followed_by: FollowerEdge,
}

#[derive(Debug, Deserialize)]
struct FollowerEdge {
    count: u64,
}

/// Fetches profiles from the Instagram web API.
pub struct InstagramFetcher {
    client: reqwest::Client,
    session_id: Option<String>,
}

impl InstagramFetcher {
    /// Build a fetcher with a per-request timeout. Reads the session cookie
    /// from [`SESSION_ID_ENV`].
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        let session_id = std::env::var(SESSION_ID_ENV)
            .ok()
            .filter(|s| !s.trim().is_empty());

        Ok(Self { client, session_id })
    }

    pub fn has_session(&self) -> bool {
        self.session_id.is_some()
    }
}

#[async_trait]
impl ProfileFetcher for InstagramFetcher {
    async fn fetch_profile(&self, handle: &str) -> Result<Profile, FetchError> {
        let mut request = self
            .client
            .get(PROFILE_INFO_URL)
            .query(&[("username", handle)])
            .header("x-ig-app-id", WEB_APP_ID)
            .header("Accept", "application/json");
        if let Some(session_id) = &self.session_id {
            request = request.header("Cookie", format!("sessionid={}", session_id));
        }

        let response = request.send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(handle.to_string()));
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status,
                body: truncate(&body, 200),
            });
        }

        let info: ProfileInfoResponse = response.json().await?;
        parse_profile(info, handle)
    }
}

fn parse_profile(info: ProfileInfoResponse, handle: &str) -> Result<Profile, FetchError> {
    let user = info
        .data
        .user
        .ok_or_else(|| FetchError::NotFound(handle.to_string()))?;

    Ok(Profile {
        display_name: user.full_name.unwrap_or_default().trim().to_string(),
        follower_count: user.edge_followed_by.count,
    })
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_profile() {
        let body = r#"{
            "data": {
                "user": {
                    "full_name": " FC Liria 1985 Futsal ",
                    "edge_followed_by": { "count": 4821 },
                    "edge_follow": { "count": 310 }
                }
            },
            "status": "ok"
        }"#;

        let info: ProfileInfoResponse = serde_json::from_str(body).unwrap();
        let profile = parse_profile(info, "fc.liria.1985.futsal").unwrap();
        assert_eq!(
            profile,
            Profile {
                display_name: "FC Liria 1985 Futsal".to_string(),
                follower_count: 4821,
            }
        );
    }

    #[test]
    fn test_parse_missing_user() {
        let info: ProfileInfoResponse =
            serde_json::from_str(r#"{"data": {"user": null}, "status": "ok"}"#).unwrap();
        assert!(matches!(
            parse_profile(info, "gone"),
            Err(FetchError::NotFound(handle)) if handle == "gone"
        ));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc...");
    }
}
