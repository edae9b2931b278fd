#![forbid(unsafe_code)]

//! Client for the external media-extraction service.
//!
//! The service takes a percent-encoded source URL and answers with a list of
//! downloadable media variants. This module owns the wire types, the variant
//! filter/selection rule, and the classification of one fetch into the retry
//! state machine.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::relay::{Attempt, RetryReason};

/// Upstream calls are bounded by this timeout; the retry loop handles the
/// rest.
pub const EXTRACTOR_TIMEOUT: Duration = Duration::from_secs(30);

/// Status the upstream reports inside its own body on success.
pub const UPSTREAM_SUCCESS: i64 = 200;

/// Response body of the extraction service. Fields the relay does not consume
/// are simply ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractorReply {
    #[serde(rename = "statusCode")]
    pub status_code: i64,
    #[serde(default)]
    pub medias: Vec<MediaVariant>,
}

/// One extracted downloadable asset. The upstream omits fields freely, so
/// everything except the body itself is optional.
#[derive(Debug, Clone, Deserialize)]
pub struct MediaVariant {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub bandwidth: Option<i64>,
    #[serde(default)]
    pub extension: Option<String>,
    #[serde(default)]
    pub is_audio: Option<bool>,
}

impl MediaVariant {
    /// True for entries marked as video that are not audio-only renditions.
    fn is_downloadable_video(&self) -> bool {
        self.kind.as_deref() == Some("video")
            && !self.is_audio.unwrap_or(false)
            && self.url.is_some()
    }

    /// Undeclared bandwidth ranks below every declared value.
    fn declared_bandwidth(&self) -> i64 {
        self.bandwidth.unwrap_or(i64::MIN)
    }
}

/// Shared blocking HTTP agent for extractor calls.
pub fn http_agent() -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout(EXTRACTOR_TIMEOUT)
        .build()
}

/// Substitutes the percent-encoded target URL into the endpoint template.
/// The template's `{}` placeholder is validated at configuration load.
pub fn render_endpoint(template: &str, target_url: &str) -> String {
    template.replacen("{}", &urlencoding::encode(target_url), 1)
}

/// Issues one GET against the extraction service and parses its JSON body.
/// Runs on the blocking pool; callers wrap it in `spawn_blocking`.
pub fn fetch_media_list(agent: &ureq::Agent, endpoint: &str) -> Result<ExtractorReply> {
    let response = agent
        .get(endpoint)
        .call()
        .context("calling extraction service")?;
    response
        .into_json::<ExtractorReply>()
        .context("parsing extraction service response")
}

/// Picks the variant with the highest declared bandwidth among downloadable
/// videos. Ties keep the first occurrence in the upstream's ordering.
pub fn select_best_video(medias: &[MediaVariant]) -> Option<&MediaVariant> {
    let mut best: Option<&MediaVariant> = None;
    for media in medias.iter().filter(|m| m.is_downloadable_video()) {
        match best {
            Some(current) if media.declared_bandwidth() <= current.declared_bandwidth() => {}
            _ => best = Some(media),
        }
    }
    best
}

/// Collapses one fetch outcome into the retry state machine:
/// transport/parse failure, upstream non-success status, and an empty
/// selection all retry; a selected variant is terminal success.
pub fn evaluate(outcome: Result<ExtractorReply>) -> Attempt {
    let reply = match outcome {
        Ok(reply) => reply,
        Err(err) => {
            log::warn!("extractor call failed: {err:#}");
            return Attempt::Retry(RetryReason::Transport);
        }
    };

    if reply.status_code != UPSTREAM_SUCCESS {
        log::warn!("extractor reported status {}", reply.status_code);
        return Attempt::Retry(RetryReason::ServiceStatus);
    }

    match select_best_video(&reply.medias) {
        Some(media) => match &media.url {
            Some(link) => Attempt::Success(link.clone()),
            None => Attempt::Retry(RetryReason::EmptySelection),
        },
        None => Attempt::Retry(RetryReason::EmptySelection),
    }
}
