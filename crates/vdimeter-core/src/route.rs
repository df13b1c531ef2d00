//! Request classification (standard vs. streaming).
//!
//! Classification is a pure function of the route path: an explicit route
//! table is consulted first, then the display suffix, then the audio suffix.
//! A path matching neither is standard.

use std::collections::HashMap;

use crate::error::{Result, VdiMeterError};
use crate::labels::{normalize_path, ChannelKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    /// Bounded request/response.
    Standard,
    /// Upgraded, long-lived stream.
    Stream(ChannelKind),
}

#[derive(Debug, Clone)]
pub struct RouteClassifier {
    display_suffix: String,
    audio_suffix: String,
    routes: HashMap<String, ChannelKind>,
}

impl RouteClassifier {
    pub const DEFAULT_DISPLAY_SUFFIX: &'static str = "websockify";
    pub const DEFAULT_AUDIO_SUFFIX: &'static str = "wsaudio";

    /// Suffixes must be non-empty and neither may end with the other,
    /// otherwise a path could be both display and audio.
    pub fn new(display_suffix: impl Into<String>, audio_suffix: impl Into<String>) -> Result<Self> {
        let display_suffix = display_suffix.into();
        let audio_suffix = audio_suffix.into();

        if display_suffix.is_empty() || audio_suffix.is_empty() {
            return Err(VdiMeterError::BadRequest(
                "stream suffixes must not be empty".into(),
            ));
        }
        if display_suffix.ends_with(&audio_suffix) || audio_suffix.ends_with(&display_suffix) {
            return Err(VdiMeterError::BadRequest(format!(
                "ambiguous stream suffixes: {display_suffix:?} / {audio_suffix:?}"
            )));
        }

        Ok(Self {
            display_suffix,
            audio_suffix,
            routes: HashMap::new(),
        })
    }

    /// Tag a route explicitly, independent of its suffix.
    pub fn with_route(mut self, route: &str, kind: ChannelKind) -> Self {
        self.routes.insert(normalize_path(route).to_string(), kind);
        self
    }

    pub fn classify(&self, path: &str) -> RouteClass {
        let path = normalize_path(path);
        if let Some(kind) = self.routes.get(path) {
            return RouteClass::Stream(*kind);
        }
        if path.ends_with(&self.display_suffix) {
            RouteClass::Stream(ChannelKind::Display)
        } else if path.ends_with(&self.audio_suffix) {
            RouteClass::Stream(ChannelKind::Audio)
        } else {
            RouteClass::Standard
        }
    }
}

impl Default for RouteClassifier {
    fn default() -> Self {
        Self {
            display_suffix: Self::DEFAULT_DISPLAY_SUFFIX.to_string(),
            audio_suffix: Self::DEFAULT_AUDIO_SUFFIX.to_string(),
            routes: HashMap::new(),
        }
    }
}
