//! Synthetic `stub://` sources for tests and demos.
//!
//! URLs look like `stub://camera?fail_every=5` or `stub://video?frames=30&width=320`.

use image::{Rgb, RgbImage};
use std::collections::HashMap;

pub(crate) const STUB_SCHEME: &str = "stub://";

/// Parsed `stub://<name>?key=value&...` URL.
#[derive(Clone, Debug)]
pub(crate) struct StubUrl {
    pub name: String,
    params: HashMap<String, String>,
}

impl StubUrl {
    pub fn parse(raw: &str) -> Option<Self> {
        let rest = raw.strip_prefix(STUB_SCHEME)?;
        let (name, query) = match rest.split_once('?') {
            Some((name, query)) => (name, query),
            None => (rest, ""),
        };
        let params = query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .collect();
        Some(Self {
            name: name.to_string(),
            params,
        })
    }

    pub fn param_u64(&self, key: &str) -> Option<u64> {
        self.params.get(key).and_then(|v| v.parse().ok())
    }

    pub fn param_u32(&self, key: &str) -> Option<u32> {
        self.params.get(key).and_then(|v| v.parse().ok())
    }

    pub fn param_f32(&self, key: &str) -> Option<f32> {
        self.params.get(key).and_then(|v| v.parse().ok())
    }

    /// All query parameters, sorted by key.
    pub fn params(&self) -> Vec<(&str, &str)> {
        let mut pairs: Vec<(&str, &str)> = self
            .params
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        pairs.sort();
        pairs
    }
}

/// Generate a moving gradient so consecutive frames differ.
pub(crate) fn generate_frame(index: u64, width: u32, height: u32) -> RgbImage {
    let shift = (index % 256) as u32;
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            ((x + shift) % 256) as u8,
            ((y + shift) % 256) as u8,
            ((x + y + shift) % 256) as u8,
        ])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_stub_params() {
        let url = StubUrl::parse("stub://video?frames=12&width=32").unwrap();
        assert_eq!(url.name, "video");
        assert_eq!(url.param_u64("frames"), Some(12));
        assert_eq!(url.param_u32("width"), Some(32));
        assert_eq!(url.param_u32("height"), None);
        assert!(StubUrl::parse("/dev/video0").is_none());
    }

    #[test]
    fn consecutive_frames_differ() {
        let a = generate_frame(0, 8, 8);
        let b = generate_frame(1, 8, 8);
        assert_ne!(a.as_raw(), b.as_raw());
    }
}
