use log::debug;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const URL_PREFIX: &str = "blob:lookout/";

/// Object URLs handed out for uploaded media.
///
/// Every URL must be revoked when its media is replaced or the dashboard is
/// reset; a revoked URL no longer resolves.
#[derive(Debug, Default)]
pub struct ObjectUrls {
    live: HashMap<String, PathBuf>,
}

impl ObjectUrls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, path: &Path) -> String {
        let url = format!("{URL_PREFIX}{}", Uuid::new_v4());
        debug!("Created object URL {} for {}", url, path.display());
        self.live.insert(url.clone(), path.to_path_buf());
        url
    }

    pub fn resolve(&self, url: &str) -> Option<&Path> {
        self.live.get(url).map(PathBuf::as_path)
    }

    pub fn revoke(&mut self, url: &str) -> bool {
        let revoked = self.live.remove(url).is_some();
        if revoked {
            debug!("Revoked object URL {}", url);
        }
        revoked
    }

    /// Revokes every live URL and returns them.
    pub fn revoke_all(&mut self) -> Vec<String> {
        let urls: Vec<String> = self.live.drain().map(|(url, _)| url).collect();
        debug!("Revoked {} object URLs", urls.len());
        urls
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}
