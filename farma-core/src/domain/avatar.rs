//! Avatar upload validation and storage naming

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::result::{Error, Result};

/// Storage bucket holding avatars
pub const AVATAR_BUCKET: &str = "avatars";

/// Largest accepted avatar (5 MiB)
pub const MAX_AVATAR_BYTES: usize = 5 * 1024 * 1024;

/// Last cache-busting stamp handed out, so two uploads within the same
/// millisecond still get distinct URLs
static LAST_STAMP: AtomicI64 = AtomicI64::new(0);

/// An image selected for upload
#[derive(Debug, Clone)]
pub struct AvatarUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl AvatarUpload {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Reject non-images and oversized files before anything goes over the wire
    pub fn validate(&self) -> Result<()> {
        if !self.content_type.to_ascii_lowercase().starts_with("image/") {
            return Err(Error::validation("Please upload an image file"));
        }
        if self.size() > MAX_AVATAR_BYTES {
            return Err(Error::validation("Image must be less than 5MB"));
        }
        Ok(())
    }

    /// Lower-cased extension, taken from the file name or else the MIME subtype
    pub fn extension(&self) -> String {
        match self.file_name.rsplit_once('.') {
            Some((_, ext)) if !ext.is_empty() => ext.to_ascii_lowercase(),
            _ => self
                .content_type
                .split_once('/')
                .map(|(_, sub)| sub.split(';').next().unwrap_or(sub).trim())
                .unwrap_or("bin")
                .to_ascii_lowercase(),
        }
    }

    /// `<user-id>.<ext>`; re-uploading overwrites the previous avatar
    pub fn storage_key(&self, user_id: &str) -> String {
        format!("{}.{}", user_id, self.extension())
    }
}

/// Result of a successful avatar upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvatarUploaded {
    pub url: String,
}

/// Append a `t=<millis>` query parameter so caches fetch the new image
pub fn cache_busted_url(public_url: &str) -> String {
    let stamp = next_stamp(Utc::now().timestamp_millis());
    let separator = if public_url.contains('?') { '&' } else { '?' };
    format!("{}{}t={}", public_url, separator, stamp)
}

fn next_stamp(now_ms: i64) -> i64 {
    let mut last = LAST_STAMP.load(Ordering::Relaxed);
    loop {
        let candidate = now_ms.max(last + 1);
        match LAST_STAMP.compare_exchange_weak(last, candidate, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return candidate,
            Err(actual) => last = actual,
        }
    }
}
