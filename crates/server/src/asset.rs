// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Served assets: the id to path table, lazily resolved descriptors and
//! bounded-memory span readers.

use std::{
    collections::{BTreeMap, HashMap},
    io::{self, SeekFrom},
    path::{Path, PathBuf},
};

use bandprobe_base::readable_size::ReadableSize;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use snafu::{ResultExt, Snafu};
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt, Take},
    sync::OnceCell,
};
use tracing::debug;

use crate::range::ByteRange;

/// Id under which the primary media file is served at `/video`.
pub const VIDEO_ASSET_ID: &str = "video";

/// Content type of the primary media file.
pub const VIDEO_CONTENT_TYPE: &str = "video/mp4";

/// Default transfer buffer per streamed response.
pub const DEFAULT_READ_BUFFER_SIZE: ReadableSize = ReadableSize::kb(64);

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum AssetError {
    #[snafu(display("Unknown asset {id}"))]
    UnknownAsset { id: String },

    #[snafu(display("Asset {id} is missing at {}", path.display()))]
    Missing { id: String, path: PathBuf },

    #[snafu(display("Failed to stat asset {id} at {}", path.display()))]
    Stat {
        id:     String,
        path:   PathBuf,
        source: io::Error,
    },

    #[snafu(display("Failed to open asset at {}", path.display()))]
    Open { path: PathBuf, source: io::Error },

    #[snafu(display("Failed to seek asset at {} to {offset}", path.display()))]
    Seek {
        path:   PathBuf,
        offset: u64,
        source: io::Error,
    },
}

/// Which files are served, and how.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, SmartDefault, bon::Builder)]
#[serde(default)]
pub struct AssetConfig {
    /// File served at `/video` and described by `/video-info`
    #[default(_code = "PathBuf::from(\"assets/video.mp4\")")]
    #[builder(into)]
    pub video_path:       PathBuf,
    /// Further files served at `/asset/{id}`
    #[builder(default)]
    pub extra_assets:     BTreeMap<String, PathBuf>,
    /// Transfer buffer used when streaming a response body
    #[default(_code = "DEFAULT_READ_BUFFER_SIZE")]
    #[builder(default = DEFAULT_READ_BUFFER_SIZE)]
    pub read_buffer_size: ReadableSize,
}

/// Size and type of a served file, resolved once per process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetDescriptor {
    pub size_bytes:   u64,
    pub content_type: String,
    #[serde(skip)]
    pub path:         PathBuf,
}

impl AssetDescriptor {
    /// Open a reader positioned at `range.start` that yields exactly
    /// `range.len()` bytes. Every call gets its own file handle.
    pub async fn open_span(&self, range: ByteRange) -> Result<Take<File>, AssetError> {
        let mut file = File::open(&self.path)
            .await
            .context(OpenSnafu { path: &self.path })?;
        if range.start > 0 {
            file.seek(SeekFrom::Start(range.start))
                .await
                .context(SeekSnafu {
                    path:   &self.path,
                    offset: range.start,
                })?;
        }
        Ok(file.take(range.len()))
    }
}

struct AssetEntry {
    path:         PathBuf,
    content_type: String,
    descriptor:   OnceCell<AssetDescriptor>,
}

/// Read-only table of served assets.
///
/// Descriptors are cached after the first successful stat. A missing file is
/// not cached, so an asset that appears later is picked up.
pub struct AssetStore {
    entries:     HashMap<String, AssetEntry>,
    buffer_size: usize,
}

impl AssetStore {
    #[must_use]
    pub fn new(config: &AssetConfig) -> Self {
        let mut entries = HashMap::with_capacity(config.extra_assets.len() + 1);
        for (id, path) in &config.extra_assets {
            entries.insert(id.clone(), AssetEntry::new(path, guess_content_type(path)));
        }
        entries.insert(
            VIDEO_ASSET_ID.to_string(),
            AssetEntry::new(&config.video_path, VIDEO_CONTENT_TYPE.to_string()),
        );
        Self {
            entries,
            buffer_size: config.read_buffer_size.as_usize().max(1),
        }
    }

    #[must_use]
    pub const fn buffer_size(&self) -> usize { self.buffer_size }

    /// Resolve the descriptor of `id`, statting the file on first use.
    pub async fn descriptor(&self, id: &str) -> Result<&AssetDescriptor, AssetError> {
        let entry = self
            .entries
            .get(id)
            .ok_or_else(|| AssetError::UnknownAsset { id: id.to_string() })?;
        entry
            .descriptor
            .get_or_try_init(|| async {
                let metadata = match tokio::fs::metadata(&entry.path).await {
                    Ok(metadata) if metadata.is_file() => metadata,
                    Ok(_) => {
                        return MissingSnafu {
                            id,
                            path: &entry.path,
                        }
                        .fail();
                    }
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {
                        return MissingSnafu {
                            id,
                            path: &entry.path,
                        }
                        .fail();
                    }
                    Err(e) => {
                        return Err(e).context(StatSnafu {
                            id,
                            path: &entry.path,
                        });
                    }
                };
                debug!(
                    asset = id,
                    path = %entry.path.display(),
                    size = metadata.len(),
                    "resolved asset descriptor"
                );
                Ok(AssetDescriptor {
                    size_bytes:   metadata.len(),
                    content_type: entry.content_type.clone(),
                    path:         entry.path.clone(),
                })
            })
            .await
    }
}

impl AssetEntry {
    fn new(path: &Path, content_type: String) -> Self {
        Self {
            path: path.to_path_buf(),
            content_type,
            descriptor: OnceCell::new(),
        }
    }
}

fn guess_content_type(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::io::AsyncReadExt;

    use super::*;

    fn store_for(dir: &Path) -> AssetStore {
        let config = AssetConfig::builder()
            .video_path(dir.join("video.mp4"))
            .extra_assets(BTreeMap::from([(
                "blob".to_string(),
                dir.join("blob.bin"),
            )]))
            .build();
        AssetStore::new(&config)
    }

    #[tokio::test]
    async fn test_descriptor_resolves_size_and_type() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("video.mp4"), vec![7u8; 4096])
            .await
            .unwrap();
        tokio::fs::write(dir.path().join("blob.bin"), b"abc").await.unwrap();
        let store = store_for(dir.path());

        let video = store.descriptor(VIDEO_ASSET_ID).await.unwrap();
        assert_eq!(video.size_bytes, 4096);
        assert_eq!(video.content_type, "video/mp4");

        let blob = store.descriptor("blob").await.unwrap();
        assert_eq!(blob.size_bytes, 3);
        assert_eq!(blob.content_type, "application/octet-stream");
    }

    #[tokio::test]
    async fn test_unknown_and_missing_assets() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_for(dir.path());

        assert!(matches!(
            store.descriptor("nope").await,
            Err(AssetError::UnknownAsset { .. })
        ));
        assert!(matches!(
            store.descriptor(VIDEO_ASSET_ID).await,
            Err(AssetError::Missing { .. })
        ));

        // Not cached: the file shows up on the next lookup.
        tokio::fs::write(dir.path().join("video.mp4"), b"late").await.unwrap();
        assert_eq!(store.descriptor(VIDEO_ASSET_ID).await.unwrap().size_bytes, 4);
    }

    #[tokio::test]
    async fn test_descriptor_is_cached_after_first_stat() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("video.mp4");
        tokio::fs::write(&path, vec![0u8; 100]).await.unwrap();
        let store = Arc::new(store_for(dir.path()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.descriptor(VIDEO_ASSET_ID).await.unwrap().size_bytes })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap(), 100);
        }

        tokio::fs::write(&path, vec![0u8; 200]).await.unwrap();
        assert_eq!(store.descriptor(VIDEO_ASSET_ID).await.unwrap().size_bytes, 100);
    }

    #[tokio::test]
    async fn test_open_span_reads_exact_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let content: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        tokio::fs::write(dir.path().join("video.mp4"), &content).await.unwrap();
        let store = store_for(dir.path());
        let descriptor = store.descriptor(VIDEO_ASSET_ID).await.unwrap();

        let mut reader = descriptor
            .open_span(ByteRange { start: 300, end: 1299 })
            .await
            .unwrap();
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, &content[300..1300]);
    }
}
