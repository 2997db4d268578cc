//! 图片引用解析
//!
//! 行里存的图片引用可能是完整 URL，也可能是桶内相对路径。解析结果总能显示：
//! 拿不到地址时退回占位图。

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::StorageConfig;
use crate::infrastructure::backend::ObjectStorage;

/// 行上可能存放图片引用的键，按优先级排列
pub const IMAGE_KEYS: [&str; 7] = [
    "image_url",
    "image",
    "img",
    "imageUrl",
    "image_src",
    "imageLink",
    "image_link",
];

const STORAGE_PREFIXES: [&str; 2] = ["/storage/v1/object/public/", "/storage/v1/object/sign/"];

/// 取出第一个非空的图片引用
pub fn pick_image(row: &Value) -> Option<String> {
    IMAGE_KEYS.iter().find_map(|key| {
        row.get(*key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

/// `^https?://`，不区分大小写
pub fn is_absolute(raw: &str) -> bool {
    let lower = raw.get(..8).unwrap_or(raw).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

pub fn is_placeholder(raw: &str) -> bool {
    raw.contains("placehold.co")
}

/// 对象在存储中的位置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectLocation {
    pub bucket: String,
    pub path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageSource {
    /// 引用本身就是完整 URL
    Direct,
    Public,
    Signed,
    Placeholder,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedImage {
    pub url: String,
    pub source: ImageSource,
}

#[derive(Clone)]
pub struct ImageResolver {
    storage: Arc<dyn ObjectStorage>,
    config: StorageConfig,
}

impl ImageResolver {
    pub fn new(storage: Arc<dyn ObjectStorage>, config: StorageConfig) -> Self {
        Self { storage, config }
    }

    pub fn placeholder(&self) -> ResolvedImage {
        ResolvedImage {
            url: self.config.placeholder_url.clone(),
            source: ImageSource::Placeholder,
        }
    }

    fn signed_ttl(&self) -> Duration {
        Duration::from_secs(self.config.signed_url_ttl_seconds)
    }

    /// 相对路径对应的桶和对象路径
    pub fn locate_relative(&self, raw: &str) -> Option<ObjectLocation> {
        let trimmed = raw.trim().trim_start_matches('/');

        let alternate = self.config.alternate_buckets.iter().find_map(|bucket| {
            trimmed
                .strip_prefix(bucket.as_str())
                .and_then(|rest| rest.strip_prefix('/'))
                .map(|path| (bucket.clone(), path))
        });

        let (bucket, path) = match alternate {
            Some(found) => found,
            None => {
                let default = &self.config.default_bucket;
                let path = trimmed
                    .strip_prefix(default.as_str())
                    .and_then(|rest| rest.strip_prefix('/'))
                    .unwrap_or(trimmed);
                (default.clone(), path)
            }
        };

        if path.is_empty() {
            return None;
        }
        Some(ObjectLocation {
            bucket,
            path: path.to_string(),
        })
    }

    /// 相对路径，或能反解出桶和路径的存储 URL
    pub fn locate(&self, raw: &str) -> Option<ObjectLocation> {
        if is_absolute(raw) {
            parse_storage_url(raw)
        } else {
            self.locate_relative(raw)
        }
    }

    /// 解析图片引用
    pub async fn resolve(&self, raw: Option<&str>) -> ResolvedImage {
        let raw = match raw.map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => raw,
            None => return self.placeholder(),
        };

        if is_absolute(raw) {
            return ResolvedImage {
                url: raw.to_string(),
                source: ImageSource::Direct,
            };
        }

        let location = match self.locate_relative(raw) {
            Some(location) => location,
            None => return self.placeholder(),
        };

        if let Some(url) = self
            .storage
            .public_url(&location.bucket, &location.path)
            .await
        {
            return ResolvedImage {
                url,
                source: ImageSource::Public,
            };
        }

        self.signed(&location).await
    }

    /// 图片加载失败后的唯一一次重试，只走签名地址
    pub async fn recover(&self, raw: Option<&str>) -> ResolvedImage {
        let location = raw
            .map(str::trim)
            .filter(|s| !s.is_empty() && !is_placeholder(s))
            .and_then(|s| self.locate(s));

        match location {
            Some(location) => self.signed(&location).await,
            None => self.placeholder(),
        }
    }

    async fn signed(&self, location: &ObjectLocation) -> ResolvedImage {
        match self
            .storage
            .signed_url(&location.bucket, &location.path, self.signed_ttl())
            .await
        {
            Ok(url) => ResolvedImage {
                url,
                source: ImageSource::Signed,
            },
            Err(e) => {
                debug!(
                    "签名地址获取失败 {}/{}: {}",
                    location.bucket, location.path, e
                );
                self.placeholder()
            }
        }
    }
}

/// 从 `/storage/v1/object/{public|sign}/<bucket>/<path>` 形式的 URL 中取出位置
pub fn parse_storage_url(raw: &str) -> Option<ObjectLocation> {
    let url = url::Url::parse(raw).ok()?;
    let path = url.path();

    STORAGE_PREFIXES.iter().find_map(|prefix| {
        let start = path.find(prefix)? + prefix.len();
        let parts: Vec<&str> = path[start..].split('/').filter(|p| !p.is_empty()).collect();
        match parts.split_first() {
            Some((bucket, rest)) if !rest.is_empty() => Some(ObjectLocation {
                bucket: bucket.to_string(),
                path: rest.join("/"),
            }),
            _ => None,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::backend::{BackendError, MockObjectStorage};
    use crate::infrastructure::memory::MemoryBackend;
    use serde_json::json;

    fn resolver(storage: Arc<dyn ObjectStorage>) -> ImageResolver {
        ImageResolver::new(storage, StorageConfig::default())
    }

    #[test]
    fn test_pick_image_prefers_known_keys() {
        let row = json!({"image": "  ", "img": "a.jpg", "image_link": "b.jpg"});
        assert_eq!(pick_image(&row), Some("a.jpg".to_string()));
        assert_eq!(pick_image(&json!({"name": "x"})), None);
    }

    #[test]
    fn test_locate_relative_paths() {
        let r = resolver(Arc::new(MockObjectStorage::new()));

        assert_eq!(
            r.locate_relative("/products/abc.jpg"),
            Some(ObjectLocation {
                bucket: "products".to_string(),
                path: "abc.jpg".to_string()
            })
        );
        assert_eq!(
            r.locate_relative("bucket1/products/x.png"),
            Some(ObjectLocation {
                bucket: "bucket1".to_string(),
                path: "products/x.png".to_string()
            })
        );
        assert_eq!(r.locate_relative("/"), None);
    }

    #[test]
    fn test_parse_storage_url() {
        let location = parse_storage_url(
            "https://x.supabase.co/storage/v1/object/public/bucket1/products/a.jpg",
        );
        assert_eq!(
            location,
            Some(ObjectLocation {
                bucket: "bucket1".to_string(),
                path: "products/a.jpg".to_string()
            })
        );
        assert_eq!(parse_storage_url("https://cdn.example.com/a.jpg"), None);
        assert_eq!(
            parse_storage_url("https://x.supabase.co/storage/v1/object/sign/products"),
            None
        );
    }

    #[tokio::test]
    async fn test_absolute_url_passes_through() {
        let r = resolver(Arc::new(MockObjectStorage::new()));
        let resolved = r.resolve(Some("HTTPS://cdn.example.com/a.jpg")).await;
        assert_eq!(resolved.source, ImageSource::Direct);
        assert_eq!(resolved.url, "HTTPS://cdn.example.com/a.jpg");
    }

    #[tokio::test]
    async fn test_relative_path_uses_public_url() {
        let memory = MemoryBackend::new("https://x.supabase.co");
        memory
            .upload("products", "abc.jpg", vec![1, 2, 3], "image/jpeg")
            .await
            .unwrap();

        let r = resolver(Arc::new(memory));
        let resolved = r.resolve(Some("products/abc.jpg")).await;
        assert_eq!(resolved.source, ImageSource::Public);
        assert_eq!(
            resolved.url,
            "https://x.supabase.co/storage/v1/object/public/products/abc.jpg"
        );
    }

    #[tokio::test]
    async fn test_missing_object_falls_back_to_placeholder() {
        let r = resolver(Arc::new(MemoryBackend::new("https://x.supabase.co")));
        let resolved = r.resolve(Some("products/missing.jpg")).await;
        assert_eq!(resolved, r.placeholder());
        assert_eq!(r.resolve(None).await, r.placeholder());
    }

    #[tokio::test]
    async fn test_signed_url_when_no_public_url() {
        let mut storage = MockObjectStorage::new();
        storage.expect_public_url().returning(|_, _| None);
        storage
            .expect_signed_url()
            .withf(|bucket, path, ttl| {
                bucket == "bucket1" && path == "x.jpg" && ttl.as_secs() == 3600
            })
            .times(1)
            .returning(|_, _, _| Ok("https://signed/x.jpg".to_string()));

        let r = resolver(Arc::new(storage));
        let resolved = r.resolve(Some("bucket1/x.jpg")).await;
        assert_eq!(resolved.source, ImageSource::Signed);
        assert_eq!(resolved.url, "https://signed/x.jpg");
    }

    #[tokio::test]
    async fn test_recover_retries_once_with_signed_url() {
        let mut storage = MockObjectStorage::new();
        storage
            .expect_signed_url()
            .times(1)
            .returning(|bucket, path, _| {
                Err(BackendError::ObjectNotFound {
                    bucket: bucket.to_string(),
                    path: path.to_string(),
                })
            });

        let r = resolver(Arc::new(storage));
        let resolved = r
            .recover(Some(
                "https://x.supabase.co/storage/v1/object/public/products/gone.jpg",
            ))
            .await;
        assert_eq!(resolved, r.placeholder());

        // 占位图本身不再重试
        let resolved = r
            .recover(Some("https://placehold.co/600x400?text=No+Image"))
            .await;
        assert_eq!(resolved.source, ImageSource::Placeholder);
    }
}
