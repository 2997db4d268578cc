//! 列表视图
//!
//! 列表一次载入全部行，搜索在内存中完成。删除分两步：先 `request_delete`
//! 记下待删项，`confirm_delete` 执行删除并只在成功后从本地列表移除，不重新载入。

use std::future::Future;
use uuid::Uuid;

use crate::core::error::CoreError;

/// 可放进列表视图的条目
pub trait Listed {
    fn id(&self) -> Uuid;

    /// `needle` 已经转成小写
    fn matches(&self, needle: &str) -> bool;
}

/// 不区分大小写的子串匹配
pub fn contains_ci(haystack: Option<&str>, needle: &str) -> bool {
    haystack
        .map(|h| h.to_lowercase().contains(needle))
        .unwrap_or(false)
}

#[derive(Debug, Clone)]
pub struct ListView<T> {
    items: Vec<T>,
    pending_delete: Option<Uuid>,
    deleting: bool,
    error: Option<String>,
}

impl<T: Listed> ListView<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            pending_delete: None,
            deleting: false,
            error: None,
        }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// 按搜索词过滤，空词返回全部
    pub fn search(&self, term: &str) -> Vec<&T> {
        let needle = term.trim().to_lowercase();
        self.items
            .iter()
            .filter(|item| needle.is_empty() || item.matches(&needle))
            .collect()
    }

    /// 只保留满足条件的条目
    pub fn retain(&mut self, keep: impl FnMut(&T) -> bool) {
        self.items.retain(keep);
    }

    pub fn get(&self, id: Uuid) -> Option<&T> {
        self.items.iter().find(|item| item.id() == id)
    }

    pub fn pending_delete(&self) -> Option<Uuid> {
        self.pending_delete
    }

    pub fn is_deleting(&self) -> bool {
        self.deleting
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// 标记待删除条目，列表中不存在时报 404
    pub fn request_delete(&mut self, id: Uuid) -> Result<(), CoreError> {
        if self.get(id).is_none() {
            return Err(CoreError::NotFound(format!("item {} not found", id)));
        }
        self.pending_delete = Some(id);
        self.error = None;
        Ok(())
    }

    pub fn cancel_delete(&mut self) {
        self.pending_delete = None;
    }

    /// 执行删除
    ///
    /// `delete` 成功后条目从本地列表移除并返回其 id。失败时列表不变，
    /// 错误信息保留在 [`ListView::error`] 中并返回给调用方。
    pub async fn confirm_delete<F, Fut>(&mut self, delete: F) -> Result<Option<Uuid>, CoreError>
    where
        F: FnOnce(&T) -> Fut,
        Fut: Future<Output = Result<(), CoreError>>,
    {
        let id = match self.pending_delete {
            Some(id) => id,
            None => return Ok(None),
        };
        self.deleting = true;
        let result = match self.get(id) {
            Some(item) => delete(item).await,
            None => Err(CoreError::NotFound(format!("item {} not found", id))),
        };
        self.deleting = false;

        match result {
            Ok(()) => {
                self.items.retain(|item| item.id() != id);
                self.pending_delete = None;
                Ok(Some(id))
            }
            Err(e) => {
                self.error = Some(e.to_string());
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct Row {
        id: Uuid,
        name: String,
    }

    impl Listed for Row {
        fn id(&self) -> Uuid {
            self.id
        }

        fn matches(&self, needle: &str) -> bool {
            contains_ci(Some(&self.name), needle)
        }
    }

    fn view() -> ListView<Row> {
        ListView::new(vec![
            Row {
                id: Uuid::new_v4(),
                name: "Vitamin C Serum".to_string(),
            },
            Row {
                id: Uuid::new_v4(),
                name: "Gentle Cleanser".to_string(),
            },
        ])
    }

    #[test]
    fn test_search_is_case_insensitive() {
        let view = view();
        assert_eq!(view.search("SERUM").len(), 1);
        assert_eq!(view.search("  ").len(), 2);
        assert!(view.search("toner").is_empty());
    }

    #[tokio::test]
    async fn test_confirm_delete_removes_item() {
        let mut view = view();
        let id = view.items()[0].id;

        view.request_delete(id).unwrap();
        let deleted = view.confirm_delete(|_| async { Ok(()) }).await.unwrap();

        assert_eq!(deleted, Some(id));
        assert_eq!(view.len(), 1);
        assert_eq!(view.pending_delete(), None);
    }

    #[tokio::test]
    async fn test_failed_delete_keeps_item() {
        let mut view = view();
        let id = view.items()[1].id;

        view.request_delete(id).unwrap();
        let result = view
            .confirm_delete(|_| async { Err(CoreError::Internal("permission denied".to_string())) })
            .await;

        assert!(result.is_err());
        assert_eq!(view.len(), 2);
        assert_eq!(view.error(), Some("permission denied"));
        assert_eq!(view.pending_delete(), Some(id));
    }

    #[tokio::test]
    async fn test_cancel_delete() {
        let mut view = view();
        let id = view.items()[0].id;
        view.request_delete(id).unwrap();
        view.cancel_delete();

        assert_eq!(view.confirm_delete(|_| async { Ok(()) }).await.unwrap(), None);
        assert_eq!(view.len(), 2);
        assert!(view.request_delete(Uuid::new_v4()).is_err());
    }
}
