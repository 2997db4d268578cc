//! 成分业务服务

use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use super::list::IngredientList;
use super::model::{Ingredient, IngredientPayload};
use crate::core::error::CoreError;
use crate::infrastructure::backend::{Backend, BackendError, Query, Table};

#[derive(Clone)]
pub struct IngredientService {
    backend: Backend,
}

impl IngredientService {
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }

    /// 按创建时间倒序载入全部成分
    pub async fn list(&self) -> Result<IngredientList, CoreError> {
        let rows = self
            .backend
            .rows
            .select(&Query::table(Table::Ingredients).order_by("created_at", false))
            .await?;

        let items = rows
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Ingredient>, _>>()
            .map_err(BackendError::from)?;
        Ok(IngredientList::new(items))
    }

    pub async fn get(&self, id: Uuid) -> Result<Ingredient, CoreError> {
        let row = self
            .backend
            .rows
            .select(&Query::table(Table::Ingredients).eq("id", id.to_string()))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::NotFound(format!("ingredient {} not found", id)))?;

        Ok(serde_json::from_value(row).map_err(BackendError::from)?)
    }

    pub async fn insert(&self, payload: &IngredientPayload) -> Result<Uuid, CoreError> {
        let row = serde_json::to_value(payload).map_err(BackendError::from)?;
        let rows = self.backend.rows.insert(Table::Ingredients, vec![row]).await?;

        rows.first()
            .and_then(|row| row.get("id"))
            .and_then(Value::as_str)
            .and_then(|id| Uuid::parse_str(id).ok())
            .ok_or_else(|| CoreError::Internal("insert returned no id".to_string()))
    }

    pub async fn update(&self, id: Uuid, payload: &IngredientPayload) -> Result<(), CoreError> {
        let patch = serde_json::to_value(payload).map_err(BackendError::from)?;
        self.backend
            .rows
            .update(Table::Ingredients, id, patch)
            .await?;
        Ok(())
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), CoreError> {
        self.backend.rows.delete(Table::Ingredients, id).await?;
        info!("成分已删除: {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ingredients::form::IngredientForm;
    use crate::app::ingredients::list::confirm_ingredient_delete;
    use crate::app::ingredients::model::SafetyLevel;
    use crate::app::FormMode;
    use crate::infrastructure::backend::RowStore;
    use crate::infrastructure::memory::MemoryBackend;
    use serde_json::json;

    fn service() -> IngredientService {
        IngredientService::new(MemoryBackend::new("http://storage.test").into_backend())
    }

    #[tokio::test]
    async fn test_edit_preserves_legacy_safety_text() {
        let memory = MemoryBackend::new("http://storage.test");
        let service = IngredientService::new(memory.clone().into_backend());

        let rows = memory
            .insert(
                Table::Ingredients,
                vec![json!({
                    "name": "Hydroquinone",
                    "slug": "hydroquinone",
                    "safety_level": "Dilarang",
                })],
            )
            .await
            .unwrap();
        let id = Uuid::parse_str(rows[0]["id"].as_str().unwrap()).unwrap();

        let stored = service.get(id).await.unwrap();
        let mut form = IngredientForm::edit(&stored);
        form.set_description("Pencerah kulit");
        form.submit(&service).await.unwrap();

        let updated = service.get(id).await.unwrap();
        assert_eq!(updated.description.as_deref(), Some("Pencerah kulit"));
        assert_eq!(updated.safety_level.as_deref(), Some("Dilarang"));
    }

    #[tokio::test]
    async fn test_create_edit_and_delete() {
        let service = service();

        let mut form = IngredientForm::new();
        form.set_name("Salicylic Acid");
        form.set_description("BHA exfoliant");
        let created = form.submit(&service).await.unwrap();
        assert_eq!(created.message, "Kandungan berhasil disimpan!");
        assert_eq!(created.redirect, "/dashboard/ingredients");
        assert_eq!(created.delay_ms, 1000);

        let stored = service.get(created.id).await.unwrap();
        assert_eq!(stored.slug, "salicylic-acid");
        assert_eq!(stored.safety(), Some(SafetyLevel::Safe));

        let mut form = IngredientForm::edit(&stored);
        assert_eq!(form.mode(), FormMode::Edit(created.id));
        form.set_name("Salicylic Acid 2%");
        form.set_safety_level(SafetyLevel::CautionSensitiveSkin);
        form.submit(&service).await.unwrap();

        let updated = service.get(created.id).await.unwrap();
        assert_eq!(updated.name, "Salicylic Acid 2%");
        assert_eq!(updated.slug, "salicylic-acid");
        assert_eq!(updated.safety(), Some(SafetyLevel::CautionSensitiveSkin));

        let mut list = service.list().await.unwrap();
        assert_eq!(list.search("BHA").len(), 1);
        list.request_delete(created.id).unwrap();
        confirm_ingredient_delete(&mut list, &service).await.unwrap();
        assert!(list.is_empty());
        assert!(matches!(
            service.get(created.id).await,
            Err(CoreError::NotFound(_))
        ));
    }
}
