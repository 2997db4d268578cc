//! 成分列表

use uuid::Uuid;

use super::model::Ingredient;
use super::service::IngredientService;
use crate::app::list::{contains_ci, ListView, Listed};
use crate::core::error::CoreError;

pub type IngredientList = ListView<Ingredient>;

impl Listed for Ingredient {
    fn id(&self) -> Uuid {
        self.id
    }

    fn matches(&self, needle: &str) -> bool {
        contains_ci(Some(&self.name), needle)
            || contains_ci(Some(&self.slug), needle)
            || contains_ci(self.description.as_deref(), needle)
    }
}

pub async fn confirm_ingredient_delete(
    list: &mut IngredientList,
    service: &IngredientService,
) -> Result<Option<Uuid>, CoreError> {
    list.confirm_delete(|ingredient| {
        let service = service.clone();
        let id = ingredient.id;
        async move { service.delete(id).await }
    })
    .await
}
