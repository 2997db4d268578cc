//! 成分表单

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use super::model::{Ingredient, IngredientInput, IngredientPayload, SafetyLevel};
use super::service::IngredientService;
use crate::app::FormMode;
use crate::core::error::{validation_messages, CoreError};
use crate::core::response::SubmitOutcome;
use crate::core::sanitize::sanitize_text;

pub const INGREDIENT_LIST_ROUTE: &str = "/dashboard/ingredients";
pub const INGREDIENT_REDIRECT_DELAY_MS: u64 = 1000;

const FIELD_ORDER: [&str; 2] = ["name", "slug"];

/// 名称转 slug：小写，每段连续空白替换为一个 `-`
pub fn derive_slug(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut in_space = false;
    for ch in name.chars() {
        if ch.is_whitespace() {
            if !in_space {
                slug.push('-');
            }
            in_space = true;
        } else {
            slug.extend(ch.to_lowercase());
            in_space = false;
        }
    }
    slug
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct IngredientFields {
    #[validate(length(min = 1, message = "Nama wajib diisi"))]
    pub name: String,
    #[validate(length(min = 1, message = "Slug wajib diisi"))]
    pub slug: String,
    pub description: String,
    pub benefits: String,
    /// 新表单尚未选择
    pub safety_level: Option<SafetyLevel>,
}

#[derive(Debug, Clone)]
pub struct IngredientForm {
    mode: FormMode,
    fields: IngredientFields,
    /// 存储中不属于三个等级的原始文本
    stored_safety: Option<String>,
    loading: bool,
    error: Option<String>,
    success: Option<String>,
}

impl Default for IngredientForm {
    fn default() -> Self {
        Self::new()
    }
}

impl IngredientForm {
    pub fn new() -> Self {
        Self {
            mode: FormMode::Create,
            fields: IngredientFields::default(),
            stored_safety: None,
            loading: false,
            error: None,
            success: None,
        }
    }

    pub fn edit(ingredient: &Ingredient) -> Self {
        Self {
            mode: FormMode::Edit(ingredient.id),
            fields: IngredientFields {
                name: ingredient.name.clone(),
                slug: ingredient.slug.clone(),
                description: ingredient.description.clone().unwrap_or_default(),
                benefits: ingredient.benefits.clone().unwrap_or_default(),
                safety_level: ingredient.safety(),
            },
            stored_safety: ingredient
                .safety_level
                .clone()
                .filter(|_| ingredient.safety().is_none())
                .filter(|raw| !raw.trim().is_empty()),
            ..Self::new()
        }
    }

    pub fn mode(&self) -> FormMode {
        self.mode
    }

    pub fn fields(&self) -> &IngredientFields {
        &self.fields
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn success(&self) -> Option<&str> {
        self.success.as_deref()
    }

    /// 新建时同步生成 slug，编辑时不改 slug
    pub fn set_name(&mut self, name: &str) {
        self.fields.name = name.to_string();
        if self.mode == FormMode::Create {
            self.fields.slug = derive_slug(name);
        }
    }

    pub fn set_slug(&mut self, slug: &str) {
        self.fields.slug = slug.to_string();
    }

    pub fn set_description(&mut self, description: &str) {
        self.fields.description = description.to_string();
    }

    pub fn set_benefits(&mut self, benefits: &str) {
        self.fields.benefits = benefits.to_string();
    }

    pub fn set_safety_level(&mut self, level: SafetyLevel) {
        self.fields.safety_level = Some(level);
        self.stored_safety = None;
    }

    pub fn stored_safety(&self) -> Option<&str> {
        self.stored_safety.as_deref()
    }

    /// 依次应用接口提交的字段，slug 在名称之后覆盖
    pub fn apply(&mut self, input: &IngredientInput) {
        if let Some(name) = &input.name {
            self.set_name(name);
        }
        if let Some(slug) = &input.slug {
            self.set_slug(slug);
        }
        if let Some(description) = &input.description {
            self.set_description(description);
        }
        if let Some(benefits) = &input.benefits {
            self.set_benefits(benefits);
        }
        if let Some(level) = input.safety_level {
            self.set_safety_level(level);
        }
    }

    pub fn progress(&self) -> u8 {
        let f = &self.fields;
        let filled = [&f.name, &f.description, &f.benefits]
            .iter()
            .filter(|v| !v.trim().is_empty())
            .count()
            + usize::from(f.safety_level.is_some() || self.stored_safety.is_some());

        ((filled as f64 / 4.0) * 100.0).round() as u8
    }

    pub fn validate(&self) -> Result<IngredientPayload, CoreError> {
        let fields = IngredientFields {
            name: sanitize_text(&self.fields.name),
            slug: sanitize_text(&self.fields.slug),
            description: sanitize_text(&self.fields.description),
            benefits: sanitize_text(&self.fields.benefits),
            safety_level: self.fields.safety_level,
        };
        fields
            .validate()
            .map_err(|e| CoreError::Validation(validation_messages(&e, &FIELD_ORDER)))?;

        Ok(IngredientPayload {
            name: fields.name,
            slug: fields.slug,
            description: fields.description,
            benefits: fields.benefits,
            safety_level: match (fields.safety_level, &self.stored_safety) {
                (Some(level), _) => level.label().to_string(),
                (None, Some(raw)) => raw.clone(),
                (None, None) => SafetyLevel::default().label().to_string(),
            },
        })
    }

    pub fn errors(&self) -> Vec<String> {
        match self.validate() {
            Ok(_) => Vec::new(),
            Err(CoreError::Validation(messages)) => messages,
            Err(other) => vec![other.to_string()],
        }
    }

    pub async fn submit(&mut self, service: &IngredientService) -> Result<SubmitOutcome, CoreError> {
        self.loading = true;
        self.error = None;
        self.success = None;

        let result = self.save(service).await;
        self.loading = false;

        match result {
            Ok(outcome) => {
                self.success = Some(outcome.message.clone());
                Ok(outcome)
            }
            Err(e) => {
                self.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    async fn save(&self, service: &IngredientService) -> Result<SubmitOutcome, CoreError> {
        let payload = self.validate()?;

        let id: Uuid = match self.mode {
            FormMode::Create => service.insert(&payload).await?,
            FormMode::Edit(id) => {
                service.update(id, &payload).await?;
                id
            }
        };
        info!("成分已保存: {} ({})", payload.name, id);

        Ok(SubmitOutcome {
            id,
            message: "Kandungan berhasil disimpan!".to_string(),
            redirect: INGREDIENT_LIST_ROUTE.to_string(),
            delay_ms: INGREDIENT_REDIRECT_DELAY_MS,
        })
    }
}
