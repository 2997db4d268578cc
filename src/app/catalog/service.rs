//! 分类、产品类型和初始化数据

use serde_json::{json, Value};
use std::collections::HashSet;
use tracing::info;
use uuid::Uuid;

use super::model::{find_by_name, Category, DashboardCounts, ProductType, SeedReport};
use crate::core::error::CoreError;
use crate::core::sanitize::sanitize_text;
use crate::infrastructure::backend::{Backend, BackendError, Query, Table};

pub const SEED_CATEGORIES: [&str; 10] = [
    "Serum",
    "Cleanser",
    "Toner",
    "Moisturizer",
    "Sunscreen",
    "Mask",
    "Essence",
    "Tonic",
    "Face Wash",
    "Eye Cream",
];

pub const SEED_PRODUCT_TYPES: [&str; 6] = [
    "Skincare",
    "Bodycare",
    "Haircare",
    "Makeup",
    "Fragrance",
    "Tools",
];

#[derive(Clone)]
pub struct CatalogService {
    backend: Backend,
}

fn parse_rows<T: serde::de::DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>, BackendError> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(BackendError::from))
        .collect()
}

impl CatalogService {
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }

    /// 按名称排序的分类
    pub async fn categories(&self) -> Result<Vec<Category>, CoreError> {
        let rows = self
            .backend
            .rows
            .select(
                &Query::table(Table::Categories)
                    .columns(&["id", "name"])
                    .order_by("name", true),
            )
            .await?;
        Ok(parse_rows(rows)?)
    }

    /// 按名称排序的产品类型，可按分类过滤
    pub async fn product_types(&self, category_id: Option<Uuid>) -> Result<Vec<ProductType>, CoreError> {
        let mut query = Query::table(Table::ProductTypes)
            .columns(&["id", "name", "category_id"])
            .order_by("name", true);
        if let Some(category_id) = category_id {
            query = query.eq("category_id", category_id.to_string());
        }
        let rows = self.backend.rows.select(&query).await?;
        Ok(parse_rows(rows)?)
    }

    /// 新增分类，同名（不区分大小写）已存在时直接返回已有的
    ///
    /// 返回值第二项表示是否新建。
    pub async fn add_category(&self, name: &str) -> Result<(Category, bool), CoreError> {
        let name = sanitize_text(name);
        if name.is_empty() {
            return Err(CoreError::Validation(vec!["Nama kategori wajib diisi".to_string()]));
        }

        let existing = self.categories().await?;
        if let Some(found) = find_by_name(&existing, &name, |c| &c.name) {
            return Ok((found.clone(), false));
        }

        let rows = self
            .backend
            .rows
            .insert(Table::Categories, vec![json!({ "name": name })])
            .await?;
        let created: Vec<Category> = parse_rows(rows)?;
        let category = created
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::Internal("insert returned no row".to_string()))?;

        info!("新增分类: {}", category.name);
        Ok((category, true))
    }

    pub async fn add_product_type(
        &self,
        name: &str,
        category_id: Option<Uuid>,
    ) -> Result<(ProductType, bool), CoreError> {
        let name = sanitize_text(name);
        if name.is_empty() {
            return Err(CoreError::Validation(vec!["Nama tipe wajib diisi".to_string()]));
        }

        let existing = self.product_types(None).await?;
        if let Some(found) = find_by_name(&existing, &name, |t| &t.name) {
            return Ok((found.clone(), false));
        }

        let rows = self
            .backend
            .rows
            .insert(
                Table::ProductTypes,
                vec![json!({ "name": name, "category_id": category_id })],
            )
            .await?;
        let created: Vec<ProductType> = parse_rows(rows)?;
        let product_type = created
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::Internal("insert returned no row".to_string()))?;

        info!("新增产品类型: {}", product_type.name);
        Ok((product_type, true))
    }

    /// 补齐缺失的默认分类和类型，重复执行不会产生重复行
    pub async fn seed(&self) -> Result<SeedReport, CoreError> {
        let added_categories = self.seed_table(Table::Categories, &SEED_CATEGORIES).await?;
        let added_types = self
            .seed_table(Table::ProductTypes, &SEED_PRODUCT_TYPES)
            .await?;

        info!(
            "初始化完成: 新增 {} 个分类, {} 个类型",
            added_categories.len(),
            added_types.len()
        );
        Ok(SeedReport {
            added_categories,
            added_types,
        })
    }

    async fn seed_table(&self, table: Table, names: &[&str]) -> Result<Vec<String>, CoreError> {
        let existing: HashSet<String> = self
            .backend
            .rows
            .select(&Query::table(table).columns(&["name"]))
            .await?
            .iter()
            .filter_map(|row| row.get("name").and_then(Value::as_str).map(str::to_string))
            .collect();

        let missing: Vec<String> = names
            .iter()
            .filter(|name| !existing.contains(**name))
            .map(|name| name.to_string())
            .collect();

        if !missing.is_empty() {
            let rows = missing.iter().map(|name| json!({ "name": name })).collect();
            self.backend.rows.insert(table, rows).await?;
        }
        Ok(missing)
    }

    pub async fn dashboard_counts(&self) -> Result<DashboardCounts, CoreError> {
        let count = |table: Table| async move {
            self.backend
                .rows
                .select(&Query::table(table).columns(&["id"]))
                .await
                .map(|rows| rows.len())
        };

        Ok(DashboardCounts {
            products: count(Table::Products).await?,
            ingredients: count(Table::Ingredients).await?,
            categories: count(Table::Categories).await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::memory::MemoryBackend;

    fn service() -> CatalogService {
        CatalogService::new(MemoryBackend::new("http://storage.test").into_backend())
    }

    #[tokio::test]
    async fn test_seed_twice_adds_nothing_new() {
        let service = service();

        let first = service.seed().await.unwrap();
        assert_eq!(first.added_categories.len(), SEED_CATEGORIES.len());
        assert_eq!(first.added_types.len(), SEED_PRODUCT_TYPES.len());

        let second = service.seed().await.unwrap();
        assert_eq!(second, SeedReport::default());
        assert_eq!(service.categories().await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_add_category_checks_existing_name() {
        let service = service();
        let (created, is_new) = service.add_category("Serum").await.unwrap();
        assert!(is_new);

        let (again, is_new) = service.add_category("  serum ").await.unwrap();
        assert!(!is_new);
        assert_eq!(again.id, created.id);

        assert!(matches!(
            service.add_category("<b></b>").await,
            Err(CoreError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_categories_are_sorted_by_name() {
        let service = service();
        for name in ["Toner", "Cleanser", "Mask"] {
            service.add_category(name).await.unwrap();
        }
        let names: Vec<String> = service
            .categories()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Cleanser", "Mask", "Toner"]);
    }

    #[tokio::test]
    async fn test_product_types_filter_by_category() {
        let service = service();
        let (category, _) = service.add_category("Serum").await.unwrap();
        service
            .add_product_type("Skincare", Some(category.id))
            .await
            .unwrap();
        service.add_product_type("Tools", None).await.unwrap();

        let filtered = service.product_types(Some(category.id)).await.unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].name, "Skincare");
        assert_eq!(service.product_types(None).await.unwrap().len(), 2);
    }
}
