//! 分类和产品类型

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductType {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub category_id: Option<Uuid>,
}

/// 按名称查找，不区分大小写
pub fn find_by_name<'a, T, F>(items: &'a [T], name: &str, name_of: F) -> Option<&'a T>
where
    F: Fn(&T) -> &str,
{
    let wanted = name.trim().to_lowercase();
    items
        .iter()
        .find(|item| name_of(item).trim().to_lowercase() == wanted)
}

#[derive(Debug, Deserialize)]
pub struct NewCategory {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct NewProductType {
    pub name: String,
    #[serde(default)]
    pub category_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProductTypeQuery {
    pub category_id: Option<Uuid>,
}

/// 初始化分类和类型的结果，只列出本次新增的名称
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SeedReport {
    pub added_categories: Vec<String>,
    pub added_types: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardCounts {
    pub products: usize,
    pub ingredients: usize,
    pub categories: usize,
}
