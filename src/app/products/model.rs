//! 产品数据模型

use serde::{de::Error as _, Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::app::catalog::model::{find_by_name, Category, ProductType};
use crate::app::images::resolver::{pick_image, ResolvedImage};
use crate::core::sanitize::to_list;
use crate::infrastructure::backend::{value_text, BackendError};

/// 读取后的产品
///
/// 兼容旧数据：列表字段可能是字符串，分类可能只有文本名称，图片可能存放在多个键下。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub brand: Option<String>,
    pub category_id: Option<Uuid>,
    pub category_name: Option<String>,
    pub product_type_id: Option<Uuid>,
    pub product_type_name: Option<String>,
    pub price: f64,
    pub featured: bool,
    pub description: Option<String>,
    pub ingredients: Vec<String>,
    pub how_to_use: Option<String>,
    pub size: Option<String>,
    pub skin_type: Vec<String>,
    pub concerns: Vec<String>,
    pub image: Option<String>,
    pub tokopedia_url: Option<String>,
    pub shopee_url: Option<String>,
    pub created_at: Option<String>,
}

fn text(row: &Value, key: &str) -> Option<String> {
    row.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn uuid_field(row: &Value, key: &str) -> Option<Uuid> {
    row.get(key)
        .filter(|v| !v.is_null())
        .and_then(|v| Uuid::parse_str(&value_text(v)).ok())
}

/// 嵌入的关联行名称，其次是旧的文本列
fn joined_name(row: &Value, embed: &str, legacy: &str) -> Option<String> {
    row.get(embed)
        .and_then(|e| text(e, "name"))
        .or_else(|| text(row, legacy))
}

fn flag(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64() == Some(1),
        Some(Value::String(s)) => s == "true" || s == "1",
        _ => false,
    }
}

fn number(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

impl Product {
    pub fn from_row(row: &Value) -> Result<Self, BackendError> {
        let id = uuid_field(row, "id")
            .ok_or_else(|| BackendError::InvalidRow(serde_json::Error::custom("product without id")))?;

        Ok(Self {
            id,
            name: text(row, "name").unwrap_or_default(),
            brand: text(row, "brand"),
            category_id: uuid_field(row, "category_id"),
            category_name: joined_name(row, "categories", "category"),
            product_type_id: uuid_field(row, "product_type_id"),
            product_type_name: joined_name(row, "product_types", "product_type"),
            price: number(row.get("price")),
            featured: flag(row.get("featured").or_else(|| row.get("is_featured"))),
            description: text(row, "description"),
            ingredients: row.get("ingredients").map(to_list).unwrap_or_default(),
            how_to_use: text(row, "how_to_use"),
            size: text(row, "size"),
            skin_type: row.get("skin_type").map(to_list).unwrap_or_default(),
            concerns: row.get("concerns").map(to_list).unwrap_or_default(),
            image: pick_image(row),
            tokopedia_url: text(row, "tokopedia_url"),
            shopee_url: text(row, "shopee_url"),
            created_at: text(row, "created_at"),
        })
    }

    /// 用分类和类型列表补齐 id 或名称
    ///
    /// 旧数据只有文本名称时按名称（不区分大小写）匹配 id，只有 id 时补上名称。
    pub fn link_taxonomy(&mut self, categories: &[Category], types: &[ProductType]) {
        match (self.category_id, self.category_name.as_deref()) {
            (None, Some(name)) => {
                self.category_id = find_by_name(categories, name, |c| &c.name).map(|c| c.id);
            }
            (Some(id), None) => {
                self.category_name = categories.iter().find(|c| c.id == id).map(|c| c.name.clone());
            }
            _ => {}
        }

        match (self.product_type_id, self.product_type_name.as_deref()) {
            (None, Some(name)) => {
                self.product_type_id = find_by_name(types, name, |t| &t.name).map(|t| t.id);
            }
            (Some(id), None) => {
                self.product_type_name = types.iter().find(|t| t.id == id).map(|t| t.name.clone());
            }
            _ => {}
        }
    }
}

/// 列表中的一张产品卡片
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductCard {
    #[serde(flatten)]
    pub product: Product,
    pub image_display: ResolvedImage,
    pub price_label: String,
}

/// 写入 products 表的内容
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProductPayload {
    pub name: String,
    pub brand: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub category_id: Option<Uuid>,
    pub product_type_id: Option<Uuid>,
    pub price: f64,
    pub featured: bool,
    pub description: String,
    pub ingredients: Vec<String>,
    pub how_to_use: Option<String>,
    pub size: Option<String>,
    pub skin_type: Vec<String>,
    pub concerns: Vec<String>,
    pub tokopedia_url: Option<String>,
    pub shopee_url: Option<String>,
    /// None 表示不修改，Some(None) 写入 null
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<Option<String>>,
    /// 旧图片列，图片变更时清空
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<Option<String>>,
}

/// 创建接口返回的内容
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreatedProduct {
    pub id: Uuid,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductFilter {
    pub search: Option<String>,
    pub category_id: Option<Uuid>,
    pub featured: Option<bool>,
}

/// 印尼盾价格标签，例如 `Rp 125.000`
pub fn format_idr(price: f64) -> String {
    if !price.is_finite() {
        return "Rp 0".to_string();
    }

    let negative = price < 0.0;
    let scaled = (price.abs() * 1000.0).round() as u64;
    let whole = scaled / 1000;
    let fraction = scaled % 1000;

    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }

    let mut label = format!("Rp {}{}", if negative { "-" } else { "" }, grouped);
    if fraction > 0 {
        let fraction = format!("{:03}", fraction);
        label.push(',');
        label.push_str(fraction.trim_end_matches('0'));
    }
    label
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_format_idr() {
        assert_eq!(format_idr(125000.0), "Rp 125.000");
        assert_eq!(format_idr(999.0), "Rp 999");
        assert_eq!(format_idr(1234567.0), "Rp 1.234.567");
        assert_eq!(format_idr(12.5), "Rp 12,5");
        assert_eq!(format_idr(0.0), "Rp 0");
    }

    #[test]
    fn test_from_row_tolerates_legacy_shapes() {
        let id = Uuid::new_v4();
        let row = json!({
            "id": id.to_string(),
            "name": "Hydrating Toner",
            "price": "85000",
            "is_featured": true,
            "category": "toner",
            "ingredients": "Water, Glycerin",
            "skin_type": ["Dry", "Normal"],
            "concerns": null,
            "image_url": "",
            "img": "products/toner.jpg",
        });

        let product = Product::from_row(&row).unwrap();
        assert_eq!(product.id, id);
        assert_eq!(product.price, 85000.0);
        assert!(product.featured);
        assert_eq!(product.category_name.as_deref(), Some("toner"));
        assert_eq!(product.ingredients, vec!["Water", "Glycerin"]);
        assert_eq!(product.skin_type, vec!["Dry", "Normal"]);
        assert!(product.concerns.is_empty());
        assert_eq!(product.image.as_deref(), Some("products/toner.jpg"));
    }

    #[test]
    fn test_from_row_requires_id() {
        assert!(Product::from_row(&json!({"name": "x"})).is_err());
    }

    #[test]
    fn test_link_taxonomy() {
        let category = Category {
            id: Uuid::new_v4(),
            name: "Toner".to_string(),
        };
        let skincare = ProductType {
            id: Uuid::new_v4(),
            name: "Skincare".to_string(),
            category_id: None,
        };

        let mut legacy = Product::from_row(&json!({
            "id": Uuid::new_v4().to_string(),
            "category": "TONER",
            "product_type_id": skincare.id.to_string(),
        }))
        .unwrap();
        legacy.link_taxonomy(&[category.clone()], &[skincare.clone()]);

        assert_eq!(legacy.category_id, Some(category.id));
        assert_eq!(legacy.product_type_name.as_deref(), Some("Skincare"));
    }

    #[test]
    fn test_payload_image_states() {
        let unchanged = ProductPayload::default();
        assert!(serde_json::to_value(&unchanged).unwrap().get("image").is_none());

        let removed = ProductPayload {
            image: Some(None),
            ..Default::default()
        };
        assert_eq!(serde_json::to_value(&removed).unwrap()["image"], Value::Null);
        assert!(serde_json::to_value(&removed).unwrap().get("image_url").is_none());

        let cleared = ProductPayload {
            image: Some(Some("bucket1/products/new.png".to_string())),
            image_url: Some(None),
            ..Default::default()
        };
        assert_eq!(serde_json::to_value(&cleared).unwrap()["image_url"], Value::Null);
    }
}
