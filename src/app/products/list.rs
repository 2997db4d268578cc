//! 产品列表

use uuid::Uuid;

use super::model::{ProductCard, ProductFilter};
use super::service::ProductService;
use crate::app::list::{contains_ci, ListView, Listed};
use crate::core::error::CoreError;

pub type ProductList = ListView<ProductCard>;

impl Listed for ProductCard {
    fn id(&self) -> Uuid {
        self.product.id
    }

    fn matches(&self, needle: &str) -> bool {
        let p = &self.product;
        contains_ci(Some(&p.name), needle)
            || contains_ci(p.brand.as_deref(), needle)
            || contains_ci(p.category_name.as_deref(), needle)
            || contains_ci(p.product_type_name.as_deref(), needle)
    }
}

/// 搜索词、分类和精选条件同时生效
pub fn filter_products<'a>(list: &'a ProductList, filter: &ProductFilter) -> Vec<&'a ProductCard> {
    list.search(filter.search.as_deref().unwrap_or_default())
        .into_iter()
        .filter(|card| {
            filter
                .category_id
                .map_or(true, |id| card.product.category_id == Some(id))
        })
        .filter(|card| {
            filter
                .featured
                .map_or(true, |featured| card.product.featured == featured)
        })
        .collect()
}

/// 确认删除待删产品
///
/// 存储删除失败不影响后续步骤，行删除成功后产品即从列表移除。
pub async fn confirm_product_delete(
    list: &mut ProductList,
    service: &ProductService,
) -> Result<Option<Uuid>, CoreError> {
    list.confirm_delete(|card| {
        let service = service.clone();
        let product = card.product.clone();
        async move { service.delete_product(&product).await }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::images::resolver::{ImageSource, ResolvedImage};
    use crate::app::products::model::{format_idr, Product};
    use serde_json::json;

    fn card(name: &str, brand: &str, category: &str, featured: bool) -> ProductCard {
        let product = Product::from_row(&json!({
            "id": Uuid::new_v4().to_string(),
            "name": name,
            "brand": brand,
            "category": category,
            "featured": featured,
            "price": 125000,
        }))
        .unwrap();
        ProductCard {
            price_label: format_idr(product.price),
            image_display: ResolvedImage {
                url: "https://placehold.co/600x400?text=No+Image".to_string(),
                source: ImageSource::Placeholder,
            },
            product,
        }
    }

    #[test]
    fn test_search_covers_brand_and_category() {
        let list = ProductList::new(vec![
            card("Vitamin C Serum", "Glow", "Serum", true),
            card("Gentle Wash", "Pure", "Cleanser", false),
        ]);

        let by_brand = ProductFilter {
            search: Some("PURE".to_string()),
            ..Default::default()
        };
        assert_eq!(filter_products(&list, &by_brand).len(), 1);

        let by_category = ProductFilter {
            search: Some("serum".to_string()),
            ..Default::default()
        };
        assert_eq!(filter_products(&list, &by_category)[0].product.name, "Vitamin C Serum");

        let featured = ProductFilter {
            featured: Some(true),
            ..Default::default()
        };
        assert_eq!(filter_products(&list, &featured).len(), 1);
        assert_eq!(list.items()[0].price_label, "Rp 125.000");
    }
}
