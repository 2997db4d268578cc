//! 产品业务服务

use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::form::ImageUpload;
use super::list::ProductList;
use super::model::{format_idr, CreatedProduct, Product, ProductCard, ProductPayload};
use crate::app::catalog::model::find_by_name;
use crate::app::catalog::service::CatalogService;
use crate::app::images::resolver::{is_placeholder, ImageResolver};
use crate::config::StorageConfig;
use crate::core::error::CoreError;
use crate::core::sanitize::{parse_list, sanitize_text, sanitize_url};
use crate::infrastructure::backend::{Backend, BackendError, Query, Table};

#[derive(Clone)]
pub struct ProductService {
    backend: Backend,
    storage: StorageConfig,
    images: ImageResolver,
    catalog: CatalogService,
}

/// 创建接口收到的原始字段
#[derive(Debug, Clone, Default)]
pub struct CreateProductRequest {
    pub fields: HashMap<String, String>,
    pub image: Option<ImageUpload>,
}

impl CreateProductRequest {
    fn text(&self, key: &str) -> String {
        self.fields
            .get(key)
            .map(|v| v.trim().to_string())
            .unwrap_or_default()
    }

    fn optional(&self, key: &str) -> Option<String> {
        let value = self.text(key);
        (!value.is_empty()).then_some(value)
    }
}

impl ProductService {
    pub fn new(
        backend: Backend,
        storage: StorageConfig,
        images: ImageResolver,
        catalog: CatalogService,
    ) -> Self {
        Self {
            backend,
            storage,
            images,
            catalog,
        }
    }

    pub fn catalog(&self) -> &CatalogService {
        &self.catalog
    }

    /// 载入全部产品，带分类和类型名称，按创建时间倒序
    pub async fn list(&self) -> Result<ProductList, CoreError> {
        let rows = self
            .backend
            .rows
            .select(
                &Query::table(Table::Products)
                    .order_by("created_at", false)
                    .embed(Table::Categories, "category_id", &["name"])
                    .embed(Table::ProductTypes, "product_type_id", &["name"]),
            )
            .await?;

        let categories = self.catalog.categories().await?;
        let types = self.catalog.product_types(None).await?;

        let mut cards = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut product = match Product::from_row(row) {
                Ok(product) => product,
                Err(e) => {
                    warn!("跳过无法解析的产品行: {}", e);
                    continue;
                }
            };
            product.link_taxonomy(&categories, &types);
            cards.push(self.card(product).await);
        }

        Ok(ProductList::new(cards))
    }

    pub async fn card(&self, product: Product) -> ProductCard {
        let image_display = self.images.resolve(product.image.as_deref()).await;
        let price_label = format_idr(product.price);
        ProductCard {
            product,
            image_display,
            price_label,
        }
    }

    pub async fn get(&self, id: Uuid) -> Result<Product, CoreError> {
        let rows = self
            .backend
            .rows
            .select(&Query::table(Table::Products).eq("id", id.to_string()))
            .await?;

        let row = rows
            .first()
            .ok_or_else(|| CoreError::NotFound(format!("product {} not found", id)))?;
        let mut product = Product::from_row(row)?;

        if product.category_id.is_none() && product.category_name.is_some() {
            let categories = self.catalog.categories().await?;
            let types = self.catalog.product_types(None).await?;
            product.link_taxonomy(&categories, &types);
        }
        Ok(product)
    }

    pub async fn insert(&self, payload: &ProductPayload) -> Result<Uuid, CoreError> {
        let rows = self
            .backend
            .rows
            .insert(Table::Products, vec![serde_json::to_value(payload).map_err(BackendError::from)?])
            .await?;

        rows.first()
            .and_then(|row| row.get("id"))
            .and_then(Value::as_str)
            .and_then(|id| Uuid::parse_str(id).ok())
            .ok_or_else(|| CoreError::Internal("insert returned no id".to_string()))
    }

    pub async fn update(&self, id: Uuid, payload: &ProductPayload) -> Result<(), CoreError> {
        let patch = serde_json::to_value(payload).map_err(BackendError::from)?;
        self.backend.rows.update(Table::Products, id, patch).await?;
        Ok(())
    }

    /// 上传到上传桶，返回写入行的图片引用
    pub async fn upload_image(&self, upload: &ImageUpload) -> Result<String, BackendError> {
        let file_name = upload.storage_file_name(chrono::Utc::now().timestamp_millis());
        let path = format!(
            "{}/{}",
            self.storage.upload_prefix.trim_matches('/'),
            file_name
        );
        let bucket = &self.storage.upload_bucket;

        self.backend
            .storage
            .upload(bucket, &path, upload.bytes.clone(), &upload.content_type)
            .await?;
        info!("图片已上传: {}/{}", bucket, path);

        Ok(self
            .backend
            .storage
            .public_url(bucket, &path)
            .await
            .unwrap_or_else(|| format!("{}/{}", bucket, path)))
    }

    /// 尽力删除存储中的图片
    ///
    /// 占位图和无法识别存储位置的引用直接跳过，删除失败只记录日志。
    /// 返回是否发出了删除请求。
    pub async fn remove_image(&self, raw: &str) -> bool {
        if is_placeholder(raw) {
            return false;
        }
        let location = match self.images.locate(raw) {
            Some(location) => location,
            None => {
                debug!("无法识别图片位置，跳过删除: {}", raw);
                return false;
            }
        };

        if let Err(e) = self
            .backend
            .storage
            .remove(&location.bucket, vec![location.path.clone()])
            .await
        {
            warn!(
                "删除图片失败 {}/{}: {}",
                location.bucket, location.path, e
            );
        }
        true
    }

    /// 删除产品：先尽力删图，再删行
    pub async fn delete_product(&self, product: &Product) -> Result<(), CoreError> {
        if let Some(image) = &product.image {
            self.remove_image(image).await;
        }
        self.backend.rows.delete(Table::Products, product.id).await?;
        info!("产品已删除: {}", product.id);
        Ok(())
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), CoreError> {
        let product = self.get(id).await?;
        self.delete_product(&product).await
    }

    /// 切换精选标记，返回新值
    pub async fn toggle_featured(&self, id: Uuid) -> Result<bool, CoreError> {
        let product = self.get(id).await?;
        let featured = !product.featured;
        self.backend
            .rows
            .update(Table::Products, id, serde_json::json!({ "featured": featured }))
            .await?;
        Ok(featured)
    }

    /// 创建接口
    ///
    /// 先检查必填字段和价格，再确认登录，然后上传图片并写入。上传和写入失败
    /// 以 400 返回后端的提示。
    pub async fn create_from_api(
        &self,
        request: CreateProductRequest,
        signed_in: bool,
    ) -> Result<CreatedProduct, CoreError> {
        let name = {
            let name = request.text("name");
            if name.is_empty() {
                request.text("nama")
            } else {
                name
            }
        };
        let description = request.text("description");
        let price_text = request.text("price");

        if name.is_empty() || description.is_empty() || price_text.is_empty() {
            return Err(CoreError::BadRequest("Missing required fields".to_string()));
        }

        let price = match price_text.parse::<f64>() {
            Ok(price) if price.is_finite() && price >= 0.0 => price,
            _ => return Err(CoreError::BadRequest("Invalid price".to_string())),
        };

        if !signed_in {
            return Err(CoreError::Unauthorized);
        }

        let image = match request.image.as_ref().filter(|upload| !upload.bytes.is_empty()) {
            Some(upload) if !upload.is_image() => {
                return Err(CoreError::BadRequest("Invalid image type".to_string()))
            }
            Some(upload) => Some(
                self.upload_image(upload)
                    .await
                    .map_err(|e| CoreError::BadRequest(e.to_string()))?,
            ),
            None => None,
        };

        let (category_id, category) = self.resolve_category(&request).await?;

        let payload = ProductPayload {
            name: sanitize_text(&name),
            brand: request.optional("brand").map(|b| sanitize_text(&b)),
            category,
            category_id,
            product_type_id: request
                .optional("product_type_id")
                .and_then(|id| Uuid::parse_str(&id).ok()),
            price,
            featured: matches!(request.text("featured").as_str(), "true" | "1"),
            description: sanitize_text(&description),
            ingredients: parse_list(&request.text("ingredients")),
            how_to_use: request.optional("usage"),
            size: request.optional("size"),
            skin_type: request
                .fields
                .get("skin_types")
                .and_then(|raw| serde_json::from_str::<Vec<Value>>(raw).ok())
                .map(|items| {
                    items
                        .iter()
                        .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                        .collect()
                })
                .unwrap_or_default(),
            concerns: parse_list(&request.text("concerns")),
            tokopedia_url: request
                .optional("tokopedia_url")
                .map(|u| sanitize_url(&u))
                .filter(|u| !u.is_empty()),
            shopee_url: request
                .optional("shopee_url")
                .map(|u| sanitize_url(&u))
                .filter(|u| !u.is_empty()),
            image: Some(image.clone()),
            image_url: None,
        };

        let id = self.insert(&payload).await.map_err(|e| match e {
            CoreError::Backend(e) => CoreError::BadRequest(e.to_string()),
            other => other,
        })?;

        info!("产品已通过接口创建: {}", id);
        Ok(CreatedProduct { id, image })
    }

    /// `category_id` 优先，否则按旧的分类名称查找；找不到时保留文本名称
    async fn resolve_category(
        &self,
        request: &CreateProductRequest,
    ) -> Result<(Option<Uuid>, Option<String>), CoreError> {
        if let Some(id) = request
            .optional("category_id")
            .and_then(|id| Uuid::parse_str(&id).ok())
        {
            return Ok((Some(id), None));
        }

        match request.optional("category") {
            Some(name) => {
                let categories = self.catalog.categories().await?;
                match find_by_name(&categories, &name, |c| &c.name) {
                    Some(found) => Ok((Some(found.id), None)),
                    None => Ok((None, Some(sanitize_text(&name)))),
                }
            }
            None => Ok((None, None)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::products::form::ProductForm;
    use crate::app::products::list::confirm_product_delete;
    use crate::infrastructure::backend::{
        MockAuthProvider, MockObjectStorage, MockRowStore, ObjectStorage, RowStore,
    };
    use crate::infrastructure::memory::MemoryBackend;
    use serde_json::json;
    use std::sync::Arc;

    fn service_with(backend: Backend) -> ProductService {
        let storage = StorageConfig::default();
        let images = ImageResolver::new(backend.storage.clone(), storage.clone());
        let catalog = CatalogService::new(backend.clone());
        ProductService::new(backend, storage, images, catalog)
    }

    fn memory_service() -> (MemoryBackend, ProductService) {
        let memory = MemoryBackend::new("https://x.supabase.co");
        let service = service_with(memory.clone().into_backend());
        (memory, service)
    }

    fn request(fields: &[(&str, &str)]) -> CreateProductRequest {
        CreateProductRequest {
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            image: None,
        }
    }

    #[tokio::test]
    async fn test_delete_removes_item_even_when_storage_fails() {
        let id = Uuid::new_v4();

        let mut storage = MockObjectStorage::new();
        storage
            .expect_remove()
            .withf(|bucket, paths| bucket == "bucket1" && paths == &vec!["products/a.jpg".to_string()])
            .times(1)
            .returning(|_, _| {
                Err(BackendError::Api {
                    status: 403,
                    message: "permission denied".to_string(),
                })
            });
        storage.expect_public_url().returning(|_, _| None);
        storage
            .expect_signed_url()
            .returning(|_, _, _| Ok("https://signed".to_string()));

        let mut rows = MockRowStore::new();
        rows.expect_delete()
            .withf(move |table, row_id| *table == Table::Products && *row_id == id)
            .times(1)
            .returning(|_, _| Ok(()));

        let backend = Backend::new(
            Arc::new(rows),
            Arc::new(storage),
            Arc::new(MockAuthProvider::new()),
        );
        let service = service_with(backend);

        let product = Product::from_row(&json!({
            "id": id.to_string(),
            "name": "Serum",
            "image": "bucket1/products/a.jpg",
        }))
        .unwrap();
        let mut list = ProductList::new(vec![service.card(product).await]);

        list.request_delete(id).unwrap();
        let deleted = confirm_product_delete(&mut list, &service)
            .await
            .unwrap();

        assert_eq!(deleted, Some(id));
        assert!(list.is_empty());
    }

    #[tokio::test]
    async fn test_failed_row_delete_keeps_item() {
        let id = Uuid::new_v4();

        let mut rows = MockRowStore::new();
        rows.expect_delete().times(1).returning(|table, id| {
            Err(BackendError::NotFound {
                table: table.as_str(),
                id,
            })
        });

        let mut storage = MockObjectStorage::new();
        storage.expect_remove().never();

        let backend = Backend::new(
            Arc::new(rows),
            Arc::new(storage),
            Arc::new(MockAuthProvider::new()),
        );
        let service = service_with(backend);

        let product = Product::from_row(&json!({
            "id": id.to_string(),
            "name": "Serum",
            "image": "https://placehold.co/600x400?text=No+Image",
        }))
        .unwrap();
        let card = ProductCard {
            image_display: service.images.placeholder(),
            price_label: format_idr(product.price),
            product,
        };
        let mut list = ProductList::new(vec![card]);

        list.request_delete(id).unwrap();
        let result = confirm_product_delete(&mut list, &service).await;

        assert!(result.is_err());
        assert_eq!(list.len(), 1);
        assert!(list.error().is_some());
    }

    #[tokio::test]
    async fn test_create_from_api_checks_in_order() {
        let (_, service) = memory_service();

        let err = service
            .create_from_api(request(&[("name", "Serum"), ("price", "10")]), true)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Missing required fields");

        let err = service
            .create_from_api(
                request(&[("name", "Serum"), ("description", "d"), ("price", "-1")]),
                true,
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid price");

        let err = service
            .create_from_api(
                request(&[("name", "Serum"), ("description", "d"), ("price", "10")]),
                false,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Unauthorized));
    }

    #[tokio::test]
    async fn test_create_from_api_uploads_image_and_resolves_legacy_category() {
        let (memory, service) = memory_service();
        let (toner, _) = service.catalog().add_category("Toner").await.unwrap();

        let mut req = request(&[
            ("nama", "Hydrating Toner"),
            ("description", "Fresh"),
            ("price", "85000"),
            ("category", "toner"),
            ("featured", "1"),
            ("ingredients", "Water, Glycerin"),
            ("skin_types", r#"["Dry","Normal"]"#),
        ]);
        req.image = Some(ImageUpload {
            file_name: "toner.png".to_string(),
            content_type: "image/png".to_string(),
            bytes: vec![1, 2, 3],
        });

        let created = service.create_from_api(req, true).await.unwrap();
        let image = created.image.clone().unwrap();
        assert!(image.starts_with("https://x.supabase.co/storage/v1/object/public/bucket1/products/"));
        assert_eq!(memory.object_paths("bucket1").len(), 1);

        let product = service.get(created.id).await.unwrap();
        assert_eq!(product.category_id, Some(toner.id));
        assert!(product.featured);
        assert_eq!(product.ingredients, vec!["Water", "Glycerin"]);
        assert_eq!(product.skin_type, vec!["Dry", "Normal"]);
    }

    #[tokio::test]
    async fn test_create_from_api_rejects_non_image_upload() {
        let (memory, service) = memory_service();
        let mut req = request(&[("name", "Serum"), ("description", "d"), ("price", "10")]);
        req.image = Some(ImageUpload {
            file_name: "notes.txt".to_string(),
            content_type: "text/plain".to_string(),
            bytes: vec![1],
        });

        let err = service.create_from_api(req, true).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid image type");
        assert!(memory.object_paths("bucket1").is_empty());
    }

    #[tokio::test]
    async fn test_edit_replaces_image_and_removes_old_object() {
        let (memory, service) = memory_service();
        memory
            .upload("bucket1", "products/old.jpg", vec![1], "image/jpeg")
            .await
            .unwrap();
        let (category, _) = service.catalog().add_category("Serum").await.unwrap();

        let id = service
            .insert(&ProductPayload {
                name: "Serum".to_string(),
                brand: Some("Glow".to_string()),
                category_id: Some(category.id),
                price: 100000.0,
                description: "Bright".to_string(),
                image: Some(Some("bucket1/products/old.jpg".to_string())),
                ..Default::default()
            })
            .await
            .unwrap();

        let product = service.get(id).await.unwrap();
        let mut form = ProductForm::edit(&product);
        form.set_image(ImageUpload {
            file_name: "new.webp".to_string(),
            content_type: "image/webp".to_string(),
            bytes: vec![9, 9],
        });

        let outcome = form.submit(&service).await.unwrap();
        assert_eq!(outcome.message, "Produk berhasil diperbarui");
        assert_eq!(outcome.delay_ms, 1200);
        assert!(!form.is_loading());

        assert!(!memory.has_object("bucket1", "products/old.jpg"));
        let paths = memory.object_paths("bucket1");
        assert_eq!(paths.len(), 1);
        assert!(paths[0].ends_with(".webp"));

        let updated = service.get(id).await.unwrap();
        assert!(updated.image.unwrap().ends_with(&paths[0]));
    }

    #[tokio::test]
    async fn test_edit_legacy_image_url_row() {
        let (memory, service) = memory_service();
        memory
            .upload("bucket1", "products/old.jpg", vec![1], "image/jpeg")
            .await
            .unwrap();
        let (category, _) = service.catalog().add_category("Serum").await.unwrap();

        let rows = memory
            .insert(
                Table::Products,
                vec![json!({
                    "name": "Serum",
                    "brand": "Glow",
                    "category_id": category.id.to_string(),
                    "price": 100000,
                    "description": "Bright",
                    "image_url": "bucket1/products/old.jpg",
                })],
            )
            .await
            .unwrap();
        let id = Uuid::parse_str(rows[0]["id"].as_str().unwrap()).unwrap();

        let product = service.get(id).await.unwrap();
        assert_eq!(product.image.as_deref(), Some("bucket1/products/old.jpg"));

        let mut form = ProductForm::edit(&product);
        form.set_image(ImageUpload {
            file_name: "new.png".to_string(),
            content_type: "image/png".to_string(),
            bytes: vec![7],
        });
        form.submit(&service).await.unwrap();

        assert!(!memory.has_object("bucket1", "products/old.jpg"));
        let paths = memory.object_paths("bucket1");
        assert_eq!(paths.len(), 1);

        let updated = service.get(id).await.unwrap();
        let image = updated.image.clone().unwrap();
        assert!(image.ends_with(&paths[0]));
        let shown = service.images.resolve(updated.image.as_deref()).await;
        assert!(!is_placeholder(&shown.url));

        let mut form = ProductForm::edit(&updated);
        form.remove_image();
        form.submit(&service).await.unwrap();
        assert_eq!(service.get(id).await.unwrap().image, None);
    }

    #[tokio::test]
    async fn test_failed_submit_keeps_form_values() {
        let (_, service) = memory_service();
        let mut form = ProductForm::new();
        form.fields.name = "Serum".to_string();

        assert!(form.submit(&service).await.is_err());
        assert_eq!(form.fields.name, "Serum");
        assert!(form.error().unwrap().contains("Brand wajib diisi"));
        assert!(!form.is_loading());
    }

    #[tokio::test]
    async fn test_toggle_featured() {
        let (_, service) = memory_service();
        let id = service
            .insert(&ProductPayload {
                name: "Serum".to_string(),
                description: "d".to_string(),
                price: 1.0,
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(service.toggle_featured(id).await.unwrap());
        assert!(!service.toggle_featured(id).await.unwrap());
    }
}
