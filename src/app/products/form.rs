//! 产品表单
//!
//! 保存字段、计算完成度、提交前校验。校验不发起任何网络请求，
//! 提交时依次上传图片、写入行；任何一步失败都保留表单内容。

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::model::{Product, ProductPayload};
use super::service::ProductService;
use crate::app::catalog::model::{Category, ProductType};
use crate::app::catalog::service::CatalogService;
use crate::app::FormMode;
use crate::core::error::{validation_messages, CoreError};
use crate::core::response::SubmitOutcome;
use crate::core::sanitize::{parse_list, sanitize_string_array, sanitize_text, sanitize_url};

pub const SKIN_TYPE_OPTIONS: [&str; 6] = [
    "Normal",
    "Combination",
    "Dry",
    "Sensitive",
    "Oily",
    "Acne-prone",
];

pub const CONCERN_OPTIONS: [&str; 10] = [
    "Acne",
    "Dullness",
    "Large Pores",
    "Wrinkles",
    "Aging",
    "Fine Lines",
    "Dark Spots",
    "Hyperpigmentation",
    "Redness",
    "Uneven Skin Tone",
];

pub const PRODUCT_LIST_ROUTE: &str = "/dashboard/products";
pub const PRODUCT_REDIRECT_DELAY_MS: u64 = 1200;

/// 完成度统计的检查项个数
const PROGRESS_CHECKS: usize = 14;

/// 校验提示的排列顺序
const FIELD_ORDER: [&str; 7] = [
    "name",
    "brand",
    "category_id",
    "description",
    "price",
    "tokopedia_url",
    "shopee_url",
];

fn validate_price(price: &str) -> Result<(), ValidationError> {
    match price.trim().parse::<f64>() {
        Ok(value) if value.is_finite() && value > 0.0 => Ok(()),
        _ => {
            let mut err = ValidationError::new("price");
            err.message = Some("Harga harus angka > 0".into());
            Err(err)
        }
    }
}

fn check_marketplace_url(raw: &str, message: &'static str) -> Result<(), ValidationError> {
    if raw.trim().is_empty() || !sanitize_url(raw).is_empty() {
        return Ok(());
    }
    let mut err = ValidationError::new("url");
    err.message = Some(message.into());
    Err(err)
}

fn validate_tokopedia_url(raw: &str) -> Result<(), ValidationError> {
    check_marketplace_url(raw, "URL Tokopedia tidak valid")
}

fn validate_shopee_url(raw: &str) -> Result<(), ValidationError> {
    check_marketplace_url(raw, "URL Shopee tidak valid")
}

/// 表单文本字段，保持用户输入的原样
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ProductFields {
    #[validate(length(min = 1, message = "Nama wajib diisi"))]
    pub name: String,
    #[validate(length(min = 1, message = "Brand wajib diisi"))]
    pub brand: String,
    #[validate(length(min = 1, message = "Kategori wajib diisi"))]
    pub category_id: String,
    pub product_type_id: String,
    #[validate(custom(function = "validate_price"))]
    pub price: String,
    pub featured: bool,
    #[validate(length(min = 1, message = "Deskripsi wajib diisi"))]
    pub description: String,
    pub ingredients: String,
    pub usage: String,
    pub size: String,
    #[validate(custom(function = "validate_tokopedia_url"))]
    pub tokopedia_url: String,
    #[validate(custom(function = "validate_shopee_url"))]
    pub shopee_url: String,
}

impl ProductFields {
    /// 去掉标签和首尾空白后的副本
    pub fn sanitized(&self) -> Self {
        Self {
            name: sanitize_text(&self.name),
            brand: sanitize_text(&self.brand),
            category_id: self.category_id.trim().to_string(),
            product_type_id: self.product_type_id.trim().to_string(),
            price: self.price.trim().to_string(),
            featured: self.featured,
            description: sanitize_text(&self.description),
            ingredients: sanitize_text(&self.ingredients),
            usage: sanitize_text(&self.usage),
            size: sanitize_text(&self.size),
            tokopedia_url: sanitize_text(&self.tokopedia_url),
            shopee_url: sanitize_text(&self.shopee_url),
        }
    }
}

/// 待上传的图片
#[derive(Debug, Clone, PartialEq)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    pub fn is_image(&self) -> bool {
        self.content_type.starts_with("image/")
    }

    /// 扩展名，没有时为 jpg
    pub fn extension(&self) -> &str {
        match self.file_name.rsplit_once('.') {
            Some((_, ext)) if !ext.is_empty() => ext,
            _ => "jpg",
        }
    }

    /// 存储中的文件名：`<毫秒时间戳>-<6 位 base36>.<扩展名>`
    pub fn storage_file_name(&self, now_millis: i64) -> String {
        const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
        let mut rng = rand::thread_rng();
        let suffix: String = (0..6)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        format!("{}-{}.{}", now_millis, suffix, self.extension())
    }
}

/// 表单可选项
#[derive(Debug, Clone, Serialize)]
pub struct FormOptions {
    pub skin_types: &'static [&'static str],
    pub concerns: &'static [&'static str],
    pub categories: Vec<Category>,
    pub product_types: Vec<ProductType>,
}

impl FormOptions {
    pub async fn load(catalog: &CatalogService) -> Result<Self, CoreError> {
        Ok(Self {
            skin_types: &SKIN_TYPE_OPTIONS,
            concerns: &CONCERN_OPTIONS,
            categories: catalog.categories().await?,
            product_types: catalog.product_types(None).await?,
        })
    }
}

/// 表单校验通过后的内容
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedProduct {
    pub fields: ProductFields,
    pub price: f64,
    pub category_id: Option<Uuid>,
    pub product_type_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct ProductForm {
    mode: FormMode,
    pub fields: ProductFields,
    pub skin_types: Vec<String>,
    pub concerns: Vec<String>,
    new_image: Option<ImageUpload>,
    existing_image: Option<String>,
    /// 编辑模式下用户移除了原图
    image_removed: bool,
    loading: bool,
    error: Option<String>,
    success: Option<String>,
}

fn toggle(list: &mut Vec<String>, value: &str) {
    match list.iter().position(|v| v == value) {
        Some(index) => {
            list.remove(index);
        }
        None => list.push(value.to_string()),
    }
}

fn parse_uuid(raw: &str, message: &str) -> Result<Option<Uuid>, CoreError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    Uuid::parse_str(raw)
        .map(Some)
        .map_err(|_| CoreError::Validation(vec![message.to_string()]))
}

fn optional(text: &str) -> Option<String> {
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

impl Default for ProductForm {
    fn default() -> Self {
        Self::new()
    }
}

impl ProductForm {
    pub fn new() -> Self {
        Self {
            mode: FormMode::Create,
            fields: ProductFields::default(),
            skin_types: Vec::new(),
            concerns: Vec::new(),
            new_image: None,
            existing_image: None,
            image_removed: false,
            loading: false,
            error: None,
            success: None,
        }
    }

    /// 用已有产品填充编辑表单
    pub fn edit(product: &Product) -> Self {
        let fields = ProductFields {
            name: product.name.clone(),
            brand: product.brand.clone().unwrap_or_default(),
            category_id: product.category_id.map(|id| id.to_string()).unwrap_or_default(),
            product_type_id: product
                .product_type_id
                .map(|id| id.to_string())
                .unwrap_or_default(),
            price: if product.price > 0.0 {
                product.price.to_string()
            } else {
                String::new()
            },
            featured: product.featured,
            description: product.description.clone().unwrap_or_default(),
            ingredients: product.ingredients.join(", "),
            usage: product.how_to_use.clone().unwrap_or_default(),
            size: product.size.clone().unwrap_or_default(),
            tokopedia_url: product.tokopedia_url.clone().unwrap_or_default(),
            shopee_url: product.shopee_url.clone().unwrap_or_default(),
        };

        Self {
            mode: FormMode::Edit(product.id),
            fields,
            skin_types: product.skin_type.clone(),
            concerns: product.concerns.clone(),
            existing_image: product.image.clone(),
            ..Self::new()
        }
    }

    pub fn mode(&self) -> FormMode {
        self.mode
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

    pub fn existing_image(&self) -> Option<&str> {
        self.existing_image.as_deref()
    }

    pub fn new_image(&self) -> Option<&ImageUpload> {
        self.new_image.as_ref()
    }

    pub fn set_image(&mut self, upload: ImageUpload) {
        self.new_image = Some(upload);
    }

    /// 清掉新选的图片和原图
    pub fn remove_image(&mut self) {
        self.new_image = None;
        if self.existing_image.take().is_some() {
            self.image_removed = true;
        }
    }

    pub fn toggle_skin_type(&mut self, value: &str) {
        toggle(&mut self.skin_types, value);
    }

    pub fn toggle_concern(&mut self, value: &str) {
        toggle(&mut self.concerns, value);
    }

    /// 用 `name=value` 形式的输入覆盖字段，未出现的字段保持不变
    pub fn apply_fields(&mut self, values: &HashMap<String, String>) {
        let fields = &mut self.fields;
        for (key, value) in values {
            match key.as_str() {
                "name" | "nama" => fields.name = value.clone(),
                "brand" => fields.brand = value.clone(),
                "category_id" => fields.category_id = value.clone(),
                "product_type_id" => fields.product_type_id = value.clone(),
                "price" => fields.price = value.clone(),
                "featured" => fields.featured = matches!(value.trim(), "true" | "1"),
                "description" => fields.description = value.clone(),
                "ingredients" => fields.ingredients = value.clone(),
                "usage" | "how_to_use" => fields.usage = value.clone(),
                "size" => fields.size = value.clone(),
                "tokopedia_url" => fields.tokopedia_url = value.clone(),
                "shopee_url" => fields.shopee_url = value.clone(),
                "skin_types" => self.skin_types = parse_list(value),
                "concerns" => self.concerns = parse_list(value),
                "remove_image" if matches!(value.trim(), "true" | "1") => {
                    self.new_image = None;
                    if self.existing_image.take().is_some() {
                        self.image_removed = true;
                    }
                }
                _ => {}
            }
        }
    }

    /// 完成度百分比
    pub fn progress(&self) -> u8 {
        let f = &self.fields;
        let filled = [
            &f.name,
            &f.brand,
            &f.category_id,
            &f.product_type_id,
            &f.price,
            &f.description,
            &f.ingredients,
        ]
        .iter()
        .filter(|v| !v.trim().is_empty())
        .count()
            + usize::from(!self.skin_types.is_empty())
            + usize::from(!self.concerns.is_empty())
            + [&f.usage, &f.size, &f.tokopedia_url, &f.shopee_url]
                .iter()
                .filter(|v| !v.trim().is_empty())
                .count()
            + usize::from(self.new_image.is_some() || self.existing_image.is_some());

        ((filled as f64 / PROGRESS_CHECKS as f64) * 100.0).round() as u8
    }

    /// 本地校验，全部提示按字段顺序用 ` • ` 连接
    pub fn validate(&self) -> Result<ValidatedProduct, CoreError> {
        let fields = self.fields.sanitized();
        if let Err(errors) = fields.validate() {
            return Err(CoreError::Validation(validation_messages(
                &errors,
                &FIELD_ORDER,
            )));
        }

        let price = fields
            .price
            .parse::<f64>()
            .map_err(|_| CoreError::Validation(vec!["Harga harus angka > 0".to_string()]))?;
        let category_id = parse_uuid(&fields.category_id, "Kategori tidak valid")?;
        let product_type_id = parse_uuid(&fields.product_type_id, "Tipe produk tidak valid")?;

        Ok(ValidatedProduct {
            fields,
            price,
            category_id,
            product_type_id,
        })
    }

    /// 校验提示列表，通过时为空
    pub fn errors(&self) -> Vec<String> {
        match self.validate() {
            Ok(_) => Vec::new(),
            Err(CoreError::Validation(messages)) => messages,
            Err(other) => vec![other.to_string()],
        }
    }

    fn payload(&self, valid: &ValidatedProduct, image: Option<Option<String>>) -> ProductPayload {
        let f = &valid.fields;
        let image_url = match self.mode {
            FormMode::Edit(_) if image.is_some() => Some(None),
            _ => None,
        };
        ProductPayload {
            name: f.name.clone(),
            brand: optional(&f.brand),
            category: None,
            category_id: valid.category_id,
            product_type_id: valid.product_type_id,
            price: valid.price,
            featured: f.featured,
            description: f.description.clone(),
            ingredients: parse_list(&f.ingredients),
            how_to_use: optional(&f.usage),
            size: optional(&f.size),
            skin_type: sanitize_string_array(&self.skin_types),
            concerns: sanitize_string_array(&self.concerns),
            tokopedia_url: optional(&sanitize_url(&f.tokopedia_url)),
            shopee_url: optional(&sanitize_url(&f.shopee_url)),
            image,
            image_url,
        }
    }

    /// 提交表单
    pub async fn submit(&mut self, service: &ProductService) -> Result<SubmitOutcome, CoreError> {
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

    async fn save(&self, service: &ProductService) -> Result<SubmitOutcome, CoreError> {
        let valid = self.validate()?;

        let uploaded = match &self.new_image {
            Some(upload) => Some(service.upload_image(upload).await?),
            None => None,
        };

        match self.mode {
            FormMode::Create => {
                let payload = self.payload(&valid, Some(uploaded));
                let id = service.insert(&payload).await?;
                info!("产品已创建: {}", id);
                Ok(SubmitOutcome {
                    id,
                    message: "Produk berhasil dibuat".to_string(),
                    redirect: PRODUCT_LIST_ROUTE.to_string(),
                    delay_ms: PRODUCT_REDIRECT_DELAY_MS,
                })
            }
            FormMode::Edit(id) => {
                let image = match uploaded {
                    Some(url) => Some(Some(url)),
                    None if self.image_removed => Some(None),
                    None => None,
                };
                let replaced = image.is_some() && self.new_image.is_some();

                service.update(id, &self.payload(&valid, image)).await?;

                if replaced {
                    if let Some(old) = &self.existing_image {
                        service.remove_image(old).await;
                    }
                }
                info!("产品已更新: {}", id);
                Ok(SubmitOutcome {
                    id,
                    message: "Produk berhasil diperbarui".to_string(),
                    redirect: PRODUCT_LIST_ROUTE.to_string(),
                    delay_ms: PRODUCT_REDIRECT_DELAY_MS,
                })
            }
        }
    }

    /// 在表单内新增分类并选中
    pub async fn add_category(
        &mut self,
        catalog: &CatalogService,
        name: &str,
    ) -> Result<Category, CoreError> {
        let (category, created) = catalog.add_category(name).await.map_err(|e| {
            warn!("新增分类失败: {}", e);
            e
        })?;
        if !created {
            info!("分类已存在，直接选中: {}", category.name);
        }
        self.fields.category_id = category.id.to_string();
        Ok(category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled_form() -> ProductForm {
        let mut form = ProductForm::new();
        form.fields = ProductFields {
            name: "Vitamin C Serum".to_string(),
            brand: "Glow".to_string(),
            category_id: Uuid::new_v4().to_string(),
            price: "125000".to_string(),
            description: "Brightening serum".to_string(),
            ..Default::default()
        };
        form
    }

    #[test]
    fn test_price_validator() {
        assert!(validate_price("125000").is_ok());
        assert!(validate_price(" 0.5 ").is_ok());
        for bad in ["0", "-5", "abc", "", "inf", "NaN"] {
            assert!(validate_price(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_marketplace_url_validator() {
        assert!(validate_tokopedia_url("").is_ok());
        assert!(validate_tokopedia_url("https://tokopedia.com/glow/serum").is_ok());
        assert!(validate_shopee_url("http://shopee.co.id/x").is_ok());
        assert!(validate_shopee_url("ftp://shopee.co.id/x").is_err());
        assert!(validate_shopee_url("shopee.co.id/x").is_err());
    }

    #[test]
    fn test_validate_joins_messages_in_field_order() {
        let mut form = ProductForm::new();
        form.fields.price = "abc".to_string();
        form.fields.shopee_url = "not a url".to_string();

        let err = form.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Nama wajib diisi • Brand wajib diisi • Kategori wajib diisi • \
             Deskripsi wajib diisi • Harga harus angka > 0 • URL Shopee tidak valid"
        );
    }

    #[test]
    fn test_validate_sanitizes_before_checking() {
        let mut form = filled_form();
        form.fields.name = "  <b></b> ".to_string();
        assert_eq!(form.errors(), vec!["Nama wajib diisi".to_string()]);

        form.fields.name = " <i>Serum</i> ".to_string();
        let valid = form.validate().unwrap();
        assert_eq!(valid.fields.name, "Serum");
        assert_eq!(valid.price, 125000.0);
    }

    #[test]
    fn test_progress_counts_fourteen_checks() {
        let mut form = ProductForm::new();
        assert_eq!(form.progress(), 0);

        form.fields.name = "Serum".to_string();
        assert_eq!(form.progress(), 7);

        let mut form = filled_form();
        assert_eq!(form.progress(), 36);

        form.toggle_skin_type("Dry");
        form.toggle_concern("Acne");
        form.set_image(ImageUpload {
            file_name: "a.png".to_string(),
            content_type: "image/png".to_string(),
            bytes: vec![1],
        });
        assert_eq!(form.progress(), 57);

        form.toggle_skin_type("Dry");
        assert_eq!(form.progress(), 50);
    }

    #[test]
    fn test_storage_file_name() {
        let upload = ImageUpload {
            file_name: "photo.PNG".to_string(),
            content_type: "image/png".to_string(),
            bytes: vec![],
        };
        let name = upload.storage_file_name(1700000000000);
        let (stem, ext) = name.rsplit_once('.').unwrap();
        assert_eq!(ext, "PNG");
        let (millis, suffix) = stem.split_once('-').unwrap();
        assert_eq!(millis, "1700000000000");
        assert_eq!(suffix.len(), 6);
        assert!(suffix.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));

        let bare = ImageUpload {
            file_name: "photo".to_string(),
            ..upload
        };
        assert_eq!(bare.extension(), "jpg");
    }

    #[test]
    fn test_apply_fields_and_remove_image() {
        let product = Product::from_row(&serde_json::json!({
            "id": Uuid::new_v4().to_string(),
            "name": "Toner",
            "price": 50000,
            "ingredients": ["Water", "Glycerin"],
            "image": "products/old.jpg",
        }))
        .unwrap();

        let mut form = ProductForm::edit(&product);
        assert_eq!(form.fields.ingredients, "Water, Glycerin");
        assert_eq!(form.fields.price, "50000");
        assert_eq!(form.existing_image(), Some("products/old.jpg"));

        let values = HashMap::from([
            ("nama".to_string(), "Toner Plus".to_string()),
            ("featured".to_string(), "1".to_string()),
            ("concerns".to_string(), r#"["Redness"]"#.to_string()),
            ("remove_image".to_string(), "true".to_string()),
        ]);
        form.apply_fields(&values);

        assert_eq!(form.fields.name, "Toner Plus");
        assert!(form.fields.featured);
        assert_eq!(form.concerns, vec!["Redness"]);
        assert_eq!(form.existing_image(), None);
        assert!(form.image_removed);
    }
}
