//! 成分数据模型

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 安全等级
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SafetyLevel {
    #[default]
    #[serde(rename = "Aman")]
    Safe,
    #[serde(rename = "Hati-hati untuk Kulit Sensitif")]
    CautionSensitiveSkin,
    #[serde(rename = "Perlu Resep Dokter")]
    PrescriptionOnly,
}

impl SafetyLevel {
    pub const ALL: [SafetyLevel; 3] = [
        SafetyLevel::Safe,
        SafetyLevel::CautionSensitiveSkin,
        SafetyLevel::PrescriptionOnly,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            SafetyLevel::Safe => "Aman",
            SafetyLevel::CautionSensitiveSkin => "Hati-hati untuk Kulit Sensitif",
            SafetyLevel::PrescriptionOnly => "Perlu Resep Dokter",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ingredient {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub benefits: Option<String>,
    /// 存储中的原始文本，可能不在 [`SafetyLevel`] 之内
    #[serde(default)]
    pub safety_level: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl Ingredient {
    pub fn safety(&self) -> Option<SafetyLevel> {
        let raw = self.safety_level.as_deref()?;
        SafetyLevel::ALL.into_iter().find(|level| level.label() == raw)
    }
}

/// 写入 ingredients 表的内容
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngredientPayload {
    pub name: String,
    pub slug: String,
    pub description: String,
    pub benefits: String,
    /// 等级标签，旧数据中的其他文本原样写回
    pub safety_level: String,
}

/// 接口提交的成分字段，缺省的字段保持不变
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IngredientInput {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub benefits: Option<String>,
    pub safety_level: Option<SafetyLevel>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IngredientQuery {
    pub search: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_safety_level_labels_round_trip_through_rows() {
        let ingredient: Ingredient = serde_json::from_value(json!({
            "id": Uuid::new_v4().to_string(),
            "name": "Retinol",
            "slug": "retinol",
            "safety_level": "Perlu Resep Dokter",
            "created_at": "2024-01-01T00:00:00Z",
        }))
        .unwrap();

        assert_eq!(ingredient.safety(), Some(SafetyLevel::PrescriptionOnly));
        assert_eq!(
            serde_json::to_value(SafetyLevel::CautionSensitiveSkin).unwrap(),
            json!("Hati-hati untuk Kulit Sensitif")
        );
    }
}
