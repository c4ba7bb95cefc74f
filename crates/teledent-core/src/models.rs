//! 核心数据模型定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// 分类器支持的牙科疾病类别（与视觉模型的输出一一对应）
pub const DENTAL_CLASSES: [&str; 6] = [
    "Calculus",
    "Caries",
    "Gingivitis",
    "Mouth Ulcer",
    "Tooth Discoloration",
    "Hypodontia",
];

/// 患者账户信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: i64,
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// 管理员账户信息（与患者数据无关联）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Admin {
    pub id: i64,
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// 患者上传的牙齿照片
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientImage {
    pub id: i64,
    pub uuid: Uuid, // 对外暴露的唯一标识
    pub patient_id: i64,
    pub filename: String,      // 存储文件名 {uuid}{ext}
    pub original_name: String, // 上传时的原始文件名
    pub file_path: String,
    pub file_size: i64,
    pub mime_type: String,
    pub uploaded_at: DateTime<Utc>,
}

/// 一张照片的分类结果（插入后不再修改）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageAnalysis {
    pub id: i64,
    pub uuid: Uuid,
    pub image_id: i64,
    pub prediction: String,
    pub confidence: f64, // 0-1
    pub probabilities: HashMap<String, f64>,
    pub processing_time_ms: f64,
    pub explanation: ExplanationPayload,
    pub pdf_path: Option<String>,
    pub analyzed_at: DateTime<Utc>,
}

/// 渲染完成的患者报告，1:1关联一次分析
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientReport {
    pub id: i64,
    pub uuid: Uuid,
    pub patient_id: i64,
    pub analysis_id: i64,
    pub pdf_path: String,
    pub prediction: String,
    pub confidence: f64,
    pub risk_level: RiskLevel,
    pub recommendations: Vec<String>,
    pub explanation: ExplanationPayload,
    pub generated_at: DateTime<Utc>,
}

/// 置信度风险分级
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RiskLevel {
    High,
    Medium,
    Low,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::High => "High",
            RiskLevel::Medium => "Medium",
            RiskLevel::Low => "Low",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RiskLevel {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "High" | "high" => Ok(RiskLevel::High),
            "Medium" | "medium" => Ok(RiskLevel::Medium),
            "Low" | "low" => Ok(RiskLevel::Low),
            _ => Err(()),
        }
    }
}

/// 分类服务返回的原始推理结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationOutcome {
    pub label: String,
    pub confidence: f64,
    pub probabilities: HashMap<String, f64>,
    pub processing_time_ms: f64,
}

/// 单项诊断结论，用于响应和报告中的排序展示
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub condition: String,
    pub confidence_percentage: f64,
    pub level: RiskLevel,
}

/// 候选诊断（置信度低于首要结论的其余类别）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Differential {
    pub condition: String,
    pub confidence: f64, // 百分比
}

/// 解释服务产出（LLM生成或模板回退）
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExplanationPayload {
    pub condition: String,
    pub confidence_percentage: f64,
    pub risk_level: String,
    pub urgency: String,
    pub ai_generated: bool,
    pub explanation: String,
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub differential: Vec<Differential>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_level_round_trip() {
        for level in [RiskLevel::High, RiskLevel::Medium, RiskLevel::Low] {
            let parsed: RiskLevel = level.as_str().parse().unwrap();
            assert_eq!(parsed, level);
        }
        assert!("Critical".parse::<RiskLevel>().is_err());
    }

    #[test]
    fn test_risk_level_serializes_title_case() {
        let json = serde_json::to_string(&RiskLevel::High).unwrap();
        assert_eq!(json, "\"High\"");
    }
}
