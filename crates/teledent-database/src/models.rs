//! 数据库模型

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::FromRow;
use std::collections::HashMap;
use teledent_core::models::*;
use uuid::Uuid;

// 数据库表模型 - 使用FromRow trait用于SQL查询

/// 数据库患者表
#[derive(Debug, FromRow)]
pub struct DbPatient {
    pub id: i64,
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<DbPatient> for Patient {
    fn from(db_patient: DbPatient) -> Self {
        Patient {
            id: db_patient.id,
            email: db_patient.email,
            username: db_patient.username,
            password_hash: db_patient.password_hash,
            is_active: db_patient.is_active,
            created_at: db_patient.created_at,
        }
    }
}

/// 数据库管理员表
#[derive(Debug, FromRow)]
pub struct DbAdmin {
    pub id: i64,
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl From<DbAdmin> for Admin {
    fn from(db_admin: DbAdmin) -> Self {
        Admin {
            id: db_admin.id,
            email: db_admin.email,
            username: db_admin.username,
            password_hash: db_admin.password_hash,
            created_at: db_admin.created_at,
        }
    }
}

/// 数据库影像表
#[derive(Debug, FromRow)]
pub struct DbPatientImage {
    pub id: i64,
    pub uuid: Uuid,
    pub patient_id: i64,
    pub filename: String,
    pub original_name: String,
    pub file_path: String,
    pub file_size: i64,
    pub mime_type: String,
    pub uploaded_at: DateTime<Utc>,
}

impl From<DbPatientImage> for PatientImage {
    fn from(db_image: DbPatientImage) -> Self {
        PatientImage {
            id: db_image.id,
            uuid: db_image.uuid,
            patient_id: db_image.patient_id,
            filename: db_image.filename,
            original_name: db_image.original_name,
            file_path: db_image.file_path,
            file_size: db_image.file_size,
            mime_type: db_image.mime_type,
            uploaded_at: db_image.uploaded_at,
        }
    }
}

/// 数据库分析表
///
/// probabilities与explanation以JSONB存储，转换时解析为领域类型。
#[derive(Debug, FromRow)]
pub struct DbImageAnalysis {
    pub id: i64,
    pub uuid: Uuid,
    pub image_id: i64,
    pub prediction: String,
    pub confidence: f64,
    pub probabilities: Value,
    pub processing_time_ms: f64,
    pub explanation: Value,
    pub pdf_path: Option<String>,
    pub analyzed_at: DateTime<Utc>,
}

impl From<DbImageAnalysis> for ImageAnalysis {
    fn from(db_analysis: DbImageAnalysis) -> Self {
        ImageAnalysis {
            id: db_analysis.id,
            uuid: db_analysis.uuid,
            image_id: db_analysis.image_id,
            prediction: db_analysis.prediction,
            confidence: db_analysis.confidence,
            probabilities: decode_json(db_analysis.probabilities),
            processing_time_ms: db_analysis.processing_time_ms,
            explanation: decode_json(db_analysis.explanation),
            pdf_path: db_analysis.pdf_path,
            analyzed_at: db_analysis.analyzed_at,
        }
    }
}

/// 数据库报告表
#[derive(Debug, FromRow)]
pub struct DbPatientReport {
    pub id: i64,
    pub uuid: Uuid,
    pub patient_id: i64,
    pub analysis_id: i64,
    pub pdf_path: String,
    pub prediction: String,
    pub confidence: f64,
    pub risk_level: String, // 存储为字符串，转换为RiskLevel枚举
    pub recommendations: Value,
    pub explanation: Value,
    pub generated_at: DateTime<Utc>,
}

impl From<DbPatientReport> for PatientReport {
    fn from(db_report: DbPatientReport) -> Self {
        PatientReport {
            id: db_report.id,
            uuid: db_report.uuid,
            patient_id: db_report.patient_id,
            analysis_id: db_report.analysis_id,
            pdf_path: db_report.pdf_path,
            prediction: db_report.prediction,
            confidence: db_report.confidence,
            risk_level: db_report.risk_level.parse().unwrap_or(RiskLevel::Low),
            recommendations: decode_json(db_report.recommendations),
            explanation: decode_json(db_report.explanation),
            generated_at: db_report.generated_at,
        }
    }
}

/// JSONB列解码，历史数据不合法时退回默认值
fn decode_json<T: serde::de::DeserializeOwned + Default>(value: Value) -> T {
    serde_json::from_value(value).unwrap_or_default()
}

// 插入模型 - 用于创建新记录

/// 新患者插入模型
#[derive(Debug)]
pub struct NewPatient {
    pub email: String,
    pub username: String,
    pub password_hash: String,
}

/// 新管理员插入模型
#[derive(Debug)]
pub struct NewAdmin {
    pub email: String,
    pub username: String,
    pub password_hash: String,
}

/// 新影像插入模型
#[derive(Debug)]
pub struct NewPatientImage {
    pub uuid: Uuid,
    pub patient_id: i64,
    pub filename: String,
    pub original_name: String,
    pub file_path: String,
    pub file_size: i64,
    pub mime_type: String,
}

/// 新分析插入模型
///
/// image_id由流水线事务在影像行落库后填充，因此不在此处出现。
#[derive(Debug)]
pub struct NewImageAnalysis {
    pub uuid: Uuid,
    pub prediction: String,
    pub confidence: f64,
    pub probabilities: HashMap<String, f64>,
    pub processing_time_ms: f64,
    pub explanation: ExplanationPayload,
    pub pdf_path: Option<String>,
}

/// 新报告插入模型
///
/// analysis_id同样由流水线事务填充。
#[derive(Debug)]
pub struct NewPatientReport {
    pub uuid: Uuid,
    pub patient_id: i64,
    pub pdf_path: String,
    pub prediction: String,
    pub confidence: f64,
    pub risk_level: RiskLevel,
    pub recommendations: Vec<String>,
    pub explanation: ExplanationPayload,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_report_conversion_decodes_jsonb() {
        let db_report = DbPatientReport {
            id: 1,
            uuid: Uuid::new_v4(),
            patient_id: 7,
            analysis_id: 3,
            pdf_path: "reports/report_x.pdf".to_string(),
            prediction: "Caries".to_string(),
            confidence: 0.83,
            risk_level: "High".to_string(),
            recommendations: json!(["Visit dentist for examination"]),
            explanation: json!({
                "condition": "Caries",
                "confidence_percentage": 83.0,
                "risk_level": "High",
                "urgency": "See a dentist within a week",
                "ai_generated": false,
                "explanation": "text",
                "recommendations": ["Visit dentist for examination"]
            }),
            generated_at: Utc::now(),
        };

        let report: PatientReport = db_report.into();
        assert_eq!(report.risk_level, RiskLevel::High);
        assert_eq!(report.recommendations.len(), 1);
        assert_eq!(report.explanation.condition, "Caries");
    }

    #[test]
    fn test_analysis_conversion_tolerates_bad_payload() {
        let db_analysis = DbImageAnalysis {
            id: 1,
            uuid: Uuid::new_v4(),
            image_id: 2,
            prediction: "Gingivitis".to_string(),
            confidence: 0.6,
            probabilities: json!("not a map"),
            processing_time_ms: 120.0,
            explanation: json!(42),
            pdf_path: None,
            analyzed_at: Utc::now(),
        };

        let analysis: ImageAnalysis = db_analysis.into();
        assert!(analysis.probabilities.is_empty());
        assert!(analysis.explanation.explanation.is_empty());
    }
}
