//! 患者路由处理器
//!
//! 注册/登录、上传-分类-解释-报告流水线，以及只限本人数据的检索端点。

use axum::{
    body::Body,
    extract::{Multipart, Path, State},
    http::{header, HeaderMap},
    response::{Json, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use teledent_core::utils::{confidence_tier, file_extension, ranked_findings, round_pct};
use teledent_core::{
    ExplanationPayload, Finding, Patient, Result, RiskLevel, TeledentError,
};
use teledent_database::{
    DatabaseQueries, NewImageAnalysis, NewPatient, NewPatientImage, NewPatientReport,
};
use teledent_report::ReportContent;
use tracing::{debug, info};
use uuid::Uuid;

use crate::auth::bearer_token;
use crate::server::{ApiResult, AppState};

const ALLOWED_IMAGE_TYPES: [&str; 3] = ["image/jpeg", "image/jpg", "image/png"];

// ========== 请求/响应模型 ==========

#[derive(Debug, Deserialize)]
pub struct PatientCreate {
    pub email: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct Token {
    pub access_token: String,
    pub token_type: String,
}

/// 患者公开视图（不含密码哈希）
#[derive(Debug, Serialize)]
pub struct PatientView {
    pub id: i64,
    pub email: String,
    pub username: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Patient> for PatientView {
    fn from(patient: Patient) -> Self {
        Self {
            id: patient.id,
            email: patient.email,
            username: patient.username,
            is_active: patient.is_active,
            created_at: patient.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct UploadImageResponse {
    pub message: String,
    pub image_id: Uuid,
    pub filename: String,
    pub uploaded_at: DateTime<Utc>,
    pub primary_finding: Finding,
    pub all_findings: Vec<Finding>,
    pub risk_level: RiskLevel,
    pub recommendations: Vec<String>,
    pub explanation: ExplanationPayload,
    pub report_id: Uuid,
    pub pdf_url: String,
}

#[derive(Debug, Serialize)]
pub struct ImageInfo {
    pub id: Uuid,
    pub original_name: String,
    pub uploaded_at: DateTime<Utc>,
    pub size: i64,
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct ImagesListResponse {
    pub images: Vec<ImageInfo>,
}

#[derive(Debug, Serialize)]
pub struct AnalysisResponse {
    pub analysis_id: Uuid,
    pub image_id: Uuid,
    pub prediction: String,
    pub confidence: f64,
    pub probabilities: HashMap<String, f64>,
    pub processing_time_ms: f64,
    pub explanation: ExplanationPayload,
    pub analyzed_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ReportListItem {
    pub report_id: Uuid,
    pub prediction: String,
    pub confidence: f64,
    pub risk_level: RiskLevel,
    pub generated_at: DateTime<Utc>,
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct ReportsListResponse {
    pub reports: Vec<ReportListItem>,
}

#[derive(Debug, Serialize)]
pub struct ReportDetailResponse {
    pub report_id: Uuid,
    pub prediction: String,
    pub confidence: f64,
    pub risk_level: RiskLevel,
    pub recommendations: Vec<String>,
    pub explanation: ExplanationPayload,
    pub generated_at: DateTime<Utc>,
    pub pdf_url: String,
}

// ========== 认证辅助 ==========

/// 解析bearer令牌并加载对应患者
///
/// 令牌格式错误、过期、签名无效与主体不存在都折叠为同一个401。
async fn current_patient(state: &AppState, headers: &HeaderMap) -> Result<Patient> {
    let token =
        bearer_token(headers).ok_or_else(|| TeledentError::Auth("Invalid token".to_string()))?;

    let claims = state.auth.verify_token(token).map_err(|reason| {
        debug!("Patient token rejected: {}", reason);
        TeledentError::Auth("Invalid token".to_string())
    })?;

    let queries = DatabaseQueries::new(&state.db);
    queries
        .find_patient_by_username(&claims.sub)
        .await?
        .ok_or_else(|| TeledentError::Auth("Invalid token".to_string()))
}

// ========== 账户端点 ==========

/// 患者注册
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PatientCreate>,
) -> ApiResult<Json<PatientView>> {
    if !payload.email.contains('@') {
        return Err(TeledentError::Validation("Invalid email address".to_string()).into());
    }
    if payload.username.is_empty() || payload.password.is_empty() {
        return Err(
            TeledentError::Validation("Username and password are required".to_string()).into(),
        );
    }

    let queries = DatabaseQueries::new(&state.db);

    if queries
        .find_patient_by_email_or_username(&payload.email, &payload.username)
        .await?
        .is_some()
    {
        return Err(TeledentError::Validation("Patient already exists".to_string()).into());
    }

    let password_hash = state.auth.hash_password(&payload.password)?;
    let patient = queries
        .create_patient(&NewPatient {
            email: payload.email,
            username: payload.username,
            password_hash,
        })
        .await?;

    info!("Registered patient {}", patient.username);
    Ok(Json(patient.into()))
}

/// 患者登录
///
/// 用户名不存在与密码错误返回同一条401消息。
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<Json<Token>> {
    let queries = DatabaseQueries::new(&state.db);

    let patient = queries
        .find_patient_by_username(&payload.username)
        .await?
        .ok_or_else(|| TeledentError::Auth("Incorrect username or password".to_string()))?;

    if !state
        .auth
        .verify_password(&payload.password, &patient.password_hash)
    {
        return Err(TeledentError::Auth("Incorrect username or password".to_string()).into());
    }

    let access_token = state.auth.issue_token(&patient.username)?;
    info!("Patient logged in: {}", patient.username);

    Ok(Json(Token {
        access_token,
        token_type: "bearer".to_string(),
    }))
}

/// 当前患者信息
pub async fn me(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<MeResponse>> {
    let patient = current_patient(&state, &headers).await?;
    Ok(Json(MeResponse {
        id: patient.id,
        username: patient.username,
        email: patient.email,
    }))
}

// ========== 上传流水线 ==========

/// 上传→分类→解释→落库→渲染流水线
///
/// 各步骤严格顺序执行，无重试；分类失败终止请求，
/// 已写入的上传文件留在磁盘上。
pub async fn upload_image(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> ApiResult<Json<UploadImageResponse>> {
    let patient = current_patient(&state, &headers).await?;

    // 1. 读取multipart并校验内容类型
    let upload = read_upload_field(multipart).await?;
    if !ALLOWED_IMAGE_TYPES.contains(&upload.content_type.as_str()) {
        return Err(
            TeledentError::Validation("Only JPEG and PNG images allowed".to_string()).into(),
        );
    }

    // 2. 三个新的外部标识
    let image_uuid = Uuid::new_v4();
    let analysis_uuid = Uuid::new_v4();
    let report_uuid = Uuid::new_v4();

    // 3. 落盘，再读回用于推理
    let extension = file_extension(&upload.original_name);
    let stored = state
        .storage
        .store_upload(patient.id, &image_uuid, &extension, &upload.data)
        .await?;
    let inference_bytes = state.storage.read_file(&stored.file_path).await?;

    info!(
        "Stored upload {} ({} bytes) for patient {}",
        stored.filename,
        inference_bytes.len(),
        patient.id
    );

    // 4. 分类推理，失败即500
    let outcome = state.vision.classify(&inference_bytes).await?;

    // 5. 风险分级
    let level = confidence_tier(outcome.confidence);

    // 6. 解释生成（内置模板回退，不会失败）
    let explanation = state
        .explanation
        .explain(&outcome.label, outcome.confidence, &outcome.probabilities)
        .await;

    let all_findings = ranked_findings(&outcome.probabilities);
    let primary = Finding {
        condition: outcome.label.clone(),
        confidence_percentage: round_pct(outcome.confidence),
        level,
    };

    // 7. 渲染PDF报告
    let generated_at = Utc::now();
    let pdf_path = state.storage.report_path(&report_uuid, &generated_at);
    let pdf_bytes = state.pdf.render(&ReportContent {
        patient_name: &patient.username,
        primary: &primary,
        all_findings: &all_findings,
        recommendations: &explanation.recommendations,
        explanation_text: &explanation.explanation,
        generated_at,
    })?;
    state.storage.store_report(&pdf_path, &pdf_bytes).await?;
    let pdf_path = pdf_path.to_string_lossy().to_string();

    // 8. 影像/分析/报告三行在一个事务内落库
    let queries = DatabaseQueries::new(&state.db);
    queries
        .persist_pipeline(
            &NewPatientImage {
                uuid: image_uuid,
                patient_id: patient.id,
                filename: stored.filename,
                original_name: upload.original_name.clone(),
                file_path: stored.file_path,
                file_size: upload.data.len() as i64,
                mime_type: upload.content_type,
            },
            &NewImageAnalysis {
                uuid: analysis_uuid,
                prediction: outcome.label.clone(),
                confidence: outcome.confidence,
                probabilities: outcome.probabilities.clone(),
                processing_time_ms: outcome.processing_time_ms,
                explanation: explanation.clone(),
                pdf_path: Some(pdf_path.clone()),
            },
            &NewPatientReport {
                uuid: report_uuid,
                patient_id: patient.id,
                pdf_path,
                prediction: outcome.label.clone(),
                confidence: outcome.confidence,
                risk_level: level,
                recommendations: explanation.recommendations.clone(),
                explanation: explanation.clone(),
            },
        )
        .await?;

    info!(
        "Analysis pipeline finished for patient {}: {} ({:.1}%)",
        patient.id,
        outcome.label,
        outcome.confidence * 100.0
    );

    Ok(Json(UploadImageResponse {
        message: "Image uploaded and analyzed successfully".to_string(),
        image_id: image_uuid,
        filename: upload.original_name,
        uploaded_at: generated_at,
        primary_finding: primary,
        all_findings,
        risk_level: level,
        recommendations: explanation.recommendations.clone(),
        explanation,
        report_id: report_uuid,
        pdf_url: format!("/patients/reports/{}/pdf", report_uuid),
    }))
}

/// multipart中的文件字段
struct UploadedFile {
    original_name: String,
    content_type: String,
    data: Vec<u8>,
}

/// 读取名为file的multipart字段
async fn read_upload_field(mut multipart: Multipart) -> Result<UploadedFile> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| TeledentError::Validation(format!("Invalid multipart payload: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let original_name = field.file_name().unwrap_or("upload").to_string();
        let content_type = field.content_type().unwrap_or_default().to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| TeledentError::Validation(format!("Failed to read file data: {}", e)))?
            .to_vec();

        return Ok(UploadedFile {
            original_name,
            content_type,
            data,
        });
    }

    Err(TeledentError::Validation("No file provided".to_string()))
}

// ========== 检索端点 ==========

/// 当前患者的影像列表
pub async fn list_images(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<ImagesListResponse>> {
    let patient = current_patient(&state, &headers).await?;
    let queries = DatabaseQueries::new(&state.db);

    let images = queries
        .list_images_for_patient(patient.id)
        .await?
        .into_iter()
        .map(|image| ImageInfo {
            id: image.uuid,
            original_name: image.original_name,
            uploaded_at: image.uploaded_at,
            size: image.file_size,
            url: format!("/patients/images/{}", image.uuid),
        })
        .collect();

    Ok(Json(ImagesListResponse { images }))
}

/// 下载影像原图
///
/// 行缺失、他人影像或文件丢失均为404。
pub async fn get_image(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(image_id): Path<Uuid>,
) -> ApiResult<Response> {
    let patient = current_patient(&state, &headers).await?;
    let queries = DatabaseQueries::new(&state.db);

    let image = queries
        .find_image_by_uuid(patient.id, &image_id)
        .await?
        .ok_or_else(|| TeledentError::NotFound("Image not found".to_string()))?;

    if !state.storage.file_exists(&image.file_path).await {
        return Err(TeledentError::NotFound("Image file not found".to_string()).into());
    }

    let data = state.storage.read_file(&image.file_path).await?;
    binary_response(data, &image.mime_type, &image.original_name)
}

/// 某张影像的分析结果
pub async fn get_image_analysis(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(image_id): Path<Uuid>,
) -> ApiResult<Json<AnalysisResponse>> {
    let patient = current_patient(&state, &headers).await?;
    let queries = DatabaseQueries::new(&state.db);

    let analysis = queries
        .find_analysis_for_image(patient.id, &image_id)
        .await?
        .ok_or_else(|| TeledentError::NotFound("Analysis not found".to_string()))?;

    Ok(Json(AnalysisResponse {
        analysis_id: analysis.uuid,
        image_id,
        prediction: analysis.prediction,
        confidence: analysis.confidence,
        probabilities: analysis.probabilities,
        processing_time_ms: analysis.processing_time_ms,
        explanation: analysis.explanation,
        analyzed_at: analysis.analyzed_at,
    }))
}

/// 当前患者的报告列表
pub async fn list_reports(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<ReportsListResponse>> {
    let patient = current_patient(&state, &headers).await?;
    let queries = DatabaseQueries::new(&state.db);

    let reports = queries
        .list_reports_for_patient(patient.id)
        .await?
        .into_iter()
        .map(|report| ReportListItem {
            report_id: report.uuid,
            prediction: report.prediction,
            confidence: report.confidence,
            risk_level: report.risk_level,
            generated_at: report.generated_at,
            url: format!("/patients/reports/{}", report.uuid),
        })
        .collect();

    Ok(Json(ReportsListResponse { reports }))
}

/// 报告详情
pub async fn get_report(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(report_id): Path<Uuid>,
) -> ApiResult<Json<ReportDetailResponse>> {
    let patient = current_patient(&state, &headers).await?;
    let queries = DatabaseQueries::new(&state.db);

    let report = queries
        .find_report_by_uuid(patient.id, &report_id)
        .await?
        .ok_or_else(|| TeledentError::NotFound("Report not found".to_string()))?;

    Ok(Json(ReportDetailResponse {
        report_id: report.uuid,
        prediction: report.prediction,
        confidence: report.confidence,
        risk_level: report.risk_level,
        recommendations: report.recommendations,
        explanation: report.explanation,
        generated_at: report.generated_at,
        pdf_url: format!("/patients/reports/{}/pdf", report.uuid),
    }))
}

/// 下载报告PDF
pub async fn get_report_pdf(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(report_id): Path<Uuid>,
) -> ApiResult<Response> {
    let patient = current_patient(&state, &headers).await?;
    let queries = DatabaseQueries::new(&state.db);

    let report = queries
        .find_report_by_uuid(patient.id, &report_id)
        .await?
        .ok_or_else(|| TeledentError::NotFound("Report not found".to_string()))?;

    if !state.storage.file_exists(&report.pdf_path).await {
        return Err(TeledentError::NotFound("Report file not found".to_string()).into());
    }

    let data = state.storage.read_file(&report.pdf_path).await?;
    let download_name = format!("teledent_report_{}.pdf", report.uuid);
    binary_response(data, "application/pdf", &download_name)
}

/// 二进制文件响应
fn binary_response(data: Vec<u8>, mime_type: &str, filename: &str) -> ApiResult<Response> {
    Response::builder()
        .header(header::CONTENT_TYPE, mime_type)
        .header(header::CONTENT_LENGTH, data.len())
        .header(
            header::CONTENT_DISPOSITION,
            format!("inline; filename=\"{}\"", filename),
        )
        .body(Body::from(data))
        .map_err(|e| TeledentError::Internal(format!("response build failed: {}", e)).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_image_types() {
        assert!(ALLOWED_IMAGE_TYPES.contains(&"image/jpeg"));
        assert!(ALLOWED_IMAGE_TYPES.contains(&"image/png"));
        assert!(!ALLOWED_IMAGE_TYPES.contains(&"image/gif"));
        assert!(!ALLOWED_IMAGE_TYPES.contains(&"application/pdf"));
    }

    #[test]
    fn test_upload_response_serializes_external_ids_only() {
        let explanation = ExplanationPayload {
            condition: "Caries".to_string(),
            confidence_percentage: 83.0,
            risk_level: "High".to_string(),
            urgency: "See a dentist within a week".to_string(),
            ai_generated: false,
            explanation: "text".to_string(),
            recommendations: vec!["Visit dentist for examination".to_string()],
            differential: Vec::new(),
        };
        let primary = Finding {
            condition: "Caries".to_string(),
            confidence_percentage: 83.0,
            level: RiskLevel::High,
        };
        let report_id = Uuid::new_v4();

        let response = UploadImageResponse {
            message: "Image uploaded and analyzed successfully".to_string(),
            image_id: Uuid::new_v4(),
            filename: "smile.jpg".to_string(),
            uploaded_at: Utc::now(),
            primary_finding: primary.clone(),
            all_findings: vec![primary],
            risk_level: RiskLevel::High,
            recommendations: explanation.recommendations.clone(),
            explanation,
            report_id,
            pdf_url: format!("/patients/reports/{}/pdf", report_id),
        };

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["risk_level"], "High");
        assert_eq!(
            value["pdf_url"],
            format!("/patients/reports/{}/pdf", report_id)
        );
        // 内部数据库行id不出现在响应中
        assert!(value.get("id").is_none());
        assert!(value.get("patient_id").is_none());
    }
}
