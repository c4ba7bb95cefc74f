//! 数据库查询操作

use crate::connection::DatabasePool;
use crate::models::*;
use sqlx::Row;
use teledent_core::{
    Admin, ImageAnalysis, Patient, PatientImage, PatientReport, Result, TeledentError,
};
use uuid::Uuid;

/// 流水线事务产生的三个内部行ID
#[derive(Debug, Clone, Copy)]
pub struct PipelineRecordIds {
    pub image_id: i64,
    pub analysis_id: i64,
    pub report_id: i64,
}

/// 数据库查询操作接口
pub struct DatabaseQueries<'a> {
    pool: &'a DatabasePool,
}

impl<'a> DatabaseQueries<'a> {
    pub fn new(pool: &'a DatabasePool) -> Self {
        Self { pool }
    }

    /// 创建数据库表
    pub async fn create_tables(&self) -> Result<()> {
        let pool = self.pool.pool();

        // 创建患者表
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS patients (
                id BIGSERIAL PRIMARY KEY,
                email VARCHAR(255) UNIQUE NOT NULL,
                username VARCHAR(64) UNIQUE NOT NULL,
                password_hash VARCHAR(255) NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
        "#,
        )
        .execute(pool)
        .await
        .map_err(|e| TeledentError::Database(e.to_string()))?;

        // 创建管理员表
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS admins (
                id BIGSERIAL PRIMARY KEY,
                email VARCHAR(255) UNIQUE NOT NULL,
                username VARCHAR(64) UNIQUE NOT NULL,
                password_hash VARCHAR(255) NOT NULL,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
        "#,
        )
        .execute(pool)
        .await
        .map_err(|e| TeledentError::Database(e.to_string()))?;

        // 创建影像表，删除患者时级联删除
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS patient_images (
                id BIGSERIAL PRIMARY KEY,
                uuid UUID UNIQUE NOT NULL,
                patient_id BIGINT NOT NULL REFERENCES patients(id) ON DELETE CASCADE,
                filename VARCHAR(255) NOT NULL,
                original_name VARCHAR(255) NOT NULL,
                file_path VARCHAR(512) NOT NULL,
                file_size BIGINT NOT NULL,
                mime_type VARCHAR(64) NOT NULL,
                uploaded_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
        "#,
        )
        .execute(pool)
        .await
        .map_err(|e| TeledentError::Database(e.to_string()))?;

        // 创建分析表
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS image_analyses (
                id BIGSERIAL PRIMARY KEY,
                uuid UUID UNIQUE NOT NULL,
                image_id BIGINT NOT NULL REFERENCES patient_images(id) ON DELETE CASCADE,
                prediction VARCHAR(64) NOT NULL,
                confidence DOUBLE PRECISION NOT NULL,
                probabilities JSONB NOT NULL,
                processing_time_ms DOUBLE PRECISION NOT NULL,
                explanation JSONB NOT NULL,
                pdf_path VARCHAR(512),
                analyzed_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
        "#,
        )
        .execute(pool)
        .await
        .map_err(|e| TeledentError::Database(e.to_string()))?;

        // 创建报告表
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS patient_reports (
                id BIGSERIAL PRIMARY KEY,
                uuid UUID UNIQUE NOT NULL,
                patient_id BIGINT NOT NULL REFERENCES patients(id) ON DELETE CASCADE,
                analysis_id BIGINT NOT NULL REFERENCES image_analyses(id) ON DELETE CASCADE,
                pdf_path VARCHAR(512) NOT NULL,
                prediction VARCHAR(64) NOT NULL,
                confidence DOUBLE PRECISION NOT NULL,
                risk_level VARCHAR(16) NOT NULL,
                recommendations JSONB NOT NULL,
                explanation JSONB NOT NULL,
                generated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
        "#,
        )
        .execute(pool)
        .await
        .map_err(|e| TeledentError::Database(e.to_string()))?;

        // 创建索引以优化查询性能
        self.create_indexes().await?;

        tracing::info!("Database tables created successfully");
        Ok(())
    }

    /// 创建数据库索引
    async fn create_indexes(&self) -> Result<()> {
        let pool = self.pool.pool();

        let indexes = vec![
            "CREATE INDEX IF NOT EXISTS idx_patients_email ON patients(email)",
            "CREATE INDEX IF NOT EXISTS idx_patients_username ON patients(username)",
            "CREATE INDEX IF NOT EXISTS idx_admins_username ON admins(username)",
            "CREATE INDEX IF NOT EXISTS idx_patient_images_uuid ON patient_images(uuid)",
            "CREATE INDEX IF NOT EXISTS idx_patient_images_patient_id ON patient_images(patient_id)",
            "CREATE INDEX IF NOT EXISTS idx_image_analyses_uuid ON image_analyses(uuid)",
            "CREATE INDEX IF NOT EXISTS idx_image_analyses_image_id ON image_analyses(image_id)",
            "CREATE INDEX IF NOT EXISTS idx_patient_reports_uuid ON patient_reports(uuid)",
            "CREATE INDEX IF NOT EXISTS idx_patient_reports_patient_id ON patient_reports(patient_id)",
        ];

        for index_sql in indexes {
            sqlx::query(index_sql)
                .execute(pool)
                .await
                .map_err(|e| TeledentError::Database(e.to_string()))?;
        }

        Ok(())
    }

    // ========== 患者相关操作 ==========

    /// 创建新患者
    pub async fn create_patient(&self, patient: &NewPatient) -> Result<Patient> {
        let pool = self.pool.pool();

        let row = sqlx::query_as::<_, DbPatient>(
            r#"
            INSERT INTO patients (email, username, password_hash)
            VALUES ($1, $2, $3)
            RETURNING *
        "#,
        )
        .bind(&patient.email)
        .bind(&patient.username)
        .bind(&patient.password_hash)
        .fetch_one(pool)
        .await
        .map_err(|e| TeledentError::Database(e.to_string()))?;

        Ok(row.into())
    }

    /// 根据用户名查找患者
    pub async fn find_patient_by_username(&self, username: &str) -> Result<Option<Patient>> {
        let pool = self.pool.pool();

        let result =
            sqlx::query_as::<_, DbPatient>("SELECT * FROM patients WHERE username = $1")
                .bind(username)
                .fetch_optional(pool)
                .await
                .map_err(|e| TeledentError::Database(e.to_string()))?;

        Ok(result.map(Patient::from))
    }

    /// 根据邮箱或用户名查找患者（注册查重）
    pub async fn find_patient_by_email_or_username(
        &self,
        email: &str,
        username: &str,
    ) -> Result<Option<Patient>> {
        let pool = self.pool.pool();

        let result = sqlx::query_as::<_, DbPatient>(
            "SELECT * FROM patients WHERE email = $1 OR username = $2",
        )
        .bind(email)
        .bind(username)
        .fetch_optional(pool)
        .await
        .map_err(|e| TeledentError::Database(e.to_string()))?;

        Ok(result.map(Patient::from))
    }

    /// 根据ID查找患者
    pub async fn find_patient_by_id(&self, id: i64) -> Result<Option<Patient>> {
        let pool = self.pool.pool();

        let result = sqlx::query_as::<_, DbPatient>("SELECT * FROM patients WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(|e| TeledentError::Database(e.to_string()))?;

        Ok(result.map(Patient::from))
    }

    /// 分页列出全部患者（管理员操作）
    pub async fn list_patients(&self, skip: i64, limit: i64) -> Result<Vec<Patient>> {
        let pool = self.pool.pool();

        let results = sqlx::query_as::<_, DbPatient>(
            "SELECT * FROM patients ORDER BY id OFFSET $1 LIMIT $2",
        )
        .bind(skip)
        .bind(limit)
        .fetch_all(pool)
        .await
        .map_err(|e| TeledentError::Database(e.to_string()))?;

        Ok(results.into_iter().map(Patient::from).collect())
    }

    /// 删除患者，影像/分析/报告由数据库级联删除
    ///
    /// 返回是否确有删除。
    pub async fn delete_patient(&self, id: i64) -> Result<bool> {
        let pool = self.pool.pool();

        let result = sqlx::query("DELETE FROM patients WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await
            .map_err(|e| TeledentError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    // ========== 管理员相关操作 ==========

    /// 创建管理员账户（启动时引导用）
    pub async fn create_admin(&self, admin: &NewAdmin) -> Result<Admin> {
        let pool = self.pool.pool();

        let row = sqlx::query_as::<_, DbAdmin>(
            r#"
            INSERT INTO admins (email, username, password_hash)
            VALUES ($1, $2, $3)
            RETURNING *
        "#,
        )
        .bind(&admin.email)
        .bind(&admin.username)
        .bind(&admin.password_hash)
        .fetch_one(pool)
        .await
        .map_err(|e| TeledentError::Database(e.to_string()))?;

        Ok(row.into())
    }

    /// 根据用户名查找管理员
    pub async fn find_admin_by_username(&self, username: &str) -> Result<Option<Admin>> {
        let pool = self.pool.pool();

        let result = sqlx::query_as::<_, DbAdmin>("SELECT * FROM admins WHERE username = $1")
            .bind(username)
            .fetch_optional(pool)
            .await
            .map_err(|e| TeledentError::Database(e.to_string()))?;

        Ok(result.map(Admin::from))
    }

    // ========== 影像/分析/报告相关操作 ==========

    /// 流水线事务：影像 → 分析 → 报告三行作为一个事务写入
    ///
    /// 影像行先插入并取回id供分析行引用，报告行写入后才提交；
    /// 任何一步失败则三行都不落库。文件系统写入不在事务覆盖范围内。
    pub async fn persist_pipeline(
        &self,
        image: &NewPatientImage,
        analysis: &NewImageAnalysis,
        report: &NewPatientReport,
    ) -> Result<PipelineRecordIds> {
        let mut tx = self
            .pool
            .pool()
            .begin()
            .await
            .map_err(|e| TeledentError::Database(e.to_string()))?;

        let image_id: i64 = sqlx::query(
            r#"
            INSERT INTO patient_images
                (uuid, patient_id, filename, original_name, file_path, file_size, mime_type)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
        "#,
        )
        .bind(image.uuid)
        .bind(image.patient_id)
        .bind(&image.filename)
        .bind(&image.original_name)
        .bind(&image.file_path)
        .bind(image.file_size)
        .bind(&image.mime_type)
        .fetch_one(&mut *tx)
        .await
        .map(|row| row.get("id"))
        .map_err(|e| TeledentError::Database(e.to_string()))?;

        let probabilities = serde_json::to_value(&analysis.probabilities)?;
        let analysis_explanation = serde_json::to_value(&analysis.explanation)?;

        let analysis_id: i64 = sqlx::query(
            r#"
            INSERT INTO image_analyses
                (uuid, image_id, prediction, confidence, probabilities,
                 processing_time_ms, explanation, pdf_path)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
        "#,
        )
        .bind(analysis.uuid)
        .bind(image_id)
        .bind(&analysis.prediction)
        .bind(analysis.confidence)
        .bind(probabilities)
        .bind(analysis.processing_time_ms)
        .bind(analysis_explanation)
        .bind(&analysis.pdf_path)
        .fetch_one(&mut *tx)
        .await
        .map(|row| row.get("id"))
        .map_err(|e| TeledentError::Database(e.to_string()))?;

        let recommendations = serde_json::to_value(&report.recommendations)?;
        let report_explanation = serde_json::to_value(&report.explanation)?;

        let report_id: i64 = sqlx::query(
            r#"
            INSERT INTO patient_reports
                (uuid, patient_id, analysis_id, pdf_path, prediction, confidence,
                 risk_level, recommendations, explanation)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id
        "#,
        )
        .bind(report.uuid)
        .bind(report.patient_id)
        .bind(analysis_id)
        .bind(&report.pdf_path)
        .bind(&report.prediction)
        .bind(report.confidence)
        .bind(report.risk_level.as_str())
        .bind(recommendations)
        .bind(report_explanation)
        .fetch_one(&mut *tx)
        .await
        .map(|row| row.get("id"))
        .map_err(|e| TeledentError::Database(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| TeledentError::Database(e.to_string()))?;

        Ok(PipelineRecordIds {
            image_id,
            analysis_id,
            report_id,
        })
    }

    /// 列出患者自己的全部影像
    pub async fn list_images_for_patient(&self, patient_id: i64) -> Result<Vec<PatientImage>> {
        let pool = self.pool.pool();

        let results = sqlx::query_as::<_, DbPatientImage>(
            "SELECT * FROM patient_images WHERE patient_id = $1 ORDER BY uploaded_at DESC",
        )
        .bind(patient_id)
        .fetch_all(pool)
        .await
        .map_err(|e| TeledentError::Database(e.to_string()))?;

        Ok(results.into_iter().map(PatientImage::from).collect())
    }

    /// 根据外部UUID查找患者自己的影像
    ///
    /// 所有权通过patient_id过滤保证，他人影像等同于不存在。
    pub async fn find_image_by_uuid(
        &self,
        patient_id: i64,
        uuid: &Uuid,
    ) -> Result<Option<PatientImage>> {
        let pool = self.pool.pool();

        let result = sqlx::query_as::<_, DbPatientImage>(
            "SELECT * FROM patient_images WHERE uuid = $1 AND patient_id = $2",
        )
        .bind(uuid)
        .bind(patient_id)
        .fetch_optional(pool)
        .await
        .map_err(|e| TeledentError::Database(e.to_string()))?;

        Ok(result.map(PatientImage::from))
    }

    /// 查找患者某张影像的分析结果（经影像表关联校验所有权）
    pub async fn find_analysis_for_image(
        &self,
        patient_id: i64,
        image_uuid: &Uuid,
    ) -> Result<Option<ImageAnalysis>> {
        let pool = self.pool.pool();

        let result = sqlx::query_as::<_, DbImageAnalysis>(
            r#"
            SELECT a.* FROM image_analyses a
            JOIN patient_images i ON a.image_id = i.id
            WHERE i.uuid = $1 AND i.patient_id = $2
        "#,
        )
        .bind(image_uuid)
        .bind(patient_id)
        .fetch_optional(pool)
        .await
        .map_err(|e| TeledentError::Database(e.to_string()))?;

        Ok(result.map(ImageAnalysis::from))
    }

    /// 列出患者自己的全部报告
    pub async fn list_reports_for_patient(&self, patient_id: i64) -> Result<Vec<PatientReport>> {
        let pool = self.pool.pool();

        let results = sqlx::query_as::<_, DbPatientReport>(
            "SELECT * FROM patient_reports WHERE patient_id = $1 ORDER BY generated_at DESC",
        )
        .bind(patient_id)
        .fetch_all(pool)
        .await
        .map_err(|e| TeledentError::Database(e.to_string()))?;

        Ok(results.into_iter().map(PatientReport::from).collect())
    }

    /// 根据外部UUID查找患者自己的报告
    pub async fn find_report_by_uuid(
        &self,
        patient_id: i64,
        uuid: &Uuid,
    ) -> Result<Option<PatientReport>> {
        let pool = self.pool.pool();

        let result = sqlx::query_as::<_, DbPatientReport>(
            "SELECT * FROM patient_reports WHERE uuid = $1 AND patient_id = $2",
        )
        .bind(uuid)
        .bind(patient_id)
        .fetch_optional(pool)
        .await
        .map_err(|e| TeledentError::Database(e.to_string()))?;

        Ok(result.map(PatientReport::from))
    }
}
