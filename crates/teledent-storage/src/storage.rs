//! 影像与报告文件存储管理

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use teledent_core::Result;
use uuid::Uuid;

/// 已落盘的上传文件信息
#[derive(Debug, Clone)]
pub struct StoredUpload {
    pub filename: String,
    pub file_path: String,
}

/// 存储管理器
///
/// 上传文件按 uploads/patient_{id}/{uuid}{ext} 存放，
/// 报告按 reports/report_{uuid}_{timestamp}.pdf 存放；
/// 两个路径字符串原样写入数据库，之后直接用于读取文件。
#[derive(Debug, Clone)]
pub struct StorageManager {
    upload_dir: PathBuf,
    report_dir: PathBuf,
}

impl StorageManager {
    pub fn new(upload_dir: &str, report_dir: &str) -> Self {
        Self {
            upload_dir: PathBuf::from(upload_dir),
            report_dir: PathBuf::from(report_dir),
        }
    }

    /// 存储上传的影像文件
    ///
    /// 目录创建是幂等的，同一患者并发上传只会在这里相遇。
    pub async fn store_upload(
        &self,
        patient_id: i64,
        image_uuid: &Uuid,
        extension: &str,
        data: &[u8],
    ) -> Result<StoredUpload> {
        let patient_dir = self.upload_dir.join(format!("patient_{}", patient_id));
        tokio::fs::create_dir_all(&patient_dir).await?;

        let filename = format!("{}{}", image_uuid, extension);
        let full_path = patient_dir.join(&filename);
        tokio::fs::write(&full_path, data).await?;

        Ok(StoredUpload {
            filename,
            file_path: full_path.to_string_lossy().to_string(),
        })
    }

    /// 按数据库中记录的路径读取文件
    pub async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let data = tokio::fs::read(path).await?;
        Ok(data)
    }

    /// 文件是否仍然存在（行存在而文件缺失时返回404的依据）
    pub async fn file_exists(&self, path: &str) -> bool {
        tokio::fs::metadata(path).await.is_ok()
    }

    /// 报告PDF的目标路径
    pub fn report_path(&self, report_uuid: &Uuid, generated_at: &DateTime<Utc>) -> PathBuf {
        self.report_dir.join(format!(
            "report_{}_{}.pdf",
            report_uuid,
            generated_at.format("%Y%m%d_%H%M%S")
        ))
    }

    /// 写入渲染完成的报告
    pub async fn store_report(&self, path: &Path, data: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, data).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_upload_places_file_under_patient_dir() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageManager::new(
            dir.path().join("uploads").to_str().unwrap(),
            dir.path().join("reports").to_str().unwrap(),
        );

        let image_uuid = Uuid::new_v4();
        let stored = storage
            .store_upload(42, &image_uuid, ".jpg", b"fake jpeg bytes")
            .await
            .unwrap();

        assert_eq!(stored.filename, format!("{}.jpg", image_uuid));
        assert!(stored.file_path.contains("patient_42"));

        let read_back = storage.read_file(&stored.file_path).await.unwrap();
        assert_eq!(read_back, b"fake jpeg bytes");
    }

    #[tokio::test]
    async fn test_store_upload_is_idempotent_on_directory() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageManager::new(
            dir.path().join("uploads").to_str().unwrap(),
            dir.path().join("reports").to_str().unwrap(),
        );

        // 同一患者连续两次上传，目录已存在不报错
        for _ in 0..2 {
            storage
                .store_upload(7, &Uuid::new_v4(), ".png", b"data")
                .await
                .unwrap();
        }
    }

    #[test]
    fn test_report_path_layout() {
        let storage = StorageManager::new("uploads", "reports");
        let report_uuid = Uuid::new_v4();
        let generated_at = "2026-08-06T10:30:00Z".parse::<DateTime<Utc>>().unwrap();

        let path = storage.report_path(&report_uuid, &generated_at);
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert_eq!(
            name,
            format!("report_{}_20260806_103000.pdf", report_uuid)
        );
    }

    #[tokio::test]
    async fn test_store_report_creates_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageManager::new(
            dir.path().join("uploads").to_str().unwrap(),
            dir.path().join("reports").to_str().unwrap(),
        );

        let path = storage.report_path(&Uuid::new_v4(), &Utc::now());
        let path = dir.path().join("reports-nested").join(path.file_name().unwrap());
        storage.store_report(&path, b"%PDF-1.3").await.unwrap();
        assert!(storage.file_exists(path.to_str().unwrap()).await);
    }
}
