//! 通用工具函数

use crate::models::{Finding, RiskLevel};
use std::collections::HashMap;

/// 根据置信度推导风险分级
///
/// 阈值为严格大于：>0.8 为 High，>0.5 为 Medium，其余为 Low。
pub fn confidence_tier(confidence: f64) -> RiskLevel {
    if confidence > 0.8 {
        RiskLevel::High
    } else if confidence > 0.5 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// 风险分级对应的就诊建议文案
pub fn urgency_for(level: RiskLevel) -> &'static str {
    match level {
        RiskLevel::High => "See a dentist within a week",
        RiskLevel::Medium => "Schedule a dental appointment soon",
        RiskLevel::Low => "Monitor and discuss at next regular checkup",
    }
}

/// 将完整概率分布转换为按置信度降序排列的诊断列表
pub fn ranked_findings(probabilities: &HashMap<String, f64>) -> Vec<Finding> {
    let mut findings: Vec<Finding> = probabilities
        .iter()
        .map(|(condition, probability)| Finding {
            condition: condition.clone(),
            confidence_percentage: round_pct(*probability),
            level: confidence_tier(*probability),
        })
        .collect();

    findings.sort_by(|a, b| {
        b.confidence_percentage
            .partial_cmp(&a.confidence_percentage)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    findings
}

/// 百分比表示，保留一位小数
pub fn round_pct(probability: f64) -> f64 {
    (probability * 1000.0).round() / 10.0
}

/// 提取文件扩展名（带点），无扩展名时返回空字符串
pub fn file_extension(filename: &str) -> String {
    match filename.rfind('.') {
        Some(pos) if pos > 0 => filename[pos..].to_ascii_lowercase(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_tier_boundaries() {
        assert_eq!(confidence_tier(0.81), RiskLevel::High);
        assert_eq!(confidence_tier(0.8), RiskLevel::Medium);
        assert_eq!(confidence_tier(0.51), RiskLevel::Medium);
        assert_eq!(confidence_tier(0.5), RiskLevel::Low);
        assert_eq!(confidence_tier(0.0), RiskLevel::Low);
    }

    #[test]
    fn test_ranked_findings_sorted_descending() {
        let mut probs = HashMap::new();
        probs.insert("Caries".to_string(), 0.83);
        probs.insert("Gingivitis".to_string(), 0.1);
        probs.insert("Calculus".to_string(), 0.05);

        let findings = ranked_findings(&probs);
        assert_eq!(findings.len(), 3);
        assert_eq!(findings[0].condition, "Caries");
        assert_eq!(findings[0].level, RiskLevel::High);
        for pair in findings.windows(2) {
            assert!(pair[0].confidence_percentage >= pair[1].confidence_percentage);
        }
    }

    #[test]
    fn test_round_pct() {
        assert_eq!(round_pct(0.8349), 83.5);
        assert_eq!(round_pct(1.0), 100.0);
    }

    #[test]
    fn test_file_extension() {
        assert_eq!(file_extension("smile.JPG"), ".jpg");
        assert_eq!(file_extension("archive.tar.gz"), ".gz");
        assert_eq!(file_extension("noext"), "");
        assert_eq!(file_extension(".hidden"), "");
    }
}
