//! 解释生成服务客户端
//!
//! 优先调用托管语言模型；服务不可用或返回异常时，
//! 回退到六种疾病的固定模板，保证该步骤永不失败。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use teledent_core::utils::{confidence_tier, round_pct, urgency_for};
use teledent_core::{Differential, ExplanationPayload, RiskLevel};
use tracing::{info, warn};

/// 解释服务接口
#[async_trait]
pub trait ExplanationService: Send + Sync {
    /// 为一次分类结果生成患者可读的解释
    ///
    /// 该方法不返回错误，内部失败统一走模板回退。
    async fn explain(
        &self,
        prediction: &str,
        confidence: f64,
        probabilities: &HashMap<String, f64>,
    ) -> ExplanationPayload;
}

/// 解释服务的HTTP请求体
#[derive(Debug, Serialize)]
struct ExplanationRequest<'a> {
    prediction: &'a str,
    confidence: f64,
    probabilities: &'a HashMap<String, f64>,
}

/// 解释服务的HTTP响应
#[derive(Debug, Deserialize)]
struct ExplanationResponse {
    explanation: String,
    #[serde(default)]
    recommendations: Vec<String>,
    #[serde(default)]
    ai_generated: bool,
}

/// 托管语言模型的HTTP客户端
///
/// endpoint或api_key未配置时直接使用模板。
pub struct HttpExplanationService {
    endpoint: Option<String>,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpExplanationService {
    pub fn new(endpoint: Option<String>, api_key: Option<String>, timeout_secs: u64) -> Self {
        if endpoint.is_none() || api_key.is_none() {
            warn!("Explanation service not configured, using template explanations");
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();

        Self {
            endpoint,
            api_key,
            client,
        }
    }

    async fn call_model(
        &self,
        prediction: &str,
        confidence: f64,
        probabilities: &HashMap<String, f64>,
    ) -> anyhow::Result<ExplanationResponse> {
        let endpoint = self
            .endpoint
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("explanation endpoint not configured"))?;
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("explanation api key not configured"))?;

        let response = self
            .client
            .post(endpoint)
            .bearer_auth(api_key)
            .json(&ExplanationRequest {
                prediction,
                confidence,
                probabilities,
            })
            .send()
            .await?
            .error_for_status()?
            .json::<ExplanationResponse>()
            .await?;

        Ok(response)
    }
}

#[async_trait]
impl ExplanationService for HttpExplanationService {
    async fn explain(
        &self,
        prediction: &str,
        confidence: f64,
        probabilities: &HashMap<String, f64>,
    ) -> ExplanationPayload {
        let confidence_pct = round_pct(confidence);
        let level = confidence_tier(confidence);

        match self.call_model(prediction, confidence, probabilities).await {
            Ok(response) if !response.explanation.is_empty() => {
                info!("Explanation generated by language model");
                let recommendations = if response.recommendations.is_empty() {
                    tier_recommendations(level)
                } else {
                    response.recommendations
                };

                ExplanationPayload {
                    condition: prediction.to_string(),
                    confidence_percentage: confidence_pct,
                    risk_level: level.as_str().to_string(),
                    urgency: urgency_for(level).to_string(),
                    ai_generated: response.ai_generated,
                    explanation: response.explanation,
                    recommendations,
                    differential: differential_findings(prediction, probabilities),
                }
            }
            Ok(_) => {
                warn!("Explanation service returned empty text, falling back to template");
                template_explanation(prediction, confidence_pct, level)
            }
            Err(e) => {
                warn!("Explanation service error: {}, falling back to template", e);
                template_explanation(prediction, confidence_pct, level)
            }
        }
    }
}

/// 首要结论之外的前几位候选诊断
fn differential_findings(
    prediction: &str,
    probabilities: &HashMap<String, f64>,
) -> Vec<Differential> {
    let mut sorted: Vec<(&String, &f64)> = probabilities.iter().collect();
    sorted.sort_by(|a, b| b.1.partial_cmp(a.1).unwrap_or(std::cmp::Ordering::Equal));

    sorted
        .into_iter()
        .take(3)
        .filter(|(condition, _)| condition.as_str() != prediction)
        .map(|(condition, probability)| Differential {
            condition: condition.clone(),
            confidence: round_pct(*probability),
        })
        .collect()
}

/// 风险分级对应的兜底建议（模型未给出建议时使用）
pub fn tier_recommendations(level: RiskLevel) -> Vec<String> {
    let items: [&str; 3] = match level {
        RiskLevel::High => [
            "Visit dentist within 1 week",
            "Avoid chewing on affected side",
            "Maintain oral hygiene",
        ],
        RiskLevel::Medium => [
            "Schedule dental appointment soon",
            "Monitor for any pain or sensitivity",
            "Brush twice daily with fluoride toothpaste",
        ],
        RiskLevel::Low => [
            "Discuss at next regular checkup",
            "Continue good oral hygiene",
            "Limit sugary foods and drinks",
        ],
    };
    items.iter().map(|s| s.to_string()).collect()
}

/// 确定性模板解释
///
/// 未知类别退回Caries模板，与分类器的类别集合保持一致。
pub fn template_explanation(
    prediction: &str,
    confidence_pct: f64,
    level: RiskLevel,
) -> ExplanationPayload {
    let (explanation, recommendations): (String, [&str; 4]) = match prediction {
        "Calculus" => (
            format!(
                "Based on the analysis with {}% confidence, we detected calculus (tartar) on your teeth. This is hardened plaque that can only be removed by professional cleaning.",
                confidence_pct
            ),
            [
                "Schedule a professional dental cleaning",
                "Use an electric toothbrush",
                "Floss daily",
                "Consider antimicrobial mouthwash",
            ],
        ),
        "Gingivitis" => (
            format!(
                "We detected signs of gum inflammation (gingivitis) with {}% confidence. This is the earliest stage of gum disease and is reversible.",
                confidence_pct
            ),
            [
                "Professional cleaning recommended",
                "Improve brushing at gumline",
                "Floss daily",
                "Salt water rinses",
            ],
        ),
        "Mouth Ulcer" => (
            format!(
                "The analysis shows a mouth ulcer with {}% confidence. These are common and usually heal within 1-2 weeks.",
                confidence_pct
            ),
            [
                "Avoid spicy/acidic foods",
                "Use topical oral gel",
                "Salt water rinses",
                "See dentist if persists >2 weeks",
            ],
        ),
        "Tooth Discoloration" => (
            format!(
                "Tooth discoloration detected with {}% confidence. This can be from surface stains or internal factors.",
                confidence_pct
            ),
            [
                "Professional cleaning",
                "Consider whitening options",
                "Reduce staining foods/drinks",
                "Good oral hygiene",
            ],
        ),
        "Hypodontia" => (
            format!(
                "Our analysis suggests hypodontia (congenitally missing teeth) with {}% confidence.",
                confidence_pct
            ),
            [
                "Orthodontic consultation",
                "Discuss replacement options",
                "Monitor adjacent teeth",
                "Consider space management",
            ],
        ),
        // Caries与未知类别
        _ => (
            format!(
                "Our AI analysis suggests possible tooth decay (caries) with {}% confidence. This indicates areas where enamel may be demineralizing.",
                confidence_pct
            ),
            [
                "Visit dentist for examination",
                "Reduce sugar intake",
                "Use fluoride toothpaste",
                "Consider dental filling if confirmed",
            ],
        ),
    };

    ExplanationPayload {
        condition: prediction.to_string(),
        confidence_percentage: confidence_pct,
        risk_level: level.as_str().to_string(),
        urgency: urgency_for(level).to_string(),
        ai_generated: false,
        explanation,
        recommendations: recommendations.iter().map(|s| s.to_string()).collect(),
        differential: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use teledent_core::DENTAL_CLASSES;

    #[test]
    fn test_template_covers_every_class() {
        for class in DENTAL_CLASSES {
            let payload = template_explanation(class, 75.0, RiskLevel::Medium);
            assert!(!payload.explanation.is_empty(), "empty text for {}", class);
            assert!(
                !payload.recommendations.is_empty(),
                "no recommendations for {}",
                class
            );
            assert!(!payload.ai_generated);
            assert_eq!(payload.condition, class);
        }
    }

    #[test]
    fn test_template_unknown_label_uses_caries_text() {
        let payload = template_explanation("Something Else", 40.0, RiskLevel::Low);
        assert!(payload.explanation.contains("caries"));
        assert_eq!(payload.condition, "Something Else");
        assert_eq!(payload.risk_level, "Low");
    }

    #[test]
    fn test_differential_excludes_prediction() {
        let mut probs = HashMap::new();
        probs.insert("Caries".to_string(), 0.83);
        probs.insert("Gingivitis".to_string(), 0.1);
        probs.insert("Calculus".to_string(), 0.04);
        probs.insert("Hypodontia".to_string(), 0.03);

        let differential = differential_findings("Caries", &probs);
        assert_eq!(differential.len(), 2);
        assert!(differential.iter().all(|d| d.condition != "Caries"));
        assert_eq!(differential[0].condition, "Gingivitis");
    }

    #[tokio::test]
    async fn test_explain_without_endpoint_falls_back() {
        let service = HttpExplanationService::new(None, None, 5);
        let mut probs = HashMap::new();
        probs.insert("Caries".to_string(), 0.83);

        let payload = service.explain("Caries", 0.83, &probs).await;
        assert!(!payload.ai_generated);
        assert_eq!(payload.risk_level, "High");
        assert_eq!(payload.urgency, "See a dentist within a week");
        assert!(!payload.recommendations.is_empty());
    }

    #[tokio::test]
    async fn test_explain_risk_level_follows_tier() {
        let service = HttpExplanationService::new(None, None, 5);
        let probs = HashMap::new();

        let medium = service.explain("Gingivitis", 0.6, &probs).await;
        assert_eq!(medium.risk_level, "Medium");

        let low = service.explain("Gingivitis", 0.3, &probs).await;
        assert_eq!(low.risk_level, "Low");
    }
}
