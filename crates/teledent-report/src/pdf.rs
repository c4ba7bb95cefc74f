//! PDF报告渲染
//!
//! A4纵向单页布局：标题、患者信息、首要结论、
//! 全部诊断表格、建议列表和解释正文。

use chrono::{DateTime, Utc};
use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfLayerReference};
use std::io::BufWriter;
use teledent_core::{Finding, Result, RiskLevel, TeledentError};

/// 渲染一份报告所需的全部内容
#[derive(Debug, Clone)]
pub struct ReportContent<'a> {
    pub patient_name: &'a str,
    pub primary: &'a Finding,
    pub all_findings: &'a [Finding],
    pub recommendations: &'a [String],
    pub explanation_text: &'a str,
    pub generated_at: DateTime<Utc>,
}

/// PDF报告渲染服务
#[derive(Debug, Clone, Default)]
pub struct PdfReportService;

impl PdfReportService {
    pub fn new() -> Self {
        Self
    }

    /// 渲染报告并返回PDF字节
    pub fn render(&self, content: &ReportContent<'_>) -> Result<Vec<u8>> {
        let (doc, page1, layer1) =
            PdfDocument::new("Teledent AI Report", Mm(210.0), Mm(297.0), "Layer 1");
        let layer = doc.get_page(page1).get_layer(layer1);

        let font = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| TeledentError::Report(format!("PDF font error: {}", e)))?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| TeledentError::Report(format!("PDF font error: {}", e)))?;

        let mut y = Mm(280.0);

        // 标题与患者信息
        layer.use_text("Welcome to Teledent AI", 18.0, Mm(20.0), y, &bold);
        y -= Mm(10.0);
        layer.use_text(
            format!("Patient: {}", content.patient_name),
            10.0,
            Mm(20.0),
            y,
            &font,
        );
        y -= Mm(5.0);
        layer.use_text(
            format!("Date: {}", content.generated_at.format("%Y-%m-%d %H:%M")),
            10.0,
            Mm(20.0),
            y,
            &font,
        );
        y -= Mm(12.0);

        // 首要结论
        layer.use_text("Analysis Results", 13.0, Mm(20.0), y, &bold);
        y -= Mm(7.0);
        layer.use_text(
            format!(
                "Primary Finding: {} (Confidence: {}% - {})",
                content.primary.condition,
                content.primary.confidence_percentage,
                content.primary.level
            ),
            10.0,
            Mm(20.0),
            y,
            &font,
        );
        y -= Mm(10.0);

        // 全部诊断表格
        layer.use_text("Detailed Analysis", 13.0, Mm(20.0), y, &bold);
        y -= Mm(7.0);
        self.render_findings_table(&layer, content.all_findings, &font, &bold, &mut y);
        y -= Mm(8.0);

        // 建议列表，空列表时按风险分级兜底
        layer.use_text("Recommendations", 13.0, Mm(20.0), y, &bold);
        y -= Mm(7.0);
        if content.recommendations.is_empty() {
            for item in fallback_recommendations(content.primary.level) {
                layer.use_text(format!("- {}", item), 10.0, Mm(25.0), y, &font);
                y -= Mm(5.0);
            }
        } else {
            for item in content.recommendations {
                for line in wrap_text(&format!("- {}", item), 85) {
                    layer.use_text(line, 10.0, Mm(25.0), y, &font);
                    y -= Mm(5.0);
                }
            }
        }
        y -= Mm(8.0);

        // 解释正文
        if !content.explanation_text.is_empty() {
            layer.use_text("AI Analysis Summary", 13.0, Mm(20.0), y, &bold);
            y -= Mm(7.0);
            for line in wrap_text(content.explanation_text, 90) {
                layer.use_text(line, 9.0, Mm(20.0), y, &font);
                y -= Mm(4.5);
            }
            y -= Mm(8.0);
        }

        // 页脚声明
        layer.use_text(
            "Thank you for choosing Teledent AI for your dental health analysis.",
            9.0,
            Mm(20.0),
            y,
            &font,
        );
        y -= Mm(5.0);
        layer.use_text(
            "This report is AI-generated and should be reviewed by a dental professional.",
            9.0,
            Mm(20.0),
            y,
            &font,
        );

        let mut buf = BufWriter::new(Vec::new());
        doc.save(&mut buf)
            .map_err(|e| TeledentError::Report(format!("PDF save error: {}", e)))?;
        buf.into_inner()
            .map_err(|e| TeledentError::Report(format!("PDF buffer error: {}", e)))
    }

    /// 按置信度降序的诊断表格（等宽列，逐行绘制）
    fn render_findings_table(
        &self,
        layer: &PdfLayerReference,
        findings: &[Finding],
        font: &IndirectFontRef,
        bold: &IndirectFontRef,
        y: &mut Mm,
    ) {
        layer.use_text("Disease", 10.0, Mm(25.0), *y, bold);
        layer.use_text("Confidence", 10.0, Mm(95.0), *y, bold);
        layer.use_text("Risk Level", 10.0, Mm(140.0), *y, bold);
        *y -= Mm(5.5);

        for finding in findings {
            layer.use_text(finding.condition.as_str(), 10.0, Mm(25.0), *y, font);
            layer.use_text(
                format!("{}%", finding.confidence_percentage),
                10.0,
                Mm(95.0),
                *y,
                font,
            );
            layer.use_text(finding.level.as_str(), 10.0, Mm(140.0), *y, font);
            *y -= Mm(5.0);
        }
    }
}

/// 风险分级兜底建议
fn fallback_recommendations(level: RiskLevel) -> [&'static str; 3] {
    match level {
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
    }
}

/// 按单词折行，超长单词独占一行
fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.len() + word.len() + 1 > max_chars && !current.is_empty() {
            lines.push(current.clone());
            current.clear();
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_findings() -> Vec<Finding> {
        vec![
            Finding {
                condition: "Caries".to_string(),
                confidence_percentage: 83.0,
                level: RiskLevel::High,
            },
            Finding {
                condition: "Gingivitis".to_string(),
                confidence_percentage: 10.0,
                level: RiskLevel::Low,
            },
        ]
    }

    #[test]
    fn test_render_produces_pdf_bytes() {
        let findings = sample_findings();
        let recommendations = vec!["Visit dentist for examination".to_string()];
        let content = ReportContent {
            patient_name: "alice",
            primary: &findings[0],
            all_findings: &findings,
            recommendations: &recommendations,
            explanation_text: "Our AI analysis suggests possible tooth decay.",
            generated_at: Utc::now(),
        };

        let bytes = PdfReportService::new().render(&content).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
        assert!(bytes.len() > 500);
    }

    #[test]
    fn test_render_with_empty_recommendations_uses_fallback() {
        let findings = sample_findings();
        let content = ReportContent {
            patient_name: "bob",
            primary: &findings[0],
            all_findings: &findings,
            recommendations: &[],
            explanation_text: "",
            generated_at: Utc::now(),
        };

        // 空建议列表仍然渲染成功
        let bytes = PdfReportService::new().render(&content).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn test_wrap_text_respects_width() {
        let lines = wrap_text("one two three four five six seven eight", 12);
        assert!(lines.len() > 1);
        for line in &lines {
            assert!(line.len() <= 12 || !line.contains(' '));
        }
    }

    #[test]
    fn test_wrap_text_empty_input() {
        assert_eq!(wrap_text("", 20), vec![String::new()]);
    }
}
