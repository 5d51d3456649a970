// src/llm_extract.rs

use crate::classify::RoleSet;
use crate::config::GeminiSection;
use crate::fields::{
    DocumentDetails, ExtractedValue, ExtractionMeta, Field, FieldValue, Source, TokenUsage,
};
use crate::oracle::{Oracle, OracleError};
use crate::pdf_extract::PdfDocument;
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const SINGLE_PROMPT: &str = r#"You are a shipping document analyst.
Read the layout of the attached document (bill of lading, invoice or packing list) and extract the shipment totals.

CARTONS ARE NOT PIECES
- Documents often show "Total PCS", "Total Garments Quantity", "Assort Qty" next to "Total CTNS".
- Report the CARTON count only (units: CTN, CTNS, CARTONS, PKGS).
- Find the "CTN QTY" / "CTNS" / "CARTONS" column and take its value in the TOTAL row.
- A "CARTON MEAS" summary table, if present, lists CTN and CBM and can be used to cross-check.

VOLUME
- The CBM / Vol figure is usually in a summary or measurement table near the bottom.
- Do not add up rows unless no total exists.

Return ONLY this JSON object, no markdown fences:
{
  "_analysis": "which row and column each value came from",
  "assort_quantity": number or null,
  "cartons": number or null,
  "gross_weight": number or null (kilograms),
  "cbm": number or null
}"#;

const COMBINED_PROMPT: &str = r#"You are a shipping document analyst.
The attached PDF contains up to three documents merged together: a bill of lading, a commercial invoice and a packing list.
For each document separately, extract the shipment totals.

CARTONS ARE NOT PIECES: report the carton count (CTN, CTNS, CARTONS, PKGS), never "Total PCS", garment or assortment quantities.
Gross weight is in kilograms, volume in CBM.

Return ONLY this JSON object, no markdown fences. Use null for a document that is not in the PDF:
{
  "doc_a": {"cartons": number or null, "gross_weight": number or null, "cbm": number or null},
  "doc_b": {"cartons": number or null, "gross_weight": number or null, "cbm": number or null},
  "doc_c": {"cartons": number or null, "gross_weight": number or null, "cbm": number or null}
}
doc_a is the bill of lading, doc_b the invoice, doc_c the packing list."#;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
    Text {
        text: &'a str,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: &'static str,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    response_mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
    #[serde(default)]
    total_token_count: u64,
}

impl GenerateResponse {
    fn text(&self) -> Option<String> {
        let parts = &self.candidates.first()?.content.as_ref()?.parts;
        let text: String = parts.iter().filter_map(|p| p.text.as_deref()).collect();
        (!text.trim().is_empty()).then_some(text)
    }

    fn usage(&self) -> Option<TokenUsage> {
        self.usage_metadata.as_ref().map(|u| TokenUsage {
            input_tokens: u.prompt_token_count,
            output_tokens: u.candidates_token_count,
            total_tokens: u.total_token_count,
        })
    }
}

/// The three totals as the model reports them.
#[derive(Debug, Default, Deserialize)]
struct VisionFields {
    #[serde(default, rename = "_analysis")]
    analysis: Option<String>,
    #[serde(default)]
    assort_quantity: Option<FieldValue>,
    #[serde(default)]
    cartons: Option<FieldValue>,
    #[serde(default)]
    gross_weight: Option<FieldValue>,
    #[serde(default)]
    cbm: Option<FieldValue>,
}

impl VisionFields {
    fn into_details(self, meta: ExtractionMeta) -> DocumentDetails {
        let mut details = DocumentDetails {
            meta: Some(meta),
            ..DocumentDetails::default()
        };
        for (field, value) in [
            (Field::Cartons, self.cartons),
            (Field::GrossWeight, self.gross_weight),
            (Field::Cbm, self.cbm),
        ] {
            details.set(field, ExtractedValue::new(field, value, 1.0, Source::Ai));
        }
        details
    }
}

/// Gemini vision model reading the PDF directly.
pub struct VisionOracle {
    client: Client,
    base_url: String,
    models: Vec<String>,
    api_key: String,
}

impl VisionOracle {
    pub fn from_config(cfg: &GeminiSection) -> Result<Self, OracleError> {
        let api_key = std::env::var(&cfg.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| OracleError::MissingApiKey(cfg.api_key_env.clone()))?;
        if cfg.models.is_empty() {
            return Err(OracleError::NoModels);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;

        info!(
            url = %cfg.base_url,
            models = ?cfg.models,
            "Using Gemini vision backend"
        );
        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            models: cfg.models.clone(),
            api_key,
        })
    }

    async fn call_model(
        &self,
        model: &str,
        request: &GenerateRequest<'_>,
    ) -> Result<GenerateResponse, OracleError> {
        let url = format!("{}/models/{model}:generateContent", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::Api { status, body });
        }

        Ok(response.json().await?)
    }

    /// Send the PDF with a prompt, trying each configured model in order.
    async fn generate(
        &self,
        doc: &PdfDocument,
        prompt: &str,
    ) -> Result<(String, ExtractionMeta), OracleError> {
        let request = build_request(&doc.bytes, prompt);
        let start = Instant::now();
        let mut last_error = None;

        for model in &self.models {
            debug!(model = %model, document = %doc.name, "Analyzing");
            match self.call_model(model, &request).await {
                Ok(response) => {
                    let Some(text) = response.text() else {
                        warn!(model = %model, "Model returned no text");
                        last_error = Some(OracleError::Parse("empty response".to_string()));
                        continue;
                    };
                    info!(model = %model, document = %doc.name, "Model answered");
                    let meta = ExtractionMeta {
                        model: Some(model.clone()),
                        duration_ms: start.elapsed().as_millis() as u64,
                        usage: response.usage(),
                    };
                    return Ok((text, meta));
                }
                Err(e) => {
                    warn!(model = %model, error = %e, "Model failed");
                    last_error = Some(e);
                }
            }
        }

        Err(match last_error {
            Some(e) if is_quota_error(&e) => OracleError::QuotaExceeded,
            Some(e) => OracleError::AllModelsFailed(e.to_string()),
            None => OracleError::NoModels,
        })
    }
}

#[async_trait]
impl Oracle for VisionOracle {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn extract(&self, doc: &PdfDocument) -> Result<DocumentDetails, OracleError> {
        let (text, meta) = self.generate(doc, SINGLE_PROMPT).await?;
        let fields: VisionFields = parse_model_json(&text)?;
        debug!(
            analysis = ?fields.analysis,
            assort_quantity = ?fields.assort_quantity,
            "Model reasoning"
        );

        let details = fields.into_details(meta);
        let (filled, total) = details.coverage();
        info!(document = %doc.name, filled, total, "Vision extraction result");
        Ok(details)
    }

    async fn extract_combined(
        &self,
        doc: &PdfDocument,
    ) -> Result<RoleSet<Option<DocumentDetails>>, OracleError> {
        let (text, meta) = self.generate(doc, COMBINED_PROMPT).await?;
        let split: RoleSet<Option<VisionFields>> = parse_model_json(&text)?;
        Ok(split.map(|_, fields| fields.map(|f| f.into_details(meta.clone()))))
    }
}

fn build_request<'a>(pdf_bytes: &[u8], prompt: &'a str) -> GenerateRequest<'a> {
    GenerateRequest {
        contents: vec![Content {
            role: "user",
            parts: vec![
                Part::Inline {
                    inline_data: InlineData {
                        mime_type: "application/pdf",
                        data: STANDARD.encode(pdf_bytes),
                    },
                },
                Part::Text { text: prompt },
            ],
        }],
        generation_config: GenerationConfig {
            temperature: 0.0,
            response_mime_type: "application/json",
        },
    }
}

fn is_quota_error(e: &OracleError) -> bool {
    match e {
        OracleError::Api { status, body } => {
            *status == 429 || body.contains("Quota") || body.contains("RESOURCE_EXHAUSTED")
        }
        OracleError::QuotaExceeded => true,
        _ => false,
    }
}

/// Strip markdown fences and any reasoning around the JSON object, then parse it.
fn parse_model_json<T: for<'de> Deserialize<'de>>(content: &str) -> Result<T, OracleError> {
    let json_str = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    let json_str = extract_json_object(json_str)?;

    serde_json::from_str(json_str)
        .map_err(|e| OracleError::Parse(format!("{e}\nRaw: {json_str}")))
}

/// Extract the outermost JSON object from a string that may contain
/// surrounding text.
fn extract_json_object(s: &str) -> Result<&str, OracleError> {
    let start = s
        .find('{')
        .ok_or_else(|| OracleError::Parse("no '{' in model response".to_string()))?;
    let end = s
        .rfind('}')
        .ok_or_else(|| OracleError::Parse("no '}' in model response".to_string()))?;
    if end <= start {
        return Err(OracleError::Parse("malformed JSON in model response".to_string()));
    }
    Ok(&s[start..=end])
}
