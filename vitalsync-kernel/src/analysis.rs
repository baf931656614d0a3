/**
 * PASSERELLE D'ANALYSE - Bilan de santé via le service de raisonnement (Gemini)
 *
 * RÔLE :
 * Transforme une fenêtre récente de l'historique en UNE requête vers le service
 * externe, et normalise la réponse en HealthAnalysis, ou en repli déterministe.
 *
 * FONCTIONNEMENT :
 * - Fenêtre = 20 derniers relevés (configurable) pour borner la charge utile
 * - Consignes cliniques fixes + relevés sérialisés dans le prompt
 * - Réponse contrainte en JSON (responseSchema), validée strictement
 * - try_analyze() : Result avec 2 causes nommées (Unconfigured / Unreachable)
 * - analyze() : ne renvoie jamais d'erreur, convertit en bilan de repli
 *
 * Pas de retry, pas de cache, pas de timeout : l'appelant gère son drapeau "occupé".
 */

use crate::config::AnalysisConf;
use crate::models::{AnalysisStatus, HealthAnalysis, VitalsReading};
use serde::{Deserialize, Serialize};
use serde_json::json;

pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("analysis service credential not configured")]
    Unconfigured,
    #[error("analysis service unreachable: {0}")]
    Unreachable(String),
}

impl From<reqwest::Error> for AnalysisError {
    fn from(e: reqwest::Error) -> Self {
        AnalysisError::Unreachable(e.to_string())
    }
}

impl From<serde_json::Error> for AnalysisError {
    fn from(e: serde_json::Error) -> Self {
        AnalysisError::Unreachable(format!("invalid response: {e}"))
    }
}

impl AnalysisError {
    /// Bilan de repli, toujours conforme à la forme d'un bilan réel
    pub fn fallback(&self) -> HealthAnalysis {
        match self {
            AnalysisError::Unconfigured => HealthAnalysis {
                status: AnalysisStatus::Normal,
                summary: "API Key missing. Cannot perform AI analysis.".into(),
                recommendation: "Please configure the environment.".into(),
                anomalies_detected: Vec::new(),
            },
            AnalysisError::Unreachable(_) => HealthAnalysis {
                status: AnalysisStatus::Warning,
                summary: "Unable to connect to AI Analysis service.".into(),
                recommendation: "Check network connection.".into(),
                anomalies_detected: vec!["AI Service Unavailable".into()],
            },
        }
    }
}

const INSTRUCTIONS: &str = "\
Analyze the following time-series health data collected from a wearable device.
Determine the user's health status, identify any patterns, and detect anomalies.

Data Context:
- Resting Heart Rate: Normal is 60-100 bpm.
- SpO2 (bloodOxygen): Below 95% is concerning.
- Body Temperature: Normal is 36.1C - 37.2C. Above 38C is fever.
- Blood Pressure: Normal is around 120/80 mmHg.
  - Hypertension: Systolic > 140 or Diastolic > 90.
  - Hypotension: Systolic < 90 or Diastolic < 60.
- Stress Index: > 80 is high.

Task:
1. Analyze trends in Heart Rate, Blood Pressure, and Temperature.
2. Check for correlation between vitals (e.g., rising temp + high HR = possible infection).
3. Flag specific anomalies.
";

// ============ FORMAT FIL generateContent ============

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    response_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

fn response_schema() -> serde_json::Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "status": { "type": "STRING", "enum": ["NORMAL", "WARNING", "CRITICAL"] },
            "summary": { "type": "STRING" },
            "recommendation": { "type": "STRING" },
            "anomaliesDetected": { "type": "ARRAY", "items": { "type": "STRING" } }
        },
        "required": ["status", "summary", "recommendation", "anomaliesDetected"]
    })
}

/// Texte complet envoyé au service : consignes puis relevés sérialisés
pub fn build_prompt(window: &[VitalsReading]) -> Result<String, serde_json::Error> {
    let data = serde_json::to_string(window)?;
    Ok(format!("{INSTRUCTIONS}\nData: {data}"))
}

/// Parse strict du texte renvoyé par le modèle
pub fn parse_analysis(text: &str) -> Result<HealthAnalysis, AnalysisError> {
    let analysis: HealthAnalysis = serde_json::from_str(text.trim())?;
    if analysis.summary.trim().is_empty() {
        return Err(AnalysisError::Unreachable("empty summary in response".into()));
    }
    Ok(analysis)
}

pub struct AnalysisGateway {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    window: usize,
    api_key: Option<String>,
}

impl AnalysisGateway {
    pub fn new(conf: &AnalysisConf, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: conf.endpoint.trim_end_matches('/').to_string(),
            model: conf.model.clone(),
            window: conf.window.max(1),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    #[cfg(test)]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Clé lue depuis l'environnement ; absente = état de config reconnu, pas une erreur
    pub fn from_env(conf: &AnalysisConf) -> Self {
        Self::new(conf, std::env::var(API_KEY_ENV).ok())
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Ne renvoie jamais d'erreur : les échecs deviennent un bilan de repli
    pub async fn analyze(&self, history: &[VitalsReading]) -> HealthAnalysis {
        match self.try_analyze(history).await {
            Ok(analysis) => analysis,
            Err(e) => {
                match &e {
                    AnalysisError::Unconfigured => tracing::info!("analysis skipped: {e}"),
                    AnalysisError::Unreachable(_) => tracing::error!("AI analysis failed: {e}"),
                }
                e.fallback()
            }
        }
    }

    pub async fn try_analyze(&self, history: &[VitalsReading]) -> Result<HealthAnalysis, AnalysisError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(AnalysisError::Unconfigured);
        };

        let skip = history.len().saturating_sub(self.window);
        let window = &history[skip..];

        let request = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part { text: build_prompt(window)? }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                response_schema: response_schema(),
            },
        };

        let url = format!("{}/v1beta/models/{}:generateContent", self.endpoint, self.model);
        tracing::debug!(readings = window.len(), model = %self.model, "sending analysis request");

        let response: GenerateResponse = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let text: String = response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(AnalysisError::Unreachable("no response from AI".into()));
        }

        let analysis = parse_analysis(&text)?;
        tracing::info!(status = ?analysis.status, anomalies = analysis.anomalies_detected.len(), "analysis received");
        Ok(analysis)
    }
}
