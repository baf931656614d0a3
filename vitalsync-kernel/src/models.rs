use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Un relevé complet des constantes simulées à un instant donné.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VitalsReading {
    #[serde(with = "time::serde::rfc3339")]
    pub captured_at: OffsetDateTime,
    pub heart_rate: u32,    // bpm
    pub blood_oxygen: u32,  // % SpO2
    pub temperature: f64,   // °C
    pub systolic: u32,      // mmHg
    pub diastolic: u32,     // mmHg
    pub step_count: u64,
    pub stress_index: u32,  // 0-100
    pub sleeping: bool,
}

impl VitalsReading {
    /// Relevé de départ d'une surface fraîchement lancée
    pub fn initial(captured_at: OffsetDateTime) -> Self {
        Self {
            captured_at,
            heart_rate: 75,
            blood_oxygen: 98,
            temperature: 36.6,
            systolic: 120,
            diastolic: 80,
            step_count: 1240,
            stress_index: 25,
            sleeping: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalysisStatus {
    Normal,
    Warning,
    Critical,
}

/// Bilan produit par la passerelle d'analyse, remplacé en bloc à chaque analyse
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthAnalysis {
    pub status: AnalysisStatus,
    pub summary: String,
    pub recommendation: String,
    pub anomalies_detected: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyContact {
    pub id: String,
    pub display_name: String,
    pub phone_number: String,
    pub auto_dial_enabled: bool,
}

/// Enveloppe échangée sur le canal de synchro.
/// Format fil : `{"kind": "VITALS_UPDATE", "payload": {...}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncMessage {
    VitalsUpdate(VitalsReading),
    EmergencyTrigger(bool),
    AnalysisUpdate(HealthAnalysis),
}

impl SyncMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            SyncMessage::VitalsUpdate(_) => "VITALS_UPDATE",
            SyncMessage::EmergencyTrigger(_) => "EMERGENCY_TRIGGER",
            SyncMessage::AnalysisUpdate(_) => "ANALYSIS_UPDATE",
        }
    }
}
