//! Domain model: the analysis record, its threats, and the closed label sets
//! used across the pipeline and the rendered report.
//!
//! Wire names follow the model gateway's JSON contract (`threat_id`,
//! `threat_name`, `stride_category`, …) so the threat-enumeration stage
//! deserialises straight into [`Threat`] values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// STRIDE category labelling a threat.
///
/// Model replies are free text at this boundary; any label outside the six
/// known categories (spelled with spaces or underscores) falls back to
/// [`StrideCategory::Unknown`] instead of failing the stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StrideCategory {
    Spoofing,
    Tampering,
    Repudiation,
    InformationDisclosure,
    DenialOfService,
    ElevationOfPrivilege,
    Unknown,
}

impl StrideCategory {
    /// Human-readable label, as shown in the rendered report.
    pub fn label(&self) -> &'static str {
        match self {
            StrideCategory::Spoofing => "Spoofing",
            StrideCategory::Tampering => "Tampering",
            StrideCategory::Repudiation => "Repudiation",
            StrideCategory::InformationDisclosure => "Information Disclosure",
            StrideCategory::DenialOfService => "Denial of Service",
            StrideCategory::ElevationOfPrivilege => "Elevation of Privilege",
            StrideCategory::Unknown => "Unknown",
        }
    }
}

impl From<String> for StrideCategory {
    fn from(s: String) -> Self {
        match s.replace('_', " ").trim() {
            "Spoofing" => StrideCategory::Spoofing,
            "Tampering" => StrideCategory::Tampering,
            "Repudiation" => StrideCategory::Repudiation,
            "Information Disclosure" => StrideCategory::InformationDisclosure,
            "Denial of Service" => StrideCategory::DenialOfService,
            "Elevation of Privilege" => StrideCategory::ElevationOfPrivilege,
            _ => StrideCategory::Unknown,
        }
    }
}

impl From<StrideCategory> for String {
    fn from(c: StrideCategory) -> Self {
        c.label().to_string()
    }
}

/// Review status of a single threat.
///
/// Threats always enter as `Pending`; the only exposed transitions are
/// Pending→Accepted and Pending→Rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ThreatStatus {
    #[default]
    Pending,
    Accepted,
    Rejected,
}

impl ThreatStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ThreatStatus::Pending => "Pending",
            ThreatStatus::Accepted => "Accepted",
            ThreatStatus::Rejected => "Rejected",
        }
    }
}

/// Kind of system under analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplicationType {
    LogicalApp,
    LogicalSubcomponent,
    Bash,
    Android,
    Web,
    Api,
}

impl ApplicationType {
    pub fn label(&self) -> &'static str {
        match self {
            ApplicationType::LogicalApp => "Logical Application",
            ApplicationType::LogicalSubcomponent => "Logical Application Subcomponent",
            ApplicationType::Bash => "Bash Script",
            ApplicationType::Android => "Android App",
            ApplicationType::Web => "Web",
            ApplicationType::Api => "API",
        }
    }

    pub const ALL: [ApplicationType; 6] = [
        ApplicationType::LogicalApp,
        ApplicationType::LogicalSubcomponent,
        ApplicationType::Bash,
        ApplicationType::Android,
        ApplicationType::Web,
        ApplicationType::Api,
    ];
}

impl std::str::FromStr for ApplicationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "logical-app" | "logical" => Ok(ApplicationType::LogicalApp),
            "logical-sub" | "subcomponent" => Ok(ApplicationType::LogicalSubcomponent),
            "bash" => Ok(ApplicationType::Bash),
            "android" => Ok(ApplicationType::Android),
            "web" => Ok(ApplicationType::Web),
            "api" => Ok(ApplicationType::Api),
            other => Err(format!(
                "unknown application type '{other}' (expected logical-app, logical-sub, bash, android, web, or api)"
            )),
        }
    }
}

/// Sensitivity classification of the data the system handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataClassification {
    Public,
    Internal,
    Confidential,
    Restricted,
    PciDss,
}

impl DataClassification {
    pub fn label(&self) -> &'static str {
        match self {
            DataClassification::Public => "Public",
            DataClassification::Internal => "Internal",
            DataClassification::Confidential => "Confidential",
            DataClassification::Restricted => "Restricted",
            DataClassification::PciDss => "PCI-DSS",
        }
    }

    pub const ALL: [DataClassification; 5] = [
        DataClassification::Public,
        DataClassification::Internal,
        DataClassification::Confidential,
        DataClassification::Restricted,
        DataClassification::PciDss,
    ];
}

impl std::str::FromStr for DataClassification {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "public" => Ok(DataClassification::Public),
            "internal" => Ok(DataClassification::Internal),
            "confidential" => Ok(DataClassification::Confidential),
            "restricted" => Ok(DataClassification::Restricted),
            "pci-dss" | "pci" => Ok(DataClassification::PciDss),
            other => Err(format!(
                "unknown data classification '{other}' (expected public, internal, confidential, restricted, or pci-dss)"
            )),
        }
    }
}

/// A single identified threat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Threat {
    #[serde(rename = "threat_id")]
    pub id: String,
    #[serde(rename = "threat_name")]
    pub name: String,
    #[serde(rename = "stride_category")]
    pub category: StrideCategory,
    pub description: String,
    pub mitigation: String,
    #[serde(default)]
    pub status: ThreatStatus,
}

impl Threat {
    /// Apply a review decision. Only Pending→Accepted and Pending→Rejected
    /// are allowed; any other transition is refused.
    pub fn set_status(&mut self, status: ThreatStatus) -> bool {
        if self.status == ThreatStatus::Pending && status != ThreatStatus::Pending {
            self.status = status;
            true
        } else {
            false
        }
    }
}

/// Shape of the threat-enumeration stage's structured reply.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThreatList {
    pub threats: Vec<Threat>,
}

impl ThreatList {
    /// Normalise a freshly parsed list for the record invariants: every
    /// threat enters Pending, empty or duplicate ids are re-keyed with
    /// fresh UUIDs.
    pub fn normalise(mut self) -> Vec<Threat> {
        let mut seen = std::collections::HashSet::new();
        for threat in &mut self.threats {
            threat.status = ThreatStatus::Pending;
            let id = threat.id.trim();
            if id.is_empty() || !seen.insert(id.to_string()) {
                let fresh = Uuid::new_v4().to_string();
                seen.insert(fresh.clone());
                threat.id = fresh;
            }
        }
        self.threats
    }
}

/// A completed analysis: the whole unit the store persists.
///
/// Created in memory during a pipeline run and written once the terminal
/// stage is confirmed. Immutable afterwards except for threat status edits
/// applied before the save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: Uuid,
    pub title: String,
    pub app_type: ApplicationType,
    pub classification: DataClassification,
    /// Description exactly as the user typed it.
    pub user_description: String,
    /// Store key of the uploaded diagram, if one was provided.
    pub image_key: Option<String>,
    /// Architecture description produced (and possibly edited) in stage 1.
    pub ai_description: String,
    /// Data-flow description produced in stage 2.
    pub dfd_description: String,
    pub threats: Vec<Threat>,
    /// Always an explicit input; the library never reads a live clock.
    pub created_at: DateTime<Utc>,
}

impl AnalysisRecord {
    /// Apply a review decision to the threat with the given id.
    /// Returns false if the threat does not exist or the transition is
    /// not allowed.
    pub fn set_threat_status(&mut self, threat_id: &str, status: ThreatStatus) -> bool {
        self.threats
            .iter_mut()
            .find(|t| t.id == threat_id)
            .map(|t| t.set_status(status))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stride_labels_round_trip() {
        for c in [
            StrideCategory::Spoofing,
            StrideCategory::Tampering,
            StrideCategory::Repudiation,
            StrideCategory::InformationDisclosure,
            StrideCategory::DenialOfService,
            StrideCategory::ElevationOfPrivilege,
        ] {
            assert_eq!(StrideCategory::from(c.label().to_string()), c);
        }
    }

    #[test]
    fn stride_accepts_underscore_spelling() {
        assert_eq!(
            StrideCategory::from("Information_Disclosure".to_string()),
            StrideCategory::InformationDisclosure
        );
        assert_eq!(
            StrideCategory::from("Denial_of_Service".to_string()),
            StrideCategory::DenialOfService
        );
    }

    #[test]
    fn stride_unknown_fallback() {
        assert_eq!(
            StrideCategory::from("Quantum Hacking".to_string()),
            StrideCategory::Unknown
        );
    }

    #[test]
    fn threat_deserialises_wire_names() {
        let t: Threat = serde_json::from_str(
            r#"{"threat_id":"t-1","threat_name":"SQL injection",
                "stride_category":"Tampering","description":"d",
                "mitigation":"m","status":"Pending"}"#,
        )
        .unwrap();
        assert_eq!(t.id, "t-1");
        assert_eq!(t.category, StrideCategory::Tampering);
        assert_eq!(t.status, ThreatStatus::Pending);
    }

    #[test]
    fn status_transitions_are_guarded() {
        let mut t = threat("a");
        assert!(t.set_status(ThreatStatus::Accepted));
        // Already decided: further edits refused.
        assert!(!t.set_status(ThreatStatus::Rejected));
        assert_eq!(t.status, ThreatStatus::Accepted);

        let mut t = threat("b");
        assert!(!t.set_status(ThreatStatus::Pending));
        assert!(t.set_status(ThreatStatus::Rejected));
    }

    #[test]
    fn normalise_rekeys_duplicates_and_resets_status() {
        let list = ThreatList {
            threats: vec![
                Threat {
                    status: ThreatStatus::Accepted,
                    ..threat("dup")
                },
                threat("dup"),
                threat(""),
            ],
        };
        let threats = list.normalise();
        assert_eq!(threats.len(), 3);
        assert!(threats.iter().all(|t| t.status == ThreatStatus::Pending));
        let ids: std::collections::HashSet<_> = threats.iter().map(|t| t.id.clone()).collect();
        assert_eq!(ids.len(), 3, "ids must be unique after normalisation");
        assert!(!threats.iter().any(|t| t.id.is_empty()));
    }

    fn threat(id: &str) -> Threat {
        Threat {
            id: id.to_string(),
            name: "name".into(),
            category: StrideCategory::Spoofing,
            description: "desc".into(),
            mitigation: "mit".into(),
            status: ThreatStatus::Pending,
        }
    }
}
