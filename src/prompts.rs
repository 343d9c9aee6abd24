//! Stage prompts for the guided analysis.
//!
//! Centralising every prompt here keeps the invocation and controller code
//! free of prompt text: changing a stage's instructions touches exactly one
//! place, and unit tests can inspect assembled prompts without a live model.

use crate::record::{ApplicationType, DataClassification};

/// Stage 1: synthesise an architecture description from the user's inputs.
pub const ARCHITECTURE_DESCRIPTION_PROMPT: &str = r#"You are a systems architect with expertise in security analysis and threat modeling.
Carefully analyse the inputs provided: the textual system description, the application type, the data classification, and the architecture diagram if one is attached.
Produce a clear, concise, and comprehensive description of the system architecture that synthesises all provided information, identifies the key components and their interactions, and names the critical assets (sensitive data, data stores, communication channels, APIs).
Do NOT invent information that is not present in the inputs."#;

/// Stage 2: derive a data-flow description from the confirmed architecture.
pub const DFD_GENERATOR_PROMPT: &str = r#"You are a security specialist. Considering the architecture diagram image (if provided) and the confirmed architecture description, describe in detail a Data Flow Diagram (DFD) to be used for a threat modeling exercise.
Focus on extracting the component types: Processes, Data Stores, Data Flows, Actors, Trust Boundaries, and External Entities.
Do not represent the flow graphically. Present the information clearly, with a heading for each component type."#;

/// Stage 3: enumerate STRIDE threats as a strict JSON object.
pub const THREAT_MODELER_PROMPT: &str = r#"You are a security specialist building a threat model. Analyse the provided DFD, application type, and data classification.
Identify security threats using the STRIDE methodology.

For each threat provide:
- threat_id: a unique UUID v4.
- threat_name: a short descriptive name.
- description: a detailed description of the threat.
- stride_category: the STRIDE category (Spoofing, Tampering, Repudiation, Information_Disclosure, Denial_of_Service, Elevation_of_Privilege).
- mitigation: a concrete mitigation strategy.
- status: the initial status, which must be 'Pending'.

IMPORTANT: your reply MUST be ONLY a valid, minified JSON object with no additional text, markdown, or formatting. The object must contain a single key "threats" holding a list of threat objects. If no threats are found the list must be empty.

Example output format:
{"threats":[{"threat_id":"...","threat_name":"...","description":"...","stride_category":"...","mitigation":"...","status":"Pending"}]}

Base your analysis strictly on the provided DFD."#;

/// Assemble the stage-1 prompt from the user's raw inputs.
pub fn architecture_prompt(
    description: &str,
    app_type: ApplicationType,
    classification: DataClassification,
) -> String {
    format!(
        "{ARCHITECTURE_DESCRIPTION_PROMPT} User description: {description}, Application type: {}, Data classification: {}",
        app_type.label(),
        classification.label()
    )
}

/// Assemble the stage-2 prompt from the confirmed architecture description.
pub fn dfd_prompt(ai_description: &str) -> String {
    format!("{DFD_GENERATOR_PROMPT} Architecture description: {ai_description}")
}

/// Assemble the stage-3 prompt from the confirmed DFD and input enums.
pub fn threats_prompt(
    dfd: &str,
    app_type: ApplicationType,
    classification: DataClassification,
) -> String {
    format!(
        "{THREAT_MODELER_PROMPT} DFD: {dfd}, Application type: {}, Data classification: {}",
        app_type.label(),
        classification.label()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_prompts_carry_context() {
        let p = architecture_prompt(
            "two services behind a load balancer",
            ApplicationType::Api,
            DataClassification::Confidential,
        );
        assert!(p.contains("two services behind a load balancer"));
        assert!(p.contains("API"));
        assert!(p.contains("Confidential"));

        let p = threats_prompt("the dfd", ApplicationType::Web, DataClassification::PciDss);
        assert!(p.contains("the dfd"));
        assert!(p.contains("PCI-DSS"));
        assert!(p.contains(r#""threats""#));
    }
}
