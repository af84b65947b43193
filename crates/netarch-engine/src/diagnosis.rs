//! Lab diagnosis: the student pastes a failing configuration together with
//! their own guess at the fault and gets Socratic feedback.

use chrono::Local;
use serde::Deserialize;
use tracing::{info, instrument};

use netarch_core::Module;
use netarch_llm::StreamControl;

use crate::error::EngineError;
use crate::session::{HistoryEntry, SessionContext};
use crate::tutor::{entry_title, required, Tutor};

/// Lab topics offered in the diagnosis form.
pub const DIAGNOSIS_TOPICS: [&str; 20] = [
    "OSPF neighbor",
    "Inter-VLAN routing",
    "ACL policy",
    "NAT configuration",
    "BGP path selection",
    "RIP routing loop",
    "STP root bridge election",
    "Port security",
    "DHCP service failure",
    "DNS resolution failure",
    "Static routing",
    "EIGRP neighbor relationship",
    "HSRP/VRRP gateway redundancy",
    "Wireless AP association",
    "IPv6 addressing",
    "QoS policy",
    "MPLS LDP neighbor",
    "IPsec VPN tunnel",
    "Firewall policy blocking",
    "Network loop detection",
];

#[derive(Clone, Debug, Deserialize)]
pub struct DiagnosisRequest {
    pub topic: String,
    /// What the student thinks is wrong. Required before any feedback.
    pub hypothesis: String,
    /// Device configuration or error log.
    pub code: String,
}

impl Tutor {
    #[instrument(skip_all, fields(topic = %request.topic))]
    pub async fn submit_diagnosis(
        &self,
        ctx: &mut SessionContext,
        request: &DiagnosisRequest,
        control: &StreamControl,
    ) -> Result<HistoryEntry, EngineError> {
        ctx.require_user()?;
        let topic = required(&request.topic, "Pick a lab topic.")?;
        let hypothesis = required(
            &request.hypothesis,
            "Describe what you think is wrong first. Learning cannot rely on the AI alone.",
        )?;
        let code = required(&request.code, "Paste the device configuration or error log.")?;

        let feedback = self
            .run_completion(
                ctx,
                Module::Diagnosis,
                control,
                self.client.diagnose(code, hypothesis, topic),
            )
            .await?;

        let entry = self.record(ctx, Module::Diagnosis, entry_title(topic, Local::now()), feedback)?;
        info!(conversation_id = entry.id.get(), "diagnosis recorded");
        Ok(entry)
    }
}
