//! Job lifecycle events, published for telemetry only.
//!
//! Nothing in the pipeline depends on these; subscribers come and go and a
//! dropped event is not an error.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobEvent {
    Started {
        job_id: String,
        product_id: String,
        attempt: u32,
    },

    /// Progress percent, 0-100.
    Progress { job_id: String, percent: u8 },

    Completed {
        job_id: String,
        product_id: String,
        quantity: i64,
        duration_ms: u64,
    },

    Failed {
        job_id: String,
        product_id: String,
        error: String,
        attempt: u32,
        will_retry: bool,
    },

    /// A lease expired while the job was active; the store re-queued it.
    Stalled { job_id: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn started_serializes() {
        let event = JobEvent::Started {
            job_id: "marketplace_a-PROD-1-1".to_string(),
            product_id: "PROD-1".to_string(),
            attempt: 1,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("Started"));
        assert!(json.contains("PROD-1"));
    }

    #[test]
    fn failed_carries_retry_flag() {
        let event = JobEvent::Failed {
            job_id: "j".to_string(),
            product_id: "PROD-1".to_string(),
            error: "transient storage failure".to_string(),
            attempt: 2,
            will_retry: true,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("will_retry"));
    }

    #[test]
    fn events_roundtrip_serialize() {
        let events = vec![
            JobEvent::Progress {
                job_id: "j".to_string(),
                percent: 50,
            },
            JobEvent::Completed {
                job_id: "j".to_string(),
                product_id: "PROD-1".to_string(),
                quantity: 20,
                duration_ms: 12,
            },
            JobEvent::Stalled {
                job_id: "j".to_string(),
            },
        ];
        for event in events {
            let json = serde_json::to_string(&event).unwrap();
            let _: JobEvent = serde_json::from_str(&json).unwrap();
        }
    }
}
