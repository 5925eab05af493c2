use crate::audit::event::RunEvent;

/// Mirrors a persisted [`RunEvent`] onto the process's structured log sink.
/// This is the only sanctioned path from an in-process event to stdout: no
/// document bytes, chunk text, or raw LM responses are logged, only
/// identifiers, counts, hashes, and classification codes (the event payload
/// already obeys that discipline by construction).
pub fn log_run_event(event: &RunEvent) {
    tracing::info!(
        event_type = %event.event_type,
        run_id = %event.run_id,
        tenant_id = %event.tenant_id,
        payload = %event.payload,
        "run event",
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn logging_an_event_does_not_panic() {
        let event = RunEvent {
            id: 1,
            run_id: "r1".to_string(),
            tenant_id: "t1".to_string(),
            created_at: "2026-01-01T00:00:00Z".to_string(),
            event_type: "run.state_changed".to_string(),
            payload: json!({"from_status": "queued", "to_status": "running"}),
        };
        log_run_event(&event);
    }
}
