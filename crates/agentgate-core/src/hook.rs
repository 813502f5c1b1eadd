//! Stdin/exit-code shim over the spawn gate.
//!
//! The host delivers one JSON object per decision on standard input and
//! interprets the exit code: `0` allows the spawn, `2` blocks it with a
//! rationale on standard error. The shim is written over generic
//! `Read`/`Write` so the decision path is testable without process I/O.
//!
//! Malformed input fails open (exit 0) with a parse-anomaly audit record:
//! blocking the host on garbage would halt unrelated functionality.

use std::io::{Read, Write};

use serde::Deserialize;

use crate::gate::{SpawnGate, SpawnRequest};

/// Exit code signalling "allow".
pub const EXIT_ALLOW: i32 = 0;
/// Exit code signalling "block".
pub const EXIT_BLOCK: i32 = 2;

// Hook payload: decision fields may appear at the top level or nested under
// `tool_input`; top-level values win.
#[derive(Debug, Default, Deserialize)]
struct HookPayload {
    subagent_type: Option<String>,
    name: Option<String>,
    team_name: Option<String>,
    run_in_background: Option<bool>,
    session_id: Option<String>,
    tool_input: Option<Box<HookPayload>>,
}

impl HookPayload {
    fn into_request(self) -> SpawnRequest {
        let nested = self.tool_input.map(|b| *b).unwrap_or_default();
        SpawnRequest::new(
            self.subagent_type
                .or(nested.subagent_type)
                .unwrap_or_default(),
            self.name.or(nested.name),
            self.team_name.or(nested.team_name),
            self.run_in_background
                .or(nested.run_in_background)
                .unwrap_or(false),
            self.session_id.or(nested.session_id).unwrap_or_default(),
        )
    }
}

/// Run one hook decision: read a JSON payload, consult the gate, write the
/// block rationale if any, and return the process exit code.
pub fn run_hook(gate: &SpawnGate, mut input: impl Read, mut stderr: impl Write) -> i32 {
    let mut raw = String::new();
    if let Err(e) = input.read_to_string(&mut raw) {
        gate.audit_parse_anomaly(&e.to_string());
        return EXIT_ALLOW;
    }

    let payload: HookPayload = match serde_json::from_str(&raw) {
        Ok(p) => p,
        Err(e) => {
            gate.audit_parse_anomaly(&e.to_string());
            return EXIT_ALLOW;
        }
    };

    let decision = gate.check(&payload.into_request());
    if decision.allow {
        EXIT_ALLOW
    } else {
        let _ = writeln!(stderr, "{}", decision.message);
        EXIT_BLOCK
    }
}
