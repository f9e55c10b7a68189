// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rulebook YAML inspection.
//!
//! The rule engine parses rulebooks for real; the orchestrator only walks
//! them to extract the `(host, port)` pairs a container request must
//! expose, and to decide whether the rulebook needs a controller token.

use serde_yaml::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RulebookError {
    #[error("rulebook is not valid YAML: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("rulebook is not a list of rulesets")]
    NotASequence,
}

/// Returns `(host, port)` pairs for all sources in a rulebook.
///
/// Each ruleset's `sources` list is walked; a source is a single-key
/// mapping (after dropping its optional `name`) whose value may carry
/// `host` and `port`. Only integer ports count.
pub fn find_ports(rulebook_text: &str) -> Result<Vec<(Option<String>, u16)>, RulebookError> {
    let rulebook: Value = serde_yaml::from_str(rulebook_text)?;
    let rulesets = rulebook.as_sequence().ok_or(RulebookError::NotASequence)?;

    let mut found = Vec::new();
    for ruleset in rulesets {
        let Some(sources) = ruleset.get("sources").and_then(Value::as_sequence) else {
            continue;
        };
        for source in sources {
            let Some(mapping) = source.as_mapping() else { continue };
            // The first key that isn't the display name is the plugin;
            // its value holds the source arguments.
            let args = mapping
                .iter()
                .find(|(k, _)| k.as_str() != Some("name"))
                .map(|(_, v)| v);
            let Some(args) = args else { continue };

            let host = args.get("host").and_then(Value::as_str).map(str::to_string);
            let port = args.get("port").and_then(Value::as_u64);
            if let Some(port) = port {
                if let Ok(port) = u16::try_from(port) {
                    found.push((host, port));
                }
            }
        }
    }
    Ok(found)
}

/// Whether the rulebook launches controller jobs and therefore needs an
/// AAP token at start time.
pub fn requires_controller_token(rulebook_text: &str) -> bool {
    rulebook_text.contains("run_job_template") || rulebook_text.contains("run_workflow_template")
}

#[cfg(test)]
#[path = "rulebook_tests.rs"]
mod tests;
