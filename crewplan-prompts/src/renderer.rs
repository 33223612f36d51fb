//! Conflict prompt rendering

use handlebars::{handlebars_helper, Handlebars};
use serde_json::json;
use tracing::trace;

use crewplan_core::pipeline::ProposalRequest;
use crewplan_core::solution::{Strategy, MAX_DESCRIPTION_CHARS};

use crate::Result;

const CONFLICT_TEMPLATE_NAME: &str = "conflict";

/// Default prompt asking for structured remediation proposals
pub const DEFAULT_CONFLICT_TEMPLATE: &str = r#"You are a construction scheduling assistant.

Resource {{conflict.resource_name}} ({{conflict.role}}) is booked for {{fmt_hours conflict.allocated_hours}}h against a capacity of {{fmt_hours conflict.capacity_hours}}h on {{conflict.date}}. That is {{fmt_hours conflict.overallocation_hours}}h over ({{fmt_percent conflict.overallocation_ratio}}), severity {{conflict.severity}}.

Tasks on that day:
{{#each conflict.tasks}}
- {{task_name}} (task {{task_id}}, project {{project_id}}): {{fmt_hours hours}}h, {{#if on_critical_path}}on the critical path{{else}}{{slack_days}} days of slack{{/if}}
{{/each}}

Propose between {{min_proposals}} and {{max_proposals}} remediations using only these strategies: {{#each strategies}}{{this}}{{#unless @last}}, {{/unless}}{{/each}}.

Answer with a JSON array only. Each element has:
- strategy: one of the strategies above
- description: at most {{max_description}} characters
- reasoning: why it resolves the overallocation
- feasibility: number from 0 to 1
- complexity: number from 0 to 1
- preserves_deadline: true or false
- impact: {"affected_tasks": [task ids], "days_impact": integer, "resources_needed": integer}
"#;

handlebars_helper!(fmt_hours: |value: f64| format!("{:.1}", value));
handlebars_helper!(fmt_percent: |ratio: f64| format!("{:.1}%", ratio * 100.0));

/// Renders the per-conflict prompt from a handlebars template
#[derive(Debug, Clone)]
pub struct ConflictPromptRenderer {
    handlebars: Handlebars<'static>,
}

impl ConflictPromptRenderer {
    /// Renderer using the built-in template
    pub fn new() -> Result<Self> {
        Self::with_template(DEFAULT_CONFLICT_TEMPLATE)
    }

    /// Renderer using a custom template; fails on invalid syntax
    pub fn with_template(template: &str) -> Result<Self> {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);
        handlebars.register_escape_fn(handlebars::no_escape);
        handlebars.register_helper("fmt_hours", Box::new(fmt_hours));
        handlebars.register_helper("fmt_percent", Box::new(fmt_percent));
        handlebars.register_template_string(CONFLICT_TEMPLATE_NAME, template)?;
        Ok(Self { handlebars })
    }

    /// Template data for a request; also sent to the provider as the structured payload
    pub fn context(request: &ProposalRequest) -> serde_json::Value {
        let strategies: Vec<&str> = Strategy::ALL
            .iter()
            .filter(|s| **s != Strategy::Unknown)
            .map(|s| s.as_str())
            .collect();
        json!({
            "execution_id": request.execution_id,
            "conflict": request.conflict,
            "min_proposals": request.min_proposals,
            "max_proposals": request.max_proposals,
            "strategies": strategies,
            "max_description": MAX_DESCRIPTION_CHARS,
        })
    }

    pub fn render(&self, request: &ProposalRequest) -> Result<String> {
        let prompt = self
            .handlebars
            .render(CONFLICT_TEMPLATE_NAME, &Self::context(request))?;
        trace!(conflict_id = %request.conflict.id, chars = prompt.len(), "Rendered conflict prompt");
        Ok(prompt)
    }
}
