// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Prompt assembly for agent runs

use crate::outcome::{BLOCKER_MARKER, END_TASK_MARKER, TASK_COMPLETE_MARKER};
use fm_core::{Blueprint, MacroNode};
use std::fmt::Write as _;

/// A dependency's handoff, labeled with its source step.
#[derive(Debug, Clone)]
pub struct DependencyHandoff {
    pub order: i64,
    pub title: String,
    pub content: String,
}

/// Everything the run prompt is assembled from.
pub struct RunPromptArgs<'a> {
    pub blueprint: &'a Blueprint,
    pub node: &'a MacroNode,
    /// 1-based position of this node in the plan's display order.
    pub step_index: usize,
    pub step_count: usize,
    pub handoffs: &'a [DependencyHandoff],
    pub callback_base: &'a str,
}

pub fn callback_url(base: &str, blueprint: &Blueprint, node: &MacroNode, endpoint: &str) -> String {
    format!(
        "{}/api/blueprints/{}/nodes/{}/{}",
        base.trim_end_matches('/'),
        blueprint.id,
        node.id,
        endpoint
    )
}

/// The primary run prompt: plan header, dependency handoffs, task body,
/// protocol trailer.
pub fn build_run_prompt(args: &RunPromptArgs<'_>) -> String {
    let mut prompt = String::new();

    let _ = writeln!(
        prompt,
        "You are executing step {}/{} of a development plan: {}",
        args.step_index, args.step_count, args.blueprint.title
    );
    if let Some(description) = &args.blueprint.description {
        if !description.trim().is_empty() {
            let _ = writeln!(prompt, "\nPlan description: {}", description.trim());
        }
    }

    if !args.handoffs.is_empty() {
        let _ = writeln!(prompt, "\nResults from completed prerequisite steps:");
        for handoff in args.handoffs {
            let _ = writeln!(
                prompt,
                "\n--- Step {} ({}) ---\n{}",
                handoff.order + 1,
                handoff.title,
                handoff.content.trim()
            );
        }
    }

    let _ = writeln!(prompt, "\nYour task: {}", args.node.title);
    if !args.node.description.trim().is_empty() {
        let _ = writeln!(prompt, "\n{}", args.node.description.trim());
    }
    if let Some(extra) = &args.node.prompt {
        if !extra.trim().is_empty() {
            let _ = writeln!(prompt, "\n{}", extra.trim());
        }
    }

    prompt.push_str(&protocol_trailer(args));
    prompt
}

fn protocol_trailer(args: &RunPromptArgs<'_>) -> String {
    let status_url = callback_url(args.callback_base, args.blueprint, args.node, "status-callback");
    let evaluation_url = callback_url(
        args.callback_base,
        args.blueprint,
        args.node,
        "evaluation-callback",
    );

    format!(
        "\nWhen you finish, report your result:\n\
         - On success, print a summary block:\n\
         {TASK_COMPLETE_MARKER}\n\
         <one-paragraph summary of what you did, for the next step>\n\
         {END_TASK_MARKER}\n\
         - If you cannot proceed, print on its own line:\n\
         {BLOCKER_MARKER}\n\
         followed by a JSON object {{\"type\", \"description\", \"suggestion\"}}.\n\
         \n\
         Also POST your final status as JSON to {status_url}\n\
         (body: {{\"status\": \"done\"|\"failed\"|\"blocked\", \"reason\": \"...\"}}), and your\n\
         self-evaluation to {evaluation_url}\n\
         (body: {{\"status\": \"COMPLETE\"|\"NEEDS_REFINEMENT\"|\"HAS_BLOCKER\", \"evaluation\": \"...\",\n\
         \"mutations\": [{{\"action\": \"INSERT_BETWEEN\"|\"ADD_SIBLING\", \"new_node\": {{\"title\", \"description\"}}}}]}}).\n\
         Begin working now.\n"
    )
}

/// Continuation prompt for resuming a failed execution's session.
pub fn build_resume_prompt(args: &RunPromptArgs<'_>) -> String {
    let mut prompt = format!(
        "Continue the task you were working on: {}\n\
         The previous run stopped before completing. Pick up exactly where you\n\
         left off; do not repeat finished work.\n",
        args.node.title
    );
    prompt.push_str(&protocol_trailer(args));
    prompt
}

/// Reevaluation prompt: inspect the project and update the node in place.
pub fn build_reevaluate_prompt(
    blueprint: &Blueprint,
    node: &MacroNode,
    callback_base: &str,
) -> String {
    let evaluation_url = callback_url(callback_base, blueprint, node, "evaluation-callback");
    format!(
        "Review the current state of this project against one step of the plan\n\
         \"{}\".\n\
         \n\
         Step under review: {}\n\
         {}\n\
         \n\
         Read the project source, decide whether this step is already done,\n\
         needs different wording, or is blocked. Then POST JSON to\n\
         {evaluation_url}\n\
         with body {{\"status\": \"COMPLETE\"|\"NEEDS_REFINEMENT\"|\"HAS_BLOCKER\",\n\
         \"evaluation\": \"...\", \"node_update\": {{\"title\", \"description\", \"status\"}},\n\
         \"mutations\": [...]}}. Do not modify any files.\n",
        blueprint.title, node.title, node.description
    )
}

/// Enrich prompt: title/description rewrite only.
pub fn build_enrich_prompt(blueprint: &Blueprint, node: &MacroNode, callback_base: &str) -> String {
    let evaluation_url = callback_url(callback_base, blueprint, node, "evaluation-callback");
    format!(
        "Improve the wording of one step in the plan \"{}\".\n\
         \n\
         Current title: {}\n\
         Current description: {}\n\
         \n\
         Read the project for context, then POST JSON to\n\
         {evaluation_url}\n\
         with body {{\"status\": \"COMPLETE\", \"node_update\": {{\"title\": \"...\",\n\
         \"description\": \"...\"}}}}. Keep the step's intent unchanged. Do not\n\
         modify any files.\n",
        blueprint.title, node.title, node.description
    )
}

#[cfg(test)]
#[path = "prompt_tests.rs"]
mod tests;
