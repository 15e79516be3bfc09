//! Pipeline Prompts
//!
//! Prompt builders for the generation pipeline phases and the failure
//! analyst. Every prompt that expects structured output states the exact
//! JSON shape and forbids prose around it.

/// System prompt for the conversational turn loop.
pub const CHAT_SYSTEM_PROMPT: &str = "You are a coding assistant working inside the user's \
project workspace. Use the available tools to inspect and modify files; never fabricate tool \
results. Keep answers concise.";

/// System prompt shared by generation-phase calls.
pub const GENERATION_SYSTEM_PROMPT: &str = "You are a code generation engine. Respond with \
exactly the structure requested, with no commentary before or after it.";

pub fn file_list_prompt(request: &str) -> String {
    format!(
        "Plan the files for this project request:\n\n{request}\n\n\
Respond with ONLY a JSON array of objects, one per file to create, in build order:\n\
[{{\"file_path\": \"relative/path.ext\"}}]\n\
No explanations, no code fences around anything but the JSON."
    )
}

pub fn metadata_prompt(request: &str, file_paths: &[String]) -> String {
    format!(
        "For the project request:\n\n{request}\n\n\
and this exact file list:\n{files}\n\n\
Respond with ONLY a JSON array with EXACTLY one object per file, same order:\n\
[{{\"file_path\": \"...\", \"description\": \"...\", \"exports\": [\"...\"], \
\"imports\": [\"...\"], \"relationships\": [\"other/file.ext\"]}}]\n\
`relationships` must only reference paths from the file list.",
        files = file_paths.join("\n")
    )
}

/// Retry variant used after a count mismatch; restates the contract more
/// forcefully.
pub fn metadata_retry_prompt(request: &str, file_paths: &[String]) -> String {
    format!(
        "{}\n\nIMPORTANT: your previous answer had the wrong number of entries. \
The array MUST contain exactly {} objects, one per listed file, in the same order. \
Do not add, drop, or merge files.",
        metadata_prompt(request, file_paths),
        file_paths.len()
    )
}

pub fn codegen_prompt(
    request: &str,
    file_path: &str,
    description: &str,
    exports: &[String],
    imports: &[String],
    related_excerpts: &str,
) -> String {
    let mut prompt = format!(
        "Generate the complete contents of `{file_path}` for this project request:\n\n\
{request}\n\nFile purpose: {description}\n"
    );
    if !exports.is_empty() {
        prompt.push_str(&format!("It must define/export: {}\n", exports.join(", ")));
    }
    if !imports.is_empty() {
        prompt.push_str(&format!("It imports/uses: {}\n", imports.join(", ")));
    }
    if !related_excerpts.is_empty() {
        prompt.push_str(&format!(
            "\nAlready-generated related files (stay consistent with them):\n{related_excerpts}\n"
        ));
    }
    prompt.push_str("\nRespond with ONLY the raw file contents. No code fences, no commentary.");
    prompt
}

pub fn lint_fix_prompt(file_path: &str, content: &str, findings: &str) -> String {
    format!(
        "The file `{file_path}` has problems:\n\n{findings}\n\n\
Current contents:\n{content}\n\n\
Respond with ONLY the corrected complete file contents. No code fences, no commentary."
    )
}

pub fn commands_prompt(request: &str, file_paths: &[String]) -> String {
    format!(
        "The project for request:\n\n{request}\n\n\
consists of:\n{files}\n\n\
What commands are needed to install dependencies and run it? Respond with ONLY a JSON array:\n\
[{{\"command\": \"...\", \"description\": \"...\", \"check_command\": \"...\" (optional), \
\"fallbacks\": [\"...\"] (optional)}}]\n\
List install commands before run commands.",
        files = file_paths.join("\n")
    )
}

pub fn repair_prompt(failure_output: &str, project_structure: &str) -> String {
    format!(
        "Validation of the generated project failed:\n\n{failure_output}\n\n\
Current project structure and file excerpts:\n{project_structure}\n\n\
Respond with ONLY a JSON array of precise patches:\n\
[{{\"file_path\": \"...\", \"old_string\": \"exact text to replace\", \
\"new_string\": \"replacement\", \"confidence\": 0.0}}]\n\
`old_string` must match the current file text exactly. Use confidence between 0 and 1."
    )
}

pub fn failure_analysis_prompt(command: &str, output: &str, project_markers: &[String]) -> String {
    let markers = if project_markers.is_empty() {
        "none".to_string()
    } else {
        project_markers.join(", ")
    };
    format!(
        "The command `{command}` failed. Output (truncated):\n\n{output}\n\n\
Project manifests present: {markers}\n\n\
Diagnose the failure and propose remedies. Respond with ONLY JSON:\n\
{{\"reason\": \"...\", \"fallback_plans\": [{{\"command\": \"...\", \
\"description\": \"...\", \"should_retry_original\": true}}]}}\n\
Order plans from most to least likely to help."
    )
}
