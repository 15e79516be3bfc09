//! Intent Detection
//!
//! Classifies an incoming user message into one of three task shapes by
//! keyword scoring over the message plus any memory summary, combined
//! with whether the workspace already has files. The tie-break order is a
//! deliberate policy: test-first, then debug-if-files, then
//! create-if-empty, then a files-based default.

/// The task shape a message asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// Build a project from scratch
    CreateNew,
    /// Fix or extend an existing project
    DebugUpgrade,
    /// Run or write tests against the existing project
    TestOnly,
}

const DEBUG_KEYWORDS: &[&str] = &[
    "fix", "bug", "debug", "error", "issue", "broken", "crash", "wrong", "upgrade", "update",
    "improve", "refactor", "modify", "change", "extend", "add ",
];

const CREATE_KEYWORDS: &[&str] = &[
    "create", "build", "make", "new ", "generate", "write", "develop", "implement", "scaffold",
    "app", "project", "website", "from scratch",
];

const TEST_KEYWORDS: &[&str] = &[
    "test", "pytest", "unittest", "unit test", "coverage", "verify", "assert",
];

fn score(text: &str, keywords: &[&str]) -> usize {
    keywords.iter().filter(|kw| text.contains(*kw)).count()
}

/// A short imperative that reads like a one-off shell request rather than
/// a testing task ("run ls", "show the log"). Deliberate extension to the
/// tie-break table; kept narrow.
fn is_simple_command(message: &str) -> bool {
    let trimmed = message.trim().to_lowercase();
    let word_count = trimmed.split_whitespace().count();
    word_count <= 4
        && ["run ", "show ", "list ", "print ", "cat ", "open ", "ls"]
            .iter()
            .any(|prefix| trimmed.starts_with(prefix))
}

/// Classify a user message. Pure function of its three inputs.
pub fn detect_intent(message: &str, memory_summary: &str, workspace_has_files: bool) -> Intent {
    let text = format!("{} {}", message, memory_summary).to_lowercase();

    let debug_score = score(&text, DEBUG_KEYWORDS);
    let create_score = score(&text, CREATE_KEYWORDS);
    let test_score = score(&text, TEST_KEYWORDS);

    // Test intent pre-empts the others, but only against an existing
    // project and never for a plausible one-off command.
    if test_score > 0 && workspace_has_files && !is_simple_command(message) {
        return Intent::TestOnly;
    }

    if workspace_has_files && debug_score >= create_score {
        return Intent::DebugUpgrade;
    }

    if !workspace_has_files && create_score > debug_score {
        return Intent::CreateNew;
    }

    if workspace_has_files {
        Intent::DebugUpgrade
    } else {
        Intent::CreateNew
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_on_empty_workspace() {
        let intent = detect_intent("create a flask todo app", "", false);
        assert_eq!(intent, Intent::CreateNew);
    }

    #[test]
    fn test_debug_preferred_when_files_exist() {
        let intent = detect_intent("fix the login bug", "", true);
        assert_eq!(intent, Intent::DebugUpgrade);
    }

    #[test]
    fn test_test_intent_preempts_debug() {
        let intent = detect_intent("run the pytest suite and fix failures", "", true);
        assert_eq!(intent, Intent::TestOnly);
    }

    #[test]
    fn test_test_keywords_without_files_do_not_win() {
        let intent = detect_intent("write tests for a new parser", "", false);
        assert_eq!(intent, Intent::CreateNew);
    }

    #[test]
    fn test_simple_command_is_not_test_intent() {
        let intent = detect_intent("run ls", "", true);
        assert_eq!(intent, Intent::DebugUpgrade);
    }

    #[test]
    fn test_memory_summary_contributes_to_scores() {
        let intent = detect_intent("continue", "we were debugging the crash in auth.py", true);
        assert_eq!(intent, Intent::DebugUpgrade);
    }

    #[test]
    fn test_default_debug_when_files_and_no_keywords() {
        assert_eq!(detect_intent("hello", "", true), Intent::DebugUpgrade);
    }

    #[test]
    fn test_default_create_when_empty_and_no_keywords() {
        assert_eq!(detect_intent("hello", "", false), Intent::CreateNew);
    }

    #[test]
    fn test_debug_beats_create_on_tie_with_files() {
        // "update" (debug) and "app" (create) both hit once
        let intent = detect_intent("update the app", "", true);
        assert_eq!(intent, Intent::DebugUpgrade);
    }
}
