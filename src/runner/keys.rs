//! Single-key shortcuts for the focused runner.

use super::RunnerAction;

/// Key name and action label, in help display order.
pub const BINDINGS: &[(&str, &str)] = &[
    (";", "Next"),
    ("Space", "Next"),
    (".", "Stop"),
    ("Enter", "Stop"),
    ("a", "Stop or abort"),
    ("Esc", "Stop or abort"),
    ("Del", "Close"),
    ("_", "Collapse/expand"),
    ("F1", "Help"),
];

/// Map a key name to the runner action it triggers.
pub fn binding(key: &str) -> Option<RunnerAction> {
    let action = match key {
        ";" | " " | "Space" => RunnerAction::Next,
        "." | "Enter" => RunnerAction::Stop,
        "a" | "Esc" => RunnerAction::StopOrAbort,
        "Del" => RunnerAction::Close,
        "_" => RunnerAction::ToggleIconic,
        "F1" => RunnerAction::Help,
        _ => return None,
    };
    Some(action)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bindings_cover_runner_controls() {
        assert_eq!(binding(";"), Some(RunnerAction::Next));
        assert_eq!(binding(" "), Some(RunnerAction::Next));
        assert_eq!(binding("Enter"), Some(RunnerAction::Stop));
        assert_eq!(binding("Esc"), Some(RunnerAction::StopOrAbort));
        assert_eq!(binding("Del"), Some(RunnerAction::Close));
        assert_eq!(binding("F1"), Some(RunnerAction::Help));
        assert_eq!(binding("x"), None);
    }

    #[test]
    fn every_listed_binding_resolves() {
        for (key, _) in BINDINGS {
            assert!(binding(key).is_some(), "{key} is listed but unbound");
        }
    }
}
