//! The session a first-time visitor starts with.

use playground_common::{FileSet, PlaygroundState};

/// File selected in a fresh session.
pub const DEFAULT_ACTIVE: &str = "main.ts";

/// Source of the default entry file.
pub const DEFAULT_SOURCE: &str = "const x: number = 1";

/// Default project configuration, two-space indented in key order.
pub const DEFAULT_TSCONFIG: &str = r#"{
  "compilerOptions": {
    "target": "esnext",
    "module": "esnext",
    "strict": true,
    "esModuleInterop": true,
    "outDir": "dist"
  }
}"#;

/// Files of a fresh session.
pub fn default_files() -> FileSet {
    FileSet::from_pairs([
        (DEFAULT_ACTIVE, DEFAULT_SOURCE),
        ("tsconfig.json", DEFAULT_TSCONFIG),
    ])
}

/// A fresh session running `command` against `version`.
pub fn default_state(command: &str, version: &str) -> PlaygroundState {
    PlaygroundState {
        files: default_files(),
        command: command.to_string(),
        version: version.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tsconfig_is_valid_json() {
        let value: serde_json::Value = serde_json::from_str(DEFAULT_TSCONFIG).unwrap();
        assert_eq!(value["compilerOptions"]["outDir"], "dist");
        assert_eq!(value["compilerOptions"]["strict"], true);
    }

    #[test]
    fn test_default_state() {
        let state = default_state("tsc", "latest");
        assert_eq!(state.files.paths(), ["main.ts", "tsconfig.json"]);
        assert_eq!(state.files.content(DEFAULT_ACTIVE), Some(DEFAULT_SOURCE));
        assert_eq!(state.command, "tsc");
        assert_eq!(state.version, "latest");
    }
}
