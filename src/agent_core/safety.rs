//! SafetyClassifier: decides which tool calls need a human "yes" first.
//!
//! A classifier is an ordered list of [`DangerRule`]s; the first rule that
//! matches wins. The default set flags:
//! - shell commands that delete, format or power off (PowerShell, cmd and
//!   POSIX spellings, case-insensitive)
//! - skills whose name says they destroy something (`delete_file`,
//!   `remove_directory`, ...)
//!
//! The rules lean towards false positives. New rules are added with
//! [`SafetyClassifier::with_rule`]; the engine only ever sees `classify`.

use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─── Verdict ────────────────────────────────────────────────────────────────

/// Outcome of classifying one tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub dangerous: bool,
    /// What the call would do, phrased for the confirmation prompt. Empty
    /// when safe.
    pub description: String,
}

impl Verdict {
    pub fn safe() -> Self {
        Self {
            dangerous: false,
            description: String::new(),
        }
    }

    pub fn dangerous(description: impl Into<String>) -> Self {
        Self {
            dangerous: true,
            description: description.into(),
        }
    }
}

// ─── Rules ──────────────────────────────────────────────────────────────────

/// One danger check. Returns a description when the call matches.
pub trait DangerRule: Send + Sync {
    fn check(&self, tool_name: &str, args: &Value) -> Option<String>;

    /// Short name for logs.
    fn name(&self) -> &str {
        "custom"
    }
}

impl<F> DangerRule for F
where
    F: Fn(&str, &Value) -> Option<String> + Send + Sync,
{
    fn check(&self, tool_name: &str, args: &Value) -> Option<String> {
        self(tool_name, args)
    }
}

/// Tools that run a shell command line.
const SHELL_TOOLS: &[&str] = &[
    "execute_powershell",
    "execute_command",
    "execute_shell",
    "run_command",
    "run_shell",
    "shell",
    "terminal",
];

/// Argument keys that carry the command line, tried in order.
const COMMAND_KEYS: &[&str] = &["command", "cmd", "script"];

struct ShellPattern {
    regex: Regex,
    label: &'static str,
}

static SHELL_PATTERNS: Lazy<Vec<ShellPattern>> = Lazy::new(|| {
    let table: &[(&str, &'static str)] = &[
        // PowerShell
        (r"(?i)\bRemove-Item\b", "Delete operation"),
        (r"(?i)\bRemove-ItemProperty\b", "Delete operation"),
        (r"(?i)\bClear-Content\b", "Delete operation"),
        (r"(?i)(^|[\s;|&(])(ri|rd)(\s|$)", "Delete operation"),
        (r"(?i)\bFormat-Volume\b", "Format operation"),
        (r"(?i)\b(Stop|Restart)-Computer\b", "Shutdown operation"),
        // cmd.exe
        (r"(?i)\bdel(\s|$)", "Delete operation"),
        (r"(?i)\berase(\s|$)", "Delete operation"),
        (r"(?i)\bformat(\.com)?\s+[a-z]:", "Format operation"),
        // POSIX
        (r"(?i)\brm\b", "Delete operation"),
        (r"(?i)\brmdir\b", "Delete operation"),
        (r"(?i)\bunlink\s", "Delete operation"),
        (r"(?i)\bshred\b", "Delete operation"),
        (r"(?i)\s-delete\b", "Delete operation"),
        (r"(?i)\bmkfs(\.\w+)?\b", "Format operation"),
        (r"(?i)\bdd\s+.*\bof=", "Format operation"),
        (r"(?i)\b(shutdown|reboot|poweroff|halt)\b", "Shutdown operation"),
    ];
    table
        .iter()
        .map(|(pattern, label)| ShellPattern {
            regex: Regex::new(pattern).unwrap(),
            label,
        })
        .collect()
});

/// Flags shell-execution tools whose command line deletes, formats or
/// powers off.
#[derive(Debug, Clone)]
pub struct ShellCommandRule {
    tools: Vec<String>,
}

impl Default for ShellCommandRule {
    fn default() -> Self {
        Self {
            tools: SHELL_TOOLS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ShellCommandRule {
    /// Also treat `tool_name` as a shell tool.
    pub fn with_tool(mut self, tool_name: impl Into<String>) -> Self {
        self.tools.push(tool_name.into());
        self
    }

    fn is_shell_tool(&self, tool_name: &str) -> bool {
        self.tools.iter().any(|t| t.eq_ignore_ascii_case(tool_name))
    }
}

impl DangerRule for ShellCommandRule {
    fn check(&self, tool_name: &str, args: &Value) -> Option<String> {
        if !self.is_shell_tool(tool_name) {
            return None;
        }

        // The command key first, then every string anywhere in the arguments.
        let mut candidates: Vec<String> = COMMAND_KEYS
            .iter()
            .filter_map(|key| args.get(*key).and_then(|v| v.as_str()))
            .map(|s| s.trim().to_string())
            .collect();
        collect_strings(args, &mut candidates);

        candidates.iter().find_map(|text| {
            SHELL_PATTERNS
                .iter()
                .find(|p| p.regex.is_match(text))
                .map(|p| format!("{}: {text}", p.label))
        })
    }

    fn name(&self) -> &str {
        "shell_command"
    }
}

/// Verbs that, as a skill-name prefix, mean the skill destroys data.
const DESTRUCTIVE_PREFIXES: &[&str] = &[
    "delete", "remove", "erase", "destroy", "drop", "purge", "wipe", "format", "truncate",
];

/// Flags skills named after a destructive verb (`delete_file`, `RemoveFolder`).
#[derive(Debug, Clone, Default)]
pub struct DestructiveNameRule;

impl DangerRule for DestructiveNameRule {
    fn check(&self, tool_name: &str, args: &Value) -> Option<String> {
        let bare = tool_name.rsplit('.').next().unwrap_or(tool_name);
        let lower = bare.to_ascii_lowercase();
        let destructive = DESTRUCTIVE_PREFIXES.iter().any(|verb| {
            lower == *verb
                || lower.starts_with(&format!("{verb}_"))
                || lower.starts_with(&format!("{verb}-"))
                || (lower.starts_with(verb) && bare[verb.len()..].starts_with(char::is_uppercase))
        });
        destructive.then(|| describe_call(tool_name, args))
    }

    fn name(&self) -> &str {
        "destructive_name"
    }
}

/// A rule driven by data: a tool, an argument and a regex over that argument.
pub struct PatternRule {
    tool_name: String,
    argument: String,
    regex: Regex,
    label: String,
}

impl fmt::Debug for PatternRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatternRule")
            .field("tool_name", &self.tool_name)
            .field("argument", &self.argument)
            .field("pattern", &self.regex.as_str())
            .finish()
    }
}

impl PatternRule {
    /// Build a rule; matching is case-insensitive.
    pub fn new(
        tool_name: impl Into<String>,
        argument: impl Into<String>,
        pattern: &str,
        label: impl Into<String>,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            tool_name: tool_name.into(),
            argument: argument.into(),
            regex: Regex::new(&format!("(?i){pattern}"))?,
            label: label.into(),
        })
    }
}

impl DangerRule for PatternRule {
    fn check(&self, tool_name: &str, args: &Value) -> Option<String> {
        if !self.tool_name.eq_ignore_ascii_case(tool_name) {
            return None;
        }
        let value = match args.get(&self.argument)? {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        self.regex
            .is_match(&value)
            .then(|| format!("{}: {value}", self.label))
    }

    fn name(&self) -> &str {
        &self.label
    }
}

// ─── SafetyClassifier ───────────────────────────────────────────────────────

/// Ordered set of danger rules. Stateless; cheap to clone.
#[derive(Clone)]
pub struct SafetyClassifier {
    rules: Vec<Arc<dyn DangerRule>>,
}

impl fmt::Debug for SafetyClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SafetyClassifier")
            .field("rules", &self.rule_names())
            .finish()
    }
}

impl Default for SafetyClassifier {
    fn default() -> Self {
        Self::empty()
            .with_rule(ShellCommandRule::default())
            .with_rule(DestructiveNameRule)
    }
}

impl SafetyClassifier {
    /// A classifier with no rules: everything is safe.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Append a rule. Earlier rules take precedence.
    pub fn with_rule(mut self, rule: impl DangerRule + 'static) -> Self {
        self.rules.push(Arc::new(rule));
        self
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Classify one tool call.
    pub fn classify(&self, tool_name: &str, args: &Value) -> Verdict {
        for rule in &self.rules {
            if let Some(description) = rule.check(tool_name, args) {
                tracing::debug!(
                tool = %tool_name,
                rule = %rule.name(),
                "dangerous operation detected"
            );
                return Verdict::dangerous(description);
            }
        }
        Verdict::safe()
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────────

/// Every string in `value`, depth first. An array also contributes its
/// string elements joined by spaces, so `["rm", "-rf", "/"]` reads as one
/// command line.
fn collect_strings(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => out.push(s.trim().to_string()),
        Value::Array(items) => {
            let joined = items
                .iter()
                .filter_map(|v| v.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            if !joined.is_empty() {
                out.push(joined);
            }
            for item in items {
                collect_strings(item, out);
            }
        }
        Value::Object(map) => {
            for item in map.values() {
                collect_strings(item, out);
            }
        }
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

/// Human-readable summary of a call: `delete_file path=C:\data`.
fn describe_call(tool_name: &str, args: &Value) -> String {
    let rendered = match args {
        Value::Object(map) if !map.is_empty() => map
            .iter()
            .map(|(k, v)| match v {
                Value::String(s) => format!("{k}={s}"),
                other => format!("{k}={other}"),
            })
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(_) | Value::Null => return format!("Run {tool_name}"),
        other => other.to_string(),
    };
    format!("Run {tool_name}: {rendered}")
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn classify(tool: &str, args: Value) -> Verdict {
        SafetyClassifier::default().classify(tool, &args)
    }

    #[test]
    fn test_powershell_remove_item_is_dangerous() {
        let v = classify(
            "execute_powershell",
            json!({"command": "Remove-Item -Path 'C:\\tmp\\a.txt' -Force"}),
        );
        assert!(v.dangerous);
        assert!(v.description.starts_with("Delete operation: Remove-Item"));
    }

    #[test]
    fn test_deletion_verbs_across_dialects() {
        for cmd in [
            "remove-item foo.txt",
            "del C:\\x.txt",
            "ERASE /Q x",
            "rmdir /S build",
            "rm -rf ./build",
            "Get-ChildItem | ri",
            "find . -name '*.log' -delete",
            "format D: /Q",
            "Stop-Computer",
            "Get-ChildItem *.tmp | del",
            "dir *.log | erase",
        ] {
            assert!(
                classify("execute_powershell", json!({"command": cmd})).dangerous,
                "expected dangerous: {cmd}"
            );
        }

        for args in [
            json!({"command": ["rm", "-rf", "/"]}),
            json!({"command": "powershell", "args": "-c Remove-Item C:\\data -Recurse"}),
            json!({"command": "sh", "options": {"argv": ["-c", "shred secrets.txt"]}}),
        ] {
            assert!(
                classify("execute_shell", args.clone()).dangerous,
                "expected dangerous: {args}"
            );
        }
    }

    #[test]
    fn test_destructive_argument_beside_command_key_is_described() {
        let v = classify(
            "execute_powershell",
            json!({"command": "powershell", "args": "-c Remove-Item C:\\data -Recurse"}),
        );
        assert_eq!(v.description, "Delete operation: -c Remove-Item C:\\data -Recurse");
    }

    #[test]
    fn test_safe_commands_pass() {
        for cmd in ["Get-ChildItem C:\\Users", "dir", "ls -la", "echo model", "Get-Date"] {
            assert!(
                !classify("execute_powershell", json!({"command": cmd})).dangerous,
                "expected safe: {cmd}"
            );
        }
    }

    #[test]
    fn test_shell_rule_scans_all_strings_without_command_key() {
        let v = classify("run_shell", json!({"line": "rm -f notes.txt"}));
        assert!(v.dangerous);
    }

    #[test]
    fn test_delete_file_skill_is_dangerous() {
        let v = classify("delete_file", json!({"path": "C:\\data"}));
        assert!(v.dangerous);
        assert_eq!(v.description, "Run delete_file: path=C:\\data");
    }

    #[test]
    fn test_destructive_name_variants() {
        assert!(classify("file_ops.remove_directory", json!({})).dangerous);
        assert!(classify("DeleteFolder", json!({})).dangerous);
        assert!(!classify("read_file", json!({"path": "a"})).dangerous);
        assert!(classify("format_report", json!({})).dangerous);
        assert!(!classify("formula_eval", json!({})).dangerous);
    }

    #[test]
    fn test_empty_classifier_allows_everything() {
        let v = SafetyClassifier::empty().classify("delete_file", &json!({"path": "/"}));
        assert_eq!(v, Verdict::safe());
    }

    #[test]
    fn test_custom_rules_plug_in() {
        let classifier = SafetyClassifier::default()
            .with_rule(
                PatternRule::new("write_file", "file_path", r"^C:\\Windows\\", "System file write")
                    .unwrap(),
            )
            .with_rule(|tool: &str, _args: &Value| {
                (tool == "send_email").then(|| "Send an email".to_string())
            });

        let v = classifier.classify("write_file", &json!({"file_path": "c:\\windows\\hosts"}));
        assert!(v.dangerous);
        assert_eq!(v.description, "System file write: c:\\windows\\hosts");
        assert!(classifier.classify("send_email", &json!({})).dangerous);
        assert!(!classifier.classify("write_file", &json!({"file_path": "D:\\a.txt"})).dangerous);
        assert_eq!(classifier.rule_names().len(), 4);
    }
}
