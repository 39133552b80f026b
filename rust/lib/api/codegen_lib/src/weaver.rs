//! Hook weaving: splice fragments into a skeleton at named markers.
//!
//! A skeleton is parsed once into fixed text segments interleaved with named
//! slots. A slot is opened by a line of the form `// @HOOK: NAME`; the marker
//! line itself is kept. Fragments are stored per slot in registration order
//! and emitted verbatim after the marker, so their content is never
//! interpreted.

use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use regex::{Captures, Regex};
use thiserror::Error;
use tracing::{debug, warn};

/// Marker prefix recognised at the start of a trimmed line.
pub const HOOK_PREFIX: &str = "// @HOOK:";

/// Hook that collects free-standing methods when a skeleton declares it.
pub const ADDITIONAL_METHODS: &str = "ADDITIONAL_METHODS";

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{\{(\w+)\}\}").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WeaveError {
    #[error("hook marker '{name}' appears more than once (line {line})")]
    DuplicateHook { name: String, line: usize },

    #[error("hook marker on line {line} has no name")]
    UnnamedHook { line: usize },
}

#[derive(Debug, Clone)]
enum Segment {
    Text(String),
    Hook(String),
    /// Implicit method slot before the skeleton's last closing brace.
    Methods,
}

/// A parsed skeleton plus the fragments registered against it.
#[derive(Debug, Clone)]
pub struct Weaver {
    segments: Vec<Segment>,
    slots: BTreeMap<String, Vec<String>>,
    methods: Vec<String>,
    warnings: Vec<String>,
}

impl Weaver {
    /// Parse `skeleton`, failing on a repeated or unnamed marker.
    pub fn parse(skeleton: &str) -> Result<Self, WeaveError> {
        let mut segments = Vec::new();
        let mut slots = BTreeMap::new();
        let mut text = String::new();

        for (index, line) in skeleton.split_inclusive('\n').enumerate() {
            text.push_str(line);
            let Some(rest) = line.trim().strip_prefix(HOOK_PREFIX) else {
                continue;
            };
            let name = rest.trim();
            if name.is_empty() {
                return Err(WeaveError::UnnamedHook { line: index + 1 });
            }
            if slots.contains_key(name) {
                return Err(WeaveError::DuplicateHook {
                    name: name.to_string(),
                    line: index + 1,
                });
            }
            if !text.ends_with('\n') {
                text.push('\n');
            }
            segments.push(Segment::Text(std::mem::take(&mut text)));
            segments.push(Segment::Hook(name.to_string()));
            slots.insert(name.to_string(), Vec::new());
        }

        if !slots.contains_key(ADDITIONAL_METHODS) {
            match text.rfind('}') {
                Some(pos) => {
                    let tail = text.split_off(pos);
                    segments.push(Segment::Text(text));
                    segments.push(Segment::Methods);
                    segments.push(Segment::Text(tail));
                }
                None => {
                    segments.push(Segment::Text(text));
                    segments.push(Segment::Methods);
                }
            }
        } else {
            segments.push(Segment::Text(text));
        }

        debug!("parsed skeleton with {} hooks", slots.len());
        Ok(Self {
            segments,
            slots,
            methods: Vec::new(),
            warnings: Vec::new(),
        })
    }

    /// Hook names declared by the skeleton, sorted.
    pub fn hooks(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    pub fn has_hook(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    /// Register `fragment` after the marker for `hook`.
    ///
    /// An unknown hook is a warning and the fragment is dropped.
    pub fn inject(&mut self, hook: &str, fragment: impl Into<String>) {
        match self.slots.get_mut(hook) {
            Some(fragments) => fragments.push(fragment.into()),
            None => {
                let message = format!("hook '{}' not found in skeleton; fragment skipped", hook);
                warn!("{}", message);
                self.warnings.push(message);
            }
        }
    }

    /// Register a free-standing method: into the `ADDITIONAL_METHODS` hook
    /// when present, otherwise just before the skeleton's last `}`.
    pub fn append_method(&mut self, fragment: impl Into<String>) {
        match self.slots.get_mut(ADDITIONAL_METHODS) {
            Some(fragments) => fragments.push(fragment.into()),
            None => self.methods.push(fragment.into()),
        }
    }

    /// Warnings raised while injecting.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Skeleton with all fragments spliced in, placeholders untouched.
    pub fn woven(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Hook(name) => {
                    for fragment in self.slots.get(name).into_iter().flatten() {
                        push_fragment(&mut out, fragment);
                    }
                }
                Segment::Methods => {
                    for method in &self.methods {
                        push_fragment(&mut out, method);
                    }
                }
            }
        }
        out
    }

    /// Woven text with every `{{name}}` present in `context` replaced.
    /// Placeholders without a value stay as written.
    pub fn render(&self, context: &HashMap<&str, String>) -> String {
        substitute(&self.woven(), context)
    }
}

fn push_fragment(out: &mut String, fragment: &str) {
    out.push_str(fragment);
    if !fragment.ends_with('\n') {
        out.push('\n');
    }
}

/// Replace `{{name}}` placeholders found in `context`; the replacement text
/// is inserted literally.
pub fn substitute(text: &str, context: &HashMap<&str, String>) -> String {
    PLACEHOLDER
        .replace_all(text, |caps: &Captures<'_>| match context.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SKELETON: &str = "\
impl {{Name}} {
    fn create() {
        // @HOOK: BEFORE
        save();
        // @HOOK: AFTER
    }
}
";

    fn context() -> HashMap<&'static str, String> {
        HashMap::from([("Name", "Product".to_string())])
    }

    #[test]
    fn fragments_follow_marker_in_order() {
        let mut w = Weaver::parse(SKELETON).unwrap();
        w.inject("BEFORE", "        first();");
        w.inject("BEFORE", "        second();\n");
        w.inject("AFTER", "        log();");
        let out = w.render(&context());
        let expected = "\
impl Product {
    fn create() {
        // @HOOK: BEFORE
        first();
        second();
        save();
        // @HOOK: AFTER
        log();
    }
}
";
        assert_eq!(out, expected);
    }

    #[test]
    fn replacement_sequences_survive_verbatim() {
        let mut w = Weaver::parse(SKELETON).unwrap();
        let fragment = r#"        let s = "$1 costs $& or $$5 {{Name}}\\d+";"#;
        w.inject("BEFORE", fragment);
        let woven = w.woven();
        assert!(woven.contains(fragment), "fragment altered: {}", woven);

        // Rendering substitutes placeholders only; `$` sequences stay literal.
        let out = w.render(&context());
        assert!(out.contains(r#""$1 costs $& or $$5 Product\\d+""#), "{}", out);
    }

    #[test]
    fn missing_hook_warns_and_skips() {
        let mut w = Weaver::parse(SKELETON).unwrap();
        w.inject("NOPE", "boom();");
        assert_eq!(w.warnings().len(), 1);
        assert!(!w.woven().contains("boom"));
    }

    #[test]
    fn duplicate_marker_is_an_error() {
        let text = "// @HOOK: A\n// @HOOK: A\n";
        assert_eq!(
            Weaver::parse(text).unwrap_err(),
            WeaveError::DuplicateHook {
                name: "A".into(),
                line: 2
            }
        );
        assert!(matches!(
            Weaver::parse("// @HOOK:   \n"),
            Err(WeaveError::UnnamedHook { line: 1 })
        ));
    }

    #[test]
    fn methods_go_before_last_brace() {
        let mut w = Weaver::parse(SKELETON).unwrap();
        w.append_method("    fn extra() {}");
        let out = w.woven();
        assert!(out.ends_with("    }\n    fn extra() {}\n}\n"), "{}", out);
    }

    #[test]
    fn methods_use_explicit_hook() {
        let text = "impl X {\n    // @HOOK: ADDITIONAL_METHODS\n}\n// trailing }\n";
        let mut w = Weaver::parse(text).unwrap();
        w.append_method("    fn extra() {}");
        assert_eq!(
            w.woven(),
            "impl X {\n    // @HOOK: ADDITIONAL_METHODS\n    fn extra() {}\n}\n// trailing }\n"
        );
    }

    #[test]
    fn unmatched_placeholders_are_kept() {
        let out = substitute("{{Name}} and {{missing}}", &context());
        assert_eq!(out, "Product and {{missing}}");
    }
}
