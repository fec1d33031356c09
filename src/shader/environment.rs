//! Shader compilation environment: defines and source replacements.

use std::collections::BTreeMap;

use crate::utils::stable_hash;

/// Defines and `$KEY` replacement arguments fed into shader compilation.
///
/// Sorted maps keep [`config_identifier`](Self::config_identifier) stable
/// across runs, which the shader binary cache relies on.
#[derive(Clone, Debug, Default)]
pub struct CompilerEnvironment {
    defines: BTreeMap<String, String>,
    // Keys are stored with their '$' prefix.
    replace_args: BTreeMap<String, String>,
}

impl CompilerEnvironment {
    pub fn new() -> CompilerEnvironment {
        CompilerEnvironment::default()
    }

    pub fn set_define(&mut self, key: impl Into<String>) {
        self.defines.insert(key.into(), String::new());
    }

    pub fn set_define_value(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.defines.insert(key.into(), value.into());
    }

    pub fn reset_define(&mut self, key: &str) {
        self.defines.remove(key);
    }

    pub fn set_replace_arg(&mut self, key: &str, value: impl Into<String>) {
        self.replace_args.insert(format!("${}", key), value.into());
    }

    pub fn defines(&self) -> impl Iterator<Item = (&str, &str)> {
        self.defines.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn replace_args(&self) -> impl Iterator<Item = (&str, &str)> {
        self.replace_args
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Stable hex identifier of the whole environment.
    pub fn config_identifier(&self) -> String {
        format!(
            "{:016x}",
            stable_hash(&self.defines) ^ stable_hash(&self.replace_args)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_is_stable_and_order_independent() {
        let mut a = CompilerEnvironment::new();
        a.set_define_value("FOO", "1");
        a.set_define("BAR");
        let mut b = CompilerEnvironment::new();
        b.set_define("BAR");
        b.set_define_value("FOO", "1");
        assert_eq!(a.config_identifier(), b.config_identifier());
    }

    #[test]
    fn identifier_differs_per_content() {
        let empty = CompilerEnvironment::new();
        let mut with_define = CompilerEnvironment::new();
        with_define.set_define("FOO");
        let mut with_replace = CompilerEnvironment::new();
        with_replace.set_replace_arg("FOO", "x");
        assert_ne!(empty.config_identifier(), with_define.config_identifier());
        assert_ne!(
            with_define.config_identifier(),
            with_replace.config_identifier()
        );
    }

    #[test]
    fn reset_define_restores_identifier() {
        let mut env = CompilerEnvironment::new();
        let id0 = env.config_identifier();
        env.set_define("X");
        env.reset_define("X");
        assert_eq!(env.config_identifier(), id0);
    }
}
