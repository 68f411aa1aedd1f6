use crate::error::CliError;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Environment variable manager that merges the process environment with
/// an optional `.env` file (file wins). The merged map is handed to the
/// settings parser; nothing here mutates the process environment.
#[derive(Debug, Clone)]
pub struct EnvManager {
    vars: HashMap<String, String>,
}

impl EnvManager {
    pub fn new() -> Self {
        let mut vars = HashMap::new();
        for (key, value) in std::env::vars() {
            vars.insert(key, value);
        }
        Self { vars }
    }

    /// Load variables from a .env file, overriding the process values.
    pub fn load_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), CliError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            CliError::Config(format!("Failed to read env file {}: {}", path.display(), e))
        })?;

        self.parse_env_content(&content)?;
        Ok(())
    }

    pub fn all(&self) -> &HashMap<String, String> {
        &self.vars
    }

    fn parse_env_content(&mut self, content: &str) -> Result<(), CliError> {
        for (line_num, line) in content.lines().enumerate() {
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(eq_pos) = line.find('=') {
                let key = line[..eq_pos].trim();
                let value = line[eq_pos + 1..].trim();

                if key.is_empty() {
                    return Err(CliError::Config(format!(
                        "Invalid env file: empty key at line {}",
                        line_num + 1
                    )));
                }

                let value = Self::unquote_value(value);
                self.vars.insert(key.to_string(), value);
            } else {
                return Err(CliError::Config(format!(
                    "Invalid env file: malformed line {} (expected KEY=VALUE)",
                    line_num + 1
                )));
            }
        }

        Ok(())
    }

    fn unquote_value(value: &str) -> String {
        let value = value.trim();

        if value.starts_with('"') && value.ends_with('"') && value.len() >= 2 {
            return value[1..value.len() - 1].to_string();
        }

        if value.starts_with('\'') && value.ends_with('\'') && value.len() >= 2 {
            return value[1..value.len() - 1].to_string();
        }

        value.to_string()
    }
}

impl Default for EnvManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty() -> EnvManager {
        EnvManager {
            vars: HashMap::new(),
        }
    }

    #[test]
    fn parses_basic_pairs_and_skips_comments() {
        let mut env = empty();
        let content = "\n# Comment\nSRC_DB=shop\nSRC_TABLE=orders\n";
        env.parse_env_content(content).unwrap();
        assert_eq!(env.vars.get("SRC_DB").unwrap(), "shop");
        assert_eq!(env.vars.get("SRC_TABLE").unwrap(), "orders");
    }

    #[test]
    fn strips_matching_quotes() {
        let mut env = empty();
        let content = "DSN=\"mysql://root:secret@db:3306/\"\nNAME='single'\nBARE=plain\n";
        env.parse_env_content(content).unwrap();
        assert_eq!(env.vars.get("DSN").unwrap(), "mysql://root:secret@db:3306/");
        assert_eq!(env.vars.get("NAME").unwrap(), "single");
        assert_eq!(env.vars.get("BARE").unwrap(), "plain");
    }

    #[test]
    fn rejects_lines_without_equals() {
        let mut env = empty();
        assert!(env.parse_env_content("NOT A PAIR").is_err());
    }

    #[test]
    fn file_values_override_process_values() {
        let mut env = empty();
        env.vars.insert("BATCH_SIZE".into(), "10000".into());
        env.parse_env_content("BATCH_SIZE=500").unwrap();
        assert_eq!(env.vars.get("BATCH_SIZE").unwrap(), "500");
    }
}
