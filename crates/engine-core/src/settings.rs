use crate::error::SettingsError;
use model::core::table::TableRef;

/// Runtime configuration, assembled from environment variables.
///
/// Everything is string-typed at the boundary and parsed here; the rest
/// of the system never touches `std::env`.
#[derive(Debug, Clone)]
pub struct Settings {
    pub src_dsn: String,
    pub tgt_dsn: String,
    pub source_table: TableRef,
    pub target_table: TableRef,
    pub binlog_server_id: u32,
    pub parallel_workers: usize,
    pub batch_size: usize,
    pub checkpoint_table: String,
    pub checkpoint_write_seconds: u64,
    pub checkpoint_every: u64,
    pub fullload_max_retries: usize,
    pub fullload_drop_on_retry: bool,
    /// Bound by the external health/metrics collaborator, not by this
    /// process; parsed here so misconfiguration fails at startup.
    pub health_port: u16,
}

impl Settings {
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from a pre-merged variable map (process env overlaid with a
    /// `.env` file by the binary).
    pub fn from_vars(
        vars: &std::collections::HashMap<String, String>,
    ) -> Result<Self, SettingsError> {
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Settings {
            src_dsn: required(&lookup, "SRC_DSN")?,
            tgt_dsn: required(&lookup, "TGT_DSN")?,
            source_table: TableRef::new(
                required(&lookup, "SRC_DB")?,
                required(&lookup, "SRC_TABLE")?,
            ),
            target_table: TableRef::new(
                required(&lookup, "TGT_DB")?,
                required(&lookup, "TARGET_TABLE")?,
            ),
            binlog_server_id: parsed(&lookup, "BINLOG_SERVER_ID", 9999)?,
            parallel_workers: parsed_min(&lookup, "PARALLEL_WORKERS", 8, 1)?,
            batch_size: parsed_min(&lookup, "BATCH_SIZE", 10_000, 1)?,
            checkpoint_table: lookup("CHECKPOINT_TABLE")
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "cdc_checkpoints".to_string()),
            checkpoint_write_seconds: parsed_min(&lookup, "CHECKPOINT_WRITE_SECONDS", 5, 1)?,
            checkpoint_every: parsed_min(&lookup, "CHECKPOINT_EVERY", 100, 1)?,
            fullload_max_retries: parsed_min(&lookup, "FULLLOAD_MAX_RETRIES", 3, 1)?,
            fullload_drop_on_retry: parsed_bool(&lookup, "FULLLOAD_DROP_ON_RETRY", false)?,
            health_port: parsed(&lookup, "HEALTH_PORT", 8080)?,
        })
    }

    /// The job key identifying this replication across restarts.
    pub fn table_key(&self) -> String {
        self.source_table.key()
    }
}

fn required<F>(lookup: &F, var: &'static str) -> Result<String, SettingsError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(var)
        .filter(|v| !v.is_empty())
        .ok_or(SettingsError::Missing(var))
}

fn parsed<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, SettingsError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) if raw.is_empty() => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| SettingsError::Invalid {
            var,
            value: raw,
            reason: e.to_string(),
        }),
    }
}

fn parsed_min<F, T>(lookup: &F, var: &'static str, default: T, min: T) -> Result<T, SettingsError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr + PartialOrd + std::fmt::Display + Copy,
    T::Err: std::fmt::Display,
{
    let value = parsed(lookup, var, default)?;
    if value < min {
        return Err(SettingsError::Invalid {
            var,
            value: value.to_string(),
            reason: format!("must be at least {min}"),
        });
    }
    Ok(value)
}

fn parsed_bool<F>(lookup: &F, var: &'static str, default: bool) -> Result<bool, SettingsError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var).as_deref() {
        None | Some("") => Ok(default),
        Some("true") | Some("1") | Some("yes") => Ok(true),
        Some("false") | Some("0") | Some("no") => Ok(false),
        Some(other) => Err(SettingsError::Invalid {
            var,
            value: other.to_string(),
            reason: "expected true/false".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("SRC_DSN", "mysql://src:3306/"),
            ("TGT_DSN", "mysql://tgt:3306/"),
            ("SRC_DB", "shop"),
            ("SRC_TABLE", "orders"),
            ("TGT_DB", "shop_replica"),
            ("TARGET_TABLE", "orders"),
        ])
    }

    fn build(env: &HashMap<&'static str, &'static str>) -> Result<Settings, SettingsError> {
        Settings::from_lookup(|key| env.get(key).map(|v| (*v).to_string()))
    }

    #[test]
    fn defaults_apply_when_optional_vars_are_absent() {
        let settings = build(&base_env()).unwrap();
        assert_eq!(settings.binlog_server_id, 9999);
        assert_eq!(settings.parallel_workers, 8);
        assert_eq!(settings.batch_size, 10_000);
        assert_eq!(settings.checkpoint_table, "cdc_checkpoints");
        assert_eq!(settings.checkpoint_write_seconds, 5);
        assert_eq!(settings.checkpoint_every, 100);
        assert_eq!(settings.fullload_max_retries, 3);
        assert!(!settings.fullload_drop_on_retry);
        assert_eq!(settings.health_port, 8080);
        assert_eq!(settings.table_key(), "shop.orders");
    }

    #[test]
    fn missing_required_var_names_the_variable() {
        let mut env = base_env();
        env.remove("SRC_DSN");
        match build(&env) {
            Err(SettingsError::Missing(var)) => assert_eq!(var, "SRC_DSN"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn invalid_number_is_rejected_with_context() {
        let mut env = base_env();
        env.insert("BATCH_SIZE", "lots");
        match build(&env) {
            Err(SettingsError::Invalid { var, value, .. }) => {
                assert_eq!(var, "BATCH_SIZE");
                assert_eq!(value, "lots");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn zero_workers_is_rejected() {
        let mut env = base_env();
        env.insert("PARALLEL_WORKERS", "0");
        assert!(build(&env).is_err());
    }

    #[test]
    fn bool_parsing_accepts_common_spellings() {
        let mut env = base_env();
        env.insert("FULLLOAD_DROP_ON_RETRY", "1");
        assert!(build(&env).unwrap().fullload_drop_on_retry);

        env.insert("FULLLOAD_DROP_ON_RETRY", "no");
        assert!(!build(&env).unwrap().fullload_drop_on_retry);

        env.insert("FULLLOAD_DROP_ON_RETRY", "maybe");
        assert!(build(&env).is_err());
    }
}
