use crate::error::CliError;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Top-level TOML configuration: an optional state directory plus one
/// `[step.<name>]` block per runnable step.
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub state_dir: Option<String>,
    #[serde(default)]
    pub step: BTreeMap<String, StepConfig>,
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self, CliError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }
}

#[derive(Debug, Deserialize)]
pub struct StepConfig {
    /// Records per committed chunk. Required: it is the main
    /// throughput/recovery trade-off and has no safe universal default.
    pub chunk_size: usize,
    #[serde(default)]
    pub skip_limit: u32,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    pub reader: ReaderConfig,
    #[serde(default)]
    pub transform: Option<TransformConfig>,
    pub writer: WriterConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: usize,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_base_delay_ms() -> u64 {
    250
}

fn default_max_delay_ms() -> u64 {
    5_000
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReaderConfig {
    Csv {
        path: String,
        entity: String,
        #[serde(default)]
        delimiter: Option<char>,
        #[serde(default)]
        columns: Option<Vec<String>>,
        #[serde(default)]
        skip_lines: Option<u64>,
        #[serde(default)]
        tolerant: bool,
    },
    /// Several CSV files read back to back as one source.
    CsvMulti {
        paths: Vec<String>,
        entity: String,
        #[serde(default)]
        tolerant: bool,
    },
    Json {
        path: String,
        entity: String,
        #[serde(default)]
        tolerant: bool,
    },
    PgCursor {
        url: String,
        query: String,
        entity: String,
        #[serde(default)]
        fetch_size: Option<u32>,
        #[serde(default)]
        read_only: bool,
    },
    PgPaged {
        url: String,
        table: String,
        sort_key: String,
        #[serde(default)]
        columns: Option<Vec<String>>,
        #[serde(default = "default_page_size")]
        page_size: u64,
    },
}

fn default_page_size() -> u64 {
    100
}

impl ReaderConfig {
    pub fn kind_name(&self) -> &'static str {
        match self {
            ReaderConfig::Csv { .. } => "csv",
            ReaderConfig::CsvMulti { .. } => "csv_multi",
            ReaderConfig::Json { .. } => "json",
            ReaderConfig::PgCursor { .. } => "pg_cursor",
            ReaderConfig::PgPaged { .. } => "pg_paged",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransformConfig {
    Identity,
    FullName,
    Discount {
        #[serde(default = "default_discount_field")]
        field: String,
        #[serde(default = "default_discount_factor")]
        factor: f64,
    },
}

fn default_discount_field() -> String {
    "price".to_string()
}

fn default_discount_factor() -> f64 {
    0.9
}

impl TransformConfig {
    pub fn kind_name(&self) -> &'static str {
        match self {
            TransformConfig::Identity => "identity",
            TransformConfig::FullName => "full_name",
            TransformConfig::Discount { .. } => "discount",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WriterConfig {
    PgInsert {
        url: String,
        table: String,
        columns: Vec<String>,
    },
    PgUpdate {
        url: String,
        table: String,
        set_columns: Vec<String>,
        key_column: String,
    },
    JsonLines {
        path: String,
        #[serde(default)]
        append: bool,
    },
}

impl WriterConfig {
    pub fn kind_name(&self) -> &'static str {
        match self {
            WriterConfig::PgInsert { .. } => "pg_insert",
            WriterConfig::PgUpdate { .. } => "pg_update",
            WriterConfig::JsonLines { .. } => "json_lines",
        }
    }
}

/// Expands `$NAME` and `${NAME}` references from the process environment
/// so secrets stay out of config files. A `$` not followed by a variable
/// name (for example a positional `$1`) passes through untouched.
pub fn expand_env(input: &str) -> Result<String, CliError> {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }

        let braced = chars.peek() == Some(&'{');
        if braced {
            chars.next();
        }

        let mut name = String::new();
        while let Some(&next) = chars.peek() {
            let valid = if name.is_empty() {
                next == '_' || next.is_ascii_alphabetic()
            } else {
                next == '_' || next.is_ascii_alphanumeric()
            };
            if !valid {
                break;
            }
            name.push(next);
            chars.next();
        }

        if braced {
            if name.is_empty() {
                return Err(CliError::Config(format!("Empty ${{}} reference in '{input}'")));
            }
            if chars.next() != Some('}') {
                return Err(CliError::Config(format!("Unclosed ${{ in '{input}'")));
            }
        } else if name.is_empty() {
            out.push('$');
            continue;
        }

        match std::env::var(&name) {
            Ok(value) => out.push_str(&value),
            Err(_) => return Err(CliError::MissingEnv(name)),
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_step_block() {
        let config: Config = toml::from_str(
            r#"
state_dir = "/tmp/hopper-state"

[step.import_customers]
chunk_size = 2
skip_limit = 3

[step.import_customers.reader]
kind = "csv"
path = "customers.csv"
entity = "customer"

[step.import_customers.transform]
kind = "full_name"

[step.import_customers.writer]
kind = "pg_insert"
url = "postgres://localhost/app"
table = "customer_processed"
columns = ["full_name", "processed_at"]
"#,
        )
        .unwrap();

        assert_eq!(config.state_dir.as_deref(), Some("/tmp/hopper-state"));
        let step = &config.step["import_customers"];
        assert_eq!(step.chunk_size, 2);
        assert_eq!(step.skip_limit, 3);
        assert_eq!(step.reader.kind_name(), "csv");
        assert_eq!(step.writer.kind_name(), "pg_insert");
        assert!(matches!(step.transform, Some(TransformConfig::FullName)));
    }

    #[test]
    fn from_file_reads_and_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hopper.toml");
        std::fs::write(
            &path,
            r#"
state_dir = "/tmp/hopper"

[step.noop]
chunk_size = 1

[step.noop.reader]
kind = "csv"
path = "in.csv"
entity = "row"

[step.noop.writer]
kind = "json_lines"
path = "out.jsonl"
"#,
        )
        .unwrap();

        let config = Config::from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.step.len(), 1);

        let err = Config::from_file("no-such-file.toml").unwrap_err();
        assert!(matches!(err, CliError::ConfigFileRead(_)));
    }

    #[test]
    fn discount_defaults_apply() {
        let config: TransformConfig = toml::from_str(r#"kind = "discount""#).unwrap();
        match config {
            TransformConfig::Discount { field, factor } => {
                assert_eq!(field, "price");
                assert_eq!(factor, 0.9);
            }
            other => panic!("unexpected transform: {other:?}"),
        }
    }

    #[test]
    fn expands_env_references() {
        // Unique names: tests in this binary may run concurrently.
        unsafe {
            std::env::set_var("HOPPER_CFG_TEST_HOST", "db.internal");
        }
        let out = expand_env("postgres://app@$HOPPER_CFG_TEST_HOST:5432/app").unwrap();
        assert_eq!(out, "postgres://app@db.internal:5432/app");

        let braced = expand_env("${HOPPER_CFG_TEST_HOST}/path").unwrap();
        assert_eq!(braced, "db.internal/path");
    }

    #[test]
    fn positional_dollar_is_literal() {
        assert_eq!(expand_env("cost > $100").unwrap(), "cost > $100");
    }

    #[test]
    fn missing_env_is_an_error() {
        let err = expand_env("$HOPPER_CFG_TEST_UNSET_VAR").unwrap_err();
        assert!(matches!(err, CliError::MissingEnv(name) if name == "HOPPER_CFG_TEST_UNSET_VAR"));
    }
}
