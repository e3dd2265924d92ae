use crate::{
    config::{Config, ReaderConfig, StepConfig, TransformConfig, WriterConfig, expand_env},
    error::CliError,
};
use connectors::{
    file::{
        csv::{CsvReader, CsvReaderConfig},
        json::{JsonReader, JsonReaderConfig},
        jsonl::JsonLinesWriter,
    },
    multi::MultiReader,
    paged::PagedReader,
    postgres::{
        cursor::{PgCursorConfig, PgCursorReader},
        insert::PgInsertWriter,
        paged::PgPageFetcher,
        update::PgUpdateWriter,
    },
    reader::RecordReader,
};
use engine_core::retry::RetryPolicy;
use engine_runtime::{
    registry::{ReaderFactory, StepDefinition, StepRegistry, WriterFactory},
    transform::{Discount, FullName},
};
use std::time::Duration;

/// Builds the step registry from a parsed config file. Factories capture
/// the resolved settings so every run attempt gets fresh connectors.
pub fn build_registry(config: &Config) -> Result<StepRegistry, CliError> {
    let mut registry = StepRegistry::new();
    for (name, step) in &config.step {
        registry.register(build_step(name, step)?);
    }
    Ok(registry)
}

fn build_step(name: &str, cfg: &StepConfig) -> Result<StepDefinition, CliError> {
    let reader = reader_factory(&cfg.reader)?;
    let writer = writer_factory(&cfg.writer)?;

    let mut step =
        StepDefinition::new(name, cfg.chunk_size, reader, writer).skip_limit(cfg.skip_limit);

    if let Some(retry) = &cfg.retry {
        step = step.retry(RetryPolicy::new(
            retry.max_attempts,
            Duration::from_millis(retry.base_delay_ms),
            Duration::from_millis(retry.max_delay_ms),
        ));
    }

    match &cfg.transform {
        None | Some(TransformConfig::Identity) => {}
        Some(TransformConfig::FullName) => step = step.transform(FullName),
        Some(TransformConfig::Discount { field, factor }) => {
            step = step.transform(Discount::new(field, *factor));
        }
    }

    Ok(step)
}

fn reader_factory(cfg: &ReaderConfig) -> Result<ReaderFactory, CliError> {
    match cfg {
        ReaderConfig::Csv {
            path,
            entity,
            delimiter,
            columns,
            skip_lines,
            tolerant,
        } => {
            let reader_config = csv_reader_config(
                path,
                entity,
                *delimiter,
                columns.clone(),
                *skip_lines,
                *tolerant,
            )?;
            Ok(Box::new(move || {
                Box::new(CsvReader::new(reader_config.clone()))
            }))
        }
        ReaderConfig::CsvMulti {
            paths,
            entity,
            tolerant,
        } => {
            let configs: Vec<CsvReaderConfig> = paths
                .iter()
                .map(|path| CsvReaderConfig::new(path.as_str(), entity).tolerant(*tolerant))
                .collect();
            Ok(Box::new(move || {
                let readers: Vec<Box<dyn RecordReader>> = configs
                    .iter()
                    .map(|config| Box::new(CsvReader::new(config.clone())) as Box<dyn RecordReader>)
                    .collect();
                Box::new(MultiReader::new(readers))
            }))
        }
        ReaderConfig::Json {
            path,
            entity,
            tolerant,
        } => {
            let reader_config = JsonReaderConfig::new(path.as_str(), entity).tolerant(*tolerant);
            Ok(Box::new(move || {
                Box::new(JsonReader::new(reader_config.clone()))
            }))
        }
        ReaderConfig::PgCursor {
            url,
            query,
            entity,
            fetch_size,
            read_only,
        } => {
            let url = expand_env(url)?;
            let mut cursor_config = PgCursorConfig::new(&url, query, entity).read_only(*read_only);
            if let Some(size) = fetch_size {
                cursor_config = cursor_config.fetch_size(*size);
            }
            Ok(Box::new(move || {
                Box::new(PgCursorReader::new(cursor_config.clone()))
            }))
        }
        ReaderConfig::PgPaged {
            url,
            table,
            sort_key,
            columns,
            page_size,
        } => {
            let url = expand_env(url)?;
            let table = table.clone();
            let sort_key = sort_key.clone();
            let columns = columns.clone();
            let page_size = *page_size;
            Ok(Box::new(move || {
                let mut fetcher = PgPageFetcher::new(&url, &table, &sort_key);
                if let Some(cols) = &columns {
                    fetcher = fetcher.columns(cols.clone());
                }
                Box::new(PagedReader::new(fetcher, page_size))
            }))
        }
    }
}

fn csv_reader_config(
    path: &str,
    entity: &str,
    delimiter: Option<char>,
    columns: Option<Vec<String>>,
    skip_lines: Option<u64>,
    tolerant: bool,
) -> Result<CsvReaderConfig, CliError> {
    let mut config = CsvReaderConfig::new(path, entity).tolerant(tolerant);
    if let Some(delim) = delimiter {
        if !delim.is_ascii() {
            return Err(CliError::Config(format!(
                "CSV delimiter must be ASCII, got '{delim}'"
            )));
        }
        config = config.delimiter(delim as u8);
    }
    if let Some(cols) = columns {
        config = config.columns(cols);
    }
    if let Some(lines) = skip_lines {
        config = config.skip_lines(lines);
    }
    Ok(config)
}

fn writer_factory(cfg: &WriterConfig) -> Result<WriterFactory, CliError> {
    match cfg {
        WriterConfig::PgInsert {
            url,
            table,
            columns,
        } => {
            let url = expand_env(url)?;
            let table = table.clone();
            let columns = columns.clone();
            Ok(Box::new(move || {
                Box::new(PgInsertWriter::new(&url, &table, columns.clone()))
            }))
        }
        WriterConfig::PgUpdate {
            url,
            table,
            set_columns,
            key_column,
        } => {
            let url = expand_env(url)?;
            let table = table.clone();
            let set_columns = set_columns.clone();
            let key_column = key_column.clone();
            Ok(Box::new(move || {
                Box::new(PgUpdateWriter::new(
                    &url,
                    &table,
                    set_columns.clone(),
                    &key_column,
                ))
            }))
        }
        WriterConfig::JsonLines { path, append } => {
            let path = path.clone();
            let append = *append;
            Ok(Box::new(move || {
                Box::new(JsonLinesWriter::new(path.as_str(), append))
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> Config {
        toml::from_str(
            r#"
[step.import_customers]
chunk_size = 2

[step.import_customers.reader]
kind = "csv"
path = "customers.csv"
entity = "customer"

[step.import_customers.transform]
kind = "full_name"

[step.import_customers.writer]
kind = "json_lines"
path = "out.jsonl"

[step.apply_discount]
chunk_size = 10
skip_limit = 1

[step.apply_discount.reader]
kind = "json"
path = "orders.json"
entity = "order"

[step.apply_discount.transform]
kind = "discount"
factor = 0.8

[step.apply_discount.writer]
kind = "json_lines"
path = "discounted.jsonl"
append = true
"#,
        )
        .unwrap()
    }

    #[test]
    fn registry_holds_every_configured_step() {
        let registry = build_registry(&sample_config()).unwrap();
        assert_eq!(registry.names(), vec!["apply_discount", "import_customers"]);

        let step = registry.get("apply_discount").unwrap();
        assert_eq!(step.chunk_size, 10);
        assert_eq!(step.skip_limit, 1);
    }

    #[test]
    fn factories_produce_fresh_connectors() {
        let registry = build_registry(&sample_config()).unwrap();
        let step = registry.get("import_customers").unwrap();
        // Two invocations must hand out independent instances.
        let _first = step.make_reader();
        let _second = step.make_reader();
    }

    #[test]
    fn non_ascii_delimiter_is_rejected() {
        let err = csv_reader_config("a.csv", "t", Some('§'), None, None, false).unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
    }
}
