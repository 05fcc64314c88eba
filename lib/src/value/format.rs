use std::path::Path;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::error::{Chainable, ErrorDetail, Result};
use crate::value::{Dict, Value};

pub trait Format: Sized {
    /// Human readable name, used in error messages.
    const NAME: &'static str;

    /// The data format's error type.
    type Error: ErrorDetail + 'static;

    /// Parses `string` as the data format `Self` as a `T` or returns an error
    /// if the `string` is an invalid `T`.
    fn from_str<T: DeserializeOwned>(string: &str) -> Result<T, Self::Error>;

    fn read<T: DeserializeOwned>(path: &Path) -> Result<T> {
        let string = std::fs::read_to_string(path).chain_with(|| error! {
            "failed to open file for reading",
            "file path" => path.display(),
        })?;

        Self::from_str(&string).chain_with(|| error! {
            format!("invalid {} document", Self::NAME),
            "file path" => path.display(),
        })
    }
}

/// A format that front matter may be written in.
pub trait MetadataFormat: Format {
    /// Parses `string` into a dictionary. The document must be a mapping.
    fn dict(string: &str) -> Result<Dict>;
}

macro_rules! impl_format {
    ($name:ident : $display:literal, $func:expr, $E:ty) => (
        #[derive(Debug, Default, Copy, Clone)]
        pub struct $name;

        impl Format for $name {
            const NAME: &'static str = $display;

            type Error = $E;

            fn from_str<T: DeserializeOwned>(s: &str) -> Result<T, $E> {
                $func(s)
            }
        }
    );
}

impl_format!(Toml: "TOML", toml::from_str, toml::de::Error);
impl_format!(Yaml: "YAML", serde_yaml::from_str, serde_yaml::Error);

impl MetadataFormat for Toml {
    fn dict(string: &str) -> Result<Dict> {
        let table: toml::Table = Self::from_str(string)?;
        Ok(table.into_iter()
            .map(|(k, v)| (Arc::from(k), Value::from(v)))
            .collect())
    }
}

impl MetadataFormat for Yaml {
    fn dict(string: &str) -> Result<Dict> {
        let yaml: serde_yaml::Value = Self::from_str(string)?;
        if yaml.is_null() {
            return Ok(Dict::new());
        }

        match Value::try_from(yaml).map_err(|e| error!("unsupported YAML value", e))? {
            Value::Dict(dict) => Ok(Arc::unwrap_or_clone(dict)),
            other => err! {
                "YAML front matter must be a mapping",
                "found" => other.kind(),
            }
        }
    }
}
