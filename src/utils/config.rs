//! Configuration parsing helper.

/// Merges an optional TOML config string onto `$type`'s `Default` impl and
/// returns a `Result<$type, ElectionError>`. Mirrors the host library's own
/// `parsed_config!` macro: every field left unspecified in `config_str`
/// keeps its default; unknown fields or parse errors surface as
/// `ElectionError::ConfigError`.
///
/// ```ignore
/// let config: ElectionConfig = parsed_config!(config_str, ElectionConfig)?;
/// ```
#[macro_export]
macro_rules! parsed_config {
    ($config_str:expr, $type:ty) => {{
        (|| -> Result<$type, $crate::utils::ElectionError> {
            let default = <$type>::default();
            match $config_str {
                None => Ok(default),
                Some(s) if s.trim().is_empty() => Ok(default),
                Some(s) => {
                    let partial: toml::Value = toml::from_str(s)?;
                    let mut defaulted = toml::Value::try_from(&default)
                        .map_err(|e| {
                            $crate::utils::ElectionError::ConfigError(
                                e.to_string(),
                            )
                        })?;
                    if let (
                        toml::Value::Table(defaulted_tbl),
                        toml::Value::Table(partial_tbl),
                    ) = (&mut defaulted, partial)
                    {
                        for (k, v) in partial_tbl {
                            defaulted_tbl.insert(k, v);
                        }
                    }
                    defaulted.try_into().map_err(|e: toml::de::Error| {
                        $crate::utils::ElectionError::ConfigError(
                            e.to_string(),
                        )
                    })
                }
            }
        })()
    }};
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct DummyConfig {
        a: u64,
        b: String,
    }

    impl Default for DummyConfig {
        fn default() -> Self {
            DummyConfig { a: 7, b: "x".into() }
        }
    }

    #[test]
    fn defaults_with_no_string() {
        let cfg: DummyConfig = parsed_config!(None, DummyConfig).unwrap();
        assert_eq!(cfg, DummyConfig::default());
    }

    #[test]
    fn defaults_with_empty_string() {
        let cfg: DummyConfig = parsed_config!(Some(""), DummyConfig).unwrap();
        assert_eq!(cfg, DummyConfig::default());
    }

    #[test]
    fn partial_override_merges_onto_default() {
        let cfg: DummyConfig =
            parsed_config!(Some("a = 42"), DummyConfig).unwrap();
        assert_eq!(cfg, DummyConfig { a: 42, b: "x".into() });
    }

    #[test]
    fn bad_toml_is_config_error() {
        let res: Result<DummyConfig, _> =
            parsed_config!(Some("not valid toml =="), DummyConfig);
        assert!(res.is_err());
    }
}
