//! Configurations: immutable descriptions of an app graph.
//!
//! A configuration names a set of apps (name, class, argument) and a set
//! of links in the canonical string form `"from_app.port -> to_app.port"`.
//! Everything that can be rejected early is rejected here, at
//! construction: bad link grammar, duplicate app names, duplicate link
//! specifications, and arguments that fail the class schema. The engine's
//! `configure` only has to re-check what construction cannot see, namely
//! that link endpoints name apps of the same configuration.
//!
//! Arguments are `serde_json` values. The reconfiguration diff compares
//! them structurally, so schema defaults are filled in at validation time
//! and take part in equality.

#![forbid(unsafe_code)]

use crate::app::AppClass;
use serde_json::{Map, Value};
use std::collections::HashMap;
use thiserror::Error;

/// Errors surfaced while constructing a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("app {0:?} defined twice")]
    DuplicateApp(String),
    #[error("link {0:?} defined twice")]
    DuplicateLink(String),
    #[error("invalid link specification {0:?}")]
    LinkSyntax(String),
    #[error("app {app:?}: argument is not an object")]
    ArgNotObject { app: String },
    #[error("app {app:?}: missing required key {key:?}")]
    MissingKey { app: String, key: String },
    #[error("app {app:?}: unknown key {key:?}")]
    UnknownKey { app: String, key: String },
}

/// One key in a class config schema.
#[derive(Debug, Clone)]
struct SchemaKey {
    name: &'static str,
    required: bool,
    default: Option<Value>,
}

/// Permitted argument keys for an app class: which are required, and the
/// defaults filled in for absent optional keys.
#[derive(Debug, Clone, Default)]
pub struct ConfigSchema {
    keys: Vec<SchemaKey>,
}

impl ConfigSchema {
    pub fn new() -> ConfigSchema {
        ConfigSchema::default()
    }

    /// Declare a required key.
    pub fn required(mut self, name: &'static str) -> ConfigSchema {
        self.keys.push(SchemaKey {
            name,
            required: true,
            default: None,
        });
        self
    }

    /// Declare an optional key with a default value.
    pub fn optional(mut self, name: &'static str, default: Value) -> ConfigSchema {
        self.keys.push(SchemaKey {
            name,
            required: false,
            default: Some(default),
        });
        self
    }

    /// Declare an optional key with no default.
    pub fn permitted(mut self, name: &'static str) -> ConfigSchema {
        self.keys.push(SchemaKey {
            name,
            required: false,
            default: None,
        });
        self
    }

    /// Validate `arg` against the schema and return the normalized
    /// argument with defaults filled in. `Null` stands for an empty
    /// argument object.
    pub fn validate(&self, app: &str, arg: &Value) -> Result<Value, ConfigError> {
        let empty = Map::new();
        let given: &Map<String, Value> = match arg {
            Value::Null => &empty,
            Value::Object(m) => m,
            _ => {
                return Err(ConfigError::ArgNotObject {
                    app: app.to_string(),
                })
            }
        };
        for key in given.keys() {
            if !self.keys.iter().any(|k| k.name == key) {
                return Err(ConfigError::UnknownKey {
                    app: app.to_string(),
                    key: key.clone(),
                });
            }
        }
        let mut normalized = Map::new();
        for key in &self.keys {
            match given.get(key.name) {
                Some(v) => {
                    normalized.insert(key.name.to_string(), v.clone());
                }
                None if key.required => {
                    return Err(ConfigError::MissingKey {
                        app: app.to_string(),
                        key: key.name.to_string(),
                    })
                }
                None => {
                    if let Some(default) = &key.default {
                        normalized.insert(key.name.to_string(), default.clone());
                    }
                }
            }
        }
        Ok(Value::Object(normalized))
    }
}

/// An app entry in a configuration.
pub struct AppSpec {
    pub name: String,
    pub class: &'static dyn AppClass,
    /// Normalized argument (schema defaults filled in).
    pub arg: Value,
}

/// A parsed link specification.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LinkSpec {
    pub from_app: String,
    pub from_port: String,
    pub to_app: String,
    pub to_port: String,
}

impl LinkSpec {
    /// Canonical string form, the identity links are keyed by.
    pub fn canonical(&self) -> String {
        format!(
            "{}.{} -> {}.{}",
            self.from_app, self.from_port, self.to_app, self.to_port
        )
    }
}

impl std::fmt::Display for LinkSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.canonical())
    }
}

/// Parse `"from_app.port -> to_app.port"`. Whitespace around `->` is
/// optional; all four components are identifiers.
pub fn parse_link(spec: &str) -> Result<LinkSpec, ConfigError> {
    fn ident(s: &str) -> Option<&str> {
        let s = s.trim();
        if !s.is_empty()
            && s.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
            && !s.starts_with(|c: char| c.is_ascii_digit())
        {
            Some(s)
        } else {
            None
        }
    }
    fn endpoint(s: &str) -> Option<(&str, &str)> {
        let (app, port) = s.trim().split_once('.')?;
        Some((ident(app)?, ident(port)?))
    }
    let err = || ConfigError::LinkSyntax(spec.to_string());
    let (from, to) = spec.split_once("->").ok_or_else(err)?;
    let (from_app, from_port) = endpoint(from).ok_or_else(err)?;
    let (to_app, to_port) = endpoint(to).ok_or_else(err)?;
    Ok(LinkSpec {
        from_app: from_app.to_string(),
        from_port: from_port.to_string(),
        to_app: to_app.to_string(),
        to_port: to_port.to_string(),
    })
}

/// An immutable app-graph description, handed to the engine's `configure`.
#[derive(Default)]
pub struct Config {
    apps: Vec<AppSpec>,
    index: HashMap<String, usize>,
    links: Vec<LinkSpec>,
}

impl Config {
    /// Fresh empty configuration.
    pub fn new() -> Config {
        Config::default()
    }

    /// Add an app. Validates `arg` against the class schema.
    pub fn app(
        &mut self,
        name: &str,
        class: &'static dyn AppClass,
        arg: Value,
    ) -> Result<(), ConfigError> {
        if self.index.contains_key(name) {
            return Err(ConfigError::DuplicateApp(name.to_string()));
        }
        let arg = class.schema().validate(name, &arg)?;
        self.index.insert(name.to_string(), self.apps.len());
        self.apps.push(AppSpec {
            name: name.to_string(),
            class,
            arg,
        });
        Ok(())
    }

    /// Record a link specification. Duplicates are rejected.
    pub fn link(&mut self, spec: &str) -> Result<(), ConfigError> {
        let parsed = parse_link(spec)?;
        if self.links.contains(&parsed) {
            return Err(ConfigError::DuplicateLink(parsed.canonical()));
        }
        self.links.push(parsed);
        Ok(())
    }

    /// App entries in insertion order. This order is the engine's app
    /// iteration order.
    pub fn apps(&self) -> &[AppSpec] {
        &self.apps
    }

    /// Link specifications in insertion order.
    pub fn links(&self) -> &[LinkSpec] {
        &self.links
    }

    /// Look up an app entry by name.
    pub fn get_app(&self, name: &str) -> Option<&AppSpec> {
        self.index.get(name).map(|&i| &self.apps[i])
    }

    pub fn has_app(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_link_canonicalizes_whitespace() {
        for spec in ["a1.x -> a2.y", "a1.x->a2.y", "a1.x   ->   a2.y"] {
            let l = parse_link(spec).unwrap();
            assert_eq!(l.canonical(), "a1.x -> a2.y");
        }
    }

    #[test]
    fn parse_link_rejects_bad_grammar() {
        for spec in ["a1.x a2.y", "a1 -> a2.y", "a1.x -> a2", ".x -> a2.y", "a-b.x -> c.y", ""] {
            assert!(matches!(parse_link(spec), Err(ConfigError::LinkSyntax(_))), "{:?}", spec);
        }
    }

    #[test]
    fn duplicate_link_rejected() {
        let mut c = Config::new();
        c.link("a.x -> b.y").unwrap();
        assert_eq!(
            c.link("a.x ->  b.y"),
            Err(ConfigError::DuplicateLink("a.x -> b.y".to_string()))
        );
    }

    #[test]
    fn schema_fills_defaults_and_rejects_unknown() {
        let schema = ConfigSchema::new()
            .required("a")
            .optional("b", Value::String("foo".to_string()));

        let ok = schema
            .validate("app1", &serde_json::json!({ "a": 1 }))
            .unwrap();
        assert_eq!(ok["a"], 1);
        assert_eq!(ok["b"], "foo");

        assert_eq!(
            schema.validate("app1", &serde_json::json!({})),
            Err(ConfigError::MissingKey {
                app: "app1".to_string(),
                key: "a".to_string()
            })
        );
        assert_eq!(
            schema.validate("app1", &serde_json::json!({ "a": 1, "c": 2 })),
            Err(ConfigError::UnknownKey {
                app: "app1".to_string(),
                key: "c".to_string()
            })
        );
    }

    #[test]
    fn null_arg_is_empty_object() {
        let schema = ConfigSchema::new().optional("n", Value::from(3));
        let v = schema.validate("app1", &Value::Null).unwrap();
        assert_eq!(v["n"], 3);
    }
}
