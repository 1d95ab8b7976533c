//! Schema registry: message definitions, topic bindings, and the service
//! discovery payload.
//!
//! The registry is owned by the event loop and mutated only from it. The
//! operations exposed here double as the contract for the admin surface:
//! `list_topic_bindings`, `register_schema_and_bind`, and `schema_count`.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use thiserror::Error;

use crate::proto::parser::{parse_schema, ParseError};
use crate::proto::schema::{MessageDef, TypeResolver};
use crate::proto::value::Value;

/// Topic clients publish to in order to request a discovery response.
pub const DISCOVERY_REQUEST_TOPIC: &str = "$SYS/discovery/request";

/// Topic the broker publishes discovery responses on.
pub const DISCOVERY_RESPONSE_TOPIC: &str = "$SYS/discovery/response";

/// Reserved message type used to encode discovery responses.
pub const DISCOVERY_TYPE: &str = "ServiceDiscoveryResponse";

/// The discovery schema ships inside the binary so the broker never starts
/// without it. The same file is in `schemas/` for clients.
const DISCOVERY_SCHEMA: &str = include_str!("../schemas/service_discovery.proto");

/// Registry errors.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("cannot bind topic to unregistered type '{0}'")]
    UnknownType(String),

    #[error("schema source does not define message type '{0}'")]
    TypeNotDefined(String),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// In-process store of message definitions and topic-to-type bindings.
/// Both maps own their keys; the registry lives as long as the broker.
pub struct SchemaRegistry {
    messages: HashMap<String, MessageDef>,
    /// Exact topic string to message type name. No wildcard matching here.
    bindings: HashMap<String, String>,
    schema_dir: PathBuf,
}

impl SchemaRegistry {
    /// Create a registry rooted at `schema_dir`, with the bundled discovery
    /// schema pre-registered.
    pub fn new(schema_dir: &Path) -> Self {
        let mut registry = Self {
            messages: HashMap::new(),
            bindings: HashMap::new(),
            schema_dir: schema_dir.to_path_buf(),
        };

        for def in parse_schema(DISCOVERY_SCHEMA).expect("bundled discovery schema is valid") {
            registry.register_message(def);
        }

        registry
    }

    /// Register a message definition under its short name, replacing any
    /// previous definition of the same name.
    pub fn register_message(&mut self, def: MessageDef) {
        self.messages.insert(def.name.clone(), def);
    }

    pub fn lookup_message(&self, name: &str) -> Option<&MessageDef> {
        self.messages.get(name)
    }

    /// Bind a topic to a message type. The type must already be registered.
    pub fn bind_topic(&mut self, topic: &str, type_name: &str) -> Result<(), RegistryError> {
        if !self.messages.contains_key(type_name) {
            return Err(RegistryError::UnknownType(type_name.to_string()));
        }
        self.bindings
            .insert(topic.to_string(), type_name.to_string());
        Ok(())
    }

    /// Exact-match lookup of the type bound to a topic.
    pub fn lookup_type_for_topic(&self, topic: &str) -> Option<&str> {
        self.bindings.get(topic).map(String::as_str)
    }

    /// Load every `*.proto` file in the schema directory. A file that fails
    /// to parse is logged and skipped; the rest still load. Returns the
    /// number of files loaded.
    pub fn load_from_directory(&mut self) -> Result<usize, RegistryError> {
        let mut loaded = 0usize;

        for entry in fs::read_dir(&self.schema_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("proto") {
                continue;
            }

            let source = match fs::read_to_string(&path) {
                Ok(source) => source,
                Err(e) => {
                    warn!("failed to read schema file {}: {}", path.display(), e);
                    continue;
                }
            };

            match parse_schema(&source) {
                Ok(defs) => {
                    for def in defs {
                        debug!("registered message type {} from {}", def.name, path.display());
                        self.register_message(def);
                    }
                    loaded += 1;
                }
                Err(e) => {
                    warn!("skipping schema file {}: {}", path.display(), e);
                }
            }
        }

        Ok(loaded)
    }

    /// Admin contract: parse `source`, register every message it defines,
    /// persist it as `<type_name>.proto` in the schema directory, then bind
    /// `topic` to `type_name`. Nothing is mutated if the source fails to
    /// parse or does not define the named type.
    pub fn register_schema_and_bind(
        &mut self,
        topic: &str,
        type_name: &str,
        source: &str,
    ) -> Result<(), RegistryError> {
        let defs = parse_schema(source)?;
        if !defs.iter().any(|d| d.name == type_name) {
            return Err(RegistryError::TypeNotDefined(type_name.to_string()));
        }

        fs::write(self.schema_dir.join(format!("{}.proto", type_name)), source)?;

        for def in defs {
            self.register_message(def);
        }
        self.bindings
            .insert(topic.to_string(), type_name.to_string());
        Ok(())
    }

    /// Admin contract: all current topic bindings.
    pub fn list_topic_bindings(&self) -> impl Iterator<Item = (&str, &str)> {
        self.bindings
            .iter()
            .map(|(topic, ty)| (topic.as_str(), ty.as_str()))
    }

    /// Admin contract: number of registered message types.
    pub fn schema_count(&self) -> usize {
        self.messages.len()
    }

    /// The definition discovery responses are encoded against.
    pub fn discovery_def(&self) -> Option<&MessageDef> {
        self.lookup_message(DISCOVERY_TYPE)
    }

    /// Build the discovery response value: one `{topic, message_type,
    /// schema_source}` triple per binding, as a repeated message at tag 1.
    pub fn build_discovery_value(&self) -> Value {
        let mut entries = Vec::with_capacity(self.bindings.len());

        for (topic, type_name) in &self.bindings {
            let Some(def) = self.messages.get(type_name) else {
                continue;
            };
            let mut entry = Value::message();
            entry.set(1, Value::Bytes(topic.as_bytes().to_vec()));
            entry.set(2, Value::Bytes(type_name.as_bytes().to_vec()));
            entry.set(3, Value::Bytes(def.source.as_bytes().to_vec()));
            entries.push(entry);
        }

        let mut response = Value::message();
        response.set(1, Value::Repeated(entries));
        response
    }
}

impl TypeResolver for SchemaRegistry {
    fn resolve(&self, name: &str) -> Option<&MessageDef> {
        self.lookup_message(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::encoder::encode_message;
    use crate::proto::decoder::decode_message;

    const SENSOR: &str = "message SensorData { string sensor_id = 1; double value = 2; }";

    fn registry() -> (tempfile::TempDir, SchemaRegistry) {
        let dir = tempfile::tempdir().unwrap();
        let registry = SchemaRegistry::new(dir.path());
        (dir, registry)
    }

    #[test]
    fn discovery_schema_is_bundled() {
        let (_dir, registry) = registry();
        let def = registry.discovery_def().unwrap();
        assert_eq!(def.name, DISCOVERY_TYPE);
        assert!(registry.lookup_message("TopicBinding").is_some());
    }

    #[test]
    fn bind_requires_registered_type() {
        let (_dir, mut registry) = registry();
        assert!(matches!(
            registry.bind_topic("sensor/data", "SensorData"),
            Err(RegistryError::UnknownType(_))
        ));

        for def in parse_schema(SENSOR).unwrap() {
            registry.register_message(def);
        }
        registry.bind_topic("sensor/data", "SensorData").unwrap();
        assert_eq!(
            registry.lookup_type_for_topic("sensor/data"),
            Some("SensorData")
        );
        // Exact match only.
        assert!(registry.lookup_type_for_topic("sensor/+").is_none());
    }

    #[test]
    fn load_from_directory_skips_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("good.proto"), SENSOR).unwrap();
        fs::write(dir.path().join("bad.proto"), "message Broken {").unwrap();
        fs::write(dir.path().join("notes.txt"), "not a schema").unwrap();

        let mut registry = SchemaRegistry::new(dir.path());
        let before = registry.schema_count();
        let loaded = registry.load_from_directory().unwrap();

        assert_eq!(loaded, 1);
        assert_eq!(registry.schema_count(), before + 1);
        assert!(registry.lookup_message("SensorData").is_some());
        assert!(registry.lookup_message("Broken").is_none());
    }

    #[test]
    fn register_schema_and_bind_is_atomic() {
        let (dir, mut registry) = registry();

        // Source does not define the named type: nothing changes.
        let err = registry
            .register_schema_and_bind("a/b", "Missing", SENSOR)
            .unwrap_err();
        assert!(matches!(err, RegistryError::TypeNotDefined(_)));
        assert!(registry.lookup_type_for_topic("a/b").is_none());
        assert!(!dir.path().join("Missing.proto").exists());

        registry
            .register_schema_and_bind("sensor/data", "SensorData", SENSOR)
            .unwrap();
        assert_eq!(
            registry.lookup_type_for_topic("sensor/data"),
            Some("SensorData")
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("SensorData.proto")).unwrap(),
            SENSOR
        );

        let bindings: Vec<_> = registry.list_topic_bindings().collect();
        assert_eq!(bindings, vec![("sensor/data", "SensorData")]);
    }

    #[test]
    fn discovery_value_roundtrips() {
        let (_dir, mut registry) = registry();
        registry
            .register_schema_and_bind("sensor/data", "SensorData", SENSOR)
            .unwrap();

        let value = registry.build_discovery_value();
        let def = registry.discovery_def().unwrap();

        let mut buf = Vec::new();
        encode_message(&value, def, &registry, &mut buf).unwrap();
        let decoded = decode_message(&buf, def, &registry).unwrap();

        let bindings = decoded.get(1).and_then(Value::as_repeated).unwrap();
        assert_eq!(bindings.len(), 1);
        let entry = &bindings[0];
        assert_eq!(entry.get(1).and_then(Value::as_str), Some("sensor/data"));
        assert_eq!(entry.get(2).and_then(Value::as_str), Some("SensorData"));
        assert_eq!(entry.get(3).and_then(Value::as_str), Some(SENSOR));
    }
}
