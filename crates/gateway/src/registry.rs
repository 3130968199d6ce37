//! Queue registry: configured queues in declaration order plus a default.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use proto::{ConfigError, GatewayError, QueueName};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::validator::{self, QueueSchema};

/// Name of the queue created when the configuration lists none.
pub const IMPLICIT_QUEUE_NAME: &str = "default";

/// A configured queue and its optional message schema.
#[derive(Debug)]
pub struct Queue {
    name: String,
    schema: Option<QueueSchema>,
}

impl Queue {
    /// A queue that accepts any JSON object.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: None,
        }
    }

    /// A queue whose messages must satisfy `schema`.
    pub fn with_schema(name: impl Into<String>, schema: Value) -> Result<Self, ConfigError> {
        let name = name.into();
        let schema = QueueSchema::compile(&name, schema)?;
        Ok(Self {
            name,
            schema: Some(schema),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The configured schema document, if any.
    pub fn schema(&self) -> Option<&Value> {
        self.schema.as_ref().map(QueueSchema::document)
    }

    /// Applies this queue's schema to `message`.
    pub fn validate(&self, message: &Value) -> Result<(), GatewayError> {
        validator::validate(self.schema.as_ref(), message)
    }
}

/// One entry of the `queues` list in the queue file.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueEntry {
    pub name: String,
    /// Schema file, relative to the queue file's directory.
    #[serde(default)]
    pub schema: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct QueuesFile {
    #[serde(default)]
    queues: Option<Vec<QueueEntry>>,
}

/// Response body of the queue listing endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueListing {
    pub queues: Vec<String>,
    pub default_queue: String,
}

/// Read-only, ordered set of queues with O(1) name lookup.
#[derive(Debug)]
pub struct QueueRegistry {
    queues: Vec<Queue>,
    index: HashMap<String, usize>,
}

impl QueueRegistry {
    /// Builds a registry; an empty list yields the implicit `default` queue.
    pub fn new(queues: impl IntoIterator<Item = Queue>) -> Result<Self, ConfigError> {
        let mut queues: Vec<Queue> = queues.into_iter().collect();
        if queues.is_empty() {
            debug!("No queues configured, using implicit '{IMPLICIT_QUEUE_NAME}' queue");
            queues.push(Queue::new(IMPLICIT_QUEUE_NAME));
        }

        let mut index = HashMap::with_capacity(queues.len());
        for (position, queue) in queues.iter().enumerate() {
            if queue.name.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "queues[].name".to_string(),
                    reason: "queue name must not be empty".to_string(),
                });
            }
            if index.insert(queue.name.clone(), position).is_some() {
                return Err(ConfigError::DuplicateQueue(queue.name.clone()));
            }
        }

        Ok(Self { queues, index })
    }

    /// Builds queues from file entries, reading schemas relative to `base_dir`.
    pub fn from_entries(
        entries: impl IntoIterator<Item = QueueEntry>,
        base_dir: &Path,
    ) -> Result<Self, ConfigError> {
        let queues = entries
            .into_iter()
            .map(|entry| match entry.schema {
                Some(schema_path) => {
                    let schema = load_schema(&base_dir.join(schema_path))?;
                    Queue::with_schema(entry.name, schema)
                }
                None => Ok(Queue::new(entry.name)),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(queues)
    }

    /// Loads `{queues: [{name, schema?}]}` from a YAML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = read_file(path)?;
        let file: QueuesFile = serde_yaml::from_str(&content).map_err(|e| ConfigError::Yaml {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let registry = Self::from_entries(file.queues.unwrap_or_default(), base_dir)?;
        info!(
            path = %path.display(),
            queues = registry.len(),
            default_queue = %registry.default_queue().name(),
            "Loaded queues"
        );
        Ok(registry)
    }

    /// Resolves a queue selector; `Default` never fails.
    pub fn resolve(&self, name: &QueueName) -> Result<&Queue, GatewayError> {
        match name {
            QueueName::Default => Ok(self.default_queue()),
            QueueName::Named(name) => self
                .index
                .get(name)
                .map(|&position| &self.queues[position])
                .ok_or_else(|| GatewayError::QueueNotFound(name.clone())),
        }
    }

    /// The first configured queue.
    pub fn default_queue(&self) -> &Queue {
        // `new` guarantees at least one queue.
        &self.queues[0]
    }

    /// Queue names in declaration order plus the default queue's name.
    pub fn list(&self) -> QueueListing {
        QueueListing {
            queues: self.queues.iter().map(|q| q.name.clone()).collect(),
            default_queue: self.default_queue().name.clone(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Queue> {
        self.queues.iter()
    }

    pub fn len(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads a schema file; YAML parsing also accepts JSON documents.
fn load_schema(path: &Path) -> Result<Value, ConfigError> {
    let content = read_file(path)?;
    serde_yaml::from_str(&content).map_err(|e| ConfigError::Yaml {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn write_file(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent");
        }
        std::fs::write(path, content).expect("write file");
    }

    #[test]
    fn empty_configuration_yields_implicit_default_queue() {
        let registry = QueueRegistry::new(Vec::new()).expect("registry");
        assert_eq!(
            registry.list(),
            QueueListing {
                queues: vec!["default".to_string()],
                default_queue: "default".to_string(),
            }
        );
    }

    #[test]
    fn first_queue_is_default_and_order_is_kept() {
        let registry = QueueRegistry::new([Queue::new("b"), Queue::new("a"), Queue::new("c")])
            .expect("registry");
        let listing = registry.list();
        assert_eq!(listing.queues, vec!["b", "a", "c"]);
        assert_eq!(listing.default_queue, "b");
    }

    #[test]
    fn resolve_default_equals_resolve_by_default_name() {
        let registry =
            QueueRegistry::new([Queue::new("orders"), Queue::new("events")]).expect("registry");
        let by_default = registry.resolve(&QueueName::Default).expect("default");
        let by_name = registry
            .resolve(&QueueName::from(registry.default_queue().name()))
            .expect("named");
        assert!(std::ptr::eq(by_default, by_name));
    }

    #[test]
    fn resolve_unknown_queue_carries_name() {
        let registry = QueueRegistry::new([Queue::new("orders")]).expect("registry");
        let err = registry.resolve(&QueueName::from("xxx")).unwrap_err();
        assert!(matches!(err, GatewayError::QueueNotFound(name) if name == "xxx"));
    }

    #[test]
    fn resolve_is_exact_match() {
        let registry = QueueRegistry::new([Queue::new("orders")]).expect("registry");
        assert!(registry.resolve(&QueueName::from("Orders")).is_err());
        assert!(registry.resolve(&QueueName::from("orders ")).is_err());
    }

    #[test]
    fn rejects_duplicate_and_empty_names() {
        let err = QueueRegistry::new([Queue::new("a"), Queue::new("a")]).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateQueue(name) if name == "a"));

        let err = QueueRegistry::new([Queue::new("")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn loads_queue_file_with_sibling_schema() {
        let dir = tempfile::tempdir().expect("tempdir");
        let queues_path = dir.path().join("config/queues.yaml");
        write_file(
            &queues_path,
            "queues:\n  - name: orders\n    schema: orders.schema.yaml\n  - name: audit\n",
        );
        write_file(
            &dir.path().join("config/orders.schema.yaml"),
            "type: object\nrequired: [id]\nproperties:\n  id:\n    type: integer\n",
        );

        let registry = QueueRegistry::load(&queues_path).expect("load queues");
        assert_eq!(registry.list().queues, vec!["orders", "audit"]);

        let orders = registry.resolve(&QueueName::Default).expect("orders");
        assert_eq!(orders.schema().expect("schema")["required"], json!(["id"]));
        assert!(orders.validate(&json!({"id": 7})).is_ok());
        assert!(orders.validate(&json!({"id": "seven"})).is_err());

        let audit = registry.resolve(&QueueName::from("audit")).expect("audit");
        assert!(audit.schema().is_none());
        assert!(audit.validate(&json!({"anything": true})).is_ok());
    }

    #[test]
    fn json_schema_files_are_accepted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let queues_path = dir.path().join("queues.yaml");
        write_file(&queues_path, "queues:\n  - name: events\n    schema: events.json\n");
        write_file(
            &dir.path().join("events.json"),
            r#"{"type": "object", "required": ["kind"]}"#,
        );

        let registry = QueueRegistry::load(&queues_path).expect("load queues");
        let events = registry.resolve(&QueueName::from("events")).expect("events");
        assert!(events.validate(&json!({})).is_err());
    }

    #[test]
    fn empty_queue_list_in_file_yields_default() {
        let dir = tempfile::tempdir().expect("tempdir");
        let queues_path = dir.path().join("queues.yaml");
        write_file(&queues_path, "queues:\n");

        let registry = QueueRegistry::load(&queues_path).expect("load queues");
        assert_eq!(registry.default_queue().name(), IMPLICIT_QUEUE_NAME);
    }

    #[test]
    fn missing_schema_file_fails_the_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let queues_path = dir.path().join("queues.yaml");
        write_file(&queues_path, "queues:\n  - name: orders\n    schema: nope.yaml\n");

        let err = QueueRegistry::load(&queues_path).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn malformed_queue_file_fails_the_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let queues_path = dir.path().join("queues.yaml");
        write_file(&queues_path, "queues: [unterminated\n");

        let err = QueueRegistry::load(&queues_path).unwrap_err();
        assert!(matches!(err, ConfigError::Yaml { .. }));
    }
}
