//! Layered dot-addressed configuration store.
//!
//! A `LayeredStore` accumulates configuration fragments from files and the
//! process environment into a single tree of dot-separated keys. Layers merge
//! in load order; in strict mode a key that changes shape between layers
//! (table in one, scalar in another) fails the merge instead of being
//! silently overwritten. Stores are loaded once during startup and treated
//! as read-only afterwards.

mod error;
mod merge;

pub use error::StoreError;

use serde_json::{Map, Value};

/// Supported source formats for [`LayeredStore::load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Toml,
}

/// Store construction options.
#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    /// Key path delimiter.
    pub delimiter: char,
    /// Fail on shape conflicts between layers instead of overwriting.
    pub strict_merge: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            delimiter: '.',
            strict_merge: false,
        }
    }
}

impl StoreOptions {
    /// Options with strict merging enabled.
    pub fn strict() -> Self {
        Self {
            strict_merge: true,
            ..Self::default()
        }
    }
}

/// Ordered, dot-addressed key-value store with deterministic merge.
#[derive(Debug, Clone, Default)]
pub struct LayeredStore {
    options: StoreOptions,
    root: Map<String, Value>,
}

impl LayeredStore {
    /// Create an empty store.
    pub fn new(options: StoreOptions) -> Self {
        Self {
            options,
            root: Map::new(),
        }
    }

    /// Parse `bytes` per `format` and merge the resulting tree over the
    /// layers loaded so far.
    ///
    /// The top-level value must be a table. In strict mode a key holding a
    /// table in one layer and a non-table value in another fails with
    /// [`StoreError::MergeConflict`]; same-shape collisions resolve in favour
    /// of the later layer.
    pub fn load(&mut self, bytes: &[u8], format: Format) -> Result<(), StoreError> {
        let value = match format {
            Format::Json => serde_json::from_slice::<Value>(bytes).map_err(|e| {
                StoreError::Parse {
                    format: "JSON",
                    message: e.to_string(),
                }
            })?,
            Format::Toml => {
                let text = std::str::from_utf8(bytes).map_err(|e| StoreError::Parse {
                    format: "TOML",
                    message: format!("invalid UTF-8: {}", e),
                })?;
                let table: toml::Value = toml::from_str(text).map_err(|e| StoreError::Parse {
                    format: "TOML",
                    message: e.to_string(),
                })?;
                toml_to_json(table)
            }
        };

        let incoming = match value {
            Value::Object(map) => map,
            other => {
                return Err(StoreError::NotATable {
                    kind: merge::value_shape(&other),
                })
            }
        };

        merge::merge_maps(
            &mut self.root,
            incoming,
            self.options.strict_merge,
            self.options.delimiter,
            &mut Vec::new(),
        )
    }

    /// Merge matching process environment variables as one flattened layer.
    ///
    /// A variable `PREFIX_A_B=v` (with `env_delimiter` `_`) becomes the key
    /// `a.b` holding the string `v`: the prefix and one delimiter are
    /// stripped, the rest is lower-cased and the environment delimiter is
    /// replaced by the store delimiter. Variables are visited in sorted order
    /// so the layer is deterministic.
    pub fn load_env(&mut self, prefix: &str, env_delimiter: char) -> Result<(), StoreError> {
        let marker = format!("{}{}", prefix, env_delimiter);
        let mut vars: Vec<(String, String)> = std::env::vars()
            .filter(|(name, _)| name.starts_with(&marker))
            .collect();
        vars.sort();

        let mut layer = Map::new();
        for (name, value) in vars {
            let key = name[marker.len()..]
                .to_lowercase()
                .replace(env_delimiter, &self.options.delimiter.to_string());
            if key.is_empty() {
                continue;
            }
            let nested = nest(&key, self.options.delimiter, Value::String(value));
            merge::merge_maps(
                &mut layer,
                nested,
                self.options.strict_merge,
                self.options.delimiter,
                &mut Vec::new(),
            )?;
        }

        merge::merge_maps(
            &mut self.root,
            layer,
            self.options.strict_merge,
            self.options.delimiter,
            &mut Vec::new(),
        )
    }

    /// Return a new store holding only the sub-tree rooted at `prefix`, or an
    /// empty store when the prefix does not resolve to a table.
    pub fn cut(&self, prefix: &str) -> Self {
        let root = match self.get(prefix) {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        };
        Self {
            options: self.options,
            root,
        }
    }

    /// Look up the raw value at a dotted key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        let mut current: &Value = self.root.get(key.split(self.options.delimiter).next()?)?;
        for part in key.split(self.options.delimiter).skip(1) {
            current = current.get(part)?;
        }
        Some(current)
    }

    /// Whether a key resolves to any value.
    pub fn exists(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// The scalar at `key` rendered as text.
    ///
    /// Numbers and booleans are formatted; an absent key or a container
    /// yields the empty string. Lookup is best effort and never fails.
    pub fn string(&self, key: &str) -> String {
        match self.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            _ => String::new(),
        }
    }

    /// Sorted dotted paths of every leaf value in the store.
    pub fn keys(&self) -> Vec<String> {
        let mut out = Vec::new();
        collect_keys(&self.root, self.options.delimiter, String::new(), &mut out);
        out.sort();
        out
    }

    /// Number of leaf values in the store.
    pub fn len(&self) -> usize {
        self.keys().len()
    }

    /// Whether the store holds no values at all.
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Serialize the whole tree to pretty-printed JSON, the store's
    /// canonical interchange format (re-loadable via [`Format::Json`]).
    pub fn marshal(&self) -> Result<Vec<u8>, StoreError> {
        serde_json::to_vec_pretty(&Value::Object(self.root.clone()))
            .map_err(|e| StoreError::Serialize(e.to_string()))
    }
}

/// Build a single-leaf nested map for a dotted key.
fn nest(key: &str, delimiter: char, value: Value) -> Map<String, Value> {
    let mut parts = key.split(delimiter).rev();
    let leaf = parts.next().unwrap_or(key);
    let mut current = Map::new();
    current.insert(leaf.to_string(), value);
    for part in parts {
        let mut parent = Map::new();
        parent.insert(part.to_string(), Value::Object(current));
        current = parent;
    }
    current
}

fn collect_keys(map: &Map<String, Value>, delimiter: char, prefix: String, out: &mut Vec<String>) {
    for (key, value) in map {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}{}{}", prefix, delimiter, key)
        };
        match value {
            Value::Object(inner) if !inner.is_empty() => {
                collect_keys(inner, delimiter, path, out);
            }
            _ => out.push(path),
        }
    }
}

/// Convert a TOML value tree into the store's JSON representation.
fn toml_to_json(value: toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::Number(i.into()),
        toml::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strict() -> LayeredStore {
        LayeredStore::new(StoreOptions::strict())
    }

    #[test]
    fn test_load_toml_then_json() {
        let mut store = strict();
        store
            .load(b"[server]\nhost = \"a\"\nport = 8080\n", Format::Toml)
            .unwrap();
        store
            .load(br#"{"server": {"host": "b"}}"#, Format::Json)
            .unwrap();

        assert_eq!(store.string("server.host"), "b");
        assert_eq!(store.string("server.port"), "8080");
    }

    #[test]
    fn test_disjoint_layers_union() {
        let mut store = strict();
        store.load(br#"{"a": {"b": 1}}"#, Format::Json).unwrap();
        store.load(br#"{"a": {"c": 2}}"#, Format::Json).unwrap();

        assert_eq!(store.string("a.b"), "1");
        assert_eq!(store.string("a.c"), "2");
    }

    #[test]
    fn test_strict_shape_conflict_fails() {
        let mut store = strict();
        store.load(br#"{"a": {"b": 1}}"#, Format::Json).unwrap();
        let err = store.load(br#"{"a": "flat"}"#, Format::Json).unwrap_err();

        match err {
            StoreError::MergeConflict { key, .. } => assert_eq!(key, "a"),
            other => panic!("expected MergeConflict, got {:?}", other),
        }
    }

    #[test]
    fn test_non_strict_shape_conflict_overwrites() {
        let mut store = LayeredStore::new(StoreOptions::default());
        store.load(br#"{"a": {"b": 1}}"#, Format::Json).unwrap();
        store.load(br#"{"a": "flat"}"#, Format::Json).unwrap();

        assert_eq!(store.string("a"), "flat");
    }

    #[test]
    fn test_top_level_must_be_table() {
        let mut store = strict();
        let err = store.load(br#"[1, 2]"#, Format::Json).unwrap_err();
        assert!(matches!(err, StoreError::NotATable { .. }));
    }

    #[test]
    fn test_load_env_layer() {
        std::env::set_var("STRATALIB_T1_DB_HOST", "envhost");
        std::env::set_var("STRATALIB_T1_DB_PORT", "5432");

        let mut store = strict();
        store.load(br#"{"db": {"host": "filehost"}}"#, Format::Json).unwrap();
        store.load_env("STRATALIB_T1", '_').unwrap();

        assert_eq!(store.string("db.host"), "envhost");
        assert_eq!(store.string("db.port"), "5432");
    }

    #[test]
    fn test_load_env_ignores_other_prefixes() {
        std::env::set_var("STRATALIB_T2_ONLY", "x");
        std::env::set_var("OTHERPREFIX_ONLY", "y");

        let mut store = strict();
        store.load_env("STRATALIB_T2", '_').unwrap();

        assert_eq!(store.string("only"), "x");
        assert_eq!(store.keys(), vec!["only".to_string()]);
    }

    #[test]
    fn test_cut_subtree() {
        let mut store = strict();
        store
            .load(br#"{"a": {"b": {"c": "x", "d": "y"}}}"#, Format::Json)
            .unwrap();

        let sub = store.cut("a.b");
        assert_eq!(sub.string("c"), "x");
        assert_eq!(sub.string("d"), "y");
    }

    #[test]
    fn test_cut_scalar_is_empty() {
        let mut store = strict();
        store.load(br#"{"a": {"b": "x"}}"#, Format::Json).unwrap();

        assert!(store.cut("a.b").is_empty());
        assert!(store.cut("missing").is_empty());
    }

    #[test]
    fn test_string_on_missing_and_container() {
        let mut store = strict();
        store.load(br#"{"a": {"b": 1}}"#, Format::Json).unwrap();

        assert_eq!(store.string("a"), "");
        assert_eq!(store.string("nope"), "");
    }

    #[test]
    fn test_marshal_round_trip() {
        let mut store = strict();
        store
            .load(br#"{"a": {"b": {"user": "u", "pass": "p"}}}"#, Format::Json)
            .unwrap();

        let bytes = store.cut("a.b").marshal().unwrap();
        let mut reparsed = strict();
        reparsed.load(&bytes, Format::Json).unwrap();

        assert_eq!(reparsed.string("user"), "u");
        assert_eq!(reparsed.string("pass"), "p");
    }

    #[test]
    fn test_keys_sorted_leaves() {
        let mut store = strict();
        store
            .load(br#"{"z": 1, "a": {"m": 2, "b": 3}}"#, Format::Json)
            .unwrap();

        assert_eq!(store.keys(), vec!["a.b", "a.m", "z"]);
        assert_eq!(store.len(), 3);
        assert!(!store.is_empty());
    }
}
