use std::fmt;

/// Location inside one JSON document, as a list of object keys.
///
/// Displays in the `$.a.b` form shared by SQLite and DuckDB; dialects with a
/// different path syntax render [`JsonPath::segments`] themselves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct JsonPath(Vec<String>);

impl JsonPath {
    /// The document itself.
    pub fn root() -> Self {
        Self::default()
    }

    pub fn child(&self, key: &str) -> Self {
        let mut path = self.clone();
        path.push(key);
        path
    }

    pub fn push(&mut self, key: &str) {
        self.0.push(key.to_string());
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("$")?;
        for key in &self.0 {
            write!(f, ".{}", key)?;
        }
        Ok(())
    }
}
