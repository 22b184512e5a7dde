use serde::Serialize;
use std::collections::BTreeMap;

/// Project kind derived from the TEMPLATE variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ProjectType {
    /// TEMPLATE named an unknown kind, or the file could not be read
    Invalid,
    Application,
    Library,
    Script,
    Aux,
    SubDirs,
}

impl ProjectType {
    /// Map a TEMPLATE value to a project type. A missing TEMPLATE means
    /// an application project.
    pub fn from_template(value: Option<&str>) -> Self {
        match value {
            None => ProjectType::Application,
            Some("app") => ProjectType::Application,
            Some("lib") => ProjectType::Library,
            Some("script") => ProjectType::Script,
            Some("aux") => ProjectType::Aux,
            Some("subdirs") => ProjectType::SubDirs,
            Some(_) => ProjectType::Invalid,
        }
    }

    /// Only application and library projects produce build artifacts
    pub fn is_buildable(&self) -> bool {
        matches!(self, ProjectType::Application | ProjectType::Library)
    }
}

impl std::fmt::Display for ProjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ProjectType::Invalid => "invalid",
            ProjectType::Application => "application",
            ProjectType::Library => "library",
            ProjectType::Script => "script",
            ProjectType::Aux => "aux",
            ProjectType::SubDirs => "subdirs",
        };
        write!(f, "{}", name)
    }
}

/// Classification of a file listed by a project
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum FileKind {
    Source,
    Header,
    Resource,
    Form,
    Other,
    /// A .pri file pulled in via include()
    ProjectInclude,
}

/// The final variable map of one evaluation, ordered by variable name
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VariableBindings {
    values: BTreeMap<String, Vec<String>>,
}

impl VariableBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// All values bound to `name`, empty when unset
    pub fn get(&self, name: &str) -> &[String] {
        self.values.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The first value bound to `name`
    pub fn first(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(|v| v.first()).map(String::as_str)
    }

    pub fn contains_value(&self, name: &str, value: &str) -> bool {
        self.get(name).iter().any(|v| v == value)
    }

    pub fn is_set(&self, name: &str) -> bool {
        self.values.get(name).is_some_and(|v| !v.is_empty())
    }

    pub fn set(&mut self, name: impl Into<String>, values: Vec<String>) {
        self.values.insert(name.into(), values);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<BTreeMap<String, Vec<String>>> for VariableBindings {
    fn from(values: BTreeMap<String, Vec<String>>) -> Self {
        Self { values }
    }
}

impl FromIterator<(String, Vec<String>)> for VariableBindings {
    fn from_iter<I: IntoIterator<Item = (String, Vec<String>)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_type_from_template() {
        assert_eq!(ProjectType::from_template(None), ProjectType::Application);
        assert_eq!(
            ProjectType::from_template(Some("app")),
            ProjectType::Application
        );
        assert_eq!(
            ProjectType::from_template(Some("lib")),
            ProjectType::Library
        );
        assert_eq!(
            ProjectType::from_template(Some("subdirs")),
            ProjectType::SubDirs
        );
        assert_eq!(
            ProjectType::from_template(Some("vcapp")),
            ProjectType::Invalid
        );
    }

    #[test]
    fn test_buildable_types() {
        assert!(ProjectType::Application.is_buildable());
        assert!(ProjectType::Library.is_buildable());
        assert!(!ProjectType::SubDirs.is_buildable());
        assert!(!ProjectType::Aux.is_buildable());
        assert!(!ProjectType::Invalid.is_buildable());
    }

    #[test]
    fn test_bindings_accessors() {
        let mut bindings = VariableBindings::new();
        bindings.set("CONFIG", vec!["debug".into(), "c++17".into()]);

        assert_eq!(bindings.get("CONFIG").len(), 2);
        assert_eq!(bindings.first("CONFIG"), Some("debug"));
        assert!(bindings.contains_value("CONFIG", "c++17"));
        assert!(!bindings.is_set("SOURCES"));
        assert_eq!(bindings.get("SOURCES"), &[] as &[String]);
    }
}
