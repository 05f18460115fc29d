use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum FixtureError {
    #[error("No {category} template named {name:?} in {root}")]
    NotFound {
        category: &'static str,
        name: String,
        root: PathBuf,
    },

    #[error("Malformed fixture {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("Fail to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed device table {path}: {source}")]
    Table {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Expected a {expected} template, found a {found} template")]
    UnexpectedTemplate {
        expected: &'static str,
        found: &'static str,
    },
}
