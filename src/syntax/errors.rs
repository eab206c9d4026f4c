use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyntaxError {
    #[error("no grammar for {path} (unsupported extension)")]
    UnsupportedLanguage { path: PathBuf },

    #[error("failed to set {lang} language for parser")]
    LanguageSet { lang: String },

    #[error("failed to parse source code")]
    ParseFailed,

    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
