//! Dataset serialization and hand-off to the host.

use crate::error::{CoverageError, Result};
use crate::traits::FileHost;
use crate::types::Row;
use serde::Serialize;

/// Line separator between rows of delimited formats.
pub const LINE_SEPARATOR: &str = "\r\n";

/// A stateless pairing of a dataset transform with a MIME type.
#[derive(Debug, Clone, Copy)]
pub struct FormatDescriptor {
    pub name: &'static str,
    pub transform: fn(&[Row]) -> String,
    pub mime_type: &'static str,
    pub extension: &'static str,
}

pub const CSV: FormatDescriptor = FormatDescriptor {
    name: "csv",
    transform: to_csv,
    mime_type: "text/csv",
    extension: "csv",
};

pub const TSV: FormatDescriptor = FormatDescriptor {
    name: "tsv",
    transform: to_tsv,
    mime_type: "text/tsv",
    extension: "tsv",
};

pub const JSON: FormatDescriptor = FormatDescriptor {
    name: "json",
    transform: to_json,
    mime_type: "application/json",
    extension: "json",
};

impl PartialEq for FormatDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.mime_type == other.mime_type
    }
}

impl FormatDescriptor {
    pub const BUILT_IN: [FormatDescriptor; 3] = [CSV, TSV, JSON];

    pub fn by_name(name: &str) -> Option<FormatDescriptor> {
        Self::BUILT_IN
            .into_iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// `name` with this format's extension appended unless already present.
    pub fn file_name(&self, stem: &str) -> String {
        let suffix = format!(".{}", self.extension);
        if stem.to_ascii_lowercase().ends_with(&suffix) {
            stem.to_string()
        } else {
            format!("{}{}", stem, suffix)
        }
    }
}

fn delimited(dataset: &[Row], delimiter: &str) -> String {
    dataset
        .iter()
        .map(|row| row.join(delimiter))
        .collect::<Vec<_>>()
        .join(LINE_SEPARATOR)
}

pub fn to_csv(dataset: &[Row]) -> String {
    delimited(dataset, ",")
}

pub fn to_tsv(dataset: &[Row]) -> String {
    delimited(dataset, "\t")
}

pub fn to_json(dataset: &[Row]) -> String {
    serde_json::to_string_pretty(dataset).unwrap_or_else(|_| "[]".to_string())
}

/// Render `dataset` with `descriptor`. No I/O.
pub fn format(dataset: &[Row], descriptor: &FormatDescriptor) -> String {
    (descriptor.transform)(dataset)
}

/// Bytes ready for the host, with their MIME type and suggested name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportFile {
    pub name: String,
    pub mime_type: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

impl ExportFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }
}

/// Offer `bytes` to the host as a file named `file_name`.
pub fn export(
    host: &dyn FileHost,
    bytes: Vec<u8>,
    file_name: &str,
    mime_type: &str,
) -> Result<ExportFile> {
    let file = ExportFile::new(file_name, mime_type, bytes);
    host.offer_file(&file).map_err(CoverageError::Export)?;
    tracing::info!(
        file = %file.name,
        mime = %file.mime_type,
        bytes = file.bytes.len(),
        "file offered to host"
    );
    Ok(file)
}

/// Bind a format to a host, giving a `(dataset, file name)` exporter.
pub fn export_as<'a>(
    descriptor: &'a FormatDescriptor,
    host: &'a dyn FileHost,
) -> impl Fn(&[Row], &str) -> Result<ExportFile> + 'a {
    move |dataset: &[Row], file_name: &str| {
        let text = format(dataset, descriptor);
        export(host, text.into_bytes(), file_name, descriptor.mime_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryHost;
    use crate::traits::{CapError, CapResult};

    fn abcd() -> Vec<Row> {
        vec![
            vec!["a".into(), "b".into()],
            vec!["c".into(), "d".into()],
        ]
    }

    #[test]
    fn test_csv() {
        assert_eq!(format(&abcd(), &CSV), "a,b\r\nc,d");
    }

    #[test]
    fn test_tsv() {
        assert_eq!(format(&abcd(), &TSV), "a\tb\r\nc\td");
    }

    #[test]
    fn test_json() {
        let v: serde_json::Value = serde_json::from_str(&format(&abcd(), &JSON)).unwrap();
        assert_eq!(v, serde_json::json!([["a", "b"], ["c", "d"]]));
    }

    #[test]
    fn test_empty_dataset() {
        assert_eq!(format(&[], &CSV), "");
    }

    #[test]
    fn test_by_name() {
        assert_eq!(FormatDescriptor::by_name("TSV"), Some(TSV));
        assert_eq!(FormatDescriptor::by_name("csv").unwrap().mime_type, "text/csv");
        assert!(FormatDescriptor::by_name("xlsx").is_none());
    }

    #[test]
    fn test_file_name() {
        assert_eq!(CSV.file_name("coverage"), "coverage.csv");
        assert_eq!(CSV.file_name("coverage.CSV"), "coverage.CSV");
        assert_eq!(TSV.file_name("coverage.csv"), "coverage.csv.tsv");
    }

    #[test]
    fn test_export_as_hands_bytes_to_host() {
        let host = MemoryHost::new();
        let export_csv = export_as(&CSV, &host);
        export_csv(&abcd(), "new csv1").unwrap();

        let files = host.files();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "new csv1");
        assert_eq!(files[0].mime_type, "text/csv");
        assert_eq!(files[0].bytes, b"a,b\r\nc,d");
    }

    struct RefusingHost;

    impl FileHost for RefusingHost {
        fn offer_file(&self, _file: &ExportFile) -> CapResult<()> {
            Err(CapError::Unsupported("no save dialog".into()))
        }
    }

    #[test]
    fn test_export_error_propagates() {
        let err = export_as(&TSV, &RefusingHost)(&abcd(), "x.tsv").unwrap_err();
        assert!(matches!(err, CoverageError::Export(CapError::Unsupported(_))));
    }
}
