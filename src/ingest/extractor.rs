//! External PDF tokenizer subprocess with a file-based handshake.
//!
//! The extractor program is invoked as `<command...> <pdf_path> <doc_id>
//! <temp_json_path>` and must write `{"title": ..., "body_tokens": [...]}`
//! to the temp path. The temp file is removed on every outcome.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Deserialize;

use crate::DocId;
use crate::error::{PapyrusError, Result};

/// Output of a successful extraction.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractedDocument {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default)]
    pub body_tokens: Vec<String>,
}

fn default_title() -> String {
    "Untitled".to_string()
}

/// Invokes the external tokenizer once per document.
#[derive(Debug, Clone)]
pub struct PdfExtractor {
    /// Argv prefix of the tokenizer program.
    command: Vec<String>,
    /// Directory for the handshake files.
    temp_json_dir: PathBuf,
}

impl PdfExtractor {
    pub fn new(command: Vec<String>, temp_json_dir: PathBuf) -> Self {
        PdfExtractor {
            command,
            temp_json_dir,
        }
    }

    /// Run the tokenizer for one PDF and parse its output.
    pub fn extract(&self, pdf_path: &Path, doc_id: DocId) -> Result<ExtractedDocument> {
        fs::create_dir_all(&self.temp_json_dir)?;
        let temp_json = self.temp_json_dir.join(format!("temp_{doc_id}.json"));

        let result = self.run_tokenizer(pdf_path, doc_id, &temp_json);
        let _ = fs::remove_file(&temp_json);
        result
    }

    fn run_tokenizer(
        &self,
        pdf_path: &Path,
        doc_id: DocId,
        temp_json: &Path,
    ) -> Result<ExtractedDocument> {
        let program = self
            .command
            .first()
            .ok_or_else(|| PapyrusError::ingest("Empty tokenizer command"))?;

        let status = Command::new(program)
            .args(&self.command[1..])
            .arg(pdf_path)
            .arg(doc_id.to_string())
            .arg(temp_json)
            .status()
            .map_err(|e| PapyrusError::ingest(format!("Could not launch tokenizer: {e}")))?;

        if !status.success() {
            return Err(PapyrusError::ingest(format!(
                "Tokenizer failed for {} (status {status})",
                pdf_path.display()
            )));
        }

        let raw = fs::read_to_string(temp_json).map_err(|e| {
            PapyrusError::ingest(format!(
                "Could not read tokenizer output for {}: {e}",
                pdf_path.display()
            ))
        })?;
        let extracted: ExtractedDocument = serde_json::from_str(&raw).map_err(|e| {
            PapyrusError::ingest(format!("Bad tokenizer output for {}: {e}", pdf_path.display()))
        })?;

        if extracted.body_tokens.is_empty() {
            return Err(PapyrusError::ingest(format!(
                "No tokens extracted from {}",
                pdf_path.display()
            )));
        }
        Ok(extracted)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    /// A stand-in tokenizer: a shell script writing fixed JSON to its third
    /// argument.
    fn fake_tokenizer(dir: &TempDir, body: &str) -> Vec<String> {
        let script = dir.path().join("tokenize.sh");
        fs::write(&script, format!("#!/bin/sh\n{body}\n")).unwrap();
        let mut perms = fs::metadata(&script).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&script, perms).unwrap();
        vec![script.to_string_lossy().into_owned()]
    }

    #[test]
    fn test_extract_success() {
        let dir = TempDir::new().unwrap();
        let command = fake_tokenizer(
            &dir,
            r#"echo '{"title":"A Paper","body_tokens":["alpha","beta"]}' > "$3""#,
        );
        let extractor = PdfExtractor::new(command, dir.path().join("temp_json"));

        let pdf = dir.path().join("doc.pdf");
        fs::write(&pdf, b"%PDF").unwrap();

        let extracted = extractor.extract(&pdf, 7).unwrap();
        assert_eq!(extracted.title, "A Paper");
        assert_eq!(extracted.body_tokens, vec!["alpha", "beta"]);

        // handshake file cleaned up
        assert!(!dir.path().join("temp_json/temp_7.json").exists());
    }

    #[test]
    fn test_extract_default_title() {
        let dir = TempDir::new().unwrap();
        let command = fake_tokenizer(&dir, r#"echo '{"body_tokens":["alpha"]}' > "$3""#);
        let extractor = PdfExtractor::new(command, dir.path().join("temp_json"));
        let pdf = dir.path().join("doc.pdf");
        fs::write(&pdf, b"%PDF").unwrap();

        let extracted = extractor.extract(&pdf, 1).unwrap();
        assert_eq!(extracted.title, "Untitled");
    }

    #[test]
    fn test_nonzero_exit_fails() {
        let dir = TempDir::new().unwrap();
        let command = fake_tokenizer(&dir, "exit 3");
        let extractor = PdfExtractor::new(command, dir.path().join("temp_json"));
        let pdf = dir.path().join("doc.pdf");
        fs::write(&pdf, b"%PDF").unwrap();

        let err = extractor.extract(&pdf, 1).unwrap_err();
        assert!(err.to_string().contains("Tokenizer failed"));
    }

    #[test]
    fn test_empty_tokens_fail() {
        let dir = TempDir::new().unwrap();
        let command = fake_tokenizer(
            &dir,
            r#"echo '{"title":"Empty","body_tokens":[]}' > "$3""#,
        );
        let extractor = PdfExtractor::new(command, dir.path().join("temp_json"));
        let pdf = dir.path().join("doc.pdf");
        fs::write(&pdf, b"%PDF").unwrap();

        let err = extractor.extract(&pdf, 2).unwrap_err();
        assert!(err.to_string().contains("No tokens"));
        assert!(!dir.path().join("temp_json/temp_2.json").exists());
    }

    #[test]
    fn test_missing_output_fails() {
        let dir = TempDir::new().unwrap();
        let command = fake_tokenizer(&dir, "true");
        let extractor = PdfExtractor::new(command, dir.path().join("temp_json"));
        let pdf = dir.path().join("doc.pdf");
        fs::write(&pdf, b"%PDF").unwrap();

        let err = extractor.extract(&pdf, 3).unwrap_err();
        assert!(err.to_string().contains("Could not read tokenizer output"));
    }
}
