use crate::domain::ports::DocumentSource;
use crate::utils::error::{ExplorerError, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::io::{Cursor, Read};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_DOCUMENT_TIMEOUT: Duration = Duration::from_secs(120);

const ZIP_SIGNATURE: &[u8] = b"PK\x03\x04";

/// Downloads roll documents: one attempt, bounded by a timeout, never retried.
pub struct HttpDocumentSource {
    client: Client,
    timeout: Duration,
}

impl HttpDocumentSource {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            timeout,
        }
    }
}

impl Default for HttpDocumentSource {
    fn default() -> Self {
        Self::new(DEFAULT_DOCUMENT_TIMEOUT)
    }
}

#[async_trait]
impl DocumentSource for HttpDocumentSource {
    async fn fetch_document(&self, url: &str) -> Result<Vec<u8>> {
        tracing::info!("📥 Downloading roll from {}", url);

        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ExplorerError::source_unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExplorerError::source_unavailable(format!(
                "document request returned HTTP {}",
                status
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ExplorerError::source_unavailable(e.to_string()))?;
        tracing::debug!("Downloaded {} bytes", bytes.len());

        unwrap_archive(bytes.to_vec())
    }
}

/// Reads a roll from disk, for offline use.
pub async fn read_document_file(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    let bytes = tokio::fs::read(path.as_ref()).await?;
    tracing::debug!("Read {} bytes from {}", bytes.len(), path.as_ref().display());
    unwrap_archive(bytes)
}

/// Returns the first `.xml` entry when `bytes` is a ZIP archive, else `bytes` unchanged.
pub fn unwrap_archive(bytes: Vec<u8>) -> Result<Vec<u8>> {
    if !bytes.starts_with(ZIP_SIGNATURE) {
        return Ok(bytes);
    }

    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ExplorerError::malformed(format!("invalid archive: {}", e)))?;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if !entry.is_file() || !entry.name().to_lowercase().ends_with(".xml") {
            continue;
        }

        tracing::info!("🗜️ Using archive entry {}", entry.name());
        let mut xml = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut xml)?;
        return Ok(xml);
    }

    Err(ExplorerError::malformed("archive contains no XML file"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use std::io::Write;
    use zip::write::{SimpleFileOptions, ZipWriter};

    fn zip_with(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn test_plain_xml_passes_through() {
        let xml = b"<RL/>".to_vec();
        assert_eq!(unwrap_archive(xml.clone()).unwrap(), xml);
    }

    #[test]
    fn test_archive_yields_first_xml_entry() {
        let archive = zip_with(&[("lisezmoi.txt", "bonjour"), ("ROLE_2024.XML", "<RL/>")]);
        assert_eq!(unwrap_archive(archive).unwrap(), b"<RL/>".to_vec());
    }

    #[test]
    fn test_archive_without_xml_is_malformed() {
        let archive = zip_with(&[("roles.csv", "a;b")]);
        let err = unwrap_archive(archive).unwrap_err();
        assert!(matches!(err, ExplorerError::MalformedDocument { .. }));
    }

    #[tokio::test]
    async fn test_fetch_document() {
        let server = MockServer::start();
        let doc_mock = server.mock(|when, then| {
            when.method(GET).path("/roles/95.zip");
            then.status(200)
                .header("Content-Type", "application/zip")
                .body(zip_with(&[("95.xml", "<RL><RLM02A>2024</RLM02A></RL>")]));
        });

        let source = HttpDocumentSource::default();
        let bytes = source.fetch_document(&server.url("/roles/95.zip")).await.unwrap();

        doc_mock.assert();
        assert_eq!(bytes, b"<RL><RLM02A>2024</RLM02A></RL>".to_vec());
    }

    #[tokio::test]
    async fn test_fetch_document_failure_is_not_retried() {
        let server = MockServer::start();
        let doc_mock = server.mock(|when, then| {
            when.method(GET).path("/roles/missing.xml");
            then.status(404);
        });

        let source = HttpDocumentSource::default();
        let err = source
            .fetch_document(&server.url("/roles/missing.xml"))
            .await
            .unwrap_err();

        doc_mock.assert_hits(1);
        assert!(matches!(err, ExplorerError::SourceUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_connection_failure_is_source_unavailable() {
        // 先取得可用埠再關閉，確保連線被拒
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        let source = HttpDocumentSource::new(Duration::from_secs(5));
        let err = source
            .fetch_document(&format!("http://127.0.0.1:{}/roles/95.xml", port))
            .await
            .unwrap_err();

        assert!(matches!(err, ExplorerError::SourceUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_read_document_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("role.xml");
        std::fs::write(&path, b"<RL/>").unwrap();

        assert_eq!(read_document_file(&path).await.unwrap(), b"<RL/>".to_vec());
    }
}
