//! Saves the backend's note report to a local file.
//!
//! The report is streamed to disk as it arrives; its content is the backend's
//! business and is never parsed here.

use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::client::BackendStore;
use crate::db::Capability;
use crate::error::Result;
use crate::session::Session;

pub fn export_filename(now: DateTime<Utc>) -> String {
    format!("notizen_export_{}.csv", now.timestamp_millis())
}

/// Download the report of the session's company into `dir`
pub async fn export_notes(
    backend: &dyn BackendStore,
    session: &Session,
    dir: &Path,
) -> Result<PathBuf> {
    session.require(Capability::ExportNotes)?;

    let mut stream = backend.export_notes().await?;

    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(export_filename(Utc::now()));

    let written = async {
        let mut file = tokio::fs::File::create(&path).await?;
        let mut bytes: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            bytes += chunk.len() as u64;
        }
        file.flush().await?;
        Ok::<_, crate::Error>(bytes)
    }
    .await;

    match written {
        Ok(bytes) => {
            tracing::info!(path = %path.display(), bytes, "Exported notes");
            Ok(path)
        }
        Err(e) => {
            // Never leave a truncated report behind
            if let Err(remove) = tokio::fs::remove_file(&path).await {
                tracing::debug!("Failed to remove partial export: {}", remove);
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::MemoryBackend;
    use crate::db::{CreateNoteRequest, Role};
    use crate::error::Error;
    use crate::session::{SessionContext, SessionManager};
    use chrono::TimeZone;
    use std::sync::Arc;

    async fn logged_in(role: Role) -> (Arc<MemoryBackend>, Session) {
        let context = SessionContext::in_memory();
        let backend = Arc::new(MemoryBackend::new(context.clone()));
        let company = backend.seed_company("Acme");
        backend.seed_user("jane@acme.com", "password123", &company.id, role);
        let session = SessionManager::new(backend.clone(), context)
            .login("jane@acme.com", "password123")
            .await
            .unwrap();
        (backend, session)
    }

    #[test]
    fn test_filename_uses_epoch_millis() {
        let now = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        assert_eq!(export_filename(now), "notizen_export_1700000000123.csv");
    }

    #[tokio::test]
    async fn test_export_writes_stream_to_file() {
        let (backend, session) = logged_in(Role::User).await;
        let employee = backend.seed_employee(&session.user.company_id, "EMP001", "Jane Doe");
        backend
            .create_note(&CreateNoteRequest {
                employee_id: employee.id,
                note_text: "Late arrival".to_string(),
            })
            .await
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = export_notes(backend.as_ref(), &session, dir.path())
            .await
            .unwrap();

        let file_name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(file_name.starts_with("notizen_export_"));
        assert!(file_name.ends_with(".csv"));

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("Mitarbeiternummer,Name,Notiz"));
        assert!(content.contains("Jane Doe"));
        assert!(content.contains("Late arrival"));
    }

    #[tokio::test]
    async fn test_export_requires_capability() {
        let (backend, session) = logged_in(Role::Admin).await;
        let dir = tempfile::tempdir().unwrap();

        let err = export_notes(backend.as_ref(), &session, dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
        assert_eq!(backend.calls("export_notes"), 0);
    }

    #[tokio::test]
    async fn test_failed_request_leaves_no_file() {
        let (backend, session) = logged_in(Role::User).await;
        backend.fail_next("export_notes", Error::Unauthorized("Token expired".into()));
        let dir = tempfile::tempdir().unwrap();

        let err = export_notes(backend.as_ref(), &session, dir.path())
            .await
            .unwrap_err();
        assert!(err.is_auth_failure());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
