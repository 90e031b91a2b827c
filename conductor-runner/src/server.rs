//! Local status listener.
//!
//! Bound before any worker starts and owned by the `run` scope: `shutdown`
//! stops the accept loop and removes the socket, and dropping the handle
//! without calling it (an error path) still signals the loop and removes the
//! socket file.

use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::{io_err, RunnerError};
use crate::protocol::{reply_for, REQUEST_BUFFER};
use crate::store::StatusStore;

/// Handle to the running accept loop.
#[derive(Debug)]
pub struct StatusServer {
    socket: PathBuf,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl StatusServer {
    /// Bind `socket` and start accepting. Must be called inside a Tokio runtime.
    pub fn bind(socket: &Path, store: StatusStore) -> Result<Self, RunnerError> {
        if let Some(parent) = socket.parent() {
            fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        prepare_socket_for_bind(socket)?;

        let listener = UnixListener::bind(socket).map_err(|e| io_err(socket, e))?;
        set_socket_permissions(socket)?;
        tracing::info!(socket = %socket.display(), "status server listening");

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(accept_loop(listener, store, shutdown_rx));

        Ok(Self {
            socket: socket.to_path_buf(),
            shutdown: Some(shutdown_tx),
            task: Some(task),
        })
    }

    /// Stop accepting, wait for the loop to exit and remove the socket.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                tracing::warn!(error = %err, "status server task ended abnormally");
            }
        }
        remove_socket(&self.socket);
    }
}

impl Drop for StatusServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        remove_socket(&self.socket);
    }
}

async fn accept_loop(
    listener: UnixListener,
    store: StatusStore,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut shutdown_rx => break,
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _)) => {
                        let store = store.clone();
                        tokio::spawn(async move {
                            if let Err(err) = handle_connection(stream, store).await {
                                tracing::warn!(error = %err, "status connection failed");
                            }
                        });
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "status accept failed");
                        // Back off so a persistent error (fd exhaustion) does not spin.
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                }
            }
        }
    }
    tracing::debug!("status server stopped");
}

async fn handle_connection(mut stream: UnixStream, store: StatusStore) -> Result<(), RunnerError> {
    let mut buf = [0u8; REQUEST_BUFFER];
    let read = stream
        .read(&mut buf)
        .await
        .map_err(|e| io_err("status socket read", e))?;
    if read == 0 {
        tracing::debug!("status client closed without a request");
        return Ok(());
    }

    let request = String::from_utf8_lossy(&buf[..read]);
    let request = request.trim();
    let reply = reply_for(request, || store.snapshot())?;
    if request != crate::protocol::STATUS_COMMAND {
        tracing::warn!(request, "unsupported status request");
    }

    stream
        .write_all(&reply)
        .await
        .map_err(|e| io_err("status socket write", e))?;
    stream
        .shutdown()
        .await
        .map_err(|e| io_err("status socket shutdown", e))?;
    Ok(())
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), RunnerError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(RunnerError::EndpointInUse {
                socket: socket.to_path_buf(),
            });
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale status socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn remove_socket(socket: &Path) {
    match fs::remove_file(socket) {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => tracing::warn!(
            socket = %socket.display(),
            error = %err,
            "failed to remove status socket",
        ),
    }
}

fn set_socket_permissions(path: &Path) -> Result<(), RunnerError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::sync::Arc;

    use tempfile::TempDir;
    use tokio::sync::Semaphore;

    use crate::pool::{run_all, DirectoryJob};
    use crate::protocol::{request_status_at, send_request, STATUS_COMMAND};
    use crate::worker::testing::*;

    async fn query(socket: PathBuf) -> Result<crate::protocol::StatusDocument, RunnerError> {
        tokio::task::spawn_blocking(move || request_status_at(&socket))
            .await
            .expect("client task")
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn status_query_sees_both_directories_mid_processing() {
        let dir = TempDir::new().expect("tempdir");
        let socket = dir.path().join("conductor.sock");
        let store = StatusStore::new();
        let server = StatusServer::bind(&socket, store.clone()).expect("bind");

        let gate = Arc::new(Semaphore::new(0));
        let recorder = Arc::new(Recorder::gated(store.clone(), gate.clone()));
        let started = recorder.started.clone();
        let jobs = vec![
            DirectoryJob {
                name: "invoices".into(),
                source: Arc::new(FakeSource::new(vec![item("inv/1", 1), item("inv/2", 2)])),
                processor: recorder.clone(),
                mark_processed: false,
            },
            DirectoryJob {
                name: "scans".into(),
                source: Arc::new(FakeSource::new(vec![item("scan/1", 5)])),
                processor: recorder.clone(),
                mark_processed: false,
            },
        ];
        let pool = tokio::spawn({
            let store = store.clone();
            async move { run_all(jobs, &store).await }
        });

        started.acquire_many(2).await.expect("both started").forget();
        let doc = query(socket.clone()).await.expect("status");
        assert_eq!(doc.keys().collect::<Vec<_>>(), vec!["invoices", "scans"]);
        assert_eq!(doc["invoices"].actual, "inv/1");
        assert_eq!(doc["invoices"].pendientes, vec!["inv/2"]);
        assert_eq!(doc["scans"].actual, "scan/1");
        assert!(doc["scans"].pendientes.is_empty());

        gate.add_permits(3);
        pool.await.expect("pool");

        let doc = query(socket.clone()).await.expect("status after run");
        assert!(doc.is_empty(), "finished directories must disappear: {doc:?}");

        server.shutdown().await;
        assert!(!socket.exists(), "shutdown must remove the socket");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn unknown_command_gets_error_and_server_keeps_serving() {
        let dir = TempDir::new().expect("tempdir");
        let socket = dir.path().join("conductor.sock");
        let server = StatusServer::bind(&socket, StatusStore::new()).expect("bind");

        let bad = {
            let socket = socket.clone();
            tokio::task::spawn_blocking(move || send_request(&socket, "STATUS please"))
                .await
                .expect("client task")
                .expect("reply")
        };
        let text = String::from_utf8(bad).expect("utf8");
        assert!(text.contains("unknown command"), "reply: {text}");

        // A client that connects and hangs up without a request.
        {
            let socket = socket.clone();
            tokio::task::spawn_blocking(move || {
                let stream = StdUnixStream::connect(&socket).expect("connect");
                drop(stream);
            })
            .await
            .expect("client task");
        }

        let doc = query(socket.clone()).await.expect("status still served");
        assert!(doc.is_empty());
        server.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn trailing_newline_is_accepted() {
        let dir = TempDir::new().expect("tempdir");
        let socket = dir.path().join("conductor.sock");
        let server = StatusServer::bind(&socket, StatusStore::new()).expect("bind");

        let reply = {
            let socket = socket.clone();
            tokio::task::spawn_blocking(move || {
                let mut stream = StdUnixStream::connect(&socket).expect("connect");
                stream
                    .write_all(format!("{STATUS_COMMAND}\n").as_bytes())
                    .expect("write");
                stream.shutdown(std::net::Shutdown::Write).expect("shutdown");
                let mut reply = String::new();
                stream.read_to_string(&mut reply).expect("read");
                reply
            })
            .await
            .expect("client task")
        };
        assert_eq!(reply, "{}");
        server.shutdown().await;
    }

    #[tokio::test]
    async fn stale_socket_file_is_replaced_and_live_one_refused() {
        let dir = TempDir::new().expect("tempdir");
        let socket = dir.path().join("conductor.sock");
        fs::write(&socket, b"").expect("stale file");

        let server = StatusServer::bind(&socket, StatusStore::new()).expect("bind over stale");
        let err = StatusServer::bind(&socket, StatusStore::new()).unwrap_err();
        assert!(matches!(err, RunnerError::EndpointInUse { .. }), "got: {err}");

        server.shutdown().await;
        assert!(!socket.exists());
    }

    #[tokio::test]
    async fn dropping_the_handle_removes_the_socket() {
        let dir = TempDir::new().expect("tempdir");
        let socket = dir.path().join("conductor.sock");
        let server = StatusServer::bind(&socket, StatusStore::new()).expect("bind");
        assert!(socket.exists());
        drop(server);
        assert!(!socket.exists());
    }
}
