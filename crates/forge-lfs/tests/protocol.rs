//! End-to-end protocol sessions over an in-memory duplex stream.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use forge_lfs::lock::LockVisitor;
use forge_lfs::{
    Action, BatchItem, CURRENT_USER, LfsError, LfsResult, Lock, LockBackend, ObjectStream,
    Operation, Packet, PktReader, PktWriter, Pointer, Processor, TransferBackend,
};
use time::macros::datetime;
use tokio::io::{DuplexStream, ReadHalf, WriteHalf};
use tokio::task::JoinHandle;

const HELLO_OID: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

// =============================================================================
// Fakes
// =============================================================================

#[derive(Default)]
struct MemoryObjects {
    objects: Mutex<HashMap<String, Bytes>>,
}

#[async_trait]
impl TransferBackend for MemoryObjects {
    async fn batch(
        &self,
        operation: Operation,
        pointers: &[Pointer],
        _refname: Option<&str>,
    ) -> LfsResult<Vec<BatchItem>> {
        let objects = self.objects.lock().unwrap();
        Ok(pointers
            .iter()
            .map(|p| {
                let present = objects.contains_key(&p.oid);
                let action = match (operation, present) {
                    (Operation::Upload, false) => Action::Upload,
                    (Operation::Download, true) => Action::Download,
                    _ => Action::Noop,
                };
                BatchItem {
                    pointer: p.clone(),
                    action,
                }
            })
            .collect())
    }

    async fn download(&self, pointer: &Pointer) -> LfsResult<ObjectStream> {
        let data = self
            .objects
            .lock()
            .unwrap()
            .get(&pointer.oid)
            .cloned()
            .ok_or(LfsError::NotFound)?;
        Ok(ObjectStream {
            size: data.len() as u64,
            body: Box::pin(futures_util::stream::iter(vec![Ok::<_, LfsError>(data)])),
        })
    }

    async fn upload(&self, pointer: &Pointer, data: Bytes) -> LfsResult<()> {
        self.objects
            .lock()
            .unwrap()
            .insert(pointer.oid.clone(), data);
        Ok(())
    }

    async fn verify(&self, pointer: &Pointer) -> LfsResult<()> {
        match self.objects.lock().unwrap().get(&pointer.oid) {
            Some(data) if data.len() as u64 == pointer.size => Ok(()),
            _ => Err(LfsError::NotFound),
        }
    }
}

#[derive(Default)]
struct MemoryLocks {
    locks: Mutex<BTreeMap<String, Lock>>,
}

impl MemoryLocks {
    fn insert(&self, id: &str, path: &str, owner: &str) {
        self.locks.lock().unwrap().insert(
            id.to_string(),
            Lock {
                id: id.to_string(),
                path: path.to_string(),
                locked_at: datetime!(2026-05-04 10:00:00 UTC),
                owner: owner.to_string(),
            },
        );
    }
}

#[async_trait]
impl LockBackend for MemoryLocks {
    async fn create(&self, path: &str, _refname: Option<&str>) -> LfsResult<Lock> {
        let mut locks = self.locks.lock().unwrap();
        if locks.values().any(|l| l.path == path) {
            return Err(LfsError::Conflict { lock: None });
        }
        let lock = Lock {
            id: (locks.len() + 1).to_string(),
            path: path.to_string(),
            locked_at: datetime!(2026-05-04 10:00:00 UTC),
            owner: CURRENT_USER.to_string(),
        };
        locks.insert(lock.id.clone(), lock.clone());
        Ok(lock)
    }

    async fn unlock(&self, id: &str, _force: bool) -> LfsResult<()> {
        self.locks
            .lock()
            .unwrap()
            .remove(id)
            .map(|_| ())
            .ok_or(LfsError::NotFound)
    }

    async fn from_path(&self, path: &str) -> LfsResult<Lock> {
        self.locks
            .lock()
            .unwrap()
            .values()
            .find(|l| l.path == path)
            .cloned()
            .ok_or(LfsError::NotFound)
    }

    async fn from_id(&self, id: &str) -> LfsResult<Lock> {
        self.locks
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or(LfsError::NotFound)
    }

    async fn range(
        &self,
        cursor: &str,
        limit: usize,
        visit: &mut LockVisitor<'_>,
    ) -> LfsResult<String> {
        let all: Vec<Lock> = self.locks.lock().unwrap().values().cloned().collect();
        let start: usize = if cursor.is_empty() { 0 } else { cursor.parse().unwrap() };
        let end = (start + limit).min(all.len());
        for lock in &all[start..end] {
            visit(lock.clone())?;
        }
        Ok(if end < all.len() { end.to_string() } else { String::new() })
    }
}

/// Lock backend whose holder vanishes between the conflict and the lookup.
struct RacingLocks;

#[async_trait]
impl LockBackend for RacingLocks {
    async fn create(&self, _path: &str, _refname: Option<&str>) -> LfsResult<Lock> {
        Err(LfsError::Conflict { lock: None })
    }

    async fn unlock(&self, _id: &str, _force: bool) -> LfsResult<()> {
        Err(LfsError::NotFound)
    }

    async fn from_path(&self, _path: &str) -> LfsResult<Lock> {
        Err(LfsError::NotFound)
    }

    async fn from_id(&self, _id: &str) -> LfsResult<Lock> {
        Err(LfsError::NotFound)
    }

    async fn range(
        &self,
        _cursor: &str,
        _limit: usize,
        _visit: &mut LockVisitor<'_>,
    ) -> LfsResult<String> {
        Ok(String::new())
    }
}

// =============================================================================
// Client Harness
// =============================================================================

struct Client {
    reader: PktReader<ReadHalf<DuplexStream>>,
    writer: PktWriter<WriteHalf<DuplexStream>>,
    server: JoinHandle<LfsResult<()>>,
}

impl Client {
    async fn start(
        operation: Operation,
        objects: Arc<MemoryObjects>,
        locks: Arc<MemoryLocks>,
    ) -> Self {
        Self::with_locks(operation, objects, locks).await
    }

    async fn with_locks(
        operation: Operation,
        objects: Arc<MemoryObjects>,
        locks: Arc<dyn LockBackend>,
    ) -> Self {
        let (client_io, server_io) = tokio::io::duplex(256 * 1024);
        let (server_read, server_write) = tokio::io::split(server_io);
        let server = tokio::spawn(
            Processor::new(server_read, server_write, operation, objects, locks).run(),
        );
        let (client_read, client_write) = tokio::io::split(client_io);
        let mut client = Self {
            reader: PktReader::new(client_read),
            writer: PktWriter::new(client_write),
            server,
        };

        assert_eq!(client.recv().await, vec!["version=1", "locking"]);
        client.send(&["version 1"]).await;
        assert_eq!(client.recv().await, vec!["status 200"]);
        client
    }

    async fn send(&mut self, lines: &[&str]) {
        self.writer.write_lines(lines).await.unwrap();
        self.writer.flush().await.unwrap();
    }

    /// Reads one response, rendering delimiters as `<delim>`.
    async fn recv(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        loop {
            match self.reader.expect_packet().await.unwrap() {
                Packet::Flush => return out,
                Packet::Delim => out.push("<delim>".to_string()),
                data => out.push(data.into_text().unwrap()),
            }
        }
    }

    async fn quit(mut self) {
        self.send(&["quit"]).await;
        assert_eq!(self.recv().await, vec!["status 200"]);
        self.server.await.unwrap().unwrap();
    }
}

// =============================================================================
// Sessions
// =============================================================================

#[tokio::test]
async fn test_upload_session() {
    let objects = Arc::new(MemoryObjects::default());
    let mut client = Client::start(Operation::Upload, objects.clone(), Arc::default()).await;

    let object_line = format!("{HELLO_OID} 5");
    client.writer.write_lines(&["batch", "transfer=basic", "hash-algo=sha256"]).await.unwrap();
    client.writer.delim().await.unwrap();
    client.send(&[object_line.as_str()]).await;
    assert_eq!(
        client.recv().await,
        vec!["status 200".to_string(), "<delim>".into(), format!("{HELLO_OID} 5 upload")]
    );

    let put = format!("put-object {HELLO_OID}");
    client.writer.write_lines(&[put.as_str(), "size=5"]).await.unwrap();
    client.writer.delim().await.unwrap();
    client.writer.write_data(b"hello").await.unwrap();
    client.writer.flush().await.unwrap();
    assert_eq!(client.recv().await, vec!["status 200"]);
    assert_eq!(objects.objects.lock().unwrap()[HELLO_OID], Bytes::from_static(b"hello"));

    let verify = format!("verify-object {HELLO_OID}");
    client.send(&[verify.as_str(), "size=5"]).await;
    assert_eq!(client.recv().await, vec!["status 200"]);

    client.quit().await;
}

#[tokio::test]
async fn test_put_object_rejects_corrupt_data() {
    let objects = Arc::new(MemoryObjects::default());
    let mut client = Client::start(Operation::Upload, objects.clone(), Arc::default()).await;

    let put = format!("put-object {HELLO_OID}");
    client.writer.write_lines(&[put.as_str(), "size=5"]).await.unwrap();
    client.writer.delim().await.unwrap();
    client.writer.write_data(b"jello").await.unwrap();
    client.writer.flush().await.unwrap();

    let response = client.recv().await;
    assert_eq!(response[0], "status 400");
    assert_eq!(response[1], "<delim>");
    assert!(response[2].starts_with("corrupt data"));
    assert!(objects.objects.lock().unwrap().is_empty());

    // The session survives a failed command.
    client.quit().await;
}

#[tokio::test]
async fn test_put_object_rejects_data_beyond_announced_size() {
    let objects = Arc::new(MemoryObjects::default());
    let mut client = Client::start(Operation::Upload, objects.clone(), Arc::default()).await;

    let put = format!("put-object {HELLO_OID}");
    client.writer.write_lines(&[put.as_str(), "size=5"]).await.unwrap();
    client.writer.delim().await.unwrap();
    client.writer.write_data(b"hello").await.unwrap();
    client.writer.write_data(b" world").await.unwrap();
    client.writer.flush().await.unwrap();

    let response = client.recv().await;
    assert_eq!(response[..2], ["status 400", "<delim>"]);
    assert_eq!(response[2], "corrupt data: received more than 5 bytes");
    assert!(objects.objects.lock().unwrap().is_empty());

    // The rest of the data section was consumed, so the next command parses.
    client.send(&["list-lock"]).await;
    assert_eq!(client.recv().await, vec!["status 200", "<delim>"]);

    client.quit().await;
}

#[tokio::test]
async fn test_put_object_refused_in_download_mode_stores_nothing() {
    let objects = Arc::new(MemoryObjects::default());
    let mut client = Client::start(Operation::Download, objects.clone(), Arc::default()).await;

    // Several packets' worth of data under a size that is never parsed.
    let payload = vec![b'x'; 3 * 65516];
    let put = format!("put-object {HELLO_OID}");
    client.writer.write_lines(&[put.as_str(), "size=bogus"]).await.unwrap();
    client.writer.delim().await.unwrap();
    client.writer.write_data(&payload).await.unwrap();
    client.writer.flush().await.unwrap();
    assert_eq!(client.recv().await, vec!["status 403", "<delim>", "forbidden"]);
    assert!(objects.objects.lock().unwrap().is_empty());

    client.send(&["list-lock"]).await;
    assert_eq!(client.recv().await, vec!["status 200", "<delim>"]);

    client.quit().await;
}

#[tokio::test]
async fn test_download_session() {
    let objects = Arc::new(MemoryObjects::default());
    objects
        .objects
        .lock()
        .unwrap()
        .insert(HELLO_OID.to_string(), Bytes::from_static(b"hello"));
    let mut client = Client::start(Operation::Download, objects, Arc::default()).await;

    let object_line = format!("{HELLO_OID} 5");
    client.writer.write_text("batch").await.unwrap();
    client.writer.delim().await.unwrap();
    client.send(&[object_line.as_str()]).await;
    assert_eq!(client.recv().await[2], format!("{HELLO_OID} 5 download"));

    let get = format!("get-object {HELLO_OID}");
    client.send(&[get.as_str()]).await;
    assert_eq!(
        client.recv().await,
        vec!["status 200", "size=5", "<delim>", "hello"]
    );

    // Upload commands are refused in a download session.
    let put = format!("put-object {HELLO_OID}");
    client.writer.write_lines(&[put.as_str(), "size=5"]).await.unwrap();
    client.writer.delim().await.unwrap();
    client.writer.write_data(b"hello").await.unwrap();
    client.writer.flush().await.unwrap();
    assert_eq!(client.recv().await[..2], ["status 403", "<delim>"]);

    client.quit().await;
}

#[tokio::test]
async fn test_lock_commands() {
    let locks = Arc::new(MemoryLocks::default());
    locks.insert("1", "docs/plan.pdf", "noah");
    let mut client = Client::start(Operation::Upload, Arc::default(), locks.clone()).await;

    client.send(&["lock", "path=assets/logo.psd"]).await;
    assert_eq!(
        client.recv().await,
        vec![
            "status 201",
            "id=2",
            "path=assets/logo.psd",
            "locked-at=2026-05-04T10:00:00Z",
            "ownername=(self)",
        ]
    );

    client.send(&["lock", "path=docs/plan.pdf"]).await;
    assert_eq!(
        client.recv().await,
        vec![
            "status 409",
            "id=1",
            "path=docs/plan.pdf",
            "locked-at=2026-05-04T10:00:00Z",
            "ownername=noah",
            "<delim>",
            "lock already exists",
        ]
    );

    client.send(&["list-lock", "limit=1"]).await;
    assert_eq!(
        client.recv().await,
        vec![
            "status 200",
            "next-cursor=1",
            "<delim>",
            "lock 1",
            "path 1 docs/plan.pdf",
            "locked-at 1 2026-05-04T10:00:00Z",
            "ownername 1 noah",
            "owner 1 theirs",
        ]
    );

    client.send(&["list-lock", "cursor=1", "limit=1"]).await;
    let page = client.recv().await;
    assert_eq!(page[1], "<delim>");
    assert_eq!(page.last().unwrap(), "owner 2 ours");

    client.send(&["unlock 2"]).await;
    assert_eq!(client.recv().await[0], "status 200");
    assert!(locks.from_id("2").await.is_err());

    client.send(&["unlock 2"]).await;
    assert_eq!(client.recv().await[0], "status 404");

    client.quit().await;
}

#[tokio::test]
async fn test_download_lock_listing_omits_owner() {
    let locks = Arc::new(MemoryLocks::default());
    locks.insert("1", "docs/plan.pdf", "noah");
    let mut client = Client::start(Operation::Download, Arc::default(), locks).await;

    client.send(&["list-lock", "path=docs/plan.pdf"]).await;
    let response = client.recv().await;
    assert_eq!(response.len(), 6);
    assert_eq!(response.last().unwrap(), "ownername 1 noah");

    client.send(&["list-lock", "path=nowhere"]).await;
    assert_eq!(client.recv().await, vec!["status 200", "<delim>"]);

    client.quit().await;
}

#[tokio::test]
async fn test_unknown_command_reports_error() {
    let mut client = Client::start(Operation::Upload, Arc::default(), Arc::default()).await;

    client.send(&["teleport"]).await;
    let response = client.recv().await;
    assert_eq!(response[0], "status 400");

    client.quit().await;
}

#[tokio::test]
async fn test_lock_conflict_after_holder_unlocked() {
    let mut client =
        Client::with_locks(Operation::Upload, Arc::default(), Arc::new(RacingLocks)).await;

    client.send(&["lock", "path=docs/plan.pdf"]).await;
    assert_eq!(client.recv().await, vec!["status 409", "<delim>", "conflict"]);

    client.quit().await;
}
