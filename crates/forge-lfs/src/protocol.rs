//! Server side of the git-lfs-transfer protocol.
//!
//! After the capability advertisement and `version 1` handshake the
//! processor answers one command at a time until `quit` or end of input.
//! Every response starts with `status <code>`; failures carry a message
//! after a delimiter packet. I/O and framing errors end the session, all
//! other errors are reported to the client and the loop continues.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::BytesMut;
use futures_util::StreamExt;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use crate::error::{LfsError, LfsResult};
use crate::lock::{Lock, LockBackend};
use crate::pktline::{Packet, PktReader, PktWriter};
use crate::transfer::{Operation, Pointer, TransferBackend};

/// Capabilities advertised on startup.
pub const CAPABILITIES: &[&str] = &["version=1", "locking"];

/// Page size for `list-lock` when the client sends none.
pub const DEFAULT_LOCK_LIMIT: usize = 100;

/// Largest page a client may request.
pub const MAX_LOCK_LIMIT: usize = 1000;

/// Upper bound on the buffer reserved up front for `put-object`.
const MAX_UPLOAD_PREALLOC: usize = 8 * 1024 * 1024;

type Args = HashMap<String, String>;

/// Drives one transfer session over a reader/writer pair.
pub struct Processor<R, W> {
    reader: PktReader<R>,
    writer: PktWriter<W>,
    operation: Operation,
    transfer: Arc<dyn TransferBackend>,
    locks: Arc<dyn LockBackend>,
    /// Sizes announced by `batch`, consulted by `get-object`.
    sizes: HashMap<String, u64>,
}

impl<R, W> Processor<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(
        reader: R,
        writer: W,
        operation: Operation,
        transfer: Arc<dyn TransferBackend>,
        locks: Arc<dyn LockBackend>,
    ) -> Self {
        Self {
            reader: PktReader::new(reader),
            writer: PktWriter::new(writer),
            operation,
            transfer,
            locks,
            sizes: HashMap::new(),
        }
    }

    /// Runs the handshake and then processes commands until the session ends.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure, a framing error or a failed handshake.
    pub async fn run(mut self) -> LfsResult<()> {
        self.handshake().await?;
        self.process_commands().await
    }

    async fn handshake(&mut self) -> LfsResult<()> {
        self.writer.write_lines(CAPABILITIES).await?;
        self.writer.flush().await?;

        let lines = self.reader.read_until_flush().await?;
        if lines.iter().any(|line| line == "version 1") {
            self.write_status(200).await?;
            self.writer.flush().await?;
            debug!(operation = %self.operation, "lfs transfer handshake complete");
            Ok(())
        } else {
            let err = LfsError::protocol(format!("unsupported version {lines:?}"));
            self.write_error(&LfsError::parse("unsupported version")).await?;
            Err(err)
        }
    }

    /// Answers commands until `quit` or end of input.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure or a framing error.
    pub async fn process_commands(&mut self) -> LfsResult<()> {
        loop {
            let Some(packet) = self.reader.read_packet().await? else {
                debug!("lfs transfer input closed");
                return Ok(());
            };
            let line = packet.into_text()?;
            let (verb, arg) = line.split_once(' ').unwrap_or((line.as_str(), ""));
            debug!(command = verb, "lfs transfer command");

            let result = match verb {
                "batch" => self.batch().await,
                "put-object" => self.put_object(arg).await,
                "verify-object" => self.verify_object(arg).await,
                "get-object" => self.get_object(arg).await,
                "lock" => self.lock().await,
                "list-lock" => self.list_lock().await,
                "unlock" => self.unlock(arg).await,
                "quit" => {
                    self.reader.read_until_flush().await?;
                    self.write_status(200).await?;
                    self.writer.flush().await?;
                    info!("lfs transfer session finished");
                    return Ok(());
                }
                other => {
                    self.reader.read_until_flush().await?;
                    Err(LfsError::parse(format!("unknown command {other:?}")))
                }
            };

            if let Err(err) = result {
                if matches!(err, LfsError::Io(_) | LfsError::Protocol(_)) {
                    warn!(command = verb, error = %err, "lfs transfer session aborted");
                    return Err(err);
                }
                warn!(command = verb, error = %err, "lfs transfer command failed");
                self.write_error(&err).await?;
            }
        }
    }

    // -------------------------------------------------------------------------
    // Commands
    // -------------------------------------------------------------------------

    async fn batch(&mut self) -> LfsResult<()> {
        let (arg_lines, end) = self.reader.read_section().await?;
        let object_lines = match end {
            Packet::Delim => self.reader.read_until_flush().await?,
            _ => Vec::new(),
        };
        let args = parse_args(arg_lines)?;
        if let Some(algo) = args.get("hash-algo").filter(|algo| *algo != "sha256") {
            return Err(LfsError::parse(format!("unsupported hash algorithm {algo}")));
        }

        let pointers = object_lines
            .iter()
            .map(|line| parse_pointer(line))
            .collect::<LfsResult<Vec<_>>>()?;
        let items = self
            .transfer
            .batch(
                self.operation,
                &pointers,
                args.get("refname").map(String::as_str),
            )
            .await?;

        self.write_status(200).await?;
        self.writer.delim().await?;
        for item in &items {
            self.sizes.insert(item.pointer.oid.clone(), item.pointer.size);
            self.writer
                .write_text(&format!(
                    "{} {} {}",
                    item.pointer.oid,
                    item.pointer.size,
                    item.action.as_str()
                ))
                .await?;
        }
        self.writer.flush().await
    }

    async fn put_object(&mut self, oid: &str) -> LfsResult<()> {
        let (arg_lines, end) = self.reader.read_section().await?;
        if end != Packet::Delim {
            return Err(LfsError::protocol("put-object without data section"));
        }
        // A refused upload still consumes its data so the next command stays framed.
        let pointer = match self.upload_target(oid, arg_lines) {
            Ok(pointer) => pointer,
            Err(err) => {
                self.discard_data().await?;
                return Err(err);
            }
        };

        let capacity = usize::try_from(pointer.size)
            .unwrap_or(MAX_UPLOAD_PREALLOC)
            .min(MAX_UPLOAD_PREALLOC);
        let mut data = BytesMut::with_capacity(capacity);
        let mut hasher = Sha256::new();
        loop {
            match self.reader.expect_packet().await? {
                Packet::Flush => break,
                Packet::Delim => return Err(LfsError::protocol("unexpected delim packet")),
                Packet::Data(chunk) => {
                    if (data.len() + chunk.len()) as u64 > pointer.size {
                        self.discard_data().await?;
                        return Err(LfsError::CorruptData(format!(
                            "received more than {} bytes",
                            pointer.size
                        )));
                    }
                    hasher.update(&chunk);
                    data.extend_from_slice(&chunk);
                }
            }
        }

        if data.len() as u64 != pointer.size {
            return Err(LfsError::CorruptData(format!(
                "expected {} bytes, received {}",
                pointer.size,
                data.len()
            )));
        }
        let digest = hex::encode(hasher.finalize());
        if digest != pointer.oid {
            return Err(LfsError::CorruptData(format!("content hashes to {digest}")));
        }

        self.transfer.upload(&pointer, data.freeze()).await?;
        self.write_status(200).await?;
        self.writer.flush().await
    }

    fn upload_target(&self, oid: &str, arg_lines: Vec<String>) -> LfsResult<Pointer> {
        self.require(Operation::Upload)?;
        Ok(Pointer::new(check_oid(oid)?, parse_size(&parse_args(arg_lines)?)?))
    }

    /// Reads and drops data packets up to the closing flush.
    async fn discard_data(&mut self) -> LfsResult<()> {
        loop {
            match self.reader.expect_packet().await? {
                Packet::Flush => return Ok(()),
                Packet::Delim => return Err(LfsError::protocol("unexpected delim packet")),
                Packet::Data(_) => {}
            }
        }
    }

    async fn verify_object(&mut self, oid: &str) -> LfsResult<()> {
        let args = parse_args(self.reader.read_until_flush().await?)?;
        self.require(Operation::Upload)?;
        let pointer = Pointer::new(check_oid(oid)?, parse_size(&args)?);

        self.transfer.verify(&pointer).await?;
        self.write_status(200).await?;
        self.writer.flush().await
    }

    async fn get_object(&mut self, oid: &str) -> LfsResult<()> {
        self.reader.read_until_flush().await?;
        self.require(Operation::Download)?;
        let oid = check_oid(oid)?;
        let size = self.sizes.get(oid).copied().unwrap_or_default();

        let mut object = self.transfer.download(&Pointer::new(oid, size)).await?;
        self.write_status(200).await?;
        self.writer
            .write_text(&format!("size={}", object.size))
            .await?;
        self.writer.delim().await?;
        // The status line is out, so a failure from here on ends the session.
        while let Some(chunk) = object.body.next().await {
            let chunk = chunk.map_err(|e| LfsError::protocol(format!("download interrupted: {e}")))?;
            self.writer.write_data(&chunk).await?;
        }
        self.writer.flush().await
    }

    async fn lock(&mut self) -> LfsResult<()> {
        let args = parse_args(self.reader.read_until_flush().await?)?;
        self.require(Operation::Upload)?;
        let path = args
            .get("path")
            .filter(|p| !p.is_empty())
            .ok_or_else(|| LfsError::parse("missing path"))?;

        let lock = match self
            .locks
            .create(path, args.get("refname").map(String::as_str))
            .await
        {
            Ok(lock) => lock,
            Err(LfsError::Conflict { .. }) => {
                // The holder may have unlocked in between; report the conflict anyway.
                let lock = self.locks.from_path(path).await.ok().map(Box::new);
                return Err(LfsError::Conflict { lock });
            }
            Err(err) => return Err(err),
        };

        self.write_status(201).await?;
        self.writer.write_lines(&lock.as_arguments()).await?;
        self.writer.flush().await
    }

    async fn list_lock(&mut self) -> LfsResult<()> {
        let args = parse_args(self.reader.read_until_flush().await?)?;
        let owner_id = self.operation == Operation::Upload;

        let mut lines = Vec::new();
        let mut next = String::new();
        let single = if let Some(id) = args.get("id") {
            Some(self.locks.from_id(id).await)
        } else if let Some(path) = args.get("path") {
            Some(self.locks.from_path(path).await)
        } else {
            None
        };

        match single {
            Some(Ok(lock)) => lines.extend(lock.as_lock_spec(owner_id)),
            Some(Err(LfsError::NotFound)) => {}
            Some(Err(err)) => return Err(err),
            None => {
                let limit = parse_limit(args.get("limit"))?;
                let cursor = args.get("cursor").map(String::as_str).unwrap_or_default();
                let mut visit = |lock: Lock| {
                    lines.extend(lock.as_lock_spec(owner_id));
                    Ok(())
                };
                next = self.locks.range(cursor, limit, &mut visit).await?;
            }
        }

        self.write_status(200).await?;
        if !next.is_empty() {
            self.writer
                .write_text(&format!("next-cursor={next}"))
                .await?;
        }
        self.writer.delim().await?;
        self.writer.write_lines(&lines).await?;
        self.writer.flush().await
    }

    async fn unlock(&mut self, id: &str) -> LfsResult<()> {
        let args = parse_args(self.reader.read_until_flush().await?)?;
        self.require(Operation::Upload)?;
        if id.is_empty() {
            return Err(LfsError::parse("missing lock id"));
        }
        let force = args.get("force").is_some_and(|v| v == "true");

        let lock = self.locks.from_id(id).await?;
        self.locks.unlock(&lock.id, force).await?;

        self.write_status(200).await?;
        self.writer.write_lines(&lock.as_arguments()).await?;
        self.writer.flush().await
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    fn require(&self, operation: Operation) -> LfsResult<()> {
        if self.operation == operation {
            Ok(())
        } else {
            Err(LfsError::Forbidden)
        }
    }

    async fn write_status(&mut self, code: u16) -> LfsResult<()> {
        self.writer.write_text(&format!("status {code}")).await
    }

    async fn write_error(&mut self, err: &LfsError) -> LfsResult<()> {
        self.write_status(err.status_code()).await?;
        let message = match err {
            LfsError::Conflict { lock: Some(lock) } => {
                self.writer.write_lines(&lock.as_arguments()).await?;
                "lock already exists".to_string()
            }
            other => other.to_string(),
        };
        self.writer.delim().await?;
        self.writer.write_text(&message).await?;
        self.writer.flush().await
    }
}

fn parse_args(lines: Vec<String>) -> LfsResult<Args> {
    lines
        .into_iter()
        .map(|line| match line.split_once('=') {
            Some((key, value)) => Ok((key.to_string(), value.to_string())),
            None => Err(LfsError::parse(format!("malformed argument {line:?}"))),
        })
        .collect()
}

fn parse_size(args: &Args) -> LfsResult<u64> {
    args.get("size")
        .ok_or_else(|| LfsError::parse("missing size"))?
        .parse()
        .map_err(|_| LfsError::parse("invalid size"))
}

fn parse_limit(value: Option<&String>) -> LfsResult<usize> {
    let Some(value) = value else {
        return Ok(DEFAULT_LOCK_LIMIT);
    };
    let limit: usize = value
        .parse()
        .map_err(|_| LfsError::parse(format!("invalid limit {value:?}")))?;
    Ok(match limit {
        0 => DEFAULT_LOCK_LIMIT,
        n => n.min(MAX_LOCK_LIMIT),
    })
}

fn check_oid(oid: &str) -> LfsResult<&str> {
    let valid = oid.len() == 64
        && oid
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
    if valid {
        Ok(oid)
    } else {
        Err(LfsError::parse(format!("invalid object id {oid:?}")))
    }
}

fn parse_pointer(line: &str) -> LfsResult<Pointer> {
    let mut parts = line.split(' ');
    let (Some(oid), Some(size)) = (parts.next(), parts.next()) else {
        return Err(LfsError::parse(format!("malformed object line {line:?}")));
    };
    let size = size
        .parse()
        .map_err(|_| LfsError::parse(format!("invalid size in {line:?}")))?;
    Ok(Pointer::new(check_oid(oid)?, size))
}
