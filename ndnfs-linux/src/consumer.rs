//! File consumer over one pipeline: stat and segmented reads.

use std::collections::HashSet;
use std::time::Duration;

use ndnfs_core::segment::{place, segment_offsets};
use ndnfs_core::{
    decode_nni, Config, ConfigError, FetchError, Interest, Name, Namespace, NniError,
};
use tracing::debug;

use crate::face::Face;
use crate::pipeline::{Pipeline, PipelineHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileInfo {
    pub size: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum ConsumerError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("segment {0} has no byte offset component")]
    MissingByteOffset(Name),
    #[error("malformed file info for {name}: {source}")]
    MalformedFileInfo {
        name: Name,
        #[source]
        source: NniError,
    },
}

/// Requests issued by one call and not yet resolved. Whatever is left when
/// the call returns (early error, cancelled future) is abandoned so its
/// window slots come back.
struct Pending {
    names: HashSet<Name>,
    handle: PipelineHandle,
}

impl Pending {
    fn new(handle: PipelineHandle) -> Self {
        Self {
            names: HashSet::new(),
            handle,
        }
    }
}

impl Drop for Pending {
    fn drop(&mut self) {
        if self.names.is_empty() {
            return;
        }
        debug!(count = self.names.len(), "abandoning unresolved requests");
        self.handle.abandon(self.names.drain().collect());
    }
}

pub struct Consumer {
    pipeline: Pipeline,
    namespace: Namespace,
    segment_size: u64,
    lifetime: Duration,
}

impl Consumer {
    pub fn new(face: Face, config: &Config) -> Result<Self, ConsumerError> {
        let pipeline = Pipeline::new(face, config)?;
        Ok(Self {
            pipeline,
            namespace: Namespace::new(&config.prefix),
            segment_size: config.segment_size,
            lifetime: config.interest_lifetime,
        })
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Size of the remote file. The answer is never taken from a cache.
    pub async fn stat(&mut self, path: &str) -> Result<FileInfo, ConsumerError> {
        let name = self.namespace.fileinfo(path);
        let interest = Interest::new(name.clone(), self.lifetime).with_must_be_fresh(true);

        let mut pending = Pending::new(self.pipeline.handle());
        self.pipeline.submit(interest).await?;
        pending.names.insert(name.clone());

        loop {
            match self.pipeline.next_outcome().await {
                None => return Err(FetchError::Closed.into()),
                Some(Ok(data)) if data.name == name => {
                    pending.names.remove(&name);
                    let size = decode_nni(&data.content)
                        .map_err(|source| ConsumerError::MalformedFileInfo { name, source })?;
                    return Ok(FileInfo { size });
                }
                Some(Err(err)) if err.request() == Some(&name) => {
                    pending.names.remove(&name);
                    return Err(err.into());
                }
                Some(other) => debug!(?other, "discarding outcome not issued by stat"),
            }
        }
    }

    /// Fill `buf` with the file bytes starting at `offset`. Returns the
    /// number of bytes copied, short when the file ends inside the window.
    ///
    /// Every segment overlapping the window is requested; submission is
    /// interleaved with draining so the window paces large reads. Responses
    /// are consumed in arrival order. The first failure of a segment of this
    /// read ends it; bytes past those already copied are then unspecified.
    pub async fn read_at(
        &mut self,
        buf: &mut [u8],
        offset: u64,
        path: &str,
    ) -> Result<usize, ConsumerError> {
        let names: Vec<Name> = segment_offsets(offset, buf.len() as u64, self.segment_size)
            .into_iter()
            .map(|off| self.namespace.read(path, off))
            .collect();
        let mut remaining = names.len();
        if remaining == 0 {
            return Ok(0);
        }

        let handle = self.pipeline.handle();
        let mut pending = Pending::new(handle.clone());
        let mut queue = names.into_iter();
        let mut next = queue.next();
        let mut copied = 0usize;

        while remaining > 0 {
            tokio::select! {
                biased;
                outcome = self.pipeline.next_outcome() => match outcome {
                    None => return Err(FetchError::Closed.into()),
                    Some(Ok(data)) => {
                        if !pending.names.remove(&data.name) {
                            debug!(name = %data.name, "discarding response not issued by this read");
                            continue;
                        }
                        remaining -= 1;
                        if data.content.is_empty() {
                            // past the end of the file
                            continue;
                        }
                        let segment_offset = self
                            .namespace
                            .byte_offset(&data.name)
                            .ok_or_else(|| ConsumerError::MissingByteOffset(data.name.clone()))?;
                        copied += place(buf, offset, segment_offset, &data.content);
                    }
                    Some(Err(err)) => {
                        match err.request() {
                            Some(name) if pending.names.remove(name) => return Err(err.into()),
                            _ => debug!(error = %err, "discarding failure not issued by this read"),
                        }
                    }
                },
                permit = handle.submitter().reserve(), if next.is_some() => {
                    let permit = permit.map_err(|_| FetchError::Closed)?;
                    if let Some(name) = next.take() {
                        pending.names.insert(name.clone());
                        permit.send(Interest::new(name, self.lifetime));
                        next = queue.next();
                    }
                }
            }
        }
        Ok(copied)
    }

    pub async fn close(self) {
        self.pipeline.close().await;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use ndnfs_core::{encode_nni, Data, Nack, NackReason, Packet, MAX_PAYLOAD_SIZE};
    use tokio::task::JoinHandle;

    use super::*;

    const S: usize = MAX_PAYLOAD_SIZE as usize;
    const PATH: &str = "/store/f.root";

    fn file(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    /// Answers every Interest with `reply`; yields the names it saw once
    /// the consumer side of the face is gone.
    fn serve<F>(mut remote: Face, mut reply: F) -> JoinHandle<Vec<Name>>
    where
        F: FnMut(&Interest) -> Option<Packet> + Send + 'static,
    {
        tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Some(packet) = remote.rx.recv().await {
                if let Packet::Interest(i) = packet {
                    seen.push(i.name.clone());
                    if let Some(p) = reply(&i) {
                        if remote.tx.send(p).await.is_err() {
                            break;
                        }
                    }
                }
            }
            seen
        })
    }

    fn segment(content: &[u8], name: &Name) -> Packet {
        let off = Namespace::default()
            .byte_offset(name)
            .expect("read name") as usize;
        let body = if off >= content.len() {
            Vec::new()
        } else {
            content[off..(off + S).min(content.len())].to_vec()
        };
        Packet::Data(Data::new(name.clone(), body))
    }

    fn file_server(content: Vec<u8>) -> impl FnMut(&Interest) -> Option<Packet> + Send + 'static {
        move |i: &Interest| {
            let ns = Namespace::default();
            if ns.verb(&i.name) == Some(b"fileinfo".as_slice()) {
                Some(Packet::Data(Data::new(
                    i.name.clone(),
                    encode_nni(content.len() as u64),
                )))
            } else {
                Some(segment(&content, &i.name))
            }
        }
    }

    fn consumer(config: Config) -> (Consumer, Face) {
        let (local, remote) = Face::pair(256);
        (Consumer::new(local, &config).unwrap(), remote)
    }

    fn offsets(names: &[Name]) -> Vec<u64> {
        let ns = Namespace::default();
        let mut out: Vec<u64> = names.iter().filter_map(|n| ns.byte_offset(n)).collect();
        out.sort_unstable();
        out
    }

    #[tokio::test(start_paused = true)]
    async fn stat_decodes_four_byte_size() {
        let (mut c, remote) = consumer(Config::default());
        let server = serve(remote, |i| {
            // stat must bypass caches
            if !i.must_be_fresh {
                return None;
            }
            Some(Packet::Data(Data::new(i.name.clone(), vec![0, 0, 4, 0])))
        });
        assert_eq!(c.stat(PATH).await.unwrap(), FileInfo { size: 1024 });
        c.close().await;
        let seen = server.await.unwrap();
        assert_eq!(seen, vec![Namespace::default().fileinfo(PATH)]);
    }

    #[tokio::test(start_paused = true)]
    async fn stat_failure_propagates() {
        let (mut c, remote) = consumer(Config::default());
        serve(remote, |i| Some(Packet::Data(Data::app_nack(i.name.clone(), 2))));
        match c.stat(PATH).await {
            Err(ConsumerError::Fetch(FetchError::Application { code, .. })) => assert_eq!(code, 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stat_rejects_malformed_size() {
        let (mut c, remote) = consumer(Config::default());
        serve(remote, |i| Some(Packet::Data(Data::new(i.name.clone(), vec![1, 2, 3]))));
        assert!(matches!(
            c.stat(PATH).await,
            Err(ConsumerError::MalformedFileInfo {
                source: NniError::InvalidLength(3),
                ..
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn stat_no_route_propagates() {
        let (mut c, remote) = consumer(Config::default());
        serve(remote, |i| {
            Some(Packet::Nack(Nack::new(i.clone(), NackReason::NoRoute)))
        });
        assert!(matches!(
            c.stat(PATH).await,
            Err(ConsumerError::Fetch(FetchError::Nack {
                reason: NackReason::NoRoute,
                ..
            }))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn unaligned_read_reassembles_window() {
        let content = file(20_000);
        let (mut c, remote) = consumer(Config::default());
        let server = serve(remote, file_server(content.clone()));

        let mut buf = vec![0u8; 10_000];
        let n = c.read_at(&mut buf, 3000, PATH).await.unwrap();
        assert_eq!(n, 10_000);
        assert_eq!(&buf[..], &content[3000..13_000]);

        c.close().await;
        let seen = server.await.unwrap();
        assert_eq!(offsets(&seen), vec![0, 6144, 12288]);
    }

    #[tokio::test(start_paused = true)]
    async fn read_is_short_at_end_of_file() {
        let content = file(8000);
        let (mut c, remote) = consumer(Config::default());
        serve(remote, file_server(content.clone()));

        let mut buf = vec![0u8; 4096];
        let n = c.read_at(&mut buf, 6000, PATH).await.unwrap();
        assert_eq!(n, 2000);
        assert_eq!(&buf[..n], &content[6000..]);
    }

    #[tokio::test(start_paused = true)]
    async fn read_past_end_of_file_is_empty() {
        let (mut c, remote) = consumer(Config::default());
        serve(remote, file_server(file(8000)));

        let mut buf = vec![0u8; 100];
        assert_eq!(c.read_at(&mut buf, 12_288, PATH).await.unwrap(), 0);
        let mut empty: [u8; 0] = [];
        assert_eq!(c.read_at(&mut empty, 0, PATH).await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_reads_share_segment_names() {
        let (mut c, remote) = consumer(Config::default());
        let server = serve(remote, file_server(file(30_000)));

        let mut a = vec![0u8; 10_000];
        c.read_at(&mut a, 3000, PATH).await.unwrap();
        let mut b = vec![0u8; 6144];
        c.read_at(&mut b, 6144, PATH).await.unwrap();
        assert_eq!(&a[3144..], &b[..6856]);

        c.close().await;
        let seen = server.await.unwrap();
        let seg = Namespace::default().read(PATH, 6144);
        assert_eq!(seen.iter().filter(|n| **n == seg).count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn congested_segment_is_retried_within_read() {
        let content = file(3 * S);
        let (mut c, remote) = consumer(Config::default());
        let mut nacks: HashMap<Name, u32> = HashMap::new();
        let server = serve(remote, move |i| {
            if Namespace::default().byte_offset(&i.name) == Some(6144) {
                let n = nacks.entry(i.name.clone()).or_default();
                if *n < 2 {
                    *n += 1;
                    return Some(Packet::Nack(Nack::new(i.clone(), NackReason::Congestion)));
                }
            }
            Some(segment(&content, &i.name))
        });

        let mut buf = vec![0u8; 3 * S];
        assert_eq!(c.read_at(&mut buf, 0, PATH).await.unwrap(), 3 * S);
        assert_eq!(buf, file(3 * S));

        c.close().await;
        let seen = server.await.unwrap();
        let seg = Namespace::default().read(PATH, 6144);
        assert_eq!(seen.iter().filter(|n| **n == seg).count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_read_releases_window() {
        let content = file(4 * S);
        let config = Config {
            window: 2,
            ..Config::default()
        };
        let (mut c, remote) = consumer(config);
        let bad = Namespace::default().read(PATH, 6144);
        let server_content = content.clone();
        serve(remote, move |i| {
            if i.name == bad {
                Some(Packet::Data(Data::app_nack(i.name.clone(), 5)))
            } else {
                Some(segment(&server_content, &i.name))
            }
        });

        let mut buf = vec![0u8; 4 * S];
        assert!(matches!(
            c.read_at(&mut buf, 0, PATH).await,
            Err(ConsumerError::Fetch(FetchError::Application { code: 5, .. }))
        ));

        let mut tail = vec![0u8; S];
        assert_eq!(c.read_at(&mut tail, 3 * S as u64, PATH).await.unwrap(), S);
        assert_eq!(&tail[..], &content[3 * S..]);

        // late answers for the failed read still resolve and free their slots
        tokio::time::timeout(Duration::from_secs(1), async {
            while c.pipeline.in_flight() != 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("window drained");
    }

    #[tokio::test(start_paused = true)]
    async fn large_read_through_small_queues() {
        let content = file(200 * S + 17);
        let config = Config {
            window: 4,
            submit_queue: 1,
            response_queue: 1,
            ..Config::default()
        };
        let (mut c, remote) = consumer(config);
        serve(remote, file_server(content.clone()));

        let mut buf = vec![0u8; content.len()];
        let n = c.read_at(&mut buf, 0, PATH).await.unwrap();
        assert_eq!(n, content.len());
        assert!(buf == content);
        assert_eq!(c.pipeline.in_flight(), 0);
    }

    async fn next_interest(remote: &mut Face) -> Interest {
        match remote.rx.recv().await {
            Some(Packet::Interest(i)) => i,
            other => panic!("expected interest, got {:?}", other),
        }
    }

    async fn answer_stat(remote: &mut Face, size: u64) -> Interest {
        let i = next_interest(remote).await;
        remote
            .tx
            .send(Packet::Data(Data::new(i.name.clone(), encode_nni(size))))
            .await
            .unwrap();
        i
    }

    #[tokio::test(start_paused = true)]
    async fn late_nack_does_not_fail_next_stat() {
        let (mut c, mut remote) = consumer(Config::default());
        let (first, answered) = tokio::join!(c.stat(PATH), answer_stat(&mut remote, 1024));
        assert_eq!(first.unwrap(), FileInfo { size: 1024 });

        // nack for the already answered fileinfo request
        remote
            .tx
            .send(Packet::Nack(Nack::new(answered, NackReason::Duplicate)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let (second, _) = tokio::join!(c.stat(PATH), answer_stat(&mut remote, 1024));
        assert_eq!(second.unwrap(), FileInfo { size: 1024 });
    }

    #[tokio::test(start_paused = true)]
    async fn stray_nack_for_queued_segment_does_not_fail_read() {
        let content = file(3 * S);
        let config = Config {
            window: 1,
            ..Config::default()
        };
        let (mut c, mut remote) = consumer(config);

        let responder = async {
            for k in 0..3 {
                let i = next_interest(&mut remote).await;
                if k == 0 {
                    // the next segment is submitted but still waits for the window
                    let stray = Interest::new(
                        Namespace::default().read(PATH, 6144),
                        Duration::from_secs(8),
                    );
                    remote
                        .tx
                        .send(Packet::Nack(Nack::new(stray, NackReason::Duplicate)))
                        .await
                        .unwrap();
                }
                remote.tx.send(segment(&content, &i.name)).await.unwrap();
            }
        };
        let mut buf = vec![0u8; 3 * S];
        let (n, ()) = tokio::join!(c.read_at(&mut buf, 0, PATH), responder);
        assert_eq!(n.unwrap(), 3 * S);
        assert!(buf == content);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_face_ends_read() {
        let (mut c, remote) = consumer(Config::default());
        drop(remote);
        let mut buf = vec![0u8; 10];
        assert!(matches!(
            c.read_at(&mut buf, 0, PATH).await,
            Err(ConsumerError::Fetch(FetchError::Closed))
        ));
    }
}
