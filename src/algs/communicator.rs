//! Thin façade over intra-process (in-memory) or inter-process (MPI) message passing.
//!
//! Messages are *contiguous byte slices* (no zero-copy guarantees).
//! Point-to-point handles are **waitable** but non-blocking: the ghost exchange
//! calls `.wait()` before it trusts that a buffer is ready. Collectives block
//! until every rank has contributed.
//!
//! Messages between the same `(src, dst, tag)` triple are delivered in send
//! order, matching MPI's non-overtaking rule. The collectives rely on this and
//! reuse a single reserved tag.

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::lts_error::LtsWeightsError;

/// Tag reserved for collectives built on point-to-point messages.
pub const COLLECTIVE_TAG: CommTag = CommTag::new(0xFFF0);

/// Typed message tag.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct CommTag(pub u16);

impl CommTag {
    pub const fn new(tag: u16) -> Self {
        Self(tag)
    }
    pub const fn as_u16(self) -> u16 {
        self.0
    }
    /// Derive the `k`-th tag after this one (wrapping).
    pub const fn offset(self, k: u16) -> Self {
        Self(self.0.wrapping_add(k))
    }
}

/// Tags used by one ghost exchange: sizes first, then payload.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GhostCommTags {
    pub sizes: CommTag,
    pub data: CommTag,
}

impl GhostCommTags {
    pub const fn from_base(base: CommTag) -> Self {
        Self {
            sizes: base,
            data: base.offset(1),
        }
    }
}

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Option<Vec<u8>>;
}

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

/// Communication interface used by the ghost exchange and the reductions.
pub trait Communicator {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    /// Post a receive of at most `buf.len()` bytes.
    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle;

    /// Global minimum. A rank whose contribution never arrives is an
    /// [`LtsWeightsError::IncompleteExchange`], never a partial result.
    fn allreduce_min(&self, value: f64) -> Result<f64, LtsWeightsError>;
    fn allreduce_max(&self, value: f64) -> Result<f64, LtsWeightsError>;
    fn allreduce_sum(&self, value: u64) -> Result<u64, LtsWeightsError>;

    /// Global logical OR.
    fn allreduce_or(&self, flag: bool) -> Result<bool, LtsWeightsError> {
        Ok(self.allreduce_sum(flag as u64)? > 0)
    }

    /// True when there is nobody to talk to.
    fn is_no_comm(&self) -> bool {
        false
    }
}

/// Failure vote in front of a collective step.
///
/// Every rank passes its local outcome; if any rank failed, all ranks return
/// an error: the failing rank its own, the others `on_peer_failure()`.
pub fn agree_on_failure<C, T, F>(
    comm: &C,
    local: Result<T, LtsWeightsError>,
    on_peer_failure: F,
) -> Result<T, LtsWeightsError>
where
    C: Communicator + ?Sized,
    F: FnOnce() -> LtsWeightsError,
{
    if comm.is_no_comm() {
        return local;
    }
    let any_failed = match comm.allreduce_or(local.is_err()) {
        Ok(flag) => flag,
        Err(e) => return local.and(Err(e)),
    };
    match local {
        Ok(_) if any_failed => Err(on_peer_failure()),
        other => other,
    }
}

/// Compile-time no-op comm for pure serial runs and unit tests.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        1
    }
    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) {}
    fn irecv(&self, _peer: usize, _tag: u16, _buf: &mut [u8]) {}

    fn allreduce_min(&self, value: f64) -> Result<f64, LtsWeightsError> {
        Ok(value)
    }
    fn allreduce_max(&self, value: f64) -> Result<f64, LtsWeightsError> {
        Ok(value)
    }
    fn allreduce_sum(&self, value: u64) -> Result<u64, LtsWeightsError> {
        Ok(value)
    }
    fn is_no_comm(&self) -> bool {
        true
    }
}

// --- RayonComm: intra-process / multi-thread ---
type Key = (usize, usize, u16); // (src, dst, tag)

#[derive(Default)]
struct Mailbox {
    queues: DashMap<Key, VecDeque<Bytes>>,
    lock: Mutex<()>,
    arrived: Condvar,
}

impl Mailbox {
    fn post(&self, key: Key, data: Bytes) {
        let _guard = self.lock.lock();
        self.queues.entry(key).or_default().push_back(data);
        self.arrived.notify_all();
    }

    fn take(&self, key: &Key, timeout: Option<Duration>) -> Option<Bytes> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut guard = self.lock.lock();
        loop {
            if let Some(bytes) = self.queues.get_mut(key).and_then(|mut q| q.pop_front()) {
                return Some(bytes);
            }
            match deadline {
                Some(d) => {
                    if self.arrived.wait_until(&mut guard, d).timed_out() {
                        return self.queues.get_mut(key).and_then(|mut q| q.pop_front());
                    }
                }
                None => self.arrived.wait(&mut guard),
            }
        }
    }
}

/// Pending receive on a [`RayonComm`].
pub struct LocalHandle {
    mailbox: Arc<Mailbox>,
    key: Key,
    len: usize,
    timeout: Option<Duration>,
}

impl Wait for LocalHandle {
    fn wait(self) -> Option<Vec<u8>> {
        let bytes = self.mailbox.take(&self.key, self.timeout)?;
        let n = bytes.len().min(self.len);
        Some(bytes[..n].to_vec())
    }
}

/// In-memory communicator: every rank is a thread sharing one mailbox.
///
/// Build all ranks of a world at once with [`RayonComm::world`], then move each
/// handle onto its own thread. Worlds never see each other's messages.
#[derive(Clone)]
pub struct RayonComm {
    rank: usize,
    size: usize,
    mailbox: Arc<Mailbox>,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for RayonComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RayonComm")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RayonComm {
    /// Create `size` connected ranks whose receives block indefinitely.
    pub fn world(size: usize) -> Vec<Self> {
        Self::build(size, None)
    }

    /// Like [`RayonComm::world`], but a receive gives up after `timeout` and
    /// its handle yields `None`.
    pub fn world_with_timeout(size: usize, timeout: Duration) -> Vec<Self> {
        Self::build(size, Some(timeout))
    }

    fn build(size: usize, timeout: Option<Duration>) -> Vec<Self> {
        let mailbox = Arc::new(Mailbox::default());
        (0..size)
            .map(|rank| Self {
                rank,
                size,
                mailbox: Arc::clone(&mailbox),
                timeout,
            })
            .collect()
    }

    fn reduce_f64(
        &self,
        value: f64,
        op: fn(f64, f64) -> f64,
    ) -> Result<f64, LtsWeightsError> {
        let tag = COLLECTIVE_TAG.as_u16();
        let bytes = value.to_le_bytes();
        for peer in (0..self.size).filter(|&p| p != self.rank) {
            self.isend(peer, tag, &bytes);
        }
        let mut acc = value;
        for peer in (0..self.size).filter(|&p| p != self.rank) {
            let mut buf = [0u8; 8];
            let h = self.irecv(peer, tag, &mut buf);
            match h.wait() {
                Some(data) if data.len() == 8 => {
                    buf.copy_from_slice(&data);
                    acc = op(acc, f64::from_le_bytes(buf));
                }
                Some(data) => {
                    return Err(LtsWeightsError::incomplete(
                        peer,
                        format!("collective contribution of {} bytes, expected 8", data.len()),
                    ));
                }
                None => {
                    log::error!(
                        "rank {}: collective contribution from rank {peer} missing",
                        self.rank
                    );
                    return Err(LtsWeightsError::incomplete(
                        peer,
                        "no contribution to collective before timeout",
                    ));
                }
            }
        }
        Ok(acc)
    }
}

impl Communicator for RayonComm {
    type SendHandle = ();
    type RecvHandle = LocalHandle;

    fn rank(&self) -> usize {
        self.rank
    }
    fn size(&self) -> usize {
        self.size
    }

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle {
        self.mailbox
            .post((self.rank, peer, tag), Bytes::copy_from_slice(buf));
    }

    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle {
        LocalHandle {
            mailbox: Arc::clone(&self.mailbox),
            key: (peer, self.rank, tag),
            len: buf.len(),
            timeout: self.timeout,
        }
    }

    fn allreduce_min(&self, value: f64) -> Result<f64, LtsWeightsError> {
        self.reduce_f64(value, f64::min)
    }
    fn allreduce_max(&self, value: f64) -> Result<f64, LtsWeightsError> {
        self.reduce_f64(value, f64::max)
    }
    fn allreduce_sum(&self, value: u64) -> Result<u64, LtsWeightsError> {
        // u64 counts stay exact in f64 up to 2^53, far beyond any cell count.
        Ok(self.reduce_f64(value as f64, |a, b| a + b)? as u64)
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::{Communicator, Wait};
    use crate::lts_error::LtsWeightsError;
    use mpi::collective::SystemOperation;
    use mpi::environment::Universe;
    use mpi::request::StaticScope;
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::{Communicator as _, CommunicatorCollectives, Destination, Source};
    use std::sync::Arc;

    pub struct MpiComm {
        pub world: Arc<SimpleCommunicator>,
        pub rank: usize,
        pub size: usize,
        _universe: Arc<Universe>,
    }

    impl MpiComm {
        pub fn new() -> Result<Self, LtsWeightsError> {
            let universe = mpi::initialize()
                .ok_or_else(|| LtsWeightsError::config("MPI already initialized"))?;
            let world = universe.world();
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Ok(Self {
                world: Arc::new(world),
                rank,
                size,
                _universe: Arc::new(universe),
            })
        }
    }

    /// Send in flight; owns its buffer until completion.
    pub struct MpiSendHandle {
        finish: Option<Box<dyn FnOnce()>>,
    }

    impl Wait for MpiSendHandle {
        fn wait(mut self) -> Option<Vec<u8>> {
            if let Some(f) = self.finish.take() {
                f();
            }
            None
        }
    }

    impl Drop for MpiSendHandle {
        fn drop(&mut self) {
            if let Some(f) = self.finish.take() {
                f();
            }
        }
    }

    /// Receive matched lazily on `wait`; sends are non-blocking so this cannot deadlock.
    pub struct MpiRecvHandle {
        world: Arc<SimpleCommunicator>,
        peer: i32,
        tag: i32,
        len: usize,
    }

    impl Wait for MpiRecvHandle {
        fn wait(self) -> Option<Vec<u8>> {
            let (mut msg, _status) = self
                .world
                .process_at_rank(self.peer)
                .receive_vec_with_tag::<u8>(self.tag);
            msg.truncate(self.len);
            Some(msg)
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = MpiSendHandle;
        type RecvHandle = MpiRecvHandle;

        fn rank(&self) -> usize {
            self.rank
        }
        fn size(&self) -> usize {
            self.size
        }

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> MpiSendHandle {
            let owned: &'static mut [u8] = Box::leak(buf.to_vec().into_boxed_slice());
            let ptr: *mut [u8] = owned;
            // SAFETY: `ptr` came from `Box::leak` above and is reclaimed exactly
            // once, after the request referencing it has completed.
            let data: &'static [u8] = unsafe { &*ptr };
            let req = self
                .world
                .process_at_rank(peer as i32)
                .immediate_send_with_tag(StaticScope, data, tag as i32);
            MpiSendHandle {
                finish: Some(Box::new(move || {
                    req.wait();
                    drop(unsafe { Box::from_raw(ptr) });
                })),
            }
        }

        fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> MpiRecvHandle {
            MpiRecvHandle {
                world: Arc::clone(&self.world),
                peer: peer as i32,
                tag: tag as i32,
                len: buf.len(),
            }
        }

        fn allreduce_min(&self, value: f64) -> Result<f64, LtsWeightsError> {
            let mut out = 0.0f64;
            self.world
                .all_reduce_into(&value, &mut out, SystemOperation::min());
            Ok(out)
        }
        fn allreduce_max(&self, value: f64) -> Result<f64, LtsWeightsError> {
            let mut out = 0.0f64;
            self.world
                .all_reduce_into(&value, &mut out, SystemOperation::max());
            Ok(out)
        }
        fn allreduce_sum(&self, value: u64) -> Result<u64, LtsWeightsError> {
            let mut out = 0u64;
            self.world
                .all_reduce_into(&value, &mut out, SystemOperation::sum());
            Ok(out)
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;
