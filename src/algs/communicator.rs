//! Thin façade over intra-process (threads) or inter-process (MPI) message passing.
//!
//! Messages are *contiguous byte slices* (no zero-copy guarantees).
//! Receive handles are **waitable**: a collective helper calls `.wait()`
//! before it trusts that the payload is there. The receive buffer passed to
//! `irecv` is a size hint only; `wait` hands back the message as sent, and
//! callers check its length.
//!
//! Every backend delivers messages between one `(source, destination, tag)`
//! pair in send order. The collectives in [`crate::algs::collective`] rely on
//! that to reuse fixed tags.

use crate::algs::wire::{WireSplit, cast_slice, cast_slice_from};
use crate::deck_error::DeckError;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Message passing interface shared by all backends.
pub trait Communicator: Clone {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    /// Rank of the caller inside this communicator.
    fn rank(&self) -> usize;
    /// Number of ranks in this communicator.
    fn size(&self) -> usize;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle;

    /// Collective split by color. Ranks passing `None` take part in the call
    /// but receive no communicator. Inside a color group, ranks are ordered
    /// by `key`, ties broken by the rank in `self`.
    fn split(&self, color: Option<usize>, key: usize) -> Result<Option<Self>, DeckError>;

    /// True on rank 0.
    fn is_root(&self) -> bool {
        self.rank() == 0
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

/// Typed message tag.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct CommTag(u16);

impl CommTag {
    pub const fn new(tag: u16) -> Self {
        Self(tag)
    }
    pub const fn as_u16(self) -> u16 {
        self.0
    }
    pub const fn offset(self, by: u16) -> Self {
        Self(self.0.wrapping_add(by))
    }
}

/// Tags reserved by the library.
pub mod tags {
    use super::CommTag;

    pub const SPLIT: CommTag = CommTag::new(0xF000);
    pub const BCAST_LEN: CommTag = CommTag::new(0xF010);
    pub const BCAST_DATA: CommTag = CommTag::new(0xF011);
    pub const GATHER_LEN: CommTag = CommTag::new(0xF020);
    pub const GATHER_DATA: CommTag = CommTag::new(0xF021);
    pub const SCATTER_LEN: CommTag = CommTag::new(0xF040);
    pub const SCATTER_DATA: CommTag = CommTag::new(0xF041);
    pub const EXCHANGE_LEN: CommTag = CommTag::new(0xF050);
    pub const EXCHANGE_DATA: CommTag = CommTag::new(0xF051);
}

/// Serial communicator: one rank, no peers.
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

    fn split(&self, color: Option<usize>, _key: usize) -> Result<Option<Self>, DeckError> {
        Ok(color.map(|_| NoComm))
    }
}

// --- ThreadComm: ranks as threads of one process ---
type Key = (u64, usize, usize, u16); // (context, src, dst, tag) in world ranks

#[derive(Default)]
struct Router {
    mailbox: DashMap<Key, VecDeque<Bytes>>,
    gate: Mutex<u64>,
    signal: Condvar,
    contexts: DashMap<(u64, u64, usize), u64>,
    next_context: AtomicU64,
}

impl Router {
    fn post(&self, key: Key, payload: Bytes) {
        self.mailbox.entry(key).or_default().push_back(payload);
        let mut generation = self.gate.lock();
        *generation += 1;
        self.signal.notify_all();
    }

    fn take(&self, key: &Key) -> Option<Bytes> {
        self.mailbox.get_mut(key).and_then(|mut q| q.pop_front())
    }

    fn wait_for(&self, key: Key) -> Bytes {
        if let Some(b) = self.take(&key) {
            return b;
        }
        let mut generation = self.gate.lock();
        loop {
            // checked under the gate so a concurrent post cannot slip between
            // the check and the wait
            if let Some(b) = self.take(&key) {
                return b;
            }
            self.signal.wait(&mut generation);
        }
    }
}

/// In-process communicator. Each rank is driven by its own thread; the
/// handles of one world share a mailbox.
#[derive(Clone)]
pub struct ThreadComm {
    router: Arc<Router>,
    context: u64,
    members: Arc<[usize]>,
    rank: usize,
    splits: Arc<AtomicU64>,
}

impl std::fmt::Debug for ThreadComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadComm")
            .field("context", &self.context)
            .field("rank", &self.rank)
            .field("size", &self.members.len())
            .finish()
    }
}

impl ThreadComm {
    /// Create the handles of a world with `size` ranks. Handle `i` has rank `i`.
    pub fn world(size: usize) -> Vec<ThreadComm> {
        let router = Arc::new(Router {
            next_context: AtomicU64::new(1),
            ..Router::default()
        });
        let members: Arc<[usize]> = (0..size).collect();
        (0..size)
            .map(|rank| ThreadComm {
                router: Arc::clone(&router),
                context: 0,
                members: Arc::clone(&members),
                rank,
                splits: Arc::new(AtomicU64::new(0)),
            })
            .collect()
    }

    fn world_rank(&self, rank: usize) -> usize {
        self.members[rank]
    }
}

/// Receive handle of [`ThreadComm`].
pub struct ThreadRecv {
    router: Arc<Router>,
    key: Key,
}

impl Wait for ThreadRecv {
    fn wait(self) -> Option<Vec<u8>> {
        Some(self.router.wait_for(self.key).to_vec())
    }
}

impl Communicator for ThreadComm {
    type SendHandle = ();
    type RecvHandle = ThreadRecv;

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.members.len()
    }

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle {
        let key = (
            self.context,
            self.world_rank(self.rank),
            self.world_rank(peer),
            tag,
        );
        self.router.post(key, Bytes::copy_from_slice(buf));
    }

    fn irecv(&self, peer: usize, tag: u16, _buf: &mut [u8]) -> Self::RecvHandle {
        let key = (
            self.context,
            self.world_rank(peer),
            self.world_rank(self.rank),
            tag,
        );
        ThreadRecv {
            router: Arc::clone(&self.router),
            key,
        }
    }

    fn split(&self, color: Option<usize>, key: usize) -> Result<Option<Self>, DeckError> {
        let sequence = self.splits.fetch_add(1, Ordering::SeqCst);
        let mine = WireSplit::new(color, key);

        // all-to-all exchange of (color, key); sends never block here
        let tag = tags::SPLIT.as_u16();
        for peer in (0..self.size()).filter(|&p| p != self.rank) {
            self.isend(peer, tag, cast_slice(std::slice::from_ref(&mine)));
        }
        let mut entries = Vec::with_capacity(self.size());
        for peer in 0..self.size() {
            if peer == self.rank {
                entries.push((peer, mine));
                continue;
            }
            let data = self
                .irecv(peer, tag, &mut [])
                .wait()
                .ok_or_else(|| DeckError::comm(peer, "no split record received"))?;
            if data.len() != std::mem::size_of::<WireSplit>() {
                return Err(DeckError::comm(
                    peer,
                    format!("split record of {} bytes", data.len()),
                ));
            }
            let rec: WireSplit = cast_slice_from::<WireSplit>(&data)[0];
            entries.push((peer, rec));
        }

        let Some(color) = color else {
            return Ok(None);
        };
        let mut group: Vec<(usize, usize)> = entries
            .iter()
            .filter(|(_, rec)| rec.color() == Some(color))
            .map(|(peer, rec)| (rec.key(), *peer))
            .collect();
        group.sort_unstable();
        let new_rank = group
            .iter()
            .position(|&(_, peer)| peer == self.rank)
            .ok_or_else(|| DeckError::comm(self.rank, "rank missing from its own color group"))?;
        let members: Arc<[usize]> = group
            .iter()
            .map(|&(_, peer)| self.world_rank(peer))
            .collect();

        let router = Arc::clone(&self.router);
        let context = *self
            .router
            .contexts
            .entry((self.context, sequence, color))
            .or_insert_with(|| router.next_context.fetch_add(1, Ordering::SeqCst));

        Ok(Some(ThreadComm {
            router: Arc::clone(&self.router),
            context,
            members,
            rank: new_rank,
            splits: Arc::new(AtomicU64::new(0)),
        }))
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::{Communicator, Wait};
    use crate::deck_error::DeckError;
    use mpi::topology::{Color, SimpleCommunicator};
    use mpi::traits::*;
    use std::sync::Arc;

    /// Communicator backed by an MPI communicator handle.
    #[derive(Clone)]
    pub struct MpiComm {
        comm: Arc<SimpleCommunicator>,
        rank: usize,
        size: usize,
    }

    impl MpiComm {
        pub fn new(comm: SimpleCommunicator) -> Self {
            let rank = comm.rank() as usize;
            let size = comm.size() as usize;
            Self {
                comm: Arc::new(comm),
                rank,
                size,
            }
        }

        /// Wrap `MPI_COMM_WORLD` of an initialized universe.
        pub fn world(universe: &mpi::environment::Universe) -> Self {
            Self::new(universe.world())
        }
    }

    /// Deferred blocking receive.
    pub struct MpiRecv {
        comm: Arc<SimpleCommunicator>,
        peer: i32,
        tag: i32,
    }

    impl Wait for MpiRecv {
        fn wait(self) -> Option<Vec<u8>> {
            let (data, _status) = self
                .comm
                .process_at_rank(self.peer)
                .receive_vec_with_tag::<u8>(self.tag);
            Some(data)
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = ();
        type RecvHandle = MpiRecv;

        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.size
        }

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) {
            self.comm
                .process_at_rank(peer as i32)
                .send_with_tag(buf, tag as i32);
        }

        fn irecv(&self, peer: usize, tag: u16, _buf: &mut [u8]) -> MpiRecv {
            MpiRecv {
                comm: Arc::clone(&self.comm),
                peer: peer as i32,
                tag: tag as i32,
            }
        }

        fn split(&self, color: Option<usize>, key: usize) -> Result<Option<Self>, DeckError> {
            let color = match color {
                Some(c) => Color::with_value(c as i32),
                None => Color::undefined(),
            };
            Ok(self
                .comm
                .split_by_color_with_key(color, key as i32)
                .map(MpiComm::new))
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;
