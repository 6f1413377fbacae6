//! Collective operations built from point-to-point messages.
//!
//! Every rank of a communicator must call the same collectives in the same
//! order. All helpers here are rooted at a fixed rank and fold contributions
//! in rank order, so reductions give bit-identical results on every rank.
//!
//! Variable-size payloads travel as a [`WireLen`] header followed by the data,
//! the same two-message layout the partitioned writers use.

use crate::algs::communicator::{Communicator, Wait, tags};
use crate::algs::wire::{WireI64, WireLen, cast_slice, cast_slice_from, expect_exact_len};
use crate::deck_error::DeckError;
use bytemuck::Pod;

fn recv_len<C: Communicator>(comm: &C, peer: usize, tag: u16) -> Result<usize, DeckError> {
    let mut hdr = [0u8; std::mem::size_of::<WireLen>()];
    let data = comm
        .irecv(peer, tag, &mut hdr)
        .wait()
        .ok_or_else(|| DeckError::comm(peer, "failed to receive size header"))?;
    expect_exact_len(data.len(), hdr.len()).map_err(|e| DeckError::comm(peer, e))?;
    Ok(cast_slice_from::<WireLen>(&data)[0].get())
}

fn recv_payload<C: Communicator>(
    comm: &C,
    peer: usize,
    tag: u16,
    len: usize,
) -> Result<Vec<u8>, DeckError> {
    let mut buf = vec![0u8; len];
    let data = comm
        .irecv(peer, tag, &mut buf)
        .wait()
        .ok_or_else(|| DeckError::comm(peer, "failed to receive payload"))?;
    expect_exact_len(data.len(), len).map_err(|e| DeckError::comm(peer, e))?;
    Ok(data)
}

fn send_sized<C: Communicator>(comm: &C, peer: usize, len_tag: u16, data_tag: u16, data: &[u8]) {
    let hdr = WireLen::new(data.len());
    let _ = comm
        .isend(peer, len_tag, cast_slice(std::slice::from_ref(&hdr)))
        .wait();
    let _ = comm.isend(peer, data_tag, data).wait();
}

/// Broadcast a byte buffer from `root`. On `root`, `data` is sent; on every
/// other rank it is replaced by the received content.
pub fn broadcast_bytes<C: Communicator>(
    comm: &C,
    root: usize,
    data: &mut Vec<u8>,
) -> Result<(), DeckError> {
    let len_tag = tags::BCAST_LEN.as_u16();
    let data_tag = tags::BCAST_DATA.as_u16();
    if comm.rank() == root {
        for peer in (0..comm.size()).filter(|&p| p != root) {
            send_sized(comm, peer, len_tag, data_tag, data);
        }
        Ok(())
    } else {
        let len = recv_len(comm, root, len_tag)?;
        *data = recv_payload(comm, root, data_tag, len)?;
        Ok(())
    }
}

/// Broadcast one plain-old-data value from `root`.
pub fn broadcast_value<C: Communicator, T: Pod>(
    comm: &C,
    root: usize,
    value: &mut T,
) -> Result<(), DeckError> {
    let mut bytes = cast_slice(std::slice::from_ref(value)).to_vec();
    broadcast_bytes(comm, root, &mut bytes)?;
    if comm.rank() != root {
        expect_exact_len(bytes.len(), std::mem::size_of::<T>())
            .map_err(|e| DeckError::comm(root, e))?;
        *value = cast_slice_from::<T>(&bytes)[0];
    }
    Ok(())
}

/// Broadcast an integer from `root`.
pub fn broadcast_i64<C: Communicator>(comm: &C, root: usize, value: &mut i64) -> Result<(), DeckError> {
    let mut wire = WireI64::of(*value);
    broadcast_value(comm, root, &mut wire)?;
    *value = wire.get();
    Ok(())
}

/// Broadcast a UTF-8 string from `root`.
pub fn broadcast_string<C: Communicator>(
    comm: &C,
    root: usize,
    value: &mut String,
) -> Result<(), DeckError> {
    let mut bytes = value.as_bytes().to_vec();
    broadcast_bytes(comm, root, &mut bytes)?;
    if comm.rank() != root {
        *value = String::from_utf8(bytes)
            .map_err(|e| DeckError::comm(root, format!("broadcast string: {e}")))?;
    }
    Ok(())
}

/// Gather one variable-size buffer from every rank onto `root`, ordered by
/// rank. Non-root ranks get an empty list.
///
/// A failed receive is kept but every remaining peer is still drained, so no
/// sender is left blocked.
pub fn gather_bytes<C: Communicator>(
    comm: &C,
    root: usize,
    mine: &[u8],
) -> Result<Vec<Vec<u8>>, DeckError> {
    let len_tag = tags::GATHER_LEN.as_u16();
    let data_tag = tags::GATHER_DATA.as_u16();
    if comm.rank() != root {
        send_sized(comm, root, len_tag, data_tag, mine);
        return Ok(Vec::new());
    }
    let mut pieces: Vec<Vec<u8>> = Vec::with_capacity(comm.size());
    let mut first_err = None;
    for peer in 0..comm.size() {
        if peer == root {
            pieces.push(mine.to_vec());
            continue;
        }
        match recv_len(comm, peer, len_tag).and_then(|n| recv_payload(comm, peer, data_tag, n)) {
            Ok(p) => pieces.push(p),
            Err(e) => {
                pieces.push(Vec::new());
                first_err.get_or_insert(e);
            }
        }
    }
    match first_err {
        Some(err) => Err(err),
        None => Ok(pieces),
    }
}

/// Send `pieces[r]` from `root` to rank `r`; every rank returns its own
/// piece. `pieces` is only read on `root`, missing entries travel as empty
/// buffers.
pub fn scatter_bytes<C: Communicator>(
    comm: &C,
    root: usize,
    mut pieces: Vec<Vec<u8>>,
) -> Result<Vec<u8>, DeckError> {
    let len_tag = tags::SCATTER_LEN.as_u16();
    let data_tag = tags::SCATTER_DATA.as_u16();
    if comm.rank() == root {
        for peer in (0..comm.size()).filter(|&p| p != root) {
            let piece = pieces.get(peer).map_or(&[][..], Vec::as_slice);
            send_sized(comm, peer, len_tag, data_tag, piece);
        }
        Ok(pieces.get_mut(root).map(std::mem::take).unwrap_or_default())
    } else {
        let len = recv_len(comm, root, len_tag)?;
        recv_payload(comm, root, data_tag, len)
    }
}

/// Personalized all-to-all: `outgoing[r]` goes to rank `r`, the result holds
/// what every rank sent to the caller, ordered by sender.
///
/// Peers are visited in rank order; the lower rank of each pair sends first,
/// so every pairwise step has a matching partner.
pub fn exchange_bytes<C: Communicator>(
    comm: &C,
    mut outgoing: Vec<Vec<u8>>,
) -> Result<Vec<Vec<u8>>, DeckError> {
    let len_tag = tags::EXCHANGE_LEN.as_u16();
    let data_tag = tags::EXCHANGE_DATA.as_u16();
    let me = comm.rank();
    outgoing.resize_with(comm.size(), Vec::new);
    let mut incoming = vec![Vec::new(); comm.size()];
    incoming[me] = std::mem::take(&mut outgoing[me]);
    for peer in (0..comm.size()).filter(|&p| p != me) {
        let receive = || recv_len(comm, peer, len_tag).and_then(|n| recv_payload(comm, peer, data_tag, n));
        if me < peer {
            send_sized(comm, peer, len_tag, data_tag, &outgoing[peer]);
            incoming[peer] = receive()?;
        } else {
            incoming[peer] = receive()?;
            send_sized(comm, peer, len_tag, data_tag, &outgoing[peer]);
        }
    }
    Ok(incoming)
}

/// Gather one variable-size buffer from every rank onto every rank, ordered
/// by rank.
pub fn all_gather_bytes<C: Communicator>(
    comm: &C,
    mine: &[u8],
) -> Result<Vec<Vec<u8>>, DeckError> {
    let root = 0;
    // a failed gather still broadcasts (empty) so no rank is left waiting
    let mut packed = Vec::new();
    let mut root_err = None;
    match gather_bytes(comm, root, mine) {
        Ok(pieces) if comm.rank() == root => {
            for piece in &pieces {
                let hdr = WireLen::new(piece.len());
                packed.extend_from_slice(cast_slice(std::slice::from_ref(&hdr)));
            }
            for piece in &pieces {
                packed.extend_from_slice(piece);
            }
        }
        Ok(_) => {}
        Err(err) => root_err = Some(err),
    }

    broadcast_bytes(comm, root, &mut packed)?;
    if let Some(err) = root_err {
        return Err(err);
    }
    unpack_pieces(&packed, comm.size()).ok_or_else(|| DeckError::comm(root, "malformed gather payload"))
}

fn unpack_pieces(packed: &[u8], size: usize) -> Option<Vec<Vec<u8>>> {
    let hdr_len = size * std::mem::size_of::<WireLen>();
    let lens: Vec<usize> = cast_slice_from::<WireLen>(packed.get(..hdr_len)?)
        .iter()
        .map(WireLen::get)
        .collect();
    let mut offset = hdr_len;
    let mut out = Vec::with_capacity(size);
    for len in lens {
        out.push(packed.get(offset..offset + len)?.to_vec());
        offset += len;
    }
    (offset == packed.len()).then_some(out)
}

/// Gather one value per rank onto every rank.
pub fn all_gather<C: Communicator, T: Pod>(comm: &C, value: T) -> Result<Vec<T>, DeckError> {
    let pieces = all_gather_bytes(comm, cast_slice(std::slice::from_ref(&value)))?;
    pieces
        .iter()
        .enumerate()
        .map(|(peer, p)| {
            expect_exact_len(p.len(), std::mem::size_of::<T>())
                .map_err(|e| DeckError::comm(peer, e))?;
            Ok(cast_slice_from::<T>(p)[0])
        })
        .collect()
}

/// Reduce one value per rank with `op`, folded in rank order, result on
/// every rank.
pub fn all_reduce<C: Communicator, T: Pod>(
    comm: &C,
    value: T,
    op: impl Fn(T, T) -> T,
) -> Result<T, DeckError> {
    let all = all_gather(comm, value)?;
    let mut it = all.into_iter();
    let first = it
        .next()
        .ok_or_else(|| DeckError::comm(comm.rank(), "reduction over an empty communicator"))?;
    Ok(it.fold(first, op))
}

pub fn all_reduce_sum_i64<C: Communicator>(comm: &C, value: i64) -> Result<i64, DeckError> {
    Ok(all_reduce(comm, WireI64::of(value), |a, b| WireI64::of(a.get() + b.get()))?.get())
}

pub fn all_reduce_min_i64<C: Communicator>(comm: &C, value: i64) -> Result<i64, DeckError> {
    Ok(all_reduce(comm, WireI64::of(value), |a, b| WireI64::of(a.get().min(b.get())))?.get())
}

pub fn all_reduce_max_i64<C: Communicator>(comm: &C, value: i64) -> Result<i64, DeckError> {
    Ok(all_reduce(comm, WireI64::of(value), |a, b| WireI64::of(a.get().max(b.get())))?.get())
}

pub fn all_reduce_sum_f64<C: Communicator>(comm: &C, value: f64) -> Result<f64, DeckError> {
    use crate::algs::wire::WireF64;
    Ok(all_reduce(comm, WireF64::of(value), |a, b| WireF64::of(a.get() + b.get()))?.get())
}
