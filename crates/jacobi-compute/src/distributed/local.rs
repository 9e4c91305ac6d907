//! In-process transport: one OS thread per unit, channels between them.
//!
//! The group is a star around the root. Each non-root unit owns one channel
//! to the root and one from it, so every message between a pair of units
//! arrives in the order it was sent and a collective can never consume a
//! message belonging to the next one. Dropping a communicator (its unit
//! returned or panicked) closes its channels, turning what would be a
//! deadlock under MPI into a [`ComputeError::Disconnected`] on its peers.

use std::sync::mpsc::{channel, Receiver, Sender};

use super::comm::{displacements, Communicator, ReduceOp, ROOT};
use crate::backend::ComputeError;

enum Packet {
    Words(Vec<u64>),
    Values(Vec<f64>),
}

enum Links {
    Root {
        to_units: Vec<Sender<Packet>>,
        from_units: Vec<Receiver<Packet>>,
    },
    Unit {
        to_root: Sender<Packet>,
        from_root: Receiver<Packet>,
    },
}

/// Endpoint of one unit in an in-process group.
pub struct LocalCommunicator {
    rank: usize,
    size: usize,
    links: Links,
}

impl LocalCommunicator {
    /// Create the endpoints of a `size`-unit group, indexed by rank.
    pub fn group(size: usize) -> Vec<LocalCommunicator> {
        if size == 0 {
            return Vec::new();
        }

        let mut to_units = Vec::with_capacity(size - 1);
        let mut from_units = Vec::with_capacity(size - 1);
        let mut units = Vec::with_capacity(size - 1);

        for rank in 1..size {
            let (down_tx, down_rx) = channel();
            let (up_tx, up_rx) = channel();
            to_units.push(down_tx);
            from_units.push(up_rx);
            units.push(LocalCommunicator {
                rank,
                size,
                links: Links::Unit {
                    to_root: up_tx,
                    from_root: down_rx,
                },
            });
        }

        let root = LocalCommunicator {
            rank: ROOT,
            size,
            links: Links::Root {
                to_units,
                from_units,
            },
        };

        std::iter::once(root).chain(units).collect()
    }

    fn send_to(&self, rank: usize, packet: Packet) -> Result<(), ComputeError> {
        let sender = match &self.links {
            Links::Root { to_units, .. } => &to_units[rank - 1],
            Links::Unit { to_root, .. } => to_root,
        };
        sender
            .send(packet)
            .map_err(|_| ComputeError::Disconnected { rank })
    }

    fn recv_from(&self, rank: usize) -> Result<Packet, ComputeError> {
        let receiver = match &self.links {
            Links::Root { from_units, .. } => &from_units[rank - 1],
            Links::Unit { from_root, .. } => from_root,
        };
        receiver
            .recv()
            .map_err(|_| ComputeError::Disconnected { rank })
    }

    fn recv_values(&self, rank: usize, len: usize) -> Result<Vec<f64>, ComputeError> {
        match self.recv_from(rank)? {
            Packet::Values(values) if values.len() == len => Ok(values),
            Packet::Values(values) => Err(ComputeError::ProtocolMismatch {
                rank,
                message: format!("expected {} values, received {}", len, values.len()),
            }),
            Packet::Words(_) => Err(ComputeError::ProtocolMismatch {
                rank,
                message: "expected floating-point payload, received integers".into(),
            }),
        }
    }

    fn recv_words(&self, rank: usize, len: usize) -> Result<Vec<u64>, ComputeError> {
        match self.recv_from(rank)? {
            Packet::Words(words) if words.len() == len => Ok(words),
            Packet::Words(words) => Err(ComputeError::ProtocolMismatch {
                rank,
                message: format!("expected {} words, received {}", len, words.len()),
            }),
            Packet::Values(_) => Err(ComputeError::ProtocolMismatch {
                rank,
                message: "expected integer payload, received floating-point".into(),
            }),
        }
    }

    fn check_counts(&self, counts: &[usize]) -> Result<(), ComputeError> {
        if counts.len() != self.size {
            return Err(ComputeError::ProtocolMismatch {
                rank: self.rank,
                message: format!("{} counts for a group of {}", counts.len(), self.size),
            });
        }
        Ok(())
    }

    fn others(&self) -> std::ops::Range<usize> {
        1..self.size
    }
}

impl Communicator for LocalCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn broadcast_u64(&self, buf: &mut [u64]) -> Result<(), ComputeError> {
        if self.is_root() {
            for rank in self.others() {
                self.send_to(rank, Packet::Words(buf.to_vec()))?;
            }
        } else {
            let words = self.recv_words(ROOT, buf.len())?;
            buf.copy_from_slice(&words);
        }
        Ok(())
    }

    fn broadcast_f64(&self, buf: &mut [f64]) -> Result<(), ComputeError> {
        if self.is_root() {
            for rank in self.others() {
                self.send_to(rank, Packet::Values(buf.to_vec()))?;
            }
        } else {
            let values = self.recv_values(ROOT, buf.len())?;
            buf.copy_from_slice(&values);
        }
        Ok(())
    }

    fn scatter_f64(
        &self,
        send: Option<&[f64]>,
        counts: &[usize],
        recv: &mut [f64],
    ) -> Result<(), ComputeError> {
        self.check_counts(counts)?;
        if recv.len() != counts[self.rank] {
            return Err(ComputeError::ProtocolMismatch {
                rank: self.rank,
                message: format!("receive buffer of {} for {} values", recv.len(), counts[self.rank]),
            });
        }

        if self.is_root() {
            let send = send.ok_or_else(|| ComputeError::ProtocolMismatch {
                rank: ROOT,
                message: "root must supply the scatter source".into(),
            })?;
            let total: usize = counts.iter().sum();
            if send.len() != total {
                return Err(ComputeError::ProtocolMismatch {
                    rank: ROOT,
                    message: format!("scatter source of {} for {} values", send.len(), total),
                });
            }
            let offsets = displacements(counts);
            for rank in self.others() {
                let segment = &send[offsets[rank]..offsets[rank] + counts[rank]];
                self.send_to(rank, Packet::Values(segment.to_vec()))?;
            }
            recv.copy_from_slice(&send[..counts[ROOT]]);
        } else {
            let values = self.recv_values(ROOT, recv.len())?;
            recv.copy_from_slice(&values);
        }
        Ok(())
    }

    fn gather_f64(
        &self,
        send: &[f64],
        counts: &[usize],
        recv: Option<&mut [f64]>,
    ) -> Result<(), ComputeError> {
        self.check_counts(counts)?;

        if !self.is_root() {
            return self.send_to(ROOT, Packet::Values(send.to_vec()));
        }

        let recv = recv.ok_or_else(|| ComputeError::ProtocolMismatch {
            rank: ROOT,
            message: "root must supply the gather destination".into(),
        })?;
        let total: usize = counts.iter().sum();
        if recv.len() != total || send.len() != counts[ROOT] {
            return Err(ComputeError::ProtocolMismatch {
                rank: ROOT,
                message: format!(
                    "gather of {} values into {} (own segment {})",
                    total,
                    recv.len(),
                    send.len()
                ),
            });
        }

        let offsets = displacements(counts);
        recv[..counts[ROOT]].copy_from_slice(send);
        for rank in self.others() {
            let values = self.recv_values(rank, counts[rank])?;
            recv[offsets[rank]..offsets[rank] + counts[rank]].copy_from_slice(&values);
        }
        Ok(())
    }

    fn all_reduce_f64(&self, local: f64, op: ReduceOp) -> Result<f64, ComputeError> {
        if !self.is_root() {
            self.send_to(ROOT, Packet::Values(vec![local]))?;
            return Ok(self.recv_values(ROOT, 1)?[0]);
        }

        let mut total = local;
        for rank in self.others() {
            total = op.apply(total, self.recv_values(rank, 1)?[0]);
        }
        for rank in self.others() {
            self.send_to(rank, Packet::Values(vec![total]))?;
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    /// Run `body` once per unit of a `size`-unit group and collect the results
    /// in rank order.
    fn on_group<T, F>(size: usize, body: F) -> Vec<Result<T, ComputeError>>
    where
        T: Send,
        F: Fn(&LocalCommunicator) -> Result<T, ComputeError> + Sync,
    {
        thread::scope(|scope| {
            let handles: Vec<_> = LocalCommunicator::group(size)
                .into_iter()
                .map(|comm| {
                    let body = &body;
                    scope.spawn(move || body(&comm))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        })
    }

    #[test]
    fn test_broadcast_reaches_every_unit() {
        let results = on_group(4, |comm| {
            let mut header: [u64; 2] = if comm.is_root() { [7, 11] } else { [0, 0] };
            comm.broadcast_u64(&mut header)?;
            let mut values = if comm.is_root() { vec![1.5, -2.0] } else { vec![0.0; 2] };
            comm.broadcast_f64(&mut values)?;
            Ok((header, values))
        });
        for result in results {
            let (header, values) = result.unwrap();
            assert_eq!(header, [7, 11]);
            assert_eq!(values, vec![1.5, -2.0]);
        }
    }

    #[test]
    fn test_scatter_then_all_gather_round_trips() {
        let counts = [3, 2, 2];
        let global: Vec<f64> = (0..7).map(f64::from).collect();
        let results = on_group(3, |comm| {
            let mut local = vec![0.0; counts[comm.rank()]];
            let source = comm.is_root().then_some(global.as_slice());
            comm.scatter_f64(source, &counts, &mut local)?;
            let mine = local.clone();
            for v in local.iter_mut() {
                *v *= 10.0;
            }
            let mut everything = vec![0.0; 7];
            comm.all_gather_f64(&local, &counts, &mut everything)?;
            Ok((mine, everything))
        });

        assert_eq!(results[0].as_ref().unwrap().0, vec![0.0, 1.0, 2.0]);
        assert_eq!(results[2].as_ref().unwrap().0, vec![5.0, 6.0]);
        for result in &results {
            let expected: Vec<f64> = (0..7).map(|i| f64::from(i) * 10.0).collect();
            assert_eq!(result.as_ref().unwrap().1, expected);
        }
    }

    #[test]
    fn test_all_reduce_is_identical_everywhere() {
        let results = on_group(5, |comm| {
            let local = comm.rank() as f64 + 0.5;
            Ok((
                comm.all_reduce_f64(local, ReduceOp::Sum)?,
                comm.all_reduce_f64(local, ReduceOp::Max)?,
            ))
        });
        for result in results {
            assert_eq!(result.unwrap(), (12.5, 4.5));
        }
    }

    #[test]
    fn test_single_unit_group_is_self_contained() {
        let mut group = LocalCommunicator::group(1);
        let comm = group.pop().unwrap();
        let mut buf = [3.0];
        comm.broadcast_f64(&mut buf).unwrap();
        let mut out = [0.0];
        comm.all_gather_f64(&buf, &[1], &mut out).unwrap();
        assert_eq!(out, [3.0]);
        assert_eq!(comm.all_reduce_f64(2.0, ReduceOp::Sum).unwrap(), 2.0);
    }

    #[test]
    fn test_departed_unit_is_reported_not_hung() {
        let results = on_group(3, |comm| {
            if comm.rank() == 2 {
                // leaves without joining the collective
                return Ok(0.0);
            }
            comm.all_reduce_f64(1.0, ReduceOp::Sum)
        });
        assert!(matches!(
            results[0],
            Err(ComputeError::Disconnected { rank: 2 })
        ));
        assert!(matches!(
            results[1],
            Err(ComputeError::Disconnected { rank: ROOT })
        ));
    }

    #[test]
    fn test_mismatched_payload_is_detected() {
        let results = on_group(2, |comm| {
            if comm.is_root() {
                comm.broadcast_u64(&mut [1, 2, 3])
            } else {
                comm.broadcast_f64(&mut [0.0; 3])
            }
        });
        assert!(results[0].is_ok());
        assert!(matches!(
            results[1],
            Err(ComputeError::ProtocolMismatch { rank: ROOT, .. })
        ));
    }
}
