use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender};

use super::comm::Communicator;
use crate::error::Error;

/// A communicator for a group of threads in one process, one per rank.
/// Messages go over unbounded channels, so `send` never blocks.
///
pub struct LocalCommunicator {
    rank: usize,
    peers: Vec<Sender<Vec<u8>>>,
    inbox: Receiver<Vec<u8>>,
    round: AtomicU64,
}

impl LocalCommunicator {
    /// Create the communicators of a group of the given size. Element `r` of
    /// the result is meant to be moved to the thread acting as rank `r`.
    pub fn group(size: usize) -> Vec<Self> {
        let (peers, inboxes): (Vec<_>, Vec<_>) = (0..size).map(|_| crossbeam_channel::unbounded()).unzip();

        inboxes
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| Self {
                rank,
                peers: peers.clone(),
                inbox,
                round: AtomicU64::new(0),
            })
            .collect()
    }
}

impl Communicator for LocalCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.peers.len()
    }

    fn send(&self, rank: usize, message: Vec<u8>) -> Result<(), Error> {
        self.peers
            .get(rank)
            .ok_or_else(|| Error::Communication(format!("no rank {} in a group of {}", rank, self.peers.len())))?
            .send(message)
            .map_err(|_| Error::Communication(format!("rank {} has hung up", rank)))
    }

    fn recv(&self) -> Result<Vec<u8>, Error> {
        self.inbox
            .recv()
            .map_err(|_| Error::Communication("every peer has hung up".to_string()))
    }

    fn requeue_recv(&self, message: Vec<u8>) -> Result<(), Error> {
        self.send(self.rank, message)
    }

    fn next_round(&self) -> u64 {
        self.round.fetch_add(1, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn messages_reach_their_destination() {
        let group = LocalCommunicator::group(3);
        group[0].send(2, vec![1, 2, 3]).unwrap();
        group[1].send(2, vec![4]).unwrap();
        let mut received = vec![group[2].recv().unwrap(), group[2].recv().unwrap()];
        received.sort();
        assert_eq!(received, vec![vec![1, 2, 3], vec![4]]);
        assert!(group[0].send(3, vec![]).is_err());
    }

    #[test]
    fn requeued_messages_come_back() {
        let group = LocalCommunicator::group(1);
        group[0].requeue_recv(vec![7]).unwrap();
        assert_eq!(group[0].recv().unwrap(), vec![7]);
        assert_eq!(group[0].next_round(), 0);
        assert_eq!(group[0].next_round(), 1);
    }

    #[test]
    fn group_works_across_threads() {
        let handles: Vec<_> = LocalCommunicator::group(4)
            .into_iter()
            .map(|comm| std::thread::spawn(move || {
                let next = (comm.rank() + 1) % comm.size();
                comm.send(next, vec![comm.rank() as u8]).unwrap();
                comm.recv().unwrap()[0] as usize
            }))
            .collect();
        let received: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(received, vec![3, 0, 1, 2]);
    }
}
