use crate::error::Error;

/// Interface for a group of processes that can exchange messages. The
/// underlying transport can in principle be TCP, in-process channels, or a
/// higher level abstraction like MPI.
///
pub trait Communicator {
    /// Must be implemented to return the rank of this process within the
    /// communicator.
    fn rank(&self) -> usize;

    /// Must be implemented to return the number of peer processes in this
    /// communicator.
    fn size(&self) -> usize;

    /// Must be implemented to send a message to a peer. This method must
    /// return immediately, in other words it is not allowed to block until a
    /// matching receive is posted.
    fn send(&self, rank: usize, message: Vec<u8>) -> Result<(), Error>;

    /// Must be implemented to receive a message from any of the peers. This
    /// method is allowed to block until a message is ready to be received.
    fn recv(&self) -> Result<Vec<u8>, Error>;

    /// Put a received message back, to be returned again by a later `recv`.
    fn requeue_recv(&self, message: Vec<u8>) -> Result<(), Error>;

    /// Must be implemented to return a new number on each call, starting
    /// from zero. Every rank calls it once per collective operation, in the
    /// same order, so equal numbers identify the same operation.
    fn next_round(&self) -> u64;
}
