//! Execution of one communication round over a batch of transactions, and
//! construction of that batch from a connector.
//!
//! A round first packs and sends everything other ranks need, then packs
//! the transactions local to this rank, then waits for every expected
//! message. Only after all values are in hand are they combined into the
//! destination, in a fixed order (by destination box, source box, item),
//! so the result never depends on message arrival order.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::box_container::PatchBox;
use crate::connector::{periodic_images, Connector, Neighbor};
use crate::error::Error;
use crate::identifiers::{BoxId, PeriodicId};
use crate::index_space::{IndexSpace, IntVector};
use crate::message::Communicator;
use crate::overlap::Transformation;
use crate::patch_level::PatchLevel;
use crate::transaction::{RefineItem, Transaction, TransactionFactory};
use crate::variable::ComponentSelector;




type Key = (BoxId, BoxId, usize);




#[derive(Serialize, Deserialize)]
struct Block {
    dst: BoxId,
    src: BoxId,
    item: usize,
    values: Vec<f64>,
}




#[derive(Serialize, Deserialize)]
struct Envelope {
    round: u64,
    source: usize,
    blocks: Vec<Block>,
}




/**
 * The transactions of one communication round, as seen by one rank.
 */
pub struct Schedule {
    rank: usize,
    factory: Arc<dyn TransactionFactory>,
    scratch: ComponentSelector,
    fill_time: f64,
    local: BTreeMap<Key, Transaction>,
    outgoing: BTreeMap<usize, BTreeMap<Key, Transaction>>,
    incoming: BTreeMap<Key, Transaction>,
}




// ============================================================================
impl Schedule {
    /**
     * Create an empty schedule for `rank`. Before values are combined, the
     * factory prepares the `scratch` components of the destination level.
     */
    pub fn new(rank: usize, factory: Arc<dyn TransactionFactory>, scratch: ComponentSelector) -> Self {
        Self {
            rank,
            factory,
            scratch,
            fill_time: 0.0,
            local: BTreeMap::new(),
            outgoing: BTreeMap::new(),
            incoming: BTreeMap::new(),
        }
    }


    /**
     * Classify a transaction as local, outgoing, or incoming. Transactions
     * not involving this rank are dropped.
     */
    pub fn add_transaction(&mut self, transaction: Transaction) {
        let key = transaction.key();
        let src = transaction.source_rank();
        let dst = transaction.destination_rank();

        let previous = if src == self.rank && dst == self.rank {
            self.local.insert(key, transaction)
        } else if src == self.rank {
            self.outgoing.entry(dst).or_default().insert(key, transaction)
        } else if dst == self.rank {
            self.incoming.insert(key, transaction)
        } else {
            debug!("rank {} dropping transaction {} <- {}", self.rank, key.0, key.1);
            None
        };
        if previous.is_some() {
            warn!("transaction {} <- {} (item {}) was added twice", key.0, key.1, key.2);
        }
    }


    pub fn num_local(&self) -> usize {
        self.local.len()
    }


    pub fn num_outgoing(&self) -> usize {
        self.outgoing.values().map(BTreeMap::len).sum()
    }


    pub fn num_incoming(&self) -> usize {
        self.incoming.len()
    }


    /**
     * Set the simulation time the round fills data at; used by time
     * interpolating transactions and by scratch preparation.
     */
    pub fn set_fill_time(&mut self, time: f64) {
        self.fill_time = time;

        for t in self.transactions_mut() {
            t.set_fill_time(time)
        }
    }


    fn transactions_mut(&mut self) -> impl Iterator<Item = &mut Transaction> {
        self.local
            .values_mut()
            .chain(self.incoming.values_mut())
            .chain(self.outgoing.values_mut().flat_map(BTreeMap::values_mut))
    }


    /**
     * Run the round for transactions whose source and destination are on
     * the same level.
     */
    pub fn execute<C: Communicator + ?Sized>(&self, comm: &C, level: &mut PatchLevel) -> Result<(), Error> {
        self.run(comm, level, None)
    }


    /**
     * Run the round from a source level into a different destination level.
     */
    pub fn execute_between<C: Communicator + ?Sized>(&self, comm: &C, dst: &mut PatchLevel, src: &PatchLevel) -> Result<(), Error> {
        self.run(comm, dst, Some(src))
    }


    fn run<C: Communicator + ?Sized>(&self, comm: &C, dst: &mut PatchLevel, src: Option<&PatchLevel>) -> Result<(), Error> {
        let round = comm.next_round();

        for (&peer, transactions) in &self.outgoing {
            let mut blocks = Vec::with_capacity(transactions.len());

            for (key, t) in transactions {
                let mut values = Vec::with_capacity(t.message_size());
                t.pack_stream(src.unwrap_or(&*dst), &mut values)?;
                blocks.push(Block { dst: key.0, src: key.1, item: key.2, values });
            }
            let envelope = Envelope { round, source: self.rank, blocks };
            comm.send(peer, rmp_serde::to_vec(&envelope)?)?;
        }

        let mut streams: BTreeMap<Key, Vec<f64>> = BTreeMap::new();

        for (key, t) in &self.local {
            let mut values = Vec::with_capacity(t.message_size());
            t.pack_stream(src.unwrap_or(&*dst), &mut values)?;
            streams.insert(*key, values);
        }

        self.receive(comm, round, &mut streams)?;
        self.factory.preprocess_scratch_space(dst, self.fill_time, &self.scratch)?;

        for (key, values) in &streams {
            let t = self
                .local
                .get(key)
                .or_else(|| self.incoming.get(key))
                .ok_or_else(|| Error::Communication(format!("no transaction {} <- {}", key.0, key.1)))?;
            t.unpack_stream(dst, values)?;
        }
        Ok(())
    }


    fn receive<C: Communicator + ?Sized>(&self, comm: &C, round: u64, streams: &mut BTreeMap<Key, Vec<f64>>) -> Result<(), Error> {
        let mut waiting: BTreeSet<usize> = self.incoming.values().map(Transaction::source_rank).collect();
        let mut deferred = Vec::new();

        while !waiting.is_empty() {
            let bytes = comm.recv()?;
            let envelope: Envelope = rmp_serde::from_slice(&bytes)?;

            if envelope.round > round {
                deferred.push(bytes);
                continue;
            }
            if envelope.round < round || !waiting.remove(&envelope.source) {
                return Err(Error::Communication(format!(
                    "rank {} got an unexpected message from rank {} (round {}, expecting round {})",
                    self.rank,
                    envelope.source,
                    envelope.round,
                    round)));
            }
            for block in envelope.blocks {
                let key = (block.dst, block.src, block.item);

                match self.incoming.get(&key) {
                    Some(t) if t.message_size() == block.values.len() => {
                        streams.insert(key, block.values);
                    }
                    _ => {
                        return Err(Error::Communication(format!(
                            "rank {} got an unexpected transaction {} <- {} from rank {}",
                            self.rank,
                            key.0,
                            key.1,
                            envelope.source)))
                    }
                }
            }
        }
        for bytes in deferred {
            comm.requeue_recv(bytes)?
        }

        if streams.len() != self.local.len() + self.incoming.len() {
            return Err(Error::Communication(format!(
                "rank {} is missing {} incoming transactions",
                self.rank,
                self.local.len() + self.incoming.len() - streams.len())));
        }
        Ok(())
    }
}




/**
 * Builds the schedule moving a list of items from a source level into a
 * destination level at the same resolution.
 */
pub struct ScheduleBuilder<'a> {
    dst_level: &'a PatchLevel,
    src_level: &'a PatchLevel,
    items: Arc<Vec<RefineItem>>,
    factory: Arc<dyn TransactionFactory>,
    scratch: ComponentSelector,
    fill_box: Option<IndexSpace>,
    overwrite_interior: bool,
    use_time_interpolation: bool,
    include_self: bool,
}




// ============================================================================
impl<'a> ScheduleBuilder<'a> {
    pub fn new(
        dst_level: &'a PatchLevel,
        src_level: &'a PatchLevel,
        items: Vec<RefineItem>,
        factory: Arc<dyn TransactionFactory>,
    ) -> Self {
        Self {
            dst_level,
            src_level,
            items: Arc::new(items),
            factory,
            scratch: ComponentSelector::new(),
            fill_box: None,
            overwrite_interior: false,
            use_time_interpolation: false,
            include_self: false,
        }
    }


    /**
     * A schedule within one level. Every patch is also paired with
     * itself, which matters when the source and destination components
     * differ.
     */
    pub fn same_level(level: &'a PatchLevel, items: Vec<RefineItem>, factory: Arc<dyn TransactionFactory>) -> Self {
        Self { include_self: true, ..Self::new(level, level, items, factory) }
    }


    /**
     * Components the factory prepares on the destination before values
     * are combined.
     */
    pub fn scratch_components(self, scratch: ComponentSelector) -> Self {
        Self { scratch, ..self }
    }


    /**
     * Restrict the filled region (destination cells); the default is the
     * destination level's full box.
     */
    pub fn fill_box(self, fill_box: IndexSpace) -> Self {
        Self { fill_box: Some(fill_box), ..self }
    }


    /**
     * Whether destination interiors are filled too, not just ghosts.
     */
    pub fn overwrite_interior(self, overwrite_interior: bool) -> Self {
        Self { overwrite_interior, ..self }
    }


    pub fn time_interpolation(self, use_time_interpolation: bool) -> Self {
        Self { use_time_interpolation, ..self }
    }


    /**
     * Create the transactions for every pair of nearby boxes where this
     * rank owns the destination (found with `dst_to_src`) or the source
     * (found with `src_to_dst`).
     */
    pub fn build(self, dst_to_src: &Connector, src_to_dst: &Connector) -> Result<Schedule, Error> {
        let dst = self.dst_level;
        let src = self.src_level;
        let rank = dst.rank();

        dst_to_src.check_current(dst, src)?;
        src_to_dst.check_current(src, dst)?;

        if dst.ratio_to_level_zero() != src.ratio_to_level_zero() {
            return Err(Error::Config(format!(
                "cannot copy between level {} and level {} of different resolution",
                dst.level_number(),
                src.level_number())));
        }
        if dst_to_src.width() != src_to_dst.width() {
            return Err(Error::MissingConnector { base: src.level_number(), head: dst.level_number() })
        }
        let ghosts = dst.descriptor().max_ghost_width();
        if !dst_to_src.covers(&ghosts)? {
            warn!(
                "connector width {:?} is narrower than the ghost width {:?}",
                dst_to_src.width().as_slice(),
                ghosts.as_slice());
        }

        let fill_box = self.fill_box.unwrap_or_else(|| dst.full_box());
        let mut schedule = Schedule::new(rank, Arc::clone(&self.factory), self.scratch.clone());

        for d in dst.local_boxes() {
            if self.include_self {
                self.add_pair(&mut schedule, d, d, &IntVector::zero(dst.dim()), &fill_box)?;
            }
            for n in dst_to_src.neighbors(&d.id()) {
                self.add_neighbor(&mut schedule, d, n, &fill_box)?;
            }
        }

        let images = periodic_images(src.periodic_shift(), src.dim());

        for s in src.local_boxes() {
            for m in src_to_dst.neighbors(&s.id()) {
                if m.owner() == rank {
                    continue;
                }
                let d = dst.find_box(&m.id().real()).ok_or_else(|| Error::MissingPatch(m.id().to_string()))?;
                let shift = -m.shift;
                let periodic_id = images
                    .iter()
                    .find(|(_, offset)| *offset == shift)
                    .map(|(id, _)| *id)
                    .unwrap_or(PeriodicId::ZERO);
                let image = PatchBox::with_id(s.space().shift(&shift)?, s.id().with_periodic_id(periodic_id), s.block());
                self.add_pair(&mut schedule, d, &image, &shift, &fill_box)?;
            }
        }

        debug!(
            "rank {} schedule: {} local, {} outgoing, {} incoming transactions",
            rank,
            schedule.num_local(),
            schedule.num_outgoing(),
            schedule.num_incoming());
        Ok(schedule)
    }


    fn add_neighbor(&self, schedule: &mut Schedule, d: &PatchBox, n: &Neighbor, fill_box: &IndexSpace) -> Result<(), Error> {
        self.add_pair(schedule, d, &n.patch_box, &n.shift, fill_box)
    }


    /**
     * Add the transactions from `image` (a source box, possibly a periodic
     * image shifted by `shift` from the real box) into `d`.
     */
    fn add_pair(&self, schedule: &mut Schedule, d: &PatchBox, image: &PatchBox, shift: &IntVector, fill_box: &IndexSpace) -> Result<(), Error> {
        let real = self
            .src_level
            .find_box(&image.id().real())
            .ok_or_else(|| Error::MissingPatch(image.id().to_string()))?;
        let transformation = Transformation::shift(*shift);

        for (item_id, item) in self.items.iter().enumerate() {
            let dst_geometry = self.dst_level.descriptor().geometry(item.dst, d.space())?;
            let src_geometry = self.src_level.descriptor().geometry(item.src, real.space())?;
            let overlap = dst_geometry.calculate_overlap(
                &src_geometry,
                real.space(),
                fill_box,
                self.overwrite_interior,
                &transformation)?;

            if overlap.is_empty() {
                continue;
            }
            let transaction = self.factory.allocate(
                self.dst_level,
                self.src_level,
                &overlap,
                d,
                image,
                &self.items,
                item_id,
                fill_box,
                self.use_time_interpolation)?;
            schedule.add_transaction(transaction);
        }
        Ok(())
    }
}
