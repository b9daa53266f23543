use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener};
use std::sync::Arc;
use std::thread;

use clap::Parser;
use log::{info, LevelFilter};
use patchsync::box_container::PatchBox;
use patchsync::config::{HierarchyConfig, ScheduleConfig};
use patchsync::hierarchy::PatchHierarchy;
use patchsync::identifiers::{BoxId, LocalId};
use patchsync::index_space::{IndexSpace, IntVector};
use patchsync::message::{Communicator, LocalCommunicator, TcpCommunicator};
use patchsync::node_sum::PatchBoundaryNodeSum;
use patchsync::overlap::Centering;
use patchsync::variable::Variable;
use patchsync::Error;
use simple_logger::SimpleLogger;

/// Sum the node values shared between patches, with one patch per rank and
/// every rank running on its own thread. Patch `r` starts with every node
/// set to `r + 1`, so a node shared by patches `r` and `r + 1` ends up as
/// `2r + 3`.
#[derive(Debug, Parser)]
#[clap(version = "0.1.0")]
struct Opts {
    #[clap(short = 'n', long, default_value = "4")]
    num_ranks: usize,

    #[clap(short = 'z', long, default_value = "8")]
    zones_per_patch: i64,

    /// Connect the ranks over TCP on localhost rather than channels
    #[clap(long)]
    tcp: bool,

    /// Make the x axis periodic
    #[clap(long)]
    periodic: bool,

    /// Hierarchy settings (CBOR); the domain is replaced by the patch layout
    #[clap(long)]
    config: Option<String>,

    /// Schedule settings (CBOR); the tag buffer widens the level connector
    #[clap(long)]
    schedule_config: Option<String>,

    /// Log schedule and connector construction
    #[clap(short, long)]
    verbose: bool,
}

fn run<C: Communicator>(comm: &C, config: &HierarchyConfig, schedule: &ScheduleConfig, zones: i64) -> Result<Vec<f64>, Error> {
    let rank = comm.rank();
    let mut hierarchy = PatchHierarchy::new(config, rank)?;
    hierarchy.register_connector_width_requestor(Arc::new(schedule.tag_buffer_requestor()))?;
    let u = hierarchy.register_component("u", Arc::new(Variable::new("u", Centering::Node, 1)), IntVector::zero(hierarchy.dim()))?;

    let mut sum = PatchBoundaryNodeSum::new("boundary_sum");
    sum.register_sum(&mut hierarchy, u)?;

    let boxes = (0..comm.size())
        .map(|r| {
            let space = IndexSpace::from_ranges(&[r as i64 * zones..(r as i64 + 1) * zones, 0..zones])?;
            Ok(PatchBox::new(space, r, LocalId::new(0)))
        })
        .collect::<Result<Vec<_>, Error>>()?;
    hierarchy.make_level(0, boxes)?;

    let level = hierarchy.level_mut(0)?;
    level.allocate(&std::iter::once(u).collect())?;
    for patch in level.patches_mut() {
        patch.data_mut(u)?.fill_all(rank as f64 + 1.0);
    }
    sum.setup_sum(&hierarchy, 0)?;
    sum.compute_sum(comm, hierarchy.level_mut(0)?)?;

    let patch = hierarchy.level(0)?.patch(&BoxId::new(rank, LocalId::new(0)))?;
    let nodes = patch.data(u)?.array(0);
    let lower = rank as i64 * zones;

    [lower, lower + zones / 2, lower + zones]
        .iter()
        .map(|&i| Ok(nodes.get(&IntVector::from_slice(&[i, zones / 2])?, 0)))
        .collect()
}

fn spawn_ranks<C>(comms: Vec<C>, config: HierarchyConfig, schedule: ScheduleConfig, zones: i64) -> Vec<thread::JoinHandle<Result<Vec<f64>, Error>>>
where
    C: Communicator + Send + 'static,
{
    comms
        .into_iter()
        .map(|comm| {
            let config = config.clone();
            let schedule = schedule.clone();
            thread::spawn(move || run(&comm, &config, &schedule, zones))
        })
        .collect()
}

fn main() -> Result<(), Error> {
    let opts = Opts::parse();
    let level = if opts.verbose { LevelFilter::Debug } else { LevelFilter::Info };
    SimpleLogger::new().with_level(level).init().unwrap();
    info!("{:?}", opts);

    let mut config = match &opts.config {
        Some(path) => HierarchyConfig::load(path)?,
        None => HierarchyConfig::default(),
    };
    config.dim = 2;
    config.max_levels = 1;
    config.domain_lower = vec![0, 0];
    config.domain_upper = vec![opts.num_ranks as i64 * opts.zones_per_patch, opts.zones_per_patch];
    config.periodic = vec![opts.periodic, false];
    config.validate()?;

    let schedule = match &opts.schedule_config {
        Some(path) => ScheduleConfig::load(path)?,
        None => ScheduleConfig::default(),
    };

    let handles = if opts.tcp {
        let listeners = (0..opts.num_ranks)
            .map(|_| TcpListener::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)))
            .collect::<Result<Vec<_>, _>>()?;
        let peers = listeners
            .iter()
            .map(TcpListener::local_addr)
            .collect::<Result<Vec<_>, _>>()?;
        let comms = listeners
            .into_iter()
            .enumerate()
            .map(|(rank, listener)| TcpCommunicator::from_listener(rank, listener, peers.clone()))
            .collect::<Result<Vec<_>, _>>()?;
        spawn_ranks(comms, config, schedule, opts.zones_per_patch)
    } else {
        spawn_ranks(LocalCommunicator::group(opts.num_ranks), config, schedule, opts.zones_per_patch)
    };

    for (rank, handle) in handles.into_iter().enumerate() {
        let values = handle.join().unwrap()?;
        println!("rank {}: left {} middle {} right {}", rank, values[0], values[1], values[2]);
    }
    Ok(())
}
