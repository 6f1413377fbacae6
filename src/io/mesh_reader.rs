//! Element and node readers with partitioning.
//!
//! [`MeshReader::read_and_partition`] distributes the mesh of every
//! registered discretization over the reader's communicator:
//!
//! 1. each rank parses its contiguous block of every element section and of
//!    the node section, and keeps those lines;
//! 2. block connectivity and node gids go to the planning rank (rank 0),
//!    the only rank that ever holds the global element list;
//! 3. the planning rank checks the mesh, partitions the element dual graph
//!    and scatters one routing plan per rank;
//! 4. every rank sends its block lines and nodes straight to the ranks
//!    keeping them (owner plus one ghost layer) in one pairwise exchange.
//!
//! Apart from the planning rank, memory per rank stays proportional to its
//! block plus its column mesh. Errors found by one rank are agreed on before
//! the next collective, so all ranks leave with an error together.

use crate::algs::collective::{
    all_gather, broadcast_string, exchange_bytes, gather_bytes, scatter_bytes,
};
use crate::algs::communicator::Communicator;
use crate::algs::dual_graph::build_dual;
use crate::algs::wire::{WireI64, cast_slice, cast_slice_from};
use crate::deck_error::DeckError;
use crate::discretization::Discretization;
use crate::discretization::cell_shape::CellShape;
use crate::discretization::node::Node;
use crate::discretization::registry::ElementRegistry;
use crate::io::key_value::read_key_value;
use crate::io::line_definition::LineDefinition;
use crate::io::reader::DeckReader;
use crate::partitioning::{PartitionerConfig, partition};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

/// Rank that receives the block connectivity and plans the distribution.
const PLANNER: usize = 0;

/// Default name of the node section.
pub const NODE_SECTION: &str = "NODE COORDS";

/// Elements of one section going into one discretization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElementReader {
    pub dis: String,
    pub section: String,
    /// Only lines of these element types are taken; `None` takes all.
    pub element_types: Option<BTreeSet<String>>,
}

impl ElementReader {
    pub fn new(dis: impl Into<String>, section: impl Into<String>) -> Self {
        Self {
            dis: dis.into(),
            section: section.into(),
            element_types: None,
        }
    }

    pub fn with_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.element_types = Some(types.into_iter().map(Into::into).collect());
        self
    }

    fn accepts(&self, line: &str) -> bool {
        match &self.element_types {
            None => true,
            Some(types) => ElementRegistry::element_type_of(line).is_some_and(|t| types.contains(t)),
        }
    }
}

/// A structured box mesh generated from the parameters of `section`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DomainReader {
    pub dis: String,
    pub section: String,
}

impl DomainReader {
    pub fn new(dis: impl Into<String>, section: impl Into<String>) -> Self {
        Self {
            dis: dis.into(),
            section: section.into(),
        }
    }
}

/// Knobs of the mesh distribution.
#[derive(Clone, Debug)]
pub struct MeshPartitioningConfig {
    pub rng_seed: u64,
    pub imbalance_tol: f64,
    pub refine_sweeps: usize,
}

impl Default for MeshPartitioningConfig {
    fn default() -> Self {
        let p = PartitionerConfig::default();
        Self {
            rng_seed: p.rng_seed,
            imbalance_tol: p.imbalance_tol,
            refine_sweeps: p.max_iters,
        }
    }
}

/// Lines `[rank*n/size, (rank+1)*n/size)` of an `n`-line section.
pub fn block_range(n: usize, rank: usize, size: usize) -> Range<usize> {
    let size = size.max(1);
    (rank * n / size)..((rank + 1) * n / size)
}

/// Parameters of a `--<FIELD> DOMAIN` section.
#[derive(Clone, Debug, PartialEq)]
pub struct BoxDomain {
    pub lower: [f64; 3],
    pub upper: [f64; 3],
    pub intervals: [usize; 3],
    pub element_type: String,
    pub shape: CellShape,
    /// Named components after the node list, e.g. `MAT 1 KINEM nonlinear`.
    pub tail: String,
}

impl BoxDomain {
    pub fn read<C: Communicator>(reader: &DeckReader<C>, section: &str) -> Result<Self, DeckError> {
        let mut keys = BTreeMap::new();
        for line in reader.lines_in_section(section) {
            let (k, v) = read_key_value(&line?)?;
            keys.insert(k, v);
        }
        if keys.is_empty() {
            return Err(DeckError::MissingSection(section.to_string()));
        }
        let get = |key: &str| {
            keys.get(key).ok_or_else(|| DeckError::InvalidParameter {
                key: key.to_string(),
                value: "<missing>".into(),
                expected: "box domain parameter",
            })
        };
        let triple = |key: &'static str, expected: &'static str| -> Result<Vec<String>, DeckError> {
            let v = get(key)?;
            let parts: Vec<String> = v.split_whitespace().map(str::to_string).collect();
            if parts.len() != 3 {
                return Err(DeckError::InvalidParameter {
                    key: key.into(),
                    value: v.clone(),
                    expected,
                });
            }
            Ok(parts)
        };
        let floats = |key: &'static str| -> Result<[f64; 3], DeckError> {
            let parts = triple(key, "three numbers")?;
            let mut out = [0.0; 3];
            for (o, p) in out.iter_mut().zip(&parts) {
                *o = p.parse().map_err(|_| DeckError::InvalidParameter {
                    key: key.into(),
                    value: parts.join(" "),
                    expected: "three numbers",
                })?;
            }
            Ok(out)
        };
        let lower = floats("LOWER_BOUND")?;
        let upper = floats("UPPER_BOUND")?;
        let parts = triple("INTERVALS", "three non-negative integers")?;
        let mut intervals = [0usize; 3];
        for (o, p) in intervals.iter_mut().zip(&parts) {
            *o = p.parse().map_err(|_| DeckError::InvalidParameter {
                key: "INTERVALS".into(),
                value: parts.join(" "),
                expected: "three non-negative integers",
            })?;
        }
        let elements = get("ELEMENTS")?;
        let mut toks = elements.split_whitespace();
        let (Some(element_type), Some(shape)) = (toks.next(), toks.next()) else {
            return Err(DeckError::InvalidParameter {
                key: "ELEMENTS".into(),
                value: elements.clone(),
                expected: "<TYPE> <SHAPE> <element options>",
            });
        };
        let shape: CellShape = shape.parse()?;
        let dims = match shape {
            CellShape::Hex8 => 3,
            CellShape::Quad4 => 2,
            other => {
                return Err(DeckError::UnsupportedCombination(format!(
                    "box domains are meshed with HEX8 or QUAD4, not {other}"
                )));
            }
        };
        if intervals[..dims].contains(&0) {
            return Err(DeckError::InvalidParameter {
                key: "INTERVALS".into(),
                value: parts.join(" "),
                expected: "positive interval counts",
            });
        }
        Ok(Self {
            lower,
            upper,
            intervals,
            element_type: element_type.to_string(),
            shape,
            tail: toks.join(" "),
        })
    }

    fn dims(&self) -> usize {
        if self.shape == CellShape::Hex8 { 3 } else { 2 }
    }

    /// Node points per direction.
    fn node_counts(&self) -> [usize; 3] {
        let [nx, ny, nz] = self.intervals;
        [nx + 1, ny + 1, if self.dims() == 3 { nz + 1 } else { 1 }]
    }

    pub fn num_nodes(&self) -> usize {
        self.node_counts().iter().product()
    }

    pub fn num_elements(&self) -> usize {
        let [nx, ny, nz] = self.intervals;
        nx * ny * if self.dims() == 3 { nz } else { 1 }
    }

    fn node_gid(&self, first_node: i64, i: usize, j: usize, k: usize) -> i64 {
        let [cx, cy, _] = self.node_counts();
        first_node + (i + cx * (j + cy * k)) as i64
    }

    /// Generated node `gid`, numbered from `first_node` in x-fastest order.
    pub fn node(&self, first_node: i64, gid: i64) -> Option<Node> {
        let idx = usize::try_from(gid - first_node)
            .ok()
            .filter(|&i| i < self.num_nodes())?;
        let [cx, cy, cz] = self.node_counts();
        let coord = |d: usize, i: usize, points: usize| {
            if points <= 1 {
                self.lower[d]
            } else {
                self.lower[d] + (self.upper[d] - self.lower[d]) * i as f64 / (points - 1) as f64
            }
        };
        let (i, j, k) = (idx % cx, idx / cx % cy, idx / (cx * cy));
        Some(Node::new(gid, [coord(0, i, cx), coord(1, j, cy), coord(2, k, cz)]))
    }

    /// Node gids of the element at position `idx` of the box.
    pub fn element_nodes(&self, first_node: i64, idx: usize) -> Vec<i64> {
        let [nx, ny, _] = self.intervals;
        let (i, j, k) = (idx % nx, idx / nx % ny, idx / (nx * ny));
        let g = |i, j, k| self.node_gid(first_node, i, j, k);
        let mut conn = vec![g(i, j, k), g(i + 1, j, k), g(i + 1, j + 1, k), g(i, j + 1, k)];
        if self.dims() == 3 {
            conn.extend([g(i, j, k + 1), g(i + 1, j, k + 1), g(i + 1, j + 1, k + 1), g(i, j + 1, k + 1)]);
        }
        conn
    }

    /// Element line of generated element `gid`.
    pub fn element_line(&self, first_node: i64, first_element: i64, gid: i64) -> Option<String> {
        let idx = usize::try_from(gid - first_element)
            .ok()
            .filter(|&i| i < self.num_elements())?;
        Some(format!(
            "{gid} {} {} {} {}",
            self.element_type,
            self.shape,
            self.element_nodes(first_node, idx).iter().join(" "),
            self.tail
        ))
    }

    /// Nodes and element lines of the box. Node gids start at
    /// `first_node`, element gids at `first_element`.
    pub fn generate(&self, first_node: i64, first_element: i64) -> (Vec<Node>, Vec<String>) {
        let nodes = (0..self.num_nodes() as i64)
            .filter_map(|i| self.node(first_node, first_node + i))
            .collect();
        let lines = (0..self.num_elements() as i64)
            .filter_map(|i| self.element_line(first_node, first_element, first_element + i))
            .collect();
        (nodes, lines)
    }
}

/// Accepted element line of a rank's block.
#[derive(Clone, Debug)]
struct BlockElement {
    gid: i64,
    nodes: Vec<i64>,
    line: String,
}

/// What one rank parsed of the deck's mesh sections.
#[derive(Debug, Default)]
struct MeshBlock {
    /// Per element reader.
    elements: Vec<Vec<BlockElement>>,
    nodes: Vec<Node>,
}

impl MeshBlock {
    /// Per element reader the number of words and the `(gid, n, nodes...)`
    /// records, then the node gids.
    fn summary(&self) -> Vec<WireI64> {
        let mut flat = Vec::new();
        for elements in &self.elements {
            let records: Vec<WireI64> = elements
                .iter()
                .flat_map(|e| {
                    [WireI64::of(e.gid), WireI64::of(e.nodes.len() as i64)]
                        .into_iter()
                        .chain(e.nodes.iter().map(|&n| WireI64::of(n)))
                })
                .collect();
            flat.push(WireI64::of(records.len() as i64));
            flat.extend(records);
        }
        flat.extend(self.nodes.iter().map(|n| WireI64::of(n.gid)));
        flat
    }
}

/// Connectivity and node gids one rank sent to the planning rank.
#[derive(Debug, Default, PartialEq)]
struct BlockSummary {
    /// Per element reader, `(gid, node gids)` in block order.
    connectivity: Vec<Vec<(i64, Vec<i64>)>>,
    node_gids: Vec<i64>,
}

fn decode_summary(flat: &[WireI64], n_readers: usize) -> Result<BlockSummary, DeckError> {
    let truncated = || DeckError::comm(PLANNER, "truncated block summary");
    let mut summary = BlockSummary::default();
    let mut rest = flat;
    for _ in 0..n_readers {
        let (len, tail) = rest.split_first().ok_or_else(truncated)?;
        let len = usize::try_from(len.get()).map_err(|_| truncated())?;
        let mut connectivity = Vec::new();
        decode_connectivity(tail.get(..len).ok_or_else(truncated)?, &mut connectivity)?;
        summary.connectivity.push(connectivity);
        rest = &tail[len..];
    }
    summary.node_gids = rest.iter().map(WireI64::get).collect();
    Ok(summary)
}

/// Where a block element goes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct ElementRoute {
    reader: usize,
    gid: i64,
    owner: usize,
    dests: Vec<usize>,
}

/// Where a block node goes for one discretization.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct NodeRoute {
    dis: usize,
    gid: i64,
    owner: usize,
    dests: Vec<usize>,
}

/// Routing instructions for one rank.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
struct RankPlan {
    /// First node and element gid of every box domain.
    box_offsets: Vec<(i64, i64)>,
    element_routes: Vec<ElementRoute>,
    node_routes: Vec<NodeRoute>,
    /// Generated elements kept here: (domain, gid, owner).
    generated_elements: Vec<(usize, i64, usize)>,
    /// Generated nodes kept here: (domain, gid, owner).
    generated_nodes: Vec<(usize, i64, usize)>,
}

/// Output of the planning rank.
#[derive(Debug, Default)]
struct DistributionPlan {
    ranks: Vec<RankPlan>,
    elements_per_dis: Vec<usize>,
}

/// Outcome of the planning step, shared with every rank so they all fail
/// with the same error.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
enum PlanStatus {
    Ready,
    DuplicateElement(i64),
    DuplicateNode(i64),
    MissingNode { node: i64, element: i64 },
    Failed(String),
}

impl PlanStatus {
    fn of(planned: &Result<DistributionPlan, DeckError>) -> Self {
        match planned {
            Ok(_) => Self::Ready,
            Err(DeckError::DuplicateElement(gid)) => Self::DuplicateElement(*gid),
            Err(DeckError::DuplicateNode(gid)) => Self::DuplicateNode(*gid),
            Err(DeckError::MissingNode { node, element }) => Self::MissingNode {
                node: *node,
                element: *element,
            },
            Err(other) => Self::Failed(other.to_string()),
        }
    }

    fn into_error(self) -> Option<DeckError> {
        match self {
            Self::Ready => None,
            Self::DuplicateElement(gid) => Some(DeckError::DuplicateElement(gid)),
            Self::DuplicateNode(gid) => Some(DeckError::DuplicateNode(gid)),
            Self::MissingNode { node, element } => Some(DeckError::MissingNode { node, element }),
            Self::Failed(reason) => Some(DeckError::Malformed(format!(
                "mesh distribution failed on rank {PLANNER}: {reason}"
            ))),
        }
    }
}

/// Lines and nodes one rank sends to another.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Shipment {
    /// (element reader, owner, line)
    elements: Vec<(usize, usize, String)>,
    /// (discretization, node with its owner)
    nodes: Vec<(usize, Node)>,
}

/// Static layout of a distribution, known on every rank.
struct MeshLayout<'a> {
    size: usize,
    /// Discretization index of every element reader.
    reader_dis: &'a [usize],
    /// Box domains and their discretization index.
    domains: &'a [(usize, BoxDomain)],
    n_dis: usize,
}

impl MeshLayout<'_> {
    /// Box of discretization `dis` that generated node `gid`.
    fn generating_domain(&self, offsets: &[(i64, i64)], dis: usize, gid: i64) -> Option<usize> {
        self.domains
            .iter()
            .zip(offsets)
            .position(|((d, b), &(first, _))| *d == dis && (first..first + b.num_nodes() as i64).contains(&gid))
    }
}

enum ElementSource {
    Block { reader: usize, rank: usize },
    Generated { domain: usize },
}

struct PlannedElement {
    gid: i64,
    nodes: Vec<i64>,
    source: ElementSource,
}

/// Check the global mesh, partition it and route every element and node to
/// the ranks keeping it. Runs on the planning rank only.
fn plan_distribution(
    layout: &MeshLayout<'_>,
    blocks: Vec<BlockSummary>,
    cfg: &PartitionerConfig,
) -> Result<DistributionPlan, DeckError> {
    // generated boxes continue the numbering of the deck
    let max_element = blocks
        .iter()
        .flat_map(|b| b.connectivity.iter().flatten())
        .map(|(gid, _)| *gid)
        .max()
        .unwrap_or(0);
    let mut node_source: BTreeMap<i64, usize> = BTreeMap::new();
    let mut duplicate_node = None;
    for (rank, block) in blocks.iter().enumerate() {
        for &gid in &block.node_gids {
            if node_source.insert(gid, rank).is_some() {
                duplicate_node.get_or_insert(gid);
            }
        }
    }
    let (mut next_node, mut next_element) = (node_source.keys().next_back().copied().unwrap_or(0) + 1, max_element + 1);
    let mut box_offsets = Vec::with_capacity(layout.domains.len());
    for (_, domain) in layout.domains {
        box_offsets.push((next_node, next_element));
        next_node += domain.num_nodes() as i64;
        next_element += domain.num_elements() as i64;
    }

    let mut meshes: Vec<Vec<PlannedElement>> = (0..layout.n_dis).map(|_| Vec::new()).collect();
    for (rank, block) in blocks.into_iter().enumerate() {
        for (reader, connectivity) in block.connectivity.into_iter().enumerate() {
            let mesh = layout
                .reader_dis
                .get(reader)
                .and_then(|&d| meshes.get_mut(d))
                .ok_or_else(|| DeckError::comm(rank, format!("block of unknown element reader {reader}")))?;
            mesh.extend(connectivity.into_iter().map(|(gid, nodes)| PlannedElement {
                gid,
                nodes,
                source: ElementSource::Block { reader, rank },
            }));
        }
    }
    for (domain, ((dis, b), &(first_node, first_element))) in layout.domains.iter().zip(&box_offsets).enumerate() {
        meshes[*dis].extend((0..b.num_elements()).map(|idx| PlannedElement {
            gid: first_element + idx as i64,
            nodes: b.element_nodes(first_node, idx),
            source: ElementSource::Generated { domain },
        }));
    }

    for mesh in &mut meshes {
        mesh.sort_by_key(|e| e.gid);
        if let Some((a, _)) = mesh.iter().tuple_windows().find(|(a, b)| a.gid == b.gid) {
            return Err(DeckError::DuplicateElement(a.gid));
        }
    }
    if let Some(gid) = duplicate_node {
        return Err(DeckError::DuplicateNode(gid));
    }
    for (dis, mesh) in meshes.iter().enumerate() {
        for e in mesh {
            if let Some(&node) = e
                .nodes
                .iter()
                .find(|&&n| !node_source.contains_key(&n) && layout.generating_domain(&box_offsets, dis, n).is_none())
            {
                return Err(DeckError::MissingNode { node, element: e.gid });
            }
        }
    }

    let mut ranks: Vec<RankPlan> = (0..layout.size)
        .map(|_| RankPlan {
            box_offsets: box_offsets.clone(),
            ..RankPlan::default()
        })
        .collect();
    for (dis, mesh) in meshes.iter().enumerate() {
        let graph = build_dual(mesh.iter().map(|e| e.nodes.as_slice()));
        let parts = partition(&graph, cfg)?;
        let owners: Vec<usize> = (0..mesh.len()).map(|v| parts.part_of(v)).collect();

        // ranks owning an element around each node; the lowest owns the node
        let mut node_ranks: BTreeMap<i64, BTreeSet<usize>> = BTreeMap::new();
        for (e, &owner) in mesh.iter().zip(&owners) {
            for &n in &e.nodes {
                node_ranks.entry(n).or_default().insert(owner);
            }
        }
        // an element is kept by every rank owning one of its nodes' elements,
        // and its nodes follow it
        let mut node_dests: BTreeMap<i64, BTreeSet<usize>> = BTreeMap::new();
        for (e, &owner) in mesh.iter().zip(&owners) {
            let mut dests: BTreeSet<usize> = e
                .nodes
                .iter()
                .filter_map(|n| node_ranks.get(n))
                .flatten()
                .copied()
                .collect();
            dests.insert(owner);
            for &n in &e.nodes {
                node_dests.entry(n).or_default().extend(&dests);
            }
            match e.source {
                ElementSource::Block { reader, rank } => ranks[rank].element_routes.push(ElementRoute {
                    reader,
                    gid: e.gid,
                    owner,
                    dests: dests.into_iter().collect(),
                }),
                ElementSource::Generated { domain } => {
                    for r in dests {
                        ranks[r].generated_elements.push((domain, e.gid, owner));
                    }
                }
            }
        }
        for (gid, dests) in node_dests {
            let owner = node_ranks.get(&gid).and_then(|r| r.first().copied()).unwrap_or(PLANNER);
            if let Some(&source) = node_source.get(&gid) {
                ranks[source].node_routes.push(NodeRoute {
                    dis,
                    gid,
                    owner,
                    dests: dests.into_iter().collect(),
                });
            } else if let Some(domain) = layout.generating_domain(&box_offsets, dis, gid) {
                for r in dests {
                    ranks[r].generated_nodes.push((domain, gid, owner));
                }
            }
        }
    }
    Ok(DistributionPlan {
        ranks,
        elements_per_dis: meshes.iter().map(Vec::len).collect(),
    })
}

/// Collects element and domain readers and distributes their meshes.
pub struct MeshReader<'r, C: Communicator> {
    reader: &'r DeckReader<C>,
    node_section: String,
    element_readers: Vec<ElementReader>,
    domain_readers: Vec<DomainReader>,
    config: MeshPartitioningConfig,
}

impl<'r, C: Communicator> MeshReader<'r, C> {
    pub fn new(reader: &'r DeckReader<C>) -> Self {
        Self::with_config(reader, MeshPartitioningConfig::default())
    }

    pub fn with_config(reader: &'r DeckReader<C>, config: MeshPartitioningConfig) -> Self {
        Self {
            reader,
            node_section: NODE_SECTION.to_string(),
            element_readers: Vec::new(),
            domain_readers: Vec::new(),
            config,
        }
    }

    /// Read nodes from another section than `NODE COORDS`.
    pub fn node_section(mut self, name: impl Into<String>) -> Self {
        self.node_section = name.into();
        self
    }

    pub fn add_element_reader(&mut self, reader: ElementReader) {
        self.element_readers.push(reader);
    }

    pub fn add_domain_reader(&mut self, reader: DomainReader) {
        self.domain_readers.push(reader);
    }

    pub fn is_empty(&self) -> bool {
        self.element_readers.is_empty() && self.domain_readers.is_empty()
    }

    /// Read, partition and distribute every registered mesh into the
    /// matching discretization of `dis`. Collective over the reader's
    /// communicator.
    pub fn read_and_partition(
        &self,
        dis: &mut BTreeMap<String, Discretization<C>>,
    ) -> Result<(), DeckError> {
        let comm = self.reader.comm();
        let (rank, size) = (comm.rank(), comm.size());
        let dis_names: Vec<String> = self
            .element_readers
            .iter()
            .map(|r| r.dis.clone())
            .chain(self.domain_readers.iter().map(|r| r.dis.clone()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if let Some(name) = dis_names.iter().find(|n| !dis.contains_key(*n)) {
            return Err(DeckError::UnknownDiscretization(name.clone()));
        }
        let dis_index = |name: &str| dis_names.iter().position(|n| n == name).unwrap_or_default();
        let reader_dis: Vec<usize> = self.element_readers.iter().map(|r| dis_index(&r.dis)).collect();

        // 1. boxes and this rank's block of the deck
        let local = self.read_domains(&dis_index).and_then(|domains| Ok((domains, self.read_block(rank, size)?)));
        let (domains, block) = agree(comm, local, "reading the mesh block")?;
        let layout = MeshLayout {
            size,
            reader_dis: &reader_dis,
            domains: &domains,
            n_dis: dis_names.len(),
        };

        // 2. plan on one rank
        let cfg = PartitionerConfig {
            n_parts: size,
            imbalance_tol: self.config.imbalance_tol,
            rng_seed: self.config.rng_seed,
            max_iters: self.config.refine_sweeps,
        };
        let planned = match gather_bytes(comm, PLANNER, cast_slice(&block.summary())) {
            Ok(pieces) if rank == PLANNER => pieces
                .iter()
                .map(|p| decode_summary(&cast_slice_from::<WireI64>(p), self.element_readers.len()))
                .collect::<Result<Vec<_>, _>>()
                .and_then(|blocks| plan_distribution(&layout, blocks, &cfg)),
            Ok(_) => Ok(DistributionPlan::default()),
            Err(e) => Err(e),
        };
        let mut status = if rank == PLANNER {
            serde_json::to_string(&PlanStatus::of(&planned)).unwrap_or_default()
        } else {
            String::new()
        };
        broadcast_string(comm, PLANNER, &mut status)?;
        let status: PlanStatus = serde_json::from_str(&status)?;
        if let Some(err) = status.into_error() {
            return Err(planned.err().unwrap_or(err));
        }
        let plan = planned?;

        // 3. one routing plan per rank
        let (pieces, encode_err) = match plan.ranks.iter().map(serde_json::to_vec).collect::<Result<Vec<_>, _>>() {
            Ok(pieces) => (pieces, None),
            Err(e) => (Vec::new(), Some(DeckError::from(e))),
        };
        let mine = scatter_bytes(comm, PLANNER, pieces)?;
        let my_plan = match encode_err {
            Some(e) => Err(e),
            None => serde_json::from_slice::<RankPlan>(&mine).map_err(DeckError::from),
        };
        let my_plan = agree(comm, my_plan, "decoding the distribution plan")?;

        // 4. block lines and nodes to the ranks keeping them
        let outgoing = agree(comm, pack_shipments(block, &my_plan, size), "routing the mesh block")?;
        let incoming = exchange_bytes(comm, outgoing)?;
        let assembled = assemble_column(incoming, &layout, &my_plan, &self.element_readers, &dis_names, dis);
        agree(comm, assembled, "assembling the column mesh")?;

        if rank == PLANNER && self.reader.verbose() {
            for (name, n) in dis_names.iter().zip(&plan.elements_per_dis) {
                log::info!("discretization `{name}`: {n} elements distributed over {size} ranks");
            }
        }
        Ok(())
    }

    fn read_domains(&self, dis_index: &impl Fn(&str) -> usize) -> Result<Vec<(usize, BoxDomain)>, DeckError> {
        let registry = ElementRegistry::global();
        self.domain_readers
            .iter()
            .map(|dr| {
                let domain = BoxDomain::read(self.reader, &dr.section)?;
                // the element options are the same for every generated line
                if let Some(line) = domain.element_line(1, 1, 1) {
                    registry.parse_line(&line)?;
                }
                Ok((dis_index(&dr.dis), domain))
            })
            .collect()
    }

    /// Parse lines `block_range` of every element section and of the node
    /// section.
    fn read_block(&self, rank: usize, size: usize) -> Result<MeshBlock, DeckError> {
        let registry = ElementRegistry::global();
        let mut block = MeshBlock::default();
        for er in &self.element_readers {
            let mut elements = Vec::new();
            for line in self.block_lines(&er.section, rank, size)? {
                if !er.accepts(&line) {
                    continue;
                }
                let e = registry.parse_line(&line)?;
                elements.push(BlockElement {
                    gid: e.gid,
                    nodes: e.nodes,
                    line,
                });
            }
            block.elements.push(elements);
        }
        let node_def = LineDefinition::builder()
            .add_named_int("NODE")
            .add_named_double_vector("COORD", 3)
            .build();
        let cp_def = LineDefinition::builder()
            .add_named_int("CP")
            .add_named_double_vector("COORD", 4)
            .build();
        for line in self.block_lines(&self.node_section, rank, size)? {
            let node = if line.starts_with("CP") {
                let c = cp_def.read(&line)?;
                let x: Vec<f64> = c.get("COORD")?;
                Node {
                    weight: Some(x[3]),
                    ..Node::new(c.get("CP")?, [x[0], x[1], x[2]])
                }
            } else {
                let c = node_def.read(&line)?;
                let x: Vec<f64> = c.get("COORD")?;
                Node::new(c.get("NODE")?, [x[0], x[1], x[2]])
            };
            block.nodes.push(node);
        }
        Ok(block)
    }

    /// Content lines of this rank's block of `section`.
    fn block_lines(&self, section: &str, rank: usize, size: usize) -> Result<Vec<String>, DeckError> {
        let n = self
            .reader
            .lines_in_section(section)
            .try_fold(0usize, |n, l| l.map(|_| n + 1))?;
        let block = block_range(n, rank, size);
        self.reader
            .lines_in_section(section)
            .skip(block.start)
            .take(block.len())
            .map(|l| l.map(|c| c.into_owned()))
            .collect()
    }
}

/// Sort the block's lines and nodes into one shipment per rank.
fn pack_shipments(block: MeshBlock, plan: &RankPlan, size: usize) -> Result<Vec<Vec<u8>>, DeckError> {
    let lines: Vec<BTreeMap<i64, String>> = block
        .elements
        .into_iter()
        .map(|elements| elements.into_iter().map(|e| (e.gid, e.line)).collect())
        .collect();
    let nodes: BTreeMap<i64, Node> = block.nodes.into_iter().map(|n| (n.gid, n)).collect();
    let mut shipments: Vec<Shipment> = (0..size).map(|_| Shipment::default()).collect();
    for route in &plan.element_routes {
        let line = lines
            .get(route.reader)
            .and_then(|l| l.get(&route.gid))
            .ok_or_else(|| DeckError::Malformed(format!("element {} is not part of this block", route.gid)))?;
        for &dest in &route.dests {
            shipment_to(&mut shipments, dest)?
                .elements
                .push((route.reader, route.owner, line.clone()));
        }
    }
    for route in &plan.node_routes {
        let node = nodes
            .get(&route.gid)
            .ok_or_else(|| DeckError::Malformed(format!("node {} is not part of this block", route.gid)))?;
        for &dest in &route.dests {
            let node = Node {
                owner: route.owner,
                ..node.clone()
            };
            shipment_to(&mut shipments, dest)?.nodes.push((route.dis, node));
        }
    }
    shipments
        .iter()
        .map(|s| serde_json::to_vec(s).map_err(DeckError::from))
        .collect()
}

fn shipment_to(shipments: &mut [Shipment], dest: usize) -> Result<&mut Shipment, DeckError> {
    shipments
        .get_mut(dest)
        .ok_or_else(|| DeckError::comm(dest, "route to a rank outside the communicator"))
}

/// Box `idx` with its discretization index and first node and element gid.
fn planned_box<'a>(
    layout: &MeshLayout<'a>,
    plan: &RankPlan,
    idx: usize,
) -> Result<(usize, &'a BoxDomain, i64, i64), DeckError> {
    match (layout.domains.get(idx), plan.box_offsets.get(idx)) {
        (Some((dis, domain)), Some(&(first_node, first_element))) => Ok((*dis, domain, first_node, first_element)),
        _ => Err(DeckError::comm(PLANNER, format!("unknown box domain {idx}"))),
    }
}

/// Add the received and the generated column mesh to the discretizations
/// and complete them.
fn assemble_column<C: Communicator>(
    incoming: Vec<Vec<u8>>,
    layout: &MeshLayout<'_>,
    plan: &RankPlan,
    element_readers: &[ElementReader],
    dis_names: &[String],
    dis: &mut BTreeMap<String, Discretization<C>>,
) -> Result<(), DeckError> {
    let dis_name = |idx: usize| {
        dis_names
            .get(idx)
            .ok_or_else(|| DeckError::comm(PLANNER, format!("unknown discretization index {idx}")))
    };
    let registry = ElementRegistry::global();
    for piece in incoming {
        let shipment: Shipment = serde_json::from_slice(&piece)?;
        for (reader, owner, line) in shipment.elements {
            let er = element_readers
                .get(reader)
                .ok_or_else(|| DeckError::comm(PLANNER, format!("unknown element reader {reader}")))?;
            let mut e = registry.parse_line(&line)?;
            e.owner = owner;
            get_dis(dis, &er.dis)?.add_element(e)?;
        }
        for (idx, node) in shipment.nodes {
            get_dis(dis, dis_name(idx)?)?.add_node(node)?;
        }
    }
    for &(idx, gid, owner) in &plan.generated_elements {
        let (d, domain, first_node, first_element) = planned_box(layout, plan, idx)?;
        let line = domain
            .element_line(first_node, first_element, gid)
            .ok_or_else(|| DeckError::comm(PLANNER, format!("element {gid} is not part of box {idx}")))?;
        let mut e = registry.parse_line(&line)?;
        e.owner = owner;
        get_dis(dis, dis_name(d)?)?.add_element(e)?;
    }
    for &(idx, gid, owner) in &plan.generated_nodes {
        let (d, domain, first_node, _) = planned_box(layout, plan, idx)?;
        let node = domain
            .node(first_node, gid)
            .ok_or_else(|| DeckError::comm(PLANNER, format!("node {gid} is not part of box {idx}")))?;
        get_dis(dis, dis_name(d)?)?.add_node(Node { owner, ..node })?;
    }
    for name in dis_names {
        get_dis(dis, name)?.fill_complete(false, false)?;
    }
    Ok(())
}

fn get_dis<'a, C: Communicator>(
    dis: &'a mut BTreeMap<String, Discretization<C>>,
    name: &str,
) -> Result<&'a mut Discretization<C>, DeckError> {
    dis.get_mut(name)
        .ok_or_else(|| DeckError::UnknownDiscretization(name.to_string()))
}

/// Make a local result collective: if any rank failed, every rank fails.
fn agree<C: Communicator, T>(comm: &C, local: Result<T, DeckError>, what: &str) -> Result<T, DeckError> {
    let flags = all_gather(comm, WireI64::of(local.is_err() as i64))?;
    let value = local?;
    match flags.iter().position(|f| f.get() != 0) {
        Some(r) => Err(DeckError::Malformed(format!("{what} failed on rank {r}"))),
        None => Ok(value),
    }
}

fn decode_connectivity(flat: &[WireI64], out: &mut Vec<(i64, Vec<i64>)>) -> Result<(), DeckError> {
    let mut i = 0;
    while i < flat.len() {
        let gid = flat[i].get();
        let n = flat
            .get(i + 1)
            .map(|w| w.get() as usize)
            .ok_or_else(|| DeckError::comm(0, "truncated connectivity record"))?;
        let nodes = flat
            .get(i + 2..i + 2 + n)
            .ok_or_else(|| DeckError::comm(0, "truncated connectivity record"))?;
        out.push((gid, nodes.iter().map(WireI64::get).collect()));
        i += 2 + n;
    }
    Ok(())
}
