use crate::render::block_label;
use crate::{NodeKind, ReplayError, SeriesRef, WitnessGraph, WitnessTrace};
use absdisc_core::AbstractionDomain;
use tracing::debug;

/// Rebuilds the search history: the start block, then per step either an end
/// marker, an accepted refinement that opens a new row, or a rejected candidate
/// hanging off the current parent. The abstraction context comes from the
/// config recorded with the trace.
pub fn replay(domain: &dyn AbstractionDomain, trace: &WitnessTrace) -> Result<WitnessGraph, ReplayError> {
    let context = domain.context(&trace.config)?;
    let ctx = context.as_ref();
    let mut graph = WitnessGraph::new();
    let mut state = trace.start.clone();
    let mut parent = graph.add_node(NodeKind::Start, block_label(ctx, &state, None), None, Some(state.clone()));
    graph.new_row();

    let mut link: Option<SeriesRef> = None;
    for (step, record) in trace.trace.iter().enumerate() {
        if record.measurements.is_some() {
            link.clone_from(&record.measurements);
        }

        if record.terminate {
            let label = format!("Terminated: {}", record.comment.as_deref().unwrap_or(""));
            let end = graph.add_node(NodeKind::End, label, link.clone(), None);
            graph.add_edge(parent, end);
            continue;
        }

        let expansion = record.expansion.as_ref().ok_or(ReplayError::MissingExpansion { step })?;
        if record.taken {
            state.apply_expansion(expansion).map_err(|source| ReplayError::Step { step, source })?;
            let node = graph.add_node(NodeKind::Interesting, block_label(ctx, &state, Some(expansion)), link.clone(), Some(state.clone()));
            graph.add_edge(parent, node);
            parent = node;
            graph.new_row();
        } else {
            let mut candidate = state.clone();
            candidate.apply_expansion(expansion).map_err(|source| ReplayError::Step { step, source })?;
            let label = block_label(ctx, &candidate, Some(expansion));
            let node = graph.add_node(NodeKind::NotInteresting, label, link.clone(), Some(candidate));
            graph.add_edge(parent, node);
        }
    }

    let graph = graph.finish();
    debug!(steps = trace.trace.len(), nodes = graph.nodes().len(), rows = graph.rows().len(), "replayed witness");
    Ok(graph)
}

/// Series recorded by the last accepted refinement, the one that witnesses the final block.
pub fn witnessing_series(trace: &WitnessTrace) -> Option<&SeriesRef> {
    trace.trace.iter().rev().filter(|r| r.taken && !r.terminate).find_map(|r| r.measurements.as_ref())
}
