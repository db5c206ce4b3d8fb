//! Random pair and route selection over the routable nodes

use rand::seq::SliceRandom;

use relaycheck_core::PeerId;

use crate::node::Node;
use crate::{CheckError, Result};

/// `count` distinct ordered pairs `(left, right)` with `left != right`
pub fn random_distinct_pairs<T: Clone + PartialEq>(items: &[T], count: usize) -> Result<Vec<(T, T)>> {
    let candidates: Vec<(T, T)> = items
        .iter()
        .flat_map(|left| {
            items
                .iter()
                .filter(move |right| *right != left)
                .map(move |right| (left.clone(), right.clone()))
        })
        .collect();

    if candidates.len() < count {
        return Err(CheckError::Config(format!(
            "cannot pick {} distinct pairs from {} nodes",
            count,
            items.len()
        )));
    }
    Ok(candidates
        .choose_multiple(&mut rand::thread_rng(), count)
        .cloned()
        .collect())
}

/// A random route visiting `len` distinct items
pub fn shuffled_route<T: Clone>(items: &[T], len: usize) -> Result<Vec<T>> {
    if items.len() < len {
        return Err(CheckError::Config(format!(
            "cannot build a {}-node route from {} nodes",
            len,
            items.len()
        )));
    }
    let mut route = items.to_vec();
    route.shuffle(&mut rand::thread_rng());
    route.truncate(len);
    Ok(route)
}

/// Consecutive `(from, to)` hops of a route; one channel is needed per hop
pub fn route_pairs<T>(route: &[T]) -> Vec<(&T, &T)> {
    route.windows(2).map(|w| (&w[0], &w[1])).collect()
}

/// Peer ids of the relays between the first and the last node
pub fn intermediate_peers(route: &[Node]) -> Vec<PeerId> {
    match route {
        [_, relays @ .., _] => relays.iter().map(|n| n.peer_id.clone()).collect(),
        _ => Vec::new(),
    }
}
