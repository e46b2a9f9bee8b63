//! Raster-to-vector boundary tracing.
//!
//! Converts the positive pixels of a prediction surface into polygons whose
//! vertices lie on pixel edges, equivalent to tracing each 4-connected
//! component's boundary. Coordinates are in pixel space (x = column,
//! y = row, y grows downward); georeferencing is applied by the caller.

use geo::Contains;
use geo_types::{Coord, LineString, Polygon};
use ndarray::Array2;
use std::collections::HashMap;

/// A directed pixel-edge segment keyed by its start corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Corner {
    x: i64,
    y: i64,
}

#[derive(Debug, Clone, Copy)]
struct Edge {
    from: Corner,
    to: Corner,
}

/// Trace all regions of `mask` whose value equals 1 into polygons.
///
/// Everything else (sentinel, zero) is background. Rings are chained from
/// the boundary edges between foreground and background; the foreground
/// always lies to the right of a directed edge, so outer rings and hole
/// rings come out with opposite winding and can be told apart by signed
/// area. Diagonally touching components stay separate (4-connectivity).
pub fn trace_mask_polygons(mask: &Array2<f32>) -> Vec<Polygon<f64>> {
    let edges = boundary_edges(mask);
    if edges.is_empty() {
        return Vec::new();
    }
    let rings = chain_rings(edges);

    let mut exteriors: Vec<LineString<f64>> = Vec::new();
    let mut holes: Vec<LineString<f64>> = Vec::new();
    for ring in rings {
        if signed_area(&ring) > 0.0 {
            exteriors.push(ring);
        } else {
            holes.push(ring);
        }
    }

    let mut polygons: Vec<Polygon<f64>> = exteriors
        .into_iter()
        .map(|ext| Polygon::new(ext, vec![]))
        .collect();

    // Attach each hole to the exterior that contains it.
    for hole in holes {
        let probe = hole
            .coords()
            .next()
            .copied()
            .unwrap_or(Coord { x: 0.0, y: 0.0 });
        if let Some(poly) = polygons.iter_mut().find(|p| {
            Polygon::new(p.exterior().clone(), vec![]).contains(&geo_types::Point(probe))
                || on_or_inside(p.exterior(), probe)
        }) {
            let mut interiors = poly.interiors().to_vec();
            interiors.push(hole);
            *poly = Polygon::new(poly.exterior().clone(), interiors);
        }
    }

    polygons
}

/// Hole ring corners can sit exactly on the exterior's bounding box, where a
/// strict point-in-polygon test is unreliable; fall back to a bounds check.
fn on_or_inside(ring: &LineString<f64>, probe: Coord<f64>) -> bool {
    let xs: Vec<f64> = ring.coords().map(|c| c.x).collect();
    let ys: Vec<f64> = ring.coords().map(|c| c.y).collect();
    let (min_x, max_x) = bounds(&xs);
    let (min_y, max_y) = bounds(&ys);
    probe.x > min_x && probe.x < max_x && probe.y > min_y && probe.y < max_y
}

fn bounds(values: &[f64]) -> (f64, f64) {
    values.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
        (lo.min(v), hi.max(v))
    })
}

fn is_set(mask: &Array2<f32>, row: i64, col: i64) -> bool {
    let (h, w) = mask.dim();
    if row < 0 || col < 0 || row >= h as i64 || col >= w as i64 {
        return false;
    }
    (mask[[row as usize, col as usize]] - 1.0).abs() < f32::EPSILON
}

/// Collect the directed boundary edges of every foreground pixel.
fn boundary_edges(mask: &Array2<f32>) -> Vec<Edge> {
    let (height, width) = mask.dim();
    let mut edges = Vec::new();
    for row in 0..height as i64 {
        for col in 0..width as i64 {
            if !is_set(mask, row, col) {
                continue;
            }
            let (x, y) = (col, row);
            if !is_set(mask, row - 1, col) {
                edges.push(Edge {
                    from: Corner { x, y },
                    to: Corner { x: x + 1, y },
                });
            }
            if !is_set(mask, row, col + 1) {
                edges.push(Edge {
                    from: Corner { x: x + 1, y },
                    to: Corner { x: x + 1, y: y + 1 },
                });
            }
            if !is_set(mask, row + 1, col) {
                edges.push(Edge {
                    from: Corner { x: x + 1, y: y + 1 },
                    to: Corner { x, y: y + 1 },
                });
            }
            if !is_set(mask, row, col - 1) {
                edges.push(Edge {
                    from: Corner { x, y: y + 1 },
                    to: Corner { x, y },
                });
            }
        }
    }
    edges
}

/// Chain directed edges into closed rings. Where two rings share a corner
/// (diagonally touching pixels), the continuation that turns toward the
/// foreground side is preferred so each ring closes on its own component.
fn chain_rings(edges: Vec<Edge>) -> Vec<LineString<f64>> {
    let mut by_start: HashMap<Corner, Vec<usize>> = HashMap::new();
    for (idx, edge) in edges.iter().enumerate() {
        by_start.entry(edge.from).or_default().push(idx);
    }

    let mut used = vec![false; edges.len()];
    let mut rings = Vec::new();

    for start_idx in 0..edges.len() {
        if used[start_idx] {
            continue;
        }
        let mut ring: Vec<Corner> = Vec::new();
        let mut current = start_idx;
        loop {
            used[current] = true;
            ring.push(edges[current].from);
            let at = edges[current].to;
            if at == edges[start_idx].from {
                break;
            }
            let dir = direction(&edges[current]);
            let Some(candidates) = by_start.get(&at) else {
                break;
            };
            let next = candidates
                .iter()
                .filter(|&&idx| !used[idx])
                .min_by_key(|&&idx| turn_priority(dir, direction(&edges[idx])));
            match next {
                Some(&idx) => current = idx,
                None => break,
            }
        }
        if ring.len() >= 4 {
            let mut coords: Vec<(f64, f64)> =
                ring.iter().map(|c| (c.x as f64, c.y as f64)).collect();
            coords.push(coords[0]);
            rings.push(LineString::from(coords));
        }
    }
    rings
}

fn direction(edge: &Edge) -> (i64, i64) {
    (edge.to.x - edge.from.x, edge.to.y - edge.from.y)
}

/// Lower is preferred: right turn, straight, left turn, reverse.
fn turn_priority(incoming: (i64, i64), outgoing: (i64, i64)) -> u8 {
    // Right turn in y-down pixel space: (dx, dy) -> (-dy, dx).
    let right = (-incoming.1, incoming.0);
    let left = (incoming.1, -incoming.0);
    if outgoing == right {
        0
    } else if outgoing == incoming {
        1
    } else if outgoing == left {
        2
    } else {
        3
    }
}

/// Shoelace signed area in y-down pixel coordinates; outer rings produced by
/// [`boundary_edges`] come out positive.
fn signed_area(ring: &LineString<f64>) -> f64 {
    let coords: Vec<Coord<f64>> = ring.coords().copied().collect();
    let mut sum = 0.0;
    for pair in coords.windows(2) {
        sum += pair[0].x * pair[1].y - pair[1].x * pair[0].y;
    }
    sum / 2.0
}
