//! Vertex cache optimization of triangle lists (Forsyth's linear-speed
//! algorithm).
//!
//! Triangles are emitted greedily by score: vertices recently used in a
//! simulated LRU cache and vertices with few remaining triangles score
//! higher. Ties resolve to the lowest triangle index, so the output only
//! depends on the input order.

const CACHE_SIZE: usize = 32;
const CACHE_DECAY_POWER: f32 = 1.5;
const LAST_TRIANGLE_SCORE: f32 = 0.75;
const VALENCE_BOOST_SCALE: f32 = 2.0;
const VALENCE_BOOST_POWER: f32 = 0.5;

fn vertex_score(cache_position: Option<usize>, remaining: usize) -> f32 {
    if remaining == 0 {
        return -1.0;
    }
    let mut score = match cache_position {
        None => 0.0,
        Some(p) if p < 3 => LAST_TRIANGLE_SCORE,
        Some(p) => {
            let scaler = 1.0 / (CACHE_SIZE - 3) as f32;
            (1.0 - (p - 3) as f32 * scaler).powf(CACHE_DECAY_POWER)
        }
    };
    score += VALENCE_BOOST_SCALE * (remaining as f32).powf(-VALENCE_BOOST_POWER);
    score
}

/// Reorder triangles for post-transform cache locality
pub fn optimize_triangles(triangles: &[[u32; 3]]) -> Vec<[u32; 3]> {
    if triangles.len() < 2 {
        return triangles.to_vec();
    }
    let vertex_count = triangles.iter().flatten().max().map_or(0, |&m| m as usize + 1);

    // Triangles using each vertex
    let mut vertex_triangles: Vec<Vec<usize>> = vec![Vec::new(); vertex_count];
    for (t, triangle) in triangles.iter().enumerate() {
        for &v in triangle {
            vertex_triangles[v as usize].push(t);
        }
    }
    let mut remaining: Vec<usize> = vertex_triangles.iter().map(Vec::len).collect();
    let mut cache_position: Vec<Option<usize>> = vec![None; vertex_count];
    let mut scores: Vec<f32> = remaining.iter().map(|&r| vertex_score(None, r)).collect();
    let mut emitted = vec![false; triangles.len()];
    let triangle_score =
        |t: usize, scores: &[f32]| triangles[t].iter().map(|&v| scores[v as usize]).sum::<f32>();

    let mut cache: Vec<u32> = Vec::with_capacity(CACHE_SIZE + 3);
    let mut out = Vec::with_capacity(triangles.len());
    let mut best = best_triangle(0..triangles.len(), &emitted, |t| triangle_score(t, &scores));

    while let Some(t) = best {
        emitted[t] = true;
        out.push(triangles[t]);

        for &v in &triangles[t] {
            let v = v as usize;
            remaining[v] -= 1;
            if let Some(slot) = vertex_triangles[v].iter().position(|&x| x == t) {
                vertex_triangles[v].swap_remove(slot);
            }
        }

        // Move the triangle's vertices to the front of the cache
        let mut new_cache: Vec<u32> = triangles[t].to_vec();
        new_cache.extend(cache.iter().copied().filter(|v| !triangles[t].contains(v)));
        let evicted: Vec<u32> = new_cache.iter().skip(CACHE_SIZE).copied().collect();
        new_cache.truncate(CACHE_SIZE);
        cache = new_cache;

        for v in evicted {
            cache_position[v as usize] = None;
            scores[v as usize] = vertex_score(None, remaining[v as usize]);
        }
        for (p, &v) in cache.iter().enumerate() {
            cache_position[v as usize] = Some(p);
            scores[v as usize] = vertex_score(Some(p), remaining[v as usize]);
        }

        // Candidates are the triangles touching cached vertices
        let candidates = cache
            .iter()
            .flat_map(|&v| vertex_triangles[v as usize].iter().copied());
        best = best_triangle(candidates, &emitted, |t| triangle_score(t, &scores))
            .or_else(|| emitted.iter().position(|e| !e));
    }
    out
}

/// Highest scoring unemitted triangle, lowest index on ties
fn best_triangle(
    candidates: impl Iterator<Item = usize>,
    emitted: &[bool],
    score: impl Fn(usize) -> f32,
) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for t in candidates {
        if emitted[t] {
            continue;
        }
        let s = score(t);
        let better = match best {
            None => true,
            Some((bt, bs)) => s > bs || (s == bs && t < bt),
        };
        if better {
            best = Some((t, s));
        }
    }
    best.map(|(t, _)| t)
}

/// Average cache miss ratio per triangle for a FIFO cache of `size`
pub fn average_cache_miss_ratio(triangles: &[[u32; 3]], size: usize) -> f32 {
    if triangles.is_empty() {
        return 0.0;
    }
    let mut fifo: std::collections::VecDeque<u32> = std::collections::VecDeque::with_capacity(size);
    let mut misses = 0usize;
    for &v in triangles.iter().flatten() {
        if !fifo.contains(&v) {
            misses += 1;
            if fifo.len() == size {
                fifo.pop_front();
            }
            fifo.push_back(v);
        }
    }
    misses as f32 / triangles.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Triangle grid of `n` x `n` quads, rows emitted in a cache hostile order
    fn grid(n: u32) -> Vec<[u32; 3]> {
        let mut triangles = Vec::new();
        for x in 0..n {
            for y in 0..n {
                let i = y * (n + 1) + x;
                triangles.push([i, i + 1, i + n + 1]);
                triangles.push([i + 1, i + n + 2, i + n + 1]);
            }
        }
        triangles
    }

    fn sorted(mut triangles: Vec<[u32; 3]>) -> Vec<[u32; 3]> {
        triangles.sort();
        triangles
    }

    #[test]
    fn test_keeps_every_triangle() {
        let input = grid(8);
        let output = optimize_triangles(&input);
        assert_eq!(sorted(output), sorted(input));
    }

    #[test]
    fn test_is_deterministic() {
        let input = grid(6);
        assert_eq!(optimize_triangles(&input), optimize_triangles(&input));
    }

    #[test]
    fn test_improves_cache_use() {
        let input = grid(16);
        let before = average_cache_miss_ratio(&input, 16);
        let after = average_cache_miss_ratio(&optimize_triangles(&input), 16);
        assert!(after <= before, "{after} > {before}");
    }

    #[test]
    fn test_small_inputs() {
        assert!(optimize_triangles(&[]).is_empty());
        assert_eq!(optimize_triangles(&[[0, 1, 2]]), vec![[0, 1, 2]]);
    }
}
