//! Fixed-iteration k-means over RGB points.

use log::debug;
use palette::Srgb;
use rand::Rng;
use rand::seq::index;

use crate::grid::Rgb;

/// One color group: the members' mean color and how many points it holds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Cluster {
    pub color: Rgb,
    pub population: usize,
}

type Point = [f64; 3];

#[inline(always)]
fn to_point(c: Rgb) -> Point {
    [c.red as f64, c.green as f64, c.blue as f64]
}

/// Squared distance; ordering is all assignment needs.
#[inline(always)]
fn dist_sq(a: &Point, b: &Point) -> f64 {
    let dr = a[0] - b[0];
    let dg = a[1] - b[1];
    let db = a[2] - b[2];
    dr * dr + dg * dg + db * db
}

/// Index of the nearest centroid; the lowest index wins ties.
fn nearest(p: &Point, centroids: &[Point]) -> usize {
    let mut best_idx = 0;
    let mut best_dist = f64::INFINITY;
    for (idx, c) in centroids.iter().enumerate() {
        let d = dist_sq(p, c);
        if d < best_dist {
            best_dist = d;
            best_idx = idx;
        }
    }
    best_idx
}

/// Per-centroid channel sums and member counts for one assignment pass.
fn assign(points: &[Point], centroids: &[Point]) -> Vec<([f64; 3], usize)> {
    let mut acc = vec![([0.0; 3], 0usize); centroids.len()];
    for p in points {
        let (sum, n) = &mut acc[nearest(p, centroids)];
        sum[0] += p[0];
        sum[1] += p[1];
        sum[2] += p[2];
        *n += 1;
    }
    acc
}

#[inline(always)]
fn channel(v: f64) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// Cluster `pixels` into `k` groups with `iterations` rounds of Lloyd's algorithm.
///
/// Initial centroids are `k` distinct input points drawn from `rng`. When the
/// input has fewer than `k` points, every point becomes a centroid and only
/// that many clusters are returned.
pub fn kmeans<R: Rng + ?Sized>(pixels: &[Rgb], k: usize, iterations: usize, rng: &mut R) -> Vec<Cluster> {
    if pixels.is_empty() || k == 0 {
        return Vec::new();
    }
    let k = k.min(pixels.len());
    let seeds: Vec<Rgb> = index::sample(rng, pixels.len(), k)
        .iter()
        .map(|i| pixels[i])
        .collect();
    kmeans_from_seeds(pixels, &seeds, iterations)
}

/// Lloyd's algorithm from explicit starting centroids.
///
/// Runs exactly `iterations` rounds with no convergence check, then one last
/// assignment pass for the memberships. A centroid that loses all its members
/// keeps its last position. One cluster is returned per seed, in seed order.
pub fn kmeans_from_seeds(pixels: &[Rgb], seeds: &[Rgb], iterations: usize) -> Vec<Cluster> {
    if pixels.is_empty() || seeds.is_empty() {
        return Vec::new();
    }
    let points: Vec<Point> = pixels.iter().copied().map(to_point).collect();
    let mut centroids: Vec<Point> = seeds.iter().copied().map(to_point).collect();

    for _ in 0..iterations {
        let acc = assign(&points, &centroids);
        for (centroid, (sum, n)) in centroids.iter_mut().zip(acc) {
            if n > 0 {
                let n = n as f64;
                *centroid = [sum[0] / n, sum[1] / n, sum[2] / n];
            }
        }
    }

    debug!(
        "k-means: {} points, k = {}, {iterations} iterations",
        points.len(),
        centroids.len()
    );

    centroids
        .iter()
        .zip(assign(&points, &centroids))
        .map(|(centroid, (sum, n))| {
            let mean = if n > 0 {
                let n = n as f64;
                [sum[0] / n, sum[1] / n, sum[2] / n]
            } else {
                *centroid
            };
            Cluster {
                color: Srgb::new(channel(mean[0]), channel(mean[1]), channel(mean[2])),
                population: n,
            }
        })
        .collect()
}

/// Order clusters by population, largest first, and keep at most `count` colors.
pub fn top_colors(mut clusters: Vec<Cluster>, count: usize) -> Vec<Rgb> {
    clusters.sort_by(|a, b| b.population.cmp(&a.population));
    clusters.into_iter().take(count).map(|c| c.color).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    const RED: Rgb = Srgb::new(255, 0, 0);
    const GREEN: Rgb = Srgb::new(0, 255, 0);
    const BLUE: Rgb = Srgb::new(0, 0, 255);
    const WHITE: Rgb = Srgb::new(255, 255, 255);

    fn quadrants() -> Vec<Rgb> {
        let mut out = Vec::with_capacity(64);
        for y in 0..8 {
            for x in 0..8 {
                out.push(match (x < 4, y < 4) {
                    (true, true) => RED,
                    (false, true) => GREEN,
                    (true, false) => BLUE,
                    (false, false) => WHITE,
                });
            }
        }
        out
    }

    #[test]
    fn empty_input_or_zero_k_yields_nothing() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(kmeans(&[], 4, 15, &mut rng).is_empty());
        assert!(kmeans(&[RED], 0, 15, &mut rng).is_empty());
    }

    #[test]
    fn fewer_points_than_k_clamps_cluster_count() {
        let mut rng = StdRng::seed_from_u64(3);
        let clusters = kmeans(&[RED, BLUE], 5, 15, &mut rng);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters.iter().map(|c| c.population).sum::<usize>(), 2);
        let mut colors: Vec<Rgb> = clusters.iter().map(|c| c.color).collect();
        colors.sort_by_key(|c| (c.red, c.green, c.blue));
        assert_eq!(colors, vec![BLUE, RED]);
    }

    #[test]
    fn one_seed_per_quadrant_recovers_each_quadrant() {
        let clusters = kmeans_from_seeds(&quadrants(), &[RED, GREEN, BLUE, WHITE], 15);
        assert_eq!(
            clusters,
            vec![
                Cluster { color: RED, population: 16 },
                Cluster { color: GREEN, population: 16 },
                Cluster { color: BLUE, population: 16 },
                Cluster { color: WHITE, population: 16 },
            ]
        );
    }

    #[test]
    fn random_seeding_conserves_population() {
        let pixels = quadrants();
        let mut distinct_starts = 0;
        for seed in 0..256 {
            let mut rng = StdRng::seed_from_u64(seed);
            let clusters = kmeans(&pixels, 4, 15, &mut rng);
            assert_eq!(clusters.len(), 4);
            assert_eq!(clusters.iter().map(|c| c.population).sum::<usize>(), 64);

            // Identical points always share a cluster, so four clusters of 16
            // means one quadrant each.
            if clusters.iter().all(|c| c.population == 16) {
                distinct_starts += 1;
                let mut colors: Vec<Rgb> = clusters.iter().map(|c| c.color).collect();
                colors.sort_by_key(|c| (c.red, c.green, c.blue));
                assert_eq!(colors, vec![BLUE, GREEN, RED, WHITE], "seed {seed}");
            }
        }
        assert!(distinct_starts > 0);
    }

    #[test]
    fn frozen_centroid_is_reported_clamped() {
        let clusters = kmeans_from_seeds(&[RED], &[RED, Srgb::new(0, 0, 0)], 3);
        assert_eq!(clusters[1], Cluster { color: Srgb::new(0, 0, 0), population: 0 });
    }

    #[test]
    fn seeded_runs_are_identical() {
        let pixels: Vec<Rgb> = (0..200u32)
            .map(|i| Srgb::new((i * 7 % 256) as u8, (i * 13 % 256) as u8, (i * 29 % 256) as u8))
            .collect();
        let a = kmeans(&pixels, 6, 15, &mut StdRng::seed_from_u64(11));
        let b = kmeans(&pixels, 6, 15, &mut StdRng::seed_from_u64(11));
        assert_eq!(a, b);
    }

    #[test]
    fn means_are_rounded_to_nearest() {
        // Mean of 10 and 11 is 10.5 -> 11.
        let pixels = [Srgb::new(10, 0, 0), Srgb::new(11, 0, 0)];
        let clusters = kmeans(&pixels, 1, 15, &mut StdRng::seed_from_u64(0));
        assert_eq!(clusters, vec![Cluster { color: Srgb::new(11, 0, 0), population: 2 }]);
    }

    #[test]
    fn duplicate_seeds_leave_an_empty_cluster() {
        // Identical points: the second centroid loses every tie to the first.
        let pixels = [RED, RED, RED];
        let clusters = kmeans(&pixels, 2, 15, &mut StdRng::seed_from_u64(5));
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0], Cluster { color: RED, population: 3 });
        assert_eq!(clusters[1], Cluster { color: RED, population: 0 });
    }

    #[test]
    fn top_colors_sorts_by_population() {
        let clusters = vec![
            Cluster { color: RED, population: 1 },
            Cluster { color: BLUE, population: 9 },
            Cluster { color: GREEN, population: 4 },
        ];
        assert_eq!(top_colors(clusters.clone(), 2), vec![BLUE, GREEN]);
        assert_eq!(top_colors(clusters, 10).len(), 3);
    }
}
