use std::collections::HashMap;

use glam::Vec3;

/// Squared-distance threshold under which two corners count as sharing a
/// position. The same epsilon gates attribute merging.
pub const MERGE_EPSILON_SQ: f32 = 1e-5;

/// Disjoint-set over corner indices.
pub struct DisjointSet {
    parent: Vec<u32>,
    rank: Vec<u8>,
}

impl DisjointSet {
    pub fn new(len: usize) -> Self {
        Self {
            parent: (0..len as u32).collect(),
            rank: vec![0; len],
        }
    }

    pub fn find(&mut self, mut i: u32) -> u32 {
        // path halving
        while self.parent[i as usize] != i {
            self.parent[i as usize] = self.parent[self.parent[i as usize] as usize];
            i = self.parent[i as usize];
        }
        i
    }

    pub fn union(&mut self, a: u32, b: u32) {
        let mut ra = self.find(a);
        let mut rb = self.find(b);
        if ra == rb {
            return;
        }
        if self.rank[ra as usize] < self.rank[rb as usize] {
            std::mem::swap(&mut ra, &mut rb);
        }
        self.parent[rb as usize] = ra;
        if self.rank[ra as usize] == self.rank[rb as usize] {
            self.rank[ra as usize] += 1;
        }
    }
}

/// Corners grouped into position-equivalence classes.
///
/// Candidate pairs come from a spatial hash with cells the size of the
/// merge radius; pairs within the radius are unioned, so a class is the
/// transitive closure of epsilon proximity. Unlike a plain radius query
/// this is an equivalence relation by construction: reflexive (every
/// corner is in its own class), symmetric and transitive.
pub struct PositionClasses {
    class_of: Vec<u32>,
    members: Vec<u32>,
    offsets: Vec<u32>,
    counts: Vec<u32>,
}

impl PositionClasses {
    pub fn build(positions: &[Vec3]) -> Self {
        let n = positions.len();
        let cell = MERGE_EPSILON_SQ.sqrt();

        let mut grid: HashMap<[i64; 3], Vec<u32>> = HashMap::new();
        for (i, p) in positions.iter().enumerate() {
            grid.entry(cell_key(*p, cell)).or_default().push(i as u32);
        }

        let mut set = DisjointSet::new(n);
        for (i, p) in positions.iter().enumerate() {
            let base = cell_key(*p, cell);
            for dx in -1..=1i64 {
                for dy in -1..=1i64 {
                    for dz in -1..=1i64 {
                        let key = [base[0] + dx, base[1] + dy, base[2] + dz];
                        let bucket = match grid.get(&key) {
                            Some(bucket) => bucket,
                            None => continue,
                        };
                        for &j in bucket {
                            // visit each unordered pair once
                            if j as usize <= i {
                                continue;
                            }
                            if p.distance_squared(positions[j as usize]) < MERGE_EPSILON_SQ {
                                set.union(i as u32, j);
                            }
                        }
                    }
                }
            }
        }

        // flatten components into contiguous member runs
        let mut class_of = vec![0u32; n];
        let mut class_index: HashMap<u32, u32> = HashMap::new();
        for i in 0..n as u32 {
            let root = set.find(i);
            let next = class_index.len() as u32;
            class_of[i as usize] = *class_index.entry(root).or_insert(next);
        }
        let class_count = class_index.len();
        let mut counts = vec![0u32; class_count];
        for &class in &class_of {
            counts[class as usize] += 1;
        }
        let mut offsets = vec![0u32; class_count];
        let mut sum = 0u32;
        for (class, &count) in counts.iter().enumerate() {
            offsets[class] = sum;
            sum += count;
        }
        let mut members = vec![0u32; n];
        let mut cursor = offsets.clone();
        for i in 0..n as u32 {
            let class = class_of[i as usize] as usize;
            members[cursor[class] as usize] = i;
            cursor[class] += 1;
        }

        Self {
            class_of,
            members,
            offsets,
            counts,
        }
    }

    pub fn class_of(&self, corner: usize) -> u32 {
        self.class_of[corner]
    }

    /// All corners sharing a position with `corner`, itself included.
    pub fn class_members(&self, corner: usize) -> &[u32] {
        let class = self.class_of[corner] as usize;
        let offset = self.offsets[class] as usize;
        let count = self.counts[class] as usize;
        &self.members[offset..offset + count]
    }

    pub fn class_count(&self) -> usize {
        self.counts.len()
    }
}

fn cell_key(p: Vec3, cell: f32) -> [i64; 3] {
    [
        (p.x / cell).floor() as i64,
        (p.y / cell).floor() as i64,
        (p.z / cell).floor() as i64,
    ]
}
