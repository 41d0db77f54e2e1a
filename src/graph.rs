use crate::arrays::Image;
use assume::assume;
use sprs::{CsMat, TriMat};

/// Pixel adjacency graph in coordinate format.
///
/// Node `i` is the pixel at `(i % width, i / width)`. Entries may repeat; they are summed when the
/// graph is converted to CSR.
#[derive(Debug, Clone, PartialEq)]
pub struct CooGraph {
    pub n_nodes: usize,
    pub rows: Vec<usize>,
    pub cols: Vec<usize>,
    pub data: Vec<f64>,
}

impl CooGraph {
    pub fn nnz(&self) -> usize {
        self.data.len()
    }

    pub fn to_csr(&self) -> CsMat<f64> {
        TriMat::from_triplets(
            (self.n_nodes, self.n_nodes),
            self.rows.clone(),
            self.cols.clone(),
            self.data.clone(),
        )
        .to_csr()
    }
}

/// Graph of the pixel-to-pixel gradient connections.
///
/// Every pixel is linked to its right and lower neighbour, in both directions, with the absolute
/// intensity difference as weight. The diagonal holds the pixel intensities. Entries are ordered:
/// all forward edges (horizontal then vertical), the same edges reversed, then the diagonal.
pub fn img_to_graph(image: &Image) -> CooGraph {
    let (width, height) = (image.width, image.height);
    let n_nodes = width * height;
    let n_edges = height * width.saturating_sub(1) + width * height.saturating_sub(1);
    let mut from = Vec::with_capacity(n_edges);
    let mut to = Vec::with_capacity(n_edges);
    for y in 0..height {
        for x in 0..width.saturating_sub(1) {
            let v = y * width + x;
            from.push(v);
            to.push(v + 1);
        }
    }
    for y in 0..height.saturating_sub(1) {
        for x in 0..width {
            let v = y * width + x;
            from.push(v);
            to.push(v + width);
        }
    }
    let gradient: Vec<f64> = from
        .iter()
        .zip(&to)
        .map(|(a, b)| (image.data[*a] - image.data[*b]).abs())
        .collect();

    let mut rows = Vec::with_capacity(2 * n_edges + n_nodes);
    rows.extend_from_slice(&from);
    rows.extend_from_slice(&to);
    rows.extend(0..n_nodes);
    let mut cols = Vec::with_capacity(2 * n_edges + n_nodes);
    cols.extend_from_slice(&to);
    cols.extend_from_slice(&from);
    cols.extend(0..n_nodes);
    let mut data = Vec::with_capacity(2 * n_edges + n_nodes);
    data.extend_from_slice(&gradient);
    data.extend_from_slice(&gradient);
    data.extend(image.data.iter().copied());
    CooGraph {
        n_nodes,
        rows,
        cols,
        data,
    }
}

/// Weighted degree of every node, self loops excluded.
pub fn degrees(graph: &CsMat<f64>) -> Vec<f64> {
    graph
        .outer_iterator()
        .enumerate()
        .map(|(row, vec)| {
            vec.iter()
                .filter(|(col, _)| *col != row)
                .map(|(_, w)| *w)
                .sum()
        })
        .collect()
}

/// Union-find over node indices where every parent has a lower index than its child (Rem's
/// algorithm with splicing).
pub struct DisjointSet {
    parents: Vec<u32>,
}

impl DisjointSet {
    pub fn new(size: u32) -> Self {
        assert!(size < u32::MAX, "Size must be smaller than {}", u32::MAX);
        DisjointSet {
            parents: (0..size).collect(),
        }
    }

    pub fn merge(&mut self, node_i: u32, node_j: u32) {
        let mut root_x = node_i as usize;
        let mut root_y = node_j as usize;
        while self.parents[root_x] != self.parents[root_y] {
            let parent_x = self.parents[root_x];
            let parent_y = self.parents[root_y];
            if parent_x > parent_y {
                if root_x as u32 == parent_x {
                    self.parents[root_x] = parent_y;
                    return;
                }
                self.parents[root_x] = parent_y;
                root_x = parent_x as usize;
                assume!(unsafe: root_x < self.parents.len(), "root: {root_x} > {}", self.parents.len());
            } else {
                if root_y as u32 == parent_y {
                    self.parents[root_y] = parent_x;
                    return;
                }
                self.parents[root_y] = parent_x;
                root_y = parent_y as usize;
                assume!(unsafe: root_y < self.parents.len(), "root: {root_y} > {}", self.parents.len());
            }
        }
    }

    pub fn find(&self, node: u32) -> u32 {
        let mut node = node;
        while self.parents[node as usize] != node {
            node = self.parents[node as usize];
        }
        node
    }

    pub fn num_components(&self) -> usize {
        (0u32..)
            .zip(&self.parents)
            .filter(|(i, parent)| *i == **parent)
            .count()
    }
}

/// Number of connected components, edges with zero weight included.
pub fn connected_components(graph: &CsMat<f64>) -> usize {
    let mut set = DisjointSet::new(graph.rows() as u32);
    for (row, vec) in graph.outer_iterator().enumerate() {
        for (col, _) in vec.iter() {
            if col != row {
                set.merge(row as u32, col as u32);
            }
        }
    }
    set.num_components()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrays::Image;

    #[test]
    fn graph_of_small_image() {
        // 2 rows, 3 columns
        let image = Image::from_slice(&[0.0, 0.5, 1.0, 0.25, 0.25, 0.0], 3, 2).unwrap();
        let graph = img_to_graph(&image);
        assert_eq!(graph.n_nodes, 6);
        // 4 horizontal + 3 vertical edges, twice, plus 6 diagonal entries
        assert_eq!(graph.nnz(), 2 * 7 + 6);
        assert_eq!(&graph.rows[..7], &[0, 1, 3, 4, 0, 1, 2]);
        assert_eq!(&graph.cols[..7], &[1, 2, 4, 5, 3, 4, 5]);
        assert_eq!(&graph.data[..7], &[0.5, 0.5, 0.0, 0.25, 0.25, 0.25, 1.0]);
        assert_eq!(&graph.data[14..], &[0.0, 0.5, 1.0, 0.25, 0.25, 0.0]);

        let csr = graph.to_csr();
        assert_eq!(csr.rows(), 6);
        assert_eq!(csr.get(1, 0), Some(&0.5));
        assert_eq!(csr.get(0, 1), Some(&0.5));
        assert_eq!(csr.get(2, 2), Some(&1.0));
        assert_eq!(csr.get(0, 4), None);
    }

    #[test]
    fn degrees_skip_diagonal() {
        let image = Image::from_slice(&[0.0, 1.0, 1.0, 3.0], 2, 2).unwrap();
        let csr = img_to_graph(&image).to_csr();
        assert_eq!(degrees(&csr), vec![2.0, 3.0, 3.0, 4.0]);
    }

    #[test]
    fn single_pixel_graph_has_only_diagonal() {
        let image = Image::from_fill(0.7, 1, 1);
        let graph = img_to_graph(&image);
        assert_eq!(graph.nnz(), 1);
        assert_eq!(connected_components(&graph.to_csr()), 1);
    }

    #[test]
    fn disjoint_set_counts_components() {
        let mut set = DisjointSet::new(8);
        set.merge(0, 1);
        set.merge(2, 3);
        set.merge(3, 1);
        set.merge(6, 7);
        assert_eq!(set.num_components(), 4);
        assert_eq!(set.find(3), set.find(0));
        assert_ne!(set.find(6), set.find(0));
    }

    #[test]
    fn pixel_grid_is_connected() {
        let image = Image::from_fn(7, 5, |x, y| (x * y) as f64);
        assert_eq!(connected_components(&img_to_graph(&image).to_csr()), 1);
    }
}
