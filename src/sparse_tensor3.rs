//! A trimmed sparse three-dimensional accumulator for interpolation weights.

use crate::axis::Axis;
use crate::error::GridError;
use std::ops::{Index, IndexMut, MulAssign};

// returned for reads that fall outside every populated block
static ZERO: f64 = 0.0;

/// Dense rectangular block holding the populated cells of one `τ` slice.
#[derive(Clone, Debug)]
struct Block {
    ylow: usize,
    zlow: usize,
    ny: usize,
    nz: usize,
    cells: Vec<f64>,
}

impl Block {
    fn new(iy: usize, iz: usize) -> Self {
        Self {
            ylow: iy,
            zlow: iz,
            ny: 1,
            nz: 1,
            cells: vec![0.0],
        }
    }

    fn contains(&self, iy: usize, iz: usize) -> bool {
        (self.ylow..self.ylow + self.ny).contains(&iy)
            && (self.zlow..self.zlow + self.nz).contains(&iz)
    }

    fn cell_index(&self, iy: usize, iz: usize) -> usize {
        (iy - self.ylow) * self.nz + (iz - self.zlow)
    }

    /// Extends the block so that it covers the cell `(iy, iz)`.
    fn grow(&mut self, iy: usize, iz: usize) {
        if self.contains(iy, iz) {
            return;
        }

        let ylow = self.ylow.min(iy);
        let yhigh = (self.ylow + self.ny - 1).max(iy);
        let zlow = self.zlow.min(iz);
        let zhigh = (self.zlow + self.nz - 1).max(iz);
        let ny = yhigh - ylow + 1;
        let nz = zhigh - zlow + 1;

        let mut cells = vec![0.0; ny * nz];
        for j in 0..self.ny {
            for k in 0..self.nz {
                cells[(j + self.ylow - ylow) * nz + (k + self.zlow - zlow)] =
                    self.cells[j * self.nz + k];
            }
        }

        *self = Self {
            ylow,
            zlow,
            ny,
            nz,
            cells,
        };
    }

    /// Contracts the block to the bounding box of its non-zero cells.
    /// Returns `false` if the block contains no non-zero cell at all.
    fn contract(&mut self) -> bool {
        let mut bounds: Option<(usize, usize, usize, usize)> = None;

        for j in 0..self.ny {
            for k in 0..self.nz {
                if self.cells[j * self.nz + k] != 0.0 {
                    let (ymin, ymax, zmin, zmax) = bounds.unwrap_or((j, j, k, k));
                    bounds = Some((ymin.min(j), ymax.max(j), zmin.min(k), zmax.max(k)));
                }
            }
        }

        let Some((ymin, ymax, zmin, zmax)) = bounds else {
            return false;
        };

        let ny = ymax - ymin + 1;
        let nz = zmax - zmin + 1;

        if (ny, nz) != (self.ny, self.nz) {
            let mut cells = vec![0.0; ny * nz];
            for j in 0..ny {
                for k in 0..nz {
                    cells[j * nz + k] = self.cells[(j + ymin) * self.nz + (k + zmin)];
                }
            }

            *self = Self {
                ylow: self.ylow + ymin,
                zlow: self.zlow + zmin,
                ny,
                nz,
                cells,
            };
        }

        true
    }
}

/// Sparse tensor over `(τ, y₁, y₂)` carrying its three axes.
///
/// Each `τ` slice lazily allocates one dense rectangular block that grows to
/// cover the cells written into it. Reads outside every block yield zero,
/// reads outside the logical shape panic. [`SparseTensor3::trim`] contracts
/// the blocks to the bounding boxes of their non-zero content.
#[derive(Clone, Debug)]
pub struct SparseTensor3 {
    taxis: Axis,
    yaxis: Axis,
    zaxis: Axis,
    blocks: Vec<Option<Block>>,
    fast: Option<Vec<f64>>,
}

impl SparseTensor3 {
    /// Constructs a new and empty tensor whose shape is given by the node
    /// counts of the three axes.
    #[must_use]
    pub fn new(taxis: Axis, yaxis: Axis, zaxis: Axis) -> Self {
        Self {
            blocks: vec![None; taxis.nodes()],
            taxis,
            yaxis,
            zaxis,
            fast: None,
        }
    }

    /// Returns the `τ` axis.
    #[must_use]
    pub const fn taxis(&self) -> &Axis {
        &self.taxis
    }

    /// Returns the `y₁` axis.
    #[must_use]
    pub const fn yaxis(&self) -> &Axis {
        &self.yaxis
    }

    /// Returns the `y₂` axis.
    #[must_use]
    pub const fn zaxis(&self) -> &Axis {
        &self.zaxis
    }

    /// Returns the logical shape `(N_τ, N_{y1}, N_{y2})`.
    #[must_use]
    pub fn shape(&self) -> (usize, usize, usize) {
        (
            self.taxis.nodes(),
            self.yaxis.nodes(),
            self.zaxis.nodes(),
        )
    }

    /// Returns `true` if all three axes structurally equal those of `other`.
    #[must_use]
    pub fn compare_axes(&self, other: &Self) -> bool {
        self.taxis == other.taxis && self.yaxis == other.yaxis && self.zaxis == other.zaxis
    }

    fn assert_shape(&self, index: [usize; 3]) {
        let (nt, ny, nz) = self.shape();
        assert!(
            index[0] < nt && index[1] < ny && index[2] < nz,
            "index {index:?} outside of the tensor shape ({nt}, {ny}, {nz})"
        );
    }

    /// Pre-materialises a dense table over the full logical shape. While the
    /// table is armed all reads and writes address it directly, so tight
    /// fill loops pay no block bookkeeping; the trim ranges are meaningless
    /// until [`SparseTensor3::empty_fast`] or [`SparseTensor3::trim`]
    /// gathers the table back into blocks.
    pub fn setup_fast(&mut self) {
        if self.fast.is_some() {
            return;
        }

        let (nt, ny, nz) = self.shape();
        let mut dense = vec![0.0; nt * ny * nz];

        for ((it, iy, iz), value) in self.indexed_iter() {
            dense[(it * ny + iy) * nz + iz] = value;
        }

        self.fast = Some(dense);
    }

    /// Direct cell access for hot fill loops; meaningful only between
    /// [`SparseTensor3::setup_fast`] and the next teardown.
    ///
    /// # Panics
    ///
    /// Panics if the fast table is not armed.
    #[inline]
    pub fn fill_fast(&mut self, itau: usize, iy: usize, iz: usize) -> &mut f64 {
        let (_, ny, nz) = self.shape();
        let dense = self
            .fast
            .as_mut()
            .expect("fast table accessed without setup_fast");

        &mut dense[(itau * ny + iy) * nz + iz]
    }

    /// Tears the fast table down, folding its content back into blocks.
    pub fn empty_fast(&mut self) {
        let Some(dense) = self.fast.take() else {
            return;
        };

        let (_, ny, nz) = self.shape();
        self.blocks.iter_mut().for_each(|block| *block = None);

        for (i, &value) in dense.iter().enumerate() {
            if value != 0.0 {
                let (it, iy, iz) = (i / (ny * nz), (i / nz) % ny, i % nz);
                *self.cell_mut(it, iy, iz) = value;
            }
        }
    }

    fn cell_mut(&mut self, itau: usize, iy: usize, iz: usize) -> &mut f64 {
        let block = self.blocks[itau].get_or_insert_with(|| Block::new(iy, iz));
        block.grow(iy, iz);
        let index = block.cell_index(iy, iz);

        &mut block.cells[index]
    }

    /// Contracts every slice to the bounding box of its non-zero cells and
    /// drops slices without any. Lossless, idempotent, and disarms the fast
    /// table.
    pub fn trim(&mut self) {
        self.empty_fast();

        for block in &mut self.blocks {
            if !block.as_mut().is_some_and(Block::contract) {
                *block = None;
            }
        }
    }

    /// Returns the indices of the first and last populated `τ` slices, or
    /// `None` for an empty tensor. Tight after [`SparseTensor3::trim`].
    #[must_use]
    pub fn tau_range(&self) -> Option<(usize, usize)> {
        let populated = |(index, block): (usize, &Option<Block>)| block.as_ref().map(|_| index);
        let min = self.blocks.iter().enumerate().find_map(populated)?;
        let max = self.blocks.iter().enumerate().rev().find_map(populated)?;

        Some((min, max))
    }

    /// Returns the `y₁` bounding box over all populated slices, inclusive.
    /// Tight after [`SparseTensor3::trim`].
    #[must_use]
    pub fn y_range(&self) -> Option<(usize, usize)> {
        self.blocks
            .iter()
            .flatten()
            .map(|block| (block.ylow, block.ylow + block.ny - 1))
            .reduce(|(min, max), (low, high)| (min.min(low), max.max(high)))
    }

    /// Returns the `y₂` bounding box over all populated slices, inclusive.
    /// Tight after [`SparseTensor3::trim`].
    #[must_use]
    pub fn z_range(&self) -> Option<(usize, usize)> {
        self.blocks
            .iter()
            .flatten()
            .map(|block| (block.zlow, block.zlow + block.nz - 1))
            .reduce(|(min, max), (low, high)| (min.min(low), max.max(high)))
    }

    /// Returns the number of non-zero cells.
    #[must_use]
    pub fn non_zeros(&self) -> usize {
        self.indexed_iter().count()
    }

    /// Returns the number of allocated cells holding an explicit zero.
    #[must_use]
    pub fn explicit_zeros(&self) -> usize {
        if let Some(dense) = &self.fast {
            dense.iter().filter(|&&value| value == 0.0).count()
        } else {
            self.blocks
                .iter()
                .flatten()
                .flat_map(|block| &block.cells)
                .filter(|&&value| value == 0.0)
                .count()
        }
    }

    /// Returns `true` if the tensor contains no non-zero cell.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indexed_iter().next().is_none()
    }

    /// Iterates over the non-zero cells in `τ`-major order.
    pub fn indexed_iter(&self) -> Box<dyn Iterator<Item = ((usize, usize, usize), f64)> + '_> {
        if let Some(dense) = &self.fast {
            let (_, ny, nz) = self.shape();
            Box::new(
                dense
                    .iter()
                    .enumerate()
                    .filter(|&(_, &value)| value != 0.0)
                    .map(move |(i, &value)| (((i / (ny * nz)), (i / nz) % ny, i % nz), value)),
            )
        } else {
            Box::new(
                self.blocks
                    .iter()
                    .enumerate()
                    .filter_map(|(it, block)| block.as_ref().map(|block| (it, block)))
                    .flat_map(|(it, block)| {
                        block
                            .cells
                            .iter()
                            .enumerate()
                            .filter(|&(_, &value)| value != 0.0)
                            .map(move |(i, &value)| {
                                (
                                    (it, block.ylow + i / block.nz, block.zlow + i % block.nz),
                                    value,
                                )
                            })
                    }),
            )
        }
    }

    /// Adds every cell of `other` to this tensor.
    ///
    /// # Errors
    ///
    /// Fails with [`GridError::AxisMismatch`] when the axes differ.
    pub fn merge(&mut self, other: &Self) -> Result<(), GridError> {
        if !self.compare_axes(other) {
            return Err(GridError::AxisMismatch);
        }

        for ((it, iy, iz), value) in other.indexed_iter() {
            self[[it, iy, iz]] += value;
        }

        Ok(())
    }

    /// Multiplies every cell by `factor`.
    pub fn scale(&mut self, factor: f64) {
        if let Some(dense) = &mut self.fast {
            dense.iter_mut().for_each(|value| *value *= factor);
        } else {
            self.blocks
                .iter_mut()
                .flatten()
                .flat_map(|block| &mut block.cells)
                .for_each(|value| *value *= factor);
        }
    }
}

impl Index<[usize; 3]> for SparseTensor3 {
    type Output = f64;

    fn index(&self, index: [usize; 3]) -> &Self::Output {
        self.assert_shape(index);

        if let Some(dense) = &self.fast {
            let (_, ny, nz) = self.shape();
            return &dense[(index[0] * ny + index[1]) * nz + index[2]];
        }

        self.blocks[index[0]].as_ref().map_or(&ZERO, |block| {
            if block.contains(index[1], index[2]) {
                &block.cells[block.cell_index(index[1], index[2])]
            } else {
                &ZERO
            }
        })
    }
}

impl IndexMut<[usize; 3]> for SparseTensor3 {
    fn index_mut(&mut self, index: [usize; 3]) -> &mut Self::Output {
        self.assert_shape(index);

        if self.fast.is_some() {
            return self.fill_fast(index[0], index[1], index[2]);
        }

        self.cell_mut(index[0], index[1], index[2])
    }
}

impl MulAssign<f64> for SparseTensor3 {
    fn mul_assign(&mut self, factor: f64) {
        self.scale(factor);
    }
}

impl PartialEq for SparseTensor3 {
    /// Axes must match structurally and the non-zero content pointwise.
    fn eq(&self, other: &Self) -> bool {
        self.compare_axes(other) && self.indexed_iter().eq(other.indexed_iter())
    }
}
